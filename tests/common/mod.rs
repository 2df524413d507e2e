//! In-memory storage doubles shared by the integration tests.
//!
//! `MemoryEndpoint` records every call and can be scripted to fail; the
//! lister and source serve objects from a map.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;

use rust_s3_archiver::cloud::endpoint::{
    CompletedPart, Destination, ObjectRef, Session, StorageEndpoint, UploadError,
};
use rust_s3_archiver::cloud::lister::{ListPage, ObjectLister};
use rust_s3_archiver::cloud::source::{ObjectSource, SourceObject};
use rust_s3_archiver::upload::{ArchiveSink, RetryPolicy};

#[derive(Default)]
struct EndpointState {
    sessions_created: usize,
    aborts: usize,
    complete_calls: usize,
    /// Scripted failures consumed one per attempt, per part
    scripted: HashMap<u32, VecDeque<UploadError>>,
    always_fail: HashMap<u32, UploadError>,
    fail_create: Option<UploadError>,
    fail_complete: Option<UploadError>,
    /// Every attempt's payload, per part, in call order
    attempts: BTreeMap<u32, Vec<Bytes>>,
    stored: BTreeMap<u32, (String, Bytes)>,
    completed_parts: Option<Vec<CompletedPart>>,
    object: Option<Vec<u8>>,
    in_flight: usize,
    max_in_flight: usize,
    /// Endpoint calls in order: create, upload, complete, abort
    calls: Vec<&'static str>,
}

/// Storage endpoint that keeps parts in memory.
#[derive(Default)]
pub struct MemoryEndpoint {
    state: Mutex<EndpointState>,
    upload_delay: Duration,
}

impl MemoryEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = delay;
        self
    }

    /// Fail the next `times` attempts of `part_number` with `error`
    pub fn fail_part(self, part_number: u32, times: usize, error: UploadError) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let queue = state.scripted.entry(part_number).or_default();
            for _ in 0..times {
                queue.push_back(error.clone());
            }
        }
        self
    }

    pub fn fail_part_always(self, part_number: u32, error: UploadError) -> Self {
        self.state.lock().unwrap().always_fail.insert(part_number, error);
        self
    }

    pub fn fail_create(self, error: UploadError) -> Self {
        self.state.lock().unwrap().fail_create = Some(error);
        self
    }

    pub fn fail_complete(self, error: UploadError) -> Self {
        self.state.lock().unwrap().fail_complete = Some(error);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn sessions_created(&self) -> usize {
        self.state.lock().unwrap().sessions_created
    }

    pub fn aborts(&self) -> usize {
        self.state.lock().unwrap().aborts
    }

    pub fn complete_calls(&self) -> usize {
        self.state.lock().unwrap().complete_calls
    }

    pub fn attempts_for(&self, part_number: u32) -> Vec<Bytes> {
        self.state
            .lock()
            .unwrap()
            .attempts
            .get(&part_number)
            .cloned()
            .unwrap_or_default()
    }

    /// Part numbers that have seen at least one attempt
    pub fn attempted_parts(&self) -> Vec<u32> {
        self.state.lock().unwrap().attempts.keys().copied().collect()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn total_attempts(&self) -> usize {
        self.state.lock().unwrap().attempts.values().map(Vec::len).sum()
    }

    /// Sizes of the stored parts in part number order
    pub fn part_sizes(&self) -> Vec<usize> {
        self.state
            .lock()
            .unwrap()
            .stored
            .values()
            .map(|(_, payload)| payload.len())
            .collect()
    }

    pub fn completed_parts(&self) -> Option<Vec<CompletedPart>> {
        self.state.lock().unwrap().completed_parts.clone()
    }

    /// The finalized object, if `complete_session` succeeded
    pub fn object(&self) -> Option<Vec<u8>> {
        self.state.lock().unwrap().object.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }
}

#[async_trait]
impl StorageEndpoint for MemoryEndpoint {
    async fn create_session(&self, _destination: &Destination) -> Result<String, UploadError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("create");
        if let Some(error) = state.fail_create.clone() {
            return Err(error);
        }
        state.sessions_created += 1;
        Ok(format!("upload-{}", state.sessions_created))
    }

    async fn upload_part(
        &self,
        _session: &Session,
        part_number: u32,
        payload: Bytes,
    ) -> Result<String, UploadError> {
        {
            let mut state = self.state.lock().unwrap();
            state.calls.push("upload");
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }

        if !self.upload_delay.is_zero() {
            sleep(self.upload_delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.in_flight -= 1;
        state
            .attempts
            .entry(part_number)
            .or_default()
            .push(payload.clone());

        if let Some(error) = state.always_fail.get(&part_number).cloned() {
            return Err(error);
        }
        if let Some(error) = state
            .scripted
            .get_mut(&part_number)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        let e_tag = format!("\"etag-{}\"", part_number);
        state.stored.insert(part_number, (e_tag.clone(), payload));
        Ok(e_tag)
    }

    async fn complete_session(
        &self,
        session: &Session,
        parts: &[CompletedPart],
    ) -> Result<ObjectRef, UploadError> {
        let mut state = self.state.lock().unwrap();
        state.complete_calls += 1;
        state.calls.push("complete");
        if let Some(error) = state.fail_complete.clone() {
            return Err(error);
        }

        let mut object = Vec::new();
        for part in parts {
            match state.stored.get(&part.part_number) {
                Some((e_tag, payload)) if *e_tag == part.e_tag => object.extend_from_slice(payload),
                _ => {
                    return Err(UploadError::Permanent(format!(
                        "unknown part {}",
                        part.part_number
                    )))
                }
            }
        }

        state.completed_parts = Some(parts.to_vec());
        state.object = Some(object);
        Ok(ObjectRef {
            bucket: session.destination.bucket.clone(),
            key: session.destination.key.clone(),
            e_tag: Some("\"final\"".to_string()),
            location: None,
        })
    }

    async fn abort_session(&self, _session: &Session) -> Result<(), UploadError> {
        let mut state = self.state.lock().unwrap();
        state.aborts += 1;
        state.calls.push("abort");
        Ok(())
    }
}

/// Lister serving a fixed key list in pages.
pub struct MemoryLister {
    keys: Vec<String>,
    page_size: usize,
    fail: Option<String>,
}

impl MemoryLister {
    pub fn new(keys: &[&str], page_size: usize) -> Self {
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            page_size: page_size.max(1),
            fail: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            keys: Vec::new(),
            page_size: 1,
            fail: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl ObjectLister for MemoryLister {
    async fn list(
        &self,
        _bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        if let Some(message) = &self.fail {
            return Err(anyhow!(message.clone()));
        }

        let matching: Vec<&String> = self.keys.iter().filter(|k| k.starts_with(prefix)).collect();
        let start = match continuation_token {
            Some(token) => token.parse::<usize>()?,
            None => 0,
        };
        let end = (start + self.page_size).min(matching.len());

        Ok(ListPage {
            keys: matching[start..end].iter().map(|k| k.to_string()).collect(),
            next_token: (end < matching.len()).then(|| end.to_string()),
        })
    }
}

/// Source serving object bodies from memory.
#[derive(Default)]
pub struct MemorySource {
    objects: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new(objects: &[(&str, &[u8])]) -> Self {
        Self {
            objects: objects
                .iter()
                .map(|(key, data)| (key.to_string(), data.to_vec()))
                .collect(),
        }
    }
}

#[async_trait]
impl ObjectSource for MemorySource {
    async fn open(&self, _bucket: &str, key: &str) -> Result<SourceObject> {
        let data = self
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("NoSuchKey: {}", key))?;

        Ok(SourceObject {
            key: key.to_string(),
            last_modified: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_704_164_646)),
            reader: Box::new(Cursor::new(data)),
        })
    }
}

/// Retry policy with millisecond delays and no jitter
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        jitter: false,
    }
}

/// Deterministic test payload
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Write `data` in `chunk`-sized writes, then signal end-of-stream.
pub async fn feed(mut sink: ArchiveSink, data: Vec<u8>, chunk: usize) -> std::io::Result<()> {
    for piece in data.chunks(chunk.max(1)) {
        sink.write_all(piece).await?;
    }
    sink.shutdown().await
}
