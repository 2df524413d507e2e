use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::cloud::endpoint::{CompletedPart, Destination, ObjectRef, StorageEndpoint};
use crate::constants::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_CONCURRENT_UPLOADS, MIN_PART_SIZE, S3_MAX_PARTS,
};
use crate::upload::coordinator::UploadCoordinator;
use crate::upload::error::PipelineError;
use crate::upload::part::{Part, PartOutcome};
use crate::upload::part_buffer::PartBuffer;
use crate::upload::progress::PipelineStats;
use crate::upload::retry::{RetryEngine, RetryPolicy};
use crate::upload::session::SessionManager;
use crate::upload::sink::{stream_channel, ArchiveSink, StreamEvent};

/// Tuning for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Size of every part except the last
    pub part_size: usize,
    /// Upper bound on simultaneous part uploads
    pub max_concurrent_uploads: usize,
    pub retry: RetryPolicy,
    /// Abort the session if the whole run takes longer than this
    pub timeout: Option<Duration>,
    /// Capacity of the producer channel, in write events
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            part_size: MIN_PART_SIZE,
            max_concurrent_uploads: DEFAULT_MAX_CONCURRENT_UPLOADS.min(num_cpus::get()).max(1),
            retry: RetryPolicy::default(),
            timeout: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Summary of a finalized upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub object: ObjectRef,
    pub parts: u32,
    pub bytes: u64,
    pub retries: u64,
}

/// What the upload loop hands to the completion step.
struct Drained {
    acknowledged: Vec<CompletedPart>,
    parts: u32,
    bytes: u64,
    retries: u64,
}

/// Streaming chunked upload of one byte stream into one destination object.
///
/// A pipeline is single-use: `run` consumes it, so its cancellation token
/// and counters always describe exactly one upload. The run opens its own
/// session, buffer, coordinator and retry engine, and ends the session
/// exactly once.
pub struct UploadPipeline<E: StorageEndpoint> {
    endpoint: Arc<E>,
    config: PipelineConfig,
    stats: Arc<PipelineStats>,
    cancel: CancellationToken,
}

impl<E: StorageEndpoint> UploadPipeline<E> {
    pub fn new(endpoint: Arc<E>, config: PipelineConfig) -> Self {
        Self {
            endpoint,
            config,
            stats: Arc::new(PipelineStats::default()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Cancelling this token aborts the upload, before or during `run`
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// A producer channel sized for this pipeline
    pub fn stream_channel(&self) -> (ArchiveSink, mpsc::Receiver<StreamEvent>) {
        stream_channel(self.config.channel_capacity)
    }

    /// Upload everything the producer sends on `events` to `destination`.
    ///
    /// Succeeds only if the finalize call succeeds. Every failure after the
    /// session is opened ends with an abort call on that session.
    pub async fn run(
        self,
        destination: Destination,
        mut events: mpsc::Receiver<StreamEvent>,
    ) -> Result<UploadReport, PipelineError> {
        let mut session = SessionManager::open(Arc::clone(&self.endpoint), destination).await?;

        let drained = match self.upload_all(&mut session, &mut events).await {
            Ok(drained) => drained,
            Err(e) => {
                error!("Upload failed: {}", e);
                // Stop the producer before releasing the session
                events.close();
                session.abort_quietly().await;
                debug!("Session ended {:?}", session.state());
                return Err(e);
            }
        };

        let completed = session.complete(drained.acknowledged, drained.parts).await;
        debug!("Session ended {:?}", session.state());
        let object = completed?;
        info!(
            "Uploaded {} bytes in {} parts to s3://{}/{}",
            drained.bytes, drained.parts, object.bucket, object.key
        );

        Ok(UploadReport {
            object,
            parts: drained.parts,
            bytes: drained.bytes,
            retries: drained.retries,
        })
    }

    /// Drive buffer, coordinator and retry engine until the stream is complete
    /// and every part has a terminal outcome.
    async fn upload_all(
        &self,
        session: &mut SessionManager<E>,
        events: &mut mpsc::Receiver<StreamEvent>,
    ) -> Result<Drained, PipelineError> {
        let mut buffer = PartBuffer::new(self.config.part_size);
        let mut coordinator = UploadCoordinator::new(
            Arc::clone(&self.endpoint),
            session.session(),
            self.config.max_concurrent_uploads,
            Arc::clone(&self.stats),
        );
        let permits = coordinator.permits();
        let workers = self.config.max_concurrent_uploads.max(1);
        let mut retries = RetryEngine::new(self.config.retry.clone());

        // Parts drained from the buffer that are still waiting for a permit
        let mut pending: VecDeque<Part> = VecDeque::new();
        let mut stream_complete = false;
        let mut bytes_received = 0u64;

        let deadline = self.config.timeout.map(|timeout| Instant::now() + timeout);
        let timed_out = async {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(timed_out);

        loop {
            if stream_complete && pending.is_empty() && !coordinator.has_in_flight() {
                break;
            }

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    return Err(PipelineError::Cancelled);
                }

                _ = &mut timed_out => {
                    return Err(PipelineError::Timeout(self.config.timeout.unwrap_or_default()));
                }

                Some(joined) = coordinator.next_outcome() => {
                    let outcome = joined.map_err(|e| PipelineError::TaskFailed(e.to_string()))?;
                    match outcome {
                        PartOutcome::Acknowledged { part_number, size, e_tag, attempt } => {
                            debug!(
                                "Part {} acknowledged on attempt {} ({} bytes)",
                                part_number, attempt, size
                            );
                            retries.on_success(part_number);
                            coordinator.record_acknowledged(part_number, size, e_tag);
                        }
                        PartOutcome::Failed { part, attempt, cause, permit } => {
                            let delay = retries.on_failure(part.number, attempt, cause)?;
                            coordinator.redispatch(part, attempt + 1, delay, permit);
                        }
                    }
                }

                permit = Arc::clone(&permits).acquire_owned(), if !pending.is_empty() => {
                    let permit = permit.map_err(|e| PipelineError::TaskFailed(e.to_string()))?;
                    if let Some(part) = pending.pop_front() {
                        session.mark_uploading()?;
                        coordinator.dispatch(part, permit);
                    }
                }

                // Only pull more input once every drained part is on the wire
                // and a worker is free, counting parts waiting on a retry
                event = events.recv(),
                    if !stream_complete && pending.is_empty() && coordinator.in_flight() < workers => {
                    match event {
                        Some(StreamEvent::Data(data)) => {
                            bytes_received += data.len() as u64;
                            self.stats
                                .bytes_received
                                .fetch_add(data.len() as u64, Ordering::Relaxed);
                            buffer.append(&data);
                            pending.extend(buffer.drain_full_parts());
                        }
                        Some(StreamEvent::End) => {
                            debug!("Producer signalled end of stream after {} bytes", bytes_received);
                            stream_complete = true;
                            pending.extend(buffer.flush_remainder());
                        }
                        None => return Err(PipelineError::ProducerAborted),
                    }

                    if buffer.parts_emitted() > S3_MAX_PARTS {
                        return Err(PipelineError::TooManyParts(S3_MAX_PARTS));
                    }
                }
            }
        }

        if buffer.parts_emitted() == 0 {
            return Err(PipelineError::EmptyStream);
        }
        debug_assert!(retries.is_drained());

        Ok(Drained {
            parts: buffer.parts_emitted(),
            bytes: bytes_received,
            retries: retries.total_retries(),
            acknowledged: coordinator.into_acknowledged(),
        })
    }
}
