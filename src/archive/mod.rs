//! Archive job: list a prefix, stream every object into a ZIP, and upload the
//! ZIP through the chunked pipeline while it is being written.

use std::collections::HashMap;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::cloud::endpoint::{Destination, StorageEndpoint};
use crate::cloud::lister::{list_all_keys, ObjectLister};
use crate::cloud::source::ObjectSource;
use crate::constants::STREAMING_BUFFER_SIZE;
use crate::upload::{PipelineError, UploadPipeline, UploadReport};
use crate::utils::streaming_zip::{CompressionMethod, FileOptions, StreamingZipWriter};

/// What to archive and where to put it.
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    pub source_bucket: String,
    pub source_prefix: String,
    pub destination: Destination,
    pub compression: CompressionMethod,
    /// Skip the whole run, without opening a session, when nothing is listed
    pub skip_empty: bool,
}

/// Totals from the producer side of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub entries: usize,
    pub source_bytes: u64,
}

/// Run one archive job, consuming the pipeline.
///
/// The listing completes before the upload session is opened, so an
/// enumeration failure never leaves a session behind. Returns `None` when the
/// listing is empty and `skip_empty` is set.
pub async fn run_archive_job<L, S, E>(
    lister: &L,
    source: &S,
    pipeline: UploadPipeline<E>,
    request: &ArchiveRequest,
) -> Result<Option<UploadReport>>
where
    L: ObjectLister + ?Sized,
    S: ObjectSource + ?Sized,
    E: StorageEndpoint,
{
    info!(
        "Listing s3://{}/{}",
        request.source_bucket, request.source_prefix
    );
    let keys = list_all_keys(lister, &request.source_bucket, &request.source_prefix).await?;
    let entries = archive_entries(&request.source_prefix, keys)?;

    if entries.is_empty() {
        if request.skip_empty {
            info!("No objects under s3://{}/{}, skipping", request.source_bucket, request.source_prefix);
            return Ok(None);
        }
        warn!("No objects found, uploading an empty archive");
    } else {
        info!("Archiving {} objects into {}", entries.len(), request.destination);
    }

    let started = Instant::now();
    let (sink, events) = pipeline.stream_channel();
    let producer = write_archive(
        source,
        &request.source_bucket,
        &entries,
        request.compression,
        sink,
    );
    let upload = pipeline.run(request.destination.clone(), events);

    let (produced, uploaded) = tokio::join!(producer, upload);

    let report = match (produced, uploaded) {
        (Ok(stats), Ok(report)) => {
            info!(
                "Archived {} objects ({} bytes -> {} byte archive) in {:.2}s",
                stats.entries,
                stats.source_bytes,
                report.bytes,
                started.elapsed().as_secs_f64()
            );
            report
        }
        // The pipeline only sees a closed channel; the producer knows why
        (Err(e), Err(PipelineError::ProducerAborted)) => {
            return Err(e.context(format!("Archive upload to {} aborted", request.destination)));
        }
        (produced, Err(e)) => {
            if let Err(producer_error) = produced {
                debug!("Producer stopped after upload failure: {:#}", producer_error);
            }
            return Err(e).with_context(|| format!("Archive upload to {} failed", request.destination));
        }
        (Err(e), Ok(_)) => return Err(e),
    };

    Ok(Some(report))
}

/// Stream every listed object into a ZIP written to `sink`, then shut the
/// sink down to signal end-of-stream.
///
/// On error the sink is dropped without a shutdown, which the upload
/// pipeline sees as an aborted producer.
pub async fn write_archive<S, W>(
    source: &S,
    bucket: &str,
    entries: &[(String, String)],
    compression: CompressionMethod,
    sink: W,
) -> Result<ArchiveStats>
where
    S: ObjectSource + ?Sized,
    W: AsyncWrite + Unpin,
{
    let mut zip = StreamingZipWriter::new(sink);
    let mut stats = ArchiveStats::default();
    let mut buffer = vec![0u8; STREAMING_BUFFER_SIZE];

    for (key, name) in entries {
        let mut object = source
            .open(bucket, key)
            .await
            .with_context(|| format!("Failed to open s3://{}/{}", bucket, key))?;

        let options = FileOptions {
            compression_method: compression,
            last_modified: object.last_modified,
        };
        let mut file = zip
            .start_file(name, options)
            .await
            .with_context(|| format!("Failed to start archive entry {}", name))?;

        let mut object_bytes = 0u64;
        loop {
            let n = object
                .reader
                .read(&mut buffer)
                .await
                .with_context(|| format!("Failed to read s3://{}/{}", bucket, key))?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n]).await?;
            object_bytes += n as u64;
        }
        file.finish().await?;

        debug!("Archived {} ({} bytes)", key, object_bytes);
        stats.entries += 1;
        stats.source_bytes += object_bytes;
    }

    let mut sink = zip.finish().await.context("Failed to finish archive")?;
    sink.shutdown().await.context("Failed to close archive stream")?;

    Ok(stats)
}

/// Archive entry name for `key`: the key relative to `prefix`.
///
/// The prefix is only stripped at a `/` boundary; a prefix that ends inside
/// a path segment strips just its directory part, so `logs` never turns
/// `logsX/a` into `X/a`. Directory marker keys (ending in `/`) have no
/// content and yield `None`. A key equal to the prefix keeps its last path
/// segment.
pub fn entry_name(prefix: &str, key: &str) -> Option<String> {
    if key.ends_with('/') {
        return None;
    }
    if key == prefix {
        return key.rsplit('/').next().map(str::to_string);
    }

    let relative = if prefix.is_empty() || prefix.ends_with('/') {
        key.strip_prefix(prefix)
    } else {
        key.strip_prefix(prefix).and_then(|rest| rest.strip_prefix('/'))
    };
    let relative = match relative {
        Some(relative) => relative,
        None => {
            let directory = prefix.rfind('/').map_or("", |i| &prefix[..=i]);
            key.strip_prefix(directory).unwrap_or(key)
        }
    };

    let relative = relative.trim_start_matches('/');
    (!relative.is_empty()).then(|| relative.to_string())
}

/// Pair every listed key with its entry name, dropping directory markers.
///
/// Two keys that map to the same name (`logs/a` and `logs//a`) are an error;
/// the archive would otherwise hold duplicate entries.
pub fn archive_entries(prefix: &str, keys: Vec<String>) -> Result<Vec<(String, String)>> {
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut entries = Vec::with_capacity(keys.len());

    for key in keys {
        let name = match entry_name(prefix, &key) {
            Some(name) => name,
            None => continue,
        };
        if let Some(previous) = seen.insert(name.clone(), key.clone()) {
            bail!(
                "Keys {} and {} both map to archive entry {}",
                previous,
                key,
                name
            );
        }
        entries.push((key, name));
    }

    Ok(entries)
}
