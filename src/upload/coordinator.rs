use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::sleep;

use crate::cloud::endpoint::{CompletedPart, Session, StorageEndpoint};
use crate::upload::part::{Part, PartOutcome};
use crate::upload::progress::PipelineStats;

/// Dispatches part uploads as concurrent tasks and collects their outcomes.
///
/// A semaphore caps the number of uploads on the wire. Outcomes come back
/// through the `JoinSet`, so only the pipeline loop ever touches the
/// acknowledged collection.
pub struct UploadCoordinator<E: StorageEndpoint> {
    endpoint: Arc<E>,
    session: Arc<Session>,
    permits: Arc<Semaphore>,
    tasks: JoinSet<PartOutcome>,
    acknowledged: Vec<CompletedPart>,
    stats: Arc<PipelineStats>,
}

impl<E: StorageEndpoint> UploadCoordinator<E> {
    pub fn new(
        endpoint: Arc<E>,
        session: Arc<Session>,
        max_concurrent_uploads: usize,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            endpoint,
            session,
            permits: Arc::new(Semaphore::new(max_concurrent_uploads.max(1))),
            tasks: JoinSet::new(),
            acknowledged: Vec::new(),
            stats,
        }
    }

    /// Handle to the worker pool, for acquiring a permit before `dispatch`
    pub fn permits(&self) -> Arc<Semaphore> {
        Arc::clone(&self.permits)
    }

    /// Start the first attempt of `part`. The permit is released once the
    /// part is acknowledged, or travels back with a failed outcome.
    pub fn dispatch(&mut self, part: Part, permit: OwnedSemaphorePermit) {
        debug!("Dispatching part {} ({} bytes)", part.number, part.len());
        self.stats.parts_dispatched.fetch_add(1, Ordering::Relaxed);

        let endpoint = Arc::clone(&self.endpoint);
        let session = Arc::clone(&self.session);
        self.tasks
            .spawn(async move { upload_attempt(endpoint.as_ref(), &session, part, 1, permit).await });
    }

    /// Schedule another attempt of a failed part after `delay`, with the
    /// same part number and payload. The part keeps its permit while it
    /// waits, so parts held in memory never exceed the worker count.
    pub fn redispatch(
        &mut self,
        part: Part,
        attempt: u32,
        delay: Duration,
        permit: OwnedSemaphorePermit,
    ) {
        debug!(
            "Scheduling attempt {} of part {} in {:?}",
            attempt, part.number, delay
        );
        self.stats.retries.fetch_add(1, Ordering::Relaxed);

        let endpoint = Arc::clone(&self.endpoint);
        let session = Arc::clone(&self.session);
        self.tasks.spawn(async move {
            sleep(delay).await;
            upload_attempt(endpoint.as_ref(), &session, part, attempt, permit).await
        });
    }

    /// Wait for the next upload task to finish. `None` when nothing is in flight.
    pub async fn next_outcome(&mut self) -> Option<Result<PartOutcome, JoinError>> {
        self.tasks.join_next().await
    }

    pub fn record_acknowledged(&mut self, part_number: u32, size: usize, e_tag: String) {
        self.stats.parts_acknowledged.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_acknowledged
            .fetch_add(size as u64, Ordering::Relaxed);
        self.acknowledged.push(CompletedPart { part_number, e_tag });
    }

    pub fn has_in_flight(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Parts being uploaded or waiting for a retry
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Stop every in-flight upload; their outcomes are discarded.
    pub fn cancel(&mut self) {
        if !self.tasks.is_empty() {
            debug!("Cancelling {} in-flight uploads", self.tasks.len());
        }
        self.tasks.abort_all();
        self.permits.close();
    }

    pub fn into_acknowledged(mut self) -> Vec<CompletedPart> {
        std::mem::take(&mut self.acknowledged)
    }
}

impl<E: StorageEndpoint> Drop for UploadCoordinator<E> {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn upload_attempt<E: StorageEndpoint + ?Sized>(
    endpoint: &E,
    session: &Session,
    part: Part,
    attempt: u32,
    permit: OwnedSemaphorePermit,
) -> PartOutcome {
    let size = part.len();
    match endpoint
        .upload_part(session, part.number, part.payload.clone())
        .await
    {
        Ok(e_tag) => {
            drop(permit);
            PartOutcome::Acknowledged {
                part_number: part.number,
                size,
                e_tag,
                attempt,
            }
        }
        Err(cause) => PartOutcome::Failed {
            part,
            attempt,
            cause,
            permit,
        },
    }
}
