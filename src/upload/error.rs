use std::time::Duration;

use thiserror::Error;

use crate::cloud::endpoint::UploadError;
use crate::upload::session::SessionState;

/// Terminal failure of one pipeline run.
///
/// Every variant except `SessionOpen` is raised after a session exists, and
/// the pipeline aborts that session before returning it.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to open upload session")]
    SessionOpen(#[source] UploadError),

    #[error("part {part_number} failed permanently")]
    PermanentPartFailure {
        part_number: u32,
        #[source]
        source: UploadError,
    },

    #[error("part {part_number} still failing after {attempts} attempts")]
    PartExhausted {
        part_number: u32,
        attempts: u32,
        #[source]
        source: UploadError,
    },

    #[error("failed to finalize upload session")]
    Finalize(#[source] UploadError),

    #[error("acknowledged parts do not cover the stream: expected {expected}, got {acknowledged:?}")]
    MissingParts { expected: u32, acknowledged: Vec<u32> },

    #[error("stream needs more than {0} parts")]
    TooManyParts(u32),

    #[error("producer emitted no bytes")]
    EmptyStream,

    #[error("producer stopped without signalling end of stream")]
    ProducerAborted,

    #[error("upload did not finish within {0:?}")]
    Timeout(Duration),

    #[error("upload cancelled")]
    Cancelled,

    #[error("upload task failed: {0}")]
    TaskFailed(String),

    #[error("illegal session transition from {from:?} to {to:?}")]
    IllegalTransition { from: SessionState, to: SessionState },
}
