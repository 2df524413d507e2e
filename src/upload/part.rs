use bytes::Bytes;
use tokio::sync::OwnedSemaphorePermit;

use crate::cloud::endpoint::UploadError;

/// A contiguous slice of the output stream uploaded as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub number: u32,
    pub payload: Bytes,
}

impl Part {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Result of one upload attempt.
#[derive(Debug)]
pub enum PartOutcome {
    Acknowledged {
        part_number: u32,
        size: usize,
        e_tag: String,
        attempt: u32,
    },
    /// The payload is kept so a retry sends exactly the same bytes. The
    /// worker permit stays with the part until its retry finishes.
    Failed {
        part: Part,
        attempt: u32,
        cause: UploadError,
        permit: OwnedSemaphorePermit,
    },
}

impl PartOutcome {
    pub fn part_number(&self) -> u32 {
        match self {
            PartOutcome::Acknowledged { part_number, .. } => *part_number,
            PartOutcome::Failed { part, .. } => part.number,
        }
    }
}
