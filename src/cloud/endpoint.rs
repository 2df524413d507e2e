//! Storage endpoint contract used by the upload pipeline.
//!
//! The pipeline only needs four calls from the store: create a session,
//! upload one numbered part, complete the session with an ordered part list,
//! and abort it. Everything S3 specific lives behind this trait in
//! [`crate::cloud::s3`].

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Failure of a single storage call, classified for the retry engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    /// Network faults, throttling, 5xx responses. Worth another attempt.
    #[error("transient storage error: {0}")]
    Transient(String),

    /// Invalid session, size policy violations, bad credentials. Never retried.
    #[error("permanent storage error: {0}")]
    Permanent(String),
}

impl UploadError {
    pub fn is_transient(&self) -> bool {
        matches!(self, UploadError::Transient(_))
    }
}

/// Where the finished object goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub bucket: String,
    pub key: String,
}

impl Destination {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// One chunked-upload transaction against one destination.
///
/// `upload_id` is the opaque token returned by the store; it is passed
/// unchanged to every part upload and to the final complete/abort call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub destination: Destination,
    pub upload_id: String,
}

/// A part the store acknowledged, as named in the finalize request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub e_tag: String,
}

/// Identifier and metadata of the finalized object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
    pub e_tag: Option<String>,
    pub location: Option<String>,
}

/// Remote store supporting chunked, resumable uploads.
#[async_trait]
pub trait StorageEndpoint: Send + Sync + 'static {
    /// Start a session for `destination` and return its upload id
    async fn create_session(&self, destination: &Destination) -> Result<String, UploadError>;

    /// Upload one part and return the integrity tag (ETag) for it
    async fn upload_part(
        &self,
        session: &Session,
        part_number: u32,
        payload: Bytes,
    ) -> Result<String, UploadError>;

    /// Finalize the session; `parts` must already be sorted by part number
    async fn complete_session(
        &self,
        session: &Session,
        parts: &[CompletedPart],
    ) -> Result<ObjectRef, UploadError>;

    /// Release server-side resources of a session that will never complete
    async fn abort_session(&self, session: &Session) -> Result<(), UploadError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(UploadError::Transient("timeout".into()).is_transient());
        assert!(!UploadError::Permanent("NoSuchUpload".into()).is_transient());
    }

    #[test]
    fn test_destination_display() {
        let destination = Destination::new("archive-bucket", "exports/all.zip");
        assert_eq!(destination.to_string(), "s3://archive-bucket/exports/all.zip");
    }
}
