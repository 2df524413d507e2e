use std::time::SystemTime;

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::AsyncRead;

/// An opened source object, body not yet read.
pub struct SourceObject {
    pub key: String,
    pub last_modified: Option<SystemTime>,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

/// Read access to the objects being archived.
#[async_trait]
pub trait ObjectSource: Send + Sync {
    async fn open(&self, bucket: &str, key: &str) -> Result<SourceObject>;
}
