use std::error::Error as StdError;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{future, stream};
use log::debug;
use rusoto_core::{ByteStream, RusotoError};
use rusoto_s3::{
    AbortMultipartUploadRequest, CompleteMultipartUploadRequest, CompletedMultipartUpload,
    CreateMultipartUploadRequest, GetObjectRequest, ListObjectsV2Request, S3Client,
    UploadPartRequest, S3,
};

use crate::cloud::endpoint::{
    CompletedPart, Destination, ObjectRef, Session, StorageEndpoint, UploadError,
};
use crate::cloud::lister::{ListPage, ObjectLister};
use crate::cloud::source::{ObjectSource, SourceObject};

/// Map a rusoto failure onto the retry engine's taxonomy.
///
/// Dispatch failures and throttling or server-side responses are worth
/// retrying; everything else (service errors such as `NoSuchUpload`,
/// credentials, request validation) is not.
pub fn classify_error<E: StdError + 'static>(operation: &str, err: RusotoError<E>) -> UploadError {
    let message = format!("{} failed: {}", operation, err);
    match &err {
        RusotoError::HttpDispatch(_) | RusotoError::Blocking => UploadError::Transient(message),
        RusotoError::Unknown(response)
            if response.status.is_server_error()
                || matches!(response.status.as_u16(), 408 | 429) =>
        {
            UploadError::Transient(message)
        }
        _ => UploadError::Permanent(message),
    }
}

/// S3 implementation of the storage endpoint, lister and object source.
#[derive(Clone)]
pub struct S3Storage {
    client: Arc<S3Client>,
}

impl S3Storage {
    pub fn new(client: Arc<S3Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StorageEndpoint for S3Storage {
    async fn create_session(&self, destination: &Destination) -> Result<String, UploadError> {
        let output = self
            .client
            .create_multipart_upload(CreateMultipartUploadRequest {
                bucket: destination.bucket.clone(),
                key: destination.key.clone(),
                content_type: Some("application/zip".to_string()),
                ..Default::default()
            })
            .await
            .map_err(|e| classify_error("CreateMultipartUpload", e))?;

        let upload_id = output
            .upload_id
            .ok_or_else(|| UploadError::Permanent("No upload ID returned from S3".to_string()))?;

        debug!("Started multipart upload with ID: {} for {}", upload_id, destination);
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        session: &Session,
        part_number: u32,
        payload: Bytes,
    ) -> Result<String, UploadError> {
        let size = payload.len();
        // Bytes is shared, so a retry re-sends the same buffer without copying
        let body = ByteStream::new_with_size(
            stream::once(future::ready(Ok::<Bytes, std::io::Error>(payload))),
            size,
        );

        let output = self
            .client
            .upload_part(UploadPartRequest {
                bucket: session.destination.bucket.clone(),
                key: session.destination.key.clone(),
                upload_id: session.upload_id.clone(),
                part_number: i64::from(part_number),
                content_length: Some(size as i64),
                body: Some(body),
                ..Default::default()
            })
            .await
            .map_err(|e| classify_error("UploadPart", e))?;

        output
            .e_tag
            .ok_or_else(|| UploadError::Transient(format!("No ETag in response for part {}", part_number)))
    }

    async fn complete_session(
        &self,
        session: &Session,
        parts: &[CompletedPart],
    ) -> Result<ObjectRef, UploadError> {
        let completed = parts
            .iter()
            .map(|part| rusoto_s3::CompletedPart {
                e_tag: Some(part.e_tag.clone()),
                part_number: Some(i64::from(part.part_number)),
            })
            .collect();

        let output = self
            .client
            .complete_multipart_upload(CompleteMultipartUploadRequest {
                bucket: session.destination.bucket.clone(),
                key: session.destination.key.clone(),
                upload_id: session.upload_id.clone(),
                multipart_upload: Some(CompletedMultipartUpload {
                    parts: Some(completed),
                }),
                ..Default::default()
            })
            .await
            .map_err(|e| classify_error("CompleteMultipartUpload", e))?;

        Ok(ObjectRef {
            bucket: output.bucket.unwrap_or_else(|| session.destination.bucket.clone()),
            key: output.key.unwrap_or_else(|| session.destination.key.clone()),
            e_tag: output.e_tag,
            location: output.location,
        })
    }

    async fn abort_session(&self, session: &Session) -> Result<(), UploadError> {
        self.client
            .abort_multipart_upload(AbortMultipartUploadRequest {
                bucket: session.destination.bucket.clone(),
                key: session.destination.key.clone(),
                upload_id: session.upload_id.clone(),
                ..Default::default()
            })
            .await
            .map_err(|e| classify_error("AbortMultipartUpload", e))?;

        debug!("Aborted multipart upload for {}", session.destination);
        Ok(())
    }
}

#[async_trait]
impl ObjectLister for S3Storage {
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        let output = self
            .client
            .list_objects_v2(ListObjectsV2Request {
                bucket: bucket.to_string(),
                prefix: Some(prefix.to_string()),
                continuation_token,
                ..Default::default()
            })
            .await
            .context("ListObjectsV2 request failed")?;

        let keys = output
            .contents
            .unwrap_or_default()
            .into_iter()
            .filter_map(|object| object.key)
            .collect();

        // S3 only sends a next token while the listing is truncated
        let next_token = match output.is_truncated {
            Some(true) => output.next_continuation_token,
            _ => None,
        };

        Ok(ListPage { keys, next_token })
    }
}

#[async_trait]
impl ObjectSource for S3Storage {
    async fn open(&self, bucket: &str, key: &str) -> Result<SourceObject> {
        let output = self
            .client
            .get_object(GetObjectRequest {
                bucket: bucket.to_string(),
                key: key.to_string(),
                ..Default::default()
            })
            .await
            .context(format!("Failed to get s3://{}/{}", bucket, key))?;

        let body = output
            .body
            .ok_or_else(|| anyhow!("No body returned for s3://{}/{}", bucket, key))?;

        Ok(SourceObject {
            key: key.to_string(),
            last_modified: output.last_modified.as_deref().and_then(parse_last_modified),
            reader: Box::new(body.into_async_read()),
        })
    }
}

/// Parse the RFC 2822 `Last-Modified` header value S3 returns
fn parse_last_modified(value: &str) -> Option<SystemTime> {
    chrono::DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|timestamp| SystemTime::from(timestamp.with_timezone(&chrono::Utc)))
}
