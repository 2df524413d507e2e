//! # s3-archiver
//!
//! Streams every object under an S3 prefix into a ZIP archive and uploads the
//! archive back to S3 while it is being written, as a multipart upload of
//! unknown total length.
//!
//! ## Overview
//!
//! Neither the archive nor the source objects are ever held in full in
//! memory or on disk. The ZIP writer emits bytes into an [`upload::ArchiveSink`];
//! the [`upload::UploadPipeline`] cuts them into parts, uploads up to N parts
//! at a time, retries transient failures with backoff and completes the
//! multipart upload only once every part is acknowledged. Any failure aborts
//! the upload, so no partial object is ever created.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use rust_s3_archiver::archive::{run_archive_job, ArchiveRequest};
//! use rust_s3_archiver::cloud::{client::create_s3_client, endpoint::Destination, s3::S3Storage};
//! use rust_s3_archiver::upload::{PipelineConfig, UploadPipeline};
//! use rust_s3_archiver::utils::streaming_zip::CompressionMethod;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let storage = Arc::new(S3Storage::new(create_s3_client(Some("us-east-1"), None)?));
//! let pipeline = UploadPipeline::new(Arc::clone(&storage), PipelineConfig::default());
//!
//! let request = ArchiveRequest {
//!     source_bucket: "logs".to_string(),
//!     source_prefix: "app/2024/".to_string(),
//!     destination: Destination::new("archives", "app-2024.zip"),
//!     compression: CompressionMethod::Deflated,
//!     skip_empty: true,
//! };
//! let report = run_archive_job(storage.as_ref(), storage.as_ref(), pipeline, &request).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`cli`]: Command-line interface definitions and argument parsing
//! - [`config`]: Upload configuration file and key templating
//! - [`constants`]: Application-wide constants
//! - [`cloud`]: Storage endpoint, lister and source contracts and their S3 implementation
//! - [`upload`]: The streaming chunked upload pipeline
//! - [`archive`]: The archive job tying listing, ZIP writing and upload together
//! - [`utils`]: Streaming ZIP writer

pub mod archive;
pub mod cli;
pub mod cloud;
pub mod config;
pub mod constants;
pub mod upload;
pub mod utils;
