//! Utilities shared by the archive job.

/// Streaming ZIP archive creation
pub mod streaming_zip;
