//! Global constants for the s3-archiver application.
//!
//! Sizes, limits and retry defaults live here so the config layer, the
//! upload pipeline and the ZIP writer agree on them.

// Multipart upload constants
/// Minimum size of every part except the last (10MB)
pub const MIN_PART_SIZE: usize = 10 * 1024 * 1024;

/// Largest part S3 accepts (5GB)
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// S3 maximum parts per upload
pub const S3_MAX_PARTS: u32 = 10000;

/// Upper bound on the default number of simultaneous part uploads
pub const DEFAULT_MAX_CONCURRENT_UPLOADS: usize = 4;

/// Capacity of the producer -> pipeline stream channel, in write events
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

// Timeout and retry constants
/// Maximum attempts per part, first attempt included
pub const MAX_UPLOAD_ATTEMPTS: u32 = 5;

/// Base retry delay in milliseconds
pub const RETRY_BASE_DELAY_MS: u64 = 250;

/// Maximum retry delay in seconds
pub const RETRY_MAX_DELAY_SECS: u64 = 30;

/// Progress reporting interval for uploads in seconds
pub const UPLOAD_PROGRESS_INTERVAL_SECS: u64 = 5;

/// Read buffer used when copying a source object into the archive (64KB)
pub const STREAMING_BUFFER_SIZE: usize = 64 * 1024;

// ZIP format constants
/// ZIP local file header signature
pub const ZIP_LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;

/// ZIP data descriptor signature
pub const ZIP_DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;

/// ZIP central directory header signature
pub const ZIP_CENTRAL_DIR_HEADER_SIGNATURE: u32 = 0x02014b50;

/// ZIP end of central directory signature
pub const ZIP_END_OF_CENTRAL_DIR_SIGNATURE: u32 = 0x06054b50;

/// ZIP version needed to extract
pub const ZIP_VERSION_NEEDED: u16 = 20; // 2.0

/// ZIP version made by (UNIX + 3.0)
pub const ZIP_VERSION_MADE_BY: u16 = 0x031e;

/// ZIP compression method: deflate
pub const ZIP_COMPRESSION_METHOD_DEFLATE: u16 = 8;

/// ZIP compression method: store (no compression)
pub const ZIP_COMPRESSION_METHOD_STORE: u16 = 0;

/// Sizes and CRC follow the entry data in a data descriptor (bit 3),
/// file names are UTF-8 (bit 11)
pub const ZIP_STREAMING_BIT_FLAG: u16 = 0x0008 | 0x0800;

/// Largest offset or size representable without ZIP64
pub const ZIP32_LIMIT: u64 = u32::MAX as u64;

/// Largest entry count representable without ZIP64
pub const ZIP32_MAX_ENTRIES: usize = u16::MAX as usize;

// Default file names
pub const DEFAULT_CONFIG_NAME: &str = "s3-archiver.yaml";
