//! Forward-only ZIP writer for archives streamed straight into an upload.

mod formats;
mod helpers;
mod writer;

pub use formats::{CompressionMethod, FileOptions};
pub use helpers::dos_time;
pub use writer::{StreamingFileWriter, StreamingZipWriter};
