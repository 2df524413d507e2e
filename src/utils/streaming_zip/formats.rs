use anyhow::Result;
use bytes::{BufMut, BytesMut};
use std::time::SystemTime;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::constants::{
    ZIP_CENTRAL_DIR_HEADER_SIGNATURE as CENTRAL_DIR_HEADER_SIGNATURE,
    ZIP_DATA_DESCRIPTOR_SIGNATURE as DATA_DESCRIPTOR_SIGNATURE,
    ZIP_END_OF_CENTRAL_DIR_SIGNATURE as END_OF_CENTRAL_DIR_SIGNATURE,
    ZIP_LOCAL_FILE_HEADER_SIGNATURE as LOCAL_FILE_HEADER_SIGNATURE,
};

pub use crate::constants::{
    ZIP_COMPRESSION_METHOD_DEFLATE as COMPRESSION_METHOD_DEFLATE,
    ZIP_COMPRESSION_METHOD_STORE as COMPRESSION_METHOD_STORE,
    ZIP_STREAMING_BIT_FLAG as STREAMING_BIT_FLAG, ZIP_VERSION_MADE_BY as VERSION_MADE_BY,
    ZIP_VERSION_NEEDED as VERSION_NEEDED,
};

/// Finished entry, remembered for the central directory
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub name: String,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub crc32: u32,
    pub offset: u32,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
}

/// File options for ZIP entries
#[derive(Debug, Clone)]
pub struct FileOptions {
    pub compression_method: CompressionMethod,
    pub last_modified: Option<SystemTime>,
}

/// Compression methods
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CompressionMethod {
    Stored,
    Deflated,
}

impl CompressionMethod {
    pub fn code(self) -> u16 {
        match self {
            CompressionMethod::Stored => COMPRESSION_METHOD_STORE,
            CompressionMethod::Deflated => COMPRESSION_METHOD_DEFLATE,
        }
    }
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            compression_method: CompressionMethod::Deflated,
            last_modified: None,
        }
    }
}

async fn write_record<W: AsyncWrite + Unpin>(writer: &mut W, bytes: BytesMut) -> Result<u32> {
    writer.write_all(&bytes).await?;
    Ok(bytes.len() as u32)
}

/// Local file header. CRC and sizes are zero because bit 3 is set; the real
/// values follow the data in a [`DataDescriptor`].
pub struct LocalFileHeader<'a> {
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub file_name: &'a [u8],
}

impl LocalFileHeader<'_> {
    pub async fn write<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<u32> {
        let mut bytes = BytesMut::with_capacity(30 + self.file_name.len());
        bytes.put_u32_le(LOCAL_FILE_HEADER_SIGNATURE);
        bytes.put_u16_le(VERSION_NEEDED);
        bytes.put_u16_le(STREAMING_BIT_FLAG);
        bytes.put_u16_le(self.compression_method);
        bytes.put_u16_le(self.last_mod_time);
        bytes.put_u16_le(self.last_mod_date);
        bytes.put_u32_le(0); // crc32
        bytes.put_u32_le(0); // compressed size
        bytes.put_u32_le(0); // uncompressed size
        bytes.put_u16_le(self.file_name.len() as u16);
        bytes.put_u16_le(0); // extra field length
        bytes.put_slice(self.file_name);
        write_record(writer, bytes).await
    }
}

/// Trailer carrying CRC and sizes of the entry just written
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

impl DataDescriptor {
    pub async fn write<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<u32> {
        let mut bytes = BytesMut::with_capacity(16);
        bytes.put_u32_le(DATA_DESCRIPTOR_SIGNATURE);
        bytes.put_u32_le(self.crc32);
        bytes.put_u32_le(self.compressed_size);
        bytes.put_u32_le(self.uncompressed_size);
        write_record(writer, bytes).await
    }
}

/// Central directory header for one entry
pub struct CentralDirectoryHeader<'a> {
    pub entry: &'a ZipEntry,
}

impl CentralDirectoryHeader<'_> {
    pub async fn write<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<u32> {
        let entry = self.entry;
        let name = entry.name.as_bytes();
        let mut bytes = BytesMut::with_capacity(46 + name.len());
        bytes.put_u32_le(CENTRAL_DIR_HEADER_SIGNATURE);
        bytes.put_u16_le(VERSION_MADE_BY);
        bytes.put_u16_le(VERSION_NEEDED);
        bytes.put_u16_le(STREAMING_BIT_FLAG);
        bytes.put_u16_le(entry.compression_method);
        bytes.put_u16_le(entry.last_mod_time);
        bytes.put_u16_le(entry.last_mod_date);
        bytes.put_u32_le(entry.crc32);
        bytes.put_u32_le(entry.compressed_size);
        bytes.put_u32_le(entry.uncompressed_size);
        bytes.put_u16_le(name.len() as u16);
        bytes.put_u16_le(0); // extra field length
        bytes.put_u16_le(0); // file comment length
        bytes.put_u16_le(0); // disk number start
        bytes.put_u16_le(0); // internal attributes
        bytes.put_u32_le(0o100644 << 16); // external attributes: regular file, rw-r--r--
        bytes.put_u32_le(entry.offset);
        bytes.put_slice(name);
        write_record(writer, bytes).await
    }
}

/// End of central directory record
pub struct EndOfCentralDirectoryRecord {
    pub total_entries: u16,
    pub central_dir_size: u32,
    pub central_dir_offset: u32,
}

impl EndOfCentralDirectoryRecord {
    pub async fn write<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<u32> {
        let mut bytes = BytesMut::with_capacity(22);
        bytes.put_u32_le(END_OF_CENTRAL_DIR_SIGNATURE);
        bytes.put_u16_le(0); // this disk
        bytes.put_u16_le(0); // disk with central directory
        bytes.put_u16_le(self.total_entries);
        bytes.put_u16_le(self.total_entries);
        bytes.put_u32_le(self.central_dir_size);
        bytes.put_u32_le(self.central_dir_offset);
        bytes.put_u16_le(0); // comment length
        write_record(writer, bytes).await
    }
}
