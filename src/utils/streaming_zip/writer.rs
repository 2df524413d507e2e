use anyhow::{bail, Context, Result};
use async_compression::tokio::write::DeflateEncoder;
use crc32fast::Hasher;
use log::debug;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::constants::{ZIP32_LIMIT, ZIP32_MAX_ENTRIES};
use crate::utils::streaming_zip::formats::{
    CentralDirectoryHeader, CompressionMethod, DataDescriptor, EndOfCentralDirectoryRecord,
    FileOptions, LocalFileHeader, ZipEntry,
};
use crate::utils::streaming_zip::helpers::dos_time;

/// Streaming ZIP writer that creates ZIP archives directly to an output stream.
///
/// Nothing is ever rewritten: every entry is a local header with bit 3 set,
/// the (optionally deflated) data, and a data descriptor with the CRC and
/// sizes. The central directory and end record are written by [`finish`].
/// Archives are limited to the classic (non-ZIP64) format; crossing its
/// 4 GiB offset or 65535 entry limits is an error rather than a corrupt file.
///
/// [`finish`]: StreamingZipWriter::finish
pub struct StreamingZipWriter<W: AsyncWrite + Unpin> {
    writer: W,
    entries: Vec<ZipEntry>,
    offset: u64,
}

impl<W: AsyncWrite + Unpin> StreamingZipWriter<W> {
    /// Create a new streaming ZIP writer
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            entries: Vec::new(),
            offset: 0,
        }
    }

    /// Bytes written to the output so far
    pub fn bytes_written(&self) -> u64 {
        self.offset
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Start a new file entry in the ZIP
    pub async fn start_file(
        &mut self,
        name: &str,
        options: FileOptions,
    ) -> Result<StreamingFileWriter<'_, W>> {
        if self.entries.len() >= ZIP32_MAX_ENTRIES {
            bail!("Archive cannot hold more than {} entries", ZIP32_MAX_ENTRIES);
        }
        if name.len() > u16::MAX as usize {
            bail!("Entry name is too long ({} bytes)", name.len());
        }
        let entry_offset = self.zip32_offset()?;

        let compression_method = options.compression_method.code();
        let (last_mod_time, last_mod_date) = dos_time(options.last_modified);

        let header = LocalFileHeader {
            compression_method,
            last_mod_time,
            last_mod_date,
            file_name: name.as_bytes(),
        };
        self.offset += header.write(&mut self.writer).await? as u64;

        let encoder = match options.compression_method {
            CompressionMethod::Deflated => Some(DeflateEncoder::new(Vec::new())),
            CompressionMethod::Stored => None,
        };

        Ok(StreamingFileWriter {
            zip_writer: self,
            name: name.to_string(),
            offset: entry_offset,
            compression_method,
            last_mod_time,
            last_mod_date,
            crc32: Hasher::new(),
            uncompressed_size: 0,
            compressed_size: 0,
            encoder,
        })
    }

    /// Write the central directory and end record, returning the output
    pub async fn finish(mut self) -> Result<W> {
        let central_dir_offset = self.zip32_offset()?;

        for entry in &self.entries {
            let header = CentralDirectoryHeader { entry };
            self.offset += header.write(&mut self.writer).await? as u64;
        }

        let central_dir_size = self.offset - central_dir_offset as u64;
        let end_record = EndOfCentralDirectoryRecord {
            total_entries: self.entries.len() as u16,
            central_dir_size: zip32(central_dir_size, "central directory size")?,
            central_dir_offset,
        };
        self.offset += end_record.write(&mut self.writer).await? as u64;
        self.writer.flush().await?;

        debug!(
            "Finished ZIP archive: {} entries, {} bytes",
            self.entries.len(),
            self.offset
        );
        Ok(self.writer)
    }

    fn zip32_offset(&self) -> Result<u32> {
        zip32(self.offset, "archive offset")
    }

    async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data).await?;
        self.offset += data.len() as u64;
        Ok(())
    }
}

fn zip32(value: u64, what: &str) -> Result<u32> {
    if value > ZIP32_LIMIT {
        bail!("{} {} exceeds the ZIP32 limit", what, value);
    }
    Ok(value as u32)
}

/// Writer for a single file entry, created by [`StreamingZipWriter::start_file`].
///
/// The entry is only recorded in the central directory once [`finish`] has
/// written its data descriptor; dropping the writer early leaves it out.
///
/// [`finish`]: StreamingFileWriter::finish
pub struct StreamingFileWriter<'a, W: AsyncWrite + Unpin> {
    zip_writer: &'a mut StreamingZipWriter<W>,
    name: String,
    offset: u32,
    compression_method: u16,
    last_mod_time: u16,
    last_mod_date: u16,
    crc32: Hasher,
    uncompressed_size: u64,
    compressed_size: u64,
    encoder: Option<DeflateEncoder<Vec<u8>>>,
}

impl<W: AsyncWrite + Unpin> StreamingFileWriter<'_, W> {
    /// Write data to the file entry
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.crc32.update(data);
        self.uncompressed_size += data.len() as u64;

        match self.encoder.as_mut() {
            Some(encoder) => {
                encoder.write_all(data).await?;
                let compressed = std::mem::take(encoder.get_mut());
                self.emit(&compressed).await
            }
            None => self.emit(data).await,
        }
    }

    async fn emit(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.compressed_size += data.len() as u64;
        self.zip_writer.write_raw(data).await
    }

    /// Flush the compressor, write the data descriptor and record the entry
    pub async fn finish(mut self) -> Result<()> {
        if let Some(mut encoder) = self.encoder.take() {
            encoder
                .shutdown()
                .await
                .context("Failed to flush deflate stream")?;
            let tail = encoder.into_inner();
            self.emit(&tail).await?;
        }

        let crc32 = self.crc32.clone().finalize();
        let compressed_size = zip32(self.compressed_size, "compressed size")?;
        let uncompressed_size = zip32(self.uncompressed_size, "uncompressed size")?;

        let descriptor = DataDescriptor {
            crc32,
            compressed_size,
            uncompressed_size,
        };
        self.zip_writer.offset += descriptor.write(&mut self.zip_writer.writer).await? as u64;

        debug!(
            "Added {} to archive ({} -> {} bytes, crc {:08x})",
            self.name, uncompressed_size, compressed_size, crc32
        );

        self.zip_writer.entries.push(ZipEntry {
            name: self.name,
            compressed_size,
            uncompressed_size,
            crc32,
            offset: self.offset,
            compression_method: self.compression_method,
            last_mod_time: self.last_mod_time,
            last_mod_date: self.last_mod_date,
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    async fn build_archive(method: CompressionMethod, files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = StreamingZipWriter::new(Vec::new());
        for (name, data) in files {
            let options = FileOptions {
                compression_method: method,
                last_modified: None,
            };
            let mut file = zip.start_file(name, options).await.unwrap();
            // Split writes to exercise incremental CRC and compression
            for chunk in data.chunks(7) {
                file.write_all(chunk).await.unwrap();
            }
            file.finish().await.unwrap();
        }
        zip.finish().await.unwrap()
    }

    fn read_entries(bytes: Vec<u8>) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut contents = Vec::new();
                file.read_to_end(&mut contents).unwrap();
                (file.name().to_string(), contents)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_stored_entries_read_back() {
        let bytes = build_archive(
            CompressionMethod::Stored,
            &[("a.txt", &b"hello world"[..]), ("dir/b.bin", &[0u8, 1, 2, 3][..])],
        )
        .await;

        let entries = read_entries(bytes);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], ("a.txt".to_string(), b"hello world".to_vec()));
        assert_eq!(entries[1], ("dir/b.bin".to_string(), vec![0, 1, 2, 3]));
    }

    #[tokio::test]
    async fn test_deflated_entries_compress_and_read_back() {
        let text = "the quick brown fox jumps over the lazy dog ".repeat(200);
        let bytes = build_archive(CompressionMethod::Deflated, &[("fox.txt", text.as_bytes())]).await;

        assert!(bytes.len() < text.len());
        let entries = read_entries(bytes);
        assert_eq!(entries[0].1, text.as_bytes());
    }

    #[tokio::test]
    async fn test_empty_entry_and_utf8_name() {
        let bytes = build_archive(CompressionMethod::Deflated, &[("résumé.txt", &b""[..])]).await;
        let entries = read_entries(bytes);
        assert_eq!(entries, vec![("résumé.txt".to_string(), Vec::new())]);
    }

    #[tokio::test]
    async fn test_empty_archive_is_end_record_only() {
        let zip = StreamingZipWriter::new(Vec::new());
        let bytes = zip.finish().await.unwrap();
        assert_eq!(bytes.len(), 22);
        assert!(read_entries(bytes).is_empty());
    }

    #[tokio::test]
    async fn test_unfinished_entry_is_not_listed() {
        let mut zip = StreamingZipWriter::new(Vec::new());
        {
            let mut file = zip.start_file("dropped.txt", FileOptions::default()).await.unwrap();
            file.write_all(b"abandoned").await.unwrap();
        }
        assert_eq!(zip.entry_count(), 0);
    }

    #[test]
    fn test_zip32_limit() {
        assert_eq!(zip32(ZIP32_LIMIT, "size").unwrap(), u32::MAX);
        assert!(zip32(ZIP32_LIMIT + 1, "size").is_err());
    }
}
