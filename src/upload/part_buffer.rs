use bytes::BytesMut;

use crate::upload::part::Part;

/// Accumulates producer output until full-size parts are available.
///
/// The buffer also hands out part numbers: they start at 1 and increase by
/// one per emitted part, in the order the bytes arrived.
pub struct PartBuffer {
    buffer: BytesMut,
    part_size: usize,
    next_part_number: u32,
}

impl PartBuffer {
    /// Create a buffer emitting parts of exactly `part_size` bytes.
    ///
    /// A zero part size is bumped to one byte.
    pub fn new(part_size: usize) -> Self {
        let part_size = part_size.max(1);
        Self {
            buffer: BytesMut::with_capacity(part_size),
            part_size,
            next_part_number: 1,
        }
    }

    pub fn append(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Split off every complete part currently buffered, oldest bytes first.
    pub fn drain_full_parts(&mut self) -> Vec<Part> {
        let mut parts = Vec::with_capacity(self.buffer.len() / self.part_size);
        while self.buffer.len() >= self.part_size {
            let payload = self.buffer.split_to(self.part_size).freeze();
            parts.push(self.number(payload));
        }
        parts
    }

    /// Emit whatever is left as the final part. Called once after end of stream.
    pub fn flush_remainder(&mut self) -> Option<Part> {
        if self.buffer.is_empty() {
            return None;
        }
        let payload = self.buffer.split().freeze();
        Some(self.number(payload))
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn part_size(&self) -> usize {
        self.part_size
    }

    /// Number of parts emitted so far
    pub fn parts_emitted(&self) -> u32 {
        self.next_part_number - 1
    }

    fn number(&mut self, payload: bytes::Bytes) -> Part {
        let number = self.next_part_number;
        self.next_part_number += 1;
        Part { number, payload }
    }
}
