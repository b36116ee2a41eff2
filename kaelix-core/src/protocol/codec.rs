//! Message record encoding and streaming decoding.

use crate::message::Message;
use crate::protocol::record::{self, RecordHeader, PROTOCOL_MAGIC};
use crate::protocol::{ProtocolResult, RECORD_HEADER_SIZE};
use bytes::{Buf, Bytes, BytesMut};
use std::collections::VecDeque;

/// Message record encoder with buffer reuse.
#[derive(Debug)]
pub struct MessageEncoder {
    /// Reusable buffer for encoding operations
    buffer: BytesMut,
}

impl MessageEncoder {
    /// Create a new encoder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(8192)
    }

    /// Create an encoder with specified buffer capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buffer: BytesMut::with_capacity(capacity) }
    }

    /// Encode a single message record.
    ///
    /// # Errors
    /// Returns an error if the record exceeds the maximum size.
    pub fn encode(&mut self, message: &Message) -> ProtocolResult<Bytes> {
        self.buffer.clear();
        record::write_record(message, &mut self.buffer)?;
        Ok(self.buffer.split().freeze())
    }
}

impl Default for MessageEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Streaming record decoder with corruption recovery.
#[derive(Debug)]
pub struct MessageDecoder {
    /// Buffer for accumulating incomplete records
    buffer: BytesMut,

    /// Decoded messages awaiting retrieval
    queue: VecDeque<Message>,

    /// Size of the record at the front of the buffer, once its header is read
    expected_record_size: Option<usize>,

    /// Statistics for monitoring
    stats: DecoderStats,
}

/// Decoder statistics for monitoring and debugging.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DecoderStats {
    /// Total records successfully decoded
    pub records_decoded: u64,

    /// Total bytes processed
    pub bytes_processed: u64,

    /// Number of times a partial record was left waiting for more data
    pub incomplete_records: u64,

    /// Number of corrupted records skipped
    pub corrupted_records: u64,

    /// Current buffer size
    pub buffer_size: usize,

    /// Peak buffer size observed
    pub peak_buffer_size: usize,
}

impl MessageDecoder {
    /// Create a new decoder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(16384)
    }

    /// Create a decoder with specified buffer capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            queue: VecDeque::new(),
            expected_record_size: None,
            stats: DecoderStats::default(),
        }
    }

    /// Decode records from a chunk of a stream.
    ///
    /// Returns the number of complete records decoded; use
    /// [`MessageDecoder::next_message`] to retrieve them. Corrupted records
    /// are skipped by scanning forward to the next magic sequence.
    ///
    /// # Errors
    /// Returns an error for an unsupported version or an oversized record.
    pub fn decode_stream(&mut self, data: &[u8]) -> ProtocolResult<usize> {
        self.buffer.extend_from_slice(data);
        self.stats.bytes_processed += data.len() as u64;
        self.stats.peak_buffer_size = self.stats.peak_buffer_size.max(self.buffer.len());

        let mut decoded = 0;
        while self.buffer.len() >= RECORD_HEADER_SIZE {
            let expected = match self.expected_record_size {
                Some(size) => size,
                None => match RecordHeader::peek(&self.buffer) {
                    Ok(Some(header)) => {
                        self.expected_record_size = Some(header.record_size());
                        header.record_size()
                    },
                    Ok(None) => break,
                    Err(e) if e.is_corruption() => {
                        self.skip_corrupted();
                        continue;
                    },
                    Err(e) => {
                        self.stats.buffer_size = self.buffer.len();
                        return Err(e);
                    },
                },
            };

            if self.buffer.len() < expected {
                self.stats.incomplete_records += 1;
                break;
            }

            let data = self.buffer.split_to(expected).freeze();
            self.expected_record_size = None;
            match record::read_record(&data) {
                Ok(message) => {
                    self.queue.push_back(message);
                    self.stats.records_decoded += 1;
                    decoded += 1;
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping corrupted message record");
                    self.stats.corrupted_records += 1;
                    self.recover_from(&data);
                },
            }
        }

        self.stats.buffer_size = self.buffer.len();
        Ok(decoded)
    }

    /// Decode the first message from `data`.
    ///
    /// # Errors
    /// See [`MessageDecoder::decode_stream`].
    pub fn decode(&mut self, data: &[u8]) -> ProtocolResult<Option<Message>> {
        self.decode_stream(data)?;
        Ok(self.next_message())
    }

    /// Get the next decoded message from the queue.
    #[must_use]
    pub fn next_message(&mut self) -> Option<Message> {
        self.queue.pop_front()
    }

    /// Check if there are messages available in the queue.
    #[must_use]
    pub fn has_messages(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Get decoder statistics.
    #[must_use]
    pub const fn stats(&self) -> &DecoderStats {
        &self.stats
    }

    /// Bytes buffered but not yet decoded.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Reset the decoder to initial state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.queue.clear();
        self.expected_record_size = None;
        self.stats = DecoderStats::default();
    }

    /// Drop the corrupted header at the front of the buffer.
    fn skip_corrupted(&mut self) {
        tracing::warn!("Skipping bytes with an invalid record header");
        self.stats.corrupted_records += 1;
        let skip = find_magic(&self.buffer[1..]).map_or(self.buffer.len(), |i| i + 1);
        self.buffer.advance(skip);
    }

    /// Resume after a corrupted record at the next magic inside it, if any.
    fn recover_from(&mut self, record: &Bytes) {
        if let Some(i) = find_magic(&record[1..]) {
            let mut rest = BytesMut::from(&record[i + 1..]);
            rest.extend_from_slice(&self.buffer);
            self.buffer = rest;
        }
    }
}

fn find_magic(data: &[u8]) -> Option<usize> {
    data.windows(PROTOCOL_MAGIC.len()).position(|w| w == PROTOCOL_MAGIC)
}

impl Default for MessageDecoder {
    fn default() -> Self {
        Self::new()
    }
}
