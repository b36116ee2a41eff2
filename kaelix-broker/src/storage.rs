//! Message persistence collaborator.
//!
//! The broker persists durable messages that land in durable queues and
//! removes them once no queue holds them. On restart [`MessageStore::load`]
//! hands back the surviving messages for replay.

use crate::Result;
use bytes::BytesMut;
use kaelix_core::message::MessageId;
use kaelix_core::protocol::{MessageDecoder, MessageEncoder};
use kaelix_core::Message;
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Durable storage for messages.
pub trait MessageStore: Send + Sync + std::fmt::Debug {
    /// Persist a message.
    ///
    /// # Errors
    /// Returns an error when the message cannot be written.
    fn append(&self, message: &Message) -> Result<()>;

    /// Forget a message; unknown ids are ignored.
    ///
    /// # Errors
    /// Returns an error when the removal cannot be recorded.
    fn remove(&self, id: &MessageId) -> Result<()>;

    /// Surviving messages in append order.
    ///
    /// # Errors
    /// Returns an error when stored data cannot be read back.
    fn load(&self) -> Result<Vec<Message>>;
}

#[derive(Debug)]
struct LogState {
    encoder: MessageEncoder,
    log: BytesMut,
    removed: HashSet<MessageId>,
    records: usize,
}

/// Append-only in-memory record log with tombstones.
#[derive(Debug)]
pub struct MemoryMessageStore {
    state: Mutex<LogState>,
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMessageStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LogState {
                encoder: MessageEncoder::new(),
                log: BytesMut::new(),
                removed: HashSet::new(),
                records: 0,
            }),
        }
    }

    /// Bytes held by the log, tombstoned records included.
    #[must_use]
    pub fn log_size(&self) -> usize {
        self.state.lock().log.len()
    }

    /// Records appended and not yet compacted away.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.state.lock().records
    }

    /// Raw log contents.
    #[must_use]
    pub fn snapshot(&self) -> bytes::Bytes {
        bytes::Bytes::copy_from_slice(&self.state.lock().log)
    }

    /// Rewrite the log without removed messages.
    ///
    /// # Errors
    /// Returns an error when the log cannot be decoded or re-encoded.
    pub fn compact(&self) -> Result<()> {
        let survivors = self.load()?;
        let mut state = self.state.lock();
        let before = state.log.len();
        let mut log = BytesMut::with_capacity(before);
        for message in &survivors {
            log.extend_from_slice(&state.encoder.encode(message)?);
        }
        state.log = log;
        state.records = survivors.len();
        state.removed.clear();
        debug!(before, after = state.log.len(), records = state.records, "Compacted message log");
        Ok(())
    }
}

impl MessageStore for MemoryMessageStore {
    fn append(&self, message: &Message) -> Result<()> {
        let mut state = self.state.lock();
        let record = state.encoder.encode(message)?;
        state.log.extend_from_slice(&record);
        state.records += 1;
        Ok(())
    }

    fn remove(&self, id: &MessageId) -> Result<()> {
        self.state.lock().removed.insert(*id);
        Ok(())
    }

    fn load(&self) -> Result<Vec<Message>> {
        let (log, removed) = {
            let state = self.state.lock();
            (state.log.clone(), state.removed.clone())
        };

        let mut decoder = MessageDecoder::new();
        decoder.decode_stream(&log)?;
        if decoder.pending_bytes() > 0 {
            warn!(bytes = decoder.pending_bytes(), "Ignoring incomplete trailing record");
        }

        let mut messages = Vec::new();
        while let Some(message) = decoder.next_message() {
            if !removed.contains(&message.id) {
                messages.push(message);
            }
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn durable(body: &'static [u8]) -> Message {
        Message::builder().address("orders").body(Bytes::from_static(body)).durable(true).build().unwrap()
    }

    #[test]
    fn test_append_remove_load() {
        let store = MemoryMessageStore::new();
        let first = durable(b"1");
        let second = durable(b"2");
        first.properties.put_string("k", "v");
        store.append(&first).unwrap();
        store.append(&second).unwrap();
        store.remove(&second.id).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, first.id);
        assert_eq!(loaded[0].body, first.body);
        assert_eq!(loaded[0].properties.get_string("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_compact_drops_tombstoned_records() {
        let store = MemoryMessageStore::new();
        let keep = durable(b"keep");
        let gone = durable(b"gone");
        store.append(&keep).unwrap();
        store.append(&gone).unwrap();
        store.remove(&gone.id).unwrap();

        let before = store.log_size();
        store.compact().unwrap();
        assert!(store.log_size() < before);
        assert_eq!(store.record_count(), 1);
        assert_eq!(store.load().unwrap()[0].id, keep.id);
    }
}
