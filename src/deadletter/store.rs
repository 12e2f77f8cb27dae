use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use prost::Message;
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{error, info, warn};

use super::{DeadLetterEntry, DeadLetterSink};

const NEXT_SEQ_KEY: &[u8] = b"next_seq";

#[derive(Error, Debug)]
pub enum DeadLetterStoreError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Protobuf decode error: {0}")]
    ProtobufDecode(#[from] prost::DecodeError),

    #[error("Invalid sequence key")]
    InvalidSequence,
}

pub type Result<T> = std::result::Result<T, DeadLetterStoreError>;

/// Persisted form of a [`DeadLetterEntry`]
#[derive(Clone, PartialEq, Message)]
pub struct DeadLetterRecord {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, optional, tag = "2")]
    pub message_type: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub request_id: Option<String>,
    /// JSON-encoded payload
    #[prost(bytes = "vec", tag = "4")]
    pub payload: Vec<u8>,
    #[prost(string, tag = "5")]
    pub reason_code: String,
    #[prost(string, tag = "6")]
    pub reason: String,
    #[prost(message, optional, tag = "7")]
    pub recorded_at: Option<prost_types::Timestamp>,
}

impl From<&DeadLetterEntry> for DeadLetterRecord {
    fn from(entry: &DeadLetterEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            message_type: entry.message_type.clone(),
            request_id: entry.request_id.clone(),
            payload: serde_json::to_vec(&entry.payload).unwrap_or_default(),
            reason_code: entry.reason.code().to_string(),
            reason: entry.reason.to_string(),
            recorded_at: Some(prost_types::Timestamp {
                seconds: entry.recorded_at.unix_timestamp(),
                nanos: entry.recorded_at.nanosecond() as i32,
            }),
        }
    }
}

impl DeadLetterRecord {
    pub fn payload_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

/// JSON shape of a stored record, used by the CLI dump and the HTTP listing
#[derive(Debug, Serialize)]
pub struct DeadLetterView {
    pub seq: u64,
    pub id: String,
    pub message_type: Option<String>,
    pub request_id: Option<String>,
    pub reason_code: String,
    pub reason: String,
    pub recorded_at_unix: Option<i64>,
    pub payload: serde_json::Value,
}

impl From<(u64, DeadLetterRecord)> for DeadLetterView {
    fn from((seq, record): (u64, DeadLetterRecord)) -> Self {
        Self {
            seq,
            payload: record.payload_json(),
            recorded_at_unix: record.recorded_at.map(|ts| ts.seconds),
            id: record.id,
            message_type: record.message_type,
            request_id: record.request_id,
            reason_code: record.reason_code,
            reason: record.reason,
        }
    }
}

/// Durable dead-letter log backed by Fjall
///
/// Layout:
/// - `dead_letters` partition: u64 (big-endian) → DeadLetterRecord (protobuf)
/// - `metadata` partition: "next_seq" → u64
///
/// Appends are serialized so the stored counter only moves forward. On open
/// the counter is also checked against the highest stored key.
pub struct FjallDeadLetterStore {
    keyspace: Keyspace,
    entries: PartitionHandle,
    metadata: PartitionHandle,
    next_seq: Mutex<u64>,
}

impl FjallDeadLetterStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening dead-letter store at: {}", path.as_ref().display());

        let keyspace = Config::new(path).open()?;
        let entries = keyspace.open_partition("dead_letters", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        let stored = match metadata.get(NEXT_SEQ_KEY)? {
            Some(bytes) => decode_seq(&bytes)?,
            None => 0,
        };
        let after_last = match entries.last_key_value()? {
            Some((key, _)) => decode_seq(&key)? + 1,
            None => 0,
        };
        if after_last > stored {
            warn!(stored, recovered = after_last, "Dead-letter counter behind stored entries");
        }

        Ok(Self {
            keyspace,
            entries,
            metadata,
            next_seq: Mutex::new(stored.max(after_last)),
        })
    }

    /// Persist an entry, returning its sequence number
    pub fn append(&self, entry: &DeadLetterEntry) -> Result<u64> {
        let record = DeadLetterRecord::from(entry).encode_to_vec();

        let mut next_seq = self
            .next_seq
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let seq = *next_seq;

        self.entries.insert(seq.to_be_bytes(), record)?;
        self.metadata.insert(NEXT_SEQ_KEY, (seq + 1).to_be_bytes())?;
        *next_seq = seq + 1;

        Ok(seq)
    }

    pub fn get(&self, seq: u64) -> Result<Option<DeadLetterRecord>> {
        match self.entries.get(seq.to_be_bytes())? {
            Some(bytes) => Ok(Some(DeadLetterRecord::decode(&*bytes)?)),
            None => Ok(None),
        }
    }

    /// Oldest-first listing for operator inspection
    pub fn list(&self, limit: usize) -> Result<Vec<(u64, DeadLetterRecord)>> {
        let mut results = Vec::new();

        for item in self.entries.iter().take(limit) {
            let (key, value) = item?;
            let seq = decode_seq(&key)?;
            results.push((seq, DeadLetterRecord::decode(&*value)?));
        }

        Ok(results)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.entries.len()?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.entries.is_empty()?)
    }

    pub fn flush(&self) -> Result<()> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }
}

fn decode_seq(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| DeadLetterStoreError::InvalidSequence)?;
    Ok(u64::from_be_bytes(raw))
}

impl DeadLetterSink for FjallDeadLetterStore {
    fn record(&self, entry: &DeadLetterEntry) {
        warn!(
            entry_id = %entry.id,
            reason_code = entry.reason.code(),
            reason = %entry.reason,
            request_id = entry.request_id.as_deref().unwrap_or("-"),
            "Dead letter received"
        );

        match self.append(entry) {
            Ok(seq) => info!(seq, entry_id = %entry.id, "Dead letter persisted"),
            Err(e) => error!(entry_id = %entry.id, error = %e, "Failed to persist dead letter"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deadletter::DeadLetterReason;
    use serde_json::json;
    use tempfile::TempDir;

    fn entry(request_id: &str) -> DeadLetterEntry {
        let mut entry = DeadLetterEntry::new(
            json!({"request_id": request_id}),
            DeadLetterReason::ReplyUndeliverable("destination 'r' is full".into()),
        );
        entry.request_id = Some(request_id.to_string());
        entry
    }

    #[test]
    fn test_append_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let store = FjallDeadLetterStore::open(temp_dir.path()).unwrap();

        let seq = store.append(&entry("r-1")).unwrap();
        assert_eq!(seq, 0);

        let record = store.get(seq).unwrap().unwrap();
        assert_eq!(record.request_id.as_deref(), Some("r-1"));
        assert_eq!(record.reason_code, "REPLY_UNDELIVERABLE");
        assert!(record.reason.starts_with("completed but reply undeliverable"));
        assert_eq!(record.payload_json()["request_id"], "r-1");
        assert!(record.recorded_at.is_some());
    }

    #[test]
    fn test_list_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let store = FjallDeadLetterStore::open(temp_dir.path()).unwrap();

        for i in 0..3 {
            store.append(&entry(&format!("r-{i}"))).unwrap();
        }

        let listed = store.list(10).unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].0, 0);
        assert_eq!(listed[2].1.request_id.as_deref(), Some("r-2"));
        assert_eq!(store.list(2).unwrap().len(), 2);
        assert_eq!(store.len().unwrap(), 3);
    }

    #[test]
    fn test_sequence_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();

        {
            let store = FjallDeadLetterStore::open(temp_dir.path()).unwrap();
            store.append(&entry("a")).unwrap();
            store.append(&entry("b")).unwrap();
            store.flush().unwrap();
        }

        let store = FjallDeadLetterStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.append(&entry("c")).unwrap(), 2);
    }

    #[test]
    fn test_concurrent_appends_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();

        {
            let store = std::sync::Arc::new(FjallDeadLetterStore::open(temp_dir.path()).unwrap());
            let handles: Vec<_> = (0..8)
                .map(|t| {
                    let store = store.clone();
                    std::thread::spawn(move || {
                        for i in 0..20 {
                            store.append(&entry(&format!("t{t}-{i}"))).unwrap();
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
            assert_eq!(store.len().unwrap(), 160);
            store.flush().unwrap();
        }

        let store = FjallDeadLetterStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.append(&entry("after-reopen")).unwrap(), 160);
        assert_eq!(store.len().unwrap(), 161);
    }

    #[test]
    fn test_counter_recovered_from_entries() {
        let temp_dir = TempDir::new().unwrap();

        {
            let store = FjallDeadLetterStore::open(temp_dir.path()).unwrap();
            for i in 0..3 {
                store.append(&entry(&format!("r-{i}"))).unwrap();
            }
            // Simulate a counter that fell behind the stored entries
            store.metadata.insert(NEXT_SEQ_KEY, 1u64.to_be_bytes()).unwrap();
            store.flush().unwrap();
        }

        let store = FjallDeadLetterStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.append(&entry("r-3")).unwrap(), 3);
        assert_eq!(store.get(1).unwrap().unwrap().request_id.as_deref(), Some("r-1"));
    }

    #[test]
    fn test_sink_persists() {
        let temp_dir = TempDir::new().unwrap();
        let store = FjallDeadLetterStore::open(temp_dir.path()).unwrap();

        store.receive(Some(&entry("sink")));
        store.receive(None);

        assert_eq!(store.len().unwrap(), 1);
    }
}
