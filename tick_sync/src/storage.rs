//! Durable local storage for channel state.
//!
//! Each channel owns one entry, keyed by `Channel::storage_key`. The value is a
//! versioned JSON envelope around the channel state. Entries written by earlier
//! deployments as a bare `{ id: record }` map are still accepted (version 0).
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tick_common::{Result, SyncError};

use crate::store::ChannelState;

/// Current envelope version.
pub const STATE_VERSION: u32 = 1;

/// Key/value storage that outlives the process.
pub trait StateStorage: Send + Sync {
    /// Read the value stored under `key`, `None` if there is none.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn write(&self, key: &str, value: &str) -> Result<()>;
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Storage rooted at `dir`; the directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the entries.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl StateStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::Storage(format!("read {}: {}", key, e))),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| SyncError::Storage(format!("create {}: {}", self.dir.display(), e)))?;
        let target = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        let mut file = fs::File::create(&tmp)
            .map_err(|e| SyncError::Storage(format!("create {}: {}", tmp.display(), e)))?;
        file.write_all(value.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| SyncError::Storage(format!("write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &target)
            .map_err(|e| SyncError::Storage(format!("rename to {}: {}", target.display(), e)))
    }
}

/// In-process storage. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate an entry.
    pub fn insert(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl StateStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock()?.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.insert(key, value)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeRef<'a> {
    version: u32,
    saved_at: DateTime<Utc>,
    records: &'a ChannelState,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    records: ChannelState,
}

/// Serialize `state` into the current envelope.
pub fn encode_state(state: &ChannelState) -> Result<String> {
    let envelope = EnvelopeRef {
        version: STATE_VERSION,
        saved_at: Utc::now(),
        records: state,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Parse a stored entry written by this or any earlier version.
pub fn decode_state(text: &str) -> Result<ChannelState> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| SyncError::Storage(format!("stored state is not JSON: {}", e)))?;

    let is_envelope = value.get("version").is_some_and(Value::is_u64) && value.get("records").is_some();
    if is_envelope {
        let envelope: Envelope = serde_json::from_value(value)
            .map_err(|e| SyncError::Storage(format!("bad state envelope: {}", e)))?;
        if envelope.version > STATE_VERSION {
            return Err(SyncError::Storage(format!(
                "state version {} is newer than supported version {}",
                envelope.version, STATE_VERSION
            )));
        }
        return Ok(envelope.records);
    }

    serde_json::from_value(value)
        .map_err(|e| SyncError::Storage(format!("bad legacy state: {}", e)))
}
