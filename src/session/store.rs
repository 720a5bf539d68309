// src/session/store.rs

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TimerError, TimerResult};

pub const CLIPS: &str = "clips";
pub const SETTINGS: &str = "settings";

/// Auto-assigned integer keys (`clips`) or names (`settings`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordKey {
    Int(u64),
    Name(String),
}

impl From<&str> for RecordKey {
    fn from(name: &str) -> Self {
        RecordKey::Name(name.to_string())
    }
}

/// Key-value blob store, one per mode. Records are JSON values.
pub trait Store {
    /// Writes `record` under `key`, or under a fresh integer key when `key` is `None`.
    fn put(&mut self, collection: &str, key: Option<RecordKey>, record: Value) -> TimerResult<RecordKey>;
    fn get(&self, collection: &str, key: &RecordKey) -> TimerResult<Option<Value>>;
    /// Every record of `collection`, in key order.
    fn get_all(&self, collection: &str) -> TimerResult<Vec<(RecordKey, Value)>>;
    fn delete(&mut self, collection: &str, key: &RecordKey) -> TimerResult<()>;
    fn clear(&mut self, collection: &str) -> TimerResult<()>;

    /// Clears `collection` and inserts `records` under fresh integer keys, in order.
    fn replace_all(&mut self, collection: &str, records: Vec<Value>) -> TimerResult<Vec<RecordKey>> {
        self.clear(collection)?;
        records
            .into_iter()
            .map(|record| self.put(collection, None, record))
            .collect()
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Collection {
    /// Never reused, not even after `clear`.
    next_key: u64,
    records: Vec<StoredRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    key: RecordKey,
    value: Value,
}

impl Collection {
    fn position(&self, key: &RecordKey) -> Result<usize, usize> {
        self.records.binary_search_by(|r| r.key.cmp(key))
    }

    fn put(&mut self, key: Option<RecordKey>, value: Value) -> RecordKey {
        let key = match key {
            Some(k) => {
                if let RecordKey::Int(n) = k {
                    self.next_key = self.next_key.max(n);
                }
                k
            }
            None => {
                self.next_key += 1;
                RecordKey::Int(self.next_key)
            }
        };
        match self.position(&key) {
            Ok(i) => self.records[i].value = value,
            Err(i) => self.records.insert(
                i,
                StoredRecord {
                    key: key.clone(),
                    value,
                },
            ),
        }
        key
    }
}

/// In-process store; contents die with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: BTreeMap<String, Collection>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn put(&mut self, collection: &str, key: Option<RecordKey>, record: Value) -> TimerResult<RecordKey> {
        Ok(self
            .collections
            .entry(collection.to_string())
            .or_default()
            .put(key, record))
    }

    fn get(&self, collection: &str, key: &RecordKey) -> TimerResult<Option<Value>> {
        Ok(self.collections.get(collection).and_then(|c| {
            c.position(key)
                .ok()
                .map(|i| c.records[i].value.clone())
        }))
    }

    fn get_all(&self, collection: &str) -> TimerResult<Vec<(RecordKey, Value)>> {
        Ok(self
            .collections
            .get(collection)
            .map(|c| {
                c.records
                    .iter()
                    .map(|r| (r.key.clone(), r.value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn delete(&mut self, collection: &str, key: &RecordKey) -> TimerResult<()> {
        if let Some(c) = self.collections.get_mut(collection) {
            if let Ok(i) = c.position(key) {
                c.records.remove(i);
            }
        }
        Ok(())
    }

    fn clear(&mut self, collection: &str) -> TimerResult<()> {
        if let Some(c) = self.collections.get_mut(collection) {
            c.records.clear();
        }
        Ok(())
    }
}

/// One pretty-printed JSON document per mode, rewritten after every mutation.
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    /// Opens (or starts) the document at `path`. Parent directories are created.
    pub fn open(path: impl Into<PathBuf>) -> TimerResult<Self> {
        let path = path.into();
        let inner = if path.exists() {
            let reader = BufReader::new(File::open(&path).map_err(storage)?);
            let collections = serde_json::from_reader(reader).map_err(storage)?;
            MemoryStore { collections }
        } else {
            MemoryStore::new()
        };
        log::debug!("store {:?} opened", path);
        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes a sibling temp file and renames it over the document, so a crash
    /// mid-write leaves the previous version intact.
    fn flush(&self) -> TimerResult<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(storage)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp).map_err(storage)?);
            serde_json::to_writer_pretty(&mut writer, &self.inner.collections).map_err(storage)?;
            writer.flush().map_err(storage)?;
            writer.get_ref().sync_all().map_err(storage)?;
        }
        std::fs::rename(&tmp, &self.path).map_err(storage)
    }
}

impl Store for JsonFileStore {
    fn put(&mut self, collection: &str, key: Option<RecordKey>, record: Value) -> TimerResult<RecordKey> {
        let key = self.inner.put(collection, key, record)?;
        self.flush()?;
        Ok(key)
    }

    fn get(&self, collection: &str, key: &RecordKey) -> TimerResult<Option<Value>> {
        self.inner.get(collection, key)
    }

    fn get_all(&self, collection: &str) -> TimerResult<Vec<(RecordKey, Value)>> {
        self.inner.get_all(collection)
    }

    fn delete(&mut self, collection: &str, key: &RecordKey) -> TimerResult<()> {
        self.inner.delete(collection, key)?;
        self.flush()
    }

    fn clear(&mut self, collection: &str) -> TimerResult<()> {
        self.inner.clear(collection)?;
        self.flush()
    }

    fn replace_all(&mut self, collection: &str, records: Vec<Value>) -> TimerResult<Vec<RecordKey>> {
        let keys = self.inner.replace_all(collection, records)?;
        self.flush()?;
        Ok(keys)
    }
}

fn storage(e: impl std::fmt::Display) -> TimerError {
    TimerError::Storage(e.to_string())
}
