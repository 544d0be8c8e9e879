//! In-memory storage for `memory://store/key` locations.
//!
//! Stores are looked up by name in a process-wide registry so that a source
//! and a target built separately see the same objects.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use bytes::Bytes;

use super::Storage;
use crate::error::{StorageError, StorageResult};
use crate::location::Location;

type Objects = BTreeMap<String, Bytes>;

fn registry() -> &'static Mutex<HashMap<String, MemoryStorage>> {
    static STORES: OnceLock<Mutex<HashMap<String, MemoryStorage>>> = OnceLock::new();
    STORES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Thread-safe in-memory object map.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    name: String,
    data: Arc<Mutex<Objects>>,
}

impl MemoryStorage {
    /// The shared store registered under `name`, created on first use.
    pub fn named(name: &str) -> Self {
        let mut stores = registry().lock().unwrap_or_else(|e| e.into_inner());
        stores
            .entry(name.to_string())
            .or_insert_with(|| MemoryStorage {
                name: name.to_string(),
                data: Arc::new(Mutex::new(BTreeMap::new())),
            })
            .clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pre-populate an object.
    pub fn insert(&self, key: &str, bytes: impl Into<Bytes>) {
        self.objects().insert(key.to_string(), bytes.into());
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects().is_empty()
    }

    pub fn clear(&self) {
        self.objects().clear();
    }

    fn objects(&self) -> MutexGuard<'_, Objects> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn key<'a>(&self, loc: &'a Location) -> StorageResult<&'a str> {
        match loc {
            Location::Memory { store, key } if *store == self.name => Ok(key),
            other => Err(StorageError::WrongLocation {
                adapter: "MemoryStorage",
                location: other.to_string(),
            }),
        }
    }
}

impl Storage for MemoryStorage {
    fn read_all(&self, loc: &Location) -> StorageResult<Bytes> {
        let key = self.key(loc)?;
        self.get(key)
            .ok_or_else(|| StorageError::NotFound(loc.to_string()))
    }

    fn read_range(&self, loc: &Location, offset: u64, len: usize) -> StorageResult<Bytes> {
        let bytes = self.read_all(loc)?;
        let start = (offset as usize).min(bytes.len());
        let end = start.saturating_add(len).min(bytes.len());
        Ok(bytes.slice(start..end))
    }

    fn write(&self, loc: &Location, bytes: Bytes) -> StorageResult<()> {
        let key = self.key(loc)?;
        self.objects().insert(key.to_string(), bytes);
        Ok(())
    }

    fn delete(&self, loc: &Location) -> StorageResult<()> {
        let key = self.key(loc)?;
        self.objects().remove(key);
        Ok(())
    }

    fn list(&self, prefix: &Location) -> StorageResult<Vec<Location>> {
        let prefix_key = self.key(prefix)?;
        let dir = format!("{}/", prefix_key.trim_end_matches('/'));
        Ok(self
            .objects()
            .keys()
            .filter(|k| k.as_str() == prefix_key || k.starts_with(&dir))
            .map(|k| Location::Memory {
                store: self.name.clone(),
                key: k.clone(),
            })
            .collect())
    }

    fn size(&self, loc: &Location) -> StorageResult<u64> {
        Ok(self.read_all(loc)?.len() as u64)
    }
}
