//! In-memory ordered KV engine for prefdb
//!
//! Backs the store with a `BTreeMap` held in a process-global registry
//! keyed by path, so that closing a handle and reopening the same path
//! observes the same data, the way an on-disk engine would. The registry
//! also carries per-path fault state: injected faults make every data
//! operation fail with the injected message until [`MemoryEngine::repair`]
//! runs against the path, which is exactly the shape the store's
//! corruption-repair protocol expects.

use parking_lot::{Mutex, RwLock};
use prefdb_core::{BatchOp, Engine, EngineIterator, PrefDbError, Result, StoreConfig};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

struct Shared {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    /// Injected failure applied to every data operation until repaired
    fault: Mutex<Option<String>>,
    /// Injected failures consumed one per open attempt
    open_failures: Mutex<VecDeque<String>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            map: RwLock::new(BTreeMap::new()),
            fault: Mutex::new(None),
            open_failures: Mutex::new(VecDeque::new()),
        }
    }

    fn check(&self) -> Result<()> {
        match self.fault.lock().as_ref() {
            Some(message) => Err(classify(message)),
            None => Ok(()),
        }
    }
}

fn registry() -> &'static Mutex<HashMap<PathBuf, Arc<Shared>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Arc<Shared>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn shared_for(path: &Path) -> Arc<Shared> {
    registry()
        .lock()
        .entry(path.to_path_buf())
        .or_insert_with(|| Arc::new(Shared::new()))
        .clone()
}

/// Engine messages containing "Corruption" surface as the corruption
/// variant; everything else is a generic engine failure.
fn classify(message: &str) -> PrefDbError {
    if message.contains("Corruption") {
        PrefDbError::Corruption(message.to_string())
    } else {
        PrefDbError::Engine(message.to_string())
    }
}

/// Make every data operation against `path` fail with `message` until the
/// path is repaired.
pub fn inject_fault(path: &Path, message: &str) {
    *shared_for(path).fault.lock() = Some(message.to_string());
}

/// Make the next open attempt against `path` fail with `message`.
/// Queued failures are consumed one per attempt, in order.
pub fn inject_open_failure(path: &Path, message: &str) {
    shared_for(path)
        .open_failures
        .lock()
        .push_back(message.to_string());
}

/// Drop all state (data and faults) recorded for `path`.
pub fn purge(path: &Path) {
    registry().lock().remove(path);
}

pub struct MemoryEngine {
    shared: Arc<Shared>,
}

impl Engine for MemoryEngine {
    fn open(config: &StoreConfig) -> Result<Self> {
        let shared = shared_for(&config.path);
        if let Some(message) = shared.open_failures.lock().pop_front() {
            return Err(classify(&message));
        }
        Ok(Self { shared })
    }

    fn repair(config: &StoreConfig) -> Result<()> {
        let shared = shared_for(&config.path);
        *shared.fault.lock() = None;
        shared.open_failures.lock().clear();
        tracing::info!(path = %config.path.display(), "memory engine repaired");
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.shared.check()?;
        Ok(self.shared.map.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.shared.check()?;
        self.shared.map.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.shared.check()?;
        self.shared.map.write().remove(key);
        Ok(())
    }

    fn write(&self, batch: &[BatchOp]) -> Result<()> {
        self.shared.check()?;
        let mut map = self.shared.map.write();
        for op in batch {
            match op {
                BatchOp::Put { key, value } => {
                    map.insert(key.clone(), value.clone());
                }
                BatchOp::Delete { key } => {
                    map.remove(key);
                }
            }
        }
        Ok(())
    }

    fn iter(&self) -> Result<Box<dyn EngineIterator>> {
        self.shared.check()?;
        let entries: Vec<(Vec<u8>, Vec<u8>)> = self
            .shared
            .map
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Box::new(MemoryIterator { entries, pos: 0 }))
    }

    fn size_on_disk(&self) -> Result<u64> {
        self.shared.check()?;
        let map = self.shared.map.read();
        Ok(map.iter().map(|(k, v)| (k.len() + v.len()) as u64).sum())
    }

    fn property(&self, name: &str) -> Option<String> {
        match name {
            "prefdb.entries" => Some(self.shared.map.read().len().to_string()),
            "prefdb.approximate-size" => {
                let map = self.shared.map.read();
                let bytes: usize = map.iter().map(|(k, v)| k.len() + v.len()).sum();
                Some(bytes.to_string())
            }
            _ => None,
        }
    }
}

/// Snapshot iterator: owns a copy of the entries taken at creation
struct MemoryIterator {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    pos: usize,
}

impl EngineIterator for MemoryIterator {
    fn seek_to_first(&mut self) {
        self.pos = 0;
    }

    fn seek(&mut self, key: &[u8]) {
        self.pos = self.entries.partition_point(|(k, _)| k.as_slice() < key);
    }

    fn valid(&self) -> bool {
        self.pos < self.entries.len()
    }

    fn key(&self) -> &[u8] {
        &self.entries[self.pos].0
    }

    fn value(&self) -> &[u8] {
        &self.entries[self.pos].1
    }

    fn next(&mut self) {
        self.pos += 1;
    }
}
