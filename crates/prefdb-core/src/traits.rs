use crate::config::StoreConfig;
use crate::error::{PrefDbError, Result};

/// A buffered mutation destined for an atomic batch write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOp {
    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

/// Forward iterator over an engine snapshot, ordered by key bytes
///
/// `key` and `value` may only be called while `valid` returns true.
/// Iterators hold a snapshot taken at creation; writes issued after
/// `Engine::iter` are not visible through it.
pub trait EngineIterator: Send {
    fn seek_to_first(&mut self);

    /// Position at the first entry whose key is >= `key`
    fn seek(&mut self, key: &[u8]);

    fn valid(&self) -> bool;

    fn key(&self) -> &[u8];

    fn value(&self) -> &[u8];

    fn next(&mut self);
}

/// Ordered byte-string KV engine underneath the typed store
///
/// The engine knows nothing about value typing, cursors, editors or the
/// repair protocol; it stores and retrieves opaque byte strings. Failures
/// it reports as [`PrefDbError::Corruption`] (structural damage, message
/// preserved verbatim) or [`PrefDbError::Engine`] (anything else) feed the
/// store's repair decision.
pub trait Engine: Send + Sync + Sized + 'static {
    /// Open (creating if missing) the engine at `config.path`
    fn open(config: &StoreConfig) -> Result<Self>;

    /// Best-effort offline repair of the data at `config.path`
    ///
    /// Called without any live handle to the same path.
    fn repair(config: &StoreConfig) -> Result<()>;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key; deleting an absent key is a no-op
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Apply a batch of mutations atomically: either every op becomes
    /// visible or none does
    fn write(&self, batch: &[BatchOp]) -> Result<()>;

    fn iter(&self) -> Result<Box<dyn EngineIterator>>;

    /// Bytes occupied on disk (or the in-memory equivalent)
    fn size_on_disk(&self) -> Result<u64>;

    /// Engine-specific diagnostic property, `None` if unrecognized
    fn property(&self, name: &str) -> Option<String>;
}

/// Observer for store-level failures
///
/// Installed through `PrefDb::set_error_handler`. `on_fatal_error` may
/// return true to swallow an unrecoverable engine error, in which case the
/// failing operation returns its fallback value instead of an `Err`.
pub trait ErrorHandler: Send + Sync {
    fn on_fatal_error(&self, error: &PrefDbError) -> bool {
        let _ = error;
        false
    }

    /// Non-fatal progress reports (repair started/finished, salvage steps)
    fn on_error(&self, message: &str, error: Option<&PrefDbError>) {
        match error {
            Some(err) => tracing::error!(error = %err, "{message}"),
            None => tracing::info!("{message}"),
        }
    }
}
