use crate::batch::PendingBatch;
use crate::codec;
use crate::cursor::{Cursor, CursorSlot};
use parking_lot::{Condvar, Mutex, RwLock};
use prefdb_core::{BatchOp, Engine, EngineIterator, ErrorHandler, PrefDbError, Result, StoreConfig};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Engine error messages eligible for automatic repair, matched by
/// substring against the raw engine text.
pub const REPAIRABLE_SIGNATURES: [&str; 2] = [
    "Corruption: not an sstable (bad magic number)",
    ".ldb: No such file or directory",
];

/// Transient open failure signature: retried with a bounded backoff
/// before falling through to the salvage path.
const TRANSIENT_OPEN_SIGNATURE: &str = "Try again";

struct EditState {
    editing: bool,
    owner: Option<ThreadId>,
    batch: PendingBatch,
}

/// Single blocking permit serializing editors across threads
struct EditPermit {
    taken: Mutex<bool>,
    available: Condvar,
}

impl EditPermit {
    fn new() -> Self {
        Self {
            taken: Mutex::new(false),
            available: Condvar::new(),
        }
    }

    fn acquire(&self) {
        let mut taken = self.taken.lock();
        while *taken {
            self.available.wait(&mut taken);
        }
        *taken = true;
    }

    fn release(&self) {
        let mut taken = self.taken.lock();
        *taken = false;
        self.available.notify_one();
    }
}

/// Typed preference store over an ordered byte-string engine
///
/// All methods take `&self`; share the store across threads with an
/// `Arc`. Reads and writes go through a reader-writer gate around the
/// engine handle: normal operations hold it shared, while reopen, repair
/// and close hold it exclusively, so an operation racing a reopen blocks
/// until the new handle is installed instead of observing a dead one.
pub struct PrefDb<E: Engine> {
    config: StoreConfig,
    gate: RwLock<Option<E>>,
    closed: AtomicBool,
    repair_attempted: AtomicBool,
    edit: Mutex<EditState>,
    edit_permit: Option<EditPermit>,
    cursors: Mutex<Vec<Weak<CursorSlot>>>,
    handler: RwLock<Option<Arc<dyn ErrorHandler>>>,
}

impl<E: Engine> PrefDb<E> {
    /// Open (creating if missing) the store described by `config`
    ///
    /// Transient engine failures are retried on an interval until the
    /// configured budget runs out; a persistent failure is answered with
    /// one offline repair attempt before giving up.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let engine = Self::open_engine(&config)?;
        info!(path = %config.path.display(), "opened preference store");
        Ok(Self {
            edit_permit: config.thread_safe.then(EditPermit::new),
            config,
            gate: RwLock::new(Some(engine)),
            closed: AtomicBool::new(false),
            repair_attempted: AtomicBool::new(false),
            edit: Mutex::new(EditState {
                editing: false,
                owner: None,
                batch: PendingBatch::default(),
            }),
            cursors: Mutex::new(Vec::new()),
            handler: RwLock::new(None),
        })
    }

    fn open_engine(config: &StoreConfig) -> Result<E> {
        let deadline = Instant::now() + Duration::from_millis(config.open_retry_max_wait_ms);
        let first_error = loop {
            match E::open(config) {
                Ok(engine) => return Ok(engine),
                Err(err) => {
                    let transient = err
                        .engine_message()
                        .is_some_and(|msg| msg.contains(TRANSIENT_OPEN_SIGNATURE));
                    if transient && Instant::now() < deadline {
                        thread::sleep(Duration::from_millis(config.open_retry_interval_ms));
                        continue;
                    }
                    break err;
                }
            }
        };
        warn!(error = %first_error, "open failed, attempting repair");
        match E::repair(config).and_then(|_| E::open(config)) {
            Ok(engine) => Ok(engine),
            Err(err) => Err(PrefDbError::ResourceAllocation(format!(
                "unable to open store at {}: {err} (initial error: {first_error})",
                config.path.display()
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Install (or clear) the failure observer
    pub fn set_error_handler(&self, handler: Option<Arc<dyn ErrorHandler>>) {
        *self.handler.write() = handler;
    }

    // ---- gate plumbing -------------------------------------------------

    fn with_engine<T>(&self, op: impl FnOnce(&E) -> Result<T>) -> Result<T> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PrefDbError::Closed);
        }
        let gate = self.gate.read();
        match gate.as_ref() {
            Some(engine) => op(engine),
            None => Err(PrefDbError::Closed),
        }
    }

    /// Run an engine operation; on an engine-class failure accepted by the
    /// repair protocol, retry the operation exactly once.
    fn run_raw<T>(&self, op: impl Fn(&E) -> Result<T>) -> Result<T> {
        let err = match self.with_engine(|e| op(e)) {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if err.is_engine_class() && self.repair(&err)? {
            return self.with_engine(|e| op(e));
        }
        Err(err)
    }

    /// Like `run_raw`, but an unrecoverable engine failure is offered to
    /// the installed handler; if the handler claims it, the operation
    /// resolves to `fallback` instead of an error.
    fn run<T>(
        &self,
        fallback: impl FnOnce() -> Result<T>,
        op: impl Fn(&E) -> Result<T>,
    ) -> Result<T> {
        match self.run_raw(op) {
            Ok(value) => Ok(value),
            Err(err) if err.is_engine_class() => {
                if self.handled(&err) {
                    self.report("engine error suppressed by handler", Some(&err));
                    fallback()
                } else {
                    Err(err)
                }
            }
            Err(err) => Err(err),
        }
    }

    fn handled(&self, err: &PrefDbError) -> bool {
        self.handler
            .read()
            .as_ref()
            .map(|h| h.on_fatal_error(err))
            .unwrap_or(false)
    }

    fn report(&self, message: &str, error: Option<&PrefDbError>) {
        match self.handler.read().as_ref() {
            Some(handler) => handler.on_error(message, error),
            None => match error {
                Some(err) => tracing::error!(error = %err, "{message}"),
                None => info!("{message}"),
            },
        }
    }

    // ---- lifecycle -----------------------------------------------------

    /// Tear down and reopen the engine handle
    ///
    /// Live cursors are force-released first; operations arriving while
    /// the handle is down block on the gate and proceed against the new
    /// handle.
    pub fn flush(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PrefDbError::Closed);
        }
        let mut gate = self.gate.write();
        self.force_release_cursors();
        if gate.take().is_none() {
            return Err(PrefDbError::Closed);
        }
        match Self::open_engine(&self.config) {
            Ok(engine) => {
                *gate = Some(engine);
                Ok(())
            }
            Err(err) => {
                self.closed.store(true, Ordering::Release);
                self.report("reopen failed, store is now closed", Some(&err));
                Err(err)
            }
        }
    }

    /// Attempt automatic repair in response to an engine failure
    ///
    /// Returns `Ok(true)` when the store was repaired and reopened, in
    /// which case the caller should retry the failed operation once.
    /// Returns `Ok(false)` for unrecognized messages and for any call
    /// after the first accepted one: repair runs at most once per store
    /// instance. Non-engine errors are rejected outright.
    pub fn repair(&self, error: &PrefDbError) -> Result<bool> {
        let message = match error.engine_message() {
            Some(message) => message.to_string(),
            None => {
                return Err(PrefDbError::InvalidArgument(format!(
                    "not a storage engine error: {error}"
                )))
            }
        };
        if !REPAIRABLE_SIGNATURES
            .iter()
            .any(|sig| message.contains(sig))
        {
            return Ok(false);
        }
        if self.repair_attempted.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(PrefDbError::Closed);
        }
        self.report(&format!("repairing store, cause: {message}"), Some(error));
        let started = Instant::now();
        {
            let mut gate = self.gate.write();
            self.force_release_cursors();
            gate.take();
            match E::repair(&self.config).and_then(|_| Self::open_engine(&self.config)) {
                Ok(engine) => *gate = Some(engine),
                Err(err) => {
                    self.closed.store(true, Ordering::Release);
                    self.report("repair failed, store is now closed", Some(&err));
                    return Err(err);
                }
            }
        }
        self.report(
            &format!("repair finished in {}ms", started.elapsed().as_millis()),
            None,
        );
        Ok(true)
    }

    /// Close the store; idempotent
    ///
    /// Pending edits are discarded, live cursors are force-released and
    /// every subsequent operation fails fast.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        {
            let mut edit = self.edit.lock();
            edit.batch.clear();
            edit.editing = false;
            edit.owner = None;
        }
        if let Some(permit) = &self.edit_permit {
            // wake any thread parked in begin_edit; it will observe the
            // closed flag and bail out
            permit.release();
        }
        let mut gate = self.gate.write();
        self.force_release_cursors();
        gate.take();
        info!(path = %self.config.path.display(), "closed preference store");
        Ok(())
    }

    fn force_release_cursors(&self) {
        let mut cursors = self.cursors.lock();
        for slot in cursors.drain(..) {
            if let Some(slot) = slot.upgrade() {
                slot.lock().take();
            }
        }
    }

    fn register_cursor(&self, slot: &Arc<CursorSlot>) {
        let mut cursors = self.cursors.lock();
        cursors.retain(|weak| weak.strong_count() > 0);
        cursors.push(Arc::downgrade(slot));
    }

    // ---- editor --------------------------------------------------------

    /// Start buffering writes into an atomic batch
    ///
    /// With `thread_safe` enabled, a second thread blocks here until the
    /// current editor commits; the editing thread itself gets a
    /// reentrancy error instead of deadlocking.
    pub fn begin_edit(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PrefDbError::Closed);
        }
        let current = thread::current().id();
        {
            let edit = self.edit.lock();
            if edit.editing && edit.owner == Some(current) {
                return Err(PrefDbError::Reentrancy);
            }
        }
        if let Some(permit) = &self.edit_permit {
            permit.acquire();
        }
        if self.closed.load(Ordering::Acquire) {
            if let Some(permit) = &self.edit_permit {
                permit.release();
            }
            return Err(PrefDbError::Closed);
        }
        let mut edit = self.edit.lock();
        if edit.editing {
            // only reachable without the permit
            return Err(PrefDbError::Reentrancy);
        }
        edit.editing = true;
        edit.owner = Some(current);
        Ok(())
    }

    /// Apply the buffered batch atomically and end the edit
    ///
    /// Returns `Ok(true)` when the batch is durably applied (or there was
    /// nothing to commit) and `Ok(false)` when an installed handler
    /// swallowed an unrecoverable write failure; in the latter case the
    /// edit stays open with its batch intact.
    pub fn commit(&self) -> Result<bool> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PrefDbError::Closed);
        }
        let ops = {
            let edit = self.edit.lock();
            if !edit.editing {
                return Ok(true);
            }
            edit.batch.ops().to_vec()
        };
        let outcome = if ops.is_empty() {
            Ok(())
        } else {
            self.run_raw(|e| e.write(&ops))
        };
        match outcome {
            Ok(()) => {
                self.finish_edit();
                Ok(true)
            }
            Err(err) if err.is_engine_class() => {
                if self.handled(&err) {
                    self.report("commit failure suppressed by handler, batch retained", Some(&err));
                    Ok(false)
                } else {
                    Err(err)
                }
            }
            Err(err) => Err(err),
        }
    }

    fn finish_edit(&self) {
        {
            let mut edit = self.edit.lock();
            edit.batch.clear();
            edit.editing = false;
            edit.owner = None;
        }
        if let Some(permit) = &self.edit_permit {
            permit.release();
        }
    }

    // ---- raw access ----------------------------------------------------

    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.run(|| Ok(None), |e| e.get(key.as_bytes()))
    }

    fn put_raw(&self, key: &str, value: Vec<u8>) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PrefDbError::Closed);
        }
        {
            let mut edit = self.edit.lock();
            if edit.editing {
                edit.batch.put(key.as_bytes().to_vec(), value);
                return Ok(());
            }
        }
        self.run(|| Ok(()), |e| e.put(key.as_bytes(), &value))
    }

    /// Remove a key; removing an absent key is a no-op
    pub fn remove(&self, key: &str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PrefDbError::Closed);
        }
        {
            let mut edit = self.edit.lock();
            if edit.editing {
                edit.batch.delete(key.as_bytes().to_vec());
                return Ok(());
            }
        }
        self.run(|| Ok(()), |e| e.delete(key.as_bytes()))
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        self.run(|| Ok(false), |e| Ok(e.get(key.as_bytes())?.is_some()))
    }

    /// Stored byte length of a value
    pub fn value_size(&self, key: &str) -> Result<usize> {
        self.run(
            || Err(PrefDbError::NotFound(key.to_string())),
            |e| match e.get(key.as_bytes())? {
                Some(raw) => Ok(raw.len()),
                None => Err(PrefDbError::NotFound(key.to_string())),
            },
        )
    }

    // ---- typed getters -------------------------------------------------

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get_raw(key)? {
            Some(raw) => codec::decode_bool(key, &raw),
            None => Ok(default),
        }
    }

    pub fn get_byte(&self, key: &str, default: u8) -> Result<u8> {
        match self.get_raw(key)? {
            Some(raw) => codec::decode_u8(key, &raw),
            None => Ok(default),
        }
    }

    pub fn get_i32(&self, key: &str, default: i32) -> Result<i32> {
        match self.get_raw(key)? {
            Some(raw) => codec::decode_i32(key, &raw),
            None => Ok(default),
        }
    }

    pub fn get_i64(&self, key: &str, default: i64) -> Result<i64> {
        match self.get_raw(key)? {
            Some(raw) => codec::decode_i64(key, &raw),
            None => Ok(default),
        }
    }

    /// Widening read for keys that migrated from 32-bit to 64-bit storage
    pub fn get_i32_or_i64(&self, key: &str, default: i64) -> Result<i64> {
        match self.get_raw(key)? {
            Some(raw) => codec::decode_i32_or_i64(key, &raw),
            None => Ok(default),
        }
    }

    pub fn get_f32(&self, key: &str, default: f32) -> Result<f32> {
        match self.get_raw(key)? {
            Some(raw) => codec::decode_f32(key, &raw),
            None => Ok(default),
        }
    }

    pub fn get_f64(&self, key: &str, default: f64) -> Result<f64> {
        match self.get_raw(key)? {
            Some(raw) => codec::decode_f64(key, &raw),
            None => Ok(default),
        }
    }

    pub fn get_string(&self, key: &str, default: &str) -> Result<String> {
        match self.get_raw(key)? {
            Some(raw) => codec::decode_string(key, &raw),
            None => Ok(default.to_string()),
        }
    }

    // ---- strict getters: absence is an error ---------------------------

    pub fn try_get_bool(&self, key: &str) -> Result<bool> {
        match self.try_get_raw(key)? {
            Some(raw) => codec::decode_bool(key, &raw),
            None => Err(PrefDbError::NotFound(key.to_string())),
        }
    }

    pub fn try_get_byte(&self, key: &str) -> Result<u8> {
        match self.try_get_raw(key)? {
            Some(raw) => codec::decode_u8(key, &raw),
            None => Err(PrefDbError::NotFound(key.to_string())),
        }
    }

    pub fn try_get_i32(&self, key: &str) -> Result<i32> {
        match self.try_get_raw(key)? {
            Some(raw) => codec::decode_i32(key, &raw),
            None => Err(PrefDbError::NotFound(key.to_string())),
        }
    }

    pub fn try_get_i64(&self, key: &str) -> Result<i64> {
        match self.try_get_raw(key)? {
            Some(raw) => codec::decode_i64(key, &raw),
            None => Err(PrefDbError::NotFound(key.to_string())),
        }
    }

    pub fn try_get_f32(&self, key: &str) -> Result<f32> {
        match self.try_get_raw(key)? {
            Some(raw) => codec::decode_f32(key, &raw),
            None => Err(PrefDbError::NotFound(key.to_string())),
        }
    }

    pub fn try_get_f64(&self, key: &str) -> Result<f64> {
        match self.try_get_raw(key)? {
            Some(raw) => codec::decode_f64(key, &raw),
            None => Err(PrefDbError::NotFound(key.to_string())),
        }
    }

    pub fn try_get_string(&self, key: &str) -> Result<String> {
        match self.try_get_raw(key)? {
            Some(raw) => codec::decode_string(key, &raw),
            None => Err(PrefDbError::NotFound(key.to_string())),
        }
    }

    fn try_get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.run(
            || Err(PrefDbError::NotFound(key.to_string())),
            |e| e.get(key.as_bytes()),
        )
    }

    // ---- typed setters -------------------------------------------------

    pub fn put_bool(&self, key: &str, value: bool) -> Result<()> {
        self.put_raw(key, codec::encode_bool(value))
    }

    pub fn put_byte(&self, key: &str, value: u8) -> Result<()> {
        self.put_raw(key, codec::encode_u8(value))
    }

    pub fn put_i32(&self, key: &str, value: i32) -> Result<()> {
        self.put_raw(key, codec::encode_i32(value))
    }

    pub fn put_i64(&self, key: &str, value: i64) -> Result<()> {
        self.put_raw(key, codec::encode_i64(value))
    }

    pub fn put_f32(&self, key: &str, value: f32) -> Result<()> {
        self.put_raw(key, codec::encode_f32(value))
    }

    pub fn put_f64(&self, key: &str, value: f64) -> Result<()> {
        self.put_raw(key, codec::encode_f64(value))
    }

    pub fn put_string(&self, key: &str, value: &str) -> Result<()> {
        self.put_raw(key, codec::encode_string(value))
    }

    /// Presence-only marker: a zero-length value
    pub fn put_void(&self, key: &str) -> Result<()> {
        self.put_raw(key, Vec::new())
    }

    // ---- arrays and raw bytes ------------------------------------------

    pub fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.get_raw(key)
    }

    pub fn put_bytes(&self, key: &str, value: &[u8]) -> Result<()> {
        self.put_raw(key, value.to_vec())
    }

    pub fn get_i32_array(&self, key: &str) -> Result<Option<Vec<i32>>> {
        match self.get_raw(key)? {
            Some(raw) => Ok(Some(codec::decode_i32_array(key, &raw)?)),
            None => Ok(None),
        }
    }

    pub fn put_i32_array(&self, key: &str, values: &[i32]) -> Result<()> {
        self.put_raw(key, codec::encode_i32_array(values))
    }

    pub fn get_i64_array(&self, key: &str) -> Result<Option<Vec<i64>>> {
        match self.get_raw(key)? {
            Some(raw) => Ok(Some(codec::decode_i64_array(key, &raw)?)),
            None => Ok(None),
        }
    }

    pub fn put_i64_array(&self, key: &str, values: &[i64]) -> Result<()> {
        self.put_raw(key, codec::encode_i64_array(values))
    }

    pub fn get_f32_array(&self, key: &str) -> Result<Option<Vec<f32>>> {
        match self.get_raw(key)? {
            Some(raw) => Ok(Some(codec::decode_f32_array(key, &raw)?)),
            None => Ok(None),
        }
    }

    pub fn put_f32_array(&self, key: &str, values: &[f32]) -> Result<()> {
        self.put_raw(key, codec::encode_f32_array(values))
    }

    pub fn get_f64_array(&self, key: &str) -> Result<Option<Vec<f64>>> {
        match self.get_raw(key)? {
            Some(raw) => Ok(Some(codec::decode_f64_array(key, &raw)?)),
            None => Ok(None),
        }
    }

    pub fn put_f64_array(&self, key: &str, values: &[f64]) -> Result<()> {
        self.put_raw(key, codec::encode_f64_array(values))
    }

    pub fn get_string_array(&self, key: &str) -> Result<Option<Vec<String>>> {
        match self.get_raw(key)? {
            Some(raw) => Ok(Some(codec::decode_string_array(key, &raw)?)),
            None => Ok(None),
        }
    }

    pub fn put_string_array<S: AsRef<str>>(&self, key: &str, values: &[S]) -> Result<()> {
        self.put_raw(key, codec::encode_string_array(values))
    }

    // ---- scans ---------------------------------------------------------

    /// Open a forward-only cursor over all keys starting with `prefix`
    pub fn find(&self, prefix: &str) -> Result<Cursor> {
        let prefix_bytes = prefix.as_bytes().to_vec();
        let slot = self.run_raw(|e| {
            let iter = e.iter()?;
            let slot = Arc::new(Mutex::new(Some(iter)));
            self.register_cursor(&slot);
            Ok(slot)
        })?;
        Ok(Cursor::new(slot, prefix_bytes))
    }

    /// First key (in byte order) starting with `prefix`
    pub fn find_first(&self, prefix: &str) -> Result<Option<String>> {
        let prefix = prefix.to_string();
        self.run(
            || Ok(None),
            move |e| {
                let mut iter = e.iter()?;
                iter.seek(prefix.as_bytes());
                if iter.valid() && iter.key().starts_with(prefix.as_bytes()) {
                    Ok(Some(String::from_utf8_lossy(iter.key()).into_owned()))
                } else {
                    Ok(None)
                }
            },
        )
    }

    /// Raw values of every key starting with `prefix`, in key order
    pub fn find_all(&self, prefix: &str) -> Result<Vec<Vec<u8>>> {
        self.run(
            || Ok(Vec::new()),
            |e| {
                let mut iter = e.iter()?;
                iter.seek(prefix.as_bytes());
                let mut values = Vec::new();
                while iter.valid() && iter.key().starts_with(prefix.as_bytes()) {
                    values.push(iter.value().to_vec());
                    iter.next();
                }
                Ok(values)
            },
        )
    }

    /// First key under `prefix` whose raw value equals `value`
    pub fn find_by_value(&self, prefix: &str, value: &[u8]) -> Result<Option<String>> {
        self.run(
            || Ok(None),
            |e| {
                let mut iter = e.iter()?;
                iter.seek(prefix.as_bytes());
                while iter.valid() && iter.key().starts_with(prefix.as_bytes()) {
                    if iter.value() == value {
                        return Ok(Some(String::from_utf8_lossy(iter.key()).into_owned()));
                    }
                    iter.next();
                }
                Ok(None)
            },
        )
    }

    // ---- bulk deletion -------------------------------------------------

    /// Delete every key starting with `prefix`; returns the number of
    /// entries removed (or queued for removal while editing)
    pub fn remove_by_prefix(&self, prefix: &str) -> Result<usize> {
        if prefix.is_empty() {
            return Err(PrefDbError::InvalidArgument("empty prefix".to_string()));
        }
        self.remove_by_prefixes(std::slice::from_ref(&prefix))
    }

    /// Delete every key starting with any of `prefixes`
    pub fn remove_by_any_prefix<S: AsRef<str>>(&self, prefixes: &[S]) -> Result<usize> {
        if prefixes.is_empty() {
            return Err(PrefDbError::InvalidArgument("no prefixes".to_string()));
        }
        if prefixes.iter().any(|p| p.as_ref().is_empty()) {
            return Err(PrefDbError::InvalidArgument("empty prefix".to_string()));
        }
        self.remove_by_prefixes(prefixes)
    }

    fn remove_by_prefixes<S: AsRef<str>>(&self, prefixes: &[S]) -> Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PrefDbError::Closed);
        }
        let mut edit = self.edit.lock();
        if edit.editing {
            let keys = self.run_raw(|e| {
                let mut iter = e.iter()?;
                Ok(collect_keys_matching(iter.as_mut(), prefixes))
            })?;
            let count = keys.len();
            for key in keys {
                edit.batch.delete(key);
            }
            return Ok(count);
        }
        drop(edit);
        self.run(
            || Ok(0),
            |e| {
                let mut iter = e.iter()?;
                let keys = collect_keys_matching(iter.as_mut(), prefixes);
                drop(iter);
                if keys.is_empty() {
                    return Ok(0);
                }
                let ops: Vec<BatchOp> = keys
                    .iter()
                    .map(|key| BatchOp::Delete { key: key.clone() })
                    .collect();
                e.write(&ops)?;
                Ok(ops.len())
            },
        )
    }

    /// Delete every entry in the store
    ///
    /// Outside an edit this is one atomic batch; inside an edit the
    /// pending batch is replaced with deletions of all current keys.
    pub fn clear(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PrefDbError::Closed);
        }
        let mut edit = self.edit.lock();
        if edit.editing {
            let keys = self.run_raw(|e| {
                let mut iter = e.iter()?;
                Ok(collect_all_keys(iter.as_mut()))
            })?;
            edit.batch.clear();
            for key in keys {
                edit.batch.delete(key);
            }
            return Ok(());
        }
        drop(edit);
        self.run(
            || Ok(()),
            |e| {
                let mut iter = e.iter()?;
                let keys = collect_all_keys(iter.as_mut());
                drop(iter);
                if keys.is_empty() {
                    return Ok(());
                }
                let ops: Vec<BatchOp> = keys
                    .into_iter()
                    .map(|key| BatchOp::Delete { key })
                    .collect();
                e.write(&ops)
            },
        )
    }

    // ---- statistics ----------------------------------------------------

    /// Total number of entries (full scan)
    pub fn entry_count(&self) -> Result<usize> {
        self.run(
            || Ok(0),
            |e| {
                let mut iter = e.iter()?;
                iter.seek_to_first();
                let mut count = 0;
                while iter.valid() {
                    count += 1;
                    iter.next();
                }
                Ok(count)
            },
        )
    }

    /// Number of entries whose key starts with `prefix`
    pub fn size_by_prefix(&self, prefix: &str) -> Result<usize> {
        self.run(
            || Ok(0),
            |e| {
                let mut iter = e.iter()?;
                iter.seek(prefix.as_bytes());
                let mut count = 0;
                while iter.valid() && iter.key().starts_with(prefix.as_bytes()) {
                    count += 1;
                    iter.next();
                }
                Ok(count)
            },
        )
    }

    /// Bytes occupied by the store; reopens the handle first so buffered
    /// state is accounted for
    pub fn size_on_disk(&self) -> Result<u64> {
        self.flush()?;
        self.run(|| Ok(0), |e| e.size_on_disk())
    }

    /// Engine-specific diagnostic property
    pub fn property(&self, name: &str) -> Result<Option<String>> {
        self.with_engine(|e| Ok(e.property(name)))
    }
}

impl<E: Engine> Drop for PrefDb<E> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn collect_all_keys(iter: &mut dyn EngineIterator) -> Vec<Vec<u8>> {
    iter.seek_to_first();
    let mut keys = Vec::new();
    while iter.valid() {
        keys.push(iter.key().to_vec());
        iter.next();
    }
    keys
}

/// Unique keys matching any of the prefixes, collected with one seek per
/// prefix; overlapping prefixes do not double-count.
fn collect_keys_matching<S: AsRef<str>>(
    iter: &mut dyn EngineIterator,
    prefixes: &[S],
) -> Vec<Vec<u8>> {
    let mut keys = BTreeSet::new();
    for prefix in prefixes {
        let prefix = prefix.as_ref().as_bytes();
        iter.seek(prefix);
        while iter.valid() && iter.key().starts_with(prefix) {
            keys.insert(iter.key().to_vec());
            iter.next();
        }
    }
    keys.into_iter().collect()
}
