use crate::codec;
use parking_lot::Mutex;
use prefdb_core::{EngineIterator, Result};
use std::sync::Arc;

/// Shared slot holding a live engine iterator
///
/// The store keeps a weak reference to every slot it hands out so the
/// lifecycle manager can force-release iterators before the underlying
/// handle is destroyed (reopen, repair, close). A force-released cursor
/// simply ends its sequence.
pub(crate) type CursorSlot = Mutex<Option<Box<dyn EngineIterator>>>;

/// One decoded entry yielded by a [`Cursor`]
///
/// Entries own their key and a copy of the raw value, so they stay valid
/// after the cursor advances or is released.
#[derive(Debug, Clone)]
pub struct Entry {
    key: String,
    value: Vec<u8>,
}

impl Entry {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn raw(&self) -> &[u8] {
        &self.value
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.value
    }

    pub fn as_bool(&self) -> Result<bool> {
        codec::decode_bool(&self.key, &self.value)
    }

    pub fn as_u8(&self) -> Result<u8> {
        codec::decode_u8(&self.key, &self.value)
    }

    pub fn as_i32(&self) -> Result<i32> {
        codec::decode_i32(&self.key, &self.value)
    }

    pub fn as_i64(&self) -> Result<i64> {
        codec::decode_i64(&self.key, &self.value)
    }

    pub fn as_i32_or_i64(&self) -> Result<i64> {
        codec::decode_i32_or_i64(&self.key, &self.value)
    }

    pub fn as_f32(&self) -> Result<f32> {
        codec::decode_f32(&self.key, &self.value)
    }

    pub fn as_f64(&self) -> Result<f64> {
        codec::decode_f64(&self.key, &self.value)
    }

    pub fn as_string(&self) -> Result<String> {
        codec::decode_string(&self.key, &self.value)
    }

    pub fn as_i32_array(&self) -> Result<Vec<i32>> {
        codec::decode_i32_array(&self.key, &self.value)
    }

    pub fn as_i64_array(&self) -> Result<Vec<i64>> {
        codec::decode_i64_array(&self.key, &self.value)
    }

    pub fn as_f32_array(&self) -> Result<Vec<f32>> {
        codec::decode_f32_array(&self.key, &self.value)
    }

    pub fn as_f64_array(&self) -> Result<Vec<f64>> {
        codec::decode_f64_array(&self.key, &self.value)
    }

    pub fn as_string_array(&self) -> Result<Vec<String>> {
        codec::decode_string_array(&self.key, &self.value)
    }
}

/// Forward-only, prefix-bounded scan over the store
///
/// The first call seeks to the first key at or after the prefix; iteration
/// ends permanently at the first key that no longer starts with it.
/// Cursors are not restartable: open a new one to scan again. The engine
/// iterator is freed as soon as the scan ends, on [`Cursor::release`], or
/// on drop, whichever comes first.
pub struct Cursor {
    slot: Arc<CursorSlot>,
    prefix: Vec<u8>,
    primed: bool,
    done: bool,
}

impl Cursor {
    pub(crate) fn new(slot: Arc<CursorSlot>, prefix: Vec<u8>) -> Self {
        Self {
            slot,
            prefix,
            primed: false,
            done: false,
        }
    }

    /// Free the underlying engine iterator without waiting for drop
    pub fn release(&mut self) {
        self.done = true;
        self.slot.lock().take();
    }
}

impl Iterator for Cursor {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut guard = self.slot.lock();
        let iter = match guard.as_mut() {
            Some(iter) => iter,
            // force-released by the lifecycle manager
            None => {
                self.done = true;
                return None;
            }
        };
        if self.primed {
            iter.next();
        } else {
            iter.seek(&self.prefix);
            self.primed = true;
        }
        if !iter.valid() || !iter.key().starts_with(&self.prefix) {
            self.done = true;
            guard.take();
            return None;
        }
        let entry = Entry {
            key: String::from_utf8_lossy(iter.key()).into_owned(),
            value: iter.value().to_vec(),
        };
        Some(Ok(entry))
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.slot.lock().take();
    }
}
