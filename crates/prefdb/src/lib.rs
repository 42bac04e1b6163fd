//! prefdb: a typed preference store over an embedded ordered KV engine
//!
//! Keys are strings; values are typed (booleans, integers, floats, UTF-16
//! strings, arrays of each) and stored as raw byte strings through the
//! codec in [`codec`]. On top of the engine the store layers:
//! - prefix-bounded cursors with forced release during handle teardown
//! - an editor buffering writes into one atomic batch
//! - a handle lifecycle with reopen (`flush`), corruption detection and
//!   one-shot automatic repair
//!
//! ```no_run
//! use prefdb::{MemoryEngine, PrefDb, StoreConfig};
//!
//! # fn main() -> prefdb::Result<()> {
//! let db: PrefDb<MemoryEngine> = PrefDb::open(StoreConfig::new("/tmp/prefs"))?;
//! db.put_i32("settings.volume", 7)?;
//! assert_eq!(db.get_i32("settings.volume", 0)?, 7);
//!
//! db.begin_edit()?;
//! db.put_bool("settings.muted", true)?;
//! db.remove("settings.volume")?;
//! db.commit()?;
//! # Ok(())
//! # }
//! ```

mod batch;
pub mod codec;
mod cursor;
mod store;

pub use cursor::{Cursor, Entry};
pub use prefdb_core::{
    BatchOp, Engine, EngineIterator, ErrorHandler, PrefDbError, Result, StoreConfig,
};
pub use prefdb_memory::MemoryEngine;
pub use store::{PrefDb, REPAIRABLE_SIGNATURES};
