//! Core abstractions for the prefdb preference store
//!
//! This crate defines the seams shared by the typed store and its storage
//! backends:
//! - `PrefDbError` / `Result`: the error taxonomy (engine-class errors are
//!   the ones eligible for the repair protocol)
//! - `StoreConfig`: store location plus engine and retry tuning
//! - `Engine` / `EngineIterator`: the ordered byte-string KV surface a
//!   backend must provide
//! - `BatchOp`: a buffered mutation for atomic batch writes
//! - `ErrorHandler`: the fatal/non-fatal failure observer hook

pub mod config;
pub mod error;
pub mod traits;

pub use config::StoreConfig;
pub use error::{PrefDbError, Result};
pub use traits::{BatchOp, Engine, EngineIterator, ErrorHandler};
