use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrefDbError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored value does not have the shape the caller asked for
    /// (wrong width, odd UTF-16 length, truncated array payload).
    #[error("Unexpected value shape for {key}: {detail}")]
    ValueShape { key: String, detail: String },

    /// Structural damage reported by the storage engine. The message is
    /// the engine's own text, matched verbatim against the repairable
    /// signature list.
    #[error("{0}")]
    Corruption(String),

    #[error("Storage engine error: {0}")]
    Engine(String),

    #[error("Store is closed")]
    Closed,

    #[error("Nested edit on a store that is already editing")]
    Reentrancy,

    #[error("Failed to allocate store resources: {0}")]
    ResourceAllocation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl PrefDbError {
    /// True for errors that originate inside the storage engine and are
    /// therefore candidates for the repair protocol.
    pub fn is_engine_class(&self) -> bool {
        matches!(self, PrefDbError::Corruption(_) | PrefDbError::Engine(_))
    }

    /// The raw engine message for engine-class errors.
    pub fn engine_message(&self) -> Option<&str> {
        match self {
            PrefDbError::Corruption(msg) | PrefDbError::Engine(msg) => Some(msg),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PrefDbError>;
