//! Error types for the embedding harness

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EmbedError>;

#[derive(Error, Debug)]
pub enum EmbedError {
    // Precondition violations, detected before the engine is touched
    #[error("Not initialized")]
    NotInitialized,

    #[error("Invalid arguments: {0}")]
    InvalidArgument(String),

    #[error("Already in transaction")]
    AlreadyInTransaction,

    #[error("Not in transaction")]
    NotInTransaction,

    // Engine-raised errors, caught and converted to text
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("BEGIN failed: {0}")]
    Begin(String),

    #[error("COMMIT failed: {0}")]
    Commit(String),

    #[error("ROLLBACK failed: {0}")]
    Rollback(String),

    #[error("LISTEN failed: {0}")]
    Listen(String),

    #[error("UNLISTEN failed: {0}")]
    Unlisten(String),

    #[error("NOTIFY failed: {0}")]
    Notify(String),

    #[error("Poll notifications failed: {0}")]
    Poll(String),

    #[error("initdb failed: {0}")]
    Bootstrap(String),

    // Extension registry
    #[error("could not find library \"{0}\" in registered static extensions")]
    UnknownLibrary(String),

    #[error("could not find function \"{function}\" in static library \"{library}\"")]
    UnknownFunction { library: String, function: String },

    #[error("cannot register extension \"{0}\": registry is frozen after first lookup")]
    RegistryFrozen(String),

    // Result access
    #[error("result rows are no longer available: a later statement replaced them")]
    ResultInvalidated,

    #[error("row {row} column {column} is out of range")]
    OutOfRange { row: usize, column: usize },

    #[error("Type error: {0}")]
    TypeError(String),

    // Harness bookkeeping
    #[error("Out of memory")]
    OutOfMemory,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EmbedError {
    /// Hint text attached to some errors, mirrors the engine's `errhint`.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            EmbedError::UnknownLibrary(_) => Some(
                "The library must be registered via register_static_extension() before use.",
            ),
            _ => None,
        }
    }

    /// True for errors raised before any engine state was touched.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            EmbedError::NotInitialized
                | EmbedError::InvalidArgument(_)
                | EmbedError::AlreadyInTransaction
                | EmbedError::NotInTransaction
        )
    }
}
