//! Crate-level error type for the handful of failures that are allowed to
//! bubble out of the core. Everything else — parse errors,
//! transient I/O, watcher errors, invariant violations — is swallowed and
//! logged at the point of occurrence; it never becomes a `CoreError`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("already watching a journal directory")]
    AlreadyWatching,

    #[error("journal directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
