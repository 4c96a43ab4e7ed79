//! Error types for the context memory store, registry and recorder.

use std::path::PathBuf;

/// Result alias used throughout `ctx-core`.
pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    // ───── Argument Errors ─────
    #[error("summary must not be empty")]
    EmptySummary,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // ───── Session Errors ─────
    #[error("no active session for this project; start one first")]
    NoActiveSession,

    #[error("session {0} is already running")]
    SessionAlreadyRunning(i64),

    // ───── Storage Errors ─────
    #[error("storage cap exceeded for project at {path}: {used} of {cap} bytes used")]
    StorageCapExceeded {
        path: PathBuf,
        used: u64,
        cap: u64,
    },

    #[error("database is locked after {attempts} retries")]
    LockTimeout { attempts: u32 },

    // ───── Project Errors ─────
    #[error("project not found: {0}")]
    ProjectNotFound(PathBuf),

    #[error("project {0} is soft-deleted")]
    ProjectDeleted(PathBuf),

    #[error("project name {0:?} is ambiguous: {1} matches")]
    AmbiguousName(String, usize),

    // ───── I/O and Serialization Errors ─────
    #[error("filesystem error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::ser::Error),
}

impl CoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
