//! Error types for ck-core operations.
//!
//! The merge engine itself never fails; these errors come from the
//! collaborators around it (settings file, manifest, lock, config).

use std::path::PathBuf;

/// All errors that can occur in ck-core operations.
#[derive(Debug, thiserror::Error)]
pub enum CkError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Configuration write failed: {path}: {source}")]
    ConfigWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Lock Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Timed out waiting for settings lock: {path} (held by pid {holder:?})")]
    LockTimeout { path: PathBuf, holder: Option<u32> },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CkError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        CkError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        CkError::Json {
            context: context.into(),
            source,
        }
    }
}

/// Convenience type alias for Results using CkError.
pub type Result<T> = std::result::Result<T, CkError>;
