//! Reading and writing settings files.
//!
//! Reads never fail: a missing or corrupt file is `None` and the caller
//! decides what that means. Writes are atomic (temp + rename) so a crash
//! mid-write can't leave a half-written settings file behind.

use fs_err as fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{CkError, Result};
use crate::types::SettingsTree;

/// Reads and validates a settings file. `None` when missing or not JSON.
pub fn read_settings(path: &Path) -> Option<SettingsTree> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Failed to read settings file");
            return None;
        }
    };

    if content.trim().is_empty() {
        return None;
    }

    match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(value) => Some(SettingsTree::from_value(value)),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Settings file is not valid JSON");
            None
        }
    }
}

/// Writes a settings tree as pretty JSON, atomically.
pub fn write_settings(path: &Path, settings: &SettingsTree) -> Result<()> {
    let mut content = serde_json::to_string_pretty(&settings.to_value())
        .map_err(|e| CkError::json("serializing settings", e))?;
    content.push('\n');
    write_atomic(path, content.as_bytes())
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| CkError::ConfigWriteFailed {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent"),
    })?;
    fs::create_dir_all(dir).map_err(|e| CkError::io("creating settings directory", e))?;

    let write_failed = |source: std::io::Error| CkError::ConfigWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let mut temp = NamedTempFile::new_in(dir).map_err(write_failed)?;
    temp.write_all(bytes).map_err(write_failed)?;
    temp.flush().map_err(write_failed)?;
    temp.persist(path).map_err(|e| write_failed(e.error))?;
    Ok(())
}
