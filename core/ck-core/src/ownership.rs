//! Ownership classification for installer-managed artifacts.
//!
//! Every file (or settings entry) the installer writes is recorded with a
//! content hash. Comparing the current hash against that record tells us
//! whether the artifact is still exactly what we shipped, was edited by the
//! user afterwards, or was never ours to begin with.
//!
//! Hashes are MD5 hex digests over content only, so they are stable across
//! platforms and independent of paths and timestamps.

use fs_err as fs;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{CkError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ownership {
    /// Installed by a kit and untouched since.
    #[serde(rename = "ck")]
    Ck,
    /// Installed by a kit, edited by the user afterwards.
    #[serde(rename = "ck-modified")]
    CkModified,
    /// Never recorded by any install.
    #[serde(rename = "user")]
    User,
}

impl Ownership {
    /// Classifies an artifact from its current hash and the hash recorded at
    /// install time (`None` when no install ever tracked it).
    pub fn classify(current_hash: &str, recorded_hash: Option<&str>) -> Self {
        match recorded_hash {
            None => Ownership::User,
            Some(recorded) if recorded == current_hash => Ownership::Ck,
            Some(_) => Ownership::CkModified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Ownership::Ck => "ck",
            Ownership::CkModified => "ck-modified",
            Ownership::User => "user",
        }
    }
}

impl std::fmt::Display for Ownership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

pub fn hash_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| CkError::io("hashing file", e))?;
    Ok(hash_bytes(&bytes))
}

/// Hashes a JSON value independent of object key order.
pub fn hash_entry(value: &Value) -> String {
    let canonical = canonicalize(value);
    hash_bytes(canonical.to_string().as_bytes())
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                if let Some(child) = map.get(key) {
                    sorted.insert(key.clone(), canonicalize(child));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
