//! Installed-state manifest.
//!
//! Remembers, per kit, what the last successful install put into the settings
//! file and which kit files it wrote. The merge engine reads a kit's snapshot
//! to tell "the user deleted this" apart from "this is new".
//!
//! # File Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "kits": {
//!     "engineer": {
//!       "installedAt": "2026-01-01T00:00:00Z",
//!       "settings": { "hooks": ["node $HOME/.claude/hooks/a.cjs"], "mcpServers": ["fs"] },
//!       "files": { "hooks/a.cjs": "9e107d9d372bb6826bd81d3542a419d6" }
//!     }
//!   }
//! }
//! ```
//!
//! Loading is tolerant: an empty, corrupt or wrong-version file yields an empty
//! manifest, which makes the next install behave like a fresh one.

use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{CkError, Result};
use crate::ownership::Ownership;
use crate::settings_file::write_atomic;
use crate::types::{InstalledSettings, KitClaims, SettingsTree};

const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KitRecord {
    pub installed_at: DateTime<Utc>,
    #[serde(default)]
    pub settings: InstalledSettings,
    /// Relative path → md5 of the file as the kit wrote it.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl KitRecord {
    fn new() -> Self {
        Self {
            installed_at: Utc::now(),
            settings: InstalledSettings::default(),
            files: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestFile {
    version: u32,
    #[serde(default)]
    kits: BTreeMap<String, KitRecord>,
}

/// Per-kit install records, backed by `manifest.json`.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    kits: BTreeMap<String, KitRecord>,
    file_path: PathBuf,
}

impl ManifestStore {
    pub fn new(file_path: &Path) -> Self {
        Self {
            kits: BTreeMap::new(),
            file_path: file_path.to_path_buf(),
        }
    }

    pub fn load(file_path: &Path) -> Self {
        let content = match fs::read_to_string(file_path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Self::new(file_path)
            }
            Err(err) => {
                warn!(path = %file_path.display(), error = %err, "Failed to read manifest");
                return Self::new(file_path);
            }
        };

        if content.trim().is_empty() {
            return Self::new(file_path);
        }

        match serde_json::from_str::<ManifestFile>(&content) {
            Ok(file) if file.version == MANIFEST_VERSION => Self {
                kits: file.kits,
                file_path: file_path.to_path_buf(),
            },
            Ok(file) => {
                warn!(
                    path = %file_path.display(),
                    version = file.version,
                    expected = MANIFEST_VERSION,
                    "Manifest version mismatch, starting fresh"
                );
                Self::new(file_path)
            }
            Err(err) => {
                warn!(path = %file_path.display(), error = %err, "Corrupt manifest, starting fresh");
                Self::new(file_path)
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let file = ManifestFile {
            version: MANIFEST_VERSION,
            kits: self.kits.clone(),
        };
        let mut content = serde_json::to_string_pretty(&file)
            .map_err(|e| CkError::json("serializing manifest", e))?;
        content.push('\n');
        write_atomic(&self.file_path, content.as_bytes())
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn get(&self, kit: &str) -> Option<&KitRecord> {
        self.kits.get(kit)
    }

    pub fn kits(&self) -> impl Iterator<Item = (&str, &KitRecord)> {
        self.kits.iter().map(|(id, record)| (id.as_str(), record))
    }

    /// What the last install of `kit` recorded, if it was ever installed.
    pub fn snapshot(&self, kit: &str) -> Option<InstalledSettings> {
        self.kits.get(kit).map(|record| record.settings.clone())
    }

    /// Everything the other recorded kits ship. When two kits ship the same
    /// entry the one with the smaller id claims it.
    pub fn claims_excluding(&self, kit: &str) -> KitClaims {
        let mut claims = KitClaims::default();
        for (id, record) in self.kits.iter().filter(|(id, _)| id.as_str() != kit) {
            for hook in record.settings.hook_set() {
                claims.hooks.entry(hook).or_insert_with(|| id.clone());
            }
            for server in &record.settings.mcp_servers {
                claims
                    .mcp_servers
                    .entry(server.clone())
                    .or_insert_with(|| id.clone());
            }
        }
        claims
    }

    /// Records the settings an install of `source` leaves behind.
    pub fn record_settings(&mut self, kit: &str, source: &SettingsTree) {
        let record = self.kits.entry(kit.to_string()).or_insert_with(KitRecord::new);
        record.settings = InstalledSettings::from_source(source);
        record.installed_at = Utc::now();
    }

    pub fn record_file(&mut self, kit: &str, relative_path: &str, hash: &str) {
        self.kits
            .entry(kit.to_string())
            .or_insert_with(KitRecord::new)
            .files
            .insert(relative_path.to_string(), hash.to_string());
    }

    /// Ownership of a kit file given its current content hash.
    pub fn classify_file(&self, kit: &str, relative_path: &str, current_hash: &str) -> Ownership {
        let recorded = self
            .kits
            .get(kit)
            .and_then(|record| record.files.get(relative_path))
            .map(String::as_str);
        Ownership::classify(current_hash, recorded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn source() -> SettingsTree {
        SettingsTree::from_value(json!({
            "hooks": {"Stop": [{"command": "node ${HOME}/.claude/hooks/a.cjs"}]},
            "mcp": {"servers": {"fs": {}}}
        }))
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = ManifestStore::load(&temp.path().join("manifest.json"));
        assert_eq!(store.kits().count(), 0);
        assert!(store.snapshot("engineer").is_none());
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("manifest.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(ManifestStore::load(&path).kits().count(), 0);
    }

    #[test]
    fn test_wrong_version_is_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("manifest.json");
        fs::write(&path, r#"{"version": 99, "kits": {"k": {"installedAt": "2026-01-01T00:00:00Z"}}}"#)
            .unwrap();
        assert_eq!(ManifestStore::load(&path).kits().count(), 0);
    }

    #[test]
    fn test_record_settings_normalizes_commands() {
        let temp = TempDir::new().unwrap();
        let mut store = ManifestStore::new(&temp.path().join("manifest.json"));
        store.record_settings("engineer", &source());

        let snapshot = store.snapshot("engineer").unwrap();
        assert_eq!(snapshot.hooks, vec!["node $HOME/.claude/hooks/a.cjs"]);
        assert_eq!(snapshot.mcp_servers, vec!["fs"]);
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".ck").join("manifest.json");
        let mut store = ManifestStore::new(&path);
        store.record_settings("engineer", &source());
        store.record_file("engineer", "hooks/a.cjs", "abc");
        store.save().unwrap();

        let loaded = ManifestStore::load(&path);
        assert_eq!(loaded.get("engineer"), store.get("engineer"));

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], json!(1));
        assert!(raw["kits"]["engineer"]["installedAt"].is_string());
        assert_eq!(raw["kits"]["engineer"]["settings"]["mcpServers"], json!(["fs"]));
    }

    #[test]
    fn test_rerecord_replaces_snapshot() {
        let temp = TempDir::new().unwrap();
        let mut store = ManifestStore::new(&temp.path().join("manifest.json"));
        store.record_settings("engineer", &source());
        store.record_settings("engineer", &SettingsTree::from_value(json!({"hooks": {}})));
        assert!(store.snapshot("engineer").unwrap().is_empty());
    }

    #[test]
    fn test_claims_exclude_the_installing_kit() {
        let temp = TempDir::new().unwrap();
        let mut store = ManifestStore::new(&temp.path().join("manifest.json"));
        store.record_settings("engineer", &source());
        store.record_settings("marketing", &source());
        store.record_settings(
            "writer",
            &SettingsTree::from_value(json!({"hooks": {"Stop": [{"command": "w.sh"}]}})),
        );

        let claims = store.claims_excluding("writer");
        assert_eq!(claims.hooks["node $HOME/.claude/hooks/a.cjs"], "engineer");
        assert_eq!(claims.mcp_servers["fs"], "engineer");
        assert!(!claims.hooks.contains_key("w.sh"));

        let claims = store.claims_excluding("engineer");
        assert_eq!(claims.mcp_servers["fs"], "marketing");
        assert_eq!(claims.hooks["w.sh"], "writer");
    }

    #[test]
    fn test_classify_file() {
        let temp = TempDir::new().unwrap();
        let mut store = ManifestStore::new(&temp.path().join("manifest.json"));
        store.record_file("engineer", "hooks/a.cjs", "abc");

        assert_eq!(store.classify_file("engineer", "hooks/a.cjs", "abc"), Ownership::Ck);
        assert_eq!(
            store.classify_file("engineer", "hooks/a.cjs", "def"),
            Ownership::CkModified
        );
        assert_eq!(store.classify_file("engineer", "notes.md", "abc"), Ownership::User);
        assert_eq!(store.classify_file("other", "hooks/a.cjs", "abc"), Ownership::User);
    }
}
