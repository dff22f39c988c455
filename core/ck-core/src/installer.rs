//! Kit settings installation.
//!
//! Wraps the pure merge engine with the I/O around it: take the settings lock,
//! read the destination, merge every kit in order, write the result and update
//! the manifest. The lock is held until the manifest is saved so a concurrent
//! install never sees settings and manifest out of step.
//!
//! Every manifest read-modify-write takes the same lock, keyed on the settings
//! path, so file records and settings records never overwrite each other.

use fs_err as fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{load_engine_config, EngineConfig};
use crate::error::{CkError, Result};
use crate::lock::SettingsLock;
use crate::manifest::ManifestStore;
use crate::merge::{merge_settings_with, MergeOptions, MergeResult};
use crate::ownership::{hash_file, Ownership};
use crate::settings_file::{read_settings, write_settings};
use crate::storage::StorageConfig;
use crate::types::SettingsTree;

pub struct SettingsInstaller {
    storage: StorageConfig,
    config: EngineConfig,
    dry_run: bool,
}

impl SettingsInstaller {
    pub fn new(storage: StorageConfig, config: EngineConfig) -> Self {
        Self {
            storage,
            config,
            dry_run: false,
        }
    }

    /// Loads `config.toml` from the storage root (defaults if absent).
    pub fn from_storage(storage: StorageConfig) -> Result<Self> {
        let config = load_engine_config(&storage.config_file())?;
        Ok(Self::new(storage, config))
    }

    /// Merge and report without touching the settings file or manifest.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    pub fn settings_path(&self) -> PathBuf {
        self.storage.settings_file(&self.config.settings.file_name)
    }

    pub fn manifest(&self) -> ManifestStore {
        ManifestStore::load(&self.storage.manifest_file())
    }

    pub fn install_kit(&self, kit: &str, source: &SettingsTree) -> Result<MergeResult> {
        self.install_kits(&[(kit, source)])
    }

    /// Merges each kit in order, each pass seeing the previous pass's output.
    pub fn install_kits(&self, kits: &[(&str, &SettingsTree)]) -> Result<MergeResult> {
        let settings_path = self.settings_path();
        let _lock = if self.dry_run {
            None
        } else {
            Some(SettingsLock::acquire(&settings_path, &self.config.lock)?)
        };

        let destination = load_destination(&settings_path)?;
        let mut manifest = self.manifest();

        let mut result = MergeResult {
            merged: destination.clone(),
            ..MergeResult::default()
        };
        for (kit, source) in kits {
            let mut options =
                MergeOptions::for_kit(*kit).with_claims(manifest.claims_excluding(kit));
            if let Some(snapshot) = manifest.snapshot(kit) {
                options = options.with_installed(snapshot);
            }
            let current = result.merged.clone();
            result = merge_settings_with(result, source, &current, &options);
            manifest.record_settings(kit, source);
        }

        if self.dry_run {
            info!(
                path = %settings_path.display(),
                kits = kits.len(),
                "Dry run, settings not written"
            );
            return Ok(result);
        }

        if result.merged.to_value() != destination.to_value() || !settings_path.exists() {
            write_settings(&settings_path, &result.merged)?;
        } else {
            debug!(path = %settings_path.display(), "Settings unchanged, skipping write");
        }
        manifest.save()?;

        info!(
            path = %settings_path.display(),
            kits = kits.len(),
            changed = result.has_changes(),
            hooks_added = result.hooks_added,
            hooks_removed = result.hooks_removed,
            hooks_skipped = result.hooks_skipped,
            mcp_servers_removed = result.mcp_servers_removed,
            conflicts = result.conflicts_detected.len(),
            "Installed kit settings"
        );
        for conflict in &result.conflicts_detected {
            warn!(conflict = %conflict, "Settings conflict");
        }

        Ok(result)
    }

    /// Hashes every file under `dir` and records it for `kit`.
    pub fn record_files(&self, kit: &str, dir: &Path) -> Result<usize> {
        let files = scan_files(dir)?;
        if self.dry_run {
            return Ok(files.len());
        }

        let _lock = SettingsLock::acquire(&self.settings_path(), &self.config.lock)?;
        let mut manifest = self.manifest();
        for (relative, hash) in &files {
            manifest.record_file(kit, relative, hash);
        }
        manifest.save()?;
        debug!(kit, files = files.len(), "Recorded kit files");
        Ok(files.len())
    }

    /// Classifies every file under `dir` against what `kit` recorded.
    pub fn classify_files(&self, kit: &str, dir: &Path) -> Result<Vec<(String, Ownership)>> {
        let manifest = self.manifest();
        Ok(scan_files(dir)?
            .into_iter()
            .map(|(relative, hash)| {
                let ownership = manifest.classify_file(kit, &relative, &hash);
                (relative, ownership)
            })
            .collect())
    }
}

/// Reads the destination settings. A missing or empty file is an empty tree;
/// a file that exists but isn't valid JSON is an error so we never clobber it.
fn load_destination(path: &Path) -> Result<SettingsTree> {
    if let Some(tree) = read_settings(path) {
        return Ok(tree);
    }
    match fs::read_to_string(path) {
        Ok(content) if !content.trim().is_empty() => Err(CkError::ConfigMalformed {
            path: path.to_path_buf(),
            details: "settings file is not valid JSON; fix or delete it to start fresh"
                .to_string(),
        }),
        Ok(_) => Ok(SettingsTree::new()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(SettingsTree::new()),
        Err(err) => Err(CkError::io("reading settings", err)),
    }
}

/// `(relative path with '/' separators, md5)` for every file under `dir`.
fn scan_files(dir: &Path) -> Result<Vec<(String, String)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| CkError::io(format!("walking {}", dir.display()), e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((relative, hash_file(entry.path())?));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn installer(temp: &TempDir) -> SettingsInstaller {
        let storage = StorageConfig::for_claude_root(temp.path().join(".claude"));
        SettingsInstaller::new(storage, EngineConfig::default())
    }

    fn kit_source() -> SettingsTree {
        SettingsTree::from_value(json!({
            "hooks": {"SessionStart": [{"hooks": [{"type": "command", "command": "node $HOME/.claude/hooks/init.cjs"}]}]}
        }))
    }

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_creates_settings_when_missing() {
        let temp = TempDir::new().unwrap();
        let installer = installer(&temp);

        let result = installer.install_kit("engineer", &kit_source()).unwrap();
        assert_eq!(result.hooks_added, 1);

        let written = read_json(&installer.settings_path());
        assert_eq!(
            written["hooks"]["SessionStart"][0]["hooks"][0]["_origin"],
            json!("engineer")
        );
        assert!(installer.manifest().snapshot("engineer").is_some());
        assert!(!crate::lock::lock_dir_for(&installer.settings_path()).exists());
    }

    #[test]
    fn test_does_not_clobber_existing_settings() {
        let temp = TempDir::new().unwrap();
        let installer = installer(&temp);
        let path = installer.settings_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"model": "opus", "permissions": {"allow": ["Bash"]}}"#).unwrap();

        installer.install_kit("engineer", &kit_source()).unwrap();

        let written = read_json(&path);
        assert_eq!(written["model"], json!("opus"));
        assert_eq!(written["permissions"], json!({"allow": ["Bash"]}));
        assert!(written["hooks"]["SessionStart"].is_array());
    }

    #[test]
    fn test_refuses_corrupt_settings() {
        let temp = TempDir::new().unwrap();
        let installer = installer(&temp);
        let path = installer.settings_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ broken").unwrap();

        let err = installer.install_kit("engineer", &kit_source()).unwrap_err();
        assert!(matches!(err, CkError::ConfigMalformed { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ broken");
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let installer = installer(&temp).dry_run(true);

        let result = installer.install_kit("engineer", &kit_source()).unwrap();
        assert_eq!(result.hooks_added, 1);
        assert!(!installer.settings_path().exists());
        assert!(!installer.storage().manifest_file().exists());
    }

    #[test]
    fn test_user_deletion_respected_on_reinstall() {
        let temp = TempDir::new().unwrap();
        let installer = installer(&temp);
        installer.install_kit("engineer", &kit_source()).unwrap();

        // User removes the hook by hand.
        let path = installer.settings_path();
        fs::write(&path, r#"{"hooks": {"SessionStart": []}}"#).unwrap();

        let result = installer.install_kit("engineer", &kit_source()).unwrap();
        assert_eq!(result.hooks_added, 0);
        assert_eq!(result.hooks_skipped, 1);
        assert_eq!(read_json(&path)["hooks"], json!({"SessionStart": []}));
    }

    #[test]
    fn test_reinstall_is_stable() {
        let temp = TempDir::new().unwrap();
        let installer = installer(&temp);
        installer.install_kit("engineer", &kit_source()).unwrap();
        let first = fs::read_to_string(installer.settings_path()).unwrap();

        let result = installer.install_kit("engineer", &kit_source()).unwrap();
        assert!(!result.has_changes());
        assert!(result.conflicts_detected.is_empty());
        assert_eq!(fs::read_to_string(installer.settings_path()).unwrap(), first);
    }

    #[test]
    fn test_record_and_classify_files() {
        let temp = TempDir::new().unwrap();
        let installer = installer(&temp);
        let kit_dir = temp.path().join(".claude").join("hooks");
        fs::create_dir_all(kit_dir.join("lib")).unwrap();
        fs::write(kit_dir.join("init.cjs"), "console.log(1)").unwrap();
        fs::write(kit_dir.join("lib").join("util.cjs"), "module.exports = {}").unwrap();

        assert_eq!(installer.record_files("engineer", &kit_dir).unwrap(), 2);

        fs::write(kit_dir.join("init.cjs"), "console.log(2)").unwrap();
        fs::write(kit_dir.join("mine.cjs"), "// mine").unwrap();

        let classified = installer.classify_files("engineer", &kit_dir).unwrap();
        assert_eq!(
            classified,
            vec![
                ("init.cjs".to_string(), Ownership::CkModified),
                ("lib/util.cjs".to_string(), Ownership::Ck),
                ("mine.cjs".to_string(), Ownership::User),
            ]
        );
    }
}
