//! Storage configuration and path management.
//!
//! Centralizes every path the installer touches so tests can point the whole
//! thing at a temp directory.
//!
//! ```text
//! ~/.claude/
//! ├── settings.json        # the file we merge into
//! ├── settings.json.lock/  # advisory lock while a merge is writing
//! └── .ck/
//!     ├── manifest.json    # installed-state snapshots per kit
//!     ├── config.toml      # engine configuration (optional)
//!     └── logs/            # rolling log files from the CLI
//! ```

use std::path::{Path, PathBuf};

use crate::error::{CkError, Result};

const CK_DIR: &str = ".ck";

/// Central configuration for all installer paths.
///
/// Production code uses [`StorageConfig::from_home`]; tests use
/// [`StorageConfig::with_roots`] for isolation.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Claude Code's directory (default: ~/.claude)
    claude_root: PathBuf,
    /// Installer state (default: ~/.claude/.ck)
    root: PathBuf,
}

impl StorageConfig {
    pub fn from_home() -> Result<Self> {
        let home = dirs::home_dir().ok_or(CkError::HomeDirNotFound)?;
        Ok(Self::for_claude_root(home.join(".claude")))
    }

    /// Project-local installs use `<project>/.claude`.
    pub fn for_claude_root(claude_root: PathBuf) -> Self {
        let root = claude_root.join(CK_DIR);
        Self { claude_root, root }
    }

    pub fn with_roots(root: PathBuf, claude_root: PathBuf) -> Self {
        Self { claude_root, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn claude_root(&self) -> &Path {
        &self.claude_root
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Files
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn settings_file(&self, file_name: &str) -> PathBuf {
        self.claude_root.join(file_name)
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Ensures the installer state directory exists.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs_err::create_dir_all(&self.root)?;
        fs_err::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
