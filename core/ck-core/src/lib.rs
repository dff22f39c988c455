//! # ck-core
//!
//! Settings merge engine for kit installs. Merges a kit's template
//! `settings.json` into the user's existing one: hooks are deduplicated by
//! normalized command, deprecated entries are removed, entries the user deleted
//! stay deleted, and every added hook is tagged with the kit that shipped it.
//!
//! ## Design Principles
//!
//! - **Pure core**: [`merge::merge_settings`] takes values and returns a value.
//!   No I/O, no clock, no environment. Inputs are never mutated.
//! - **Graceful degradation**: Malformed settings, manifests and config files
//!   degrade to empty/default values with a warning, never a panic.
//! - **User edits win**: On any collision the destination is kept.
//! - **Synchronous**: No async runtime. Concurrent installers are serialized
//!   by an advisory lock directory next to the settings file.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ck_core::{SettingsInstaller, SettingsTree, StorageConfig};
//!
//! let installer = SettingsInstaller::from_storage(StorageConfig::from_home()?)?;
//! let source = SettingsTree::from_value(serde_json::from_str(&template)?);
//! let result = installer.install_kit("engineer", &source)?;
//! println!("{} hooks added", result.hooks_added);
//! ```

pub mod config;
pub mod error;
pub mod installer;
pub mod lock;
pub mod manifest;
pub mod merge;
pub mod normalize;
pub mod ownership;
pub mod settings_file;
pub mod storage;
pub mod types;

pub use config::{load_engine_config, EngineConfig, LockConfig, SettingsConfig};
pub use error::{CkError, Result};
pub use installer::SettingsInstaller;
pub use lock::SettingsLock;
pub use manifest::{KitRecord, ManifestStore};
pub use merge::resolver::{resolve, Presence, Resolution};
pub use merge::{merge_settings, merge_settings_with, MergeOptions, MergeResult};
pub use normalize::{normalize_command, CANONICAL_ROOT_TOKEN};
pub use ownership::{hash_bytes, hash_entry, hash_file, Ownership};
pub use settings_file::{read_settings, write_settings};
pub use storage::StorageConfig;
pub use types::{
    CommandHook, HookEntry, HookTable, InstalledSettings, KitClaims, MatcherGroup, McpSection,
    SettingsTree,
};
