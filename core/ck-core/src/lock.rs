//! Advisory lock around a settings file.
//!
//! Two installers writing the same `settings.json` would each merge against a
//! stale copy and the second write would silently drop the first kit's hooks.
//! Every read-merge-write cycle therefore holds `<settings>.lock/`.
//!
//! # Lock Structure
//!
//! ```text
//! ~/.claude/settings.json.lock/
//! └── meta.json  # {"pid": 12345, "created": "2026-01-01T00:00:00Z"}
//! ```
//!
//! `create_dir` is atomic, so whichever process creates the directory owns the
//! lock. A lock is stale when its holder is dead or when it is older than
//! [`LockConfig::stale_after`]; stale locks are cleared and the acquire retried.

use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{debug, warn};

use crate::config::LockConfig;
use crate::error::{CkError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockMeta {
    pid: u32,
    created: DateTime<Utc>,
}

/// Check if a process with the given PID is running.
pub fn is_pid_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::kill(pid as i32, 0) == 0 }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

pub fn lock_dir_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    target.with_file_name(name)
}

/// Held for the duration of a merge. Released on drop.
#[derive(Debug)]
pub struct SettingsLock {
    dir: PathBuf,
}

impl SettingsLock {
    pub fn acquire(target: &Path, config: &LockConfig) -> Result<Self> {
        let dir = lock_dir_for(target);
        if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent).map_err(|e| CkError::io("creating lock parent", e))?;
        }

        let mut attempt = 0;
        loop {
            match fs::create_dir(&dir) {
                Ok(()) => {
                    write_meta(&dir)?;
                    debug!(lock = %dir.display(), "Acquired settings lock");
                    return Ok(Self { dir });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
                Err(err) => return Err(CkError::io("creating lock directory", err)),
            }

            let meta = read_meta(&dir);
            if is_stale(&dir, meta.as_ref(), config) {
                warn!(
                    lock = %dir.display(),
                    holder = ?meta.as_ref().map(|m| m.pid),
                    "Clearing stale settings lock"
                );
                match fs::remove_dir_all(&dir) {
                    Ok(()) => continue,
                    Err(err) if err.kind() == ErrorKind::NotFound => continue,
                    Err(err) => return Err(CkError::io("removing stale lock", err)),
                }
            }

            if attempt >= config.retries {
                return Err(CkError::LockTimeout {
                    path: target.to_path_buf(),
                    holder: meta.map(|m| m.pid),
                });
            }
            attempt += 1;
            thread::sleep(config.retry_delay());
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl Drop for SettingsLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.dir) {
            if err.kind() != ErrorKind::NotFound {
                warn!(lock = %self.dir.display(), error = %err, "Failed to release settings lock");
            }
        }
    }
}

fn write_meta(dir: &Path) -> Result<()> {
    let meta = LockMeta {
        pid: std::process::id(),
        created: Utc::now(),
    };
    let content =
        serde_json::to_string(&meta).map_err(|e| CkError::json("serializing lock meta", e))?;
    if let Err(err) = fs::write(dir.join("meta.json"), content) {
        let _ = fs::remove_dir_all(dir);
        return Err(CkError::io("writing lock meta", err));
    }
    Ok(())
}

fn read_meta(dir: &Path) -> Option<LockMeta> {
    let content = fs::read_to_string(dir.join("meta.json")).ok()?;
    serde_json::from_str(&content).ok()
}

fn is_stale(dir: &Path, meta: Option<&LockMeta>, config: &LockConfig) -> bool {
    let stale_after = config.stale_after();
    match meta {
        Some(meta) => {
            // A creation time in the future counts as brand new.
            let age = (Utc::now() - meta.created).to_std().unwrap_or_default();
            !is_pid_alive(meta.pid) || age > stale_after
        }
        // Holder may still be writing meta.json; fall back to the dir mtime.
        None => fs::metadata(dir)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age > stale_after),
    }
}
