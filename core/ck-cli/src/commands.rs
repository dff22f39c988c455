//! Subcommand implementations.

use ck_core::{normalize_command, CkError, SettingsInstaller, SettingsTree, StorageConfig};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] CkError),

    #[error("Failed to read kit settings {path}: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Kit settings {path} are not valid JSON: {source}")]
    SourceInvalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("Failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Parses `ID=PATH` for `--kit`.
pub fn parse_kit_arg(value: &str) -> Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((id, path)) if !id.is_empty() && !path.is_empty() => {
            Ok((id.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected ID=PATH, got \"{value}\"")),
    }
}

fn load_source(path: &Path) -> Result<SettingsTree, CliError> {
    let content = fs_err::read_to_string(path).map_err(|source| CliError::SourceUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let value = serde_json::from_str(&content).map_err(|source| CliError::SourceInvalid {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(SettingsTree::from_value(value))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

pub fn merge(
    storage: StorageConfig,
    kits: &[(String, PathBuf)],
    dry_run: bool,
) -> Result<(), CliError> {
    let sources = kits
        .iter()
        .map(|(id, path)| load_source(path).map(|tree| (id.as_str(), tree)))
        .collect::<Result<Vec<_>, CliError>>()?;
    let refs: Vec<(&str, &SettingsTree)> = sources.iter().map(|(id, tree)| (*id, tree)).collect();

    let installer = SettingsInstaller::from_storage(storage)?.dry_run(dry_run);
    let result = installer.install_kits(&refs)?;
    print_json(&result)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KitStatus<'a> {
    kit: &'a str,
    installed_at: String,
    hooks: usize,
    mcp_servers: usize,
    files: usize,
}

pub fn status(storage: StorageConfig) -> Result<(), CliError> {
    let installer = SettingsInstaller::from_storage(storage)?;
    let manifest = installer.manifest();
    let kits: Vec<KitStatus> = manifest
        .kits()
        .map(|(kit, record)| KitStatus {
            kit,
            installed_at: record.installed_at.to_rfc3339(),
            hooks: record.settings.hooks.len(),
            mcp_servers: record.settings.mcp_servers.len(),
            files: record.files.len(),
        })
        .collect();
    print_json(&kits)
}

pub fn record_files(storage: StorageConfig, kit: &str, dir: &Path) -> Result<(), CliError> {
    let installer = SettingsInstaller::from_storage(storage)?;
    let count = installer.record_files(kit, dir)?;
    info!(kit, dir = %dir.display(), files = count, "Recorded kit files");
    Ok(())
}

pub fn classify(storage: StorageConfig, kit: &str, dir: &Path) -> Result<(), CliError> {
    let installer = SettingsInstaller::from_storage(storage)?;
    let mut stdout = std::io::stdout().lock();
    for (path, ownership) in installer.classify_files(kit, dir)? {
        writeln!(stdout, "{ownership}\t{path}")?;
    }
    Ok(())
}

pub fn normalize(command: &str) -> Result<(), CliError> {
    writeln!(std::io::stdout(), "{}", normalize_command(command))?;
    Ok(())
}
