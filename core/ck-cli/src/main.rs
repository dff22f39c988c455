//! ck-settings: merges kit settings into a Claude settings file.
//!
//! ## Subcommands
//!
//! - `merge`: merge one or more kits' `settings.json` into the destination
//! - `status`: list installed kits from the manifest
//! - `record-files`: hash a kit's files so later installs can classify them
//! - `classify`: report `ck` / `ck-modified` / `user` for each file in a dir
//! - `normalize`: print the canonical form of a hook command

mod commands;
mod logging;

use ck_core::StorageConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ck-settings")]
#[command(about = "Kit settings merge engine")]
#[command(version)]
struct Cli {
    /// Claude directory to install into (default: ~/.claude)
    #[arg(long, global = true, value_name = "DIR")]
    claude_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge kit settings into the settings file and print the report
    Merge {
        /// Kit id and its template settings file; repeat for multi-kit installs
        #[arg(long = "kit", value_name = "ID=PATH", required = true, value_parser = commands::parse_kit_arg)]
        kits: Vec<(String, PathBuf)>,

        /// Compute the report without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// List kits recorded in the manifest
    Status,

    /// Record content hashes for every file under a kit directory
    RecordFiles {
        #[arg(long)]
        kit: String,

        #[arg(long, value_name = "DIR")]
        dir: PathBuf,
    },

    /// Classify every file under a directory against a kit's recorded hashes
    Classify {
        #[arg(long)]
        kit: String,

        #[arg(long, value_name = "DIR")]
        dir: PathBuf,
    },

    /// Print the normalized form of a hook command
    Normalize {
        #[arg(value_name = "COMMAND")]
        command: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let storage = match cli.claude_dir {
        Some(dir) => Ok(StorageConfig::for_claude_root(dir)),
        None => StorageConfig::from_home(),
    };
    let prepared = storage
        .as_ref()
        .ok()
        .map(|s| s.ensure_dirs().map(|()| s.logs_dir()));
    let _logging_guard = logging::init(prepared.as_ref().and_then(|dir| dir.as_deref().ok()));
    if let Some(Err(e)) = &prepared {
        tracing::warn!(error = %e, "State directory unavailable, logging to stderr only");
    }

    let storage = match storage {
        Ok(storage) => storage,
        Err(e) => {
            tracing::error!(error = %e, "ck-settings failed to resolve storage");
            std::process::exit(1);
        }
    };

    let outcome = match cli.command {
        Commands::Merge { kits, dry_run } => commands::merge(storage, &kits, dry_run),
        Commands::Status => commands::status(storage),
        Commands::RecordFiles { kit, dir } => commands::record_files(storage, &kit, &dir),
        Commands::Classify { kit, dir } => commands::classify(storage, &kit, &dir),
        Commands::Normalize { command } => commands::normalize(&command),
    };

    if let Err(e) = outcome {
        tracing::error!(error = %e, "ck-settings failed");
        std::process::exit(1);
    }
}
