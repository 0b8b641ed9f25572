use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Configuration for the cuenote maintenance tool.
#[derive(Parser, Debug)]
#[command(name = "cuenote")]
#[command(about = "Inspect, export, import and restore cuenote video note storage")]
pub struct Config {
    /// Base directory for local note storage
    #[arg(long, env = "CUENOTE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Cloud sync service URL; omit to run local-only
    #[arg(long, env = "CUENOTE_CLOUD_URL")]
    pub cloud_url: Option<String>,

    /// Bearer token for the cloud sync service
    #[arg(long, env = "CUENOTE_CLOUD_TOKEN")]
    pub cloud_token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Config {
    /// Get the effective local data directory.
    pub fn effective_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("cuenote")
        })
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show storage status: counts, pending sync, backups, lock state
    Status,
    /// Write every stored video and its notes as JSON
    Export {
        /// Output path; "-" writes to stdout
        #[arg(long, default_value = "-")]
        output: String,
    },
    /// Load videos from a JSON export
    Import {
        /// Path of a JSON export file
        input: PathBuf,
        /// How the file combines with the current store
        #[arg(long, value_enum, default_value = "replace")]
        strategy: ImportStrategy,
    },
    /// Create a backup of the current store
    Backup {
        /// Reason recorded in the backup
        #[arg(long, default_value = "manual")]
        reason: String,
    },
    /// List stored backups, newest first
    Backups,
    /// Restore the store from a backup key
    Restore {
        /// Backup key as printed by `backups`, e.g. backup_1700000000000
        key: String,
    },
    /// Delete every stored video
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ImportStrategy {
    /// Replace the whole store with the file, after taking a backup
    Replace,
    /// Merge the file's notes into existing videos, keeping both sides
    Merge,
}
