use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::model::IdSpace;

#[derive(Parser, Debug)]
#[command(
    name = "snvbench",
    version,
    about = "Local SNV benchmarking ingestion and maintenance tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Upload(UploadArgs),
    Delete(DeleteArgs),
    Visibility(VisibilityArgs),
    Restore(RestoreArgs),
    RebuildBackup(RebuildBackupArgs),
    Status(StatusArgs),
}

/// Shared flags naming the flat data directory and the database file.
#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    #[arg(long, default_value = "data/happy_files")]
    pub data_root: PathBuf,

    /// Database path; defaults to `<data-root>/benchmarking.db`.
    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

impl StorageArgs {
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.data_root.join("benchmarking.db"))
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum IdSpaceMode {
    Flat,
    Partitioned,
}

impl IdSpaceMode {
    pub fn to_id_space(self) -> IdSpace {
        match self {
            Self::Flat => IdSpace::Flat,
            Self::Partitioned => IdSpace::Partitioned,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum VisibilityMode {
    Public,
    Private,
}

/// Caller identity flags shared by the mutating commands.
#[derive(Args, Debug, Clone)]
pub struct PrincipalArgs {
    #[arg(long, default_value = "anonymous")]
    pub username: String,

    #[arg(long)]
    pub user_id: Option<i64>,

    #[arg(long, default_value_t = false)]
    pub admin: bool,
}

#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    #[command(flatten)]
    pub storage: StorageArgs,

    /// hap.py extended summary CSV to ingest.
    #[arg(long)]
    pub results_file: PathBuf,

    /// Experiment metadata as a JSON dictionary (web-form shape).
    #[arg(long)]
    pub metadata_file: PathBuf,

    /// Explicit experiment identifier; auto-assigned when omitted.
    #[arg(long)]
    pub experiment_id: Option<i64>,

    #[arg(long, value_enum, default_value_t = IdSpaceMode::Flat)]
    pub id_space: IdSpaceMode,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub storage: StorageArgs,

    #[command(flatten)]
    pub principal: PrincipalArgs,

    #[arg(long)]
    pub experiment_id: i64,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct VisibilityArgs {
    #[command(flatten)]
    pub storage: StorageArgs,

    #[command(flatten)]
    pub principal: PrincipalArgs,

    #[arg(long)]
    pub experiment_id: i64,

    #[arg(long, value_enum)]
    pub visibility: VisibilityMode,

    /// Reassign ownership while making the experiment private.
    #[arg(long)]
    pub owner_id: Option<i64>,

    #[arg(long)]
    pub owner_username: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RestoreArgs {
    #[command(flatten)]
    pub storage: StorageArgs,

    #[arg(long, value_enum, default_value_t = IdSpaceMode::Flat)]
    pub id_space: IdSpaceMode,

    /// Skip re-parsing result files found on disk.
    #[arg(long, default_value_t = false)]
    pub skip_results: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RebuildBackupArgs {
    #[command(flatten)]
    pub storage: StorageArgs,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub storage: StorageArgs,
}
