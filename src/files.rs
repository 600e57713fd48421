//! Result-file storage: the flat data directory, the standardized filename
//! convention, scratch staging for uploads, and archive moves on delete.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use regex::Regex;
use tracing::{info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::util::{ensure_directory, normalize_key_component, utc_compact_string};

/// Directory layout under one data root: live result files and the CSV
/// mirror side by side, mirror snapshots under `deleted/`, archived result
/// files under `deleted_experiments/`, upload scratch under `.staging/`.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    data_root: PathBuf,
}

pub const MIRROR_FILE_NAME: &str = "000_experiments_backup.csv";
pub const DELETED_ARCHIVE_FILE_NAME: &str = "000_deleted.csv";

impl StorageLayout {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn mirror_path(&self) -> PathBuf {
        self.data_root.join(MIRROR_FILE_NAME)
    }

    pub fn deleted_archive_path(&self) -> PathBuf {
        self.data_root.join(DELETED_ARCHIVE_FILE_NAME)
    }

    /// Timestamped mirror snapshots taken before destructive edits.
    pub fn deleted_dir(&self) -> PathBuf {
        self.data_root.join("deleted")
    }

    /// Archived result files of deleted experiments.
    pub fn archive_dir(&self) -> PathBuf {
        self.data_root.join("deleted_experiments")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.data_root.join(".staging")
    }

    pub fn live_file(&self, file_name: &str) -> PathBuf {
        self.data_root.join(file_name)
    }

    pub fn ensure(&self) -> Result<()> {
        ensure_directory(&self.data_root)?;
        ensure_directory(&self.deleted_dir())?;
        ensure_directory(&self.archive_dir())?;
        ensure_directory(&self.staging_dir())?;
        Ok(())
    }
}

/// Standardized result-file name:
/// `{id:03}_{sample}_{technology}_{platform}_{caller}_{truthset}.csv`, every
/// component lowercased and whitespace-stripped. `sample` is the first
/// `_`-token of the experiment name. Three-digit zero padding keeps
/// directory listings in identifier order.
pub fn standardized_filename(
    experiment_id: i64,
    experiment_name: &str,
    technology: &str,
    platform: &str,
    caller: &str,
    truth_set: &str,
) -> String {
    let sample = experiment_name.split('_').next().unwrap_or_default();
    format!(
        "{experiment_id:03}_{}_{}_{}_{}_{}.csv",
        normalize_key_component(sample),
        normalize_key_component(technology),
        normalize_key_component(platform),
        normalize_key_component(caller),
        normalize_key_component(truth_set),
    )
}

/// Copy an uploaded file into the scratch directory. Nothing outside
/// `.staging/` is touched until the database has committed.
pub fn stage_file(layout: &StorageLayout, source: &Path, file_name: &str) -> PipelineResult<PathBuf> {
    let staged = layout.staging_dir().join(file_name);
    if let Some(parent) = staged.parent() {
        fs::create_dir_all(parent).map_err(|err| PipelineError::io(parent, err))?;
    }
    fs::copy(source, &staged).map_err(|err| PipelineError::io(source, err))?;
    Ok(staged)
}

/// Promote a staged file into the flat data directory. Same filesystem, so a
/// rename is atomic; a failure here leaves the staged copy for cleanup.
pub fn promote_staged_file(
    layout: &StorageLayout,
    staged: &Path,
    file_name: &str,
) -> PipelineResult<PathBuf> {
    let destination = layout.live_file(file_name);
    if destination.exists() {
        return Err(PipelineError::Conflict(format!(
            "result file already exists: {}",
            destination.display()
        )));
    }
    fs::rename(staged, &destination).map_err(|err| PipelineError::io(staged, err))?;
    Ok(destination)
}

/// Remove a file that must not outlive a failed database write. Best effort;
/// a leftover is logged, not fatal, because the database already rolled back.
pub fn remove_orphan(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if path.exists() {
            warn!(path = %path.display(), error = %err, "failed to remove orphaned file");
        }
    }
}

/// Locate the live result file for an experiment: exact name when known,
/// otherwise the first file whose name starts with the zero-padded
/// identifier prefix.
pub fn locate_result_file(
    layout: &StorageLayout,
    experiment_id: i64,
    known_name: Option<&str>,
) -> Result<Option<PathBuf>> {
    if let Some(name) = known_name {
        let exact = layout.live_file(name);
        if exact.exists() {
            return Ok(Some(exact));
        }
    }

    let prefix = Regex::new(&format!(r"^{experiment_id:03}_"))
        .context("failed to compile identifier prefix pattern")?;

    let entries = fs::read_dir(layout.data_root())
        .with_context(|| format!("failed to read {}", layout.data_root().display()))?;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if prefix.is_match(file_name) && file_name.ends_with(".csv") {
            return Ok(Some(entry.path()));
        }
    }

    Ok(None)
}

/// Move a deleted experiment's result file into the archive directory with a
/// timestamp suffix. A missing file is not an error.
pub fn archive_result_file(
    layout: &StorageLayout,
    experiment_id: i64,
    known_name: Option<&str>,
) -> Result<Option<String>> {
    let Some(live_path) = locate_result_file(layout, experiment_id, known_name)? else {
        info!(experiment_id, "no result file found to archive");
        return Ok(None);
    };

    ensure_directory(&layout.archive_dir())?;

    let file_name = live_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("result.csv");
    let (stem, extension) = match file_name.rsplit_once('.') {
        Some((stem, extension)) => (stem, format!(".{extension}")),
        None => (file_name, String::new()),
    };
    let archived_name = format!("{stem}_{}{extension}", utc_compact_string(Utc::now()));
    let archived_path = layout.archive_dir().join(&archived_name);

    fs::rename(&live_path, &archived_path)
        .with_context(|| format!("failed to archive {}", live_path.display()))?;

    info!(
        from = %live_path.display(),
        to = %archived_path.display(),
        "archived result file"
    );
    Ok(Some(archived_name))
}
