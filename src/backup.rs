//! Flat-file mirror of the experiment table. The database is authoritative;
//! the mirror is a derived projection kept fresh on every create/delete and
//! rebuildable wholesale. Deleted rows are archived with deleter identity
//! before removal.

use std::fs::{self, OpenOptions};
use std::path::Path;

use chrono::Utc;
use csv::{ReaderBuilder, WriterBuilder};
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::files::StorageLayout;
use crate::model::{BACKUP_COLUMNS, BackupRow};
use crate::util::{now_utc_string, utc_compact_string};

fn mirror_write_err(path: &Path) -> impl FnOnce(csv::Error) -> PipelineError + '_ {
    move |err| PipelineError::Validation(format!("mirror write failed for {}: {err}", path.display()))
}

/// Create the mirror with headers when it does not exist yet.
pub fn ensure_mirror_exists(layout: &StorageLayout) -> PipelineResult<()> {
    let path = layout.mirror_path();
    if path.exists() {
        return Ok(());
    }
    write_rows(&path, &[])
}

/// Read every live mirror row. A missing mirror reads as empty.
pub fn read_all(layout: &StorageLayout) -> PipelineResult<Vec<BackupRow>> {
    let path = layout.mirror_path();
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_path(&path)
        .map_err(|err| {
            PipelineError::Validation(format!("failed to read mirror {}: {err}", path.display()))
        })?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| {
            PipelineError::Validation(format!("malformed mirror row in {}: {err}", path.display()))
        })?;
        let fields: Vec<&str> = record.iter().collect();
        rows.push(BackupRow::from_fields(&fields)?);
    }
    Ok(rows)
}

/// Rewrite the whole mirror, sorted by identifier.
pub fn write_all(layout: &StorageLayout, rows: &[BackupRow]) -> PipelineResult<()> {
    let mut sorted: Vec<&BackupRow> = rows.iter().collect();
    sorted.sort_by_key(|row| row.id);
    write_rows(
        &layout.mirror_path(),
        &sorted.iter().map(|row| row.to_fields()).collect::<Vec<_>>(),
    )
}

/// Add (or refresh) one experiment's row after a successful upload.
pub fn append_row(layout: &StorageLayout, row: BackupRow) -> PipelineResult<()> {
    ensure_mirror_exists(layout)?;
    let mut rows = read_all(layout)?;
    rows.retain(|existing| existing.id != row.id);
    let id = row.id;
    rows.push(row);
    write_all(layout, &rows)?;
    info!(experiment_id = id, "mirrored experiment to backup csv");
    Ok(())
}

/// Remove one experiment's row, archiving it (with deleter identity and
/// timestamp) into the deleted CSV first. Returns whether a row was present.
pub fn remove_row(
    layout: &StorageLayout,
    experiment_id: i64,
    deleted_by: &str,
) -> PipelineResult<bool> {
    let rows = read_all(layout)?;
    let Some(deleted) = rows.iter().find(|row| row.id == experiment_id).cloned() else {
        return Ok(false);
    };

    archive_deleted_row(layout, &deleted, deleted_by)?;

    let remaining: Vec<BackupRow> = rows
        .into_iter()
        .filter(|row| row.id != experiment_id)
        .collect();
    write_all(layout, &remaining)?;

    info!(experiment_id, "removed experiment from backup csv");
    Ok(true)
}

/// Flip the visibility cell for one row.
pub fn update_visibility(
    layout: &StorageLayout,
    experiment_id: i64,
    is_public: bool,
) -> PipelineResult<()> {
    let mut rows = read_all(layout)?;
    let Some(row) = rows.iter_mut().find(|row| row.id == experiment_id) else {
        return Err(PipelineError::Validation(format!(
            "experiment {experiment_id} not present in backup csv"
        )));
    };
    row.is_public = is_public.to_string();
    write_all(layout, &rows)
}

/// Copy the current mirror into `deleted/` with a timestamp, preserving the
/// pre-mutation state for manual recovery.
pub fn snapshot_mirror(layout: &StorageLayout) -> PipelineResult<Option<String>> {
    let path = layout.mirror_path();
    if !path.exists() {
        return Ok(None);
    }

    let snapshot_name = format!("metadata_backup_{}.csv", utc_compact_string(Utc::now()));
    let snapshot_path = layout.deleted_dir().join(&snapshot_name);
    fs::create_dir_all(layout.deleted_dir()).map_err(|err| PipelineError::io(layout.deleted_dir(), err))?;
    fs::copy(&path, &snapshot_path).map_err(|err| PipelineError::io(&snapshot_path, err))?;
    Ok(Some(snapshot_name))
}

/// Read the deleted-row archive (audit trail).
pub fn read_deleted(layout: &StorageLayout) -> PipelineResult<Vec<(BackupRow, String, String)>> {
    let path = layout.deleted_archive_path();
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_path(&path)
        .map_err(|err| {
            PipelineError::Validation(format!("failed to read {}: {err}", path.display()))
        })?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| {
            PipelineError::Validation(format!("malformed deleted row in {}: {err}", path.display()))
        })?;
        let fields: Vec<&str> = record.iter().collect();
        let row = BackupRow::from_fields(&fields)?;
        let deleted_at = fields.get(BACKUP_COLUMNS.len()).unwrap_or(&"").to_string();
        let deleted_by = fields.get(BACKUP_COLUMNS.len() + 1).unwrap_or(&"").to_string();
        rows.push((row, deleted_at, deleted_by));
    }
    Ok(rows)
}

fn archive_deleted_row(
    layout: &StorageLayout,
    row: &BackupRow,
    deleted_by: &str,
) -> PipelineResult<()> {
    let path = layout.deleted_archive_path();
    let needs_header = !path.exists();

    if needs_header {
        let mut header: Vec<&str> = BACKUP_COLUMNS.to_vec();
        header.push("deleted_at");
        header.push("deleted_by");
        let mut writer = WriterBuilder::new()
            .from_path(&path)
            .map_err(mirror_write_err(&path))?;
        writer.write_record(&header).map_err(mirror_write_err(&path))?;
        writer.flush().map_err(|err| PipelineError::io(&path, err))?;
    }

    let file = OpenOptions::new()
        .append(true)
        .open(&path)
        .map_err(|err| PipelineError::io(&path, err))?;
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

    let mut fields = row.to_fields();
    fields.push(now_utc_string());
    fields.push(deleted_by.to_string());
    writer.write_record(&fields).map_err(mirror_write_err(&path))?;
    writer
        .into_inner()
        .map_err(|err| PipelineError::Validation(format!("mirror flush failed: {err}")))?;

    Ok(())
}

fn write_rows(path: &Path, rows: &[Vec<String>]) -> PipelineResult<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .map_err(mirror_write_err(path))?;
    writer
        .write_record(BACKUP_COLUMNS)
        .map_err(mirror_write_err(path))?;
    for fields in rows {
        writer.write_record(fields).map_err(mirror_write_err(path))?;
    }
    writer.flush().map_err(|err| PipelineError::io(path, err))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> (tempfile::TempDir, StorageLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        layout.ensure().unwrap();
        (dir, layout)
    }

    fn row(id: i64, name: &str) -> BackupRow {
        BackupRow {
            id,
            name: name.to_string(),
            technology: "illumina".to_string(),
            caller_name: "deepvariant".to_string(),
            truth_set_name: "giab".to_string(),
            is_phased: "false".to_string(),
            is_public: "true".to_string(),
            created_at: "2026-01-01".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn append_and_read_round_trip() {
        let (_dir, layout) = layout();
        append_row(&layout, row(2, "HG002_b")).unwrap();
        append_row(&layout, row(1, "HG002_a")).unwrap();

        let rows = read_all(&layout).unwrap();
        assert_eq!(rows.len(), 2);
        // Rows come back sorted by id.
        assert_eq!(rows[0].id, 1);
        assert_eq!(rows[1].id, 2);
        assert_eq!(rows[0].name, "HG002_a");
    }

    #[test]
    fn append_replaces_stale_row_for_same_id() {
        let (_dir, layout) = layout();
        append_row(&layout, row(1, "old_name")).unwrap();
        append_row(&layout, row(1, "new_name")).unwrap();

        let rows = read_all(&layout).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "new_name");
    }

    #[test]
    fn remove_archives_before_dropping() {
        let (_dir, layout) = layout();
        append_row(&layout, row(1, "HG002_a")).unwrap();
        append_row(&layout, row(2, "HG002_b")).unwrap();

        let removed = remove_row(&layout, 1, "snv_admin").unwrap();
        assert!(removed);

        let rows = read_all(&layout).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 2);

        let deleted = read_deleted(&layout).unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].0.id, 1);
        assert_eq!(deleted[0].2, "snv_admin");
        assert!(!deleted[0].1.is_empty());
    }

    #[test]
    fn removing_absent_row_is_a_quiet_no_op() {
        let (_dir, layout) = layout();
        ensure_mirror_exists(&layout).unwrap();
        assert!(!remove_row(&layout, 42, "snv_admin").unwrap());
        assert!(read_deleted(&layout).unwrap().is_empty());
    }

    #[test]
    fn visibility_update_rewrites_cell() {
        let (_dir, layout) = layout();
        append_row(&layout, row(1, "HG002_a")).unwrap();
        update_visibility(&layout, 1, false).unwrap();

        let rows = read_all(&layout).unwrap();
        assert_eq!(rows[0].is_public, "false");
        assert!(!rows[0].is_public());
    }

    #[test]
    fn snapshot_copies_mirror_into_deleted_dir() {
        let (_dir, layout) = layout();
        append_row(&layout, row(1, "HG002_a")).unwrap();

        let name = snapshot_mirror(&layout).unwrap().unwrap();
        assert!(layout.deleted_dir().join(&name).exists());
    }
}
