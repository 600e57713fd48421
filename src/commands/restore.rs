//! Disaster recovery: re-ingest the database from the CSV backup mirror.
//! Rows whose identifier is already live are skipped, so a restore is
//! idempotent and safe to re-run after a partial recovery. Result files
//! still present on disk are re-parsed through the normal pipeline.

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::backup;
use crate::cli::RestoreArgs;
use crate::commands::upload::resolve_created_at;
use crate::error::PipelineResult;
use crate::files::StorageLayout;
use crate::happy;
use crate::model::{BackupRow, ExperimentRequest, IdSpace, Visibility};
use crate::store::{self, experiments, results};
use crate::util::{clean_value, sha256_file};

#[derive(Debug, Default, Serialize)]
pub struct RestoreSummary {
    pub restored: usize,
    pub skipped_existing: usize,
    pub results_attached: usize,
    pub warnings: Vec<String>,
}

pub fn run(args: RestoreArgs) -> Result<()> {
    let layout = StorageLayout::new(args.storage.data_root());
    layout.ensure()?;

    let db_path = args.storage.resolved_db_path();
    let mut connection = store::open_store(&db_path)?;

    let summary = restore_from_mirror(
        &mut connection,
        &layout,
        args.id_space.to_id_space(),
        args.skip_results,
    )?;

    for warning in &summary.warnings {
        warn!(warning = %warning, "restore completed with warning");
    }
    info!(
        restored = summary.restored,
        skipped_existing = summary.skipped_existing,
        results_attached = summary.results_attached,
        "restore completed"
    );
    Ok(())
}

pub fn restore_from_mirror(
    connection: &mut Connection,
    layout: &StorageLayout,
    id_space: IdSpace,
    skip_results: bool,
) -> PipelineResult<RestoreSummary> {
    let rows = backup::read_all(layout)?;
    let mut summary = RestoreSummary::default();

    for row in rows {
        if experiments::exists(connection, row.id)? {
            summary.skipped_existing += 1;
            continue;
        }

        match restore_row(connection, layout, &row, id_space, skip_results) {
            Ok(results_attached) => {
                summary.restored += 1;
                if results_attached {
                    summary.results_attached += 1;
                }
            }
            Err(err) => {
                warn!(experiment_id = row.id, error = %err, "failed to restore mirror row");
                summary
                    .warnings
                    .push(format!("experiment {} not restored: {err}", row.id));
            }
        }
    }

    Ok(summary)
}

fn restore_row(
    connection: &mut Connection,
    layout: &StorageLayout,
    row: &BackupRow,
    id_space: IdSpace,
    skip_results: bool,
) -> PipelineResult<bool> {
    let metadata = row.to_metadata();
    metadata.validate_required()?;
    let dimensions = metadata.dimension_set()?;

    // The mirror carries no owner id; private rows come back as legacy
    // (admin-managed) rows.
    let visibility = if row.is_public() {
        Visibility::Public
    } else {
        Visibility::Private { owner_id: None }
    };

    let file_name = clean_value(Some(row.file_name.as_str()));
    let live_file = file_name.as_deref().map(|name| layout.live_file(name));
    let file_sha256 = match &live_file {
        Some(path) if path.exists() => sha256_file(path).ok(),
        _ => None,
    };

    let request = ExperimentRequest {
        requested_id: Some(row.id),
        name: row.name.clone(),
        description: None,
        created_at: resolve_created_at(metadata.created_at.as_deref()),
        visibility,
        owner_username: clean_value(Some(row.owner_username.as_str())),
        file_name: file_name.clone(),
        file_sha256,
        dimensions,
    };

    let tx = connection.transaction()?;
    let (experiment_id, _) = experiments::assemble(&tx, &request, id_space)?;

    let mut results_attached = false;
    if !skip_results {
        if let Some(path) = &live_file {
            if path.exists() {
                match happy::parse_result_file(path) {
                    Ok(parsed) => {
                        let counts = results::attach_results(&tx, experiment_id, &parsed)?;
                        results_attached = !counts.already_processed;
                    }
                    Err(err) => {
                        // Keep the experiment row; the file can be re-parsed
                        // once it is repaired.
                        warn!(experiment_id, error = %err, "result file could not be re-parsed");
                    }
                }
            }
        }
    }

    tx.commit()?;
    info!(experiment_id, "restored experiment from mirror");
    Ok(results_attached)
}
