//! Delete orchestration: authorization, the child-first cascade inside one
//! transaction, then best-effort mirror archival and result-file archival.
//! Once the database commit lands, the deletion is final; auxiliary failures
//! only widen the warning list.

use std::io::{self, Write};

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::auth::{AccessPolicy, OwnerOrAdminPolicy, Principal, require_delete_permission};
use crate::backup;
use crate::cli::DeleteArgs;
use crate::error::{PipelineError, PipelineResult};
use crate::files::{self, StorageLayout};
use crate::model::DeleteOutcome;
use crate::store::{self, experiments};

pub fn run(args: DeleteArgs) -> Result<()> {
    let layout = StorageLayout::new(args.storage.data_root());
    layout.ensure()?;

    let db_path = args.storage.resolved_db_path();
    let mut connection = store::open_store(&db_path)?;

    let principal = Principal::new(
        args.principal.user_id,
        args.principal.username.clone(),
        args.principal.admin,
    );
    let policy = OwnerOrAdminPolicy;

    let outcome = delete_experiment(
        &mut connection,
        &layout,
        &policy,
        &principal,
        args.experiment_id,
    )?;

    for warning in &outcome.warnings {
        warn!(warning = %warning, "delete completed with warning");
    }
    info!(
        experiment_id = outcome.experiment_id,
        benchmark_rows_deleted = outcome.benchmark_rows_deleted,
        overall_rows_deleted = outcome.overall_rows_deleted,
        "delete completed"
    );

    if args.json {
        let mut output = io::BufWriter::new(io::stdout().lock());
        serde_json::to_writer_pretty(&mut output, &outcome)
            .context("failed to serialize delete outcome")?;
        writeln!(output)?;
        output.flush()?;
    }

    Ok(())
}

/// Delete one experiment and everything hanging off it. Preconditions are
/// checked before any mutation; the row graph goes away in one transaction.
pub fn delete_experiment(
    connection: &mut Connection,
    layout: &StorageLayout,
    policy: &dyn AccessPolicy,
    principal: &Principal,
    experiment_id: i64,
) -> PipelineResult<DeleteOutcome> {
    let row = experiments::fetch(connection, experiment_id)?.ok_or_else(|| {
        PipelineError::Validation(format!("experiment {experiment_id} not found"))
    })?;

    require_delete_permission(policy, principal, experiment_id, row.owner_id)?;

    info!(
        experiment_id = row.id,
        name = %row.name,
        created_at = %row.created_at,
        deleted_by = %principal.username,
        "deleting experiment"
    );

    let tx = connection.transaction()?;
    let (benchmark_deleted, overall_deleted) = experiments::delete_cascade(&tx, experiment_id)?;
    tx.commit()?;

    // Auxiliary cleanup below may lag; the database is already consistent.
    let mut warnings = Vec::new();

    match backup::snapshot_mirror(layout) {
        Ok(Some(snapshot)) => info!(snapshot = %snapshot, "mirror snapshot taken"),
        Ok(None) => {}
        Err(err) => {
            warn!(error = %err, "mirror snapshot failed");
            warnings.push(format!("mirror snapshot failed: {err}"));
        }
    }

    match backup::remove_row(layout, experiment_id, &principal.username) {
        Ok(true) => {}
        Ok(false) => info!(experiment_id, "experiment was not present in backup csv"),
        Err(err) => {
            warn!(error = %err, "backup csv update failed");
            warnings.push(format!("csv backup mirror not updated: {err}"));
        }
    }

    let archived_file = match files::archive_result_file(
        layout,
        experiment_id,
        row.file_name.as_deref(),
    ) {
        Ok(archived) => archived,
        Err(err) => {
            warn!(error = %err, "result file archival failed");
            warnings.push(format!("result file not archived: {err}"));
            None
        }
    };

    Ok(DeleteOutcome {
        experiment_id,
        benchmark_rows_deleted: benchmark_deleted,
        overall_rows_deleted: overall_deleted,
        archived_file,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::commands::upload::upload_experiment;
    use crate::model::{IdSpace, MetadataRecord};
    use crate::store::{count_rows, open_in_memory};

    const HAPPY_HEADER: &str = "Type,Subtype,Subset,Filter,METRIC.Recall,METRIC.Precision,METRIC.F1_Score,TRUTH.TOTAL,TRUTH.TP,TRUTH.FN,QUERY.TOTAL,QUERY.TP,QUERY.FP,QUERY.UNK";

    fn metadata(name: &str, is_public: bool, owner_id: Option<i64>) -> MetadataRecord {
        MetadataRecord {
            exp_name: Some(name.to_string()),
            technology: Some("ont".to_string()),
            platform_name: Some("PromethION".to_string()),
            caller_name: Some("clair3".to_string()),
            caller_type: Some("ml".to_string()),
            caller_version: Some("1.0".to_string()),
            mean_coverage: Some("40".to_string()),
            truth_set_name: Some("giab".to_string()),
            is_public: Some(is_public.to_string()),
            owner_id,
            owner_username: owner_id.map(|_| "alice".to_string()),
            ..Default::default()
        }
    }

    fn seeded(
        dir: &Path,
        is_public: bool,
        owner_id: Option<i64>,
    ) -> (StorageLayout, Connection, i64) {
        let layout = StorageLayout::new(dir.join("happy_files"));
        layout.ensure().unwrap();
        let mut connection = open_in_memory().unwrap();

        let results = dir.join("results.csv");
        fs::write(
            &results,
            format!("{HAPPY_HEADER}\nSNP,*,*,ALL,0.99,0.98,0.985,100,99,1,100,98,2,0\n"),
        )
        .unwrap();

        let outcome = upload_experiment(
            &mut connection,
            &layout,
            &metadata("HG002_ont", is_public, owner_id),
            &results,
            None,
            IdSpace::Flat,
        )
        .unwrap();

        (layout, connection, outcome.experiment_id)
    }

    fn admin() -> Principal {
        Principal::new(Some(1), "snv_admin", true)
    }

    #[test]
    fn admin_delete_removes_all_child_rows_and_archives() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, mut connection, experiment_id) = seeded(dir.path(), true, None);

        let outcome = delete_experiment(
            &mut connection,
            &layout,
            &OwnerOrAdminPolicy,
            &admin(),
            experiment_id,
        )
        .unwrap();

        assert_eq!(outcome.benchmark_rows_deleted, 1);
        assert_eq!(outcome.overall_rows_deleted, 1);
        assert_eq!(
            count_rows(&connection, "SELECT COUNT(*) FROM experiments").unwrap(),
            0
        );
        assert_eq!(
            count_rows(&connection, "SELECT COUNT(*) FROM benchmark_results").unwrap(),
            0
        );
        assert_eq!(
            count_rows(&connection, "SELECT COUNT(*) FROM overall_results").unwrap(),
            0
        );

        // Mirror row archived with deleter identity, result file moved aside.
        assert!(backup::read_all(&layout).unwrap().is_empty());
        let deleted = backup::read_deleted(&layout).unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].2, "snv_admin");

        let archived = outcome.archived_file.unwrap();
        assert!(layout.archive_dir().join(&archived).exists());
    }

    #[test]
    fn non_owner_non_admin_is_rejected_without_changes() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, mut connection, experiment_id) = seeded(dir.path(), false, Some(7));

        let stranger = Principal::new(Some(99), "mallory", false);
        let err = delete_experiment(
            &mut connection,
            &layout,
            &OwnerOrAdminPolicy,
            &stranger,
            experiment_id,
        )
        .unwrap_err();

        assert!(matches!(err, PipelineError::Unauthorized(_)));
        assert_eq!(
            count_rows(&connection, "SELECT COUNT(*) FROM experiments").unwrap(),
            1
        );
        assert_eq!(
            count_rows(&connection, "SELECT COUNT(*) FROM benchmark_results").unwrap(),
            1
        );
        assert_eq!(backup::read_all(&layout).unwrap().len(), 1);
    }

    #[test]
    fn owner_may_delete_own_private_experiment() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, mut connection, experiment_id) = seeded(dir.path(), false, Some(7));

        let owner = Principal::new(Some(7), "alice", false);
        let outcome = delete_experiment(
            &mut connection,
            &layout,
            &OwnerOrAdminPolicy,
            &owner,
            experiment_id,
        )
        .unwrap();

        assert_eq!(outcome.experiment_id, experiment_id);
        assert_eq!(
            count_rows(&connection, "SELECT COUNT(*) FROM experiments").unwrap(),
            0
        );
    }

    #[test]
    fn legacy_rows_without_owner_require_admin() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, mut connection, experiment_id) = seeded(dir.path(), true, None);

        let user = Principal::new(Some(7), "alice", false);
        let err = delete_experiment(
            &mut connection,
            &layout,
            &OwnerOrAdminPolicy,
            &user,
            experiment_id,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Unauthorized(_)));
    }

    #[test]
    fn missing_experiment_is_a_validation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().join("happy_files"));
        layout.ensure().unwrap();
        let mut connection = open_in_memory().unwrap();

        let err = delete_experiment(
            &mut connection,
            &layout,
            &OwnerOrAdminPolicy,
            &admin(),
            42,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[test]
    fn missing_result_file_does_not_fail_the_delete() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, mut connection, experiment_id) = seeded(dir.path(), true, None);

        // Remove the stored file before deleting the experiment.
        let row = experiments::fetch(&connection, experiment_id)
            .unwrap()
            .unwrap();
        fs::remove_file(layout.live_file(row.file_name.as_deref().unwrap())).unwrap();

        let outcome = delete_experiment(
            &mut connection,
            &layout,
            &OwnerOrAdminPolicy,
            &admin(),
            experiment_id,
        )
        .unwrap();

        assert!(outcome.archived_file.is_none());
        assert!(outcome.warnings.is_empty());
    }
}
