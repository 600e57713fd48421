//! Regenerate the CSV mirror wholesale from the database. The mirror is a
//! derived projection; this command is the recovery path whenever it drifts
//! or goes missing.

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

use crate::backup;
use crate::cli::RebuildBackupArgs;
use crate::error::PipelineResult;
use crate::files::StorageLayout;
use crate::store::{self, experiments};

pub fn run(args: RebuildBackupArgs) -> Result<()> {
    let layout = StorageLayout::new(args.storage.data_root());
    layout.ensure()?;

    let db_path = args.storage.resolved_db_path();
    let connection = store::open_store(&db_path)?;

    let rows_written = rebuild(&connection, &layout)?;
    info!(rows_written, mirror = %layout.mirror_path().display(), "rebuilt backup mirror");
    Ok(())
}

pub fn rebuild(connection: &Connection, layout: &StorageLayout) -> PipelineResult<usize> {
    // Keep the previous mirror state around before overwriting it.
    if let Some(snapshot) = backup::snapshot_mirror(layout)? {
        info!(snapshot = %snapshot, "snapshotted old mirror");
    }

    let rows = experiments::load_backup_rows(connection)?;
    backup::write_all(layout, &rows)?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::commands::upload::upload_experiment;
    use crate::model::{IdSpace, MetadataRecord};
    use crate::store::open_in_memory;

    const HAPPY_HEADER: &str = "Type,Subtype,Subset,Filter,METRIC.Recall,METRIC.Precision,METRIC.F1_Score,TRUTH.TOTAL,TRUTH.TP,TRUTH.FN,QUERY.TOTAL,QUERY.TP,QUERY.FP,QUERY.UNK";

    fn metadata(name: &str) -> MetadataRecord {
        MetadataRecord {
            exp_name: Some(name.to_string()),
            technology: Some("mgi".to_string()),
            platform_name: Some("DNBSEQ-T7".to_string()),
            caller_name: Some("gatk4".to_string()),
            caller_type: Some("traditional".to_string()),
            caller_version: Some("4.4".to_string()),
            mean_coverage: Some("35".to_string()),
            truth_set_name: Some("giab".to_string()),
            aligner_name: Some("bwa".to_string()),
            ..Default::default()
        }
    }

    fn seed(dir: &Path, layout: &StorageLayout) -> Connection {
        let mut connection = open_in_memory().unwrap();
        let results = dir.join("results.csv");
        fs::write(
            &results,
            format!("{HAPPY_HEADER}\nSNP,*,*,ALL,0.99,0.98,0.985,100,99,1,100,98,2,0\n"),
        )
        .unwrap();
        upload_experiment(
            &mut connection,
            layout,
            &metadata("HG002_t7"),
            &results,
            None,
            IdSpace::Flat,
        )
        .unwrap();
        connection
    }

    #[test]
    fn rebuild_recreates_a_deleted_mirror_from_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().join("happy_files"));
        layout.ensure().unwrap();
        let connection = seed(dir.path(), &layout);

        // Lose the mirror entirely, then rebuild it from the database.
        fs::remove_file(layout.mirror_path()).unwrap();
        let rows_written = rebuild(&connection, &layout).unwrap();
        assert_eq!(rows_written, 1);

        let rows = backup::read_all(&layout).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 1);
        // Rebuilt rows carry the canonical stored codes.
        assert_eq!(rows[0].technology, "MGI");
        assert_eq!(rows[0].caller_name, "GATK4");
        assert_eq!(rows[0].aligner_name, "bwa");
        assert!(!rows[0].file_name.is_empty());
    }

    #[test]
    fn rebuild_snapshots_the_previous_mirror_first(){
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().join("happy_files"));
        layout.ensure().unwrap();
        let connection = seed(dir.path(), &layout);

        rebuild(&connection, &layout).unwrap();
        let snapshots = fs::read_dir(layout.deleted_dir()).unwrap().count();
        assert_eq!(snapshots, 1);
    }
}
