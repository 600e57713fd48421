use std::fs;

use anyhow::Result;
use tracing::{info, warn};

use crate::backup;
use crate::cli::StatusArgs;
use crate::files::StorageLayout;
use crate::store::{self, count_rows};

pub fn run(args: StatusArgs) -> Result<()> {
    let layout = StorageLayout::new(args.storage.data_root());
    let db_path = args.storage.resolved_db_path();

    info!(data_root = %layout.data_root().display(), "status requested");

    if db_path.exists() {
        let connection = store::open_store(&db_path)?;
        info!(
            experiments = count_rows(&connection, "SELECT COUNT(*) FROM experiments")?,
            benchmark_results = count_rows(&connection, "SELECT COUNT(*) FROM benchmark_results")?,
            overall_results = count_rows(&connection, "SELECT COUNT(*) FROM overall_results")?,
            "database row counts"
        );
        info!(
            sequencing_technologies =
                count_rows(&connection, "SELECT COUNT(*) FROM sequencing_technologies")?,
            variant_callers = count_rows(&connection, "SELECT COUNT(*) FROM variant_callers")?,
            aligners = count_rows(&connection, "SELECT COUNT(*) FROM aligners")?,
            truth_sets = count_rows(&connection, "SELECT COUNT(*) FROM truth_sets")?,
            benchmark_tools = count_rows(&connection, "SELECT COUNT(*) FROM benchmark_tools")?,
            variants = count_rows(&connection, "SELECT COUNT(*) FROM variants")?,
            quality_control_metrics =
                count_rows(&connection, "SELECT COUNT(*) FROM quality_control_metrics")?,
            chemistries = count_rows(&connection, "SELECT COUNT(*) FROM chemistries")?,
            "dimension row counts"
        );
    } else {
        warn!(path = %db_path.display(), "database file missing");
    }

    if layout.mirror_path().exists() {
        let mirror_rows = backup::read_all(&layout)?.len();
        let deleted_rows = backup::read_deleted(&layout)?.len();
        info!(mirror_rows, deleted_rows, "csv mirror state");
    } else {
        warn!(path = %layout.mirror_path().display(), "csv mirror missing");
    }

    let archived_files = match fs::read_dir(layout.archive_dir()) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    };
    let live_files = match fs::read_dir(layout.data_root()) {
        Ok(entries) => entries
            .flatten()
            .filter(|entry| {
                entry.path().extension().is_some_and(|ext| ext == "csv")
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| !name.starts_with("000_"))
            })
            .count(),
        Err(_) => 0,
    };
    info!(live_files, archived_files, "result file counts");

    Ok(())
}
