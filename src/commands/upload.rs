//! Upload orchestration: validate, stage, assemble, parse, commit, then
//! promote the file and mirror the row. Everything up to the database commit
//! is all-or-nothing; everything after it is best effort and reported as
//! warnings on a successful outcome.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::backup;
use crate::cli::UploadArgs;
use crate::error::{PipelineError, PipelineResult};
use crate::files::{self, StorageLayout};
use crate::happy;
use crate::model::{
    BackupRow, ExperimentRequest, IdSpace, MetadataRecord, UploadOutcome, Visibility,
};
use crate::store::{self, experiments, results};
use crate::util::{clean_value, now_utc_string, sha256_file, utc_compact_string};

pub fn run(args: UploadArgs) -> Result<()> {
    let raw = fs::read(&args.metadata_file)
        .with_context(|| format!("failed to read {}", args.metadata_file.display()))?;
    let metadata: MetadataRecord = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", args.metadata_file.display()))?;

    let layout = StorageLayout::new(args.storage.data_root());
    layout.ensure()?;

    let db_path = args.storage.resolved_db_path();
    let mut connection = store::open_store(&db_path)?;

    let outcome = upload_experiment(
        &mut connection,
        &layout,
        &metadata,
        &args.results_file,
        args.experiment_id,
        args.id_space.to_id_space(),
    )?;

    for warning in &outcome.warnings {
        warn!(warning = %warning, "upload completed with warning");
    }
    info!(
        experiment_id = outcome.experiment_id,
        file_name = %outcome.file_name,
        benchmark_rows = outcome.benchmark_rows,
        overall_rows = outcome.overall_rows,
        "upload completed"
    );

    if args.json {
        let mut output = io::BufWriter::new(io::stdout().lock());
        serde_json::to_writer_pretty(&mut output, &outcome)
            .context("failed to serialize upload outcome")?;
        writeln!(output)?;
        output.flush()?;
    }

    Ok(())
}

/// End-to-end ingestion of one experiment. The result file is staged into
/// scratch first; the database transaction covers identifier allocation,
/// dimension resolution, the experiment row, and the parsed result rows.
pub fn upload_experiment(
    connection: &mut Connection,
    layout: &StorageLayout,
    metadata: &MetadataRecord,
    results_path: &Path,
    requested_id: Option<i64>,
    id_space: IdSpace,
) -> PipelineResult<UploadOutcome> {
    happy::validate_result_file(results_path)?;
    metadata.validate_required()?;

    let staged_name = format!("upload_{}.csv", utc_compact_string(Utc::now()));
    let staged = files::stage_file(layout, results_path, &staged_name)?;

    let outcome = ingest_staged(connection, layout, metadata, &staged, requested_id, id_space);

    // The staged copy is gone on success (renamed away) and must not
    // survive a failure either.
    files::remove_orphan(&staged);

    outcome
}

fn ingest_staged(
    connection: &mut Connection,
    layout: &StorageLayout,
    metadata: &MetadataRecord,
    staged: &Path,
    requested_id: Option<i64>,
    id_space: IdSpace,
) -> PipelineResult<UploadOutcome> {
    let dimensions = metadata.dimension_set()?;
    let visibility = resolve_visibility(metadata)?;
    let created_at = resolve_created_at(metadata.created_at.as_deref());
    let name = clean_value(metadata.exp_name.as_deref())
        .ok_or_else(|| PipelineError::Validation("experiment name is missing".to_string()))?;

    let file_sha256 = sha256_file(staged)
        .map_err(|err| PipelineError::io(staged, io::Error::other(err)))?;

    let tx = connection.transaction()?;

    let experiment_id = experiments::allocate_id(&tx, requested_id, visibility, id_space)?;
    let file_name = files::standardized_filename(
        experiment_id,
        &name,
        metadata.technology.as_deref().unwrap_or_default(),
        metadata.platform_name.as_deref().unwrap_or_default(),
        metadata.caller_name.as_deref().unwrap_or_default(),
        metadata.truth_set_name.as_deref().unwrap_or_default(),
    );

    let request = ExperimentRequest {
        requested_id: Some(experiment_id),
        name: name.clone(),
        description: clean_value(metadata.description.as_deref())
            .or_else(|| Some(format!("Experiment {name}"))),
        created_at: created_at.clone(),
        visibility,
        owner_username: clean_value(metadata.owner_username.as_deref()),
        file_name: Some(file_name.clone()),
        file_sha256: Some(file_sha256),
        dimensions,
    };
    let (experiment_id, dimension_ids) = experiments::assemble(&tx, &request, id_space)?;

    let parsed = happy::parse_result_file(staged)?;
    let counts = results::attach_results(&tx, experiment_id, &parsed)?;

    tx.commit()?;

    // Database is committed and authoritative from here on. File promotion
    // and mirror maintenance may lag behind but never undo the upload.
    let mut warnings: Vec<String> = parsed
        .skipped_regions
        .iter()
        .map(|region| format!("unknown region '{region}' skipped"))
        .collect();

    match files::promote_staged_file(layout, staged, &file_name) {
        Ok(path) => info!(path = %path.display(), "stored result file"),
        Err(err) => {
            warn!(error = %err, "result file promotion failed after commit");
            warnings.push(format!("result file not moved to final storage: {err}"));
        }
    }

    let backup_row = BackupRow::from_metadata(
        experiment_id,
        metadata,
        Some(&file_name),
        &created_at,
        visibility.is_public(),
    );
    if let Err(err) = backup::append_row(layout, backup_row) {
        warn!(error = %err, "csv backup mirror update failed after commit");
        warnings.push(format!("csv backup mirror not updated: {err}"));
    }

    Ok(UploadOutcome {
        experiment_id,
        file_name,
        benchmark_rows: counts.benchmark_rows,
        overall_rows: counts.overall_rows,
        dimension_ids,
        warnings,
    })
}

fn resolve_visibility(metadata: &MetadataRecord) -> PipelineResult<Visibility> {
    let is_public = match clean_value(metadata.is_public.as_deref()) {
        Some(value) => value.eq_ignore_ascii_case("true"),
        None => true,
    };

    if is_public {
        return Ok(Visibility::Public);
    }

    let owner_id = metadata.owner_id.ok_or_else(|| {
        PipelineError::Validation(
            "private experiments must carry an owner reference".to_string(),
        )
    })?;
    Ok(Visibility::Private {
        owner_id: Some(owner_id),
    })
}

/// Accept RFC 3339 or bare dates from the form; anything else falls back to
/// the ingestion time.
pub(crate) fn resolve_created_at(value: Option<&str>) -> String {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return now_utc_string();
    };

    if DateTime::parse_from_rfc3339(raw).is_ok() {
        return raw.to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return format!("{date}T00:00:00Z");
    }

    now_utc_string()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::store::{count_rows, open_in_memory};

    const HAPPY_HEADER: &str = "Type,Subtype,Subset,Filter,METRIC.Recall,METRIC.Precision,METRIC.F1_Score,TRUTH.TOTAL,TRUTH.TP,TRUTH.FN,QUERY.TOTAL,QUERY.TP,QUERY.FP,QUERY.UNK";

    fn fixture() -> (tempfile::TempDir, StorageLayout, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().join("happy_files"));
        layout.ensure().unwrap();
        let connection = open_in_memory().unwrap();
        (dir, layout, connection)
    }

    fn write_results(dir: &Path, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.join("incoming_results.csv");
        let mut content = String::from(HAPPY_HEADER);
        for line in lines {
            content.push('\n');
            content.push_str(line);
        }
        content.push('\n');
        fs::write(&path, content).unwrap();
        path
    }

    fn snp_indel_rows() -> Vec<&'static str> {
        vec![
            "SNP,*,*,ALL,0.99,0.98,0.985,100,99,1,100,98,2,0",
            "INDEL,*,*,ALL,0.97,0.96,0.965,50,48,2,50,48,1,1",
        ]
    }

    fn full_metadata(name: &str) -> MetadataRecord {
        MetadataRecord {
            exp_name: Some(name.to_string()),
            description: Some("WGS benchmark".to_string()),
            technology: Some("Illumina".to_string()),
            target: Some("wgs".to_string()),
            platform_name: Some("NovaSeq 6000".to_string()),
            platform_type: Some("srs".to_string()),
            caller_name: Some("DeepVariant".to_string()),
            caller_type: Some("ml".to_string()),
            caller_version: Some("1.5.0".to_string()),
            aligner_name: Some("bwa-mem2".to_string()),
            aligner_version: Some("2.2.1".to_string()),
            chemistry_name: Some("SPRQ".to_string()),
            truth_set_name: Some("GIAB".to_string()),
            truth_set_sample: Some("hg002".to_string()),
            truth_set_version: Some("4.2.1".to_string()),
            truth_set_reference: Some("grch38".to_string()),
            benchmark_tool_name: Some("hap.py".to_string()),
            benchmark_tool_version: Some("0.3.12".to_string()),
            mean_coverage: Some("34.2".to_string()),
            read_length: Some("150".to_string()),
            owner_username: Some("alice".to_string()),
            ..Default::default()
        }
    }

    fn dimension_row_total(connection: &Connection) -> i64 {
        [
            "sequencing_technologies",
            "variant_callers",
            "aligners",
            "truth_sets",
            "benchmark_tools",
            "variants",
            "quality_control_metrics",
            "chemistries",
        ]
        .iter()
        .map(|table| {
            count_rows(connection, &format!("SELECT COUNT(*) FROM {table}")).unwrap()
        })
        .sum()
    }

    #[test]
    fn fresh_upload_creates_dimensions_experiment_and_results() {
        let (dir, layout, mut connection) = fixture();
        let results = write_results(dir.path(), &snp_indel_rows());

        let outcome = upload_experiment(
            &mut connection,
            &layout,
            &full_metadata("HG002_novaseq"),
            &results,
            None,
            IdSpace::Flat,
        )
        .unwrap();

        assert_eq!(outcome.experiment_id, 1);
        assert!(outcome.warnings.is_empty());
        // All eight dimensions populated: one row each.
        assert_eq!(dimension_row_total(&connection), 8);
        assert_eq!(
            count_rows(&connection, "SELECT COUNT(*) FROM experiments").unwrap(),
            1
        );
        // SNP + INDEL at "*" land in both result tables.
        assert_eq!(outcome.benchmark_rows, 2);
        assert_eq!(outcome.overall_rows, 2);

        // File promoted under the standardized name, mirror row written.
        assert_eq!(
            outcome.file_name,
            "001_hg002_illumina_novaseq6000_deepvariant_giab.csv"
        );
        assert!(layout.live_file(&outcome.file_name).exists());
        let mirror = backup::read_all(&layout).unwrap();
        assert_eq!(mirror.len(), 1);
        assert_eq!(mirror[0].id, 1);
        assert_eq!(mirror[0].technology, "Illumina");
    }

    #[test]
    fn repeated_dimension_values_share_rows_across_uploads() {
        let (dir, layout, mut connection) = fixture();
        let results = write_results(dir.path(), &snp_indel_rows());

        upload_experiment(
            &mut connection,
            &layout,
            &full_metadata("HG002_novaseq"),
            &results,
            None,
            IdSpace::Flat,
        )
        .unwrap();
        let before = dimension_row_total(&connection);

        // Same technology/caller spelled with different casing and spacing.
        let mut second = full_metadata("HG002_rerun");
        second.technology = Some("ILLUMINA".to_string());
        second.platform_name = Some("novaseq6000".to_string());
        second.caller_name = Some("deepvariant".to_string());

        let outcome = upload_experiment(
            &mut connection,
            &layout,
            &second,
            &results,
            None,
            IdSpace::Flat,
        )
        .unwrap();

        assert_eq!(outcome.experiment_id, 2);
        assert_eq!(dimension_row_total(&connection), before);
        assert_eq!(
            count_rows(&connection, "SELECT COUNT(*) FROM experiments").unwrap(),
            2
        );
    }

    #[test]
    fn round_trip_preserves_normalized_dimension_values() {
        let (dir, layout, mut connection) = fixture();
        let results = write_results(dir.path(), &snp_indel_rows());

        let outcome = upload_experiment(
            &mut connection,
            &layout,
            &full_metadata("HG002_novaseq"),
            &results,
            None,
            IdSpace::Flat,
        )
        .unwrap();

        let row = experiments::fetch(&connection, outcome.experiment_id)
            .unwrap()
            .unwrap();
        assert_eq!(row.name, "HG002_novaseq");
        assert!(row.is_public);
        assert_eq!(row.owner_id, None);
        assert_eq!(row.owner_username.as_deref(), Some("alice"));
        assert!(row.file_sha256.is_some());

        let technology: String = connection
            .query_row(
                "SELECT technology FROM sequencing_technologies WHERE id = ?1",
                [row.dimension_ids.sequencing_technology_id.unwrap()],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(technology, "ILLUMINA");

        let (caller, caller_version): (String, String) = connection
            .query_row(
                "SELECT name, version FROM variant_callers WHERE id = ?1",
                [row.dimension_ids.variant_caller_id.unwrap()],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(caller, "DEEPVARIANT");
        assert_eq!(caller_version, "1.5.0");
    }

    #[test]
    fn no_matching_rows_rolls_back_everything() {
        let (dir, layout, mut connection) = fixture();
        // Valid columns and SNP rows, but no Subtype='*' + Filter='ALL' pair.
        let results = write_results(
            dir.path(),
            &["SNP,ins,*,ALL,0.9,0.9,0.9,10,9,1,10,9,1,0"],
        );

        let err = upload_experiment(
            &mut connection,
            &layout,
            &full_metadata("HG002_bad"),
            &results,
            None,
            IdSpace::Flat,
        )
        .unwrap_err();

        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(
            count_rows(&connection, "SELECT COUNT(*) FROM experiments").unwrap(),
            0
        );
        assert_eq!(dimension_row_total(&connection), 0);
        // No file committed, no mirror row, no staged leftovers.
        assert!(backup::read_all(&layout).unwrap().is_empty());
        assert!(!layout
            .live_file("001_hg002_illumina_novaseq6000_deepvariant_giab.csv")
            .exists());
        assert_eq!(fs::read_dir(layout.staging_dir()).unwrap().count(), 0);
    }

    #[test]
    fn post_commit_file_failure_keeps_database_row() {
        let (dir, layout, mut connection) = fixture();
        let results = write_results(dir.path(), &snp_indel_rows());

        // Occupy the destination so the post-commit promotion fails.
        fs::write(
            layout.live_file("001_hg002_illumina_novaseq6000_deepvariant_giab.csv"),
            "stale",
        )
        .unwrap();

        let outcome = upload_experiment(
            &mut connection,
            &layout,
            &full_metadata("HG002_novaseq"),
            &results,
            None,
            IdSpace::Flat,
        )
        .unwrap();

        // Database authoritative: the experiment exists and the failure is a
        // warning, not a rollback.
        assert_eq!(
            count_rows(&connection, "SELECT COUNT(*) FROM experiments").unwrap(),
            1
        );
        assert!(
            outcome
                .warnings
                .iter()
                .any(|warning| warning.contains("final storage"))
        );
    }

    #[test]
    fn requested_identifier_collision_leaves_no_side_effects() {
        let (dir, layout, mut connection) = fixture();
        let results = write_results(dir.path(), &snp_indel_rows());

        upload_experiment(
            &mut connection,
            &layout,
            &full_metadata("HG002_first"),
            &results,
            Some(5),
            IdSpace::Flat,
        )
        .unwrap();

        let err = upload_experiment(
            &mut connection,
            &layout,
            &full_metadata("HG002_second"),
            &results,
            Some(5),
            IdSpace::Flat,
        )
        .unwrap_err();

        assert!(matches!(err, PipelineError::Conflict(_)));
        assert_eq!(
            count_rows(&connection, "SELECT COUNT(*) FROM experiments").unwrap(),
            1
        );
        assert_eq!(backup::read_all(&layout).unwrap().len(), 1);
    }

    #[test]
    fn private_upload_requires_owner_reference() {
        let (dir, layout, mut connection) = fixture();
        let results = write_results(dir.path(), &snp_indel_rows());

        let mut metadata = full_metadata("HG002_private");
        metadata.is_public = Some("false".to_string());

        let err = upload_experiment(
            &mut connection,
            &layout,
            &metadata,
            &results,
            None,
            IdSpace::Flat,
        )
        .unwrap_err();
        assert!(err.to_string().contains("owner"));

        metadata.owner_id = Some(7);
        let outcome = upload_experiment(
            &mut connection,
            &layout,
            &metadata,
            &results,
            None,
            IdSpace::Partitioned,
        )
        .unwrap();
        assert_eq!(outcome.experiment_id, 1000);

        let row = experiments::fetch(&connection, 1000).unwrap().unwrap();
        assert!(!row.is_public);
        assert_eq!(row.owner_id, Some(7));
    }

    #[test]
    fn unknown_regions_surface_as_warnings() {
        let (dir, layout, mut connection) = fixture();
        let mut rows = snp_indel_rows();
        rows.push("SNP,*,centromere,ALL,0.9,0.9,0.9,10,9,1,10,9,1,0");
        let results = write_results(dir.path(), &rows);

        let outcome = upload_experiment(
            &mut connection,
            &layout,
            &full_metadata("HG002_novaseq"),
            &results,
            None,
            IdSpace::Flat,
        )
        .unwrap();

        assert_eq!(outcome.benchmark_rows, 2);
        assert!(
            outcome
                .warnings
                .iter()
                .any(|warning| warning.contains("centromere"))
        );
    }

    #[test]
    fn created_at_accepts_bare_dates() {
        assert_eq!(
            resolve_created_at(Some("2026-03-01")),
            "2026-03-01T00:00:00Z"
        );
        assert_eq!(
            resolve_created_at(Some("2026-03-01T10:15:00Z")),
            "2026-03-01T10:15:00Z"
        );
        // Garbage falls back to "now" rather than failing ingestion.
        assert!(resolve_created_at(Some("last tuesday")).contains('T'));
    }
}
