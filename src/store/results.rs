//! Result-row repository for the stratified and overall tables. Rows are
//! created only from parsed hap.py output and removed only by the cascade
//! delete.

use rusqlite::{Connection, params};
use tracing::info;

use crate::error::PipelineResult;
use crate::model::ParsedResults;

/// Counts reported back to the orchestrator after a parse attach.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultCounts {
    pub benchmark_rows: usize,
    pub overall_rows: usize,
    pub already_processed: bool,
}

/// True when the experiment already has rows in either result table.
pub fn has_results(connection: &Connection, experiment_id: i64) -> PipelineResult<bool> {
    let count: i64 = connection.query_row(
        "SELECT (SELECT COUNT(*) FROM benchmark_results WHERE experiment_id = ?1)
              + (SELECT COUNT(*) FROM overall_results WHERE experiment_id = ?1)",
        [experiment_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Attach parsed result rows to an experiment. Re-running for an experiment
/// that already has results is a deliberate no-op, not an error.
pub fn attach_results(
    connection: &Connection,
    experiment_id: i64,
    parsed: &ParsedResults,
) -> PipelineResult<ResultCounts> {
    if has_results(connection, experiment_id)? {
        info!(experiment_id, "results already processed, skipping");
        return Ok(ResultCounts {
            already_processed: true,
            ..ResultCounts::default()
        });
    }

    let mut benchmark_statement = connection.prepare_cached(
        "INSERT INTO benchmark_results
           (experiment_id, variant_type, subset,
            metric_recall, metric_precision, metric_f1_score,
            subset_size, subset_is_conf_size,
            truth_total, truth_total_het, truth_total_homalt,
            truth_tp, truth_tp_het, truth_tp_homalt,
            truth_fn, truth_fn_het, truth_fn_homalt,
            query_total, query_total_het, query_total_homalt,
            query_tp, query_tp_het, query_tp_homalt,
            query_fp, query_fp_het, query_fp_homalt,
            query_unk, query_unk_het, query_unk_homalt)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                 ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29)",
    )?;

    for row in &parsed.benchmark {
        benchmark_statement.execute(params![
            experiment_id,
            row.variant_type,
            row.subset.as_str(),
            row.metric_recall,
            row.metric_precision,
            row.metric_f1_score,
            row.subset_size,
            row.subset_is_conf_size,
            row.truth_total,
            row.truth_total_het,
            row.truth_total_homalt,
            row.truth_tp,
            row.truth_tp_het,
            row.truth_tp_homalt,
            row.truth_fn,
            row.truth_fn_het,
            row.truth_fn_homalt,
            row.query_total,
            row.query_total_het,
            row.query_total_homalt,
            row.query_tp,
            row.query_tp_het,
            row.query_tp_homalt,
            row.query_fp,
            row.query_fp_het,
            row.query_fp_homalt,
            row.query_unk,
            row.query_unk_het,
            row.query_unk_homalt,
        ])?;
    }

    let mut overall_statement = connection.prepare_cached(
        "INSERT INTO overall_results
           (experiment_id, variant_type,
            metric_recall, metric_precision, metric_f1_score,
            truth_total, truth_tp, truth_fn,
            query_total, query_tp, query_fp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;

    for row in &parsed.overall {
        overall_statement.execute(params![
            experiment_id,
            row.variant_type,
            row.metric_recall,
            row.metric_precision,
            row.metric_f1_score,
            row.truth_total,
            row.truth_tp,
            row.truth_fn,
            row.query_total,
            row.query_tp,
            row.query_fp,
        ])?;
    }

    info!(
        experiment_id,
        benchmark_rows = parsed.benchmark.len(),
        overall_rows = parsed.overall.len(),
        "attached benchmark results"
    );

    Ok(ResultCounts {
        benchmark_rows: parsed.benchmark.len(),
        overall_rows: parsed.overall.len(),
        already_processed: false,
    })
}
