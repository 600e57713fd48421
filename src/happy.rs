//! Parser for hap.py extended summary CSV output. Collapses the tool's many
//! filter/sub-type combinations down to one row per region per variant type
//! and maps raw region labels onto the closed region-code set.

use std::collections::HashMap;
use std::path::Path;

use csv::StringRecord;
use tracing::warn;

use crate::catalog::RegionType;
use crate::error::{PipelineError, PipelineResult};
use crate::model::{BenchmarkResultRow, OverallResultRow, ParsedResults};
use crate::util::{safe_float, safe_int};

/// Columns a hap.py file must carry to be ingestible at all. The paired
/// truth/query count columns are optional per-cell and coerced permissively.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    "Type",
    "Subtype",
    "Subset",
    "Filter",
    "METRIC.Recall",
    "METRIC.Precision",
    "METRIC.F1_Score",
];

/// Only rows where the sub-type column carries the wildcard marker and the
/// filter column is "ALL" are consumed.
const SUBTYPE_WILDCARD: &str = "*";
const FILTER_ALL: &str = "ALL";

struct RowView<'a> {
    record: &'a StringRecord,
    columns: &'a HashMap<String, usize>,
}

impl RowView<'_> {
    fn get(&self, name: &str) -> Option<&str> {
        self.columns
            .get(name)
            .and_then(|&index| self.record.get(index))
    }

    fn float(&self, name: &str) -> Option<f64> {
        safe_float(self.get(name))
    }

    fn int(&self, name: &str) -> Option<i64> {
        safe_int(self.get(name))
    }
}

/// Structural validation: readable CSV, required columns, at least one data
/// row, and at least one SNP/INDEL row. Performed before anything is staged.
pub fn validate_result_file(path: &Path) -> PipelineResult<()> {
    let (columns, records) = read_records(path)?;

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|name| !columns.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::Validation(format!(
            "result file is missing columns: {}",
            missing.join(", ")
        )));
    }

    if records.is_empty() {
        return Err(PipelineError::Validation(
            "result file contains no data rows".to_string(),
        ));
    }

    let type_index = columns["Type"];
    let has_known_type = records.iter().any(|record| {
        matches!(record.get(type_index), Some("SNP") | Some("INDEL"))
    });
    if !has_known_type {
        return Err(PipelineError::Validation(
            "result file contains no SNP/INDEL rows".to_string(),
        ));
    }

    Ok(())
}

/// Parse one hap.py file into stratified and overall result rows. The caller
/// is responsible for the already-processed idempotency guard; this function
/// never touches the database.
pub fn parse_result_file(path: &Path) -> PipelineResult<ParsedResults> {
    validate_result_file(path)?;

    let (columns, records) = read_records(path)?;
    let mut parsed = ParsedResults::default();

    let mut matched_rows = 0_usize;
    for record in &records {
        let row = RowView {
            record,
            columns: &columns,
        };

        if row.get("Subtype") != Some(SUBTYPE_WILDCARD) || row.get("Filter") != Some(FILTER_ALL) {
            continue;
        }
        matched_rows += 1;

        let raw_subset = row.get("Subset").unwrap_or_default();
        let Some(region) = RegionType::from_label(raw_subset) else {
            warn!(subset = raw_subset, "unknown region label, skipping row");
            parsed.skipped_regions.push(raw_subset.to_string());
            continue;
        };

        let variant_type = row.get("Type").unwrap_or_default().to_string();

        parsed.benchmark.push(BenchmarkResultRow {
            variant_type: variant_type.clone(),
            subset: region,
            metric_recall: row.float("METRIC.Recall"),
            metric_precision: row.float("METRIC.Precision"),
            metric_f1_score: row.float("METRIC.F1_Score"),
            subset_size: row.float("Subset.Size"),
            subset_is_conf_size: row.float("Subset.IS_CONF.Size"),
            truth_total: row.int("TRUTH.TOTAL"),
            truth_total_het: row.int("TRUTH.TOTAL.het"),
            truth_total_homalt: row.int("TRUTH.TOTAL.homalt"),
            truth_tp: row.int("TRUTH.TP"),
            truth_tp_het: row.int("TRUTH.TP.het"),
            truth_tp_homalt: row.int("TRUTH.TP.homalt"),
            truth_fn: row.int("TRUTH.FN"),
            truth_fn_het: row.int("TRUTH.FN.het"),
            truth_fn_homalt: row.int("TRUTH.FN.homalt"),
            query_total: row.int("QUERY.TOTAL"),
            query_total_het: row.int("QUERY.TOTAL.het"),
            query_total_homalt: row.int("QUERY.TOTAL.homalt"),
            query_tp: row.int("QUERY.TP"),
            query_tp_het: row.int("QUERY.TP.het"),
            query_tp_homalt: row.int("QUERY.TP.homalt"),
            query_fp: row.int("QUERY.FP"),
            query_fp_het: row.int("QUERY.FP.het"),
            query_fp_homalt: row.int("QUERY.FP.homalt"),
            query_unk: row.int("QUERY.UNK"),
            query_unk_het: row.int("QUERY.UNK.het"),
            query_unk_homalt: row.int("QUERY.UNK.homalt"),
        });

        // Whole-genome rows are duplicated into the fast-path table.
        if region == RegionType::All {
            parsed.overall.push(OverallResultRow {
                variant_type,
                metric_recall: row.float("METRIC.Recall"),
                metric_precision: row.float("METRIC.Precision"),
                metric_f1_score: row.float("METRIC.F1_Score"),
                truth_total: row.int("TRUTH.TOTAL"),
                truth_tp: row.int("TRUTH.TP"),
                truth_fn: row.int("TRUTH.FN"),
                query_total: row.int("QUERY.TOTAL"),
                query_tp: row.int("QUERY.TP"),
                query_fp: row.int("QUERY.FP"),
            });
        }
    }

    if matched_rows == 0 {
        return Err(PipelineError::Validation(format!(
            "no rows with Subtype='{SUBTYPE_WILDCARD}' and Filter='{FILTER_ALL}' in result file"
        )));
    }

    Ok(parsed)
}

fn read_records(path: &Path) -> PipelineResult<(HashMap<String, usize>, Vec<StringRecord>)> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|err| PipelineError::Validation(format!("failed to read result file: {err}")))?;

    let columns: HashMap<String, usize> = reader
        .headers()
        .map_err(|err| PipelineError::Validation(format!("failed to read csv header: {err}")))?
        .iter()
        .enumerate()
        .map(|(index, name)| (name.trim().to_string(), index))
        .collect();

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|err| PipelineError::Validation(format!("malformed csv row: {err}")))?;
        records.push(record);
    }

    Ok((columns, records))
}
