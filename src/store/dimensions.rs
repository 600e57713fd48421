//! Get-or-create resolution for the shared dimension tables. Each resolver
//! computes the normalized natural key, returns the existing row when one
//! matches, and otherwise inserts and flushes so the generated id is visible
//! to the rest of the enclosing transaction. A UNIQUE-constraint violation on
//! insert means another writer won the race; the row is re-fetched instead of
//! surfacing an error.

use rusqlite::{Connection, ToSql, params};

use crate::error::{PipelineError, PipelineResult};
use crate::model::{
    AlignerRecord, BenchmarkToolRecord, ChemistryRecord, DimensionIds, DimensionSet,
    QualityControlRecord, SequencingTechnologyRecord, TruthSetRecord, VariantCallerRecord,
    VariantRecord,
};
use crate::util::compose_natural_key;

/// Resolve every dimension of one experiment. Optional dimensions resolve to
/// `None` and leave the corresponding foreign key null.
pub fn resolve_dimension_set(
    connection: &Connection,
    dimensions: &DimensionSet,
) -> PipelineResult<DimensionIds> {
    Ok(DimensionIds {
        sequencing_technology_id: Some(resolve_sequencing_technology(
            connection,
            &dimensions.sequencing_technology,
        )?),
        variant_caller_id: Some(resolve_variant_caller(connection, &dimensions.variant_caller)?),
        aligner_id: dimensions
            .aligner
            .as_ref()
            .map(|record| resolve_aligner(connection, record))
            .transpose()?,
        truth_set_id: Some(resolve_truth_set(connection, &dimensions.truth_set)?),
        benchmark_tool_id: Some(resolve_benchmark_tool(connection, &dimensions.benchmark_tool)?),
        variant_id: Some(resolve_variant(connection, &dimensions.variant)?),
        quality_control_id: dimensions
            .quality_control
            .as_ref()
            .map(|record| resolve_quality_control(connection, record))
            .transpose()?,
        chemistry_id: dimensions
            .chemistry
            .as_ref()
            .map(|record| resolve_chemistry(connection, record))
            .transpose()?,
    })
}

pub fn resolve_sequencing_technology(
    connection: &Connection,
    record: &SequencingTechnologyRecord,
) -> PipelineResult<i64> {
    // platform_version is informational, not part of the natural key.
    let natural_key = compose_natural_key(&[
        Some(record.technology.as_str()),
        record.target.map(|target| target.as_str()),
        record.platform_type.map(|platform_type| platform_type.as_str()),
        record.platform_name.as_deref(),
    ]);

    get_or_create(
        connection,
        "sequencing_technologies",
        "INSERT INTO sequencing_technologies
           (technology, target, platform_type, platform_name, platform_version, natural_key)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.technology.as_str(),
            record.target.map(|target| target.as_str()),
            record.platform_type.map(|platform_type| platform_type.as_str()),
            record.platform_name,
            record.platform_version,
            natural_key,
        ],
        &natural_key,
    )
}

pub fn resolve_variant_caller(
    connection: &Connection,
    record: &VariantCallerRecord,
) -> PipelineResult<i64> {
    // model is informational, not part of the natural key.
    let natural_key = compose_natural_key(&[
        Some(record.name.as_str()),
        record.caller_type.map(|caller_type| caller_type.as_str()),
        record.version.as_deref(),
    ]);

    get_or_create(
        connection,
        "variant_callers",
        "INSERT INTO variant_callers (name, type, version, model, natural_key)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.name.as_str(),
            record.caller_type.map(|caller_type| caller_type.as_str()),
            record.version,
            record.model,
            natural_key,
        ],
        &natural_key,
    )
}

pub fn resolve_aligner(connection: &Connection, record: &AlignerRecord) -> PipelineResult<i64> {
    let natural_key =
        compose_natural_key(&[Some(record.name.as_str()), record.version.as_deref()]);

    get_or_create(
        connection,
        "aligners",
        "INSERT INTO aligners (name, version, natural_key) VALUES (?1, ?2, ?3)",
        params![record.name, record.version, natural_key],
        &natural_key,
    )
}

pub fn resolve_truth_set(connection: &Connection, record: &TruthSetRecord) -> PipelineResult<i64> {
    let natural_key = compose_natural_key(&[
        Some(record.name.as_str()),
        record.version.as_deref(),
        record.reference.map(|reference| reference.as_str()),
        record.sample.map(|sample| sample.as_str()),
    ]);

    get_or_create(
        connection,
        "truth_sets",
        "INSERT INTO truth_sets (name, version, reference, sample, natural_key)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.name.as_str(),
            record.version,
            record.reference.map(|reference| reference.as_str()),
            record.sample.map(|sample| sample.as_str()),
            natural_key,
        ],
        &natural_key,
    )
}

pub fn resolve_benchmark_tool(
    connection: &Connection,
    record: &BenchmarkToolRecord,
) -> PipelineResult<i64> {
    let natural_key =
        compose_natural_key(&[Some(record.name.as_str()), record.version.as_deref()]);

    get_or_create(
        connection,
        "benchmark_tools",
        "INSERT INTO benchmark_tools (name, version, natural_key) VALUES (?1, ?2, ?3)",
        params![record.name.as_str(), record.version, natural_key],
        &natural_key,
    )
}

pub fn resolve_variant(connection: &Connection, record: &VariantRecord) -> PipelineResult<i64> {
    let phased = if record.is_phased { "1" } else { "0" };
    let natural_key = compose_natural_key(&[
        record.variant_type.map(|variant_type| variant_type.as_str()),
        record.size.map(|size| size.as_str()),
        record.origin.map(|origin| origin.as_str()),
        Some(phased),
    ]);

    get_or_create(
        connection,
        "variants",
        "INSERT INTO variants (type, size, origin, is_phased, natural_key)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.variant_type.map(|variant_type| variant_type.as_str()),
            record.size.map(|size| size.as_str()),
            record.origin.map(|origin| origin.as_str()),
            record.is_phased,
            natural_key,
        ],
        &natural_key,
    )
}

pub fn resolve_quality_control(
    connection: &Connection,
    record: &QualityControlRecord,
) -> PipelineResult<i64> {
    // No meaningful string key here: the full numeric field set is the key,
    // so byte-identical metric combinations legitimately share one row.
    let fields = [
        record.mean_coverage,
        record.read_length,
        record.mean_read_length,
        record.mean_insert_size,
        record.read_quality,
        record.max_aligned_read,
    ];
    let rendered: Vec<Option<String>> = fields
        .iter()
        .map(|field| field.map(|value| value.to_string()))
        .collect();
    let natural_key =
        compose_natural_key(&rendered.iter().map(Option::as_deref).collect::<Vec<_>>());

    get_or_create(
        connection,
        "quality_control_metrics",
        "INSERT INTO quality_control_metrics
           (mean_coverage, read_length, mean_read_length, mean_insert_size,
            read_quality, max_aligned_read, natural_key)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.mean_coverage,
            record.read_length,
            record.mean_read_length,
            record.mean_insert_size,
            record.read_quality,
            record.max_aligned_read,
            natural_key,
        ],
        &natural_key,
    )
}

pub fn resolve_chemistry(connection: &Connection, record: &ChemistryRecord) -> PipelineResult<i64> {
    let natural_key = compose_natural_key(&[
        Some(record.name.as_str()),
        record.version.as_deref(),
        record.technology.map(|technology| technology.as_str()),
        record.platform.as_deref(),
    ]);

    get_or_create(
        connection,
        "chemistries",
        "INSERT INTO chemistries (name, version, technology, platform, natural_key)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.name,
            record.version,
            record.technology.map(|technology| technology.as_str()),
            record.platform,
            natural_key,
        ],
        &natural_key,
    )
}

fn get_or_create(
    connection: &Connection,
    table: &str,
    insert_sql: &str,
    insert_params: &[&dyn ToSql],
    natural_key: &str,
) -> PipelineResult<i64> {
    if let Some(id) = find_by_natural_key(connection, table, natural_key)? {
        return Ok(id);
    }

    match connection.execute(insert_sql, insert_params) {
        Ok(_) => Ok(connection.last_insert_rowid()),
        Err(err) if is_unique_violation(&err) => {
            // Lost the insert race; the winning row is the one to use.
            find_by_natural_key(connection, table, natural_key)?
                .ok_or(PipelineError::Integrity(err))
        }
        Err(err) => Err(err.into()),
    }
}

fn find_by_natural_key(
    connection: &Connection,
    table: &str,
    natural_key: &str,
) -> PipelineResult<Option<i64>> {
    let sql = format!("SELECT id FROM {table} WHERE natural_key = ?1");
    let mut statement = connection.prepare_cached(&sql)?;
    let mut rows = statement.query([natural_key])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CallerName, CallerType, SeqTechName, SeqTechTarget};
    use crate::store::{count_rows, open_in_memory};

    fn tech_record(technology: SeqTechName, platform: &str) -> SequencingTechnologyRecord {
        SequencingTechnologyRecord {
            technology,
            target: Some(SeqTechTarget::Wgs),
            platform_type: None,
            platform_name: Some(platform.to_string()),
            platform_version: None,
        }
    }

    #[test]
    fn equal_natural_keys_share_one_row() {
        let connection = open_in_memory().unwrap();

        let first = resolve_sequencing_technology(
            &connection,
            &tech_record(SeqTechName::Illumina, "NovaSeq 6000"),
        )
        .unwrap();
        // Case and spacing variants must land on the same row.
        let second = resolve_sequencing_technology(
            &connection,
            &tech_record(SeqTechName::Illumina, "novaseq6000"),
        )
        .unwrap();

        assert_eq!(first, second);
        assert_eq!(
            count_rows(&connection, "SELECT COUNT(*) FROM sequencing_technologies").unwrap(),
            1
        );
    }

    #[test]
    fn distinct_keys_create_distinct_rows() {
        let connection = open_in_memory().unwrap();

        let first = resolve_sequencing_technology(
            &connection,
            &tech_record(SeqTechName::Illumina, "NovaSeq 6000"),
        )
        .unwrap();
        let second = resolve_sequencing_technology(
            &connection,
            &tech_record(SeqTechName::Pacbio, "Revio"),
        )
        .unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn non_key_fields_do_not_split_rows() {
        let connection = open_in_memory().unwrap();

        let base = VariantCallerRecord {
            name: CallerName::DeepVariant,
            caller_type: Some(CallerType::Ml),
            version: Some("1.5".to_string()),
            model: None,
        };
        let with_model = VariantCallerRecord {
            model: Some("WGS-model".to_string()),
            ..base.clone()
        };

        let first = resolve_variant_caller(&connection, &base).unwrap();
        let second = resolve_variant_caller(&connection, &with_model).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn identical_qc_metrics_share_one_row() {
        let connection = open_in_memory().unwrap();

        let record = QualityControlRecord {
            mean_coverage: Some(34.2),
            read_length: Some(150.0),
            mean_read_length: None,
            mean_insert_size: Some(400.0),
            read_quality: None,
            max_aligned_read: None,
        };

        let first = resolve_quality_control(&connection, &record).unwrap();
        let second = resolve_quality_control(&connection, &record).unwrap();
        assert_eq!(first, second);

        let different = QualityControlRecord {
            mean_coverage: Some(35.0),
            ..record
        };
        let third = resolve_quality_control(&connection, &different).unwrap();
        assert_ne!(first, third);
    }

    #[test]
    fn missing_fields_keep_key_slots_distinct() {
        let connection = open_in_memory().unwrap();

        let with_version = AlignerRecord {
            name: "bwa".to_string(),
            version: Some("mem2".to_string()),
        };
        let versionless = AlignerRecord {
            name: "bwamem2".to_string(),
            version: None,
        };

        let first = resolve_aligner(&connection, &with_version).unwrap();
        let second = resolve_aligner(&connection, &versionless).unwrap();
        assert_ne!(first, second);
    }
}
