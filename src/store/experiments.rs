//! Experiment fact-row repository: identifier allocation, assembly, reads,
//! visibility updates, and the child-first cascade delete.

use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::model::{
    DimensionIds, ExperimentRequest, ExperimentRow, IdSpace, PRIVATE_ID_MIN, PUBLIC_ID_MAX,
    Visibility,
};
use crate::store::dimensions;

/// Resolve dimensions, allocate the identifier, and insert the experiment
/// row. Runs inside the caller's transaction; any error leaves nothing
/// behind once the transaction rolls back.
pub fn assemble(
    connection: &Connection,
    request: &ExperimentRequest,
    id_space: IdSpace,
) -> PipelineResult<(i64, DimensionIds)> {
    let dimension_ids = dimensions::resolve_dimension_set(connection, &request.dimensions)?;
    let experiment_id = allocate_id(connection, request.requested_id, request.visibility, id_space)?;

    connection.execute(
        "INSERT INTO experiments
           (id, name, description, created_at, is_public, owner_id, owner_username,
            file_name, file_sha256,
            sequencing_technology_id, variant_caller_id, aligner_id, truth_set_id,
            benchmark_tool_id, variant_id, quality_control_id, chemistry_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            experiment_id,
            request.name,
            request.description,
            request.created_at,
            request.visibility.is_public(),
            request.visibility.owner_id(),
            request.owner_username,
            request.file_name,
            request.file_sha256,
            dimension_ids.sequencing_technology_id,
            dimension_ids.variant_caller_id,
            dimension_ids.aligner_id,
            dimension_ids.truth_set_id,
            dimension_ids.benchmark_tool_id,
            dimension_ids.variant_id,
            dimension_ids.quality_control_id,
            dimension_ids.chemistry_id,
        ],
    )?;

    info!(experiment_id, name = %request.name, "assembled experiment row");
    Ok((experiment_id, dimension_ids))
}

/// Pick the identifier for a new experiment. Caller-supplied ids are only
/// checked for collision; auto-assignment respects the deployment's id
/// space (flat, or public 1..=999 / private >=1000).
pub fn allocate_id(
    connection: &Connection,
    requested: Option<i64>,
    visibility: Visibility,
    id_space: IdSpace,
) -> PipelineResult<i64> {
    if let Some(id) = requested {
        if id <= 0 {
            return Err(PipelineError::Validation(format!(
                "experiment identifier must be positive, got {id}"
            )));
        }
        if exists(connection, id)? {
            return Err(PipelineError::Conflict(format!(
                "experiment identifier {id} already exists"
            )));
        }
        return Ok(id);
    }

    match id_space {
        IdSpace::Flat => {
            let max: i64 = connection.query_row(
                "SELECT COALESCE(MAX(id), 0) FROM experiments",
                [],
                |row| row.get(0),
            )?;
            Ok(max + 1)
        }
        IdSpace::Partitioned => match visibility {
            Visibility::Public => {
                let max: i64 = connection.query_row(
                    "SELECT COALESCE(MAX(id), 0) FROM experiments WHERE id <= ?1",
                    [PUBLIC_ID_MAX],
                    |row| row.get(0),
                )?;
                let next = max + 1;
                if next > PUBLIC_ID_MAX {
                    return Err(PipelineError::Conflict(format!(
                        "public identifier range 1..={PUBLIC_ID_MAX} is exhausted"
                    )));
                }
                Ok(next)
            }
            Visibility::Private { .. } => {
                let max: i64 = connection.query_row(
                    "SELECT COALESCE(MAX(id), ?1 - 1) FROM experiments WHERE id >= ?1",
                    [PRIVATE_ID_MIN],
                    |row| row.get(0),
                )?;
                Ok(max + 1)
            }
        },
    }
}

pub fn exists(connection: &Connection, experiment_id: i64) -> PipelineResult<bool> {
    let found: Option<i64> = connection
        .query_row(
            "SELECT id FROM experiments WHERE id = ?1",
            [experiment_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn fetch(connection: &Connection, experiment_id: i64) -> PipelineResult<Option<ExperimentRow>> {
    let row = connection
        .query_row(
            "SELECT id, name, description, created_at, is_public, owner_id, owner_username,
                    file_name, file_sha256,
                    sequencing_technology_id, variant_caller_id, aligner_id, truth_set_id,
                    benchmark_tool_id, variant_id, quality_control_id, chemistry_id
             FROM experiments WHERE id = ?1",
            [experiment_id],
            map_experiment_row,
        )
        .optional()?;
    Ok(row)
}

/// Toggle visibility. Making a row public drops its owner reference by
/// convention; attribution stays in owner_username.
pub fn update_visibility(
    connection: &Connection,
    experiment_id: i64,
    is_public: bool,
) -> PipelineResult<()> {
    let changed = if is_public {
        connection.execute(
            "UPDATE experiments SET is_public = 1, owner_id = NULL WHERE id = ?1",
            [experiment_id],
        )?
    } else {
        connection.execute(
            "UPDATE experiments SET is_public = 0 WHERE id = ?1",
            [experiment_id],
        )?
    };

    if changed == 0 {
        return Err(PipelineError::Validation(format!(
            "experiment {experiment_id} not found"
        )));
    }
    Ok(())
}

/// Reassign ownership (admin operation).
pub fn update_owner(
    connection: &Connection,
    experiment_id: i64,
    owner_id: Option<i64>,
    owner_username: Option<&str>,
) -> PipelineResult<()> {
    let changed = connection.execute(
        "UPDATE experiments SET owner_id = ?2, owner_username = ?3 WHERE id = ?1",
        params![experiment_id, owner_id, owner_username],
    )?;
    if changed == 0 {
        return Err(PipelineError::Validation(format!(
            "experiment {experiment_id} not found"
        )));
    }
    Ok(())
}

/// Delete one experiment and its result rows, children before parent.
/// Returns (benchmark rows deleted, overall rows deleted). Must run inside a
/// transaction so a failure part-way leaves the row graph intact.
pub fn delete_cascade(
    connection: &Connection,
    experiment_id: i64,
) -> PipelineResult<(usize, usize)> {
    let benchmark_deleted = connection.execute(
        "DELETE FROM benchmark_results WHERE experiment_id = ?1",
        [experiment_id],
    )?;
    let overall_deleted = connection.execute(
        "DELETE FROM overall_results WHERE experiment_id = ?1",
        [experiment_id],
    )?;
    let experiments_deleted =
        connection.execute("DELETE FROM experiments WHERE id = ?1", [experiment_id])?;

    if experiments_deleted == 0 {
        return Err(PipelineError::Validation(format!(
            "experiment {experiment_id} not found"
        )));
    }

    info!(
        experiment_id,
        benchmark_deleted, overall_deleted, "deleted experiment row graph"
    );
    Ok((benchmark_deleted, overall_deleted))
}

/// Flatten every experiment with its dimension values into mirror rows.
/// This is the derived projection the CSV backup is rebuilt from.
pub fn load_backup_rows(connection: &Connection) -> PipelineResult<Vec<crate::model::BackupRow>> {
    let mut statement = connection.prepare(
        "SELECT e.id, e.name,
                st.technology, st.target, st.platform_name, st.platform_type, st.platform_version,
                ch.name,
                vc.name, vc.type, vc.version, vc.model,
                al.name, al.version,
                ts.name, ts.sample, ts.version, ts.reference,
                v.type, v.size, v.origin, v.is_phased,
                bt.name, bt.version,
                qc.mean_coverage, qc.read_length, qc.mean_insert_size, qc.mean_read_length,
                e.file_name, e.created_at, e.is_public, e.owner_username
         FROM experiments e
         LEFT JOIN sequencing_technologies st ON st.id = e.sequencing_technology_id
         LEFT JOIN chemistries ch ON ch.id = e.chemistry_id
         LEFT JOIN variant_callers vc ON vc.id = e.variant_caller_id
         LEFT JOIN aligners al ON al.id = e.aligner_id
         LEFT JOIN truth_sets ts ON ts.id = e.truth_set_id
         LEFT JOIN variants v ON v.id = e.variant_id
         LEFT JOIN benchmark_tools bt ON bt.id = e.benchmark_tool_id
         LEFT JOIN quality_control_metrics qc ON qc.id = e.quality_control_id
         ORDER BY e.id",
    )?;

    let text = |value: Option<String>| value.unwrap_or_default();
    let number = |value: Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();

    let rows = statement
        .query_map([], |row| {
            let is_phased: Option<bool> = row.get(21)?;
            let is_public: bool = row.get(30)?;
            Ok(crate::model::BackupRow {
                id: row.get(0)?,
                name: row.get(1)?,
                technology: text(row.get(2)?),
                target: text(row.get(3)?),
                platform_name: text(row.get(4)?),
                platform_type: text(row.get(5)?),
                platform_version: text(row.get(6)?),
                chemistry_name: text(row.get(7)?),
                caller_name: text(row.get(8)?),
                caller_type: text(row.get(9)?),
                caller_version: text(row.get(10)?),
                caller_model: text(row.get(11)?),
                aligner_name: text(row.get(12)?),
                aligner_version: text(row.get(13)?),
                truth_set_name: text(row.get(14)?),
                truth_set_sample: text(row.get(15)?),
                truth_set_version: text(row.get(16)?),
                truth_set_reference: text(row.get(17)?),
                variant_type: text(row.get(18)?),
                variant_size: text(row.get(19)?),
                variant_origin: text(row.get(20)?),
                is_phased: is_phased.unwrap_or(false).to_string(),
                benchmark_tool_name: text(row.get(22)?),
                benchmark_tool_version: text(row.get(23)?),
                mean_coverage: number(row.get(24)?),
                read_length: number(row.get(25)?),
                mean_insert_size: number(row.get(26)?),
                mean_read_length: number(row.get(27)?),
                file_name: text(row.get(28)?),
                file_path: String::new(),
                created_at: row.get(29)?,
                is_public: is_public.to_string(),
                owner_username: text(row.get(31)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn map_experiment_row(row: &Row<'_>) -> rusqlite::Result<ExperimentRow> {
    Ok(ExperimentRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
        is_public: row.get(4)?,
        owner_id: row.get(5)?,
        owner_username: row.get(6)?,
        file_name: row.get(7)?,
        file_sha256: row.get(8)?,
        dimension_ids: DimensionIds {
            sequencing_technology_id: row.get(9)?,
            variant_caller_id: row.get(10)?,
            aligner_id: row.get(11)?,
            truth_set_id: row.get(12)?,
            benchmark_tool_id: row.get(13)?,
            variant_id: row.get(14)?,
            quality_control_id: row.get(15)?,
            chemistry_id: row.get(16)?,
        },
    })
}
