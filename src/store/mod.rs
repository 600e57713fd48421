//! SQLite repository layer. Functions take connections or transactions plus
//! plain records and return integer row ids; no cached objects, no implicit
//! relationship traversal.

use std::path::Path;

use rusqlite::Connection;

use crate::error::PipelineResult;
use crate::util::now_utc_string;

pub mod dimensions;
pub mod experiments;
pub mod results;

const DB_SCHEMA_VERSION: &str = "0.2.0";

/// Open (creating if needed) the benchmarking database and ensure the
/// schema is current.
pub fn open_store(path: &Path) -> PipelineResult<Connection> {
    let connection = Connection::open(path)?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;
    Ok(connection)
}

/// In-memory store for tests.
#[cfg(test)]
pub fn open_in_memory() -> PipelineResult<Connection> {
    let connection = Connection::open_in_memory()?;
    ensure_schema(&connection)?;
    Ok(connection)
}

fn configure_connection(connection: &Connection) -> PipelineResult<()> {
    connection.pragma_update(None, "journal_mode", "WAL")?;
    connection.pragma_update(None, "synchronous", "NORMAL")?;
    connection.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> PipelineResult<()> {
    // Every dimension table stores a normalized natural_key column with a
    // UNIQUE constraint: the storage-layer backstop against two concurrent
    // uploads creating near-duplicate rows.
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sequencing_technologies (
          id INTEGER PRIMARY KEY,
          technology TEXT NOT NULL,
          target TEXT,
          platform_type TEXT,
          platform_name TEXT,
          platform_version TEXT,
          natural_key TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS variant_callers (
          id INTEGER PRIMARY KEY,
          name TEXT NOT NULL,
          type TEXT,
          version TEXT,
          model TEXT,
          natural_key TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS aligners (
          id INTEGER PRIMARY KEY,
          name TEXT NOT NULL,
          version TEXT,
          natural_key TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS truth_sets (
          id INTEGER PRIMARY KEY,
          name TEXT NOT NULL,
          version TEXT,
          reference TEXT,
          sample TEXT,
          natural_key TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS benchmark_tools (
          id INTEGER PRIMARY KEY,
          name TEXT NOT NULL,
          version TEXT,
          natural_key TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS variants (
          id INTEGER PRIMARY KEY,
          type TEXT,
          size TEXT,
          origin TEXT,
          is_phased INTEGER NOT NULL DEFAULT 0,
          natural_key TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS quality_control_metrics (
          id INTEGER PRIMARY KEY,
          mean_coverage REAL,
          read_length REAL,
          mean_read_length REAL,
          mean_insert_size REAL,
          read_quality REAL,
          max_aligned_read REAL,
          natural_key TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS chemistries (
          id INTEGER PRIMARY KEY,
          name TEXT NOT NULL,
          version TEXT,
          technology TEXT,
          platform TEXT,
          natural_key TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS experiments (
          id INTEGER PRIMARY KEY,
          name TEXT NOT NULL,
          description TEXT,
          created_at TEXT NOT NULL,
          is_public INTEGER NOT NULL DEFAULT 1,
          owner_id INTEGER,
          owner_username TEXT,
          file_name TEXT,
          file_sha256 TEXT,
          sequencing_technology_id INTEGER REFERENCES sequencing_technologies(id),
          variant_caller_id INTEGER REFERENCES variant_callers(id),
          aligner_id INTEGER REFERENCES aligners(id),
          truth_set_id INTEGER REFERENCES truth_sets(id),
          benchmark_tool_id INTEGER REFERENCES benchmark_tools(id),
          variant_id INTEGER REFERENCES variants(id),
          quality_control_id INTEGER REFERENCES quality_control_metrics(id),
          chemistry_id INTEGER REFERENCES chemistries(id)
        );

        CREATE TABLE IF NOT EXISTS overall_results (
          id INTEGER PRIMARY KEY,
          experiment_id INTEGER NOT NULL REFERENCES experiments(id),
          variant_type TEXT NOT NULL,
          metric_recall REAL,
          metric_precision REAL,
          metric_f1_score REAL,
          truth_total INTEGER,
          truth_tp INTEGER,
          truth_fn INTEGER,
          query_total INTEGER,
          query_tp INTEGER,
          query_fp INTEGER
        );

        CREATE TABLE IF NOT EXISTS benchmark_results (
          id INTEGER PRIMARY KEY,
          experiment_id INTEGER NOT NULL REFERENCES experiments(id),
          variant_type TEXT NOT NULL,
          subset TEXT NOT NULL,
          metric_recall REAL,
          metric_precision REAL,
          metric_f1_score REAL,
          subset_size REAL,
          subset_is_conf_size REAL,
          truth_total INTEGER,
          truth_total_het INTEGER,
          truth_total_homalt INTEGER,
          truth_tp INTEGER,
          truth_tp_het INTEGER,
          truth_tp_homalt INTEGER,
          truth_fn INTEGER,
          truth_fn_het INTEGER,
          truth_fn_homalt INTEGER,
          query_total INTEGER,
          query_total_het INTEGER,
          query_total_homalt INTEGER,
          query_tp INTEGER,
          query_tp_het INTEGER,
          query_tp_homalt INTEGER,
          query_fp INTEGER,
          query_fp_het INTEGER,
          query_fp_homalt INTEGER,
          query_unk INTEGER,
          query_unk_het INTEGER,
          query_unk_homalt INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_overall_results_experiment
          ON overall_results(experiment_id);
        CREATE INDEX IF NOT EXISTS idx_benchmark_results_experiment
          ON benchmark_results(experiment_id);
        CREATE INDEX IF NOT EXISTS idx_benchmark_results_experiment_subset
          ON benchmark_results(experiment_id, subset);
        CREATE INDEX IF NOT EXISTS idx_experiments_owner
          ON experiments(owner_id);
        ",
    )?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}

/// Scalar COUNT helper shared by status reporting and tests.
pub fn count_rows(connection: &Connection, sql: &str) -> PipelineResult<i64> {
    let count = connection.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}
