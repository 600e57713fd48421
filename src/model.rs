//! Plain data records passed between pipeline stages. Rows reference each
//! other through integer identifiers only; nothing here holds a connection
//! or a lazily-loaded graph.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::catalog::{
    BenchmarkToolName, CallerName, CallerType, RegionType, SeqTechName, SeqTechPlatformType,
    SeqTechTarget, TruthSetName, TruthSetReference, TruthSetSample, VariantOrigin, VariantSize,
    VariantType,
};
use crate::error::{PipelineError, PipelineResult};
use crate::util::{clean_value, parse_boolean, safe_float};

/// Web forms and spreadsheet exports deliver every scalar as whatever type
/// the producer felt like; fold them all to optional strings here and coerce
/// later.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text),
        Some(Value::Bool(flag)) => Some(flag.to_string()),
        Some(Value::Number(number)) => Some(number.to_string()),
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "expected scalar metadata value, got {other}"
            )));
        }
    })
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::Number(number)) => number.as_i64(),
        Some(Value::String(text)) => text.trim().parse::<i64>().ok(),
        Some(_) => None,
    })
}

/// One experiment-description record as ingested from the upload form or a
/// spreadsheet row. Field names match the historical CSV/form contract.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub exp_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub technology: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub target: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub platform_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub platform_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub platform_version: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub chemistry_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub chemistry_version: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub caller_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub caller_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub caller_version: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub caller_model: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub aligner_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub aligner_version: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub truth_set_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub truth_set_sample: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub truth_set_version: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub truth_set_reference: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub variant_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub variant_size: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub variant_origin: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub is_phased: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub benchmark_tool_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub benchmark_tool_version: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub mean_coverage: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub read_length: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mean_read_length: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mean_insert_size: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub read_quality: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub max_aligned_read: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub is_public: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub owner_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub owner_username: Option<String>,
}

impl MetadataRecord {
    /// Required-field check for ingestion: name, technology, platform,
    /// caller (name/version/type), coverage, and truth set must be present.
    /// Category values are checked for resolvability where required.
    pub fn validate_required(&self) -> PipelineResult<()> {
        let required = [
            ("exp_name", &self.exp_name),
            ("technology", &self.technology),
            ("platform_name", &self.platform_name),
            ("caller_name", &self.caller_name),
            ("caller_version", &self.caller_version),
            ("caller_type", &self.caller_type),
            ("mean_coverage", &self.mean_coverage),
            ("truth_set_name", &self.truth_set_name),
        ];
        for (field, value) in required {
            if clean_value(value.as_deref()).is_none() {
                return Err(PipelineError::Validation(format!(
                    "required field '{field}' is missing"
                )));
            }
        }

        if safe_float(self.mean_coverage.as_deref()).is_none() {
            return Err(PipelineError::Validation(format!(
                "mean_coverage is not numeric: '{}'",
                self.mean_coverage.as_deref().unwrap_or_default()
            )));
        }

        require_category::<SeqTechName>("technology", self.technology.as_deref())?;
        require_category::<CallerName>("caller_name", self.caller_name.as_deref())?;
        require_category::<CallerType>("caller_type", self.caller_type.as_deref())?;
        require_category::<TruthSetName>("truth_set_name", self.truth_set_name.as_deref())?;

        Ok(())
    }

    /// Alias-resolve every category field into the typed dimension records.
    /// Optional categories with unrecognized values are treated as absent;
    /// required ones were already rejected by [`Self::validate_required`].
    pub fn dimension_set(&self) -> PipelineResult<DimensionSet> {
        let technology = require_category::<SeqTechName>("technology", self.technology.as_deref())?;
        let caller_name = require_category::<CallerName>("caller_name", self.caller_name.as_deref())?;
        let caller_type = require_category::<CallerType>("caller_type", self.caller_type.as_deref())?;
        let truth_set_name =
            require_category::<TruthSetName>("truth_set_name", self.truth_set_name.as_deref())?;

        let sequencing_technology = SequencingTechnologyRecord {
            technology,
            // WGS is the historical default when the form leaves target blank.
            target: optional_category::<SeqTechTarget>(self.target.as_deref())
                .or(Some(SeqTechTarget::Wgs)),
            platform_type: optional_category::<SeqTechPlatformType>(self.platform_type.as_deref()),
            platform_name: clean_value(self.platform_name.as_deref()),
            platform_version: clean_value(self.platform_version.as_deref()),
        };

        let variant_caller = VariantCallerRecord {
            name: caller_name,
            caller_type: Some(caller_type),
            version: clean_value(self.caller_version.as_deref()),
            model: clean_value(self.caller_model.as_deref()),
        };

        let aligner = clean_value(self.aligner_name.as_deref()).map(|name| AlignerRecord {
            name,
            version: clean_value(self.aligner_version.as_deref()),
        });

        let truth_set = TruthSetRecord {
            name: truth_set_name,
            version: clean_value(self.truth_set_version.as_deref()),
            reference: optional_category::<TruthSetReference>(self.truth_set_reference.as_deref()),
            sample: optional_category::<TruthSetSample>(self.truth_set_sample.as_deref())
                .or(Some(TruthSetSample::Hg002)),
        };

        let benchmark_tool = BenchmarkToolRecord {
            name: optional_category::<BenchmarkToolName>(self.benchmark_tool_name.as_deref())
                .unwrap_or(BenchmarkToolName::Happy),
            version: clean_value(self.benchmark_tool_version.as_deref()),
        };

        let variant = VariantRecord {
            variant_type: optional_category::<VariantType>(self.variant_type.as_deref())
                .or(Some(VariantType::SnpIndel)),
            size: optional_category::<VariantSize>(self.variant_size.as_deref()),
            origin: optional_category::<VariantOrigin>(self.variant_origin.as_deref()),
            is_phased: parse_boolean(self.is_phased.as_deref()),
        };

        let quality_control = QualityControlRecord {
            mean_coverage: safe_float(self.mean_coverage.as_deref()),
            read_length: safe_float(self.read_length.as_deref()),
            mean_read_length: safe_float(self.mean_read_length.as_deref()),
            mean_insert_size: safe_float(self.mean_insert_size.as_deref()),
            read_quality: safe_float(self.read_quality.as_deref()),
            max_aligned_read: safe_float(self.max_aligned_read.as_deref()),
        };
        let quality_control = if quality_control.is_empty() {
            None
        } else {
            Some(quality_control)
        };

        let chemistry = clean_value(self.chemistry_name.as_deref()).map(|name| ChemistryRecord {
            name,
            version: clean_value(self.chemistry_version.as_deref()),
            technology: Some(technology),
            platform: clean_value(self.platform_name.as_deref()),
        });

        Ok(DimensionSet {
            sequencing_technology,
            variant_caller,
            aligner,
            truth_set,
            benchmark_tool,
            variant,
            quality_control,
            chemistry,
        })
    }
}

fn require_category<T: Category>(field: &str, value: Option<&str>) -> PipelineResult<T> {
    let raw = clean_value(value).ok_or_else(|| {
        PipelineError::Validation(format!("required category '{field}' is missing"))
    })?;
    T::resolve(&raw).ok_or_else(|| {
        PipelineError::Validation(format!("unrecognized {field} value: '{raw}'"))
    })
}

fn optional_category<T: Category>(value: Option<&str>) -> Option<T> {
    clean_value(value).and_then(|raw| T::resolve(&raw))
}

/// Internal shim so the generic require/optional helpers can dispatch to
/// each catalog enum's resolver.
trait Category: Sized + Copy {
    fn resolve(value: &str) -> Option<Self>;
}

macro_rules! impl_category {
    ($($name:ident),+ $(,)?) => {
        $(impl Category for $name {
            fn resolve(value: &str) -> Option<Self> {
                $name::from_label(value)
            }
        })+
    };
}

impl_category!(
    SeqTechName,
    SeqTechTarget,
    SeqTechPlatformType,
    CallerName,
    CallerType,
    TruthSetName,
    TruthSetReference,
    TruthSetSample,
    VariantOrigin,
    VariantSize,
    VariantType,
    BenchmarkToolName,
);

// ---------------------------------------------------------------------------
// Dimension records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SequencingTechnologyRecord {
    pub technology: SeqTechName,
    pub target: Option<SeqTechTarget>,
    pub platform_type: Option<SeqTechPlatformType>,
    pub platform_name: Option<String>,
    pub platform_version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VariantCallerRecord {
    pub name: CallerName,
    pub caller_type: Option<CallerType>,
    pub version: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AlignerRecord {
    pub name: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TruthSetRecord {
    pub name: TruthSetName,
    pub version: Option<String>,
    pub reference: Option<TruthSetReference>,
    pub sample: Option<TruthSetSample>,
}

#[derive(Debug, Clone)]
pub struct BenchmarkToolRecord {
    pub name: BenchmarkToolName,
    pub version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VariantRecord {
    pub variant_type: Option<VariantType>,
    pub size: Option<VariantSize>,
    pub origin: Option<VariantOrigin>,
    pub is_phased: bool,
}

#[derive(Debug, Clone)]
pub struct QualityControlRecord {
    pub mean_coverage: Option<f64>,
    pub read_length: Option<f64>,
    pub mean_read_length: Option<f64>,
    pub mean_insert_size: Option<f64>,
    pub read_quality: Option<f64>,
    pub max_aligned_read: Option<f64>,
}

impl QualityControlRecord {
    /// A QC row with no measurements at all is not worth a dimension row.
    pub fn is_empty(&self) -> bool {
        self.mean_coverage.is_none()
            && self.read_length.is_none()
            && self.mean_read_length.is_none()
            && self.mean_insert_size.is_none()
            && self.read_quality.is_none()
            && self.max_aligned_read.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ChemistryRecord {
    pub name: String,
    pub version: Option<String>,
    pub technology: Option<SeqTechName>,
    pub platform: Option<String>,
}

/// The alias-resolved dimension payload handed to the experiment assembler.
/// Aligner, QC, and chemistry are genuinely optional; the rest always carry
/// data once validation has passed.
#[derive(Debug, Clone)]
pub struct DimensionSet {
    pub sequencing_technology: SequencingTechnologyRecord,
    pub variant_caller: VariantCallerRecord,
    pub aligner: Option<AlignerRecord>,
    pub truth_set: TruthSetRecord,
    pub benchmark_tool: BenchmarkToolRecord,
    pub variant: VariantRecord,
    pub quality_control: Option<QualityControlRecord>,
    pub chemistry: Option<ChemistryRecord>,
}

/// Resolved dimension row ids, in experiment-column order.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DimensionIds {
    pub sequencing_technology_id: Option<i64>,
    pub variant_caller_id: Option<i64>,
    pub aligner_id: Option<i64>,
    pub truth_set_id: Option<i64>,
    pub benchmark_tool_id: Option<i64>,
    pub variant_id: Option<i64>,
    pub quality_control_id: Option<i64>,
    pub chemistry_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Experiment rows
// ---------------------------------------------------------------------------

/// Requested visibility/ownership for a new experiment. Public rows never
/// store an owner reference; attribution survives only in the denormalized
/// username column. Private rows normally carry an owner; a `None` owner is
/// reserved for legacy rows re-created by disaster recovery and is rejected
/// on the upload path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private { owner_id: Option<i64> },
}

impl Visibility {
    pub fn is_public(self) -> bool {
        matches!(self, Self::Public)
    }

    pub fn owner_id(self) -> Option<i64> {
        match self {
            Self::Public => None,
            Self::Private { owner_id } => owner_id,
        }
    }
}

/// Identifier allocation policy. Partitioned deployments keep public
/// experiments in 1..=999 and private ones at 1000 and above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSpace {
    Flat,
    Partitioned,
}

pub const PUBLIC_ID_MAX: i64 = 999;
pub const PRIVATE_ID_MIN: i64 = 1000;

/// Everything the assembler needs to create one experiment row.
#[derive(Debug, Clone)]
pub struct ExperimentRequest {
    pub requested_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub visibility: Visibility,
    pub owner_username: Option<String>,
    pub file_name: Option<String>,
    pub file_sha256: Option<String>,
    pub dimensions: DimensionSet,
}

/// One experiment row as read back from the store.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub is_public: bool,
    pub owner_id: Option<i64>,
    pub owner_username: Option<String>,
    pub file_name: Option<String>,
    pub file_sha256: Option<String>,
    pub dimension_ids: DimensionIds,
}

// ---------------------------------------------------------------------------
// Parsed benchmark results
// ---------------------------------------------------------------------------

/// One stratified result row retained from a hap.py file.
#[derive(Debug, Clone)]
pub struct BenchmarkResultRow {
    pub variant_type: String,
    pub subset: RegionType,
    pub metric_recall: Option<f64>,
    pub metric_precision: Option<f64>,
    pub metric_f1_score: Option<f64>,
    pub subset_size: Option<f64>,
    pub subset_is_conf_size: Option<f64>,
    pub truth_total: Option<i64>,
    pub truth_total_het: Option<i64>,
    pub truth_total_homalt: Option<i64>,
    pub truth_tp: Option<i64>,
    pub truth_tp_het: Option<i64>,
    pub truth_tp_homalt: Option<i64>,
    pub truth_fn: Option<i64>,
    pub truth_fn_het: Option<i64>,
    pub truth_fn_homalt: Option<i64>,
    pub query_total: Option<i64>,
    pub query_total_het: Option<i64>,
    pub query_total_homalt: Option<i64>,
    pub query_tp: Option<i64>,
    pub query_tp_het: Option<i64>,
    pub query_tp_homalt: Option<i64>,
    pub query_fp: Option<i64>,
    pub query_fp_het: Option<i64>,
    pub query_fp_homalt: Option<i64>,
    pub query_unk: Option<i64>,
    pub query_unk_het: Option<i64>,
    pub query_unk_homalt: Option<i64>,
}

/// Whole-genome fast-path row, duplicated from the ALL-region stratification.
#[derive(Debug, Clone)]
pub struct OverallResultRow {
    pub variant_type: String,
    pub metric_recall: Option<f64>,
    pub metric_precision: Option<f64>,
    pub metric_f1_score: Option<f64>,
    pub truth_total: Option<i64>,
    pub truth_tp: Option<i64>,
    pub truth_fn: Option<i64>,
    pub query_total: Option<i64>,
    pub query_tp: Option<i64>,
    pub query_fp: Option<i64>,
}

/// Output of the result-file parser, before any database write.
#[derive(Debug, Clone, Default)]
pub struct ParsedResults {
    pub benchmark: Vec<BenchmarkResultRow>,
    pub overall: Vec<OverallResultRow>,
    pub skipped_regions: Vec<String>,
}

// ---------------------------------------------------------------------------
// Orchestrator outcomes
// ---------------------------------------------------------------------------

/// Success report for one upload. `warnings` carries partial failures that
/// happened after the authoritative database commit.
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub experiment_id: i64,
    pub file_name: String,
    pub benchmark_rows: usize,
    pub overall_rows: usize,
    pub dimension_ids: DimensionIds,
    pub warnings: Vec<String>,
}

/// Success report for one deletion.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub experiment_id: i64,
    pub benchmark_rows_deleted: usize,
    pub overall_rows_deleted: usize,
    pub archived_file: Option<String>,
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// CSV backup projection
// ---------------------------------------------------------------------------

/// Column order of the backup mirror. The deleted archive appends
/// `deleted_at` and `deleted_by`.
pub const BACKUP_COLUMNS: [&str; 33] = [
    "id",
    "name",
    "technology",
    "target",
    "platform_name",
    "platform_type",
    "platform_version",
    "chemistry_name",
    "caller_name",
    "caller_type",
    "caller_version",
    "caller_model",
    "aligner_name",
    "aligner_version",
    "truth_set_name",
    "truth_set_sample",
    "truth_set_version",
    "truth_set_reference",
    "variant_type",
    "variant_size",
    "variant_origin",
    "is_phased",
    "benchmark_tool_name",
    "benchmark_tool_version",
    "mean_coverage",
    "read_length",
    "mean_insert_size",
    "mean_read_length",
    "file_name",
    "file_path",
    "created_at",
    "is_public",
    "owner_username",
];

/// One flattened experiment row in the CSV backup mirror. Every field except
/// the identifier is kept as text; an empty cell means absent, matching the
/// historical file layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackupRow {
    pub id: i64,
    pub name: String,
    pub technology: String,
    pub target: String,
    pub platform_name: String,
    pub platform_type: String,
    pub platform_version: String,
    pub chemistry_name: String,
    pub caller_name: String,
    pub caller_type: String,
    pub caller_version: String,
    pub caller_model: String,
    pub aligner_name: String,
    pub aligner_version: String,
    pub truth_set_name: String,
    pub truth_set_sample: String,
    pub truth_set_version: String,
    pub truth_set_reference: String,
    pub variant_type: String,
    pub variant_size: String,
    pub variant_origin: String,
    pub is_phased: String,
    pub benchmark_tool_name: String,
    pub benchmark_tool_version: String,
    pub mean_coverage: String,
    pub read_length: String,
    pub mean_insert_size: String,
    pub mean_read_length: String,
    pub file_name: String,
    pub file_path: String,
    pub created_at: String,
    pub is_public: String,
    pub owner_username: String,
}

impl BackupRow {
    /// Build the mirror projection straight from the ingested metadata, the
    /// way the live upload path does.
    pub fn from_metadata(
        experiment_id: i64,
        metadata: &MetadataRecord,
        file_name: Option<&str>,
        created_at: &str,
        is_public: bool,
    ) -> Self {
        let text = |value: &Option<String>| clean_value(value.as_deref()).unwrap_or_default();
        Self {
            id: experiment_id,
            name: text(&metadata.exp_name),
            technology: text(&metadata.technology),
            target: text(&metadata.target),
            platform_name: text(&metadata.platform_name),
            platform_type: text(&metadata.platform_type),
            platform_version: text(&metadata.platform_version),
            chemistry_name: text(&metadata.chemistry_name),
            caller_name: text(&metadata.caller_name),
            caller_type: text(&metadata.caller_type),
            caller_version: text(&metadata.caller_version),
            caller_model: text(&metadata.caller_model),
            aligner_name: text(&metadata.aligner_name),
            aligner_version: text(&metadata.aligner_version),
            truth_set_name: text(&metadata.truth_set_name),
            truth_set_sample: text(&metadata.truth_set_sample),
            truth_set_version: text(&metadata.truth_set_version),
            truth_set_reference: text(&metadata.truth_set_reference),
            variant_type: text(&metadata.variant_type),
            variant_size: text(&metadata.variant_size),
            variant_origin: text(&metadata.variant_origin),
            is_phased: parse_boolean(metadata.is_phased.as_deref()).to_string(),
            benchmark_tool_name: text(&metadata.benchmark_tool_name),
            benchmark_tool_version: text(&metadata.benchmark_tool_version),
            mean_coverage: text(&metadata.mean_coverage),
            read_length: text(&metadata.read_length),
            mean_insert_size: text(&metadata.mean_insert_size),
            mean_read_length: text(&metadata.mean_read_length),
            file_name: file_name.unwrap_or_default().to_string(),
            file_path: String::new(),
            created_at: created_at.to_string(),
            is_public: is_public.to_string(),
            owner_username: text(&metadata.owner_username),
        }
    }

    /// Field values in [`BACKUP_COLUMNS`] order.
    pub fn to_fields(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.name.clone(),
            self.technology.clone(),
            self.target.clone(),
            self.platform_name.clone(),
            self.platform_type.clone(),
            self.platform_version.clone(),
            self.chemistry_name.clone(),
            self.caller_name.clone(),
            self.caller_type.clone(),
            self.caller_version.clone(),
            self.caller_model.clone(),
            self.aligner_name.clone(),
            self.aligner_version.clone(),
            self.truth_set_name.clone(),
            self.truth_set_sample.clone(),
            self.truth_set_version.clone(),
            self.truth_set_reference.clone(),
            self.variant_type.clone(),
            self.variant_size.clone(),
            self.variant_origin.clone(),
            self.is_phased.clone(),
            self.benchmark_tool_name.clone(),
            self.benchmark_tool_version.clone(),
            self.mean_coverage.clone(),
            self.read_length.clone(),
            self.mean_insert_size.clone(),
            self.mean_read_length.clone(),
            self.file_name.clone(),
            self.file_path.clone(),
            self.created_at.clone(),
            self.is_public.clone(),
            self.owner_username.clone(),
        ]
    }

    /// Rebuild a row from CSV cells in [`BACKUP_COLUMNS`] order.
    pub fn from_fields(fields: &[&str]) -> PipelineResult<Self> {
        if fields.len() < BACKUP_COLUMNS.len() {
            return Err(PipelineError::Validation(format!(
                "backup row has {} columns, expected {}",
                fields.len(),
                BACKUP_COLUMNS.len()
            )));
        }
        let id = fields[0].trim().parse::<i64>().map_err(|_| {
            PipelineError::Validation(format!("backup row has invalid id: '{}'", fields[0]))
        })?;
        let cell = |index: usize| fields[index].trim().to_string();
        Ok(Self {
            id,
            name: cell(1),
            technology: cell(2),
            target: cell(3),
            platform_name: cell(4),
            platform_type: cell(5),
            platform_version: cell(6),
            chemistry_name: cell(7),
            caller_name: cell(8),
            caller_type: cell(9),
            caller_version: cell(10),
            caller_model: cell(11),
            aligner_name: cell(12),
            aligner_version: cell(13),
            truth_set_name: cell(14),
            truth_set_sample: cell(15),
            truth_set_version: cell(16),
            truth_set_reference: cell(17),
            variant_type: cell(18),
            variant_size: cell(19),
            variant_origin: cell(20),
            is_phased: cell(21),
            benchmark_tool_name: cell(22),
            benchmark_tool_version: cell(23),
            mean_coverage: cell(24),
            read_length: cell(25),
            mean_insert_size: cell(26),
            mean_read_length: cell(27),
            file_name: cell(28),
            file_path: cell(29),
            created_at: cell(30),
            is_public: cell(31),
            owner_username: cell(32),
        })
    }

    /// Turn a mirror row back into an ingestable metadata record for
    /// disaster recovery.
    pub fn to_metadata(&self) -> MetadataRecord {
        let opt = |value: &str| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        };
        MetadataRecord {
            exp_name: opt(&self.name),
            technology: opt(&self.technology),
            target: opt(&self.target),
            platform_name: opt(&self.platform_name),
            platform_type: opt(&self.platform_type),
            platform_version: opt(&self.platform_version),
            chemistry_name: opt(&self.chemistry_name),
            caller_name: opt(&self.caller_name),
            caller_type: opt(&self.caller_type),
            caller_version: opt(&self.caller_version),
            caller_model: opt(&self.caller_model),
            aligner_name: opt(&self.aligner_name),
            aligner_version: opt(&self.aligner_version),
            truth_set_name: opt(&self.truth_set_name),
            truth_set_sample: opt(&self.truth_set_sample),
            truth_set_version: opt(&self.truth_set_version),
            truth_set_reference: opt(&self.truth_set_reference),
            variant_type: opt(&self.variant_type),
            variant_size: opt(&self.variant_size),
            variant_origin: opt(&self.variant_origin),
            is_phased: opt(&self.is_phased),
            benchmark_tool_name: opt(&self.benchmark_tool_name),
            benchmark_tool_version: opt(&self.benchmark_tool_version),
            mean_coverage: opt(&self.mean_coverage),
            read_length: opt(&self.read_length),
            mean_insert_size: opt(&self.mean_insert_size),
            mean_read_length: opt(&self.mean_read_length),
            created_at: opt(&self.created_at),
            is_public: opt(&self.is_public),
            owner_username: opt(&self.owner_username),
            ..Default::default()
        }
    }

    pub fn is_public(&self) -> bool {
        !self.is_public.eq_ignore_ascii_case("false")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_metadata() -> MetadataRecord {
        MetadataRecord {
            exp_name: Some("HG002_run1".to_string()),
            technology: Some("illumina".to_string()),
            platform_name: Some("NovaSeq 6000".to_string()),
            caller_name: Some("deepvariant".to_string()),
            caller_type: Some("ml".to_string()),
            caller_version: Some("1.5".to_string()),
            mean_coverage: Some("34.2".to_string()),
            truth_set_name: Some("giab".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn lenient_fields_accept_mixed_scalars() {
        let record: MetadataRecord = serde_json::from_str(
            r#"{
                "exp_name": "HG002_run1",
                "mean_coverage": 34.5,
                "is_phased": true,
                "owner_id": "12",
                "read_length": null
            }"#,
        )
        .unwrap();

        assert_eq!(record.exp_name.as_deref(), Some("HG002_run1"));
        assert_eq!(record.mean_coverage.as_deref(), Some("34.5"));
        assert_eq!(record.is_phased.as_deref(), Some("true"));
        assert_eq!(record.owner_id, Some(12));
        assert!(record.read_length.is_none());
    }

    #[test]
    fn validate_required_rejects_missing_fields() {
        let mut record = minimal_metadata();
        record.truth_set_name = None;
        let err = record.validate_required().unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(err.to_string().contains("truth_set_name"));
    }

    #[test]
    fn validate_required_rejects_unknown_required_category() {
        let mut record = minimal_metadata();
        record.technology = Some("sanger".to_string());
        let err = record.validate_required().unwrap_err();
        assert!(err.to_string().contains("sanger"));
    }

    #[test]
    fn dimension_set_applies_defaults_and_optional_absence() {
        let record = minimal_metadata();
        record.validate_required().unwrap();
        let dims = record.dimension_set().unwrap();

        assert_eq!(dims.sequencing_technology.technology, SeqTechName::Illumina);
        assert_eq!(dims.sequencing_technology.target, Some(SeqTechTarget::Wgs));
        assert_eq!(dims.truth_set.sample, Some(TruthSetSample::Hg002));
        assert_eq!(dims.benchmark_tool.name, BenchmarkToolName::Happy);
        assert_eq!(dims.variant.variant_type, Some(VariantType::SnpIndel));
        assert!(dims.aligner.is_none());
        assert!(dims.chemistry.is_none());
        // mean_coverage alone is enough for a QC row.
        assert!(dims.quality_control.is_some());
    }

    #[test]
    fn unrecognized_optional_category_is_treated_as_absent() {
        let mut record = minimal_metadata();
        record.variant_origin = Some("metagenomic".to_string());
        let dims = record.dimension_set().unwrap();
        assert!(dims.variant.origin.is_none());
    }
}
