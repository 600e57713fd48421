use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn utc_compact_string(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];

    loop {
        let count = file
            .read(&mut buf)
            .with_context(|| format!("failed to read file for hashing: {}", path.display()))?;
        if count == 0 {
            break;
        }
        hasher.update(&buf[..count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Trim a form value; empty and whitespace-only inputs collapse to `None`.
pub fn clean_value(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

/// Normalization applied to every string-valued natural-key field:
/// all whitespace stripped, lowercased. Dimension rows that differ only by
/// case or spacing must resolve to the same stored key.
pub fn normalize_key_component(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Join normalized natural-key components into the stored `natural_key`.
/// Missing components keep their slot so `(a, None, c)` and `(a, c, None)`
/// never collide.
pub fn compose_natural_key(components: &[Option<&str>]) -> String {
    components
        .iter()
        .map(|component| component.map(normalize_key_component).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("|")
}

/// Permissive float coercion for spreadsheet/hap.py cells. Thousands
/// separators are tolerated; anything non-numeric becomes `None`.
pub fn safe_float(value: Option<&str>) -> Option<f64> {
    let cleaned = clean_value(value)?;
    let cleaned = cleaned.replace(',', "");
    if cleaned.eq_ignore_ascii_case("nan") {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Permissive integer coercion. hap.py writes counts as floats ("1023.0"),
/// so parse through f64 first.
pub fn safe_int(value: Option<&str>) -> Option<i64> {
    safe_float(value).map(|v| v as i64)
}

/// Form booleans arrive as strings; only a literal "true" counts.
pub fn parse_boolean(value: Option<&str>) -> bool {
    clean_value(value)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_key_component_strips_spaces_and_case() {
        assert_eq!(normalize_key_component("NovaSeq 6000"), "novaseq6000");
        assert_eq!(normalize_key_component("  DeepVariant "), "deepvariant");
    }

    #[test]
    fn compose_natural_key_keeps_empty_slots() {
        let a = compose_natural_key(&[Some("ILLUMINA"), None, Some("NovaSeq")]);
        let b = compose_natural_key(&[Some("ILLUMINA"), Some("NovaSeq"), None]);
        assert_ne!(a, b);
        assert_eq!(a, "illumina||novaseq");
    }

    #[test]
    fn safe_float_tolerates_separators_and_garbage() {
        assert_eq!(safe_float(Some("1,023.5")), Some(1023.5));
        assert_eq!(safe_float(Some("nan")), None);
        assert_eq!(safe_float(Some("")), None);
        assert_eq!(safe_float(Some("thirty")), None);
        assert_eq!(safe_float(None), None);
    }

    #[test]
    fn safe_int_parses_float_formatted_counts() {
        assert_eq!(safe_int(Some("1023.0")), Some(1023));
        assert_eq!(safe_int(Some(" 42 ")), Some(42));
        assert_eq!(safe_int(Some(".")), None);
    }

    #[test]
    fn parse_boolean_only_accepts_true() {
        assert!(parse_boolean(Some("TRUE")));
        assert!(!parse_boolean(Some("yes")));
        assert!(!parse_boolean(None));
    }
}
