// gridloom-core/src/infrastructure/bronze.rs
//
// Bronze reader: raw JSON batches as landed by the ingestion collaborators.
// A source's batch is either `<bronze>/<source>.json` or a directory
// `<bronze>/<source>/` of JSON files. Each file holds `{"records": [...]}`
// or a bare array of objects.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::domain::record::RawRecord;
use crate::domain::value::{Value, parse_timestamp};
use crate::error::GridloomError;
use crate::infrastructure::error::InfrastructureError;

/// Payload fields checked for an observation timestamp before falling back
/// to the file's modification time.
const OBSERVED_AT_FIELDS: [&str; 2] = ["observed_at", "ingested_at"];

#[derive(Deserialize)]
#[serde(untagged)]
enum BatchPayload {
    Wrapped {
        records: Vec<BTreeMap<String, serde_json::Value>>,
    },
    Bare(Vec<BTreeMap<String, serde_json::Value>>),
}

impl BatchPayload {
    fn into_records(self) -> Vec<BTreeMap<String, serde_json::Value>> {
        match self {
            BatchPayload::Wrapped { records } => records,
            BatchPayload::Bare(records) => records,
        }
    }
}

pub struct BronzeReader {
    bronze_dir: PathBuf,
}

impl BronzeReader {
    pub fn new(bronze_dir: impl Into<PathBuf>) -> Self {
        Self {
            bronze_dir: bronze_dir.into(),
        }
    }

    /// All raw records for one source family, across every batch file,
    /// in deterministic (path-sorted) order.
    pub fn read_source(&self, source: &str) -> Result<Vec<RawRecord>, GridloomError> {
        let files = self.batch_files(source)?;
        let mut records = Vec::new();
        for path in &files {
            records.extend(read_batch_file(path)?);
        }
        info!(source, files = files.len(), records = records.len(), "Bronze batch read");
        Ok(records)
    }

    fn batch_files(&self, source: &str) -> Result<Vec<PathBuf>, GridloomError> {
        let single = self.bronze_dir.join(format!("{source}.json"));
        if single.is_file() {
            return Ok(vec![single]);
        }

        let dir = self.bronze_dir.join(source);
        if !dir.is_dir() {
            return Err(InfrastructureError::BronzeNotFound(format!(
                "{} (checked {}.json and {}/)",
                self.bronze_dir.display(),
                source,
                source
            ))
            .into());
        }

        let mut files: Vec<PathBuf> = WalkDir::new(&dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e == "json")
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

fn read_batch_file(path: &Path) -> Result<Vec<RawRecord>, GridloomError> {
    let batch_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string();

    let content = fs::read_to_string(path)?;
    let payload: BatchPayload =
        serde_json::from_str(&content).map_err(InfrastructureError::JsonError)?;

    let fallback = file_mtime(path).unwrap_or_else(Utc::now);

    let records = payload
        .into_records()
        .into_iter()
        .map(|object| {
            let fields: BTreeMap<String, Value> = object
                .into_iter()
                .map(|(k, v)| (k, Value::from_json(&v)))
                .collect();
            let observed_at = observed_at(&fields).unwrap_or(fallback);
            RawRecord::new(batch_id.clone(), observed_at, fields)
        })
        .collect::<Vec<_>>();

    if records.is_empty() {
        warn!(path = %path.display(), "Bronze batch file contains no records");
    }
    Ok(records)
}

fn observed_at(fields: &BTreeMap<String, Value>) -> Option<DateTime<Utc>> {
    for field in OBSERVED_AT_FIELDS {
        match fields.get(field) {
            Some(Value::Timestamp(ts)) => return Some(*ts),
            Some(Value::Text(s)) => {
                if let Some(ts) = parse_timestamp(s) {
                    return Some(ts);
                }
            }
            _ => {}
        }
    }
    None
}

fn file_mtime(path: &Path) -> Option<DateTime<Utc>> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_read_single_wrapped_file() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("grid_production.json"),
            r#"{"records": [
                {"region": "IDF", "eolien": 120.5, "observed_at": "2025-01-01T10:00:00Z"},
                {"region": "BRE", "eolien": null}
            ]}"#,
        )?;

        let reader = BronzeReader::new(dir.path());
        let records = reader.read_source("grid_production")?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].batch_id, "grid_production");
        assert_eq!(
            records[0].observed_at.to_rfc3339(),
            "2025-01-01T10:00:00+00:00"
        );
        assert!(records[1].fields["eolien"].is_null());
        Ok(())
    }

    #[test]
    fn test_read_directory_of_bare_arrays() -> Result<()> {
        let dir = tempdir()?;
        let source_dir = dir.path().join("weather");
        fs::create_dir_all(&source_dir)?;
        fs::write(source_dir.join("2025-01-01.json"), r#"[{"t": 3.4}]"#)?;
        fs::write(source_dir.join("2025-01-02.json"), r#"[{"t": 4.1}, {"t": 5.0}]"#)?;

        let reader = BronzeReader::new(dir.path());
        let records = reader.read_source("weather")?;
        assert_eq!(records.len(), 3);
        // batch_id is the file stem, files visited in path order
        assert_eq!(records[0].batch_id, "2025-01-01");
        assert_eq!(records[1].batch_id, "2025-01-02");
        Ok(())
    }

    #[test]
    fn test_missing_source_is_bronze_not_found() -> Result<()> {
        let dir = tempdir()?;
        let reader = BronzeReader::new(dir.path());
        let err = reader.read_source("ghost").unwrap_err();
        assert!(matches!(
            err,
            GridloomError::Infrastructure(InfrastructureError::BronzeNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_mtime_fallback_when_no_observed_at() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("prices.json"), r#"[{"price": 42.0}]"#)?;

        let reader = BronzeReader::new(dir.path());
        let records = reader.read_source("prices")?;
        // mtime of a file written just now is close to now
        let age = Utc::now().signed_duration_since(records[0].observed_at);
        assert!(age.num_seconds().abs() < 60);
        Ok(())
    }
}
