// gridloom-core/src/infrastructure/silver.rs
//
// Silver writer: cleaned partitions land as date-partitioned NDJSON under
// `silver/<source>/date=YYYY-MM-DD/part.ndjson`. A rerun replaces each
// partition file wholesale via atomic rename; readers never see a half
// partition.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::domain::record::CleanedRecord;
use crate::domain::silver::TransformResult;
use crate::error::GridloomError;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::fs::atomic_write;

pub struct SilverWriter {
    silver_dir: PathBuf,
}

impl SilverWriter {
    pub fn new(silver_dir: impl Into<PathBuf>) -> Self {
        Self {
            silver_dir: silver_dir.into(),
        }
    }

    pub fn partition_path(&self, source: &str, date: NaiveDate) -> PathBuf {
        self.silver_dir
            .join(source)
            .join(format!("date={}", date.format("%Y-%m-%d")))
            .join("part.ndjson")
    }

    /// Write every partition of a transform result. Returns the paths
    /// written, in date order.
    pub fn write(&self, result: &TransformResult) -> Result<Vec<PathBuf>, GridloomError> {
        let mut written = Vec::with_capacity(result.partitions.len());
        for (date, rows) in &result.partitions {
            let path = self.partition_path(&result.source, *date);
            write_partition(&path, rows)?;
            written.push(path);
        }
        info!(
            source = %result.source,
            partitions = written.len(),
            rows = result.rows_out,
            "Silver partitions written"
        );
        Ok(written)
    }
}

fn write_partition(path: &Path, rows: &[CleanedRecord]) -> Result<(), GridloomError> {
    let mut buffer = String::new();
    for row in rows {
        let line = serde_json::to_string(row).map_err(InfrastructureError::JsonError)?;
        buffer.push_str(&line);
        buffer.push('\n');
    }
    atomic_write(path, buffer)?;
    Ok(())
}
