// gridloom-core/src/infrastructure/audit.rs
//
// File-backed audit sink: one NDJSON line per event, appended to
// `<target>/audit.log`. Events are mirrored to tracing so a console run
// shows the same trail the file keeps.

use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::GridloomError;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::audit::{AuditEvent, AuditSink};

pub struct FileAuditSink {
    path: PathBuf,
    // Serializes appends so concurrent events never interleave lines.
    write_guard: Mutex<()>,
}

impl FileAuditSink {
    pub fn new(target_dir: &Path) -> Self {
        Self {
            path: target_dir.join("audit.log"),
            write_guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), GridloomError> {
        let line = serde_json::to_string(&event).map_err(InfrastructureError::JsonError)?;

        let _guard = self
            .write_guard
            .lock()
            .map_err(|_| GridloomError::InternalError("Audit Mutex Poisoned".into()))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;

        tracing::info!(
            component = %event.component,
            event_type = %event.event_type,
            severity = %event.severity,
            "audit"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_events_append_as_ndjson() -> Result<()> {
        let dir = tempdir()?;
        let sink = FileAuditSink::new(dir.path());

        sink.record(AuditEvent::info(
            "fact_loader",
            "facts_loaded",
            serde_json::json!({"inserted": 96, "orphans": 0}),
        ))
        .await?;
        sink.record(AuditEvent::warning(
            "lifecycle",
            "status_changed",
            serde_json::json!({"key": "ARA", "from": "active", "to": "stale"}),
        ))
        .await?;

        let content = std::fs::read_to_string(sink.path())?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: AuditEvent = serde_json::from_str(lines[0])?;
        assert_eq!(first.component, "fact_loader");
        assert_eq!(first.details["inserted"], 96);

        let second: AuditEvent = serde_json::from_str(lines[1])?;
        assert_eq!(second.severity, "WARNING");
        Ok(())
    }
}
