// gridloom-core/src/ports/audit.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GridloomError;

/// One structured audit entry. Every state-changing pipeline action emits
/// one of these so a run can be reconstructed after the fact.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    /// Emitting component, e.g. "fact_loader" or "lifecycle".
    pub component: String,
    /// Machine-readable event name, e.g. "facts_loaded" or "status_changed".
    pub event_type: String,
    pub severity: String,
    pub details: serde_json::Value,
}

impl AuditEvent {
    pub fn info(component: &str, event_type: &str, details: serde_json::Value) -> Self {
        Self::with_severity(component, event_type, "INFO", details)
    }

    pub fn warning(component: &str, event_type: &str, details: serde_json::Value) -> Self {
        Self::with_severity(component, event_type, "WARNING", details)
    }

    fn with_severity(
        component: &str,
        event_type: &str,
        severity: &str,
        details: serde_json::Value,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            component: component.to_string(),
            event_type: event_type.to_string(),
            severity: severity.to_string(),
            details,
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), GridloomError>;
}

/// Default sink: mirror events into the tracing subscriber. Good enough for
/// local runs and tests; production deployments use the file sink.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), GridloomError> {
        tracing::info!(
            component = %event.component,
            event_type = %event.event_type,
            severity = %event.severity,
            details = %event.details,
            "audit"
        );
        Ok(())
    }
}
