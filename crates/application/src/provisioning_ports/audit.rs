use async_trait::async_trait;
use grantry_core::AppResult;
use grantry_domain::AuditAction;
use serde_json::Value;

/// Immutable audit event payload emitted by application services.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    /// Subject that performed the action.
    pub subject: String,
    /// Stable audit action identifier.
    pub action: AuditAction,
    /// Resource type label.
    pub resource_type: String,
    /// Resource identifier.
    pub resource_id: String,
    /// Optional structured detail.
    pub detail: Option<Value>,
}

impl AuditEvent {
    /// Creates an audit event without detail.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        action: AuditAction,
        resource_type: impl Into<String>,
        resource_id: impl ToString,
    ) -> Self {
        Self {
            subject: subject.into(),
            action,
            resource_type: resource_type.into(),
            resource_id: resource_id.to_string(),
            detail: None,
        }
    }

    /// Attaches structured detail.
    #[must_use]
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Port for persisting append-only audit events.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Persists one audit event.
    async fn append_event(&self, event: AuditEvent) -> AppResult<()>;
}
