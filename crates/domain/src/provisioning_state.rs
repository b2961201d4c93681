//! Provisioning health state machine.
//!
//! HEALTHY -> DEGRADED is the only automatic transition. The first cause of
//! an incident owns `incident_id` and `degraded_at`; later causes only update
//! the diagnostic `reason` and `metadata`.

use chrono::{DateTime, Utc};
use grantry_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::IncidentId;

/// Whether automated provisioning is currently possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisioningStatus {
    /// Automated provisioning runs normally.
    Healthy,
    /// Automated provisioning is paused until an operator recovers it.
    Degraded,
}

impl ProvisioningStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::Degraded => "DEGRADED",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "HEALTHY" => Ok(Self::Healthy),
            "DEGRADED" => Ok(Self::Degraded),
            _ => Err(AppError::Validation(format!(
                "unknown provisioning status '{value}'"
            ))),
        }
    }
}

/// Singleton provisioning state record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningState {
    /// Current status.
    pub status: ProvisioningStatus,
    /// Latest diagnostic reason while degraded.
    pub reason: Option<String>,
    /// Diagnostic metadata merged across causes of the current incident.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Identifier of the current incident.
    pub incident_id: Option<IncidentId>,
    /// Start of the most recent incident.
    pub degraded_at: Option<DateTime<Utc>>,
    /// Most recent recovery timestamp.
    pub healthy_at: Option<DateTime<Utc>>,
    /// Subject that confirmed the most recent recovery.
    pub recovered_by: Option<String>,
}

/// Result of entering DEGRADED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradeTransition {
    /// A new incident started.
    Entered {
        /// New incident identifier.
        incident_id: IncidentId,
    },
    /// The state was already degraded; only diagnostics changed.
    AlreadyDegraded {
        /// Unchanged incident identifier.
        incident_id: IncidentId,
    },
}

impl DegradeTransition {
    /// Returns the incident the state is now in.
    #[must_use]
    pub fn incident_id(&self) -> IncidentId {
        match self {
            Self::Entered { incident_id } | Self::AlreadyDegraded { incident_id } => *incident_id,
        }
    }

    /// Returns whether this call opened the incident.
    #[must_use]
    pub fn is_new_incident(&self) -> bool {
        matches!(self, Self::Entered { .. })
    }
}

/// Result of an operator-confirmed recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverTransition {
    /// DEGRADED -> HEALTHY.
    Recovered {
        /// Incident that was closed.
        incident_id: Option<IncidentId>,
    },
    /// The state was already healthy; `healthy_at` was refreshed.
    AlreadyHealthy,
}

impl Default for ProvisioningState {
    fn default() -> Self {
        Self::healthy()
    }
}

impl ProvisioningState {
    /// Initial healthy state.
    #[must_use]
    pub fn healthy() -> Self {
        Self {
            status: ProvisioningStatus::Healthy,
            reason: None,
            metadata: Map::new(),
            incident_id: None,
            degraded_at: None,
            healthy_at: None,
            recovered_by: None,
        }
    }

    /// Returns whether automated work is paused.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.status == ProvisioningStatus::Degraded
    }

    /// Enters DEGRADED, keeping the incident of an already-degraded state.
    pub fn degrade(
        &mut self,
        reason: impl Into<String>,
        metadata: Value,
        now: DateTime<Utc>,
    ) -> DegradeTransition {
        self.reason = Some(reason.into());

        match (self.status, self.incident_id) {
            (ProvisioningStatus::Degraded, Some(incident_id)) => {
                merge_metadata(&mut self.metadata, metadata);
                DegradeTransition::AlreadyDegraded { incident_id }
            }
            _ => {
                let incident_id = IncidentId::new();
                self.status = ProvisioningStatus::Degraded;
                self.incident_id = Some(incident_id);
                self.degraded_at = Some(now);
                self.metadata = Map::new();
                merge_metadata(&mut self.metadata, metadata);
                DegradeTransition::Entered { incident_id }
            }
        }
    }

    /// Returns to HEALTHY after an explicit, validated operator action.
    pub fn recover(&mut self, triggered_by: impl Into<String>, now: DateTime<Utc>) -> RecoverTransition {
        let was_degraded = self.is_degraded();
        let closed_incident = self.incident_id;

        self.status = ProvisioningStatus::Healthy;
        self.reason = None;
        self.metadata = Map::new();
        self.incident_id = None;
        self.healthy_at = Some(now);
        self.recovered_by = Some(triggered_by.into());

        if was_degraded {
            RecoverTransition::Recovered {
                incident_id: closed_incident,
            }
        } else {
            RecoverTransition::AlreadyHealthy
        }
    }
}

fn merge_metadata(target: &mut Map<String, Value>, metadata: Value) {
    match metadata {
        Value::Object(entries) => target.extend(entries),
        Value::Null => {}
        other => {
            target.insert("detail".to_owned(), other);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use proptest::prelude::*;
    use serde_json::json;

    use super::{ProvisioningState, ProvisioningStatus, RecoverTransition};

    #[test]
    fn first_degrade_opens_incident() {
        let mut state = ProvisioningState::healthy();
        let now = Utc::now();
        let transition = state.degrade("session expired", json!({"status": 401}), now);

        assert!(transition.is_new_incident());
        assert_eq!(state.status, ProvisioningStatus::Degraded);
        assert_eq!(state.incident_id, Some(transition.incident_id()));
        assert_eq!(state.degraded_at, Some(now));
        assert_eq!(state.metadata.get("status"), Some(&json!(401)));
    }

    #[test]
    fn repeated_degrade_keeps_incident_and_updates_reason() {
        let mut state = ProvisioningState::healthy();
        let started = Utc::now();
        let first = state.degrade("session expired", json!({"grant": "a"}), started);
        let second = state.degrade(
            "forbidden",
            json!({"grant": "b", "status": 403}),
            started + Duration::minutes(5),
        );

        assert!(!second.is_new_incident());
        assert_eq!(first.incident_id(), second.incident_id());
        assert_eq!(state.degraded_at, Some(started));
        assert_eq!(state.reason.as_deref(), Some("forbidden"));
        assert_eq!(state.metadata.get("grant"), Some(&json!("b")));
    }

    #[test]
    fn recover_clears_incident_and_stamps_healthy_at() {
        let mut state = ProvisioningState::healthy();
        let transition = state.degrade("session expired", json!(null), Utc::now());
        let now = Utc::now();

        let recovered = state.recover("ops@example.com", now);
        assert_eq!(
            recovered,
            RecoverTransition::Recovered {
                incident_id: Some(transition.incident_id())
            }
        );
        assert_eq!(state.status, ProvisioningStatus::Healthy);
        assert!(state.reason.is_none());
        assert!(state.incident_id.is_none());
        assert_eq!(state.healthy_at, Some(now));
    }

    #[test]
    fn state_survives_json_storage() {
        let mut state = ProvisioningState::healthy();
        state.degrade("session expired", json!({"status": 401}), Utc::now());

        let encoded = serde_json::to_value(&state);
        assert!(encoded.is_ok());
        let decoded =
            serde_json::from_value::<ProvisioningState>(encoded.unwrap_or_default());
        assert!(decoded.is_ok());
        assert_eq!(decoded.ok(), Some(state));
    }

    proptest! {
        #[test]
        fn degrade_while_degraded_never_moves_incident(reasons in proptest::collection::vec("[a-z ]{1,16}", 1..12)) {
            let mut state = ProvisioningState::healthy();
            let started = Utc::now();
            let first = state.degrade("initial", json!(null), started);

            for (offset, reason) in reasons.into_iter().enumerate() {
                let later = started + Duration::seconds(offset as i64 + 1);
                let transition = state.degrade(reason.clone(), json!({"reason": reason}), later);
                prop_assert_eq!(transition.incident_id(), first.incident_id());
                prop_assert_eq!(state.degraded_at, Some(started));
                prop_assert_eq!(state.incident_id, Some(first.incident_id()));
            }
        }
    }
}
