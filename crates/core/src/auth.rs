use serde::{Deserialize, Serialize};

/// Already-authorized operator performing an administrative action.
///
/// Authentication of the operator happens at the HTTP edge; services only
/// record who acted for audit purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorIdentity {
    subject: String,
    display_name: String,
}

impl OperatorIdentity {
    /// Creates an operator identity.
    #[must_use]
    pub fn new(subject: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            display_name: display_name.into(),
        }
    }

    /// Identity used for actions performed by background processes.
    #[must_use]
    pub fn system(component: &str) -> Self {
        Self::new(format!("system:{component}"), component)
    }

    /// Returns the stable subject recorded in audit entries.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.subject.as_str()
    }

    /// Returns the display name for the operator.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_str()
    }
}
