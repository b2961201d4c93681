use serde::{Deserialize, Serialize};

use crate::ProtectedResourceId;

/// Upstream resource that customers buy access to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedResource {
    /// Resource identifier.
    pub id: ProtectedResourceId,
    /// Display name.
    pub name: String,
    /// Identifier of the resource on the upstream platform.
    pub upstream_resource_id: String,
    /// Whether new purchases fan out to this resource.
    pub is_active: bool,
    /// Whether jobs for this resource may call an automated provider.
    pub auto_provisioning_enabled: bool,
}
