//! Local inventory records mirrored from the Rijkscloud provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a locally tracked resource.
///
/// Settled states (Ok/Erred) mean no operation is in flight; only settled
/// records are eligible for bulk reconciliation. Transient records belong
/// to whichever executor put them there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceState {
    CreationScheduled,
    Creating,
    UpdateScheduled,
    Updating,
    DeletionScheduled,
    Deleting,
    Ok,
    Erred,
}

pub const SETTLED_STATES: &[ResourceState] = &[ResourceState::Ok, ResourceState::Erred];

impl ResourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::CreationScheduled => "creation_scheduled",
            ResourceState::Creating => "creating",
            ResourceState::UpdateScheduled => "update_scheduled",
            ResourceState::Updating => "updating",
            ResourceState::DeletionScheduled => "deletion_scheduled",
            ResourceState::Deleting => "deleting",
            ResourceState::Ok => "ok",
            ResourceState::Erred => "erred",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "creation_scheduled" => Some(ResourceState::CreationScheduled),
            "creating" => Some(ResourceState::Creating),
            "update_scheduled" => Some(ResourceState::UpdateScheduled),
            "updating" => Some(ResourceState::Updating),
            "deletion_scheduled" => Some(ResourceState::DeletionScheduled),
            "deleting" => Some(ResourceState::Deleting),
            "ok" => Some(ResourceState::Ok),
            "erred" => Some(ResourceState::Erred),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, ResourceState::Ok | ResourceState::Erred)
    }
}

/// Settings-scoped flavor property. Uniquely identified by
/// (settings, backend_id); backend_id is the provider-assigned name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Flavor {
    pub uuid: Uuid,
    pub settings: Uuid,
    pub backend_id: String,
    pub name: String,
    pub cores: i32,
    /// Memory size in MiB.
    pub ram: i32,
}

/// Upsert payload for the flavor full-replace diff.
#[derive(Clone, Debug, PartialEq)]
pub struct FlavorAttributes {
    pub backend_id: String,
    pub name: String,
    pub cores: i32,
    pub ram: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FloatingIp {
    pub uuid: Uuid,
    pub settings: Uuid,
    /// The address doubles as the stable remote identifier.
    pub backend_id: String,
    pub address: String,
    pub is_available: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FloatingIpAttributes {
    pub backend_id: String,
    pub address: String,
    pub is_available: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Network {
    pub uuid: Uuid,
    pub settings: Uuid,
    pub backend_id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subnet {
    pub uuid: Uuid,
    pub settings: Uuid,
    pub network_backend_id: String,
    pub backend_id: String,
    pub cidr: Option<String>,
    pub gateway_ip: Option<String>,
    pub allocation_pools: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubnetAttributes {
    pub backend_id: String,
    pub cidr: Option<String>,
    pub gateway_ip: Option<String>,
    pub allocation_pools: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NetworkAttributes {
    pub backend_id: String,
    pub name: String,
    pub subnets: Vec<SubnetAttributes>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub uuid: Uuid,
    pub settings: Uuid,
    pub project_link: Option<Uuid>,
    /// Remote identifier (the provider addresses volumes by name).
    pub backend_id: String,
    pub name: String,
    /// Size in MiB (converted from the provider's GB units).
    pub size: i64,
    pub metadata: serde_json::Value,
    /// Provider-reported status string, distinct from the lifecycle state.
    pub runtime_state: String,
    pub state: ResourceState,
    pub error_message: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub uuid: Uuid,
    pub settings: Uuid,
    pub project_link: Option<Uuid>,
    pub backend_id: String,
    pub name: String,
    pub runtime_state: String,
    pub state: ResourceState,
    pub error_message: Option<String>,
    /// Flavor fields denormalized at sync time. Kept as last-known values
    /// when the remote flavor disappears, so historical display survives.
    pub flavor_name: Option<String>,
    pub cores: i32,
    pub ram: i32,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_parse_roundtrip() {
        for state in [
            ResourceState::CreationScheduled,
            ResourceState::Creating,
            ResourceState::UpdateScheduled,
            ResourceState::Updating,
            ResourceState::DeletionScheduled,
            ResourceState::Deleting,
            ResourceState::Ok,
            ResourceState::Erred,
        ] {
            assert_eq!(ResourceState::parse(state.as_str()), Some(state));
        }
        assert_eq!(ResourceState::parse("unknown"), None);
    }

    #[test]
    fn settled_states() {
        assert!(ResourceState::Ok.is_settled());
        assert!(ResourceState::Erred.is_settled());
        assert!(!ResourceState::Creating.is_settled());
        assert!(!ResourceState::Deleting.is_settled());
    }
}
