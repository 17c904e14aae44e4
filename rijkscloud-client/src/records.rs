//! Raw record shapes returned by the Rijkscloud REST API.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct FlavorRecord {
    pub name: String,
    pub vcpus: i32,
    /// Memory size in MiB (already MiB on the wire, no conversion).
    pub ram: i32,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct VolumeRecord {
    pub name: String,
    /// Size in GB (provider units).
    pub size: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub status: String,
    #[serde(default)]
    pub attachments: Vec<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct InstanceRecord {
    pub id: String,
    pub name: String,
    pub status: String,
    /// Flavor name; absent when the flavor was deleted upstream.
    #[serde(default)]
    pub flavor: Option<String>,
    #[serde(default)]
    pub fault: Option<InstanceFault>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct InstanceFault {
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct FloatingIpRecord {
    pub float_ip: String,
    pub available: bool,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct SubnetRecord {
    pub name: String,
    #[serde(default)]
    pub cidr: Option<String>,
    #[serde(default)]
    pub gateway_ip: Option<String>,
    #[serde(default)]
    pub allocation_pools: Vec<serde_json::Value>,
    #[serde(default)]
    pub floatingips: Vec<FloatingIpRecord>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct NetworkRecord {
    pub name: String,
    #[serde(default)]
    pub subnets: Vec<SubnetRecord>,
}

/// Listing stub: collection endpoints only return names; detail must be
/// fetched per entry.
#[derive(Clone, Debug, Deserialize)]
pub struct NameStub {
    pub name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct VolumeCreateRequest {
    pub name: String,
    /// Size in GB (provider units).
    pub size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct InstanceCreateRequest {
    pub name: String,
    pub flavor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userdata: Option<String>,
}
