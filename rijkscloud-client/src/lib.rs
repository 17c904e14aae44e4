use async_trait::async_trait;

pub mod client;
pub mod error;
pub mod records;

#[cfg(feature = "mock")]
pub mod mock;

pub use client::RijkscloudClient;
pub use error::ApiError;

use records::{
    FlavorRecord, FloatingIpRecord, InstanceCreateRequest, InstanceRecord, NetworkRecord,
    SubnetRecord, VolumeCreateRequest, VolumeRecord,
};

/// Remote Rijkscloud REST API surface.
///
/// The HTTP implementation lives in [`client::RijkscloudClient`]; the
/// reconciling backend only talks to this trait so tests can run against
/// the in-memory mock client.
#[async_trait]
pub trait RijkscloudApi: Send + Sync {
    async fn list_flavors(&self) -> Result<Vec<FlavorRecord>, ApiError>;
    async fn get_flavor(&self, name: &str) -> Result<FlavorRecord, ApiError>;

    async fn list_volumes(&self) -> Result<Vec<VolumeRecord>, ApiError>;
    async fn get_volume(&self, name: &str) -> Result<VolumeRecord, ApiError>;
    async fn create_volume(
        &self,
        request: &VolumeCreateRequest,
    ) -> Result<serde_json::Value, ApiError>;
    async fn delete_volume(&self, name: &str) -> Result<(), ApiError>;

    /// Fully-detailed instance records (not listing stubs).
    async fn list_instances(&self) -> Result<Vec<InstanceRecord>, ApiError>;
    async fn get_instance(&self, id: &str) -> Result<InstanceRecord, ApiError>;
    async fn create_instance(
        &self,
        request: &InstanceCreateRequest,
    ) -> Result<serde_json::Value, ApiError>;
    async fn delete_instance(&self, id: &str) -> Result<(), ApiError>;

    /// Networks composed with their subnets, each subnet composed with its
    /// floating IP listing.
    async fn list_networks(&self) -> Result<Vec<NetworkRecord>, ApiError>;
    async fn get_network(&self, name: &str) -> Result<NetworkRecord, ApiError>;
    async fn get_subnet(&self, network: &str, subnet: &str) -> Result<SubnetRecord, ApiError>;
    async fn list_subnet_floating_ips(
        &self,
        network: &str,
        subnet: &str,
    ) -> Result<Vec<FloatingIpRecord>, ApiError>;

    async fn list_floating_ips(&self) -> Result<Vec<FloatingIpRecord>, ApiError>;
}
