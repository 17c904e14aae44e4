//! In-memory mock of the Rijkscloud API for tests.
//!
//! Fixtures are scripted per resource kind; every trait call is recorded so
//! tests can assert on call order or absence of remote calls.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::records::{
    FlavorRecord, FloatingIpRecord, InstanceCreateRequest, InstanceRecord, NetworkRecord,
    SubnetRecord, VolumeCreateRequest, VolumeRecord,
};
use crate::RijkscloudApi;

#[derive(Default)]
struct Inner {
    flavors: Vec<FlavorRecord>,
    volumes: Vec<VolumeRecord>,
    instances: Vec<InstanceRecord>,
    networks: Vec<NetworkRecord>,
    floating_ips: Vec<FloatingIpRecord>,
    calls: Vec<String>,
    fail_all: bool,
    fail_volumes: bool,
}

#[derive(Default)]
pub struct MockClient {
    inner: Mutex<Inner>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_flavors(&self, flavors: Vec<FlavorRecord>) {
        self.inner.lock().unwrap().flavors = flavors;
    }

    pub fn set_volumes(&self, volumes: Vec<VolumeRecord>) {
        self.inner.lock().unwrap().volumes = volumes;
    }

    pub fn set_instances(&self, instances: Vec<InstanceRecord>) {
        self.inner.lock().unwrap().instances = instances;
    }

    pub fn set_networks(&self, networks: Vec<NetworkRecord>) {
        self.inner.lock().unwrap().networks = networks;
    }

    pub fn set_floating_ips(&self, floating_ips: Vec<FloatingIpRecord>) {
        self.inner.lock().unwrap().floating_ips = floating_ips;
    }

    /// Every call fails with a synthetic 503.
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().unwrap().fail_all = failing;
    }

    /// Only volume calls fail; other resource kinds keep working.
    pub fn set_volumes_failing(&self, failing: bool) {
        self.inner.lock().unwrap().fail_volumes = failing;
    }

    /// Overwrite the runtime status of a scripted volume.
    pub fn set_volume_status(&self, name: &str, status: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(volume) = inner.volumes.iter_mut().find(|v| v.name == name) {
            volume.status = status.to_string();
        }
    }

    /// Overwrite the runtime status of a scripted instance.
    pub fn set_instance_status(&self, id: &str, status: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(instance) = inner.instances.iter_mut().find(|i| i.id == id) {
            instance.status = status.to_string();
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    fn record(&self, call: &str, volumes: bool) -> Result<(), ApiError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(call.to_string());
        if inner.fail_all || (volumes && inner.fail_volumes) {
            return Err(ApiError::Status {
                method: "GET",
                endpoint: call.to_string(),
                status: 503,
                body: "mock failure".to_string(),
            });
        }
        Ok(())
    }

    fn not_found(endpoint: &str) -> ApiError {
        ApiError::Status {
            method: "GET",
            endpoint: endpoint.to_string(),
            status: 404,
            body: "not found".to_string(),
        }
    }
}

#[async_trait]
impl RijkscloudApi for MockClient {
    async fn list_flavors(&self) -> Result<Vec<FlavorRecord>, ApiError> {
        self.record("list_flavors", false)?;
        Ok(self.inner.lock().unwrap().flavors.clone())
    }

    async fn get_flavor(&self, name: &str) -> Result<FlavorRecord, ApiError> {
        self.record("get_flavor", false)?;
        self.inner
            .lock()
            .unwrap()
            .flavors
            .iter()
            .find(|f| f.name == name)
            .cloned()
            .ok_or_else(|| Self::not_found(&format!("flavors/{}", name)))
    }

    async fn list_volumes(&self) -> Result<Vec<VolumeRecord>, ApiError> {
        self.record("list_volumes", true)?;
        Ok(self.inner.lock().unwrap().volumes.clone())
    }

    async fn get_volume(&self, name: &str) -> Result<VolumeRecord, ApiError> {
        self.record("get_volume", true)?;
        self.inner
            .lock()
            .unwrap()
            .volumes
            .iter()
            .find(|v| v.name == name)
            .cloned()
            .ok_or_else(|| Self::not_found(&format!("volumes/{}", name)))
    }

    async fn create_volume(&self, request: &VolumeCreateRequest) -> Result<Value, ApiError> {
        self.record("create_volume", true)?;
        let mut inner = self.inner.lock().unwrap();
        inner.volumes.push(VolumeRecord {
            name: request.name.clone(),
            size: request.size,
            description: request.description.clone(),
            metadata: json!({}),
            status: "creating".to_string(),
            attachments: vec![],
        });
        Ok(json!({"volume": {"name": request.name}}))
    }

    async fn delete_volume(&self, name: &str) -> Result<(), ApiError> {
        self.record("delete_volume", true)?;
        self.inner
            .lock()
            .unwrap()
            .volumes
            .retain(|v| v.name != name);
        Ok(())
    }

    async fn list_instances(&self) -> Result<Vec<InstanceRecord>, ApiError> {
        self.record("list_instances", false)?;
        Ok(self.inner.lock().unwrap().instances.clone())
    }

    async fn get_instance(&self, id: &str) -> Result<InstanceRecord, ApiError> {
        self.record("get_instance", false)?;
        self.inner
            .lock()
            .unwrap()
            .instances
            .iter()
            .find(|i| i.id == id || i.name == id)
            .cloned()
            .ok_or_else(|| Self::not_found(&format!("instances/{}", id)))
    }

    async fn create_instance(&self, request: &InstanceCreateRequest) -> Result<Value, ApiError> {
        self.record("create_instance", false)?;
        let id = format!("mock-{}", request.name);
        let mut inner = self.inner.lock().unwrap();
        inner.instances.push(InstanceRecord {
            id: id.clone(),
            name: request.name.clone(),
            status: "building".to_string(),
            flavor: Some(request.flavor.clone()),
            fault: None,
        });
        Ok(json!({"instance": {"id": id, "name": request.name}}))
    }

    async fn delete_instance(&self, id: &str) -> Result<(), ApiError> {
        self.record("delete_instance", false)?;
        self.inner
            .lock()
            .unwrap()
            .instances
            .retain(|i| i.id != id && i.name != id);
        Ok(())
    }

    async fn list_networks(&self) -> Result<Vec<NetworkRecord>, ApiError> {
        self.record("list_networks", false)?;
        Ok(self.inner.lock().unwrap().networks.clone())
    }

    async fn get_network(&self, name: &str) -> Result<NetworkRecord, ApiError> {
        self.record("get_network", false)?;
        self.inner
            .lock()
            .unwrap()
            .networks
            .iter()
            .find(|n| n.name == name)
            .cloned()
            .ok_or_else(|| Self::not_found(&format!("networks/{}", name)))
    }

    async fn get_subnet(&self, network: &str, subnet: &str) -> Result<SubnetRecord, ApiError> {
        self.record("get_subnet", false)?;
        self.inner
            .lock()
            .unwrap()
            .networks
            .iter()
            .find(|n| n.name == network)
            .and_then(|n| n.subnets.iter().find(|s| s.name == subnet))
            .cloned()
            .ok_or_else(|| Self::not_found(&format!("networks/{}/subnets/{}", network, subnet)))
    }

    async fn list_subnet_floating_ips(
        &self,
        network: &str,
        subnet: &str,
    ) -> Result<Vec<FloatingIpRecord>, ApiError> {
        self.record("list_subnet_floating_ips", false)?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .networks
            .iter()
            .find(|n| n.name == network)
            .and_then(|n| n.subnets.iter().find(|s| s.name == subnet))
            .map(|s| s.floatingips.clone())
            .unwrap_or_default())
    }

    async fn list_floating_ips(&self) -> Result<Vec<FloatingIpRecord>, ApiError> {
        self.record("list_floating_ips", false)?;
        Ok(self.inner.lock().unwrap().floating_ips.clone())
    }
}
