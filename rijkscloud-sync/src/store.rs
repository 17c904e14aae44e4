//! Local inventory persistence.
//!
//! The backend only talks to the [`InventoryStore`] trait. `PgStore`
//! (see `pg_store`) is the production implementation; [`MemoryStore`]
//! backs tests and local runs without a database.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::{
    Flavor, FlavorAttributes, FloatingIp, FloatingIpAttributes, Instance, Network,
    NetworkAttributes, ResourceState, Subnet, Volume,
};

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn list_flavors(&self, settings: Uuid) -> Result<Vec<Flavor>>;
    /// Apply a full-replace diff atomically: upsert by (settings,
    /// backend_id), then delete the listed leftovers. The removal set is
    /// computed by the caller from a prior listing; one sync writer per
    /// settings scope is assumed.
    async fn apply_flavor_diff(
        &self,
        settings: Uuid,
        upserts: &[FlavorAttributes],
        removed: &[String],
    ) -> Result<()>;

    async fn list_floating_ips(&self, settings: Uuid) -> Result<Vec<FloatingIp>>;
    async fn apply_floating_ip_diff(
        &self,
        settings: Uuid,
        upserts: &[FloatingIpAttributes],
        removed: &[String],
    ) -> Result<()>;

    async fn list_networks(&self, settings: Uuid) -> Result<Vec<Network>>;
    async fn list_subnets(&self, settings: Uuid) -> Result<Vec<Subnet>>;
    async fn apply_network_diff(
        &self,
        settings: Uuid,
        upserts: &[NetworkAttributes],
        removed: &[String],
    ) -> Result<()>;

    async fn get_volume(&self, uuid: Uuid) -> Result<Option<Volume>>;
    /// `states = None` lists every volume in the scope regardless of state.
    async fn list_volumes(
        &self,
        settings: Uuid,
        states: Option<&[ResourceState]>,
    ) -> Result<Vec<Volume>>;
    async fn insert_volume(&self, volume: &Volume) -> Result<()>;
    /// Persists the record and bumps its `modified` timestamp.
    async fn update_volume(&self, volume: &mut Volume) -> Result<()>;
    async fn set_volume_state(
        &self,
        uuid: Uuid,
        state: ResourceState,
        error_message: Option<&str>,
    ) -> Result<bool>;
    async fn delete_volume(&self, uuid: Uuid) -> Result<bool>;

    async fn get_instance(&self, uuid: Uuid) -> Result<Option<Instance>>;
    async fn list_instances(
        &self,
        settings: Uuid,
        states: Option<&[ResourceState]>,
    ) -> Result<Vec<Instance>>;
    async fn insert_instance(&self, instance: &Instance) -> Result<()>;
    async fn update_instance(&self, instance: &mut Instance) -> Result<()>;
    async fn set_instance_state(
        &self,
        uuid: Uuid,
        state: ResourceState,
        error_message: Option<&str>,
    ) -> Result<bool>;
    async fn delete_instance(&self, uuid: Uuid) -> Result<bool>;
}

#[derive(Default)]
struct State {
    flavors: HashMap<(Uuid, String), Flavor>,
    floating_ips: HashMap<(Uuid, String), FloatingIp>,
    networks: HashMap<(Uuid, String), Network>,
    subnets: HashMap<(Uuid, String, String), Subnet>,
    volumes: HashMap<Uuid, Volume>,
    instances: HashMap<Uuid, Instance>,
}

/// Mutex-guarded in-memory store. Each `apply_*_diff` call runs under one
/// lock acquisition, matching the per-diff transaction of the Postgres
/// implementation.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn list_flavors(&self, settings: Uuid) -> Result<Vec<Flavor>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .flavors
            .values()
            .filter(|f| f.settings == settings)
            .cloned()
            .collect())
    }

    async fn apply_flavor_diff(
        &self,
        settings: Uuid,
        upserts: &[FlavorAttributes],
        removed: &[String],
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for attrs in upserts {
            let key = (settings, attrs.backend_id.clone());
            match state.flavors.get_mut(&key) {
                Some(flavor) => {
                    flavor.name = attrs.name.clone();
                    flavor.cores = attrs.cores;
                    flavor.ram = attrs.ram;
                }
                None => {
                    state.flavors.insert(
                        key,
                        Flavor {
                            uuid: Uuid::new_v4(),
                            settings,
                            backend_id: attrs.backend_id.clone(),
                            name: attrs.name.clone(),
                            cores: attrs.cores,
                            ram: attrs.ram,
                        },
                    );
                }
            }
        }
        for backend_id in removed {
            state.flavors.remove(&(settings, backend_id.clone()));
        }
        Ok(())
    }

    async fn list_floating_ips(&self, settings: Uuid) -> Result<Vec<FloatingIp>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .floating_ips
            .values()
            .filter(|ip| ip.settings == settings)
            .cloned()
            .collect())
    }

    async fn apply_floating_ip_diff(
        &self,
        settings: Uuid,
        upserts: &[FloatingIpAttributes],
        removed: &[String],
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for attrs in upserts {
            let key = (settings, attrs.backend_id.clone());
            match state.floating_ips.get_mut(&key) {
                Some(ip) => {
                    ip.address = attrs.address.clone();
                    ip.is_available = attrs.is_available;
                }
                None => {
                    state.floating_ips.insert(
                        key,
                        FloatingIp {
                            uuid: Uuid::new_v4(),
                            settings,
                            backend_id: attrs.backend_id.clone(),
                            address: attrs.address.clone(),
                            is_available: attrs.is_available,
                        },
                    );
                }
            }
        }
        for backend_id in removed {
            state.floating_ips.remove(&(settings, backend_id.clone()));
        }
        Ok(())
    }

    async fn list_networks(&self, settings: Uuid) -> Result<Vec<Network>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .networks
            .values()
            .filter(|n| n.settings == settings)
            .cloned()
            .collect())
    }

    async fn list_subnets(&self, settings: Uuid) -> Result<Vec<Subnet>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .subnets
            .values()
            .filter(|s| s.settings == settings)
            .cloned()
            .collect())
    }

    async fn apply_network_diff(
        &self,
        settings: Uuid,
        upserts: &[NetworkAttributes],
        removed: &[String],
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for attrs in upserts {
            let key = (settings, attrs.backend_id.clone());
            match state.networks.get_mut(&key) {
                Some(network) => network.name = attrs.name.clone(),
                None => {
                    state.networks.insert(
                        key,
                        Network {
                            uuid: Uuid::new_v4(),
                            settings,
                            backend_id: attrs.backend_id.clone(),
                            name: attrs.name.clone(),
                        },
                    );
                }
            }
            // Subnets follow their network: upsert the listed ones, drop
            // the rest of this network's subnets.
            let seen: Vec<String> = attrs
                .subnets
                .iter()
                .map(|s| s.backend_id.clone())
                .collect();
            state.subnets.retain(|(s, net, id), _| {
                *s != settings || *net != attrs.backend_id || seen.contains(id)
            });
            for subnet in &attrs.subnets {
                let key = (
                    settings,
                    attrs.backend_id.clone(),
                    subnet.backend_id.clone(),
                );
                match state.subnets.get_mut(&key) {
                    Some(existing) => {
                        existing.cidr = subnet.cidr.clone();
                        existing.gateway_ip = subnet.gateway_ip.clone();
                        existing.allocation_pools = subnet.allocation_pools.clone();
                    }
                    None => {
                        state.subnets.insert(
                            key,
                            Subnet {
                                uuid: Uuid::new_v4(),
                                settings,
                                network_backend_id: attrs.backend_id.clone(),
                                backend_id: subnet.backend_id.clone(),
                                cidr: subnet.cidr.clone(),
                                gateway_ip: subnet.gateway_ip.clone(),
                                allocation_pools: subnet.allocation_pools.clone(),
                            },
                        );
                    }
                }
            }
        }
        for backend_id in removed {
            state.networks.remove(&(settings, backend_id.clone()));
            state
                .subnets
                .retain(|(s, net, _), _| *s != settings || net != backend_id);
        }
        Ok(())
    }

    async fn get_volume(&self, uuid: Uuid) -> Result<Option<Volume>> {
        Ok(self.state.lock().unwrap().volumes.get(&uuid).cloned())
    }

    async fn list_volumes(
        &self,
        settings: Uuid,
        states: Option<&[ResourceState]>,
    ) -> Result<Vec<Volume>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .volumes
            .values()
            .filter(|v| v.settings == settings)
            .filter(|v| states.map_or(true, |states| states.contains(&v.state)))
            .cloned()
            .collect())
    }

    async fn insert_volume(&self, volume: &Volume) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .volumes
            .insert(volume.uuid, volume.clone());
        Ok(())
    }

    async fn update_volume(&self, volume: &mut Volume) -> Result<()> {
        volume.modified = Utc::now();
        self.state
            .lock()
            .unwrap()
            .volumes
            .insert(volume.uuid, volume.clone());
        Ok(())
    }

    async fn set_volume_state(
        &self,
        uuid: Uuid,
        state: ResourceState,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let mut guard = self.state.lock().unwrap();
        match guard.volumes.get_mut(&uuid) {
            Some(volume) => {
                volume.state = state;
                volume.error_message = error_message.map(str::to_string);
                volume.modified = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_volume(&self, uuid: Uuid) -> Result<bool> {
        Ok(self.state.lock().unwrap().volumes.remove(&uuid).is_some())
    }

    async fn get_instance(&self, uuid: Uuid) -> Result<Option<Instance>> {
        Ok(self.state.lock().unwrap().instances.get(&uuid).cloned())
    }

    async fn list_instances(
        &self,
        settings: Uuid,
        states: Option<&[ResourceState]>,
    ) -> Result<Vec<Instance>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .instances
            .values()
            .filter(|i| i.settings == settings)
            .filter(|i| states.map_or(true, |states| states.contains(&i.state)))
            .cloned()
            .collect())
    }

    async fn insert_instance(&self, instance: &Instance) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .instances
            .insert(instance.uuid, instance.clone());
        Ok(())
    }

    async fn update_instance(&self, instance: &mut Instance) -> Result<()> {
        instance.modified = Utc::now();
        self.state
            .lock()
            .unwrap()
            .instances
            .insert(instance.uuid, instance.clone());
        Ok(())
    }

    async fn set_instance_state(
        &self,
        uuid: Uuid,
        state: ResourceState,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let mut guard = self.state.lock().unwrap();
        match guard.instances.get_mut(&uuid) {
            Some(instance) => {
                instance.state = state;
                instance.error_message = error_message.map(str::to_string);
                instance.modified = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_instance(&self, uuid: Uuid) -> Result<bool> {
        Ok(self.state.lock().unwrap().instances.remove(&uuid).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SubnetAttributes, SETTLED_STATES};
    use chrono::Utc;
    use serde_json::json;

    fn volume(settings: Uuid, backend_id: &str, state: ResourceState) -> Volume {
        let now = Utc::now();
        Volume {
            uuid: Uuid::new_v4(),
            settings,
            project_link: None,
            backend_id: backend_id.to_string(),
            name: backend_id.to_string(),
            size: 1024,
            metadata: json!({}),
            runtime_state: "available".to_string(),
            state,
            error_message: None,
            created: now,
            modified: now,
        }
    }

    #[tokio::test]
    async fn flavor_diff_upserts_and_removes() {
        let store = MemoryStore::new();
        let settings = Uuid::new_v4();
        store
            .apply_flavor_diff(
                settings,
                &[FlavorAttributes {
                    backend_id: "stale".to_string(),
                    name: "stale".to_string(),
                    cores: 1,
                    ram: 1024,
                }],
                &[],
            )
            .await
            .unwrap();

        store
            .apply_flavor_diff(
                settings,
                &[FlavorAttributes {
                    backend_id: "general.8gb".to_string(),
                    name: "general.8gb".to_string(),
                    cores: 4,
                    ram: 8192,
                }],
                &["stale".to_string()],
            )
            .await
            .unwrap();

        let flavors = store.list_flavors(settings).await.unwrap();
        assert_eq!(flavors.len(), 1);
        assert_eq!(flavors[0].backend_id, "general.8gb");
    }

    #[tokio::test]
    async fn list_volumes_filters_by_state() {
        let store = MemoryStore::new();
        let settings = Uuid::new_v4();
        store
            .insert_volume(&volume(settings, "a", ResourceState::Ok))
            .await
            .unwrap();
        store
            .insert_volume(&volume(settings, "b", ResourceState::Creating))
            .await
            .unwrap();
        store
            .insert_volume(&volume(settings, "c", ResourceState::Erred))
            .await
            .unwrap();

        let settled = store
            .list_volumes(settings, Some(SETTLED_STATES))
            .await
            .unwrap();
        assert_eq!(settled.len(), 2);

        let all = store.list_volumes(settings, None).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn update_volume_bumps_modified() {
        let store = MemoryStore::new();
        let settings = Uuid::new_v4();
        let mut v = volume(settings, "a", ResourceState::Ok);
        let before = v.modified;
        store.insert_volume(&v).await.unwrap();
        v.size = 2048;
        store.update_volume(&mut v).await.unwrap();
        assert!(v.modified > before);
        let stored = store.get_volume(v.uuid).await.unwrap().unwrap();
        assert_eq!(stored.size, 2048);
    }

    #[tokio::test]
    async fn network_diff_replaces_subnets() {
        let store = MemoryStore::new();
        let settings = Uuid::new_v4();
        let net = |subnets: Vec<&str>| NetworkAttributes {
            backend_id: "vlan".to_string(),
            name: "vlan".to_string(),
            subnets: subnets
                .into_iter()
                .map(|id| SubnetAttributes {
                    backend_id: id.to_string(),
                    cidr: Some("10.0.0.0/24".to_string()),
                    gateway_ip: None,
                    allocation_pools: json!([]),
                })
                .collect(),
        };
        store
            .apply_network_diff(settings, &[net(vec!["sub-a", "sub-b"])], &[])
            .await
            .unwrap();
        store
            .apply_network_diff(settings, &[net(vec!["sub-b"])], &[])
            .await
            .unwrap();

        let subnets = store.list_subnets(settings).await.unwrap();
        assert_eq!(subnets.len(), 1);
        assert_eq!(subnets[0].backend_id, "sub-b");
    }
}
