//! Reconciling backend: pulls remote Rijkscloud state and converges the
//! local inventory to match.
//!
//! Two reconciliation policies coexist on purpose:
//! - settings-scoped properties (flavors, floating IPs, networks) are a
//!   full-replace diff: records absent upstream are deleted;
//! - volumes and instances are never auto-deleted: records absent
//!   upstream are marked Erred so user-visible history survives.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use rijkscloud_client::records::{InstanceCreateRequest, VolumeCreateRequest};
use rijkscloud_client::{ApiError, RijkscloudApi, RijkscloudClient};

use crate::models::{Flavor, Instance, ResourceState, Volume, SETTLED_STATES};
use crate::settings::ProviderSettings;
use crate::store::InventoryStore;
use crate::translate::{
    self, apply_instance_fields, apply_volume_fields, instance_field_is_flavor, InstanceField,
    VolumeField, INSTANCE_BACKEND_FIELDS, VOLUME_BACKEND_FIELDS,
};

pub const NOT_FOUND_MESSAGE: &str = "does not exist at backend";

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("rijkscloud api: {0}")]
    Api(#[from] ApiError),

    #[error("store: {0}")]
    Store(#[from] anyhow::Error),

    #[error("local record {0} not found")]
    NotFound(Uuid),

    #[error("{0}")]
    Validation(String),
}

/// Result of an optimistic single-resource pull. `Discarded` means a
/// concurrent local write raced ahead of the pull and won.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PullOutcome {
    Applied,
    Discarded,
}

pub struct RijkscloudBackend {
    settings: ProviderSettings,
    client: Arc<dyn RijkscloudApi>,
    store: Arc<dyn InventoryStore>,
}

impl RijkscloudBackend {
    /// Build a backend from a settings scope. No process-wide registry:
    /// the client is constructed right here from the two credentials.
    pub fn new(settings: ProviderSettings, store: Arc<dyn InventoryStore>) -> Self {
        let client = Arc::new(RijkscloudClient::new(&settings.username, &settings.token));
        Self::with_client(settings, client, store)
    }

    pub fn with_client(
        settings: ProviderSettings,
        client: Arc<dyn RijkscloudApi>,
        store: Arc<dyn InventoryStore>,
    ) -> Self {
        Self {
            settings,
            client,
            store,
        }
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    fn scope(&self) -> Uuid {
        self.settings.uuid
    }

    /// Cheap connectivity probe.
    pub async fn ping(&self) -> bool {
        self.client.list_flavors().await.is_ok()
    }

    /// Full reconciliation pass. Each step is its own failure domain: an
    /// error stops the sequence but completed steps stay committed.
    pub async fn sync(&self) -> Result<(), BackendError> {
        self.pull_flavors().await?;
        self.pull_floating_ips().await?;
        self.pull_networks().await?;
        self.pull_volumes().await?;
        self.pull_instances().await?;
        Ok(())
    }

    pub async fn pull_flavors(&self) -> Result<(), BackendError> {
        let records = self.client.list_flavors().await?;

        let mut current: HashSet<String> = self
            .store
            .list_flavors(self.scope())
            .await?
            .into_iter()
            .map(|f| f.backend_id)
            .collect();

        let upserts: Vec<_> = records
            .iter()
            .map(|record| {
                current.remove(&record.name);
                translate::flavor_attributes(record)
            })
            .collect();
        // Whatever is left was not present upstream.
        let removed: Vec<String> = current.into_iter().collect();

        self.store
            .apply_flavor_diff(self.scope(), &upserts, &removed)
            .await?;
        tracing::info!(
            "[sync] flavors: {} upserted, {} removed",
            upserts.len(),
            removed.len()
        );
        Ok(())
    }

    pub async fn pull_floating_ips(&self) -> Result<(), BackendError> {
        let records = self.client.list_floating_ips().await?;

        let mut current: HashSet<String> = self
            .store
            .list_floating_ips(self.scope())
            .await?
            .into_iter()
            .map(|ip| ip.backend_id)
            .collect();

        let upserts: Vec<_> = records
            .iter()
            .map(|record| {
                current.remove(&record.float_ip);
                translate::floating_ip_attributes(record)
            })
            .collect();
        let removed: Vec<String> = current.into_iter().collect();

        self.store
            .apply_floating_ip_diff(self.scope(), &upserts, &removed)
            .await?;
        tracing::info!(
            "[sync] floating ips: {} upserted, {} removed",
            upserts.len(),
            removed.len()
        );
        Ok(())
    }

    pub async fn pull_networks(&self) -> Result<(), BackendError> {
        let records = self.client.list_networks().await?;

        let mut current: HashSet<String> = self
            .store
            .list_networks(self.scope())
            .await?
            .into_iter()
            .map(|n| n.backend_id)
            .collect();

        let upserts: Vec<_> = records
            .iter()
            .map(|record| {
                current.remove(&record.name);
                translate::network_attributes(record)
            })
            .collect();
        let removed: Vec<String> = current.into_iter().collect();

        self.store
            .apply_network_diff(self.scope(), &upserts, &removed)
            .await?;
        tracing::info!(
            "[sync] networks: {} upserted, {} removed",
            upserts.len(),
            removed.len()
        );
        Ok(())
    }

    /// Remote volume inventory, translated.
    pub async fn get_volumes(&self) -> Result<Vec<Volume>, BackendError> {
        let records = self.client.list_volumes().await?;
        Ok(records
            .iter()
            .map(|record| translate::volume_from_record(self.scope(), record))
            .collect())
    }

    /// Bulk volume reconciliation. Only settled records are touched;
    /// records missing upstream are marked Erred, never deleted.
    pub async fn pull_volumes(&self) -> Result<(), BackendError> {
        let backend_volumes = self.get_volumes().await?;
        let backend_map: HashMap<&str, &Volume> = backend_volumes
            .iter()
            .map(|v| (v.backend_id.as_str(), v))
            .collect();

        let volumes = self
            .store
            .list_volumes(self.scope(), Some(SETTLED_STATES))
            .await?;
        for mut volume in volumes {
            match backend_map.get(volume.backend_id.as_str()) {
                None => {
                    tracing::warn!(
                        "[sync] volume {} ({}) missing upstream, marking erred",
                        volume.backend_id,
                        volume.uuid
                    );
                    self.store
                        .set_volume_state(volume.uuid, ResourceState::Erred, Some(NOT_FOUND_MESSAGE))
                        .await?;
                }
                Some(imported) => {
                    if apply_volume_fields(&mut volume, imported, VOLUME_BACKEND_FIELDS) {
                        self.store.update_volume(&mut volume).await?;
                    }
                    self.store
                        .set_volume_state(volume.uuid, ResourceState::Ok, None)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Remote instance inventory, translated, with flavors matched by name.
    pub async fn get_instances(&self) -> Result<Vec<Instance>, BackendError> {
        let records = self.client.list_instances().await?;
        let flavors = self.client.list_flavors().await?;
        let flavor_map: HashMap<&str, _> = flavors.iter().map(|f| (f.name.as_str(), f)).collect();

        Ok(records
            .iter()
            .map(|record| {
                let flavor = record
                    .flavor
                    .as_deref()
                    .and_then(|name| flavor_map.get(name).copied());
                translate::instance_from_record(self.scope(), record, flavor)
            })
            .collect())
    }

    pub async fn pull_instances(&self) -> Result<(), BackendError> {
        let backend_instances = self.get_instances().await?;
        let backend_map: HashMap<&str, &Instance> = backend_instances
            .iter()
            .map(|i| (i.backend_id.as_str(), i))
            .collect();

        let instances = self
            .store
            .list_instances(self.scope(), Some(SETTLED_STATES))
            .await?;
        for mut instance in instances {
            match backend_map.get(instance.backend_id.as_str()) {
                None => {
                    tracing::warn!(
                        "[sync] instance {} ({}) missing upstream, marking erred",
                        instance.backend_id,
                        instance.uuid
                    );
                    self.store
                        .set_instance_state(
                            instance.uuid,
                            ResourceState::Erred,
                            Some(NOT_FOUND_MESSAGE),
                        )
                        .await?;
                }
                Some(imported) => {
                    let fields = instance_update_fields(imported, None);
                    if apply_instance_fields(&mut instance, imported, &fields) {
                        self.store.update_instance(&mut instance).await?;
                    }
                    self.store
                        .set_instance_state(instance.uuid, ResourceState::Ok, None)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Remote volumes not yet tracked locally (any lifecycle state counts
    /// as tracked).
    pub async fn get_volumes_for_import(&self) -> Result<Vec<Volume>, BackendError> {
        let tracked: HashSet<String> = self
            .store
            .list_volumes(self.scope(), None)
            .await?
            .into_iter()
            .map(|v| v.backend_id)
            .collect();
        let volumes = self.get_volumes().await?;
        Ok(volumes
            .into_iter()
            .filter(|v| !tracked.contains(&v.backend_id))
            .collect())
    }

    pub async fn get_instances_for_import(&self) -> Result<Vec<Instance>, BackendError> {
        let tracked: HashSet<String> = self
            .store
            .list_instances(self.scope(), None)
            .await?
            .into_iter()
            .map(|i| i.backend_id)
            .collect();
        let instances = self.get_instances().await?;
        Ok(instances
            .into_iter()
            .filter(|i| !tracked.contains(&i.backend_id))
            .collect())
    }

    pub async fn import_volume(
        &self,
        backend_id: &str,
        project_link: Option<Uuid>,
        save: bool,
    ) -> Result<Volume, BackendError> {
        let record = self.client.get_volume(backend_id).await?;
        let mut volume = translate::volume_from_record(self.scope(), &record);
        volume.project_link = project_link;
        if save {
            self.store.insert_volume(&volume).await?;
        }
        Ok(volume)
    }

    pub async fn import_instance(
        &self,
        backend_id: &str,
        project_link: Option<Uuid>,
        save: bool,
    ) -> Result<Instance, BackendError> {
        let record = self.client.get_instance(backend_id).await?;
        let flavor = match record.flavor.as_deref() {
            Some(name) => Some(self.client.get_flavor(name).await?),
            None => None,
        };
        let mut instance = translate::instance_from_record(self.scope(), &record, flavor.as_ref());
        instance.project_link = project_link;
        if save {
            self.store.insert_instance(&instance).await?;
        }
        Ok(instance)
    }

    /// Optimistic single-volume pull. The fetch happens without holding
    /// anything; the translated fields are only applied if no concurrent
    /// write touched the record after the capture timestamp.
    pub async fn pull_volume(
        &self,
        uuid: Uuid,
        update_fields: Option<&[VolumeField]>,
    ) -> Result<PullOutcome, BackendError> {
        let volume = self
            .store
            .get_volume(uuid)
            .await?
            .ok_or(BackendError::NotFound(uuid))?;

        let import_time = Utc::now();
        let imported = self.import_volume(&volume.backend_id, None, false).await?;

        let mut fresh = self
            .store
            .get_volume(uuid)
            .await?
            .ok_or(BackendError::NotFound(uuid))?;
        if fresh.modified >= import_time {
            // Newer local write wins; the slow pull is thrown away.
            return Ok(PullOutcome::Discarded);
        }

        let fields = update_fields.unwrap_or(VOLUME_BACKEND_FIELDS);
        if apply_volume_fields(&mut fresh, &imported, fields) {
            self.store.update_volume(&mut fresh).await?;
        }
        Ok(PullOutcome::Applied)
    }

    pub async fn pull_instance(
        &self,
        uuid: Uuid,
        update_fields: Option<&[InstanceField]>,
    ) -> Result<PullOutcome, BackendError> {
        let instance = self
            .store
            .get_instance(uuid)
            .await?
            .ok_or(BackendError::NotFound(uuid))?;

        let import_time = Utc::now();
        let imported = self
            .import_instance(&instance.backend_id, None, false)
            .await?;

        let mut fresh = self
            .store
            .get_instance(uuid)
            .await?
            .ok_or(BackendError::NotFound(uuid))?;
        if fresh.modified >= import_time {
            return Ok(PullOutcome::Discarded);
        }

        let fields = instance_update_fields(&imported, update_fields);
        if apply_instance_fields(&mut fresh, &imported, &fields) {
            self.store.update_instance(&mut fresh).await?;
        }
        Ok(PullOutcome::Applied)
    }

    /// Refresh only the runtime state and report it; used by the poll
    /// executors after a create call.
    pub async fn pull_volume_runtime_state(&self, uuid: Uuid) -> Result<String, BackendError> {
        let mut volume = self
            .store
            .get_volume(uuid)
            .await?
            .ok_or(BackendError::NotFound(uuid))?;
        let record = self.client.get_volume(&volume.backend_id).await?;
        if record.status != volume.runtime_state {
            volume.runtime_state = record.status.clone();
            self.store.update_volume(&mut volume).await?;
        }
        Ok(record.status)
    }

    pub async fn pull_instance_runtime_state(&self, uuid: Uuid) -> Result<String, BackendError> {
        let mut instance = self
            .store
            .get_instance(uuid)
            .await?
            .ok_or(BackendError::NotFound(uuid))?;
        let record = self.client.get_instance(&instance.backend_id).await?;
        if record.status != instance.runtime_state {
            instance.runtime_state = record.status.clone();
            self.store.update_instance(&mut instance).await?;
        }
        Ok(record.status)
    }

    /// Reject a flavor from a different settings scope before any remote
    /// call is made.
    pub fn validate_instance_flavor(
        &self,
        instance: &Instance,
        flavor: &Flavor,
    ) -> Result<(), BackendError> {
        if flavor.settings != instance.settings {
            return Err(BackendError::Validation(
                "flavor must belong to the same provider settings as the instance".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn create_volume(&self, volume: &mut Volume) -> Result<(), BackendError> {
        // The provider only accepts whole GB; dividing a partial size
        // would silently shrink the volume.
        if volume.size % 1024 != 0 {
            return Err(BackendError::Validation(format!(
                "volume size {} MiB is not a whole number of GB",
                volume.size
            )));
        }
        let request = VolumeCreateRequest {
            name: volume.name.clone(),
            // Local bookkeeping is MiB, the provider wants GB.
            size: volume.size / 1024,
            description: None,
        };
        self.client.create_volume(&request).await?;
        // The provider addresses volumes by name.
        volume.backend_id = volume.name.clone();
        self.store.update_volume(volume).await?;
        Ok(())
    }

    pub async fn create_instance(&self, instance: &mut Instance) -> Result<(), BackendError> {
        let flavor = instance.flavor_name.clone().ok_or_else(|| {
            BackendError::Validation("instance has no flavor assigned".to_string())
        })?;
        let request = InstanceCreateRequest {
            name: instance.name.clone(),
            flavor,
            userdata: None,
        };
        let response = self.client.create_instance(&request).await?;
        instance.backend_id = response
            .get("instance")
            .and_then(|i| i.get("id"))
            .and_then(|id| id.as_str())
            .unwrap_or(&instance.name)
            .to_string();
        self.store.update_instance(instance).await?;
        Ok(())
    }

    pub async fn delete_volume(&self, volume: &Volume) -> Result<(), BackendError> {
        self.client.delete_volume(&volume.backend_id).await?;
        Ok(())
    }

    pub async fn delete_instance(&self, instance: &Instance) -> Result<(), BackendError> {
        self.client.delete_instance(&instance.backend_id).await?;
        Ok(())
    }
}

/// Backend-owned fields to overwrite on an instance. Flavor-derived
/// fields are dropped from the set when the remote stopped reporting a
/// flavor, so last-known values are retained.
fn instance_update_fields(
    imported: &Instance,
    requested: Option<&[InstanceField]>,
) -> Vec<InstanceField> {
    let fields = requested.unwrap_or(INSTANCE_BACKEND_FIELDS);
    if imported.flavor_name.is_none() {
        fields
            .iter()
            .copied()
            .filter(|field| !instance_field_is_flavor(*field))
            .collect()
    } else {
        fields.to_vec()
    }
}
