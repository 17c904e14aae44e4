//! Thin orchestration wrappers invoked by the external task queue.
//!
//! Create operations are a two-step sequence: the create call itself,
//! then (after the queue's fixed countdown) repeated runtime-state polls
//! until a recognized terminal state. All delay, retry and rescheduling
//! mechanics live in the queue, not here.

use uuid::Uuid;

use crate::backend::{BackendError, PullOutcome, RijkscloudBackend};
use crate::models::{Flavor, ResourceState};
use crate::store::InventoryStore;

/// Countdown the queue should wait before the first runtime-state poll.
pub const CREATE_POLL_COUNTDOWN_SECS: u64 = 30;

pub const RUNTIME_STATE_AVAILABLE: &str = "available";
pub const RUNTIME_STATE_ERROR: &str = "error";

/// One poll tick. `Pending` hands control back to the queue for
/// rescheduling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    Pending(String),
    Succeeded,
    Erred(String),
}

pub async fn execute_volume_create(
    backend: &RijkscloudBackend,
    store: &dyn InventoryStore,
    uuid: Uuid,
) -> Result<(), BackendError> {
    let mut volume = store
        .get_volume(uuid)
        .await?
        .ok_or(BackendError::NotFound(uuid))?;
    store
        .set_volume_state(uuid, ResourceState::Creating, None)
        .await?;

    if let Err(e) = backend.create_volume(&mut volume).await {
        store
            .set_volume_state(uuid, ResourceState::Erred, Some(&e.to_string()))
            .await?;
        return Err(e);
    }
    tracing::info!("[executor] volume {} create submitted", uuid);
    Ok(())
}

pub async fn poll_volume_runtime_state(
    backend: &RijkscloudBackend,
    store: &dyn InventoryStore,
    uuid: Uuid,
) -> Result<PollOutcome, BackendError> {
    let state = backend.pull_volume_runtime_state(uuid).await?;
    match state.as_str() {
        RUNTIME_STATE_AVAILABLE => {
            store
                .set_volume_state(uuid, ResourceState::Ok, None)
                .await?;
            Ok(PollOutcome::Succeeded)
        }
        RUNTIME_STATE_ERROR => {
            let message = format!("volume entered runtime state '{}'", state);
            store
                .set_volume_state(uuid, ResourceState::Erred, Some(&message))
                .await?;
            Ok(PollOutcome::Erred(message))
        }
        _ => Ok(PollOutcome::Pending(state)),
    }
}

pub async fn execute_volume_pull(
    backend: &RijkscloudBackend,
    store: &dyn InventoryStore,
    uuid: Uuid,
) -> Result<PullOutcome, BackendError> {
    store
        .set_volume_state(uuid, ResourceState::Updating, None)
        .await?;
    match backend.pull_volume(uuid, None).await {
        Ok(outcome) => {
            store
                .set_volume_state(uuid, ResourceState::Ok, None)
                .await?;
            Ok(outcome)
        }
        Err(e) => {
            store
                .set_volume_state(uuid, ResourceState::Erred, Some(&e.to_string()))
                .await?;
            Err(e)
        }
    }
}

pub async fn execute_volume_delete(
    backend: &RijkscloudBackend,
    store: &dyn InventoryStore,
    uuid: Uuid,
) -> Result<(), BackendError> {
    let volume = store
        .get_volume(uuid)
        .await?
        .ok_or(BackendError::NotFound(uuid))?;
    store
        .set_volume_state(uuid, ResourceState::Deleting, None)
        .await?;

    if let Err(e) = backend.delete_volume(&volume).await {
        store
            .set_volume_state(uuid, ResourceState::Erred, Some(&e.to_string()))
            .await?;
        return Err(e);
    }
    store.delete_volume(uuid).await?;
    Ok(())
}

/// Instance creation validates the flavor scope before any remote call.
/// Flavor fields are denormalized onto the instance at this point.
pub async fn execute_instance_create(
    backend: &RijkscloudBackend,
    store: &dyn InventoryStore,
    uuid: Uuid,
    flavor: &Flavor,
) -> Result<(), BackendError> {
    let mut instance = store
        .get_instance(uuid)
        .await?
        .ok_or(BackendError::NotFound(uuid))?;

    if let Err(e) = backend.validate_instance_flavor(&instance, flavor) {
        store
            .set_instance_state(uuid, ResourceState::Erred, Some(&e.to_string()))
            .await?;
        return Err(e);
    }

    instance.flavor_name = Some(flavor.name.clone());
    instance.cores = flavor.cores;
    instance.ram = flavor.ram;
    store.update_instance(&mut instance).await?;
    store
        .set_instance_state(uuid, ResourceState::Creating, None)
        .await?;

    if let Err(e) = backend.create_instance(&mut instance).await {
        store
            .set_instance_state(uuid, ResourceState::Erred, Some(&e.to_string()))
            .await?;
        return Err(e);
    }
    tracing::info!("[executor] instance {} create submitted", uuid);
    Ok(())
}

pub async fn poll_instance_runtime_state(
    backend: &RijkscloudBackend,
    store: &dyn InventoryStore,
    uuid: Uuid,
) -> Result<PollOutcome, BackendError> {
    let state = backend.pull_instance_runtime_state(uuid).await?;
    match state.as_str() {
        RUNTIME_STATE_AVAILABLE => {
            store
                .set_instance_state(uuid, ResourceState::Ok, None)
                .await?;
            Ok(PollOutcome::Succeeded)
        }
        RUNTIME_STATE_ERROR => {
            let message = format!("instance entered runtime state '{}'", state);
            store
                .set_instance_state(uuid, ResourceState::Erred, Some(&message))
                .await?;
            Ok(PollOutcome::Erred(message))
        }
        _ => Ok(PollOutcome::Pending(state)),
    }
}

pub async fn execute_instance_pull(
    backend: &RijkscloudBackend,
    store: &dyn InventoryStore,
    uuid: Uuid,
) -> Result<PullOutcome, BackendError> {
    store
        .set_instance_state(uuid, ResourceState::Updating, None)
        .await?;
    match backend.pull_instance(uuid, None).await {
        Ok(outcome) => {
            store
                .set_instance_state(uuid, ResourceState::Ok, None)
                .await?;
            Ok(outcome)
        }
        Err(e) => {
            store
                .set_instance_state(uuid, ResourceState::Erred, Some(&e.to_string()))
                .await?;
            Err(e)
        }
    }
}

pub async fn execute_instance_delete(
    backend: &RijkscloudBackend,
    store: &dyn InventoryStore,
    uuid: Uuid,
) -> Result<(), BackendError> {
    let instance = store
        .get_instance(uuid)
        .await?
        .ok_or(BackendError::NotFound(uuid))?;
    store
        .set_instance_state(uuid, ResourceState::Deleting, None)
        .await?;

    if let Err(e) = backend.delete_instance(&instance).await {
        store
            .set_instance_state(uuid, ResourceState::Erred, Some(&e.to_string()))
            .await?;
        return Err(e);
    }
    store.delete_instance(uuid).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::json;

    use rijkscloud_client::mock::MockClient;
    use rijkscloud_client::RijkscloudApi;

    use crate::backend::RijkscloudBackend;
    use crate::models::{Instance, Volume};
    use crate::settings::ProviderSettings;
    use crate::store::MemoryStore;

    fn setup() -> (Arc<MockClient>, Arc<MemoryStore>, RijkscloudBackend) {
        let client = Arc::new(MockClient::new());
        let store = Arc::new(MemoryStore::new());
        let settings = ProviderSettings {
            uuid: Uuid::new_v4(),
            name: "rijkscloud".to_string(),
            username: "user".to_string(),
            token: "secret".to_string(),
        };
        let backend = RijkscloudBackend::with_client(settings, client.clone(), store.clone());
        (client, store, backend)
    }

    fn scheduled_volume(settings: Uuid, name: &str, size: i64) -> Volume {
        let now = Utc::now();
        Volume {
            uuid: Uuid::new_v4(),
            settings,
            project_link: None,
            backend_id: String::new(),
            name: name.to_string(),
            size,
            metadata: json!({}),
            runtime_state: String::new(),
            state: ResourceState::CreationScheduled,
            error_message: None,
            created: now,
            modified: now,
        }
    }

    fn scheduled_instance(settings: Uuid, name: &str) -> Instance {
        let now = Utc::now();
        Instance {
            uuid: Uuid::new_v4(),
            settings,
            project_link: None,
            backend_id: String::new(),
            name: name.to_string(),
            runtime_state: String::new(),
            state: ResourceState::CreationScheduled,
            error_message: None,
            flavor_name: None,
            cores: 0,
            ram: 0,
            created: now,
            modified: now,
        }
    }

    fn flavor(settings: Uuid) -> Flavor {
        Flavor {
            uuid: Uuid::new_v4(),
            settings,
            backend_id: "general.4gb".to_string(),
            name: "general.4gb".to_string(),
            cores: 2,
            ram: 4096,
        }
    }

    #[tokio::test]
    async fn volume_create_then_poll_until_available() {
        let (client, store, backend) = setup();
        let scope = backend.settings().uuid;
        let volume = scheduled_volume(scope, "disk-1", 2048);
        store.insert_volume(&volume).await.unwrap();

        execute_volume_create(&backend, store.as_ref(), volume.uuid)
            .await
            .unwrap();
        let stored = store.get_volume(volume.uuid).await.unwrap().unwrap();
        assert_eq!(stored.state, ResourceState::Creating);
        assert_eq!(stored.backend_id, "disk-1");

        // Mock reports "creating" until told otherwise.
        let outcome = poll_volume_runtime_state(&backend, store.as_ref(), volume.uuid)
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Pending("creating".to_string()));

        client.set_volume_status("disk-1", RUNTIME_STATE_AVAILABLE);
        let outcome = poll_volume_runtime_state(&backend, store.as_ref(), volume.uuid)
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Succeeded);

        let stored = store.get_volume(volume.uuid).await.unwrap().unwrap();
        assert_eq!(stored.state, ResourceState::Ok);
        assert_eq!(stored.runtime_state, RUNTIME_STATE_AVAILABLE);
    }

    #[tokio::test]
    async fn volume_poll_erred_runtime_state_marks_erred() {
        let (client, store, backend) = setup();
        let scope = backend.settings().uuid;
        let volume = scheduled_volume(scope, "disk-1", 1024);
        store.insert_volume(&volume).await.unwrap();
        execute_volume_create(&backend, store.as_ref(), volume.uuid)
            .await
            .unwrap();

        client.set_volume_status("disk-1", RUNTIME_STATE_ERROR);
        let outcome = poll_volume_runtime_state(&backend, store.as_ref(), volume.uuid)
            .await
            .unwrap();
        assert!(matches!(outcome, PollOutcome::Erred(_)));

        let stored = store.get_volume(volume.uuid).await.unwrap().unwrap();
        assert_eq!(stored.state, ResourceState::Erred);
        assert!(stored.error_message.is_some());
    }

    #[tokio::test]
    async fn volume_create_failure_marks_erred() {
        let (client, store, backend) = setup();
        let scope = backend.settings().uuid;
        let volume = scheduled_volume(scope, "disk-1", 1024);
        store.insert_volume(&volume).await.unwrap();
        client.set_volumes_failing(true);

        let result = execute_volume_create(&backend, store.as_ref(), volume.uuid).await;
        assert!(result.is_err());

        let stored = store.get_volume(volume.uuid).await.unwrap().unwrap();
        assert_eq!(stored.state, ResourceState::Erred);
        assert!(stored.error_message.is_some());
    }

    #[tokio::test]
    async fn volume_delete_removes_remote_and_local() {
        let (client, store, backend) = setup();
        let scope = backend.settings().uuid;
        let volume = scheduled_volume(scope, "disk-1", 1024);
        store.insert_volume(&volume).await.unwrap();
        execute_volume_create(&backend, store.as_ref(), volume.uuid)
            .await
            .unwrap();

        execute_volume_delete(&backend, store.as_ref(), volume.uuid)
            .await
            .unwrap();

        assert!(store.get_volume(volume.uuid).await.unwrap().is_none());
        assert!(client.get_volume("disk-1").await.is_err());
    }

    #[tokio::test]
    async fn volume_pull_executor_settles_to_ok() {
        let (client, store, backend) = setup();
        let scope = backend.settings().uuid;
        let mut volume = scheduled_volume(scope, "disk-1", 1024);
        volume.backend_id = "disk-1".to_string();
        volume.state = ResourceState::UpdateScheduled;
        volume.modified = Utc::now() - chrono::Duration::hours(1);
        store.insert_volume(&volume).await.unwrap();
        client.set_volumes(vec![rijkscloud_client::records::VolumeRecord {
            name: "disk-1".to_string(),
            size: 2,
            description: None,
            metadata: json!({}),
            status: "available".to_string(),
            attachments: vec![],
        }]);

        execute_volume_pull(&backend, store.as_ref(), volume.uuid)
            .await
            .unwrap();

        let stored = store.get_volume(volume.uuid).await.unwrap().unwrap();
        assert_eq!(stored.state, ResourceState::Ok);
        assert_eq!(stored.size, 2048);
    }

    #[tokio::test]
    async fn instance_create_then_poll_until_available() {
        let (client, store, backend) = setup();
        let scope = backend.settings().uuid;
        let instance = scheduled_instance(scope, "vm-1");
        store.insert_instance(&instance).await.unwrap();

        execute_instance_create(&backend, store.as_ref(), instance.uuid, &flavor(scope))
            .await
            .unwrap();

        let stored = store.get_instance(instance.uuid).await.unwrap().unwrap();
        assert_eq!(stored.state, ResourceState::Creating);
        assert_eq!(stored.backend_id, "mock-vm-1");
        assert_eq!(stored.flavor_name.as_deref(), Some("general.4gb"));
        assert_eq!(stored.cores, 2);
        assert_eq!(stored.ram, 4096);

        client.set_instance_status("mock-vm-1", RUNTIME_STATE_AVAILABLE);
        let outcome = poll_instance_runtime_state(&backend, store.as_ref(), instance.uuid)
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Succeeded);
        let stored = store.get_instance(instance.uuid).await.unwrap().unwrap();
        assert_eq!(stored.state, ResourceState::Ok);
    }

    #[tokio::test]
    async fn instance_poll_erred_runtime_state_marks_erred() {
        let (client, store, backend) = setup();
        let scope = backend.settings().uuid;
        let instance = scheduled_instance(scope, "vm-1");
        store.insert_instance(&instance).await.unwrap();
        execute_instance_create(&backend, store.as_ref(), instance.uuid, &flavor(scope))
            .await
            .unwrap();

        client.set_instance_status("mock-vm-1", RUNTIME_STATE_ERROR);
        let outcome = poll_instance_runtime_state(&backend, store.as_ref(), instance.uuid)
            .await
            .unwrap();
        assert!(matches!(outcome, PollOutcome::Erred(_)));

        let stored = store.get_instance(instance.uuid).await.unwrap().unwrap();
        assert_eq!(stored.state, ResourceState::Erred);
        assert!(stored.error_message.is_some());
    }

    #[tokio::test]
    async fn instance_create_foreign_flavor_fails_before_any_remote_call() {
        let (client, store, backend) = setup();
        let scope = backend.settings().uuid;
        let instance = scheduled_instance(scope, "vm-1");
        store.insert_instance(&instance).await.unwrap();
        let foreign = flavor(Uuid::new_v4());

        let err = execute_instance_create(&backend, store.as_ref(), instance.uuid, &foreign)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Validation(_)));

        let stored = store.get_instance(instance.uuid).await.unwrap().unwrap();
        assert_eq!(stored.state, ResourceState::Erred);
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn instance_delete_removes_remote_and_local() {
        let (client, store, backend) = setup();
        let scope = backend.settings().uuid;
        let instance = scheduled_instance(scope, "vm-1");
        store.insert_instance(&instance).await.unwrap();
        execute_instance_create(&backend, store.as_ref(), instance.uuid, &flavor(scope))
            .await
            .unwrap();

        execute_instance_delete(&backend, store.as_ref(), instance.uuid)
            .await
            .unwrap();

        assert!(store.get_instance(instance.uuid).await.unwrap().is_none());
        assert!(client.get_instance("mock-vm-1").await.is_err());
    }
}
