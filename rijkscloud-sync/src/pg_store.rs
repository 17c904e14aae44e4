//! Postgres-backed [`InventoryStore`].
//!
//! Plain runtime queries via query()/query_as() to avoid DATABASE_URL at
//! build time. Each `apply_*_diff` runs in a single transaction.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::models::{
    Flavor, FlavorAttributes, FloatingIp, FloatingIpAttributes, Instance, Network,
    NetworkAttributes, ResourceState, Subnet, Volume,
};
use crate::store::InventoryStore;

pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn parse_state(raw: &str) -> Result<ResourceState> {
    ResourceState::parse(raw).ok_or_else(|| anyhow!("unknown resource state '{}'", raw))
}

fn state_names(states: &[ResourceState]) -> Vec<String> {
    states.iter().map(|s| s.as_str().to_string()).collect()
}

#[derive(sqlx::FromRow)]
struct VolumeRow {
    uuid: Uuid,
    settings: Uuid,
    project_link: Option<Uuid>,
    backend_id: String,
    name: String,
    size: i64,
    metadata: serde_json::Value,
    runtime_state: String,
    state: String,
    error_message: Option<String>,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
}

impl VolumeRow {
    fn into_volume(self) -> Result<Volume> {
        Ok(Volume {
            uuid: self.uuid,
            settings: self.settings,
            project_link: self.project_link,
            backend_id: self.backend_id,
            name: self.name,
            size: self.size,
            metadata: self.metadata,
            runtime_state: self.runtime_state,
            state: parse_state(&self.state)?,
            error_message: self.error_message,
            created: self.created,
            modified: self.modified,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InstanceRow {
    uuid: Uuid,
    settings: Uuid,
    project_link: Option<Uuid>,
    backend_id: String,
    name: String,
    runtime_state: String,
    state: String,
    error_message: Option<String>,
    flavor_name: Option<String>,
    cores: i32,
    ram: i32,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
}

impl InstanceRow {
    fn into_instance(self) -> Result<Instance> {
        Ok(Instance {
            uuid: self.uuid,
            settings: self.settings,
            project_link: self.project_link,
            backend_id: self.backend_id,
            name: self.name,
            runtime_state: self.runtime_state,
            state: parse_state(&self.state)?,
            error_message: self.error_message,
            flavor_name: self.flavor_name,
            cores: self.cores,
            ram: self.ram,
            created: self.created,
            modified: self.modified,
        })
    }
}

const VOLUME_COLUMNS: &str = "uuid, settings, project_link, backend_id, name, size, metadata, \
     runtime_state, state, error_message, created, modified";

const INSTANCE_COLUMNS: &str = "uuid, settings, project_link, backend_id, name, runtime_state, \
     state, error_message, flavor_name, cores, ram, created, modified";

#[async_trait]
impl InventoryStore for PgStore {
    async fn list_flavors(&self, settings: Uuid) -> Result<Vec<Flavor>> {
        let rows: Vec<Flavor> = sqlx::query_as(
            "SELECT uuid, settings, backend_id, name, cores, ram
             FROM rijkscloud_flavors WHERE settings = $1 ORDER BY name",
        )
        .bind(settings)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn apply_flavor_diff(
        &self,
        settings: Uuid,
        upserts: &[FlavorAttributes],
        removed: &[String],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for attrs in upserts {
            sqlx::query(
                "INSERT INTO rijkscloud_flavors (uuid, settings, backend_id, name, cores, ram)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (settings, backend_id)
                 DO UPDATE SET name = EXCLUDED.name, cores = EXCLUDED.cores, ram = EXCLUDED.ram",
            )
            .bind(Uuid::new_v4())
            .bind(settings)
            .bind(&attrs.backend_id)
            .bind(&attrs.name)
            .bind(attrs.cores)
            .bind(attrs.ram)
            .execute(&mut *tx)
            .await?;
        }
        if !removed.is_empty() {
            sqlx::query(
                "DELETE FROM rijkscloud_flavors WHERE settings = $1 AND backend_id = ANY($2)",
            )
            .bind(settings)
            .bind(removed)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_floating_ips(&self, settings: Uuid) -> Result<Vec<FloatingIp>> {
        let rows: Vec<FloatingIp> = sqlx::query_as(
            "SELECT uuid, settings, backend_id, address, is_available
             FROM rijkscloud_floating_ips WHERE settings = $1 ORDER BY address",
        )
        .bind(settings)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn apply_floating_ip_diff(
        &self,
        settings: Uuid,
        upserts: &[FloatingIpAttributes],
        removed: &[String],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for attrs in upserts {
            sqlx::query(
                "INSERT INTO rijkscloud_floating_ips (uuid, settings, backend_id, address, is_available)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (settings, backend_id)
                 DO UPDATE SET address = EXCLUDED.address, is_available = EXCLUDED.is_available",
            )
            .bind(Uuid::new_v4())
            .bind(settings)
            .bind(&attrs.backend_id)
            .bind(&attrs.address)
            .bind(attrs.is_available)
            .execute(&mut *tx)
            .await?;
        }
        if !removed.is_empty() {
            sqlx::query(
                "DELETE FROM rijkscloud_floating_ips WHERE settings = $1 AND backend_id = ANY($2)",
            )
            .bind(settings)
            .bind(removed)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_networks(&self, settings: Uuid) -> Result<Vec<Network>> {
        let rows: Vec<Network> = sqlx::query_as(
            "SELECT uuid, settings, backend_id, name
             FROM rijkscloud_networks WHERE settings = $1 ORDER BY name",
        )
        .bind(settings)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_subnets(&self, settings: Uuid) -> Result<Vec<Subnet>> {
        let rows: Vec<Subnet> = sqlx::query_as(
            "SELECT uuid, settings, network_backend_id, backend_id, cidr, gateway_ip, allocation_pools
             FROM rijkscloud_subnets WHERE settings = $1 ORDER BY network_backend_id, backend_id",
        )
        .bind(settings)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn apply_network_diff(
        &self,
        settings: Uuid,
        upserts: &[NetworkAttributes],
        removed: &[String],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for attrs in upserts {
            sqlx::query(
                "INSERT INTO rijkscloud_networks (uuid, settings, backend_id, name)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (settings, backend_id) DO UPDATE SET name = EXCLUDED.name",
            )
            .bind(Uuid::new_v4())
            .bind(settings)
            .bind(&attrs.backend_id)
            .bind(&attrs.name)
            .execute(&mut *tx)
            .await?;

            // Subnets follow their network: keep the listed ones, drop the rest.
            let seen: Vec<String> = attrs.subnets.iter().map(|s| s.backend_id.clone()).collect();
            sqlx::query(
                "DELETE FROM rijkscloud_subnets
                 WHERE settings = $1 AND network_backend_id = $2 AND NOT (backend_id = ANY($3))",
            )
            .bind(settings)
            .bind(&attrs.backend_id)
            .bind(&seen)
            .execute(&mut *tx)
            .await?;
            for subnet in &attrs.subnets {
                sqlx::query(
                    "INSERT INTO rijkscloud_subnets
                         (uuid, settings, network_backend_id, backend_id, cidr, gateway_ip, allocation_pools)
                     VALUES ($1, $2, $3, $4, $5, $6, $7)
                     ON CONFLICT (settings, network_backend_id, backend_id)
                     DO UPDATE SET cidr = EXCLUDED.cidr, gateway_ip = EXCLUDED.gateway_ip,
                         allocation_pools = EXCLUDED.allocation_pools",
                )
                .bind(Uuid::new_v4())
                .bind(settings)
                .bind(&attrs.backend_id)
                .bind(&subnet.backend_id)
                .bind(&subnet.cidr)
                .bind(&subnet.gateway_ip)
                .bind(&subnet.allocation_pools)
                .execute(&mut *tx)
                .await?;
            }
        }
        if !removed.is_empty() {
            sqlx::query(
                "DELETE FROM rijkscloud_networks WHERE settings = $1 AND backend_id = ANY($2)",
            )
            .bind(settings)
            .bind(removed)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "DELETE FROM rijkscloud_subnets
                 WHERE settings = $1 AND network_backend_id = ANY($2)",
            )
            .bind(settings)
            .bind(removed)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_volume(&self, uuid: Uuid) -> Result<Option<Volume>> {
        let row: Option<VolumeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM rijkscloud_volumes WHERE uuid = $1",
            VOLUME_COLUMNS
        ))
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        row.map(VolumeRow::into_volume).transpose()
    }

    async fn list_volumes(
        &self,
        settings: Uuid,
        states: Option<&[ResourceState]>,
    ) -> Result<Vec<Volume>> {
        let rows: Vec<VolumeRow> = match states {
            Some(states) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM rijkscloud_volumes
                     WHERE settings = $1 AND state = ANY($2) ORDER BY name",
                    VOLUME_COLUMNS
                ))
                .bind(settings)
                .bind(state_names(states))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM rijkscloud_volumes WHERE settings = $1 ORDER BY name",
                    VOLUME_COLUMNS
                ))
                .bind(settings)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(VolumeRow::into_volume).collect()
    }

    async fn insert_volume(&self, volume: &Volume) -> Result<()> {
        sqlx::query(
            "INSERT INTO rijkscloud_volumes
                 (uuid, settings, project_link, backend_id, name, size, metadata,
                  runtime_state, state, error_message, created, modified)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(volume.uuid)
        .bind(volume.settings)
        .bind(volume.project_link)
        .bind(&volume.backend_id)
        .bind(&volume.name)
        .bind(volume.size)
        .bind(&volume.metadata)
        .bind(&volume.runtime_state)
        .bind(volume.state.as_str())
        .bind(&volume.error_message)
        .bind(volume.created)
        .bind(volume.modified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_volume(&self, volume: &mut Volume) -> Result<()> {
        volume.modified = Utc::now();
        sqlx::query(
            "UPDATE rijkscloud_volumes
             SET backend_id = $2, name = $3, size = $4, metadata = $5,
                 runtime_state = $6, state = $7, error_message = $8,
                 project_link = $9, modified = $10
             WHERE uuid = $1",
        )
        .bind(volume.uuid)
        .bind(&volume.backend_id)
        .bind(&volume.name)
        .bind(volume.size)
        .bind(&volume.metadata)
        .bind(&volume.runtime_state)
        .bind(volume.state.as_str())
        .bind(&volume.error_message)
        .bind(volume.project_link)
        .bind(volume.modified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_volume_state(
        &self,
        uuid: Uuid,
        state: ResourceState,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE rijkscloud_volumes
             SET state = $2, error_message = $3, modified = NOW()
             WHERE uuid = $1",
        )
        .bind(uuid)
        .bind(state.as_str())
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_volume(&self, uuid: Uuid) -> Result<bool> {
        let res = sqlx::query("DELETE FROM rijkscloud_volumes WHERE uuid = $1")
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn get_instance(&self, uuid: Uuid) -> Result<Option<Instance>> {
        let row: Option<InstanceRow> = sqlx::query_as(&format!(
            "SELECT {} FROM rijkscloud_instances WHERE uuid = $1",
            INSTANCE_COLUMNS
        ))
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        row.map(InstanceRow::into_instance).transpose()
    }

    async fn list_instances(
        &self,
        settings: Uuid,
        states: Option<&[ResourceState]>,
    ) -> Result<Vec<Instance>> {
        let rows: Vec<InstanceRow> = match states {
            Some(states) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM rijkscloud_instances
                     WHERE settings = $1 AND state = ANY($2) ORDER BY name",
                    INSTANCE_COLUMNS
                ))
                .bind(settings)
                .bind(state_names(states))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM rijkscloud_instances WHERE settings = $1 ORDER BY name",
                    INSTANCE_COLUMNS
                ))
                .bind(settings)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(InstanceRow::into_instance).collect()
    }

    async fn insert_instance(&self, instance: &Instance) -> Result<()> {
        sqlx::query(
            "INSERT INTO rijkscloud_instances
                 (uuid, settings, project_link, backend_id, name, runtime_state,
                  state, error_message, flavor_name, cores, ram, created, modified)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(instance.uuid)
        .bind(instance.settings)
        .bind(instance.project_link)
        .bind(&instance.backend_id)
        .bind(&instance.name)
        .bind(&instance.runtime_state)
        .bind(instance.state.as_str())
        .bind(&instance.error_message)
        .bind(&instance.flavor_name)
        .bind(instance.cores)
        .bind(instance.ram)
        .bind(instance.created)
        .bind(instance.modified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_instance(&self, instance: &mut Instance) -> Result<()> {
        instance.modified = Utc::now();
        sqlx::query(
            "UPDATE rijkscloud_instances
             SET backend_id = $2, name = $3, runtime_state = $4, state = $5,
                 error_message = $6, flavor_name = $7, cores = $8, ram = $9,
                 project_link = $10, modified = $11
             WHERE uuid = $1",
        )
        .bind(instance.uuid)
        .bind(&instance.backend_id)
        .bind(&instance.name)
        .bind(&instance.runtime_state)
        .bind(instance.state.as_str())
        .bind(&instance.error_message)
        .bind(&instance.flavor_name)
        .bind(instance.cores)
        .bind(instance.ram)
        .bind(instance.project_link)
        .bind(instance.modified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_instance_state(
        &self,
        uuid: Uuid,
        state: ResourceState,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE rijkscloud_instances
             SET state = $2, error_message = $3, modified = NOW()
             WHERE uuid = $1",
        )
        .bind(uuid)
        .bind(state.as_str())
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_instance(&self, uuid: Uuid) -> Result<bool> {
        let res = sqlx::query("DELETE FROM rijkscloud_instances WHERE uuid = $1")
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
