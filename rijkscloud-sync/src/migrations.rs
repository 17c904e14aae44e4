use sqlx::{Pool, Postgres};

/// Inline schema, applied statement by statement on startup. Every
/// statement is idempotent so reruns are harmless.
pub async fn run_inline_migrations(pool: &Pool<Postgres>) -> anyhow::Result<()> {
    tracing::info!("running inline migrations");

    let schema_sql = r#"
        CREATE TABLE IF NOT EXISTS rijkscloud_flavors (
            uuid UUID PRIMARY KEY,
            settings UUID NOT NULL,
            backend_id TEXT NOT NULL,
            name TEXT NOT NULL,
            cores INTEGER NOT NULL,
            ram INTEGER NOT NULL,
            UNIQUE(settings, backend_id)
        );
        CREATE TABLE IF NOT EXISTS rijkscloud_floating_ips (
            uuid UUID PRIMARY KEY,
            settings UUID NOT NULL,
            backend_id TEXT NOT NULL,
            address TEXT NOT NULL,
            is_available BOOLEAN NOT NULL,
            UNIQUE(settings, backend_id)
        );
        CREATE TABLE IF NOT EXISTS rijkscloud_networks (
            uuid UUID PRIMARY KEY,
            settings UUID NOT NULL,
            backend_id TEXT NOT NULL,
            name TEXT NOT NULL,
            UNIQUE(settings, backend_id)
        );
        CREATE TABLE IF NOT EXISTS rijkscloud_subnets (
            uuid UUID PRIMARY KEY,
            settings UUID NOT NULL,
            network_backend_id TEXT NOT NULL,
            backend_id TEXT NOT NULL,
            cidr TEXT,
            gateway_ip TEXT,
            allocation_pools JSONB NOT NULL DEFAULT '[]',
            UNIQUE(settings, network_backend_id, backend_id)
        );
        CREATE TABLE IF NOT EXISTS rijkscloud_volumes (
            uuid UUID PRIMARY KEY,
            settings UUID NOT NULL,
            project_link UUID,
            backend_id TEXT NOT NULL,
            name TEXT NOT NULL,
            size BIGINT NOT NULL,
            metadata JSONB NOT NULL DEFAULT '{}',
            runtime_state TEXT NOT NULL DEFAULT '',
            state TEXT NOT NULL,
            error_message TEXT,
            created TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            modified TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        CREATE TABLE IF NOT EXISTS rijkscloud_instances (
            uuid UUID PRIMARY KEY,
            settings UUID NOT NULL,
            project_link UUID,
            backend_id TEXT NOT NULL,
            name TEXT NOT NULL,
            runtime_state TEXT NOT NULL DEFAULT '',
            state TEXT NOT NULL,
            error_message TEXT,
            flavor_name TEXT,
            cores INTEGER NOT NULL DEFAULT 0,
            ram INTEGER NOT NULL DEFAULT 0,
            created TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            modified TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        CREATE INDEX IF NOT EXISTS idx_rijkscloud_volumes_settings
            ON rijkscloud_volumes (settings, state);
        CREATE INDEX IF NOT EXISTS idx_rijkscloud_instances_settings
            ON rijkscloud_instances (settings, state);
    "#;

    for statement in schema_sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt).execute(pool).await?;
        }
    }

    tracing::info!("migrations applied");
    Ok(())
}
