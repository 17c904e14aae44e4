use std::env;
use std::fs;

use anyhow::{Context, Result};
use serde::Deserialize;
use uuid::Uuid;

/// Provider settings scope: the credential/configuration context one
/// reconciliation pass operates under. The two required values are the
/// identity (user id) and the API key.
#[derive(Clone, Debug, Deserialize)]
pub struct ProviderSettings {
    pub uuid: Uuid,
    pub name: String,
    pub username: String,
    pub token: String,
}

impl ProviderSettings {
    pub fn from_env() -> Result<Self> {
        let username = env::var("RIJKSCLOUD_USERID")
            .context("RIJKSCLOUD_USERID is required")?
            .trim()
            .to_string();

        // Prefer *_FILE for the secret (Docker/K8s friendly), fallback to
        // the plain env var.
        let token_file = env::var("RIJKSCLOUD_APIKEY_FILE")
            .unwrap_or_else(|_| "/run/secrets/rijkscloud_apikey".to_string());
        let token = fs::read_to_string(&token_file)
            .ok()
            .or_else(|| env::var("RIJKSCLOUD_APIKEY").ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .context("RIJKSCLOUD_APIKEY (or RIJKSCLOUD_APIKEY_FILE) is required")?;

        let uuid = env::var("RIJKSCLOUD_SETTINGS_UUID")
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self {
            uuid,
            name: env::var("RIJKSCLOUD_SETTINGS_NAME").unwrap_or_else(|_| "rijkscloud".to_string()),
            username,
            token,
        })
    }
}
