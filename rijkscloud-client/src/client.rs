use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;
use crate::records::{
    FlavorRecord, FloatingIpRecord, InstanceCreateRequest, InstanceRecord, NameStub,
    NetworkRecord, SubnetRecord, VolumeCreateRequest, VolumeRecord,
};
use crate::RijkscloudApi;

pub const DEFAULT_BASE_URL: &str = "https://cst.rijkscloud.nl/api";

/// HTTP client for the Rijkscloud REST API.
///
/// Authentication is two static headers (`userid` + `apikey`). Collection
/// responses arrive wrapped in a single-key JSON envelope which is
/// unwrapped here; the caller always sees decoded records.
pub struct RijkscloudClient {
    http: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
}

impl RijkscloudClient {
    pub fn new(userid: &str, apikey: &str) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, userid, apikey)
    }

    pub fn with_base_url(base_url: &str, userid: &str, apikey: &str) -> Self {
        // No overall timeout by default in reqwest; a stalled call would
        // otherwise hang its task forever.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "userid",
            HeaderValue::from_str(userid.trim()).expect("userid header"),
        );
        headers.insert(
            "apikey",
            HeaderValue::from_str(apikey.trim()).expect("apikey header"),
        );

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers,
        }
    }

    async fn get(&self, endpoint: &str, key: Option<&'static str>) -> Result<Value, ApiError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        tracing::debug!("[rijkscloud] GET {}", url);
        let response = self
            .http
            .get(&url)
            .headers(self.headers.clone())
            .send()
            .await?;
        let body = read_body("GET", endpoint, response).await?;
        match key {
            Some(key) => unwrap_key(body, endpoint, key),
            None => Ok(body),
        }
    }

    async fn post(&self, endpoint: &str, body: Option<Value>) -> Result<Value, ApiError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        tracing::debug!("[rijkscloud] POST {}", url);
        let mut request = self.http.post(&url).headers(self.headers.clone());
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        read_body("POST", endpoint, response).await
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        key: &'static str,
    ) -> Result<Vec<T>, ApiError> {
        let value = self.get(endpoint, Some(key)).await?;
        decode(endpoint, value)
    }
}

async fn read_body(
    method: &'static str,
    endpoint: &str,
    response: reqwest::Response,
) -> Result<Value, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            method,
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}

fn unwrap_key(mut body: Value, endpoint: &str, key: &'static str) -> Result<Value, ApiError> {
    body.get_mut(key)
        .map(Value::take)
        .ok_or_else(|| ApiError::MissingKey {
            endpoint: endpoint.to_string(),
            key,
        })
}

fn decode<T: DeserializeOwned>(endpoint: &str, value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|source| ApiError::Decode {
        endpoint: endpoint.to_string(),
        source,
    })
}

#[async_trait]
impl RijkscloudApi for RijkscloudClient {
    async fn list_flavors(&self) -> Result<Vec<FlavorRecord>, ApiError> {
        self.get_list("flavors", "flavors").await
    }

    async fn get_flavor(&self, name: &str) -> Result<FlavorRecord, ApiError> {
        let endpoint = format!("flavors/{}", name);
        let value = self.get(&endpoint, Some("flavor")).await?;
        decode(&endpoint, value)
    }

    async fn list_volumes(&self) -> Result<Vec<VolumeRecord>, ApiError> {
        // Listing returns stubs; downstream translation expects detailed
        // records, so fetch each volume in turn.
        let stubs: Vec<NameStub> = self.get_list("volumes", "volumes").await?;
        let mut volumes = Vec::with_capacity(stubs.len());
        for stub in stubs {
            volumes.push(self.get_volume(&stub.name).await?);
        }
        Ok(volumes)
    }

    async fn get_volume(&self, name: &str) -> Result<VolumeRecord, ApiError> {
        let endpoint = format!("volumes/{}", name);
        let value = self.get(&endpoint, Some("volume")).await?;
        decode(&endpoint, value)
    }

    async fn create_volume(&self, request: &VolumeCreateRequest) -> Result<Value, ApiError> {
        let body = serde_json::to_value(request).map_err(|source| ApiError::Decode {
            endpoint: "volume".to_string(),
            source,
        })?;
        self.post("volume", Some(body)).await
    }

    async fn delete_volume(&self, name: &str) -> Result<(), ApiError> {
        // Deletion is a bare POST on the resource endpoint.
        self.post(&format!("volume/{}", name), None).await?;
        Ok(())
    }

    async fn list_instances(&self) -> Result<Vec<InstanceRecord>, ApiError> {
        // One detail fetch per listed stub.
        let stubs: Vec<NameStub> = self.get_list("instances", "instances").await?;
        let mut instances = Vec::with_capacity(stubs.len());
        for stub in stubs {
            instances.push(self.get_instance(&stub.name).await?);
        }
        Ok(instances)
    }

    async fn get_instance(&self, id: &str) -> Result<InstanceRecord, ApiError> {
        let endpoint = format!("instances/{}", id);
        let value = self.get(&endpoint, Some("instance")).await?;
        decode(&endpoint, value)
    }

    async fn create_instance(&self, request: &InstanceCreateRequest) -> Result<Value, ApiError> {
        let body = serde_json::to_value(request).map_err(|source| ApiError::Decode {
            endpoint: "instances".to_string(),
            source,
        })?;
        self.post("instances", Some(body)).await
    }

    async fn delete_instance(&self, id: &str) -> Result<(), ApiError> {
        self.post(&format!("instances/{}", id), None).await?;
        Ok(())
    }

    async fn list_networks(&self) -> Result<Vec<NetworkRecord>, ApiError> {
        let stubs: Vec<NameStub> = self.get_list("networks", "networks").await?;
        let mut networks = Vec::with_capacity(stubs.len());
        for stub in stubs {
            networks.push(self.get_network(&stub.name).await?);
        }
        Ok(networks)
    }

    async fn get_network(&self, name: &str) -> Result<NetworkRecord, ApiError> {
        // A network is composed from its subnet listing; each subnet in turn
        // fans out to one floating-IP listing (see get_subnet).
        let endpoint = format!("networks/{}/subnets", name);
        let stubs: Vec<NameStub> = {
            let value = self.get(&endpoint, Some("subnets")).await?;
            decode(&endpoint, value)?
        };
        let mut subnets = Vec::with_capacity(stubs.len());
        for stub in stubs {
            subnets.push(self.get_subnet(name, &stub.name).await?);
        }
        Ok(NetworkRecord {
            name: name.to_string(),
            subnets,
        })
    }

    async fn get_subnet(&self, network: &str, subnet: &str) -> Result<SubnetRecord, ApiError> {
        // Subnet detail comes back as a raw body, no envelope.
        let endpoint = format!("networks/{}/subnets/{}", network, subnet);
        let value = self.get(&endpoint, None).await?;
        let mut record: SubnetRecord = decode(&endpoint, value)?;
        record.name = subnet.to_string();
        record.floatingips = self.list_subnet_floating_ips(network, subnet).await?;
        Ok(record)
    }

    async fn list_subnet_floating_ips(
        &self,
        network: &str,
        subnet: &str,
    ) -> Result<Vec<FloatingIpRecord>, ApiError> {
        self.get_list(&format!("networks/{}/subnets/{}/ips", network, subnet), "ips")
            .await
    }

    async fn list_floating_ips(&self) -> Result<Vec<FloatingIpRecord>, ApiError> {
        self.get_list("networks/floats", "floats").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwrap_key_takes_named_envelope() {
        let body = json!({"flavors": [{"name": "general.2gb", "vcpus": 1, "ram": 2048}]});
        let value = unwrap_key(body, "flavors", "flavors").unwrap();
        let flavors: Vec<FlavorRecord> = decode("flavors", value).unwrap();
        assert_eq!(flavors.len(), 1);
        assert_eq!(flavors[0].name, "general.2gb");
        assert_eq!(flavors[0].vcpus, 1);
        assert_eq!(flavors[0].ram, 2048);
    }

    #[test]
    fn unwrap_key_reports_missing_envelope() {
        let err = unwrap_key(json!({"volumes": []}), "flavors", "flavors").unwrap_err();
        assert!(matches!(err, ApiError::MissingKey { key: "flavors", .. }));
    }

    #[test]
    fn volume_record_decodes_provider_payload() {
        let value = json!({
            "attachments": [],
            "description": null,
            "metadata": {},
            "name": "test",
            "size": 2,
            "status": "available"
        });
        let volume: VolumeRecord = decode("volumes/test", value).unwrap();
        assert_eq!(volume.name, "test");
        assert_eq!(volume.size, 2);
        assert_eq!(volume.status, "available");
    }

    #[test]
    fn instance_record_tolerates_missing_flavor_and_fault() {
        let value = json!({"id": "abc-123", "name": "vm-1", "status": "active"});
        let instance: InstanceRecord = decode("instances/abc-123", value).unwrap();
        assert_eq!(instance.id, "abc-123");
        assert!(instance.flavor.is_none());
        assert!(instance.fault.is_none());
    }

    #[test]
    fn floating_ip_record_decodes() {
        let value = json!([
            {"available": false, "float_ip": "123.21.42.121"},
            {"available": true, "float_ip": "97.21.42.121"}
        ]);
        let ips: Vec<FloatingIpRecord> = decode("networks/floats", value).unwrap();
        assert_eq!(ips.len(), 2);
        assert!(!ips[0].available);
        assert_eq!(ips[1].float_ip, "97.21.42.121");
    }
}
