use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use super::{KvStore, Pair, normalize_key};
use crate::error::{BackendError, Result};

/// KV store adapter speaking the Consul HTTP KV API.
///
/// Values come back base64-encoded inside a JSON array; `ModifyIndex` is
/// Consul's per-key version counter and doubles as the CAS witness.
pub struct ConsulStore {
    client: reqwest::Client,
    base_url: String,
}

/// One element of the JSON array returned by `GET /v1/kv/<key>`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KvEntry {
    key: String,
    value: Option<String>,
    modify_index: u64,
}

impl ConsulStore {
    pub fn new(address: &str) -> Result<Self> {
        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", address.trim_end_matches('/'))
        };

        let client = reqwest::Client::builder().build()?;
        debug!("using consul agent at {}", base_url);

        Ok(Self { client, base_url })
    }

    fn kv_url(&self, key: &str) -> String {
        format!("{}/v1/kv/{}", self.base_url, normalize_key(key))
    }

    fn decode(entry: KvEntry) -> Result<Pair> {
        let value = match entry.value {
            Some(encoded) => BASE64.decode(encoded).map_err(|err| {
                BackendError::Store(format!("invalid base64 in key {}: {}", entry.key, err))
            })?,
            None => Vec::new(),
        };

        Ok(Pair::new(entry.key, value, entry.modify_index))
    }
}

#[async_trait]
impl KvStore for ConsulStore {
    async fn get(&self, key: &str) -> Result<Pair> {
        let response = self.client.get(self.kv_url(key)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::KeyNotFound);
        }

        let mut entries: Vec<KvEntry> = response.error_for_status()?.json().await?;
        if entries.is_empty() {
            return Err(BackendError::KeyNotFound);
        }

        Self::decode(entries.remove(0))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.client
            .put(self.kv_url(key))
            .body(value.to_vec())
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<Pair>> {
        let response = self
            .client
            .get(self.kv_url(prefix))
            .query(&[("recurse", "true")])
            .send()
            .await?;

        // A prefix with no keys underneath is an empty listing, not an error.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let entries: Vec<KvEntry> = response.error_for_status()?.json().await?;
        entries.into_iter().map(Self::decode).collect()
    }

    async fn atomic_put(&self, key: &str, value: &[u8], previous: Option<&Pair>) -> Result<bool> {
        // cas=0 is Consul's create-if-absent.
        let cas = previous.map(|pair| pair.modify_index).unwrap_or(0);

        let response = self
            .client
            .put(self.kv_url(key))
            .query(&[("cas", cas.to_string())])
            .body(value.to_vec())
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        Ok(body.trim() == "true")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_prepends_http_scheme() {
        let store = ConsulStore::new("127.0.0.1:8500").unwrap();
        assert_eq!(store.base_url, "http://127.0.0.1:8500");

        let store = ConsulStore::new("https://consul.internal:8501/").unwrap();
        assert_eq!(store.base_url, "https://consul.internal:8501");
    }

    #[test]
    fn test_kv_url_normalizes_key() {
        let store = ConsulStore::new("127.0.0.1:8500").unwrap();
        assert_eq!(
            store.kv_url("/zones/example.com/A/"),
            "http://127.0.0.1:8500/v1/kv/zones/example.com/A"
        );
    }

    #[test]
    fn test_decode_kv_entry() {
        let entry: KvEntry = serde_json::from_str(
            r#"{"LockIndex":0,"Key":"zones/example.com/A","Flags":0,"Value":"W3siUGF5bG9hZCI6IjEwLjAuMC4xIn1d","CreateIndex":10,"ModifyIndex":42}"#,
        )
        .unwrap();

        let pair = ConsulStore::decode(entry).unwrap();
        assert_eq!(pair.key, "zones/example.com/A");
        assert_eq!(pair.value, br#"[{"Payload":"10.0.0.1"}]"#);
        assert_eq!(pair.modify_index, 42);
    }

    #[test]
    fn test_decode_null_value_is_empty() {
        let entry: KvEntry = serde_json::from_str(
            r#"{"Key":"zones/example.com","Value":null,"ModifyIndex":7}"#,
        )
        .unwrap();

        let pair = ConsulStore::decode(entry).unwrap();
        assert!(pair.value.is_empty());
    }
}
