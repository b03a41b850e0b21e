//! Volume Driver Backend Adapter
//!
//! Talks to a volume service exposing the Docker volume-plugin protocol:
//! `POST /VolumeDriver.Create` and `POST /VolumeDriver.Remove`, each replying
//! with `{"Err": ""}` on success or a non-empty `Err` message on failure.

use crate::domain::{CreateVolumeRequest, DeleteVolumeRequest, VolumeBackend};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the volume driver client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VolumeDriverConfig {
    /// Base URL of the volume service
    pub endpoint: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for VolumeDriverConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:7879".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Reply body of every plugin call
#[derive(Debug, Default, Deserialize)]
struct DriverReply {
    #[serde(rename = "Err", default)]
    err: String,
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for the volume service
pub struct VolumeDriverClient {
    config: VolumeDriverConfig,
    http: reqwest::Client,
}

impl VolumeDriverClient {
    /// Create a new client
    pub fn new(config: VolumeDriverConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, http })
    }

    fn url(&self, call: &str) -> String {
        format!(
            "{}/VolumeDriver.{}",
            self.config.endpoint.trim_end_matches('/'),
            call
        )
    }

    async fn call<T: Serialize + Sync>(
        &self,
        operation: &str,
        call: &str,
        volume: &str,
        body: &T,
    ) -> Result<()> {
        let url = self.url(call);
        debug!("POST {} for volume {}", url, volume);

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::backend(operation, volume, e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::backend(operation, volume, e.to_string()))?;

        if !status.is_success() {
            return Err(Error::backend(
                operation,
                volume,
                format!("HTTP {}: {}", status.as_u16(), text.trim()),
            ));
        }

        let reply: DriverReply = if text.trim().is_empty() {
            DriverReply::default()
        } else {
            serde_json::from_str(&text).map_err(|e| {
                Error::backend(operation, volume, format!("invalid reply: {}", e))
            })?
        };

        if !reply.err.is_empty() {
            return Err(Error::backend(operation, volume, reply.err));
        }

        Ok(())
    }
}

#[async_trait]
impl VolumeBackend for VolumeDriverClient {
    async fn create(&self, request: &CreateVolumeRequest) -> Result<()> {
        self.call("create", "Create", &request.name, request).await
    }

    async fn delete(&self, request: &DeleteVolumeRequest) -> Result<()> {
        self.call("delete", "Remove", &request.name, request).await
    }

    fn backend_name(&self) -> &str {
        "volume-driver"
    }
}
