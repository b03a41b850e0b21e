//! Cluster REST Client
//!
//! Reads and writes PersistentVolume records through the Kubernetes REST API,
//! either directly against the API server (bearer token + CA bundle from the
//! service account) or through `kubectl proxy`. Only used when the
//! configuration carries a `cluster` section.

use crate::domain::{ClusterState, Volume};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the cluster REST client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RestClusterConfig {
    /// API server URL, e.g. `https://kubernetes.default.svc`
    pub server: String,
    /// File holding a bearer token, re-read on every request
    pub token_file: Option<PathBuf>,
    /// PEM bundle used to verify the API server
    pub ca_file: Option<PathBuf>,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RestClusterConfig {
    fn default() -> Self {
        Self {
            server: "http://127.0.0.1:8001".to_string(),
            token_file: None,
            ca_file: None,
            timeout_secs: 30,
        }
    }
}

/// The `message` of a Kubernetes `Status` error body
#[derive(Debug, Deserialize)]
struct StatusBody {
    message: Option<String>,
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client for PersistentVolume records
pub struct RestClusterClient {
    config: RestClusterConfig,
    http: reqwest::Client,
}

impl RestClusterClient {
    /// Create a new client
    pub fn new(config: RestClusterConfig) -> Result<Self> {
        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs));

        if let Some(ca_file) = &config.ca_file {
            let pem = std::fs::read(ca_file)?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                Error::Configuration(format!("Invalid CA file {}: {}", ca_file.display(), e))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        Ok(Self {
            config,
            http: builder.build()?,
        })
    }

    async fn bearer_token(&self) -> Result<Option<String>> {
        match &self.config.token_file {
            Some(path) => {
                let token = tokio::fs::read_to_string(path).await?;
                Ok(Some(token.trim().to_string()))
            }
            None => Ok(None),
        }
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Volume>) -> Result<String> {
        let url = format!("{}{}", self.config.server.trim_end_matches('/'), path);
        debug!("{} {}", method, url);

        let mut request = self.http.request(method.clone(), &url);
        if let Some(token) = self.bearer_token().await? {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::cluster(method.as_str(), path, None, e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::cluster(method.as_str(), path, Some(status.as_u16()), e.to_string()))?;

        if !status.is_success() {
            let reason = serde_json::from_str::<StatusBody>(&text)
                .ok()
                .and_then(|s| s.message)
                .unwrap_or_else(|| text.trim().to_string());
            return Err(Error::cluster(
                method.as_str(),
                path,
                Some(status.as_u16()),
                reason,
            ));
        }

        Ok(text)
    }
}

#[async_trait]
impl ClusterState for RestClusterClient {
    async fn get(&self, path: &str) -> Result<Volume> {
        let text = self.send(Method::GET, path, None).await?;
        serde_json::from_str(&text).map_err(|e| {
            Error::cluster("GET", path, None, format!("invalid PersistentVolume: {}", e))
        })
    }

    async fn post(&self, path: &str, body: &Volume) -> Result<()> {
        self.send(Method::POST, path, Some(body)).await.map(|_| ())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.send(Method::DELETE, path, None).await.map(|_| ())
    }
}
