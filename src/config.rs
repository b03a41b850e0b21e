//! Operator Configuration
//!
//! All settings live in one YAML document; every section and field is
//! optional and falls back to its default. Command-line flags override values
//! read from the file.
//!
//! PersistentVolume records go through the operator's kube client unless a
//! `cluster` section names a server to talk to directly.
//!
//! ```yaml
//! reconciler:
//!   mountRoot: /var/lib/volumes/
//!   ownership:
//!     key: storage.billyronks.io/provisioner
//!     value: volume-claim-operator
//! cluster:
//!   server: https://kubernetes.default.svc
//!   tokenFile: /var/run/secrets/kubernetes.io/serviceaccount/token
//!   caFile: /var/run/secrets/kubernetes.io/serviceaccount/ca.crt
//! backend:
//!   endpoint: http://volume-service:7879
//! dispatcher:
//!   namespace: storage
//! ops:
//!   addr: 0.0.0.0:8080
//! ```

use crate::controlplane::{
    DispatcherConfig, OpsServerConfig, ReconcilerConfig, RestClusterConfig, VolumeDriverConfig,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete operator configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OperatorConfig {
    pub reconciler: ReconcilerConfig,
    /// Direct REST access to the cluster API; `None` uses the kube client
    pub cluster: Option<RestClusterConfig>,
    pub backend: VolumeDriverConfig,
    pub dispatcher: DispatcherConfig,
    pub ops: OpsServerConfig,
}

impl OperatorConfig {
    /// Parse a YAML document
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    /// Reject settings the operator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.reconciler.mount_root.is_empty() {
            return Err(Error::Configuration("mountRoot must not be empty".into()));
        }
        if self.reconciler.ownership.key.is_empty() || self.reconciler.ownership.value.is_empty() {
            return Err(Error::Configuration(
                "ownership marker key and value must not be empty".into(),
            ));
        }
        if !self.reconciler.api_base.starts_with('/') {
            return Err(Error::Configuration(format!(
                "apiBase must be an absolute path, got {:?}",
                self.reconciler.api_base
            )));
        }
        if let Some(cluster) = &self.cluster {
            if cluster.server.is_empty() {
                return Err(Error::Configuration("cluster server must not be empty".into()));
            }
        }
        if self.backend.endpoint.is_empty() {
            return Err(Error::Configuration("backend endpoint must not be empty".into()));
        }
        Ok(())
    }
}
