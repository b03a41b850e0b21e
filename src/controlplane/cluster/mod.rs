//! Cluster State Adapters
//!
//! PersistentVolume records are addressed by API path. [`VolumePaths`] builds
//! those paths. [`KubeClusterClient`] sends them through the operator's kube
//! client; [`RestClusterClient`] talks plain HTTP to an explicitly configured
//! server, e.g. `kubectl proxy`.

pub mod in_cluster;
pub mod rest;

pub use in_cluster::*;
pub use rest::*;

/// Default API base for core/v1 resources
pub const DEFAULT_API_BASE: &str = "/api/v1";

/// Builds PersistentVolume API paths under a fixed base
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumePaths {
    base: String,
}

impl Default for VolumePaths {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}

impl VolumePaths {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// `<base>/persistentvolumes`
    pub fn collection(&self) -> String {
        format!("{}/persistentvolumes", self.base)
    }

    /// `<base>/persistentvolumes/<name>`
    pub fn item(&self, name: &str) -> String {
        format!("{}/persistentvolumes/{}", self.base, urlencoding::encode(name))
    }
}
