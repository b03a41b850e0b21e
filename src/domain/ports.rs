//! Domain Ports - Core trait definitions for the operator
//!
//! These traits define the boundaries between the reconciler and external
//! systems. Adapters implement these traits to provide concrete functionality.

use crate::domain::volume::Volume;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Volume Backend Requests
// =============================================================================

/// Options attached to a backend create call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateVolumeOpts {
    /// Size in the backend's unit (gibibytes), e.g. "5"
    pub size: String,
}

/// Request to create a backend volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateVolumeRequest {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Opts", default, skip_serializing_if = "Option::is_none")]
    pub opts: Option<CreateVolumeOpts>,
}

impl CreateVolumeRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            opts: None,
        }
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.opts = Some(CreateVolumeOpts { size: size.into() });
        self
    }
}

/// Request to delete a backend volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteVolumeRequest {
    #[serde(rename = "Name")]
    pub name: String,
}

impl DeleteVolumeRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

// =============================================================================
// Volume Backend Port
// =============================================================================

/// Port for the service that allocates and frees volume capacity
#[async_trait]
pub trait VolumeBackend: Send + Sync {
    /// Create a named volume
    async fn create(&self, request: &CreateVolumeRequest) -> Result<()>;

    /// Delete a named volume
    async fn delete(&self, request: &DeleteVolumeRequest) -> Result<()>;

    /// Get backend name
    fn backend_name(&self) -> &str;
}

// =============================================================================
// Cluster State Port
// =============================================================================

/// Port for PersistentVolume records in the cluster API.
///
/// Paths are absolute API paths such as `/api/v1/persistentvolumes/c1`;
/// see [`crate::controlplane::cluster::VolumePaths`].
#[async_trait]
pub trait ClusterState: Send + Sync {
    /// Fetch the volume record at `path`
    async fn get(&self, path: &str) -> Result<Volume>;

    /// Create a volume record under the collection at `path`
    async fn post(&self, path: &str, body: &Volume) -> Result<()>;

    /// Delete the volume record at `path`
    async fn delete(&self, path: &str) -> Result<()>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type VolumeBackendRef = Arc<dyn VolumeBackend>;
pub type ClusterStateRef = Arc<dyn ClusterState>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_wire_format() {
        let request = CreateVolumeRequest::new("c1").with_size("5");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"Name": "c1", "Opts": {"size": "5"}}));

        let request = CreateVolumeRequest::new("c1");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"Name": "c1"}));
    }

    #[test]
    fn test_delete_request_wire_format() {
        let json = serde_json::to_value(DeleteVolumeRequest::new("c1")).unwrap();
        assert_eq!(json, serde_json::json!({"Name": "c1"}));
    }
}
