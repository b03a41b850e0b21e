//! Volume model
//!
//! PersistentVolume records in their wire shape. Only the fields the operator
//! writes or verifies are modelled; anything else the API server returns is
//! ignored on read.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Capacity key for storage size
pub const CAPACITY_STORAGE: &str = "storage";

/// A PersistentVolume record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub metadata: VolumeMeta,
    #[serde(default)]
    pub spec: VolumeSpec,
}

/// Volume metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Reference from a volume to the claim it is bound to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRef {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
}

/// Host path volume source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPath {
    pub path: String,
}

/// Volume spec
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_ref: Option<ClaimRef>,
    #[serde(default)]
    pub access_modes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<HostPath>,
    #[serde(default)]
    pub capacity: BTreeMap<String, String>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_kind() -> String {
    "PersistentVolume".to_string()
}

impl Volume {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Name of the claim this volume is bound to, if any
    pub fn claim_ref_name(&self) -> Option<&str> {
        self.spec.claim_ref.as_ref().map(|r| r.name.as_str())
    }

    pub fn host_path(&self) -> Option<&str> {
        self.spec.host_path.as_ref().map(|h| h.path.as_str())
    }

    pub fn capacity_storage(&self) -> Option<&str> {
        self.spec.capacity.get(CAPACITY_STORAGE).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_from_api_response() {
        // Extra fields from the API server are ignored
        let volume: Volume = serde_json::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "PersistentVolume",
            "metadata": {
                "name": "c1",
                "uid": "0d4a",
                "resourceVersion": "812"
            },
            "spec": {
                "claimRef": {
                    "kind": "PersistentVolumeClaim",
                    "namespace": "default",
                    "name": "c1",
                    "uid": "u1"
                },
                "accessModes": ["ReadWriteOnce"],
                "hostPath": {"path": "/var/lib/volumes/u1", "type": ""},
                "capacity": {"storage": "5Gi"},
                "persistentVolumeReclaimPolicy": "Retain"
            },
            "status": {"phase": "Bound"}
        }))
        .unwrap();

        assert_eq!(volume.name(), "c1");
        assert_eq!(volume.claim_ref_name(), Some("c1"));
        assert_eq!(volume.host_path(), Some("/var/lib/volumes/u1"));
        assert_eq!(volume.capacity_storage(), Some("5Gi"));
        assert!(volume.metadata.annotations.is_empty());
    }

    #[test]
    fn test_unbound_volume_has_no_claim_ref() {
        let volume: Volume = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "pv-free"},
            "spec": {"capacity": {"storage": "1Gi"}}
        }))
        .unwrap();

        assert_eq!(volume.claim_ref_name(), None);
        assert_eq!(volume.kind, "PersistentVolume");
        assert_eq!(volume.api_version, "v1");
    }
}
