//! Claim model
//!
//! A read-only view of a PersistentVolumeClaim carrying only the fields the
//! reconciler looks at.

use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Claim lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ClaimPhase {
    #[default]
    Pending,
    Bound,
    Lost,
}

impl std::fmt::Display for ClaimPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimPhase::Pending => write!(f, "Pending"),
            ClaimPhase::Bound => write!(f, "Bound"),
            ClaimPhase::Lost => write!(f, "Lost"),
        }
    }
}

impl FromStr for ClaimPhase {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ClaimPhase::Pending),
            "Bound" => Ok(ClaimPhase::Bound),
            "Lost" => Ok(ClaimPhase::Lost),
            other => Err(format!("unknown claim phase: {}", other)),
        }
    }
}

/// A storage claim as observed in the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub namespace: String,
    pub name: String,
    pub uid: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub access_modes: Vec<String>,
    /// Requested storage quantity, e.g. "5Gi"
    pub requested_size: Option<String>,
    #[serde(default)]
    pub phase: ClaimPhase,
    /// Name of the volume the claim is bound to
    pub bound_volume_name: Option<String>,
}

impl Claim {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        uid: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            uid: uid.into(),
            annotations: BTreeMap::new(),
            access_modes: Vec::new(),
            requested_size: None,
            phase: ClaimPhase::Pending,
            bound_volume_name: None,
        }
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn with_access_modes<I, S>(mut self, modes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.access_modes = modes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_requested_size(mut self, size: impl Into<String>) -> Self {
        self.requested_size = Some(size.into());
        self
    }

    pub fn with_phase(mut self, phase: ClaimPhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_bound_volume(mut self, volume: impl Into<String>) -> Self {
        self.bound_volume_name = Some(volume.into());
        self
    }

    /// `namespace/name`, used in log fields
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn is_bound(&self) -> bool {
        self.phase == ClaimPhase::Bound
    }

    /// Whether the annotation `key` is present with exactly `value`
    pub fn has_annotation(&self, key: &str, value: &str) -> bool {
        self.annotations.get(key).map(String::as_str) == Some(value)
    }
}

impl TryFrom<&PersistentVolumeClaim> for Claim {
    type Error = Error;

    fn try_from(pvc: &PersistentVolumeClaim) -> Result<Self> {
        let meta = &pvc.metadata;
        let display_name = meta.name.clone().unwrap_or_else(|| "<unnamed>".to_string());
        let missing = |field: &str| Error::InvalidClaim {
            name: display_name.clone(),
            reason: format!("missing metadata.{}", field),
        };

        let name = meta.name.clone().ok_or_else(|| missing("name"))?;
        let namespace = meta.namespace.clone().ok_or_else(|| missing("namespace"))?;
        let uid = meta.uid.clone().ok_or_else(|| missing("uid"))?;

        let spec = pvc.spec.as_ref();
        let access_modes = spec
            .and_then(|s| s.access_modes.clone())
            .unwrap_or_default();
        let requested_size = spec
            .and_then(|s| s.resources.as_ref())
            .and_then(|r| r.requests.as_ref())
            .and_then(|requests| requests.get("storage"))
            .map(|quantity| quantity.0.clone());
        let bound_volume_name = spec.and_then(|s| s.volume_name.clone());

        let phase = match pvc.status.as_ref().and_then(|s| s.phase.as_deref()) {
            Some(phase) => phase.parse::<ClaimPhase>().map_err(|reason| Error::InvalidClaim {
                name: display_name.clone(),
                reason,
            })?,
            None => ClaimPhase::Pending,
        };

        Ok(Self {
            namespace,
            name,
            uid,
            annotations: meta.annotations.clone().unwrap_or_default(),
            access_modes,
            requested_size,
            phase,
            bound_volume_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn pvc(value: serde_json::Value) -> PersistentVolumeClaim {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_claim_from_bound_pvc() {
        let pvc = pvc(serde_json::json!({
            "metadata": {
                "name": "c1",
                "namespace": "default",
                "uid": "u1",
                "annotations": {"storage.billyronks.io/provisioner": "volume-claim-operator"}
            },
            "spec": {
                "accessModes": ["ReadWriteOnce"],
                "resources": {"requests": {"storage": "5Gi"}},
                "volumeName": "c1"
            },
            "status": {"phase": "Bound"}
        }));

        let claim = Claim::try_from(&pvc).unwrap();
        assert_eq!(claim.key(), "default/c1");
        assert_eq!(claim.uid, "u1");
        assert_eq!(claim.access_modes, vec!["ReadWriteOnce".to_string()]);
        assert_eq!(claim.requested_size.as_deref(), Some("5Gi"));
        assert_eq!(claim.bound_volume_name.as_deref(), Some("c1"));
        assert!(claim.is_bound());
        assert!(claim.has_annotation(
            "storage.billyronks.io/provisioner",
            "volume-claim-operator"
        ));
    }

    #[test]
    fn test_claim_without_status_is_pending() {
        let pvc = pvc(serde_json::json!({
            "metadata": {"name": "c1", "namespace": "default", "uid": "u1"},
            "spec": {"accessModes": ["ReadWriteMany"]}
        }));

        let claim = Claim::try_from(&pvc).unwrap();
        assert_eq!(claim.phase, ClaimPhase::Pending);
        assert!(claim.requested_size.is_none());
        assert!(claim.annotations.is_empty());
    }

    #[test]
    fn test_claim_missing_uid_is_rejected() {
        let pvc = pvc(serde_json::json!({
            "metadata": {"name": "c1", "namespace": "default"}
        }));

        let err = Claim::try_from(&pvc).unwrap_err();
        assert_matches!(err, Error::InvalidClaim { ref name, ref reason } if name == "c1" && reason.contains("uid"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unknown_phase_is_rejected() {
        let pvc = pvc(serde_json::json!({
            "metadata": {"name": "c1", "namespace": "default", "uid": "u1"},
            "status": {"phase": "Released"}
        }));

        assert_matches!(Claim::try_from(&pvc), Err(Error::InvalidClaim { .. }));
    }

    #[test]
    fn test_annotation_value_must_match() {
        let claim = Claim::new("default", "c1", "u1").with_annotation("owner", "someone-else");
        assert!(!claim.has_annotation("owner", "volume-claim-operator"));
        assert!(claim.has_annotation("owner", "someone-else"));
    }
}
