//! Ownership marker
//!
//! Claims carrying this annotation are managed by the operator, and every
//! volume it creates carries it too. Anything without it is invisible.

use crate::domain::claim::Claim;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default annotation key marking managed resources
pub const OWNERSHIP_ANNOTATION_KEY: &str = "storage.billyronks.io/provisioner";

/// Default annotation value marking managed resources
pub const OWNERSHIP_ANNOTATION_VALUE: &str = "volume-claim-operator";

/// Annotation key/value pair identifying managed resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipMarker {
    pub key: String,
    pub value: String,
}

impl Default for OwnershipMarker {
    fn default() -> Self {
        Self {
            key: OWNERSHIP_ANNOTATION_KEY.to_string(),
            value: OWNERSHIP_ANNOTATION_VALUE.to_string(),
        }
    }
}

impl OwnershipMarker {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Whether the claim is managed by this operator
    pub fn owns(&self, claim: &Claim) -> bool {
        claim.has_annotation(&self.key, &self.value)
    }

    /// Stamp the marker onto an annotation map
    pub fn apply(&self, annotations: &mut BTreeMap<String, String>) {
        annotations.insert(self.key.clone(), self.value.clone());
    }
}
