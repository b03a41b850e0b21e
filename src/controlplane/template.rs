//! Volume Template
//!
//! Builds the PersistentVolume record for a claim. Every call starts from a
//! freshly built skeleton, so concurrent reconciliations never share a record.

use crate::domain::{
    Claim, ClaimRef, HostPath, OwnershipMarker, Volume, VolumeMeta, VolumeSpec, CAPACITY_STORAGE,
};
use std::collections::BTreeMap;

/// Unit suffix of requested sizes; the backend takes bare gibibytes
pub const SIZE_UNIT_SUFFIX: &str = "Gi";

/// The skeleton every volume record starts from
pub fn skeleton() -> Volume {
    Volume {
        api_version: "v1".to_string(),
        kind: "PersistentVolume".to_string(),
        metadata: VolumeMeta {
            name: "pv0001".to_string(),
            annotations: BTreeMap::new(),
        },
        spec: VolumeSpec {
            claim_ref: Some(ClaimRef {
                namespace: "default".to_string(),
                name: "template".to_string(),
            }),
            access_modes: vec!["ReadWriteMany".to_string()],
            host_path: Some(HostPath {
                path: "/tmp".to_string(),
            }),
            capacity: BTreeMap::from([(CAPACITY_STORAGE.to_string(), "1Gi".to_string())]),
        },
    }
}

/// Build the volume record for `claim`.
///
/// The host path is `mount_root` with the claim UID appended verbatim, so the
/// root is expected to carry its own trailing separator.
pub fn volume_for_claim(claim: &Claim, mount_root: &str, marker: &OwnershipMarker) -> Volume {
    let mut volume = skeleton();

    volume.metadata.name = claim.name.clone();
    marker.apply(&mut volume.metadata.annotations);

    volume.spec.claim_ref = Some(ClaimRef {
        namespace: claim.namespace.clone(),
        name: claim.name.clone(),
    });
    volume.spec.access_modes = claim.access_modes.clone();
    volume.spec.host_path = Some(HostPath {
        path: format!("{}{}", mount_root, claim.uid),
    });
    if let Some(size) = &claim.requested_size {
        volume
            .spec
            .capacity
            .insert(CAPACITY_STORAGE.to_string(), size.clone());
    }

    volume
}

/// Size option for the backend create call, e.g. "5Gi" -> "5".
///
/// Sizes in any other unit are passed through unchanged.
pub fn backend_size(requested: &str) -> String {
    requested
        .strip_suffix(SIZE_UNIT_SUFFIX)
        .unwrap_or(requested)
        .to_string()
}
