//! Claim Reconciler
//!
//! Drives the two-phase protocol between the volume backend and the cluster
//! API for a single claim:
//!
//! - provisioning creates the backend volume, then posts the volume record,
//!   deleting the backend volume again if the post fails;
//! - deprovisioning verifies the bound record still points at the claim,
//!   deletes the backend volume, then deletes the record.
//!
//! Every external call is made at most once per invocation and failures are
//! returned, never retried here. Redelivery is the dispatcher's job, so both
//! entry points must stay safe to re-run: the phase and ownership guards turn
//! stale or foreign events into no-ops.

use crate::controlplane::cluster::{VolumePaths, DEFAULT_API_BASE};
use crate::controlplane::template::{backend_size, volume_for_claim};
use crate::domain::{
    Claim, ClusterStateRef, CreateVolumeRequest, DeleteVolumeRequest, OwnershipMarker,
    VolumeBackendRef,
};
use crate::error::{Error, Result};
use crate::metrics::OperatorMetrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Read-only configuration injected into the reconciler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconcilerConfig {
    /// Root that claim UIDs are appended to for the volume host path
    pub mount_root: String,
    /// Annotation identifying managed claims and volumes
    pub ownership: OwnershipMarker,
    /// API base for PersistentVolume paths
    pub api_base: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            mount_root: "/var/lib/volume-claim-operator/".to_string(),
            ownership: OwnershipMarker::default(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Why an event was ignored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Claim lacks the ownership marker
    NotOwned,
    /// Present event for a claim that is already bound
    AlreadyBound,
    /// Deleted event for a claim that never got bound
    NotBound,
    /// Bound claim without a volume name
    NoBoundVolume,
    /// The bound volume now references a different claim
    ClaimRefMismatch {
        expected: String,
        found: Option<String>,
    },
}

/// Result of a successful reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Provisioned { volume: String },
    Deprovisioned { volume: String },
    Skipped(SkipReason),
}

impl ReconcileOutcome {
    /// Metric label for this outcome
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Provisioned { .. } => "provisioned",
            ReconcileOutcome::Deprovisioned { .. } => "deprovisioned",
            ReconcileOutcome::Skipped(_) => "skipped",
        }
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Reconciles claim events against the volume backend and the cluster
pub struct ClaimReconciler {
    config: ReconcilerConfig,
    paths: VolumePaths,
    backend: VolumeBackendRef,
    cluster: ClusterStateRef,
    metrics: Arc<OperatorMetrics>,
}

impl ClaimReconciler {
    /// Create a new reconciler
    pub fn new(
        config: ReconcilerConfig,
        backend: VolumeBackendRef,
        cluster: ClusterStateRef,
        metrics: Arc<OperatorMetrics>,
    ) -> Self {
        let paths = VolumePaths::new(config.api_base.clone());
        Self {
            config,
            paths,
            backend,
            cluster,
            metrics,
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Handle a create/update observation of a claim
    pub async fn on_present(&self, claim: &Claim) -> Result<ReconcileOutcome> {
        let started = Instant::now();
        let result = self.provision(claim).await;
        self.observe("present", &result, started);
        result
    }

    /// Handle a delete observation of a claim
    pub async fn on_deleted(&self, claim: &Claim) -> Result<ReconcileOutcome> {
        let started = Instant::now();
        let result = self.deprovision(claim).await;
        self.observe("deleted", &result, started);
        result
    }

    async fn provision(&self, claim: &Claim) -> Result<ReconcileOutcome> {
        debug!("Present event for claim {} (phase {})", claim.key(), claim.phase);

        if !self.config.ownership.owns(claim) {
            return Ok(ReconcileOutcome::Skipped(SkipReason::NotOwned));
        }
        if claim.is_bound() {
            debug!("Claim {} already bound, nothing to provision", claim.key());
            return Ok(ReconcileOutcome::Skipped(SkipReason::AlreadyBound));
        }

        let mut request = CreateVolumeRequest::new(claim.name.as_str());
        if let Some(size) = &claim.requested_size {
            request = request.with_size(backend_size(size));
        }

        info!(
            "Creating backend volume {} for claim {} (size: {})",
            request.name,
            claim.key(),
            claim.requested_size.as_deref().unwrap_or("unset")
        );
        if let Err(e) = self.backend.create(&request).await {
            error!("Backend create of volume {} failed: {}", request.name, e);
            return Err(e);
        }

        let volume = volume_for_claim(claim, &self.config.mount_root, &self.config.ownership);
        let path = self.paths.collection();
        if let Err(e) = self.cluster.post(&path, &volume).await {
            error!(
                "Creating volume record {} for claim {} failed: {}",
                volume.name(),
                claim.key(),
                e
            );
            return Err(self.rollback(&request.name, e).await);
        }

        info!("Provisioned volume {} for claim {}", volume.name(), claim.key());
        Ok(ReconcileOutcome::Provisioned {
            volume: volume.metadata.name,
        })
    }

    /// Delete the backend volume created for a failed provisioning run.
    ///
    /// Returns the error to surface: the original one when the rollback
    /// succeeded, or both wrapped together when it did not.
    async fn rollback(&self, name: &str, original: Error) -> Error {
        match self.backend.delete(&DeleteVolumeRequest::new(name)).await {
            Ok(()) => {
                self.metrics.record_rollback(true);
                warn!("Rolled back backend volume {}", name);
                original
            }
            Err(rollback) => {
                self.metrics.record_rollback(false);
                error!(
                    "Rollback of backend volume {} failed: {} (original error: {})",
                    name, rollback, original
                );
                Error::RollbackFailed {
                    volume: name.to_string(),
                    original: Box::new(original),
                    rollback: Box::new(rollback),
                }
            }
        }
    }

    async fn deprovision(&self, claim: &Claim) -> Result<ReconcileOutcome> {
        debug!("Deleted event for claim {} (phase {})", claim.key(), claim.phase);

        if !self.config.ownership.owns(claim) {
            return Ok(ReconcileOutcome::Skipped(SkipReason::NotOwned));
        }
        if !claim.is_bound() {
            return Ok(ReconcileOutcome::Skipped(SkipReason::NotBound));
        }
        // Targets the bound volume's name, which matches the claim name only
        // for volumes this operator provisioned.
        let Some(volume_name) = claim.bound_volume_name.as_deref() else {
            warn!("Claim {} is bound but names no volume", claim.key());
            return Ok(ReconcileOutcome::Skipped(SkipReason::NoBoundVolume));
        };

        let path = self.paths.item(volume_name);
        let volume = match self.cluster.get(&path).await {
            Ok(volume) => volume,
            Err(e) => {
                error!("Fetching volume record {} failed: {}", volume_name, e);
                return Err(e);
            }
        };

        if volume.claim_ref_name() != Some(claim.name.as_str()) {
            debug!(
                "Volume {} is bound to {:?}, not claim {}; leaving it alone",
                volume_name,
                volume.claim_ref_name(),
                claim.key()
            );
            return Ok(ReconcileOutcome::Skipped(SkipReason::ClaimRefMismatch {
                expected: claim.name.clone(),
                found: volume.claim_ref_name().map(str::to_string),
            }));
        }

        info!("Deleting backend volume {} for claim {}", volume_name, claim.key());
        if let Err(e) = self
            .backend
            .delete(&DeleteVolumeRequest::new(volume_name))
            .await
        {
            error!("Backend delete of volume {} failed: {}", volume_name, e);
            return Err(e);
        }

        if let Err(e) = self.cluster.delete(&path).await {
            self.metrics.record_orphaned_record();
            error!(
                "Backend volume {} is gone but deleting its record failed: {}",
                volume_name, e
            );
            return Err(e);
        }

        info!("Deprovisioned volume {} for claim {}", volume_name, claim.key());
        Ok(ReconcileOutcome::Deprovisioned {
            volume: volume_name.to_string(),
        })
    }

    fn observe(&self, operation: &str, result: &Result<ReconcileOutcome>, started: Instant) {
        let label = match result {
            Ok(outcome) => outcome.label(),
            Err(_) => "error",
        };
        self.metrics
            .record_reconcile(operation, label, started.elapsed().as_secs_f64());
    }
}
