//! Volume Claim Operator
//!
//! A Kubernetes operator that binds PersistentVolumeClaims to volumes
//! allocated by an external volume service.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                 Claim Watch (kube runtime watcher)               │
//! └────────────────────────────────┬─────────────────────────────────┘
//!                                  │ Present / Deleted
//! ┌────────────────────────────────┴─────────────────────────────────┐
//! │            Event Dispatcher (per-claim queues + retry)           │
//! └────────────────────────────────┬─────────────────────────────────┘
//!                                  │
//! ┌────────────────────────────────┴─────────────────────────────────┐
//! │                        Claim Reconciler                          │
//! │       ownership check · volume template · rollback on failure    │
//! ├────────────────────────────────┬─────────────────────────────────┤
//! │        Volume Backend          │          Cluster State          │
//! │   (VolumeDriver.Create/Remove) │  (PersistentVolume via kube)    │
//! └────────────────────────────────┴─────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controlplane`]: Reconciler, dispatcher, adapters and ops server
//! - [`domain`]: Claim and volume types, ownership marker, ports
//! - [`config`]: YAML configuration
//! - [`metrics`]: Prometheus metrics
//! - [`error`]: Error types and handling

pub mod config;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod metrics;

// Re-export commonly used types
pub use config::OperatorConfig;

pub use controlplane::{
    ClaimEvent, ClaimReconciler, DispatcherConfig, EventDispatcher, KubeClusterClient, OpsServer,
    OpsServerConfig, OpsState, ReconcileOutcome, ReconcilerConfig, RestClusterClient,
    RestClusterConfig, SkipReason, VolumeDriverClient, VolumeDriverConfig, VolumePaths,
};

pub use domain::{
    Claim, ClaimPhase, ClusterState, ClusterStateRef, CreateVolumeRequest, DeleteVolumeRequest,
    OwnershipMarker, Volume, VolumeBackend, VolumeBackendRef,
};

pub use error::{Error, ErrorAction, Result};

pub use metrics::OperatorMetrics;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
