//! Event Dispatcher
//!
//! Turns the PersistentVolumeClaim watch into `present`/`deleted` events and
//! hands them to the [`ClaimReconciler`].
//!
//! Contract with the reconciler:
//!
//! - Delivery is at-least-once. Watch restarts replay every claim as
//!   `present`, and failed events are retried with exponential backoff, so
//!   the reconciler has to be idempotent (its phase and ownership guards
//!   make it so).
//! - Events are serialized per claim UID: a `present` and a `deleted` event
//!   for the same claim never run at the same time and always run in the
//!   order they were observed. Different claims reconcile concurrently.
//! - A `present` event stops retrying as soon as a newer event for the same
//!   claim is queued; the newer event carries the state to act on.
//! - Every owned claim seen by the watch is remembered until it is deleted.
//!   When a relist no longer contains one, it is delivered as `deleted`.
//! - Workers run on a [`TaskTracker`]. [`EventDispatcher::shutdown`] refuses
//!   new events and waits for in-flight ones; pending retries are abandoned
//!   instead of waited out.

use crate::controlplane::reconciler::{ClaimReconciler, ReconcileOutcome};
use crate::domain::Claim;
use crate::error::{Error, ErrorAction, Result};
use crate::metrics::OperatorMetrics;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::StreamExt;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

// =============================================================================
// Events
// =============================================================================

/// A claim observation delivered to the reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimEvent {
    /// The claim was created or updated
    Present(Claim),
    /// The claim was deleted; carries its last known state
    Deleted(Claim),
}

impl ClaimEvent {
    pub fn claim(&self) -> &Claim {
        match self {
            ClaimEvent::Present(claim) | ClaimEvent::Deleted(claim) => claim,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClaimEvent::Present(_) => "present",
            ClaimEvent::Deleted(_) => "deleted",
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DispatcherConfig {
    /// Watch a single namespace instead of the whole cluster
    pub namespace: Option<String>,
    /// Only watch claims matching this label selector
    pub label_selector: Option<String>,
    /// First retry delay in milliseconds
    pub retry_initial_ms: u64,
    /// Upper bound for a single retry delay in milliseconds
    pub retry_max_interval_ms: u64,
    /// Give up on an event after this many seconds of retrying
    pub retry_max_elapsed_secs: u64,
    /// How long shutdown waits for in-flight reconciliations
    pub shutdown_grace_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            label_selector: None,
            retry_initial_ms: 500,
            retry_max_interval_ms: 30_000,
            retry_max_elapsed_secs: 300,
            shutdown_grace_secs: 60,
        }
    }
}

impl DispatcherConfig {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.retry_initial_ms))
            .with_max_interval(Duration::from_millis(self.retry_max_interval_ms))
            .with_max_elapsed_time(Some(Duration::from_secs(self.retry_max_elapsed_secs)))
            .build()
    }
}

/// How a dispatched event ended
#[derive(Debug)]
enum Delivery {
    Reconciled(ReconcileOutcome),
    /// A newer event for the claim was queued before a retry
    Superseded,
    /// Shutdown started before a retry
    Interrupted,
}

/// Map an error onto the retry policy
fn classify(err: Error) -> backoff::Error<Error> {
    match err.action() {
        ErrorAction::RequeueWithBackoff => backoff::Error::transient(err),
        ErrorAction::RequeueAfter(wait) => backoff::Error::retry_after(err, wait),
        ErrorAction::NoRequeue => backoff::Error::permanent(err),
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Delivers claim events to the reconciler, one claim at a time
pub struct EventDispatcher {
    reconciler: Arc<ClaimReconciler>,
    config: DispatcherConfig,
    metrics: Arc<OperatorMetrics>,
    /// Pending events per claim UID; an entry exists while a worker is active
    queues: DashMap<String, VecDeque<ClaimEvent>>,
    /// Last observed state of every owned claim, by UID
    known: DashMap<String, Claim>,
    workers: TaskTracker,
    ready: Arc<AtomicBool>,
}

impl EventDispatcher {
    /// Create a new dispatcher
    pub fn new(
        reconciler: Arc<ClaimReconciler>,
        config: DispatcherConfig,
        metrics: Arc<OperatorMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            reconciler,
            config,
            metrics,
            queues: DashMap::new(),
            known: DashMap::new(),
            workers: TaskTracker::new(),
            ready: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag set once the initial claim list has been dispatched
    pub fn readiness(&self) -> Arc<AtomicBool> {
        self.ready.clone()
    }

    /// Number of claims with a reconciliation in flight
    pub fn in_flight(&self) -> usize {
        self.queues.len()
    }

    /// Queue an event behind any in-flight work for the same claim
    pub fn dispatch(self: &Arc<Self>, event: ClaimEvent) {
        if self.workers.is_closed() {
            warn!(
                "Shutting down, dropping {} event for claim {}",
                event.kind(),
                event.claim().key()
            );
            return;
        }
        let uid = event.claim().uid.clone();

        match self.queues.entry(uid.clone()) {
            Entry::Occupied(mut pending) => {
                debug!(
                    "Claim {} busy, queueing {} event",
                    event.claim().key(),
                    event.kind()
                );
                pending.get_mut().push_back(event);
            }
            Entry::Vacant(slot) => {
                slot.insert(VecDeque::new());
                let this = Arc::clone(self);
                self.workers.spawn(async move { this.drain(uid, event).await });
            }
        }
    }

    /// Process events for one claim until its queue is empty
    async fn drain(&self, uid: String, first: ClaimEvent) {
        let mut next = Some(first);

        while let Some(event) = next {
            self.process(&event).await;

            next = match self.queues.entry(uid.clone()) {
                Entry::Occupied(mut pending) => {
                    let queued = pending.get_mut().pop_front();
                    if queued.is_none() {
                        pending.remove();
                    }
                    queued
                }
                Entry::Vacant(_) => None,
            };
        }
    }

    /// Whether another event for `uid` is waiting behind the current one
    fn has_queued(&self, uid: &str) -> bool {
        self.queues.get(uid).map_or(false, |pending| !pending.is_empty())
    }

    /// Reconcile one event, retrying failures the error policy allows
    async fn process(&self, event: &ClaimEvent) {
        let reconciler = self.reconciler.as_ref();
        let metrics = self.metrics.as_ref();
        let mut attempt = 0u32;

        let operation = move || {
            let retry = attempt > 0;
            attempt += 1;
            async move {
                if retry {
                    if self.workers.is_closed() {
                        return Ok(Delivery::Interrupted);
                    }
                    if matches!(event, ClaimEvent::Present(_))
                        && self.has_queued(&event.claim().uid)
                    {
                        return Ok(Delivery::Superseded);
                    }
                }
                let result = match event {
                    ClaimEvent::Present(claim) => reconciler.on_present(claim).await,
                    ClaimEvent::Deleted(claim) => reconciler.on_deleted(claim).await,
                };
                result.map(Delivery::Reconciled).map_err(classify)
            }
        };
        let notify = |err: Error, wait: Duration| {
            metrics.record_retry();
            warn!(
                "Reconciling {} event for claim {} failed, retrying in {:?}: {}",
                event.kind(),
                event.claim().key(),
                wait,
                err
            );
        };

        match backoff::future::retry_notify(self.config.backoff(), operation, notify).await {
            Ok(Delivery::Reconciled(ReconcileOutcome::Skipped(reason))) => {
                debug!(
                    "Skipped {} event for claim {}: {:?}",
                    event.kind(),
                    event.claim().key(),
                    reason
                );
            }
            Ok(Delivery::Reconciled(outcome)) => {
                debug!(
                    "Reconciled {} event for claim {}: {:?}",
                    event.kind(),
                    event.claim().key(),
                    outcome
                );
            }
            Ok(Delivery::Superseded) => {
                info!(
                    "Dropping retry of {} event for claim {}: a newer event is queued",
                    event.kind(),
                    event.claim().key()
                );
            }
            Ok(Delivery::Interrupted) => {
                warn!(
                    "Abandoning retry of {} event for claim {}: shutting down",
                    event.kind(),
                    event.claim().key()
                );
            }
            Err(e) => {
                error!(
                    "Giving up on {} event for claim {}: {}",
                    event.kind(),
                    event.claim().key(),
                    e
                );
            }
        }
    }

    /// Refuse new events and wait up to the grace period for in-flight ones.
    ///
    /// Returns `false` if workers were still running when the grace period
    /// ran out.
    pub async fn shutdown(&self) -> bool {
        self.workers.close();
        let grace = Duration::from_secs(self.config.shutdown_grace_secs);
        match tokio::time::timeout(grace, self.workers.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    "{} claims still reconciling after {:?}",
                    self.in_flight(),
                    grace
                );
                false
            }
        }
    }

    /// Watch claims and dispatch events until `shutdown` fires
    pub async fn run(self: Arc<Self>, client: Client, shutdown: CancellationToken) -> Result<()> {
        let api: Api<PersistentVolumeClaim> = match &self.config.namespace {
            Some(namespace) => Api::namespaced(client, namespace),
            None => Api::all(client),
        };

        let mut watch_config = watcher::Config::default();
        if let Some(selector) = &self.config.label_selector {
            watch_config = watch_config.labels(selector);
        }

        info!(
            "Watching PersistentVolumeClaims in {}",
            self.config.namespace.as_deref().unwrap_or("all namespaces")
        );
        let mut stream = watcher(api, watch_config).default_backoff().boxed();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Claim watch stopping");
                    break;
                }
                next = stream.next() => match next {
                    Some(Ok(event)) => self.handle_watch_event(event),
                    Some(Err(e)) => warn!("Claim watch error: {}", e),
                    None => {
                        warn!("Claim watch stream ended");
                        break;
                    }
                },
            }
        }

        Ok(())
    }

    /// Translate one watch event into claim events
    pub fn handle_watch_event(self: &Arc<Self>, event: watcher::Event<PersistentVolumeClaim>) {
        match event {
            watcher::Event::Applied(pvc) => {
                if let Some(claim) = self.observe(&pvc) {
                    self.dispatch(ClaimEvent::Present(claim));
                }
            }
            watcher::Event::Deleted(pvc) => {
                if let Some(claim) = convert(&pvc) {
                    self.known.remove(&claim.uid);
                    self.dispatch(ClaimEvent::Deleted(claim));
                }
            }
            watcher::Event::Restarted(pvcs) => {
                let claims: Vec<Claim> =
                    pvcs.iter().filter_map(|pvc| self.observe(pvc)).collect();
                self.release_missing(&claims);
                for claim in claims {
                    self.dispatch(ClaimEvent::Present(claim));
                }
                if !self.ready.swap(true, Ordering::SeqCst) {
                    info!("Initial claim list synced ({} claims)", pvcs.len());
                }
            }
        }
    }

    /// Convert a claim and remember it if this operator owns it
    fn observe(&self, pvc: &PersistentVolumeClaim) -> Option<Claim> {
        let claim = convert(pvc)?;
        if self.reconciler.config().ownership.owns(&claim) {
            self.known.insert(claim.uid.clone(), claim.clone());
        } else {
            self.known.remove(&claim.uid);
        }
        Some(claim)
    }

    /// Deliver `deleted` for remembered claims absent from a relist
    fn release_missing(self: &Arc<Self>, listed: &[Claim]) {
        let present: HashSet<&str> = listed.iter().map(|claim| claim.uid.as_str()).collect();
        let missing: Vec<String> = self
            .known
            .iter()
            .filter(|entry| !present.contains(entry.key().as_str()))
            .map(|entry| entry.key().clone())
            .collect();

        for uid in missing {
            if let Some((_, claim)) = self.known.remove(&uid) {
                info!("Claim {} disappeared while the watch was down", claim.key());
                self.dispatch(ClaimEvent::Deleted(claim));
            }
        }
    }
}

fn convert(pvc: &PersistentVolumeClaim) -> Option<Claim> {
    match Claim::try_from(pvc) {
        Ok(claim) => Some(claim),
        Err(e) => {
            warn!("Ignoring claim: {}", e);
            None
        }
    }
}
