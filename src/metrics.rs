//! Operator Metrics
//!
//! Prometheus collectors for reconciliation outcomes. Each `OperatorMetrics`
//! owns its registry, so tests and embedded uses don't collide on the
//! process-wide default registry.

use crate::error::Result;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

const NAMESPACE: &str = "volume_operator";

/// Metrics collected by the reconciler and dispatcher
pub struct OperatorMetrics {
    registry: Registry,
    reconciles: IntCounterVec,
    rollbacks: IntCounterVec,
    orphaned_records: IntCounter,
    retries: IntCounter,
    reconcile_duration: HistogramVec,
}

impl OperatorMetrics {
    /// Create and register all collectors
    pub fn new() -> Result<Arc<Self>> {
        let registry = Registry::new();

        let reconciles = IntCounterVec::new(
            Opts::new("reconciles_total", "Claim reconciliations by operation and result")
                .namespace(NAMESPACE),
            &["operation", "result"],
        )?;
        let rollbacks = IntCounterVec::new(
            Opts::new(
                "rollbacks_total",
                "Backend volume rollbacks after a failed cluster write",
            )
            .namespace(NAMESPACE),
            &["result"],
        )?;
        let orphaned_records = IntCounter::with_opts(
            Opts::new(
                "orphaned_records_total",
                "Volume records left behind after their backend volume was deleted",
            )
            .namespace(NAMESPACE),
        )?;
        let retries = IntCounter::with_opts(
            Opts::new("retries_total", "Reconciliation attempts retried by the dispatcher")
                .namespace(NAMESPACE),
        )?;
        let reconcile_duration = HistogramVec::new(
            HistogramOpts::new(
                "reconcile_duration_seconds",
                "Duration of a single reconciliation attempt",
            )
            .namespace(NAMESPACE),
            &["operation"],
        )?;

        registry.register(Box::new(reconciles.clone()))?;
        registry.register(Box::new(rollbacks.clone()))?;
        registry.register(Box::new(orphaned_records.clone()))?;
        registry.register(Box::new(retries.clone()))?;
        registry.register(Box::new(reconcile_duration.clone()))?;

        Ok(Arc::new(Self {
            registry,
            reconciles,
            rollbacks,
            orphaned_records,
            retries,
            reconcile_duration,
        }))
    }

    pub fn record_reconcile(&self, operation: &str, result: &str, elapsed_secs: f64) {
        self.reconciles
            .with_label_values(&[operation, result])
            .inc();
        self.reconcile_duration
            .with_label_values(&[operation])
            .observe(elapsed_secs);
    }

    pub fn record_rollback(&self, succeeded: bool) {
        let result = if succeeded { "ok" } else { "failed" };
        self.rollbacks.with_label_values(&[result]).inc();
    }

    pub fn record_orphaned_record(&self) {
        self.orphaned_records.inc();
    }

    pub fn record_retry(&self) {
        self.retries.inc();
    }

    pub fn reconciles(&self, operation: &str, result: &str) -> u64 {
        self.reconciles
            .with_label_values(&[operation, result])
            .get()
    }

    pub fn rollbacks(&self, succeeded: bool) -> u64 {
        let result = if succeeded { "ok" } else { "failed" };
        self.rollbacks.with_label_values(&[result]).get()
    }

    pub fn orphaned_records(&self) -> u64 {
        self.orphaned_records.get()
    }

    pub fn retries(&self) -> u64 {
        self.retries.get()
    }

    /// Render all metrics in the Prometheus text format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::error::Error::Internal(format!("metrics are not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_encoding() {
        let metrics = OperatorMetrics::new().unwrap();

        metrics.record_reconcile("present", "provisioned", 0.2);
        metrics.record_reconcile("present", "provisioned", 0.1);
        metrics.record_rollback(false);
        metrics.record_orphaned_record();

        assert_eq!(metrics.reconciles("present", "provisioned"), 2);
        assert_eq!(metrics.rollbacks(false), 1);
        assert_eq!(metrics.rollbacks(true), 0);
        assert_eq!(metrics.orphaned_records(), 1);

        let text = metrics.encode().unwrap();
        assert!(text.contains("volume_operator_reconciles_total"));
        assert!(text.contains("volume_operator_orphaned_records_total 1"));
    }

    #[test]
    fn test_instances_are_isolated() {
        let a = OperatorMetrics::new().unwrap();
        let b = OperatorMetrics::new().unwrap();
        a.record_retry();
        assert_eq!(a.retries(), 1);
        assert_eq!(b.retries(), 0);
    }
}
