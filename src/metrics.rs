//! Lifecycle Metrics
//!
//! Prometheus counters for datastore operations. Each lifecycle owns its own
//! registry so independent instances (and tests) never share counters.

use crate::error::{Error, Result};
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters recorded by the datastore lifecycle
#[derive(Clone)]
pub struct LifecycleMetrics {
    registry: Registry,
    operations: IntCounterVec,
    rollbacks: IntCounterVec,
    delete_attempts: IntCounterVec,
}

impl LifecycleMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let operations = IntCounterVec::new(
            Opts::new(
                "datastore_operations_total",
                "Datastore lifecycle operations by outcome",
            ),
            &["operation", "outcome"],
        )
        .map_err(metrics_error)?;

        let rollbacks = IntCounterVec::new(
            Opts::new(
                "datastore_rollbacks_total",
                "Compensating removals attempted during creation",
            ),
            &["outcome"],
        )
        .map_err(metrics_error)?;

        let delete_attempts = IntCounterVec::new(
            Opts::new(
                "datastore_delete_attempts_total",
                "Attempts made by the deletion convergence loops",
            ),
            &["phase"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(operations.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(rollbacks.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(delete_attempts.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            operations,
            rollbacks,
            delete_attempts,
        })
    }

    /// Record the outcome of a lifecycle operation
    pub fn record_operation<T>(&self, operation: &str, result: &Result<T>) {
        let outcome = match result {
            Ok(_) => "success",
            Err(e) if e.requires_manual_cleanup() => "dangling",
            Err(_) => "error",
        };
        self.operations
            .with_label_values(&[operation, outcome])
            .inc();
    }

    /// Record a compensating removal; `removed` is false when it failed
    pub fn record_rollback(&self, removed: bool) {
        let outcome = if removed { "rolled_back" } else { "dangling" };
        self.rollbacks.with_label_values(&[outcome]).inc();
    }

    /// Record one attempt of a deletion loop
    pub fn record_delete_attempt(&self, phase: &str) {
        self.delete_attempts.with_label_values(&[phase]).inc();
    }

    pub fn operation_count(&self, operation: &str, outcome: &str) -> u64 {
        self.operations
            .with_label_values(&[operation, outcome])
            .get()
    }

    pub fn rollback_count(&self, outcome: &str) -> u64 {
        self.rollbacks.with_label_values(&[outcome]).get()
    }

    pub fn delete_attempt_count(&self, phase: &str) -> u64 {
        self.delete_attempts.with_label_values(&[phase]).get()
    }

    /// Render all counters in the Prometheus text format
    pub fn gather_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(format!("metrics encoding: {}", e)))
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_gather() {
        let metrics = LifecycleMetrics::new().unwrap();

        metrics.record_operation::<()>("create", &Ok(()));
        metrics.record_operation::<()>(
            "create",
            &Err(Error::Validation("name must not be empty".into())),
        );
        metrics.record_rollback(true);
        metrics.record_delete_attempt("remove");
        metrics.record_delete_attempt("remove");

        assert_eq!(metrics.operation_count("create", "success"), 1);
        assert_eq!(metrics.operation_count("create", "error"), 1);
        assert_eq!(metrics.rollback_count("rolled_back"), 1);
        assert_eq!(metrics.delete_attempt_count("remove"), 2);

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("datastore_operations_total"));
        assert!(text.contains("datastore_delete_attempts_total{phase=\"remove\"} 2"));
    }

    #[test]
    fn test_instances_are_independent() {
        let a = LifecycleMetrics::new().unwrap();
        let b = LifecycleMetrics::new().unwrap();
        a.record_rollback(false);
        assert_eq!(a.rollback_count("dangling"), 1);
        assert_eq!(b.rollback_count("dangling"), 0);
    }
}
