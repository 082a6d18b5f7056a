//! Deletion Converger
//!
//! Removing a datastore runs two bounded loops in sequence:
//! - retry the removal while the datastore is reported busy
//! - poll by ID until the removed datastore is no longer visible
//!
//! Deletion only succeeds once both loops complete.

use super::convergence::{ConvergenceLoop, Observation};
use super::remote_call;
use crate::config::LifecycleConfig;
use crate::domain::ports::{DatastoreGateway, DatastoreRef, HostDatastoreSystem};
use crate::error::{Error, RemoteErrorKind, Result};
use crate::metrics::LifecycleMetrics;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Attempts made by each deletion loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionReport {
    pub remove_attempts: u32,
    pub wait_attempts: u32,
}

pub struct DeletionConverger<'a> {
    gateway: &'a dyn DatastoreGateway,
    config: &'a LifecycleConfig,
    metrics: &'a LifecycleMetrics,
}

impl<'a> DeletionConverger<'a> {
    pub fn new(
        gateway: &'a dyn DatastoreGateway,
        config: &'a LifecycleConfig,
        metrics: &'a LifecycleMetrics,
    ) -> Self {
        Self {
            gateway,
            config,
            metrics,
        }
    }

    /// Remove the datastore and wait until it is gone
    pub async fn converge(
        &self,
        dss: &HostDatastoreSystem,
        datastore: &DatastoreRef,
    ) -> Result<DeletionReport> {
        let remove_attempts = self
            .retry_remove(dss, datastore)
            .await
            .map_err(|e| Error::Delete {
                id: datastore.id.clone(),
                source: Box::new(e),
            })?;
        info!(id = %datastore.id, attempts = remove_attempts, "Datastore removal accepted");

        let wait_attempts = self
            .wait_for_removal(&datastore.id)
            .await
            .map_err(|e| Error::DeleteWait {
                id: datastore.id.clone(),
                source: Box::new(e),
            })?;
        info!(id = %datastore.id, attempts = wait_attempts, "Datastore no longer visible");

        Ok(DeletionReport {
            remove_attempts,
            wait_attempts,
        })
    }

    async fn retry_remove(
        &self,
        dss: &HostDatastoreSystem,
        datastore: &DatastoreRef,
    ) -> Result<u32> {
        let gateway = self.gateway;
        let metrics = self.metrics;
        let api_timeout = self.config.api_timeout();

        ConvergenceLoop::new("remove datastore", &self.config.delete_retry, Instant::now())
            .run(|| async move {
                metrics.record_delete_attempt("remove");
                match remote_call(
                    "remove datastore",
                    &datastore.id,
                    api_timeout,
                    gateway.remove_datastore(dss, datastore),
                )
                .await
                {
                    Ok(()) => Observation::Completed,
                    Err(e) if e.is_resource_in_use() => {
                        debug!(id = %datastore.id, error = %e, "Datastore busy, retrying removal");
                        Observation::Pending
                    }
                    Err(e) => Observation::Failed(e),
                }
            })
            .await
    }

    async fn wait_for_removal(&self, id: &str) -> Result<u32> {
        let gateway = self.gateway;
        let metrics = self.metrics;
        let probe_timeout = self.config.probe_timeout();

        ConvergenceLoop::new(
            "wait for datastore removal",
            &self.config.delete_wait,
            Instant::now(),
        )
        .run(|| async move {
            metrics.record_delete_attempt("wait");
            match tokio::time::timeout(probe_timeout, gateway.datastore_from_id(id)).await {
                Err(_) => {
                    warn!(id, timeout = ?probe_timeout, "Visibility probe got no answer");
                    Observation::Unobserved
                }
                Ok(Err(e)) if e.kind == RemoteErrorKind::NotFound => Observation::Completed,
                Ok(Err(e)) => Observation::Failed(Error::DatastoreLookup {
                    id: id.to_string(),
                    source: e,
                }),
                Ok(Ok(_)) => Observation::Pending,
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConvergenceSettings;
    use crate::gateway::{GatewayOp, InMemoryGateway, LabDatastore};
    use assert_matches::assert_matches;
    use std::time::Duration;

    fn lab() -> InMemoryGateway {
        let gw = InMemoryGateway::new("dc-a");
        gw.add_host("host-9");
        gw.add_datastore(LabDatastore {
            id: "datastore-1".into(),
            name: "ds1".into(),
            folder: String::new(),
            fs_type: "VMFS".into(),
            extents: vec!["naa.1".into()],
            host_mounts: vec!["host-9".into()],
            capacity_bytes: 0,
        });
        gw
    }

    async fn delete(
        gw: &InMemoryGateway,
        config: &LifecycleConfig,
        metrics: &LifecycleMetrics,
    ) -> Result<DeletionReport> {
        let dss = gw.host_datastore_system("host-9").await.unwrap();
        let ds = gw.datastore_from_id("datastore-1").await.unwrap();
        gw.reset_calls();
        DeletionConverger::new(gw, config, metrics)
            .converge(&dss, &ds)
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_then_lingering_converges() {
        let gw = lab();
        gw.inject_fault(GatewayOp::RemoveDatastore, RemoteErrorKind::ResourceInUse, 2);
        gw.linger_after_remove(2);
        let config = LifecycleConfig::default();
        let metrics = LifecycleMetrics::new().unwrap();

        let start = Instant::now();
        let report = delete(&gw, &config, &metrics).await.unwrap();

        assert_eq!(
            report,
            DeletionReport {
                remove_attempts: 3,
                wait_attempts: 3
            }
        );
        // remove: 2s delay + two 2s retries; wait: 1s delay + two 2s polls
        assert!(start.elapsed() <= Duration::from_secs(11));
        assert_eq!(gw.datastore_count(), 0);
        assert_eq!(metrics.delete_attempt_count("remove"), 3);
        assert_eq!(metrics.delete_attempt_count("wait"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_busy_times_out_at_budget() {
        let gw = lab();
        gw.inject_persistent_fault(GatewayOp::RemoveDatastore, RemoteErrorKind::ResourceInUse);
        let config = LifecycleConfig::default();
        let metrics = LifecycleMetrics::new().unwrap();

        let start = Instant::now();
        let err = delete(&gw, &config, &metrics).await.unwrap_err();

        assert_matches!(&err, Error::Delete { source, .. }
            if matches!(**source, Error::ConvergenceTimeout { .. }));
        assert_eq!(start.elapsed(), config.delete_retry.timeout());
        assert_eq!(gw.datastore_count(), 1);
        assert_eq!(gw.call_count(GatewayOp::DatastoreFromId), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_removal_error_stops_immediately() {
        let gw = lab();
        gw.inject_fault(GatewayOp::RemoveDatastore, RemoteErrorKind::Other, 1);
        let config = LifecycleConfig::default();
        let metrics = LifecycleMetrics::new().unwrap();

        let err = delete(&gw, &config, &metrics).await.unwrap_err();

        assert_matches!(&err, Error::Delete { source, .. }
            if matches!(**source, Error::Remote { .. }));
        assert!(err.to_string().contains("could not delete datastore \"datastore-1\""));
        assert_eq!(gw.call_count(GatewayOp::RemoveDatastore), 1);
        assert_eq!(gw.call_count(GatewayOp::DatastoreFromId), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_still_visible_times_out_wait_loop() {
        let gw = lab();
        gw.linger_after_remove(u32::MAX);
        let config = LifecycleConfig {
            delete_wait: ConvergenceSettings {
                timeout_secs: 20,
                min_interval_secs: 2,
                delay_secs: 1,
                not_found_checks: 35,
            },
            ..Default::default()
        };
        let metrics = LifecycleMetrics::new().unwrap();

        let start = Instant::now();
        let err = delete(&gw, &config, &metrics).await.unwrap_err();

        assert_matches!(&err, Error::DeleteWait { source, .. }
            if matches!(**source, Error::ConvergenceTimeout { .. }));
        // 2s removal delay plus the full wait budget
        assert_eq!(start.elapsed(), Duration::from_secs(22));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_fails_wait_loop() {
        let gw = lab();
        gw.inject_fault(GatewayOp::DatastoreFromId, RemoteErrorKind::Other, 1);
        let config = LifecycleConfig::default();
        let metrics = LifecycleMetrics::new().unwrap();

        let dss = gw.host_datastore_system("host-9").await.unwrap();
        let ds = DatastoreRef {
            id: "datastore-1".into(),
            inventory_path: "/dc-a/datastore/ds1".into(),
        };
        let err = DeletionConverger::new(&gw, &config, &metrics)
            .converge(&dss, &ds)
            .await
            .unwrap_err();

        assert_matches!(&err, Error::DeleteWait { source, .. }
            if matches!(**source, Error::DatastoreLookup { .. }));
        assert_eq!(gw.datastore_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_probes_are_bounded() {
        let gw = lab();
        gw.set_latency(GatewayOp::DatastoreFromId, Duration::from_secs(60));
        let config = LifecycleConfig {
            probe_timeout_secs: 5,
            delete_wait: ConvergenceSettings {
                timeout_secs: 300,
                min_interval_secs: 2,
                delay_secs: 1,
                not_found_checks: 2,
            },
            ..Default::default()
        };
        let metrics = LifecycleMetrics::new().unwrap();

        let dss = gw.host_datastore_system("host-9").await.unwrap();
        let ds = DatastoreRef {
            id: "datastore-1".into(),
            inventory_path: "/dc-a/datastore/ds1".into(),
        };
        let err = DeletionConverger::new(&gw, &config, &metrics)
            .converge(&dss, &ds)
            .await
            .unwrap_err();

        assert_matches!(&err, Error::DeleteWait { source, .. }
            if matches!(**source, Error::ConvergenceUnobserved { checks: 3, .. }));
        assert_eq!(metrics.delete_attempt_count("wait"), 3);
    }
}
