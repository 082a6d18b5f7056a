//! Provisioning Pipeline
//!
//! Creates a datastore on its first disk, moves it into its folder and adds
//! the remaining disks one by one, then reads the result back. Once the
//! datastore exists, any failing step triggers exactly one compensating
//! removal. If that removal fails too, the caller gets a dangling-resource
//! error carrying both failures.

use super::planner::ExtentPlanner;
use super::reader::ReconciliationReader;
use super::remote_call;
use crate::domain::folder::path_is_empty;
use crate::domain::model::{DatastoreConfig, DatastoreObservation};
use crate::domain::ports::{DatastoreGateway, DatastoreRef, HostDatastoreSystem};
use crate::error::{Error, ProvisioningFailure, Result};
use crate::metrics::LifecycleMetrics;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct ProvisioningPipeline<'a> {
    gateway: &'a dyn DatastoreGateway,
    api_timeout: Duration,
    metrics: &'a LifecycleMetrics,
}

impl<'a> ProvisioningPipeline<'a> {
    pub fn new(
        gateway: &'a dyn DatastoreGateway,
        api_timeout: Duration,
        metrics: &'a LifecycleMetrics,
    ) -> Self {
        Self {
            gateway,
            api_timeout,
            metrics,
        }
    }

    /// Run the pipeline and return the created datastore with its observed state
    pub async fn provision(
        &self,
        dss: &HostDatastoreSystem,
        config: &DatastoreConfig,
    ) -> Result<(DatastoreRef, DatastoreObservation)> {
        let planner = ExtentPlanner::new(self.gateway, self.api_timeout);
        let (first, rest) = config
            .disks
            .split_first()
            .ok_or_else(|| Error::Validation("disks must contain at least one disk".into()))?;

        // Nothing exists remotely until the create call succeeds
        let mut create = planner.disk_spec_for_create(dss, first).await?;
        create.spec.volume_name = config.name.clone();
        let datastore = remote_call(
            "create VMFS datastore",
            first,
            self.api_timeout,
            self.gateway.create_vmfs_datastore(dss, create.spec),
        )
        .await
        .map_err(|e| Error::Create {
            disk: first.clone(),
            source: Box::new(e),
        })?;

        info!(id = %datastore.id, name = %config.name, disk = %first, "Created datastore");

        let folder = config.normalized_folder();
        if !path_is_empty(&folder) {
            if let Err(e) = remote_call(
                "move datastore to folder",
                &folder,
                self.api_timeout,
                self.gateway.move_datastore_to_folder(&datastore, &folder),
            )
            .await
            {
                let failure = ProvisioningFailure::MoveToFolder {
                    folder,
                    source: Box::new(e),
                };
                return Err(self.compensate(dss, &datastore, failure).await);
            }
            info!(id = %datastore.id, %folder, "Moved datastore to folder");
        }

        for disk in rest {
            let extend = match planner.disk_spec_for_extend(dss, &datastore, disk).await {
                Ok(extend) => extend,
                Err(e) => {
                    let failure = ProvisioningFailure::ExtendSpec {
                        disk: disk.clone(),
                        source: Box::new(e),
                    };
                    return Err(self.compensate(dss, &datastore, failure).await);
                }
            };

            if let Err(e) = remote_call(
                "extend VMFS datastore",
                disk,
                self.api_timeout,
                self.gateway.extend_vmfs_datastore(dss, &datastore, extend.spec),
            )
            .await
            {
                let failure = ProvisioningFailure::Extend {
                    disk: disk.clone(),
                    source: Box::new(e),
                };
                return Err(self.compensate(dss, &datastore, failure).await);
            }
            info!(id = %datastore.id, disk = %disk, "Extended datastore");
        }

        // Re-read by ID, the inventory path changes after a move
        let observation = match ReconciliationReader::new(self.gateway, self.api_timeout)
            .read(&datastore.id)
            .await
        {
            Ok(observation) => observation,
            Err(e) => {
                let failure = ProvisioningFailure::Properties {
                    source: Box::new(e),
                };
                return Err(self.compensate(dss, &datastore, failure).await);
            }
        };

        Ok((datastore, observation))
    }

    /// Remove the partially provisioned datastore and build the caller-facing error
    async fn compensate(
        &self,
        dss: &HostDatastoreSystem,
        datastore: &DatastoreRef,
        failure: ProvisioningFailure,
    ) -> Error {
        warn!(
            id = %datastore.id,
            error = %failure,
            "Provisioning step failed, removing created datastore"
        );

        match remote_call(
            "remove datastore",
            &datastore.id,
            self.api_timeout,
            self.gateway.remove_datastore(dss, datastore),
        )
        .await
        {
            Ok(()) => {
                self.metrics.record_rollback(true);
                info!(id = %datastore.id, "Rolled back created datastore");
                Error::Provisioning {
                    datastore_id: datastore.id.clone(),
                    failure,
                }
            }
            Err(removal) => {
                self.metrics.record_rollback(false);
                error!(
                    id = %datastore.id,
                    error = %removal,
                    "Rollback failed, datastore must be removed manually"
                );
                Error::DanglingResource {
                    datastore_id: datastore.id.clone(),
                    failure,
                    removal: Box::new(removal),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorClass, RemoteErrorKind};
    use crate::gateway::{GatewayOp, InMemoryGateway};
    use assert_matches::assert_matches;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn lab() -> InMemoryGateway {
        let gw = InMemoryGateway::new("dc-a");
        gw.add_host("host-9");
        gw.add_disk("host-9", "disk-a", 100);
        gw.add_disk("host-9", "disk-b", 100);
        gw.add_disk("host-9", "disk-c", 100);
        gw.add_folder("dc1/ds-folder");
        gw
    }

    fn config(disks: &[&str], folder: Option<&str>) -> DatastoreConfig {
        DatastoreConfig {
            name: "ds1".into(),
            host_system_id: "host-9".into(),
            folder: folder.map(String::from),
            disks: disks.iter().map(|d| d.to_string()).collect(),
        }
    }

    async fn run(
        gw: &InMemoryGateway,
        metrics: &LifecycleMetrics,
        cfg: &DatastoreConfig,
    ) -> Result<DatastoreRef> {
        let dss = gw.host_datastore_system("host-9").await.unwrap();
        ProvisioningPipeline::new(gw, TIMEOUT, metrics)
            .provision(&dss, cfg)
            .await
            .map(|(datastore, _)| datastore)
    }

    #[tokio::test]
    async fn test_provision_all_disks_in_order() {
        let gw = lab();
        let metrics = LifecycleMetrics::new().unwrap();
        let desired = config(&["disk-a", "disk-b", "disk-c"], Some("/dc1/ds-folder"));
        let ds = run(&gw, &metrics, &desired).await.unwrap();

        let stored = gw.datastore(&ds.id).unwrap();
        assert_eq!(stored.extents, vec!["disk-a", "disk-b", "disk-c"]);
        assert_eq!(stored.folder, "dc1/ds-folder");
        assert_eq!(gw.call_count(GatewayOp::ExtendDatastore), 2);
        assert_eq!(gw.call_count(GatewayOp::RemoveDatastore), 0);
    }

    #[tokio::test]
    async fn test_create_failure_is_clean() {
        let gw = lab();
        gw.inject_fault(GatewayOp::CreateDatastore, RemoteErrorKind::Other, 1);
        let metrics = LifecycleMetrics::new().unwrap();

        let err = run(&gw, &metrics, &config(&["disk-a", "disk-b"], None))
            .await
            .unwrap_err();

        assert_matches!(&err, Error::Create { disk, .. } if disk == "disk-a");
        assert_eq!(gw.call_count(GatewayOp::RemoveDatastore), 0);
        assert_eq!(gw.datastore_count(), 0);
    }

    #[tokio::test]
    async fn test_folder_failure_rolls_back() {
        let gw = lab();
        let metrics = LifecycleMetrics::new().unwrap();

        let err = run(&gw, &metrics, &config(&["disk-a"], Some("missing/folder")))
            .await
            .unwrap_err();

        assert_matches!(
            &err,
            Error::Provisioning { failure: ProvisioningFailure::MoveToFolder { folder, .. }, .. }
                if folder == "missing/folder"
        );
        assert!(err.to_string().contains("could not move datastore to folder"));
        assert_eq!(gw.datastore_count(), 0);
        assert_eq!(gw.call_count(GatewayOp::RemoveDatastore), 1);
        assert_eq!(metrics.rollback_count("rolled_back"), 1);
    }

    #[tokio::test]
    async fn test_folder_failure_with_failed_rollback_is_dangling() {
        let gw = lab();
        gw.inject_fault(GatewayOp::RemoveDatastore, RemoteErrorKind::Other, 1);
        let metrics = LifecycleMetrics::new().unwrap();

        let err = run(&gw, &metrics, &config(&["disk-a"], Some("missing/folder")))
            .await
            .unwrap_err();

        assert_eq!(err.class(), ErrorClass::DanglingResource);
        let text = err.to_string();
        assert!(text.contains("folder \"missing/folder\" not found"));
        assert!(text.contains("injected other fault in remove_datastore"));
        assert!(text.contains("manually"));
        assert_eq!(gw.datastore_count(), 1);
        assert_eq!(gw.call_count(GatewayOp::RemoveDatastore), 1);
        assert_eq!(metrics.rollback_count("dangling"), 1);
    }

    #[tokio::test]
    async fn test_extend_failure_rolls_back_once() {
        let gw = lab();
        gw.inject_fault(GatewayOp::ExtendDatastore, RemoteErrorKind::Other, 1);
        let metrics = LifecycleMetrics::new().unwrap();

        let err = run(&gw, &metrics, &config(&["disk-a", "disk-b", "disk-c"], None))
            .await
            .unwrap_err();

        assert_matches!(
            &err,
            Error::Provisioning { failure: ProvisioningFailure::Extend { disk, .. }, .. }
                if disk == "disk-b"
        );
        assert_eq!(gw.datastore_count(), 0);
        assert_eq!(gw.call_count(GatewayOp::RemoveDatastore), 1);
        // Remaining disks are never attempted
        assert_eq!(gw.call_count(GatewayOp::ExtendDatastore), 1);
    }

    #[tokio::test]
    async fn test_extend_spec_failure_with_failed_rollback_is_dangling() {
        let gw = lab();
        gw.inject_persistent_fault(GatewayOp::RemoveDatastore, RemoteErrorKind::ResourceInUse);
        let metrics = LifecycleMetrics::new().unwrap();

        let err = run(&gw, &metrics, &config(&["disk-a", "disk-unknown"], None))
            .await
            .unwrap_err();

        assert!(err.requires_manual_cleanup());
        let text = err.to_string();
        assert!(text.contains("disk \"disk-unknown\""));
        assert!(text.contains("resource_in_use"));
        // Rollback is attempted exactly once, even for a busy datastore
        assert_eq!(gw.call_count(GatewayOp::RemoveDatastore), 1);
    }

    #[tokio::test]
    async fn test_read_back_failure_rolls_back() {
        let gw = lab();
        gw.inject_fault(GatewayOp::DatastoreProperties, RemoteErrorKind::Other, 1);
        let metrics = LifecycleMetrics::new().unwrap();

        let err = run(&gw, &metrics, &config(&["disk-a"], None))
            .await
            .unwrap_err();

        assert_matches!(
            &err,
            Error::Provisioning { failure: ProvisioningFailure::Properties { .. }, datastore_id }
                if datastore_id == "datastore-1"
        );
        assert_eq!(gw.datastore_count(), 0);
        assert_eq!(gw.call_count(GatewayOp::RemoveDatastore), 1);
        assert_eq!(metrics.rollback_count("rolled_back"), 1);
    }

    #[tokio::test]
    async fn test_read_back_failure_with_failed_rollback_is_dangling() {
        let gw = lab();
        gw.inject_fault(GatewayOp::DatastoreProperties, RemoteErrorKind::Other, 1);
        gw.inject_fault(GatewayOp::RemoveDatastore, RemoteErrorKind::Other, 1);
        let metrics = LifecycleMetrics::new().unwrap();

        let err = run(&gw, &metrics, &config(&["disk-a"], None))
            .await
            .unwrap_err();

        assert!(err.requires_manual_cleanup());
        let text = err.to_string();
        assert!(text.contains("there was an error fetching its properties"));
        assert!(text.contains("injected other fault in datastore_properties"));
        assert!(text.contains("\"datastore-1\""));
        assert_eq!(gw.datastore_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_timeout_leaves_nothing() {
        let gw = lab();
        gw.set_latency(GatewayOp::CreateDatastore, TIMEOUT * 2);
        let metrics = LifecycleMetrics::new().unwrap();

        let err = run(&gw, &metrics, &config(&["disk-a", "disk-b"], None))
            .await
            .unwrap_err();

        assert_matches!(&err, Error::Create { source, .. }
            if matches!(**source, Error::Timeout { .. }));
        assert_eq!(err.class(), ErrorClass::Timeout);
        assert_eq!(gw.call_count(GatewayOp::RemoveDatastore), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_timeout_rolls_back_once() {
        let gw = lab();
        gw.set_latency(GatewayOp::ExtendDatastore, TIMEOUT * 2);
        let metrics = LifecycleMetrics::new().unwrap();

        let err = run(&gw, &metrics, &config(&["disk-a", "disk-b", "disk-c"], None))
            .await
            .unwrap_err();

        assert_matches!(
            &err,
            Error::Provisioning { failure: ProvisioningFailure::Extend { disk, .. }, .. }
                if disk == "disk-b"
        );
        assert_eq!(err.class(), ErrorClass::Timeout);
        assert!(err.to_string().contains("timed out after 5s"));
        assert_eq!(gw.call_count(GatewayOp::RemoveDatastore), 1);
        assert_eq!(gw.datastore_count(), 0);
    }
}
