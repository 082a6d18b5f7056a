//! Datastore Lifecycle
//!
//! Create, read, update, delete and import of VMFS datastores on top of a
//! [`DatastoreGateway`]. Each operation is a short sequence of remote calls:
//! - create provisions and reads back, rolling back on failure
//! - update checks policy, applies drift, then reads back
//! - delete converges removal and invisibility
//! - import validates the composite ID, then reads

pub mod convergence;
pub mod delete;
pub mod import;
pub mod planner;
pub mod provision;
pub mod reader;
pub mod update;

pub use convergence::{ConvergenceLoop, Observation, Phase, Step};
pub use delete::{DeletionConverger, DeletionReport};
pub use import::{parse_import_id, ImportResolver};
pub use planner::{CreateDiskSpec, DiskSpec, ExtendDiskSpec, ExtentPlanner};
pub use provision::ProvisioningPipeline;
pub use reader::ReconciliationReader;
pub use update::{diff_extents, plan_extents, ExtentDiff, UpdateDiffer, UpdateReport};

use crate::config::LifecycleConfig;
use crate::domain::model::{DatastoreConfig, DatastoreState};
use crate::domain::ports::{
    DatastoreGateway, DatastoreGatewayRef, DatastoreRef, GatewayResult, HostDatastoreSystem,
};
use crate::error::{Error, Result};
use crate::metrics::LifecycleMetrics;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

// =============================================================================
// Remote Call Helpers
// =============================================================================

/// Run a gateway call under `limit`, attaching operation and target to errors
pub(crate) async fn remote_call<T, F>(
    operation: &str,
    target: &str,
    limit: Duration,
    call: F,
) -> Result<T>
where
    F: Future<Output = GatewayResult<T>>,
{
    match timeout(limit, call).await {
        Ok(result) => result.map_err(|e| Error::remote(operation, target, e)),
        Err(_) => Err(Error::Timeout {
            operation: operation.to_string(),
            target: target.to_string(),
            duration: limit,
        }),
    }
}

/// Look up a datastore by ID
pub(crate) async fn find_datastore(
    gateway: &dyn DatastoreGateway,
    id: &str,
    limit: Duration,
) -> Result<DatastoreRef> {
    match timeout(limit, gateway.datastore_from_id(id)).await {
        Ok(result) => result.map_err(|source| Error::DatastoreLookup {
            id: id.to_string(),
            source,
        }),
        Err(_) => Err(Error::Timeout {
            operation: "find datastore".into(),
            target: id.to_string(),
            duration: limit,
        }),
    }
}

/// Load the storage management context of a host
pub(crate) async fn host_context(
    gateway: &dyn DatastoreGateway,
    host_id: &str,
    limit: Duration,
) -> Result<HostDatastoreSystem> {
    match timeout(limit, gateway.host_datastore_system(host_id)).await {
        Ok(result) => result.map_err(|source| Error::HostDatastoreSystem {
            host_id: host_id.to_string(),
            source,
        }),
        Err(_) => Err(Error::Timeout {
            operation: "load host datastore system".into(),
            target: host_id.to_string(),
            duration: limit,
        }),
    }
}

// =============================================================================
// Lifecycle Facade
// =============================================================================

/// Entry point for datastore lifecycle operations
pub struct DatastoreLifecycle {
    gateway: DatastoreGatewayRef,
    config: LifecycleConfig,
    metrics: LifecycleMetrics,
}

impl DatastoreLifecycle {
    pub fn new(
        gateway: DatastoreGatewayRef,
        config: LifecycleConfig,
        metrics: LifecycleMetrics,
    ) -> Self {
        Self {
            gateway,
            config,
            metrics,
        }
    }

    /// Create a lifecycle with default configuration and fresh metrics
    pub fn with_defaults(gateway: DatastoreGatewayRef) -> Result<Self> {
        Ok(Self::new(
            gateway,
            LifecycleConfig::default(),
            LifecycleMetrics::new()?,
        ))
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn metrics(&self) -> &LifecycleMetrics {
        &self.metrics
    }

    /// Provision a new datastore and return its observed state
    pub async fn create(&self, config: &DatastoreConfig) -> Result<DatastoreState> {
        let result = self.create_inner(config).await;
        self.finish("create", result)
    }

    /// Observe an existing datastore
    pub async fn read(&self, id: &str, host_system_id: &str) -> Result<DatastoreState> {
        let result = self.read_inner(id, host_system_id).await;
        self.finish("read", result)
    }

    /// Reconcile a datastore from its last observed state to `desired`
    pub async fn update(
        &self,
        prior: &DatastoreState,
        desired: &DatastoreConfig,
    ) -> Result<DatastoreState> {
        let result = self.update_inner(prior, desired).await;
        self.finish("update", result)
    }

    /// Remove a datastore and wait until it is gone
    pub async fn delete(&self, id: &str, host_system_id: &str) -> Result<DeletionReport> {
        let result = self.delete_inner(id, host_system_id).await;
        self.finish("delete", result)
    }

    /// Adopt an existing datastore from a `DATASTOREID:HOSTID` ID
    pub async fn import(&self, composite_id: &str) -> Result<DatastoreState> {
        let result = self.import_inner(composite_id).await;
        self.finish("import", result)
    }

    async fn create_inner(&self, config: &DatastoreConfig) -> Result<DatastoreState> {
        config.validate()?;
        let api_timeout = self.config.api_timeout();
        let gateway = &*self.gateway;

        let dss = host_context(gateway, &config.host_system_id, api_timeout).await?;
        let (datastore, observation) =
            ProvisioningPipeline::new(gateway, api_timeout, &self.metrics)
                .provision(&dss, config)
                .await?;

        Ok(DatastoreState::from_observation(
            datastore.id,
            &config.host_system_id,
            observation,
        ))
    }

    async fn read_inner(&self, id: &str, host_system_id: &str) -> Result<DatastoreState> {
        let observation = ReconciliationReader::new(&*self.gateway, self.config.api_timeout())
            .read(id)
            .await?;
        Ok(DatastoreState::from_observation(id, host_system_id, observation))
    }

    async fn update_inner(
        &self,
        prior: &DatastoreState,
        desired: &DatastoreConfig,
    ) -> Result<DatastoreState> {
        desired.validate()?;
        if desired.host_system_id != prior.host_system_id {
            return Err(Error::ImmutableField {
                field: "host_system_id".into(),
                from: prior.host_system_id.clone(),
                to: desired.host_system_id.clone(),
            });
        }
        plan_extents(prior, desired)?;

        let api_timeout = self.config.api_timeout();
        let gateway = &*self.gateway;
        let dss = host_context(gateway, &prior.host_system_id, api_timeout).await?;
        let datastore = find_datastore(gateway, &prior.id, api_timeout).await?;

        let report = UpdateDiffer::new(gateway, api_timeout)
            .apply(&dss, &datastore, prior, desired)
            .await?;
        if report.changed() {
            info!(id = %prior.id, ?report, "Datastore updated");
        }

        self.read_inner(&prior.id, &prior.host_system_id).await
    }

    async fn delete_inner(&self, id: &str, host_system_id: &str) -> Result<DeletionReport> {
        let api_timeout = self.config.api_timeout();
        let gateway = &*self.gateway;

        let dss = host_context(gateway, host_system_id, api_timeout).await?;
        let datastore = find_datastore(gateway, id, api_timeout).await?;

        DeletionConverger::new(gateway, &self.config, &self.metrics)
            .converge(&dss, &datastore)
            .await
    }

    async fn import_inner(&self, composite_id: &str) -> Result<DatastoreState> {
        let import = ImportResolver::new(&*self.gateway, self.config.api_timeout())
            .resolve(composite_id)
            .await?;
        self.read_inner(&import.id, &import.host_system_id).await
    }

    fn finish<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        self.metrics.record_operation(operation, &result);
        if let Err(e) = &result {
            warn!(operation, class = ?e.class(), error = %e, "Datastore operation failed");
        }
        result
    }
}
