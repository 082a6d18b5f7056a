//! Extent Planner
//!
//! Resolves a disk canonical name against the host's reported disks and turns
//! it into a create or extend spec. Only read calls are made.

use super::remote_call;
use crate::domain::ports::{
    DatastoreGateway, DatastoreRef, HostDatastoreSystem, HostDisk, ScsiDiskType, VmfsCreateSpec,
    VmfsExtendSpec,
};
use crate::error::{Error, Result};
use std::time::Duration;
use tracing::debug;

/// A disk together with the spec derived for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSpec<S> {
    pub disk: String,
    pub spec: S,
}

pub type CreateDiskSpec = DiskSpec<VmfsCreateSpec>;
pub type ExtendDiskSpec = DiskSpec<VmfsExtendSpec>;

/// Builds VMFS create/extend specs for disks on one host
pub struct ExtentPlanner<'a> {
    gateway: &'a dyn DatastoreGateway,
    api_timeout: Duration,
}

impl<'a> ExtentPlanner<'a> {
    pub fn new(gateway: &'a dyn DatastoreGateway, api_timeout: Duration) -> Self {
        Self {
            gateway,
            api_timeout,
        }
    }

    /// Spec for creating a new datastore on `disk`
    pub async fn disk_spec_for_create(
        &self,
        dss: &HostDatastoreSystem,
        disk: &str,
    ) -> Result<CreateDiskSpec> {
        let candidate = self.find_disk(dss, None, disk).await?;
        let options = remote_call(
            "query VMFS create options",
            disk,
            self.api_timeout,
            self.gateway.create_options(dss, &candidate.device_path),
        )
        .await?;

        let spec = options
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoDiskOptions {
                disk: disk.to_string(),
                operation: "create".into(),
            })?;

        debug!(disk, device = %candidate.device_path, "Resolved create spec");
        Ok(DiskSpec {
            disk: disk.to_string(),
            spec,
        })
    }

    /// Spec for adding `disk` as an extent of `datastore`
    pub async fn disk_spec_for_extend(
        &self,
        dss: &HostDatastoreSystem,
        datastore: &DatastoreRef,
        disk: &str,
    ) -> Result<ExtendDiskSpec> {
        let candidate = self.find_disk(dss, Some(datastore), disk).await?;
        let options = remote_call(
            "query VMFS extend options",
            disk,
            self.api_timeout,
            self.gateway.extend_options(dss, datastore, &candidate.device_path),
        )
        .await?;

        let spec = options
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoDiskOptions {
                disk: disk.to_string(),
                operation: "extend".into(),
            })?;

        debug!(disk, datastore = %datastore.id, "Resolved extend spec");
        Ok(DiskSpec {
            disk: disk.to_string(),
            spec,
        })
    }

    async fn find_disk(
        &self,
        dss: &HostDatastoreSystem,
        datastore: Option<&DatastoreRef>,
        disk: &str,
    ) -> Result<HostDisk> {
        let disks = remote_call(
            "query available disks",
            &dss.host_id,
            self.api_timeout,
            self.gateway.available_disks(dss, datastore),
        )
        .await?;

        let candidate = disks
            .into_iter()
            .find(|d| d.canonical_name == disk)
            .ok_or_else(|| Error::DiskNotFound {
                disk: disk.to_string(),
            })?;

        if candidate.in_use {
            return Err(Error::DiskUnsuitable {
                disk: disk.to_string(),
                reason: "disk is already in use".into(),
            });
        }
        if candidate.disk_type == ScsiDiskType::Unknown {
            return Err(Error::DiskUnsuitable {
                disk: disk.to_string(),
                reason: format!("unsupported disk type {}", candidate.disk_type),
            });
        }

        Ok(candidate)
    }
}
