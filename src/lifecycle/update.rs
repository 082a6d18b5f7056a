//! Update Differ
//!
//! Reconciles name, folder and extents of an existing datastore. Extents can
//! only grow: a desired list that drops a previously observed disk is
//! rejected before anything is sent to the remote system. Added disks are
//! extended in desired order and a failure is not rolled back.

use super::planner::ExtentPlanner;
use super::remote_call;
use crate::domain::folder::normalize_folder_path;
use crate::domain::model::{DatastoreConfig, DatastoreState};
use crate::domain::ports::{DatastoreGateway, DatastoreRef, HostDatastoreSystem};
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

/// Difference between observed and desired extent lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtentDiff {
    /// Desired disks not yet observed, in desired order
    pub added: Vec<String>,
    /// Observed disks missing from the desired list, in observed order
    pub removed: Vec<String>,
}

impl ExtentDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compute which disks were added to or removed from the extent list
pub fn diff_extents(observed: &[String], desired: &[String]) -> ExtentDiff {
    let observed_set: HashSet<&str> = observed.iter().map(String::as_str).collect();
    let desired_set: HashSet<&str> = desired.iter().map(String::as_str).collect();

    let mut seen = HashSet::new();
    let mut added = Vec::new();
    for disk in desired {
        if !observed_set.contains(disk.as_str()) && seen.insert(disk.as_str()) {
            added.push(disk.clone());
        }
    }
    let removed = observed
        .iter()
        .filter(|d| !desired_set.contains(d.as_str()))
        .cloned()
        .collect();

    ExtentDiff { added, removed }
}

/// Diff the extents and reject any disk removal
pub fn plan_extents(prior: &DatastoreState, desired: &DatastoreConfig) -> Result<ExtentDiff> {
    let diff = diff_extents(&prior.disks, &desired.disks);
    match diff.removed.first() {
        Some(disk) => Err(Error::DiskRemovalNotSupported { disk: disk.clone() }),
        None => Ok(diff),
    }
}

/// Summary of the remote changes an update made
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub renamed: bool,
    pub moved: bool,
    pub extended: Vec<String>,
}

impl UpdateReport {
    pub fn changed(&self) -> bool {
        self.renamed || self.moved || !self.extended.is_empty()
    }
}

pub struct UpdateDiffer<'a> {
    gateway: &'a dyn DatastoreGateway,
    api_timeout: Duration,
}

impl<'a> UpdateDiffer<'a> {
    pub fn new(gateway: &'a dyn DatastoreGateway, api_timeout: Duration) -> Self {
        Self {
            gateway,
            api_timeout,
        }
    }

    /// Bring `datastore` from the `prior` observed state to `desired`
    pub async fn apply(
        &self,
        dss: &HostDatastoreSystem,
        datastore: &DatastoreRef,
        prior: &DatastoreState,
        desired: &DatastoreConfig,
    ) -> Result<UpdateReport> {
        let diff = plan_extents(prior, desired)?;
        let mut report = UpdateReport::default();

        if desired.name != prior.name {
            remote_call(
                "rename datastore",
                &datastore.id,
                self.api_timeout,
                self.gateway.rename_datastore(datastore, &desired.name),
            )
            .await?;
            info!(id = %datastore.id, from = %prior.name, to = %desired.name, "Renamed datastore");
            report.renamed = true;
        }

        let folder = desired.normalized_folder();
        if folder != normalize_folder_path(&prior.folder) {
            remote_call(
                "move datastore to folder",
                &folder,
                self.api_timeout,
                self.gateway.move_datastore_to_folder(datastore, &folder),
            )
            .await?;
            info!(id = %datastore.id, %folder, "Moved datastore to folder");
            report.moved = true;
        }

        let planner = ExtentPlanner::new(self.gateway, self.api_timeout);
        for disk in &diff.added {
            let extend = planner.disk_spec_for_extend(dss, datastore, disk).await?;
            remote_call(
                "extend VMFS datastore",
                disk,
                self.api_timeout,
                self.gateway.extend_vmfs_datastore(dss, datastore, extend.spec),
            )
            .await?;
            info!(id = %datastore.id, disk = %disk, "Extended datastore");
            report.extended.push(disk.clone());
        }

        debug!(id = %datastore.id, ?report, "Update applied");
        Ok(report)
    }
}
