//! Reconciliation Reader
//!
//! Projects remote datastore state into the observed resource state.

use super::{find_datastore, remote_call};
use crate::domain::folder::{normalize_folder_path, split_relative_folder};
use crate::domain::model::DatastoreObservation;
use crate::domain::ports::{DatastoreGateway, DatastoreRef, VolumeInfo};
use crate::error::{Error, Result};
use std::time::Duration;
use tracing::debug;

pub struct ReconciliationReader<'a> {
    gateway: &'a dyn DatastoreGateway,
    api_timeout: Duration,
}

impl<'a> ReconciliationReader<'a> {
    pub fn new(gateway: &'a dyn DatastoreGateway, api_timeout: Duration) -> Self {
        Self {
            gateway,
            api_timeout,
        }
    }

    /// Fetch a datastore by ID and project its state
    pub async fn read(&self, id: &str) -> Result<DatastoreObservation> {
        let datastore = find_datastore(self.gateway, id, self.api_timeout).await?;
        self.project(&datastore).await
    }

    /// Project an already fetched datastore
    pub async fn project(&self, datastore: &DatastoreRef) -> Result<DatastoreObservation> {
        let props = remote_call(
            "fetch datastore properties",
            &datastore.id,
            self.api_timeout,
            self.gateway.datastore_properties(datastore),
        )
        .await?;

        let folder = normalize_folder_path(&split_relative_folder(&datastore.inventory_path)?);

        let disks = match props.info {
            VolumeInfo::Vmfs { extents, .. } => extents.into_iter().map(|e| e.disk_name).collect(),
            _ => {
                return Err(Error::NotVmfs {
                    id: datastore.id.clone(),
                    fs_type: props.summary.fs_type,
                })
            }
        };

        debug!(id = %datastore.id, %folder, ?disks, "Read datastore");
        Ok(DatastoreObservation {
            summary: props.summary,
            folder,
            disks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteErrorKind;
    use crate::gateway::{GatewayOp, InMemoryGateway, LabDatastore};
    use assert_matches::assert_matches;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn lab() -> InMemoryGateway {
        let gw = InMemoryGateway::new("dc-a");
        gw.add_host("host-9");
        gw.add_datastore(LabDatastore {
            id: "datastore-1".into(),
            name: "ds1".into(),
            folder: "dc1/ds-folder".into(),
            fs_type: "VMFS".into(),
            extents: vec!["naa.1".into(), "naa.2".into()],
            host_mounts: vec!["host-9".into()],
            capacity_bytes: 300,
        });
        gw.add_datastore(LabDatastore {
            id: "datastore-2".into(),
            name: "nfs1".into(),
            folder: String::new(),
            fs_type: "NFS".into(),
            extents: vec![],
            host_mounts: vec!["host-9".into()],
            capacity_bytes: 300,
        });
        gw
    }

    #[tokio::test]
    async fn test_read_projects_folder_and_extents() {
        let gw = lab();
        let reader = ReconciliationReader::new(&gw, TIMEOUT);

        let observed = reader.read("datastore-1").await.unwrap();
        assert_eq!(observed.folder, "dc1/ds-folder");
        assert_eq!(observed.disks, vec!["naa.1", "naa.2"]);
        assert_eq!(observed.summary.name, "ds1");
        assert_eq!(observed.summary.capacity_bytes, 300);
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let gw = lab();
        let reader = ReconciliationReader::new(&gw, TIMEOUT);

        let err = reader.read("datastore-404").await.unwrap_err();
        assert_matches!(&err, Error::DatastoreLookup { id, .. } if id == "datastore-404");
        assert!(err.is_not_found());
        assert_eq!(gw.call_count(GatewayOp::DatastoreProperties), 0);
    }

    #[tokio::test]
    async fn test_read_rejects_non_vmfs() {
        let gw = lab();
        let reader = ReconciliationReader::new(&gw, TIMEOUT);

        let err = reader.read("datastore-2").await.unwrap_err();
        assert_matches!(err, Error::NotVmfs { fs_type, .. } if fs_type == "NFS");
    }

    #[tokio::test]
    async fn test_property_failure_propagates() {
        let gw = lab();
        gw.inject_fault(GatewayOp::DatastoreProperties, RemoteErrorKind::Other, 1);
        let reader = ReconciliationReader::new(&gw, TIMEOUT);

        let err = reader.read("datastore-1").await.unwrap_err();
        assert_matches!(&err, Error::Remote { target, .. } if target == "datastore-1");
    }
}
