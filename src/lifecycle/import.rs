//! Import Resolver
//!
//! Adopts an existing datastore from a `DATASTOREID:HOSTID` composite ID.

use super::{find_datastore, remote_call};
use crate::domain::model::{DatastoreImport, VMFS_FS_TYPE};
use crate::domain::ports::DatastoreGateway;
use crate::error::{Error, Result};
use std::time::Duration;
use tracing::info;

/// Split a composite import ID into datastore and host IDs
pub fn parse_import_id(id: &str) -> Result<(&str, &str)> {
    match id.split_once(':') {
        Some((datastore_id, host_id)) if !datastore_id.is_empty() && !host_id.is_empty() => {
            Ok((datastore_id, host_id))
        }
        _ => Err(Error::InvalidImportId { id: id.to_string() }),
    }
}

pub struct ImportResolver<'a> {
    gateway: &'a dyn DatastoreGateway,
    api_timeout: Duration,
}

impl<'a> ImportResolver<'a> {
    pub fn new(gateway: &'a dyn DatastoreGateway, api_timeout: Duration) -> Self {
        Self {
            gateway,
            api_timeout,
        }
    }

    /// Validate that the datastore exists, is VMFS and is mounted on the host
    pub async fn resolve(&self, composite_id: &str) -> Result<DatastoreImport> {
        let (datastore_id, host_id) = parse_import_id(composite_id)?;

        let datastore = find_datastore(self.gateway, datastore_id, self.api_timeout).await?;
        let props = remote_call(
            "fetch datastore properties",
            &datastore.id,
            self.api_timeout,
            self.gateway.datastore_properties(&datastore),
        )
        .await?;

        if props.summary.fs_type != VMFS_FS_TYPE {
            return Err(Error::NotVmfs {
                id: datastore.id,
                fs_type: props.summary.fs_type,
            });
        }

        if !props.host_mounts.iter().any(|m| m.host_id == host_id) {
            return Err(Error::HostNotMounted {
                host_id: host_id.to_string(),
                id: datastore.id,
            });
        }

        info!(id = %datastore.id, host = host_id, "Resolved datastore import");
        Ok(DatastoreImport {
            id: datastore.id,
            host_system_id: host_id.to_string(),
        })
    }
}
