//! Domain Ports - Remote gateway contract
//!
//! The lifecycle never talks to the storage-management API directly. It goes
//! through [`DatastoreGateway`], which a transport adapter (or the in-memory
//! gateway used by tests and the lab CLI) implements.

use crate::domain::model::DatastoreSummary;
use crate::error::RemoteError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of a single gateway call
pub type GatewayResult<T> = std::result::Result<T, RemoteError>;

// =============================================================================
// Host Types
// =============================================================================

/// Datastore-management context scoped to one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDatastoreSystem {
    /// Host managed object ID
    pub host_id: String,
    /// Managed object ID of the host's datastore system
    pub reference: String,
}

/// SCSI disk classification reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScsiDiskType {
    Native512,
    Emulated512,
    Native4k,
    Unknown,
}

impl std::fmt::Display for ScsiDiskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScsiDiskType::Native512 => write!(f, "native512"),
            ScsiDiskType::Emulated512 => write!(f, "emulated512"),
            ScsiDiskType::Native4k => write!(f, "native4k"),
            ScsiDiskType::Unknown => write!(f, "unknown"),
        }
    }
}

/// A disk reported by the host as a candidate for VMFS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDisk {
    /// Canonical name, e.g. `naa.600508b1001c...`
    pub canonical_name: String,
    /// Device path, e.g. `/vmfs/devices/disks/naa.600508b1001c...`
    pub device_path: String,
    pub disk_type: ScsiDiskType,
    /// Already claimed by a datastore or partition
    #[serde(default)]
    pub in_use: bool,
    pub capacity_bytes: u64,
}

// =============================================================================
// VMFS Specs
// =============================================================================

/// Partition layout for one extent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskPartition {
    pub disk_name: String,
    pub partition: u32,
}

/// Specification for creating a VMFS volume on a disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmfsCreateSpec {
    pub device_path: String,
    pub volume_name: String,
    pub extent: DiskPartition,
    pub major_version: u32,
}

/// Specification for adding an extent to an existing VMFS volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmfsExtendSpec {
    pub device_path: String,
    pub extent: DiskPartition,
}

// =============================================================================
// Datastore Types
// =============================================================================

/// Reference to a datastore managed object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreRef {
    /// Managed object ID
    pub id: String,
    /// Full inventory path, e.g. `/dc1/datastore/prod/ds1`
    pub inventory_path: String,
}

/// One extent of a VMFS volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmfsExtent {
    pub disk_name: String,
    pub partition: u32,
}

/// Type-specific volume info
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VolumeInfo {
    Vmfs {
        volume_name: String,
        extents: Vec<VmfsExtent>,
    },
    Nas {
        remote_host: String,
        remote_path: String,
    },
    Other,
}

/// A host that has the datastore mounted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostMount {
    pub host_id: String,
    pub mounted: bool,
    pub accessible: bool,
}

/// Properties fetched for a datastore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreProperties {
    pub summary: DatastoreSummary,
    pub info: VolumeInfo,
    pub host_mounts: Vec<HostMount>,
}

// =============================================================================
// Datastore Gateway Port
// =============================================================================

/// Port for the remote storage-management endpoint
///
/// Every method maps to a single remote call. Errors carry a
/// [`crate::error::RemoteErrorKind`] so callers can tell "not found" and
/// "resource in use" apart from other failures.
#[async_trait]
pub trait DatastoreGateway: Send + Sync {
    /// Look up the datastore-management context of a host
    async fn host_datastore_system(&self, host_id: &str) -> GatewayResult<HostDatastoreSystem>;

    /// Disks usable for VMFS; relative to `datastore` when extending
    async fn available_disks(
        &self,
        dss: &HostDatastoreSystem,
        datastore: Option<&DatastoreRef>,
    ) -> GatewayResult<Vec<HostDisk>>;

    /// Candidate create specs for a device
    async fn create_options(
        &self,
        dss: &HostDatastoreSystem,
        device_path: &str,
    ) -> GatewayResult<Vec<VmfsCreateSpec>>;

    /// Candidate extend specs for a device
    async fn extend_options(
        &self,
        dss: &HostDatastoreSystem,
        datastore: &DatastoreRef,
        device_path: &str,
    ) -> GatewayResult<Vec<VmfsExtendSpec>>;

    /// Create a VMFS datastore from a single extent
    async fn create_vmfs_datastore(
        &self,
        dss: &HostDatastoreSystem,
        spec: VmfsCreateSpec,
    ) -> GatewayResult<DatastoreRef>;

    /// Add an extent to an existing VMFS datastore
    async fn extend_vmfs_datastore(
        &self,
        dss: &HostDatastoreSystem,
        datastore: &DatastoreRef,
        spec: VmfsExtendSpec,
    ) -> GatewayResult<DatastoreRef>;

    /// Remove a datastore from the host
    async fn remove_datastore(
        &self,
        dss: &HostDatastoreSystem,
        datastore: &DatastoreRef,
    ) -> GatewayResult<()>;

    /// Fetch a datastore by managed object ID
    async fn datastore_from_id(&self, id: &str) -> GatewayResult<DatastoreRef>;

    /// Fetch summary, volume info and host mounts
    async fn datastore_properties(&self, datastore: &DatastoreRef)
        -> GatewayResult<DatastoreProperties>;

    /// Rename a datastore
    async fn rename_datastore(&self, datastore: &DatastoreRef, name: &str) -> GatewayResult<()>;

    /// Move a datastore into a folder relative to its datacenter's datastore root
    async fn move_datastore_to_folder(
        &self,
        datastore: &DatastoreRef,
        folder: &str,
    ) -> GatewayResult<()>;
}

pub type DatastoreGatewayRef = Arc<dyn DatastoreGateway>;
