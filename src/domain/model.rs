//! Datastore resource model
//!
//! The desired configuration supplied by the caller and the observed state
//! rebuilt from the remote system after every operation.

use crate::domain::folder::normalize_folder_path;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Filesystem type reported by multi-extent VMFS volumes
pub const VMFS_FS_TYPE: &str = "VMFS";

// =============================================================================
// Desired Configuration
// =============================================================================

/// Desired configuration of a VMFS datastore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreConfig {
    /// Display name of the datastore
    pub name: String,
    /// Managed object ID of the host the datastore is created on
    pub host_system_id: String,
    /// Folder relative to the datacenter's datastore root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    /// Disk canonical names; the first one becomes the initial extent
    pub disks: Vec<String>,
}

impl DatastoreConfig {
    /// Check required fields before any remote call is made
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("name must not be empty".into()));
        }
        if self.host_system_id.trim().is_empty() {
            return Err(Error::Validation("host_system_id must not be empty".into()));
        }
        if self.disks.is_empty() {
            return Err(Error::Validation(
                "disks must contain at least one disk".into(),
            ));
        }
        if let Some(i) = self.disks.iter().position(|d| d.trim().is_empty()) {
            return Err(Error::Validation(format!("disks[{}] must not be empty", i)));
        }
        Ok(())
    }

    /// Folder in normalized form, empty when unset
    pub fn normalized_folder(&self) -> String {
        self.folder
            .as_deref()
            .map(normalize_folder_path)
            .unwrap_or_default()
    }
}

// =============================================================================
// Observed State
// =============================================================================

/// Informational summary of a datastore
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreSummary {
    pub name: String,
    /// Filesystem type, e.g. `VMFS` or `NFS`
    pub fs_type: String,
    pub capacity_bytes: u64,
    pub free_space_bytes: u64,
    pub uncommitted_space_bytes: u64,
    pub accessible: bool,
    pub maintenance_mode: String,
    pub multiple_host_access: bool,
    pub url: String,
}

/// Projection of remote datastore state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreObservation {
    pub summary: DatastoreSummary,
    /// Normalized folder relative to the datastore root
    pub folder: String,
    /// Extent disk names in the order the volume reports them
    pub disks: Vec<String>,
}

/// Observed state of a managed datastore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatastoreState {
    /// Remote managed object ID
    pub id: String,
    pub host_system_id: String,
    pub name: String,
    pub folder: String,
    pub disks: Vec<String>,
    pub summary: DatastoreSummary,
    pub observed_at: chrono::DateTime<chrono::Utc>,
}

impl DatastoreState {
    pub fn from_observation(
        id: impl Into<String>,
        host_system_id: impl Into<String>,
        observation: DatastoreObservation,
    ) -> Self {
        Self {
            id: id.into(),
            host_system_id: host_system_id.into(),
            name: observation.summary.name.clone(),
            folder: observation.folder,
            disks: observation.disks,
            summary: observation.summary,
            observed_at: chrono::Utc::now(),
        }
    }
}

/// Identity seeded by a successful import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreImport {
    pub id: String,
    pub host_system_id: String,
}
