//! Error types for the VMFS Datastore Operator
//!
//! Provides a single structured error type for every lifecycle stage: input
//! validation, disk resolution, remote gateway calls, creation rollback,
//! extent policy and the deletion convergence loops.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Remote Errors
// =============================================================================

/// Classification of an error returned by the remote gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// The managed object does not exist
    NotFound,
    /// The object is busy or still referenced elsewhere
    ResourceInUse,
    /// Anything else
    Other,
}

impl std::fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteErrorKind::NotFound => write!(f, "not_found"),
            RemoteErrorKind::ResourceInUse => write!(f, "resource_in_use"),
            RemoteErrorKind::Other => write!(f, "other"),
        }
    }
}

/// An error reported by the remote storage-management endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotFound, message)
    }

    pub fn resource_in_use(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::ResourceInUse, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Other, message)
    }
}

// =============================================================================
// Provisioning Failures
// =============================================================================

/// A step of the creation pipeline that failed after the datastore existed
#[derive(Error, Debug)]
pub enum ProvisioningFailure {
    #[error("could not move datastore to folder {folder:?}: {source}")]
    MoveToFolder { folder: String, source: Box<Error> },

    #[error("error fetching datastore extend spec for disk {disk:?}: {source}")]
    ExtendSpec { disk: String, source: Box<Error> },

    #[error("error extending datastore with disk {disk:?}: {source}")]
    Extend { disk: String, source: Box<Error> },

    #[error("error reading back created datastore: {source}")]
    Properties { source: Box<Error> },
}

impl ProvisioningFailure {
    /// The error that triggered the rollback
    pub fn cause(&self) -> &Error {
        match self {
            ProvisioningFailure::MoveToFolder { source, .. }
            | ProvisioningFailure::ExtendSpec { source, .. }
            | ProvisioningFailure::Extend { source, .. }
            | ProvisioningFailure::Properties { source } => source,
        }
    }

    fn dangling_context(&self) -> String {
        match self {
            ProvisioningFailure::MoveToFolder { folder, .. } => format!(
                "There was an error moving your datastore to the desired folder {:?}:",
                folder
            ),
            ProvisioningFailure::ExtendSpec { disk, .. } => format!(
                "There was an error fetching the extend spec for disk {:?}:",
                disk
            ),
            ProvisioningFailure::Extend { disk, .. } => format!(
                "There was an error extending your datastore with disk {:?}:",
                disk
            ),
            ProvisioningFailure::Properties { .. } => {
                "After creating the datastore, there was an error fetching its properties:".into()
            }
        }
    }
}

fn dangling_message(datastore_id: &str, failure: &ProvisioningFailure, removal: &Error) -> String {
    format!(
        "\nWARNING: Dangling resource!\n{}\n{}\nAdditionally, there was an error removing the created datastore {:?}:\n{}\nYou will need to remove this datastore manually before trying again.\n",
        failure.dangling_context(),
        failure.cause(),
        datastore_id,
        removal
    )
}

// =============================================================================
// Operator Error
// =============================================================================

/// Unified error type for the operator
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Input Validation Errors
    // =========================================================================
    #[error("invalid datastore configuration: {0}")]
    Validation(String),

    #[error("please supply the ID in the following format: DATASTOREID:HOSTID (got {id:?})")]
    InvalidImportId { id: String },

    #[error("{field} cannot be changed in place ({from:?} -> {to:?}), the datastore must be recreated")]
    ImmutableField {
        field: String,
        from: String,
        to: String,
    },

    // =========================================================================
    // Disk Resolution Errors
    // =========================================================================
    #[error("disk {disk:?} not found in the host's available disks")]
    DiskNotFound { disk: String },

    #[error("disk {disk:?} cannot be used for a VMFS datastore: {reason}")]
    DiskUnsuitable { disk: String, reason: String },

    #[error("could not find any {operation} options for disk {disk:?}")]
    NoDiskOptions { disk: String, operation: String },

    // =========================================================================
    // Remote Errors
    // =========================================================================
    #[error("error loading host datastore system for host {host_id:?}: {source}")]
    HostDatastoreSystem { host_id: String, source: RemoteError },

    #[error("cannot find datastore {id:?}: {source}")]
    DatastoreLookup { id: String, source: RemoteError },

    #[error("{operation} failed for {target}: {source}")]
    Remote {
        operation: String,
        target: String,
        source: RemoteError,
    },

    #[error("{operation} for {target} timed out after {duration:?}")]
    Timeout {
        operation: String,
        target: String,
        duration: Duration,
    },

    // =========================================================================
    // Read / Import Errors
    // =========================================================================
    #[error("datastore ID {id:?} is not a VMFS datastore (type {fs_type:?})")]
    NotVmfs { id: String, fs_type: String },

    #[error("error parsing datastore path {path:?}: {reason}")]
    InventoryPath { path: String, reason: String },

    #[error("configured host_system_id {host_id:?} not found as a mounted host on datastore {id:?}")]
    HostNotMounted { host_id: String, id: String },

    // =========================================================================
    // Creation Errors
    // =========================================================================
    #[error("error creating datastore with disk {disk:?}: {source}")]
    Create { disk: String, source: Box<Error> },

    /// A later step failed and the created datastore was removed again
    #[error("{failure}")]
    Provisioning {
        datastore_id: String,
        failure: ProvisioningFailure,
    },

    /// A later step failed and removing the created datastore failed too
    #[error("{}", dangling_message(.datastore_id, .failure, .removal))]
    DanglingResource {
        datastore_id: String,
        failure: ProvisioningFailure,
        removal: Box<Error>,
    },

    // =========================================================================
    // Update Errors
    // =========================================================================
    #[error("disk {disk:?} found in state but not config (removal of disks is not supported)")]
    DiskRemovalNotSupported { disk: String },

    // =========================================================================
    // Deletion Errors
    // =========================================================================
    #[error("{operation} timed out after {timeout:?} ({attempts} attempts)")]
    ConvergenceTimeout {
        operation: String,
        timeout: Duration,
        attempts: u32,
    },

    #[error("{operation} gave up after {checks} consecutive checks without an answer")]
    ConvergenceUnobserved { operation: String, checks: u32 },

    #[error("could not delete datastore {id:?}: {source}")]
    Delete { id: String, source: Box<Error> },

    #[error("error waiting for datastore {id:?} to delete: {source}")]
    DeleteWait { id: String, source: Box<Error> },

    // =========================================================================
    // Parse / IO Errors
    // =========================================================================
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error taxonomy used by callers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Malformed input, rejected before any remote call
    InputValidation,
    /// A disk identifier could not be resolved on the host
    Resolution,
    /// The remote object is busy
    TransientConflict,
    /// The remote object does not exist
    NotFound,
    /// The requested change is not allowed
    PolicyViolation,
    /// Rollback failed and remote state needs manual cleanup
    DanglingResource,
    /// A remote call or convergence loop ran out of time
    Timeout,
    /// Any other remote failure
    Remote,
    /// Local failures unrelated to the remote system
    Internal,
}

impl Error {
    /// Build a remote error with identifying context
    pub fn remote(
        operation: impl Into<String>,
        target: impl Into<String>,
        source: RemoteError,
    ) -> Self {
        Error::Remote {
            operation: operation.into(),
            target: target.into(),
            source,
        }
    }

    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Validation(_)
            | Error::Configuration(_)
            | Error::InvalidImportId { .. }
            | Error::ImmutableField { .. }
            | Error::NotVmfs { .. }
            | Error::HostNotMounted { .. } => ErrorClass::InputValidation,

            Error::DiskNotFound { .. }
            | Error::DiskUnsuitable { .. }
            | Error::NoDiskOptions { .. } => ErrorClass::Resolution,

            Error::HostDatastoreSystem { source, .. }
            | Error::DatastoreLookup { source, .. }
            | Error::Remote { source, .. } => match source.kind {
                RemoteErrorKind::NotFound => ErrorClass::NotFound,
                RemoteErrorKind::ResourceInUse => ErrorClass::TransientConflict,
                RemoteErrorKind::Other => ErrorClass::Remote,
            },

            Error::Timeout { .. }
            | Error::ConvergenceTimeout { .. }
            | Error::ConvergenceUnobserved { .. } => ErrorClass::Timeout,

            Error::Create { source, .. }
            | Error::Delete { source, .. }
            | Error::DeleteWait { source, .. } => source.class(),
            Error::Provisioning { failure, .. } => failure.cause().class(),

            Error::DanglingResource { .. } => ErrorClass::DanglingResource,
            Error::DiskRemovalNotSupported { .. } => ErrorClass::PolicyViolation,

            Error::Internal(_)
            | Error::InventoryPath { .. }
            | Error::YamlParse(_)
            | Error::JsonParse(_)
            | Error::Io(_) => ErrorClass::Internal,
        }
    }

    /// Check if the remote object was reported absent
    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }

    /// Check if the remote object was reported busy
    pub fn is_resource_in_use(&self) -> bool {
        self.class() == ErrorClass::TransientConflict
    }

    /// Check if remote state was left behind and must be removed by hand
    pub fn requires_manual_cleanup(&self) -> bool {
        matches!(self, Error::DanglingResource { .. })
    }

    /// Check if retrying the same operation later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::TransientConflict | ErrorClass::Timeout
        )
    }
}

/// Result type alias for the operator
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_classification() {
        let err = Error::remote(
            "remove datastore",
            "datastore-1",
            RemoteError::resource_in_use("busy"),
        );
        assert_eq!(err.class(), ErrorClass::TransientConflict);
        assert!(err.is_resource_in_use());
        assert!(err.is_retryable());

        let err = Error::DatastoreLookup {
            id: "datastore-1".into(),
            source: RemoteError::not_found("gone"),
        };
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_wrapped_errors_keep_class() {
        let err = Error::Delete {
            id: "datastore-1".into(),
            source: Box::new(Error::ConvergenceTimeout {
                operation: "remove datastore".into(),
                timeout: Duration::from_secs(30),
                attempts: 15,
            }),
        };
        assert_eq!(err.class(), ErrorClass::Timeout);

        let err = Error::Provisioning {
            datastore_id: "datastore-1".into(),
            failure: ProvisioningFailure::ExtendSpec {
                disk: "naa.2".into(),
                source: Box::new(Error::DiskNotFound {
                    disk: "naa.2".into(),
                }),
            },
        };
        assert_eq!(err.class(), ErrorClass::Resolution);
        assert!(!err.requires_manual_cleanup());
    }

    #[test]
    fn test_dangling_message_carries_both_errors() {
        let err = Error::DanglingResource {
            datastore_id: "datastore-7".into(),
            failure: ProvisioningFailure::MoveToFolder {
                folder: "dc1/ds-folder".into(),
                source: Box::new(Error::remote(
                    "move datastore to folder",
                    "dc1/ds-folder",
                    RemoteError::other("folder missing"),
                )),
            },
            removal: Box::new(Error::remote(
                "remove datastore",
                "datastore-7",
                RemoteError::other("host disconnected"),
            )),
        };

        let text = err.to_string();
        assert!(text.contains("WARNING: Dangling resource!"));
        assert!(text.contains("\"dc1/ds-folder\""));
        assert!(text.contains("folder missing"));
        assert!(text.contains("host disconnected"));
        assert!(text.contains("\"datastore-7\""));
        assert!(text.contains("remove this datastore manually"));
        assert_eq!(err.class(), ErrorClass::DanglingResource);
        assert!(err.requires_manual_cleanup());
    }

    #[test]
    fn test_policy_and_validation_classes() {
        let err = Error::DiskRemovalNotSupported {
            disk: "naa.1".into(),
        };
        assert_eq!(err.class(), ErrorClass::PolicyViolation);
        assert!(err.to_string().contains("removal of disks is not supported"));

        let err = Error::InvalidImportId { id: "ds-1".into() };
        assert_eq!(err.class(), ErrorClass::InputValidation);
        assert!(err.to_string().contains("DATASTOREID:HOSTID"));
    }
}
