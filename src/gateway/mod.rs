//! Gateway Adapters
//!
//! Implementations of [`crate::domain::ports::DatastoreGateway`]:
//! - InMemory: a simulated host inventory with fault injection, used by the
//!   test suite and the lab CLI

pub mod memory;

pub use memory::*;

use serde::{Deserialize, Serialize};

/// Gateway operations, used for call accounting and fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayOp {
    HostDatastoreSystem,
    AvailableDisks,
    CreateOptions,
    ExtendOptions,
    CreateDatastore,
    ExtendDatastore,
    RemoveDatastore,
    DatastoreFromId,
    DatastoreProperties,
    RenameDatastore,
    MoveToFolder,
}

impl GatewayOp {
    /// Whether the operation changes remote state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            GatewayOp::CreateDatastore
                | GatewayOp::ExtendDatastore
                | GatewayOp::RemoveDatastore
                | GatewayOp::RenameDatastore
                | GatewayOp::MoveToFolder
        )
    }

    pub const ALL: [GatewayOp; 11] = [
        GatewayOp::HostDatastoreSystem,
        GatewayOp::AvailableDisks,
        GatewayOp::CreateOptions,
        GatewayOp::ExtendOptions,
        GatewayOp::CreateDatastore,
        GatewayOp::ExtendDatastore,
        GatewayOp::RemoveDatastore,
        GatewayOp::DatastoreFromId,
        GatewayOp::DatastoreProperties,
        GatewayOp::RenameDatastore,
        GatewayOp::MoveToFolder,
    ];
}

impl std::fmt::Display for GatewayOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GatewayOp::HostDatastoreSystem => "host_datastore_system",
            GatewayOp::AvailableDisks => "available_disks",
            GatewayOp::CreateOptions => "create_options",
            GatewayOp::ExtendOptions => "extend_options",
            GatewayOp::CreateDatastore => "create_datastore",
            GatewayOp::ExtendDatastore => "extend_datastore",
            GatewayOp::RemoveDatastore => "remove_datastore",
            GatewayOp::DatastoreFromId => "datastore_from_id",
            GatewayOp::DatastoreProperties => "datastore_properties",
            GatewayOp::RenameDatastore => "rename_datastore",
            GatewayOp::MoveToFolder => "move_to_folder",
        };
        write!(f, "{}", name)
    }
}
