//! VMFS Datastore Operator
//!
//! Lifecycle management for multi-extent VMFS datastores on a remote
//! virtualization host. Each operation is a sequence of non-atomic remote
//! calls made to behave like a single resource operation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                          DatastoreLifecycle                                  │
//! │             create / read / update / delete / import                         │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │  Provisioning   │  │   Update        │  │   Deletion Converger        │  │
//! │  │  Pipeline       │  │   Differ        │  │   (retry, then wait)        │  │
//! │  │  (+ rollback)   │  │   (grow-only)   │  │                             │  │
//! │  └────────┬────────┘  └────────┬────────┘  └─────────────┬───────────────┘  │
//! │           │                    │                         │                   │
//! │           └──────────┬─────────┘              ┌──────────┴──────────┐        │
//! │              ┌───────┴────────┐               │  Convergence Loop   │        │
//! │              │ Extent Planner │               │  (pure tick)        │        │
//! │              └────────────────┘               └─────────────────────┘        │
//! │  ┌─────────────────────────────┐  ┌─────────────────────────────────────┐   │
//! │  │   Reconciliation Reader     │  │        Import Resolver              │   │
//! │  └─────────────────────────────┘  └─────────────────────────────────────┘   │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │                       DatastoreGateway (async trait)                         │
//! │            remote endpoint  |  InMemoryGateway (tests, CLI lab)              │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`lifecycle`]: Lifecycle operations and their components
//! - [`domain`]: Resource model, folder paths and the gateway port
//! - [`gateway`]: In-memory gateway implementation
//! - [`config`]: Timeouts and convergence loop settings
//! - [`metrics`]: Prometheus counters
//! - [`error`]: Error types and classification

pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod metrics;

// Re-export commonly used types
pub use config::{ConvergenceSettings, LifecycleConfig};

pub use domain::model::{
    DatastoreConfig, DatastoreImport, DatastoreObservation, DatastoreState, DatastoreSummary,
};

pub use domain::ports::{DatastoreGateway, DatastoreGatewayRef, DatastoreRef};

pub use error::{Error, ErrorClass, ProvisioningFailure, RemoteError, RemoteErrorKind, Result};

pub use gateway::{GatewayOp, InMemoryGateway, LabInventory};

pub use lifecycle::{DatastoreLifecycle, DeletionReport, ExtentDiff, UpdateReport};

pub use metrics::LifecycleMetrics;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
