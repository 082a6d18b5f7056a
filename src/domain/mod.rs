//! Domain layer - Resource model, folder paths and port definitions
//!
//! This module defines the datastore model and the gateway trait (port)
//! that remote adapters implement, following hexagonal architecture principles.

pub mod folder;
pub mod model;
pub mod ports;

pub use folder::*;
pub use model::*;
pub use ports::*;
