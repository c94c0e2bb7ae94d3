//! CSI plugin for remote block volumes.
//!
//! The node half formats, optionally LUKS-encrypts, and mounts attached
//! devices. The controller half sizes and provisions volumes through a
//! [StorageBackend](backend::StorageBackend).

pub mod backend;
pub mod capacity;
pub mod config;
pub mod controller;
pub mod device;
pub mod encryption;
pub mod node;

pub use controller::ControllerDriver;
pub use node::{NodeDriver, NodeIdentity, NodeOptions};

/// Default plugin name reported by `GetPluginInfo`.
pub const DRIVER_NAME: &str = "csi.blockvol.dev";

pub const DRIVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Volume/publish context key carrying the human readable volume name.
pub const VOLUME_NAME_KEY: &str = "csi.blockvol.dev/volume-name";

/// Topology segment pinning volumes and nodes to a region.
pub const TOPOLOGY_REGION_KEY: &str = "region";
