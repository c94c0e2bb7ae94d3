macro_rules! unsupported {
  ($name:expr) => {{
    ::tracing::error!("Unsupported method {} called", $name);
    return Err(
      ::tonic::Status::new(
        ::tonic::Code::Unimplemented,
        format!("Unsupported method {} called", $name),
      )
      .into(),
    );
  }};
}

pub mod controller;
pub mod node;
pub mod volume;

mod plugin;
mod secrets;
mod server;
mod utils;

/// Types generated from the CSI protobuf definitions.
pub mod proto {
  #![allow(clippy::all)]
  tonic::include_proto!("csi.v1");
}

use lazy_static::lazy_static;
use std::collections::HashMap;

pub use controller::ControllerService;
pub use node::NodeService;
pub use secrets::Secrets;
pub use server::{serve_controller, serve_node, Endpoint, ServeError};

/// Answers the CSI identity RPCs. Every node and controller plugin
/// implements it next to its main service trait.
pub trait IdentityService: Send + Sync + 'static {
  /// Driver name in reverse domain notation, at most 63 characters.
  fn name(&self) -> &str;

  fn version(&self) -> &str;

  /// Reported as the `VOLUME_ACCESSIBILITY_CONSTRAINTS` plugin capability.
  #[inline]
  fn volume_accessibility_constraints_support(&self) -> bool {
    false
  }

  /// Answer to `Probe`.
  #[inline]
  fn ready(&self) -> bool {
    true
  }

  /// Opaque key/value pairs returned from `GetPluginInfo`.
  #[inline]
  fn manifest(&self) -> &HashMap<String, String> {
    lazy_static! {
      static ref NO_MANIFEST: HashMap<String, String> = HashMap::new();
    }

    &NO_MANIFEST
  }
}
