use crate::proto;
use bitflags::bitflags;
use proto::node_service_capability::{rpc::Type, Rpc};

bitflags! {
  pub struct NodeCapabilities: u32 {
    /// The node has separate stage and publish steps.
    const STAGE_UNSTAGE_VOLUME = 1 << 0;
    const GET_VOLUME_STATS = 1 << 1;
  }
}

fn capability(ty: Type) -> proto::NodeServiceCapability {
  proto::NodeServiceCapability {
    r#type: Some(proto::node_service_capability::Type::Rpc(Rpc {
      r#type: ty as i32,
    })),
  }
}

impl From<NodeCapabilities> for proto::NodeGetCapabilitiesResponse {
  fn from(value: NodeCapabilities) -> Self {
    let mut capabilities = Vec::new();
    if value.contains(NodeCapabilities::STAGE_UNSTAGE_VOLUME) {
      capabilities.push(capability(Type::StageUnstageVolume));
    }
    if value.contains(NodeCapabilities::GET_VOLUME_STATS) {
      capabilities.push(capability(Type::GetVolumeStats));
    }

    proto::NodeGetCapabilitiesResponse { capabilities }
  }
}
