use crate::proto;
use bitflags::bitflags;
use proto::controller_service_capability::{rpc::Type, Rpc};

#[rustfmt::skip]
bitflags! {
  pub struct ControllerCapabilities: u32 {
    const CREATE_DELETE_VOLUME         = 1 << 0;
    const PUBLISH_UNPUBLISH_VOLUME     = 1 << 1;
    const LIST_VOLUMES                 = 1 << 2;
    /// `ListVolumes` entries report the nodes a volume is attached to.
    const LIST_VOLUMES_PUBLISHED_NODES = 1 << 3;
  }
}

const RPC_TYPES: [(ControllerCapabilities, Type); 4] = [
  (ControllerCapabilities::CREATE_DELETE_VOLUME, Type::CreateDeleteVolume),
  (ControllerCapabilities::PUBLISH_UNPUBLISH_VOLUME, Type::PublishUnpublishVolume),
  (ControllerCapabilities::LIST_VOLUMES, Type::ListVolumes),
  (ControllerCapabilities::LIST_VOLUMES_PUBLISHED_NODES, Type::ListVolumesPublishedNodes),
];

impl From<ControllerCapabilities> for proto::ControllerGetCapabilitiesResponse {
  fn from(value: ControllerCapabilities) -> Self {
    let capabilities = RPC_TYPES
      .iter()
      .filter(|(flag, _)| value.contains(*flag))
      .map(|(_, ty)| proto::ControllerServiceCapability {
        r#type: Some(proto::controller_service_capability::Type::Rpc(Rpc {
          r#type: *ty as i32,
        })),
      })
      .collect();

    proto::ControllerGetCapabilitiesResponse { capabilities }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn types(caps: ControllerCapabilities) -> Vec<i32> {
    proto::ControllerGetCapabilitiesResponse::from(caps)
      .capabilities
      .into_iter()
      .filter_map(|c| match c.r#type {
        Some(proto::controller_service_capability::Type::Rpc(rpc)) => Some(rpc.r#type),
        None => None,
      })
      .collect()
  }

  #[test]
  fn reports_in_declaration_order() {
    let caps = ControllerCapabilities::LIST_VOLUMES
      | ControllerCapabilities::CREATE_DELETE_VOLUME
      | ControllerCapabilities::PUBLISH_UNPUBLISH_VOLUME;

    assert_eq!(
      types(caps),
      vec![
        Type::CreateDeleteVolume as i32,
        Type::PublishUnpublishVolume as i32,
        Type::ListVolumes as i32,
      ]
    );
  }

  #[test]
  fn empty_reports_nothing() {
    assert!(types(ControllerCapabilities::empty()).is_empty());
  }
}
