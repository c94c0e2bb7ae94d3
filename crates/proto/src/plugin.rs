use crate::{proto, utils::Record, IdentityService};
use tracing::debug;

pub(crate) fn get_info(s: &impl IdentityService) -> proto::GetPluginInfoResponse {
  proto::GetPluginInfoResponse {
    name: s.name().record_field("name").into(),
    vendor_version: s.version().record_field("vendor_version").into(),
    manifest: s.manifest().record_field("manifest").clone(),
  }
}

pub(crate) fn probe(s: &impl IdentityService) -> proto::ProbeResponse {
  proto::ProbeResponse {
    ready: Some(s.ready().record_field("ready")),
  }
}

fn service(ty: proto::plugin_capability::service::Type) -> proto::PluginCapability {
  proto::PluginCapability {
    r#type: Some(proto::plugin_capability::Type::Service(
      proto::plugin_capability::Service { r#type: ty.into() },
    )),
  }
}

pub(crate) fn get_capabilities(
  s: &impl IdentityService,
  controller_service: bool,
) -> proto::GetPluginCapabilitiesResponse {
  use proto::plugin_capability::service::Type;

  let mut response = proto::GetPluginCapabilitiesResponse::default();
  if controller_service {
    response.capabilities.push(service(Type::ControllerService));
  }

  let volume_accessibility_constraints_support = s.volume_accessibility_constraints_support();
  if volume_accessibility_constraints_support {
    response
      .capabilities
      .push(service(Type::VolumeAccessibilityConstraints));
  }

  debug!(?controller_service, ?volume_accessibility_constraints_support);
  response
}
