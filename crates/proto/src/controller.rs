mod capabilities;
mod create_volume;
mod delete_volume;
mod list_volumes;
mod publish_volume;
mod unpublish_volume;
mod validate_volume_capabilities;

use crate::{
  plugin, proto,
  utils::{record_request, Record},
  IdentityService,
};
use async_trait::async_trait;
use std::{convert::TryInto, sync::Arc};
use tracing::instrument;

pub use crate::volume::*;
pub use capabilities::*;
pub use create_volume::*;
pub use delete_volume::*;
pub use list_volumes::*;
pub use publish_volume::*;
pub use unpublish_volume::*;
pub use validate_volume_capabilities::*;

/// Controller half of a CSI plugin. Every RPC except
/// `ValidateVolumeCapabilities` answers `Unimplemented` unless the
/// implementation overrides it, and every override must be idempotent.
#[async_trait]
pub trait ControllerService: IdentityService {
  /// Advertised through `ControllerGetCapabilities`.
  #[inline]
  fn capabilities(&self) -> ControllerCapabilities {
    ControllerCapabilities::empty()
  }

  /// Provisions a volume. A repeated call with the same name and compatible
  /// arguments returns the existing volume.
  #[allow(unused_variables)]
  async fn create_volume(&self, request: CreateVolumeRequest) -> Result<Volume, CreateVolumeError> {
    unsupported!("CreateVolume")
  }

  /// Deprovisions a volume. Unknown ids succeed.
  #[allow(unused_variables)]
  async fn delete_volume(&self, request: DeleteVolumeRequest) -> Result<(), DeleteVolumeError> {
    unsupported!("DeleteVolume")
  }

  /// Attaches a volume to a node. Never runs on the node itself.
  #[allow(unused_variables)]
  async fn controller_publish_volume(
    &self,
    request: ControllerPublishVolumeRequest,
  ) -> Result<ControllerPublishVolumeResponse, ControllerPublishVolumeError> {
    unsupported!("ControllerPublishVolume")
  }

  /// Detaches a volume. A volume that is not attached succeeds.
  #[allow(unused_variables)]
  async fn controller_unpublish_volume(
    &self,
    request: ControllerUnpublishVolumeRequest,
  ) -> Result<(), ControllerUnpublishVolumeError> {
    unsupported!("ControllerUnpublishVolume")
  }

  /// Confirms only when every requested capability is supported.
  async fn validate_volume_capabilities(
    &self,
    request: ValidateVolumeCapabilitiesRequest,
  ) -> Result<ValidateVolumeCapabilitiesResponse, ValidateVolumeCapabilitiesError>;

  #[allow(unused_variables)]
  async fn list_volumes(
    &self,
    request: ListVolumesRequest,
  ) -> Result<ListVolumesResponse, ListVolumesError> {
    unsupported!("ListVolumes")
  }
}

pub(crate) struct Controller<T: ControllerService>(Arc<T>);

impl<T: ControllerService> Controller<T> {
  pub(crate) fn new(inner: Arc<T>) -> Self {
    Controller(inner)
  }
}

impl<T: ControllerService> Clone for Controller<T> {
  fn clone(&self) -> Self {
    Controller(self.0.clone())
  }
}

#[async_trait]
impl<T: ControllerService> proto::identity_server::Identity for Controller<T> {
  #[instrument(
    name = "identity.get_plugin_info",
    skip(self, _request),
    fields(name, vendor_version, manifest)
  )]
  async fn get_plugin_info(
    &self,
    _request: tonic::Request<proto::GetPluginInfoRequest>,
  ) -> Result<tonic::Response<proto::GetPluginInfoResponse>, tonic::Status> {
    Ok(tonic::Response::new(plugin::get_info(&*self.0)))
  }

  #[instrument(
    name = "identity.get_plugin_capabilities",
    skip(self, _request),
    fields(response)
  )]
  async fn get_plugin_capabilities(
    &self,
    _request: tonic::Request<proto::GetPluginCapabilitiesRequest>,
  ) -> Result<tonic::Response<proto::GetPluginCapabilitiesResponse>, tonic::Status> {
    let response = plugin::get_capabilities(&*self.0, true).record_response();

    Ok(tonic::Response::new(response))
  }

  #[instrument(name = "identity.probe", skip(self, _request), fields(ready))]
  async fn probe(
    &self,
    _request: tonic::Request<proto::ProbeRequest>,
  ) -> Result<tonic::Response<proto::ProbeResponse>, tonic::Status> {
    Ok(tonic::Response::new(plugin::probe(&*self.0)))
  }
}

#[async_trait]
impl<T: ControllerService> proto::controller_server::Controller for Controller<T> {
  #[instrument(
    name = "controller.create_volume",
    skip(self, request),
    fields(request, response)
  )]
  async fn create_volume(
    &self,
    request: tonic::Request<proto::CreateVolumeRequest>,
  ) -> Result<tonic::Response<proto::CreateVolumeResponse>, tonic::Status> {
    let request = record_request(request.into_inner().try_into()?);
    let response = self
      .0
      .create_volume(request)
      .await?
      .record_response()
      .try_into()?;
    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "controller.delete_volume",
    skip(self, request),
    fields(request)
  )]
  async fn delete_volume(
    &self,
    request: tonic::Request<proto::DeleteVolumeRequest>,
  ) -> Result<tonic::Response<proto::DeleteVolumeResponse>, tonic::Status> {
    let request = record_request(request.into_inner().try_into()?);
    self.0.delete_volume(request).await?;
    let response = proto::DeleteVolumeResponse {};
    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "controller.controller_publish_volume",
    skip(self, request),
    fields(request, response)
  )]
  async fn controller_publish_volume(
    &self,
    request: tonic::Request<proto::ControllerPublishVolumeRequest>,
  ) -> Result<tonic::Response<proto::ControllerPublishVolumeResponse>, tonic::Status> {
    let request = record_request(request.into_inner().try_into()?);
    let response = self
      .0
      .controller_publish_volume(request)
      .await?
      .record_response()
      .into();
    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "controller.controller_unpublish_volume",
    skip(self, request),
    fields(request)
  )]
  async fn controller_unpublish_volume(
    &self,
    request: tonic::Request<proto::ControllerUnpublishVolumeRequest>,
  ) -> Result<tonic::Response<proto::ControllerUnpublishVolumeResponse>, tonic::Status> {
    let request = record_request(request.into_inner().try_into()?);
    self.0.controller_unpublish_volume(request).await?;
    let response = proto::ControllerUnpublishVolumeResponse {};
    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "controller.validate_volume_capabilities",
    skip(self, request),
    fields(request, response)
  )]
  async fn validate_volume_capabilities(
    &self,
    request: tonic::Request<proto::ValidateVolumeCapabilitiesRequest>,
  ) -> Result<tonic::Response<proto::ValidateVolumeCapabilitiesResponse>, tonic::Status> {
    let request = record_request(request.into_inner().try_into()?);
    let response = self
      .0
      .validate_volume_capabilities(request)
      .await?
      .record_response()
      .into();
    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "controller.list_volumes",
    skip(self, request),
    fields(request, response)
  )]
  async fn list_volumes(
    &self,
    request: tonic::Request<proto::ListVolumesRequest>,
  ) -> Result<tonic::Response<proto::ListVolumesResponse>, tonic::Status> {
    let request = record_request(request.into_inner().try_into()?);
    let response = self
      .0
      .list_volumes(request)
      .await?
      .record_response()
      .try_into()?;
    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "controller.controller_get_capabilities",
    skip(self),
    fields(response)
  )]
  async fn controller_get_capabilities(
    &self,
    _: tonic::Request<proto::ControllerGetCapabilitiesRequest>,
  ) -> Result<tonic::Response<proto::ControllerGetCapabilitiesResponse>, tonic::Status> {
    let response = self.0.capabilities().record_response().into();
    Ok(tonic::Response::new(response))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use proto::controller_server::Controller as _;
  use tonic::Code;

  struct ValidateOnly;

  impl IdentityService for ValidateOnly {
    fn name(&self) -> &str {
      "test.csi.dev"
    }

    fn version(&self) -> &str {
      "0.0.1"
    }
  }

  #[async_trait]
  impl ControllerService for ValidateOnly {
    async fn validate_volume_capabilities(
      &self,
      request: ValidateVolumeCapabilitiesRequest,
    ) -> Result<ValidateVolumeCapabilitiesResponse, ValidateVolumeCapabilitiesError> {
      Err(ValidateVolumeCapabilitiesError::VolumeNotFound(
        request.volume_id().to_owned(),
      ))
    }
  }

  #[tokio::test]
  async fn unimplemented_by_default() {
    let controller = Controller::new(Arc::new(ValidateOnly));
    let status = controller
      .delete_volume(tonic::Request::new(proto::DeleteVolumeRequest {
        volume_id: "vol-1".into(),
        ..Default::default()
      }))
      .await
      .unwrap_err();

    assert_eq!(status.code(), Code::Unimplemented);
  }

  #[tokio::test]
  async fn service_errors_map_to_codes() {
    let controller = Controller::new(Arc::new(ValidateOnly));
    let status = controller
      .validate_volume_capabilities(tonic::Request::new(
        proto::ValidateVolumeCapabilitiesRequest {
          volume_id: "vol-1".into(),
          volume_capabilities: vec![proto::VolumeCapability {
            access_mode: Some(proto::volume_capability::AccessMode { mode: 1 }),
            access_type: Some(proto::volume_capability::AccessType::Block(
              proto::volume_capability::BlockVolume {},
            )),
          }],
          ..Default::default()
        },
      ))
      .await
      .unwrap_err();

    assert_eq!(status.code(), Code::NotFound);
    assert_eq!(status.message(), "volume does not exist: vol-1");
  }

  #[tokio::test]
  async fn reports_controller_service() {
    use proto::identity_server::Identity as _;

    let controller = Controller::new(Arc::new(ValidateOnly));
    let response = controller
      .get_plugin_capabilities(tonic::Request::new(
        proto::GetPluginCapabilitiesRequest {},
      ))
      .await
      .unwrap()
      .into_inner();

    assert_eq!(response.capabilities.len(), 1);
  }
}
