mod capabilities;
mod get_info;
mod get_volume_stats;
mod publish_volume;
mod stage_volume;
mod unpublish_volume;
mod unstage_volume;

use crate::{
  plugin, proto,
  secrets::Secrets,
  utils::{record_request, Record},
  IdentityService,
};
use async_trait::async_trait;
use std::{convert::TryInto, sync::Arc};
use tracing::instrument;

pub use crate::volume::*;
pub use capabilities::*;
pub use get_info::*;
pub use get_volume_stats::*;
pub use publish_volume::*;
pub use stage_volume::*;
pub use unpublish_volume::*;
pub use unstage_volume::*;

/// Node half of a CSI plugin, running on the host the volume is attached
/// to. Mount operations must tolerate being repeated: a path that is
/// already in the requested state is a success.
#[async_trait]
pub trait NodeService: IdentityService {
  /// Advertised through `NodeGetCapabilities`.
  #[inline]
  fn capabilities(&self) -> NodeCapabilities {
    NodeCapabilities::empty()
  }

  /// Prepares the device at a node-global staging path, once per volume
  /// and before any `publish_volume`.
  #[allow(unused_variables)]
  async fn stage_volume(&self, request: NodeStageVolumeRequest) -> Result<(), NodeStageVolumeError> {
    unsupported!("NodeStageVolume")
  }

  /// Undoes `stage_volume`.
  #[allow(unused_variables)]
  async fn unstage_volume(
    &self,
    request: NodeUnstageVolumeRequest,
  ) -> Result<(), NodeUnstageVolumeError> {
    unsupported!("NodeUnstageVolume")
  }

  /// Exposes the volume to a workload at its target path.
  async fn publish_volume(
    &self,
    request: NodePublishVolumeRequest,
  ) -> Result<(), NodePublishVolumeError>;

  /// Undoes `publish_volume`.
  async fn unpublish_volume(
    &self,
    request: NodeUnpublishVolumeRequest,
  ) -> Result<(), NodeUnpublishVolumeError>;

  #[allow(unused_variables)]
  async fn get_volume_stats(
    &self,
    request: NodeGetVolumeStatsRequest,
  ) -> Result<NodeGetVolumeStatsResponse, NodeGetVolumeStatsError> {
    unsupported!("NodeGetVolumeStats")
  }

  async fn get_info(&self) -> Result<NodeGetInfoResponse, NodeGetInfoError>;
}

pub(crate) struct Node<T: NodeService>(Arc<T>);

impl<T: NodeService> Node<T> {
  pub(crate) fn new(inner: Arc<T>) -> Self {
    Node(inner)
  }
}

impl<T: NodeService> Clone for Node<T> {
  fn clone(&self) -> Self {
    Node(self.0.clone())
  }
}

#[async_trait]
impl<T: NodeService> proto::identity_server::Identity for Node<T> {
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
    let response = plugin::get_capabilities(&*self.0, false).record_response();

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
impl<T: NodeService> proto::node_server::Node for Node<T> {
  #[instrument(name = "node.stage_volume", skip(self, request), fields(request))]
  async fn node_stage_volume(
    &self,
    request: tonic::Request<proto::NodeStageVolumeRequest>,
  ) -> Result<tonic::Response<proto::NodeStageVolumeResponse>, tonic::Status> {
    let request = record_request(request.into_inner().try_into()?);
    self.0.stage_volume(request).await?;
    let response = proto::NodeStageVolumeResponse {};
    Ok(tonic::Response::new(response))
  }

  #[instrument(name = "node.unstage_volume", skip(self, request), fields(request))]
  async fn node_unstage_volume(
    &self,
    request: tonic::Request<proto::NodeUnstageVolumeRequest>,
  ) -> Result<tonic::Response<proto::NodeUnstageVolumeResponse>, tonic::Status> {
    let request = record_request(request.into_inner().try_into()?);
    self.0.unstage_volume(request).await?;
    let response = proto::NodeUnstageVolumeResponse {};
    Ok(tonic::Response::new(response))
  }

  #[instrument(name = "node.publish_volume", skip(self, request), fields(request))]
  async fn node_publish_volume(
    &self,
    request: tonic::Request<proto::NodePublishVolumeRequest>,
  ) -> Result<tonic::Response<proto::NodePublishVolumeResponse>, tonic::Status> {
    let request = record_request(request.into_inner().try_into()?);
    self.0.publish_volume(request).await?;
    let response = proto::NodePublishVolumeResponse {};
    Ok(tonic::Response::new(response))
  }

  #[instrument(name = "node.unpublish_volume", skip(self, request), fields(request))]
  async fn node_unpublish_volume(
    &self,
    request: tonic::Request<proto::NodeUnpublishVolumeRequest>,
  ) -> Result<tonic::Response<proto::NodeUnpublishVolumeResponse>, tonic::Status> {
    let request = record_request(request.into_inner().try_into()?);
    self.0.unpublish_volume(request).await?;
    let response = proto::NodeUnpublishVolumeResponse {};
    Ok(tonic::Response::new(response))
  }

  #[instrument(
    name = "node.get_volume_stats",
    skip(self, request),
    fields(request, response)
  )]
  async fn node_get_volume_stats(
    &self,
    request: tonic::Request<proto::NodeGetVolumeStatsRequest>,
  ) -> Result<tonic::Response<proto::NodeGetVolumeStatsResponse>, tonic::Status> {
    let request = record_request(request.into_inner().try_into()?);
    let response = self
      .0
      .get_volume_stats(request)
      .await?
      .record_response()
      .into();
    Ok(tonic::Response::new(response))
  }

  #[instrument(name = "node.get_capabilities", skip(self), fields(response))]
  async fn node_get_capabilities(
    &self,
    _: tonic::Request<proto::NodeGetCapabilitiesRequest>,
  ) -> Result<tonic::Response<proto::NodeGetCapabilitiesResponse>, tonic::Status> {
    let response = self.0.capabilities().record_response().into();
    Ok(tonic::Response::new(response))
  }

  #[instrument(name = "node.get_info", skip(self), fields(response))]
  async fn node_get_info(
    &self,
    _: tonic::Request<proto::NodeGetInfoRequest>,
  ) -> Result<tonic::Response<proto::NodeGetInfoResponse>, tonic::Status> {
    let response = self.0.get_info().await?.record_response().try_into()?;
    Ok(tonic::Response::new(response))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use proto::node_server::Node as _;
  use tonic::Code;

  struct Minimal;

  impl IdentityService for Minimal {
    fn name(&self) -> &str {
      "test.csi.dev"
    }

    fn version(&self) -> &str {
      "0.0.1"
    }
  }

  #[async_trait]
  impl NodeService for Minimal {
    async fn publish_volume(
      &self,
      _: NodePublishVolumeRequest,
    ) -> Result<(), NodePublishVolumeError> {
      Ok(())
    }

    async fn unpublish_volume(
      &self,
      _: NodeUnpublishVolumeRequest,
    ) -> Result<(), NodeUnpublishVolumeError> {
      Ok(())
    }

    async fn get_info(&self) -> Result<NodeGetInfoResponse, NodeGetInfoError> {
      Ok(NodeGetInfoResponse::new("node-1"))
    }
  }

  #[tokio::test]
  async fn defaults_are_unimplemented() {
    let node = Node::new(Arc::new(Minimal));
    let status = node
      .node_get_volume_stats(tonic::Request::new(proto::NodeGetVolumeStatsRequest {
        volume_id: "vol-1".into(),
        volume_path: "/mnt/vol-1".into(),
        staging_target_path: String::new(),
      }))
      .await
      .unwrap_err();

    assert_eq!(status.code(), Code::Unimplemented);
    assert!(status.message().contains("NodeGetVolumeStats"));
  }

  #[tokio::test]
  async fn invalid_requests_never_reach_the_service() {
    let node = Node::new(Arc::new(Minimal));
    let status = node
      .node_unpublish_volume(tonic::Request::new(proto::NodeUnpublishVolumeRequest {
        volume_id: String::new(),
        target_path: "/mnt/vol-1".into(),
      }))
      .await
      .unwrap_err();

    assert_eq!(status.code(), Code::InvalidArgument);
  }

  #[tokio::test]
  async fn get_info_is_converted() {
    let node = Node::new(Arc::new(Minimal));
    let response = node
      .node_get_info(tonic::Request::new(proto::NodeGetInfoRequest {}))
      .await
      .unwrap()
      .into_inner();

    assert_eq!(response.node_id, "node-1");
    assert_eq!(response.max_volumes_per_node, 0);
    assert_eq!(response.accessible_topology, None);
  }
}
