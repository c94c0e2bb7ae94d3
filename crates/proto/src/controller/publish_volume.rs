use super::VolumeCapability;
use crate::{proto, utils::required, volume::capability_from_proto};
use std::{collections::HashMap, convert::TryFrom};
use thiserror::Error;
use tonic::Status;

/// Attaches a volume to the node named by `node_id`, which matches the id
/// the node plugin reports from `NodeGetInfo`.
#[derive(Debug)]
pub struct ControllerPublishVolumeRequest {
  volume_id: String,
  node_id: String,
  volume_capability: VolumeCapability,
  volume_context: HashMap<String, String>,
}

impl ControllerPublishVolumeRequest {
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  #[inline]
  pub fn node_id(&self) -> &str {
    &self.node_id
  }

  #[inline]
  pub fn volume_capability(&self) -> &VolumeCapability {
    &self.volume_capability
  }

  /// The context `CreateVolume` attached to the volume.
  #[inline]
  pub fn volume_context(&self) -> &HashMap<String, String> {
    &self.volume_context
  }
}

impl TryFrom<proto::ControllerPublishVolumeRequest> for ControllerPublishVolumeRequest {
  type Error = Status;

  fn try_from(value: proto::ControllerPublishVolumeRequest) -> Result<Self, Self::Error> {
    let volume_capability = capability_from_proto(
      value.volume_capability,
      "ControllerPublishVolumeRequest.volume_capability",
    )?;

    Ok(ControllerPublishVolumeRequest {
      volume_id: required(value.volume_id, "ControllerPublishVolumeRequest.volume_id")?,
      node_id: required(value.node_id, "ControllerPublishVolumeRequest.node_id")?,
      volume_capability,
      volume_context: value.volume_context,
    })
  }
}

/// Carries the publish context handed to the node's stage and publish
/// calls. It must not hold secrets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerPublishVolumeResponse {
  publish_context: HashMap<String, String>,
}

impl ControllerPublishVolumeResponse {
  pub fn new(publish_context: HashMap<String, String>) -> Self {
    ControllerPublishVolumeResponse { publish_context }
  }

  #[inline]
  pub fn publish_context(&self) -> &HashMap<String, String> {
    &self.publish_context
  }
}

impl From<ControllerPublishVolumeResponse> for proto::ControllerPublishVolumeResponse {
  fn from(value: ControllerPublishVolumeResponse) -> Self {
    proto::ControllerPublishVolumeResponse {
      publish_context: value.publish_context,
    }
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ControllerPublishVolumeError {
  #[error("volume does not exist: {0}")]
  VolumeDoesNotExist(String),

  /// The volume is attached to a different node.
  #[error("{0}")]
  PublishedToAnotherNode(String),

  /// The node has no free attachment slot left.
  #[error("{0}")]
  MaxVolumesAttached(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] Status),
}

impl From<ControllerPublishVolumeError> for Status {
  fn from(value: ControllerPublishVolumeError) -> Status {
    let message = value.to_string();
    match value {
      ControllerPublishVolumeError::VolumeDoesNotExist(_) => Status::not_found(message),
      ControllerPublishVolumeError::PublishedToAnotherNode(_) => {
        Status::failed_precondition(message)
      }
      ControllerPublishVolumeError::MaxVolumesAttached(_) => Status::resource_exhausted(message),
      ControllerPublishVolumeError::Other(status) => status,
    }
  }
}
