use super::{Secrets, VolumeCapability};
use crate::{
  proto,
  utils::{required, required_path},
  volume::capability_from_proto,
};
use std::{
  collections::HashMap,
  convert::TryFrom,
  path::{Path, PathBuf},
};
use thiserror::Error;
use tonic::{Code, Status};

/// Makes an attached device usable on this node by formatting it if needed
/// and mounting it at a node-global staging path.
#[derive(Debug)]
pub struct NodeStageVolumeRequest {
  volume_id: String,
  publish_context: HashMap<String, String>,
  staging_target_path: PathBuf,
  volume_capability: VolumeCapability,
  secrets: Secrets,
}

impl NodeStageVolumeRequest {
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  /// Whatever `ControllerPublishVolume` returned for this node. Empty when
  /// the controller does not attach volumes.
  #[inline]
  pub fn publish_context(&self) -> &HashMap<String, String> {
    &self.publish_context
  }

  /// Absolute path, unique per volume.
  #[inline]
  pub fn staging_target_path(&self) -> &Path {
    &self.staging_target_path
  }

  #[inline]
  pub fn volume_capability(&self) -> &VolumeCapability {
    &self.volume_capability
  }

  #[inline]
  pub fn secrets(&self) -> &Secrets {
    &self.secrets
  }
}

impl TryFrom<proto::NodeStageVolumeRequest> for NodeStageVolumeRequest {
  type Error = Status;

  fn try_from(value: proto::NodeStageVolumeRequest) -> Result<Self, Self::Error> {
    Ok(NodeStageVolumeRequest {
      volume_id: required(value.volume_id, "NodeStageVolumeRequest.volume_id")?,
      staging_target_path: required_path(
        value.staging_target_path,
        "NodeStageVolumeRequest.staging_target_path",
      )?,
      volume_capability: capability_from_proto(
        value.volume_capability,
        "NodeStageVolumeRequest.volume_capability",
      )?,
      publish_context: value.publish_context,
      secrets: value.secrets.into(),
    })
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum NodeStageVolumeError {
  /// A value the node needs is absent from, or malformed in, the publish
  /// context.
  #[error("invalid publish context: {0}")]
  InvalidPublishContext(String),

  #[error("unsupported volume capability: {0}")]
  UnsupportedCapability(String),

  #[error("missing secret: {0}")]
  MissingSecret(String),

  #[error("failed to format device: {0}")]
  FormatFailed(String),

  #[error("failed to mount device: {0}")]
  MountFailed(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] Status),
}

impl From<NodeStageVolumeError> for Status {
  fn from(value: NodeStageVolumeError) -> Self {
    let code = match value {
      NodeStageVolumeError::Other(status) => return status,
      NodeStageVolumeError::InvalidPublishContext(_)
      | NodeStageVolumeError::UnsupportedCapability(_)
      | NodeStageVolumeError::MissingSecret(_) => Code::InvalidArgument,
      NodeStageVolumeError::FormatFailed(_) | NodeStageVolumeError::MountFailed(_) => {
        Code::Internal
      }
    };

    Status::new(code, value.to_string())
  }
}
