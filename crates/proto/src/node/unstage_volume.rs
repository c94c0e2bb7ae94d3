use crate::{
  proto,
  utils::{required, required_path},
};
use std::{
  convert::TryFrom,
  path::{Path, PathBuf},
};
use thiserror::Error;
use tonic::Status;

/// Asks the node to tear down the global mount made by `NodeStageVolume`.
#[derive(Debug)]
pub struct NodeUnstageVolumeRequest {
  volume_id: String,
  staging_target_path: PathBuf,
}

impl NodeUnstageVolumeRequest {
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  /// Absolute path the volume was staged at.
  #[inline]
  pub fn staging_target_path(&self) -> &Path {
    &self.staging_target_path
  }
}

impl TryFrom<proto::NodeUnstageVolumeRequest> for NodeUnstageVolumeRequest {
  type Error = Status;

  fn try_from(value: proto::NodeUnstageVolumeRequest) -> Result<Self, Self::Error> {
    Ok(NodeUnstageVolumeRequest {
      volume_id: required(value.volume_id, "NodeUnstageVolumeRequest.volume_id")?,
      staging_target_path: required_path(
        value.staging_target_path,
        "NodeUnstageVolumeRequest.staging_target_path",
      )?,
    })
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum NodeUnstageVolumeError {
  /// The staging path could not be unmounted. Carries the mounter's message
  /// verbatim.
  #[error("{0}")]
  UnmountFailed(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] Status),
}

impl From<NodeUnstageVolumeError> for Status {
  fn from(value: NodeUnstageVolumeError) -> Self {
    match value {
      NodeUnstageVolumeError::UnmountFailed(message) => Status::unknown(message),
      NodeUnstageVolumeError::Other(status) => status,
    }
  }
}
