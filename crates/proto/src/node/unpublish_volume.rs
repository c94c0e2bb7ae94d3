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

/// Asks the node to remove the bind mount made by `NodePublishVolume`.
#[derive(Debug)]
pub struct NodeUnpublishVolumeRequest {
  volume_id: String,
  target_path: PathBuf,
}

impl NodeUnpublishVolumeRequest {
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  /// Absolute path of the workload mount.
  #[inline]
  pub fn target_path(&self) -> &Path {
    &self.target_path
  }
}

impl TryFrom<proto::NodeUnpublishVolumeRequest> for NodeUnpublishVolumeRequest {
  type Error = Status;

  fn try_from(value: proto::NodeUnpublishVolumeRequest) -> Result<Self, Self::Error> {
    Ok(NodeUnpublishVolumeRequest {
      volume_id: required(value.volume_id, "NodeUnpublishVolumeRequest.volume_id")?,
      target_path: required_path(value.target_path, "NodeUnpublishVolumeRequest.target_path")?,
    })
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum NodeUnpublishVolumeError {
  /// The target path could not be unmounted. Carries the mounter's message
  /// verbatim.
  #[error("{0}")]
  UnmountFailed(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] Status),
}

impl From<NodeUnpublishVolumeError> for Status {
  fn from(value: NodeUnpublishVolumeError) -> Self {
    match value {
      NodeUnpublishVolumeError::UnmountFailed(message) => Status::unknown(message),
      NodeUnpublishVolumeError::Other(status) => status,
    }
  }
}
