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

#[derive(Debug)]
pub struct NodeGetVolumeStatsRequest {
  volume_id: String,
  volume_path: PathBuf,
}

impl NodeGetVolumeStatsRequest {
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  /// Any path the volume is currently staged or published at.
  #[inline]
  pub fn volume_path(&self) -> &Path {
    &self.volume_path
  }
}

impl TryFrom<proto::NodeGetVolumeStatsRequest> for NodeGetVolumeStatsRequest {
  type Error = Status;

  fn try_from(value: proto::NodeGetVolumeStatsRequest) -> Result<Self, Self::Error> {
    Ok(NodeGetVolumeStatsRequest {
      volume_id: required(value.volume_id, "NodeGetVolumeStatsRequest.volume_id")?,
      volume_path: required_path(value.volume_path, "NodeGetVolumeStatsRequest.volume_path")?,
    })
  }
}

/// Usage reporting is not offered by this plugin, so the response never
/// carries any entries.
#[derive(Debug, Default)]
pub struct NodeGetVolumeStatsResponse;

impl From<NodeGetVolumeStatsResponse> for proto::NodeGetVolumeStatsResponse {
  fn from(_: NodeGetVolumeStatsResponse) -> Self {
    proto::NodeGetVolumeStatsResponse::default()
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum NodeGetVolumeStatsError {
  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] Status),
}

impl From<NodeGetVolumeStatsError> for Status {
  fn from(value: NodeGetVolumeStatsError) -> Self {
    match value {
      NodeGetVolumeStatsError::Other(status) => status,
    }
  }
}
