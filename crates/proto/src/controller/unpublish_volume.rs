use crate::{proto, utils::required};
use std::convert::TryFrom;
use thiserror::Error;
use tonic::Status;

/// Detaches a volume from one node, or from every node when no node is
/// named.
#[derive(Debug)]
pub struct ControllerUnpublishVolumeRequest {
  volume_id: String,
  node_id: Option<String>,
}

impl ControllerUnpublishVolumeRequest {
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  #[inline]
  pub fn node_id(&self) -> Option<&str> {
    self.node_id.as_deref()
  }
}

impl TryFrom<proto::ControllerUnpublishVolumeRequest> for ControllerUnpublishVolumeRequest {
  type Error = Status;

  fn try_from(value: proto::ControllerUnpublishVolumeRequest) -> Result<Self, Self::Error> {
    let volume_id = required(value.volume_id, "ControllerUnpublishVolumeRequest.volume_id")?;
    let node_id = Some(value.node_id).filter(|id| !id.is_empty());

    Ok(ControllerUnpublishVolumeRequest { volume_id, node_id })
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ControllerUnpublishVolumeError {
  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] Status),
}

impl From<ControllerUnpublishVolumeError> for Status {
  fn from(value: ControllerUnpublishVolumeError) -> Self {
    match value {
      ControllerUnpublishVolumeError::Other(status) => status,
    }
  }
}
