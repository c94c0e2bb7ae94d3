use crate::{proto, utils::required};
use std::convert::TryFrom;
use thiserror::Error;
use tonic::Status;

/// Deprovisions a volume. Deleting a volume that no longer exists succeeds.
#[derive(Debug)]
pub struct DeleteVolumeRequest {
  volume_id: String,
}

impl DeleteVolumeRequest {
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }
}

impl TryFrom<proto::DeleteVolumeRequest> for DeleteVolumeRequest {
  type Error = Status;

  fn try_from(value: proto::DeleteVolumeRequest) -> Result<Self, Self::Error> {
    let volume_id = required(value.volume_id, "DeleteVolumeRequest.volume_id")?;
    Ok(DeleteVolumeRequest { volume_id })
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DeleteVolumeError {
  /// The volume is still attached somewhere and must be unpublished first.
  #[error("{0}")]
  VolumeInUse(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] Status),
}

impl From<DeleteVolumeError> for Status {
  fn from(value: DeleteVolumeError) -> Status {
    match value {
      DeleteVolumeError::VolumeInUse(message) => Status::failed_precondition(message),
      DeleteVolumeError::Other(status) => status,
    }
  }
}
