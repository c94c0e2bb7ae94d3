use super::{CapacityRange, VolumeCapability};
use crate::{proto, utils::required, volume::capabilities_from_proto};
use std::{
  collections::HashMap,
  convert::{TryFrom, TryInto},
};
use thiserror::Error;
use tonic::{Code, Status};

/// Provisions a new volume. `name` is chosen by the orchestrator and is the
/// idempotency key: repeating a request must not create a second volume.
#[derive(Debug)]
pub struct CreateVolumeRequest {
  name: String,
  capacity_range: CapacityRange,
  volume_capabilities: Vec<VolumeCapability>,
  parameters: HashMap<String, String>,
}

impl CreateVolumeRequest {
  #[inline]
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Both bounds unset when the request carried no range.
  #[inline]
  pub fn capacity_range(&self) -> CapacityRange {
    self.capacity_range
  }

  /// Every entry must be satisfied by the new volume. Never empty.
  #[inline]
  pub fn volume_capabilities(&self) -> &[VolumeCapability] {
    &self.volume_capabilities
  }

  /// Storage class parameters, opaque to the orchestrator.
  #[inline]
  pub fn parameters(&self) -> &HashMap<String, String> {
    &self.parameters
  }
}

impl TryFrom<proto::CreateVolumeRequest> for CreateVolumeRequest {
  type Error = Status;

  fn try_from(value: proto::CreateVolumeRequest) -> Result<Self, Self::Error> {
    let capacity_range = match value.capacity_range {
      Some(range) => range.try_into()?,
      None => CapacityRange::default(),
    };

    Ok(CreateVolumeRequest {
      name: required(value.name, "CreateVolumeRequest.name")?,
      capacity_range,
      volume_capabilities: capabilities_from_proto(
        value.volume_capabilities,
        "CreateVolumeRequest.volume_capabilities",
      )?,
      parameters: value.parameters,
    })
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CreateVolumeError {
  /// A volume with this name exists with a different size or tier.
  #[error("volume already exists but is incompatible: {0}")]
  AlreadyExists(String),

  #[error("unsupported capacity range: {0}")]
  UnsupportedCapacityRange(String),

  #[error("unsupported volume capability: {0}")]
  UnsupportedCapability(String),

  /// A storage class parameter is unknown or malformed.
  #[error("invalid parameter: {0}")]
  InvalidParameter(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] Status),
}

impl From<CreateVolumeError> for Status {
  fn from(value: CreateVolumeError) -> Self {
    let code = match value {
      CreateVolumeError::Other(status) => return status,
      CreateVolumeError::AlreadyExists(_) => Code::AlreadyExists,
      CreateVolumeError::UnsupportedCapacityRange(_) => Code::OutOfRange,
      CreateVolumeError::UnsupportedCapability(_) | CreateVolumeError::InvalidParameter(_) => {
        Code::InvalidArgument
      }
    };

    Status::new(code, value.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::proto::volume_capability::{access_mode::Mode, AccessMode, AccessType, MountVolume};
  use test_case::test_case;

  fn capability() -> proto::VolumeCapability {
    proto::VolumeCapability {
      access_mode: Some(AccessMode {
        mode: Mode::SingleNodeWriter as i32,
      }),
      access_type: Some(AccessType::Mount(MountVolume::default())),
    }
  }

  #[test]
  fn missing_capacity_range_is_unset() {
    let request = CreateVolumeRequest::try_from(proto::CreateVolumeRequest {
      name: "pvc-1".into(),
      volume_capabilities: vec![capability()],
      ..Default::default()
    })
    .unwrap();

    assert_eq!(request.capacity_range(), CapacityRange::default());
    assert!(request.parameters().is_empty());
  }

  #[test_case("", vec![capability()] ; "empty name")]
  #[test_case("pvc-1", vec![] ; "no capabilities")]
  fn invalid_requests(name: &str, volume_capabilities: Vec<proto::VolumeCapability>) {
    let status = CreateVolumeRequest::try_from(proto::CreateVolumeRequest {
      name: name.into(),
      volume_capabilities,
      ..Default::default()
    })
    .unwrap_err();

    assert_eq!(status.code(), Code::InvalidArgument);
  }

  #[test]
  fn capacity_errors_are_out_of_range() {
    let status: Status = CreateVolumeError::UnsupportedCapacityRange("too small".into()).into();
    assert_eq!(status.code(), Code::OutOfRange);
  }
}
