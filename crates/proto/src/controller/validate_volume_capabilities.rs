use super::VolumeCapability;
use crate::{proto, utils::required, volume::capabilities_from_proto};
use std::{collections::HashMap, convert::TryFrom};
use thiserror::Error;
use tonic::Status;

/// Checks whether an existing volume can be used with every listed
/// capability.
#[derive(Debug)]
pub struct ValidateVolumeCapabilitiesRequest {
  volume_id: String,
  volume_context: HashMap<String, String>,
  volume_capabilities: Vec<VolumeCapability>,
  parameters: HashMap<String, String>,
}

impl ValidateVolumeCapabilitiesRequest {
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  #[inline]
  pub fn volume_context(&self) -> &HashMap<String, String> {
    &self.volume_context
  }

  /// Never empty.
  #[inline]
  pub fn volume_capabilities(&self) -> &[VolumeCapability] {
    &self.volume_capabilities
  }

  /// The `CreateVolume` parameters the volume was provisioned with.
  #[inline]
  pub fn parameters(&self) -> &HashMap<String, String> {
    &self.parameters
  }
}

impl TryFrom<proto::ValidateVolumeCapabilitiesRequest> for ValidateVolumeCapabilitiesRequest {
  type Error = Status;

  fn try_from(value: proto::ValidateVolumeCapabilitiesRequest) -> Result<Self, Self::Error> {
    Ok(ValidateVolumeCapabilitiesRequest {
      volume_id: required(value.volume_id, "ValidateVolumeCapabilitiesRequest.volume_id")?,
      volume_capabilities: capabilities_from_proto(
        value.volume_capabilities,
        "ValidateVolumeCapabilitiesRequest.volume_capabilities",
      )?,
      volume_context: value.volume_context,
      parameters: value.parameters,
    })
  }
}

/// What the plugin confirmed, echoed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmed {
  volume_context: HashMap<String, String>,
  volume_capabilities: Vec<VolumeCapability>,
  parameters: HashMap<String, String>,
}

impl Confirmed {
  pub fn new(
    volume_context: HashMap<String, String>,
    volume_capabilities: Vec<VolumeCapability>,
    parameters: HashMap<String, String>,
  ) -> Self {
    Confirmed {
      volume_context,
      volume_capabilities,
      parameters,
    }
  }

  #[inline]
  pub fn volume_capabilities(&self) -> &[VolumeCapability] {
    &self.volume_capabilities
  }
}

impl From<Confirmed> for proto::validate_volume_capabilities_response::Confirmed {
  fn from(value: Confirmed) -> Self {
    proto::validate_volume_capabilities_response::Confirmed {
      volume_context: value.volume_context,
      volume_capabilities: value
        .volume_capabilities
        .into_iter()
        .map(Into::into)
        .collect(),
      parameters: value.parameters,
    }
  }
}

/// Either a confirmation, or a message saying why the volume does not fit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidateVolumeCapabilitiesResponse {
  Confirmed(Confirmed),
  Message(String),
}

impl From<ValidateVolumeCapabilitiesResponse> for proto::ValidateVolumeCapabilitiesResponse {
  fn from(value: ValidateVolumeCapabilitiesResponse) -> Self {
    match value {
      ValidateVolumeCapabilitiesResponse::Confirmed(confirmed) => {
        proto::ValidateVolumeCapabilitiesResponse {
          confirmed: Some(confirmed.into()),
          message: String::new(),
        }
      }
      ValidateVolumeCapabilitiesResponse::Message(message) => {
        proto::ValidateVolumeCapabilitiesResponse {
          confirmed: None,
          message,
        }
      }
    }
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ValidateVolumeCapabilitiesError {
  #[error("volume does not exist: {0}")]
  VolumeNotFound(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] Status),
}

impl From<ValidateVolumeCapabilitiesError> for Status {
  fn from(value: ValidateVolumeCapabilitiesError) -> Self {
    let message = value.to_string();
    match value {
      ValidateVolumeCapabilitiesError::VolumeNotFound(_) => Status::not_found(message),
      ValidateVolumeCapabilitiesError::Other(status) => status,
    }
  }
}
