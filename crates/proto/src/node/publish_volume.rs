use super::{Secrets, VolumeCapability};
use crate::{
  proto,
  utils::{optional_path, required, required_path},
  volume::capability_from_proto,
};
use std::{
  collections::HashMap,
  convert::TryFrom,
  path::{Path, PathBuf},
};
use thiserror::Error;
use tonic::{Code, Status};

/// Exposes a staged volume to one workload at `target_path`.
#[derive(Debug)]
pub struct NodePublishVolumeRequest {
  volume_id: String,
  publish_context: HashMap<String, String>,
  staging_target_path: Option<PathBuf>,
  target_path: PathBuf,
  volume_capability: VolumeCapability,
  readonly: bool,
  secrets: Secrets,
}

impl NodePublishVolumeRequest {
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  #[inline]
  pub fn publish_context(&self) -> &HashMap<String, String> {
    &self.publish_context
  }

  /// Where `NodeStageVolume` mounted the volume. Only plugins without a
  /// stage step receive `None`.
  #[inline]
  pub fn staging_target_path(&self) -> Option<&Path> {
    self.staging_target_path.as_deref()
  }

  /// Absolute workload path. The plugin creates it if missing.
  #[inline]
  pub fn target_path(&self) -> &Path {
    &self.target_path
  }

  #[inline]
  pub fn volume_capability(&self) -> &VolumeCapability {
    &self.volume_capability
  }

  #[inline]
  pub fn readonly(&self) -> bool {
    self.readonly
  }

  #[inline]
  pub fn secrets(&self) -> &Secrets {
    &self.secrets
  }
}

impl TryFrom<proto::NodePublishVolumeRequest> for NodePublishVolumeRequest {
  type Error = Status;

  fn try_from(value: proto::NodePublishVolumeRequest) -> Result<Self, Self::Error> {
    Ok(NodePublishVolumeRequest {
      volume_id: required(value.volume_id, "NodePublishVolumeRequest.volume_id")?,
      staging_target_path: optional_path(
        value.staging_target_path,
        "NodePublishVolumeRequest.staging_target_path",
      )?,
      target_path: required_path(value.target_path, "NodePublishVolumeRequest.target_path")?,
      volume_capability: capability_from_proto(
        value.volume_capability,
        "NodePublishVolumeRequest.volume_capability",
      )?,
      publish_context: value.publish_context,
      readonly: value.readonly,
      secrets: value.secrets.into(),
    })
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum NodePublishVolumeError {
  /// The request carried no staging path although the node stages volumes.
  #[error("staging target path not set: {0}")]
  StagingTargetPathNotSet(String),

  #[error("invalid publish context: {0}")]
  InvalidPublishContext(String),

  #[error("failed to mount volume: {0}")]
  MountFailed(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] Status),
}

impl From<NodePublishVolumeError> for Status {
  fn from(value: NodePublishVolumeError) -> Self {
    let code = match value {
      NodePublishVolumeError::Other(status) => return status,
      NodePublishVolumeError::StagingTargetPathNotSet(_)
      | NodePublishVolumeError::InvalidPublishContext(_) => Code::InvalidArgument,
      NodePublishVolumeError::MountFailed(_) => Code::Internal,
    };

    Status::new(code, value.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::proto::volume_capability::{access_mode::Mode, AccessMode, AccessType, MountVolume};

  #[test]
  fn staging_path_is_optional_on_the_wire() {
    let raw = proto::NodePublishVolumeRequest {
      volume_id: "vol-1".into(),
      target_path: "/var/lib/pods/vol-1".into(),
      volume_capability: Some(proto::VolumeCapability {
        access_mode: Some(AccessMode {
          mode: Mode::SingleNodeWriter as i32,
        }),
        access_type: Some(AccessType::Mount(MountVolume::default())),
      }),
      readonly: true,
      ..Default::default()
    };

    let request = NodePublishVolumeRequest::try_from(raw).unwrap();
    assert_eq!(request.staging_target_path(), None);
    assert!(request.readonly());
  }

  #[test]
  fn rejects_relative_target() {
    let raw = proto::NodePublishVolumeRequest {
      volume_id: "vol-1".into(),
      target_path: "pods/vol-1".into(),
      ..Default::default()
    };

    let status = NodePublishVolumeRequest::try_from(raw).unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
    assert!(status.message().contains("not absolute"));
  }

  #[test]
  fn missing_staging_path_is_invalid_argument() {
    let status: Status = NodePublishVolumeError::StagingTargetPathNotSet("required".into()).into();

    assert_eq!(status.code(), Code::InvalidArgument);
    assert_eq!(status.message(), "staging target path not set: required");
  }
}
