use super::{Volume, VolumeStatus};
use crate::proto;
use std::{
  convert::{TryFrom, TryInto},
  num::NonZeroU32,
};
use thiserror::Error;
use tonic::Status;

/// One page of the volume listing.
#[derive(Debug)]
pub struct ListVolumesRequest {
  max_entries: Option<NonZeroU32>,
  starting_token: Option<String>,
}

impl ListVolumesRequest {
  /// Page size. `None` asks for every remaining volume.
  #[inline]
  pub fn max_entries(&self) -> Option<NonZeroU32> {
    self.max_entries
  }

  /// The `next_token` of the previous page.
  #[inline]
  pub fn starting_token(&self) -> Option<&str> {
    self.starting_token.as_deref()
  }
}

impl TryFrom<proto::ListVolumesRequest> for ListVolumesRequest {
  type Error = Status;

  fn try_from(value: proto::ListVolumesRequest) -> Result<Self, Self::Error> {
    let max_entries = u32::try_from(value.max_entries)
      .map_err(|_| Status::invalid_argument("ListVolumesRequest.max_entries must not be negative"))?;

    Ok(ListVolumesRequest {
      max_entries: NonZeroU32::new(max_entries),
      starting_token: Some(value.starting_token).filter(|t| !t.is_empty()),
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeListEntry {
  volume: Volume,
  status: Option<VolumeStatus>,
}

impl VolumeListEntry {
  /// `status` is only reported by plugins advertising published nodes.
  pub fn new(volume: Volume, status: Option<VolumeStatus>) -> Self {
    VolumeListEntry { volume, status }
  }

  #[inline]
  pub fn volume(&self) -> &Volume {
    &self.volume
  }

  #[inline]
  pub fn status(&self) -> Option<&VolumeStatus> {
    self.status.as_ref()
  }
}

impl TryFrom<VolumeListEntry> for proto::list_volumes_response::Entry {
  type Error = Status;

  fn try_from(value: VolumeListEntry) -> Result<Self, Self::Error> {
    Ok(proto::list_volumes_response::Entry {
      volume: Some(value.volume.try_into()?),
      status: value.status.map(Into::into),
    })
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListVolumesResponse {
  entries: Vec<VolumeListEntry>,
  next_token: Option<String>,
}

impl ListVolumesResponse {
  /// `next_token` is `None` on the last page.
  pub fn new(entries: Vec<VolumeListEntry>, next_token: Option<String>) -> Self {
    ListVolumesResponse {
      entries,
      next_token,
    }
  }

  #[inline]
  pub fn entries(&self) -> &[VolumeListEntry] {
    &self.entries
  }

  #[inline]
  pub fn next_token(&self) -> Option<&str> {
    self.next_token.as_deref()
  }
}

impl TryFrom<ListVolumesResponse> for proto::ListVolumesResponse {
  type Error = Status;

  fn try_from(value: ListVolumesResponse) -> Result<Self, Self::Error> {
    Ok(proto::ListVolumesResponse {
      entries: value
        .entries
        .into_iter()
        .map(TryInto::try_into)
        .collect::<Result<_, _>>()?,
      next_token: value.next_token.unwrap_or_default(),
    })
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ListVolumesError {
  /// The token does not point into the current listing.
  #[error("invalid starting token: {0}")]
  InvalidStartingToken(String),

  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] Status),
}

impl From<ListVolumesError> for Status {
  fn from(value: ListVolumesError) -> Self {
    match value {
      ListVolumesError::InvalidStartingToken(_) => Status::aborted(value.to_string()),
      ListVolumesError::Other(status) => status,
    }
  }
}
