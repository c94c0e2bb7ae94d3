use super::Topology;
use crate::proto;
use std::{convert::TryFrom, num::NonZeroU64};
use thiserror::Error;
use tonic::Status;

/// Identity of the node a plugin runs on. `node_id` is what the controller
/// later receives in `ControllerPublishVolume`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeGetInfoResponse {
  node_id: String,
  /// `None` leaves the attach limit to the orchestrator.
  max_volumes_per_node: Option<NonZeroU64>,
  /// Topology segments, such as `{"region": "rma"}`, the node can reach.
  accessible_topology: Option<Topology>,
}

impl NodeGetInfoResponse {
  pub fn new(node_id: impl Into<String>) -> Self {
    NodeGetInfoResponse {
      node_id: node_id.into(),
      max_volumes_per_node: None,
      accessible_topology: None,
    }
  }

  pub fn with_max_volumes_per_node(mut self, max: u64) -> Self {
    self.max_volumes_per_node = NonZeroU64::new(max);
    self
  }

  pub fn with_accessible_topology(mut self, topology: Topology) -> Self {
    self.accessible_topology = Some(topology);
    self
  }

  #[inline]
  pub fn node_id(&self) -> &str {
    &self.node_id
  }

  #[inline]
  pub fn max_volumes_per_node(&self) -> Option<NonZeroU64> {
    self.max_volumes_per_node
  }

  #[inline]
  pub fn accessible_topology(&self) -> Option<&Topology> {
    self.accessible_topology.as_ref()
  }
}

impl TryFrom<NodeGetInfoResponse> for proto::NodeGetInfoResponse {
  type Error = Status;

  fn try_from(value: NodeGetInfoResponse) -> Result<Self, Self::Error> {
    let max_volumes_per_node = match value.max_volumes_per_node {
      Some(max) => i64::try_from(max.get())
        .map_err(|_| Status::out_of_range("max_volumes_per_node does not fit in an int64"))?,
      None => 0,
    };

    Ok(proto::NodeGetInfoResponse {
      node_id: value.node_id,
      max_volumes_per_node,
      accessible_topology: value
        .accessible_topology
        .map(|segments| proto::Topology { segments }),
    })
  }
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum NodeGetInfoError {
  #[error(transparent)]
  #[doc(hidden)]
  Other(#[from] Status),
}

impl From<NodeGetInfoError> for Status {
  fn from(value: NodeGetInfoError) -> Self {
    match value {
      NodeGetInfoError::Other(status) => status,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tonic::Code;

  #[test]
  fn unset_limit_is_zero_on_the_wire() {
    let response = proto::NodeGetInfoResponse::try_from(NodeGetInfoResponse::new("node-1")).unwrap();

    assert_eq!(response.node_id, "node-1");
    assert_eq!(response.max_volumes_per_node, 0);
    assert_eq!(response.accessible_topology, None);
  }

  #[test]
  fn oversized_limit_is_rejected() {
    let info = NodeGetInfoResponse::new("node-1").with_max_volumes_per_node(u64::MAX);
    let status = proto::NodeGetInfoResponse::try_from(info).unwrap_err();

    assert_eq!(status.code(), Code::OutOfRange);
  }
}
