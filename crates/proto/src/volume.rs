use crate::proto;
use std::{
  collections::HashMap,
  convert::{TryFrom, TryInto},
  fmt,
  num::NonZeroU64,
};

pub type Topology = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
  capacity_bytes: Option<NonZeroU64>,
  volume_id: String,
  volume_context: HashMap<String, String>,
  accessible_topology: Vec<Topology>,
}

impl Volume {
  pub fn new(volume_id: impl Into<String>, capacity_bytes: u64) -> Self {
    Volume {
      capacity_bytes: NonZeroU64::new(capacity_bytes),
      volume_id: volume_id.into(),
      volume_context: HashMap::new(),
      accessible_topology: Vec::new(),
    }
  }

  pub fn with_context(mut self, volume_context: HashMap<String, String>) -> Self {
    self.volume_context = volume_context;
    self
  }

  pub fn with_accessible_topology(mut self, topology: Topology) -> Self {
    self.accessible_topology.push(topology);
    self
  }

  /// The capacity of the volume in bytes. `None` means unknown.
  #[inline]
  pub fn capacity_bytes(&self) -> Option<NonZeroU64> {
    self.capacity_bytes
  }

  /// The identifier for this volume, generated by the plugin.
  #[inline]
  pub fn volume_id(&self) -> &str {
    &self.volume_id
  }

  /// Opaque static properties of the volume. The CO passes these back
  /// to the node on stage and publish.
  #[inline]
  pub fn volume_context(&self) -> &HashMap<String, String> {
    &self.volume_context
  }

  #[inline]
  pub fn accessible_topology(&self) -> &[Topology] {
    &self.accessible_topology
  }
}

impl TryFrom<Volume> for proto::Volume {
  type Error = tonic::Status;

  fn try_from(value: Volume) -> Result<Self, Self::Error> {
    let capacity_bytes = match value.capacity_bytes {
      None => 0,
      Some(v) => i64::try_from(v.get())
        .map_err(|_| tonic::Status::out_of_range("Volume.capacity_bytes does not fit in int64"))?,
    };
    let volume_id = value.volume_id;
    let volume_context = value.volume_context;
    let accessible_topology = value
      .accessible_topology
      .into_iter()
      .map(|segments| proto::Topology { segments })
      .collect();

    Ok(proto::Volume {
      capacity_bytes,
      volume_id,
      volume_context,
      accessible_topology,
    })
  }
}

impl TryFrom<Volume> for proto::CreateVolumeResponse {
  type Error = tonic::Status;

  fn try_from(value: Volume) -> Result<Self, Self::Error> {
    let volume = Some(value.try_into()?);

    Ok(proto::CreateVolumeResponse { volume })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeCapability {
  access_mode: AccessMode,
  access_type: AccessType,
}

impl VolumeCapability {
  #[inline]
  pub fn access_mode(&self) -> AccessMode {
    self.access_mode
  }

  #[inline]
  pub fn access_type(&self) -> &AccessType {
    &self.access_type
  }

  /// The mount options, if the volume is to be accessed via the
  /// filesystem API.
  #[inline]
  pub fn mount(&self) -> Option<&MountVolume> {
    match &self.access_type {
      AccessType::Mount(v) => Some(v),
      AccessType::Block => None,
    }
  }
}

/// How many nodes may use a volume at once, and which of them may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum AccessMode {
  Unknown,
  SingleNodeWriter,
  SingleNodeReaderOnly,
  MultiNodeReaderOnly,
  /// Many readers, one of which may also write.
  MultiNodeSingleWriter,
  MultiNodeMultiWriter,
}

impl From<proto::volume_capability::AccessMode> for AccessMode {
  fn from(value: proto::volume_capability::AccessMode) -> Self {
    use proto::volume_capability::access_mode::Mode;

    match Mode::from_i32(value.mode) {
      Some(Mode::SingleNodeWriter) => AccessMode::SingleNodeWriter,
      Some(Mode::SingleNodeReaderOnly) => AccessMode::SingleNodeReaderOnly,
      Some(Mode::MultiNodeReaderOnly) => AccessMode::MultiNodeReaderOnly,
      Some(Mode::MultiNodeSingleWriter) => AccessMode::MultiNodeSingleWriter,
      Some(Mode::MultiNodeMultiWriter) => AccessMode::MultiNodeMultiWriter,
      Some(Mode::Unknown) | None => AccessMode::Unknown,
    }
  }
}

impl From<AccessMode> for proto::volume_capability::AccessMode {
  fn from(value: AccessMode) -> Self {
    use proto::volume_capability::access_mode::Mode;

    let mode = match value {
      AccessMode::Unknown => Mode::Unknown,
      AccessMode::SingleNodeWriter => Mode::SingleNodeWriter,
      AccessMode::SingleNodeReaderOnly => Mode::SingleNodeReaderOnly,
      AccessMode::MultiNodeReaderOnly => Mode::MultiNodeReaderOnly,
      AccessMode::MultiNodeSingleWriter => Mode::MultiNodeSingleWriter,
      AccessMode::MultiNodeMultiWriter => Mode::MultiNodeMultiWriter,
    } as i32;

    proto::volume_capability::AccessMode { mode }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessType {
  /// Raw block device.
  Block,
  /// Mounted filesystem.
  Mount(MountVolume),
}

impl From<proto::volume_capability::AccessType> for AccessType {
  fn from(value: proto::volume_capability::AccessType) -> Self {
    match value {
      proto::volume_capability::AccessType::Block(_) => AccessType::Block,
      proto::volume_capability::AccessType::Mount(v) => AccessType::Mount(v.into()),
    }
  }
}

impl From<AccessType> for proto::volume_capability::AccessType {
  fn from(value: AccessType) -> Self {
    match value {
      AccessType::Block => {
        proto::volume_capability::AccessType::Block(proto::volume_capability::BlockVolume {})
      }
      AccessType::Mount(v) => proto::volume_capability::AccessType::Mount(v.into()),
    }
  }
}

#[derive(Clone, PartialEq, Eq)]
pub struct MountVolume {
  fs_type: Option<String>,
  mount_flags: Vec<String>,
}

impl MountVolume {
  /// The filesystem type.
  #[inline]
  pub fn fs_type(&self) -> Option<&str> {
    self.fs_type.as_deref()
  }

  /// Extra mount options. They may hold credentials, so `Debug` only
  /// prints their count.
  pub fn mount_flags(&self) -> impl Iterator<Item = &str> + ExactSizeIterator {
    self.mount_flags.iter().map(|v| &**v)
  }
}

impl From<proto::volume_capability::MountVolume> for MountVolume {
  fn from(value: proto::volume_capability::MountVolume) -> Self {
    let fs_type = match value.fs_type {
      v if v.is_empty() => None,
      v => Some(v),
    };

    MountVolume {
      fs_type,
      mount_flags: value.mount_flags,
    }
  }
}

impl From<MountVolume> for proto::volume_capability::MountVolume {
  fn from(value: MountVolume) -> Self {
    proto::volume_capability::MountVolume {
      fs_type: value.fs_type.unwrap_or_default(),
      mount_flags: value.mount_flags,
    }
  }
}

impl fmt::Debug for MountVolume {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MountVolume")
      .field("fs_type", &self.fs_type)
      .field(
        "mount_flags",
        &format!("REDACTED ({} items)", self.mount_flags.len()),
      )
      .finish()
  }
}

impl TryFrom<proto::VolumeCapability> for VolumeCapability {
  type Error = tonic::Status;

  fn try_from(value: proto::VolumeCapability) -> Result<Self, Self::Error> {
    let access_mode = value
      .access_mode
      .ok_or_else(|| tonic::Status::invalid_argument("Missing access_mode for VolumeCapability"))?
      .into();

    let access_type = value
      .access_type
      .ok_or_else(|| tonic::Status::invalid_argument("Missing access_type for VolumeCapability"))?
      .into();

    Ok(VolumeCapability {
      access_mode,
      access_type,
    })
  }
}

impl From<VolumeCapability> for proto::VolumeCapability {
  fn from(value: VolumeCapability) -> Self {
    proto::VolumeCapability {
      access_mode: Some(value.access_mode.into()),
      access_type: Some(value.access_type.into()),
    }
  }
}

pub(crate) fn capabilities_from_proto(
  values: Vec<proto::VolumeCapability>,
  field: &'static str,
) -> Result<Vec<VolumeCapability>, tonic::Status> {
  if values.is_empty() {
    return Err(tonic::Status::invalid_argument(format!(
      "{} is empty",
      field
    )));
  }

  values.into_iter().map(TryInto::try_into).collect()
}

pub(crate) fn capability_from_proto(
  value: Option<proto::VolumeCapability>,
  field: &'static str,
) -> Result<VolumeCapability, tonic::Status> {
  value
    .ok_or_else(|| tonic::Status::invalid_argument(format!("{} is missing", field)))?
    .try_into()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeStatus {
  /// A list of all `node_id` of nodes that the volume in this entry
  /// is controller published on.
  published_node_ids: Vec<String>,
}

impl VolumeStatus {
  pub fn new(published_node_ids: impl IntoIterator<Item = String>) -> Self {
    VolumeStatus {
      published_node_ids: published_node_ids.into_iter().collect(),
    }
  }

  #[inline]
  pub fn published_node_ids(&self) -> &[String] {
    &self.published_node_ids
  }
}

impl From<VolumeStatus> for proto::list_volumes_response::VolumeStatus {
  fn from(value: VolumeStatus) -> Self {
    proto::list_volumes_response::VolumeStatus {
      published_node_ids: value.published_node_ids,
    }
  }
}

/// The capacity of the storage space in bytes. Either bound may be
/// unset; a zero on the wire means "unset".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapacityRange {
  required_bytes: Option<NonZeroU64>,
  limit_bytes: Option<NonZeroU64>,
}

impl CapacityRange {
  pub fn new(required_bytes: u64, limit_bytes: u64) -> Self {
    CapacityRange {
      required_bytes: NonZeroU64::new(required_bytes),
      limit_bytes: NonZeroU64::new(limit_bytes),
    }
  }

  /// Volume MUST be at least this big.
  #[inline]
  pub fn required_bytes(&self) -> Option<NonZeroU64> {
    self.required_bytes
  }

  /// Volume MUST not be bigger than this.
  #[inline]
  pub fn limit_bytes(&self) -> Option<NonZeroU64> {
    self.limit_bytes
  }
}

impl TryFrom<proto::CapacityRange> for CapacityRange {
  type Error = tonic::Status;

  fn try_from(value: proto::CapacityRange) -> Result<Self, Self::Error> {
    match (value.required_bytes, value.limit_bytes) {
      (r, _) if r < 0 => Err(tonic::Status::invalid_argument(
        "CapacityRange.required_bytes cannot be negative",
      )),
      (_, l) if l < 0 => Err(tonic::Status::invalid_argument(
        "CapacityRange.limit_bytes cannot be negative",
      )),
      (r, l) => Ok(CapacityRange::new(r as u64, l as u64)),
    }
  }
}
