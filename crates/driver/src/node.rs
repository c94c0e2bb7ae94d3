use crate::{device, encryption, DRIVER_NAME, DRIVER_VERSION, TOPOLOGY_REGION_KEY, VOLUME_NAME_KEY};
use async_trait::async_trait;
use csi_mount_utils::{MountError, Mounter};
use csi_proto::{node::*, IdentityService};
use std::path::PathBuf;
use tonic::Status;
use tracing::{debug, info, instrument};

/// Filesystem created when the capability does not name one.
pub const DEFAULT_FS_TYPE: &str = "ext4";

/// Volumes the controller may attach to a single node.
pub const MAX_VOLUMES_PER_NODE: u64 = 128;

/// Who this node is. Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
  node_id: String,
  region: String,
}

impl NodeIdentity {
  pub fn new(node_id: impl Into<String>, region: impl Into<String>) -> Self {
    NodeIdentity {
      node_id: node_id.into(),
      region: region.into(),
    }
  }

  #[inline]
  pub fn node_id(&self) -> &str {
    &self.node_id
  }

  #[inline]
  pub fn region(&self) -> &str {
    &self.region
  }
}

#[derive(Debug, Clone)]
pub struct NodeOptions {
  /// Plugin name reported to the orchestrator.
  pub driver_name: String,

  /// Directory holding the `virtio-*` / `scsi-*` device links.
  pub disk_by_id_path: PathBuf,
}

impl Default for NodeOptions {
  fn default() -> Self {
    NodeOptions {
      driver_name: DRIVER_NAME.into(),
      disk_by_id_path: device::DISK_BY_ID_PATH.into(),
    }
  }
}

/// Node service. Holds no per-volume state: every call probes the mounter
/// and performs only the missing transition.
pub struct NodeDriver<M: Mounter> {
  identity: NodeIdentity,
  options: NodeOptions,
  mounter: M,
}

impl<M: Mounter> NodeDriver<M> {
  pub fn new(identity: NodeIdentity, options: NodeOptions, mounter: M) -> Self {
    NodeDriver {
      identity,
      options,
      mounter,
    }
  }

  #[inline]
  pub fn identity(&self) -> &NodeIdentity {
    &self.identity
  }
}

// Probe and unmount failures keep the mounter's message and are not mapped
// to a more specific code.
fn passthrough(e: MountError) -> Status {
  Status::unknown(e.to_string())
}

impl<M: Mounter> IdentityService for NodeDriver<M> {
  fn name(&self) -> &str {
    &self.options.driver_name
  }

  fn version(&self) -> &str {
    DRIVER_VERSION
  }

  fn volume_accessibility_constraints_support(&self) -> bool {
    true
  }
}

#[async_trait]
impl<M: Mounter> NodeService for NodeDriver<M> {
  fn capabilities(&self) -> NodeCapabilities {
    NodeCapabilities::STAGE_UNSTAGE_VOLUME
  }

  #[instrument(
    name = "blockvol.stage_volume",
    skip(self, request),
    fields(volume_id = %request.volume_id(), method = "node_stage_volume")
  )]
  async fn stage_volume(&self, request: NodeStageVolumeRequest) -> Result<(), NodeStageVolumeError> {
    let volume_name = match request.publish_context().get(VOLUME_NAME_KEY) {
      Some(name) if !name.is_empty() => name,
      _ => {
        return Err(NodeStageVolumeError::InvalidPublishContext(format!(
          "could not find the volume by name, `{}` is missing",
          VOLUME_NAME_KEY
        )))
      }
    };

    let mount = match request.volume_capability().mount() {
      Some(mount) => mount,
      None => {
        return Err(NodeStageVolumeError::UnsupportedCapability(
          "block access type is not supported".into(),
        ))
      }
    };

    let encryption =
      encryption::build(volume_name, request.secrets(), request.publish_context())
        .map_err(|e| NodeStageVolumeError::InvalidPublishContext(e.to_string()))?;
    if encryption.is_enabled() && !encryption.has_key() {
      return Err(NodeStageVolumeError::MissingSecret(format!(
        "volume {} is LUKS encrypted but the `{}` secret is missing",
        volume_name,
        encryption::LUKS_KEY_SECRET
      )));
    }

    let source = device::resolve(&self.options.disk_by_id_path, request.volume_id());
    let target = request.staging_target_path();
    let fs_type = mount.fs_type().unwrap_or(DEFAULT_FS_TYPE);
    let options = mount.mount_flags().map(String::from).collect::<Vec<_>>();

    info!(
      volume_name = %volume_name,
      source = %source.display(),
      staging_target_path = %target.display(),
      fs_type,
      luks_encrypted = encryption.is_enabled(),
      "node stage volume called"
    );

    let formatted = self
      .mounter
      .is_formatted(source.clone(), &encryption)
      .await
      .map_err(passthrough)?;
    if formatted {
      debug!("source device is already formatted");
    } else {
      info!("formatting the volume for staging");
      self
        .mounter
        .format(source.clone(), fs_type, &encryption)
        .await
        .map_err(|e| NodeStageVolumeError::FormatFailed(e.to_string()))?;
    }

    if self
      .mounter
      .is_mounted(target)
      .await
      .map_err(passthrough)?
    {
      debug!("source device is already mounted to the staging path");
      return Ok(());
    }

    info!("mounting the volume for staging");
    self
      .mounter
      .mount(source, target, fs_type, false, &encryption, options)
      .await
      .map_err(|e| NodeStageVolumeError::MountFailed(e.to_string()))?;

    info!("formatting and mounting stage volume is finished");
    Ok(())
  }

  #[instrument(
    name = "blockvol.unstage_volume",
    skip(self, request),
    fields(volume_id = %request.volume_id(), method = "node_unstage_volume")
  )]
  async fn unstage_volume(
    &self,
    request: NodeUnstageVolumeRequest,
  ) -> Result<(), NodeUnstageVolumeError> {
    let target = request.staging_target_path();
    info!(staging_target_path = %target.display(), "node unstage volume called");

    if !self
      .mounter
      .is_mounted(target)
      .await
      .map_err(passthrough)?
    {
      debug!("staging target path is already unmounted");
      return Ok(());
    }

    info!("unmounting the staging target path");
    self
      .mounter
      .unmount(target, true)
      .await
      .map_err(|e| NodeUnstageVolumeError::UnmountFailed(e.to_string()))?;

    info!("unmounting stage volume is finished");
    Ok(())
  }

  #[instrument(
    name = "blockvol.publish_volume",
    skip(self, request),
    fields(volume_id = %request.volume_id(), method = "node_publish_volume")
  )]
  async fn publish_volume(
    &self,
    request: NodePublishVolumeRequest,
  ) -> Result<(), NodePublishVolumeError> {
    let source = match request.staging_target_path() {
      Some(path) => path,
      None => {
        return Err(NodePublishVolumeError::StagingTargetPathNotSet(
          "NodePublishVolumeRequest.staging_target_path must be provided".into(),
        ))
      }
    };

    if request.publish_context().is_empty() {
      return Err(NodePublishVolumeError::InvalidPublishContext(
        "publish context must be provided".into(),
      ));
    }

    let mount = match request.volume_capability().mount() {
      Some(mount) => mount,
      None => {
        return Err(
          Status::invalid_argument("block access type is not supported").into(),
        )
      }
    };

    let volume_name = request
      .publish_context()
      .get(VOLUME_NAME_KEY)
      .map(|v| &**v)
      .unwrap_or_else(|| request.volume_id());
    let encryption =
      encryption::build(volume_name, request.secrets(), request.publish_context())
        .map_err(|e| NodePublishVolumeError::InvalidPublishContext(e.to_string()))?;

    let target = request.target_path();
    let fs_type = mount.fs_type().unwrap_or(DEFAULT_FS_TYPE);
    let mut options = mount.mount_flags().map(String::from).collect::<Vec<_>>();
    options.push("bind".into());
    if request.readonly() {
      options.push("ro".into());
    }

    info!(
      source = %source.display(),
      target = %target.display(),
      fs_type,
      luks_encrypted = encryption.is_enabled(),
      readonly = request.readonly(),
      "node publish volume called"
    );

    if self
      .mounter
      .is_mounted(target)
      .await
      .map_err(passthrough)?
    {
      debug!("volume is already mounted");
      return Ok(());
    }

    info!("mounting the volume");
    self
      .mounter
      .mount(source, target, fs_type, true, &encryption, options)
      .await
      .map_err(|e| NodePublishVolumeError::MountFailed(e.to_string()))?;

    info!("bind mounting the volume is finished");
    Ok(())
  }

  #[instrument(
    name = "blockvol.unpublish_volume",
    skip(self, request),
    fields(volume_id = %request.volume_id(), method = "node_unpublish_volume")
  )]
  async fn unpublish_volume(
    &self,
    request: NodeUnpublishVolumeRequest,
  ) -> Result<(), NodeUnpublishVolumeError> {
    let target = request.target_path();
    info!(target_path = %target.display(), "node unpublish volume called");

    if !self
      .mounter
      .is_mounted(target)
      .await
      .map_err(passthrough)?
    {
      debug!("target path is already unmounted");
      return Ok(());
    }

    info!("unmounting the target path");
    self
      .mounter
      .unmount(target, false)
      .await
      .map_err(|e| NodeUnpublishVolumeError::UnmountFailed(e.to_string()))?;

    info!("unmounting volume is finished");
    Ok(())
  }

  async fn get_info(&self) -> Result<NodeGetInfoResponse, NodeGetInfoError> {
    info!(method = "node_get_info", "node get info called");

    let mut topology = Topology::new();
    topology.insert(TOPOLOGY_REGION_KEY.into(), self.identity.region.clone());

    Ok(
      NodeGetInfoResponse::new(self.identity.node_id.clone())
        .with_max_volumes_per_node(MAX_VOLUMES_PER_NODE)
        .with_accessible_topology(topology),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::encryption::{LUKS_ENCRYPTED_KEY, LUKS_KEY_SECRET};
  use csi_mount_utils::{FakeAction, FakeMounter, FakeOperation, MountPoint};
  use csi_proto::proto;
  use std::{collections::HashMap, convert::TryInto};
  use tempfile::TempDir;
  use tonic::Code;

  const VOLUME_ID: &str = "2d8c8a5e-8a0b-4f3e-9a57-3a1d1f2c6b7e";
  const STAGING: &str = "/var/lib/kubelet/plugins/blockvol/staging/pvc-1";
  const TARGET: &str = "/var/lib/kubelet/pods/1/volumes/pvc-1";

  struct Fixture {
    driver: NodeDriver<FakeMounter>,
    mounter: FakeMounter,
    disk_by_id: TempDir,
  }

  impl Fixture {
    fn new(mounter: FakeMounter) -> Self {
      let disk_by_id = tempfile::tempdir().unwrap();
      let options = NodeOptions {
        disk_by_id_path: disk_by_id.path().to_owned(),
        ..Default::default()
      };

      Fixture {
        driver: NodeDriver::new(
          NodeIdentity::new("node-1", "rma"),
          options,
          mounter.clone(),
        ),
        mounter,
        disk_by_id,
      }
    }

    // No link exists in the temp dir, so resolution falls back to scsi.
    fn device(&self) -> PathBuf {
      self.disk_by_id.path().join("scsi-2d8c8a5e-8a0b-4f3e-9")
    }
  }

  fn map(entries: &[(&str, &str)]) -> HashMap<String, String> {
    entries
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect()
  }

  fn mount_capability(fs_type: &str, flags: &[&str]) -> proto::VolumeCapability {
    use proto::volume_capability::{access_mode::Mode, AccessMode, AccessType, MountVolume};

    proto::VolumeCapability {
      access_mode: Some(AccessMode {
        mode: Mode::SingleNodeWriter as i32,
      }),
      access_type: Some(AccessType::Mount(MountVolume {
        fs_type: fs_type.into(),
        mount_flags: flags.iter().map(|s| s.to_string()).collect(),
      })),
    }
  }

  fn block_capability() -> proto::VolumeCapability {
    use proto::volume_capability::{access_mode::Mode, AccessMode, AccessType, BlockVolume};

    proto::VolumeCapability {
      access_mode: Some(AccessMode {
        mode: Mode::SingleNodeWriter as i32,
      }),
      access_type: Some(AccessType::Block(BlockVolume {})),
    }
  }

  fn stage_request(
    capability: proto::VolumeCapability,
    publish_context: HashMap<String, String>,
    secrets: HashMap<String, String>,
  ) -> NodeStageVolumeRequest {
    proto::NodeStageVolumeRequest {
      volume_id: VOLUME_ID.into(),
      publish_context,
      staging_target_path: STAGING.into(),
      volume_capability: Some(capability),
      secrets,
      volume_context: HashMap::new(),
    }
    .try_into()
    .unwrap()
  }

  fn plain_stage_request() -> NodeStageVolumeRequest {
    stage_request(
      mount_capability("", &[]),
      map(&[(VOLUME_NAME_KEY, "pvc-1")]),
      HashMap::new(),
    )
  }

  fn publish_request(readonly: bool, flags: &[&str]) -> NodePublishVolumeRequest {
    proto::NodePublishVolumeRequest {
      volume_id: VOLUME_ID.into(),
      publish_context: map(&[(VOLUME_NAME_KEY, "pvc-1")]),
      staging_target_path: STAGING.into(),
      target_path: TARGET.into(),
      volume_capability: Some(mount_capability("", flags)),
      readonly,
      secrets: HashMap::new(),
      volume_context: HashMap::new(),
    }
    .try_into()
    .unwrap()
  }

  fn unstage_request() -> NodeUnstageVolumeRequest {
    proto::NodeUnstageVolumeRequest {
      volume_id: VOLUME_ID.into(),
      staging_target_path: STAGING.into(),
    }
    .try_into()
    .unwrap()
  }

  fn unpublish_request() -> NodeUnpublishVolumeRequest {
    proto::NodeUnpublishVolumeRequest {
      volume_id: VOLUME_ID.into(),
      target_path: TARGET.into(),
    }
    .try_into()
    .unwrap()
  }

  #[tokio::test]
  async fn stage_formats_and_mounts() {
    let f = Fixture::new(FakeMounter::default());

    f.driver.stage_volume(plain_stage_request()).await.unwrap();

    assert_eq!(
      f.mounter.actions(),
      vec![
        FakeAction::Format {
          source: f.device(),
          fs_type: "ext4".into(),
          encrypted: false,
        },
        FakeAction::Mount {
          source: f.device(),
          target: STAGING.into(),
          fs_type: "ext4".into(),
          bind: false,
          encrypted: false,
          options: vec![],
        },
      ]
    );
  }

  #[tokio::test]
  async fn stage_skips_format_of_formatted_device() {
    let f = Fixture::new(FakeMounter::default());
    let _ = f.mounter.clone().with_formatted(f.device(), "xfs");
    f.mounter.fail(FakeOperation::Format, "must not format");

    f.driver
      .stage_volume(stage_request(
        mount_capability("xfs", &["noatime"]),
        map(&[(VOLUME_NAME_KEY, "pvc-1")]),
        HashMap::new(),
      ))
      .await
      .unwrap();

    assert_eq!(
      f.mounter.actions(),
      vec![FakeAction::Mount {
        source: f.device(),
        target: STAGING.into(),
        fs_type: "xfs".into(),
        bind: false,
        encrypted: false,
        options: vec!["noatime".into()],
      }]
    );
  }

  #[tokio::test]
  async fn stage_of_mounted_volume_has_no_side_effects() {
    let mounter = FakeMounter::with_mount_points(vec![MountPoint::new(
      "/dev/vdb",
      STAGING,
      "ext4",
    )]);
    let f = Fixture::new(mounter);
    let _ = f.mounter.clone().with_formatted(f.device(), "ext4");

    f.driver.stage_volume(plain_stage_request()).await.unwrap();

    assert!(f.mounter.actions().is_empty());
  }

  #[tokio::test]
  async fn stage_twice_is_idempotent() {
    let f = Fixture::new(FakeMounter::default());

    f.driver.stage_volume(plain_stage_request()).await.unwrap();
    let mount_points = f.mounter.mount_points();
    f.mounter.reset_log();

    f.driver.stage_volume(plain_stage_request()).await.unwrap();

    assert!(f.mounter.actions().is_empty());
    assert_eq!(f.mounter.mount_points(), mount_points);
  }

  #[tokio::test]
  async fn stage_with_encryption() {
    let f = Fixture::new(FakeMounter::default());

    f.driver
      .stage_volume(stage_request(
        mount_capability("", &[]),
        map(&[(VOLUME_NAME_KEY, "pvc-1"), (LUKS_ENCRYPTED_KEY, "true")]),
        map(&[(LUKS_KEY_SECRET, "hunter2")]),
      ))
      .await
      .unwrap();

    let actions = f.mounter.actions();
    assert_eq!(actions.len(), 2);
    assert!(actions.iter().all(|a| match a {
      FakeAction::Format { encrypted, .. } | FakeAction::Mount { encrypted, .. } => *encrypted,
      FakeAction::Unmount { .. } => false,
    }));
  }

  #[tokio::test]
  async fn stage_with_encryption_requires_key() {
    let f = Fixture::new(FakeMounter::default());

    let err = f
      .driver
      .stage_volume(stage_request(
        mount_capability("", &[]),
        map(&[(VOLUME_NAME_KEY, "pvc-1"), (LUKS_ENCRYPTED_KEY, "true")]),
        HashMap::new(),
      ))
      .await
      .unwrap_err();

    assert!(matches!(err, NodeStageVolumeError::MissingSecret(_)), "{:?}", err);
    assert_eq!(Status::from(err).code(), Code::InvalidArgument);
    assert!(f.mounter.actions().is_empty());
  }

  #[tokio::test]
  async fn stage_requires_volume_name() {
    let f = Fixture::new(FakeMounter::default());

    let err = f
      .driver
      .stage_volume(stage_request(
        mount_capability("", &[]),
        map(&[(LUKS_ENCRYPTED_KEY, "false")]),
        HashMap::new(),
      ))
      .await
      .unwrap_err();

    assert_eq!(Status::from(err).code(), Code::InvalidArgument);
    assert!(f.mounter.actions().is_empty());
  }

  #[tokio::test]
  async fn stage_rejects_block_access() {
    let f = Fixture::new(FakeMounter::default());

    let err = f
      .driver
      .stage_volume(stage_request(
        block_capability(),
        map(&[(VOLUME_NAME_KEY, "pvc-1")]),
        HashMap::new(),
      ))
      .await
      .unwrap_err();

    assert_eq!(Status::from(err).code(), Code::InvalidArgument);
  }

  #[tokio::test]
  async fn stage_format_failure_is_internal() {
    let f = Fixture::new(FakeMounter::default());
    f.mounter.fail(FakeOperation::Format, "mkfs exploded");

    let err = f.driver.stage_volume(plain_stage_request()).await.unwrap_err();
    let status = Status::from(err);

    assert_eq!(status.code(), Code::Internal);
    assert!(status.message().contains("mkfs exploded"));
    assert!(f.mounter.actions().is_empty());
  }

  #[tokio::test]
  async fn stage_mount_failure_is_internal() {
    let f = Fixture::new(FakeMounter::default());
    f.mounter.fail(FakeOperation::Mount, "no such device");

    let err = f.driver.stage_volume(plain_stage_request()).await.unwrap_err();

    assert_eq!(Status::from(err).code(), Code::Internal);
  }

  #[tokio::test]
  async fn stage_probe_failure_passes_through() {
    let f = Fixture::new(FakeMounter::default());
    f.mounter.fail(FakeOperation::IsFormatted, "blkid: permission denied");

    let err = f.driver.stage_volume(plain_stage_request()).await.unwrap_err();
    let status = Status::from(err);

    assert_eq!(status.code(), Code::Unknown);
    assert!(status.message().contains("blkid: permission denied"));
  }

  #[tokio::test]
  async fn publish_bind_mounts_staging_path() {
    let f = Fixture::new(FakeMounter::default());

    f.driver
      .publish_volume(publish_request(false, &["noatime"]))
      .await
      .unwrap();

    assert_eq!(
      f.mounter.actions(),
      vec![FakeAction::Mount {
        source: STAGING.into(),
        target: TARGET.into(),
        fs_type: "ext4".into(),
        bind: true,
        encrypted: false,
        options: vec!["noatime".into(), "bind".into()],
      }]
    );
  }

  #[tokio::test]
  async fn publish_readonly_adds_ro() {
    let f = Fixture::new(FakeMounter::default());

    f.driver.publish_volume(publish_request(true, &[])).await.unwrap();

    match &f.mounter.actions()[..] {
      [FakeAction::Mount { options, .. }] => {
        assert_eq!(options, &["bind".to_owned(), "ro".to_owned()])
      }
      actions => panic!("unexpected actions {:?}", actions),
    }
  }

  #[tokio::test]
  async fn publish_of_mounted_target_is_noop() {
    let f = Fixture::new(FakeMounter::with_mount_points(vec![MountPoint::new(
      "/dev/vdb", TARGET, "ext4",
    )]));

    f.driver.publish_volume(publish_request(false, &[])).await.unwrap();

    assert!(f.mounter.actions().is_empty());
  }

  #[tokio::test]
  async fn publish_requires_staging_path_and_context() {
    let f = Fixture::new(FakeMounter::default());

    let mut request = proto::NodePublishVolumeRequest {
      volume_id: VOLUME_ID.into(),
      publish_context: HashMap::new(),
      staging_target_path: STAGING.into(),
      target_path: TARGET.into(),
      volume_capability: Some(mount_capability("", &[])),
      readonly: false,
      secrets: HashMap::new(),
      volume_context: HashMap::new(),
    };

    let err = f
      .driver
      .publish_volume(request.clone().try_into().unwrap())
      .await
      .unwrap_err();
    assert!(matches!(err, NodePublishVolumeError::InvalidPublishContext(_)));

    request.publish_context = map(&[(VOLUME_NAME_KEY, "pvc-1")]);
    request.staging_target_path = String::new();
    let err = f
      .driver
      .publish_volume(request.try_into().unwrap())
      .await
      .unwrap_err();
    assert!(matches!(err, NodePublishVolumeError::StagingTargetPathNotSet(_)));
    assert_eq!(Status::from(err).code(), Code::InvalidArgument);

    assert!(f.mounter.actions().is_empty());
  }

  #[tokio::test]
  async fn unstage_force_unmounts() {
    let f = Fixture::new(FakeMounter::with_mount_points(vec![MountPoint::new(
      "/dev/vdb", STAGING, "ext4",
    )]));

    f.driver.unstage_volume(unstage_request()).await.unwrap();

    assert_eq!(
      f.mounter.actions(),
      vec![FakeAction::Unmount {
        target: STAGING.into(),
        force: true,
      }]
    );
    assert!(f.mounter.mount_points().is_empty());
  }

  #[tokio::test]
  async fn unstage_of_clean_path_is_noop() {
    let f = Fixture::new(FakeMounter::default());

    f.driver.unstage_volume(unstage_request()).await.unwrap();

    assert!(f.mounter.actions().is_empty());
  }

  #[tokio::test]
  async fn unstage_failure_passes_through() {
    let f = Fixture::new(FakeMounter::with_mount_points(vec![MountPoint::new(
      "/dev/vdb", STAGING, "ext4",
    )]));
    f.mounter.fail(FakeOperation::Unmount, "target is busy");

    let err = f.driver.unstage_volume(unstage_request()).await.unwrap_err();
    let status = Status::from(err);

    assert_eq!(status.code(), Code::Unknown);
    assert!(status.message().contains("target is busy"));
  }

  #[tokio::test]
  async fn unpublish_unmounts_without_force() {
    let f = Fixture::new(FakeMounter::with_mount_points(vec![MountPoint::new(
      "/dev/vdb", TARGET, "ext4",
    )]));

    f.driver.unpublish_volume(unpublish_request()).await.unwrap();
    f.driver.unpublish_volume(unpublish_request()).await.unwrap();

    assert_eq!(
      f.mounter.actions(),
      vec![FakeAction::Unmount {
        target: TARGET.into(),
        force: false,
      }]
    );
  }

  #[tokio::test]
  async fn full_lifecycle() {
    let f = Fixture::new(FakeMounter::default());

    f.driver.stage_volume(plain_stage_request()).await.unwrap();
    f.driver.publish_volume(publish_request(false, &[])).await.unwrap();

    let devices = f
      .mounter
      .mount_points()
      .iter()
      .map(|mp| mp.device().to_owned())
      .collect::<Vec<_>>();
    assert_eq!(devices, vec![f.device(), f.device()]);

    f.driver.unpublish_volume(unpublish_request()).await.unwrap();
    f.driver.unstage_volume(unstage_request()).await.unwrap();

    assert!(f.mounter.mount_points().is_empty());
  }

  #[tokio::test]
  async fn reports_identity() {
    let f = Fixture::new(FakeMounter::default());

    assert_eq!(f.driver.name(), DRIVER_NAME);
    assert!(f.driver.volume_accessibility_constraints_support());
    assert_eq!(
      f.driver.capabilities(),
      NodeCapabilities::STAGE_UNSTAGE_VOLUME
    );

    let info = f.driver.get_info().await.unwrap();
    assert_eq!(info.node_id(), "node-1");
    assert_eq!(
      info.max_volumes_per_node().map(|v| v.get()),
      Some(MAX_VOLUMES_PER_NODE)
    );
    assert_eq!(
      info.accessible_topology(),
      Some(&map(&[(TOPOLOGY_REGION_KEY, "rma")]))
    );
  }

  #[tokio::test]
  async fn volume_stats_are_unimplemented() {
    let f = Fixture::new(FakeMounter::default());
    let request: NodeGetVolumeStatsRequest = proto::NodeGetVolumeStatsRequest {
      volume_id: VOLUME_ID.into(),
      volume_path: TARGET.into(),
      staging_target_path: String::new(),
    }
    .try_into()
    .unwrap();

    let err = f.driver.get_volume_stats(request).await.unwrap_err();

    assert_eq!(Status::from(err).code(), Code::Unimplemented);
  }
}
