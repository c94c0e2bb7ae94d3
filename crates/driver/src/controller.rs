use crate::{
  backend::{BackendError, BackendVolume, NewVolume, StorageBackend},
  capacity::{self, StorageTier, GIB},
  encryption::{self, LUKS_CIPHER_KEY, LUKS_ENCRYPTED_KEY, LUKS_KEY_SIZE_KEY},
  DRIVER_NAME, DRIVER_VERSION, TOPOLOGY_REGION_KEY, VOLUME_NAME_KEY,
};
use async_trait::async_trait;
use csi_proto::{controller::*, IdentityService};
use std::collections::HashMap;
use tonic::Status;
use tracing::{debug, info, instrument};

/// `CreateVolume` parameter selecting the storage tier.
pub const PARAMETER_TYPE: &str = "type";
pub const PARAMETER_LUKS_ENCRYPTED: &str = "luksEncrypted";
pub const PARAMETER_LUKS_CIPHER: &str = "luksCipher";
pub const PARAMETER_LUKS_KEY_SIZE: &str = "luksKeySize";

/// Controller service provisioning volumes through a [StorageBackend].
pub struct ControllerDriver<B: StorageBackend> {
  backend: B,
  region: String,
  driver_name: String,
}

impl<B: StorageBackend> ControllerDriver<B> {
  pub fn new(backend: B, region: impl Into<String>) -> Self {
    ControllerDriver {
      backend,
      region: region.into(),
      driver_name: DRIVER_NAME.into(),
    }
  }

  pub fn with_driver_name(mut self, driver_name: impl Into<String>) -> Self {
    self.driver_name = driver_name.into();
    self
  }

  #[inline]
  pub fn backend(&self) -> &B {
    &self.backend
  }

  fn topology(&self) -> Topology {
    let mut topology = Topology::new();
    topology.insert(TOPOLOGY_REGION_KEY.into(), self.region.clone());
    topology
  }
}

fn backend_error(e: BackendError) -> Status {
  Status::internal(e.to_string())
}

/// Only single node writers with filesystem access are supported.
fn is_supported(capability: &VolumeCapability) -> bool {
  capability.access_mode() == AccessMode::SingleNodeWriter && capability.mount().is_some()
}

/// Volume parameters parsed from `CreateVolume` parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
struct VolumeParameters {
  tier: StorageTier,
  luks_encrypted: bool,
  luks_cipher: Option<String>,
  luks_key_size: Option<u32>,
}

impl VolumeParameters {
  fn parse(parameters: &HashMap<String, String>) -> Result<Self, CreateVolumeError> {
    let get = |key: &str| parameters.get(key).map(|v| v.as_str()).unwrap_or("");

    let tier = get(PARAMETER_TYPE)
      .parse::<StorageTier>()
      .map_err(|e| CreateVolumeError::InvalidParameter(e.to_string()))?;

    let luks_encrypted = match get(PARAMETER_LUKS_ENCRYPTED) {
      "" | "false" => false,
      "true" => true,
      other => {
        return Err(CreateVolumeError::InvalidParameter(format!(
          "invalid {} value {:?}, expected \"true\" or \"false\"",
          PARAMETER_LUKS_ENCRYPTED, other
        )))
      }
    };

    let (luks_cipher, luks_key_size) = if luks_encrypted {
      let cipher = match get(PARAMETER_LUKS_CIPHER) {
        "" => None,
        v => Some(v.to_owned()),
      };

      let key_size = match get(PARAMETER_LUKS_KEY_SIZE) {
        "" => None,
        v => Some(v.parse::<u32>().map_err(|_| {
          CreateVolumeError::InvalidParameter(format!(
            "invalid {} value {:?}",
            PARAMETER_LUKS_KEY_SIZE, v
          ))
        })?),
      };

      (cipher, key_size)
    } else {
      (None, None)
    };

    Ok(VolumeParameters {
      tier,
      luks_encrypted,
      luks_cipher,
      luks_key_size,
    })
  }

  fn volume_context(&self, name: &str) -> HashMap<String, String> {
    let mut context = HashMap::new();
    context.insert(VOLUME_NAME_KEY.to_owned(), name.to_owned());
    context.insert(
      LUKS_ENCRYPTED_KEY.to_owned(),
      self.luks_encrypted.to_string(),
    );

    if let Some(cipher) = &self.luks_cipher {
      context.insert(LUKS_CIPHER_KEY.to_owned(), cipher.clone());
    }

    if let Some(key_size) = self.luks_key_size {
      context.insert(LUKS_KEY_SIZE_KEY.to_owned(), key_size.to_string());
    }

    context
  }
}

// The orchestrator hands this back to the node on stage and publish.
fn publish_context(
  volume: &BackendVolume,
  volume_context: &HashMap<String, String>,
) -> HashMap<String, String> {
  let mut context = HashMap::new();
  context.insert(VOLUME_NAME_KEY.to_owned(), volume.name.clone());

  let encrypted = encryption::is_enabled(volume_context.get(LUKS_ENCRYPTED_KEY).map(|v| &**v));
  context.insert(LUKS_ENCRYPTED_KEY.to_owned(), encrypted.to_string());
  if encrypted {
    for key in &[LUKS_CIPHER_KEY, LUKS_KEY_SIZE_KEY] {
      if let Some(value) = volume_context.get(*key) {
        context.insert((*key).to_owned(), value.clone());
      }
    }
  }

  context
}

impl<B: StorageBackend> IdentityService for ControllerDriver<B> {
  fn name(&self) -> &str {
    &self.driver_name
  }

  fn version(&self) -> &str {
    DRIVER_VERSION
  }

  fn volume_accessibility_constraints_support(&self) -> bool {
    true
  }
}

#[async_trait]
impl<B: StorageBackend> ControllerService for ControllerDriver<B> {
  fn capabilities(&self) -> ControllerCapabilities {
    ControllerCapabilities::CREATE_DELETE_VOLUME
      | ControllerCapabilities::PUBLISH_UNPUBLISH_VOLUME
      | ControllerCapabilities::LIST_VOLUMES
      | ControllerCapabilities::LIST_VOLUMES_PUBLISHED_NODES
  }

  #[instrument(
    name = "blockvol.create_volume",
    skip(self, request),
    fields(volume_name = %request.name(), method = "create_volume")
  )]
  async fn create_volume(&self, request: CreateVolumeRequest) -> Result<Volume, CreateVolumeError> {
    if let Some(capability) = request
      .volume_capabilities()
      .iter()
      .find(|c| !is_supported(c))
    {
      return Err(CreateVolumeError::UnsupportedCapability(format!(
        "{:?} is not supported, only single node writer with mount access is",
        capability.access_mode()
      )));
    }

    let parameters = VolumeParameters::parse(request.parameters())?;
    let size_gb = capacity::solve(request.capacity_range(), parameters.tier)
      .map_err(|e| CreateVolumeError::UnsupportedCapacityRange(e.to_string()))?;
    let capacity_bytes = size_gb.checked_mul(GIB).ok_or_else(|| {
      CreateVolumeError::UnsupportedCapacityRange(format!("{} GiB is too large", size_gb))
    })?;

    let name = request.name();
    info!(
      size_gb,
      tier = %parameters.tier,
      luks_encrypted = parameters.luks_encrypted,
      "create volume called"
    );

    let mut existing = self
      .backend
      .list_volumes(Some(name))
      .await
      .map_err(backend_error)?;

    let volume = match existing.len() {
      0 => {
        let volume = self
          .backend
          .create_volume(NewVolume {
            name: name.to_owned(),
            size_gb,
            tier: parameters.tier,
          })
          .await
          .map_err(backend_error)?;
        info!(volume_id = %volume.id, "volume created");
        volume
      }

      1 => {
        let volume = existing.remove(0);
        if volume.size_gb != size_gb || volume.tier != parameters.tier {
          return Err(CreateVolumeError::AlreadyExists(format!(
            "volume {} exists with {} GiB of {} storage",
            name, volume.size_gb, volume.tier
          )));
        }

        debug!(volume_id = %volume.id, "volume already exists");
        volume
      }

      n => {
        return Err(
          Status::internal(format!("fatal issue: {} volumes named {} exist", n, name)).into(),
        )
      }
    };

    Ok(
      Volume::new(volume.id, capacity_bytes)
        .with_context(parameters.volume_context(name))
        .with_accessible_topology(self.topology()),
    )
  }

  #[instrument(
    name = "blockvol.delete_volume",
    skip(self, request),
    fields(volume_id = %request.volume_id(), method = "delete_volume")
  )]
  async fn delete_volume(&self, request: DeleteVolumeRequest) -> Result<(), DeleteVolumeError> {
    let volume = match self.backend.get_volume(request.volume_id()).await {
      Ok(volume) => volume,
      Err(BackendError::NotFound(_)) => {
        debug!("volume is already deleted");
        return Ok(());
      }
      Err(e) => return Err(backend_error(e).into()),
    };

    if !volume.attached_to.is_empty() {
      return Err(DeleteVolumeError::VolumeInUse(format!(
        "volume {} is attached to {}",
        volume.id,
        volume.attached_to.join(", ")
      )));
    }

    match self.backend.delete_volume(&volume.id).await {
      Ok(()) | Err(BackendError::NotFound(_)) => {
        info!("volume is deleted");
        Ok(())
      }
      Err(e) => Err(backend_error(e).into()),
    }
  }

  #[instrument(
    name = "blockvol.controller_publish_volume",
    skip(self, request),
    fields(
      volume_id = %request.volume_id(),
      node_id = %request.node_id(),
      method = "controller_publish_volume"
    )
  )]
  async fn controller_publish_volume(
    &self,
    request: ControllerPublishVolumeRequest,
  ) -> Result<ControllerPublishVolumeResponse, ControllerPublishVolumeError> {
    if !is_supported(request.volume_capability()) {
      return Err(Status::invalid_argument("unsupported volume capability").into());
    }

    let node_id = request.node_id();
    let volume = match self.backend.get_volume(request.volume_id()).await {
      Ok(volume) => volume,
      Err(BackendError::NotFound(id)) => {
        return Err(ControllerPublishVolumeError::VolumeDoesNotExist(id))
      }
      Err(e) => return Err(backend_error(e).into()),
    };

    let context = publish_context(&volume, request.volume_context());
    if volume.attached_to.iter().any(|n| n == node_id) {
      debug!("volume is already attached");
      return Ok(ControllerPublishVolumeResponse::new(context));
    }

    if !volume.attached_to.is_empty() {
      return Err(ControllerPublishVolumeError::PublishedToAnotherNode(
        format!(
          "volume {} is attached to {}",
          volume.id,
          volume.attached_to.join(", ")
        ),
      ));
    }

    info!("attaching volume");
    match self.backend.attach_volume(&volume.id, node_id).await {
      Ok(()) => Ok(ControllerPublishVolumeResponse::new(context)),
      Err(BackendError::NotFound(id)) => Err(ControllerPublishVolumeError::VolumeDoesNotExist(id)),
      Err(BackendError::AttachLimitReached(msg)) => {
        Err(ControllerPublishVolumeError::MaxVolumesAttached(msg))
      }
      Err(e) => Err(backend_error(e).into()),
    }
  }

  #[instrument(
    name = "blockvol.controller_unpublish_volume",
    skip(self, request),
    fields(volume_id = %request.volume_id(), method = "controller_unpublish_volume")
  )]
  async fn controller_unpublish_volume(
    &self,
    request: ControllerUnpublishVolumeRequest,
  ) -> Result<(), ControllerUnpublishVolumeError> {
    let volume = match self.backend.get_volume(request.volume_id()).await {
      Ok(volume) => volume,
      Err(BackendError::NotFound(_)) => {
        debug!("volume does not exist, assuming it is detached");
        return Ok(());
      }
      Err(e) => return Err(backend_error(e).into()),
    };

    let nodes = volume
      .attached_to
      .iter()
      .filter(|n| request.node_id().map_or(true, |node_id| *n == node_id))
      .collect::<Vec<_>>();
    if nodes.is_empty() {
      debug!("volume is not attached");
      return Ok(());
    }

    for node_id in nodes {
      info!(node_id = %node_id, "detaching volume");
      match self.backend.detach_volume(&volume.id, node_id).await {
        Ok(()) | Err(BackendError::NotFound(_)) => (),
        Err(e) => return Err(backend_error(e).into()),
      }
    }

    Ok(())
  }

  #[instrument(
    name = "blockvol.validate_volume_capabilities",
    skip(self, request),
    fields(volume_id = %request.volume_id(), method = "validate_volume_capabilities")
  )]
  async fn validate_volume_capabilities(
    &self,
    request: ValidateVolumeCapabilitiesRequest,
  ) -> Result<ValidateVolumeCapabilitiesResponse, ValidateVolumeCapabilitiesError> {
    match self.backend.get_volume(request.volume_id()).await {
      Ok(_) => (),
      Err(BackendError::NotFound(id)) => {
        return Err(ValidateVolumeCapabilitiesError::VolumeNotFound(id))
      }
      Err(e) => return Err(backend_error(e).into()),
    }

    if request.volume_capabilities().iter().all(is_supported) {
      Ok(ValidateVolumeCapabilitiesResponse::Confirmed(Confirmed::new(
        request.volume_context().clone(),
        request.volume_capabilities().to_vec(),
        request.parameters().clone(),
      )))
    } else {
      Ok(ValidateVolumeCapabilitiesResponse::Message(
        "only single node writer with mount access is supported".into(),
      ))
    }
  }

  #[instrument(name = "blockvol.list_volumes", skip(self, request))]
  async fn list_volumes(
    &self,
    request: ListVolumesRequest,
  ) -> Result<ListVolumesResponse, ListVolumesError> {
    let start = match request.starting_token() {
      None => 0,
      Some(token) => token
        .parse::<usize>()
        .map_err(|_| ListVolumesError::InvalidStartingToken(token.to_owned()))?,
    };

    let volumes = self
      .backend
      .list_volumes(None)
      .await
      .map_err(backend_error)?;
    if start > volumes.len() {
      return Err(ListVolumesError::InvalidStartingToken(start.to_string()));
    }

    let end = match request.max_entries() {
      Some(max) => volumes.len().min(start.saturating_add(max.get() as usize)),
      None => volumes.len(),
    };
    let next_token = if end < volumes.len() {
      Some(end.to_string())
    } else {
      None
    };

    let entries = volumes[start..end]
      .iter()
      .map(|v| {
        let mut context = HashMap::new();
        context.insert(VOLUME_NAME_KEY.to_owned(), v.name.clone());
        let volume = Volume::new(v.id.clone(), v.size_gb.saturating_mul(GIB))
          .with_context(context)
          .with_accessible_topology(self.topology());

        VolumeListEntry::new(volume, Some(VolumeStatus::new(v.attached_to.clone())))
      })
      .collect();

    Ok(ListVolumesResponse::new(entries, next_token))
  }
}
