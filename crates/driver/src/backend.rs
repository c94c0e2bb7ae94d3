mod memory;

use crate::capacity::StorageTier;
use async_trait::async_trait;
use thiserror::Error;

pub use memory::InMemoryBackend;

/// A remote block volume as the storage backend reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendVolume {
  pub id: String,
  pub name: String,
  pub size_gb: u64,
  pub tier: StorageTier,
  /// Nodes the volume is currently attached to.
  pub attached_to: Vec<String>,
}

/// Parameters of a volume to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVolume {
  pub name: String,
  pub size_gb: u64,
  pub tier: StorageTier,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackendError {
  #[error("volume not found: {0}")]
  NotFound(String),

  #[error("attach limit reached: {0}")]
  AttachLimitReached(String),

  #[error("storage API error: {0}")]
  Api(String),
}

/// The cloud API that creates, lists and attaches volumes.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
  async fn create_volume(&self, volume: NewVolume) -> Result<BackendVolume, BackendError>;

  async fn get_volume(&self, id: &str) -> Result<BackendVolume, BackendError>;

  /// All volumes, or only those named `name`.
  async fn list_volumes(&self, name: Option<&str>) -> Result<Vec<BackendVolume>, BackendError>;

  async fn delete_volume(&self, id: &str) -> Result<(), BackendError>;

  async fn attach_volume(&self, id: &str, node_id: &str) -> Result<(), BackendError>;

  async fn detach_volume(&self, id: &str, node_id: &str) -> Result<(), BackendError>;
}
