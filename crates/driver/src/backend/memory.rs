use super::{BackendError, BackendVolume, NewVolume, StorageBackend};
use async_trait::async_trait;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Mutex, MutexGuard,
};
use tracing::info;
use uuid::Uuid;

/// Storage backend that keeps volumes in memory. Used by tests and for
/// running the controller without a cloud account.
pub struct InMemoryBackend {
  volumes: Mutex<Vec<BackendVolume>>,
  max_volumes_per_node: usize,
  calls: AtomicUsize,
}

impl Default for InMemoryBackend {
  fn default() -> Self {
    InMemoryBackend::new(crate::node::MAX_VOLUMES_PER_NODE as usize)
  }
}

impl InMemoryBackend {
  pub fn new(max_volumes_per_node: usize) -> Self {
    InMemoryBackend {
      volumes: Mutex::new(Vec::new()),
      max_volumes_per_node,
      calls: AtomicUsize::new(0),
    }
  }

  /// Number of backend calls made so far.
  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn volumes(&self) -> Vec<BackendVolume> {
    self.lock().clone()
  }

  fn lock(&self) -> MutexGuard<'_, Vec<BackendVolume>> {
    self.volumes.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn enter(&self) -> MutexGuard<'_, Vec<BackendVolume>> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.lock()
  }
}

fn find<'a>(
  volumes: &'a mut [BackendVolume],
  id: &str,
) -> Result<&'a mut BackendVolume, BackendError> {
  volumes
    .iter_mut()
    .find(|v| v.id == id)
    .ok_or_else(|| BackendError::NotFound(id.to_owned()))
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
  async fn create_volume(&self, volume: NewVolume) -> Result<BackendVolume, BackendError> {
    let volume = BackendVolume {
      id: Uuid::new_v4().to_string(),
      name: volume.name,
      size_gb: volume.size_gb,
      tier: volume.tier,
      attached_to: Vec::new(),
    };

    info!(
      "Created {} volume {} ({}) of {} GiB",
      volume.tier, volume.name, volume.id, volume.size_gb
    );
    self.enter().push(volume.clone());
    Ok(volume)
  }

  async fn get_volume(&self, id: &str) -> Result<BackendVolume, BackendError> {
    let mut volumes = self.enter();
    find(&mut volumes, id).map(|v| v.clone())
  }

  async fn list_volumes(&self, name: Option<&str>) -> Result<Vec<BackendVolume>, BackendError> {
    Ok(
      self
        .enter()
        .iter()
        .filter(|v| name.map_or(true, |name| v.name == name))
        .cloned()
        .collect(),
    )
  }

  async fn delete_volume(&self, id: &str) -> Result<(), BackendError> {
    let mut volumes = self.enter();
    match volumes.iter().position(|v| v.id == id) {
      Some(i) => {
        let volume = volumes.remove(i);
        info!("Deleted volume {} ({})", volume.name, volume.id);
        Ok(())
      }
      None => Err(BackendError::NotFound(id.to_owned())),
    }
  }

  async fn attach_volume(&self, id: &str, node_id: &str) -> Result<(), BackendError> {
    let mut volumes = self.enter();
    let attached = volumes
      .iter()
      .filter(|v| v.attached_to.iter().any(|n| n == node_id))
      .count();

    let volume = find(&mut volumes, id)?;
    if volume.attached_to.iter().any(|n| n == node_id) {
      return Ok(());
    }

    if attached >= self.max_volumes_per_node {
      return Err(BackendError::AttachLimitReached(format!(
        "node {} already has {} volumes attached",
        node_id, attached
      )));
    }

    volume.attached_to.push(node_id.to_owned());
    info!("Attached volume {} to {}", id, node_id);
    Ok(())
  }

  async fn detach_volume(&self, id: &str, node_id: &str) -> Result<(), BackendError> {
    let mut volumes = self.enter();
    let volume = find(&mut volumes, id)?;
    volume.attached_to.retain(|n| n != node_id);
    info!("Detached volume {} from {}", id, node_id);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::capacity::StorageTier;

  fn new_volume(name: &str) -> NewVolume {
    NewVolume {
      name: name.into(),
      size_gb: 1,
      tier: StorageTier::Default,
    }
  }

  #[tokio::test]
  async fn create_list_delete() {
    let backend = InMemoryBackend::default();
    let a = backend.create_volume(new_volume("a")).await.unwrap();
    let b = backend.create_volume(new_volume("b")).await.unwrap();

    assert_ne!(a.id, b.id);
    assert!(a.id.len() >= 20);
    assert_eq!(backend.list_volumes(None).await.unwrap().len(), 2);
    assert_eq!(backend.list_volumes(Some("b")).await.unwrap(), vec![b.clone()]);

    backend.delete_volume(&a.id).await.unwrap();
    assert_eq!(
      backend.delete_volume(&a.id).await,
      Err(BackendError::NotFound(a.id.clone()))
    );
    assert_eq!(backend.volumes(), vec![b]);
    assert_eq!(backend.calls(), 6);
  }

  #[tokio::test]
  async fn attach_limit() {
    let backend = InMemoryBackend::new(1);
    let a = backend.create_volume(new_volume("a")).await.unwrap();
    let b = backend.create_volume(new_volume("b")).await.unwrap();

    backend.attach_volume(&a.id, "node-1").await.unwrap();
    backend.attach_volume(&a.id, "node-1").await.unwrap();
    assert!(matches!(
      backend.attach_volume(&b.id, "node-1").await,
      Err(BackendError::AttachLimitReached(_))
    ));
    backend.attach_volume(&b.id, "node-2").await.unwrap();

    backend.detach_volume(&a.id, "node-1").await.unwrap();
    assert!(backend.get_volume(&a.id).await.unwrap().attached_to.is_empty());
  }
}
