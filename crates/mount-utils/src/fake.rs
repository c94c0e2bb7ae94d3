use crate::{
  runner::MounterImpl, EncryptionContext, MountError, MountPoint, MounterOptions, Result,
};
use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::{Mutex, MutexGuard},
};
use tracing::info;

/// Side effect recorded by the fake mounter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FakeAction {
  Format {
    source: PathBuf,
    fs_type: String,
    encrypted: bool,
  },

  Mount {
    source: PathBuf,
    target: PathBuf,
    fs_type: String,
    bind: bool,
    encrypted: bool,
    options: Vec<String>,
  },

  Unmount {
    target: PathBuf,
    force: bool,
  },
}

/// Operations a failure can be injected into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FakeOperation {
  IsFormatted,
  Format,
  IsMounted,
  Mount,
  Unmount,
}

#[derive(Default)]
struct FakeMounterInner {
  mount_points: Vec<MountPoint>,
  formatted: HashMap<PathBuf, String>,
  log: Vec<FakeAction>,
  failures: HashMap<FakeOperation, String>,
}

impl FakeMounterInner {
  fn check(&self, operation: FakeOperation) -> Result<()> {
    match self.failures.get(&operation) {
      Some(message) => Err(MountError::new(message.clone())),
      None => Ok(()),
    }
  }
}

#[derive(Default)]
pub struct FakeMounter(Mutex<FakeMounterInner>);

impl FakeMounter {
  pub fn new(mps: impl IntoIterator<Item = MountPoint>) -> Self {
    let inner = FakeMounterInner {
      mount_points: mps.into_iter().collect(),
      ..Default::default()
    };

    Self(Mutex::new(inner))
  }

  // A panicking test must not poison every later call.
  fn lock(&self) -> MutexGuard<'_, FakeMounterInner> {
    self.0.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn set_formatted(&self, device: PathBuf, fs_type: String) {
    self.lock().formatted.insert(device, fs_type);
  }

  pub fn set_failure(&self, operation: FakeOperation, message: String) {
    self.lock().failures.insert(operation, message);
  }

  pub fn clear_failures(&self) {
    self.lock().failures.clear();
  }

  pub fn reset_log(&self) {
    self.lock().log.clear();
  }

  pub fn get_log(&self) -> Vec<FakeAction> {
    self.lock().log.clone()
  }

  pub fn mount_points(&self) -> Vec<MountPoint> {
    self.lock().mount_points.clone()
  }
}

// If path is a symlink, get its absolute path. The fake never creates files,
// so a missing path is used as is.
fn resolve(path: &Path) -> PathBuf {
  path.canonicalize().unwrap_or_else(|_| path.to_owned())
}

impl MounterImpl for FakeMounter {
  fn new(_: MounterOptions) -> Result<Self> {
    Ok(FakeMounter::default())
  }

  fn is_formatted(&self, source: &Path, _: &EncryptionContext) -> Result<bool> {
    let inner = self.lock();
    inner.check(FakeOperation::IsFormatted)?;

    Ok(inner.formatted.contains_key(source))
  }

  fn format(&self, source: &Path, fs_type: &str, encryption: &EncryptionContext) -> Result<()> {
    let mut inner = self.lock();
    inner.check(FakeOperation::Format)?;

    info!("Fake mounter: formatted {} as {}", source.display(), fs_type);
    inner.formatted.insert(source.to_owned(), fs_type.to_owned());
    inner.log.push(FakeAction::Format {
      source: source.to_owned(),
      fs_type: fs_type.to_owned(),
      encrypted: encryption.is_enabled(),
    });

    Ok(())
  }

  fn mount(
    &self,
    source: &Path,
    target: &Path,
    fs_type: &str,
    bind: bool,
    encryption: &EncryptionContext,
    options: &[String],
  ) -> Result<()> {
    let mut inner = self.lock();
    inner.check(FakeOperation::Mount)?;

    let mut device = source.to_owned();
    if bind || options.iter().any(|o| o == "bind") {
      // This is a bind-mount. In order to mimic linux behaviour, we must
      // use the original device of the bind-mount as the real source.
      // E.g. when mounted /dev/sda like this:
      //      $ mount /dev/sda /mnt/test
      //      $ mount -o bind /mnt/test /mnt/bound
      // then /proc/mount contains:
      // /dev/sda /mnt/test
      // /dev/sda /mnt/bound
      // (and not /mnt/test /mnt/bound)
      let source = resolve(source);
      if let Some(mnt) = inner.mount_points.iter().find(|mnt| mnt.path == source) {
        device = mnt.device.clone();
      }
    }

    let target = resolve(target);
    inner.mount_points.push(MountPoint {
      device: device.clone(),
      path: target.clone(),
      ty: fs_type.to_owned(),
      opts: options.to_vec(),
      freq: 0,
      pass: 0,
    });
    info!(
      "Fake mounter: mounted {} to {}",
      device.display(),
      target.display()
    );
    inner.log.push(FakeAction::Mount {
      source: source.to_owned(),
      target,
      fs_type: fs_type.to_owned(),
      bind,
      encrypted: encryption.is_enabled(),
      options: options.to_vec(),
    });

    Ok(())
  }

  fn unmount(&self, target: &Path, force: bool) -> Result<()> {
    let mut inner = self.lock();
    inner.check(FakeOperation::Unmount)?;

    let target = resolve(target);
    if let Some(i) = inner.mount_points.iter().position(|mp| mp.path == target) {
      let mp = inner.mount_points.remove(i);
      info!(
        "Fake mounter: unmounted {} from {}",
        mp.device.display(),
        target.display()
      );
    }

    inner.log.push(FakeAction::Unmount { target, force });
    Ok(())
  }

  fn list(&self) -> Result<Vec<MountPoint>> {
    Ok(self.lock().mount_points.clone())
  }

  fn is_mounted(&self, target: &Path) -> Result<bool> {
    let inner = self.lock();
    inner.check(FakeOperation::IsMounted)?;

    let target = resolve(target);
    Ok(inner.mount_points.iter().any(|mp| mp.path == target))
  }
}
