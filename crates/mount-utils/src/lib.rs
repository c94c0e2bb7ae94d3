#![allow(clippy::too_many_arguments)]

cfg_if::cfg_if! {
  if #[cfg(unix)] {
    mod luks;
    mod unix;
    use luks::*;
    use unix::*;
  } else {
    compile_error!("Only cfg(unix) is supported at this time")
  }
}

mod encryption;
mod fake;
mod runner;

pub use encryption::{EncryptionContext, DEFAULT_LUKS_CIPHER, DEFAULT_LUKS_KEY_SIZE};
pub use fake::{FakeAction, FakeOperation};

use futures::future::BoxFuture;
use runner::{run, run_inst, MounterImpl, MounterWrapper};
use static_assertions::assert_impl_all;
use std::{
  fmt, io,
  path::{Path, PathBuf},
  result,
  sync::Arc,
  time::Duration,
};
use thiserror::Error;
use tracing::Instrument;

pub type Result<T> = result::Result<T, MountError>;
pub type FutureResult<T> = BoxFuture<'static, Result<T>>;

const DEFAULT_MOUNT_COMMAND: &str = "mount";
const DEFAULT_CRYPTSETUP_COMMAND: &str = "cryptsetup";
const DEFAULT_BLKID_COMMAND: &str = "blkid";
const DEFAULT_FORCE_UNMOUNT_AFTER: Duration = Duration::from_secs(30);

/// Settings shared by every mounter variant.
#[derive(Debug, Clone)]
pub struct MounterOptions {
  /// Path (or name) of the `cryptsetup` binary.
  pub cryptsetup_path: PathBuf,

  /// Path (or name) of the `blkid` binary used to probe devices.
  pub blkid_path: PathBuf,

  /// How long a forced unmount waits for `umount` before retrying with `-f`.
  pub force_unmount_after: Duration,
}

impl Default for MounterOptions {
  fn default() -> Self {
    MounterOptions {
      cryptsetup_path: DEFAULT_CRYPTSETUP_COMMAND.into(),
      blkid_path: DEFAULT_BLKID_COMMAND.into(),
      force_unmount_after: DEFAULT_FORCE_UNMOUNT_AFTER,
    }
  }
}

/// Interface defines the set of format and mount operations the node
/// driver needs on a block device. Every operation that touches a device
/// takes an [EncryptionContext]; the plain mounter rejects enabled contexts.
pub trait Mounter: Sized + Send + Sync + 'static {
  fn new(options: MounterOptions) -> FutureResult<Self>;

  /// Whether `source` already holds a filesystem (or a LUKS container when
  /// encryption is enabled).
  fn is_formatted<P>(&self, source: P, encryption: &EncryptionContext) -> FutureResult<bool>
  where
    P: Into<PathBuf>;

  /// Formats `source` with `fs_type`.
  fn format<P, A>(&self, source: P, fs_type: A, encryption: &EncryptionContext) -> FutureResult<()>
  where
    P: Into<PathBuf>,
    A: Into<String>;

  /// Whether something is mounted at `target`. A missing path is not mounted.
  fn is_mounted<P>(&self, target: P) -> FutureResult<bool>
  where
    P: Into<PathBuf>;

  /// Mounts source to target as fs_type with given options.
  /// options MUST not contain sensitive material (like passwords).
  fn mount<I, P1, P2, A>(
    &self,
    source: P1,
    target: P2,
    fs_type: A,
    bind: bool,
    encryption: &EncryptionContext,
    options: I,
  ) -> FutureResult<()>
  where
    I: IntoIterator,
    <I as IntoIterator>::Item: Into<String>,
    P1: Into<PathBuf>,
    P2: Into<PathBuf>,
    A: Into<String>;

  /// Unmount unmounts given target.
  fn unmount<P>(&self, target: P, force: bool) -> FutureResult<()>
  where
    P: Into<PathBuf>;

  /// List returns a list of all mounted filesystems.
  fn list(&self) -> FutureResult<Vec<MountPoint>>;
}

/// MountPoint represents a single line in /proc/mounts or /etc/fstab.
#[derive(Clone, PartialEq)]
pub struct MountPoint {
  device: PathBuf,
  path: PathBuf,
  ty: String,
  opts: Vec<String>,
  freq: isize,
  pass: isize,
}

impl fmt::Debug for MountPoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MountPoint")
      .field("device", &self.device)
      .field("path", &self.path)
      .field("type", &self.ty)
      .field("opts", &format!("length={}", self.opts.len()))
      .field("freq", &self.freq)
      .field("pass", &self.pass)
      .finish()
  }
}

impl MountPoint {
  pub fn new(device: impl Into<PathBuf>, path: impl Into<PathBuf>, ty: impl Into<String>) -> Self {
    MountPoint {
      device: device.into(),
      path: path.into(),
      ty: ty.into(),
      opts: Vec::new(),
      freq: 0,
      pass: 0,
    }
  }

  #[inline]
  pub fn device(&self) -> &Path {
    &self.device
  }

  #[inline]
  pub fn path(&self) -> &Path {
    &self.path
  }

  #[inline]
  pub fn mount_type(&self) -> &str {
    &self.ty
  }

  #[inline]
  pub fn opts(&self) -> &[String] {
    &self.opts
  }

  #[inline]
  pub fn freq(&self) -> isize {
    self.freq
  }

  #[inline]
  pub fn pass(&self) -> isize {
    self.pass
  }
}

#[derive(Debug, Error)]
pub enum MountError {
  #[error("File system mismatch: {0}")]
  FilesystemMismatch(String),
  #[error("Format failed: {0}")]
  FormatFailed(String, #[source] io::Error),
  #[error("Get disk format failed: {0}")]
  GetDiskFormatFailed(String, #[source] io::Error),
  #[error("Encryption failed: {0}")]
  EncryptionFailed(String, #[source] io::Error),
  #[error("Encryption is not supported by this mounter")]
  EncryptionUnsupported,
  #[error("Unknown mount error: {0}")]
  UnknownMountError(
    #[from]
    #[source]
    io::Error,
  ),
}

impl MountError {
  pub(crate) fn new(msg: impl Into<String>) -> Self {
    MountError::UnknownMountError(io::Error::new(io::ErrorKind::Other, msg.into()))
  }
}

impl<T> Mounter for T
where
  T: MounterWrapper + Send + Sync + 'static,
{
  fn new(options: MounterOptions) -> FutureResult<Self> {
    Box::pin(
      async move {
        run(move || <T as MounterWrapper>::Mounter::new(options))
          .await
          .map(|inner| T::wrap(Arc::new(inner)))
      }
      .in_current_span(),
    )
  }

  fn is_formatted<P>(&self, source: P, encryption: &EncryptionContext) -> FutureResult<bool>
  where
    P: Into<PathBuf>,
  {
    let source = source.into();
    let encryption = encryption.clone();

    Box::pin(run_inst(self.mounter().clone(), move |mounter| {
      mounter.is_formatted(&source, &encryption)
    }))
  }

  fn format<P, A>(&self, source: P, fs_type: A, encryption: &EncryptionContext) -> FutureResult<()>
  where
    P: Into<PathBuf>,
    A: Into<String>,
  {
    let source = source.into();
    let fs_type = fs_type.into();
    let encryption = encryption.clone();

    Box::pin(run_inst(self.mounter().clone(), move |mounter| {
      mounter.format(&source, &fs_type, &encryption)
    }))
  }

  fn is_mounted<P>(&self, target: P) -> FutureResult<bool>
  where
    P: Into<PathBuf>,
  {
    let target = target.into();

    Box::pin(run_inst(self.mounter().clone(), move |mounter| {
      mounter.is_mounted(&target)
    }))
  }

  fn mount<I, P1, P2, A>(
    &self,
    source: P1,
    target: P2,
    fs_type: A,
    bind: bool,
    encryption: &EncryptionContext,
    options: I,
  ) -> FutureResult<()>
  where
    I: IntoIterator,
    <I as IntoIterator>::Item: Into<String>,
    P1: Into<PathBuf>,
    P2: Into<PathBuf>,
    A: Into<String>,
  {
    let source = source.into();
    let target = target.into();
    let fs_type = fs_type.into();
    let encryption = encryption.clone();
    let options = options.into_iter().map(Into::into).collect::<Vec<_>>();

    Box::pin(run_inst(self.mounter().clone(), move |mounter| {
      mounter.mount(&source, &target, &fs_type, bind, &encryption, &options)
    }))
  }

  fn unmount<P>(&self, target: P, force: bool) -> FutureResult<()>
  where
    P: Into<PathBuf>,
  {
    let target = target.into();

    Box::pin(run_inst(self.mounter().clone(), move |mounter| {
      mounter.unmount(&target, force)
    }))
  }

  fn list(&self) -> FutureResult<Vec<MountPoint>> {
    Box::pin(run_inst(self.mounter().clone(), move |mounter| {
      mounter.list()
    }))
  }
}

assert_impl_all!(OsMounter: MounterImpl);
assert_impl_all!(LuksMounter: MounterImpl);
assert_impl_all!(fake::FakeMounter: MounterImpl);

/// Mounts plain block devices with the system `mount`/`umount`/`mkfs` tools.
#[derive(Clone)]
pub struct DefaultMounter(Arc<OsMounter>);

impl MounterWrapper for DefaultMounter {
  type Mounter = OsMounter;

  fn wrap(inner: Arc<Self::Mounter>) -> Self {
    DefaultMounter(inner)
  }

  #[inline]
  fn mounter(&self) -> &Arc<Self::Mounter> {
    &self.0
  }
}

/// Like [DefaultMounter], but layers a LUKS container (via `cryptsetup`)
/// between the device and the filesystem when the encryption context is
/// enabled.
#[derive(Clone)]
pub struct EncryptingMounter(Arc<LuksMounter>);

impl MounterWrapper for EncryptingMounter {
  type Mounter = LuksMounter;

  fn wrap(inner: Arc<Self::Mounter>) -> Self {
    EncryptingMounter(inner)
  }

  #[inline]
  fn mounter(&self) -> &Arc<Self::Mounter> {
    &self.0
  }
}

/// In-memory test double. Clones share state, so a test can keep a handle
/// while the code under test owns another.
#[derive(Clone, Default)]
pub struct FakeMounter(Arc<fake::FakeMounter>);

impl FakeMounter {
  pub fn with_mount_points(mps: impl IntoIterator<Item = MountPoint>) -> Self {
    FakeMounter(Arc::new(fake::FakeMounter::new(mps)))
  }

  /// Marks `device` as already carrying a `fs_type` filesystem.
  pub fn with_formatted(self, device: impl Into<PathBuf>, fs_type: impl Into<String>) -> Self {
    self.0.set_formatted(device.into(), fs_type.into());
    self
  }

  /// Makes every following call of `operation` fail with `message`.
  pub fn fail(&self, operation: FakeOperation, message: impl Into<String>) {
    self.0.set_failure(operation, message.into());
  }

  pub fn clear_failures(&self) {
    self.0.clear_failures();
  }

  /// Side effects performed so far (format, mount, unmount), in order.
  pub fn actions(&self) -> Vec<FakeAction> {
    self.0.get_log()
  }

  pub fn reset_log(&self) {
    self.0.reset_log();
  }

  pub fn mount_points(&self) -> Vec<MountPoint> {
    self.0.mount_points()
  }
}

impl MounterWrapper for FakeMounter {
  type Mounter = fake::FakeMounter;

  fn wrap(inner: Arc<Self::Mounter>) -> Self {
    FakeMounter(inner)
  }

  #[inline]
  fn mounter(&self) -> &Arc<Self::Mounter> {
    &self.0
  }
}
