use crate::{EncryptionContext, MountError, MountPoint, MounterOptions, Result};
use futures::channel::oneshot::{channel as oneshot, Receiver};
use once_cell::sync::OnceCell;
use std::{
  fs,
  future::Future,
  io,
  panic::{catch_unwind, AssertUnwindSafe, RefUnwindSafe, UnwindSafe},
  path::{Path, PathBuf},
  sync::Arc,
};
use tracing::{error, Span};

/// Work item executed on the dispatcher thread, inside the span of the
/// caller that queued it.
struct Job {
  span: Span,
  work: Box<dyn FnOnce() + Send>,
}

/// Blocking mount primitives. Callers never invoke these directly: the
/// async wrappers in this crate queue them on a single dispatcher thread.
pub trait MounterImpl: Sized + Send + Sync + UnwindSafe + RefUnwindSafe + 'static {
  fn new(options: MounterOptions) -> Result<Self>;

  /// Whether `source` already carries a filesystem (or, with encryption
  /// enabled, a LUKS container).
  fn is_formatted(&self, source: &Path, encryption: &EncryptionContext) -> Result<bool>;

  /// Creates a `fs_type` filesystem on `source`, inside a LUKS container when
  /// encryption is enabled.
  fn format(&self, source: &Path, fs_type: &str, encryption: &EncryptionContext) -> Result<()>;

  /// Mounts source to target as fs_type with given options.
  fn mount(
    &self,
    source: &Path,
    target: &Path,
    fs_type: &str,
    bind: bool,
    encryption: &EncryptionContext,
    options: &[String],
  ) -> Result<()>;

  /// Unmounts given target. A forced unmount falls back to `umount -f` when
  /// the regular unmount does not finish in time.
  fn unmount(&self, target: &Path, force: bool) -> Result<()>;

  /// List returns a list of all mounted filesystems. This is guaranteed
  /// to be consistent.
  fn list(&self) -> Result<Vec<MountPoint>>;

  fn is_mounted(&self, target: &Path) -> Result<bool> {
    // /proc/mounts lists resolved paths.
    let target = match fs::canonicalize(target) {
      Ok(v) => v,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
      Err(_) => target.to_owned(),
    };

    Ok(
      self
        .list()?
        .iter()
        .any(|mp| is_mount_point_match(mp, &target)),
    )
  }

  /// Finds the device mounted at `mount_path`, together with the number of
  /// mount points (including `mount_path`) that reference the same device.
  fn get_device_name_from_mount(&self, mount_path: &Path) -> Result<Option<(PathBuf, usize)>> {
    let mps = self.list()?;

    let mount_path = fs::canonicalize(mount_path).unwrap_or_else(|_| mount_path.to_owned());

    // Stacked mounts on the same path report the first device only.
    Ok(
      mps
        .iter()
        .find(|m| is_mount_point_match(m, &mount_path))
        .map(|m| m.device().to_owned())
        .map(|device| {
          let ref_count = mps.iter().filter(|m| m.device() == device).count();
          (device, ref_count)
        }),
    )
  }
}

/// Mount table paths are compared after unescaping, so a path removed while
/// mounted carries a literal ` (deleted)` suffix.
pub(crate) fn is_mount_point_match(mp: &MountPoint, dir: &Path) -> bool {
  let deleted_dir = format!("{} (deleted)", dir.display());
  mp.path() == dir || mp.path() == Path::new(&deleted_dir)
}

static DISPATCHER: OnceCell<crossbeam::channel::Sender<Job>> = OnceCell::new();

fn dispatch_loop(jobs: crossbeam::channel::Receiver<Job>) {
  for job in jobs {
    let Job { span, work } = job;
    let _enter = span.enter();
    if let Err(panic) = catch_unwind(AssertUnwindSafe(work)) {
      error!("Mount operation panicked: {:?}", panic);
    }
  }
}

fn dispatcher() -> Result<&'static crossbeam::channel::Sender<Job>> {
  DISPATCHER.get_or_try_init(|| {
    let (sender, receiver) = crossbeam::channel::unbounded();
    std::thread::Builder::new()
      .name("mount-utils:dispatch".into())
      .spawn(move || dispatch_loop(receiver))
      .map_err(|e| MountError::new(format!("failed to spawn mount dispatcher: {}", e)))?;
    Ok(sender)
  })
}

/// Runs `f` on the dispatcher thread. Mount operations are executed one at
/// a time and never block the async runtime.
pub(crate) fn run<R, F>(f: F) -> impl Future<Output = Result<R>>
where
  F: FnOnce() -> Result<R> + Send + UnwindSafe + RefUnwindSafe + 'static,
  R: Send + 'static,
{
  let (sender, receiver) = oneshot();

  match dispatcher() {
    Ok(jobs) => {
      let job = Job {
        span: Span::current(),
        work: Box::new(move || {
          let _ = sender.send(f());
        }),
      };

      // On failure the job, and with it the sender, is dropped, so the
      // caller sees a cancelled request.
      if let Err(e) = jobs.send(job) {
        error!("Mount dispatcher is gone: {}", e);
      }
    }
    Err(e) => {
      let _ = sender.send(Err(e));
    }
  }

  read(receiver)
}

pub(crate) fn run_inst<T, R, F>(mounter: Arc<T>, f: F) -> impl Future<Output = Result<R>>
where
  T: MounterImpl,
  F: FnOnce(&T) -> Result<R> + Send + UnwindSafe + RefUnwindSafe + 'static,
  R: Send + 'static,
{
  run(move || f(&*mounter))
}

async fn read<R>(receiver: Receiver<Result<R>>) -> Result<R> {
  receiver
    .await
    .unwrap_or_else(|_| Err(MountError::new("mount operation was cancelled or panicked")))
}

/// Option sets for a bind mount. Bind mounts ignore most options on the
/// initial mount, so they are applied by a second `remount`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct BindOptions {
  pub mount: Vec<String>,
  pub remount: Vec<String>,
}

impl BindOptions {
  /// `None` unless `options` asks for a bind mount.
  pub(crate) fn parse(options: &[String]) -> Option<Self> {
    if !options.iter().any(|o| o == "bind") {
      return None;
    }

    // "bind" stays in the remount, otherwise remounting read-only would
    // also affect the source mount.
    let mut mount = vec!["bind".to_owned()];
    let mut remount = vec!["bind".to_owned(), "remount".to_owned()];
    for option in options.iter().filter(|o| *o != "bind") {
      // _netdev is userspace only and is not inherited by the bind mount.
      if option == "_netdev" {
        mount.push(option.clone());
      }
      remount.push(option.clone());
    }

    Some(BindOptions { mount, remount })
  }
}

pub trait MounterWrapper {
  type Mounter: MounterImpl;

  fn wrap(inner: Arc<Self::Mounter>) -> Self;

  fn mounter(&self) -> &Arc<Self::Mounter>;
}

#[cfg(test)]
mod tests {
  use super::*;
  use test_case::test_case;

  fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn plain_mount_has_no_bind_options() {
    assert_eq!(BindOptions::parse(&strings(&["vers=2", "ro", "_netdev"])), None);
  }

  #[test_case(&["bind", "vers=2", "ro", "_netdev"], &["bind", "_netdev"], &["bind", "remount", "vers=2", "ro", "_netdev"])]
  #[test_case(&["discard", "bind", "ro"], &["bind"], &["bind", "remount", "discard", "ro"])]
  fn bind_options(options: &[&str], mount: &[&str], remount: &[&str]) {
    let parsed = BindOptions::parse(&strings(options)).unwrap();

    assert_eq!(parsed.mount, strings(mount));
    assert_eq!(parsed.remount, strings(remount));
  }

  #[test_case("/mnt/a", "/mnt/a", true)]
  #[test_case("/mnt/a (deleted)", "/mnt/a", true)]
  #[test_case("/mnt/my dir (deleted)", "/mnt/my dir", true)]
  #[test_case("/mnt/ab", "/mnt/a", false)]
  fn mount_point_match(mount_path: &str, dir: &str, expected: bool) {
    let mp = MountPoint::new("/dev/vdb", mount_path, "ext4");

    assert_eq!(is_mount_point_match(&mp, Path::new(dir)), expected);
  }
}
