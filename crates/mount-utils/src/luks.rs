use crate::{
  encryption::mapper_name_of,
  runner::MounterImpl,
  unix::{make_fs, run_checked, OsMounter},
  EncryptionContext, MountError, MountPoint, MounterOptions, Result,
};
use duct::cmd;
use std::{
  ffi::OsStr,
  io::{self, Write},
  path::{Path, PathBuf},
  process::{Command, Stdio},
};
use tracing::{debug, info};

/// `blkid` type reported for LUKS (1 and 2) containers.
const LUKS_FS_TYPE: &str = "crypto_LUKS";

// `cryptsetup status` exit code for an inactive mapping.
const CRYPTSETUP_INACTIVE: i32 = 4;

pub struct LuksMounter {
  inner: OsMounter,
  cryptsetup: PathBuf,
}

impl LuksMounter {
  fn encryption_error(what: &str, e: io::Error) -> MountError {
    MountError::EncryptionFailed(what.to_owned(), e)
  }

  /// Runs `cryptsetup` with `key` written to its stdin from the borrowed
  /// buffer.
  fn run_with_key(&self, args: &[&OsStr], key: &[u8], what: &str) -> io::Result<()> {
    let mut child = Command::new(&self.cryptsetup)
      .args(args)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
      // An early exit closes the pipe; its status carries the diagnostic.
      match stdin.write_all(key).and_then(|_| stdin.flush()) {
        Err(e) if e.kind() != io::ErrorKind::BrokenPipe => return Err(e),
        _ => (),
      }
    }

    let output = child.wait_with_output()?;
    if output.status.success() {
      return Ok(());
    }

    let mut diagnostic = String::from_utf8_lossy(&output.stderr).trim().to_owned();
    if diagnostic.is_empty() {
      diagnostic = String::from_utf8_lossy(&output.stdout).trim().to_owned();
    }
    Err(io::Error::new(
      io::ErrorKind::Other,
      format!("{} failed ({}): {}", what, output.status, diagnostic),
    ))
  }

  /// Whether the open container behind `encryption` already carries a
  /// filesystem. A mapping opened only for the check is closed again.
  fn has_inner_filesystem(&self, device: &Path, encryption: &EncryptionContext) -> Result<bool> {
    let name = encryption.mapper_name();
    let was_active = self.is_active(name)?;
    let mapper = self.luks_open(device, encryption)?;
    let probed = self.inner.probe(&mapper);
    if !was_active {
      self.luks_close(name)?;
    }

    let fs_type = probed?;
    debug!(
      "LUKS container {} holds {:?}",
      device.display(),
      fs_type.as_deref().unwrap_or("nothing")
    );
    Ok(fs_type.is_some())
  }

  fn luks_format(&self, device: &Path, encryption: &EncryptionContext) -> Result<()> {
    info!(
      "Creating LUKS container on {} (cipher {}, key size {})",
      device.display(),
      encryption.cipher(),
      encryption.key_size()
    );

    let key_size = encryption.key_size().to_string();
    self
      .run_with_key(
        &[
          OsStr::new("luksFormat"),
          OsStr::new("--batch-mode"),
          OsStr::new("--cipher"),
          OsStr::new(encryption.cipher()),
          OsStr::new("--key-size"),
          OsStr::new(&key_size),
          OsStr::new("--key-file"),
          OsStr::new("-"),
          device.as_os_str(),
        ],
        encryption.key(),
        "cryptsetup luksFormat",
      )
      .map_err(|e| Self::encryption_error(&device.display().to_string(), e))
  }

  fn is_active(&self, name: &str) -> Result<bool> {
    let output = cmd!(&self.cryptsetup, "status", name)
      .stdout_capture()
      .stderr_capture()
      .unchecked()
      .run()
      .map_err(|e| Self::encryption_error(name, e))?;

    match output.status.code() {
      Some(0) => Ok(true),
      Some(CRYPTSETUP_INACTIVE) => Ok(false),
      _ => {
        let diagnostic = String::from_utf8_lossy(&output.stderr).to_ascii_lowercase();
        if diagnostic.contains("not active") || diagnostic.contains("does not exist") {
          Ok(false)
        } else {
          Err(Self::encryption_error(
            name,
            io::Error::new(
              io::ErrorKind::Other,
              format!("cryptsetup status failed ({}): {}", output.status, diagnostic.trim()),
            ),
          ))
        }
      }
    }
  }

  fn luks_open(&self, device: &Path, encryption: &EncryptionContext) -> Result<PathBuf> {
    let name = encryption.mapper_name();
    let mapper = encryption.mapper_device();
    if self.is_active(name)? {
      debug!("LUKS mapping {} is already open", name);
      return Ok(mapper);
    }

    info!("Opening LUKS container {} as {}", device.display(), name);
    self
      .run_with_key(
        &[
          OsStr::new("luksOpen"),
          OsStr::new("--key-file"),
          OsStr::new("-"),
          device.as_os_str(),
          OsStr::new(name),
        ],
        encryption.key(),
        "cryptsetup luksOpen",
      )
      .map_err(|e| Self::encryption_error(name, e))?;

    Ok(mapper)
  }

  fn luks_close(&self, name: &str) -> Result<()> {
    if !self.is_active(name)? {
      return Ok(());
    }

    info!("Closing LUKS mapping {}", name);
    run_checked(cmd!(&self.cryptsetup, "luksClose", name), "cryptsetup luksClose")
      .map(|_| ())
      .map_err(|e| Self::encryption_error(name, e))
  }

  fn check_context(encryption: &EncryptionContext) -> Result<()> {
    if encryption.volume_name().is_empty() || encryption.volume_name().contains('/') {
      return Err(MountError::new(format!(
        "invalid LUKS mapping name {:?}",
        encryption.volume_name()
      )));
    }

    if !encryption.has_key() {
      return Err(MountError::new("missing LUKS key material"));
    }

    Ok(())
  }
}

impl MounterImpl for LuksMounter {
  fn new(options: MounterOptions) -> Result<Self> {
    let cryptsetup = options.cryptsetup_path.clone();
    Ok(LuksMounter {
      inner: OsMounter::new(options)?,
      cryptsetup,
    })
  }

  fn is_formatted(&self, source: &Path, encryption: &EncryptionContext) -> Result<bool> {
    if !encryption.is_enabled() {
      return self.inner.is_formatted(source, encryption);
    }

    match self.inner.probe(source)? {
      None => Ok(false),
      Some(fs_type) if fs_type == LUKS_FS_TYPE => {
        Self::check_context(encryption)?;
        self.has_inner_filesystem(source, encryption)
      }
      Some(fs_type) => Err(MountError::FilesystemMismatch(format!(
        "{} holds a {} filesystem but encryption was requested",
        source.display(),
        fs_type
      ))),
    }
  }

  fn format(&self, source: &Path, fs_type: &str, encryption: &EncryptionContext) -> Result<()> {
    if !encryption.is_enabled() {
      return self.inner.format(source, fs_type, encryption);
    }

    Self::check_context(encryption)?;
    // A header left by an interrupted format is reused.
    match self.inner.probe(source)? {
      Some(found) if found == LUKS_FS_TYPE => {
        info!("Reusing LUKS container on {}", source.display())
      }
      _ => self.luks_format(source, encryption)?,
    }
    let mapper = self.luks_open(source, encryption)?;
    let formatted = make_fs(&mapper, fs_type);
    let closed = self.luks_close(encryption.mapper_name());

    formatted.and(closed)
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
    let plain = EncryptionContext::disabled();
    if bind || !encryption.is_enabled() {
      return self
        .inner
        .mount(source, target, fs_type, bind, &plain, options);
    }

    Self::check_context(encryption)?;
    let mapper = self.luks_open(source, encryption)?;
    self
      .inner
      .mount(&mapper, target, fs_type, false, &plain, options)
  }

  fn unmount(&self, target: &Path, force: bool) -> Result<()> {
    let mounted = self.get_device_name_from_mount(target)?;
    self.inner.unmount(target, force)?;

    // The mapping stays open while any other mount (e.g. a publish bind
    // mount) still references the device.
    if let Some((device, refs)) = mounted {
      match mapper_name_of(&device) {
        Some(name) if refs <= 1 => self.luks_close(name)?,
        Some(name) => debug!("LUKS mapping {} still has {} references", name, refs - 1),
        None => (),
      }
    }

    Ok(())
  }

  fn list(&self) -> Result<Vec<MountPoint>> {
    self.inner.list()
  }
}
