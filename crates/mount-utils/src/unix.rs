use crate::{
  runner::{BindOptions, MounterImpl},
  EncryptionContext, MountError, MountPoint, MounterOptions, Result, DEFAULT_MOUNT_COMMAND,
};
use crossbeam::{scope, select};
use duct::{cmd, Expression};
use smallvec::SmallVec;
use std::{
  ffi::OsString,
  fs, io,
  num::NonZeroUsize,
  path::{Path, PathBuf},
  time::Duration,
};
use tracing::{debug, error, info};
use which::which;

const PROC_MOUNTS_PATH: &str = "/proc/mounts";
const MAX_LIST_TRIES: NonZeroUsize = unsafe { NonZeroUsize::new_unchecked(3) };
const MOUNTS_LINE_FIELDS: usize = 6;

// blkid exits with 2 when no filesystem signature could be found.
const BLKID_NOTHING_FOUND: i32 = 2;

pub struct OsMounter {
  blkid: PathBuf,
  force_unmount_after: Duration,
}

impl MounterImpl for OsMounter {
  fn new(options: MounterOptions) -> Result<Self> {
    Ok(OsMounter {
      blkid: options.blkid_path,
      force_unmount_after: options.force_unmount_after,
    })
  }

  fn is_formatted(&self, source: &Path, encryption: &EncryptionContext) -> Result<bool> {
    if encryption.is_enabled() {
      return Err(MountError::EncryptionUnsupported);
    }

    Ok(self.probe(source)?.is_some())
  }

  fn format(&self, source: &Path, fs_type: &str, encryption: &EncryptionContext) -> Result<()> {
    if encryption.is_enabled() {
      return Err(MountError::EncryptionUnsupported);
    }

    make_fs(source, fs_type)
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
    // Bind mounts re-expose an already opened device, so the context only
    // matters for the initial mount.
    if encryption.is_enabled() && !bind {
      return Err(MountError::EncryptionUnsupported);
    }

    fs::create_dir_all(target)?;

    let mut options = options.to_vec();
    if bind && !options.iter().any(|o| o == "bind") {
      options.push("bind".into());
    }

    match BindOptions::parse(&options) {
      Some(bind) => {
        do_mount(source, target, fs_type, &bind.mount)?;
        do_mount(source, target, fs_type, &bind.remount)
      }
      None => do_mount(source, target, fs_type, &options),
    }
  }

  fn unmount(&self, target: &Path, force: bool) -> Result<()> {
    info!("Unmounting {}", target.display());
    let cmd = cmd!("umount", target).stderr_to_stdout().stdout_capture();

    let run_forced = if force {
      let duration = self.force_unmount_after;
      let handle = cmd.start()?;
      let handle = &handle;
      scope::<'_, _, Result<bool>>(|s| {
        let (sender, receiver) = crossbeam::channel::bounded(1);

        s.spawn(move |_| {
          let result = handle.wait().map(|_| ());
          let _ = sender.send(result);
        });

        let outcome = select! {
          recv(receiver) -> result => Some(result),
          default(duration) => None,
        };

        drop(receiver);
        match outcome {
          Some(Ok(Ok(()))) => Ok(false),
          Some(Ok(Err(e))) => Err(e.into()),
          Some(Err(_)) => Err(MountError::new("umount waiter disconnected")),
          None => {
            let _ = handle.kill();
            Ok(true)
          }
        }
      })
      .map_err(|e| MountError::new(format!("Failed to spawn threads: {:?}", e)))??
    } else {
      run_checked(cmd, "umount")?;
      false
    };

    if run_forced {
      info!("Unmount of {} timed out, forcing", target.display());
      run_checked(cmd!("umount", "-f", target), "umount -f")?;
    }

    Ok(())
  }

  fn list(&self) -> Result<Vec<MountPoint>> {
    list_proc_mounts(Path::new(PROC_MOUNTS_PATH))
  }
}

/// Runs `expression`, turning a non-zero exit status into an error that
/// carries the command output.
pub(crate) fn run_checked(expression: Expression, what: &str) -> io::Result<Vec<u8>> {
  let output = expression
    .stderr_to_stdout()
    .stdout_capture()
    .unchecked()
    .run()?;

  if output.status.success() {
    Ok(output.stdout)
  } else {
    Err(io::Error::new(
      io::ErrorKind::Other,
      format!(
        "{} failed ({}): {}",
        what,
        output.status,
        String::from_utf8_lossy(&output.stdout).trim()
      ),
    ))
  }
}

impl OsMounter {
  /// Returns the filesystem (or container) type found on `source`, if any.
  pub(crate) fn probe(&self, source: &Path) -> Result<Option<String>> {
    probe_filesystem(&self.blkid, source)
  }
}

fn probe_filesystem(blkid: &Path, source: &Path) -> Result<Option<String>> {
  let output = cmd!(blkid, "-p", "-s", "TYPE", "-o", "value", source)
    .stdout_capture()
    .stderr_capture()
    .unchecked()
    .run()
    .map_err(|e| MountError::GetDiskFormatFailed(source.display().to_string(), e))?;

  match output.status.code() {
    Some(0) => {
      let fs_type = String::from_utf8_lossy(&output.stdout).trim().to_owned();
      debug!("{} is formatted as {:?}", source.display(), fs_type);
      Ok(Some(fs_type))
    }
    Some(BLKID_NOTHING_FOUND) => Ok(None),
    _ => Err(MountError::GetDiskFormatFailed(
      source.display().to_string(),
      io::Error::new(
        io::ErrorKind::Other,
        format!(
          "blkid failed ({}): {}",
          output.status,
          String::from_utf8_lossy(&output.stderr).trim()
        ),
      ),
    )),
  }
}

pub(crate) fn make_fs(device: &Path, fs_type: &str) -> Result<()> {
  let mkfs = format!("mkfs.{}", fs_type);
  let mkfs_path = which(&mkfs).map_err(|e| {
    MountError::FormatFailed(
      device.display().to_string(),
      io::Error::new(io::ErrorKind::NotFound, format!("{}: {}", mkfs, e)),
    )
  })?;

  let mut args: Vec<OsString> = Vec::with_capacity(2);
  match fs_type {
    "ext2" | "ext3" | "ext4" => args.push("-F".into()),
    "xfs" => args.push("-f".into()),
    _ => (),
  }
  args.push(device.into());

  info!("Formatting {} as {}", device.display(), fs_type);
  run_checked(duct::cmd(mkfs_path, args), &mkfs)
    .map(|_| ())
    .map_err(|e| MountError::FormatFailed(device.display().to_string(), e))
}

fn do_mount(source: &Path, target: &Path, fs_type: &str, options: &[String]) -> Result<()> {
  let args = mount_args(source, target, fs_type, options);
  info!(
    "Running {} {}",
    DEFAULT_MOUNT_COMMAND,
    args
      .iter()
      .map(|a| a.to_string_lossy())
      .collect::<Vec<_>>()
      .join(" ")
  );

  run_checked(duct::cmd(DEFAULT_MOUNT_COMMAND, args), DEFAULT_MOUNT_COMMAND)
    .map(|_| ())
    .map_err(|e| {
      error!("Mount failed: {}", e);
      e.into()
    })
}

/// `[-t fs_type] [-o options] source target`
fn mount_args(source: &Path, target: &Path, fs_type: &str, options: &[String]) -> Vec<OsString> {
  let mut args = Vec::with_capacity(6);
  if !fs_type.is_empty() {
    args.push(OsString::from("-t"));
    args.push(OsString::from(fs_type));
  }
  if !options.is_empty() {
    args.push(OsString::from("-o"));
    args.push(OsString::from(options.join(",")));
  }
  args.push(source.as_os_str().to_owned());
  args.push(target.as_os_str().to_owned());
  args
}

fn list_proc_mounts(mount_file_path: &Path) -> Result<Vec<MountPoint>> {
  let content = consistent_read(mount_file_path, MAX_LIST_TRIES)?;

  parse_proc_mounts(&content)
}

/// Reads `path` until two consecutive reads agree. The kernel may change
/// /proc files between the reads of a single pass.
fn consistent_read(path: &Path, attempts: NonZeroUsize) -> io::Result<Vec<u8>> {
  let mut previous = fs::read(path)?;
  for _ in 0..attempts.get() {
    let current = fs::read(path)?;
    if current == previous {
      return Ok(current);
    }
    previous = current;
  }

  Err(io::Error::new(
    io::ErrorKind::Other,
    format!(
      "{} kept changing over {} reads",
      path.display(),
      attempts.get()
    ),
  ))
}

fn parse_proc_mounts(content: &[u8]) -> Result<Vec<MountPoint>> {
  std::str::from_utf8(content)
    .map_err(|_| MountError::new("mount table is not valid UTF-8"))?
    .lines()
    .filter(|line| !line.trim().is_empty())
    .map(parse_mount_line)
    .collect()
}

fn parse_mount_line(line: &str) -> Result<MountPoint> {
  let fields = line
    .split_whitespace()
    .collect::<SmallVec<[&str; MOUNTS_LINE_FIELDS]>>();
  let (device, path, ty, opts, freq, pass) = match fields[..] {
    [device, path, ty, opts, freq, pass] => (device, path, ty, opts, freq, pass),
    _ => {
      return Err(MountError::new(format!(
        "expected {} fields in mount entry, got {}: {}",
        MOUNTS_LINE_FIELDS,
        fields.len(),
        line
      )))
    }
  };

  let number = |name: &str, value: &str| -> Result<isize> {
    value
      .parse()
      .map_err(|e| MountError::new(format!("invalid {} '{}': {}", name, value, e)))
  };

  Ok(MountPoint {
    device: PathBuf::from(unescape_octal(device)),
    path: PathBuf::from(unescape_octal(path)),
    ty: ty.to_owned(),
    opts: opts.split(',').map(ToOwned::to_owned).collect(),
    freq: number("freq", freq)?,
    pass: number("pass", pass)?,
  })
}

/// The kernel writes space, tab, newline and backslash in mount table
/// fields as `\040`, `\011`, `\012` and `\134`.
fn unescape_octal(field: &str) -> String {
  let mut decoded = String::with_capacity(field.len());
  let mut rest = field;
  while let Some(at) = rest.find('\\') {
    decoded.push_str(&rest[..at]);
    let escape = match rest.get(at + 1..at + 4) {
      Some("040") => Some(' '),
      Some("011") => Some('\t'),
      Some("012") => Some('\n'),
      Some("134") => Some('\\'),
      _ => None,
    };
    match escape {
      Some(c) => {
        decoded.push(c);
        rest = &rest[at + 4..];
      }
      None => {
        decoded.push('\\');
        rest = &rest[at + 1..];
      }
    }
  }
  decoded.push_str(rest);
  decoded
}

#[cfg(test)]
mod tests {
  use super::{consistent_read, mount_args, parse_proc_mounts, run_checked, unescape_octal};
  use crate::{
    fake::*,
    runner::{is_mount_point_match, MounterImpl},
    MountPoint,
  };
  use duct::cmd;
  use std::{ffi::OsString, io::Write, num::NonZeroUsize, path::Path};
  use tempfile::NamedTempFile;
  use test_case::test_case;

  #[test]
  fn read_proc_mounts() {
    let success_case = "
/dev/0 /path/to/0 type0 flags 0 0
/dev/1    /path/to/1   type1	flags 1 1
/dev/2 /path/to/2 type2 flags,1,2=3 2 2
";

    let mounts = parse_proc_mounts(success_case.as_ref()).expect("parse succeeded");
    assert_eq!(mounts.len(), 3);
    assert_eq!(
      mounts[0],
      MountPoint {
        device: "/dev/0".into(),
        path: "/path/to/0".into(),
        ty: "type0".into(),
        opts: vec!["flags".into()],
        freq: 0,
        pass: 0,
      }
    );
    assert_eq!(
      mounts[1],
      MountPoint {
        device: "/dev/1".into(),
        path: "/path/to/1".into(),
        ty: "type1".into(),
        opts: vec!["flags".into()],
        freq: 1,
        pass: 1,
      }
    );
    assert_eq!(
      mounts[2],
      MountPoint {
        device: "/dev/2".into(),
        path: "/path/to/2".into(),
        ty: "type2".into(),
        opts: vec!["flags".into(), "1".into(), "2=3".into()],
        freq: 2,
        pass: 2,
      }
    );

    let escaped = parse_proc_mounts(
      b"/dev/vdb /var/lib/my\\040kubelet/staging ext4 rw 0 0\n\
/dev/mapper/pvc\\134a /mnt/tab\\011here\\040(deleted) ext4 rw 0 0\n",
    )
    .expect("parse succeeded");
    assert_eq!(escaped[0].path(), Path::new("/var/lib/my kubelet/staging"));
    assert!(is_mount_point_match(
      &escaped[0],
      Path::new("/var/lib/my kubelet/staging")
    ));
    assert_eq!(escaped[1].device(), Path::new("/dev/mapper/pvc\\a"));
    assert!(is_mount_point_match(&escaped[1], Path::new("/mnt/tab\there")));

    let error_cases = &[
      "/dev/0 /path/to/mount\n",
      "/dev/1 /path/to/mount type flags a 0\n",
      "/dev/2 /path/to/mount type flags 0 b\n",
    ];
    for ec in error_cases {
      parse_proc_mounts(ec.as_ref()).expect_err(&format!("Error case '{}' should fail", ec.trim()));
    }
  }

  #[test_case("/mnt/plain", "/mnt/plain" ; "plain")]
  #[test_case("/mnt/a\\040b", "/mnt/a b" ; "space")]
  #[test_case("/mnt/a\\012b\\134", "/mnt/a\nb\\" ; "newline and backslash")]
  #[test_case("/mnt/a\\b", "/mnt/a\\b" ; "unknown escape")]
  #[test_case("/mnt/a\\04", "/mnt/a\\04" ; "truncated escape")]
  fn unescapes_mount_fields(raw: &str, expected: &str) {
    assert_eq!(unescape_octal(raw), expected);
  }

  #[test]
  fn consistent_read_of_stable_file() {
    let mut file = NamedTempFile::new().expect("temp file");
    writeln!(file, "/dev/vdb /mnt/staging ext4 rw 0 0").expect("write");

    let content = consistent_read(file.path(), NonZeroUsize::new(3).unwrap()).expect("read");
    let mounts = parse_proc_mounts(&content).expect("parse");
    assert_eq!(mounts.len(), 1);
    assert_eq!(mounts[0].device(), Path::new("/dev/vdb"));
    assert_eq!(mounts[0].mount_type(), "ext4");
  }

  #[test]
  fn get_device_name_from_mount() {
    let fm = FakeMounter::new(vec![
      MountPoint::new("/dev/mapper/pvc-1", "/var/lib/kubelet/plugins/staging/pvc-1", "ext4"),
      MountPoint::new("/dev/mapper/pvc-1", "/var/lib/kubelet/pods/pod-a/volumes/pvc-1", "ext4"),
      MountPoint::new("/dev/vdc", "/var/lib/kubelet/plugins/staging/pvc-2", "ext4"),
    ]);

    let cases: &[(&str, Option<(&str, usize)>)] = &[
      (
        "/var/lib/kubelet/pods/pod-a/volumes/pvc-1",
        Some(("/dev/mapper/pvc-1", 2)),
      ),
      (
        "/var/lib/kubelet/plugins/staging/pvc-2",
        Some(("/dev/vdc", 1)),
      ),
      ("/var/fake/directory/that/doesnt/exist", None),
    ];

    for (mount_path, expected) in cases {
      let actual = fm
        .get_device_name_from_mount(Path::new(mount_path))
        .unwrap_or_else(|e| panic!("get_device_name_from_mount({}): {:?}", mount_path, e));

      let expected = expected.map(|(device, refs)| (Path::new(device).to_owned(), refs));
      assert_eq!(actual, expected, "wrong device for '{}'", mount_path);
    }
  }

  #[test_case("ext4", &["discard"], "-t ext4 -o discard /dev/vdb /mnt/t" ; "with fs type and options")]
  #[test_case("", &[], "/dev/vdb /mnt/t" ; "bare")]
  #[test_case("xfs", &["bind", "ro"], "-t xfs -o bind,ro /dev/vdb /mnt/t" ; "bind")]
  fn builds_mount_args(fs_type: &str, options: &[&str], expected: &str) {
    let options = options.iter().map(|o| o.to_string()).collect::<Vec<_>>();
    let args = mount_args(Path::new("/dev/vdb"), Path::new("/mnt/t"), fs_type, &options);

    let expected = expected.split(' ').map(OsString::from).collect::<Vec<_>>();
    assert_eq!(args, expected);
  }

  #[test]
  fn run_checked_reports_output() {
    let err = run_checked(cmd!("sh", "-c", "echo boom; exit 3"), "sh").expect_err("must fail");
    let message = err.to_string();

    assert!(message.contains("sh failed"), "{}", message);
    assert!(message.contains("boom"), "{}", message);
  }
}
