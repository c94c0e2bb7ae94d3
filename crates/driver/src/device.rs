use std::{
  fs, io,
  path::{Path, PathBuf},
};
use tracing::debug;

/// Default directory of stable block-device links.
pub const DISK_BY_ID_PATH: &str = "/dev/disk/by-id";

/// The kernel limits virtio block serials to 20 bytes
/// (`VIRTIO_BLK_ID_BYTES`).
const SERIAL_LENGTH: usize = 20;

/// The part of a volume id the kernel exposes as the device serial.
pub fn linux_serial(volume_id: &str) -> &str {
  match volume_id.char_indices().nth(SERIAL_LENGTH) {
    Some((end, _)) => &volume_id[..end],
    None => volume_id,
  }
}

/// Finds the device link for `volume_id` below `disk_by_id`.
///
/// The virtio link is preferred. When it does not exist the SCSI link is
/// returned, whether or not that one exists yet; the mounter reports the
/// missing device.
pub fn resolve(disk_by_id: &Path, volume_id: &str) -> PathBuf {
  let serial = linux_serial(volume_id);
  let virtio = disk_by_id.join(format!("virtio-{}", serial));

  match fs::metadata(&virtio) {
    Err(e) if e.kind() == io::ErrorKind::NotFound => {
      let scsi = disk_by_id.join(format!("scsi-{}", serial));
      debug!(
        "{} does not exist, using {}",
        virtio.display(),
        scsi.display()
      );
      scsi
    }
    _ => virtio,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs::File;
  use test_case::test_case;

  const VOLUME_ID: &str = "2d8c8a5e-8a0b-4f3e-9a57-3a1d1f2c6b7e";

  #[test_case(VOLUME_ID => "2d8c8a5e-8a0b-4f3e-9"; "uuid")]
  #[test_case("short" => "short"; "shorter than serial")]
  #[test_case("12345678901234567890" => "12345678901234567890"; "exactly serial length")]
  fn serial(volume_id: &str) -> &str {
    linux_serial(volume_id)
  }

  #[test]
  fn prefers_virtio() {
    let dir = tempfile::tempdir().unwrap();
    File::create(dir.path().join("virtio-2d8c8a5e-8a0b-4f3e-9")).unwrap();
    File::create(dir.path().join("scsi-2d8c8a5e-8a0b-4f3e-9")).unwrap();

    assert_eq!(
      resolve(dir.path(), VOLUME_ID),
      dir.path().join("virtio-2d8c8a5e-8a0b-4f3e-9")
    );
  }

  #[test]
  fn falls_back_to_scsi() {
    let dir = tempfile::tempdir().unwrap();
    File::create(dir.path().join("scsi-2d8c8a5e-8a0b-4f3e-9")).unwrap();

    assert_eq!(
      resolve(dir.path(), VOLUME_ID),
      dir.path().join("scsi-2d8c8a5e-8a0b-4f3e-9")
    );
  }

  #[test]
  fn neither_link_exists() {
    let dir = tempfile::tempdir().unwrap();

    assert_eq!(
      resolve(dir.path(), VOLUME_ID),
      dir.path().join("scsi-2d8c8a5e-8a0b-4f3e-9")
    );
  }
}
