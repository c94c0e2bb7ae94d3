use std::{fmt, path::PathBuf};
use zeroize::Zeroizing;

pub const DEFAULT_LUKS_CIPHER: &str = "aes-xts-plain64";
pub const DEFAULT_LUKS_KEY_SIZE: u32 = 512;

const MAPPER_DIR: &str = "/dev/mapper";

/// Describes whether (and how) a block device is wrapped in a LUKS container
/// before it is formatted or mounted.
///
/// A context is built per request and never persisted. The key material is
/// wiped from memory when the context is dropped.
#[derive(Clone)]
pub struct EncryptionContext {
  enabled: bool,
  volume_name: String,
  key: Zeroizing<Vec<u8>>,
  cipher: String,
  key_size: u32,
}

impl EncryptionContext {
  /// A context for a plain, unencrypted device.
  pub fn disabled() -> Self {
    EncryptionContext {
      enabled: false,
      volume_name: String::new(),
      key: Zeroizing::new(Vec::new()),
      cipher: DEFAULT_LUKS_CIPHER.into(),
      key_size: DEFAULT_LUKS_KEY_SIZE,
    }
  }

  /// A LUKS context using the default cipher and key size. The volume name
  /// is used as the device-mapper name of the opened container.
  pub fn luks(volume_name: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
    EncryptionContext {
      enabled: true,
      volume_name: volume_name.into(),
      key: Zeroizing::new(key.into()),
      cipher: DEFAULT_LUKS_CIPHER.into(),
      key_size: DEFAULT_LUKS_KEY_SIZE,
    }
  }

  pub fn with_cipher(mut self, cipher: impl Into<String>) -> Self {
    self.cipher = cipher.into();
    self
  }

  pub fn with_key_size(mut self, key_size: u32) -> Self {
    self.key_size = key_size;
    self
  }

  #[inline]
  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  #[inline]
  pub fn volume_name(&self) -> &str {
    &self.volume_name
  }

  #[inline]
  pub fn key(&self) -> &[u8] {
    &self.key
  }

  #[inline]
  pub fn has_key(&self) -> bool {
    !self.key.is_empty()
  }

  #[inline]
  pub fn cipher(&self) -> &str {
    &self.cipher
  }

  #[inline]
  pub fn key_size(&self) -> u32 {
    self.key_size
  }

  /// Name of the device-mapper target the container is opened as.
  #[inline]
  pub fn mapper_name(&self) -> &str {
    &self.volume_name
  }

  pub fn mapper_device(&self) -> PathBuf {
    mapper_device(self.mapper_name())
  }
}

pub(crate) fn mapper_device(name: &str) -> PathBuf {
  PathBuf::from(MAPPER_DIR).join(name)
}

/// Returns the mapper name if `device` lives under `/dev/mapper`.
pub(crate) fn mapper_name_of(device: &std::path::Path) -> Option<&str> {
  device
    .strip_prefix(MAPPER_DIR)
    .ok()
    .and_then(|rest| rest.to_str())
    .filter(|name| !name.is_empty() && !name.contains('/'))
}

impl fmt::Debug for EncryptionContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EncryptionContext")
      .field("enabled", &self.enabled)
      .field("volume_name", &self.volume_name)
      .field("key", &"REDACTED")
      .field("cipher", &self.cipher)
      .field("key_size", &self.key_size)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::Path;
  use test_case::test_case;

  #[test]
  fn debug_never_prints_key() {
    let ctx = EncryptionContext::luks("pvc-1", b"hunter2".to_vec());
    let printed = format!("{:?}", ctx);

    assert!(!printed.contains("hunter2"));
    assert!(printed.contains("REDACTED"));
  }

  #[test]
  fn luks_defaults() {
    let ctx = EncryptionContext::luks("pvc-1", "key");

    assert!(ctx.is_enabled());
    assert!(ctx.has_key());
    assert_eq!(ctx.cipher(), DEFAULT_LUKS_CIPHER);
    assert_eq!(ctx.key_size(), DEFAULT_LUKS_KEY_SIZE);
    assert_eq!(ctx.mapper_device(), Path::new("/dev/mapper/pvc-1"));
  }

  #[test]
  fn disabled_has_no_key() {
    let ctx = EncryptionContext::disabled();

    assert!(!ctx.is_enabled());
    assert!(!ctx.has_key());
  }

  #[test_case("/dev/mapper/pvc-1", Some("pvc-1"))]
  #[test_case("/dev/mapper/", None)]
  #[test_case("/dev/mapper/a/b", None)]
  #[test_case("/dev/vdb", None)]
  fn mapper_names(device: &str, expected: Option<&str>) {
    assert_eq!(mapper_name_of(Path::new(device)), expected);
  }
}
