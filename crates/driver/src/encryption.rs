use csi_mount_utils::EncryptionContext;
use csi_proto::Secrets;
use std::collections::HashMap;
use thiserror::Error;

/// Volume/publish context key carrying `"true"` or `"false"`.
pub const LUKS_ENCRYPTED_KEY: &str = "csi.blockvol.dev/luks-encrypted";
pub const LUKS_CIPHER_KEY: &str = "csi.blockvol.dev/luks-cipher";
pub const LUKS_KEY_SIZE_KEY: &str = "csi.blockvol.dev/luks-key-size";

/// Name of the secret holding the LUKS passphrase.
pub const LUKS_KEY_SECRET: &str = "luksKey";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid LUKS key size {0:?}")]
pub struct InvalidKeySize(pub String);

/// Whether a context flag value enables encryption. Only the literal
/// `"true"` does.
#[inline]
pub fn is_enabled(value: Option<&str>) -> bool {
  value == Some("true")
}

/// Derives the encryption directive for a stage or publish call.
///
/// `volume_name` becomes the device-mapper name of the opened container.
/// An enabled context may come without key material (publish requests
/// usually carry no secrets), callers that open the container check
/// [EncryptionContext::has_key].
pub fn build(
  volume_name: &str,
  secrets: &Secrets,
  publish_context: &HashMap<String, String>,
) -> Result<EncryptionContext, InvalidKeySize> {
  if !is_enabled(publish_context.get(LUKS_ENCRYPTED_KEY).map(|v| &**v)) {
    return Ok(EncryptionContext::disabled());
  }

  let key = secrets.get(LUKS_KEY_SECRET).unwrap_or_default();
  let mut context = EncryptionContext::luks(volume_name, key.as_bytes());
  if let Some(cipher) = publish_context.get(LUKS_CIPHER_KEY) {
    if !cipher.is_empty() {
      context = context.with_cipher(cipher.as_str());
    }
  }

  if let Some(key_size) = publish_context.get(LUKS_KEY_SIZE_KEY) {
    if !key_size.is_empty() {
      let key_size = key_size
        .parse::<u32>()
        .map_err(|_| InvalidKeySize(key_size.clone()))?;
      context = context.with_key_size(key_size);
    }
  }

  Ok(context)
}
