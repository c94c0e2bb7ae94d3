use csi_proto::volume::CapacityRange;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Bytes per provisioning unit (GiB).
pub const GIB: u64 = 1 << 30;

/// Class of remote block storage. Each tier has its own minimum size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageTier {
  Default,
  Bulk,
}

impl StorageTier {
  /// Smallest volume the backend provisions for this tier, in GiB.
  #[inline]
  pub fn minimum_gb(self) -> u64 {
    match self {
      StorageTier::Default => 1,
      StorageTier::Bulk => 100,
    }
  }

  /// Name of the tier as the storage backend knows it.
  #[inline]
  pub fn as_str(self) -> &'static str {
    match self {
      StorageTier::Default => "ssd",
      StorageTier::Bulk => "bulk",
    }
  }
}

impl Default for StorageTier {
  fn default() -> Self {
    StorageTier::Default
  }
}

impl fmt::Display for StorageTier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid storage type {0:?}, expected \"ssd\" or \"bulk\"")]
pub struct InvalidStorageTier(pub String);

impl FromStr for StorageTier {
  type Err = InvalidStorageTier;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "" | "ssd" => Ok(StorageTier::Default),
      "bulk" => Ok(StorageTier::Bulk),
      other => Err(InvalidStorageTier(other.to_owned())),
    }
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CapacityError {
  #[error("limit bytes {limit} is less than the minimum of {minimum_gb} GiB for {tier} volumes")]
  CapacityTooSmall {
    limit: u64,
    minimum_gb: u64,
    tier: StorageTier,
  },

  #[error("{gb} GiB (required {required} bytes, rounded up) exceeds limit bytes {limit}")]
  CapacityRangeUnsatisfiable { required: u64, limit: u64, gb: u64 },
}

/// Converts a requested byte range into a whole number of GiB for `tier`.
///
/// Unset bounds (zero on the wire) are `None` in [CapacityRange]. The result
/// is never below the tier minimum, and never above the limit when one is
/// given.
pub fn solve(range: CapacityRange, tier: StorageTier) -> Result<u64, CapacityError> {
  let minimum_gb = tier.minimum_gb();
  let limit = range.limit_bytes().map(|v| v.get());

  if let Some(limit) = limit {
    if limit < minimum_gb * GIB {
      return Err(CapacityError::CapacityTooSmall {
        limit,
        minimum_gb,
        tier,
      });
    }
  }

  let required = match range.required_bytes() {
    Some(v) => v.get(),
    None => return Ok(minimum_gb),
  };

  let mut gb = required / GIB;
  if required % GIB != 0 {
    gb += 1;
  }

  if gb < minimum_gb {
    gb = minimum_gb;
  }

  // gb * GIB may overflow for huge requests, compare in GiB instead.
  if let Some(limit) = limit {
    if gb > limit / GIB {
      return Err(CapacityError::CapacityRangeUnsatisfiable {
        required,
        limit,
        gb,
      });
    }
  }

  Ok(gb)
}
