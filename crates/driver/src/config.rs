use crate::{device::DISK_BY_ID_PATH, NodeIdentity, NodeOptions, DRIVER_NAME};
use clap::{Parser, ValueEnum};
use csi_mount_utils::MounterOptions;
use csi_proto::Endpoint;
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
  Text,
  Json,
}

/// CSI node plugin for remote block volumes.
#[derive(Debug, Clone, Parser)]
#[command(name = "csi-blockvol", version)]
pub struct Config {
  /// CSI endpoint, `unix:///path/to/csi.sock` or `tcp://host:port`.
  #[arg(long, env = "CSI_ENDPOINT", default_value = "unix:///var/lib/kubelet/plugins/csi.blockvol.dev/csi.sock")]
  pub endpoint: Endpoint,

  /// Identifier of this node as known to the storage backend.
  #[arg(long, env = "CSI_NODE_ID")]
  pub node_id: String,

  /// Region the node runs in, reported as its topology.
  #[arg(long, env = "CSI_REGION")]
  pub region: String,

  #[arg(long, default_value = DRIVER_NAME)]
  pub driver_name: String,

  #[arg(long, default_value = DISK_BY_ID_PATH)]
  pub disk_by_id_path: PathBuf,

  /// Path or name of the `cryptsetup` binary.
  #[arg(long, default_value = "cryptsetup")]
  pub cryptsetup: PathBuf,

  /// Path or name of the `blkid` binary.
  #[arg(long, default_value = "blkid")]
  pub blkid: PathBuf,

  /// Seconds to wait for a forced unmount before retrying with `umount -f`.
  #[arg(long, default_value_t = 30)]
  pub force_unmount_after: u64,

  #[arg(long, value_enum, default_value_t = LogFormat::Text)]
  pub log_format: LogFormat,
}

impl Config {
  pub fn identity(&self) -> NodeIdentity {
    NodeIdentity::new(self.node_id.clone(), self.region.clone())
  }

  pub fn node_options(&self) -> NodeOptions {
    NodeOptions {
      driver_name: self.driver_name.clone(),
      disk_by_id_path: self.disk_by_id_path.clone(),
    }
  }

  pub fn mounter_options(&self) -> MounterOptions {
    MounterOptions {
      cryptsetup_path: self.cryptsetup.clone(),
      blkid_path: self.blkid.clone(),
      force_unmount_after: Duration::from_secs(self.force_unmount_after),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::Path;

  #[test]
  fn parses_defaults() {
    let config = Config::try_parse_from(&[
      "csi-blockvol",
      "--endpoint",
      "unix:///csi/csi.sock",
      "--node-id",
      "node-1",
      "--region",
      "rma",
    ])
    .unwrap();

    assert_eq!(config.endpoint, Endpoint::Unix("/csi/csi.sock".into()));
    assert_eq!(config.identity(), NodeIdentity::new("node-1", "rma"));
    assert_eq!(config.node_options().driver_name, DRIVER_NAME);
    assert_eq!(config.node_options().disk_by_id_path, Path::new(DISK_BY_ID_PATH));
    assert_eq!(config.mounter_options().blkid_path, Path::new("blkid"));
    assert_eq!(config.mounter_options().force_unmount_after, Duration::from_secs(30));
    assert_eq!(config.log_format, LogFormat::Text);
  }

  #[test]
  fn parses_overrides() {
    let config = Config::try_parse_from(&[
      "csi-blockvol",
      "--endpoint",
      "tcp://127.0.0.1:10000",
      "--node-id",
      "node-1",
      "--region",
      "lpg",
      "--cryptsetup",
      "/sbin/cryptsetup",
      "--force-unmount-after",
      "5",
      "--log-format",
      "json",
    ])
    .unwrap();

    assert_eq!(config.mounter_options().cryptsetup_path, Path::new("/sbin/cryptsetup"));
    assert_eq!(config.mounter_options().force_unmount_after, Duration::from_secs(5));
    assert_eq!(config.log_format, LogFormat::Json);
  }

  #[test]
  fn rejects_bad_endpoint() {
    let result = Config::try_parse_from(&[
      "csi-blockvol",
      "--endpoint",
      "unix://relative.sock",
      "--node-id",
      "node-1",
      "--region",
      "rma",
    ]);

    assert!(result.is_err());
  }
}
