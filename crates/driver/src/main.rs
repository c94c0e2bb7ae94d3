use anyhow::Context;
use clap::Parser;
use csi_blockvol::{
  config::{Config, LogFormat},
  NodeDriver,
};
use csi_mount_utils::{EncryptingMounter, Mounter};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_logging(format: LogFormat) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let builder = tracing_subscriber::fmt().with_env_filter(filter);

  match format {
    LogFormat::Text => builder.init(),
    LogFormat::Json => builder.json().init(),
  }
}

async fn shutdown_signal() {
  #[cfg(unix)]
  {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
      Ok(mut term) => {
        tokio::select! {
          _ = tokio::signal::ctrl_c() => info!("SIGINT received, shutting down"),
          _ = term.recv() => info!("SIGTERM received, shutting down"),
        }
        return;
      }
      Err(e) => tracing::warn!("Unable to listen for SIGTERM: {}", e),
    }
  }

  if tokio::signal::ctrl_c().await.is_ok() {
    info!("SIGINT received, shutting down");
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let config = Config::parse();
  init_logging(config.log_format);

  info!(
    driver = %config.driver_name,
    version = csi_blockvol::DRIVER_VERSION,
    node_id = %config.node_id,
    region = %config.region,
    endpoint = %config.endpoint,
    "starting node plugin"
  );

  let mounter = <EncryptingMounter as Mounter>::new(config.mounter_options())
    .await
    .context("failed to create mounter")?;
  let driver = NodeDriver::new(config.identity(), config.node_options(), mounter);

  csi_proto::serve_node(Arc::new(driver), &config.endpoint, shutdown_signal())
    .await
    .with_context(|| format!("failed to serve on {}", config.endpoint))?;

  info!("node plugin stopped");
  Ok(())
}
