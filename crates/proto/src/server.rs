use crate::{
  controller::{Controller, ControllerService},
  node::{Node, NodeService},
  proto::{
    controller_server::ControllerServer, identity_server::IdentityServer, node_server::NodeServer,
  },
};
use futures::stream;
use std::{
  fmt, fs, io,
  net::SocketAddr,
  path::{Path, PathBuf},
  pin::Pin,
  str::FromStr,
  sync::Arc,
  task::{Context, Poll},
};
use thiserror::Error;
use tokio::{
  io::{AsyncRead, AsyncWrite, ReadBuf},
  net::UnixListener,
};
use tonic::transport::{server::Connected, Server};
use tracing::{debug, info, warn};

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ServeError {
  #[error("Invalid endpoint {0:?}, expected unix:///path/to/socket or tcp://host:port")]
  InvalidEndpoint(String),

  #[error("Failed to bind {0}: {1}")]
  Bind(Endpoint, #[source] io::Error),

  #[error(transparent)]
  Transport(#[from] tonic::transport::Error),
}

/// Where the plugin listens for the CO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
  Unix(PathBuf),
  Tcp(SocketAddr),
}

impl FromStr for Endpoint {
  type Err = ServeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if let Some(path) = s.strip_prefix("unix://") {
      let path = Path::new(path);
      if path.is_absolute() {
        return Ok(Endpoint::Unix(path.to_owned()));
      }
    } else if let Some(addr) = s.strip_prefix("tcp://") {
      if let Ok(addr) = addr.parse() {
        return Ok(Endpoint::Tcp(addr));
      }
    }

    Err(ServeError::InvalidEndpoint(s.to_owned()))
  }
}

impl fmt::Display for Endpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
      Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
    }
  }
}

#[derive(Debug)]
struct UnixStream(tokio::net::UnixStream);

impl Connected for UnixStream {
  fn remote_addr(&self) -> Option<SocketAddr> {
    None
  }
}

impl AsyncRead for UnixStream {
  fn poll_read(
    mut self: Pin<&mut Self>,
    cx: &mut Context<'_>,
    buf: &mut ReadBuf<'_>,
  ) -> Poll<io::Result<()>> {
    Pin::new(&mut self.0).poll_read(cx, buf)
  }
}

impl AsyncWrite for UnixStream {
  fn poll_write(
    mut self: Pin<&mut Self>,
    cx: &mut Context<'_>,
    buf: &[u8],
  ) -> Poll<io::Result<usize>> {
    Pin::new(&mut self.0).poll_write(cx, buf)
  }

  fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Pin::new(&mut self.0).poll_flush(cx)
  }

  fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
    Pin::new(&mut self.0).poll_shutdown(cx)
  }
}

// A socket left behind by a previous run would make bind fail.
fn bind_unix(path: &Path) -> io::Result<UnixListener> {
  match fs::remove_file(path) {
    Ok(()) => debug!("Removed stale socket {}", path.display()),
    Err(e) if e.kind() == io::ErrorKind::NotFound => (),
    Err(e) => return Err(e),
  }

  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)?;
  }

  UnixListener::bind(path)
}

macro_rules! serve_router {
  ($router:expr, $endpoint:expr, $shutdown:expr) => {{
    match $endpoint {
      Endpoint::Tcp(addr) => {
        info!("Listening on {}", $endpoint);
        $router.serve_with_shutdown(*addr, $shutdown).await?;
      }
      Endpoint::Unix(path) => {
        let listener =
          bind_unix(path).map_err(|e| ServeError::Bind($endpoint.clone(), e))?;
        let incoming = Box::pin(stream::unfold(listener, |listener| async move {
          let conn = listener.accept().await.map(|(s, _)| UnixStream(s));
          Some((conn, listener))
        }));

        info!("Listening on {}", $endpoint);
        let served = $router
          .serve_with_incoming_shutdown(incoming, $shutdown)
          .await;
        if let Err(e) = fs::remove_file(path) {
          warn!("Failed to remove socket {}: {}", path.display(), e);
        }

        served?;
      }
    }

    info!("Server on {} stopped", $endpoint);
    Ok(())
  }};
}

/// Serves the identity and node services until `shutdown` resolves.
pub async fn serve_node<T, F>(service: Arc<T>, endpoint: &Endpoint, shutdown: F) -> Result<(), ServeError>
where
  T: NodeService,
  F: std::future::Future<Output = ()>,
{
  let node = Node::new(service);
  let router = Server::builder()
    .add_service(IdentityServer::new(node.clone()))
    .add_service(NodeServer::new(node));

  serve_router!(router, endpoint, shutdown)
}

/// Serves the identity and controller services until `shutdown` resolves.
pub async fn serve_controller<T, F>(
  service: Arc<T>,
  endpoint: &Endpoint,
  shutdown: F,
) -> Result<(), ServeError>
where
  T: ControllerService,
  F: std::future::Future<Output = ()>,
{
  let controller = Controller::new(service);
  let router = Server::builder()
    .add_service(IdentityServer::new(controller.clone()))
    .add_service(ControllerServer::new(controller));

  serve_router!(router, endpoint, shutdown)
}

#[cfg(test)]
mod tests {
  use super::*;
  use test_case::test_case;

  #[test_case("unix:///csi/csi.sock", Some(Endpoint::Unix("/csi/csi.sock".into())) ; "unix")]
  #[test_case("tcp://127.0.0.1:10000", Some(Endpoint::Tcp(([127, 0, 0, 1], 10000).into())) ; "tcp")]
  #[test_case("unix://relative.sock", None ; "relative unix")]
  #[test_case("tcp://localhost", None ; "tcp without port")]
  #[test_case("/csi/csi.sock", None ; "no scheme")]
  fn parse_endpoint(value: &str, expected: Option<Endpoint>) {
    assert_eq!(value.parse::<Endpoint>().ok(), expected);
  }

  #[test]
  fn endpoint_display_round_trips() {
    let endpoint = Endpoint::Unix("/csi/csi.sock".into());
    assert_eq!(endpoint.to_string(), "unix:///csi/csi.sock");
  }

  #[tokio::test]
  async fn stale_socket_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("csi.sock");
    fs::write(&path, b"stale").unwrap();

    let listener = bind_unix(&path).unwrap();
    drop(listener);
    assert!(fs::symlink_metadata(&path).is_ok());
  }
}
