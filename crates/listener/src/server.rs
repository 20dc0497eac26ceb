//! Socket binding and HTTP serving.
//!
//! The listener is either a TCP address or a Unix socket. A Unix socket file
//! left behind by an earlier process is removed before binding, gets the
//! configured permission bits once bound, and is removed again after the
//! server stops.

use std::future::Future;
use std::path::{Path, PathBuf};

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Where the server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A TCP address such as `"localhost:8081"`.
    Tcp(String),
    /// A Unix socket path and the permission bits applied to it.
    Unix {
        /// Socket file path.
        path: PathBuf,
        /// Mode bits, e.g. `0o777`.
        mode: u32,
    },
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp {addr}"),
            Endpoint::Unix { path, .. } => write!(f, "unix {}", path.display()),
        }
    }
}

/// Failures that stop the listener. All of them are fatal at start-up.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The address or socket path could not be bound.
    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        /// Endpoint that was being bound.
        endpoint: Endpoint,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The socket's permission bits could not be applied.
    #[error("failed to set permissions {mode:o} on {}: {source}", path.display())]
    Permissions {
        /// Socket file path.
        path: PathBuf,
        /// Mode that was being applied.
        mode: u32,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The accept loop failed.
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    /// Unix sockets were requested on a platform without them.
    #[error("unix sockets are not supported on this platform")]
    UnsupportedEndpoint,
}

/// Binds `endpoint` and serves `router` until `shutdown` resolves.
///
/// Shutdown stops accepting and lets in-flight requests finish. Update runs
/// already fired are not awaited.
pub async fn serve<F>(endpoint: &Endpoint, router: Router, shutdown: F) -> Result<(), ListenerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    match endpoint {
        Endpoint::Tcp(addr) => serve_tcp(endpoint, addr, router, shutdown).await,
        Endpoint::Unix { path, mode } => serve_unix(endpoint, path, *mode, router, shutdown).await,
    }
}

async fn serve_tcp<F>(
    endpoint: &Endpoint,
    addr: &str,
    router: Router,
    shutdown: F,
) -> Result<(), ListenerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind {
            endpoint: endpoint.clone(),
            source,
        })?;
    let local = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| addr.to_string());
    info!(addr = %local, "Listen tcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ListenerError::Serve)
}

#[cfg(unix)]
async fn serve_unix<F>(
    endpoint: &Endpoint,
    path: &Path,
    mode: u32,
    router: Router,
    shutdown: F,
) -> Result<(), ListenerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    use std::os::unix::fs::PermissionsExt;

    remove_socket_file(path);
    let listener = tokio::net::UnixListener::bind(path).map_err(|source| ListenerError::Bind {
        endpoint: endpoint.clone(),
        source,
    })?;
    info!(path = %path.display(), "Listen unix");

    if let Err(source) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)) {
        remove_socket_file(path);
        return Err(ListenerError::Permissions {
            path: path.to_path_buf(),
            mode,
            source,
        });
    }

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ListenerError::Serve);
    remove_socket_file(path);
    served
}

#[cfg(not(unix))]
async fn serve_unix<F>(
    _endpoint: &Endpoint,
    _path: &Path,
    _mode: u32,
    _router: Router,
    _shutdown: F,
) -> Result<(), ListenerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    Err(ListenerError::UnsupportedEndpoint)
}

#[cfg(unix)]
fn remove_socket_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove socket file"),
    }
}
