use crate::error::{FileServerError, Result};
use axum::{
    body::Body,
    extract::{rejection::PathRejection as UrlPathRejection, Path as UrlPath, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::net::{IpAddr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

/// Liveness probe route.
pub const READY_PATH: &str = "/fileserver-is-ready";
/// Remote shutdown route.
pub const SHUTDOWN_PATH: &str = "/shutdown";
/// Body returned by the liveness probe.
pub const READY_BODY: &str = "Fileserver is ready!";
/// Body returned when a shutdown has been requested.
pub const SHUTDOWN_BODY: &str = "Server shutting down...";

/// Per-server state handed to every request handler.
struct FileServerState {
    root: PathBuf,
    shutdown_tx: watch::Sender<bool>,
}

/// Read-only static file server with a readiness probe and a remote
/// shutdown endpoint.
pub struct ArtifactServer {
    state: Arc<FileServerState>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ArtifactServer {
    /// Create a server rooted at `root`. The root is canonicalized once so
    /// that every served path can be checked against it.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let requested = root.as_ref();
        let root = match std::fs::canonicalize(requested) {
            Ok(root) if root.is_dir() => root,
            Ok(_) => {
                return Err(FileServerError::MissingDirectory(Some(
                    requested.to_path_buf(),
                )))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(FileServerError::MissingDirectory(Some(
                    requested.to_path_buf(),
                )))
            }
            Err(err) => return Err(err.into()),
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            state: Arc::new(FileServerState { root, shutdown_tx }),
            shutdown_rx,
        })
    }

    /// Canonical directory served by this instance.
    pub fn root(&self) -> &Path {
        &self.state.root
    }

    /// Build the axum router for this server.
    pub fn router(&self) -> Router {
        Router::new()
            .route(READY_PATH, get(file_server_is_ready))
            .route(SHUTDOWN_PATH, post(shut_down))
            .route("/{*path}", get(serve_file))
            .with_state(self.state.clone())
    }

    /// Serve on an already bound listener until `/shutdown` is requested.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        info!(
            target: "fileserver",
            %addr,
            root = %self.state.root.display(),
            "serving artifacts"
        );

        let app = self.router();
        let mut shutdown_rx = self.shutdown_rx.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.wait_for(|requested| *requested).await;
                debug!(target: "fileserver", "graceful shutdown started");
            })
            .await?;

        info!(target: "fileserver", %addr, "file server stopped");
        Ok(())
    }

    /// Bind `host:port` and serve until shutdown.
    pub async fn run(self, host: IpAddr, port: u16) -> Result<()> {
        let listener = bind_listener(SocketAddr::new(host, port)).await?;
        self.serve(listener).await
    }
}

/// Bind a listener, reporting failures as [`FileServerError::Bind`].
pub async fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| FileServerError::Bind { addr, source })
}

async fn file_server_is_ready() -> &'static str {
    READY_BODY
}

async fn shut_down(State(state): State<Arc<FileServerState>>) -> &'static str {
    info!(target: "fileserver", "shutdown requested");
    state.shutdown_tx.send_replace(true);
    SHUTDOWN_BODY
}

async fn serve_file(
    State(state): State<Arc<FileServerState>>,
    requested: std::result::Result<UrlPath<String>, UrlPathRejection>,
) -> Response {
    // Paths that do not decode to UTF-8 cannot name a served file.
    let requested = match requested {
        Ok(UrlPath(requested)) => requested,
        Err(rejection) => {
            debug!(target: "fileserver", error = %rejection, "undecodable request path");
            return StatusCode::NOT_FOUND.into_response();
        }
    };
    let path = match resolve_request_path(&state.root, &requested) {
        Ok(path) => path,
        Err(PathRejection::Traversal) => {
            warn!(target: "fileserver", path = %requested, "rejected path outside the served directory");
            return StatusCode::NOT_FOUND.into_response();
        }
        Err(PathRejection::NotFound) => {
            debug!(target: "fileserver", path = %requested, "requested file not found");
            return StatusCode::NOT_FOUND.into_response();
        }
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(err) => {
            debug!(target: "fileserver", path = %path.display(), error = %err, "failed to open file");
            return StatusCode::NOT_FOUND.into_response();
        }
    };
    let len = match file.metadata().await {
        Ok(metadata) if metadata.is_file() => metadata.len(),
        _ => return StatusCode::NOT_FOUND.into_response(),
    };

    debug!(target: "fileserver", path = %path.display(), bytes = len, "serving file");
    (
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_LENGTH, HeaderValue::from(len)),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response()
}

#[derive(Debug, PartialEq, Eq)]
enum PathRejection {
    Traversal,
    NotFound,
}

/// Map a request path onto the served directory.
///
/// Only plain relative components are accepted, and the canonical result must
/// stay under `root` so symlinks cannot escape either.
fn resolve_request_path(root: &Path, requested: &str) -> std::result::Result<PathBuf, PathRejection> {
    let relative = Path::new(requested.trim_matches('/'));
    if relative.as_os_str().is_empty() {
        return Err(PathRejection::NotFound);
    }
    if relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
    {
        return Err(PathRejection::Traversal);
    }

    let candidate = root
        .join(relative)
        .canonicalize()
        .map_err(|_| PathRejection::NotFound)?;
    if candidate.starts_with(root) {
        Ok(candidate)
    } else {
        Err(PathRejection::Traversal)
    }
}
