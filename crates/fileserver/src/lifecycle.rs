use crate::error::{FileServerError, Result};
use crate::server::{bind_listener, ArtifactServer, READY_PATH, SHUTDOWN_PATH};
use reqwest::Client;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Directory served when none is configured and the policy allows a fallback.
pub const DEFAULT_FALLBACK_DIR: &str = "pyu-data/deploy";

const DEFAULT_PROBE_ATTEMPTS: u32 = 11;
const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(250);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// What to do when the configured directory is unset or missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryPolicy {
    /// Warn and serve the given directory instead. Relative paths are
    /// resolved against the current working directory.
    FallbackTo(PathBuf),
    /// Refuse to start.
    Reject,
}

impl Default for DirectoryPolicy {
    fn default() -> Self {
        DirectoryPolicy::FallbackTo(PathBuf::from(DEFAULT_FALLBACK_DIR))
    }
}

impl DirectoryPolicy {
    /// Pick the directory to serve for the requested one.
    pub fn resolve(&self, requested: Option<&Path>) -> Result<PathBuf> {
        if let Some(dir) = requested.filter(|dir| dir.is_dir()) {
            return Ok(dir.to_path_buf());
        }

        match self {
            DirectoryPolicy::Reject => Err(FileServerError::MissingDirectory(
                requested.map(Path::to_path_buf),
            )),
            DirectoryPolicy::FallbackTo(fallback) => {
                let fallback = if fallback.is_absolute() {
                    fallback.clone()
                } else {
                    std::env::current_dir()?.join(fallback)
                };
                warn!(
                    target: "fileserver",
                    requested = ?requested,
                    fallback = %fallback.display(),
                    "file server directory is not set or missing; using fallback"
                );
                Ok(fallback)
            }
        }
    }
}

/// Bounded retry settings for the readiness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub attempts: u32,
    pub interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_PROBE_ATTEMPTS,
            interval: DEFAULT_PROBE_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPhase {
    Starting,
    Ready,
    Stopped,
}

/// A running [`ArtifactServer`] started by [`ServerLifecycleController::start`].
#[derive(Debug)]
pub struct ServerHandle {
    directory: PathBuf,
    addr: SocketAddr,
    phase: ServerPhase,
    task: JoinHandle<Result<()>>,
}

impl ServerHandle {
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn phase(&self) -> ServerPhase {
        self.phase
    }

    /// Base URL of the server, always ending in `/`.
    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// HTTP client for talking to our own server; proxy variables must not
/// reroute loopback traffic.
fn loopback_client() -> Client {
    Client::builder().no_proxy().build().unwrap_or_default()
}

/// Starts, probes and stops artifact servers on background tasks.
#[derive(Debug, Clone)]
pub struct ServerLifecycleController {
    host: IpAddr,
    client: Client,
    readiness: ReadinessPolicy,
    directory_policy: DirectoryPolicy,
}

impl Default for ServerLifecycleController {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerLifecycleController {
    pub fn new() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            client: loopback_client(),
            readiness: ReadinessPolicy::default(),
            directory_policy: DirectoryPolicy::default(),
        }
    }

    /// Replace the HTTP client used for readiness probes and shutdown requests.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_directory_policy(mut self, policy: DirectoryPolicy) -> Self {
        self.directory_policy = policy;
        self
    }

    pub fn readiness(&self) -> &ReadinessPolicy {
        &self.readiness
    }

    /// Bind `127.0.0.1:port` and serve `directory` on a background task.
    ///
    /// Returns as soon as the socket is bound; use [`Self::await_ready`]
    /// before relying on the server.
    pub async fn start(&self, directory: Option<&Path>, port: u16) -> Result<ServerHandle> {
        let directory = self.directory_policy.resolve(directory)?;
        let server = ArtifactServer::new(&directory)?;
        let listener = bind_listener(SocketAddr::new(self.host, port)).await?;
        let addr = listener.local_addr()?;

        let task = tokio::spawn(async move {
            let result = server.serve(listener).await;
            if let Err(err) = &result {
                warn!(target: "fileserver", error = %err, "file server exited with an error");
            }
            result
        });

        info!(target: "fileserver", %addr, directory = %directory.display(), "file server starting");
        Ok(ServerHandle {
            directory,
            addr,
            phase: ServerPhase::Starting,
            task,
        })
    }

    /// Poll the readiness endpoint until the server answers.
    ///
    /// Any HTTP response counts as ready; transport errors mean the server is
    /// not accepting connections yet. Returns `false` once the attempts are
    /// exhausted.
    pub async fn await_ready(&self, handle: &mut ServerHandle) -> bool {
        let url = handle.url(READY_PATH);
        let attempts = self.readiness.attempts.max(1);

        for attempt in 1..=attempts {
            match self
                .client
                .get(&url)
                .timeout(self.readiness.request_timeout)
                .send()
                .await
            {
                Ok(response) => {
                    debug!(
                        target: "fileserver",
                        attempt,
                        status = %response.status(),
                        "file server is ready"
                    );
                    handle.phase = ServerPhase::Ready;
                    return true;
                }
                Err(err) => {
                    debug!(target: "fileserver", attempt, error = %err, "file server not reachable yet");
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.readiness.interval).await;
            }
        }

        warn!(
            target: "fileserver",
            addr = %handle.addr,
            attempts,
            "timed out waiting for file server to start"
        );
        false
    }

    /// Ask the server to shut down. Errors are logged and swallowed since the
    /// server may already be gone; the task is not awaited.
    pub async fn shutdown(&self, handle: &mut ServerHandle) {
        if let Err(err) =
            request_shutdown(&self.client, handle.addr, self.readiness.request_timeout).await
        {
            debug!(target: "fileserver", addr = %handle.addr, error = %err, "shutdown request failed");
        }
        handle.phase = ServerPhase::Stopped;
    }

    /// Wait at most `timeout` for the server task to finish.
    pub async fn join(&self, handle: ServerHandle, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, handle.task).await {
            Ok(joined) => joined?,
            Err(_) => {
                warn!(
                    target: "fileserver",
                    addr = %handle.addr,
                    ?timeout,
                    "file server did not stop in time; detaching"
                );
                Ok(())
            }
        }
    }
}

/// POST to the server's shutdown endpoint.
pub async fn request_shutdown(
    client: &Client,
    addr: SocketAddr,
    timeout: Duration,
) -> std::result::Result<(), reqwest::Error> {
    client
        .post(format!("http://{addr}{SHUTDOWN_PATH}"))
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}
