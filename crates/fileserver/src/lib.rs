//! Loopback HTTP file server used to publish update manifests and artefacts.
//!
//! The server exposes three routes: a readiness probe
//! (`GET /fileserver-is-ready`), a remote shutdown (`POST /shutdown`) and
//! static file downloads (`GET /<path>`) confined to a single directory.
//! [`ServerLifecycleController`] runs it on a background task and drives the
//! start / probe / shutdown sequence.
//!
//! ```ignore
//! use fileserver::{allocate_ephemeral_port, ServerLifecycleController};
//!
//! # async fn demo() -> fileserver::Result<()> {
//! let controller = ServerLifecycleController::new();
//! let port = allocate_ephemeral_port()?;
//! let mut handle = controller.start(Some("pyu-data/deploy".as_ref()), port).await?;
//! if controller.await_ready(&mut handle).await {
//!     println!("serving on {}", handle.base_url());
//! }
//! controller.shutdown(&mut handle).await;
//! # Ok(())
//! # }
//! ```

mod error;
mod lifecycle;
mod port;
mod server;

pub use error::{FileServerError, Result};
pub use lifecycle::{
    request_shutdown, DirectoryPolicy, ReadinessPolicy, ServerHandle, ServerLifecycleController,
    ServerPhase, DEFAULT_FALLBACK_DIR,
};
pub use port::allocate_ephemeral_port;
pub use server::{
    bind_listener, ArtifactServer, READY_BODY, READY_PATH, SHUTDOWN_BODY, SHUTDOWN_PATH,
};
