use std::net::SocketAddr;
use std::path::PathBuf;

/// Convenient result alias for file server operations.
pub type Result<T> = std::result::Result<T, FileServerError>;

/// Errors raised while starting or running the artifact server.
#[derive(thiserror::Error, Debug)]
pub enum FileServerError {
    /// The listening socket could not be bound (usually the port is taken).
    #[error("failed to bind file server to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// No usable directory was configured and the policy forbids a fallback.
    #[error("file server directory is not set or does not exist: {0:?}")]
    MissingDirectory(Option<PathBuf>),
    /// Failed to perform an I/O operation.
    #[error("file server I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The background server task panicked or was cancelled.
    #[error("file server task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
