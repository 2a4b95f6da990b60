use std::path::PathBuf;

/// Convenient result alias for updater operations.
pub type Result<T> = std::result::Result<T, UpdaterError>;

/// Errors that can occur while checking for or applying an update.
#[derive(thiserror::Error, Debug)]
pub enum UpdaterError {
    /// Network request to the manifest source failed.
    #[error("update fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    /// The requested file does not exist on the manifest source.
    #[error("{0} not found on update server")]
    NotFound(String),
    /// The manifest source answered with an unexpected status.
    #[error("update server returned {status} for {name}")]
    HttpStatus { name: String, status: u16 },
    /// A JSON document could not be encoded or decoded.
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    /// The manifest or key document failed verification.
    #[error("manifest verification failed: {0}")]
    Verification(#[from] VerificationError),
    /// The downloaded artefact does not match the manifest.
    #[error("artifact integrity check failed (expected {expected}, got {actual})")]
    IntegrityMismatch {
        /// Expected digest or size.
        expected: String,
        /// Actual digest or size.
        actual: String,
    },
    /// A gzip blob could not be decompressed.
    #[error("failed to decompress {name}: {source}")]
    Decompress {
        name: String,
        #[source]
        source: std::io::Error,
    },
    /// Failed to perform an I/O operation.
    #[error("filesystem operation failed: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse a version string.
    #[error("invalid version {0:?}")]
    Version(String),
    /// The artefact could not be unpacked.
    #[error("failed to extract {path:?}: {reason}")]
    Extract { path: PathBuf, reason: String },
    /// Attempts to perform an operation on an unsupported platform or format.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl UpdaterError {
    /// Helper for wrapping validation failures.
    pub fn validation(msg: impl Into<String>) -> Self {
        UpdaterError::Other(msg.into())
    }
}

/// Reasons a manifest or key document is rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("signature does not match the manifest contents")]
    SignatureMismatch,
    #[error("manifest is not valid JSON: {0}")]
    MalformedJson(String),
    #[error("manifest is missing the {0:?} field")]
    MissingField(&'static str),
    #[error("manifest carries no signature")]
    MissingSignature,
    #[error("invalid public key: {0}")]
    InvalidKey(String),
    #[error("invalid signature encoding: {0}")]
    InvalidSignatureEncoding(String),
    #[error("manifest is inconsistent: {0}")]
    Inconsistent(String),
}
