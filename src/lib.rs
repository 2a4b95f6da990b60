//! Startup update check for the demo application.
//!
//! On launch the demo serves its release directory from an ephemeral
//! loopback file server, verifies the signed manifest published there and
//! decides whether a newer release exists. Packaged builds download, verify
//! and hand the archive to an [`updater::UpdateApplier`]; development builds
//! only report that an update is available.

pub mod config;
pub mod orchestrator;

pub use config::{ConfigError, DemoConfig, DeploymentMode};
pub use orchestrator::{OrchestratorState, UpdateOrchestrator};
pub use updater::UpdateDecision;
