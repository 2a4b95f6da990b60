//! Signed update manifests, update checks and verified artefact downloads.
//!
//! Releases are described by a [`VersionManifest`] published as `versions.gz`
//! next to a [`KeyDocument`] (`keys.gz`). A client holding the trusted root
//! key verifies the key document, uses the app key it vouches for to verify
//! the manifest signature, and only then compares versions. Artefacts are
//! checked against the size and SHA-256 recorded in the manifest before they
//! are handed to an [`UpdateApplier`].
//!
//! ```ignore
//! use updater::{
//!     Channel, HttpManifestSource, ManifestVerifier, Platform, UpdateChecker, UpdateStatus,
//! };
//!
//! # async fn demo() -> updater::Result<()> {
//! let source = HttpManifestSource::from_base("http://127.0.0.1:8080/")?;
//! let verifier = ManifestVerifier::from_base64("12y2oHGB2oroRQJkR73CJNaFeQy776oXsUrqWaAEiZU")?;
//! let checker = UpdateChecker::new(source, verifier);
//!
//! match checker
//!     .check("Demo", &"0.0.1".parse()?, Channel::Stable, Platform::current())
//!     .await?
//! {
//!     UpdateStatus::Available(update) => {
//!         let archive = checker.download(&update, std::path::Path::new("downloads")).await?;
//!         println!("downloaded {}", archive.display());
//!     }
//!     UpdateStatus::UpToDate => {
//!         println!("already at latest version");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod canonical;
mod decision;
mod error;
mod fetcher;
mod install;
mod manifest;
mod publisher;
mod updater;
mod verifier;
mod version;

pub use decision::UpdateDecision;
pub use error::{Result, UpdaterError, VerificationError};
pub use fetcher::{HttpManifestSource, HttpManifestSourceBuilder, ManifestSource};
pub use install::{ArchiveInstaller, UpdateApplier};
pub use manifest::{
    ArtifactInfo, ChannelIndex, KeyDocument, ReleaseIndex, VersionManifest, KEYS_FILE,
    VERSIONS_FILE,
};
pub use publisher::ManifestPublisher;
pub use updater::{
    evaluate, save_artifact, verify_artifact, AvailableUpdate, UpdateChecker, UpdateStatus,
};
pub use verifier::{
    decode_verifying_key, encode_verifying_key, verify_detached, verify_key_document,
    verify_manifest, ManifestVerifier,
};
pub use version::{AppVersion, Channel, Platform, ReleaseType};
