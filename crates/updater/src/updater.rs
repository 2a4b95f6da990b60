use crate::{
    decision::UpdateDecision,
    error::{Result, UpdaterError, VerificationError},
    fetcher::{gunzip, ManifestSource},
    manifest::{ArtifactInfo, KeyDocument, VersionManifest, KEYS_FILE, VERSIONS_FILE},
    verifier::ManifestVerifier,
    version::{AppVersion, Channel, Platform},
};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, PathPersistError};
use tokio::task;
use tracing::{debug, info, warn};

/// Checks a manifest source for newer releases and downloads them.
pub struct UpdateChecker<S> {
    source: S,
    verifier: ManifestVerifier,
}

impl<S> UpdateChecker<S>
where
    S: ManifestSource,
{
    /// Create a new checker with the given source and trusted root key.
    pub fn new(source: S, verifier: ManifestVerifier) -> Self {
        Self { source, verifier }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Retrieve `keys.gz` and `versions.gz` and verify the manifest.
    pub async fn fetch_manifest(&self) -> Result<VersionManifest> {
        let document = match self.source.fetch(KEYS_FILE).await {
            Ok(bytes) => Some(KeyDocument::from_json(&gunzip(KEYS_FILE, &bytes)?)?),
            Err(UpdaterError::NotFound(_)) => {
                debug!(target: "updater", "no key document published; using root key");
                None
            }
            Err(err) => return Err(err),
        };

        let bytes = self.source.fetch(VERSIONS_FILE).await?;
        let manifest = self
            .verifier
            .verify(document.as_ref(), &gunzip(VERSIONS_FILE, &bytes)?)?;
        Ok(manifest)
    }

    /// Determine whether a release newer than `current_version` exists.
    pub async fn check(
        &self,
        app_name: &str,
        current_version: &AppVersion,
        channel: Channel,
        platform: Platform,
    ) -> Result<UpdateStatus> {
        let manifest = self.fetch_manifest().await?;
        evaluate(&manifest, app_name, current_version, channel, platform)
    }

    /// [`Self::check`] folded into a decision; any failure becomes
    /// [`UpdateDecision::CouldNotCheck`].
    pub async fn check_decision(
        &self,
        app_name: &str,
        current_version: &AppVersion,
        channel: Channel,
        platform: Platform,
    ) -> (UpdateDecision, Option<ArtifactInfo>) {
        match self.check(app_name, current_version, channel, platform).await {
            Ok(UpdateStatus::UpToDate) => (UpdateDecision::NoUpdateAvailable, None),
            Ok(UpdateStatus::Available(update)) => (
                UpdateDecision::UpdateAvailableNotApplied,
                Some(update.artifact),
            ),
            Err(err) => {
                warn!(target: "updater", error = %err, "could not check for updates");
                (UpdateDecision::CouldNotCheck, None)
            }
        }
    }

    /// Fetch the artefact bytes for `update` without verifying them.
    pub async fn fetch_artifact(&self, update: &AvailableUpdate) -> Result<Bytes> {
        self.source.fetch(&update.artifact.filename).await
    }

    /// Download, verify and store the artefact for `update` in `dest_dir`.
    pub async fn download(&self, update: &AvailableUpdate, dest_dir: &Path) -> Result<PathBuf> {
        let bytes = self.fetch_artifact(update).await?;
        verify_artifact(&update.artifact, &bytes)?;
        save_artifact(bytes, dest_dir, &update.artifact.filename).await
    }
}

/// Decide availability from an already verified manifest.
pub fn evaluate(
    manifest: &VersionManifest,
    app_name: &str,
    current_version: &AppVersion,
    channel: Channel,
    platform: Platform,
) -> Result<UpdateStatus> {
    let Some((latest, version_key)) = manifest.latest_release(app_name, channel, platform)? else {
        debug!(target: "updater", app_name, %channel, %platform, "no release listed");
        return Ok(UpdateStatus::UpToDate);
    };

    if latest <= *current_version {
        debug!(target: "updater", %latest, current = %current_version, "already up to date");
        return Ok(UpdateStatus::UpToDate);
    }

    let artifact = manifest
        .artifact(app_name, version_key, platform)
        .cloned()
        .ok_or_else(|| {
            VerificationError::Inconsistent(format!(
                "no {platform} artifact for {app_name} {version_key}"
            ))
        })?;
    info!(
        target: "updater",
        %latest,
        current = %current_version,
        filename = %artifact.filename,
        "update available"
    );
    Ok(UpdateStatus::Available(AvailableUpdate {
        app_name: app_name.to_string(),
        version: latest,
        channel,
        platform,
        artifact,
    }))
}

/// Check size and SHA-256 of downloaded bytes against the manifest entry.
pub fn verify_artifact(artifact: &ArtifactInfo, bytes: &[u8]) -> Result<()> {
    if bytes.len() as u64 != artifact.file_size {
        return Err(UpdaterError::IntegrityMismatch {
            expected: format!("{} bytes", artifact.file_size),
            actual: format!("{} bytes", bytes.len()),
        });
    }

    let actual = hex::encode(Sha256::digest(bytes));
    let expected = artifact.file_hash.to_ascii_lowercase();
    if actual != expected {
        return Err(UpdaterError::IntegrityMismatch { expected, actual });
    }
    Ok(())
}

/// Atomically write verified artefact bytes to `dest_dir/<filename>`.
pub async fn save_artifact(bytes: Bytes, dest_dir: &Path, filename: &str) -> Result<PathBuf> {
    let name = Path::new(filename)
        .file_name()
        .ok_or_else(|| UpdaterError::validation(format!("invalid artifact filename {filename:?}")))?;
    let target = dest_dir.join(name);
    let dest_dir = dest_dir.to_path_buf();

    // Perform blocking filesystem work in a dedicated thread.
    task::spawn_blocking(move || -> Result<PathBuf> {
        persist_payload(&bytes, &dest_dir, &target)?;
        Ok(target)
    })
    .await
    .map_err(|err| UpdaterError::Other(format!("task join error: {err}")))?
}

fn persist_payload(bytes: &[u8], dir: &Path, target: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.into_temp_path()
        .persist(target)
        .map_err(map_persist_error)?;
    Ok(())
}

fn map_persist_error(err: PathPersistError) -> UpdaterError {
    UpdaterError::Io(err.error)
}

/// Result of checking for updates.
#[derive(Debug, Clone)]
pub enum UpdateStatus {
    /// There is no newer version available.
    UpToDate,
    /// A newer version is available.
    Available(AvailableUpdate),
}

/// Details about an available update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableUpdate {
    app_name: String,
    version: AppVersion,
    channel: Channel,
    platform: Platform,
    artifact: ArtifactInfo,
}

impl AvailableUpdate {
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn version(&self) -> &AppVersion {
        &self.version
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Manifest entry for the full artefact.
    pub fn artifact(&self) -> &ArtifactInfo {
        &self.artifact
    }

    pub fn into_artifact(self) -> ArtifactInfo {
        self.artifact
    }
}
