//! Published-manifest fixture shared by the orchestrator test binaries.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use sha2::{Digest, Sha256};
use tempfile::{tempdir, TempDir};
use update_demo::DemoConfig;
use updater::{
    encode_verifying_key, AppVersion, ArtifactInfo, AvailableUpdate, Channel, ManifestPublisher,
    Platform, UpdateApplier, VersionManifest,
};

pub const APP_NAME: &str = "PyUpdaterWxDemo";
pub const CURRENT_VERSION: &str = "0.0.1";
pub const UPDATE_VERSION: &str = "0.0.2.2.0";
pub const PLATFORM: Platform = Platform::Nix64;

/// Records archives instead of extracting them.
#[derive(Clone, Default)]
pub struct RecordingApplier {
    applied: Arc<Mutex<Vec<(PathBuf, String)>>>,
}

impl RecordingApplier {
    pub fn applied(&self) -> Vec<(PathBuf, String)> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpdateApplier for RecordingApplier {
    async fn extract_and_restart(&self, archive: &Path, update: &AvailableUpdate) -> updater::Result<()> {
        self.applied
            .lock()
            .unwrap()
            .push((archive.to_path_buf(), update.version().to_string()));
        Ok(())
    }
}

pub struct Fixture {
    pub deploy: TempDir,
    pub work: TempDir,
    pub root_key: SigningKey,
}

impl Fixture {
    /// Publish a manifest announcing `UPDATE_VERSION` for every platform and
    /// drop `archive` on disk as the nix64 artefact.
    pub fn publish(archive: &[u8], advertised: &[u8]) -> Self {
        let deploy = tempdir().unwrap();
        let work = tempdir().unwrap();
        let root_key = SigningKey::from_bytes(&[11u8; 32]);
        let app_key = SigningKey::from_bytes(&[12u8; 32]);

        let version: AppVersion = UPDATE_VERSION.parse().unwrap();
        let mut manifest = VersionManifest::default();
        for platform in [Platform::Mac, Platform::Win, Platform::Nix32, Platform::Nix64] {
            manifest.insert_release(
                APP_NAME,
                &version,
                Channel::Stable,
                platform,
                ArtifactInfo {
                    file_hash: hex::encode(Sha256::digest(advertised)),
                    filename: format!("{APP_NAME}-{platform}-0.0.2.tar.gz"),
                    file_size: advertised.len() as u64,
                },
            );
        }
        ManifestPublisher::new(root_key.clone(), app_key)
            .publish(deploy.path(), &manifest)
            .unwrap();
        std::fs::write(
            deploy.path().join(format!("{APP_NAME}-nix64-0.0.2.tar.gz")),
            archive,
        )
        .unwrap();

        Self {
            deploy,
            work,
            root_key,
        }
    }

    pub fn config(&self) -> DemoConfig {
        DemoConfig::default()
            .serve_directory(self.deploy.path())
            .app_name(APP_NAME)
            .current_version(CURRENT_VERSION)
            .platform(PLATFORM)
            .root_public_key(encode_verifying_key(&self.root_key.verifying_key()))
            .download_dir(self.work.path().join("downloads"))
            .install_dir(self.work.path().join("install"))
            .reject_missing_directory()
    }
}
