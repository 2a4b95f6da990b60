//! Configuration for the update demo.

use fileserver::{DirectoryPolicy, DEFAULT_FALLBACK_DIR};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use updater::{AppVersion, Channel, ManifestVerifier, Platform, UpdaterError, VerificationError};

const DEFAULT_APP_NAME: &str = "UpdateDemo";

/// How the running application was deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// Running from a bundled executable that can replace itself.
    Packaged,
    /// Running from a development build; updates are only reported.
    #[default]
    Development,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no root public key configured")]
    MissingPublicKey,
    #[error("invalid root public key: {0}")]
    PublicKey(#[from] VerificationError),
    #[error("invalid current version: {0}")]
    Version(#[from] UpdaterError),
}

/// Settings threaded through [`crate::UpdateOrchestrator`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DemoConfig {
    /// Directory with `keys.gz`, `versions.gz` and release archives.
    pub serve_directory: Option<PathBuf>,
    /// Emit debug diagnostics.
    pub verbose: bool,
    pub app_name: String,
    pub current_version: String,
    pub channel: Channel,
    pub platform: Platform,
    /// Base64 Ed25519 key trusted to sign key documents or manifests.
    pub root_public_key: Option<String>,
    pub deployment_mode: DeploymentMode,
    /// Served when `serve_directory` is unset or missing. When unset,
    /// development builds fall back to `pyu-data/deploy` and packaged builds
    /// refuse to start the file server.
    pub fallback_directory: Option<PathBuf>,
    /// Never fall back, whatever the deployment mode.
    pub strict_directory: bool,
    /// Check this server instead of starting the local file server.
    pub update_url: Option<String>,
    pub download_dir: PathBuf,
    pub install_dir: PathBuf,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            serve_directory: None,
            verbose: false,
            app_name: DEFAULT_APP_NAME.to_string(),
            current_version: env!("CARGO_PKG_VERSION").to_string(),
            channel: Channel::Stable,
            platform: Platform::current(),
            root_public_key: None,
            deployment_mode: DeploymentMode::Development,
            fallback_directory: None,
            strict_directory: false,
            update_url: None,
            download_dir: PathBuf::from("pyu-data/downloads"),
            install_dir: PathBuf::from("pyu-data/install"),
        }
    }
}

impl DemoConfig {
    /// Load a JSON config file; absent keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn serve_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.serve_directory = Some(dir.into());
        self
    }

    pub fn verbose(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    pub fn current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = version.into();
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn root_public_key(mut self, key: impl Into<String>) -> Self {
        self.root_public_key = Some(key.into());
        self
    }

    pub fn deployment_mode(mut self, mode: DeploymentMode) -> Self {
        self.deployment_mode = mode;
        self
    }

    /// Refuse to start when the serve directory is missing.
    pub fn reject_missing_directory(mut self) -> Self {
        self.strict_directory = true;
        self
    }

    pub fn fallback_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fallback_directory = Some(dir.into());
        self
    }

    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install_dir = dir.into();
        self
    }

    pub fn directory_policy(&self) -> DirectoryPolicy {
        if self.strict_directory {
            return DirectoryPolicy::Reject;
        }
        match (&self.fallback_directory, self.deployment_mode) {
            (Some(dir), _) => DirectoryPolicy::FallbackTo(dir.clone()),
            (None, DeploymentMode::Development) => {
                DirectoryPolicy::FallbackTo(PathBuf::from(DEFAULT_FALLBACK_DIR))
            }
            (None, DeploymentMode::Packaged) => DirectoryPolicy::Reject,
        }
    }

    pub fn parsed_version(&self) -> Result<AppVersion, ConfigError> {
        Ok(self.current_version.parse()?)
    }

    pub fn verifier(&self) -> Result<ManifestVerifier, ConfigError> {
        let key = self
            .root_public_key
            .as_deref()
            .ok_or(ConfigError::MissingPublicKey)?;
        Ok(ManifestVerifier::from_base64(key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_fall_back_and_stay_in_development() {
        let config = DemoConfig::default();
        assert!(!config.verbose);
        assert_eq!(config.channel, Channel::Stable);
        assert_eq!(config.deployment_mode, DeploymentMode::Development);
        assert_eq!(
            config.directory_policy(),
            DirectoryPolicy::FallbackTo(PathBuf::from(DEFAULT_FALLBACK_DIR))
        );
        assert!(matches!(config.verifier(), Err(ConfigError::MissingPublicKey)));
        assert!(config.parsed_version().is_ok());
    }

    #[test]
    fn json_file_overrides_selected_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("update-demo.json");
        std::fs::write(
            &path,
            r#"{"serve_directory": "/srv/deploy", "verbose": true, "deployment_mode": "packaged", "platform": "win"}"#,
        )
        .unwrap();

        let config = DemoConfig::from_json_file(&path).unwrap();
        assert_eq!(config.serve_directory, Some(PathBuf::from("/srv/deploy")));
        assert!(config.verbose);
        assert_eq!(config.deployment_mode, DeploymentMode::Packaged);
        assert_eq!(config.platform, Platform::Win);
        assert_eq!(config.directory_policy(), DirectoryPolicy::Reject);
        assert_eq!(config.app_name, DEFAULT_APP_NAME);
    }

    #[test]
    fn packaged_builds_only_fall_back_when_configured() {
        let packaged = DemoConfig::default().deployment_mode(DeploymentMode::Packaged);
        assert_eq!(packaged.directory_policy(), DirectoryPolicy::Reject);

        let packaged = packaged.fallback_directory("/srv/mirror");
        assert_eq!(
            packaged.directory_policy(),
            DirectoryPolicy::FallbackTo(PathBuf::from("/srv/mirror"))
        );

        let strict = DemoConfig::default()
            .fallback_directory("/srv/mirror")
            .reject_missing_directory();
        assert_eq!(strict.directory_policy(), DirectoryPolicy::Reject);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            DemoConfig::from_json_file(&path),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            DemoConfig::from_json_file(&dir.path().join("absent.json")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn bad_key_and_version_are_reported() {
        let config = DemoConfig::default()
            .root_public_key("not-base64!")
            .current_version("banana");
        assert!(matches!(config.verifier(), Err(ConfigError::PublicKey(_))));
        assert!(matches!(config.parsed_version(), Err(ConfigError::Version(_))));
    }
}
