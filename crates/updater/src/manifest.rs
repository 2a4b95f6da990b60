use crate::error::{Result, UpdaterError, VerificationError};
use crate::version::{AppVersion, Channel, Platform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Gzip-compressed key document at the server root.
pub const KEYS_FILE: &str = "keys.gz";
/// Gzip-compressed signed version manifest at the server root.
pub const VERSIONS_FILE: &str = "versions.gz";

/// Downloadable release artefact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactInfo {
    /// SHA-256 digest of the artefact, hex encoded.
    pub file_hash: String,
    /// File name relative to the server root.
    pub filename: String,
    /// Expected size in bytes, used to catch truncated downloads.
    pub file_size: u64,
}

/// Version string → platform → artefact.
pub type ReleaseIndex = BTreeMap<String, BTreeMap<String, ArtifactInfo>>;
/// Channel → platform → version string.
pub type ChannelIndex = BTreeMap<String, BTreeMap<String, String>>;

/// All known releases, keyed by application name.
///
/// Only ever produced by the verifier (or built locally for publishing); the
/// signature itself is not part of this type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionManifest {
    pub updates: BTreeMap<String, ReleaseIndex>,
    pub latest: BTreeMap<String, ChannelIndex>,
}

impl VersionManifest {
    /// Record `artifact` as the `platform` build of `version` and make it the
    /// newest release on `channel`.
    pub fn insert_release(
        &mut self,
        app_name: &str,
        version: &AppVersion,
        channel: Channel,
        platform: Platform,
        artifact: ArtifactInfo,
    ) -> &mut Self {
        let version = version.to_string();
        self.updates
            .entry(app_name.to_string())
            .or_default()
            .entry(version.clone())
            .or_default()
            .insert(platform.as_str().to_string(), artifact);
        self.latest
            .entry(app_name.to_string())
            .or_default()
            .entry(channel.as_str().to_string())
            .or_default()
            .insert(platform.as_str().to_string(), version);
        self
    }

    /// Version string listed as latest for one channel.
    pub fn latest_version(&self, app_name: &str, channel: Channel, platform: Platform) -> Option<&str> {
        self.latest
            .get(app_name)?
            .get(channel.as_str())?
            .get(platform.as_str())
            .map(String::as_str)
    }

    /// Release listed as latest for exactly `channel`, together with the
    /// version string used as key under `updates`. Other channels are never
    /// consulted.
    pub fn latest_release(
        &self,
        app_name: &str,
        channel: Channel,
        platform: Platform,
    ) -> Result<Option<(AppVersion, &str)>> {
        let Some(raw) = self.latest_version(app_name, channel, platform) else {
            return Ok(None);
        };
        Ok(Some((raw.parse()?, raw)))
    }

    pub fn artifact(&self, app_name: &str, version: &str, platform: Platform) -> Option<&ArtifactInfo> {
        self.updates
            .get(app_name)?
            .get(version)?
            .get(platform.as_str())
    }

    /// Every version referenced under `latest` must exist under `updates` for
    /// the same application and platform.
    pub fn check_consistency(&self) -> std::result::Result<(), VerificationError> {
        for (app_name, channels) in &self.latest {
            for (channel, platforms) in channels {
                for (platform, version) in platforms {
                    let listed = self
                        .updates
                        .get(app_name)
                        .and_then(|releases| releases.get(version))
                        .is_some_and(|builds| builds.contains_key(platform));
                    if !listed {
                        return Err(VerificationError::Inconsistent(format!(
                            "latest {app_name}/{channel}/{platform} points at unknown version {version}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Contents of `keys.gz`: the app signing key, signed by the root key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyDocument {
    /// Base64 Ed25519 public key that signs the version manifest.
    pub app_public: String,
    /// Base64 signature by the root key over the `app_public` string.
    pub signature: String,
}

impl KeyDocument {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|err| UpdaterError::Verification(VerificationError::MalformedJson(err.to_string())))
    }
}
