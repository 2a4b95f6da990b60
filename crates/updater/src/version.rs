//! Release versions, channels and platforms as they appear in the manifest.

use crate::error::{Result, UpdaterError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Release maturity, ordered `Alpha < Beta < Stable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReleaseType {
    Alpha = 0,
    Beta = 1,
    Stable = 2,
}

impl ReleaseType {
    fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(ReleaseType::Alpha),
            1 => Some(ReleaseType::Beta),
            2 => Some(ReleaseType::Stable),
            _ => None,
        }
    }
}

/// Application version in `major.minor.patch.releaseType.releaseNumber` form.
///
/// Field order gives the total order used to decide whether an update exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub release_type: ReleaseType,
    pub release_number: u64,
}

impl AppVersion {
    pub const fn new(
        major: u64,
        minor: u64,
        patch: u64,
        release_type: ReleaseType,
        release_number: u64,
    ) -> Self {
        Self {
            major,
            minor,
            patch,
            release_type,
            release_number,
        }
    }

    /// A stable release with release number zero.
    pub const fn stable(major: u64, minor: u64, patch: u64) -> Self {
        Self::new(major, minor, patch, ReleaseType::Stable, 0)
    }

    fn from_semver(version: &semver::Version, raw: &str) -> Result<Self> {
        let invalid = || UpdaterError::Version(raw.to_string());
        if version.pre.is_empty() {
            return Ok(Self::stable(version.major, version.minor, version.patch));
        }

        let (kind, number) = version
            .pre
            .as_str()
            .split_once('.')
            .unwrap_or((version.pre.as_str(), "0"));
        let release_type = match kind {
            "alpha" | "a" => ReleaseType::Alpha,
            "beta" | "b" => ReleaseType::Beta,
            _ => return Err(invalid()),
        };
        let release_number = number.parse().map_err(|_| invalid())?;
        Ok(Self::new(
            version.major,
            version.minor,
            version.patch,
            release_type,
            release_number,
        ))
    }
}

impl FromStr for AppVersion {
    type Err = UpdaterError;

    /// Accepts the manifest form (`1.2.3.2.0`), short stable forms (`1`,
    /// `1.2`, `1.2.3`) and semver pre-releases (`1.2.3-beta.4`).
    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim().trim_start_matches('v');
        let invalid = || UpdaterError::Version(raw.to_string());

        let numeric: Option<Vec<u64>> = trimmed.split('.').map(|part| part.parse().ok()).collect();
        match numeric.as_deref() {
            Some([major]) => Ok(Self::stable(*major, 0, 0)),
            Some([major, minor]) => Ok(Self::stable(*major, *minor, 0)),
            Some([major, minor, patch]) => Ok(Self::stable(*major, *minor, *patch)),
            Some([major, minor, patch, release_type, release_number]) => Ok(Self::new(
                *major,
                *minor,
                *patch,
                ReleaseType::from_code(*release_type).ok_or_else(invalid)?,
                *release_number,
            )),
            Some(_) => Err(invalid()),
            None => {
                let parsed = semver::Version::parse(trimmed).map_err(|_| invalid())?;
                Self::from_semver(&parsed, raw)
            }
        }
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}.{}",
            self.major, self.minor, self.patch, self.release_type as u8, self.release_number
        )
    }
}

/// Release track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Stable,
    Beta,
    Alpha,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Stable => "stable",
            Channel::Beta => "beta",
            Channel::Alpha => "alpha",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = UpdaterError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "stable" => Ok(Channel::Stable),
            "beta" => Ok(Channel::Beta),
            "alpha" => Ok(Channel::Alpha),
            other => Err(UpdaterError::validation(format!("unknown channel {other:?}"))),
        }
    }
}

/// Platform identifier artefacts are published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Mac,
    Win,
    Nix32,
    Nix64,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Mac => "mac",
            Platform::Win => "win",
            Platform::Nix32 => "nix32",
            Platform::Nix64 => "nix64",
        }
    }

    /// Platform of the running binary.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Mac
        } else if cfg!(target_os = "windows") {
            Platform::Win
        } else if cfg!(target_pointer_width = "32") {
            Platform::Nix32
        } else {
            Platform::Nix64
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Platform::current()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = UpdaterError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "mac" => Ok(Platform::Mac),
            "win" => Ok(Platform::Win),
            "nix32" => Ok(Platform::Nix32),
            "nix64" => Ok(Platform::Nix64),
            other => Err(UpdaterError::validation(format!("unknown platform {other:?}"))),
        }
    }
}
