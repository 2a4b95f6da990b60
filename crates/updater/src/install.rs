//! Extraction and relaunch of a downloaded release archive.

use crate::error::{Result, UpdaterError};
use crate::updater::AvailableUpdate;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::path::{Path, PathBuf};
use std::process::Command;
use tokio::task;
use tracing::info;

/// Applies a verified artefact. Implementations usually unpack it and hand
/// control to the new binary; on success the caller is expected to exit.
#[async_trait]
pub trait UpdateApplier: Send + Sync {
    async fn extract_and_restart(&self, archive: &Path, update: &AvailableUpdate) -> Result<()>;
}

/// Unpacks `.tar.gz`/`.tgz`/`.zip` archives into an install directory and
/// optionally launches the extracted executable.
#[derive(Debug, Clone)]
pub struct ArchiveInstaller {
    install_dir: PathBuf,
    relaunch: bool,
}

impl ArchiveInstaller {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
            relaunch: true,
        }
    }

    /// Whether to spawn the extracted executable after unpacking.
    pub fn relaunch(mut self, enabled: bool) -> Self {
        self.relaunch = enabled;
        self
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Unpack `archive` and return the path of the executable named after `app_name`.
    pub fn extract(&self, archive: &Path, app_name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.install_dir)?;
        unpack(archive, &self.install_dir)?;
        find_executable(&self.install_dir, app_name)?.ok_or_else(|| UpdaterError::Extract {
            path: archive.to_path_buf(),
            reason: format!("no executable named {app_name}* in archive"),
        })
    }
}

#[async_trait]
impl UpdateApplier for ArchiveInstaller {
    async fn extract_and_restart(&self, archive: &Path, update: &AvailableUpdate) -> Result<()> {
        let installer = self.clone();
        let archive = archive.to_path_buf();
        let app_name = update.app_name().to_string();
        let executable = task::spawn_blocking(move || installer.extract(&archive, &app_name))
            .await
            .map_err(|err| UpdaterError::Other(format!("task join error: {err}")))??;

        info!(
            target: "updater",
            version = %update.version(),
            executable = %executable.display(),
            "update extracted"
        );

        if self.relaunch {
            let child = Command::new(&executable).spawn()?;
            info!(target: "updater", pid = child.id(), "relaunched updated application");
        }
        Ok(())
    }
}

fn unpack(archive: &Path, dest: &Path) -> Result<()> {
    let name = archive
        .file_name()
        .map(|name| name.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let extract_error = |reason: String| UpdaterError::Extract {
        path: archive.to_path_buf(),
        reason,
    };

    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        let file = std::fs::File::open(archive)?;
        tar::Archive::new(GzDecoder::new(file))
            .unpack(dest)
            .map_err(|err| extract_error(err.to_string()))
    } else if name.ends_with(".zip") {
        let file = std::fs::File::open(archive)?;
        zip::ZipArchive::new(file)
            .and_then(|mut zip| zip.extract(dest))
            .map_err(|err| extract_error(err.to_string()))
    } else {
        Err(UpdaterError::Unsupported(format!(
            "archive format of {}",
            archive.display()
        )))
    }
}

fn find_executable(dir: &Path, app_name: &str) -> Result<Option<PathBuf>> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .collect();
    entries.sort();

    for path in &entries {
        if path.is_file() && is_executable(path, app_name) {
            return Ok(Some(path.clone()));
        }
    }
    for path in entries.iter().filter(|path| path.is_dir()) {
        if let Some(found) = find_executable(path, app_name)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

fn is_executable(path: &Path, app_name: &str) -> bool {
    let Some(name) = path.file_name().map(|name| name.to_string_lossy()) else {
        return false;
    };
    if !name.starts_with(app_name) {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|metadata| metadata.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        name.ends_with(".exe")
    }
}
