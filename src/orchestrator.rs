use crate::config::{ConfigError, DemoConfig, DeploymentMode};
use fileserver::{allocate_ephemeral_port, FileServerError, ServerHandle, ServerLifecycleController};
use std::time::Duration;
use tracing::{debug, info, warn};
use updater::{
    save_artifact, verify_artifact, ArchiveInstaller, AvailableUpdate, HttpManifestSource,
    UpdateApplier, UpdateChecker, UpdateDecision, UpdateStatus, UpdaterError,
};

const SERVER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Where the orchestrator is in the update sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    CheckingForUpdate,
    Downloading,
    Verifying,
    ExtractingAndRestarting,
    Failed(UpdateDecision),
    Done(UpdateDecision),
}

#[derive(Debug, thiserror::Error)]
enum CheckError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Server(#[from] FileServerError),
    #[error("file server at {0} never became ready")]
    NotReady(String),
    #[error(transparent)]
    Update(#[from] UpdaterError),
}

/// Runs one update check end to end: file server, manifest check and, for
/// packaged builds, download and hand-off to the [`UpdateApplier`].
pub struct UpdateOrchestrator<A = ArchiveInstaller> {
    config: DemoConfig,
    controller: ServerLifecycleController,
    applier: A,
    state: OrchestratorState,
    server: Option<ServerHandle>,
}

impl UpdateOrchestrator<ArchiveInstaller> {
    pub fn new(config: DemoConfig) -> Self {
        let applier = ArchiveInstaller::new(config.install_dir.clone());
        Self::with_applier(config, applier)
    }
}

impl<A> UpdateOrchestrator<A>
where
    A: UpdateApplier,
{
    pub fn with_applier(config: DemoConfig, applier: A) -> Self {
        let controller =
            ServerLifecycleController::new().with_directory_policy(config.directory_policy());
        Self {
            config,
            controller,
            applier,
            state: OrchestratorState::Idle,
            server: None,
        }
    }

    pub fn with_controller(mut self, controller: ServerLifecycleController) -> Self {
        self.controller = controller;
        self
    }

    pub fn config(&self) -> &DemoConfig {
        &self.config
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn applier(&self) -> &A {
        &self.applier
    }

    /// The local file server, while it is running.
    pub fn server(&self) -> Option<&ServerHandle> {
        self.server.as_ref()
    }

    /// Check for an update and act on it according to the deployment mode.
    /// Failures never escape; they are reported through the decision.
    ///
    /// Every run starts from a fresh file server; one left by an earlier run
    /// is stopped first.
    pub async fn run(&mut self) -> UpdateDecision {
        self.close().await;
        self.transition(OrchestratorState::CheckingForUpdate);

        let (checker, update) = match self.check().await {
            Ok(Some(found)) => found,
            Ok(None) => return self.finish(UpdateDecision::NoUpdateAvailable),
            Err(err) => {
                warn!(target: "update_demo", error = %err, "could not check for updates");
                return self.finish(UpdateDecision::CouldNotCheck);
            }
        };

        match self.config.deployment_mode {
            DeploymentMode::Development => {
                info!(
                    target: "update_demo",
                    version = %update.version(),
                    "update available; development builds are not updated in place"
                );
                self.finish(UpdateDecision::UpdateAvailableNotApplied)
            }
            DeploymentMode::Packaged => self.apply(&checker, &update).await,
        }
    }

    /// Shut the local file server down, if one is running. Safe to call
    /// repeatedly; this is the shell's close callback.
    pub async fn close(&mut self) {
        if let Some(mut handle) = self.server.take() {
            self.controller.shutdown(&mut handle).await;
            if let Err(err) = self.controller.join(handle, SERVER_JOIN_TIMEOUT).await {
                warn!(target: "update_demo", error = %err, "file server stopped with an error");
            }
        }
    }

    async fn check(
        &mut self,
    ) -> Result<Option<(UpdateChecker<HttpManifestSource>, AvailableUpdate)>, CheckError> {
        let verifier = self.config.verifier()?;
        let current = self.config.parsed_version()?;
        let base_url = match self.config.update_url.clone() {
            Some(url) => url,
            None => self.start_server().await?,
        };

        let checker = UpdateChecker::new(HttpManifestSource::from_base(&base_url)?, verifier);
        let status = checker
            .check(
                &self.config.app_name,
                &current,
                self.config.channel,
                self.config.platform,
            )
            .await?;
        match status {
            UpdateStatus::UpToDate => Ok(None),
            UpdateStatus::Available(update) => Ok(Some((checker, update))),
        }
    }

    async fn start_server(&mut self) -> Result<String, CheckError> {
        let port = allocate_ephemeral_port().map_err(FileServerError::from)?;
        let mut handle = self
            .controller
            .start(self.config.serve_directory.as_deref(), port)
            .await?;
        let ready = self.controller.await_ready(&mut handle).await;
        let base_url = handle.base_url();
        self.server = Some(handle);

        if ready {
            Ok(base_url)
        } else {
            Err(CheckError::NotReady(base_url))
        }
    }

    async fn apply(
        &mut self,
        checker: &UpdateChecker<HttpManifestSource>,
        update: &AvailableUpdate,
    ) -> UpdateDecision {
        self.transition(OrchestratorState::Downloading);
        let bytes = match checker.fetch_artifact(update).await {
            Ok(bytes) => bytes,
            Err(err) => return self.download_failed(err),
        };

        self.transition(OrchestratorState::Verifying);
        if let Err(err) = verify_artifact(update.artifact(), &bytes) {
            return self.download_failed(err);
        }
        let archive = match save_artifact(
            bytes,
            &self.config.download_dir,
            &update.artifact().filename,
        )
        .await
        {
            Ok(path) => path,
            Err(err) => return self.download_failed(err),
        };

        self.transition(OrchestratorState::ExtractingAndRestarting);
        self.close().await;
        match self.applier.extract_and_restart(&archive, update).await {
            Ok(()) => UpdateDecision::ExtractingAndRestarting,
            Err(err) => self.download_failed(err),
        }
    }

    fn download_failed(&mut self, err: UpdaterError) -> UpdateDecision {
        warn!(target: "update_demo", error = %err, "update download failed");
        self.transition(OrchestratorState::Failed(UpdateDecision::DownloadFailed));
        UpdateDecision::DownloadFailed
    }

    fn finish(&mut self, decision: UpdateDecision) -> UpdateDecision {
        self.transition(OrchestratorState::Done(decision));
        decision
    }

    fn transition(&mut self, next: OrchestratorState) {
        debug!(target: "update_demo", from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }
}
