use std::fmt;

/// Outcome of one update check, recomputed on every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateDecision {
    NoUpdateAvailable,
    UpdateAvailableNotApplied,
    DownloadFailed,
    ExtractingAndRestarting,
    CouldNotCheck,
}

impl UpdateDecision {
    /// Human-readable status shown by the shell.
    pub fn status_text(&self) -> &'static str {
        match self {
            UpdateDecision::NoUpdateAvailable => "No available updates were found.",
            UpdateDecision::DownloadFailed => "Update download failed.",
            UpdateDecision::ExtractingAndRestarting => "Extracting update and restarting.",
            UpdateDecision::UpdateAvailableNotApplied => {
                "Update available but application is not frozen."
            }
            UpdateDecision::CouldNotCheck => "Couldn't check for updates.",
        }
    }

    /// Whether the decision reports a failure rather than a normal outcome.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            UpdateDecision::DownloadFailed | UpdateDecision::CouldNotCheck
        )
    }
}

impl fmt::Display for UpdateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_text())
    }
}
