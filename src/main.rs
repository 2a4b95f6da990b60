//! Command-line shell for the update demo.
//!
//! Prints the application version, runs the startup update check against the
//! local file server and reports the resulting status.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};
use update_demo::{DemoConfig, DeploymentMode, UpdateOrchestrator};
use updater::{Channel, Platform};

/// Command-line arguments for the update demo
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Increase logging verbosity
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding keys.gz, versions.gz and release archives
    #[arg(long, env = "UPDATE_DEMO_FILESERVER_DIR")]
    serve_dir: Option<PathBuf>,

    /// Base64 Ed25519 root public key used to verify published manifests
    #[arg(long, env = "UPDATE_DEMO_PUBLIC_KEY")]
    public_key: Option<String>,

    /// Application name as listed in the manifest
    #[arg(long)]
    app_name: Option<String>,

    /// Release channel (stable, beta or alpha)
    #[arg(long)]
    channel: Option<Channel>,

    /// Platform identifier (mac, win, nix32 or nix64)
    #[arg(long)]
    platform: Option<Platform>,

    /// Check an existing update server instead of starting the local one
    #[arg(long)]
    update_url: Option<String>,

    /// Behave as a packaged build: download, extract and relaunch updates
    #[arg(long, default_value_t = false)]
    packaged: bool,

    /// Fail instead of falling back when the serve directory is missing
    #[arg(long, default_value_t = false)]
    strict_dir: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<DemoConfig> {
        let mut config = match &self.config {
            Some(path) => DemoConfig::from_json_file(path)?,
            None => DemoConfig::default(),
        };

        config.verbose |= self.debug;
        if let Some(dir) = self.serve_dir {
            config.serve_directory = Some(dir);
        }
        if let Some(key) = self.public_key {
            config.root_public_key = Some(key);
        }
        if let Some(name) = self.app_name {
            config.app_name = name;
        }
        if let Some(channel) = self.channel {
            config.channel = channel;
        }
        if let Some(platform) = self.platform {
            config.platform = platform;
        }
        if self.update_url.is_some() {
            config.update_url = self.update_url;
        }
        if self.packaged {
            config.deployment_mode = DeploymentMode::Packaged;
        }
        if self.strict_dir {
            config.strict_directory = true;
        }
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "debug,hyper=info,reqwest=info"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;
    init_tracing(config.verbose);

    println!("Version {}", config.current_version);
    let mut orchestrator = UpdateOrchestrator::new(config);
    let decision = orchestrator.run().await;
    if decision.is_failure() {
        tracing::warn!(target: "update_demo", status = %decision, "update check did not complete");
    }
    println!("{decision}");

    orchestrator.close().await;
    Ok(())
}
