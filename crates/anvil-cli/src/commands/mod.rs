mod archive;
mod check;
mod diff;
mod push;
mod report;

use std::path::{Path, PathBuf};

use anvil::{AnvilConfig, Cancellation, DeployError, EventBus, PlatformConfig};
use clap::Args;
use secrecy::SecretString;

pub use archive::archive;
pub use check::check;
pub use diff::diff;
pub use push::push;

/// Command-line values that take precedence over anvil.toml.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Application to deploy
    #[arg(long)]
    pub app: Option<String>,
    /// Directory to scan, relative to the project directory
    #[arg(long)]
    pub base_dir: Option<PathBuf>,
    /// Comma-separated include globs
    #[arg(long)]
    pub include: Option<String>,
    /// Comma-separated exclude globs
    #[arg(long)]
    pub exclude: Option<String>,
    /// Buildpack URL (http, https or git)
    #[arg(long)]
    pub buildpack: Option<String>,
    /// Ignore the remote cache and upload everything
    #[arg(long)]
    pub no_cache: bool,
    /// Release description
    #[arg(long)]
    pub description: Option<String>,
}

impl Overrides {
    pub fn apply(&self, config: &mut AnvilConfig) {
        if let Some(app) = &self.app {
            config.app.name = Some(app.clone());
        }
        if let Some(base_dir) = &self.base_dir {
            config.files.base_dir = base_dir.clone();
        }
        if let Some(include) = &self.include {
            config.files.includes = include.clone();
        }
        if let Some(exclude) = &self.exclude {
            config.files.excludes = exclude.clone();
        }
        if let Some(buildpack) = &self.buildpack {
            config.build.buildpack_url = Some(buildpack.clone());
        }
        if self.no_cache {
            config.build.use_cache = false;
        }
        if let Some(description) = &self.description {
            config.app.release_description = Some(description.clone());
        }
    }
}

/// anvil.toml from `dir` with `overrides` applied.
pub(crate) fn load_config(dir: &Path, overrides: &Overrides) -> anyhow::Result<AnvilConfig> {
    let mut config = AnvilConfig::load(dir)?;
    overrides.apply(&mut config);
    Ok(config)
}

/// API key from the variable named by `[platform].api_key_env`.
pub(crate) fn api_key(platform: &PlatformConfig) -> anyhow::Result<SecretString> {
    let var = &platform.api_key_env;
    let missing = || anvil::Error::MissingApiKey { var: var.clone() };
    let key = match std::env::var(var) {
        Ok(key) => key,
        Err(e) => {
            tracing::debug!(var = %var, error = %e, "API key variable unreadable");
            return Err(missing().into());
        }
    };
    if key.trim().is_empty() {
        return Err(missing().into());
    }
    Ok(SecretString::from(key))
}

/// Cancels the returned token on the first Ctrl+C.
pub(crate) fn cancel_on_ctrl_c() -> Cancellation {
    let (handle, cancel) = anvil::cancellation();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("interrupted, cancelling deployment");
                handle.cancel();
            }
            // arch-lint: allow(no-error-swallowing) reason="without a signal handler the deploy simply runs to completion"
            Err(e) => tracing::warn!(error = %e, "failed to install Ctrl+C handler"),
        }
    });
    cancel
}

/// Deliver a failure from before the pipeline started through `bus`, the way
/// the pipeline reports its own.
pub(crate) fn setup_failure(command: &str, bus: &EventBus, e: anyhow::Error) -> anyhow::Error {
    let message = format!("{e:#}");
    tracing::error!("{message}");
    bus.error(&message);
    anyhow::anyhow!("{command} failed — see above for details")
}

/// The pipeline has already printed `e`; only the exit status is left.
pub(crate) fn reported_failure(command: &str, e: &DeployError) -> anyhow::Error {
    tracing::debug!(
        stage = %e.stage(),
        cancelled = e.is_cancelled(),
        built = e.is_built_but_unreleased(),
        "{command} aborted",
    );
    anyhow::anyhow!("{command} failed — see above for details")
}
