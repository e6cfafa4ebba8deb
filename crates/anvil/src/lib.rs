//! Incremental application deployment.
//!
//! Scans a workspace into a content-addressed manifest, diffs it against the
//! application's remote cache, uploads only missing content, drives a remote
//! buildpack build, and releases the resulting slug. Progress is reported
//! through an [`EventBus`].
//!
//! This is the facade crate: it hosts the deploy [`Pipeline`] and re-exports
//! the sub-crates.
//!
//! # Feature flags
//!
//! | Feature | Default | Crate | Description |
//! |---------|---------|-------|-------------|
//! | `cloud` | yes | `anvil-cloud` | HTTP client for the build service and platform API |
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use anvil::{AnvilConfig, EventBus, MemoryCache, Pipeline, Workspace};
//!
//! # async fn run(platform: &impl anvil::Platform, config: anvil::BuildConfig) -> Result<(), anvil::DeployError> {
//! let file_config = AnvilConfig::load(Path::new("."))?;
//! let workspace = Workspace::from_config(Path::new("."), &file_config.files);
//! let cache = MemoryCache::new();
//! let bus = EventBus::new().subscribe_all(|event| println!("{}", event.kind()));
//!
//! let release = Pipeline::new(platform, &cache, &bus)
//!     .deploy(&workspace, &config, None, Some("Deployed by CI"))
//!     .await?;
//! println!("{} | {}", release.version, release.web_url);
//! # Ok(())
//! # }
//! ```

// Core types flattened into root namespace for convenience.
pub use anvil_core::*;

/// Workspace scanning, manifests, diffing, and archive staging.
pub mod build {
    pub use anvil_build::*;
}

/// HTTP client for the build service and platform API.
#[cfg(feature = "cloud")]
pub mod cloud {
    pub use anvil_cloud::*;
}

pub mod cancel;
pub mod driver;
pub mod error;
pub mod pipeline;
pub mod release;
pub mod upload;

pub use cancel::{CancelHandle, Cancellation, cancellation};
pub use driver::BuildDriver;
pub use error::{BuildError, DeployError, ReleaseError, Stage, UploadError};
pub use pipeline::{Pipeline, Plan, Workspace};
pub use release::ReleaseCoordinator;
pub use upload::UploadCoordinator;
