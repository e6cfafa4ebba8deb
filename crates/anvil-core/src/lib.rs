//! Core types and configuration for anvil.
//!
//! This crate defines the `anvil.toml` schema ([`AnvilConfig`]), the
//! resolved [`BuildConfig`] handed to the build service, the content-addressed
//! [`Manifest`], the [`CacheStore`] abstraction, the progress [`EventBus`],
//! and the [`Platform`] seam the deploy pipeline talks through.

pub mod cache;
pub mod config;
pub mod env;
pub mod error;
pub mod event;
pub mod manifest;
pub mod platform;

pub use cache::{CacheEntry, CacheSnapshot, CacheStore, MemoryCache};
pub use config::{AnvilConfig, AppConfig, BuildConfig, BuildSettings, FilesConfig, PlatformConfig};
pub use env::{EnvProvider, ProcessEnv};
pub use error::{Error, Result};
pub use event::{Event, EventBus, EventKind};
pub use manifest::{ContentHash, FileEntry, Manifest};
pub use platform::{
    ArtifactRef, BuildExit, BuildFile, BuildRequest, BuildStream, Platform, PlatformError,
    ReleaseInfo, UserInfo,
};
