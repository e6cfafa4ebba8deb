//! The seam between the deploy pipeline and the remote platform.
//!
//! Production code uses the HTTP client from `anvil-cloud`; tests substitute
//! in-memory fakes.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::manifest::ContentHash;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("{operation} failed")]
    Request {
        operation: &'static str,
        source: BoxError,
    },

    #[error("{operation} rejected with HTTP {status}: {detail}")]
    Rejected {
        operation: &'static str,
        status: u16,
        detail: String,
    },

    #[error("{operation} returned an unexpected response: {detail}")]
    Protocol {
        operation: &'static str,
        detail: String,
    },
}

/// Authenticated account details.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserInfo {
    pub email: String,
}

/// Opaque reference to a built, deployable bundle (e.g. a slug URL).
///
/// Not `Clone`: a reference is handed to exactly one release.
#[derive(Debug, PartialEq, Eq)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Result of releasing an artifact to an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub version: String,
    pub web_url: String,
}

/// One manifest entry as sent to the build service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildFile {
    pub path: String,
    pub hash: ContentHash,
    pub size: u64,
    pub remote_ref: String,
}

/// A build submission referencing already uploaded content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildRequest {
    pub app_name: String,
    pub app_user: String,
    pub consumer_user_agent: String,
    pub buildpack_url: Option<String>,
    pub env: BTreeMap<String, String>,
    pub read_cache: bool,
    pub write_cache: bool,
    pub write_slug: bool,
    pub files: Vec<BuildFile>,
}

/// Terminal state of a remote build.
#[derive(Debug, PartialEq, Eq)]
pub struct BuildExit {
    pub status: i32,
    pub artifact: Option<ArtifactRef>,
}

/// Line-by-line output of a running remote build.
#[allow(async_fn_in_trait)]
pub trait BuildStream {
    /// Next output line, or `None` once the output is exhausted.
    async fn next_line(&mut self) -> Result<Option<String>, PlatformError>;

    /// Wait for the build's exit status.
    async fn finish(self) -> Result<BuildExit, PlatformError>
    where
        Self: Sized;
}

/// Remote platform operations used by the deploy pipeline.
#[allow(async_fn_in_trait)]
pub trait Platform: Send + Sync {
    type Build: BuildStream;

    async fn user_info(&self) -> Result<UserInfo, PlatformError>;

    /// Transfer one file's bytes into the content-addressed slot for `hash`,
    /// returning its remote reference.
    async fn upload(&self, hash: &ContentHash, path: &Path) -> Result<String, PlatformError>;

    async fn start_build(&self, request: &BuildRequest) -> Result<Self::Build, PlatformError>;

    async fn release(
        &self,
        app_name: &str,
        artifact: ArtifactRef,
        description: Option<&str>,
    ) -> Result<ReleaseInfo, PlatformError>;

    /// Upload a prebuilt workspace archive as a releasable artifact.
    async fn upload_archive(
        &self,
        app_name: &str,
        path: &Path,
    ) -> Result<ArtifactRef, PlatformError>;
}
