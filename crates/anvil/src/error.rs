use std::fmt;

use anvil_build::{ArchiveError, ScanError};
use anvil_core::{ContentHash, PlatformError};

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Scan,
    Diff,
    Upload,
    Build,
    Release,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scan => "scan",
            Self::Diff => "diff",
            Self::Upload => "upload",
            Self::Build => "build",
            Self::Release => "release",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("failed to read the file cache")]
    Snapshot { source: PlatformError },

    #[error("failed to upload {path}")]
    Transfer {
        path: String,
        source: PlatformError,
    },

    #[error("failed to record cache entry for {path}")]
    CacheWrite {
        path: String,
        source: PlatformError,
    },

    #[error("failed to upload workspace archive")]
    Archive { source: PlatformError },
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("content {hash} has no remote reference")]
    MissingContent { hash: ContentHash },

    #[error("failed to submit build")]
    Submit { source: PlatformError },

    #[error("build output interrupted")]
    Stream { source: PlatformError },

    #[error("A build error occurred: {exit_status}")]
    Failed { exit_status: i32 },

    #[error("build finished without a slug reference")]
    MissingArtifact,
}

#[derive(Debug, thiserror::Error)]
#[error("failed to release to {app}")]
pub struct ReleaseError {
    pub app: String,
    pub source: PlatformError,
}

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("invalid configuration")]
    Config(#[from] anvil_core::Error),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Release(#[from] ReleaseError),

    #[error("deployment cancelled during {stage}")]
    Cancelled { stage: Stage },
}

impl DeployError {
    /// Stage that failed. Configuration faults belong to the scan stage.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Config(_) | Self::Scan(_) | Self::Archive(_) => Stage::Scan,
            Self::Upload(UploadError::Snapshot { .. }) => Stage::Diff,
            Self::Upload(_) => Stage::Upload,
            Self::Build(_) => Stage::Build,
            Self::Release(_) => Stage::Release,
            Self::Cancelled { stage } => *stage,
        }
    }

    /// The build succeeded but the release did not, either because the
    /// platform refused it or because the run was cancelled while releasing.
    pub fn is_built_but_unreleased(&self) -> bool {
        matches!(
            self,
            Self::Release(_)
                | Self::Cancelled {
                    stage: Stage::Release
                }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Display text followed by each underlying cause, `: `-separated.
    pub fn user_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}
