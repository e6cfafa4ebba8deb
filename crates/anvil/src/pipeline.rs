//! The deploy pipeline: scan, diff, upload, build, release.
//!
//! Stages run strictly in order; only uploads run concurrently. Every failure
//! is reported once on the event bus's error channel and returned.

use std::path::{Path, PathBuf};

use anvil_build::{
    DiffResult, GlobFilter, ScanError, StagedArchive, build_manifest, diff, stage_archive,
};
use anvil_core::config::validate_buildpack_url;
use anvil_core::{
    BuildConfig, CacheSnapshot, CacheStore, Event, EventBus, FilesConfig, Manifest, Platform,
    ReleaseInfo,
};

use crate::cancel::Cancellation;
use crate::driver::BuildDriver;
use crate::error::{BuildError, DeployError, Stage, UploadError};
use crate::release::ReleaseCoordinator;
use crate::upload::{DEFAULT_CONCURRENCY, UploadCoordinator};

/// The directory to deploy and its glob filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub base_dir: PathBuf,
    /// Comma-separated include globs.
    pub includes: String,
    /// Comma-separated exclude globs.
    pub excludes: String,
}

impl Workspace {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            includes: "**".to_owned(),
            excludes: String::new(),
        }
    }

    pub fn includes(mut self, includes: impl Into<String>) -> Self {
        self.includes = includes.into();
        self
    }

    pub fn excludes(mut self, excludes: impl Into<String>) -> Self {
        self.excludes = excludes.into();
        self
    }

    /// `[files]` settings, with `base_dir` resolved against `project_dir`.
    pub fn from_config(project_dir: &Path, files: &FilesConfig) -> Self {
        Self {
            base_dir: project_dir.join(&files.base_dir),
            includes: files.includes.clone(),
            excludes: files.excludes.clone(),
        }
    }

    pub fn filter(&self) -> Result<GlobFilter, ScanError> {
        GlobFilter::new(&self.includes, &self.excludes)
    }
}

/// What a deploy would upload, without uploading it.
#[derive(Debug)]
pub struct Plan {
    pub manifest: Manifest,
    pub diff: DiffResult,
}

pub struct Pipeline<'a, P, C> {
    platform: &'a P,
    cache: &'a C,
    bus: &'a EventBus,
    cancel: Cancellation,
    upload_concurrency: usize,
}

impl<'a, P, C: CacheStore> Pipeline<'a, P, C> {
    pub fn new(platform: &'a P, cache: &'a C, bus: &'a EventBus) -> Self {
        Self {
            platform,
            cache,
            bus,
            cancel: Cancellation::never(),
            upload_concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn upload_concurrency(mut self, concurrency: usize) -> Self {
        self.upload_concurrency = concurrency;
        self
    }

    /// Scan and diff `workspace` without uploading anything.
    pub async fn plan(&self, workspace: &Workspace, read_cache: bool) -> Result<Plan, DeployError> {
        let result = self
            .scan_and_diff(workspace, read_cache)
            .await
            .map(|(manifest, _, diff)| Plan { manifest, diff });
        self.reported(result)
    }

    /// The snapshot is fetched once, after scanning.
    async fn scan_and_diff(
        &self,
        workspace: &Workspace,
        read_cache: bool,
    ) -> Result<(Manifest, CacheSnapshot, DiffResult), DeployError> {
        self.cancel.check(Stage::Scan)?;
        let filter = workspace.filter()?;
        let manifest = build_manifest(&workspace.base_dir, &filter, self.bus)?;

        let snapshot = self.snapshot(read_cache).await?;
        let diff = diff(&manifest, &snapshot);
        tracing::info!(
            total = diff.total(),
            pending = diff.upload_count(),
            removed = diff.removed().len(),
            "workspace diffed",
        );
        Ok((manifest, snapshot, diff))
    }

    /// Cache state as of now, or an empty snapshot when reads are disabled.
    async fn snapshot(&self, read_cache: bool) -> Result<CacheSnapshot, DeployError> {
        if !read_cache {
            return Ok(CacheSnapshot::default());
        }
        let snapshot = self
            .cancel
            .run(Stage::Diff, self.cache.snapshot())
            .await?
            .map_err(|e| UploadError::Snapshot { source: e })?;
        Ok(snapshot)
    }

    /// Bundle `workspace` into a temporary tar.gz.
    pub fn stage(&self, workspace: &Workspace) -> Result<StagedArchive, DeployError> {
        let result = self.run_stage(workspace);
        self.reported(result)
    }

    fn run_stage(&self, workspace: &Workspace) -> Result<StagedArchive, DeployError> {
        self.cancel.check(Stage::Scan)?;
        let filter = workspace.filter()?;
        let archive = stage_archive(&workspace.base_dir, &filter)?;
        tracing::info!(size_mb = %archive.size_mb(), "workspace bundled");
        Ok(archive)
    }

    fn reported<T>(&self, result: Result<T, DeployError>) -> Result<T, DeployError> {
        if let Err(e) = &result {
            let message = e.user_message();
            tracing::error!(stage = %e.stage(), "{message}");
            self.bus.error(&message);
        }
        result
    }
}

impl<'a, P: Platform, C: CacheStore> Pipeline<'a, P, C> {
    /// Deploy `workspace` incrementally and release it.
    ///
    /// `buildpack_url` overrides the configured buildpack for this run.
    pub async fn deploy(
        &self,
        workspace: &Workspace,
        config: &BuildConfig,
        buildpack_url: Option<&str>,
        description: Option<&str>,
    ) -> Result<ReleaseInfo, DeployError> {
        let result = self
            .run_deploy(workspace, config, buildpack_url, description)
            .await;
        self.reported(result)
    }

    async fn run_deploy(
        &self,
        workspace: &Workspace,
        config: &BuildConfig,
        buildpack_url: Option<&str>,
        description: Option<&str>,
    ) -> Result<ReleaseInfo, DeployError> {
        if let Some(url) = buildpack_url {
            validate_buildpack_url(url)?;
        }
        let (manifest, snapshot, diff) = self.scan_and_diff(workspace, config.read_cache).await?;

        let uploads = UploadCoordinator::new(self.platform, self.cache, self.bus)
            .concurrency(self.upload_concurrency)
            .write_cache(config.write_cache);
        let uploaded = self
            .cancel
            .run(Stage::Upload, uploads.run(&manifest, &diff))
            .await??;

        let request = config
            .build_request(
                &manifest,
                |hash| {
                    uploaded
                        .get(hash)
                        .map(String::as_str)
                        .or_else(|| snapshot.lookup(hash))
                },
                buildpack_url,
            )
            .map_err(|hash| BuildError::MissingContent { hash })?;

        let driver = BuildDriver::new(self.platform, self.bus);
        let artifact = self.cancel.run(Stage::Build, driver.run(&request)).await??;

        if config.write_cache {
            // arch-lint: allow(no-error-swallowing) reason="the release already succeeded; a stale previous manifest only affects removed-file reporting"
            if let Err(e) = self.cache.record_manifest(&manifest).await {
                tracing::warn!(error = %e, "failed to record deployed manifest");
            }
        }

        self.release(&config.app_name, artifact, description).await
    }

    /// Upload a staged archive and release it, starting with `diff-start`
    /// for the bundled file count. The archive is deleted afterwards
    /// whatever the outcome.
    pub async fn release_archive(
        &self,
        archive: StagedArchive,
        app_name: &str,
        description: Option<&str>,
    ) -> Result<ReleaseInfo, DeployError> {
        let result = self.run_release_archive(&archive, app_name, description).await;
        // arch-lint: allow(no-error-swallowing) reason="the staging directory lives under the system temp dir"
        if let Err(e) = archive.close() {
            tracing::warn!(error = %e, "failed to remove staged archive");
        }
        self.reported(result)
    }

    async fn run_release_archive(
        &self,
        archive: &StagedArchive,
        app_name: &str,
        description: Option<&str>,
    ) -> Result<ReleaseInfo, DeployError> {
        self.bus.emit(Event::DiffStart {
            total_files: archive.file_count(),
        });
        let artifact = self
            .cancel
            .run(
                Stage::Upload,
                self.platform.upload_archive(app_name, archive.path()),
            )
            .await?
            .map_err(|e| UploadError::Archive { source: e })?;

        self.release(app_name, artifact, description).await
    }

    /// Stage, upload, and release the whole workspace as one archive.
    pub async fn deploy_archive(
        &self,
        workspace: &Workspace,
        app_name: &str,
        description: Option<&str>,
    ) -> Result<ReleaseInfo, DeployError> {
        let archive = self.stage(workspace)?;
        self.release_archive(archive, app_name, description).await
    }

    async fn release(
        &self,
        app_name: &str,
        artifact: anvil_core::ArtifactRef,
        description: Option<&str>,
    ) -> Result<ReleaseInfo, DeployError> {
        let coordinator = ReleaseCoordinator::new(self.platform, self.bus);
        let info = self
            .cancel
            .run(Stage::Release, coordinator.run(app_name, artifact, description))
            .await??;
        Ok(info)
    }
}
