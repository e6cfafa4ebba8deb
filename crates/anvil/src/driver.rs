use anvil_core::{ArtifactRef, BuildRequest, BuildStream, Event, EventBus, Platform};

use crate::error::BuildError;

/// Output line prefix announcing the slug reference. Never forwarded.
pub const SUCCESS_MARKER: &str = "Success, slug is ";

/// Runs one remote build, forwarding its output to the event bus.
pub struct BuildDriver<'a, P> {
    platform: &'a P,
    bus: &'a EventBus,
}

impl<'a, P: Platform> BuildDriver<'a, P> {
    pub fn new(platform: &'a P, bus: &'a EventBus) -> Self {
        Self { platform, bus }
    }

    /// Submit `request` and stream its output until the build exits.
    ///
    /// The slug reference comes from the build's exit metadata, falling back
    /// to the success marker line.
    pub async fn run(&self, request: &BuildRequest) -> Result<ArtifactRef, BuildError> {
        tracing::info!(
            app = %request.app_name,
            files = request.files.len(),
            buildpack = request.buildpack_url.as_deref().unwrap_or("auto"),
            "starting build",
        );

        let mut build = self
            .platform
            .start_build(request)
            .await
            .map_err(|e| BuildError::Submit { source: e })?;

        let mut announced = None;
        while let Some(line) = build
            .next_line()
            .await
            .map_err(|e| BuildError::Stream { source: e })?
        {
            if let Some(slug) = success_marker(&line) {
                if !slug.is_empty() {
                    announced = Some(slug.to_owned());
                }
                continue;
            }
            self.bus.emit(Event::BuildOutputLine { line });
        }

        let exit = build
            .finish()
            .await
            .map_err(|e| BuildError::Stream { source: e })?;

        if exit.status != 0 {
            tracing::warn!(exit_status = exit.status, "build failed");
            return Err(BuildError::Failed {
                exit_status: exit.status,
            });
        }

        let artifact = exit
            .artifact
            .or_else(|| announced.map(ArtifactRef::new))
            .ok_or(BuildError::MissingArtifact)?;
        tracing::info!(slug = artifact.as_str(), "build succeeded");
        Ok(artifact)
    }
}

/// Slug reference announced by `line`, if it carries the success marker.
pub fn success_marker(line: &str) -> Option<&str> {
    line.find(SUCCESS_MARKER)
        .map(|at| line[at + SUCCESS_MARKER.len()..].trim())
}
