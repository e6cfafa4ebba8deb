use anvil_core::{ArtifactRef, Event, EventBus, Platform, ReleaseInfo};

use crate::error::ReleaseError;

pub struct ReleaseCoordinator<'a, P> {
    platform: &'a P,
    bus: &'a EventBus,
}

impl<'a, P: Platform> ReleaseCoordinator<'a, P> {
    pub fn new(platform: &'a P, bus: &'a EventBus) -> Self {
        Self { platform, bus }
    }

    /// Point `app_name` at `artifact`. The artifact is consumed.
    pub async fn run(
        &self,
        app_name: &str,
        artifact: ArtifactRef,
        description: Option<&str>,
    ) -> Result<ReleaseInfo, ReleaseError> {
        self.bus.emit(Event::ReleaseStart {
            app_name: app_name.to_owned(),
        });

        let info = self
            .platform
            .release(app_name, artifact, description)
            .await
            .map_err(|e| ReleaseError {
                app: app_name.to_owned(),
                source: e,
            })?;

        self.bus.emit(Event::ReleaseEnd {
            version: info.version.clone(),
            web_url: info.web_url.clone(),
        });
        Ok(info)
    }
}
