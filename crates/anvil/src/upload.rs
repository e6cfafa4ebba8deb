use std::collections::BTreeMap;

use anvil_build::DiffResult;
use anvil_core::{CacheEntry, CacheStore, ContentHash, Event, EventBus, Manifest, Platform};
use futures::StreamExt;

use crate::error::UploadError;

pub const DEFAULT_CONCURRENCY: usize = 4;

/// Transfers content missing from the cache, one upload per distinct hash.
pub struct UploadCoordinator<'a, P, C> {
    platform: &'a P,
    cache: &'a C,
    bus: &'a EventBus,
    concurrency: usize,
    write_cache: bool,
}

impl<'a, P: Platform, C: CacheStore> UploadCoordinator<'a, P, C> {
    pub fn new(platform: &'a P, cache: &'a C, bus: &'a EventBus) -> Self {
        Self {
            platform,
            cache,
            bus,
            concurrency: DEFAULT_CONCURRENCY,
            write_cache: true,
        }
    }

    /// Maximum transfers in flight. Zero is treated as one.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn write_cache(mut self, write_cache: bool) -> Self {
        self.write_cache = write_cache;
        self
    }

    /// Upload every pending hash in `diff`, returning the remote reference of
    /// each.
    ///
    /// A cache entry is recorded only after its transfer is confirmed, so
    /// entries written before a failure survive it. The first failure aborts
    /// transfers still in flight.
    pub async fn run(
        &self,
        manifest: &Manifest,
        diff: &DiffResult,
    ) -> Result<BTreeMap<ContentHash, String>, UploadError> {
        let jobs = diff.upload_set();
        let count = jobs.len();
        let mut uploaded = BTreeMap::new();
        if count == 0 {
            tracing::info!("nothing to upload");
            return Ok(uploaded);
        }

        self.bus.emit(Event::UploadsStart { count });
        tracing::info!(
            files = count,
            concurrency = self.concurrency,
            write_cache = self.write_cache,
            "uploading",
        );

        let mut transfers = futures::stream::iter(jobs.into_iter().map(|entry| {
            let path = manifest.absolute_path(entry);
            async move {
                let result = self.platform.upload(&entry.hash, &path).await;
                (entry, result)
            }
        }))
        .buffer_unordered(self.concurrency);

        while let Some((entry, result)) = transfers.next().await {
            let remote_ref = result.map_err(|e| UploadError::Transfer {
                path: entry.path.clone(),
                source: e,
            })?;

            if self.write_cache {
                self.cache
                    .record(CacheEntry {
                        hash: entry.hash.clone(),
                        remote_ref: remote_ref.clone(),
                    })
                    .await
                    .map_err(|e| UploadError::CacheWrite {
                        path: entry.path.clone(),
                        source: e,
                    })?;
            }

            tracing::debug!(path = %entry.path, hash = %entry.hash.short(), "uploaded");
            uploaded.insert(entry.hash.clone(), remote_ref);
        }

        self.bus.emit(Event::UploadsEnd { count });
        Ok(uploaded)
    }
}
