use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::manifest::{ContentHash, Manifest};
use crate::platform::PlatformError;

/// Maps previously uploaded content to its remote storage reference.
///
/// A `remote_ref` is valid only for the exact bytes that produced `hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub hash: ContentHash,
    pub remote_ref: String,
}

/// Point-in-time view of an application's cache, fetched once per diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    #[serde(default)]
    entries: BTreeMap<ContentHash, String>,
    /// Path index of the last successfully built manifest, when known.
    #[serde(default)]
    previous: Option<BTreeMap<String, ContentHash>>,
}

impl CacheSnapshot {
    pub fn new(entries: impl IntoIterator<Item = CacheEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (e.hash, e.remote_ref))
                .collect(),
            previous: None,
        }
    }

    pub fn with_previous(mut self, index: BTreeMap<String, ContentHash>) -> Self {
        self.previous = Some(index);
        self
    }

    pub fn lookup(&self, hash: &ContentHash) -> Option<&str> {
        self.entries.get(hash).map(String::as_str)
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn previous(&self) -> Option<&BTreeMap<String, ContentHash>> {
        self.previous.as_ref()
    }

    pub fn entries(&self) -> impl Iterator<Item = CacheEntry> + '_ {
        self.entries.iter().map(|(hash, remote_ref)| CacheEntry {
            hash: hash.clone(),
            remote_ref: remote_ref.clone(),
        })
    }
}

/// Content-addressed cache of uploaded files, scoped to one application.
///
/// The store is owned by the remote platform; writes are last-write-wins and
/// no locking is attempted across concurrent deployments.
#[allow(async_fn_in_trait)]
pub trait CacheStore: Send + Sync {
    /// Fetch the current cache state.
    async fn snapshot(&self) -> Result<CacheSnapshot, PlatformError>;

    /// Record a confirmed upload.
    async fn record(&self, entry: CacheEntry) -> Result<(), PlatformError>;

    /// Record the path index of a successfully built manifest.
    async fn record_manifest(&self, manifest: &Manifest) -> Result<(), PlatformError>;
}

/// Process-local cache store.
#[derive(Debug, Default)]
pub struct MemoryCache {
    state: Mutex<CacheSnapshot>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = CacheEntry>) -> Self {
        Self {
            state: Mutex::new(CacheSnapshot::new(entries)),
        }
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.lock().contains(hash)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheSnapshot> {
        // arch-lint: allow(no-silent-result-drop) reason="a poisoned lock still holds a consistent snapshot"
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CacheStore for MemoryCache {
    async fn snapshot(&self) -> Result<CacheSnapshot, PlatformError> {
        Ok(self.lock().clone())
    }

    async fn record(&self, entry: CacheEntry) -> Result<(), PlatformError> {
        tracing::debug!(hash = entry.hash.short(), "recording cache entry");
        self.lock().entries.insert(entry.hash, entry.remote_ref);
        Ok(())
    }

    async fn record_manifest(&self, manifest: &Manifest) -> Result<(), PlatformError> {
        self.lock().previous = Some(manifest.path_index());
        Ok(())
    }
}
