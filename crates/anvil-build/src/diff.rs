//! Classify manifest entries against a cache snapshot.
//!
//! Identity is content-addressed: a file whose hash is already cached is
//! unchanged wherever it lives. Uncached content is `Modified` when the path
//! appeared in the previously deployed manifest with different content, and
//! `New` otherwise.

use std::collections::BTreeMap;

use anvil_core::{CacheSnapshot, ContentHash, FileEntry, Manifest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStatus {
    Unchanged,
    New,
    Modified,
}

impl FileStatus {
    /// Whether the file's content must be uploaded.
    pub fn needs_upload(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFile {
    pub entry: FileEntry,
    pub status: FileStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    files: Vec<ClassifiedFile>,
    removed: Vec<String>,
}

impl DiffResult {
    /// Every manifest entry with its classification, in path order.
    pub fn files(&self) -> &[ClassifiedFile] {
        &self.files
    }

    pub fn total(&self) -> usize {
        self.files.len()
    }

    pub fn count(&self, status: FileStatus) -> usize {
        self.files.iter().filter(|f| f.status == status).count()
    }

    /// Entries whose content is missing from the cache.
    pub fn pending(&self) -> impl Iterator<Item = &FileEntry> {
        self.files
            .iter()
            .filter(|f| f.status.needs_upload())
            .map(|f| &f.entry)
    }

    /// One entry per distinct pending hash, in path order.
    ///
    /// When several paths share content the first path carries the upload.
    pub fn upload_set(&self) -> Vec<&FileEntry> {
        let mut by_hash: BTreeMap<&ContentHash, &FileEntry> = BTreeMap::new();
        for entry in self.pending() {
            by_hash.entry(&entry.hash).or_insert(entry);
        }
        let mut set: Vec<_> = by_hash.into_values().collect();
        set.sort_by(|a, b| a.path.cmp(&b.path));
        set
    }

    pub fn upload_count(&self) -> usize {
        self.upload_set().len()
    }

    /// Paths in the previous deployment that no longer exist.
    pub fn removed(&self) -> &[String] {
        &self.removed
    }

    /// Nothing to upload.
    pub fn is_clean(&self) -> bool {
        self.files.iter().all(|f| !f.status.needs_upload())
    }
}

pub fn diff(manifest: &Manifest, snapshot: &CacheSnapshot) -> DiffResult {
    let previous = snapshot.previous();

    let files = manifest
        .entries()
        .iter()
        .map(|entry| {
            let status = if snapshot.contains(&entry.hash) {
                FileStatus::Unchanged
            } else {
                match previous.and_then(|p| p.get(&entry.path)) {
                    Some(old) if *old != entry.hash => FileStatus::Modified,
                    _ => FileStatus::New,
                }
            };
            ClassifiedFile {
                entry: entry.clone(),
                status,
            }
        })
        .collect();

    let removed = previous
        .map(|p| {
            p.keys()
                .filter(|path| manifest.get(path).is_none())
                .cloned()
                .collect()
        })
        // arch-lint: allow(no-silent-result-drop) reason="Option: no previous manifest means nothing was removed"
        .unwrap_or_default();

    let result = DiffResult { files, removed };
    tracing::debug!(
        total = result.total(),
        unchanged = result.count(FileStatus::Unchanged),
        new = result.count(FileStatus::New),
        modified = result.count(FileStatus::Modified),
        removed = result.removed.len(),
        "diff computed",
    );
    result
}
