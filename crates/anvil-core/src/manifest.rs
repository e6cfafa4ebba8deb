use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Hex-encoded SHA-256 digest of a file's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log output.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A regular file in the deployment, identified by its path relative to the
/// manifest root (always `/`-separated).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub hash: ContentHash,
    pub size: u64,
}

/// Canonical, hashed listing of the files to deploy.
///
/// Entries are sorted by path and paths are unique. A manifest is built fresh
/// for every deployment attempt and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    root: PathBuf,
    entries: Vec<FileEntry>,
}

impl Manifest {
    pub fn new(root: impl Into<PathBuf>, mut entries: Vec<FileEntry>) -> Result<Self> {
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        if let Some(dup) = entries.windows(2).find(|w| w[0].path == w[1].path) {
            return Err(Error::DuplicateManifestPath {
                path: dup[0].path.clone(),
            });
        }
        Ok(Self {
            root: root.into(),
            entries,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        let idx = self.entries.partition_point(|e| e.path.as_str() < path);
        self.entries.get(idx).filter(|e| e.path == path)
    }

    /// Location of an entry on the local filesystem.
    pub fn absolute_path(&self, entry: &FileEntry) -> PathBuf {
        entry
            .path
            .split('/')
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }

    /// Number of distinct contents in the manifest.
    pub fn unique_hashes(&self) -> usize {
        self.entries
            .iter()
            .map(|e| &e.hash)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Path → hash view, as recorded for the next deployment's diff.
    pub fn path_index(&self) -> BTreeMap<String, ContentHash> {
        self.entries
            .iter()
            .map(|e| (e.path.clone(), e.hash.clone()))
            .collect()
    }
}
