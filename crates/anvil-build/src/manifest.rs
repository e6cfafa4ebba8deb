use std::path::Path;

use anvil_core::{Event, EventBus, FileEntry, Manifest};

use crate::hash::hash_file;
use crate::scan::{GlobFilter, ScanError, scan};

/// Scan `base`, announce the file count, then fingerprint every selected file.
///
/// `diff-start` is emitted once the file set is known and before any file
/// is read.
pub fn build_manifest(
    base: &Path,
    filter: &GlobFilter,
    bus: &EventBus,
) -> Result<Manifest, ScanError> {
    let files = scan(base, filter)?;
    bus.emit(Event::DiffStart {
        total_files: files.len(),
    });

    let entries = files
        .into_iter()
        .map(|file| {
            let (hash, size) = hash_file(&file.path).map_err(|e| ScanError::ReadFile {
                path: file.path.clone(),
                source: e,
            })?;
            tracing::trace!(path = %file.relative, hash = %hash.short(), size, "fingerprinted");
            Ok(FileEntry {
                path: file.relative,
                hash,
                size,
            })
        })
        .collect::<Result<Vec<_>, ScanError>>()?;

    let manifest = Manifest::new(base, entries)?;
    tracing::info!(
        files = manifest.len(),
        bytes = manifest.total_size(),
        unique = manifest.unique_hashes(),
        "manifest built",
    );
    Ok(manifest)
}
