//! Whole-workspace tarball for archive deploys.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

use crate::scan::{GlobFilter, ScanError, scan};

const ARCHIVE_NAME: &str = "workspace.tar.gz";

/// A gzipped tarball in a private temporary directory.
///
/// The directory and archive are removed when this value is dropped or
/// [`close`](Self::close)d, on success and failure alike.
#[derive(Debug)]
pub struct StagedArchive {
    dir: TempDir,
    path: PathBuf,
    size: u64,
    file_count: usize,
}

impl StagedArchive {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn file_count(&self) -> usize {
        self.file_count
    }

    /// Size in megabytes with at most two decimals, e.g. `1.5` or `12`.
    pub fn size_mb(&self) -> String {
        format_megabytes(self.size)
    }

    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}

pub fn format_megabytes(bytes: u64) -> String {
    let mb = bytes as f64 / (1024.0 * 1024.0);
    let fixed = format!("{mb:.2}");
    fixed.trim_end_matches('0').trim_end_matches('.').to_owned()
}

/// Bundle every file under `base` accepted by `filter` into a tar.gz.
pub fn stage_archive(base: &Path, filter: &GlobFilter) -> Result<StagedArchive, ArchiveError> {
    let files = scan(base, filter)?;

    let dir = tempfile::Builder::new()
        .prefix("anvil-archive")
        .tempdir()
        .map_err(|e| ArchiveError::Stage { source: e })?;
    let path = dir.path().join(ARCHIVE_NAME);

    let file = File::create(&path).map_err(|e| ArchiveError::Stage { source: e })?;
    let mut tar = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    tar.follow_symlinks(false);

    for f in &files {
        tar.append_path_with_name(&f.path, &f.relative)
            .map_err(|e| ArchiveError::Append {
                path: f.relative.clone(),
                source: e,
            })?;
    }

    tar.into_inner()
        .and_then(GzEncoder::finish)
        .map_err(|e| ArchiveError::Stage { source: e })?;

    let size = std::fs::metadata(&path)
        .map_err(|e| ArchiveError::Stage { source: e })?
        .len();

    tracing::info!(files = files.len(), bytes = size, "workspace archive staged");
    Ok(StagedArchive {
        dir,
        path,
        size,
        file_count: files.len(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("failed to stage workspace archive")]
    Stage { source: io::Error },

    #[error("failed to add {path} to archive")]
    Append { path: String, source: io::Error },
}
