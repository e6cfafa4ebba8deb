//! Workspace scanning, manifest building, cache diffing, and archive staging.
//!
//! # Incremental deploy front half
//!
//! ```text
//! anvil push
//!   1. Filter   ── GlobFilter::new(includes, excludes)
//!   2. Scan     ── regular files under base dir (symlinks, SCM metadata skipped)
//!   3. Manifest ── SHA-256 per file, emits diff-start first
//!   4. Diff     ── classify against the cache snapshot
//! ```
//!
//! Uploading, building, and releasing live in the `anvil` crate.

pub mod archive;
pub mod diff;
pub mod hash;
pub mod manifest;
pub mod scan;

pub use archive::{ArchiveError, StagedArchive, stage_archive};
pub use diff::{ClassifiedFile, DiffResult, FileStatus, diff};
pub use manifest::build_manifest;
pub use scan::{GlobFilter, ScanError, ScannedFile, scan};
