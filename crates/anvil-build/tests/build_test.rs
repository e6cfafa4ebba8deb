use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anvil_build::archive::format_megabytes;
use anvil_build::hash::{hash_bytes, hash_file};
use anvil_build::{FileStatus, GlobFilter, ScanError, build_manifest, diff, scan, stage_archive};
use anvil_core::{CacheEntry, CacheSnapshot, ContentHash, Event, EventBus, EventKind};
use tempfile::TempDir;

const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

fn write(dir: &Path, relative: &str, content: &str) {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// A small Rack-style app with some SCM noise.
fn sample_workspace() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "Procfile", "web: bundle exec rackup");
    write(root, "config.ru", "run App");
    write(root, "app/app.rb", "class App; end");
    write(root, "app/views/index.erb", "<h1>hi</h1>");
    write(root, "log/dev.log", "noise");
    write(root, ".git/HEAD", "ref: refs/heads/main");
    write(root, "app/.DS_Store", "junk");
    tmp
}

fn relative_paths(base: &Path, filter: &GlobFilter) -> Vec<String> {
    scan(base, filter)
        .unwrap()
        .into_iter()
        .map(|f| f.relative)
        .collect()
}

// ── Glob filter ──

#[test]
fn double_star_includes_everything() {
    let filter = GlobFilter::new("**", "").unwrap();
    assert!(filter.matches("Procfile"));
    assert!(filter.matches("app/views/index.erb"));
}

#[test]
fn single_star_stays_in_one_segment() {
    let filter = GlobFilter::new("*.rb", "").unwrap();
    assert!(filter.matches("app.rb"));
    assert!(!filter.matches("lib/app.rb"));
}

#[test]
fn leading_double_star_matches_top_level() {
    let filter = GlobFilter::new("**/*.rb", "").unwrap();
    assert!(filter.matches("app.rb"));
    assert!(filter.matches("lib/deep/app.rb"));
    assert!(!filter.matches("lib/app.erb"));
}

#[test]
fn trailing_slash_means_whole_directory() {
    let filter = GlobFilter::new("**", "log/, tmp/").unwrap();
    assert!(!filter.matches("log/dev.log"));
    assert!(!filter.matches("tmp/cache/x"));
    assert!(filter.matches("logger.rb"));
}

#[test]
fn excludes_win_over_includes() {
    let filter = GlobFilter::new("app/**, Procfile", "**/*.erb").unwrap();
    assert!(filter.matches("Procfile"));
    assert!(filter.matches("app/app.rb"));
    assert!(!filter.matches("app/views/index.erb"));
    assert!(!filter.matches("config.ru"));
}

#[test]
fn empty_include_list_matches_all() {
    let filter = GlobFilter::new("", " , ").unwrap();
    assert!(filter.matches("anything/at/all"));
}

#[test]
fn invalid_pattern_is_reported() {
    let err = GlobFilter::new("[", "").unwrap_err();
    assert!(matches!(err, ScanError::Pattern { ref pattern, .. } if pattern == "["));
}

// ── Scanning ──

#[test]
fn scan_lists_sorted_regular_files_without_scm_metadata() {
    let tmp = sample_workspace();
    let paths = relative_paths(tmp.path(), &GlobFilter::all());
    assert_eq!(
        paths,
        vec![
            "Procfile",
            "app/app.rb",
            "app/views/index.erb",
            "config.ru",
            "log/dev.log",
        ]
    );
}

#[test]
fn scan_applies_filter() {
    let tmp = sample_workspace();
    let filter = GlobFilter::new("**", "log/").unwrap();
    let paths = relative_paths(tmp.path(), &filter);
    assert!(!paths.iter().any(|p| p.starts_with("log/")));
    assert_eq!(paths.len(), 4);
}

#[cfg(unix)]
#[test]
fn scan_skips_symlinks() {
    let tmp = sample_workspace();
    std::os::unix::fs::symlink(tmp.path().join("Procfile"), tmp.path().join("link")).unwrap();
    let paths = relative_paths(tmp.path(), &GlobFilter::all());
    assert!(!paths.contains(&"link".to_owned()));
}

#[test]
fn scan_rejects_missing_base_dir() {
    let tmp = TempDir::new().unwrap();
    let err = scan(&tmp.path().join("nope"), &GlobFilter::all()).unwrap_err();
    assert!(matches!(err, ScanError::BaseDir { .. }));
}

#[test]
fn scan_rejects_file_as_base_dir() {
    let tmp = sample_workspace();
    let err = scan(&tmp.path().join("Procfile"), &GlobFilter::all()).unwrap_err();
    assert!(matches!(err, ScanError::BaseDir { .. }));
}

// ── Hashing ──

#[test]
fn hashes_are_sha256_hex() {
    assert_eq!(hash_bytes(b"hello").as_str(), HELLO_SHA256);

    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "greeting", "hello");
    let (hash, size) = hash_file(&tmp.path().join("greeting")).unwrap();
    assert_eq!(hash.as_str(), HELLO_SHA256);
    assert_eq!(size, 5);
}

// ── Manifest ──

#[test]
fn manifest_emits_diff_start_with_file_count() {
    let tmp = sample_workspace();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let bus = EventBus::new().subscribe(EventKind::DiffStart, move |e| {
        if let Event::DiffStart { total_files } = e {
            sink.lock().unwrap().push(*total_files);
        }
    });

    let manifest = build_manifest(tmp.path(), &GlobFilter::all(), &bus).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![5]);
    assert_eq!(manifest.len(), 5);
    assert_eq!(manifest.get("Procfile").unwrap().size, 23);
}

#[test]
fn identical_content_shares_a_hash() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a.txt", "same");
    write(tmp.path(), "b/c.txt", "same");

    let manifest = build_manifest(tmp.path(), &GlobFilter::all(), &EventBus::new()).unwrap();

    assert_eq!(
        manifest.get("a.txt").unwrap().hash,
        manifest.get("b/c.txt").unwrap().hash
    );
    assert_eq!(manifest.unique_hashes(), 1);
}

#[test]
fn empty_workspace_yields_empty_manifest() {
    let tmp = TempDir::new().unwrap();
    let manifest = build_manifest(tmp.path(), &GlobFilter::all(), &EventBus::new()).unwrap();
    assert!(manifest.is_empty());
}

// ── Diff ──

fn cached(hashes: &[&ContentHash]) -> CacheSnapshot {
    CacheSnapshot::new(hashes.iter().map(|h| CacheEntry {
        hash: (*h).clone(),
        remote_ref: format!("blob://{h}"),
    }))
}

#[test]
fn diff_against_empty_cache_marks_everything_new() {
    let tmp = sample_workspace();
    let manifest = build_manifest(tmp.path(), &GlobFilter::all(), &EventBus::new()).unwrap();

    let result = diff(&manifest, &CacheSnapshot::default());

    assert_eq!(result.total(), 5);
    assert_eq!(result.count(FileStatus::New), 5);
    assert_eq!(result.upload_count(), 5);
    assert!(!result.is_clean());
}

#[test]
fn diff_against_full_cache_is_clean() {
    let tmp = sample_workspace();
    let manifest = build_manifest(tmp.path(), &GlobFilter::all(), &EventBus::new()).unwrap();
    let hashes: Vec<_> = manifest.entries().iter().map(|e| &e.hash).collect();

    let result = diff(&manifest, &cached(&hashes));

    assert!(result.is_clean());
    assert_eq!(result.count(FileStatus::Unchanged), 5);
    assert_eq!(result.upload_count(), 0);
}

#[test]
fn diff_detects_modified_and_removed_paths() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "keep", "unchanged");
    write(tmp.path(), "edit", "version 2");
    write(tmp.path(), "fresh", "brand new");
    let manifest = build_manifest(tmp.path(), &GlobFilter::all(), &EventBus::new()).unwrap();

    let keep = hash_bytes(b"unchanged");
    let previous: BTreeMap<String, ContentHash> = [
        ("keep".to_owned(), keep.clone()),
        ("edit".to_owned(), hash_bytes(b"version 1")),
        ("gone".to_owned(), hash_bytes(b"deleted")),
    ]
    .into_iter()
    .collect();
    let snapshot = cached(&[&keep]).with_previous(previous);

    let result = diff(&manifest, &snapshot);
    let status = |path: &str| {
        result
            .files()
            .iter()
            .find(|f| f.entry.path == path)
            .map(|f| f.status)
    };

    assert_eq!(status("keep"), Some(FileStatus::Unchanged));
    assert_eq!(status("edit"), Some(FileStatus::Modified));
    assert_eq!(status("fresh"), Some(FileStatus::New));
    assert_eq!(result.removed(), ["gone".to_owned()]);
}

#[test]
fn cached_content_is_unchanged_at_any_path() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "moved/here.txt", "content");
    let manifest = build_manifest(tmp.path(), &GlobFilter::all(), &EventBus::new()).unwrap();

    let result = diff(&manifest, &cached(&[&hash_bytes(b"content")]));

    assert!(result.is_clean());
}

#[test]
fn upload_set_deduplicates_by_content() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a/x", "dup");
    write(tmp.path(), "b/y", "dup");
    write(tmp.path(), "c", "unique");
    let manifest = build_manifest(tmp.path(), &GlobFilter::all(), &EventBus::new()).unwrap();

    let result = diff(&manifest, &CacheSnapshot::default());
    let uploads: Vec<_> = result.upload_set().iter().map(|e| e.path.as_str()).collect();

    assert_eq!(result.pending().count(), 3);
    assert_eq!(uploads, vec!["a/x", "c"]);
}

// ── Archive ──

#[test]
fn archive_contains_filtered_files_and_cleans_up() {
    let tmp = sample_workspace();
    let filter = GlobFilter::new("**", "log/").unwrap();

    let staged = stage_archive(tmp.path(), &filter).unwrap();
    let archive_path = staged.path().to_path_buf();
    assert!(archive_path.exists());
    assert_eq!(staged.file_count(), 4);
    assert!(staged.size() > 0);

    let file = fs::File::open(&archive_path).unwrap();
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
    let mut names: Vec<String> = archive
        .entries()
        .unwrap()
        .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec!["Procfile", "app/app.rb", "app/views/index.erb", "config.ru"]
    );

    staged.close().unwrap();
    assert!(!archive_path.exists());
}

#[test]
fn dropping_archive_removes_it() {
    let tmp = sample_workspace();
    let staged = stage_archive(tmp.path(), &GlobFilter::all()).unwrap();
    let archive_path = staged.path().to_path_buf();
    drop(staged);
    assert!(!archive_path.exists());
}

#[test]
fn megabytes_use_at_most_two_decimals() {
    assert_eq!(format_megabytes(0), "0");
    assert_eq!(format_megabytes(1024 * 1024), "1");
    assert_eq!(format_megabytes(1024 * 1024 * 3 / 2), "1.5");
    assert_eq!(format_megabytes(1_234_567), "1.18");
}
