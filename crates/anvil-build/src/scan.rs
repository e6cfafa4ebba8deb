use std::fs;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};

/// SCM metadata directories that are never deployed.
const SCM_DIRS: &[&str] = &[".git", ".svn", ".hg", ".bzr", "CVS", "_darcs"];

/// Editor and OS droppings that are never deployed.
const SCM_FILES: &[&str] = &[".DS_Store", ".cvsignore", ".gitignore~"];

/// `*` stays within one path segment; `**` crosses segments. Dotfiles match.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Include/exclude glob filter over `/`-separated relative paths.
///
/// Both lists are comma-separated. A pattern ending in `/` matches everything
/// below that directory, and a leading `**/` also matches at the top level.
/// An empty include list matches every file.
#[derive(Debug, Clone)]
pub struct GlobFilter {
    includes: Vec<CompiledPattern>,
    excludes: Vec<CompiledPattern>,
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    variants: Vec<Pattern>,
}

impl CompiledPattern {
    fn compile(raw: &str) -> Result<Self, ScanError> {
        let mut normalized = raw.replace('\\', "/");
        if let Some(stripped) = normalized.strip_prefix("./") {
            normalized = stripped.to_owned();
        }
        let normalized = normalized.trim_start_matches('/');
        let mut normalized = normalized.to_owned();
        if normalized.ends_with('/') {
            normalized.push_str("**");
        }

        let mut sources = vec![normalized.clone()];
        if let Some(rest) = normalized.strip_prefix("**/") {
            sources.push(rest.to_owned());
        }

        let variants = sources
            .iter()
            .map(|s| {
                Pattern::new(s).map_err(|e| ScanError::Pattern {
                    pattern: raw.to_owned(),
                    source: e,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { variants })
    }

    fn matches(&self, relative: &str) -> bool {
        self.variants
            .iter()
            .any(|p| p.matches_with(relative, MATCH_OPTIONS))
    }
}

impl GlobFilter {
    pub fn new(includes: &str, excludes: &str) -> Result<Self, ScanError> {
        Ok(Self {
            includes: compile_list(includes)?,
            excludes: compile_list(excludes)?,
        })
    }

    /// Filter that accepts every file.
    pub fn all() -> Self {
        Self {
            includes: Vec::new(),
            excludes: Vec::new(),
        }
    }

    pub fn matches(&self, relative: &str) -> bool {
        let included = self.includes.is_empty() || self.includes.iter().any(|p| p.matches(relative));
        included && !self.excludes.iter().any(|p| p.matches(relative))
    }
}

fn compile_list(list: &str) -> Result<Vec<CompiledPattern>, ScanError> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(CompiledPattern::compile)
        .collect()
}

/// A regular file selected for deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Path relative to the scan root, `/`-separated.
    pub relative: String,
    pub path: PathBuf,
}

/// Enumerate regular files under `base` accepted by `filter`, sorted by
/// relative path.
///
/// Directories are descended but never listed; symlinks are skipped.
pub fn scan(base: &Path, filter: &GlobFilter) -> Result<Vec<ScannedFile>, ScanError> {
    let meta = fs::metadata(base).map_err(|e| ScanError::BaseDir {
        path: base.to_path_buf(),
        source: e,
    })?;
    if !meta.is_dir() {
        return Err(ScanError::BaseDir {
            path: base.to_path_buf(),
            source: std::io::Error::other("not a directory"),
        });
    }

    let mut files = Vec::new();
    walk(base, "", filter, &mut files)?;
    files.sort_by(|a, b| a.relative.cmp(&b.relative));

    tracing::debug!(base = %base.display(), files = files.len(), "scan complete");
    Ok(files)
}

fn walk(
    dir: &Path,
    prefix: &str,
    filter: &GlobFilter,
    out: &mut Vec<ScannedFile>,
) -> Result<(), ScanError> {
    let read_err = |e| ScanError::ReadDir {
        path: dir.to_path_buf(),
        source: e,
    };

    for entry in fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let file_type = entry.file_type().map_err(read_err)?;
        let path = entry.path();

        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            return Err(ScanError::NonUtf8Path(path));
        };
        let relative = if prefix.is_empty() {
            name.to_owned()
        } else {
            format!("{prefix}/{name}")
        };

        if file_type.is_symlink() {
            tracing::debug!(path = %relative, "skipping symlink");
        } else if file_type.is_dir() {
            if !SCM_DIRS.contains(&name) {
                walk(&path, &relative, filter, out)?;
            }
        } else if file_type.is_file() && !SCM_FILES.contains(&name) && filter.matches(&relative) {
            out.push(ScannedFile { relative, path });
        }
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("invalid glob pattern {pattern:?}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },

    #[error("base directory {path} is not readable")]
    BaseDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read directory {path}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read file {path}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    #[error("invalid manifest")]
    Manifest {
        #[from]
        source: anvil_core::Error,
    },
}
