use crate::result::{FailureStage, SyncFailure};
use crate::{Result, SyncError};
use context_vector_store::paths::CONTEXT_DIR_NAME;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 1_048_576; // 1 MB

/// Filters applied on top of .gitignore and the built-in ignored directories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub max_file_size_bytes: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Project-relative, `/`-separated
    pub path: String,
    pub abs_path: PathBuf,
    pub size: u64,
    /// Unix ms, 0 when the platform does not report it
    pub modified_ms: u64,
}

#[derive(Debug, Default)]
pub struct ScanReport {
    /// Sorted by path
    pub files: Vec<ScannedFile>,
    pub errors: Vec<SyncFailure>,
}

/// Compiled include/exclude globs, matched against project-relative paths.
#[derive(Debug, Clone)]
pub struct PathFilters {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl PathFilters {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    pub fn matches(&self, relative: &str) -> bool {
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(relative) {
                return false;
            }
        }
        self.include
            .as_ref()
            .map(|include| include.is_match(relative))
            .unwrap_or(true)
    }
}

fn compile(patterns: &[String]) -> Result<Option<GlobSet>> {
    let patterns: Vec<&str> = patterns
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|err| SyncError::Config(format!("invalid glob '{pattern}': {err}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map(Some)
        .map_err(|err| SyncError::Config(format!("invalid glob set: {err}")))
}

/// Scanner for finding source files in a project
pub struct FileScanner {
    root: PathBuf,
    filters: PathFilters,
    max_file_size_bytes: u64,
}

impl FileScanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            filters: PathFilters {
                include: None,
                exclude: None,
            },
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
        }
    }

    pub fn with_options(root: impl AsRef<Path>, options: &ScanOptions) -> Result<Self> {
        Ok(Self {
            root: root.as_ref().to_path_buf(),
            filters: PathFilters::new(&options.include_patterns, &options.exclude_patterns)?,
            max_file_size_bytes: options.max_file_size_bytes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn filters(&self) -> &PathFilters {
        &self.filters
    }

    /// Scan directory for source files (.gitignore aware).
    ///
    /// Unreadable entries end up in [`ScanReport::errors`] and are not classified.
    pub fn scan(&self) -> ScanReport {
        let mut report = ScanReport::default();

        let root = self.root.clone();
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(true) // hidden files are not synced by default
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .require_git(false);
        builder.filter_entry(move |entry| !FileScanner::is_ignored_scope(entry.path(), &root));

        for result in builder.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("Failed to read entry: {err}");
                    let path = error_path(&err)
                        .map(|p| self.relative(&p).unwrap_or_else(|| p.display().to_string()))
                        .unwrap_or_default();
                    report
                        .errors
                        .push(SyncFailure::new(path, FailureStage::Scan, err.to_string()));
                    continue;
                }
            };
            let Some(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_file() {
                continue;
            }

            let path = entry.path();
            let Some(relative) = self.relative(path) else {
                continue;
            };
            if !self.filters.matches(&relative) {
                continue;
            }
            if Self::is_noise_file(path) || !Self::is_source_file(path) {
                continue;
            }

            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(err) => {
                    log::warn!("Failed to stat {}: {err}", path.display());
                    report
                        .errors
                        .push(SyncFailure::new(relative, FailureStage::Scan, err.to_string()));
                    continue;
                }
            };
            if meta.len() > self.max_file_size_bytes {
                log::debug!(
                    "Skipping large file {} ({} bytes > {})",
                    path.display(),
                    meta.len(),
                    self.max_file_size_bytes
                );
                continue;
            }

            let modified_ms = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            report.files.push(ScannedFile {
                path: relative,
                abs_path: path.to_path_buf(),
                size: meta.len(),
                modified_ms,
            });
        }

        report.files.sort_by(|a, b| a.path.cmp(&b.path));
        log::info!(
            "Found {} source files ({} scan errors)",
            report.files.len(),
            report.errors.len()
        );
        report
    }

    fn relative(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                std::path::Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }

    /// Check if file is a source code file
    fn is_source_file(path: &Path) -> bool {
        if let Some(file_name) = path.file_name().and_then(|name| name.to_str()) {
            if matches!(file_name, "Dockerfile" | "Makefile" | "Justfile" | "Gemfile") {
                return true;
            }
        }

        if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
            let ext = ext.to_lowercase();
            return SUPPORTED_EXTENSIONS
                .iter()
                .any(|candidate| candidate == &ext);
        }

        false
    }

    fn is_ignored_scope(path: &Path, root: &Path) -> bool {
        if let Ok(relative) = path.strip_prefix(root) {
            for component in relative.components() {
                if let std::path::Component::Normal(name) = component {
                    let lowered = name.to_string_lossy().to_lowercase();
                    if lowered == CONTEXT_DIR_NAME
                        || IGNORED_SCOPES.iter().any(|ignored| ignored == &lowered)
                    {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn is_noise_file(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| {
                NOISE_FILE_NAMES
                    .iter()
                    .any(|candidate| name.eq_ignore_ascii_case(candidate))
            })
    }
}

fn error_path(err: &ignore::Error) -> Option<PathBuf> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        ignore::Error::Loop { child, .. } => Some(child.clone()),
        ignore::Error::Partial(errs) => errs.iter().find_map(error_path),
        _ => None,
    }
}

const IGNORED_SCOPES: &[&str] = &[
    // VCS / tooling
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    // dependencies
    "node_modules",
    "vendor",
    "third_party",
    "third-party",
    ".venv",
    "venv",
    "__pycache__",
    // builds
    "build",
    "dist",
    "out",
    "target",
    "coverage",
    ".next",
    ".nuxt",
    ".turbo",
    ".cache",
    ".gradle",
];

const NOISE_FILE_NAMES: &[&str] = &[
    "package-lock.json",
    "pnpm-lock.yaml",
    "yarn.lock",
    "Cargo.lock",
    "poetry.lock",
];

const SUPPORTED_EXTENSIONS: &[&str] = &[
    "rs", "py", "pyw", "js", "mjs", "cjs", "ts", "tsx", "jsx", "java", "kt", "kts", "go", "c",
    "h", "cpp", "cc", "cxx", "hpp", "hh", "hxx", "cs", "rb", "swift", "php", "scala", "dart",
    "lua", "sh", "bash", "zsh", "md", "mdx", "rst", "txt", "yaml", "yml", "json", "toml", "ini",
    "cfg", "gradle", "xml", "html", "css", "scss", "sql", "proto",
];
