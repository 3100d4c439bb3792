//! Local filesystem source.
//!
//! Walks a base directory up front (or loads a single base file),
//! keeping every successful load in a URI table. Later opens are table
//! hits; unknown paths inside the base are read lazily with waiter
//! coalescing. Lookups that escape the base directory are refused
//! unless explicitly allowed.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use regex::Regex;
use tracing::debug;
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::error::Error;
use crate::source::{FileBytes, FileSource, WaiterTable};

/// File extensions a directory walk considers to be documents.
const DOCUMENT_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Configuration for a [`LocalSource`].
#[derive(Debug, Default)]
pub struct LocalSourceConfig {
    /// Base directory (walked eagerly) or single base file. `None` means
    /// purely lazy lookups resolved against the process working directory.
    pub base: Option<PathBuf>,
    /// Permit opens that resolve outside the base directory.
    pub allow_escape: bool,
    /// Filename globs (`*` wildcard) restricting the walk. Empty loads
    /// every document file.
    pub file_filters: Vec<String>,
}

/// Serves `$ref` targets from the local filesystem.
pub struct LocalSource {
    base: Option<PathBuf>,
    allow_escape: bool,
    files: RwLock<HashMap<PathBuf, FileBytes>>,
    walk_errors: Vec<Error>,
    waiters: WaiterTable,
    reads: AtomicU64,
}

impl LocalSource {
    /// Build the source, walking the base directory if one is configured.
    ///
    /// Unreadable files found during the walk are recorded as per-file
    /// errors (see [`LocalSource::errors`]) without aborting the walk.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the base itself does not exist or cannot
    /// be read.
    pub fn new(config: LocalSourceConfig) -> Result<Self, Error> {
        let filters = compile_filters(&config.file_filters);
        let base = config.base.map(|b| absolute(&b));

        let mut files = HashMap::new();
        let mut walk_errors = Vec::new();

        if let Some(base) = &base {
            let meta = std::fs::metadata(base)?;
            if meta.is_dir() {
                walk_directory(base, &filters, &mut files, &mut walk_errors);
            } else {
                load_file(base, &mut files, &mut walk_errors);
            }
        }

        let waiters = WaiterTable::new();
        for (path, bytes) in &files {
            waiters.seed(&path.to_string_lossy(), FileBytes::clone(bytes));
        }
        let walked = files.len() as u64;

        Ok(Self {
            base,
            allow_escape: config.allow_escape,
            files: RwLock::new(files),
            walk_errors,
            waiters,
            reads: AtomicU64::new(walked),
        })
    }

    /// Every file loaded so far, keyed by absolute path.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.files.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Per-file errors recorded during the construction walk.
    pub fn errors(&self) -> &[Error] {
        &self.walk_errors
    }

    /// How many underlying filesystem reads have happened. The walk
    /// counts one read per loaded file; coalesced opens count once.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Resolve `uri` to an absolute, lexically normalized path.
    fn resolve(&self, uri: &str) -> PathBuf {
        let path = Path::new(uri);
        if path.is_absolute() {
            return normalize_path(path);
        }
        match &self.base {
            Some(base) if base.is_file() => {
                let dir = base.parent().unwrap_or(Path::new(""));
                normalize_path(&dir.join(path))
            }
            Some(base) => normalize_path(&base.join(path)),
            None => absolute(path),
        }
    }

    fn base_dir(&self) -> Option<&Path> {
        let base = self.base.as_deref()?;
        if base.is_file() {
            base.parent()
        } else {
            Some(base)
        }
    }
}

impl FileSource for LocalSource {
    fn open(&self, uri: &str, cancel: &CancelToken) -> Result<FileBytes, Error> {
        cancel.ensure_live()?;
        let path = self.resolve(uri);

        if let Some(bytes) = self.files.read().get(&path) {
            return Ok(FileBytes::clone(bytes));
        }

        if !self.allow_escape {
            if let Some(base) = self.base_dir() {
                if !path.starts_with(base) {
                    return Err(Error::OutsideBase { path });
                }
            }
        }

        debug!(uri, path = %path.display(), "local lazy load");
        let key = path.to_string_lossy().to_string();
        let bytes = self.waiters.fetch_coalesced(&key, cancel, || {
            self.reads.fetch_add(1, Ordering::SeqCst);
            std::fs::read(&path)
                .map(FileBytes::new)
                .map_err(|e| Error::Fetch {
                    uri: key.clone(),
                    reason: e.to_string(),
                })
        })?;

        self.files.write().entry(path).or_insert_with(|| FileBytes::clone(&bytes));
        Ok(bytes)
    }
}

/// Walk `base`, loading every document file that passes the filters.
fn walk_directory(
    base: &Path,
    filters: &[Regex],
    files: &mut HashMap<PathBuf, FileBytes>,
    errors: &mut Vec<Error>,
) {
    for entry in WalkDir::new(base)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !DOCUMENT_EXTENSIONS.contains(&ext) {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !filters.is_empty() && !filters.iter().any(|f| f.is_match(&name)) {
            debug!(file = %path.display(), "skipped by file filter");
            continue;
        }
        load_file(path, files, errors);
    }
}

fn load_file(path: &Path, files: &mut HashMap<PathBuf, FileBytes>, errors: &mut Vec<Error>) {
    match std::fs::read(path) {
        Ok(bytes) => {
            files.insert(normalize_path(&absolute(path)), FileBytes::new(bytes));
        }
        Err(e) => errors.push(Error::Fetch {
            uri: path.to_string_lossy().to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Compile `*` filename globs into anchored regexes. Invalid patterns
/// are treated as literal names.
fn compile_filters(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| {
            let escaped = regex::escape(pattern).replace("\\*", ".*");
            Regex::new(&format!("^{escaped}$")).ok()
        })
        .collect()
}

pub(crate) fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize_path(path);
    }
    let cwd = std::env::current_dir().unwrap_or_default();
    normalize_path(&cwd.join(path))
}

/// Collapse `.` and `..` components in a path without touching the
/// filesystem. Preserves leading `..` when there is nothing left to pop.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut components: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(
                    components.last(),
                    Some(c) if !matches!(c, Component::ParentDir | Component::RootDir)
                );
                if can_pop {
                    components.pop();
                } else if !matches!(components.last(), Some(Component::RootDir)) {
                    components.push(component);
                }
            }
            other => components.push(other),
        }
    }
    components.iter().collect()
}
