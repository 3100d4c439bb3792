//! The rolodex: one root index plus every external index the reference
//! graph pulls in, together with the file sources that feed them.
//!
//! External files are indexed lazily, the first time a reference lands
//! on them. A file URI resolves to at most one index across the whole
//! rolodex; the sources' per-URI waiter coalescing keeps duplicate
//! fetches out when callers race.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;
use url::Url;

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::Error;
use crate::index::{split_reference, Index};
use crate::local::{normalize_path, LocalSource};
use crate::node::{NodeId, Tree};
use crate::remote::RemoteSource;
use crate::resolver;
use crate::source::{FileBytes, FileSource};

/// Aggregates the root index, external indexes, and file sources.
pub struct Rolodex {
    config: Config,
    local: Option<Arc<LocalSource>>,
    remote: Option<Arc<RemoteSource>>,
    root: Option<Index>,
    externals: IndexMap<String, Index>,
    preserve: HashSet<String>,
}

impl Rolodex {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            local: None,
            remote: None,
            root: None,
            externals: IndexMap::new(),
            preserve: HashSet::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Attach the local filesystem source used for file-scheme lookups.
    pub fn add_local_source(&mut self, source: Arc<LocalSource>) {
        self.local = Some(source);
    }

    /// Attach the remote source used for http(s) lookups.
    pub fn add_remote_source(&mut self, source: Arc<RemoteSource>) {
        self.remote = Some(source);
    }

    /// Install the root document, building its index.
    pub fn set_root(&mut self, uri: String, tree: Tree) {
        self.root = Some(Index::new(uri, tree, &self.config));
    }

    pub fn root_index(&self) -> Option<&Index> {
        self.root.as_ref()
    }

    pub(crate) fn root_index_mut(&mut self) -> Option<&mut Index> {
        self.root.as_mut()
    }

    /// External indexes in first-seen order.
    pub fn externals(&self) -> impl Iterator<Item = &Index> {
        self.externals.values()
    }

    pub(crate) fn external_uris(&self) -> Vec<String> {
        self.externals.keys().cloned().collect()
    }

    /// The index owning `uri`, root included.
    pub fn index_for(&self, uri: &str) -> Option<&Index> {
        if self.root.as_ref().is_some_and(|r| r.uri() == uri) {
            return self.root.as_ref();
        }
        self.externals.get(uri)
    }

    pub(crate) fn index_for_mut(&mut self, uri: &str) -> Option<&mut Index> {
        if self.root.as_ref().is_some_and(|r| r.uri() == uri) {
            return self.root.as_mut();
        }
        self.externals.get_mut(uri)
    }

    /// Raw byte access through whichever source owns the scheme.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedScheme` when the scheme is gated off or
    /// no matching source is attached, otherwise whatever the source
    /// reports.
    pub fn open(&self, uri: &str, cancel: &CancelToken) -> Result<FileBytes, Error> {
        if is_remote(uri) {
            if !self.config.allow_remote_lookup {
                return Err(Error::UnsupportedScheme {
                    uri: uri.to_string(),
                });
            }
            let source = self.remote.as_ref().ok_or_else(|| Error::UnsupportedScheme {
                uri: uri.to_string(),
            })?;
            return source.open(uri, cancel);
        }

        if !self.config.allow_file_lookup {
            return Err(Error::UnsupportedScheme {
                uri: uri.to_string(),
            });
        }
        let source = self.local.as_ref().ok_or_else(|| Error::UnsupportedScheme {
            uri: uri.to_string(),
        })?;
        source.open(uri, cancel)
    }

    /// Make sure an index exists for the external file at `uri`,
    /// fetching, parsing, and indexing it on first sight.
    ///
    /// # Errors
    ///
    /// Propagates fetch errors and reports unparseable externals as
    /// `Error::InvalidModel`.
    pub(crate) fn ensure_external(&mut self, uri: &str, cancel: &CancelToken) -> Result<(), Error> {
        cancel.ensure_live()?;
        if self.index_for(uri).is_some() {
            return Ok(());
        }

        debug!(uri, "indexing external file");
        let bytes = self.open(uri, cancel)?;
        let tree = Tree::parse(&bytes).map_err(|e| Error::InvalidModel {
            reason: format!("{uri}: {e}"),
        })?;
        let index = Index::new(uri.to_string(), tree, &self.config);
        self.externals.insert(uri.to_string(), index);
        Ok(())
    }

    /// Resolve resolution across every known index: walk the reference
    /// graph from the root, annotate mapped references, record circular
    /// chains, and collect the discriminator preserve set.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` if the token fires and
    /// `Error::InvalidModel` when no root has been installed. Per-site
    /// failures are accumulated on their owning indexes instead.
    pub fn index_the_rolodex(&mut self, cancel: &CancelToken) -> Result<(), Error> {
        if self.root.is_none() {
            return Err(Error::InvalidModel {
                reason: "rolodex has no root document".to_string(),
            });
        }
        resolver::resolve(self, cancel)
    }

    /// Locate a reference literal written in the file at `owner_uri`:
    /// the absolute definition, the owning index's URI, and the target
    /// node. Used for discriminator pinning, where values arrive as raw
    /// literals rather than indexed sites.
    pub fn search_reference(
        &self,
        owner_uri: &str,
        literal: &str,
    ) -> Option<(String, String, NodeId)> {
        let (file_part, fragment) = split_reference(literal);
        let target_uri = if file_part.is_empty() {
            owner_uri.to_string()
        } else {
            resolve_file_uri(owner_uri, &file_part)
        };
        let index = self.index_for(&target_uri)?;
        let node = index.find_component(&fragment)?;
        Some((format!("{target_uri}#{fragment}"), target_uri, node))
    }

    /// Absolute definitions pinned by discriminators; the bundler must
    /// not inline these.
    pub fn preserve_set(&self) -> &HashSet<String> {
        &self.preserve
    }

    pub(crate) fn set_preserve(&mut self, preserve: HashSet<String>) {
        self.preserve = preserve;
    }

    /// Every index error across the rolodex, root first, drained into
    /// one list for the bundler's joined report.
    pub(crate) fn collected_errors(&mut self) -> Vec<Error> {
        let mut out = Vec::new();
        if let Some(root) = self.root.as_mut() {
            out.append(&mut root.drain_errors());
        }
        for index in self.externals.values_mut() {
            out.append(&mut index.drain_errors());
        }
        out
    }
}

/// True for http(s) URIs; everything else is a filesystem path.
pub(crate) fn is_remote(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

/// Canonicalize a reference's file part against the URI of the file it
/// was written in. Remote owners join per RFC 3986; filesystem owners
/// join lexically and collapse dot segments.
pub(crate) fn resolve_file_uri(owner: &str, file_part: &str) -> String {
    if is_remote(file_part) {
        return file_part.to_string();
    }
    if is_remote(owner) {
        if let Ok(base) = Url::parse(owner) {
            if let Ok(joined) = base.join(file_part) {
                return joined.to_string();
            }
        }
        return file_part.to_string();
    }

    let path = Path::new(file_part);
    if path.is_absolute() {
        return normalize_path(path).to_string_lossy().into_owned();
    }
    let dir = Path::new(owner).parent().unwrap_or_else(|| Path::new(""));
    normalize_path(&dir.join(path)).to_string_lossy().into_owned()
}
