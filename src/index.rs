//! Per-file document index.
//!
//! One index belongs to exactly one file. A single structural walk over
//! the parsed tree records every reference site in source order, every
//! named component under `#/components/<kind>/<name>`, and every
//! discriminated union. The resolver later annotates sites with their
//! mapped references; the index is read-only after that.

use std::collections::HashMap;

use crate::config::Config;
use crate::error::Error;
use crate::node::{NodeId, NodeKind, Tree};
use crate::rolodex::resolve_file_uri;
use crate::types::{CircularChain, ComponentKind, MappedRef, RefSite};

/// The parsed and annotated representation of one file.
pub struct Index {
    uri: String,
    tree: Tree,
    refs: Vec<RefSite>,
    ref_by_node: HashMap<NodeId, usize>,
    components: HashMap<String, NodeId>,
    discriminators: Vec<NodeId>,
    mapped: HashMap<String, MappedRef>,
    errors: Vec<Error>,
    circular_chains: Vec<CircularChain>,
}

impl Index {
    /// Build an index for the file at `uri` from its parsed tree.
    ///
    /// Reference sites are recorded unconditionally; named-component
    /// enumeration is skipped when `avoid_build_index` is set. Duplicate
    /// component definitions within the file are recorded as errors, not
    /// returned: indexing always produces a usable index.
    pub fn new(uri: String, tree: Tree, config: &Config) -> Self {
        let mut index = Self {
            uri,
            tree,
            refs: Vec::new(),
            ref_by_node: HashMap::new(),
            components: HashMap::new(),
            discriminators: Vec::new(),
            mapped: HashMap::new(),
            errors: Vec::new(),
            circular_chains: Vec::new(),
        };
        index.walk();
        if !config.avoid_build_index {
            index.enumerate_components();
        }
        index
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    /// Every reference site in the file, in source order.
    pub fn all_refs(&self) -> &[RefSite] {
        &self.refs
    }

    /// Positions (into `all_refs`) of every site inside the subtree at
    /// `root`, in preorder.
    pub(crate) fn sites_in_subtree(&self, root: NodeId) -> Vec<usize> {
        self.tree
            .descendants(root)
            .into_iter()
            .filter_map(|id| self.ref_by_node.get(&id).copied())
            .collect()
    }

    /// `#/components/<kind>/<name>` pointers to their nodes.
    pub fn components(&self) -> &HashMap<String, NodeId> {
        &self.components
    }

    /// Mapping nodes carrying a `discriminator` beside `oneOf`/`anyOf`.
    pub fn discriminators(&self) -> &[NodeId] {
        &self.discriminators
    }

    /// Mapped references keyed by absolute definition, populated by the
    /// resolver.
    pub fn mapped_references(&self) -> &HashMap<String, MappedRef> {
        &self.mapped
    }

    pub(crate) fn record_mapped(&mut self, absolute: String, mapped: MappedRef) {
        self.mapped.insert(absolute, mapped);
    }

    pub(crate) fn mark_circular(&mut self, absolute: &str) {
        if let Some(mapped) = self.mapped.get_mut(absolute) {
            mapped.circular = true;
        }
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub(crate) fn record_error(&mut self, error: Error) {
        self.errors.push(error);
    }

    /// Hand the accumulated errors to the bundler's joined report,
    /// leaving the index empty. Discovery order is kept.
    pub(crate) fn drain_errors(&mut self) -> Vec<Error> {
        std::mem::take(&mut self.errors)
    }

    /// Circular chains discovered by the resolver. Only the root index
    /// accumulates these.
    pub fn circular_chains(&self) -> &[CircularChain] {
        &self.circular_chains
    }

    pub(crate) fn record_circular(&mut self, chain: CircularChain) {
        self.circular_chains.push(chain);
    }

    /// Resolve a JSON Pointer fragment (with or without the leading `#`)
    /// to a node, unescaping `~1` and `~0` per RFC 6901.
    pub fn find_component(&self, pointer: &str) -> Option<NodeId> {
        let fragment = pointer.strip_prefix('#').unwrap_or(pointer);
        let mut current = self.tree.payload()?;
        for segment in fragment.split('/').filter(|s| !s.is_empty()) {
            let unescaped = segment.replace("~1", "/").replace("~0", "~");
            current = match self.tree.kind(current) {
                NodeKind::Mapping => self.tree.get(current, &unescaped)?,
                NodeKind::Sequence => {
                    let idx: usize = unescaped.parse().ok()?;
                    *self.tree.items(current).get(idx)?
                }
                _ => return None,
            };
        }
        Some(current)
    }

    /// Single structural walk: reference sites in source order, plus
    /// discriminated unions.
    fn walk(&mut self) {
        let Some(payload) = self.tree.payload() else {
            return;
        };
        for id in self.tree.descendants(payload) {
            if self.tree.kind(id) != NodeKind::Mapping {
                continue;
            }
            self.record_site(id);
            let has_union = self.tree.get(id, "oneOf").is_some()
                || self.tree.get(id, "anyOf").is_some();
            if has_union && self.tree.get(id, "discriminator").is_some() {
                self.discriminators.push(id);
            }
        }
        // Preorder gives parent-before-child, which is source order for
        // sites; parents are filled in afterwards from the same walk.
        self.fill_parents(payload);
    }

    fn record_site(&mut self, id: NodeId) {
        let Some(value_node) = self.tree.get(id, "$ref") else {
            return;
        };
        let Some(literal) = self.tree.scalar(value_node) else {
            return;
        };
        let literal = literal.to_string();
        let (file_part, fragment) = split_reference(&literal);
        let absolute = if file_part.is_empty() {
            format!("{}#{fragment}", self.uri)
        } else {
            format!("{}#{fragment}", resolve_file_uri(&self.uri, &file_part))
        };

        self.ref_by_node.insert(id, self.refs.len());
        self.refs.push(RefSite {
            node: id,
            value_node,
            literal,
            file_part,
            fragment,
            absolute,
            parent: None,
        });
    }

    fn fill_parents(&mut self, payload: NodeId) {
        let mut stack = vec![(payload, None::<NodeId>)];
        while let Some((id, parent)) = stack.pop() {
            if let Some(pos) = self.ref_by_node.get(&id) {
                self.refs[*pos].parent = parent;
            }
            for (k, v) in self.tree.pairs(id) {
                stack.push((*v, Some(id)));
                stack.push((*k, Some(id)));
            }
            for item in self.tree.items(id) {
                stack.push((*item, Some(id)));
            }
        }
    }

    /// Record `#/components/<kind>/<name>` for each recognized kind.
    /// A name defined twice within one file is an error.
    fn enumerate_components(&mut self) {
        let Some(payload) = self.tree.payload() else {
            return;
        };
        let Some(components) = self.tree.get(payload, "components") else {
            return;
        };

        for kind in ComponentKind::ALL {
            let Some(section) = self.tree.get(components, kind.key()) else {
                continue;
            };
            // Iterate pairs directly: the parser keeps duplicate keys, so
            // a second definition of the same name is visible here.
            let pairs: Vec<(NodeId, NodeId)> = self.tree.pairs(section).to_vec();
            for (key, value) in pairs {
                let Some(name) = self.tree.scalar(key) else {
                    continue;
                };
                let pointer = format!("#/components/{}/{name}", kind.key());
                if self.components.insert(pointer.clone(), value).is_some() {
                    self.errors.push(Error::DuplicateComponent {
                        pointer,
                        file: self.uri.clone(),
                    });
                }
            }
        }
    }
}

/// Split a `$ref` literal into its file part and JSON Pointer fragment.
/// A missing `#` means the whole target document.
pub(crate) fn split_reference(literal: &str) -> (String, String) {
    match literal.split_once('#') {
        Some((file, fragment)) => (file.to_string(), fragment.to_string()),
        None => (literal.to_string(), String::new()),
    }
}
