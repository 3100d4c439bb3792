//! Bundling: collapse a fully resolved rolodex into one self-contained
//! document.
//!
//! Two modes share the machinery here. *Inline* substitutes each
//! reference site with a copy of its target, leaving discriminator-pinned
//! and circular references as written. *Compose* lifts externally
//! referenced components into the root's `components` section with
//! collision-safe renaming and rewrites every site to the new local
//! pointer. External indexes are processed before the root, sites in
//! source order throughout, so output is deterministic across runs.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::config::{CompositionConfig, Config};
use crate::error::Error;
use crate::local::{LocalSource, LocalSourceConfig};
use crate::node::{NodeId, NodeKind, ScalarStyle, Tree};
use crate::remote::{RemoteSource, RemoteSourceConfig};
use crate::rolodex::Rolodex;
use crate::types::{ComponentKind, MappedRef, RefSite};

/// Give up renaming a colliding component after this many counters.
const RENAME_LIMIT: u32 = 100;

/// A parsed document: the root tree plus the rolodex of every file its
/// reference graph touches, fully resolved and ready to bundle.
pub struct Document {
    rolodex: Rolodex,
    root_uri: String,
}

impl Document {
    /// Parse root bytes, construct file sources from the configuration,
    /// pull in every transitively referenced file, and resolve the
    /// reference graph.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidModel` for unparseable bytes or a non-mapping
    /// root, `Error::Io` when a configured base directory is unusable, and
    /// `Error::Cancelled` if the token fires. Per-reference failures are
    /// recorded on the owning indexes instead and surface when bundling.
    pub fn parse(bytes: &[u8], config: &Config, cancel: &CancelToken) -> Result<Self, Error> {
        cancel.ensure_live()?;
        let tree = Tree::parse(bytes)?;
        let usable = tree
            .payload()
            .is_some_and(|p| tree.kind(p) == NodeKind::Mapping);
        if !usable {
            return Err(Error::InvalidModel {
                reason: "document root is not a mapping".to_string(),
            });
        }

        let mut rolodex = Rolodex::new(config.clone());
        if config.allow_file_lookup {
            let source = LocalSource::new(LocalSourceConfig {
                base: config.base_path.clone(),
                allow_escape: false,
                file_filters: config.file_filters.clone(),
            })?;
            rolodex.add_local_source(Arc::new(source));
        }
        if config.allow_remote_lookup {
            rolodex.add_remote_source(Arc::new(RemoteSource::new(RemoteSourceConfig {
                base_url: config.base_url.clone(),
                ..RemoteSourceConfig::default()
            })));
        }

        let root_uri = root_uri_for(config);
        rolodex.set_root(root_uri.clone(), tree);
        rolodex.index_the_rolodex(cancel)?;

        Ok(Self { rolodex, root_uri })
    }

    pub fn rolodex(&self) -> &Rolodex {
        &self.rolodex
    }

    pub fn root_uri(&self) -> &str {
        &self.root_uri
    }
}

/// Inline-bundle a specification.
///
/// # Errors
///
/// `Error::InvalidModel` and `Error::Cancelled` return immediately.
/// Accumulated per-reference failures return as `Error::Incomplete`
/// carrying the best-effort rendered document.
pub fn bundle_bytes(bytes: &[u8], config: &Config, cancel: &CancelToken) -> Result<Vec<u8>, Error> {
    let mut document = Document::parse(bytes, config, cancel)?;
    bundle_inline(&mut document, cancel)
}

/// Compose-bundle a specification: external components are lifted into
/// the root's components section and every reference is rewritten to
/// its new local pointer.
///
/// # Errors
///
/// As [`bundle_bytes`], plus `Error::CompositionConflict` for an invalid
/// delimiter or renaming-counter exhaustion.
pub fn bundle_bytes_composed(
    bytes: &[u8],
    config: &Config,
    composition: &CompositionConfig,
    cancel: &CancelToken,
) -> Result<Vec<u8>, Error> {
    composition.validate()?;
    let mut document = Document::parse(bytes, config, cancel)?;
    bundle_composed(&mut document, composition, cancel)
}

/// Inline-bundle an already parsed document.
///
/// The document's trees are rewritten in place; callers must not rely on
/// pre-bundle node content afterwards.
///
/// # Errors
///
/// As [`bundle_bytes`].
pub fn bundle_document(document: &mut Document, cancel: &CancelToken) -> Result<Vec<u8>, Error> {
    bundle_inline(document, cancel)
}

// ── Inline mode ───────────────────────────────────────────────────────

fn bundle_inline(document: &mut Document, cancel: &CancelToken) -> Result<Vec<u8>, Error> {
    let root_uri = document.root_uri.clone();
    let mut composer = Composer::new(&CompositionConfig::default());

    let mut order = document.rolodex.external_uris();
    order.push(root_uri.clone());

    for uri in order {
        let is_root = uri == root_uri;
        compact_index(&mut document.rolodex, &uri, &root_uri, is_root, &mut composer, cancel)?;
    }

    composer.apply(&mut document.rolodex)?;
    finish(document)
}

/// Substitute every substitutable reference site in one index.
fn compact_index(
    rolodex: &mut Rolodex,
    uri: &str,
    root_uri: &str,
    is_root: bool,
    composer: &mut Composer,
    cancel: &CancelToken,
) -> Result<(), Error> {
    let sites: Vec<RefSite> = match rolodex.index_for(uri) {
        Some(index) => index.all_refs().to_vec(),
        None => return Ok(()),
    };
    let config = rolodex.config().clone();

    for site in sites {
        cancel.ensure_live()?;
        let mapped = rolodex
            .index_for(uri)
            .and_then(|index| index.mapped_references().get(&site.absolute))
            .cloned();

        // In the root document, references that already point into the
        // root stay valid post-bundle; nothing to do.
        if is_root {
            let local = match &mapped {
                Some(mapped) => mapped.index_uri == root_uri,
                None => site.file_part.is_empty(),
            };
            if local {
                debug!(reference = %site.literal, "skipping local root reference");
                continue;
            }
        }

        if rolodex.preserve_set().contains(&site.absolute) {
            let external = mapped
                .as_ref()
                .is_some_and(|mapped| mapped.index_uri != root_uri);
            if external && config.resolve_discriminator_external_refs {
                if let Some(mapped) = &mapped {
                    let pointer = composer.assign(rolodex, &site.absolute, mapped)?;
                    rewrite_site(rolodex, uri, &site, &pointer);
                    continue;
                }
            }
            debug!(reference = %site.literal, "skipping union type with discriminator mapping");
            continue;
        }

        let Some(mapped) = mapped else {
            // Resolution already recorded the failure for this site.
            continue;
        };

        if mapped.circular {
            warn!(reference = %site.absolute, "skipping circular reference");
            continue;
        }

        // A cross-file target can drag along local references that stay
        // references (circular ones), which dangle once copied here.
        if mapped.index_uri != uri && has_dangling_local_refs(rolodex, uri, &mapped) {
            if config.resolve_recursive_external_schemas {
                let pointer = composer.assign(rolodex, &site.absolute, &mapped)?;
                rewrite_site(rolodex, uri, &site, &pointer);
                continue;
            }
            warn!(
                reference = %site.absolute,
                "inlining a target with unresolved local references; the copy will dangle"
            );
        }

        inline_site(rolodex, uri, &site, &mapped);
    }
    Ok(())
}

/// True when the target subtree still contains a document-local `$ref`
/// that would resolve nowhere after being copied into `owner_uri`.
fn has_dangling_local_refs(rolodex: &Rolodex, owner_uri: &str, mapped: &MappedRef) -> bool {
    let Some(target) = rolodex.index_for(&mapped.index_uri) else {
        return false;
    };
    let Some(owner) = rolodex.index_for(owner_uri) else {
        return false;
    };
    target
        .sites_in_subtree(mapped.node)
        .into_iter()
        .any(|pos| {
            let site = &target.all_refs()[pos];
            site.file_part.is_empty()
                && target.tree().get(site.node, "$ref").is_some()
                && owner.find_component(&site.fragment).is_none()
        })
}

/// Replace a site's mapping node with a deep copy of its target.
fn inline_site(rolodex: &mut Rolodex, owner_uri: &str, site: &RefSite, mapped: &MappedRef) {
    if mapped.index_uri == owner_uri {
        let Some(owner) = rolodex.index_for_mut(owner_uri) else {
            return;
        };
        let tree = owner.tree_mut();
        let copy = tree.copy_within(mapped.node);
        tree.graft(site.node, copy);
        return;
    }

    // Cross-tree copies stage through a detached scratch tree so the
    // source and destination borrows never overlap.
    let mut scratch = Tree::empty();
    let staged = match rolodex.index_for(&mapped.index_uri) {
        Some(target) => scratch.copy_from(target.tree(), mapped.node),
        None => return,
    };
    let Some(owner) = rolodex.index_for_mut(owner_uri) else {
        return;
    };
    let tree = owner.tree_mut();
    let copy = tree.copy_from(&scratch, staged);
    tree.graft(site.node, copy);
}

fn rewrite_site(rolodex: &mut Rolodex, owner_uri: &str, site: &RefSite, pointer: &str) {
    if let Some(owner) = rolodex.index_for_mut(owner_uri) {
        owner
            .tree_mut()
            .set_scalar_value(site.value_node, pointer.to_string());
    }
}

// ── Compose mode ──────────────────────────────────────────────────────

fn bundle_composed(
    document: &mut Document,
    composition: &CompositionConfig,
    cancel: &CancelToken,
) -> Result<Vec<u8>, Error> {
    let root_uri = document.root_uri.clone();
    let rolodex = &mut document.rolodex;
    let mut composer = Composer::new(composition);

    let mut order = vec![root_uri.clone()];
    order.extend(rolodex.external_uris());

    let mut rewrites: Vec<(String, RefSite, String)> = Vec::new();
    let mut inline_required: Vec<(String, RefSite, MappedRef)> = Vec::new();

    for uri in order {
        let sites: Vec<RefSite> = match rolodex.index_for(&uri) {
            Some(index) => index.all_refs().to_vec(),
            None => continue,
        };
        for site in sites {
            cancel.ensure_live()?;
            let mapped = rolodex
                .index_for(&uri)
                .and_then(|index| index.mapped_references().get(&site.absolute))
                .cloned();
            let Some(mapped) = mapped else {
                continue;
            };

            // Targets already living in the root need no composing; a
            // reference from an external file just turns local.
            if mapped.index_uri == root_uri {
                if uri != root_uri {
                    let pointer = format!("#{}", site.fragment);
                    rewrites.push((uri.clone(), site, pointer));
                }
                continue;
            }

            // Only mapping-shaped targets make sense as components.
            let component_shaped = rolodex
                .index_for(&mapped.index_uri)
                .is_some_and(|target| target.tree().kind(mapped.node) == NodeKind::Mapping);
            if !component_shaped {
                inline_required.push((uri.clone(), site, mapped));
                continue;
            }

            let pointer = composer.assign(rolodex, &site.absolute, &mapped)?;
            rewrites.push((uri.clone(), site, pointer));
        }
    }

    // Rewrite before copying so composed bodies carry the new pointers.
    for (uri, site, pointer) in rewrites {
        rewrite_site(rolodex, &uri, &site, &pointer);
    }
    for (uri, site, mapped) in inline_required {
        if mapped.circular {
            warn!(reference = %site.absolute, "skipping circular reference");
            continue;
        }
        inline_site(rolodex, &uri, &site, &mapped);
    }

    composer.apply(rolodex)?;
    finish(document)
}

// ── Shared machinery ──────────────────────────────────────────────────

/// Plans and applies component hoisting: stable first-seen naming,
/// body-hash collision checks, and the final copy into the root's
/// components section.
struct Composer {
    delimiter: String,
    /// Origin absolute definition to new local pointer. Insertion order
    /// is first-seen order, which fixes the appended component order.
    renames: IndexMap<String, String>,
    /// `<kind key>/<name>` to the body hash it was claimed with.
    named: HashMap<String, String>,
    staged: Vec<Staged>,
}

struct Staged {
    kind: ComponentKind,
    name: String,
    src_uri: String,
    src_node: NodeId,
    fragment: String,
}

impl Composer {
    fn new(config: &CompositionConfig) -> Self {
        Self {
            delimiter: config.delimiter.clone(),
            renames: IndexMap::new(),
            named: HashMap::new(),
            staged: Vec::new(),
        }
    }

    /// Pick (or recall) the root-components pointer for a target.
    /// Identical origins always get the same answer; name collisions
    /// with differing bodies take a `<delimiter><counter>` suffix in
    /// first-seen order.
    ///
    /// # Errors
    ///
    /// Returns `Error::CompositionConflict` when the rename counter is
    /// exhausted.
    fn assign(
        &mut self,
        rolodex: &Rolodex,
        absolute: &str,
        mapped: &MappedRef,
    ) -> Result<String, Error> {
        if let Some(pointer) = self.renames.get(absolute) {
            return Ok(pointer.clone());
        }

        let fragment = absolute
            .split_once('#')
            .map(|(_, f)| f.to_string())
            .unwrap_or_default();
        let Some(target) = rolodex.index_for(&mapped.index_uri) else {
            return Err(Error::CompositionConflict {
                reason: format!("no index for `{}`", mapped.index_uri),
            });
        };
        let kind = classify_target(target.tree(), mapped.node, &fragment);
        let hash = target.tree().content_hash(mapped.node);
        let base = base_name(&fragment, &mapped.index_uri);

        let mut candidate = base.clone();
        let mut counter = 0u32;
        loop {
            let key = format!("{}/{candidate}", kind.key());
            let claimed = self.named.get(&key).cloned().or_else(|| {
                rolodex.root_index().and_then(|root| {
                    root.find_component(&format!("#/components/{key}"))
                        .map(|node| root.tree().content_hash(node))
                })
            });

            match claimed {
                None => {
                    let pointer = format!("#/components/{key}");
                    self.named.insert(key, hash);
                    self.staged.push(Staged {
                        kind,
                        name: candidate,
                        src_uri: mapped.index_uri.clone(),
                        src_node: mapped.node,
                        fragment,
                    });
                    self.renames.insert(absolute.to_string(), pointer.clone());
                    return Ok(pointer);
                }
                Some(existing) if existing == hash => {
                    // Same body: fold into the existing component.
                    let pointer = format!("#/components/{key}");
                    self.renames.insert(absolute.to_string(), pointer.clone());
                    return Ok(pointer);
                }
                Some(_) => {
                    counter += 1;
                    if counter > RENAME_LIMIT {
                        return Err(Error::CompositionConflict {
                            reason: format!(
                                "cannot find a unique name for `{base}` after {RENAME_LIMIT} attempts"
                            ),
                        });
                    }
                    candidate = format!("{base}{}{counter}", self.delimiter);
                }
            }
        }
    }

    /// Copy every staged target into the root's components section, in
    /// first-seen order, creating sections as needed. Runs after all
    /// rewrites so copies carry the rewritten pointers; surviving
    /// file-local self references are retargeted to the new location.
    fn apply(self, rolodex: &mut Rolodex) -> Result<(), Error> {
        for staged in self.staged {
            let mut scratch = Tree::empty();
            let staged_root = match rolodex.index_for(&staged.src_uri) {
                Some(target) => scratch.copy_from(target.tree(), staged.src_node),
                None => continue,
            };

            let Some(root) = rolodex.root_index_mut() else {
                continue;
            };
            let tree = root.tree_mut();
            let copied = tree.copy_from(&scratch, staged_root);

            let pointer = format!("#/components/{}/{}", staged.kind.key(), staged.name);
            if !staged.fragment.is_empty() {
                retarget_local_refs(tree, copied, &format!("#{}", staged.fragment), &pointer);
            }

            debug!(pointer = %pointer, from = %staged.src_uri, "composed component");
            let Some(payload) = tree.payload() else {
                continue;
            };
            let components = ensure_child_mapping(tree, payload, "components");
            let section = ensure_child_mapping(tree, components, staged.kind.key());
            let key = tree.new_scalar(&staged.name, ScalarStyle::Plain);
            tree.push_pair(section, key, copied);
        }
        Ok(())
    }
}

/// Classify a compose target: by its fragment path when it points into a
/// components section, by shape otherwise, defaulting to schema with a
/// warning.
fn classify_target(tree: &Tree, node: NodeId, fragment: &str) -> ComponentKind {
    let segments: Vec<&str> = fragment.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() >= 2 && segments[0] == "components" {
        if let Some(kind) = ComponentKind::from_key(segments[1]) {
            return kind;
        }
    }
    if tree.get(node, "properties").is_some() || tree.get(node, "type").is_some() {
        return ComponentKind::Schemas;
    }
    if tree.get(node, "content").is_some() {
        return ComponentKind::Responses;
    }
    warn!(fragment, "cannot determine reference target kind; treating as schema");
    ComponentKind::Schemas
}

/// The initial component name: the last fragment segment, or the target
/// file's stem for whole-document references.
fn base_name(fragment: &str, target_uri: &str) -> String {
    if let Some(last) = fragment.split('/').filter(|s| !s.is_empty()).last() {
        return last.to_string();
    }
    let file = target_uri.rsplit('/').next().unwrap_or(target_uri);
    let stem = file.split('.').next().unwrap_or(file);
    if stem.is_empty() {
        "component".to_string()
    } else {
        stem.to_string()
    }
}

/// Rewrite `$ref` scalars under `root` that still carry `original` to
/// `pointer`. Used when a composed body references its own old location.
fn retarget_local_refs(tree: &mut Tree, root: NodeId, original: &str, pointer: &str) {
    let stale: Vec<NodeId> = tree
        .descendants(root)
        .into_iter()
        .filter(|id| tree.kind(*id) == NodeKind::Mapping)
        .filter_map(|id| tree.get(id, "$ref"))
        .filter(|value| tree.scalar(*value) == Some(original))
        .collect();
    for value in stale {
        tree.set_scalar_value(value, pointer.to_string());
    }
}

fn ensure_child_mapping(tree: &mut Tree, parent: NodeId, key: &str) -> NodeId {
    if let Some(existing) = tree.get(parent, key) {
        return existing;
    }
    let k = tree.new_scalar(key, ScalarStyle::Plain);
    let v = tree.new_mapping();
    tree.push_pair(parent, k, v);
    v
}

/// Render the root and join the accumulated errors: a clean run returns
/// the bytes, anything else returns `Incomplete` still carrying the
/// best-effort document.
fn finish(document: &mut Document) -> Result<Vec<u8>, Error> {
    let errors = document.rolodex.collected_errors();
    let rendered = match document.rolodex.root_index() {
        Some(root) => root.tree().render()?,
        None => Vec::new(),
    };
    if errors.is_empty() {
        Ok(rendered)
    } else {
        Err(Error::Incomplete {
            errors,
            rendered: Some(rendered),
        })
    }
}

/// The synthetic URI the root document is indexed under. A filesystem
/// base anchors it there; a remote base joins against the base URL.
fn root_uri_for(config: &Config) -> String {
    if let Some(base) = &config.base_path {
        let base = crate::local::absolute(base);
        if base.is_file() {
            return base.to_string_lossy().into_owned();
        }
        return base.join("root.yaml").to_string_lossy().into_owned();
    }
    if let Some(url) = &config.base_url {
        return url
            .join("root.yaml")
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string());
    }
    let cwd = std::env::current_dir().unwrap_or_default();
    cwd.join("root.yaml").to_string_lossy().into_owned()
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;

    #[test]
    fn base_names_fall_back_to_file_stems() {
        assert_eq!(base_name("/components/schemas/Tree", "/x/ext.yaml"), "Tree");
        assert_eq!(base_name("", "/specs/tree.yaml"), "tree");
        assert_eq!(base_name("", "pet.json"), "pet");
    }

    #[test]
    fn classification_prefers_the_fragment_path() {
        let tree = Tree::parse(b"content:\n  application/json: {}\n").unwrap();
        let node = tree.payload().unwrap();
        assert_eq!(
            classify_target(&tree, node, "/components/parameters/Limit"),
            ComponentKind::Parameters
        );
        // Shape-based fallback: `content` reads as a response.
        assert_eq!(classify_target(&tree, node, "/misc/Thing"), ComponentKind::Responses);
    }

    #[test]
    fn unknown_shapes_default_to_schema() {
        let tree = Tree::parse(b"description: just words\n").unwrap();
        let node = tree.payload().unwrap();
        assert_eq!(classify_target(&tree, node, "/misc/Thing"), ComponentKind::Schemas);
    }

    #[test]
    fn invalid_root_is_rejected_up_front() {
        let cancel = CancelToken::new();
        let result = Document::parse(b"- just\n- a\n- sequence\n", &Config::default(), &cancel);
        assert!(matches!(result, Err(Error::InvalidModel { .. })));

        let garbage = Document::parse(b"{unclosed: [", &Config::default(), &cancel);
        assert!(matches!(garbage, Err(Error::InvalidModel { .. })));
    }

    #[test]
    fn cancelled_token_short_circuits() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = bundle_bytes(b"openapi: 3.1.0\n", &Config::default(), &cancel);
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
