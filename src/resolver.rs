//! Reference-graph resolution.
//!
//! Walks outward from the root index: maps every reference site to its
//! target node, pulls external files into the rolodex as they are first
//! referenced, detects circular chains with a walk stack, and collects
//! the discriminator preserve set the bundler honors.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::Error;
use crate::rolodex::Rolodex;
use crate::types::{CircularChain, MappedRef};

/// Run full resolution over the rolodex.
///
/// Per-site failures (missing files, missing fragments, gated schemes)
/// are accumulated on the owning index and do not halt resolution of
/// unrelated branches.
///
/// # Errors
///
/// Returns `Error::Cancelled` when the token fires mid-walk.
pub(crate) fn resolve(rolodex: &mut Rolodex, cancel: &CancelToken) -> Result<(), Error> {
    map_references(rolodex, cancel)?;
    detect_cycles(rolodex, cancel)?;
    collect_preserve(rolodex);
    Ok(())
}

/// Annotate every reference site with its mapped reference, lazily
/// indexing external files on first sight.
fn map_references(rolodex: &mut Rolodex, cancel: &CancelToken) -> Result<(), Error> {
    let Some(root) = rolodex.root_index() else {
        return Ok(());
    };
    let mut worklist = vec![root.uri().to_string()];
    let mut processed: HashSet<String> = HashSet::new();

    while let Some(owner_uri) = worklist.pop() {
        if !processed.insert(owner_uri.clone()) {
            continue;
        }
        let sites = match rolodex.index_for(&owner_uri) {
            Some(index) => index.all_refs().to_vec(),
            None => continue,
        };

        for site in sites {
            cancel.ensure_live()?;
            let Some((target_uri, fragment)) = site.absolute.split_once('#') else {
                continue;
            };
            let target_uri = target_uri.to_string();
            let fragment = fragment.to_string();

            if target_uri != owner_uri {
                if let Err(e) = rolodex.ensure_external(&target_uri, cancel) {
                    if matches!(e, Error::Cancelled) {
                        return Err(e);
                    }
                    warn!(reference = %site.literal, uri = %target_uri, error = %e, "external lookup failed");
                    if let Some(owner) = rolodex.index_for_mut(&owner_uri) {
                        owner.record_error(e);
                    }
                    continue;
                }
                worklist.push(target_uri.clone());
            }

            let found = rolodex
                .index_for(&target_uri)
                .and_then(|target| target.find_component(&fragment));
            match found {
                Some(node) => {
                    debug!(reference = %site.literal, owner = %owner_uri, "mapped");
                    if let Some(owner) = rolodex.index_for_mut(&owner_uri) {
                        owner.record_mapped(
                            site.absolute.clone(),
                            MappedRef {
                                index_uri: target_uri,
                                node,
                                circular: false,
                            },
                        );
                    }
                }
                None => {
                    if let Some(owner) = rolodex.index_for_mut(&owner_uri) {
                        owner.record_error(Error::UnresolvedReference {
                            reference: site.literal.clone(),
                            file: owner_uri.clone(),
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

/// Walk-stack state for cycle detection. A site appears on the stack at
/// most once per walk; revisiting one closes a chain.
struct CycleState {
    stack: Vec<String>,
    on_stack: HashSet<String>,
    visited: HashSet<String>,
    chains_seen: HashSet<String>,
}

fn detect_cycles(rolodex: &mut Rolodex, cancel: &CancelToken) -> Result<(), Error> {
    let mut owners = Vec::new();
    if let Some(root) = rolodex.root_index() {
        owners.push(root.uri().to_string());
    }
    owners.extend(rolodex.external_uris());

    let mut state = CycleState {
        stack: Vec::new(),
        on_stack: HashSet::new(),
        visited: HashSet::new(),
        chains_seen: HashSet::new(),
    };

    for owner_uri in owners {
        let site_abs: Vec<String> = match rolodex.index_for(&owner_uri) {
            Some(index) => index.all_refs().iter().map(|s| s.absolute.clone()).collect(),
            None => continue,
        };
        for abs in site_abs {
            walk_site(rolodex, &owner_uri, &abs, &mut state, cancel)?;
        }
    }
    Ok(())
}

fn walk_site(
    rolodex: &mut Rolodex,
    owner_uri: &str,
    abs: &str,
    state: &mut CycleState,
    cancel: &CancelToken,
) -> Result<(), Error> {
    cancel.ensure_live()?;

    if state.on_stack.contains(abs) {
        close_chain(rolodex, owner_uri, abs, state);
        return Ok(());
    }
    if state.visited.contains(abs) {
        return Ok(());
    }

    state.stack.push(abs.to_string());
    state.on_stack.insert(abs.to_string());

    let mapped = rolodex
        .index_for(owner_uri)
        .and_then(|index| index.mapped_references().get(abs))
        .cloned();

    if let Some(mapped) = mapped {
        let successors: Vec<String> = rolodex
            .index_for(&mapped.index_uri)
            .map(|target| {
                target
                    .sites_in_subtree(mapped.node)
                    .into_iter()
                    .map(|pos| target.all_refs()[pos].absolute.clone())
                    .collect()
            })
            .unwrap_or_default();

        for successor in successors {
            walk_site(rolodex, &mapped.index_uri, &successor, state, cancel)?;
        }
    }

    state.stack.pop();
    state.on_stack.remove(abs);
    state.visited.insert(abs.to_string());
    Ok(())
}

/// Record the cycle closing at `abs`: the stack slice from its first
/// occurrence is the chain. Only the index owning the closing site has
/// its mapped reference marked circular; another index referencing the
/// same definition from outside the loop keeps a plain edge. The chain
/// lands on the root index once.
fn close_chain(rolodex: &mut Rolodex, owner_uri: &str, abs: &str, state: &mut CycleState) {
    if let Some(owner) = rolodex.index_for_mut(owner_uri) {
        owner.mark_circular(abs);
    }

    let start = state.stack.iter().position(|s| s == abs).unwrap_or(0);
    let sites: Vec<String> = state.stack[start..].to_vec();

    let key = canonical_chain_key(&sites);
    if !state.chains_seen.insert(key) {
        return;
    }

    let chain = CircularChain { sites };
    warn!(chain = %chain.display(), "circular reference chain detected");
    if let Some(root) = rolodex.root_index_mut() {
        root.record_circular(chain);
    }
}

/// Rotate the chain so its smallest site leads; the joined form then
/// identifies the cycle regardless of entry point.
fn canonical_chain_key(sites: &[String]) -> String {
    let Some(min_pos) = sites
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(i, _)| i)
    else {
        return String::new();
    };
    let mut rotated = Vec::with_capacity(sites.len());
    rotated.extend_from_slice(&sites[min_pos..]);
    rotated.extend_from_slice(&sites[..min_pos]);
    rotated.join(" -> ")
}

/// Pin every discriminator-mapped target and every `$ref` beside a
/// discriminator's `oneOf`/`anyOf`, so inlining cannot erase the union's
/// selection hints.
fn collect_preserve(rolodex: &mut Rolodex) {
    let mut owners = Vec::new();
    if let Some(root) = rolodex.root_index() {
        owners.push(root.uri().to_string());
    }
    owners.extend(rolodex.external_uris());

    let mut pins: HashSet<String> = HashSet::new();
    for owner_uri in &owners {
        let Some(index) = rolodex.index_for(owner_uri) else {
            continue;
        };
        let tree = index.tree();

        for &disc_node in index.discriminators() {
            let Some(disc) = tree.get(disc_node, "discriminator") else {
                continue;
            };
            let Some(mapping) = tree.get(disc, "mapping") else {
                continue;
            };

            for (_, value) in tree.pairs(mapping) {
                let Some(literal) = tree.scalar(*value) else {
                    continue;
                };
                if let Some((abs, _, _)) = rolodex.search_reference(owner_uri, literal) {
                    debug!(target = %abs, "pinned discriminator mapping target");
                    pins.insert(abs);
                }
            }

            for union_key in ["oneOf", "anyOf"] {
                let Some(union) = tree.get(disc_node, union_key) else {
                    continue;
                };
                for &item in tree.items(union) {
                    let Some(value) = tree.get(item, "$ref") else {
                        continue;
                    };
                    let Some(literal) = tree.scalar(value) else {
                        continue;
                    };
                    if let Some((abs, _, _)) = rolodex.search_reference(owner_uri, literal) {
                        debug!(target = %abs, "pinned union variant");
                        pins.insert(abs);
                    }
                }
            }
        }
    }

    rolodex.set_preserve(pins);
}
