use crate::node::NodeId;

/// The component kinds addressable under `#/components/<kind>/<name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Schemas,
    Responses,
    Parameters,
    Examples,
    RequestBodies,
    Headers,
    SecuritySchemes,
    Links,
    Callbacks,
    PathItems,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 10] = [
        ComponentKind::Schemas,
        ComponentKind::Responses,
        ComponentKind::Parameters,
        ComponentKind::Examples,
        ComponentKind::RequestBodies,
        ComponentKind::Headers,
        ComponentKind::SecuritySchemes,
        ComponentKind::Links,
        ComponentKind::Callbacks,
        ComponentKind::PathItems,
    ];

    /// The key this kind uses inside a `components` mapping.
    pub fn key(self) -> &'static str {
        match self {
            ComponentKind::Schemas => "schemas",
            ComponentKind::Responses => "responses",
            ComponentKind::Parameters => "parameters",
            ComponentKind::Examples => "examples",
            ComponentKind::RequestBodies => "requestBodies",
            ComponentKind::Headers => "headers",
            ComponentKind::SecuritySchemes => "securitySchemes",
            ComponentKind::Links => "links",
            ComponentKind::Callbacks => "callbacks",
            ComponentKind::PathItems => "pathItems",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.key() == key)
    }
}

/// A mapping node whose children contain `$ref`. Recorded by the indexer
/// in source order.
#[derive(Debug, Clone)]
pub struct RefSite {
    /// The mapping node holding the `$ref` entry.
    pub node: NodeId,
    /// The scalar node carrying the reference literal.
    pub value_node: NodeId,
    /// The reference exactly as written.
    pub literal: String,
    /// The part before `#`; empty for document-local references.
    pub file_part: String,
    /// The JSON Pointer after `#`.
    pub fragment: String,
    /// Canonical target URI plus fragment; for local references this is
    /// the owning file's URI plus fragment.
    pub absolute: String,
    /// The node enclosing the reference site, if any.
    pub parent: Option<NodeId>,
}

/// The result of resolving a reference site through the rolodex.
#[derive(Debug, Clone)]
pub struct MappedRef {
    /// Canonical URI of the index that owns the target node.
    pub index_uri: String,
    /// The target node within that index's tree.
    pub node: NodeId,
    /// True when the edge into this target closes a cycle.
    pub circular: bool,
}

/// An ordered cycle of reference sites discovered by the resolver,
/// identified by their absolute definitions. Stored on the root index.
#[derive(Debug, Clone)]
pub struct CircularChain {
    pub sites: Vec<String>,
}

impl CircularChain {
    /// Human-readable loop, first site repeated at the end.
    pub fn display(&self) -> String {
        let mut sites = self.sites.clone();
        if let Some(first) = self.sites.first() {
            sites.push(first.clone());
        }
        sites.join(" -> ")
    }
}
