//! In-memory node store for parsed YAML and JSON documents.
//!
//! Documents are held as an arena of tagged nodes owned by a [`Tree`].
//! Mapping entries keep their source order, scalars keep their literal
//! text, and every node carries the line/column it came from. Identity
//! is the arena id: deep copies always allocate fresh ids, so two
//! structurally equal nodes are never the same node.

use std::collections::HashMap;

use sha2::{Digest as _, Sha256};
use yaml_rust::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust::scanner::Marker;
use yaml_rust::scanner::TScalarStyle;
use yaml_rust::yaml::{Array, Hash};
use yaml_rust::{Yaml, YamlEmitter};

use crate::error::Error;

/// Identifies a node within one [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// The four node shapes a document is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Mapping,
    Sequence,
    Scalar,
}

/// Whether a scalar was written plain or quoted in the source.
///
/// Plain scalars may re-emit as numbers, booleans, or null; quoted
/// scalars always stay strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarStyle {
    Plain,
    Quoted,
}

#[derive(Debug, Clone)]
enum Content {
    Scalar { value: String, style: ScalarStyle },
    Pairs(Vec<(NodeId, NodeId)>),
    Items(Vec<NodeId>),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    line: u32,
    col: u32,
    content: Content,
}

/// An arena-backed document tree.
///
/// Nodes are immutable after parsing except through the narrow mutation
/// surface the bundler uses (`set_pairs`, `set_scalar_value`, the copy
/// helpers). Emission preserves mapping-entry order end to end.
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
    json: bool,
}

impl Tree {
    /// Parse YAML or JSON bytes into a document-rooted tree.
    ///
    /// JSON input is detected by its leading `{` or `[` and parses through
    /// the same tokenizer (JSON documents are flow-style YAML for this
    /// purpose); the flag is kept so [`Tree::render`] can emit the format
    /// the input arrived in. Anchors are resolved at parse time by copying
    /// the anchored subtree. Only the first document of a stream is kept.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidModel` if the bytes are not UTF-8 or do not
    /// tokenize.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let text = std::str::from_utf8(bytes).map_err(|e| Error::InvalidModel {
            reason: format!("input is not UTF-8: {e}"),
        })?;

        let json = matches!(
            text.trim_start().as_bytes().first().copied(),
            Some(b'{' | b'[')
        );

        let mut builder = TreeBuilder::new();
        let mut parser = Parser::new(text.chars());
        parser.load(&mut builder, false).map_err(|e| Error::InvalidModel {
            reason: e.to_string(),
        })?;

        Ok(builder.finish(json))
    }

    /// The document node at the top of the tree.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The parsed content below the document node, if the document was
    /// not empty.
    pub fn payload(&self) -> Option<NodeId> {
        self.items(self.root).first().copied()
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    pub fn line(&self, id: NodeId) -> u32 {
        self.node(id).line
    }

    pub fn col(&self, id: NodeId) -> u32 {
        self.node(id).col
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    /// The literal text of a scalar node. `None` for non-scalars.
    pub fn scalar(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).content {
            Content::Scalar { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn scalar_style(&self, id: NodeId) -> Option<ScalarStyle> {
        match &self.node(id).content {
            Content::Scalar { style, .. } => Some(*style),
            _ => None,
        }
    }

    /// Typed read of a plain integer scalar.
    pub fn scalar_i64(&self, id: NodeId) -> Option<i64> {
        self.scalar(id)?.parse().ok()
    }

    /// Typed read of a plain float scalar.
    pub fn scalar_f64(&self, id: NodeId) -> Option<f64> {
        self.scalar(id)?.parse().ok()
    }

    /// Typed read of a plain boolean scalar.
    pub fn scalar_bool(&self, id: NodeId) -> Option<bool> {
        match self.scalar(id)? {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }

    /// Ordered key/value pairs of a mapping node. Empty for non-mappings.
    pub fn pairs(&self, id: NodeId) -> &[(NodeId, NodeId)] {
        match &self.node(id).content {
            Content::Pairs(pairs) => pairs,
            _ => &[],
        }
    }

    /// Ordered children of a sequence or document node. Empty otherwise.
    pub fn items(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).content {
            Content::Items(items) => items,
            _ => &[],
        }
    }

    /// Look up the value for a scalar key in a mapping node.
    pub fn get(&self, mapping: NodeId, key: &str) -> Option<NodeId> {
        self.pairs(mapping)
            .iter()
            .find(|(k, _)| self.scalar(*k) == Some(key))
            .map(|(_, v)| *v)
    }

    /// All node ids in the subtree rooted at `id`, preorder, keys included.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            match &self.node(next).content {
                Content::Scalar { .. } => {}
                Content::Pairs(pairs) => {
                    for (k, v) in pairs.iter().rev() {
                        stack.push(*v);
                        stack.push(*k);
                    }
                }
                Content::Items(items) => {
                    for item in items.iter().rev() {
                        stack.push(*item);
                    }
                }
            }
        }
        out
    }

    /// Replace a mapping node's children. The bundler uses this to
    /// substitute a reference site with its target's content.
    pub(crate) fn set_pairs(&mut self, id: NodeId, pairs: Vec<(NodeId, NodeId)>) {
        let node = &mut self.nodes[id.index()];
        node.kind = NodeKind::Mapping;
        node.content = Content::Pairs(pairs);
    }

    /// Rewrite the literal text of a scalar node in place.
    pub(crate) fn set_scalar_value(&mut self, id: NodeId, value: String) {
        if let Content::Scalar { value: old, .. } = &mut self.nodes[id.index()].content {
            *old = value;
        }
    }

    /// Append a scalar entry to a mapping node, creating the pair nodes.
    pub(crate) fn push_pair(&mut self, mapping: NodeId, key: NodeId, value: NodeId) {
        if let Content::Pairs(pairs) = &mut self.nodes[mapping.index()].content {
            pairs.push((key, value));
        }
    }

    pub(crate) fn new_scalar(&mut self, value: &str, style: ScalarStyle) -> NodeId {
        self.push(Node {
            kind: NodeKind::Scalar,
            line: 0,
            col: 0,
            content: Content::Scalar {
                value: value.to_string(),
                style,
            },
        })
    }

    pub(crate) fn new_mapping(&mut self) -> NodeId {
        self.push(Node {
            kind: NodeKind::Mapping,
            line: 0,
            col: 0,
            content: Content::Pairs(Vec::new()),
        })
    }

    /// A tree holding nothing but an empty document node. Used as a
    /// detached scratch space when moving subtrees between two trees
    /// owned by the same rolodex.
    pub(crate) fn empty() -> Self {
        let node = Node {
            kind: NodeKind::Document,
            line: 1,
            col: 1,
            content: Content::Items(Vec::new()),
        };
        Self {
            nodes: vec![node],
            root: NodeId(0),
            json: false,
        }
    }

    /// Overwrite `dst` in place with the kind and content of `src`, a
    /// node in this tree (normally the root of a freshly copied
    /// subtree). `dst` keeps its identity and source coordinates.
    pub(crate) fn graft(&mut self, dst: NodeId, src: NodeId) {
        let node = self.nodes[src.index()].clone();
        let slot = &mut self.nodes[dst.index()];
        slot.kind = node.kind;
        slot.content = node.content;
    }

    /// Deep-copy a subtree from another tree into this one, returning the
    /// fresh root id.
    pub(crate) fn copy_from(&mut self, src: &Tree, id: NodeId) -> NodeId {
        let node = src.node(id);
        let content = match &node.content {
            Content::Scalar { value, style } => Content::Scalar {
                value: value.clone(),
                style: *style,
            },
            Content::Pairs(pairs) => Content::Pairs(
                pairs
                    .iter()
                    .map(|(k, v)| (self.copy_from(src, *k), self.copy_from(src, *v)))
                    .collect(),
            ),
            Content::Items(items) => {
                Content::Items(items.iter().map(|i| self.copy_from(src, *i)).collect())
            }
        };
        self.push(Node {
            kind: node.kind,
            line: node.line,
            col: node.col,
            content,
        })
    }

    /// Deep-copy a subtree within this tree, returning the fresh root id.
    pub(crate) fn copy_within(&mut self, id: NodeId) -> NodeId {
        let node = self.node(id).clone();
        let content = match node.content {
            Content::Scalar { .. } => node.content,
            Content::Pairs(pairs) => Content::Pairs(
                pairs
                    .iter()
                    .map(|(k, v)| (self.copy_within(*k), self.copy_within(*v)))
                    .collect(),
            ),
            Content::Items(items) => Content::Items(
                items.iter().map(|i| self.copy_within(*i)).collect(),
            ),
        };
        self.push(Node {
            kind: node.kind,
            line: node.line,
            col: node.col,
            content,
        })
    }

    /// SHA-256 over a canonical serialization of the subtree, hex encoded.
    /// Two subtrees hash equal exactly when their kinds, scalar texts,
    /// styles, and child order all match.
    pub fn content_hash(&self, id: NodeId) -> String {
        let mut hasher = Sha256::new();
        self.hash_into(id, &mut hasher);
        let hash = hasher.finalize();
        format!("{hash:x}")
    }

    fn hash_into(&self, id: NodeId, hasher: &mut Sha256) {
        match &self.node(id).content {
            Content::Scalar { value, style } => {
                hasher.update(match style {
                    ScalarStyle::Plain => b"s.",
                    ScalarStyle::Quoted => b"q.",
                });
                hasher.update(value.len().to_le_bytes());
                hasher.update(value.as_bytes());
            }
            Content::Pairs(pairs) => {
                hasher.update(b"m.");
                hasher.update(pairs.len().to_le_bytes());
                for (k, v) in pairs {
                    self.hash_into(*k, hasher);
                    self.hash_into(*v, hasher);
                }
            }
            Content::Items(items) => {
                hasher.update(b"l.");
                hasher.update(items.len().to_le_bytes());
                for item in items {
                    self.hash_into(*item, hasher);
                }
            }
        }
    }

    /// Serialize the document in the format it arrived in: YAML by
    /// default, JSON if the input was JSON.
    ///
    /// Mapping-entry order is preserved. Plain scalars that read as
    /// integers, floats, booleans, or null are emitted as such; quoted
    /// scalars stay strings. Whitespace and comments from the input are
    /// not reproduced.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidModel` if the serializer rejects the tree.
    pub fn render(&self) -> Result<Vec<u8>, Error> {
        let Some(payload) = self.payload() else {
            return Ok(Vec::new());
        };

        if self.json {
            let value = self.to_json(payload);
            let mut out = serde_json::to_vec_pretty(&value).map_err(|e| Error::InvalidModel {
                reason: format!("json emission failed: {e}"),
            })?;
            out.push(b'\n');
            return Ok(out);
        }

        let yaml = self.to_yaml(payload);
        let mut out = String::new();
        let mut emitter = YamlEmitter::new(&mut out);
        emitter.dump(&yaml).map_err(|e| Error::InvalidModel {
            reason: format!("yaml emission failed: {e:?}"),
        })?;

        // The emitter leads with a document marker; the bundled output is
        // always a single document, so drop it.
        let body = out.strip_prefix("---\n").or_else(|| out.strip_prefix("--- ")).unwrap_or(&out);
        let mut bytes = body.as_bytes().to_vec();
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn to_yaml(&self, id: NodeId) -> Yaml {
        match &self.node(id).content {
            Content::Scalar { value, style } => scalar_to_yaml(value, *style),
            Content::Pairs(pairs) => {
                let mut hash = Hash::new();
                for (k, v) in pairs {
                    hash.insert(self.to_yaml(*k), self.to_yaml(*v));
                }
                Yaml::Hash(hash)
            }
            Content::Items(items) => {
                let array: Array = items.iter().map(|i| self.to_yaml(*i)).collect();
                Yaml::Array(array)
            }
        }
    }

    fn to_json(&self, id: NodeId) -> serde_json::Value {
        match &self.node(id).content {
            Content::Scalar { value, style } => scalar_to_json(value, *style),
            Content::Pairs(pairs) => {
                let mut map = serde_json::Map::new();
                for (k, v) in pairs {
                    let key = self.scalar(*k).unwrap_or_default().to_string();
                    map.insert(key, self.to_json(*v));
                }
                serde_json::Value::Object(map)
            }
            Content::Items(items) => {
                serde_json::Value::Array(items.iter().map(|i| self.to_json(*i)).collect())
            }
        }
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(node);
        id
    }
}

/// How a plain scalar should be typed on emission.
fn scalar_to_yaml(value: &str, style: ScalarStyle) -> Yaml {
    if style == ScalarStyle::Quoted {
        return Yaml::String(value.to_string());
    }
    match classify_plain(value) {
        PlainType::Null => Yaml::Null,
        PlainType::Bool(b) => Yaml::Boolean(b),
        PlainType::Int(i) => Yaml::Integer(i),
        PlainType::Float => Yaml::Real(value.to_string()),
        PlainType::Str => Yaml::String(value.to_string()),
    }
}

fn scalar_to_json(value: &str, style: ScalarStyle) -> serde_json::Value {
    if style == ScalarStyle::Quoted {
        return serde_json::Value::String(value.to_string());
    }
    match classify_plain(value) {
        PlainType::Null => serde_json::Value::Null,
        PlainType::Bool(b) => serde_json::Value::Bool(b),
        PlainType::Int(i) => serde_json::Value::Number(i.into()),
        PlainType::Float => value
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map_or(
                serde_json::Value::String(value.to_string()),
                serde_json::Value::Number,
            ),
        PlainType::Str => serde_json::Value::String(value.to_string()),
    }
}

enum PlainType {
    Null,
    Bool(bool),
    Int(i64),
    Float,
    Str,
}

fn classify_plain(value: &str) -> PlainType {
    match value {
        "" | "~" | "null" => return PlainType::Null,
        "true" => return PlainType::Bool(true),
        "false" => return PlainType::Bool(false),
        _ => {}
    }
    if let Ok(i) = value.parse::<i64>() {
        return PlainType::Int(i);
    }
    let numeric_lead = value
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+' || c == '.');
    if numeric_lead && value.parse::<f64>().map_or(false, f64::is_finite) {
        return PlainType::Float;
    }
    PlainType::Str
}

/// Incremental arena construction from the tokenizer's marked events.
struct TreeBuilder {
    nodes: Vec<Node>,
    stack: Vec<Frame>,
    anchors: HashMap<usize, NodeId>,
    root: Option<NodeId>,
}

enum Frame {
    Mapping {
        id: NodeId,
        pending_key: Option<NodeId>,
    },
    Sequence {
        id: NodeId,
    },
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            nodes: Vec::new(),
            stack: Vec::new(),
            anchors: HashMap::new(),
            root: None,
        }
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(node);
        id
    }

    /// Hook a completed node into the enclosing container, or record it
    /// as the document root when the stack is empty.
    fn attach(&mut self, id: NodeId) {
        match self.stack.last_mut() {
            Some(Frame::Mapping { id: map, pending_key }) => match pending_key.take() {
                Some(key) => {
                    let map = *map;
                    if let Content::Pairs(pairs) = &mut self.nodes[map.index()].content {
                        pairs.push((key, id));
                    }
                }
                None => *pending_key = Some(id),
            },
            Some(Frame::Sequence { id: seq }) => {
                let seq = *seq;
                if let Content::Items(items) = &mut self.nodes[seq.index()].content {
                    items.push(id);
                }
            }
            None => {
                if self.root.is_none() {
                    self.root = Some(id);
                }
            }
        }
    }

    fn copy_subtree(&mut self, id: NodeId) -> NodeId {
        let node = self.nodes[id.index()].clone();
        let content = match node.content {
            Content::Scalar { .. } => node.content,
            Content::Pairs(pairs) => Content::Pairs(
                pairs
                    .iter()
                    .map(|(k, v)| (self.copy_subtree(*k), self.copy_subtree(*v)))
                    .collect(),
            ),
            Content::Items(items) => Content::Items(
                items.iter().map(|i| self.copy_subtree(*i)).collect(),
            ),
        };
        self.push(Node {
            kind: node.kind,
            line: node.line,
            col: node.col,
            content,
        })
    }

    fn finish(mut self, json: bool) -> Tree {
        let items = self.root.map(|id| vec![id]).unwrap_or_default();
        let root = self.push(Node {
            kind: NodeKind::Document,
            line: 1,
            col: 1,
            content: Content::Items(items),
        });
        Tree {
            nodes: self.nodes,
            root,
            json,
        }
    }
}

impl MarkedEventReceiver for TreeBuilder {
    fn on_event(&mut self, ev: Event, mark: Marker) {
        let line = u32::try_from(mark.line()).unwrap_or(u32::MAX);
        let col = u32::try_from(mark.col()).unwrap_or(u32::MAX).saturating_add(1);

        match ev {
            Event::Scalar(value, style, anchor, _tag) => {
                let style = match style {
                    TScalarStyle::Plain | TScalarStyle::Any => ScalarStyle::Plain,
                    _ => ScalarStyle::Quoted,
                };
                let id = self.push(Node {
                    kind: NodeKind::Scalar,
                    line,
                    col,
                    content: Content::Scalar { value, style },
                });
                if anchor > 0 {
                    self.anchors.insert(anchor, id);
                }
                self.attach(id);
            }
            Event::MappingStart(anchor) => {
                let id = self.push(Node {
                    kind: NodeKind::Mapping,
                    line,
                    col,
                    content: Content::Pairs(Vec::new()),
                });
                if anchor > 0 {
                    self.anchors.insert(anchor, id);
                }
                self.attach(id);
                self.stack.push(Frame::Mapping {
                    id,
                    pending_key: None,
                });
            }
            Event::MappingEnd => {
                self.stack.pop();
            }
            Event::SequenceStart(anchor) => {
                let id = self.push(Node {
                    kind: NodeKind::Sequence,
                    line,
                    col,
                    content: Content::Items(Vec::new()),
                });
                if anchor > 0 {
                    self.anchors.insert(anchor, id);
                }
                self.attach(id);
                self.stack.push(Frame::Sequence { id });
            }
            Event::SequenceEnd => {
                self.stack.pop();
            }
            Event::Alias(anchor) => {
                if let Some(&target) = self.anchors.get(&anchor) {
                    let copy = self.copy_subtree(target);
                    self.attach(copy);
                }
            }
            Event::Nothing
            | Event::StreamStart
            | Event::StreamEnd
            | Event::DocumentStart
            | Event::DocumentEnd => {}
        }
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Tree {
        Tree::parse(text.as_bytes()).unwrap()
    }

    #[test]
    fn mapping_order_is_preserved() {
        let tree = parse("zebra: 1\nalpha: 2\nmiddle: 3\n");
        let payload = tree.payload().unwrap();
        let keys: Vec<&str> = tree
            .pairs(payload)
            .iter()
            .map(|(k, _)| tree.scalar(*k).unwrap())
            .collect();
        assert_eq!(keys, vec!["zebra", "alpha", "middle"]);
    }

    #[test]
    fn scalars_keep_textual_form_until_typed_read() {
        let tree = parse("count: 007\nratio: 1.50\n");
        let payload = tree.payload().unwrap();
        let count = tree.get(payload, "count").unwrap();
        assert_eq!(tree.scalar(count), Some("007"));
        assert_eq!(tree.scalar_i64(count), Some(7));
        let ratio = tree.get(payload, "ratio").unwrap();
        assert_eq!(tree.scalar(ratio), Some("1.50"));
        assert_eq!(tree.scalar_f64(ratio), Some(1.5));
    }

    #[test]
    fn quoted_scalars_stay_strings() {
        let tree = parse("version: \"1\"\n");
        let payload = tree.payload().unwrap();
        let version = tree.get(payload, "version").unwrap();
        assert_eq!(tree.scalar_style(version), Some(ScalarStyle::Quoted));

        let out = String::from_utf8(tree.render().unwrap()).unwrap();
        let reparsed = parse(&out);
        let payload = reparsed.payload().unwrap();
        let version = reparsed.get(payload, "version").unwrap();
        assert_eq!(reparsed.scalar(version), Some("1"));
        assert_eq!(reparsed.scalar_style(version), Some(ScalarStyle::Quoted));
    }

    #[test]
    fn json_input_is_detected_and_rendered_as_json() {
        let tree = parse("{\"openapi\": \"3.1.0\", \"count\": 3}");
        assert!(tree.is_json());
        let out = String::from_utf8(tree.render().unwrap()).unwrap();
        assert!(out.trim_start().starts_with('{'), "expected json: {out}");
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["count"], 3);
        assert_eq!(value["openapi"], "3.1.0");
    }

    #[test]
    fn nodes_carry_source_coordinates() {
        let tree = parse("a: 1\nb:\n  c: 2\n");
        let payload = tree.payload().unwrap();
        let b = tree.get(payload, "b").unwrap();
        let c = tree.get(b, "c").unwrap();
        assert_eq!(tree.line(c), 3);
    }

    #[test]
    fn aliases_copy_into_distinct_nodes() {
        let tree = parse("a: &shared {x: 1}\nb: *shared\n");
        let payload = tree.payload().unwrap();
        let a = tree.get(payload, "a").unwrap();
        let b = tree.get(payload, "b").unwrap();
        assert_ne!(a, b);
        assert_eq!(tree.content_hash(a), tree.content_hash(b));
    }

    #[test]
    fn content_hash_tracks_structure() {
        let tree = parse("a: {type: string}\nb: {type: string}\nc: {type: number}\n");
        let payload = tree.payload().unwrap();
        let a = tree.get(payload, "a").unwrap();
        let b = tree.get(payload, "b").unwrap();
        let c = tree.get(payload, "c").unwrap();
        assert_eq!(tree.content_hash(a), tree.content_hash(b));
        assert_ne!(tree.content_hash(a), tree.content_hash(c));
    }

    #[test]
    fn render_round_trips_node_content() {
        let text = "openapi: 3.1.0\ninfo:\n  title: T\n  version: \"1\"\npaths:\n  /x:\n    get:\n      summary: read\n";
        let tree = parse(text);
        let out = String::from_utf8(tree.render().unwrap()).unwrap();
        let reparsed = parse(&out);
        assert_eq!(
            tree.content_hash(tree.payload().unwrap()),
            reparsed.content_hash(reparsed.payload().unwrap()),
        );
    }

    #[test]
    fn copy_from_allocates_fresh_ids() {
        let src = parse("a:\n  nested: [1, 2]\n");
        let mut dst = parse("root: {}\n");
        let src_a = src.get(src.payload().unwrap(), "a").unwrap();
        let copied = dst.copy_from(&src, src_a);
        assert_eq!(dst.content_hash(copied), src.content_hash(src_a));
    }

    #[test]
    fn empty_document_renders_empty() {
        let tree = Tree::parse(b"").unwrap();
        assert!(tree.payload().is_none());
        assert!(tree.render().unwrap().is_empty());
    }
}
