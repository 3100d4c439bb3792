use std::path::Path;
use std::sync::Arc;

use refdex::{
    bundle_bytes, bundle_bytes_composed, bundle_document, CancelToken, CompositionConfig, Config,
    Document, Error, FileSource, LocalSource, LocalSourceConfig, NodeId, Tree,
};
use tempfile::TempDir;

/// Walk a key chain down from the document payload.
fn node_at(tree: &Tree, keys: &[&str]) -> Option<NodeId> {
    let mut current = tree.payload()?;
    for key in keys {
        current = tree.get(current, key)?;
    }
    Some(current)
}

fn scalar_at<'a>(tree: &'a Tree, keys: &[&str]) -> Option<&'a str> {
    tree.scalar(node_at(tree, keys)?)
}

fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

// ── Scenario 1: single local file, no references ──────────────────────

#[test]
fn bundling_a_ref_free_document_is_the_identity() {
    let input = b"openapi: 3.1.0\ninfo:\n  title: T\n  version: \"1\"\n";
    let bundled = bundle_bytes(input, &Config::default(), &CancelToken::new()).unwrap();

    let before = Tree::parse(input).unwrap();
    let after = Tree::parse(&bundled).unwrap();
    assert_eq!(
        before.content_hash(before.payload().unwrap()),
        after.content_hash(after.payload().unwrap()),
    );
}

// ── Scenario 2: local reference round-trip ────────────────────────────

#[test]
fn local_references_stay_valid_and_their_targets_survive() {
    let input = b"\
openapi: 3.1.0
info:
  title: T
  version: \"1\"
paths:
  /x:
    get:
      responses:
        '200':
          content:
            application/json:
              schema:
                $ref: '#/components/schemas/A'
components:
  schemas:
    A:
      type: string
";
    let bundled = bundle_bytes(input, &Config::default(), &CancelToken::new()).unwrap();
    let tree = Tree::parse(&bundled).unwrap();

    // The root-local reference is left as written (it is still valid in
    // the bundled document) and its target remains present, so the
    // schema node still denotes {type: string}.
    let schema = node_at(
        &tree,
        &["paths", "/x", "get", "responses", "200", "content", "application/json", "schema"],
    )
    .unwrap();
    assert_eq!(tree.scalar(tree.get(schema, "$ref").unwrap()), Some("#/components/schemas/A"));
    assert_eq!(scalar_at(&tree, &["components", "schemas", "A", "type"]), Some("string"));
}

// ── Scenario 3: external reference, both modes ────────────────────────

fn external_tree_fixture() -> (TempDir, Vec<u8>, Config) {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "external.yaml",
        "\
components:
  schemas:
    Tree:
      type: object
      properties:
        name:
          type: string
",
    );
    let root = b"\
openapi: 3.1.0
info:
  title: T
  version: \"1\"
paths:
  /tree:
    get:
      responses:
        '200':
          content:
            application/json:
              schema:
                $ref: './external.yaml#/components/schemas/Tree'
"
    .to_vec();
    let config = Config::open_local(tmp.path());
    (tmp, root, config)
}

#[test]
fn external_references_inline_to_their_target_content() {
    let (_tmp, root, config) = external_tree_fixture();
    let bundled = bundle_bytes(&root, &config, &CancelToken::new()).unwrap();
    let tree = Tree::parse(&bundled).unwrap();

    let schema = node_at(
        &tree,
        &["paths", "/tree", "get", "responses", "200", "content", "application/json", "schema"],
    )
    .unwrap();
    assert!(tree.get(schema, "$ref").is_none(), "reference should be gone");
    assert_eq!(tree.scalar(tree.get(schema, "type").unwrap()), Some("object"));
    assert_eq!(
        scalar_at(&tree, &["paths", "/tree", "get", "responses", "200", "content", "application/json", "schema", "properties", "name", "type"]),
        Some("string"),
    );
}

#[test]
fn external_references_compose_into_root_components() {
    let (_tmp, root, config) = external_tree_fixture();
    let bundled = bundle_bytes_composed(
        &root,
        &config,
        &CompositionConfig::default(),
        &CancelToken::new(),
    )
    .unwrap();
    let tree = Tree::parse(&bundled).unwrap();

    assert_eq!(
        scalar_at(&tree, &["components", "schemas", "Tree", "type"]),
        Some("object"),
    );
    let schema = node_at(
        &tree,
        &["paths", "/tree", "get", "responses", "200", "content", "application/json", "schema"],
    )
    .unwrap();
    assert_eq!(
        tree.scalar(tree.get(schema, "$ref").unwrap()),
        Some("#/components/schemas/Tree"),
    );
}

// ── Scenario 4: name collision under compose ──────────────────────────

#[test]
fn colliding_names_are_suffixed_in_first_seen_order() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "one.yaml",
        "components:\n  schemas:\n    Tree:\n      type: object\n",
    );
    write(
        tmp.path(),
        "two.yaml",
        "components:\n  schemas:\n    Tree:\n      type: string\n",
    );
    let root = b"\
openapi: 3.1.0
paths:
  /a:
    get:
      responses:
        '200':
          content:
            application/json:
              schema:
                $ref: 'one.yaml#/components/schemas/Tree'
  /b:
    get:
      responses:
        '200':
          content:
            application/json:
              schema:
                $ref: 'two.yaml#/components/schemas/Tree'
";
    let bundled = bundle_bytes_composed(
        root,
        &Config::open_local(tmp.path()),
        &CompositionConfig::default(),
        &CancelToken::new(),
    )
    .unwrap();
    let tree = Tree::parse(&bundled).unwrap();

    assert_eq!(scalar_at(&tree, &["components", "schemas", "Tree", "type"]), Some("object"));
    assert_eq!(scalar_at(&tree, &["components", "schemas", "Tree__1", "type"]), Some("string"));

    let first = node_at(&tree, &["paths", "/a", "get", "responses", "200", "content", "application/json", "schema"]).unwrap();
    let second = node_at(&tree, &["paths", "/b", "get", "responses", "200", "content", "application/json", "schema"]).unwrap();
    assert_eq!(tree.scalar(tree.get(first, "$ref").unwrap()), Some("#/components/schemas/Tree"));
    assert_eq!(tree.scalar(tree.get(second, "$ref").unwrap()), Some("#/components/schemas/Tree__1"));
}

// ── Scenario 5: circular local reference ──────────────────────────────

#[test]
fn circular_references_are_recorded_and_left_in_place() {
    let input = b"\
openapi: 3.1.0
components:
  schemas:
    A:
      type: object
      properties:
        child:
          $ref: '#/components/schemas/A'
";
    let mut document =
        Document::parse(input, &Config::default(), &CancelToken::new()).unwrap();
    let bundled = bundle_document(&mut document, &CancelToken::new()).unwrap();

    let chains = document.rolodex().root_index().unwrap().circular_chains();
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].sites.len(), 1);

    let tree = Tree::parse(&bundled).unwrap();
    assert_eq!(
        scalar_at(&tree, &["components", "schemas", "A", "properties", "child", "$ref"]),
        Some("#/components/schemas/A"),
    );
}

// ── Scenario 6: external recursive schema, both flag settings ─────────

fn recursive_fixture() -> (TempDir, Vec<u8>) {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "external.yaml",
        "\
components:
  schemas:
    Tree:
      type: object
      properties:
        child:
          $ref: '#/components/schemas/Tree'
",
    );
    let root = b"\
openapi: 3.1.0
paths:
  /tree:
    get:
      responses:
        '200':
          content:
            application/json:
              schema:
                $ref: './external.yaml#/components/schemas/Tree'
"
    .to_vec();
    (tmp, root)
}

#[test]
fn recursive_external_schemas_dangle_without_the_flag() {
    let (tmp, root) = recursive_fixture();
    let bundled = bundle_bytes(&root, &Config::open_local(tmp.path()), &CancelToken::new()).unwrap();
    let tree = Tree::parse(&bundled).unwrap();

    // Historical behavior: the body is copied, its self reference comes
    // along verbatim, and nothing in the root satisfies it.
    let schema = node_at(&tree, &["paths", "/tree", "get", "responses", "200", "content", "application/json", "schema"]).unwrap();
    assert_eq!(tree.scalar(tree.get(schema, "type").unwrap()), Some("object"));
    assert_eq!(
        scalar_at(&tree, &["paths", "/tree", "get", "responses", "200", "content", "application/json", "schema", "properties", "child", "$ref"]),
        Some("#/components/schemas/Tree"),
    );
    assert!(node_at(&tree, &["components", "schemas", "Tree"]).is_none());
}

#[test]
fn recursive_external_schemas_compose_with_the_flag() {
    let (tmp, root) = recursive_fixture();
    let config = Config {
        resolve_recursive_external_schemas: true,
        ..Config::open_local(tmp.path())
    };
    let bundled = bundle_bytes(&root, &config, &CancelToken::new()).unwrap();
    let tree = Tree::parse(&bundled).unwrap();

    let schema = node_at(&tree, &["paths", "/tree", "get", "responses", "200", "content", "application/json", "schema"]).unwrap();
    assert_eq!(
        tree.scalar(tree.get(schema, "$ref").unwrap()),
        Some("#/components/schemas/Tree"),
    );
    // The hoisted schema keeps its (now root-valid) self reference.
    assert_eq!(scalar_at(&tree, &["components", "schemas", "Tree", "type"]), Some("object"));
    assert_eq!(
        scalar_at(&tree, &["components", "schemas", "Tree", "properties", "child", "$ref"]),
        Some("#/components/schemas/Tree"),
    );
}

// ── Discriminator pinning ─────────────────────────────────────────────

fn discriminator_fixture() -> (TempDir, Vec<u8>) {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "pets.yaml",
        "\
components:
  schemas:
    Cat:
      type: object
    Dog:
      type: object
",
    );
    let root = b"\
openapi: 3.1.0
components:
  schemas:
    Pet:
      discriminator:
        propertyName: petType
        mapping:
          cat: 'pets.yaml#/components/schemas/Cat'
          dog: 'pets.yaml#/components/schemas/Dog'
      oneOf:
        - $ref: 'pets.yaml#/components/schemas/Cat'
        - $ref: 'pets.yaml#/components/schemas/Dog'
"
    .to_vec();
    (tmp, root)
}

#[test]
fn discriminator_pinned_references_are_not_inlined() {
    let (tmp, root) = discriminator_fixture();
    let bundled = bundle_bytes(&root, &Config::open_local(tmp.path()), &CancelToken::new()).unwrap();
    let tree = Tree::parse(&bundled).unwrap();

    let one_of = node_at(&tree, &["components", "schemas", "Pet", "oneOf"]).unwrap();
    let variants: Vec<&str> = tree
        .items(one_of)
        .iter()
        .map(|item| tree.scalar(tree.get(*item, "$ref").unwrap()).unwrap())
        .collect();
    assert_eq!(
        variants,
        vec![
            "pets.yaml#/components/schemas/Cat",
            "pets.yaml#/components/schemas/Dog",
        ],
    );
}

#[test]
fn discriminator_variants_can_be_lifted_into_root_components() {
    let (tmp, root) = discriminator_fixture();
    let config = Config {
        resolve_discriminator_external_refs: true,
        ..Config::open_local(tmp.path())
    };
    let bundled = bundle_bytes(&root, &config, &CancelToken::new()).unwrap();
    let tree = Tree::parse(&bundled).unwrap();

    let one_of = node_at(&tree, &["components", "schemas", "Pet", "oneOf"]).unwrap();
    let variants: Vec<&str> = tree
        .items(one_of)
        .iter()
        .map(|item| tree.scalar(tree.get(*item, "$ref").unwrap()).unwrap())
        .collect();
    assert_eq!(
        variants,
        vec!["#/components/schemas/Cat", "#/components/schemas/Dog"],
    );
    assert_eq!(scalar_at(&tree, &["components", "schemas", "Cat", "type"]), Some("object"));
    assert_eq!(scalar_at(&tree, &["components", "schemas", "Dog", "type"]), Some("object"));
}

// ── Compose idempotency ───────────────────────────────────────────────

#[test]
fn composing_a_composed_document_changes_nothing() {
    let (_tmp, root, config) = external_tree_fixture();
    let cancel = CancelToken::new();
    let once = bundle_bytes_composed(&root, &config, &CompositionConfig::default(), &cancel).unwrap();
    let twice = bundle_bytes_composed(&once, &Config::default(), &CompositionConfig::default(), &cancel).unwrap();

    let first = Tree::parse(&once).unwrap();
    let second = Tree::parse(&twice).unwrap();
    let components_a = node_at(&first, &["components"]).unwrap();
    let components_b = node_at(&second, &["components"]).unwrap();
    assert_eq!(first.content_hash(components_a), second.content_hash(components_b));
}

// ── Ordering ──────────────────────────────────────────────────────────

#[test]
fn mapping_order_is_preserved_and_composed_components_append() {
    let (_tmp, root, config) = external_tree_fixture();
    let bundled = bundle_bytes_composed(
        &root,
        &config,
        &CompositionConfig::default(),
        &CancelToken::new(),
    )
    .unwrap();
    let tree = Tree::parse(&bundled).unwrap();

    let payload = tree.payload().unwrap();
    let top_keys: Vec<&str> = tree
        .pairs(payload)
        .iter()
        .map(|(k, _)| tree.scalar(*k).unwrap())
        .collect();
    // Input order, with the created components section appended last.
    assert_eq!(top_keys, vec!["openapi", "info", "paths", "components"]);
}

// ── JSON in, JSON out ─────────────────────────────────────────────────

#[test]
fn json_input_renders_json_output() {
    let input = br#"{"openapi": "3.1.0", "info": {"title": "T", "version": "1"}}"#;
    let bundled = bundle_bytes(input, &Config::default(), &CancelToken::new()).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bundled).unwrap();
    assert_eq!(value["info"]["title"], "T");
}

// ── Failure accumulation ──────────────────────────────────────────────

#[test]
fn missing_externals_report_incomplete_with_a_best_effort_document() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "present.yaml", "components:\n  schemas:\n    A:\n      type: string\n");
    let root = b"\
openapi: 3.1.0
paths:
  /a:
    get:
      responses:
        '200':
          content:
            application/json:
              schema:
                $ref: 'present.yaml#/components/schemas/A'
  /b:
    get:
      responses:
        '200':
          content:
            application/json:
              schema:
                $ref: 'missing.yaml#/components/schemas/B'
";
    let result = bundle_bytes(root, &Config::open_local(tmp.path()), &CancelToken::new());
    let Err(Error::Incomplete { errors, rendered }) = result else {
        panic!("expected Incomplete");
    };
    assert!(!errors.is_empty());

    // The resolvable branch still bundled.
    let tree = Tree::parse(&rendered.unwrap()).unwrap();
    assert_eq!(
        scalar_at(&tree, &["paths", "/a", "get", "responses", "200", "content", "application/json", "schema", "type"]),
        Some("string"),
    );
}

// ── Scenario 7: concurrency law ───────────────────────────────────────

#[test]
fn one_hundred_concurrent_opens_read_once() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "spec.yaml", "openapi: 3.1.0\n");
    let path = tmp.path().join("spec.yaml");

    // Lazy mode: nothing loaded until the first open.
    let source = Arc::new(
        LocalSource::new(LocalSourceConfig::default()).unwrap(),
    );
    assert_eq!(source.reads(), 0);

    let mut handles = Vec::new();
    for _ in 0..100 {
        let source = Arc::clone(&source);
        let path = path.clone();
        handles.push(std::thread::spawn(move || {
            let cancel = CancelToken::new();
            source.open(path.to_str().unwrap(), &cancel).unwrap()
        }));
    }

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.len(), 100);
    assert!(results.iter().all(|bytes| bytes.as_slice() == b"openapi: 3.1.0\n"));
    assert_eq!(source.reads(), 1, "fetch must run exactly once");
}
