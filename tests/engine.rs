//! End-to-end tests over synthetic workspace exports: extraction into the
//! relational index, inheritance resolution, payload building and the
//! portable schema export.

use std::collections::{HashMap, HashSet};

use supertag_index::extract::{index_graph, IndexOptions};
use supertag_index::payload::{FieldValue, PayloadBuilder};
use supertag_index::values::{FieldValueExtractor, ValueExtractorOptions};
use supertag_index::{
    parse_schema_document, to_schema_registry_json, IndexError, InheritanceResolver,
    MetadataStore, Node, NodeGraph, SchemaQueryFacade,
};

fn node(id: &str, name: Option<&str>, doc_type: Option<&str>, children: &[&str]) -> Node {
    Node {
        id: id.to_string(),
        name: name.map(String::from),
        doc_type: doc_type.map(String::from),
        children: children.iter().map(|c| c.to_string()).collect(),
        ..Node::default()
    }
}

fn tag_def(id: &str, name: &str, children: &[&str]) -> Node {
    node(id, Some(name), Some("tagDef"), children)
}

fn tuple(id: &str, children: &[&str]) -> Node {
    node(id, None, Some("tuple"), children)
}

/// A tag definition plus the meta scaffolding declaring its parents.
fn tag_extending(id: &str, name: &str, field_tuples: &[&str], parents: &[&str]) -> Vec<Node> {
    let meta_id = format!("{id}-meta");
    let ext_id = format!("{id}-ext");
    let mut tag = tag_def(id, name, field_tuples);
    tag.meta_node_id = Some(meta_id.clone());

    let mut ext_children = vec!["SYS_A12".to_string()];
    ext_children.extend(parents.iter().map(|p| p.to_string()));
    let mut ext = tuple(&ext_id, &[]);
    ext.children = ext_children;

    vec![tag, node(&meta_id, None, None, &[ext_id.as_str()]), ext]
}

/// The diamond fixture: d -> b, c ; b -> a ; c -> a, with one field on `a`
/// and one on `d`.
fn diamond_graph() -> NodeGraph {
    let mut nodes = Vec::new();
    nodes.extend(tag_extending("tag-a", "base", &["tup-a"], &[]));
    nodes.extend(tag_extending("tag-b", "left", &[], &["tag-a"]));
    nodes.extend(tag_extending("tag-c", "right", &[], &["tag-a"]));
    nodes.extend(tag_extending("tag-d", "leaf", &["tup-d"], &["tag-b", "tag-c"]));
    nodes.push(tuple("tup-a", &["lbl-notes"]));
    nodes.push(node("lbl-notes", Some("Notes"), None, &[]));
    nodes.push(tuple("tup-d", &["lbl-status"]));
    nodes.push(node("lbl-status", Some("Status"), None, &[]));
    NodeGraph::from_nodes(nodes)
}

#[test]
fn indexes_export_json_end_to_end() {
    let export = r#"{
      "docs": [
        {"id": "tag-item", "name": "item", "docType": "tagDef", "children": ["tup-notes"]},
        {"id": "tup-notes", "docType": "tuple", "children": ["lbl-notes"]},
        {"id": "lbl-notes", "name": "Notes"},
        {"id": "tag-todo", "name": "todo", "docType": "tagDef",
         "metaNodeId": "todo-meta", "children": ["tup-due", "tup-status"]},
        {"id": "todo-meta", "children": ["todo-ext"]},
        {"id": "todo-ext", "docType": "tuple", "children": ["SYS_A12", "tag-item", "SYS_T1"]},
        {"id": "tup-due", "docType": "tuple", "children": ["SYS_A61"]},
        {"id": "tup-status", "docType": "tuple", "children": ["lbl-status"]},
        {"id": "lbl-status", "name": "Status"}
      ]
    }"#;
    let graph = NodeGraph::from_json_str(export).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = MetadataStore::open(dir.path().join("index.db")).unwrap();
    let stats = index_graph(&graph, &store, &IndexOptions::default()).unwrap();

    assert_eq!(stats.tag_defs_processed, 2);
    assert_eq!(stats.fields_extracted, 3);
    // "SYS_T1" does not resolve to a tagDef and is dropped.
    assert_eq!(stats.parents_extracted, 1);

    let facade = SchemaQueryFacade::new(&store);
    let todo = facade.find_by_name("todo").unwrap().unwrap();
    assert_eq!(todo.canonical.tag_id, "tag-todo");

    let resolver = InheritanceResolver::with_graph(&store, &graph);
    let fields = resolver.all_fields("tag-todo").unwrap();
    assert_eq!(fields.len(), 3);
    assert_eq!(fields[0].field.field_name, "Due date");
    assert_eq!(fields[0].field.field_order, 0);
    assert_eq!(fields[1].field.field_name, "Status");
    assert_eq!(fields[1].field.field_order, 1);
    assert_eq!(fields[2].field.field_name, "Notes");
    assert_eq!(fields[2].depth, 1);
    assert_eq!(fields[2].origin_tag_name, "item");
}

#[test]
fn all_fields_never_repeats_a_normalized_name() {
    let graph = diamond_graph();
    let store = MetadataStore::in_memory().unwrap();
    index_graph(&graph, &store, &IndexOptions::default()).unwrap();

    let resolver = InheritanceResolver::new(&store);
    for tag in store.all_tags().unwrap() {
        let fields = resolver.all_fields(&tag.tag_id).unwrap();
        let names: Vec<&str> = fields
            .iter()
            .map(|f| f.field.normalized_name.as_str())
            .collect();
        let unique: HashSet<&str> = names.iter().copied().collect();
        assert_eq!(names.len(), unique.len(), "duplicates for {}", tag.tag_name);
    }
}

#[test]
fn diamond_inheritance_resolves_once_at_depth_two() {
    let graph = diamond_graph();
    let store = MetadataStore::in_memory().unwrap();
    index_graph(&graph, &store, &IndexOptions::default()).unwrap();

    let resolver = InheritanceResolver::new(&store);

    let ancestors = resolver.ancestors("tag-d").unwrap();
    assert_eq!(ancestors.len(), 3);
    let a = ancestors.iter().find(|x| x.tag_id == "tag-a").unwrap();
    assert_eq!(a.depth, 2);

    let fields = resolver.all_fields("tag-d").unwrap();
    let from_a: Vec<_> = fields.iter().filter(|f| f.origin_tag_id == "tag-a").collect();
    assert_eq!(from_a.len(), 1);
    assert_eq!(from_a[0].field.field_name, "Notes");
    assert_eq!(from_a[0].depth, 2);
}

#[test]
fn inheritance_cycle_terminates() {
    let mut nodes = Vec::new();
    nodes.extend(tag_extending("cyc-a", "alpha", &[], &["cyc-b"]));
    nodes.extend(tag_extending("cyc-b", "beta", &[], &["cyc-c"]));
    nodes.extend(tag_extending("cyc-c", "gamma", &[], &["cyc-a"]));
    let graph = NodeGraph::from_nodes(nodes);

    let store = MetadataStore::in_memory().unwrap();
    index_graph(&graph, &store, &IndexOptions::default()).unwrap();

    let resolver = InheritanceResolver::new(&store);
    let ancestors = resolver.ancestors("cyc-a").unwrap();
    assert!(ancestors.len() <= 10);
    assert!(ancestors.iter().all(|a| a.tag_id != "cyc-a"));

    let report = supertag_index::lint_store(&store).unwrap();
    assert_eq!(report.cycles.len(), 1);
}

#[test]
fn payload_uses_reference_default() {
    // One field "When" typed reference with default {id: "later-id", "Later"}.
    let mut nodes = Vec::new();
    nodes.push(tag_def("tag-todo", "todo", &["tup-when"]));
    nodes.push(tuple("tup-when", &["lbl-when", "later-id"]));
    let mut label = node("lbl-when", Some("When"), None, &[]);
    label.meta_node_id = Some("when-meta".to_string());
    nodes.push(label);
    nodes.push(node("when-meta", None, None, &["when-type"]));
    nodes.push(tuple("when-type", &["SYS_A15", "type-ref"]));
    nodes.push(node("type-ref", Some("Reference"), None, &[]));
    nodes.push(node("later-id", Some("Later"), None, &[]));
    let graph = NodeGraph::from_nodes(nodes);

    let store = MetadataStore::in_memory().unwrap();
    index_graph(&graph, &store, &IndexOptions::default()).unwrap();

    let fields = store.own_fields("tag-todo").unwrap();
    let when = &fields[0];
    assert_eq!(when.data_type.as_deref(), Some("reference"));
    assert_eq!(when.default_value_id.as_deref(), Some("later-id"));
    assert_eq!(when.default_value_text.as_deref(), Some("Later"));

    let builder = PayloadBuilder::new(&store, &graph);
    let payload = builder
        .build_from_spec("todo", "X", &HashMap::new())
        .unwrap();

    assert_eq!(payload.children.len(), 1);
    let json = serde_json::to_value(&payload).unwrap();
    assert_eq!(json["children"][0]["children"][0]["dataType"], "reference");
    assert_eq!(json["children"][0]["children"][0]["id"], "later-id");
}

#[test]
fn payload_resolves_at_names_against_the_graph() {
    let mut nodes = Vec::new();
    nodes.push(tag_def("tag-task", "task", &["tup-status"]));
    nodes.push(tuple("tup-status", &["lbl-status"]));
    nodes.push(node("lbl-status", Some("Status"), None, &[]));
    nodes.push(node("open-node", Some("Open"), None, &[]));
    let graph = NodeGraph::from_nodes(nodes);

    let store = MetadataStore::in_memory().unwrap();
    index_graph(&graph, &store, &IndexOptions::default()).unwrap();
    let builder = PayloadBuilder::new(&store, &graph);

    let mut values = HashMap::new();
    values.insert("status".to_string(), FieldValue::from("@Open"));
    let payload = builder.build_from_spec("task", "X", &values).unwrap();
    let json = serde_json::to_value(&payload).unwrap();
    assert_eq!(json["children"][0]["children"][0]["dataType"], "reference");
    assert_eq!(json["children"][0]["children"][0]["id"], "open-node");

    let mut values = HashMap::new();
    values.insert("status".to_string(), FieldValue::from("@Missing"));
    let payload = builder.build_from_spec("task", "X", &values).unwrap();
    let json = serde_json::to_value(&payload).unwrap();
    assert_eq!(json["children"][0]["children"][0]["name"], "Missing");
    assert!(json["children"][0]["children"][0].get("dataType").is_none());
}

#[test]
fn unknown_supertag_fails_the_whole_call() {
    let graph = diamond_graph();
    let store = MetadataStore::in_memory().unwrap();
    index_graph(&graph, &store, &IndexOptions::default()).unwrap();

    let builder = PayloadBuilder::new(&store, &graph);
    let err = builder
        .build_from_spec("leaf, nonsense", "X", &HashMap::new())
        .unwrap_err();
    assert!(matches!(err, IndexError::UnknownSupertag { .. }));
}

#[test]
fn schema_export_round_trips() {
    let graph = diamond_graph();
    let store = MetadataStore::in_memory().unwrap();
    index_graph(&graph, &store, &IndexOptions::default()).unwrap();

    let json = to_schema_registry_json(&store).unwrap();
    let parsed = parse_schema_document(&json).unwrap();

    assert_eq!(parsed.version, 1);
    assert_eq!(parsed.supertags.len(), 4);

    let leaf = parsed.supertags.iter().find(|t| t.name == "leaf").unwrap();
    assert_eq!(leaf.extends, vec!["tag-b", "tag-c"]);
    assert_eq!(leaf.fields.len(), 1);
    assert_eq!(leaf.fields[0].attribute_id, "lbl-status");

    // Same tag set and extends arrays as the store.
    let store_ids: HashSet<String> = store
        .all_tags()
        .unwrap()
        .into_iter()
        .map(|t| t.tag_id)
        .collect();
    let doc_ids: HashSet<String> = parsed.supertags.iter().map(|t| t.id.clone()).collect();
    assert_eq!(store_ids, doc_ids);
    for supertag in &parsed.supertags {
        assert_eq!(supertag.extends, store.direct_parents(&supertag.id).unwrap());
    }
}

#[test]
fn trashed_tags_never_reach_the_query_surface() {
    let mut trashed = tag_def("tag-old", "archive", &[]);
    trashed.owner_id = Some("ws_TRASH".to_string());
    let graph = NodeGraph::from_nodes(vec![trashed, tag_def("tag-live", "notes", &[])]);

    let store = MetadataStore::in_memory().unwrap();
    let stats = index_graph(&graph, &store, &IndexOptions::default()).unwrap();
    assert_eq!(stats.trashed_skipped, 1);

    let facade = SchemaQueryFacade::new(&store);
    assert!(facade.find_by_name("archive").unwrap().is_none());
    assert!(facade.find_by_name("notes").unwrap().is_some());
}

#[test]
fn value_pass_extracts_system_field_and_skips_mega_tuples() {
    let mut nodes = vec![
        node("page", Some("Inbox"), None, &["tup-due"]),
        tuple("tup-due", &["SYS_A61", "val-date"]),
        node("val-date", Some("2025-10-26"), None, &[]),
    ];
    // 51-child tuple: the bulk-content encoding.
    let mut mega_children = vec!["lbl-mega".to_string()];
    for i in 0..50 {
        let id = format!("m{i:02}");
        nodes.push(node(&id, Some("x"), None, &[]));
        mega_children.push(id);
    }
    let mut mega = tuple("tup-mega", &[]);
    mega.children = mega_children;
    nodes.push(mega);
    nodes.push(node("lbl-mega", Some("Bulk"), None, &[]));

    let graph = NodeGraph::from_nodes(nodes);
    let store = MetadataStore::in_memory().unwrap();
    let extractor = FieldValueExtractor::new(&graph, ValueExtractorOptions::default());
    extractor.extract_into(&store).unwrap();

    let due = store.field_values_for("duedate").unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].field_name, "Due date");
    assert_eq!(due[0].value_text, "2025-10-26");
    assert_eq!(due[0].source_node_id.as_deref(), Some("page"));

    assert!(store.field_values_for("bulk").unwrap().is_empty());
    assert_eq!(store.field_value_count().unwrap(), 1);
}

#[test]
fn reindexing_is_idempotent_and_order_stable() {
    let graph = diamond_graph();
    let store = MetadataStore::in_memory().unwrap();

    index_graph(&graph, &store, &IndexOptions::default()).unwrap();
    let first = to_schema_registry_json(&store).unwrap();

    index_graph(&graph, &store, &IndexOptions::default()).unwrap();
    let second = to_schema_registry_json(&store).unwrap();

    assert_eq!(first, second);
}
