//! Tag definition extraction
//!
//! Walks the node graph, finds tag-definition nodes, and normalizes each into
//! `(TagMetadataEntry, FieldDefinition[], parent ids)` for the store. The
//! graph is externally produced and loosely typed: anything malformed is
//! skipped and counted, never surfaced as an error.

use chrono::Utc;
use tracing::{debug, info};

use crate::error::Result;
use crate::graph::{Node, NodeGraph};
use crate::markers::{
    system_field, DATA_TYPE_MARKER, INHERITANCE_MARKER, TARGET_TAG_MARKER, TRASH_MARKER,
};
use crate::normalize::normalize_name;
use crate::store::{FieldDefinition, MetadataStore, TagMetadataEntry};

/// Upper bound on the ownership walk used for trash detection.
pub const MAX_OWNER_HOPS: usize = 20;

/// Counters for one indexing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub tag_defs_processed: usize,
    pub fields_extracted: usize,
    pub parents_extracted: usize,
    pub trashed_skipped: usize,
}

/// One tag definition, fully extracted but not yet persisted.
#[derive(Debug, Clone)]
pub struct ExtractedTag {
    pub tag: TagMetadataEntry,
    pub fields: Vec<FieldDefinition>,
    pub parents: Vec<String>,
}

/// Options for a whole-graph indexing pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexOptions {
    /// Index trashed tags (flagged) instead of skipping them.
    pub include_trashed: bool,
}

/// Extracts tag metadata, field definitions and parent ids from tag-definition
/// nodes.
pub struct TagDefinitionExtractor<'g> {
    graph: &'g NodeGraph,
}

impl<'g> TagDefinitionExtractor<'g> {
    pub fn new(graph: &'g NodeGraph) -> Self {
        Self { graph }
    }

    /// Extract one tag definition. Returns `None` for non-tagDef nodes and
    /// for definitions without a usable display name.
    pub fn extract(&self, node: &Node) -> Option<ExtractedTag> {
        if !node.is_tag_def() {
            return None;
        }
        let Some(name) = node.display_name() else {
            debug!(id = %node.id, "tag definition without a name, skipped");
            return None;
        };

        let tag = TagMetadataEntry {
            tag_id: node.id.clone(),
            tag_name: name.to_string(),
            normalized_name: normalize_name(name),
            description: node.description.clone(),
            color: node.color.clone(),
            trashed: self.is_trashed(node),
        };

        Some(ExtractedTag {
            fields: self.extract_fields(node),
            parents: self.extract_parents(node),
            tag,
        })
    }

    /// Walk `ownerId` upward looking for the trash collection. The walk is
    /// bounded; hitting the bound counts as not trashed.
    fn is_trashed(&self, node: &Node) -> bool {
        let mut current = node;
        for _ in 0..MAX_OWNER_HOPS {
            let Some(owner_id) = current.owner_id.as_deref() else {
                return false;
            };
            if owner_id.contains(TRASH_MARKER) {
                return true;
            }
            match self.graph.get(owner_id) {
                Some(owner) => current = owner,
                None => return false,
            }
        }
        false
    }

    /// A tag's own fields, in child order. A child qualifies when it is a
    /// tuple with at least one child whose first child resolves to a field
    /// label: either a known system marker (which need not exist as a node)
    /// or a node with a non-empty name. Skipped children do not consume an
    /// order slot.
    fn extract_fields(&self, tag_node: &Node) -> Vec<FieldDefinition> {
        let mut fields: Vec<FieldDefinition> = Vec::new();

        for child_id in &tag_node.children {
            let Some(tuple) = self.graph.get(child_id) else {
                continue;
            };
            if !tuple.is_tuple() || tuple.children.is_empty() {
                continue;
            }

            let label_id = &tuple.children[0];
            let (field_name, data_type, target) = if let Some(sys) = system_field(label_id) {
                (
                    sys.name.to_string(),
                    sys.data_type.map(String::from),
                    (None, None),
                )
            } else {
                let Some(label) = self.graph.get(label_id) else {
                    debug!(tag = %tag_node.id, label = %label_id, "unresolved field label, skipped");
                    continue;
                };
                let Some(name) = label.display_name() else {
                    continue;
                };
                (
                    name.to_string(),
                    self.declared_data_type(label),
                    self.declared_target_tag(label),
                )
            };

            let (default_value_id, default_value_text) = tuple
                .children
                .get(1)
                .and_then(|id| self.graph.get(id))
                .and_then(|n| n.display_name().map(|t| (n.id.clone(), t.to_string())))
                .map_or((None, None), |(id, text)| (Some(id), Some(text)));

            let normalized_name = normalize_name(&field_name);
            fields.push(FieldDefinition {
                tag_id: tag_node.id.clone(),
                field_name,
                field_label_id: label_id.clone(),
                field_order: fields.len() as i64,
                normalized_name,
                data_type,
                target_supertag_id: target.0,
                target_supertag_name: target.1,
                default_value_id,
                default_value_text,
            });
        }

        fields
    }

    /// Direct parent tag ids, read from the inheritance tuple on the tag's
    /// meta node. Candidate ids that do not resolve to tag definitions
    /// (further system references, dangling ids) are dropped silently.
    fn extract_parents(&self, tag_node: &Node) -> Vec<String> {
        let Some(meta) = tag_node
            .meta_node_id
            .as_deref()
            .and_then(|id| self.graph.get(id))
        else {
            return Vec::new();
        };
        let Some(tuple) = self.find_marker_tuple(meta, INHERITANCE_MARKER) else {
            return Vec::new();
        };

        tuple
            .children
            .iter()
            .skip(1)
            .filter(|id| self.graph.get(id.as_str()).is_some_and(Node::is_tag_def))
            .cloned()
            .collect()
    }

    /// First tuple among `meta`'s immediate children whose first child is the
    /// given marker, either as a bare literal or (legacy exports) wrapped in
    /// a node literally named with the marker.
    fn find_marker_tuple(&self, meta: &'g Node, marker: &str) -> Option<&'g Node> {
        for child_id in &meta.children {
            let Some(child) = self.graph.get(child_id) else {
                continue;
            };
            if !child.is_tuple() {
                continue;
            }
            let Some(first) = child.children.first() else {
                continue;
            };
            if first == marker {
                return Some(child);
            }
            if self
                .graph
                .get(first)
                .and_then(Node::display_name)
                .is_some_and(|name| name == marker)
            {
                return Some(child);
            }
        }
        None
    }

    /// Data type declared on a field label's meta node, lowercased. The
    /// declared value may be a node (named with the type) or a bare literal.
    fn declared_data_type(&self, label: &Node) -> Option<String> {
        let meta = label.meta_node_id.as_deref().and_then(|id| self.graph.get(id))?;
        let tuple = self.find_marker_tuple(meta, DATA_TYPE_MARKER)?;
        let value_id = tuple.children.get(1)?;
        let declared = self.graph.name_of(value_id).unwrap_or(value_id);
        Some(declared.to_ascii_lowercase())
    }

    /// Target supertag declared on a reference/options field label, accepted
    /// only when it resolves to a tag definition.
    fn declared_target_tag(&self, label: &Node) -> (Option<String>, Option<String>) {
        let Some(meta) = label.meta_node_id.as_deref().and_then(|id| self.graph.get(id)) else {
            return (None, None);
        };
        let Some(tuple) = self.find_marker_tuple(meta, TARGET_TAG_MARKER) else {
            return (None, None);
        };
        let Some(target) = tuple.children.get(1).and_then(|id| self.graph.get(id)) else {
            return (None, None);
        };
        if !target.is_tag_def() {
            return (None, None);
        }
        (
            Some(target.id.clone()),
            target.display_name().map(String::from),
        )
    }
}

/// Full re-index: clear the store, extract every tag definition, stamp the
/// snapshot hash. Nodes are visited in sorted-id order so "first-seen"
/// tie-breaks are stable across runs.
pub fn index_graph(
    graph: &NodeGraph,
    store: &MetadataStore,
    options: &IndexOptions,
) -> Result<ExtractionStats> {
    store.clear()?;

    let extractor = TagDefinitionExtractor::new(graph);
    let mut stats = ExtractionStats::default();

    for id in graph.sorted_ids() {
        let Some(node) = graph.get(id) else { continue };
        if !node.is_tag_def() {
            continue;
        }
        let Some(extracted) = extractor.extract(node) else {
            continue;
        };
        if extracted.tag.trashed {
            stats.trashed_skipped += 1;
            if !options.include_trashed {
                debug!(tag = %extracted.tag.tag_name, "trashed tag excluded from index");
                continue;
            }
        }

        store.upsert_tag(&extracted.tag)?;
        for field in &extracted.fields {
            store.upsert_field(field)?;
        }
        for parent in &extracted.parents {
            store.insert_parent(&extracted.tag.tag_id, parent)?;
        }

        stats.tag_defs_processed += 1;
        stats.fields_extracted += extracted.fields.len();
        stats.parents_extracted += extracted.parents.len();
    }

    store.set_meta("snapshot_hash", graph.snapshot_hash())?;
    store.set_meta("indexed_at", &Utc::now().to_rfc3339())?;

    info!(
        tag_defs = stats.tag_defs_processed,
        fields = stats.fields_extracted,
        parents = stats.parents_extracted,
        trashed = stats.trashed_skipped,
        "indexed workspace export"
    );

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeGraph;

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

    #[test]
    fn skipped_children_do_not_consume_order_slots() {
        let graph = NodeGraph::from_nodes(vec![
            tag_def("tag1", "Todo", &["plain", "tup-bad", "tup-status", "tup-due"]),
            node("plain", Some("just a note"), None, &[]),
            // Tuple whose label does not resolve: skipped.
            tuple("tup-bad", &["missing-label"]),
            tuple("tup-status", &["lbl-status"]),
            node("lbl-status", Some("Status"), None, &[]),
            tuple("tup-due", &["SYS_A61"]),
        ]);
        let extractor = TagDefinitionExtractor::new(&graph);
        let extracted = extractor.extract(graph.get("tag1").unwrap()).unwrap();

        assert_eq!(extracted.fields.len(), 2);
        assert_eq!(extracted.fields[0].field_name, "Status");
        assert_eq!(extracted.fields[0].field_order, 0);
        assert_eq!(extracted.fields[1].field_name, "Due date");
        assert_eq!(extracted.fields[1].field_order, 1);
        assert_eq!(extracted.fields[1].field_label_id, "SYS_A61");
        assert_eq!(extracted.fields[1].data_type.as_deref(), Some("date"));
    }

    #[test]
    fn default_values_are_recorded_when_resolvable() {
        let graph = NodeGraph::from_nodes(vec![
            tag_def("tag1", "Todo", &["tup-prio"]),
            tuple("tup-prio", &["lbl-prio", "val-later"]),
            node("lbl-prio", Some("Priority"), None, &[]),
            node("val-later", Some("Later"), None, &[]),
        ]);
        let extractor = TagDefinitionExtractor::new(&graph);
        let extracted = extractor.extract(graph.get("tag1").unwrap()).unwrap();

        assert_eq!(extracted.fields[0].default_value_id.as_deref(), Some("val-later"));
        assert_eq!(extracted.fields[0].default_value_text.as_deref(), Some("Later"));
    }

    #[test]
    fn parents_accept_bare_and_node_wrapped_markers() {
        let mut base = tag_def("tag-child", "Task", &[]);
        base.meta_node_id = Some("meta1".to_string());
        let mut legacy = tag_def("tag-legacy", "Bug", &[]);
        legacy.meta_node_id = Some("meta2".to_string());

        let graph = NodeGraph::from_nodes(vec![
            base,
            legacy,
            tag_def("tag-parent", "Item", &[]),
            node("meta1", None, None, &["ext1"]),
            tuple("ext1", &["SYS_A12", "tag-parent", "dangling-id"]),
            node("meta2", None, None, &["ext2"]),
            tuple("ext2", &["wrapped", "tag-parent"]),
            node("wrapped", Some("SYS_A12"), None, &[]),
        ]);
        let extractor = TagDefinitionExtractor::new(&graph);

        let child = extractor.extract(graph.get("tag-child").unwrap()).unwrap();
        assert_eq!(child.parents, vec!["tag-parent"]);

        let legacy = extractor.extract(graph.get("tag-legacy").unwrap()).unwrap();
        assert_eq!(legacy.parents, vec!["tag-parent"]);
    }

    #[test]
    fn only_first_inheritance_tuple_is_used() {
        let mut tag = tag_def("tag1", "Task", &[]);
        tag.meta_node_id = Some("meta1".to_string());
        let graph = NodeGraph::from_nodes(vec![
            tag,
            tag_def("p1", "First", &[]),
            tag_def("p2", "Second", &[]),
            node("meta1", None, None, &["ext-a", "ext-b"]),
            tuple("ext-a", &["SYS_A12", "p1"]),
            tuple("ext-b", &["SYS_A12", "p2"]),
        ]);
        let extractor = TagDefinitionExtractor::new(&graph);
        let extracted = extractor.extract(graph.get("tag1").unwrap()).unwrap();
        assert_eq!(extracted.parents, vec!["p1"]);
    }

    #[test]
    fn trash_detection_walks_owner_chain() {
        let mut trashed = tag_def("tag1", "Old", &[]);
        trashed.owner_id = Some("mid".to_string());
        let mut mid = node("mid", None, None, &[]);
        mid.owner_id = Some("ws_TRASH".to_string());
        let mut live = tag_def("tag2", "Live", &[]);
        live.owner_id = Some("home".to_string());

        let graph = NodeGraph::from_nodes(vec![trashed, mid, live, node("home", None, None, &[])]);
        let extractor = TagDefinitionExtractor::new(&graph);

        assert!(extractor.extract(graph.get("tag1").unwrap()).unwrap().tag.trashed);
        assert!(!extractor.extract(graph.get("tag2").unwrap()).unwrap().tag.trashed);
    }

    #[test]
    fn owner_cycle_terminates_as_not_trashed() {
        let mut a = tag_def("a", "Loop", &[]);
        a.owner_id = Some("b".to_string());
        let mut b = node("b", None, None, &[]);
        b.owner_id = Some("a".to_string());

        let graph = NodeGraph::from_nodes(vec![a, b]);
        let extractor = TagDefinitionExtractor::new(&graph);
        assert!(!extractor.extract(graph.get("a").unwrap()).unwrap().tag.trashed);
    }

    #[test]
    fn index_graph_counts_and_persists() {
        let mut trashed = tag_def("tag-gone", "Gone", &[]);
        trashed.owner_id = Some("ws_TRASH".to_string());
        let graph = NodeGraph::from_nodes(vec![
            tag_def("tag1", "Todo", &["tup-status"]),
            tuple("tup-status", &["lbl-status"]),
            node("lbl-status", Some("Status"), None, &[]),
            trashed,
        ]);
        let store = MetadataStore::in_memory().unwrap();
        let stats = index_graph(&graph, &store, &IndexOptions::default()).unwrap();

        assert_eq!(stats.tag_defs_processed, 1);
        assert_eq!(stats.fields_extracted, 1);
        assert_eq!(stats.trashed_skipped, 1);
        assert!(store.tag_by_id("tag-gone").unwrap().is_none());
        assert_eq!(
            store.meta("snapshot_hash").unwrap().as_deref(),
            Some(graph.snapshot_hash())
        );

        // Re-indexing the same export is idempotent.
        let again = index_graph(&graph, &store, &IndexOptions::default()).unwrap();
        assert_eq!(again, stats);
        assert_eq!(store.tag_count().unwrap(), 1);
    }
}
