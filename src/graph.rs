//! Node graph loaded from a workspace export
//!
//! The export is a denormalized dump of every node in the workspace, keyed by
//! opaque id. Nothing here interprets tag semantics; this module only gives
//! the extraction passes an addressable, read-only view of the graph plus the
//! couple of indexes they need (exact display-name lookup, child→owner).

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// A single node from the export. Read-only input.
///
/// Child order is semantically significant: it encodes field order on tag
/// definitions and value order inside tuples.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub name: Option<String>,
    /// Discriminator, e.g. `"tuple"` or `"tagDef"`. Most nodes carry none.
    pub doc_type: Option<String>,
    /// Containing collection; trash detection walks this chain.
    pub owner_id: Option<String>,
    /// Side node holding inheritance declarations. Tag definitions only.
    pub meta_node_id: Option<String>,
    pub color: Option<String>,
    pub description: Option<String>,
    pub children: Vec<String>,
}

impl Node {
    /// Display name, trimmed; `None` when absent or blank.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }

    pub fn is_tag_def(&self) -> bool {
        self.doc_type.as_deref() == Some("tagDef")
    }

    pub fn is_tuple(&self) -> bool {
        self.doc_type.as_deref() == Some("tuple")
    }
}

/// Wrapper matching the export file's top-level shape.
#[derive(Debug, Deserialize)]
struct ExportDocument {
    docs: Vec<Node>,
}

/// Read-only node map with lookup indexes and a content hash of the snapshot.
#[derive(Debug, Default)]
pub struct NodeGraph {
    nodes: HashMap<String, Node>,
    by_name: HashMap<String, Vec<String>>,
    snapshot_hash: String,
}

impl NodeGraph {
    /// Build a graph from parsed nodes. Nodes without an id are dropped;
    /// on duplicate ids the last one wins.
    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        let mut map: HashMap<String, Node> = HashMap::with_capacity(nodes.len());
        for node in nodes {
            if node.id.is_empty() {
                continue;
            }
            map.insert(node.id.clone(), node);
        }

        let mut ids: Vec<&String> = map.keys().collect();
        ids.sort();

        let mut by_name: HashMap<String, Vec<String>> = HashMap::new();
        let mut hasher = Sha256::new();
        for id in ids {
            let node = &map[id];
            if let Some(name) = node.display_name() {
                by_name.entry(name.to_string()).or_default().push(id.clone());
            }
            hasher.update(id.as_bytes());
            hasher.update([0]);
            hasher.update(node.name.as_deref().unwrap_or("").as_bytes());
            hasher.update([0]);
            hasher.update(node.doc_type.as_deref().unwrap_or("").as_bytes());
            hasher.update([0]);
            for child in &node.children {
                hasher.update(child.as_bytes());
                hasher.update([1]);
            }
        }
        let snapshot_hash = format!("{:x}", hasher.finalize());

        Self {
            nodes: map,
            by_name,
            snapshot_hash,
        }
    }

    /// Parse an export document. Accepts both the `{ "docs": [...] }` wrapper
    /// and a bare top-level array of nodes.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let nodes = match serde_json::from_str::<ExportDocument>(json) {
            Ok(doc) => doc.docs,
            Err(_) => serde_json::from_str::<Vec<Node>>(json)?,
        };
        Ok(Self::from_nodes(nodes))
    }

    /// Load an export file from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Node ids in sorted order, for deterministic passes.
    pub fn sorted_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Display name of a node, when it has one.
    pub fn name_of(&self, id: &str) -> Option<&str> {
        self.get(id).and_then(Node::display_name)
    }

    /// Resolve an exact display name to a node id. When several nodes share
    /// the name, the lexicographically smallest id wins (stable across runs).
    pub fn resolve_display_name(&self, name: &str) -> Option<&str> {
        self.by_name
            .get(name.trim())
            .and_then(|ids| ids.first())
            .map(String::as_str)
    }

    /// Content hash of the snapshot, stable for identical exports.
    pub fn snapshot_hash(&self) -> &str {
        &self.snapshot_hash
    }
}

/// Precomputed child→owner index for O(1) upward walks.
///
/// Built from the `children` arrays, not `ownerId`: the value extractor needs
/// the structural parent of a tuple, which is whichever node lists it as a
/// child. Callers that skip building this fall back to an O(n) scan.
#[derive(Debug, Default)]
pub struct ParentIndex {
    parent_of: HashMap<String, String>,
}

impl ParentIndex {
    pub fn build(graph: &NodeGraph) -> Self {
        let mut parent_of = HashMap::new();
        for id in graph.sorted_ids() {
            let Some(node) = graph.get(id) else { continue };
            for child in &node.children {
                // First (smallest-id) owner wins on the rare shared child.
                parent_of.entry(child.clone()).or_insert_with(|| id.to_string());
            }
        }
        Self { parent_of }
    }

    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.parent_of.get(id).map(String::as_str)
    }
}
