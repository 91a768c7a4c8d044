//! Inheritance resolution over the normalized index
//!
//! All reads are total functions: an absent tag id yields empty results,
//! never an error. Cycle protection is the fixed depth bound on the ancestor
//! closure; a tag is never reported as its own ancestor even when ParentEdge
//! contains a cycle.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::Result;
use crate::graph::NodeGraph;
use crate::markers::{system_field, SYSTEM_FIELD_ORDER};
use crate::normalize::normalize_name;
use crate::store::{FieldDefinition, MetadataStore};

/// Fixed-point expansion bound for the ancestor closure. Pathological cycles
/// are truncated here, not reported.
pub const MAX_ANCESTOR_DEPTH: usize = 10;

/// An ancestor with its minimum hop distance from the queried tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ancestor {
    pub tag_id: String,
    pub depth: usize,
}

/// Recursive inheritance tree, for display.
#[derive(Debug, Clone, Serialize)]
pub struct InheritanceNode {
    pub tag_id: String,
    pub tag_name: String,
    pub parents: Vec<InheritanceNode>,
}

/// A field in a tag's flattened schema, with its origin.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedField {
    pub field: FieldDefinition,
    /// Minimum inheritance depth of the defining tag (0 = own field).
    pub depth: usize,
    pub origin_tag_id: String,
    pub origin_tag_name: String,
}

/// Computes ancestor closures, inheritance trees and flattened field sets.
pub struct InheritanceResolver<'a> {
    store: &'a MetadataStore,
    graph: Option<&'a NodeGraph>,
}

impl<'a> InheritanceResolver<'a> {
    pub fn new(store: &'a MetadataStore) -> Self {
        Self { store, graph: None }
    }

    /// Attach the node graph so display names fall back to generic node
    /// lookup for tags the index has no row for.
    pub fn with_graph(store: &'a MetadataStore, graph: &'a NodeGraph) -> Self {
        Self {
            store,
            graph: Some(graph),
        }
    }

    /// Exact ParentEdge rows, no recursion.
    pub fn direct_parents(&self, tag_id: &str) -> Result<Vec<String>> {
        self.store.direct_parents(tag_id)
    }

    /// Transitive ancestors with their minimum depth, in breadth-first order
    /// (ascending depth, registration order within a level). The queried tag
    /// itself is never included.
    pub fn ancestors(&self, tag_id: &str) -> Result<Vec<Ancestor>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out: Vec<Ancestor> = Vec::new();
        let mut frontier: Vec<String> = vec![tag_id.to_string()];

        for depth in 1..=MAX_ANCESTOR_DEPTH {
            let mut next: Vec<String> = Vec::new();
            for id in &frontier {
                for parent in self.store.direct_parents(id)? {
                    if parent == tag_id || !seen.insert(parent.clone()) {
                        continue;
                    }
                    out.push(Ancestor {
                        tag_id: parent.clone(),
                        depth,
                    });
                    next.push(parent);
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        Ok(out)
    }

    /// Recursive inheritance tree built from direct parents.
    ///
    /// NOTE: unlike `ancestors`, no depth cutoff is applied here; the tree
    /// relies on ParentEdge being a DAG in well-formed data. The `lint`
    /// module reports cycles so the hazard is visible to operators.
    pub fn inheritance_chain(&self, tag_id: &str) -> Result<InheritanceNode> {
        let parents = self
            .store
            .direct_parents(tag_id)?
            .into_iter()
            .map(|parent| self.inheritance_chain(&parent))
            .collect::<Result<Vec<_>>>()?;

        Ok(InheritanceNode {
            tag_id: tag_id.to_string(),
            tag_name: self.tag_display_name(tag_id)?,
            parents,
        })
    }

    /// A tag's complete field set: own fields (depth 0), then every
    /// ancestor's own fields at that ancestor's minimum depth. Deduplicated
    /// by normalized name, first occurrence wins. System fields from the
    /// optional source mapping are appended last at a sentinel order, unless
    /// shadowed by a user-defined field of the same normalized name.
    pub fn all_fields(&self, tag_id: &str) -> Result<Vec<ResolvedField>> {
        let mut origins: Vec<(String, usize)> = vec![(tag_id.to_string(), 0)];
        for ancestor in self.ancestors(tag_id)? {
            origins.push((ancestor.tag_id, ancestor.depth));
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut out: Vec<ResolvedField> = Vec::new();

        for (origin_id, depth) in &origins {
            let origin_name = self.tag_display_name(origin_id)?;
            for field in self.store.own_fields(origin_id)? {
                if !seen.insert(field.normalized_name.clone()) {
                    continue;
                }
                out.push(ResolvedField {
                    field,
                    depth: *depth,
                    origin_tag_id: origin_id.clone(),
                    origin_tag_name: origin_name.clone(),
                });
            }
        }

        // Optional augmentation; absent source data skips it silently.
        let sources = self.store.system_field_sources().unwrap_or_default();
        if !sources.is_empty() {
            let depth_of: HashMap<&str, usize> = origins
                .iter()
                .map(|(id, depth)| (id.as_str(), *depth))
                .collect();
            for (field_id, source_tag) in &sources {
                let Some(&depth) = depth_of.get(source_tag.as_str()) else {
                    continue;
                };
                let Some(sys) = system_field(field_id) else {
                    continue;
                };
                let normalized = normalize_name(sys.name);
                if !seen.insert(normalized.clone()) {
                    continue;
                }
                out.push(ResolvedField {
                    field: FieldDefinition {
                        tag_id: source_tag.clone(),
                        field_name: sys.name.to_string(),
                        field_label_id: field_id.clone(),
                        field_order: SYSTEM_FIELD_ORDER,
                        normalized_name: normalized,
                        data_type: sys.data_type.map(String::from),
                        target_supertag_id: None,
                        target_supertag_name: None,
                        default_value_id: None,
                        default_value_text: None,
                    },
                    depth,
                    origin_tag_id: source_tag.clone(),
                    origin_tag_name: self.tag_display_name(source_tag)?,
                });
            }
        }

        Ok(out)
    }

    /// Display name with fallback: tag metadata row, then generic node name,
    /// then the raw id.
    fn tag_display_name(&self, tag_id: &str) -> Result<String> {
        if let Some(entry) = self.store.tag_by_id(tag_id)? {
            return Ok(entry.tag_name);
        }
        if let Some(name) = self.graph.and_then(|g| g.name_of(tag_id)) {
            return Ok(name.to_string());
        }
        Ok(tag_id.to_string())
    }
}
