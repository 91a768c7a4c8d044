//! Runtime field value extraction
//!
//! Independent of schema extraction: scans every node in the graph for
//! value-bearing tuples and records `(field name, value text, order)` rows.
//! The mega-tuple guard exists because the export reuses the tuple encoding
//! for unrelated bulk content with dozens of children; those must never be
//! classified as field values.

use std::collections::HashSet;

use tracing::info;

use crate::error::Result;
use crate::graph::{Node, NodeGraph, ParentIndex};
use crate::markers::system_field;
use crate::normalize::{is_indentation_style, normalize_name};
use crate::store::{FieldValueRow, MetadataStore};

/// A value tuple needs a label child and at least one value child.
pub const MIN_VALUE_TUPLE_CHILDREN: usize = 2;
/// Tuples above this size are the bulk-content encoding, not field values.
pub const MAX_VALUE_TUPLE_CHILDREN: usize = 50;

const MAX_PARENT_HOPS: usize = 20;

/// Options for a value extraction pass.
#[derive(Debug, Clone, Default)]
pub struct ValueExtractorOptions {
    /// Normalized field names to skip entirely, checked before any value
    /// extraction work.
    pub excluded_fields: HashSet<String>,
    /// Concatenate nested child names into the value text.
    pub include_nested: bool,
    /// Depth bound for the nested-name traversal.
    pub nested_depth: usize,
}

impl ValueExtractorOptions {
    /// Build an exclusion set from display names (normalized here).
    pub fn with_excluded<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.excluded_fields = names
            .into_iter()
            .map(|name| normalize_name(name.as_ref()))
            .collect();
        self
    }
}

/// Extracts field values from value-bearing tuples anywhere in the graph.
pub struct FieldValueExtractor<'g> {
    graph: &'g NodeGraph,
    parents: Option<&'g ParentIndex>,
    options: ValueExtractorOptions,
}

impl<'g> FieldValueExtractor<'g> {
    /// Without a parent index the logical-parent walk falls back to an O(n)
    /// scan per tuple.
    pub fn new(graph: &'g NodeGraph, options: ValueExtractorOptions) -> Self {
        Self {
            graph,
            parents: None,
            options,
        }
    }

    pub fn with_parent_index(
        graph: &'g NodeGraph,
        parents: &'g ParentIndex,
        options: ValueExtractorOptions,
    ) -> Self {
        Self {
            graph,
            parents: Some(parents),
            options,
        }
    }

    /// Scan the whole graph in sorted-id order.
    pub fn extract_all(&self) -> Vec<FieldValueRow> {
        let mut rows = Vec::new();
        for id in self.graph.sorted_ids() {
            let Some(node) = self.graph.get(id) else { continue };
            if let Some(mut tuple_rows) = self.extract_tuple(node) {
                rows.append(&mut tuple_rows);
            }
        }
        rows
    }

    /// Rebuild the `field_values` table from a fresh scan.
    pub fn extract_into(&self, store: &MetadataStore) -> Result<usize> {
        store.clear_field_values()?;
        let rows = self.extract_all();
        for row in &rows {
            store.upsert_field_value(row)?;
        }
        info!(values = rows.len(), "extracted field values");
        Ok(rows.len())
    }

    /// Qualify one node as a field-value tuple and extract its values.
    /// Returns `None` when the node does not qualify.
    fn extract_tuple(&self, node: &Node) -> Option<Vec<FieldValueRow>> {
        if !node.is_tuple() {
            return None;
        }
        let child_count = node.children.len();
        if !(MIN_VALUE_TUPLE_CHILDREN..=MAX_VALUE_TUPLE_CHILDREN).contains(&child_count) {
            return None;
        }

        let first = &node.children[0];
        let field_name = if let Some(sys) = system_field(first) {
            sys.name.to_string()
        } else {
            let name = self.graph.get(first)?.display_name()?;
            if is_indentation_style(name) {
                return None;
            }
            name.to_string()
        };

        let normalized_field_name = normalize_name(&field_name);
        if self.options.excluded_fields.contains(&normalized_field_name) {
            return None;
        }

        let source_node_id = self.logical_parent(&node.id);
        let mut rows: Vec<FieldValueRow> = Vec::new();
        for child_id in &node.children[1..] {
            let Some(child) = self.graph.get(child_id) else { continue };
            let Some(value_text) = self.value_text(child) else { continue };
            rows.push(FieldValueRow {
                tuple_id: node.id.clone(),
                source_node_id: source_node_id.clone(),
                field_name: field_name.clone(),
                normalized_field_name: normalized_field_name.clone(),
                value_text,
                // Ordinal among accepted values, not the raw child index.
                value_order: rows.len() as i64,
            });
        }
        Some(rows)
    }

    /// The tuple's logical parent: the first non-tuple ancestor, walking
    /// ownership upward past any chain of tuple wrappers.
    fn logical_parent(&self, tuple_id: &str) -> Option<String> {
        let mut current = tuple_id.to_string();
        for _ in 0..MAX_PARENT_HOPS {
            let parent_id = match self.parents {
                Some(index) => index.parent_of(&current)?.to_string(),
                None => self.scan_for_parent(&current)?,
            };
            match self.graph.get(&parent_id) {
                Some(parent) if parent.is_tuple() => current = parent_id,
                _ => return Some(parent_id),
            }
        }
        None
    }

    fn scan_for_parent(&self, child_id: &str) -> Option<String> {
        for id in self.graph.sorted_ids() {
            let Some(node) = self.graph.get(id) else { continue };
            if node.children.iter().any(|child| child == child_id) {
                return Some(id.to_string());
            }
        }
        None
    }

    /// Value text for one value child: its own name, optionally followed by
    /// a bounded-depth traversal of its descendants' names. Blank values are
    /// dropped, not recorded as empty strings.
    fn value_text(&self, node: &Node) -> Option<String> {
        let mut parts = vec![node.display_name()?.to_string()];
        if self.options.include_nested {
            self.collect_nested(node, self.options.nested_depth, &mut parts);
        }
        Some(parts.join(" / "))
    }

    fn collect_nested(&self, node: &Node, depth: usize, parts: &mut Vec<String>) {
        if depth == 0 {
            return;
        }
        for child_id in &node.children {
            let Some(child) = self.graph.get(child_id) else { continue };
            if let Some(name) = child.display_name() {
                parts.push(name.to_string());
            }
            self.collect_nested(child, depth - 1, parts);
        }
    }
}
