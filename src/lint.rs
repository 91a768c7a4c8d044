//! Read-only diagnostics over the indexed schema
//!
//! Reports the hazards the engine itself tolerates silently: inheritance
//! cycles (truncated by the resolver, unbounded for chain display),
//! duplicate same-named tags, and inherited fields shadowed by own fields.
//! Linting never fails an index pass.

use std::collections::{HashMap, HashSet};

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use crate::error::Result;
use crate::inherit::InheritanceResolver;
use crate::query::canonical_order;
use crate::store::MetadataStore;

/// Everything the lint pass found.
#[derive(Debug, Default, Serialize)]
pub struct LintReport {
    /// Inheritance cycles: each entry lists the tag ids of one cycle group.
    pub cycles: Vec<Vec<String>>,
    pub duplicate_names: Vec<DuplicateTagName>,
    pub shadowed_fields: Vec<ShadowedField>,
}

impl LintReport {
    pub fn is_clean(&self) -> bool {
        self.cycles.is_empty()
            && self.duplicate_names.is_empty()
            && self.shadowed_fields.is_empty()
    }
}

/// Several tag definitions share one name; the canonical pick resolves them.
#[derive(Debug, Serialize)]
pub struct DuplicateTagName {
    pub name: String,
    pub canonical_tag_id: String,
    pub other_tag_ids: Vec<String>,
}

/// An own field hides an inherited field of the same normalized name.
#[derive(Debug, Serialize)]
pub struct ShadowedField {
    pub tag_id: String,
    pub tag_name: String,
    pub field_name: String,
    pub shadowed_origin_id: String,
    pub depth: usize,
}

/// Run all lints against the store.
pub fn lint_store(store: &MetadataStore) -> Result<LintReport> {
    let mut report = LintReport::default();

    // Cycle groups in the parent edges, including self-loops.
    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let mut indices: HashMap<String, NodeIndex> = HashMap::new();
    for (child, parent) in store.parent_edges()? {
        let child_ix = *indices
            .entry(child.clone())
            .or_insert_with(|| graph.add_node(child));
        let parent_ix = *indices
            .entry(parent.clone())
            .or_insert_with(|| graph.add_node(parent));
        graph.add_edge(child_ix, parent_ix, ());
    }
    for scc in kosaraju_scc(&graph) {
        if scc.len() > 1 {
            let mut members: Vec<String> = scc.iter().map(|ix| graph[*ix].clone()).collect();
            members.sort();
            report.cycles.push(members);
        } else if let Some(&only) = scc.first() {
            if graph.find_edge(only, only).is_some() {
                report.cycles.push(vec![graph[only].clone()]);
            }
        }
    }
    report.cycles.sort();

    // Duplicate names, with the canonical pick spelled out.
    let mut reported_names: HashSet<String> = HashSet::new();
    for tag in store.all_tags()? {
        if !reported_names.insert(tag.tag_name.clone()) {
            continue;
        }
        let mut candidates = store.tags_named(&tag.tag_name, &tag.normalized_name)?;
        if candidates.len() < 2 {
            continue;
        }
        candidates.sort_by(canonical_order);
        report.duplicate_names.push(DuplicateTagName {
            name: tag.tag_name,
            canonical_tag_id: candidates[0].entry.tag_id.clone(),
            other_tag_ids: candidates[1..]
                .iter()
                .map(|c| c.entry.tag_id.clone())
                .collect(),
        });
    }

    // Shadowed inherited fields.
    let resolver = InheritanceResolver::new(store);
    for tag in store.all_tags()? {
        let own_names: HashSet<String> = store
            .own_fields(&tag.tag_id)?
            .into_iter()
            .map(|field| field.normalized_name)
            .collect();
        if own_names.is_empty() {
            continue;
        }
        for ancestor in resolver.ancestors(&tag.tag_id)? {
            for field in store.own_fields(&ancestor.tag_id)? {
                if own_names.contains(&field.normalized_name) {
                    report.shadowed_fields.push(ShadowedField {
                        tag_id: tag.tag_id.clone(),
                        tag_name: tag.tag_name.clone(),
                        field_name: field.field_name,
                        shadowed_origin_id: ancestor.tag_id.clone(),
                        depth: ancestor.depth,
                    });
                }
            }
        }
    }

    Ok(report)
}
