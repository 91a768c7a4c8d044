//! Read-side query facade over the metadata store
//!
//! The source workspace allows duplicate tag creation, so a name can match
//! several defining nodes. Rather than erroring, lookups pick a canonical
//! representative (most parents, then most own fields, then first-seen) and
//! surface the non-canonical candidates so callers can warn or disambiguate.

use std::cmp::Ordering;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

use crate::error::Result;
use crate::inherit::{InheritanceResolver, ResolvedField};
use crate::normalize::normalize_name;
use crate::store::{MetadataStore, TagCandidate, TagMetadataEntry};

/// Result of a name lookup: the canonical pick plus any duplicates.
#[derive(Debug, Clone)]
pub struct NameLookup {
    pub canonical: TagMetadataEntry,
    /// Same-named, non-canonical rows, in canonical-rank order.
    pub duplicates: Vec<TagMetadataEntry>,
}

impl NameLookup {
    pub fn is_ambiguous(&self) -> bool {
        !self.duplicates.is_empty()
    }
}

/// Canonical-duplicate policy: most parents, then most own fields, then
/// first-seen (lowest insertion rowid).
pub(crate) fn canonical_order(a: &TagCandidate, b: &TagCandidate) -> Ordering {
    b.parent_count
        .cmp(&a.parent_count)
        .then(b.field_count.cmp(&a.field_count))
        .then(a.rowid.cmp(&b.rowid))
}

/// Inheritance-aware schema lookups by name, id and substring.
pub struct SchemaQueryFacade<'a> {
    store: &'a MetadataStore,
}

impl<'a> SchemaQueryFacade<'a> {
    pub fn new(store: &'a MetadataStore) -> Self {
        Self { store }
    }

    /// Look up a tag by exact or normalized name. Trashed tags are excluded
    /// when deletion tracking is present; stores without it degrade to
    /// including everything.
    pub fn find_by_name(&self, name: &str) -> Result<Option<NameLookup>> {
        let trimmed = name.trim();
        let mut candidates = self.store.tags_named(trimmed, &normalize_name(trimmed))?;
        if candidates.is_empty() {
            return Ok(None);
        }
        candidates.sort_by(canonical_order);

        let mut iter = candidates.into_iter();
        let canonical = match iter.next() {
            Some(c) => c.entry,
            None => return Ok(None),
        };
        Ok(Some(NameLookup {
            canonical,
            duplicates: iter.map(|c| c.entry).collect(),
        }))
    }

    pub fn find_by_id(&self, tag_id: &str) -> Result<Option<TagMetadataEntry>> {
        Ok(self.store.tag_by_id(tag_id)?.filter(|tag| !tag.trashed))
    }

    /// Case-insensitive substring search against raw and normalized names.
    pub fn search(&self, query: &str) -> Result<Vec<TagMetadataEntry>> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        self.store.search_tags(trimmed, &normalize_name(trimmed))
    }

    /// Complete (inherited) field set for a tag resolved by name, through
    /// the canonical pick. `None` when the name matches nothing.
    pub fn fields_for_name(&self, name: &str) -> Result<Option<Vec<ResolvedField>>> {
        let Some(lookup) = self.find_by_name(name)? else {
            return Ok(None);
        };
        let resolver = InheritanceResolver::new(self.store);
        Ok(Some(resolver.all_fields(&lookup.canonical.tag_id)?))
    }

    /// Fuzzy near-miss suggestions for a name that failed to resolve.
    pub fn suggest(&self, name: &str, limit: usize) -> Vec<String> {
        let Ok(names) = self.store.all_tag_names() else {
            return Vec::new();
        };
        let matcher = SkimMatcherV2::default();
        let mut scored: Vec<(i64, String)> = names
            .into_iter()
            .filter_map(|candidate| {
                matcher
                    .fuzzy_match(&candidate, name)
                    .map(|score| (score, candidate))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        scored.truncate(limit);
        scored.into_iter().map(|(_, name)| name).collect()
    }
}
