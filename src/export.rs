//! Portable schema document export
//!
//! Serializes the indexed tag set into a versioned JSON document for legacy
//! schema consumers. Duplicate same-named tags collapse to their canonical
//! pick, so the document carries one entry per tag name.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::query::canonical_order;
use crate::store::{FieldDefinition, MetadataStore};

pub const SCHEMA_DOCUMENT_VERSION: u32 = 1;

/// Top-level export document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub version: u32,
    pub supertags: Vec<SupertagSchema>,
}

/// One canonical tag with its direct parents and own fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupertagSchema {
    pub id: String,
    pub name: String,
    pub normalized_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub extends: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub attribute_id: String,
    pub name: String,
    pub normalized_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target_supertag: Option<String>,
}

impl From<FieldDefinition> for FieldSchema {
    fn from(field: FieldDefinition) -> Self {
        Self {
            attribute_id: field.field_label_id,
            name: field.field_name,
            normalized_name: field.normalized_name,
            description: None,
            data_type: field.data_type,
            target_supertag: field
                .target_supertag_name
                .or(field.target_supertag_id),
        }
    }
}

/// Build the export document from the store, one canonical entry per name,
/// sorted by name for stable output.
pub fn schema_document(store: &MetadataStore) -> Result<SchemaDocument> {
    let mut emitted: HashSet<String> = HashSet::new();
    let mut supertags: Vec<SupertagSchema> = Vec::new();

    for tag in store.all_tags()? {
        if tag.trashed {
            continue;
        }
        let mut candidates = store.tags_named(&tag.tag_name, &tag.normalized_name)?;
        candidates.sort_by(canonical_order);
        let Some(canonical) = candidates.first() else {
            continue;
        };
        if !emitted.insert(canonical.entry.tag_id.clone()) {
            continue;
        }

        let entry = &canonical.entry;
        supertags.push(SupertagSchema {
            id: entry.tag_id.clone(),
            name: entry.tag_name.clone(),
            normalized_name: entry.normalized_name.clone(),
            description: entry.description.clone(),
            color: entry.color.clone(),
            extends: store.direct_parents(&entry.tag_id)?,
            fields: store
                .own_fields(&entry.tag_id)?
                .into_iter()
                .map(FieldSchema::from)
                .collect(),
        });
    }

    supertags.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

    Ok(SchemaDocument {
        version: SCHEMA_DOCUMENT_VERSION,
        supertags,
    })
}

/// Pretty-printed export document.
pub fn to_schema_registry_json(store: &MetadataStore) -> Result<String> {
    Ok(serde_json::to_string_pretty(&schema_document(store)?)?)
}

/// Parse and version-check an export document.
pub fn parse_schema_document(json: &str) -> Result<SchemaDocument> {
    let document: SchemaDocument = serde_json::from_str(json)?;
    if document.version != SCHEMA_DOCUMENT_VERSION {
        return Err(IndexError::UnsupportedVersion(document.version));
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_name;
    use crate::store::TagMetadataEntry;

    fn seed_tag(store: &MetadataStore, id: &str, name: &str) {
        store
            .upsert_tag(&TagMetadataEntry {
                tag_id: id.to_string(),
                tag_name: name.to_string(),
                normalized_name: normalize_name(name),
                description: None,
                color: None,
                trashed: false,
            })
            .unwrap();
    }

    fn seed_field(store: &MetadataStore, tag_id: &str, name: &str, order: i64) {
        store
            .upsert_field(&FieldDefinition {
                tag_id: tag_id.to_string(),
                field_name: name.to_string(),
                field_label_id: format!("attr-{tag_id}-{order}"),
                field_order: order,
                normalized_name: normalize_name(name),
                data_type: None,
                target_supertag_id: None,
                target_supertag_name: None,
                default_value_id: None,
                default_value_text: None,
            })
            .unwrap();
    }

    #[test]
    fn roundtrip_preserves_tags_fields_and_extends() {
        let store = MetadataStore::in_memory().unwrap();
        seed_tag(&store, "t-base", "item");
        seed_tag(&store, "t-todo", "todo");
        store.insert_parent("t-todo", "t-base").unwrap();
        seed_field(&store, "t-todo", "Status", 0);
        seed_field(&store, "t-todo", "Due date", 1);
        seed_field(&store, "t-base", "Notes", 0);

        let json = to_schema_registry_json(&store).unwrap();
        let parsed = parse_schema_document(&json).unwrap();

        assert_eq!(parsed, schema_document(&store).unwrap());
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.supertags.len(), 2);

        let todo = parsed.supertags.iter().find(|t| t.name == "todo").unwrap();
        assert_eq!(todo.extends, vec!["t-base"]);
        assert_eq!(
            todo.fields.iter().map(|f| f.attribute_id.as_str()).collect::<Vec<_>>(),
            vec!["attr-t-todo-0", "attr-t-todo-1"]
        );
    }

    #[test]
    fn duplicate_names_collapse_to_canonical() {
        let store = MetadataStore::in_memory().unwrap();
        seed_tag(&store, "t-plain", "task");
        seed_tag(&store, "t-rich", "task");
        seed_tag(&store, "t-base", "base");
        store.insert_parent("t-rich", "t-base").unwrap();

        let document = schema_document(&store).unwrap();
        let tasks: Vec<_> = document
            .supertags
            .iter()
            .filter(|t| t.name == "task")
            .collect();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "t-rich");
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let err = parse_schema_document(r#"{"version": 2, "supertags": []}"#).unwrap_err();
        assert!(matches!(err, IndexError::UnsupportedVersion(2)));
    }

    #[test]
    fn optional_fields_are_omitted_from_json() {
        let store = MetadataStore::in_memory().unwrap();
        seed_tag(&store, "t1", "plain");
        let json = to_schema_registry_json(&store).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let tag = &value["supertags"][0];
        assert!(tag.get("description").is_none());
        assert!(tag.get("extends").is_none());
        assert!(tag.get("fields").is_none());
    }
}
