//! Typed node-creation payloads for the remote API
//!
//! Resolves one or more tag names to their combined inherited field set and
//! encodes caller-supplied values (plus declared defaults) into the API's
//! node-creation tree. The one fatal path is an unresolvable tag name; every
//! field-level oddity degrades to omitting the field.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{IndexError, Result};
use crate::graph::NodeGraph;
use crate::inherit::InheritanceResolver;
use crate::markers::looks_like_node_id;
use crate::normalize::normalize_name;
use crate::query::SchemaQueryFacade;
use crate::store::{FieldDefinition, MetadataStore};

/// A caller-supplied field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
    Flag(bool),
}

impl FieldValue {
    /// Empty values never emit a field leaf; flags are always present.
    fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::List(items) => items.iter().all(|item| item.trim().is_empty()),
            Self::Flag(_) => false,
        }
    }

    /// Non-blank items, trimmed, in caller order.
    fn items(&self) -> Vec<String> {
        match self {
            Self::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    Vec::new()
                } else {
                    vec![trimmed.to_string()]
                }
            }
            Self::List(items) => items
                .iter()
                .map(|item| item.trim())
                .filter(|item| !item.is_empty())
                .map(String::from)
                .collect(),
            Self::Flag(flag) => vec![flag.to_string()],
        }
    }

    fn scalar(&self) -> Option<String> {
        self.items().into_iter().next()
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

/// Root of the node-creation tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePayload {
    pub name: String,
    pub supertags: Vec<SupertagRef>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<FieldLeaf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupertagRef {
    pub id: String,
}

/// One populated field on the new node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldLeaf {
    #[serde(rename = "type")]
    pub leaf_type: String,
    #[serde(rename = "attributeId")]
    pub attribute_id: String,
    pub children: Vec<ValueLeaf>,
}

impl FieldLeaf {
    fn new(attribute_id: &str, children: Vec<ValueLeaf>) -> Self {
        Self {
            leaf_type: "field".to_string(),
            attribute_id: attribute_id.to_string(),
            children,
        }
    }
}

/// A single encoded value. Variant order matters for untagged deserialization:
/// reference (dataType+id), then typed text (name+dataType), then plain/new
/// node (name, optional supertags).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueLeaf {
    Reference {
        #[serde(rename = "dataType")]
        data_type: String,
        id: String,
    },
    Typed {
        name: String,
        #[serde(rename = "dataType")]
        data_type: String,
    },
    Node {
        name: String,
        #[serde(skip_serializing_if = "Vec::is_empty", default)]
        supertags: Vec<SupertagRef>,
    },
}

impl ValueLeaf {
    fn reference(id: impl Into<String>) -> Self {
        Self::Reference {
            data_type: "reference".to_string(),
            id: id.into(),
        }
    }

    fn typed(name: impl Into<String>, data_type: &str) -> Self {
        Self::Typed {
            name: name.into(),
            data_type: data_type.to_string(),
        }
    }

    fn plain(name: impl Into<String>) -> Self {
        Self::Node {
            name: name.into(),
            supertags: Vec::new(),
        }
    }

    fn tagged(name: impl Into<String>, tag_id: &str) -> Self {
        Self::Node {
            name: name.into(),
            supertags: vec![SupertagRef {
                id: tag_id.to_string(),
            }],
        }
    }
}

/// Builds node-creation payloads from tag schemas and caller values.
pub struct PayloadBuilder<'a> {
    store: &'a MetadataStore,
    graph: &'a NodeGraph,
}

impl<'a> PayloadBuilder<'a> {
    pub fn new(store: &'a MetadataStore, graph: &'a NodeGraph) -> Self {
        Self { store, graph }
    }

    /// Split a tag spec: a single name or a comma-separated list.
    pub fn parse_tag_list(spec: &str) -> Vec<String> {
        spec.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect()
    }

    /// Convenience wrapper accepting a comma-separated tag spec.
    pub fn build_from_spec(
        &self,
        tag_spec: &str,
        node_name: &str,
        values: &HashMap<String, FieldValue>,
    ) -> Result<NodePayload> {
        self.build(&Self::parse_tag_list(tag_spec), node_name, values)
    }

    /// Build the payload for a node carrying the given tags. Any name that
    /// fails to resolve is fatal for the whole call.
    pub fn build(
        &self,
        tag_names: &[String],
        node_name: &str,
        values: &HashMap<String, FieldValue>,
    ) -> Result<NodePayload> {
        let facade = SchemaQueryFacade::new(self.store);

        let mut tag_ids: Vec<String> = Vec::new();
        for name in tag_names {
            let Some(lookup) = facade.find_by_name(name)? else {
                return Err(IndexError::UnknownSupertag {
                    name: name.clone(),
                    suggestions: facade.suggest(name, 3),
                });
            };
            if lookup.is_ambiguous() {
                warn!(
                    tag = %name,
                    candidates = lookup.duplicates.len() + 1,
                    "multiple matching supertags, using canonical pick"
                );
            }
            if !tag_ids.contains(&lookup.canonical.tag_id) {
                tag_ids.push(lookup.canonical.tag_id);
            }
        }

        // Union across tags, deduplicated by attribute id: same-named fields
        // from unrelated tags must not silently merge.
        let resolver = InheritanceResolver::with_graph(self.store, self.graph);
        let mut seen_attributes: HashSet<String> = HashSet::new();
        let mut combined: Vec<FieldDefinition> = Vec::new();
        for tag_id in &tag_ids {
            for resolved in resolver.all_fields(tag_id)? {
                if seen_attributes.insert(resolved.field.field_label_id.clone()) {
                    combined.push(resolved.field);
                }
            }
        }

        let by_key: HashMap<String, &FieldValue> = values
            .iter()
            .map(|(key, value)| (normalize_name(key), value))
            .collect();

        let mut children: Vec<FieldLeaf> = Vec::new();
        for field in &combined {
            let leaves = match by_key.get(&field.normalized_name) {
                Some(value) if !value.is_empty() => self.encode_value(field, value),
                _ => self.encode_default(field),
            };
            if !leaves.is_empty() {
                children.push(FieldLeaf::new(&field.field_label_id, leaves));
            }
        }

        Ok(NodePayload {
            name: node_name.to_string(),
            supertags: tag_ids.into_iter().map(|id| SupertagRef { id }).collect(),
            children,
        })
    }

    /// Default-value fallback for a field the caller did not populate.
    fn encode_default(&self, field: &FieldDefinition) -> Vec<ValueLeaf> {
        match field.data_type.as_deref() {
            Some("reference") | Some("options") => field
                .default_value_id
                .as_ref()
                .map(|id| vec![ValueLeaf::reference(id.clone())])
                .unwrap_or_default(),
            _ => match &field.default_value_text {
                Some(text) if !text.trim().is_empty() => {
                    self.encode_value(field, &FieldValue::Text(text.clone()))
                }
                _ => Vec::new(),
            },
        }
    }

    fn encode_value(&self, field: &FieldDefinition, value: &FieldValue) -> Vec<ValueLeaf> {
        match field.data_type.as_deref() {
            Some("date") => value
                .scalar()
                .map(|text| vec![ValueLeaf::typed(text, "date")])
                .unwrap_or_default(),
            Some("url") => value
                .scalar()
                .map(|text| vec![ValueLeaf::typed(text, "url")])
                .unwrap_or_default(),
            Some("checkbox") => {
                let flag = match value {
                    FieldValue::Flag(flag) => *flag,
                    other => other.scalar().map(|text| is_truthy(&text)).unwrap_or(false),
                };
                vec![ValueLeaf::plain(flag.to_string())]
            }
            // No numeric validation at this layer.
            Some("number") => value
                .scalar()
                .map(|text| vec![ValueLeaf::plain(text)])
                .unwrap_or_default(),
            Some("reference") | Some("options") => value
                .items()
                .iter()
                .map(|item| self.encode_reference_item(field, item))
                .collect(),
            _ => value
                .items()
                .iter()
                .map(|item| self.encode_plain_item(field, item))
                .collect(),
        }
    }

    /// Reference/options encoding: opaque-id shaped values become direct
    /// references; `@Name` resolves by exact display name, falling back to a
    /// new node; anything else becomes a new node tagged with the declared
    /// target supertag.
    fn encode_reference_item(&self, field: &FieldDefinition, item: &str) -> ValueLeaf {
        if looks_like_node_id(item) {
            return ValueLeaf::reference(item);
        }
        if let Some(name) = item.strip_prefix('@') {
            if let Some(id) = self.graph.resolve_display_name(name) {
                return ValueLeaf::reference(id);
            }
            return self.new_node_leaf(field, name);
        }
        self.new_node_leaf(field, item)
    }

    /// Untyped fields keep `@Name` resolution so they can still express
    /// references; plain strings stay plain text.
    fn encode_plain_item(&self, field: &FieldDefinition, item: &str) -> ValueLeaf {
        if let Some(name) = item.strip_prefix('@') {
            if let Some(id) = self.graph.resolve_display_name(name) {
                return ValueLeaf::reference(id);
            }
            return self.new_node_leaf(field, name);
        }
        ValueLeaf::plain(item)
    }

    fn new_node_leaf(&self, field: &FieldDefinition, name: &str) -> ValueLeaf {
        match field.target_supertag_id.as_deref() {
            Some(tag_id) => ValueLeaf::tagged(name, tag_id),
            None => ValueLeaf::plain(name),
        }
    }
}

fn is_truthy(text: &str) -> bool {
    matches!(
        text.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "1" | "checked"
    )
}
