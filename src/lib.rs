//! Supertag Schema Index
//!
//! Indexes a denormalized, graph-shaped export from a note-taking workspace
//! into a normalized relational index of supertag definitions, their fields
//! and their inheritance edges, then serves inheritance-aware schema queries
//! and builds typed payloads for the workspace's node-creation API.
//!
//! ## Pipeline
//!
//! ```text
//! export JSON
//!   -> NodeGraph
//!   -> TagDefinitionExtractor -> MetadataStore (SQLite)
//!                                     |
//!   FieldValueExtractor ---------> field_values
//!                                     |
//!                      InheritanceResolver
//!                        -> SchemaQueryFacade
//!                        -> PayloadBuilder -> node-creation payload
//!                        -> schema export document
//! ```
//!
//! The graph is externally produced and loosely typed: malformed input is
//! skipped and counted, never raised. The single caller-visible failure is
//! an unknown supertag name in payload building.

pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod graph;
pub mod inherit;
pub mod lint;
pub mod markers;
pub mod normalize;
pub mod payload;
pub mod query;
pub mod store;
pub mod values;

pub use config::IndexConfig;
pub use error::{IndexError, Result};
pub use export::{parse_schema_document, schema_document, to_schema_registry_json, SchemaDocument};
pub use extract::{index_graph, ExtractionStats, IndexOptions, TagDefinitionExtractor};
pub use graph::{Node, NodeGraph, ParentIndex};
pub use inherit::{Ancestor, InheritanceNode, InheritanceResolver, ResolvedField};
pub use lint::{lint_store, LintReport};
pub use payload::{FieldValue, NodePayload, PayloadBuilder};
pub use query::{NameLookup, SchemaQueryFacade};
pub use store::{FieldDefinition, FieldValueRow, MetadataStore, TagMetadataEntry};
pub use values::{FieldValueExtractor, ValueExtractorOptions};
