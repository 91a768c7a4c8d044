//! Supertag Index CLI
//!
//! Thin operational surface over the library: index an export, inspect tag
//! schemas, export the portable schema document, build creation payloads.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use supertag_index::extract::{index_graph, IndexOptions};
use supertag_index::payload::{FieldValue, PayloadBuilder};
use supertag_index::values::{FieldValueExtractor, ValueExtractorOptions};
use supertag_index::{
    lint_store, to_schema_registry_json, IndexConfig, IndexError, InheritanceResolver,
    MetadataStore, NodeGraph, ParentIndex, SchemaQueryFacade,
};

#[derive(Parser)]
#[command(name = "supertag-index")]
#[command(about = "Index a workspace export and query supertag schemas")]
struct Cli {
    /// Path to a config file (defaults to supertag-index.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the index database path
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index a workspace export into the relational schema index
    Index {
        /// Path to the export JSON
        export: PathBuf,

        /// Also run the field-value extraction pass
        #[arg(long)]
        with_values: bool,
    },

    /// Show a tag's complete (inherited) field set
    Show {
        tag: String,

        /// Print the inheritance tree as JSON instead of the field table
        #[arg(long)]
        chain: bool,
    },

    /// Search tags by substring
    Search { query: String },

    /// Write the portable schema document
    Export {
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build a node-creation payload
    Payload {
        /// Tag name or comma-separated list of tag names
        tags: String,

        /// Display name for the new node
        name: String,

        /// Field values as field=value pairs
        values: Vec<String>,

        /// Export JSON used for @Name reference resolution
        #[arg(short, long)]
        export: Option<PathBuf>,
    },

    /// Report inheritance cycles, duplicate names and shadowed fields
    Lint,

    /// Print the effective configuration as TOML
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = IndexConfig::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database.path = database;
    }

    match cli.command {
        Command::Index {
            export,
            with_values,
        } => {
            let graph = NodeGraph::from_file(&export)
                .with_context(|| format!("reading export {}", export.display()))?;
            let store = MetadataStore::open(&config.database.path)?;

            let options = IndexOptions {
                include_trashed: config.index.include_trashed,
            };
            let stats = index_graph(&graph, &store, &options)?;
            println!(
                "Indexed {} tags ({} fields, {} parent edges, {} trashed)",
                stats.tag_defs_processed,
                stats.fields_extracted,
                stats.parents_extracted,
                stats.trashed_skipped
            );

            if with_values {
                let parents = ParentIndex::build(&graph);
                let options = ValueExtractorOptions {
                    include_nested: config.values.include_nested,
                    nested_depth: config.values.nested_depth,
                    ..ValueExtractorOptions::default()
                }
                .with_excluded(&config.values.excluded_fields);
                let extractor =
                    FieldValueExtractor::with_parent_index(&graph, &parents, options);
                let count = extractor.extract_into(&store)?;
                println!("Extracted {count} field values");
            }
        }

        Command::Show { tag, chain } => {
            let store = MetadataStore::open(&config.database.path)?;
            let facade = SchemaQueryFacade::new(&store);
            let Some(lookup) = facade.find_by_name(&tag)? else {
                let suggestions = facade.suggest(&tag, 3);
                if suggestions.is_empty() {
                    anyhow::bail!("no tag named '{tag}'");
                }
                anyhow::bail!("no tag named '{tag}' (did you mean {}?)", suggestions.join(", "));
            };
            if lookup.is_ambiguous() {
                eprintln!(
                    "warning: {} tags named '{tag}', showing the canonical one",
                    lookup.duplicates.len() + 1
                );
            }

            let resolver = InheritanceResolver::new(&store);
            if chain {
                let tree = resolver.inheritance_chain(&lookup.canonical.tag_id)?;
                println!("{}", serde_json::to_string_pretty(&tree)?);
            } else {
                let entry = &lookup.canonical;
                println!("{} ({})", entry.tag_name, entry.tag_id);
                if let Some(description) = &entry.description {
                    println!("  {description}");
                }
                for resolved in resolver.all_fields(&entry.tag_id)? {
                    let data_type = resolved.field.data_type.as_deref().unwrap_or("-");
                    let origin = if resolved.depth == 0 {
                        String::from("own")
                    } else {
                        format!("{} (depth {})", resolved.origin_tag_name, resolved.depth)
                    };
                    println!(
                        "  {:<28} {:<10} {origin}",
                        resolved.field.field_name, data_type
                    );
                }
            }
        }

        Command::Search { query } => {
            let store = MetadataStore::open(&config.database.path)?;
            let facade = SchemaQueryFacade::new(&store);
            for tag in facade.search(&query)? {
                println!("{:<28} {}", tag.tag_name, tag.tag_id);
            }
        }

        Command::Export { output } => {
            let store = MetadataStore::open(&config.database.path)?;
            let json = to_schema_registry_json(&store)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Wrote {}", path.display());
                }
                None => println!("{json}"),
            }
        }

        Command::Payload {
            tags,
            name,
            values,
            export,
        } => {
            let store = MetadataStore::open(&config.database.path)?;
            let graph = match export {
                Some(path) => NodeGraph::from_file(&path)
                    .with_context(|| format!("reading export {}", path.display()))?,
                None => NodeGraph::from_nodes(Vec::new()),
            };

            let mut field_values: HashMap<String, FieldValue> = HashMap::new();
            for pair in &values {
                let Some((key, value)) = pair.split_once('=') else {
                    anyhow::bail!("expected field=value, got '{pair}'");
                };
                field_values.insert(key.trim().to_string(), parse_value(value));
            }

            let builder = PayloadBuilder::new(&store, &graph);
            match builder.build_from_spec(&tags, &name, &field_values) {
                Ok(payload) => println!("{}", serde_json::to_string_pretty(&payload)?),
                Err(IndexError::UnknownSupertag { name, suggestions }) => {
                    if suggestions.is_empty() {
                        anyhow::bail!("unknown supertag: {name}");
                    }
                    anyhow::bail!(
                        "unknown supertag: {name} (did you mean {}?)",
                        suggestions.join(", ")
                    );
                }
                Err(other) => return Err(other.into()),
            }
        }

        Command::Lint => {
            let store = MetadataStore::open(&config.database.path)?;
            let report = lint_store(&store)?;
            if report.is_clean() {
                println!("No issues found");
            } else {
                for cycle in &report.cycles {
                    println!("cycle: {}", cycle.join(" -> "));
                }
                for duplicate in &report.duplicate_names {
                    println!(
                        "duplicate name '{}': canonical {} over {}",
                        duplicate.name,
                        duplicate.canonical_tag_id,
                        duplicate.other_tag_ids.join(", ")
                    );
                }
                for shadowed in &report.shadowed_fields {
                    println!(
                        "shadowed field '{}' on {} hides {} (depth {})",
                        shadowed.field_name,
                        shadowed.tag_name,
                        shadowed.shadowed_origin_id,
                        shadowed.depth
                    );
                }
            }
        }

        Command::Config => print!("{}", config.to_toml_string()),
    }

    Ok(())
}

/// Parse a CLI value: `true`/`false` become flags, comma lists become lists.
fn parse_value(raw: &str) -> FieldValue {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
        return FieldValue::Flag(trimmed.eq_ignore_ascii_case("true"));
    }
    if trimmed.contains(',') {
        return FieldValue::List(
            trimmed
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(String::from)
                .collect(),
        );
    }
    FieldValue::Text(trimmed.to_string())
}
