//! Normalized relational index of tag definitions
//!
//! The store is the persisted interface between the extraction passes and
//! every query-side consumer: table and column names are a stability
//! contract, not an implementation detail. One short-lived statement per
//! logical operation, WAL journal, no long-lived locks.

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One row per tag-definition node, upserted by `tag_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagMetadataEntry {
    pub tag_id: String,
    pub tag_name: String,
    pub normalized_name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    /// Soft-deleted in the source workspace. Trashed tags are normally
    /// skipped at extraction time; when indexed anyway they stay excluded
    /// from lookups.
    pub trashed: bool,
}

/// A field declared on a tag. Identity is name-based: `(tag_id, field_name)`
/// is the upsert key because label ids and order can change between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub tag_id: String,
    pub field_name: String,
    /// Label node id, or a synthetic system-marker literal.
    pub field_label_id: String,
    /// Zero-based position among the tag's own accepted fields.
    pub field_order: i64,
    pub normalized_name: String,
    pub data_type: Option<String>,
    pub target_supertag_id: Option<String>,
    pub target_supertag_name: Option<String>,
    pub default_value_id: Option<String>,
    pub default_value_text: Option<String>,
}

/// A runtime field value extracted from a value-bearing tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValueRow {
    pub tuple_id: String,
    /// Logical parent of the tuple (first non-tuple ancestor), when found.
    pub source_node_id: Option<String>,
    pub field_name: String,
    pub normalized_field_name: String,
    pub value_text: String,
    /// Zero-based ordinal among the tuple's accepted values.
    pub value_order: i64,
}

/// A tag row plus the counters the canonical-duplicate policy ranks by.
#[derive(Debug, Clone)]
pub struct TagCandidate {
    pub entry: TagMetadataEntry,
    pub parent_count: i64,
    pub field_count: i64,
    /// Insertion order; the "first-seen" tie-break.
    pub rowid: i64,
}

/// SQLite-backed metadata store.
pub struct MetadataStore {
    conn: Connection,
}

impl MetadataStore {
    /// Open (or create) the index database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(dir) = path.as_ref().parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory store, used by tests and dry runs.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;

            CREATE TABLE IF NOT EXISTS tag_metadata (
              tag_id TEXT PRIMARY KEY,
              tag_name TEXT NOT NULL,
              normalized_name TEXT NOT NULL,
              description TEXT,
              color TEXT,
              trashed INTEGER NOT NULL DEFAULT 0,
              indexed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tag_metadata_name
              ON tag_metadata(tag_name);
            CREATE INDEX IF NOT EXISTS idx_tag_metadata_normalized
              ON tag_metadata(normalized_name);

            CREATE TABLE IF NOT EXISTS tag_fields (
              tag_id TEXT NOT NULL,
              field_name TEXT NOT NULL,
              field_label_id TEXT NOT NULL,
              field_order INTEGER NOT NULL,
              normalized_name TEXT NOT NULL,
              data_type TEXT,
              target_supertag_id TEXT,
              target_supertag_name TEXT,
              default_value_id TEXT,
              default_value_text TEXT,
              PRIMARY KEY (tag_id, field_name)
            );
            CREATE INDEX IF NOT EXISTS idx_tag_fields_tag
              ON tag_fields(tag_id);

            CREATE TABLE IF NOT EXISTS tag_parents (
              child_tag_id TEXT NOT NULL,
              parent_tag_id TEXT NOT NULL,
              UNIQUE (child_tag_id, parent_tag_id)
            );
            CREATE INDEX IF NOT EXISTS idx_tag_parents_child
              ON tag_parents(child_tag_id);

            CREATE TABLE IF NOT EXISTS field_values (
              tuple_id TEXT NOT NULL,
              source_node_id TEXT,
              field_name TEXT NOT NULL,
              normalized_field_name TEXT NOT NULL,
              value_text TEXT NOT NULL,
              value_order INTEGER NOT NULL,
              PRIMARY KEY (tuple_id, value_order)
            );
            CREATE INDEX IF NOT EXISTS idx_field_values_field
              ON field_values(normalized_field_name);

            CREATE TABLE IF NOT EXISTS system_field_sources (
              field_id TEXT NOT NULL,
              tag_id TEXT NOT NULL,
              UNIQUE (field_id, tag_id)
            );

            CREATE TABLE IF NOT EXISTS meta (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Empty the three extraction tables in one transaction, so readers see
    /// either the old index or the cleared state, never a partial delete.
    pub fn clear(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            BEGIN IMMEDIATE;
            DELETE FROM tag_metadata;
            DELETE FROM tag_fields;
            DELETE FROM tag_parents;
            DELETE FROM system_field_sources;
            COMMIT;
            "#,
        )?;
        Ok(())
    }

    /// Empty the value table; the value pass rebuilds it independently.
    pub fn clear_field_values(&self) -> Result<()> {
        self.conn.execute("DELETE FROM field_values", [])?;
        Ok(())
    }

    // --- writes ---

    pub fn upsert_tag(&self, entry: &TagMetadataEntry) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO tag_metadata
              (tag_id, tag_name, normalized_name, description, color, trashed, indexed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(tag_id) DO UPDATE SET
              tag_name = excluded.tag_name,
              normalized_name = excluded.normalized_name,
              description = excluded.description,
              color = excluded.color,
              trashed = excluded.trashed,
              indexed_at = excluded.indexed_at
            "#,
            params![
                entry.tag_id,
                entry.tag_name,
                entry.normalized_name,
                entry.description,
                entry.color,
                entry.trashed as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn upsert_field(&self, field: &FieldDefinition) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO tag_fields
              (tag_id, field_name, field_label_id, field_order, normalized_name,
               data_type, target_supertag_id, target_supertag_name,
               default_value_id, default_value_text)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(tag_id, field_name) DO UPDATE SET
              field_label_id = excluded.field_label_id,
              field_order = excluded.field_order,
              normalized_name = excluded.normalized_name,
              data_type = excluded.data_type,
              target_supertag_id = excluded.target_supertag_id,
              target_supertag_name = excluded.target_supertag_name,
              default_value_id = excluded.default_value_id,
              default_value_text = excluded.default_value_text
            "#,
            params![
                field.tag_id,
                field.field_name,
                field.field_label_id,
                field.field_order,
                field.normalized_name,
                field.data_type,
                field.target_supertag_id,
                field.target_supertag_name,
                field.default_value_id,
                field.default_value_text,
            ],
        )?;
        Ok(())
    }

    /// Record a parent edge. Duplicate pairs are ignored; self-loops are not
    /// rejected here and must be tolerated by readers.
    pub fn insert_parent(&self, child_tag_id: &str, parent_tag_id: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO tag_parents (child_tag_id, parent_tag_id) VALUES (?1, ?2)",
            params![child_tag_id, parent_tag_id],
        )?;
        Ok(())
    }

    pub fn upsert_field_value(&self, row: &FieldValueRow) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO field_values
              (tuple_id, source_node_id, field_name, normalized_field_name,
               value_text, value_order)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(tuple_id, value_order) DO UPDATE SET
              source_node_id = excluded.source_node_id,
              field_name = excluded.field_name,
              normalized_field_name = excluded.normalized_field_name,
              value_text = excluded.value_text
            "#,
            params![
                row.tuple_id,
                row.source_node_id,
                row.field_name,
                row.normalized_field_name,
                row.value_text,
                row.value_order,
            ],
        )?;
        Ok(())
    }

    /// Declare that instances of `tag_id` carry the system field `field_id`.
    /// Optional data: inheritance resolution degrades silently without it.
    pub fn record_system_field_source(&self, field_id: &str, tag_id: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO system_field_sources (field_id, tag_id) VALUES (?1, ?2)",
            params![field_id, tag_id],
        )?;
        Ok(())
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    // --- reads ---

    pub fn meta(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |r| {
                r.get(0)
            })
            .optional()?)
    }

    pub fn tag_by_id(&self, tag_id: &str) -> Result<Option<TagMetadataEntry>> {
        Ok(self
            .conn
            .query_row(
                "SELECT tag_id, tag_name, normalized_name, description, color, trashed
                 FROM tag_metadata WHERE tag_id = ?1",
                params![tag_id],
                row_to_tag,
            )
            .optional()?)
    }

    pub fn all_tags(&self) -> Result<Vec<TagMetadataEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT tag_id, tag_name, normalized_name, description, color, trashed
             FROM tag_metadata ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], row_to_tag)?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    /// All candidates matching a raw or normalized name, in insertion order,
    /// with the counters the canonical policy ranks by. Trashed rows are
    /// excluded; rows indexed before trash tracking (NULL) count as live.
    pub fn tags_named(&self, name: &str, normalized: &str) -> Result<Vec<TagCandidate>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT t.tag_id, t.tag_name, t.normalized_name, t.description, t.color,
                   t.trashed, t.rowid,
                   (SELECT COUNT(*) FROM tag_parents p WHERE p.child_tag_id = t.tag_id),
                   (SELECT COUNT(*) FROM tag_fields f WHERE f.tag_id = t.tag_id)
            FROM tag_metadata t
            WHERE (t.tag_name = ?1 OR t.normalized_name = ?2)
              AND IFNULL(t.trashed, 0) = 0
            ORDER BY t.rowid
            "#,
        )?;
        let rows = stmt.query_map(params![name, normalized], row_to_candidate)?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    /// Case-insensitive substring search over raw and normalized names.
    pub fn search_tags(&self, query: &str, normalized: &str) -> Result<Vec<TagMetadataEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT tag_id, tag_name, normalized_name, description, color, trashed
            FROM tag_metadata
            WHERE (instr(lower(tag_name), lower(?1)) > 0
                   OR (length(?2) > 0 AND instr(normalized_name, ?2) > 0))
              AND IFNULL(trashed, 0) = 0
            ORDER BY tag_name, rowid
            "#,
        )?;
        let rows = stmt.query_map(params![query, normalized], row_to_tag)?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    pub fn all_tag_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT tag_name FROM tag_metadata
             WHERE IFNULL(trashed, 0) = 0 ORDER BY tag_name",
        )?;
        let rows = stmt.query_map([], |r| r.get(0))?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    /// A tag's own fields in declaration order.
    pub fn own_fields(&self, tag_id: &str) -> Result<Vec<FieldDefinition>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT tag_id, field_name, field_label_id, field_order, normalized_name,
                   data_type, target_supertag_id, target_supertag_name,
                   default_value_id, default_value_text
            FROM tag_fields WHERE tag_id = ?1
            ORDER BY field_order, rowid
            "#,
        )?;
        let rows = stmt.query_map(params![tag_id], row_to_field)?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    pub fn direct_parents(&self, child_tag_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT parent_tag_id FROM tag_parents WHERE child_tag_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![child_tag_id], |r| r.get(0))?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    /// Every parent edge, for whole-graph diagnostics.
    pub fn parent_edges(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT child_tag_id, parent_tag_id FROM tag_parents ORDER BY rowid")?;
        let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    pub fn system_field_sources(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT field_id, tag_id FROM system_field_sources ORDER BY rowid")?;
        let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    pub fn field_values_for(&self, normalized_field_name: &str) -> Result<Vec<FieldValueRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT tuple_id, source_node_id, field_name, normalized_field_name,
                   value_text, value_order
            FROM field_values WHERE normalized_field_name = ?1
            ORDER BY tuple_id, value_order
            "#,
        )?;
        let rows = stmt.query_map(params![normalized_field_name], row_to_value)?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    pub fn tag_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM tag_metadata", [], |r| r.get(0))?)
    }

    pub fn field_value_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM field_values", [], |r| r.get(0))?)
    }
}

fn row_to_tag(row: &rusqlite::Row<'_>) -> rusqlite::Result<TagMetadataEntry> {
    Ok(TagMetadataEntry {
        tag_id: row.get(0)?,
        tag_name: row.get(1)?,
        normalized_name: row.get(2)?,
        description: row.get(3)?,
        color: row.get(4)?,
        trashed: row.get::<_, i64>(5)? != 0,
    })
}

fn row_to_candidate(row: &rusqlite::Row<'_>) -> rusqlite::Result<TagCandidate> {
    Ok(TagCandidate {
        entry: row_to_tag(row)?,
        rowid: row.get(6)?,
        parent_count: row.get(7)?,
        field_count: row.get(8)?,
    })
}

fn row_to_field(row: &rusqlite::Row<'_>) -> rusqlite::Result<FieldDefinition> {
    Ok(FieldDefinition {
        tag_id: row.get(0)?,
        field_name: row.get(1)?,
        field_label_id: row.get(2)?,
        field_order: row.get(3)?,
        normalized_name: row.get(4)?,
        data_type: row.get(5)?,
        target_supertag_id: row.get(6)?,
        target_supertag_name: row.get(7)?,
        default_value_id: row.get(8)?,
        default_value_text: row.get(9)?,
    })
}

fn row_to_value(row: &rusqlite::Row<'_>) -> rusqlite::Result<FieldValueRow> {
    Ok(FieldValueRow {
        tuple_id: row.get(0)?,
        source_node_id: row.get(1)?,
        field_name: row.get(2)?,
        normalized_field_name: row.get(3)?,
        value_text: row.get(4)?,
        value_order: row.get(5)?,
    })
}
