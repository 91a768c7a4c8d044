//! Synthetic system identifiers used by the workspace export
//!
//! The export mixes real node ids with bare literal markers for built-in
//! concepts. A marker is not a node: it appears as a child id with no entry in
//! the node map. Resolution is therefore a two-branch lookup everywhere:
//! marker table first, node map second.

use std::sync::OnceLock;

use regex::Regex;

/// A built-in field that has no definition node in the export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemField {
    /// The literal marker string used as a child id
    pub marker: &'static str,
    /// Human display name of the field
    pub name: &'static str,
    /// Data type the remote API expects for this field, when known
    pub data_type: Option<&'static str>,
}

/// The fixed set of system field markers the extractor understands.
pub const SYSTEM_FIELDS: &[SystemField] = &[
    SystemField {
        marker: "SYS_A13",
        name: "Description",
        data_type: None,
    },
    SystemField {
        marker: "SYS_A61",
        name: "Due date",
        data_type: Some("date"),
    },
    SystemField {
        marker: "SYS_A62",
        name: "Done date",
        data_type: Some("date"),
    },
    SystemField {
        marker: "SYS_A78",
        name: "Source URL",
        data_type: Some("url"),
    },
];

/// Marker opening the inheritance declaration tuple on a tag's meta node.
///
/// Legacy exports wrap the marker in a node literally named `SYS_A12`; both
/// encodings must be accepted.
pub const INHERITANCE_MARKER: &str = "SYS_A12";

/// Marker opening the target-supertag declaration on a field label's meta node.
pub const TARGET_TAG_MARKER: &str = "SYS_A14";

/// Marker opening the data-type declaration on a field label's meta node.
pub const DATA_TYPE_MARKER: &str = "SYS_A15";

/// Substring identifying the trash collection in owner ids.
pub const TRASH_MARKER: &str = "TRASH";

/// Sentinel `field_order` for system fields appended by inheritance
/// resolution; always sorts after user-defined fields.
pub const SYSTEM_FIELD_ORDER: i64 = 9999;

/// Look up a system field by its marker literal.
pub fn system_field(marker: &str) -> Option<&'static SystemField> {
    SYSTEM_FIELDS.iter().find(|f| f.marker == marker)
}

/// True when a value has the shape of an opaque node id: alphanumeric, dash
/// or underscore, at least 8 characters. Used by payload encoding to decide
/// between a direct reference and a new-node leaf.
pub fn looks_like_node_id(value: &str) -> bool {
    static ID_SHAPE: OnceLock<Regex> = OnceLock::new();
    let re = ID_SHAPE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{8,}$").expect("id shape regex"));
    re.is_match(value)
}
