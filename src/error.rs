//! Error types for the supertag index engine

use thiserror::Error;

/// Result type for index operations
pub type Result<T> = std::result::Result<T, IndexError>;

/// Supertag index errors
///
/// Malformed graph input is never an error: extraction skips it locally and
/// counts it in the pass statistics. The only caller-visible engine failure
/// is `UnknownSupertag`.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("unknown supertag: {name}")]
    UnknownSupertag {
        name: String,
        /// Near-miss tag names, for error reporting at the call site
        suggestions: Vec<String>,
    },

    #[error("unsupported schema document version: {0}")]
    UnsupportedVersion(u32),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] config_crate::ConfigError),
}
