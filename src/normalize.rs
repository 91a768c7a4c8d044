//! Name normalization shared by every component
//!
//! Tag and field identity is name-based: the workspace app lets users rename
//! freely and duplicates differ only in case or punctuation, so all matching
//! goes through the normalized form.

/// Case- and punctuation-insensitive form of a display name.
///
/// Keeps alphanumerics only, lowercased. `"Due date"`, `"due-date"` and
/// `"Due Date!"` all normalize to `"duedate"`.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// True when a display name is pure indentation/bullet scaffolding.
///
/// The export encodes outline formatting as nodes whose names are runs of
/// dashes, bullets or whitespace; those never qualify as field labels.
pub fn is_indentation_style(name: &str) -> bool {
    let trimmed = name.trim();
    trimmed.is_empty()
        || trimmed
            .chars()
            .all(|c| matches!(c, '-' | '_' | '*' | '•' | '>' | '|') || c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_punctuation() {
        assert_eq!(normalize_name("Due date"), "duedate");
        assert_eq!(normalize_name("due-date"), "duedate");
        assert_eq!(normalize_name("DUE DATE!"), "duedate");
        assert_eq!(normalize_name("Städte"), "städte");
    }

    #[test]
    fn empty_and_symbol_only_names_normalize_empty() {
        assert_eq!(normalize_name(""), "");
        assert_eq!(normalize_name("---"), "");
    }

    #[test]
    fn detects_indentation_names() {
        assert!(is_indentation_style("  "));
        assert!(is_indentation_style("---"));
        assert!(is_indentation_style("• • •"));
        assert!(!is_indentation_style("Due date"));
        assert!(!is_indentation_style("- item one"));
    }
}
