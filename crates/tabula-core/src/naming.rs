/// Maximum identifier length kept by [`db_qualified_table_name`].
pub const MAX_QUALIFIED_NAME_LEN: usize = 30;

/// Combine a database and table name into one identifier.
///
/// The result is lowercased, uses `_` instead of `-`, and keeps only the last
/// [`MAX_QUALIFIED_NAME_LEN`] characters so it fits backends with short
/// identifier limits.
pub fn db_qualified_table_name(database: &str, table: &str) -> String {
    let combined = format!("{database}_{table}").to_lowercase().replace('-', "_");
    let chars: Vec<char> = combined.chars().collect();
    let start = chars.len().saturating_sub(MAX_QUALIFIED_NAME_LEN);
    chars[start..].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualifies_and_normalizes() {
        assert_eq!(db_qualified_table_name("Test-Data", "venues"), "test_data_venues");
    }

    #[test]
    fn keeps_trailing_characters() {
        let name = db_qualified_table_name("a_very_long_database_name", "checkins");
        assert_eq!(name.len(), MAX_QUALIFIED_NAME_LEN);
        assert!(name.ends_with("_checkins"));
    }
}
