//! Keyword search clause construction for the memo cache.

use rusqlite::types::Value;

/// Split a search query on whitespace into non-blank keywords.
pub fn split_keywords(query: &str) -> Vec<String> {
    query.split_whitespace().map(str::to_string).collect()
}

/// Escape LIKE wildcards so a keyword only ever matches literally.
pub fn escape_like(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len() + 2);
    for ch in keyword.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// WHERE clause plus bind values for an AND search over all keywords.
///
/// Each keyword must appear in `display_name` or `full_text`. No keywords
/// yields `None`, meaning "match everything". Placeholders are numbered from 1
/// so callers can append their own after `values.len()`.
pub fn build_search_clause(query: &str) -> Option<(String, Vec<Value>)> {
    let keywords = split_keywords(query);
    if keywords.is_empty() {
        return None;
    }

    let conditions = (1..=keywords.len())
        .map(|i| {
            format!(
                "(display_name LIKE ?{i} ESCAPE '\\' OR full_text LIKE ?{i} ESCAPE '\\')"
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ");

    let values = keywords
        .iter()
        .map(|keyword| Value::Text(format!("%{}%", escape_like(keyword))))
        .collect();

    Some((conditions, values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keywords_drops_blanks() {
        assert_eq!(split_keywords("  foo \t bar\n baz  "), vec!["foo", "bar", "baz"]);
        assert!(split_keywords("   ").is_empty());
        assert!(split_keywords("").is_empty());
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("c:\\dir"), "c:\\\\dir");
        assert_eq!(escape_like("it's"), "it's");
    }

    #[test]
    fn test_clause_binds_one_value_per_keyword() {
        let (clause, values) = build_search_clause("foo bar").unwrap();
        assert_eq!(values.len(), 2);
        assert!(clause.contains("?1") && clause.contains("?2"));
        assert!(clause.contains(" AND "));
        assert_eq!(values[0], Value::Text("%foo%".to_string()));
    }

    #[test]
    fn test_blank_query_has_no_clause() {
        assert!(build_search_clause(" \n ").is_none());
    }
}
