//! Search plan: the patterns a name query expands into
//!
//! LIKE patterns drive ranks 1-3 (exact, prefix, substring on the name).
//! The FTS5 expression drives rank 4, a prefix phrase restricted to the
//! signature column.

/// Prepared search parameters for `IndexStore::search`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPlan {
    /// Query text, compared case-insensitively against the whole name
    pub exact: String,
    /// `query%` with LIKE metacharacters escaped
    pub prefix_pattern: String,
    /// `%query%` with LIKE metacharacters escaped
    pub contains_pattern: String,
    /// Signature-only FTS5 expression; `None` when the query has no indexable tokens
    pub fts_query: Option<String>,
}

impl SearchPlan {
    /// `None` for a blank query
    pub fn new(query: &str) -> Option<Self> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }

        let escaped = escape_like(query);
        Some(Self {
            exact: query.to_string(),
            prefix_pattern: format!("{}%", escaped),
            contains_pattern: format!("%{}%", escaped),
            fts_query: prepare_fts_query(query),
        })
    }
}

/// Escape `\`, `%` and `_` for `LIKE ... ESCAPE '\'`
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Quote the query as one FTS5 prefix phrase on the signature column
///
/// Quoting keeps operators (`-`, `*`, `:`, `AND`) literal. Queries with no
/// word characters can't match a token and skip the full-text leg.
pub fn prepare_fts_query(query: &str) -> Option<String> {
    if !query.chars().any(|c| c.is_alphanumeric()) {
        return None;
    }
    Some(format!("signature : \"{}\"*", query.replace('"', "\"\"")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_query_has_no_plan() {
        assert!(SearchPlan::new("   ").is_none());
    }

    #[test]
    fn test_like_escaping() {
        let plan = SearchPlan::new("SDL_Init").unwrap();
        assert_eq!(plan.prefix_pattern, "SDL\\_Init%");
        assert_eq!(plan.contains_pattern, "%SDL\\_Init%");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_fts_query_quoting() {
        assert_eq!(
            prepare_fts_query("window"),
            Some("signature : \"window\"*".to_string())
        );
        assert_eq!(
            prepare_fts_query("say \"hi\""),
            Some("signature : \"say \"\"hi\"\"\"*".to_string())
        );
        assert_eq!(prepare_fts_query("::"), None);
    }
}
