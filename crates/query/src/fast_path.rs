//! Pre-SQL-engine interception of exactly two query shapes:
//!
//! - `SELECT * FROM <table>`
//! - `SELECT * FROM <table> WHERE <col> = ?`
//!
//! Matching is whitespace-normalized and keyword/identifier case-insensitive.
//! A parsed-query cache keyed by the raw SQL string avoids re-parsing a
//! statement that is executed repeatedly (the common case for a prepared
//! query reused across many parameter bindings).

use std::cell::RefCell;
use std::collections::HashMap;

/// The two shapes the fast path recognizes; any other statement shape is a
/// cache miss that falls back to the SQL engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FastQuery {
    SelectStar { table: String },
    SelectStarWhereEq { table: String, column: String },
}

thread_local! {
    static PARSED_QUERY_CACHE: RefCell<HashMap<String, Option<FastQuery>>> = RefCell::new(HashMap::new());
}

/// Returns the cached parse result for `sql`, computing and caching it on a
/// miss. `None` means "not a fast-path shape", cached the same as a hit so a
/// repeatedly-issued non-fast-path query doesn't re-run the parser either.
pub fn parse_cached(sql: &str) -> Option<FastQuery> {
    PARSED_QUERY_CACHE.with(|cache| {
        if let Some(hit) = cache.borrow().get(sql) {
            return hit.clone();
        }
        let parsed = parse(sql);
        cache.borrow_mut().insert(sql.to_string(), parsed.clone());
        parsed
    })
}

#[cfg(test)]
pub fn clear_cache_for_tests() {
    PARSED_QUERY_CACHE.with(|cache| cache.borrow_mut().clear());
}

fn parse(sql: &str) -> Option<FastQuery> {
    let tokens: Vec<&str> = sql.split_whitespace().collect();
    match tokens.as_slice() {
        [select, star, from, table] if ci(select, "select") && *star == "*" && ci(from, "from") => {
            Some(FastQuery::SelectStar { table: unquote(table) })
        }
        [select, star, from, table, r#where, column, eq, placeholder]
            if ci(select, "select")
                && *star == "*"
                && ci(from, "from")
                && ci(r#where, "where")
                && *eq == "="
                && *placeholder == "?" =>
        {
            Some(FastQuery::SelectStarWhereEq { table: unquote(table), column: unquote(column) })
        }
        _ => None,
    }
}

fn ci(token: &str, expected: &str) -> bool {
    token.eq_ignore_ascii_case(expected)
}

fn unquote(token: &str) -> String {
    token.trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_select_star() {
        assert_eq!(parse("SELECT * FROM users"), Some(FastQuery::SelectStar { table: "users".into() }));
        assert_eq!(parse("select   *   from   users"), Some(FastQuery::SelectStar { table: "users".into() }));
    }

    #[test]
    fn matches_select_star_where_eq() {
        assert_eq!(
            parse("SELECT * FROM users WHERE email = ?"),
            Some(FastQuery::SelectStarWhereEq { table: "users".into(), column: "email".into() })
        );
    }

    #[test]
    fn is_case_insensitive_on_keywords_not_identifiers() {
        assert_eq!(
            parse("SeLeCt * FrOm Users WhErE Email = ?"),
            Some(FastQuery::SelectStarWhereEq { table: "Users".into(), column: "Email".into() })
        );
    }

    #[test]
    fn falls_back_on_any_deviation() {
        assert_eq!(parse("SELECT id FROM users"), None);
        assert_eq!(parse("SELECT * FROM users WHERE age > ?"), None);
        assert_eq!(parse("SELECT * FROM users WHERE email = ? AND age = ?"), None);
        assert_eq!(parse("SELECT * FROM users LIMIT 1"), None);
    }

    #[test]
    fn cache_returns_same_parse_on_repeat() {
        clear_cache_for_tests();
        let sql = "SELECT * FROM widgets";
        assert_eq!(parse_cached(sql), parse_cached(sql));
    }
}
