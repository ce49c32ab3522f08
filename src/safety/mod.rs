//! Safety Gate for Generated SQL
//!
//! Statements produced by the language-model backend are untrusted. Before one
//! may reach the database it has to pass this gate, which turns it into a
//! [`SafeSql`] value; the executor only accepts that type.
//!
//! # Validation Strategy
//! - Case-insensitive, whole-word match against a fixed disallow-list
//! - Lexical, not a parser: a listed word inside a string literal or an
//!   identifier is still rejected (false positive), but a listed keyword is
//!   never let through
//! - Everything else passes, including CTEs, subqueries, joins and aggregates
//!
//! The read-only transaction opened by the executor is a second line of defense.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{LensError, Result};

/// Keywords that disqualify a statement
pub const DISALLOWED_KEYWORDS: [&str; 11] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE",
    "EXECUTE", "EXEC",
];

static UNSAFE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b({})\b", DISALLOWED_KEYWORDS.join("|")))
        .expect("disallow-list pattern is valid")
});

/// A statement that passed the safety gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeSql(String);

impl SafeSql {
    /// The gated statement text, unchanged
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for SafeSql {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Find the first disallowed keyword in `sql`, by canonical name
#[must_use]
pub fn find_disallowed_keyword(sql: &str) -> Option<&'static str> {
    let matched = UNSAFE_PATTERN.find(sql)?;
    DISALLOWED_KEYWORDS
        .iter()
        .copied()
        .find(|kw| kw.eq_ignore_ascii_case(matched.as_str()))
}

/// Validate that `sql` is a pure read
///
/// # Returns
/// * `Ok(SafeSql)` wrapping the statement unchanged
/// * `Err(LensError::UnsafeSql)` naming the first disallowed keyword
pub fn check(sql: &str) -> Result<SafeSql> {
    match find_disallowed_keyword(sql) {
        Some(keyword) => Err(LensError::unsafe_sql(keyword)),
        None => Ok(SafeSql(sql.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_select_passes() {
        let safe = check("SELECT * FROM users").unwrap();
        assert_eq!(safe.as_str(), "SELECT * FROM users");
    }

    #[test]
    fn test_every_keyword_rejected_by_name() {
        for kw in DISALLOWED_KEYWORDS {
            let sql = format!("{kw} something");
            let err = check(&sql).unwrap_err();
            assert!(
                matches!(&err, LensError::UnsafeSql { keyword } if keyword == kw),
                "{kw} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(find_disallowed_keyword("drop table users"), Some("DROP"));
        assert_eq!(find_disallowed_keyword("DeLeTe FROM users"), Some("DELETE"));
    }

    #[test]
    fn test_first_match_wins() {
        assert_eq!(find_disallowed_keyword("UPDATE t SET a = 1; DROP TABLE t"), Some("UPDATE"));
    }

    #[test]
    fn test_exec_and_execute_are_distinct_words() {
        assert_eq!(find_disallowed_keyword("EXEC sp_who"), Some("EXEC"));
        assert_eq!(find_disallowed_keyword("EXECUTE plan_a"), Some("EXECUTE"));
    }

    #[test]
    fn test_whole_word_only() {
        // Substrings of identifiers are not matches
        assert!(check("SELECT created_at, updated_at FROM users").is_ok());
        assert!(check("SELECT * FROM dropbox_files").is_ok());
        assert!(check("SELECT executor_id FROM jobs").is_ok());
        assert!(check("SELECT inserted FROM audit").is_ok());
    }

    #[test]
    fn test_keyword_in_string_literal_is_rejected() {
        // Known false positive of the lexical approach
        let err = check("SELECT * FROM logs WHERE message = 'drop'").unwrap_err();
        assert_eq!(err.error_code(), "UNSAFE_SQL");
    }

    #[test]
    fn test_complex_reads_pass() {
        let sql = "WITH recent AS (
                SELECT user_id, COUNT(*) AS n FROM posts
                WHERE published_at > now() - interval '7 days'
                GROUP BY user_id
            )
            SELECT u.name, r.n FROM users u
            JOIN recent r ON r.user_id = u.id
            WHERE u.id IN (SELECT user_id FROM memberships)
            ORDER BY r.n DESC LIMIT 10";
        assert!(check(sql).is_ok());
    }
}
