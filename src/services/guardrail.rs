//! Last line of defense between model-produced SQL and the database.
//!
//! Two independent layers: a tokenizer-based structural check (one statement,
//! rooted at `SELECT`) and a textual whole-word scan for mutating keywords.
//! Neither understands semantics. `SELECT ... INTO new_table` passes both
//! layers and creates a table, so the database role must be read-only as well.

use log::{info, warn};
use regex::Regex;
use serde::Serialize;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};

use crate::error::{AppError, Result};

const BLOCKED_KEYWORDS: &str =
    r"(?i)\b(INSERT|UPDATE|DELETE|DROP|ALTER|TRUNCATE|CREATE|GRANT|REVOKE|MERGE)\b";

pub const SINGLE_STATEMENT_REASON: &str = "Only a single statement is allowed.";
pub const SELECT_ONLY_REASON: &str = "Only SELECT statements are allowed.";
pub const BLOCKED_KEYWORD_REASON: &str = "Statement contains blocked keywords.";

/// Outcome of [`SqlGuardrail::validate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub accepted: bool,
    pub reason: String,
}

impl Verdict {
    fn accept() -> Self {
        Self { accepted: true, reason: String::new() }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self { accepted: false, reason: reason.into() }
    }
}

/// SQL that passed validation, ready for execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafeQuery {
    pub sql: String,
    pub limit_added: bool,
}

#[derive(Debug, Clone)]
pub struct SqlGuardrail {
    blocked: Regex,
}

impl SqlGuardrail {
    pub fn new() -> Result<Self> {
        let blocked = Regex::new(BLOCKED_KEYWORDS)
            .map_err(|e| {
                AppError::ConfigurationInvalid(format!("blocked keyword pattern: {}", e))
            })?;
        Ok(Self { blocked })
    }

    /// Accept only a single statement whose first token is `SELECT` and whose
    /// text holds none of the blocked keywords. Comments are not stripped
    /// before the keyword scan, so a blocked word inside a comment rejects.
    pub fn validate(&self, sql: &str) -> Verdict {
        let tokens = match tokenize(sql) {
            Ok(tokens) => tokens,
            Err(e) => return Verdict::reject(format!("SQL could not be parsed: {}", e)),
        };

        let statements = split_statements(&tokens);
        if statements.len() != 1 {
            return Verdict::reject(SINGLE_STATEMENT_REASON);
        }

        let first = statements[0].iter().find(|t| !is_blank(t));
        match first {
            Some(Token::Word(w))
                if w.quote_style.is_none() && w.value.eq_ignore_ascii_case("SELECT") => {}
            _ => return Verdict::reject(SELECT_ONLY_REASON),
        }

        if self.blocked.is_match(sql) {
            return Verdict::reject(BLOCKED_KEYWORD_REASON);
        }

        Verdict::accept()
    }

    /// Append `LIMIT <default_limit>;` unless the statement already carries a
    /// top-level `LIMIT` or `FETCH`. Limits inside parentheses belong to
    /// subqueries and do not count. The clause goes before any trailing
    /// comments so a `--` comment cannot swallow it.
    pub fn enforce_limit(&self, sql: &str, default_limit: u32) -> String {
        let has_limit = match tokenize(sql) {
            Ok(tokens) => has_top_level_limit(&tokens),
            Err(e) => {
                warn!("⚠️ Could not tokenize SQL while checking for LIMIT: {}", e);
                false
            }
        };
        if has_limit {
            return sql.to_string();
        }

        let (body, trailer) = split_trailer(sql);
        let comments = trailer.trim_start_matches(|c: char| c == ';' || c.is_whitespace());
        if comments.is_empty() {
            format!("{} LIMIT {};", body, default_limit)
        } else {
            format!("{} LIMIT {}; {}", body, default_limit, comments)
        }
    }

    /// Validate, then enforce the limit. The limit is never applied to SQL
    /// that failed validation.
    pub fn vet(&self, sql: &str, default_limit: u32) -> Result<SafeQuery> {
        let verdict = self.validate(sql);
        if !verdict.accepted {
            warn!("🛑 Guardrail rejected SQL: {}", verdict.reason);
            return Err(AppError::GuardrailRejected(verdict.reason));
        }

        let enforced = self.enforce_limit(sql, default_limit);
        let limit_added = enforced.trim() != sql.trim();
        if limit_added {
            info!("📏 LIMIT {} enforced on proposed SQL", default_limit);
        }
        Ok(SafeQuery { sql: enforced, limit_added })
    }
}

fn tokenize(sql: &str) -> std::result::Result<Vec<Token>, String> {
    let dialect = PostgreSqlDialect {};
    Tokenizer::new(&dialect, sql).tokenize().map_err(|e| e.to_string())
}

fn is_blank(token: &Token) -> bool {
    matches!(
        token,
        Token::Whitespace(Whitespace::Space | Whitespace::Newline | Whitespace::Tab)
    )
}

/// Statements are `;`-separated runs that hold more than whitespace or comments.
fn split_statements(tokens: &[Token]) -> Vec<&[Token]> {
    tokens
        .split(|t| *t == Token::SemiColon)
        .filter(|run| run.iter().any(|t| !matches!(t, Token::Whitespace(_))))
        .collect()
}

fn has_top_level_limit(tokens: &[Token]) -> bool {
    let mut depth = 0usize;
    for token in tokens {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Word(w)
                if depth == 0 && w.quote_style.is_none() && is_limit_keyword(&w.value) =>
            {
                return true
            }
            _ => {}
        }
    }
    false
}

fn is_limit_keyword(word: &str) -> bool {
    word.eq_ignore_ascii_case("LIMIT") || word.eq_ignore_ascii_case("FETCH")
}

/// Split `sql` into the statement body and whatever trails it: semicolons,
/// whitespace and comments. The body is always a prefix of `sql`.
fn split_trailer(sql: &str) -> (&str, &str) {
    let mut body = sql;
    loop {
        let trimmed = body.trim_end();
        if let Some(rest) = trimmed.strip_suffix(';') {
            body = rest;
            continue;
        }
        let comment = match tokenize(trimmed).ok().and_then(|tokens| tokens.into_iter().last()) {
            Some(Token::Whitespace(Whitespace::SingleLineComment { comment, prefix })) => {
                format!("{}{}", prefix, comment)
            }
            Some(Token::Whitespace(Whitespace::MultiLineComment(comment))) => {
                format!("/*{}*/", comment)
            }
            _ => return (trimmed, &sql[trimmed.len()..]),
        };
        match trimmed.strip_suffix(comment.as_str()) {
            Some(rest) => body = rest,
            None => return (trimmed, &sql[trimmed.len()..]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> SqlGuardrail {
        SqlGuardrail::new().unwrap()
    }

    fn rejects(sql: &str) -> String {
        let v = guard().validate(sql);
        assert!(!v.accepted, "expected rejection for {:?}", sql);
        v.reason
    }

    #[test]
    fn test_stacked_statements_are_rejected() {
        assert_eq!(rejects("SELECT * FROM users; DROP TABLE users;"), SINGLE_STATEMENT_REASON);
        assert_eq!(rejects("SELECT 1; SELECT 2"), SINGLE_STATEMENT_REASON);
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert_eq!(rejects(""), SINGLE_STATEMENT_REASON);
        assert_eq!(rejects("   ;  "), SINGLE_STATEMENT_REASON);
    }

    #[test]
    fn test_trailing_semicolon_and_comment_count_as_one_statement() {
        assert!(guard().validate("SELECT 1;").accepted);
        assert!(guard().validate("SELECT 1; -- done").accepted);
    }

    #[test]
    fn test_non_select_roots_are_rejected_in_any_case() {
        assert_eq!(rejects("UPDATE t SET x=1"), SELECT_ONLY_REASON);
        assert_eq!(rejects("update t set x=1"), SELECT_ONLY_REASON);
        assert_eq!(rejects("EXPLAIN SELECT 1"), SELECT_ONLY_REASON);
        assert_eq!(rejects("\"select\" 1"), SELECT_ONLY_REASON);
        assert_eq!(rejects("-- note\nSELECT 1"), SELECT_ONLY_REASON);
    }

    #[test]
    fn test_leading_whitespace_is_skipped() {
        assert!(guard().validate("\n\t  select id from users").accepted);
    }

    #[test]
    fn test_blocked_keywords_anywhere_are_rejected() {
        assert_eq!(
            rejects("SELECT * FROM (SELECT 1) t WHERE EXISTS (DELETE FROM x RETURNING 1)"),
            BLOCKED_KEYWORD_REASON
        );
        assert_eq!(rejects("select 'ok' as drop"), BLOCKED_KEYWORD_REASON);
        assert_eq!(rejects("SELECT 1 /* truncate later */"), BLOCKED_KEYWORD_REASON);
        assert_eq!(rejects("SELECT merge_flag, Grant FROM t"), BLOCKED_KEYWORD_REASON);
    }

    #[test]
    fn test_keyword_scan_is_whole_word() {
        let g = guard();
        assert!(g.validate("SELECT created_at, updated_at, last_update FROM orders").accepted);
        assert!(g.validate("SELECT deleted FROM audit").accepted);
    }

    #[test]
    fn test_unterminated_literal_is_rejected() {
        let reason = rejects("SELECT 'oops FROM t");
        assert!(reason.contains("could not be parsed"));
    }

    #[test]
    fn test_accept_has_empty_reason() {
        let v = guard().validate("SELECT id FROM users WHERE id = 1");
        assert_eq!(v, Verdict { accepted: true, reason: String::new() });
    }

    #[test]
    fn test_limit_appended_when_absent() {
        let out = guard().enforce_limit(
            "select id, name from customers where created_at > '2024-01-01'",
            500,
        );
        assert_eq!(
            out,
            "select id, name from customers where created_at > '2024-01-01' LIMIT 500;"
        );
    }

    #[test]
    fn test_trailing_semicolon_is_not_duplicated() {
        let g = guard();
        assert_eq!(g.enforce_limit("SELECT 1;", 50), "SELECT 1 LIMIT 50;");
        assert_eq!(g.enforce_limit("SELECT 1 ;  \n", 50), "SELECT 1 LIMIT 50;");
    }

    #[test]
    fn test_existing_limit_is_respected() {
        let g = guard();
        let sql = "SELECT id FROM users ORDER BY id limit 10";
        assert_eq!(g.enforce_limit(sql, 500), sql);
        let sql = "SELECT id FROM users LIMIT 5;";
        assert_eq!(g.enforce_limit(sql, 500), sql);
    }

    #[test]
    fn test_subquery_limit_does_not_count() {
        let out = guard().enforce_limit("SELECT * FROM (SELECT id FROM t LIMIT 3) s", 100);
        assert_eq!(out, "SELECT * FROM (SELECT id FROM t LIMIT 3) s LIMIT 100;");
    }

    #[test]
    fn test_limit_in_literal_or_quoted_identifier_does_not_count() {
        let g = guard();
        assert!(g.enforce_limit("SELECT 'LIMIT' AS x", 20).ends_with("LIMIT 20;"));
        assert!(g.enforce_limit("SELECT \"limit\" FROM quotas", 20).ends_with("LIMIT 20;"));
    }

    #[test]
    fn test_enforce_limit_is_idempotent() {
        let g = guard();
        for sql in [
            "SELECT 1",
            "SELECT a FROM b;",
            "select * from t where x in (select y from z limit 1)",
            "SELECT a FROM b LIMIT 7",
            "SELECT a FROM b -- trailing note",
            "SELECT a FROM b; /* done */",
        ] {
            let once = g.enforce_limit(sql, 250);
            assert_eq!(g.enforce_limit(&once, 250), once);
        }
    }

    #[test]
    fn test_limit_goes_before_trailing_line_comment() {
        let g = guard();
        let once = g.enforce_limit("SELECT id FROM users -- every user", 500);
        assert_eq!(once, "SELECT id FROM users LIMIT 500; -- every user");
        assert!(has_top_level_limit(&tokenize(&once).unwrap()));
        assert_eq!(g.enforce_limit(&once, 500), once);
        assert!(g.validate(&once).accepted);
    }

    #[test]
    fn test_limit_with_semicolon_and_comments_after_it() {
        let g = guard();
        assert_eq!(g.enforce_limit("SELECT 1; -- done", 50), "SELECT 1 LIMIT 50; -- done");
        assert_eq!(
            g.enforce_limit("SELECT 1 /* one */ -- two\n", 50),
            "SELECT 1 LIMIT 50; /* one */ -- two\n"
        );
        assert_eq!(g.enforce_limit("SELECT 1;;", 50), "SELECT 1 LIMIT 50;");
    }

    #[test]
    fn test_vet_limits_sql_ending_in_comment() {
        let g = guard();
        let q = g.vet("SELECT id FROM users -- every user", 100).unwrap();
        assert!(q.limit_added);
        assert_eq!(q.sql, "SELECT id FROM users LIMIT 100; -- every user");
        let again = g.vet(&q.sql, 100).unwrap();
        assert!(!again.limit_added);
        assert_eq!(again.sql, q.sql);
    }

    #[test]
    fn test_fetch_first_counts_as_limit() {
        let g = guard();
        let sql = "SELECT id FROM users ORDER BY id FETCH FIRST 5 ROWS ONLY";
        assert_eq!(g.enforce_limit(sql, 500), sql);
        let sql = "SELECT * FROM (SELECT id FROM t FETCH FIRST 1 ROW ONLY) s";
        assert!(g.enforce_limit(sql, 500).ends_with("s LIMIT 500;"));
    }

    #[test]
    fn test_vet_reports_limit_added() {
        let g = guard();
        let q = g.vet("SELECT id FROM users", 100).unwrap();
        assert_eq!(
            q,
            SafeQuery { sql: "SELECT id FROM users LIMIT 100;".to_string(), limit_added: true }
        );

        let q = g.vet("SELECT id FROM users LIMIT 3", 100).unwrap();
        assert!(!q.limit_added);
        assert_eq!(q.sql, "SELECT id FROM users LIMIT 3");
    }

    #[test]
    fn test_vet_never_limits_rejected_sql() {
        let err = guard().vet("DELETE FROM users", 100).unwrap_err();
        match err {
            AppError::GuardrailRejected(reason) => assert_eq!(reason, SELECT_ONLY_REASON),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
