//! SQL guard: the single safety chokepoint between generation and execution.
//!
//! Candidate statements pass four checks, in order: single statement,
//! read-query shape (allowlist + denylist keywords), table whitelist, and a
//! mandatory row cap. The scan is lexical and conservative: comments and
//! string literals are stripped before every check, and input the scanner
//! cannot account for is rejected, never executed.

use crate::error::RejectionReason;
use crate::generator::CandidateSql;
use crate::schema::SchemaSnapshot;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// A statement that passed every guard check. Has no public constructor:
/// the executor can only be handed SQL that went through `SqlGuard::validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedSql {
    sql: String,
}

impl ValidatedSql {
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl std::fmt::Display for ValidatedSql {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sql)
    }
}

lazy_static! {
    static ref DENYLIST: Regex = Regex::new(
        r"(?i)\b(insert|update|delete|drop|alter|create|truncate|replace|merge|attach|detach|copy|export|import|pragma|grant|revoke|vacuum|begin|commit|rollback|call|set|install|load)\b"
    )
    .unwrap();
    static ref LEADING_KEYWORD: Regex = Regex::new(r"(?i)^\s*([a-z_]+)").unwrap();
    static ref CTE_NAME: Regex =
        Regex::new(r"(?i)(?:\bwith\s+|,\s*)([a-z_][a-z0-9_]*)\s+as\s*\(").unwrap();
    static ref LIMIT_NUM: Regex = Regex::new(r"(?i)^limit\s+(\d+)").unwrap();
    static ref LIMIT_TAIL: Regex = Regex::new(r"(?i)^offset\s+\d+$").unwrap();
    static ref LIMIT_WORD: Regex = Regex::new(r"(?i)\blimit\b").unwrap();
    static ref TOKEN: Regex =
        Regex::new(r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?|[(),]").unwrap();
}

/// Keywords that terminate a FROM list or cannot themselves be a relation.
const FROM_STOP: &[&str] = &[
    "where", "group", "order", "having", "limit", "offset", "union", "intersect", "except", "on",
    "using", "select", "window", "as",
];

/// Remove `--` and `/* */` comments, quote-aware. Comment tricks must not
/// hide keywords from the scan or smuggle them into execution.
fn strip_comments(sql: &str) -> Result<String, RejectionReason> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                let quote = c;
                out.push(c);
                i += 1;
                let mut closed = false;
                while i < chars.len() {
                    let ch = chars[i];
                    out.push(ch);
                    i += 1;
                    if ch == quote {
                        // Doubled quote is an escape, keep scanning.
                        if i < chars.len() && chars[i] == quote {
                            out.push(quote);
                            i += 1;
                        } else {
                            closed = true;
                            break;
                        }
                    }
                }
                if !closed {
                    return Err(RejectionReason::LimitInjectionFailed(
                        "unterminated string literal".to_string(),
                    ));
                }
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                let mut closed = false;
                while i + 1 < chars.len() {
                    if chars[i] == '*' && chars[i + 1] == '/' {
                        i += 2;
                        closed = true;
                        break;
                    }
                    i += 1;
                }
                if !closed {
                    return Err(RejectionReason::LimitInjectionFailed(
                        "unterminated block comment".to_string(),
                    ));
                }
                out.push(' ');
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok(out)
}

/// Replace single-quoted string contents with spaces. Byte length is
/// preserved (multibyte chars become one space per byte) so offsets in the
/// scan text line up with the cleaned statement for splicing.
fn blank_strings(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\'' {
            out.push(c);
            while let Some(inner) = chars.next() {
                if inner == '\'' {
                    if chars.peek() == Some(&'\'') {
                        chars.next();
                        out.push_str("  ");
                    } else {
                        out.push('\'');
                        break;
                    }
                } else {
                    for _ in 0..inner.len_utf8() {
                        out.push(' ');
                    }
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Walk the token stream and collect every identifier in relation position:
/// after FROM/JOIN, and after a comma while still inside a FROM list
/// (implicit cross joins). Subqueries are walked too, at their own paren
/// level, so relations inside them are never skipped.
fn extract_relations(scan: &str) -> Vec<String> {
    let mut relations = Vec::new();
    let mut stack: Vec<bool> = Vec::new();
    let mut in_from = false;
    let mut expecting = false;

    for token in TOKEN.find_iter(scan).map(|m| m.as_str()) {
        match token {
            "(" => {
                stack.push(in_from);
                in_from = false;
                expecting = false;
            }
            ")" => {
                in_from = stack.pop().unwrap_or(false);
                expecting = false;
            }
            "," => {
                if in_from {
                    expecting = true;
                }
            }
            word => {
                let lower = word.to_lowercase();
                if lower == "from" || lower == "join" {
                    in_from = in_from || lower == "from";
                    expecting = true;
                } else if expecting {
                    if FROM_STOP.contains(&lower.as_str()) {
                        expecting = false;
                        in_from = false;
                    } else {
                        relations.push(lower);
                        expecting = false;
                    }
                } else if FROM_STOP.contains(&lower.as_str()) {
                    in_from = false;
                }
            }
        }
    }
    relations.into_iter().unique().collect()
}

/// Byte range and value of the outer statement's LIMIT, if any. LIMIT
/// clauses inside parens belong to subqueries and do not bound the result.
fn top_level_limit(scan: &str) -> Result<Option<(usize, usize, u64)>, RejectionReason> {
    for word in LIMIT_WORD.find_iter(scan) {
        let depth = scan[..word.start()]
            .chars()
            .fold(0i32, |d, c| match c {
                '(' => d + 1,
                ')' => d - 1,
                _ => d,
            });
        if depth != 0 {
            continue;
        }
        // A top-level LIMIT must carry a plain literal we can clamp, and
        // nothing may follow it except an OFFSET literal. SQLite reads
        // `LIMIT a, b` as OFFSET a / LIMIT b and evaluates arithmetic in the
        // limit expression, so a trailing `,`, operator or identifier would
        // change the effective row count behind the clamp's back.
        match LIMIT_NUM.captures(&scan[word.start()..]) {
            Some(cap) => {
                let num = cap.get(1).unwrap();
                let value: u64 = num.as_str().parse().map_err(|_| {
                    RejectionReason::LimitInjectionFailed("unparseable LIMIT value".to_string())
                })?;
                let tail = scan[word.start() + cap.get(0).unwrap().end()..].trim();
                if !tail.is_empty() && !LIMIT_TAIL.is_match(tail) {
                    return Err(RejectionReason::LimitInjectionFailed(format!(
                        "unsupported LIMIT expression after row count: {}",
                        tail.chars().take(40).collect::<String>()
                    )));
                }
                return Ok(Some((
                    word.start() + num.start(),
                    word.start() + num.end(),
                    value,
                )));
            }
            None => {
                return Err(RejectionReason::LimitInjectionFailed(
                    "LIMIT clause without a literal row count".to_string(),
                ))
            }
        }
    }
    Ok(None)
}

/// Static policy: row caps come from configuration, the whitelist from the
/// per-request schema snapshot.
#[derive(Debug, Clone)]
pub struct SqlGuard {
    row_limit_default: u32,
    row_limit_max: u32,
}

impl SqlGuard {
    pub fn new(row_limit_default: u32, row_limit_max: u32) -> Self {
        Self {
            row_limit_default,
            row_limit_max,
        }
    }

    pub fn validate(
        &self,
        candidate: &CandidateSql,
        snapshot: &SchemaSnapshot,
    ) -> Result<ValidatedSql, RejectionReason> {
        let clean = strip_comments(candidate.as_str())?;

        // Quoted/bracketed identifiers could smuggle a relation name past
        // the lexical whitelist check; reject rather than guess.
        if clean.contains('"') || clean.contains('`') || clean.contains('[') {
            return Err(RejectionReason::LimitInjectionFailed(
                "quoted identifiers are not supported".to_string(),
            ));
        }

        // 1. Exactly one statement. Semicolons inside string literals do not
        // count as boundaries.
        let segments = blank_strings(&clean)
            .split(';')
            .filter(|s| !s.trim().is_empty())
            .count();
        if segments > 1 {
            return Err(RejectionReason::MultiStatement);
        }

        let statement = clean.trim().trim_end_matches(';').trim().to_string();
        if statement.is_empty() {
            return Err(RejectionReason::NonSelect("<empty>".to_string()));
        }
        let scan = blank_strings(&statement);

        // 2. Read-query shape: allowlisted leading keyword, no denylisted
        // keyword anywhere. "Starts with SELECT" alone is not enough.
        let leading = LEADING_KEYWORD
            .captures(&scan)
            .map(|cap| cap[1].to_uppercase())
            .unwrap_or_else(|| "<none>".to_string());
        if leading != "SELECT" && leading != "WITH" {
            return Err(RejectionReason::NonSelect(leading));
        }
        if let Some(banned) = DENYLIST.find(&scan) {
            return Err(RejectionReason::NonSelect(banned.as_str().to_uppercase()));
        }

        // 3. Every referenced relation must be whitelisted. CTE names are
        // not relations; aliases and expressions never reach relation
        // position in the token walk.
        let allowed = snapshot.allowed_tables();
        let allowed_bare = snapshot.allowed_bare_names();
        let cte_names: HashSet<String> = CTE_NAME
            .captures_iter(&scan)
            .map(|cap| cap[1].to_lowercase())
            .collect();
        for table in extract_relations(&scan) {
            if cte_names.contains(&table) {
                continue;
            }
            let whitelisted = if table.contains('.') {
                allowed.contains(&table)
            } else {
                allowed_bare.contains(&table)
            };
            if !whitelisted {
                return Err(RejectionReason::TableNotWhitelisted(table));
            }
        }

        // 4. Mandatory row cap: append a default, clamp an excessive one.
        let validated = match top_level_limit(&scan)? {
            None => format!("{} LIMIT {}", statement, self.row_limit_default),
            Some((_, _, value)) if value <= u64::from(self.row_limit_max) => statement,
            Some((num_start, num_end, _)) => format!(
                "{}{}{}",
                &statement[..num_start],
                self.row_limit_max,
                &statement[num_end..]
            ),
        };

        debug!(sql = %validated, "candidate passed guard");
        Ok(ValidatedSql { sql: validated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDescriptor, TableDescriptor};

    fn snapshot() -> SchemaSnapshot {
        let table = |name: &str| TableDescriptor {
            schema: "gold".to_string(),
            name: name.to_string(),
            columns: vec![ColumnDescriptor {
                name: "cases".into(),
                ty: "INTEGER".into(),
                description: None,
            }],
            allowed: true,
        };
        SchemaSnapshot {
            namespace: "gold".into(),
            tables: vec![table("fct_daily_uf"), table("fct_monthly_uf")],
        }
    }

    fn guard() -> SqlGuard {
        SqlGuard::new(500, 5000)
    }

    fn validate(sql: &str) -> Result<ValidatedSql, RejectionReason> {
        guard().validate(&CandidateSql(sql.to_string()), &snapshot())
    }

    #[test]
    fn multi_statement_is_rejected() {
        let err = validate("SELECT 1; DROP TABLE gold.fct_daily_uf").unwrap_err();
        assert_eq!(err, RejectionReason::MultiStatement);
    }

    #[test]
    fn dml_keyword_anywhere_is_rejected() {
        let err =
            validate("SELECT * FROM gold.fct_daily_uf WHERE uf = (DELETE FROM z)").unwrap_err();
        assert_eq!(err, RejectionReason::NonSelect("DELETE".into()));
    }

    #[test]
    fn non_select_leading_keyword_is_rejected() {
        let err = validate("UPDATE gold.fct_daily_uf SET cases = 0").unwrap_err();
        assert_eq!(err, RejectionReason::NonSelect("UPDATE".into()));

        let err = validate("PRAGMA table_info(fct_daily_uf)").unwrap_err();
        assert_eq!(err, RejectionReason::NonSelect("PRAGMA".into()));
    }

    #[test]
    fn comment_hidden_keywords_are_still_caught() {
        let err = validate("SELECT * FROM gold.fct_daily_uf; /* x */ DROP TABLE gold.fct_daily_uf")
            .unwrap_err();
        assert_eq!(err, RejectionReason::MultiStatement);

        // A line comment cannot hide the statement separator either.
        let err = validate("SELECT 1 -- harmless\n; ATTACH DATABASE 'x' AS y").unwrap_err();
        assert_eq!(err, RejectionReason::MultiStatement);
    }

    #[test]
    fn raw_layer_table_is_rejected_by_name() {
        let err = validate("SELECT * FROM bronze.raw_cases LIMIT 10").unwrap_err();
        assert_eq!(
            err,
            RejectionReason::TableNotWhitelisted("bronze.raw_cases".into())
        );
    }

    #[test]
    fn implicit_cross_join_partner_is_checked_too() {
        let err = validate("SELECT * FROM gold.fct_daily_uf, bronze.raw_cases").unwrap_err();
        assert_eq!(
            err,
            RejectionReason::TableNotWhitelisted("bronze.raw_cases".into())
        );
    }

    #[test]
    fn subquery_relations_are_checked() {
        let err = validate(
            "SELECT * FROM gold.fct_daily_uf WHERE uf IN (SELECT uf FROM bronze.raw_cases)",
        )
        .unwrap_err();
        assert_eq!(
            err,
            RejectionReason::TableNotWhitelisted("bronze.raw_cases".into())
        );
    }

    #[test]
    fn unqualified_whitelisted_name_resolves() {
        let v = validate("SELECT cases FROM fct_daily_uf").unwrap();
        assert_eq!(v.sql(), "SELECT cases FROM fct_daily_uf LIMIT 500");
    }

    #[test]
    fn cte_names_are_not_treated_as_relations() {
        let v = validate(
            "WITH as_of AS (SELECT MAX(day) AS d FROM gold.fct_daily_uf) \
             SELECT cases FROM gold.fct_daily_uf CROSS JOIN as_of",
        )
        .unwrap();
        assert!(v.sql().ends_with("LIMIT 500"));
    }

    #[test]
    fn missing_limit_is_appended() {
        let v = validate("SELECT uf, SUM(cases) FROM gold.fct_daily_uf GROUP BY uf").unwrap();
        assert_eq!(
            v.sql(),
            "SELECT uf, SUM(cases) FROM gold.fct_daily_uf GROUP BY uf LIMIT 500"
        );
    }

    #[test]
    fn oversized_limit_is_clamped_to_max() {
        let v = validate("SELECT * FROM gold.fct_daily_uf LIMIT 999999").unwrap();
        assert_eq!(v.sql(), "SELECT * FROM gold.fct_daily_uf LIMIT 5000");
    }

    #[test]
    fn validation_is_idempotent() {
        let first = validate("SELECT * FROM gold.fct_daily_uf").unwrap();
        let second = validate(first.sql()).unwrap();
        assert_eq!(first.sql(), second.sql());

        let clamped = validate("SELECT * FROM gold.fct_daily_uf LIMIT 999999").unwrap();
        let again = validate(clamped.sql()).unwrap();
        assert_eq!(clamped.sql(), again.sql());
    }

    #[test]
    fn subquery_limit_does_not_satisfy_the_cap() {
        let v = validate("SELECT * FROM (SELECT cases FROM gold.fct_daily_uf LIMIT 10)").unwrap();
        assert!(v.sql().ends_with("LIMIT 500"), "got: {}", v.sql());
    }

    #[test]
    fn limit_without_number_is_rejected_not_amended() {
        let err = validate("SELECT * FROM gold.fct_daily_uf LIMIT").unwrap_err();
        assert!(matches!(err, RejectionReason::LimitInjectionFailed(_)));
    }

    #[test]
    fn comma_limit_form_cannot_bypass_the_cap() {
        // SQLite reads `LIMIT 1, 999999` as OFFSET 1 / LIMIT 999999, so the
        // second literal is the effective row count.
        let err = validate("SELECT * FROM gold.fct_daily_uf LIMIT 1, 999999").unwrap_err();
        assert!(matches!(err, RejectionReason::LimitInjectionFailed(_)));
    }

    #[test]
    fn arithmetic_limit_expression_cannot_bypass_the_cap() {
        let err = validate("SELECT * FROM gold.fct_daily_uf LIMIT 10+999990").unwrap_err();
        assert!(matches!(err, RejectionReason::LimitInjectionFailed(_)));

        let err = validate("SELECT * FROM gold.fct_daily_uf LIMIT 10 * 1000").unwrap_err();
        assert!(matches!(err, RejectionReason::LimitInjectionFailed(_)));
    }

    #[test]
    fn limit_with_offset_literal_is_allowed_and_still_clamped() {
        let v = validate("SELECT * FROM gold.fct_daily_uf LIMIT 10 OFFSET 5").unwrap();
        assert_eq!(v.sql(), "SELECT * FROM gold.fct_daily_uf LIMIT 10 OFFSET 5");

        let clamped = validate("SELECT * FROM gold.fct_daily_uf LIMIT 999999 OFFSET 5").unwrap();
        assert_eq!(
            clamped.sql(),
            "SELECT * FROM gold.fct_daily_uf LIMIT 5000 OFFSET 5"
        );
        let again = validate(clamped.sql()).unwrap();
        assert_eq!(clamped.sql(), again.sql());
    }

    #[test]
    fn limit_with_non_literal_offset_is_rejected() {
        let err = validate("SELECT * FROM gold.fct_daily_uf LIMIT 10 OFFSET n").unwrap_err();
        assert!(matches!(err, RejectionReason::LimitInjectionFailed(_)));
    }

    #[test]
    fn unterminated_string_is_rejected() {
        let err = validate("SELECT * FROM gold.fct_daily_uf WHERE uf = 'SP").unwrap_err();
        assert!(matches!(err, RejectionReason::LimitInjectionFailed(_)));
    }

    #[test]
    fn quoted_identifiers_are_rejected_not_guessed() {
        let err = validate("SELECT * FROM \"bronze\".\"raw_cases\"").unwrap_err();
        assert!(matches!(err, RejectionReason::LimitInjectionFailed(_)));
    }

    #[test]
    fn semicolon_inside_string_is_not_a_statement_boundary() {
        let v = validate("SELECT * FROM gold.fct_daily_uf WHERE uf = 'a;b'").unwrap();
        assert!(v.sql().starts_with("SELECT"));
    }

    #[test]
    fn keyword_inside_string_is_not_denylisted() {
        let v = validate("SELECT * FROM gold.fct_daily_uf WHERE uf = 'drop'").unwrap();
        assert!(v.sql().ends_with("LIMIT 500"));
    }

    #[test]
    fn multibyte_string_literals_survive_validation() {
        let v = validate("SELECT * FROM gold.fct_daily_uf WHERE uf = 'São Paulo'").unwrap();
        assert!(v.sql().contains("'São Paulo'"));
        assert!(v.sql().ends_with("LIMIT 500"));
    }

    #[test]
    fn with_cte_statement_is_a_read_query() {
        let v = validate(
            "WITH d AS (SELECT day, SUM(cases) AS cases FROM gold.fct_daily_uf GROUP BY day) \
             SELECT * FROM d ORDER BY day",
        )
        .unwrap();
        assert!(v.sql().starts_with("WITH"));
    }
}
