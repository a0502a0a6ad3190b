//! Follow-up preview query rewriting
//!
//! Broadens an existing SQL statement into a wide, cheap preview: wildcard
//! projection, uniform FULL JOINs, no filters or ordering, and a fixed row
//! cap. The transform is deterministic and idempotent, so re-applying it to
//! its own output changes nothing.

use regex::Regex;
use std::sync::OnceLock;

const PREVIEW_LIMIT: &str = "LIMIT 10";

fn projection_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)select\s+.*?\s+from").expect("valid regex"))
}

fn join_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `full` is part of the alternation so a second pass maps FULL JOIN to
    // itself instead of stacking keywords.
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:(?:left|right|inner|outer|cross|full)\s+(?:outer\s+)?)?join\b")
            .expect("valid regex")
    })
}

fn where_kw() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bwhere\b").expect("valid regex"))
}

fn group_by_kw() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bgroup\s+by\b").expect("valid regex"))
}

fn having_kw() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bhaving\b").expect("valid regex"))
}

fn order_by_kw() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\border\s+by\b").expect("valid regex"))
}

fn limit_kw() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\blimit\b").expect("valid regex"))
}

fn limit_clause_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\blimit\b\s+\d+(\s*,\s*\d+)?").expect("valid regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// Remove the clause introduced by `clause`, up to the first of the `stops`
/// keywords or the end of the statement.
fn strip_clause(sql: &str, clause: &Regex, stops: &[&Regex]) -> String {
    let Some(found) = clause.find(sql) else {
        return sql.to_string();
    };
    let rest = &sql[found.end()..];
    let stop = stops
        .iter()
        .filter_map(|re| re.find(rest).map(|m| m.start()))
        .min();
    match stop {
        Some(idx) => format!("{}{}", &sql[..found.start()], &rest[idx..]),
        None => sql[..found.start()].to_string(),
    }
}

/// Rewrite `sql` into its broadened preview form.
pub fn rewrite_for_preview(sql: &str) -> String {
    let mut out = sql.trim().trim_end_matches(';').to_string();

    out = projection_re().replace(&out, "SELECT * FROM").into_owned();
    out = join_re().replace_all(&out, "FULL JOIN").into_owned();
    out = strip_clause(
        &out,
        where_kw(),
        &[group_by_kw(), having_kw(), order_by_kw(), limit_kw()],
    );
    out = strip_clause(&out, group_by_kw(), &[having_kw(), order_by_kw(), limit_kw()]);
    out = strip_clause(&out, having_kw(), &[order_by_kw(), limit_kw()]);
    out = strip_clause(&out, order_by_kw(), &[limit_kw()]);
    out = limit_clause_re().replace_all(&out, "").into_owned();

    let out = whitespace_re().replace_all(&out, " ");
    format!("{} {PREVIEW_LIMIT}", out.trim())
}
