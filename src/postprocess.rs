//! Normalization of generated SQL text

use regex::Regex;
use std::sync::OnceLock;

fn fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)```(?:sql\b)?").unwrap_or_else(|e| panic!("invalid fence pattern: {e}"))
    })
}

fn terminator_run_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r";+").unwrap_or_else(|e| panic!("invalid terminator pattern: {e}"))
    })
}

const QUOTES: &[char] = &['"', '\''];

/// Reduce raw model output to one statement on a single line ending in `;`.
///
/// Quotes and code fences are removed, anything after the final terminator
/// is dropped, terminator runs collapse to one and whitespace runs to a
/// single space. Never fails; malformed input gives a best-effort string.
pub fn normalize_sql(raw: &str) -> String {
    let unfenced = fence_pattern().replace_all(raw, "");
    let body = strip_surrounding_quotes(&unfenced);

    // An opening quote at the very start never begins a literal
    let scan_from = if body.starts_with(QUOTES) { 1 } else { 0 };

    // Keep everything up to the last terminator, discarding trailing commentary
    let statement = match last_terminator(&body[scan_from..]) {
        Some(last) => &body[..=scan_from + last],
        None => body,
    };

    let statement = statement.trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    let statement = strip_unmatched_leading_quote(strip_surrounding_quotes(statement));
    let terminated = format!("{};", statement);
    let collapsed = terminator_run_pattern().replace_all(&terminated, ";");

    collapsed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Byte offset of the last `;` outside single- or double-quoted literals
fn last_terminator(text: &str) -> Option<usize> {
    let mut open: Option<char> = None;
    let mut last = None;
    for (i, c) in text.char_indices() {
        match open {
            Some(q) if c == q => open = None,
            Some(_) => {}
            None if QUOTES.contains(&c) => open = Some(c),
            None if c == ';' => last = Some(i),
            None => {}
        }
    }
    last
}

/// Remove quote pairs wrapping the whole text, leaving quoted literals inside alone
fn strip_surrounding_quotes(text: &str) -> &str {
    let mut current = text.trim();
    while current.len() >= 2 {
        let first = current.chars().next();
        let last = current.chars().next_back();
        match (first, last) {
            (Some(a), Some(b)) if a == b && QUOTES.contains(&a) => {
                current = current[1..current.len() - 1].trim();
            }
            _ => break,
        }
    }
    current
}

/// Drop an opening quote whose closer was cut off with the commentary
fn strip_unmatched_leading_quote(text: &str) -> &str {
    match text.chars().next() {
        Some(q) if QUOTES.contains(&q) && text.matches(q).count() % 2 == 1 => text[1..].trim_start(),
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quotes_fences_and_terminators() {
        assert_eq!(
            normalize_sql("  \"SELECT * FROM t;;\"  ```sql"),
            "SELECT * FROM t;"
        );
    }

    #[test]
    fn test_fenced_block_with_commentary() {
        let raw = "```sql\nSELECT id,\n       total\nFROM orders\nWHERE total > 10;\n```\nThis query lists large orders.";
        assert_eq!(
            normalize_sql(raw),
            "SELECT id, total FROM orders WHERE total > 10;"
        );
    }

    #[test]
    fn test_inner_string_literals_survive() {
        assert_eq!(
            normalize_sql("SELECT * FROM users WHERE name = 'x'"),
            "SELECT * FROM users WHERE name = 'x';"
        );
    }

    #[test]
    fn test_missing_terminator_is_added() {
        assert_eq!(normalize_sql("SELECT 1"), "SELECT 1;");
        assert_eq!(normalize_sql("'SELECT\n1'"), "SELECT 1;");
    }

    #[test]
    fn test_internal_terminator_runs_collapse() {
        assert_eq!(
            normalize_sql("DELETE FROM a;; SELECT 1 ;  "),
            "DELETE FROM a; SELECT 1;"
        );
    }

    #[test]
    fn test_inline_fence_keeps_leading_keyword() {
        assert_eq!(normalize_sql("```SELECT * FROM t;```"), "SELECT * FROM t;");
        assert_eq!(
            normalize_sql("```SQL\nselect name from users\n```"),
            "select name from users;"
        );
    }

    #[test]
    fn test_terminator_inside_literal_is_not_a_cut_point() {
        assert_eq!(
            normalize_sql("SELECT * FROM t WHERE note = 'a;b'"),
            "SELECT * FROM t WHERE note = 'a;b';"
        );
        assert_eq!(
            normalize_sql("SELECT * FROM t WHERE note = 'a;b'; -- filters notes"),
            "SELECT * FROM t WHERE note = 'a;b';"
        );
    }

    #[test]
    fn test_quoted_statement_followed_by_commentary() {
        assert_eq!(
            normalize_sql("\"SELECT * FROM t;\"\nThis lists every row."),
            "SELECT * FROM t;"
        );
        assert_eq!(normalize_sql("'SELECT 1';"), "SELECT 1;");
    }

    #[test]
    fn test_always_single_trailing_terminator() {
        for raw in ["", ";", ";;;", "```", "  \n ", "SELECT 1;;;   ;"] {
            let out = normalize_sql(raw);
            assert!(out.ends_with(';'), "{raw:?} -> {out:?}");
            assert!(!out.ends_with(";;"), "{raw:?} -> {out:?}");
            assert!(!out.contains('\n'), "{raw:?} -> {out:?}");
        }
    }
}
