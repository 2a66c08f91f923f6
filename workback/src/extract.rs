//! Best-effort JSON recovery from LLM output.
//!
//! Models wrap JSON in markdown fences, leave trailing commas, interleave
//! comments, and occasionally emit inline arithmetic in numeric positions
//! (`"score": 9 - (10 - 7)`). This module recovers a [`serde_json::Value`]
//! from such output or fails with [`PipelineError::Unparseable`].
//!
//! The extractor is pure: no I/O, no retries.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{PipelineError, Result};

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:[A-Za-z0-9_-]+)?\s*([\s\S]*?)\s*```").unwrap());

static SCORE_EXPR_RE: Lazy<Regex> = Lazy::new(|| {
    // Captures the raw expression (digits and +-*/(). only, optionally
    // followed by `= <n>`) and the delimiter that terminates the value.
    Regex::new(r#""score"\s*:\s*([0-9+\-*/().\s]+?(?:=\s*[0-9.]+)?)\s*([,}\]])"#).unwrap()
});

/// Recover a JSON value from best-effort model output.
///
/// Transformations, in order: trim, strip a surrounding code fence, remove
/// `//` and `/* */` comments, remove trailing commas, evaluate inline
/// arithmetic in `"score"` positions, parse. If the cleaned text still does
/// not parse, the first balanced `{…}` substring is tried before giving up.
pub fn extract_value(text: &str) -> Result<serde_json::Value> {
    let mut cleaned = text.trim().to_string();

    if let Some(caps) = FENCE_RE.captures(&cleaned) {
        if let Some(inner) = caps.get(1) {
            cleaned = inner.as_str().to_string();
        }
    }

    cleaned = strip_comments(&cleaned);
    cleaned = strip_trailing_commas(&cleaned);
    cleaned = evaluate_score_arithmetic(&cleaned);

    if let Ok(value) = serde_json::from_str(&cleaned) {
        return Ok(value);
    }

    if let Some(candidate) = balanced_object(&cleaned) {
        if let Ok(value) = serde_json::from_str(candidate) {
            return Ok(value);
        }
    }

    let preview: String = text.chars().take(200).collect();
    Err(PipelineError::Unparseable(format!(
        "no JSON value recoverable from output starting: {:?}",
        preview
    )))
}

/// Remove `//` line comments and `/* */` block comments, leaving string
/// contents untouched.
fn strip_comments(text: &str) -> String {
    let bytes: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    let mut in_string = false;
    while i < bytes.len() {
        let c = bytes[i];
        if in_string {
            out.push(c);
            if c == '\\' && i + 1 < bytes.len() {
                out.push(bytes[i + 1]);
                i += 2;
                continue;
            }
            if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
                i += 1;
            }
            '/' if i + 1 < bytes.len() && bytes[i + 1] == '/' => {
                while i < bytes.len() && bytes[i] != '\n' {
                    i += 1;
                }
            }
            '/' if i + 1 < bytes.len() && bytes[i + 1] == '*' => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == '*' && bytes[i + 1] == '/') {
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Drop commas that directly precede a closing `]` or `}`.
fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' && i + 1 < chars.len() {
                out.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if c == '"' {
            in_string = true;
            out.push(c);
            i += 1;
            continue;
        }
        if c == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == ']' || chars[j] == '}') {
                i += 1; // swallow the comma, keep the whitespace
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

/// Evaluate literal arithmetic in `"score"` value positions.
///
/// Only expressions built from digits and `+-*/().` are touched; a trailing
/// `= <n>` echo (some judges show their work) is dropped in favour of the
/// evaluated expression. Anything that fails to evaluate is left unchanged.
fn evaluate_score_arithmetic(text: &str) -> String {
    SCORE_EXPR_RE
        .replace_all(text, |caps: &regex::Captures| {
            let raw = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let delim = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let expr = raw.split('=').next().unwrap_or("").trim();
            if !looks_like_arithmetic(expr) {
                return caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default();
            }
            match eval_arithmetic(expr) {
                Some(v) => format!("\"score\": {}{}", format_number(v), delim),
                None => caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default(),
            }
        })
        .into_owned()
}

/// A plain numeric literal is not rewritten; only genuine expressions are.
fn looks_like_arithmetic(expr: &str) -> bool {
    let has_operator = expr
        .char_indices()
        .any(|(i, c)| matches!(c, '+' | '*' | '/' | '(') || (c == '-' && i > 0));
    has_operator && !expr.is_empty()
}

fn format_number(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

/// Minimal recursive-descent evaluator for `+ - * / ( )` over literals.
fn eval_arithmetic(expr: &str) -> Option<f64> {
    let tokens: Vec<char> = expr.chars().filter(|c| !c.is_whitespace()).collect();
    let mut pos = 0;
    let value = parse_sum(&tokens, &mut pos)?;
    if pos == tokens.len() {
        Some(value)
    } else {
        None
    }
}

fn parse_sum(tokens: &[char], pos: &mut usize) -> Option<f64> {
    let mut acc = parse_product(tokens, pos)?;
    while *pos < tokens.len() {
        match tokens[*pos] {
            '+' => {
                *pos += 1;
                acc += parse_product(tokens, pos)?;
            }
            '-' => {
                *pos += 1;
                acc -= parse_product(tokens, pos)?;
            }
            _ => break,
        }
    }
    Some(acc)
}

fn parse_product(tokens: &[char], pos: &mut usize) -> Option<f64> {
    let mut acc = parse_factor(tokens, pos)?;
    while *pos < tokens.len() {
        match tokens[*pos] {
            '*' => {
                *pos += 1;
                acc *= parse_factor(tokens, pos)?;
            }
            '/' => {
                *pos += 1;
                let rhs = parse_factor(tokens, pos)?;
                if rhs == 0.0 {
                    return None;
                }
                acc /= rhs;
            }
            _ => break,
        }
    }
    Some(acc)
}

fn parse_factor(tokens: &[char], pos: &mut usize) -> Option<f64> {
    if *pos >= tokens.len() {
        return None;
    }
    match tokens[*pos] {
        '(' => {
            *pos += 1;
            let inner = parse_sum(tokens, pos)?;
            if *pos < tokens.len() && tokens[*pos] == ')' {
                *pos += 1;
                Some(inner)
            } else {
                None
            }
        }
        '-' => {
            *pos += 1;
            parse_factor(tokens, pos).map(|v| -v)
        }
        _ => {
            let start = *pos;
            while *pos < tokens.len() && (tokens[*pos].is_ascii_digit() || tokens[*pos] == '.') {
                *pos += 1;
            }
            if *pos == start {
                return None;
            }
            let lit: String = tokens[start..*pos].iter().collect();
            lit.parse::<f64>().ok()
        }
    }
}

/// Extract the first balanced `{…}` substring, tracking string state so
/// braces inside string literals are ignored.
fn balanced_object(text: &str) -> Option<&str> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for &(idx, c) in &chars {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' if start.is_some() => in_string = true,
            '{' => {
                if start.is_none() {
                    start = Some(idx);
                }
                depth += 1;
            }
            '}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        let s = start?;
                        return Some(&text[s..idx + c.len_utf8()]);
                    }
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn round_trips_clean_json() {
        let s = r#"{"a": 1, "b": [true, null, "x"]}"#;
        let direct: serde_json::Value = serde_json::from_str(s).unwrap();
        assert_eq!(extract_value(s).unwrap(), direct);
    }

    #[test]
    fn idempotent_on_clean_input() {
        let s = r#"{"a": 1, "b": {"c": [2, 3]}}"#;
        let once = extract_value(s).unwrap();
        let again = extract_value(&serde_json::to_string(&once).unwrap()).unwrap();
        assert_eq!(once, again);
    }

    #[test]
    fn strips_fence_and_trailing_comma() {
        let s = "```json\n{\"a\":1,}\n```";
        assert_eq!(extract_value(s).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn strips_fence_without_language_tag() {
        let s = "```\n{\"a\": 2}\n```";
        assert_eq!(extract_value(s).unwrap(), json!({"a": 2}));
    }

    #[test]
    fn removes_line_and_block_comments() {
        let s = "{\n  // owner of the record\n  \"a\": 1, /* inline */ \"b\": 2\n}";
        assert_eq!(extract_value(s).unwrap(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn comment_markers_inside_strings_survive() {
        let s = r#"{"url": "https://example.com/x", "note": "a /* b */ c"}"#;
        assert_eq!(
            extract_value(s).unwrap(),
            json!({"url": "https://example.com/x", "note": "a /* b */ c"})
        );
    }

    #[test]
    fn evaluates_score_arithmetic() {
        let s = r#"{"score": 9 - (10 - 7)}"#;
        assert_eq!(extract_value(s).unwrap(), json!({"score": 6}));
    }

    #[test]
    fn evaluates_score_with_shown_work() {
        let s = r#"{"score": 40 + 0.5 * 4 = 42, "passed": []}"#;
        assert_eq!(
            extract_value(s).unwrap(),
            json!({"score": 42, "passed": []})
        );
    }

    #[test]
    fn plain_numeric_scores_are_untouched() {
        let s = r#"{"score": 0.85}"#;
        assert_eq!(extract_value(s).unwrap(), json!({"score": 0.85}));
    }

    #[test]
    fn recovers_object_embedded_in_prose() {
        let s = "Here is my assessment:\n{\"verdict\": \"ok\"}\nLet me know.";
        assert_eq!(extract_value(s).unwrap(), json!({"verdict": "ok"}));
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_recovery() {
        let s = "noise {\"a\": \"{not a close}\", \"b\": 1} trailing";
        assert_eq!(
            extract_value(s).unwrap(),
            json!({"a": "{not a close}", "b": 1})
        );
    }

    #[test]
    fn rejects_hopeless_input() {
        assert!(matches!(
            extract_value("no structure here at all"),
            Err(PipelineError::Unparseable(_))
        ));
    }
}
