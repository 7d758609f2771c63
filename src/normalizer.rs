//! Response normalization for model output.
//!
//! Model replies come back either as a JSON review object, as prose with a
//! JSON object buried in it, or as free-form markdown. Each is turned into the
//! same plain-text report shape so the rest of the app can treat it as opaque
//! text.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::debug;

type ParsedReview = Map<String, Value>;

static STRONG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\*\*(.*?)\*\*|__(.*?)__").unwrap());
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s*").unwrap());
static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Turn a raw model response into a display-ready report.
///
/// Never fails: anything that isn't a recoverable JSON object goes through
/// markdown cleanup instead.
pub fn normalize(raw: &str) -> String {
    let raw = raw.trim();

    let stages: [(&str, fn(&str) -> Option<ParsedReview>); 2] =
        [("json", decode_object), ("embedded json", extract_object)];

    let parsed = stages.iter().find_map(|(name, stage)| {
        let parsed = stage(raw)?;
        debug!("Model response parsed as {}", name);
        Some(parsed)
    });
    if let Some(parsed) = parsed {
        return format_review(&parsed);
    }

    debug!("No JSON object in model response, stripping markdown");
    strip_markdown(raw)
}

/// Parse the whole input as a JSON object. Arrays, strings and numbers don't count.
fn decode_object(text: &str) -> Option<ParsedReview> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn extract_object(text: &str) -> Option<ParsedReview> {
    first_balanced_object(text).and_then(decode_object)
}

/// Span from the first `{` to the `}` that brings nesting back to zero.
///
/// Braces inside string literals are counted too. If the first object never
/// closes there is no match, even when a later `{...}` would balance.
pub fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;

    for (offset, byte) in text.as_bytes()[start..].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Render a parsed review as SUMMARY / ISSUES / SUGGESTIONS / REFACTOR EXAMPLE
/// blocks, skipping any section with nothing in it.
pub fn format_review(parsed: &ParsedReview) -> String {
    let mut lines: Vec<String> = Vec::new();

    // `Summary` is only consulted when `summary` is missing or falsy.
    let summary = ["summary", "Summary"]
        .iter()
        .filter_map(|key| parsed.get(*key))
        .find(|value| is_truthy(value))
        .map(|value| text_of(value).trim().to_string())
        .unwrap_or_default();
    if !summary.is_empty() {
        lines.push("SUMMARY:".to_string());
        lines.push(summary);
        lines.push(String::new());
    }

    if let Some(issues) = non_empty_list(parsed, "issues") {
        lines.push("ISSUES:".to_string());
        for issue in issues {
            let (line_no, message) = match issue {
                Value::Object(fields) => (
                    fields.get("line").filter(|line| is_truthy(line)),
                    fields
                        .get("message")
                        .filter(|message| !message.is_null())
                        .map(text_of)
                        .unwrap_or_default(),
                ),
                other => (None, text_of(other)),
            };
            match line_no {
                Some(line_no) => lines.push(format!(
                    "  - Line {}: {}",
                    text_of(line_no),
                    message.trim()
                )),
                None => lines.push(format!("  - {}", message.trim())),
            }
        }
        lines.push(String::new());
    }

    if let Some(suggestions) = non_empty_list(parsed, "suggestions") {
        lines.push("SUGGESTIONS:".to_string());
        for suggestion in suggestions {
            lines.push(format!("  - {}", text_of(suggestion).trim()));
        }
        lines.push(String::new());
    }

    if let Some(refactor) = parsed.get("refactor").filter(|value| is_truthy(value)) {
        lines.push("REFACTOR EXAMPLE:".to_string());
        lines.push(text_of(refactor).trim().trim_matches('`').to_string());
        lines.push(String::new());
    }

    lines.join("\n").trim().to_string()
}

/// Best-effort markdown removal for replies that carried no JSON.
///
/// Links, tables and list bullets are left alone.
pub fn strip_markdown(text: &str) -> String {
    let text = STRONG.replace_all(text, |caps: &Captures| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map_or("", |inner| inner.as_str())
            .to_string()
    });
    let text = strip_single_emphasis(&text, '*');
    let text = strip_single_emphasis(&text, '_');
    let text = text.replace('`', "");
    let text = HEADING.replace_all(&text, "");
    let text = BLANK_RUN.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Drop `marker` pairs where neither marker touches another `marker`,
/// keeping the text between them. Pairs may span lines.
fn strip_single_emphasis(text: &str, marker: char) -> String {
    let chars: Vec<char> = text.chars().collect();
    let is_lone = |i: usize| {
        chars[i] == marker
            && (i == 0 || chars[i - 1] != marker)
            && chars.get(i + 1) != Some(&marker)
    };

    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if is_lone(i) {
            if let Some(close) = (i + 1..chars.len()).find(|&j| is_lone(j)) {
                out.extend(&chars[i + 1..close]);
                i = close + 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn non_empty_list<'a>(parsed: &'a ParsedReview, key: &str) -> Option<&'a Vec<Value>> {
    parsed
        .get(key)
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty())
}

/// JSON truthiness: null, false, zero and empty containers are falsy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_only_object() {
        assert_eq!(normalize(r#"{"summary": "X"}"#), "SUMMARY:\nX");
    }

    #[test]
    fn test_capitalized_summary_fallback() {
        assert_eq!(
            normalize(r#"{"Summary": "  Looks fine.  "}"#),
            "SUMMARY:\nLooks fine."
        );
        // Empty lowercase key still defers to the capitalized one.
        assert_eq!(
            normalize(r#"{"summary": "", "Summary": "Y"}"#),
            "SUMMARY:\nY"
        );
    }

    #[test]
    fn test_whitespace_summary_is_omitted() {
        let out = normalize(r#"{"summary": "   ", "suggestions": ["a"]}"#);
        assert_eq!(out, "SUGGESTIONS:\n  - a");
    }

    #[test]
    fn test_embedded_object_matches_bare_object() {
        let bare = normalize(r#"{"summary": "ok"}"#);
        let noisy = normalize(r#"noise before {"summary": "ok"} noise after"#);
        assert_eq!(bare, noisy);
        assert_eq!(noisy, "SUMMARY:\nok");
    }

    #[test]
    fn test_fenced_json_reply() {
        let raw = "Here is the review:\n```json\n{\"summary\": \"Short and clear.\", \"suggestions\": [\"add tests\"]}\n```";
        assert_eq!(
            normalize(raw),
            "SUMMARY:\nShort and clear.\n\nSUGGESTIONS:\n  - add tests"
        );
    }

    #[test]
    fn test_truncated_object_falls_through() {
        let raw = r#"{"summary": "ok""#;
        assert_eq!(normalize(raw), raw);
    }

    #[test]
    fn test_first_object_wins_without_backtracking() {
        assert_eq!(first_balanced_object("a {b} {c}"), Some("{b}"));
        assert_eq!(first_balanced_object(r#"x {"a": {"b": 1}} y"#), Some(r#"{"a": {"b": 1}}"#));
        assert_eq!(first_balanced_object("{ unclosed {ok}"), None);
        assert_eq!(first_balanced_object("no braces here"), None);
    }

    #[test]
    fn test_non_object_json_is_not_structured() {
        assert_eq!(normalize("[1, 2, 3]"), "[1, 2, 3]");
        assert_eq!(normalize("42"), "42");
        assert_eq!(normalize(r#""just a string""#), r#""just a string""#);
    }

    #[test]
    fn test_issue_rendering() {
        let raw = r#"{"issues": [{"line": 12, "message": "unused var"}, "general note"]}"#;
        assert_eq!(
            normalize(raw),
            "ISSUES:\n  - Line 12: unused var\n  - general note"
        );
    }

    #[test]
    fn test_issue_line_zero_and_missing_message() {
        let raw = r#"{"issues": [{"line": 0, "message": " first line "}, {"line": 3}, {"message": "no line"}]}"#;
        assert_eq!(
            normalize(raw),
            "ISSUES:\n  - first line\n  - Line 3: \n  - no line"
        );
    }

    #[test]
    fn test_null_message_renders_empty() {
        let raw = r#"{"issues": [{"line": 4, "message": null}, {"message": null}]}"#;
        assert_eq!(normalize(raw), "ISSUES:\n  - Line 4: \n  -");
    }

    #[test]
    fn test_section_omission() {
        let out = normalize(r#"{"suggestions": ["use constants"]}"#);
        assert_eq!(out, "SUGGESTIONS:\n  - use constants");
        for header in ["SUMMARY:", "ISSUES:", "REFACTOR EXAMPLE:"] {
            assert!(!out.contains(header), "unexpected {} section", header);
        }
    }

    #[test]
    fn test_refactor_fence_stripping() {
        let out = normalize(r#"{"refactor": "```print(1)```"}"#);
        assert_eq!(out, "REFACTOR EXAMPLE:\nprint(1)");
    }

    #[test]
    fn test_refactor_keeps_interior_backticks() {
        let out = normalize(r#"{"refactor": "```let s = `x`;```"}"#);
        assert_eq!(out, "REFACTOR EXAMPLE:\nlet s = `x`;");
    }

    #[test]
    fn test_full_report_section_order() {
        let raw = r#"{
            "refactor": "fn main() {}",
            "suggestions": ["split module", 7],
            "issues": ["global state"],
            "summary": "Decent."
        }"#;
        assert_eq!(
            normalize(raw),
            "SUMMARY:\nDecent.\n\nISSUES:\n  - global state\n\nSUGGESTIONS:\n  - split module\n  - 7\n\nREFACTOR EXAMPLE:\nfn main() {}"
        );
    }

    #[test]
    fn test_empty_object_yields_empty_report() {
        assert_eq!(normalize("{}"), "");
        assert_eq!(normalize(r#"{"issues": [], "suggestions": []}"#), "");
    }

    #[test]
    fn test_empty_and_blank_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("  \n\t "), "");
    }

    #[test]
    fn test_markdown_cleanup() {
        let raw = "## Review\n\n**Overall** the code is _fine_.\n\n\n\n```python\nprint(1)\n```\n### Notes\n- use *constants*";
        assert_eq!(
            normalize(raw),
            "Review\n\nOverall the code is fine.\n\npython\nprint(1)\n\nNotes\n- use constants"
        );
    }

    #[test]
    fn test_multiline_strong_span() {
        assert_eq!(strip_markdown("**one\ntwo** three"), "one\ntwo three");
        assert_eq!(strip_markdown("__a__ and __b__"), "a and b");
    }

    #[test]
    fn test_unpaired_markers_survive() {
        assert_eq!(strip_markdown("2 * 3 = 6"), "2 * 3 = 6");
        assert_eq!(strip_markdown("**dangling"), "**dangling");
    }

    #[test]
    fn test_heading_depth_limit() {
        assert_eq!(strip_markdown("# One\n###### Six"), "One\nSix");
        assert_eq!(strip_markdown("not # a heading"), "not # a heading");
    }

    #[test]
    fn test_markdown_cleanup_is_idempotent() {
        let samples = [
            "## Summary\n\nThe **main** loop re-reads `config` on *every* pass.\n\n\n\n### Issues\n- Line 4: `unwrap` on user input\n- __Security__: no validation\n\n```rust\nlet x = 1;\n```",
            "Gemini API key not configured.\n\nFallback checklist:\n- Readability: check variable and function names",
            "plain text with no markers at all",
        ];
        for sample in samples {
            let once = strip_markdown(sample);
            assert_eq!(strip_markdown(&once), once, "not idempotent for {:?}", sample);
        }
    }

    #[test]
    fn test_stacked_markers_need_a_second_pass() {
        // One pass runs each substitution once, so markers uncovered by a
        // later step survive until the next call.
        assert_eq!(strip_markdown("_*_x_*_"), "__x__");
        assert_eq!(strip_markdown("__x__"), "x");
        assert_eq!(strip_markdown("# # x"), "# x");
        assert_eq!(strip_markdown("# x"), "x");
    }

    #[test]
    fn test_fallback_checklist_passes_through() {
        let text = "LLM call to Gemini failed: timeout\n\nFallback checklist:\n- Readability: check variable names\n- Comments: check presence of comments";
        assert_eq!(normalize(text), text);
    }
}
