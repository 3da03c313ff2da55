//! Extraction of the JSON result block from runner stdout.
//!
//! The runner prints progress and log lines freely and ends with a
//! `JSON Output` marker followed by the result document. Lines carrying debug
//! or log prefixes and markdown code fences are removed before the first
//! balanced `{...}` / `[...]` is parsed.

use crate::error::{Result, ReviewError};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

pub const JSON_MARKER: &str = "JSON Output";

static NOISE_RE: OnceLock<Regex> = OnceLock::new();

fn noise_re() -> &'static Regex {
    NOISE_RE.get_or_init(|| {
        Regex::new(concat!(
            r"^\s*(?:",
            r"\[(?:DEBUG|TRACE|INFO|WARN|WARNING|ERROR)\b[^\]]*\]",
            r"|\[\s*\d{1,3}%\]",
            r"|\[[A-Z][\w .:/-]*\](?:\s|$)",
            r"|```",
            r")"
        ))
        .unwrap()
    })
}

/// Drop lines that are log noise rather than JSON content.
fn strip_noise(text: &str) -> String {
    text.lines()
        .filter(|line| !noise_re().is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Length of the balanced JSON value starting at `text[0]`, which must be
/// `{` or `[`. String literals (including escaped quotes) are skipped.
fn balanced_len(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
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
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// Locate and parse the JSON result in runner stdout.
///
/// Searches after the last [`JSON_MARKER`] when present, otherwise the whole
/// output. Fails with [`ReviewError::NoJsonFound`] when no `{` or `[` remains.
pub fn parse_json_from_output(output: &str) -> Result<serde_json::Value> {
    let start = output
        .rfind(JSON_MARKER)
        .map(|i| i + JSON_MARKER.len())
        .unwrap_or(0);
    let cleaned = strip_noise(&output[start..]);

    let open = cleaned
        .find(|c: char| c == '{' || c == '[')
        .ok_or(ReviewError::NoJsonFound)?;
    let candidate = &cleaned[open..];
    let len = balanced_len(candidate)
        .ok_or_else(|| ReviewError::InvalidJson("unterminated JSON value".into()))?;

    serde_json::from_str(&candidate[..len]).map_err(|e| ReviewError::InvalidJson(e.to_string()))
}

/// Parse the JSON result and check it against the expected shape `T`.
pub fn parse_json_as<T: DeserializeOwned>(output: &str) -> Result<T> {
    let value = parse_json_from_output(output)?;
    serde_json::from_value(value).map_err(|e| ReviewError::InvalidJson(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn debug_line_before_marker_is_ignored() {
        let out = "[ 10%] Fetching PR\n\
                   [DEBUG xyz] Message #1: FooMessage\n\
                   JSON Output:\n\
                   {\"ok\": true}\n";
        assert_eq!(parse_json_from_output(out).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn debug_lines_interleaved_after_marker() {
        let out = "JSON Output:\n\
                   [DEBUG sdk] Message #2: ResultMessage\n\
                   ```json\n\
                   {\"findings\": [1, 2]}\n\
                   ```\n";
        assert_eq!(
            parse_json_from_output(out).unwrap(),
            json!({"findings": [1, 2]})
        );
    }

    #[test]
    fn last_marker_wins() {
        let out = "JSON Output:\n{\"run\": 1}\nretrying\nJSON Output:\n{\"run\": 2}\n";
        assert_eq!(parse_json_from_output(out).unwrap(), json!({"run": 2}));
    }

    #[test]
    fn no_marker_skips_tagged_log_lines() {
        let out = "[Context] Gathering files\n[Specialist:security] scanning\n[\"a\", \"b\"]\n";
        assert_eq!(parse_json_from_output(out).unwrap(), json!(["a", "b"]));
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_scanner() {
        let out = "JSON Output: {\"msg\": \"use } and \\\" carefully\", \"n\": 1} trailing";
        assert_eq!(
            parse_json_from_output(out).unwrap(),
            json!({"msg": "use } and \" carefully", "n": 1})
        );
    }

    #[test]
    fn no_brackets_is_no_json_found() {
        let err = parse_json_from_output("all done\nnothing here\n").unwrap_err();
        assert!(matches!(err, ReviewError::NoJsonFound));
        assert_eq!(err.to_string(), "No JSON found in output");
    }

    #[test]
    fn unterminated_is_invalid() {
        let err = parse_json_from_output("JSON Output:\n{\"a\": [1, 2").unwrap_err();
        assert!(matches!(err, ReviewError::InvalidJson(_)));
    }

    #[test]
    fn typed_parse_rejects_wrong_shape() {
        #[derive(serde::Deserialize, Debug)]
        struct Shape {
            #[allow(dead_code)]
            count: u32,
        }
        assert!(parse_json_as::<Shape>("JSON Output: {\"count\": 3}").is_ok());
        assert!(parse_json_as::<Shape>("JSON Output: {\"count\": \"x\"}").is_err());
    }
}
