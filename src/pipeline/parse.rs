//! Backend response parsing
//!
//! The backend returns free-form text. An ordered chain of extractors tries
//! to recover a JSON value from it, the value is normalized to a list, and
//! canonical fields are located case-insensitively. Nothing in here returns
//! an error: unusable text is an empty outcome list, and reconciliation
//! decides what that means.

use super::RawOutcome;
use regex::Regex;
use serde_json::Value;

/// Strip a surrounding markdown code fence, tagged or not.
fn strip_markdown_fences(text: &str) -> &str {
    let mut inner = text.trim();
    for opener in ["```json", "```"] {
        if let Some(rest) = inner.strip_prefix(opener) {
            inner = rest;
            break;
        }
    }
    inner = inner.strip_suffix("```").unwrap_or(inner);
    inner.trim()
}

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|_| Regex::new("$^").unwrap())
}

/// Fenced ```json block, if present.
fn extract_fenced(text: &str) -> Option<String> {
    regex(r"```json\s*([\s\S]*?)\s*```")
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// First `[ { ... } ]` array fragment embedded in the text.
fn extract_array(text: &str) -> Option<String> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if start < end {
        let fragment = &text[start..=end];
        if fragment.contains('{') {
            return Some(fragment.to_string());
        }
    }
    None
}

/// First `{ ... }` object fragment embedded in the text.
fn extract_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if start < end {
        Some(text[start..=end].to_string())
    } else {
        None
    }
}

/// Try each extraction rule in order and return the first fragment that
/// actually parses as JSON.
fn extract_json(text: &str) -> Option<Value> {
    let stripped = strip_markdown_fences(text);
    let candidates: [Option<String>; 4] = [
        extract_fenced(text),
        extract_array(stripped),
        extract_object(stripped),
        Some(stripped.to_string()),
    ];

    for candidate in candidates.into_iter().flatten() {
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            return Some(value);
        }
    }
    None
}

/// Normalize a parsed value into a list of outcome-shaped objects: an array
/// is taken as-is, a dict with a `results` key yields that list, any other
/// dict becomes a single-element list.
fn normalize(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get("results") {
                items.clone()
            } else {
                vec![Value::Object(map)]
            }
        }
        _ => Vec::new(),
    }
}

/// Case-insensitive field lookup over an object, trying each candidate name.
fn field(value: &Value, names: &[&str]) -> Option<String> {
    let map = value.as_object()?;
    for (key, val) in map {
        let lower = key.to_lowercase();
        if names.iter().any(|n| lower == *n) {
            return match val {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            };
        }
    }
    None
}

/// Parse raw backend output into outcome records. Returns an empty list when
/// no JSON could be recovered.
pub fn parse_outcomes(text: &str) -> Vec<RawOutcome> {
    let Some(value) = extract_json(text) else {
        tracing::warn!("no JSON content found in backend response");
        return Vec::new();
    };

    normalize(value)
        .iter()
        .map(|item| RawOutcome {
            change_id: field(item, &["change_id"]),
            status: field(item, &["status"]),
            reason: field(item, &["reason_code", "exception_reason", "reason"]),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_array_parses() {
        let outcomes = parse_outcomes(
            r#"[{"change_id":"CHG1","status":"OK","reason_code":"Valid approver"}]"#,
        );
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].change_id.as_deref(), Some("CHG1"));
        assert_eq!(outcomes[0].status.as_deref(), Some("OK"));
    }

    #[test]
    fn fenced_array_is_preferred_over_loose_json() {
        let text = r#"Here is {"change_id":"LOOSE","status":"OK"} some noise.
```json
[{"change_id":"FENCED","status":"Exception","reason_code":"overlap"}]
```"#;
        let outcomes = parse_outcomes(text);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].change_id.as_deref(), Some("FENCED"));
    }

    #[test]
    fn untagged_fence_is_stripped() {
        let outcomes = parse_outcomes(
            "```\n[{\"change_id\":\"CHG3\",\"status\":\"OK\",\"reason_code\":\"fine\"}]\n```",
        );
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].change_id.as_deref(), Some("CHG3"));
        assert_eq!(strip_markdown_fences("```json\n[]\n```"), "[]");
        assert_eq!(strip_markdown_fences("plain"), "plain");
    }

    #[test]
    fn array_embedded_in_prose_is_extracted() {
        let text = r#"The analysis found the following:
[{"change_id":"CHG7","status":"OK","reason_code":"Valid approver"}]
Let me know if you need more detail."#;
        let outcomes = parse_outcomes(text);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].change_id.as_deref(), Some("CHG7"));
    }

    #[test]
    fn results_wrapper_is_unwrapped() {
        let outcomes = parse_outcomes(
            r#"{"results":[{"change_id":"A","status":"OK"},{"change_id":"B","status":"Exception"}]}"#,
        );
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[1].change_id.as_deref(), Some("B"));
    }

    #[test]
    fn single_object_becomes_one_element_list() {
        let outcomes = parse_outcomes(r#"{"change_id":"CHG9","status":"OK","reason":"fine"}"#);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].reason.as_deref(), Some("fine"));
    }

    #[test]
    fn unparseable_text_yields_empty_list() {
        assert!(parse_outcomes("I could not analyze these records, sorry.").is_empty());
        assert!(parse_outcomes("").is_empty());
        assert!(parse_outcomes("[not json").is_empty());
    }

    #[test]
    fn field_lookup_is_case_insensitive() {
        let outcomes = parse_outcomes(
            r#"[{"CHANGE_ID":"CHG1","status":"Exception","Reason_Code":"overlap"}]"#,
        );
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].change_id.as_deref(), Some("CHG1"));
        assert_eq!(outcomes[0].status.as_deref(), Some("Exception"));
        assert_eq!(outcomes[0].reason.as_deref(), Some("overlap"));
    }

    #[test]
    fn exception_reason_alias_is_accepted() {
        let outcomes = parse_outcomes(
            r#"[{"change_id":"CHG1","status":"Exception","exception_reason":"shared ID"}]"#,
        );
        assert_eq!(outcomes[0].reason.as_deref(), Some("shared ID"));
    }

    #[test]
    fn non_string_ids_are_stringified() {
        let outcomes = parse_outcomes(r#"[{"change_id":1042,"status":"OK"}]"#);
        assert_eq!(outcomes[0].change_id.as_deref(), Some("1042"));
    }

    #[test]
    fn scalar_json_yields_empty_list() {
        assert!(parse_outcomes("42").is_empty());
    }
}
