//! JSON extraction utilities for parsing oracle responses.
//!
//! Oracle responses are requested in structured JSON mode, but models still
//! wrap payloads in markdown fences or prepend commentary. The extraction
//! functions try the following strategies in order:
//! 1. Direct JSON (the whole trimmed content parses)
//! 2. JSON in a ```json code block
//! 3. JSON in a generic code block
//! 4. The first JSON object/array anywhere in the content, using bracket matching
//!
//! # Example
//!
//! ```
//! use search_forge::utils::json_extraction::parse_json_payload;
//!
//! let value = parse_json_payload("Here you go: {\"ids\": [\"g0001\"]}").unwrap();
//! assert_eq!(value["ids"][0], "g0001");
//! ```

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn json_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```json\s*\n?([\s\S]*?)\n?```").expect("valid regex"))
}

fn generic_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```[a-zA-Z]*\s*\n?([\s\S]*?)\n?```").expect("valid regex"))
}

/// Parses the JSON payload carried by an oracle response, if any.
///
/// Returns `None` when no strategy yields valid JSON.
pub fn parse_json_payload(content: &str) -> Option<Value> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    extract_json_candidate(trimmed).and_then(|candidate| serde_json::from_str(&candidate).ok())
}

/// Extracts the most likely JSON substring from mixed content.
pub fn extract_json_candidate(content: &str) -> Option<String> {
    for fence in [json_fence(), generic_fence()] {
        if let Some(inner) = fence
            .captures(content)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
        {
            if let Some(json) = balanced_prefix(inner) {
                return Some(json.to_string());
            }
        }
    }

    let start = content.find(['{', '['])?;
    balanced_prefix(&content[start..]).map(str::to_string)
}

/// Returns the balanced JSON object/array at the start of `s`.
fn balanced_prefix(s: &str) -> Option<&str> {
    let end = if s.starts_with('{') {
        find_matching_brace(s)?
    } else if s.starts_with('[') {
        find_matching_bracket(s)?
    } else {
        return None;
    };
    Some(&s[..=end])
}

/// Finds the index of the brace closing the object that opens `s`.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    find_matching(s, '{', '}')
}

/// Finds the index of the bracket closing the array that opens `s`.
pub fn find_matching_bracket(s: &str) -> Option<usize> {
    find_matching(s, '[', ']')
}

fn find_matching(s: &str, open: char, close: char) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
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

    #[test]
    fn test_direct_json() {
        let value = parse_json_payload(r#"  {"searches": []}  "#).expect("json");
        assert!(value["searches"].is_array());

        let list = parse_json_payload(r#"["a", "b"]"#).expect("json");
        assert_eq!(list[1], "b");
    }

    #[test]
    fn test_json_code_block() {
        let content = "Here is the result:\n```json\n{\"columns\": [\"name\"]}\n```\nDone.";
        let value = parse_json_payload(content).expect("json");
        assert_eq!(value["columns"][0], "name");
    }

    #[test]
    fn test_generic_code_block() {
        let content = "```\n[\"g0001\", \"g0002\"]\n```";
        let value = parse_json_payload(content).expect("json");
        assert_eq!(value.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_embedded_object() {
        let content = r#"Sure! {"ids": ["g0003"], "note": "a } inside"} trailing words"#;
        let value = parse_json_payload(content).expect("json");
        assert_eq!(value["ids"][0], "g0003");
    }

    #[test]
    fn test_no_json() {
        assert!(parse_json_payload("").is_none());
        assert!(parse_json_payload("robotics startups boston\nwarehouse automation").is_none());
        assert!(parse_json_payload("{ never closed").is_none());
    }

    #[test]
    fn test_find_matching_brace() {
        assert_eq!(find_matching_brace(r#"{}"#), Some(1));
        assert_eq!(find_matching_brace(r#"{"a": {"b": 2}}"#), Some(14));
        assert_eq!(find_matching_brace(r#"{"a": "}"}"#), Some(9));
        assert_eq!(find_matching_brace(r#"{"a": "\"}"}"#), Some(11));
        assert_eq!(find_matching_brace(r#"{"#), None);
    }

    #[test]
    fn test_find_matching_bracket() {
        assert_eq!(find_matching_bracket("[1, [2], 3]"), Some(10));
        assert_eq!(find_matching_bracket(r#"["]"]"#), Some(4));
        assert_eq!(find_matching_bracket("[1, 2"), None);
    }
}
