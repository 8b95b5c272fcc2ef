use std::sync::OnceLock;

use regex::Regex;

fn fence_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\n?(.*?)```").ok())
        .as_ref()
}

fn whole_fence_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\A```[A-Za-z0-9_-]*[ \t]*\n?(.*?)```\z").ok())
        .as_ref()
}

/// Strip markdown code fences when the whole text is one fenced block.
///
/// Prose that merely contains a fenced block is returned trimmed but intact.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    match whole_fence_re()
        .and_then(|re| re.captures(trimmed))
        .and_then(|c| c.get(1))
    {
        Some(inner) if !inner.as_str().contains("```") => inner.as_str().trim(),
        _ => trimmed,
    }
}

/// First fenced block anywhere in the text.
fn first_fenced_block(text: &str) -> Option<&str> {
    fence_re()?
        .captures(text)?
        .get(1)
        .map(|m| m.as_str().trim())
}

/// Find a JSON object or array in model output.
///
/// Tries, in order: the first fenced block, the whole text, and the span
/// between the first `{` and the last `}`.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let structured = |s: &str| {
        serde_json::from_str::<serde_json::Value>(s)
            .ok()
            .filter(|v| v.is_object() || v.is_array())
    };

    if let Some(v) = first_fenced_block(text).and_then(structured) {
        return Some(v);
    }
    let candidate = text.trim();
    if let Some(v) = structured(candidate) {
        return Some(v);
    }
    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    if end <= start {
        return None;
    }
    structured(&candidate[start..=end])
}

/// Normalize a final answer: drop code fences and unwrap a bare JSON string.
pub fn clean_output(text: &str) -> String {
    let stripped = strip_code_fences(text);
    match serde_json::from_str::<serde_json::Value>(stripped) {
        Ok(serde_json::Value::String(s)) => s,
        _ => stripped.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_json() {
        let v = extract_json("Here you go:\n```json\n{\"selected_db\": \"orders\"}\n```").unwrap();
        assert_eq!(v["selected_db"], "orders");
    }

    #[test]
    fn test_fence_without_language() {
        let v = extract_json("```\n[1, 2]\n```").unwrap();
        assert_eq!(v, serde_json::json!([1, 2]));
    }

    #[test]
    fn test_bare_and_embedded_json() {
        assert_eq!(extract_json("{\"a\": 1}").unwrap()["a"], 1);
        let v = extract_json("Result: {\"status\": \"approved\"} done").unwrap();
        assert_eq!(v["status"], "approved");
    }

    #[test]
    fn test_non_json() {
        assert!(extract_json("No records found").is_none());
        assert!(extract_json("} backwards {").is_none());
        assert!(extract_json("42").is_none());
    }

    #[test]
    fn test_clean_output() {
        assert_eq!(
            clean_output("\"The total number of orders is 27.\""),
            "The total number of orders is 27."
        );
        assert_eq!(clean_output("```\nFound 2 records\n```"), "Found 2 records");
        assert_eq!(clean_output("  plain  "), "plain");
    }

    #[test]
    fn test_clean_output_keeps_prose_around_inline_block() {
        let answer = "Found 3 records matching your query.\n```sql\nSELECT * FROM orders LIMIT 50\n```\nAll three shipped on time.";
        assert_eq!(clean_output(answer), answer);
        assert_eq!(strip_code_fences(answer), answer);
    }

    #[test]
    fn test_two_blocks_are_not_one_fence() {
        let text = "```sql\nSELECT 1\n```\nand\n```sql\nSELECT 2\n```";
        assert_eq!(strip_code_fences(text), text);
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }
}
