//! Locating and parsing the JSON object inside a model response.
//!
//! Models sometimes wrap their answer in markdown fences or add a sentence before it,
//! even when asked for JSON only. These helpers find the first balanced top-level
//! object while respecting string literals, so braces inside quoted text do not
//! confuse the scan.

use serde::de::DeserializeOwned;

/// Remove a surrounding markdown code fence (```` ``` ```` or ```` ```json ````), if any.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Skip the info string ("json", "JSON", ...).
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };

    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Find the first complete top-level JSON object in `text`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = matching_brace(bytes, start) {
            return Some(&text[start..=end]);
        }
        search_from = start + 1;
    }

    None
}

/// Index of the `}` closing the object opened at `start`.
fn matching_brace(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
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

/// Parse a model response into `T`.
///
/// Missing required fields fail deserialization, so a partial record is never accepted.
pub fn parse_structured<T: DeserializeOwned>(response: &str) -> Result<T, String> {
    let body = strip_code_fences(response);
    let object = extract_json_object(body).ok_or_else(|| {
        format!(
            "No JSON object found in response: {}",
            preview(response, 200)
        )
    })?;

    serde_json::from_str(object).map_err(|e| format!("Invalid structured response: {}", e))
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
