//! JSON extraction from mixed model output.
//!
//! Providers in JSON mode usually return a bare object, but models still
//! occasionally wrap it in a markdown fence or surround it with prose. The
//! extraction strategies run in order:
//!
//! 1. Direct JSON (content starts with `{` or `[`)
//! 2. JSON inside a fenced code block
//! 3. First balanced JSON object/array found by bracket matching

use regex::Regex;

use crate::error::LlmError;

/// Extracts a JSON document from model output.
///
/// Returns the extracted JSON text, or [`LlmError::ParseError`] when no
/// balanced JSON-like content exists.
pub fn extract_json(content: &str) -> Result<String, LlmError> {
    let trimmed = content.trim();

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Some(json) = balanced_prefix(trimmed) {
            return Ok(json);
        }
    }

    if let Some(json) = from_code_fence(trimmed) {
        return Ok(json);
    }

    if let Some(start) = trimmed.find(['{', '[']) {
        if let Some(json) = balanced_prefix(&trimmed[start..]) {
            return Ok(json);
        }
    }

    let preview: String = trimmed.chars().take(50).collect();
    Err(LlmError::ParseError(format!(
        "no JSON content found, response starts with: '{preview}'"
    )))
}

/// Pulls JSON out of a ```json (or plain ```) fenced block.
fn from_code_fence(content: &str) -> Option<String> {
    // Non-greedy body match; the fence language tag is optional.
    let fence = Regex::new(r"```(?:json)?\s*([\s\S]*?)```").ok()?;
    let captured = fence.captures(content)?.get(1)?.as_str().trim();
    if captured.starts_with('{') || captured.starts_with('[') {
        balanced_prefix(captured)
    } else {
        None
    }
}

/// Returns the shortest balanced JSON prefix of `content`, which must start
/// at the opening brace/bracket. String literals and escapes are honored.
fn balanced_prefix(content: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, ch) in content.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(content[..=index].to_string());
                }
            }
            _ => {}
        }
    }

    None
}
