/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

/// Strip markdown code fences from a model response.
///
/// Handles a fenced block anywhere in the text (models sometimes prefix the
/// JSON with a sentence), with or without a language tag.
pub fn strip_code_blocks(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };

    let after_fence = &trimmed[open + 3..];
    // Skip the language tag (everything up to the first newline).
    let body = match after_fence.find('\n') {
        Some(nl) if !after_fence[..nl].contains('{') && !after_fence[..nl].contains('[') => {
            &after_fence[nl + 1..]
        }
        _ => after_fence,
    };

    match body.rfind("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}
