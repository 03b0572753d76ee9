use crate::util::truncate_str;

const FENCE: &str = "```";

/// Whether a fence header line looks like a language tag (`json`, `text`, `markdown`...).
fn is_language_tag(header: &str) -> bool {
    header
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'))
}

/// Remove Markdown code fences the oracle may have wrapped its output in.
///
/// A leading fence marker is stripped through the end of its line when that
/// line holds only an optional language tag; a trailing fence marker is
/// stripped. Surrounding whitespace is trimmed. Stripping repeats until
/// nothing changes, so the result has no outer fence left and applying this
/// twice is the same as applying it once.
pub fn unwrap_code_fence(text: &str) -> &str {
    let mut current = text.trim();
    loop {
        let next = strip_fence_layer(current);
        if next.len() == current.len() {
            return current;
        }
        current = next;
    }
}

/// One pass of [`unwrap_code_fence`]: at most one leading and one trailing marker.
fn strip_fence_layer(text: &str) -> &str {
    let mut body = text.trim();

    if let Some(rest) = body.strip_prefix(FENCE) {
        match rest.find('\n') {
            Some(newline) if is_language_tag(rest[..newline].trim()) => {
                body = &rest[newline + 1..];
            }
            Some(_) => body = rest,
            None => {
                // Single-line fence: drop a bare tag word directly after the marker.
                let tag_len = rest
                    .char_indices()
                    .find(|(_, c)| !c.is_ascii_alphabetic())
                    .map(|(idx, _)| idx)
                    .unwrap_or(rest.len());
                let after_tag = &rest[tag_len..];
                body = if tag_len > 0 && after_tag.starts_with(char::is_whitespace) {
                    after_tag
                } else {
                    rest
                };
            }
        }
        body = body.trim();
    }

    if let Some(rest) = body.strip_suffix(FENCE) {
        body = rest.trim();
    }

    body
}

/// Decode oracle text into a JSON value after unwrapping any code fence.
///
/// The error message carries a short preview of the text for logs; callers that
/// need the full raw text keep their own copy.
pub fn parse_json_value(text: &str) -> Result<serde_json::Value, String> {
    let clean = unwrap_code_fence(text);
    serde_json::from_str::<serde_json::Value>(clean).map_err(|e| {
        format!(
            "invalid JSON ({}); response preview: {}",
            e,
            truncate_str(clean, 120)
        )
    })
}
