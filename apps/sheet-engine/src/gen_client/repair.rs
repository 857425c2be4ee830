//! Best-effort structural repair of model output that should have been JSON.

use serde_json::Value;

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"));
    match inner {
        Some(stripped) => {
            let stripped = stripped.trim_start();
            stripped
                .strip_suffix("```")
                .map(str::trim)
                .unwrap_or(stripped)
        }
        None => text,
    }
}

/// Parses `text` as JSON, repairing common damage when a plain parse fails:
/// surrounding prose, trailing commas, and truncated output.
pub fn parse_lenient(text: &str) -> Option<Value> {
    let text = strip_json_fences(text);
    if let Ok(v) = serde_json::from_str(text) {
        return Some(v);
    }
    let candidate = outermost(text)?;
    let repaired = close_unbalanced(&drop_trailing_commas(candidate));
    serde_json::from_str(&repaired).ok()
}

/// From the first `{` or `[` to its matching closer, or to the end when truncated.
fn outermost(text: &str) -> Option<&str> {
    let start = text.find(|c| c == '{' || c == '[')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    Some(&text[start..])
}

fn drop_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(c);
            continue;
        }
        if c == '"' {
            in_string = true;
        }
        if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn close_unbalanced(text: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }

    let mut out = text.to_string();
    if in_string {
        out.push('"');
    }
    let trimmed = out.trim_end();
    let dangling_key = trimmed.ends_with(':');
    if dangling_key || trimmed.ends_with(',') {
        let cut = trimmed.len() - 1;
        out.truncate(cut);
        if dangling_key {
            // a dangling key has no value to close; give it one
            out.push_str(":null");
        }
    }
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}
