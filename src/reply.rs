//! Bounding replies to a chat surface's message length.
//!
//! Lengths are counted in characters. Replies are wrapped in a code block,
//! so six characters of every message go to the fences.

const FENCE: &str = "```";
const FENCE_OVERHEAD: usize = 2 * FENCE.len();

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset just past the first `n` characters of `s`.
fn byte_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

/// Cut `text` to at most `limit` characters, ending on a sentence boundary.
///
/// Text already within the limit is returned unchanged. Otherwise the result
/// ends at the last `.`, `!` or `?` inside the limit; if there is none, the
/// result is empty rather than a fragment.
pub fn truncate_at_sentence(text: &str, limit: usize) -> String {
    if char_len(text) <= limit {
        return text.to_string();
    }

    let head = &text[..byte_offset(text, limit)];
    match head.rfind(['.', '!', '?']) {
        Some(end) => head[..=end].to_string(),
        None => String::new(),
    }
}

/// Wrap a reply in a code block, truncating so the whole message fits
/// within `limit` characters.
pub fn format_reply(text: &str, limit: usize) -> String {
    let body = truncate_at_sentence(text.trim(), limit.saturating_sub(FENCE_OVERHEAD));
    format!("{FENCE}{body}{FENCE}")
}

/// Split a long reply into fenced messages of at most `limit` characters.
///
/// Messages break between lines where possible. A single line too long for
/// one message is broken at its last whitespace before the limit, or hard
/// at the limit when it has none. Empty messages are never produced.
pub fn split_for_delivery(text: &str, limit: usize) -> Vec<String> {
    let budget = limit.saturating_sub(FENCE_OVERHEAD).max(1);
    let mut messages = Vec::new();
    let mut current = String::new();

    let mut flush = |current: &mut String| {
        let body = current.trim();
        if !body.is_empty() {
            messages.push(format!("{FENCE}{body}{FENCE}"));
        }
        current.clear();
    };

    for line in text.lines() {
        for piece in break_line(line, budget) {
            let needed = if current.is_empty() {
                char_len(piece)
            } else {
                char_len(&current) + 1 + char_len(piece)
            };
            if needed > budget {
                flush(&mut current);
            }
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(piece);
        }
    }
    flush(&mut current);

    messages
}

/// Break a line into pieces of at most `budget` characters.
fn break_line(line: &str, budget: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = line;

    while char_len(rest) > budget {
        let cut = byte_offset(rest, budget);
        let split_at = rest[..cut]
            .rfind(char::is_whitespace)
            .filter(|&i| i > 0)
            .unwrap_or(cut);
        pieces.push(&rest[..split_at]);
        rest = rest[split_at..].trim_start();
    }
    pieces.push(rest);
    pieces
}
