//! Helpers that keep mesh text readable in single-line log records.

use std::fmt::Write;

/// Longest user text preview written to a log line.
const MAX_PREVIEW_CHARS: usize = 160;

/// Escape control characters so a radio message stays on one log line, and cap
/// the preview at [`MAX_PREVIEW_CHARS`] characters with a trailing ellipsis.
pub fn escape_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW_CHARS) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW_CHARS {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Compact description of an outgoing reply, e.g. `3 chunk(s), 412 bytes`.
pub fn describe_chunks(chunks: &[String]) -> String {
    let bytes: usize = chunks.iter().map(|c| c.len()).sum();
    format!("{} chunk(s), {} bytes", chunks.len(), bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_control_characters() {
        assert_eq!(escape_log("1\n2\r\t3\u{7}"), "1\\n2\\r\\t3\\x07");
    }

    #[test]
    fn caps_long_previews() {
        let long = "x".repeat(500);
        let esc = escape_log(&long);
        assert_eq!(esc.chars().count(), MAX_PREVIEW_CHARS + 1);
        assert!(esc.ends_with('…'));
    }

    #[test]
    fn describes_chunk_totals() {
        let chunks = vec!["abc".to_string(), "de".to_string()];
        assert_eq!(describe_chunks(&chunks), "2 chunk(s), 5 bytes");
    }
}
