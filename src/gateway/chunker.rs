//! Splits outgoing replies into radio-sized chunks.
//!
//! Sizes are UTF-8 bytes, matching the radio payload limit. When a reply needs
//! more than one chunk, every chunk carries at most `max_size - MARKER.len()`
//! payload bytes and every chunk except the last ends with [`MARKER`].
//! Removing the markers and concatenating the chunks gives back the reply
//! byte for byte.

use super::errors::GatewayError;

/// Continuation suffix on every non-final chunk. Part of the wire format.
pub const MARKER: &str = "[..]";

/// Smallest usable chunk size: the marker plus one 4-byte codepoint.
pub const MIN_MAX_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentChunker {
    max_size: usize,
}

impl ContentChunker {
    pub fn new(max_size: usize) -> Result<Self, GatewayError> {
        if max_size < MIN_MAX_SIZE {
            return Err(GatewayError::InvalidConfig(format!(
                "max_message_size must be at least {}, got {}",
                MIN_MAX_SIZE, max_size
            )));
        }
        Ok(Self { max_size })
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Split `text` into ordered chunks, each at most `max_size` bytes.
    ///
    /// Break points prefer the last newline, then the last space, in the back
    /// half of the payload window. Codepoints are never split. Empty input
    /// yields one empty chunk.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.len() <= self.max_size {
            return vec![text.to_string()];
        }
        let budget = self.max_size - MARKER.len();
        let mut chunks = Vec::new();
        let mut remaining = text;
        while remaining.len() > budget {
            let cut = break_point(remaining, budget);
            let (head, tail) = remaining.split_at(cut);
            let mut chunk = String::with_capacity(head.len() + MARKER.len());
            chunk.push_str(head);
            chunk.push_str(MARKER);
            chunks.push(chunk);
            remaining = tail;
        }
        chunks.push(remaining.to_string());
        chunks
    }
}

/// Byte offset to cut `text` at, never beyond `budget` and always on a char
/// boundary. Always > 0 because `budget` fits at least one codepoint.
fn break_point(text: &str, budget: usize) -> usize {
    let mut end = budget.min(text.len());
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    let window = &text[..end];
    let half = end / 2;
    if let Some(pos) = window.rfind('\n') {
        if pos + 1 > half {
            return pos + 1;
        }
    }
    if let Some(pos) = window.rfind(' ') {
        if pos + 1 > half {
            return pos + 1;
        }
    }
    end
}

/// Undo [`ContentChunker::split`]: drop the trailing marker of every
/// non-final chunk and concatenate.
pub fn strip_markers(chunks: &[String]) -> String {
    let last = chunks.len().saturating_sub(1);
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            if i < last {
                chunk.strip_suffix(MARKER).unwrap_or(chunk)
            } else {
                chunk.as_str()
            }
        })
        .collect()
}
