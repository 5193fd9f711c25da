//! Recursive boundary-aware text chunker.
//!
//! Splits corpus text into [`TextChunk`]s of at most `chunk_size`
//! characters, with roughly `chunk_overlap` characters repeated between
//! neighbours. Splitting prefers paragraph breaks, then line breaks, then
//! spaces, and only cuts between arbitrary characters when a piece has no
//! other boundary. Separators stay attached to the start of the following
//! piece; chunks are trimmed of surrounding whitespace and empty chunks are
//! dropped.
//!
//! Only the chunk count is surfaced today: queries use the truncated corpus,
//! not the chunks.

use crate::models::TextChunk;

/// Boundaries tried in order. The empty separator means "between characters".
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Split `text` into overlapping chunks. Lengths are counted in characters.
///
/// `chunk_overlap` must be smaller than `chunk_size` (enforced by config
/// validation); larger values are clamped.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<TextChunk> {
    let chunk_size = chunk_size.max(1);
    let splitter = Splitter {
        chunk_size,
        chunk_overlap: chunk_overlap.min(chunk_size - 1),
    };
    splitter
        .split(text, &SEPARATORS)
        .into_iter()
        .enumerate()
        .map(|(index, text)| TextChunk { index, text })
        .collect()
}

/// Number of chunks [`chunk_text`] would produce.
pub fn chunk_count(text: &str, chunk_size: usize, chunk_overlap: usize) -> usize {
    chunk_text(text, chunk_size, chunk_overlap).len()
}

struct Splitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl Splitter {
    fn split(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // First separator present in the text wins; "" always matches.
        let (idx, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, s)| s.is_empty() || text.contains(*s))
            .map(|(i, s)| (i, *s))
            .unwrap_or((separators.len().saturating_sub(1), ""));
        let finer = if separator.is_empty() {
            &[][..]
        } else {
            &separators[idx + 1..]
        };

        let mut chunks = Vec::new();
        let mut good: Vec<&str> = Vec::new();
        for piece in split_keep_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                chunks.extend(self.merge(&good));
                good.clear();
            }
            if finer.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split(piece, finer));
            }
        }
        if !good.is_empty() {
            chunks.extend(self.merge(&good));
        }
        chunks
    }

    /// Greedily pack pieces into chunks, carrying up to `chunk_overlap`
    /// characters of trailing pieces into the next chunk.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: std::collections::VecDeque<&str> = std::collections::VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut chunks, &window);
                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }
        push_trimmed(&mut chunks, &window);
        chunks
    }
}

fn push_trimmed(chunks: &mut Vec<String>, window: &std::collections::VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split on `separator`, keeping it at the start of each following piece.
/// The empty separator yields single characters. Empty pieces are dropped.
fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (pos, _) in text.match_indices(separator) {
        if pos > start {
            pieces.push(&text[start..pos]);
        }
        start = pos;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}
