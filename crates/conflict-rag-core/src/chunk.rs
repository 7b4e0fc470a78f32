//! Paragraph-boundary text chunker.
//!
//! Splits document bodies into pieces of at most `max_tokens` (approximated
//! as 4 chars per token). Paragraphs (`\n\n`) are packed together while
//! they fit; a paragraph that is too large on its own is hard-split at the
//! last newline or space before the limit.
//!
//! With a non-zero `overlap_tokens`, each chunk after the first is prefixed
//! with the word-aligned tail of the piece before it, so a sentence cut at a
//! boundary is still embedded with some of its context. The prefix comes on
//! top of the `max_tokens` budget: such a chunk can reach
//! `max_tokens + overlap_tokens` (plus the `\n\n` separator).
//!
//! # Example
//!
//! ```rust
//! use conflict_rag_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("doc-123", "Hello world.\n\nSecond paragraph.", 700, 0);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split text into chunks on paragraph boundaries.
///
/// # Guarantees
///
/// - At least one chunk is always returned (even for empty text).
/// - Chunk indices are contiguous: `0, 1, 2, …, N-1`.
/// - Splits never land inside a UTF-8 character.
/// - Without overlap, no chunk exceeds `max_tokens × 4` bytes. The overlap
///   prefix, capped at half of that budget, is added on top.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    max_tokens: usize,
    overlap_tokens: usize,
) -> Vec<Chunk> {
    let max_chars = (max_tokens * CHARS_PER_TOKEN).max(CHARS_PER_TOKEN);
    let overlap_chars = (overlap_tokens * CHARS_PER_TOKEN).min(max_chars / 2);

    let pieces = pack_paragraphs(text, max_chars);
    if pieces.is_empty() {
        return vec![make_chunk(document_id, 0, text.trim())];
    }

    let mut chunks = Vec::with_capacity(pieces.len());
    for (i, piece) in pieces.iter().enumerate() {
        let body = if i > 0 && overlap_chars > 0 {
            let tail = overlap_tail(&pieces[i - 1], overlap_chars);
            if tail.is_empty() {
                piece.clone()
            } else {
                format!("{}\n\n{}", tail, piece)
            }
        } else {
            piece.clone()
        };
        chunks.push(make_chunk(document_id, i as i64, &body));
    }

    chunks
}

/// Pack paragraphs into pieces of at most `max_chars` bytes.
fn pack_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if buf.is_empty() {
            trimmed.len()
        } else {
            buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
        }

        if trimmed.len() > max_chars {
            pieces.extend(hard_split(trimmed, max_chars).into_iter().map(String::from));
            continue;
        }

        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(trimmed);
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }

    pieces
}

/// Split an oversized paragraph at newline/space boundaries.
fn hard_split(text: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_chars {
            pieces.push(remaining.trim());
            break;
        }

        let limit = snap_to_char_boundary(remaining, max_chars);
        let mut split = remaining[..limit]
            .rfind(|c: char| c == '\n' || c == ' ')
            .map(|pos| pos + 1)
            .unwrap_or(limit);
        if split == 0 {
            split = remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
        }

        let piece = remaining[..split].trim();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        remaining = &remaining[split..];
    }

    pieces.retain(|p| !p.is_empty());
    pieces
}

/// Word-aligned suffix of `text` no longer than `max_chars` bytes.
fn overlap_tail(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text.trim();
    }
    let start = snap_up_to_char_boundary(text, text.len() - max_chars);
    let tail = &text[start..];
    if text[..start].ends_with(char::is_whitespace) {
        return tail.trim();
    }
    // Drop the partial word at the front of the window.
    match tail.char_indices().find(|(_, c)| c.is_whitespace()) {
        Some((i, c)) => tail[i + c.len_utf8()..].trim(),
        None => tail.trim(),
    }
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Snap a byte index forward to the nearest valid UTF-8 char boundary.
fn snap_up_to_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Create a single [`Chunk`] with a UUID and SHA-256 content hash.
fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("doc1", "Interns must work on-site.", 700, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Interns must work on-site.");
        assert_eq!(chunks[0].document_id, "doc1");
    }

    #[test]
    fn test_empty_text() {
        let chunks = chunk_text("doc1", "", 700, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert!(chunks[0].text.is_empty());
    }

    #[test]
    fn test_whitespace_only_text() {
        let chunks = chunk_text("doc1", "\n\n   \n\n", 700, 0);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.is_empty());
    }

    #[test]
    fn test_paragraphs_packed_under_limit() {
        let text = "Remote work policy.\n\nInterns are on-site.\n\nManagers approve exceptions.";
        let chunks = chunk_text("doc1", text, 700, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].text,
            "Remote work policy.\n\nInterns are on-site.\n\nManagers approve exceptions."
        );
    }

    #[test]
    fn test_paragraphs_exceed_limit() {
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = chunk_text("doc1", text, 6, 0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].text, "This is paragraph two.");
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text("doc1", &text, 10, 0);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_oversized_paragraph_split_on_spaces() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let chunks = chunk_text("doc1", text, 3, 0);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 12, "chunk too long: {:?}", c.text);
            assert!(!c.text.starts_with(' ') && !c.text.ends_with(' '));
        }
        let rejoined: Vec<&str> = chunks.iter().flat_map(|c| c.text.split(' ')).collect();
        assert_eq!(rejoined.join(" "), text);
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘";
        let chunks = chunk_text("doc1", text, 3, 1);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(!c.text.is_empty());
        }
    }

    #[test]
    fn test_overlap_prefixes_previous_tail() {
        let text = "one two three four five six\n\nseven eight nine ten eleven";
        let chunks = chunk_text("doc1", text, 7, 2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "one two three four five six");
        assert!(chunks[1].text.starts_with("five six\n\n"));
        assert!(chunks[1].text.ends_with("seven eight nine ten eleven"));
    }

    #[test]
    fn test_overlap_extends_chunk_beyond_budget_by_at_most_overlap() {
        let text = (0..40)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let (max_tokens, overlap_tokens) = (10, 3);
        let chunks = chunk_text("doc1", &text, max_tokens, overlap_tokens);
        assert!(chunks.len() > 2);
        let budget = max_tokens * CHARS_PER_TOKEN;
        let overlap = overlap_tokens * CHARS_PER_TOKEN;
        assert!(chunks.iter().any(|c| c.text.len() > budget));
        for c in &chunks {
            assert!(
                c.text.len() <= budget + overlap + 2,
                "chunk too long: {:?}",
                c.text
            );
        }
    }

    #[test]
    fn test_overlap_zero_leaves_chunks_disjoint() {
        let text = "one two three four five six\n\nseven eight nine ten eleven";
        let chunks = chunk_text("doc1", text, 7, 0);
        assert_eq!(chunks[1].text, "seven eight nine ten eleven");
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = chunk_text("doc1", text, 2, 1);
        let c2 = chunk_text("doc1", text, 2, 1);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
            assert_eq!(a.chunk_index, b.chunk_index);
        }
    }
}
