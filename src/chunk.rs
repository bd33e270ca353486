//! Fixed-size text chunker.
//!
//! Splits a document body into chunks of up to 1000 characters, preferring
//! to break on a paragraph or line boundary near the limit so a chunk
//! doesn't end mid-word. The caller is responsible for applying
//! `maxChunksPerDocument` (the chunker itself is unbounded).

use crate::models::Chunk;

const MAX_CHUNK_CHARS: usize = 1000;

/// Split `text` into chunks of up to 1000 chars each, indices starting at 0.
/// `chunk.id` is left empty — the store assigns `"{persistedDocId}:{index}"`
/// once the document's persisted ID is known.
pub fn chunk_text(document_id: &str, text: &str) -> Vec<Chunk> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut remaining = trimmed;
    let mut index: i64 = 0;

    while !remaining.is_empty() {
        if remaining.chars().count() <= MAX_CHUNK_CHARS {
            chunks.push(make_chunk(document_id, index, remaining.trim()));
            break;
        }

        let window_end = char_boundary_at(remaining, MAX_CHUNK_CHARS);
        let window = &remaining[..window_end];
        let split_at = window
            .rfind("\n\n")
            .or_else(|| window.rfind('\n'))
            .or_else(|| window.rfind(' '))
            .map(|pos| pos + 1)
            .filter(|&pos| pos > 0)
            .unwrap_or(window_end);

        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            chunks.push(make_chunk(document_id, index, piece));
            index += 1;
        }
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

/// Byte offset of the char boundary after `max_chars` characters of `s`
/// (or `s.len()` if `s` has fewer). Always a valid `str` slice boundary,
/// unlike a raw byte-length cutoff on multi-byte UTF-8 text.
fn char_boundary_at(s: &str, max_chars: usize) -> usize {
    s.char_indices().nth(max_chars).map(|(i, _)| i).unwrap_or(s.len())
}

fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    Chunk {
        id: String::new(),
        document_id: document_id.to_string(),
        index,
        text: text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_single_chunk() {
        let chunks = chunk_text("doc1", "Hello, world!");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn empty_text_produces_no_chunks() {
        assert!(chunk_text("doc1", "").is_empty());
        assert!(chunk_text("doc1", "   \n  ").is_empty());
    }

    #[test]
    fn long_text_splits_under_limit_per_chunk() {
        let text = (0..200)
            .map(|i| format!("word{} ", i))
            .collect::<String>();
        let chunks = chunk_text("doc1", &text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 1000);
            assert!(!c.text.is_empty());
        }
    }

    #[test]
    fn chunk_indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text("doc1", &text);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i as i64);
        }
    }

    #[test]
    fn deterministic() {
        let text = "Alpha beta gamma delta epsilon zeta eta theta";
        let c1 = chunk_text("doc1", text);
        let c2 = chunk_text("doc1", text);
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.index, b.index);
        }
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "\u{6F22}\u{5B57}".repeat(600);
        let chunks = chunk_text("doc1", &text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 1000);
            assert!(!c.text.is_empty());
        }
    }

    #[test]
    fn reassembled_chunks_cover_original_words() {
        let text = "one two three four five six seven eight nine ten".repeat(50);
        let chunks = chunk_text("doc1", &text);
        let joined: String = chunks.iter().map(|c| c.text.clone()).collect::<Vec<_>>().join(" ");
        assert!(joined.contains("one two three"));
    }
}
