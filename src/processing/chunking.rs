//! Character-budgeted semantic chunking.
//!
//! Boundaries come from `semchunk-rs`, which prefers newline runs, then tabs, then other
//! whitespace, then punctuation, and finally single characters. The chunker is handed a character
//! counter and a budget of `chunk_size - overlap`; each chunk is then widened backwards into the
//! source text by up to `overlap` characters of its predecessor. Every chunk therefore stays a
//! contiguous substring of the input, holds at most `chunk_size` characters, and repeats the tail
//! of the chunk before it.
//!
//! Lengths are measured in Unicode scalar values, not bytes.

use super::types::{ChunkingError, TextChunk};
use semchunk_rs::Chunker;

/// Splits text into overlapping chunks of bounded size.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

/// Byte range of a base chunk inside the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

impl TextSplitter {
    /// Create a splitter. `chunk_overlap` must be smaller than `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkingError::InvalidOverlap {
                overlap: chunk_overlap,
                chunk_size,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Maximum characters per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `text` into trimmed, non-empty chunks in document order.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let budget = self.chunk_size - self.chunk_overlap;
        let chunker = Chunker::new(budget, Box::new(|segment: &str| char_len(segment)));
        let base_chunks = chunker.chunk(text);

        let mut spans = Vec::with_capacity(base_chunks.len());
        let mut cursor = 0;
        for chunk in &base_chunks {
            let needle = chunk.trim();
            if needle.is_empty() {
                continue;
            }
            match text[cursor..].find(needle) {
                Some(offset) => {
                    let start = cursor + offset;
                    let end = start + needle.len();
                    spans.push(Span { start, end });
                    cursor = end;
                }
                None => {
                    tracing::warn!(
                        characters = char_len(needle),
                        "Chunk boundary not found in source text; chunking without overlap"
                    );
                    return base_chunks
                        .iter()
                        .map(|chunk| chunk.trim())
                        .filter(|chunk| !chunk.is_empty())
                        .map(str::to_string)
                        .collect();
                }
            }
        }

        self.apply_overlap(text, &spans)
    }

    /// Widen every span after the first backwards by up to `chunk_overlap` characters, never past
    /// the start of the previous span.
    fn apply_overlap(&self, text: &str, spans: &[Span]) -> Vec<String> {
        let mut chunks = Vec::with_capacity(spans.len());
        let mut previous: Option<Span> = None;
        for &span in spans {
            let start = match previous {
                Some(prev) if self.chunk_overlap > 0 => {
                    overlap_start(text, prev.start, span.start, self.chunk_overlap)
                }
                _ => span.start,
            };
            let chunk = text[start..span.end].trim_start();
            if !chunk.is_empty() {
                chunks.push(chunk.to_string());
            }
            previous = Some(span);
        }
        chunks
    }
}

/// Byte offset `overlap` characters before `start`, clamped to `floor`.
fn overlap_start(text: &str, floor: usize, start: usize, overlap: usize) -> usize {
    text[floor..start]
        .char_indices()
        .rev()
        .take(overlap)
        .last()
        .map(|(offset, _)| floor + offset)
        .unwrap_or(start)
}

/// Chunk `text` with the given size and overlap, numbering chunks by position.
///
/// Returns an empty vector when the text is empty or whitespace.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<TextChunk>, ChunkingError> {
    let splitter = TextSplitter::new(chunk_size, overlap)?;
    Ok(splitter
        .split(text)
        .into_iter()
        .enumerate()
        .map(|(position, text)| TextChunk { position, text })
        .collect())
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alphabet_text(len: usize) -> String {
        "abcdefghijklmnopqrstuvwxyz".chars().cycle().take(len).collect()
    }

    fn words(count: usize) -> String {
        (0..count)
            .map(|idx| format!("w{idx:03}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Longest prefix of `next` (in characters, at most `limit`) that `prev` ends with.
    fn shared_overlap(prev: &str, next: &str, limit: usize) -> usize {
        (1..=limit)
            .rev()
            .find(|&len| {
                let head: String = next.chars().take(len).collect();
                head.chars().count() == len && prev.ends_with(&head)
            })
            .unwrap_or(0)
    }

    #[test]
    fn short_text_is_a_single_verbatim_chunk() {
        let chunks = TextSplitter::new(1000, 150).unwrap().split("hello,world");
        assert_eq!(chunks, vec!["hello,world"]);
    }

    #[test]
    fn empty_and_whitespace_text_yield_no_chunks() {
        let splitter = TextSplitter::new(1000, 150).unwrap();
        assert!(splitter.split("").is_empty());
        assert!(splitter.split("   \n\n  \n").is_empty());
    }

    #[test]
    fn unbroken_text_overlaps_by_exactly_the_configured_characters() {
        let text = alphabet_text(2500);
        let chunks = TextSplitter::new(1000, 150).unwrap().split(&text);

        assert!(chunks.len() >= 3);
        assert!(text.starts_with(chunks[0].as_str()));
        assert!(text.ends_with(chunks.last().unwrap().as_str()));
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 1000);
            assert!(text.contains(chunk.as_str()));
        }
        for pair in chunks.windows(2) {
            let tail = &pair[0][pair[0].len() - 150..];
            assert_eq!(&pair[1][..150], tail);
        }
    }

    #[test]
    fn paragraph_boundaries_are_preferred() {
        let first = words(120);
        let second = words(100).replace('w', "v");
        let text = format!("{first}\n\n{second}");

        let chunks = TextSplitter::new(1000, 150).unwrap().split(&text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], first);
        assert!(chunks[1].ends_with(&second));
        assert!(chunks[1].starts_with(&first[first.len() - 148..]));
    }

    #[test]
    fn word_level_chunks_share_a_tail_of_at_most_the_overlap() {
        let text = words(400);
        let chunks = TextSplitter::new(1000, 150).unwrap().split(&text);

        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 1000);
            assert!(!chunk.starts_with(' ') && !chunk.ends_with(' '));
        }
        for pair in chunks.windows(2) {
            let shared = shared_overlap(&pair[0], &pair[1], 150);
            assert!(shared >= 140, "overlap too small: {shared}");
        }
        assert!(chunks[0].starts_with("w000"));
        assert!(chunks.last().unwrap().ends_with("w399"));
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = format!("{}\n{}\n\n{}", words(300), alphabet_text(1800), words(50));
        let splitter = TextSplitter::new(1000, 150).unwrap();
        assert_eq!(splitter.split(&text), splitter.split(&text));
    }

    #[test]
    fn lengths_are_counted_in_characters() {
        let text = "é".repeat(1500);
        let chunks = TextSplitter::new(1000, 150).unwrap().split(&text);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 1000);
        }
        assert!(chunks[0].chars().count() > 500);
        let covered: usize = chunks.iter().map(|chunk| chunk.chars().count()).sum();
        assert_eq!(covered, 1500 + 150 * (chunks.len() - 1));
    }

    #[test]
    fn zero_overlap_concatenates_back_to_the_text() {
        let text = alphabet_text(2500);
        let chunks = TextSplitter::new(1000, 0).unwrap().split(&text);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn overlap_never_reaches_past_the_previous_chunk() {
        let spans = [Span { start: 0, end: 3 }, Span { start: 4, end: 10 }];
        let chunks = TextSplitter::new(10, 8)
            .unwrap()
            .apply_overlap("abc defghi", &spans);
        assert_eq!(chunks, vec!["abc", "abc defghi"]);
    }

    #[test]
    fn chunk_text_numbers_chunks_in_order() {
        let chunks = chunk_text(&alphabet_text(2500), 1000, 150).unwrap();
        let positions: Vec<_> = chunks.iter().map(|chunk| chunk.position).collect();
        assert_eq!(positions, (0..chunks.len()).collect::<Vec<_>>());
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(matches!(
            TextSplitter::new(0, 0),
            Err(ChunkingError::InvalidChunkSize)
        ));
        assert!(matches!(
            chunk_text("hello", 100, 100),
            Err(ChunkingError::InvalidOverlap {
                overlap: 100,
                chunk_size: 100
            })
        ));
    }
}
