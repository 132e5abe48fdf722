//! Size-bounded text chunker with overlap.
//!
//! Splits manuscript text into [`Chunk`]s whose unique content never exceeds
//! `max_chunk_size` characters. Each chunk after the first re-includes up to
//! `overlap_size` preceding characters so context carries across boundaries.
//!
//! Before splitting, whitespace runs are collapsed to single spaces. With
//! `preserve_paragraphs` enabled, every `". "` is then rewritten to `".\n\n"`
//! to recreate paragraph structure lost by the collapse, so the original
//! formatting is not preserved verbatim.
//!
//! Break points inside each window are chosen in priority order:
//! paragraph break, sentence end (`. `, `! `, `? `), line break, word
//! boundary, and finally a hard cut at the window edge.
//!
//! All lengths are counted in `char`s, not bytes.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::models::Chunk;

pub const DEFAULT_MAX_CHUNK_SIZE: usize = 15_000;
pub const DEFAULT_OVERLAP_SIZE: usize = 500;

/// Chunks with fewer words than this are flagged by [`TextChunker::validate`].
const MIN_WORDS: usize = 10;

/// Rough wall-clock cost of one chunk including retries.
const SECONDS_PER_CHUNK: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    pub max_chunk_size: usize,
    pub overlap_size: usize,
    pub preserve_paragraphs: bool,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            overlap_size: DEFAULT_OVERLAP_SIZE,
            preserve_paragraphs: true,
        }
    }
}

/// Advisory diagnostics for a single chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkValidation {
    pub valid: bool,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessingEstimate {
    pub minutes: u64,
    pub seconds: u64,
}

#[derive(Debug, Clone)]
pub struct TextChunker {
    options: ChunkOptions,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(ChunkOptions::default())
    }
}

impl TextChunker {
    /// A zero `max_chunk_size` is raised to 1 so the split always advances.
    pub fn new(mut options: ChunkOptions) -> Self {
        options.max_chunk_size = options.max_chunk_size.max(1);
        Self { options }
    }

    pub fn options(&self) -> &ChunkOptions {
        &self.options
    }

    /// Split text into chunks with contiguous indices starting at 0.
    ///
    /// Empty or all-whitespace input yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let normalized = normalize(text, self.options.preserve_paragraphs);
        let chars: Vec<char> = normalized.chars().collect();

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let cut = self.find_cut(&chars, start);
            let overlap = if chunks.is_empty() {
                0
            } else {
                self.options.overlap_size.min(start)
            };
            let content: String = chars[start - overlap..cut].iter().collect();
            chunks.push(make_chunk(chunks.len(), content, overlap));
            start = cut;
        }

        chunks
    }

    /// Pick the end (exclusive) of the unique content starting at `start`.
    ///
    /// One forward pass over the window records the last position of each
    /// break kind; the highest-priority kind found wins. Always returns a
    /// position greater than `start`.
    fn find_cut(&self, chars: &[char], start: usize) -> usize {
        let limit = start + self.options.max_chunk_size;
        if limit >= chars.len() {
            return chars.len();
        }

        let mut paragraph = None;
        let mut sentence = None;
        let mut line = None;

        // `limit < chars.len()`, so `chars[i + 1]` is always in bounds.
        for i in start..limit {
            match chars[i] {
                '\n' => {
                    line = Some(i + 1);
                    if i + 2 <= limit && chars[i + 1] == '\n' {
                        paragraph = Some(i + 2);
                    }
                }
                '.' | '!' | '?' if i + 2 <= limit && chars[i + 1] == ' ' => {
                    sentence = Some(i + 2);
                }
                _ => {}
            }
        }

        paragraph
            .or(sentence)
            .or(line)
            .unwrap_or_else(|| word_boundary(chars, start, limit))
    }

    /// Check a chunk against the configured budget.
    pub fn validate(&self, chunk: &Chunk) -> ChunkValidation {
        let mut issues = Vec::new();
        let char_count = chunk.char_count();

        if char_count > self.options.max_chunk_size + self.options.overlap_size {
            issues.push("Chunk exceeds maximum size".to_string());
        }
        if char_count == 0 {
            issues.push("Chunk is empty".to_string());
        }
        if chunk.word_count() < MIN_WORDS {
            issues.push("Chunk has too few words".to_string());
        }

        ChunkValidation {
            valid: issues.is_empty(),
            issues,
        }
    }
}

/// Back off from `limit` to the nearest space; cut hard at `limit` if the
/// window holds a single unbroken run.
fn word_boundary(chars: &[char], start: usize, limit: usize) -> usize {
    let mut pos = limit;
    while pos > start && chars[pos] != ' ' {
        pos -= 1;
    }
    if pos == start {
        limit
    } else {
        pos
    }
}

/// Collapse whitespace and optionally reinsert paragraph breaks after periods.
pub fn normalize(text: &str, preserve_paragraphs: bool) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if preserve_paragraphs {
        collapsed.replace(". ", ".\n\n")
    } else {
        collapsed
    }
}

/// Chunk text with the given options.
pub fn chunk_manuscript(text: &str, options: ChunkOptions) -> Vec<Chunk> {
    TextChunker::new(options).chunk(text)
}

/// Estimated wall-clock time to process `chunk_count` chunks.
pub fn estimate_processing_time(chunk_count: usize) -> ProcessingEstimate {
    let total = chunk_count as u64 * SECONDS_PER_CHUNK;
    ProcessingEstimate {
        minutes: total / 60,
        seconds: total % 60,
    }
}

fn make_chunk(index: usize, content: String, overlap: usize) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: format!("chunk_{}", index),
        index,
        content,
        overlap,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max: usize, overlap: usize, preserve: bool) -> TextChunker {
        TextChunker::new(ChunkOptions {
            max_chunk_size: max,
            overlap_size: overlap,
            preserve_paragraphs: preserve,
        })
    }

    fn contents(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.content.as_str()).collect()
    }

    #[test]
    fn test_empty_and_whitespace_yield_no_chunks() {
        assert!(TextChunker::default().chunk("").is_empty());
        assert!(TextChunker::default().chunk("   \n\t  ").is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = TextChunker::default().chunk("Hello   world.  Second\n\nline");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].id, "chunk_0");
        assert_eq!(chunks[0].content, "Hello world.\n\nSecond line");
        assert_eq!(chunks[0].overlap, 0);
    }

    #[test]
    fn test_normalize_without_paragraphs() {
        assert_eq!(normalize("  a.   b \n c ", false), "a. b c");
        assert_eq!(normalize("  a.   b \n c ", true), "a.\n\nb c");
    }

    #[test]
    fn test_paragraph_break_then_word_boundary() {
        let chunks = chunker(20, 0, true).chunk("Alpha beta.  Gamma delta epsilon zeta eta");
        assert_eq!(
            contents(&chunks),
            vec!["Alpha beta.\n\n", "Gamma delta epsilon", " zeta eta"]
        );
    }

    #[test]
    fn test_sentence_breaks() {
        let chunks = chunker(15, 0, false).chunk("One two! Three four? Five six seven");
        assert_eq!(
            contents(&chunks),
            vec!["One two! ", "Three four? ", "Five six seven"]
        );
    }

    #[test]
    fn test_overlap_reincludes_previous_chars() {
        let chunks = chunker(10, 3, false).chunk("aaaa bbbb cccc dddd");
        assert_eq!(contents(&chunks), vec!["aaaa bbbb", "bbb cccc dddd"]);
        assert_eq!(chunks[1].overlap, 3);
        assert_eq!(chunks[1].unique_content(), " cccc dddd");
    }

    #[test]
    fn test_unbreakable_run_is_hard_cut() {
        let chunks = chunker(5, 0, true).chunk("abcdefghijklmnop");
        assert_eq!(contents(&chunks), vec!["abcde", "fghij", "klmno", "p"]);
    }

    #[test]
    fn test_indices_contiguous_and_ids_stable() {
        let text = (0..200)
            .map(|i| format!("Sentence number {} is here.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let c1 = chunker(300, 40, true).chunk(&text);
        let c2 = chunker(300, 40, true).chunk(&text);
        assert!(c1.len() > 1);
        assert_eq!(c1, c2);
        for (i, c) in c1.iter().enumerate() {
            assert_eq!(c.index, i);
            assert_eq!(c.id, format!("chunk_{}", i));
            assert!(c.char_count() <= 340);
        }
    }

    #[test]
    fn test_multibyte_text_counts_chars() {
        let chunks = chunker(4, 1, false).chunk("ééééé");
        assert_eq!(contents(&chunks), vec!["éééé", "éé"]);
        assert_eq!(chunks[1].unique_content(), "é");
    }

    #[test]
    fn test_validate_flags_issues() {
        let c = chunker(10, 2, false);
        let chunk = make_chunk(0, "abcdefghijklm".to_string(), 0);
        let v = c.validate(&chunk);
        assert!(!v.valid);
        assert!(v.issues.contains(&"Chunk exceeds maximum size".to_string()));
        assert!(v.issues.contains(&"Chunk has too few words".to_string()));

        let empty = make_chunk(0, String::new(), 0);
        assert!(c.validate(&empty).issues.contains(&"Chunk is empty".to_string()));

        let ok = TextChunker::default().validate(&make_chunk(
            0,
            "one two three four five six seven eight nine ten".to_string(),
            0,
        ));
        assert!(ok.valid);
    }

    #[test]
    fn test_estimate_processing_time() {
        assert_eq!(
            estimate_processing_time(5),
            ProcessingEstimate {
                minutes: 2,
                seconds: 30
            }
        );
        assert_eq!(estimate_processing_time(0).minutes, 0);
    }
}
