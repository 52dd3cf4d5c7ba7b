//! Sentence-aware chunking with sentence-level overlap.
//!
//! Sizes are measured in characters. Text at or below the target size is returned untouched.
//! Longer text is split on blank-line paragraph boundaries, then into sentences; sentences are
//! packed into chunks that close once the next sentence would overflow the target. Each new
//! chunk is seeded with the trailing `overlap` sentences of the chunk before it, and every
//! paragraph except the last leaves a literal `"\n"` marker behind so readers can recover the
//! original structure.

use regex::Regex;
use std::collections::VecDeque;
use std::sync::LazyLock;

/// Default target chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default number of sentences carried into the next chunk.
pub const DEFAULT_OVERLAP_SENTENCES: usize = 2;

const PARAGRAPH_MARKER: &str = "\n";

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("paragraph pattern is valid"));
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("sentence pattern is valid"));

/// Split `text` into ordered, overlapping chunks of roughly `target_size` characters.
///
/// - `len(text) <= target_size` returns `[text]` without further work.
/// - Consecutive chunks share at most `overlap` sentences.
/// - Always returns at least one chunk.
pub fn chunk_text(text: &str, target_size: usize, overlap: usize) -> Vec<String> {
    if text.chars().count() <= target_size {
        return vec![text.to_string()];
    }

    let chunks: Vec<String> = build_chunks(text, target_size, overlap)
        .into_iter()
        .map(|draft| draft.pieces.join(" "))
        .collect();

    if chunks.is_empty() {
        // Only reachable for whitespace-only input longer than the target.
        return vec![text.to_string()];
    }
    chunks
}

/// A chunk before joining: its pieces in order and how many leading sentences were carried over.
#[derive(Debug, Default)]
struct ChunkDraft {
    pieces: Vec<String>,
    carried: usize,
    fresh: usize,
}

impl ChunkDraft {
    fn seeded(carried: Vec<String>) -> Self {
        Self {
            carried: carried.len(),
            pieces: carried,
            fresh: 0,
        }
    }
}

fn build_chunks(text: &str, target_size: usize, overlap: usize) -> Vec<ChunkDraft> {
    let paragraphs: Vec<&str> = PARAGRAPH_BREAK.split(text).collect();
    let last_paragraph = paragraphs.len().saturating_sub(1);

    let mut drafts = Vec::new();
    let mut current = ChunkDraft::default();
    let mut current_size = 0usize;
    let mut recent: VecDeque<String> = VecDeque::with_capacity(overlap * 2 + 1);

    for (index, paragraph) in paragraphs.iter().enumerate() {
        for sentence in split_sentences(paragraph) {
            let sentence_len = sentence.chars().count();

            // A chunk holding only carried sentences absorbs the next one instead of closing.
            if current_size + sentence_len > target_size && current.fresh > 0 {
                drafts.push(std::mem::take(&mut current));

                let carried: Vec<String> = if overlap > 0 {
                    let skip = recent.len().saturating_sub(overlap);
                    recent.iter().skip(skip).cloned().collect()
                } else {
                    Vec::new()
                };
                current_size = carried.iter().map(|s| s.chars().count()).sum();
                recent = carried.iter().cloned().collect();
                current = ChunkDraft::seeded(carried);
            }

            current_size += sentence_len;
            current.pieces.push(sentence.clone());
            current.fresh += 1;

            recent.push_back(sentence);
            while recent.len() > overlap * 2 {
                recent.pop_front();
            }
        }

        if index != last_paragraph && !current.pieces.is_empty() {
            current.pieces.push(PARAGRAPH_MARKER.to_string());
        }
    }

    if !current.pieces.is_empty() {
        drafts.push(current);
    }
    drafts
}

/// Split a paragraph into trimmed sentences.
///
/// A boundary is `.`, `!` or `?` followed by whitespace. A period does not end a sentence when
/// the word before it is a single capital letter (`J.`), a dotted abbreviation (`e.g.`, `U.S.`)
/// or a two-letter title-case word (`Mr.`, `Dr.`).
pub(crate) fn split_sentences(paragraph: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for boundary in SENTENCE_END.find_iter(paragraph) {
        let terminator = boundary.start();
        if paragraph[terminator..].starts_with('.') && is_abbreviation(&paragraph[start..terminator])
        {
            continue;
        }
        push_trimmed(&mut sentences, &paragraph[start..=terminator]);
        start = boundary.end();
    }

    push_trimmed(&mut sentences, &paragraph[start..]);
    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, candidate: &str) {
    let trimmed = candidate.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}

/// `preceding` is the text before a period; only its last word matters.
fn is_abbreviation(preceding: &str) -> bool {
    let word = preceding
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or_default();
    let mut chars = word.chars();

    match (chars.next(), chars.next(), chars.next()) {
        (Some(first), None, _) => first.is_uppercase(),
        (Some(first), Some(second), None) => first.is_uppercase() && second.is_lowercase(),
        _ => word.contains('.'),
    }
}
