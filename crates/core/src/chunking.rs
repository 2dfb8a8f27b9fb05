//! Sentence-aware text segmentation with bounded overlap.
//!
//! Text is split into sentence-like units (a `.`, `!` or `?` followed by
//! whitespace, or a blank line) and greedily packed into chunks of at most
//! `chunk_size` characters. When a chunk closes, the next one is seeded with
//! the longest run of trailing sentences from the closed chunk whose joined
//! length fits in `overlap`. A single sentence longer than `chunk_size` is cut
//! into fixed character windows stepped by `chunk_size - overlap`.
//!
//! All lengths are counted in `char`s.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    /// Stride between oversized-sentence windows. Never zero, so an
    /// `overlap >= chunk_size` misconfiguration still terminates.
    fn window_stride(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap).max(1)
    }
}

fn sentence_boundary() -> &'static Regex {
    static BOUNDARY: OnceLock<Regex> = OnceLock::new();
    BOUNDARY.get_or_init(|| {
        Regex::new(r"[.!?]\s+|(?:\r?\n){2,}").expect("sentence boundary pattern is valid")
    })
}

/// Splits text into trimmed, non-empty sentence units. Terminal punctuation
/// stays attached to its sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for boundary in sentence_boundary().find_iter(text) {
        let keeps_terminator = text[boundary.start()..]
            .starts_with(|c: char| matches!(c, '.' | '!' | '?'));
        let end = if keeps_terminator {
            boundary.start() + 1
        } else {
            boundary.start()
        };
        push_trimmed(&mut sentences, &text[start..end]);
        start = boundary.end();
    }

    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn push_trimmed<'a>(target: &mut Vec<&'a str>, piece: &'a str) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        target.push(trimmed);
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn joined_len(sentences: &[&str]) -> usize {
    let chars: usize = sentences.iter().map(|sentence| char_len(sentence)).sum();
    chars + sentences.len().saturating_sub(1)
}

/// Splits `text` into overlapping chunks. Empty or whitespace-only input
/// yields no chunks; no returned chunk is ever empty.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();
    let mut buffer_len = 0usize;

    for sentence in split_sentences(text) {
        let sentence_len = char_len(sentence);

        if sentence_len > config.chunk_size {
            if !buffer.is_empty() {
                chunks.push(buffer.join(" "));
                buffer.clear();
                buffer_len = 0;
            }
            chunks.extend(char_windows(sentence, config));
            continue;
        }

        let would_be = if buffer.is_empty() {
            sentence_len
        } else {
            buffer_len + 1 + sentence_len
        };

        if would_be > config.chunk_size && !buffer.is_empty() {
            chunks.push(buffer.join(" "));
            let mut seed = overlap_suffix(&buffer, config.overlap);
            while !seed.is_empty() && joined_len(&seed) + 1 + sentence_len > config.chunk_size {
                seed.remove(0);
            }
            buffer_len = joined_len(&seed);
            buffer = seed;
        }

        buffer_len = if buffer.is_empty() {
            sentence_len
        } else {
            buffer_len + 1 + sentence_len
        };
        buffer.push(sentence);
    }

    if !buffer.is_empty() {
        chunks.push(buffer.join(" "));
    }

    chunks
}

/// Longest trailing run of sentences whose joined length is within `overlap`.
fn overlap_suffix<'a>(sentences: &[&'a str], overlap: usize) -> Vec<&'a str> {
    let mut taken = 0usize;
    let mut length = 0usize;

    for sentence in sentences.iter().rev() {
        let candidate = if taken == 0 {
            char_len(sentence)
        } else {
            length + 1 + char_len(sentence)
        };
        if candidate > overlap {
            break;
        }
        length = candidate;
        taken += 1;
    }

    sentences[sentences.len() - taken..].to_vec()
}

fn char_windows(sentence: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = sentence.chars().collect();
    let mut windows = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + config.chunk_size).min(chars.len());
        let piece: String = chars[start..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            windows.push(trimmed.to_string());
        }
        start = start.saturating_add(config.window_stride());
    }

    windows
}
