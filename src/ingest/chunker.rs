//! Layered paragraph splitting plus greedy overlapping packing.
//!
//! Text is first split into units: blank-line paragraphs, then single lines,
//! then regrouped sentences, whichever first yields more than one unit. Units
//! are packed into chunks of at most `target_size` characters; every chunk
//! after the first starts with the last `overlap` characters of its
//! predecessor followed by a space.

use std::sync::OnceLock;

use regex::Regex;

use super::analysis::{analyze, ContentAnalysis};
use crate::core::config::ChunkingSettings;
use crate::text::{cached_regex, char_len, collapse_whitespace, tail_chars};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitStrategy {
    Paragraphs,
    Lines,
    Sentences,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub content: String,
    pub chunk_index: usize,
    /// Characters at the start of `content` repeated from the previous
    /// chunk. A single space follows them when non-zero.
    pub overlap_len: usize,
    pub analysis: ContentAnalysis,
}

impl ChunkDraft {
    /// Content minus the carried-over prefix.
    pub fn fresh_content(&self) -> &str {
        if self.overlap_len == 0 {
            return &self.content;
        }
        match self.content.char_indices().nth(self.overlap_len + 1) {
            Some((byte_idx, _)) => &self.content[byte_idx..],
            None => "",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SemanticChunker {
    sentence_group_cap: usize,
    min_paragraph_chars: usize,
    min_sentence_chars: usize,
}

impl Default for SemanticChunker {
    fn default() -> Self {
        Self::from_settings(&ChunkingSettings::default())
    }
}

impl SemanticChunker {
    pub fn from_settings(settings: &ChunkingSettings) -> Self {
        Self {
            sentence_group_cap: settings.sentence_group_cap.max(1),
            min_paragraph_chars: settings.min_paragraph_chars,
            min_sentence_chars: settings.min_sentence_chars,
        }
    }

    pub fn chunk(&self, text: &str, target_size: usize, overlap: usize) -> Vec<ChunkDraft> {
        let target_size = target_size.max(1);
        let overlap = overlap.min(target_size.saturating_sub(1));

        let (strategy, units) = self.split_units(text, target_size);
        tracing::debug!(?strategy, units = units.len(), "Split text for chunking");

        let mut drafts = Vec::new();
        let mut current = String::new();
        let mut current_overlap = 0;

        for unit in units {
            if current.is_empty() {
                current = unit;
                continue;
            }

            if char_len(&current) + 1 + char_len(&unit) > target_size {
                let carried = tail_chars(&current, overlap).to_string();
                let closed = std::mem::take(&mut current);
                drafts.push(Self::draft(closed, drafts.len(), current_overlap));

                current_overlap = char_len(&carried);
                current = if carried.is_empty() {
                    unit
                } else {
                    format!("{carried} {unit}")
                };
            } else {
                current.push(' ');
                current.push_str(&unit);
            }
        }

        if !current.is_empty() {
            drafts.push(Self::draft(current, drafts.len(), current_overlap));
        }
        drafts
    }

    fn draft(content: String, chunk_index: usize, overlap_len: usize) -> ChunkDraft {
        let analysis = analyze(&content);
        ChunkDraft {
            content,
            chunk_index,
            overlap_len,
            analysis,
        }
    }

    /// Units whose whitespace-joined concatenation equals the
    /// whitespace-collapsed input.
    pub fn split_units(&self, text: &str, target_size: usize) -> (SplitStrategy, Vec<String>) {
        let normalized = normalize_lines(text);
        if normalized.is_empty() {
            return (SplitStrategy::Paragraphs, Vec::new());
        }

        let paragraphs: Vec<String> = normalized
            .split("\n\n")
            .map(collapse_whitespace)
            .filter(|p| !p.is_empty())
            .collect();
        if paragraphs.len() > 1 {
            return (
                SplitStrategy::Paragraphs,
                split_oversized(paragraphs, target_size),
            );
        }

        let lines: Vec<String> = normalized
            .lines()
            .map(collapse_whitespace)
            .filter(|l| !l.is_empty())
            .collect();
        let lines = merge_short(lines, self.min_paragraph_chars);
        if lines.len() > 1 {
            return (SplitStrategy::Lines, split_oversized(lines, target_size));
        }

        let sentences = merge_short(split_sentences(&normalized), self.min_sentence_chars);
        let cap = self.sentence_group_cap.min(target_size);
        let groups = group_sentences(sentences, cap);
        (SplitStrategy::Sentences, split_oversized(groups, target_size))
    }
}

/// Collapses horizontal whitespace per line and blank-line runs to one
/// blank line, keeping line structure for the split layers.
fn normalize_lines(text: &str) -> String {
    static BLANK_RUNS: OnceLock<Regex> = OnceLock::new();

    let lines: Vec<String> = text
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();
    let joined = lines.join("\n");
    cached_regex(&BLANK_RUNS, r"\n{3,}")
        .replace_all(&joined, "\n\n")
        .trim()
        .to_string()
}

/// Splits after sentence-ending punctuation; punctuation stays with its
/// sentence.
fn split_sentences(text: &str) -> Vec<String> {
    static SENTENCE_END: OnceLock<Regex> = OnceLock::new();

    let mut sentences = Vec::new();
    let mut start = 0;
    for boundary in cached_regex(&SENTENCE_END, r"[.!?]+\s+").find_iter(text) {
        sentences.push(collapse_whitespace(&text[start..boundary.end()]));
        start = boundary.end();
    }
    sentences.push(collapse_whitespace(&text[start..]));
    sentences.retain(|s| !s.is_empty());
    sentences
}

/// Folds units shorter than `min_chars` into a neighbour instead of
/// dropping them.
fn merge_short(units: Vec<String>, min_chars: usize) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    let mut pending = String::new();

    for unit in units {
        if !pending.is_empty() {
            pending.push(' ');
        }
        pending.push_str(&unit);
        if char_len(&pending) >= min_chars {
            merged.push(std::mem::take(&mut pending));
        }
    }

    if !pending.is_empty() {
        match merged.last_mut() {
            Some(last) => {
                last.push(' ');
                last.push_str(&pending);
            }
            None => merged.push(pending),
        }
    }
    merged
}

fn group_sentences(sentences: Vec<String>, cap: usize) -> Vec<String> {
    let mut groups = Vec::new();
    let mut current = String::new();

    for sentence in sentences {
        if current.is_empty() {
            current = sentence;
        } else if char_len(&current) + 1 + char_len(&sentence) <= cap {
            current.push(' ');
            current.push_str(&sentence);
        } else {
            groups.push(std::mem::replace(&mut current, sentence));
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Breaks units longer than `max_chars` at word boundaries. A single word
/// longer than the limit is kept whole.
fn split_oversized(units: Vec<String>, max_chars: usize) -> Vec<String> {
    let mut out = Vec::with_capacity(units.len());
    for unit in units {
        if char_len(&unit) <= max_chars {
            out.push(unit);
            continue;
        }

        let mut piece = String::new();
        for word in unit.split(' ') {
            if !piece.is_empty() && char_len(&piece) + 1 + char_len(word) > max_chars {
                out.push(std::mem::take(&mut piece));
            }
            if !piece.is_empty() {
                piece.push(' ');
            }
            piece.push_str(word);
        }
        if !piece.is_empty() {
            out.push(piece);
        }
    }
    out
}
