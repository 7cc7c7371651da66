//! Heuristic metadata for a chunk of course text.

use std::sync::OnceLock;

use regex::Regex;

use crate::rag::store::ChunkType;
use crate::text::{cached_regex, dedupe_preserving_order, word_count};

pub const MAX_TOPICS: usize = 8;
const MAX_OBJECTIVES: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct ContentAnalysis {
    pub chunk_type: ChunkType,
    pub topics: Vec<String>,
    pub difficulty_level: u8,
    pub learning_objectives: Vec<String>,
    pub word_count: usize,
    /// Minutes.
    pub estimated_study_time: f32,
}

pub fn analyze(content: &str) -> ContentAnalysis {
    let words = word_count(content);
    ContentAnalysis {
        chunk_type: classify_chunk_type(content),
        topics: heuristic_topics(content),
        difficulty_level: estimate_difficulty(content),
        learning_objectives: extract_learning_objectives(content),
        word_count: words,
        estimated_study_time: estimate_study_minutes(words),
    }
}

/// First matching cue wins, in syllabus, assignment, quiz, lecture order.
pub fn classify_chunk_type(content: &str) -> ChunkType {
    static SYLLABUS: OnceLock<Regex> = OnceLock::new();
    static ASSIGNMENT: OnceLock<Regex> = OnceLock::new();
    static QUIZ: OnceLock<Regex> = OnceLock::new();
    static LECTURE: OnceLock<Regex> = OnceLock::new();

    let rules = [
        (
            cached_regex(&SYLLABUS, r"(?i)\b(syllabus|course outline|schedule)\b"),
            ChunkType::Syllabus,
        ),
        (
            cached_regex(&ASSIGNMENT, r"(?i)\b(assignment|homework|project|due)\b"),
            ChunkType::Assignment,
        ),
        (
            cached_regex(&QUIZ, r"(?i)\b(quiz|exam|test|midterm|final)\b"),
            ChunkType::QuizInfo,
        ),
        (
            cached_regex(&LECTURE, r"(?i)\b(lecture|chapter|section)\b"),
            ChunkType::LectureNotes,
        ),
    ];

    rules
        .iter()
        .find(|(pattern, _)| pattern.is_match(content))
        .map(|(_, chunk_type)| *chunk_type)
        .unwrap_or(ChunkType::Text)
}

/// Regex fallback for topic extraction: section headers, numbered headings
/// and "<Capitalized Phrase> algorithm/method/..." co-occurrences.
pub fn heuristic_topics(content: &str) -> Vec<String> {
    static CHAPTER: OnceLock<Regex> = OnceLock::new();
    static SECTION: OnceLock<Regex> = OnceLock::new();
    static NUMBERED: OnceLock<Regex> = OnceLock::new();
    static TERM: OnceLock<Regex> = OnceLock::new();
    static PHRASE: OnceLock<Regex> = OnceLock::new();
    static STOPWORD: OnceLock<Regex> = OnceLock::new();

    let patterns = [
        cached_regex(&CHAPTER, r"(?i)\b(Chapter \d+[:\s]*([^.\n]{10,50}))"),
        cached_regex(&SECTION, r"(?i)\b(Section \d+\.?\d*[:\s]*([^.\n]{10,50}))"),
        cached_regex(&NUMBERED, r"\b(\d+\.\d+[:\s]*([^.\n]{10,50}))"),
        cached_regex(
            &TERM,
            r"(?i)\b(Algorithm|Method|Theorem|Principle|Law|Rule|Concept)[:\s]*([^.\n]{5,40})",
        ),
        cached_regex(
            &PHRASE,
            r"\b([A-Z][a-z]+(?: [A-Z][a-z]+){1,2})\s*(?i:algorithm|method|theorem|principle|law|rule|concept|analysis|approach|technique)",
        ),
    ];
    let stopword = cached_regex(&STOPWORD, r"(?i)^(the|and|or|but|in|on|at|to|for|of|with|by)$");

    let mut found = Vec::new();
    for pattern in patterns {
        for captures in pattern.captures_iter(content) {
            for group in captures.iter().skip(1).flatten() {
                let candidate = group.as_str().trim();
                if candidate.chars().count() > 5 && !stopword.is_match(candidate) {
                    found.push(candidate.to_string());
                }
            }
        }
    }

    let mut topics = dedupe_preserving_order(found);
    topics.truncate(MAX_TOPICS);
    topics
}

/// 1 (very easy) to 5 (very hard) from polysyllabic-word ratio and mean
/// sentence length.
pub fn estimate_difficulty(content: &str) -> u8 {
    static SENTENCE_END: OnceLock<Regex> = OnceLock::new();

    let words: Vec<&str> = content.split_whitespace().collect();
    if words.is_empty() {
        return 1;
    }

    let complex = words.iter().filter(|w| count_syllables(w) >= 3).count();
    let ratio = complex as f64 / words.len() as f64;

    let sentences = cached_regex(&SENTENCE_END, r"[.!?]+")
        .split(content)
        .filter(|s| !s.trim().is_empty())
        .count()
        .max(1);
    let avg_sentence_len = words.len() as f64 / sentences as f64;

    if ratio > 0.3 && avg_sentence_len > 20.0 {
        5
    } else if ratio > 0.2 || avg_sentence_len > 15.0 {
        4
    } else if ratio > 0.15 || avg_sentence_len > 12.0 {
        3
    } else if ratio > 0.1 {
        2
    } else {
        1
    }
}

/// Vowel-group count with a silent trailing `e`; never below one.
pub fn count_syllables(word: &str) -> usize {
    let word: String = word
        .chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect();

    let mut count = 0;
    let mut prev_vowel = false;
    for c in word.chars() {
        let vowel = "aeiouy".contains(c);
        if vowel && !prev_vowel {
            count += 1;
        }
        prev_vowel = vowel;
    }

    if word.ends_with('e') && count > 1 {
        count -= 1;
    }
    count.max(1)
}

pub fn extract_learning_objectives(content: &str) -> Vec<String> {
    static WILL: OnceLock<Regex> = OnceLock::new();
    static BY_THE_END: OnceLock<Regex> = OnceLock::new();
    static VERBS: OnceLock<Regex> = OnceLock::new();

    let patterns = [
        cached_regex(
            &WILL,
            r"(?i)(?:students? will|learners? will|you will|objectives?)[:\s]*([^.\n]+)",
        ),
        cached_regex(
            &BY_THE_END,
            r"(?i)(?:by the end|after completing|upon completion)[^,]*,\s*([^.\n]+)",
        ),
        cached_regex(
            &VERBS,
            r"(?i)(?:understand|learn|master|apply|analyze|evaluate)[:\s]*([^.\n]+)",
        ),
    ];

    let found = patterns.iter().flat_map(|pattern| {
        pattern
            .captures_iter(content)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|objective| objective.chars().count() > 10)
            .collect::<Vec<_>>()
    });

    let mut objectives = dedupe_preserving_order(found);
    objectives.truncate(MAX_OBJECTIVES);
    objectives
}

/// Roughly two minutes per hundred words, at least five.
pub fn estimate_study_minutes(words: usize) -> f32 {
    let minutes = (words as f32 * 0.02).max(5.0);
    (minutes * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_follows_cue_priority() {
        assert_eq!(
            classify_chunk_type("The course outline and weekly schedule"),
            ChunkType::Syllabus
        );
        assert_eq!(
            classify_chunk_type("Homework 3 is due Friday before the exam"),
            ChunkType::Assignment
        );
        assert_eq!(classify_chunk_type("Midterm covers graphs"), ChunkType::QuizInfo);
        assert_eq!(
            classify_chunk_type("In this lecture we derive it"),
            ChunkType::LectureNotes
        );
        assert_eq!(classify_chunk_type("Plain prose about trees"), ChunkType::Text);
        assert_eq!(classify_chunk_type("duet"), ChunkType::Text);
    }

    #[test]
    fn heuristic_topics_pick_up_headers_and_named_methods() {
        let text = "Chapter 3: Dynamic Programming Basics. \
                    We then study the Bellman Ford algorithm and the Master Theorem approach.";
        let topics = heuristic_topics(text);

        assert!(topics.contains(&"Chapter 3: Dynamic Programming Basics".to_string()));
        assert!(topics.contains(&"Dynamic Programming Basics".to_string()));
        assert!(topics.contains(&"Bellman Ford".to_string()));
        assert!(topics.len() <= MAX_TOPICS);
    }

    #[test]
    fn heuristic_topics_empty_for_plain_text() {
        assert!(heuristic_topics("just some words here").is_empty());
    }

    #[test]
    fn syllables_count_vowel_groups() {
        assert_eq!(count_syllables("cat"), 1);
        assert_eq!(count_syllables("make"), 1);
        assert_eq!(count_syllables("algorithm"), 3);
        assert_eq!(count_syllables("Computation,"), 4);
        assert_eq!(count_syllables("42"), 1);
    }

    #[test]
    fn difficulty_stays_in_range_and_orders_texts() {
        let easy = "The cat sat. The dog ran. We met.";
        let hard = "Asymptotic computational complexity characterization necessitates \
                    sophisticated mathematical abstraction considering probabilistic \
                    amortization, randomization, parallelization, and generalization \
                    across heterogeneous architectures internationally standardized and evaluated.";

        assert_eq!(estimate_difficulty(easy), 1);
        assert_eq!(estimate_difficulty(hard), 5);
        assert_eq!(estimate_difficulty(""), 1);
    }

    #[test]
    fn learning_objectives_are_matched_and_capped() {
        let text = "Students will implement balanced search trees. \
                    By the end of the unit, you can prove heap invariants. \
                    Learn: shortest path algorithms on weighted graphs.";
        let objectives = extract_learning_objectives(text);

        assert!(objectives.contains(&"implement balanced search trees".to_string()));
        assert!(objectives.contains(&"you can prove heap invariants".to_string()));
        assert!(objectives.len() <= 5);
    }

    #[test]
    fn study_time_has_a_floor() {
        assert_eq!(estimate_study_minutes(10), 5.0);
        assert_eq!(estimate_study_minutes(1000), 20.0);
        assert_eq!(estimate_study_minutes(333), 6.7);
    }
}
