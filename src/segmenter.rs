// WHY: Incremental sentence spans over a block's live text
// Re-running on an edited block regenerates identical spans for an unchanged prefix

use anyhow::Result;
use regex_automata::meta::Regex;
use tracing::debug;

use crate::config::{compile_terminators, DEFAULT_TERMINATOR_PATTERN};

/// A contiguous run of text treated as one segmentation unit
///
/// `start`/`end` are character offsets into the text that was split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceSpan {
    pub text: String,
    pub start: usize,
    pub end: usize,
    /// True iff the span ends on a terminator character
    pub is_complete: bool,
    /// Trimmed text; looks up the persistent sentence identity
    pub stable_key: String,
}

impl SentenceSpan {
    fn new(text: String, start: usize, end: usize, is_complete: bool) -> Self {
        let stable_key = text.trim().to_string();
        Self {
            text,
            start,
            end,
            is_complete,
            stable_key,
        }
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

/// Splits text into sentences on a configurable terminator set
#[derive(Debug, Clone)]
pub struct SentenceSegmenter {
    terminators: Regex,
}

impl SentenceSegmenter {
    /// Segmenter for a terminator pattern matched against single characters
    pub fn new(terminator_pattern: &str) -> Result<Self> {
        Ok(Self {
            terminators: compile_terminators(terminator_pattern)?,
        })
    }

    /// `.`, `!` and `?`
    pub fn with_default_terminators() -> Result<Self> {
        Self::new(DEFAULT_TERMINATOR_PATTERN)
    }

    pub fn is_terminator(&self, ch: char) -> bool {
        let mut buf = [0u8; 4];
        let encoded: &str = ch.encode_utf8(&mut buf);
        self.terminators.is_match(encoded)
    }

    /// True iff the last character of `text` is a terminator
    pub fn is_sentence_complete(&self, text: &str) -> bool {
        text.chars().next_back().is_some_and(|ch| self.is_terminator(ch))
    }

    /// Split `text` into terminator-closed spans plus at most one trailing incomplete span
    pub fn split(&self, text: &str) -> Vec<SentenceSpan> {
        let chars: Vec<char> = text.chars().collect();
        let mut sentences = Vec::new();
        let mut current_start = 0;

        let mut i = 0;
        while i < chars.len() {
            if self.is_terminator(chars[i]) {
                let sentence_text: String = chars[current_start..=i].iter().collect();
                sentences.push(SentenceSpan::new(sentence_text, current_start, i + 1, true));

                // Whitespace after a terminator belongs to no sentence
                let mut next_start = i + 1;
                while next_start < chars.len() && chars[next_start].is_whitespace() {
                    next_start += 1;
                }
                current_start = next_start;
                i = next_start;
                continue;
            }
            i += 1;
        }

        if current_start < chars.len() {
            let remaining: String = chars[current_start..].iter().collect();
            if !remaining.trim().is_empty() {
                sentences.push(SentenceSpan::new(remaining, current_start, chars.len(), false));
            }
        }

        debug!("Split {} characters into {} sentences", chars.len(), sentences.len());
        sentences
    }
}
