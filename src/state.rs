// WHY: Session-lifetime bookkeeping that keeps reprocessing idempotent
// Identities, in-flight sentences, and user overrides; torn down with the session

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

use crate::document::NodeKey;
use crate::matcher::Match;

/// Persistent handle for "the same sentence" across edits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SentenceId(u64);

impl SentenceId {
    pub const fn new(id: u64) -> Self {
        SentenceId(id)
    }
}

impl fmt::Display for SentenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sentence-{}", self.0)
    }
}

/// `identity:word:relativeIndex` of an occurrence the user already resolved
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OverrideKey {
    pub sentence: SentenceId,
    pub word: String,
    pub index: usize,
}

impl OverrideKey {
    pub fn new(sentence: SentenceId, word: impl Into<String>, index: usize) -> Self {
        Self {
            sentence,
            word: word.into(),
            index,
        }
    }
}

impl fmt::Display for OverrideKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.sentence, self.word, self.index)
    }
}

/// A suggestion the user accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementRecord {
    /// Text span now holding the replacement
    pub node: NodeKey,
    pub sentence: SentenceId,
    pub original_word: String,
    pub replacement: String,
    /// Offset of the word within its sentence when it was replaced
    pub relative_index: usize,
}

#[derive(Debug, Default)]
pub struct SessionState {
    identities: HashMap<String, SentenceId>,
    next_identity: u64,
    /// Outstanding (scheduled, unresolved) match count per stable key
    in_flight: HashMap<String, usize>,
    overrides: HashSet<OverrideKey>,
    replacements: Vec<ReplacementRecord>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity for a stable key, minted on first sight
    pub fn identity_for(&mut self, stable_key: &str) -> SentenceId {
        if let Some(id) = self.identities.get(stable_key) {
            return *id;
        }
        self.next_identity += 1;
        let id = SentenceId(self.next_identity);
        self.identities.insert(stable_key.to_string(), id);
        debug!(%id, stable_key, "Minted sentence identity");
        id
    }

    pub fn lookup_identity(&self, stable_key: &str) -> Option<SentenceId> {
        self.identities.get(stable_key).copied()
    }

    pub fn identity_count(&self) -> usize {
        self.identities.len()
    }

    pub fn is_in_flight(&self, stable_key: &str) -> bool {
        self.in_flight.contains_key(stable_key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Mark a sentence busy with `outstanding` freshly scheduled matches
    ///
    /// Forced reprocessing of a busy sentence adds to its count rather than replacing it.
    pub fn begin_processing(&mut self, stable_key: &str, outstanding: usize) {
        if outstanding == 0 {
            return;
        }
        *self.in_flight.entry(stable_key.to_string()).or_insert(0) += outstanding;
    }

    /// Account for `count` matches of a sentence that resolved or were cancelled
    pub fn settle(&mut self, stable_key: &str, count: usize) {
        if let Some(outstanding) = self.in_flight.get_mut(stable_key) {
            *outstanding = outstanding.saturating_sub(count);
            if *outstanding == 0 {
                self.in_flight.remove(stable_key);
            }
        }
    }

    pub fn clear_in_flight(&mut self) {
        self.in_flight.clear();
    }

    pub fn record_override(&mut self, key: OverrideKey) -> bool {
        debug!(override_key = %key, "Recorded user override");
        self.overrides.insert(key)
    }

    pub fn is_overridden(&self, sentence: SentenceId, word: &str, index: usize) -> bool {
        // HashSet<OverrideKey> cannot be probed with borrowed parts
        self.overrides.contains(&OverrideKey::new(sentence, word, index))
    }

    /// Drop matches the user already resolved in this sentence
    pub fn filter_overrides(&self, sentence: SentenceId, matches: Vec<Match>) -> Vec<Match> {
        matches
            .into_iter()
            .filter(|m| !self.is_overridden(sentence, &m.word, m.start))
            .collect()
    }

    /// Remember an accepted replacement and suppress its position from now on
    pub fn record_replacement(&mut self, record: ReplacementRecord) {
        self.record_override(OverrideKey::new(record.sentence, record.original_word.clone(), record.relative_index));
        self.replacements.push(record);
    }

    pub fn replacements(&self) -> &[ReplacementRecord] {
        &self.replacements
    }
}
