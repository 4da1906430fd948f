// WHY: Multi-pattern dictionary lookup over one sentence at a time
// Greedy longest-match, non-overlapping, left to right; no randomness here

use std::collections::HashMap;
use std::time::Duration;

use crate::dictionary::DictionaryEntry;

/// A located dictionary-word occurrence within a sentence
///
/// `start`/`end` are sentence-relative character offsets. `assigned_delay` stays zero until
/// the scheduler stamps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub word: String,
    pub replacement: String,
    pub start: usize,
    pub end: usize,
    pub assigned_delay: Duration,
}

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<char, TrieNode>,
    /// Present iff this node terminates a dictionary word
    replacement: Option<String>,
}

/// Prefix tree over dictionary words
#[derive(Debug, Default)]
pub struct Trie {
    root: TrieNode,
    len: usize,
}

impl Trie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a word in O(word length); a repeated word takes the newest replacement
    pub fn insert(&mut self, word: &str, replacement: &str) {
        if word.is_empty() {
            return;
        }

        let mut node = &mut self.root;
        for ch in word.chars() {
            node = node.children.entry(ch).or_default();
        }
        if node.replacement.replace(replacement.to_string()).is_none() {
            self.len += 1;
        }
    }

    /// Number of distinct words
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Exact lookup of a single word
    pub fn get(&self, word: &str) -> Option<&str> {
        let mut node = &self.root;
        for ch in word.chars() {
            node = node.children.get(&ch)?;
        }
        node.replacement.as_deref()
    }

    /// Scan `text` once and return every non-overlapping, longest-at-its-start match
    pub fn find_all_matches(&self, text: &str) -> Vec<Match> {
        let chars: Vec<char> = text.chars().collect();
        let mut matches = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            match self.longest_from(&chars, i) {
                Some((end, replacement)) => {
                    matches.push(Match {
                        word: chars[i..end].iter().collect(),
                        replacement: replacement.to_string(),
                        start: i,
                        end,
                        assigned_delay: Duration::ZERO,
                    });
                    i = end;
                }
                None => i += 1,
            }
        }

        matches
    }

    /// Walk from the root starting at `start`, remembering the last terminal reached
    fn longest_from(&self, chars: &[char], start: usize) -> Option<(usize, &str)> {
        let mut node = &self.root;
        let mut best = None;

        for (offset, ch) in chars[start..].iter().enumerate() {
            let Some(next) = node.children.get(ch) else {
                break;
            };
            node = next;
            if let Some(replacement) = node.replacement.as_deref() {
                best = Some((start + offset + 1, replacement));
            }
        }

        best
    }
}

impl<'a> FromIterator<&'a DictionaryEntry> for Trie {
    fn from_iter<I: IntoIterator<Item = &'a DictionaryEntry>>(iter: I) -> Self {
        let mut trie = Trie::new();
        for entry in iter {
            trie.insert(&entry.word, &entry.replacement);
        }
        trie
    }
}

impl FromIterator<DictionaryEntry> for Trie {
    fn from_iter<I: IntoIterator<Item = DictionaryEntry>>(iter: I) -> Self {
        let mut trie = Trie::new();
        for entry in iter {
            trie.insert(&entry.word, &entry.replacement);
        }
        trie
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trie(pairs: &[(&str, &str)]) -> Trie {
        pairs.iter().map(|(w, r)| DictionaryEntry::new(*w, *r)).collect()
    }

    #[test]
    fn test_longest_match_wins_over_first_terminal() {
        let trie = trie(&[("인터넷", "통신망"), ("넷", "망"), ("인터", "사이")]);
        let matches = trie.find_all_matches("인터넷을 했다.");

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].word, "인터넷");
        assert_eq!(matches[0].replacement, "통신망");
        assert_eq!((matches[0].start, matches[0].end), (0, 3));
    }

    #[test]
    fn test_resumes_after_accepted_match() {
        let trie = trie(&[("ab", "X"), ("bc", "Y"), ("c", "Z")]);
        let matches = trie.find_all_matches("abc");

        // "bc" would overlap "ab", so scanning resumes at 'c'
        let words: Vec<_> = matches.iter().map(|m| m.word.as_str()).collect();
        assert_eq!(words, vec!["ab", "c"]);
    }

    #[test]
    fn test_dead_end_prefix_advances_by_one() {
        let trie = trie(&[("커피숍", "찻집"), ("피", "혈")]);
        // "커피" is a prefix of "커피숍" but not a word; the walk fails and "피" matches at 1
        let matches = trie.find_all_matches("커피를");
        assert_eq!(matches.len(), 1);
        assert_eq!((matches[0].word.as_str(), matches[0].start), ("피", 1));
    }

    #[test]
    fn test_matches_never_overlap_and_equal_dictionary_words() {
        let pairs = [("커피", "다방차"), ("커피숍", "찻집"), ("숍", "가게"), ("버스", "두루타기"), ("스", "S")];
        let trie = trie(&pairs);
        let inputs = ["커피숍에서 커피를 마시고 버스를 탔다.", "스스스 커피커피숍숍", "", "아무 것도 없다"];

        for input in inputs {
            let matches = trie.find_all_matches(input);
            for pair in matches.windows(2) {
                assert!(pair[0].end <= pair[1].start, "overlap in {input:?}: {pair:?}");
            }
            let chars: Vec<char> = input.chars().collect();
            for m in &matches {
                let text: String = chars[m.start..m.end].iter().collect();
                assert_eq!(text, m.word);
                assert_eq!(trie.get(&m.word), Some(m.replacement.as_str()));
            }
        }
    }

    #[test]
    fn test_duplicate_word_last_write_wins() {
        let mut trie = Trie::new();
        trie.insert("커피", "다방차");
        trie.insert("커피", "가배");
        assert_eq!(trie.len(), 1);
        assert_eq!(trie.get("커피"), Some("가배"));
    }

    #[test]
    fn test_empty_inputs() {
        let mut trie = Trie::new();
        trie.insert("", "nothing");
        assert!(trie.is_empty());
        assert!(trie.find_all_matches("anything").is_empty());
    }
}
