// Integration test utilities and common code
// WHY: Centralized utilities avoid duplication across integration tests
#![allow(dead_code)]

pub mod fixtures;

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use wordrefine::{DictionaryEntry, Document, Session, SessionConfig, Trie};

/// Test fixture helper for creating temporary dictionaries and input texts
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub root_path: PathBuf,
}

impl TestFixture {
    /// Create a new test fixture with temporary directory
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root_path = temp_dir.path().to_path_buf();

        Self { temp_dir, root_path }
    }

    /// Write a file below the fixture root
    pub fn create_file<P: AsRef<Path>>(&self, relative_path: P, content: &str) -> PathBuf {
        let file_path = self.root_path.join(relative_path);

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }

        fs::write(&file_path, content).expect("Failed to write test file");
        file_path
    }

    /// Write the standard dictionary as a TSV file
    pub fn create_dictionary(&self) -> PathBuf {
        self.create_file("dictionary.tsv", fixtures::DICTIONARY_TSV)
    }
}

/// Standard dictionary as a trie
pub fn dictionary_trie() -> Trie {
    wordrefine::dictionary::parse_tsv(fixtures::DICTIONARY_TSV)
        .expect("Fixture dictionary should parse")
        .into_iter()
        .collect()
}

/// Deterministic session: no jitter, so matches surface in index order
pub fn attach(doc: &Document) -> Session {
    Session::attach(doc, SessionConfig::default().without_jitter(), dictionary_trie())
        .expect("Failed to attach session")
}

pub fn entries(pairs: &[(&str, &str)]) -> Vec<DictionaryEntry> {
    pairs.iter().map(|(word, replacement)| DictionaryEntry::new(*word, *replacement)).collect()
}
