// WHY: The dictionary arrives from an external builder as an opaque list of pairs
// Parsing only; nothing here writes a dictionary back out

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::info;

/// One foreign word and its suggested native replacement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub word: String,
    pub replacement: String,
}

impl DictionaryEntry {
    pub fn new(word: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            replacement: replacement.into(),
        }
    }
}

/// Parse a JSON array of `{"word": .., "replacement": ..}` objects
pub fn parse_json(content: &str) -> Result<Vec<DictionaryEntry>> {
    serde_json::from_str(content).context("Failed to parse JSON dictionary")
}

/// Parse `word<TAB>replacement` lines; blank lines and `#` comments are skipped
pub fn parse_tsv(content: &str) -> Result<Vec<DictionaryEntry>> {
    let mut entries = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }

        let Some((word, replacement)) = line.split_once('\t') else {
            bail!("Dictionary line {} has no tab separator: {:?}", line_no + 1, line);
        };
        let (word, replacement) = (word.trim(), replacement.trim());
        if word.is_empty() {
            bail!("Dictionary line {} has an empty word", line_no + 1);
        }
        entries.push(DictionaryEntry::new(word, replacement));
    }

    Ok(entries)
}

/// Load a dictionary file, picking the format from its extension (`.json` or anything else as TSV)
pub async fn load(path: &Path) -> Result<Vec<DictionaryEntry>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read dictionary {}", path.display()))?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let entries = if is_json { parse_json(&content)? } else { parse_tsv(&content)? };
    info!("Loaded {} dictionary entries from {}", entries.len(), path.display());
    Ok(entries)
}
