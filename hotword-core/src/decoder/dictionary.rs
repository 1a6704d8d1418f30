//! Pronunciation dictionary merging.
//!
//! Spotting a keyphrase only needs pronunciations for its own words, but
//! those may be spread over several dictionaries (a large base lexicon plus a
//! user's custom words). Sources are scanned in order and the first entry
//! found for each needed word wins.
//!
//! Dictionary lines are `WORD PHONE PHONE ...`; only the headword is
//! inspected and the rest of the line is copied verbatim.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::{HotwordError, Result};

/// Merged dictionary holding one line per keyphrase word.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PronunciationDictionary {
    entries: Vec<String>,
}

impl PronunciationDictionary {
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Dictionary file contents, one entry per line.
impl fmt::Display for PronunciationDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

/// Collect pronunciations for every word of `keyphrase` from `paths`.
///
/// Paths that are not regular files are skipped with a warning.
///
/// # Errors
/// `MissingPronunciations` naming every word no source covered, or `Io`
/// if a dictionary exists but cannot be read.
pub fn merge_dictionaries(keyphrase: &str, paths: &[PathBuf]) -> Result<PronunciationDictionary> {
    let mut needed: BTreeSet<&str> = keyphrase.split_whitespace().collect();
    let mut entries = Vec::with_capacity(needed.len());

    for path in paths {
        if needed.is_empty() {
            break;
        }
        if !path.is_file() {
            warn!(path = %path.display(), "skipping dictionary");
            continue;
        }

        let contents = fs::read_to_string(path)?;
        for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let Some(word) = line.split_whitespace().next() else {
                continue;
            };
            if needed.remove(word) {
                entries.push(line.to_string());
            }
        }
        debug!(path = %path.display(), remaining = needed.len(), "dictionary scanned");
    }

    if !needed.is_empty() {
        return Err(HotwordError::MissingPronunciations {
            words: needed.into_iter().map(str::to_string).collect(),
        });
    }

    Ok(PronunciationDictionary { entries })
}
