//! # Labeled Sentence Datasets
//!
//! A dataset is two aligned sequences: tokenized sentences and one label per
//! token. Datasets are read from JSON lines (`{"tokens": [...], "ner_tags":
//! [...]}`) or from tab-separated BIO files.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NerdaError, Result};

/// Sentences and their per-token labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    sentences: Vec<Vec<String>>,
    tags: Vec<Vec<String>>,
}

/// One line of a JSON lines dataset.
#[derive(Deserialize)]
struct JsonSample {
    tokens: Vec<String>,
    ner_tags: Vec<String>,
}

impl Dataset {
    /// Build a dataset, checking that every sentence has exactly one tag per
    /// token.
    pub fn new(sentences: Vec<Vec<String>>, tags: Vec<Vec<String>>) -> Result<Self> {
        if sentences.len() != tags.len() {
            return Err(NerdaError::MisalignedExample {
                index: sentences.len().min(tags.len()),
                tokens: sentences.len(),
                tags: tags.len(),
            });
        }

        for (index, (sentence, labels)) in sentences.iter().zip(&tags).enumerate() {
            if sentence.len() != labels.len() {
                return Err(NerdaError::MisalignedExample {
                    index,
                    tokens: sentence.len(),
                    tags: labels.len(),
                });
            }
        }

        Ok(Self { sentences, tags })
    }

    /// Load a dataset, choosing the format from the file extension.
    ///
    /// `.jsonl` files are read with [`Dataset::from_jsonl`], anything else
    /// with [`Dataset::from_bio_file`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jsonl") => Self::from_jsonl(path),
            _ => Self::from_bio_file(path),
        }
    }

    /// Load a JSON lines dataset with `tokens` and `ner_tags` fields.
    pub fn from_jsonl<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);

        let mut sentences = Vec::new();
        let mut tags = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let sample: JsonSample = serde_json::from_str(&line)?;
            sentences.push(sample.tokens);
            tags.push(sample.ner_tags);
        }

        Self::new(sentences, tags)
    }

    /// Load a tab-separated BIO file.
    ///
    /// Each non-empty line is `token<TAB>label`; blank lines separate
    /// sentences and lines starting with `#` are comments.
    pub fn from_bio_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);

        let mut sentences = Vec::new();
        let mut tags = Vec::new();
        let mut current_tokens = Vec::new();
        let mut current_tags = Vec::new();

        for line in reader.lines() {
            let line = line?;
            let line = line.trim_end();

            if line.trim().is_empty() {
                if !current_tokens.is_empty() {
                    sentences.push(std::mem::take(&mut current_tokens));
                    tags.push(std::mem::take(&mut current_tags));
                }
                continue;
            }

            if line.starts_with('#') {
                continue;
            }

            if let Some((token, label)) = line.split_once('\t') {
                current_tokens.push(token.to_string());
                current_tags.push(label.trim().to_string());
            } else {
                tracing::debug!(line, "skipping line without a tab-separated label");
            }
        }

        if !current_tokens.is_empty() {
            sentences.push(current_tokens);
            tags.push(current_tags);
        }

        Self::new(sentences, tags)
    }

    /// Number of sentences.
    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn sentences(&self) -> &[Vec<String>] {
        &self.sentences
    }

    pub fn tags(&self) -> &[Vec<String>] {
        &self.tags
    }

    /// Iterate over `(tokens, tags)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&[String], &[String])> {
        self.sentences
            .iter()
            .zip(&self.tags)
            .map(|(s, t)| (s.as_slice(), t.as_slice()))
    }
}
