//! # Tag Encoder
//!
//! Bijection between label strings and contiguous ids `[0, n_tags)`.
//! Labels are sorted lexicographically when fitted, so the same label set
//! always produces the same ids.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NerdaError, Result};

/// A fitted label encoder. There are no mutating methods: refit to change
/// the label set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EncoderFile", into = "EncoderFile")]
pub struct TagEncoder {
    classes: Vec<String>,
    index: HashMap<String, u32>,
}

#[derive(Serialize, Deserialize)]
struct EncoderFile {
    classes: Vec<String>,
}

impl From<EncoderFile> for TagEncoder {
    fn from(file: EncoderFile) -> Self {
        Self::fit(file.classes)
    }
}

impl From<TagEncoder> for EncoderFile {
    fn from(encoder: TagEncoder) -> Self {
        Self {
            classes: encoder.classes,
        }
    }
}

impl TagEncoder {
    /// Fit an encoder on every label yielded by `labels`.
    pub fn fit<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let classes: Vec<String> = labels
            .into_iter()
            .map(Into::into)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let index = classes
            .iter()
            .enumerate()
            .map(|(id, label)| (label.clone(), id as u32))
            .collect();

        Self { classes, index }
    }

    /// Fit on all tag sequences of a dataset.
    pub fn fit_tags(tags: &[Vec<String>]) -> Self {
        Self::fit(tags.iter().flatten().cloned())
    }

    /// Number of distinct labels.
    pub fn n_tags(&self) -> usize {
        self.classes.len()
    }

    /// Labels ordered by id.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn contains(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    /// Map a label to its id.
    pub fn encode(&self, label: &str) -> Result<u32> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| NerdaError::UnknownTag(label.to_string()))
    }

    /// Map every label of a sequence to its id.
    pub fn encode_all<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<u32>> {
        labels.iter().map(|l| self.encode(l.as_ref())).collect()
    }

    /// Map an id back to its label.
    pub fn decode(&self, id: u32) -> Result<&str> {
        self.classes
            .get(id as usize)
            .map(String::as_str)
            .ok_or(NerdaError::UnknownTagId {
                id,
                n_tags: self.classes.len(),
            })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_sorts_and_dedups() {
        let encoder = TagEncoder::fit(["O", "B-PER", "O", "I-PER", "B-LOC"]);
        assert_eq!(encoder.n_tags(), 4);
        assert_eq!(encoder.classes(), &["B-LOC", "B-PER", "I-PER", "O"]);
    }

    #[test]
    fn test_encode_decode_bijection() {
        let encoder = TagEncoder::fit(["O", "B-PER", "I-PER"]);
        for (id, label) in encoder.classes().iter().enumerate() {
            assert_eq!(encoder.encode(label).unwrap(), id as u32);
            assert_eq!(encoder.decode(id as u32).unwrap(), label);
        }
    }

    #[test]
    fn test_unknown_label_and_id() {
        let encoder = TagEncoder::fit(["O"]);
        assert!(matches!(
            encoder.encode("B-ORG"),
            Err(NerdaError::UnknownTag(_))
        ));
        assert!(matches!(
            encoder.decode(1),
            Err(NerdaError::UnknownTagId { id: 1, n_tags: 1 })
        ));
    }

    #[test]
    fn test_fit_tags_and_encode_all() {
        let tags = vec![
            vec!["B-PER".to_string(), "O".to_string()],
            vec!["B-LOC".to_string()],
        ];
        let encoder = TagEncoder::fit_tags(&tags);
        assert_eq!(encoder.encode_all(&tags[0]).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_json_roundtrip_keeps_ids() {
        let encoder = TagEncoder::fit(["O", "B-MISC", "I-MISC"]);
        let json = serde_json::to_string(&encoder).unwrap();
        assert!(json.contains("classes"));
        let restored: TagEncoder = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, encoder);
        assert_eq!(restored.encode("O").unwrap(), encoder.encode("O").unwrap());
    }
}
