//! Tagging new sentences with a trained network.

use candle_core::D;
use nerda_core::{Entity, Result, TagEncoder, extract_entities};
use tokenizers::Tokenizer;

use crate::data::{Batch, SpecialTokens, encode_sentence};
use crate::model::TokenClassifier;

/// Label given to words cut off by truncation when the encoder knows it.
pub const OUTSIDE_LABEL: &str = "O";

/// A trained network with the tokenizer and tag encoder it was trained with.
pub struct Tagger<N> {
    network: N,
    tokenizer: Tokenizer,
    specials: SpecialTokens,
    encoder: TagEncoder,
    max_len: usize,
}

impl<N: TokenClassifier> Tagger<N> {
    pub fn new(
        network: N,
        tokenizer: Tokenizer,
        encoder: TagEncoder,
        max_len: usize,
    ) -> Result<Self> {
        let specials = SpecialTokens::from_tokenizer(&tokenizer)?;
        Ok(Self {
            network,
            tokenizer,
            specials,
            encoder,
            max_len,
        })
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn encoder(&self) -> &TagEncoder {
        &self.encoder
    }

    /// One tag per word, read off the first piece of each word.
    pub fn predict(&self, words: &[String]) -> Result<Vec<String>> {
        if words.is_empty() {
            return Ok(Vec::new());
        }

        let encoded = encode_sentence(
            words,
            None,
            &self.tokenizer,
            &self.specials,
            self.max_len,
        )?;
        let batch = Batch::from_examples(&[&encoded], self.max_len, self.network.device())?;
        let best: Vec<u32> = self
            .network
            .forward(&batch, None)?
            .argmax(D::Minus1)?
            .squeeze(0)?
            .to_vec1()?;

        let fallback = self.fallback_label()?;
        encoded
            .word_starts
            .iter()
            .map(|start| match start {
                Some(pos) => Ok(self.encoder.decode(best[*pos])?.to_string()),
                None => Ok(fallback.clone()),
            })
            .collect()
    }

    /// Predict tags and group them into entity spans.
    pub fn predict_entities(&self, words: &[String]) -> Result<Vec<Entity>> {
        let tags = self.predict(words)?;
        Ok(extract_entities(words, &tags))
    }

    fn fallback_label(&self) -> Result<String> {
        if self.encoder.contains(OUTSIDE_LABEL) {
            return Ok(OUTSIDE_LABEL.to_string());
        }
        Ok(self.encoder.decode(0)?.to_string())
    }
}
