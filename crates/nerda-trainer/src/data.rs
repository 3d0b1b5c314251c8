//! Data loading for token classification.
//!
//! Sentences are tokenized word by word, every word piece inherits the tag of
//! its word, and sequences are wrapped in `[CLS] ... [SEP]` and padded to a
//! fixed length. A [`DataLoader`] then serves padded batches as tensors.

use std::path::Path;
use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use nerda_core::{NerdaError, Result, TagEncoder};
use oorandom::Rand64;
use tokenizers::Tokenizer;

use crate::seed::shuffle;

/// Tag id given to special and padding positions.
pub const SPECIAL_TAG_ID: u32 = 0;

/// Ids of the special tokens wrapped around each sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub cls: u32,
    pub sep: u32,
    pub pad: u32,
}

impl SpecialTokens {
    /// Look up `[CLS]`, `[SEP]` and `[PAD]` in the tokenizer vocabulary.
    pub fn from_tokenizer(tokenizer: &Tokenizer) -> Result<Self> {
        let lookup = |token: &str| {
            tokenizer
                .token_to_id(token)
                .ok_or_else(|| NerdaError::Tokenizer(format!("vocabulary has no {token} token")))
        };

        let pad = match tokenizer.get_padding() {
            Some(padding) => padding.pad_id,
            None => lookup("[PAD]")?,
        };

        Ok(Self {
            cls: lookup("[CLS]")?,
            sep: lookup("[SEP]")?,
            pad,
        })
    }
}

/// Load a `tokenizer.json` file.
pub fn load_tokenizer<P: AsRef<Path>>(path: P) -> Result<Tokenizer> {
    let path = path.as_ref();
    Tokenizer::from_file(path).map_err(|e| NerdaError::ModelLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// One sentence as fixed-length model input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSentence {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub target_tags: Vec<u32>,
    /// Position of each word's first piece; `None` for words dropped by
    /// truncation or that produced no pieces.
    pub word_starts: Vec<Option<usize>>,
}

/// Tokenize and pad one sentence.
///
/// `tag_ids`, when given, must hold one id per word. Without tags every
/// position gets [`SPECIAL_TAG_ID`].
pub fn encode_sentence(
    words: &[String],
    tag_ids: Option<&[u32]>,
    tokenizer: &Tokenizer,
    specials: &SpecialTokens,
    max_len: usize,
) -> Result<EncodedSentence> {
    if max_len < 3 {
        return Err(NerdaError::InvalidConfig(format!(
            "max_len must be at least 3, got {max_len}"
        )));
    }
    if let Some(tags) = tag_ids {
        if tags.len() != words.len() {
            return Err(NerdaError::TagCountMismatch {
                words: words.len(),
                tag_ids: tags.len(),
            });
        }
    }

    let budget = max_len - 2;
    let mut input_ids = Vec::with_capacity(max_len);
    let mut target_tags = Vec::with_capacity(max_len);
    let mut word_starts = Vec::with_capacity(words.len());

    input_ids.push(specials.cls);
    target_tags.push(SPECIAL_TAG_ID);

    for (i, word) in words.iter().enumerate() {
        let encoding = tokenizer
            .encode(word.as_str(), false)
            .map_err(|e| NerdaError::Tokenizer(e.to_string()))?;
        // padding configured in tokenizer.json would otherwise add pad ids
        let pieces: Vec<u32> = encoding
            .get_ids()
            .iter()
            .zip(encoding.get_attention_mask())
            .filter(|&(_, &mask)| mask == 1)
            .map(|(&id, _)| id)
            .collect();

        let used = input_ids.len() - 1;
        if pieces.is_empty() || used >= budget {
            word_starts.push(None);
            continue;
        }

        let take = pieces.len().min(budget - used);
        let tag = tag_ids.map_or(SPECIAL_TAG_ID, |tags| tags[i]);

        word_starts.push(Some(input_ids.len()));
        input_ids.extend_from_slice(&pieces[..take]);
        target_tags.extend(std::iter::repeat_n(tag, take));
    }

    input_ids.push(specials.sep);
    target_tags.push(SPECIAL_TAG_ID);

    let mut attention_mask = vec![1u32; input_ids.len()];
    input_ids.resize(max_len, specials.pad);
    target_tags.resize(max_len, SPECIAL_TAG_ID);
    attention_mask.resize(max_len, 0);

    Ok(EncodedSentence {
        input_ids,
        attention_mask,
        target_tags,
        word_starts,
    })
}

/// Encoded examples of one dataset.
#[derive(Debug, Clone)]
pub struct DataReader {
    examples: Vec<EncodedSentence>,
    max_len: usize,
}

impl DataReader {
    /// Encode every sentence with its tags.
    pub fn new(
        sentences: &[Vec<String>],
        tags: &[Vec<String>],
        tokenizer: &Tokenizer,
        max_len: usize,
        tag_encoder: &TagEncoder,
    ) -> Result<Self> {
        if sentences.len() != tags.len() {
            return Err(NerdaError::MisalignedExample {
                index: sentences.len().min(tags.len()),
                tokens: sentences.len(),
                tags: tags.len(),
            });
        }

        let specials = SpecialTokens::from_tokenizer(tokenizer)?;

        let examples = sentences
            .iter()
            .zip(tags)
            .enumerate()
            .map(|(index, (words, labels))| {
                if words.len() != labels.len() {
                    return Err(NerdaError::MisalignedExample {
                        index,
                        tokens: words.len(),
                        tags: labels.len(),
                    });
                }
                let tag_ids = tag_encoder.encode_all(labels)?;
                encode_sentence(words, Some(&tag_ids), tokenizer, &specials, max_len)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { examples, max_len })
    }

    /// Number of examples.
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn get(&self, index: usize) -> Option<&EncodedSentence> {
        self.examples.get(index)
    }
}

/// A padded batch of examples.
///
/// All `[batch, max_len]` tensors are `u32`. `active_positions` lists the
/// flattened indices whose attention mask is 1, which are the positions the
/// loss is computed over.
#[derive(Debug, Clone)]
pub struct Batch {
    pub input_ids: Tensor,
    pub token_type_ids: Tensor,
    pub attention_mask: Tensor,
    pub target_tags: Tensor,
    pub active_positions: Tensor,
    pub size: usize,
}

impl Batch {
    /// Stack encoded sentences of length `max_len` into one batch.
    pub fn from_examples(
        examples: &[&EncodedSentence],
        max_len: usize,
        device: &Device,
    ) -> Result<Self> {
        let size = examples.len();

        let mut input_ids = Vec::with_capacity(size * max_len);
        let mut attention_mask = Vec::with_capacity(size * max_len);
        let mut target_tags = Vec::with_capacity(size * max_len);

        for example in examples {
            if example.input_ids.len() != max_len {
                return Err(NerdaError::InvalidConfig(format!(
                    "example has length {}, batch expects {max_len}",
                    example.input_ids.len()
                )));
            }
            input_ids.extend_from_slice(&example.input_ids);
            attention_mask.extend_from_slice(&example.attention_mask);
            target_tags.extend_from_slice(&example.target_tags);
        }

        let active: Vec<u32> = attention_mask
            .iter()
            .enumerate()
            .filter(|&(_, &m)| m == 1)
            .map(|(pos, _)| pos as u32)
            .collect();
        let active_len = active.len();

        Ok(Self {
            input_ids: Tensor::from_vec(input_ids, (size, max_len), device)?,
            token_type_ids: Tensor::zeros((size, max_len), DType::U32, device)?,
            attention_mask: Tensor::from_vec(attention_mask, (size, max_len), device)?,
            target_tags: Tensor::from_vec(target_tags, (size, max_len), device)?,
            active_positions: Tensor::from_vec(active, active_len, device)?,
            size,
        })
    }
}

/// Serves batches from a [`DataReader`], in order or reshuffled on every
/// pass.
#[derive(Debug, Clone)]
pub struct DataLoader {
    reader: Arc<DataReader>,
    batch_size: usize,
    device: Device,
    order: Vec<usize>,
    shuffle: Option<Rand64>,
}

impl DataLoader {
    pub fn new(reader: Arc<DataReader>, batch_size: usize, device: Device) -> Result<Self> {
        if batch_size == 0 {
            return Err(NerdaError::InvalidConfig(
                "batch size must be greater than zero".into(),
            ));
        }
        let order = (0..reader.len()).collect();
        Ok(Self {
            reader,
            batch_size,
            device,
            order,
            shuffle: None,
        })
    }

    /// Reshuffle example order with `rng` at the start of every pass.
    pub fn with_shuffle(mut self, rng: Rand64) -> Self {
        self.shuffle = Some(rng);
        self
    }

    pub fn reader(&self) -> &DataReader {
        &self.reader
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Batches per pass; the last batch may be partial.
    pub fn num_batches(&self) -> usize {
        self.reader.len().div_ceil(self.batch_size)
    }

    /// Start a new pass over the data.
    pub fn batches(&mut self) -> impl Iterator<Item = Result<Batch>> + '_ {
        if let Some(rng) = self.shuffle.as_mut() {
            shuffle(&mut self.order, rng);
        }
        let this = &*self;
        this.order
            .chunks(this.batch_size)
            .map(move |chunk| this.collate(chunk))
    }

    fn collate(&self, indices: &[usize]) -> Result<Batch> {
        let examples: Vec<&EncodedSentence> = indices
            .iter()
            .map(|&index| &self.reader.examples[index])
            .collect();
        Batch::from_examples(&examples, self.reader.max_len, &self.device)
    }
}

/// Build a reader and loader for one dataset split.
pub fn create_dataloader(
    sentences: &[Vec<String>],
    tags: &[Vec<String>],
    tokenizer: &Tokenizer,
    max_len: usize,
    batch_size: usize,
    tag_encoder: &TagEncoder,
    device: &Device,
) -> Result<(Arc<DataReader>, DataLoader)> {
    if sentences.is_empty() {
        return Err(NerdaError::EmptyDataset(
            "cannot build a data loader without sentences".into(),
        ));
    }

    let reader = Arc::new(DataReader::new(
        sentences,
        tags,
        tokenizer,
        max_len,
        tag_encoder,
    )?);
    let loader = DataLoader::new(Arc::clone(&reader), batch_size, device.clone())?;

    tracing::debug!(
        examples = reader.len(),
        batch_size,
        batches = loader.num_batches(),
        "created data loader"
    );

    Ok((reader, loader))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::{RngStream, Seeder};
    use crate::testing::{sample_dataset, test_tokenizer, words};
    use tokenizers::{PaddingParams, PaddingStrategy};

    #[test]
    fn test_special_tokens_lookup() {
        let tokenizer = test_tokenizer();
        let specials = SpecialTokens::from_tokenizer(&tokenizer).unwrap();
        assert_eq!((specials.pad, specials.cls, specials.sep), (0, 2, 3));
    }

    #[test]
    fn test_encode_sentence_layout() {
        let tokenizer = test_tokenizer();
        let specials = SpecialTokens::from_tokenizer(&tokenizer).unwrap();

        let encoded = encode_sentence(
            &words(&["jens", "bor", "aarhus"]),
            Some(&[1, 2, 0]),
            &tokenizer,
            &specials,
            8,
        )
        .unwrap();

        assert_eq!(encoded.input_ids.len(), 8);
        assert_eq!(encoded.input_ids[0], specials.cls);
        assert_eq!(encoded.input_ids[4], specials.sep);
        assert_eq!(encoded.input_ids[5..], [specials.pad; 3]);
        assert_eq!(encoded.attention_mask, vec![1, 1, 1, 1, 1, 0, 0, 0]);
        assert_eq!(encoded.target_tags, vec![0, 1, 2, 0, 0, 0, 0, 0]);
        assert_eq!(encoded.word_starts, vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn test_encode_sentence_truncates() {
        let tokenizer = test_tokenizer();
        let specials = SpecialTokens::from_tokenizer(&tokenizer).unwrap();

        let encoded = encode_sentence(
            &words(&["jens", "bor", "i", "aarhus"]),
            None,
            &tokenizer,
            &specials,
            4,
        )
        .unwrap();

        assert_eq!(encoded.input_ids.len(), 4);
        assert_eq!(encoded.input_ids[3], specials.sep);
        assert_eq!(encoded.attention_mask, vec![1, 1, 1, 1]);
        assert_eq!(encoded.word_starts, vec![Some(1), Some(2), None, None]);
    }

    #[test]
    fn test_encode_sentence_rejects_misaligned_tags() {
        let tokenizer = test_tokenizer();
        let specials = SpecialTokens::from_tokenizer(&tokenizer).unwrap();
        let err = encode_sentence(&words(&["jens"]), Some(&[0, 1]), &tokenizer, &specials, 8);
        assert!(matches!(
            err,
            Err(NerdaError::TagCountMismatch {
                words: 1,
                tag_ids: 2
            })
        ));
    }

    #[test]
    fn test_encode_sentence_ignores_tokenizer_padding() {
        let mut tokenizer = test_tokenizer();
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::Fixed(6),
            ..PaddingParams::default()
        }));
        let specials = SpecialTokens::from_tokenizer(&tokenizer).unwrap();

        let encoded = encode_sentence(
            &words(&["jens", "bor"]),
            Some(&[1, 2]),
            &tokenizer,
            &specials,
            16,
        )
        .unwrap();

        assert_eq!(encoded.input_ids[..4], [specials.cls, 4, 5, specials.sep]);
        assert_eq!(encoded.input_ids[4..], [specials.pad; 12]);
        assert_eq!(encoded.attention_mask.iter().sum::<u32>(), 4);
        assert_eq!(encoded.target_tags[..4], [0, 1, 2, 0]);
        assert_eq!(encoded.word_starts, vec![Some(1), Some(2)]);
    }

    #[test]
    fn test_create_dataloader_batches() {
        let tokenizer = test_tokenizer();
        let dataset = sample_dataset(10);
        let encoder = TagEncoder::fit_tags(dataset.tags());

        let (reader, mut loader) = create_dataloader(
            dataset.sentences(),
            dataset.tags(),
            &tokenizer,
            8,
            4,
            &encoder,
            &Device::Cpu,
        )
        .unwrap();

        assert_eq!(reader.len(), 10);
        assert_eq!(loader.num_batches(), 3);

        let batches: Vec<Batch> = loader.batches().collect::<Result<_>>().unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].input_ids.dims(), &[4, 8]);
        assert_eq!(batches[2].size, 2);
        assert_eq!(batches[2].target_tags.dims(), &[2, 8]);

        let mask_total: u32 = batches[0]
            .attention_mask
            .flatten_all()
            .unwrap()
            .to_vec1::<u32>()
            .unwrap()
            .iter()
            .sum();
        assert_eq!(batches[0].active_positions.dims(), &[mask_total as usize]);

        // restartable
        assert_eq!(loader.batches().count(), 3);
    }

    #[test]
    fn test_create_dataloader_rejects_bad_input() {
        let tokenizer = test_tokenizer();
        let dataset = sample_dataset(2);
        let encoder = TagEncoder::fit_tags(dataset.tags());

        let empty: Vec<Vec<String>> = Vec::new();
        assert!(matches!(
            create_dataloader(&empty, &empty, &tokenizer, 8, 4, &encoder, &Device::Cpu),
            Err(NerdaError::EmptyDataset(_))
        ));
        assert!(matches!(
            create_dataloader(
                dataset.sentences(),
                dataset.tags(),
                &tokenizer,
                8,
                0,
                &encoder,
                &Device::Cpu
            ),
            Err(NerdaError::InvalidConfig(_))
        ));

        let other = TagEncoder::fit(["O"]);
        assert!(matches!(
            create_dataloader(
                dataset.sentences(),
                dataset.tags(),
                &tokenizer,
                8,
                4,
                &other,
                &Device::Cpu
            ),
            Err(NerdaError::UnknownTag(_))
        ));
    }

    #[test]
    fn test_shuffled_order_is_reproducible() {
        let tokenizer = test_tokenizer();
        let dataset = sample_dataset(6);
        let encoder = TagEncoder::fit_tags(dataset.tags());

        let first_ids = |seed: u64| -> Vec<u32> {
            let (_, loader) = create_dataloader(
                dataset.sentences(),
                dataset.tags(),
                &tokenizer,
                8,
                6,
                &encoder,
                &Device::Cpu,
            )
            .unwrap();
            let mut loader = loader.with_shuffle(Seeder::new(seed).rand64(RngStream::Shuffle));
            let batch = loader.batches().next().unwrap().unwrap();
            batch.input_ids.flatten_all().unwrap().to_vec1::<u32>().unwrap()
        };

        assert_eq!(first_ids(42), first_ids(42));
    }
}
