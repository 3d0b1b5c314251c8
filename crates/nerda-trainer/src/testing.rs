//! Fixtures shared by unit tests: an in-memory word-level tokenizer and a
//! tiny Danish NER dataset over its vocabulary.

use std::collections::HashMap;

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{Embedding, Linear, Module, VarBuilder, VarMap};
use nerda_core::{Dataset, Result};
use oorandom::Rand32;
use tokenizers::Tokenizer;
use tokenizers::models::wordlevel::WordLevel;

use crate::data::Batch;
use crate::model::{Network, TokenClassifier, apply_dropout, init_uniform};
use crate::seed::{RngStream, Seeder};

pub const VOCAB: &[&str] = &[
    "[PAD]", "[UNK]", "[CLS]", "[SEP]", "jens", "bor", "i", "aarhus", "mette", "arbejder", "hos",
    "novo", "kbh", "er", "smuk",
];

/// A one-layer BERT `config.json` over [`VOCAB`], small enough to train in
/// a unit test.
pub const TINY_BERT_CONFIG: &str = r#"{
    "vocab_size": 15,
    "hidden_size": 8,
    "num_hidden_layers": 1,
    "num_attention_heads": 2,
    "intermediate_size": 16,
    "hidden_act": "gelu",
    "hidden_dropout_prob": 0.1,
    "max_position_embeddings": 16,
    "type_vocab_size": 2,
    "initializer_range": 0.02,
    "layer_norm_eps": 1e-12,
    "pad_token_id": 0,
    "position_embedding_type": "absolute",
    "use_cache": false,
    "classifier_dropout": null,
    "model_type": "bert"
}"#;

pub fn test_tokenizer() -> Tokenizer {
    let vocab: HashMap<String, u32> = VOCAB
        .iter()
        .enumerate()
        .map(|(id, token)| (token.to_string(), id as u32))
        .collect();

    let model = WordLevel::builder()
        .vocab(vocab)
        .unk_token("[UNK]".to_string())
        .build()
        .unwrap();

    Tokenizer::new(model)
}

pub fn words(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// `n` sentences cycling through a few tagged templates.
pub fn sample_dataset(n: usize) -> Dataset {
    let templates: [(&[&str], &[&str]); 3] = [
        (&["jens", "bor", "i", "aarhus"], &["B-PER", "O", "O", "B-LOC"]),
        (
            &["mette", "arbejder", "hos", "novo"],
            &["B-PER", "O", "O", "B-ORG"],
        ),
        (&["kbh", "er", "smuk"], &["B-LOC", "O", "O"]),
    ];

    let (sentences, tags) = (0..n)
        .map(|i| {
            let (s, t) = templates[i % templates.len()];
            (words(s), words(t))
        })
        .unzip();

    Dataset::new(sentences, tags).unwrap()
}

/// Embedding lookup followed by a linear head: small enough to train on CPU
/// in a unit test.
pub struct EmbeddingTagger {
    varmap: VarMap,
    embedding: Embedding,
    head: Linear,
    n_tags: usize,
    device: Device,
}

impl EmbeddingTagger {
    pub fn new(n_tags: usize, hidden: usize, seed: u64) -> Self {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let embedding = candle_nn::embedding(VOCAB.len(), hidden, vb.pp("embeddings")).unwrap();
        let head = candle_nn::linear(hidden, n_tags, vb.pp("classifier")).unwrap();

        let params = varmap.named_parameters();
        init_uniform(&params, 0.5, &mut Seeder::new(seed).rand32(RngStream::Init)).unwrap();

        Self {
            varmap,
            embedding,
            head,
            n_tags,
            device,
        }
    }

    pub fn param(&self, name: &str) -> Tensor {
        self.varmap
            .named_parameters()
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, var)| var.as_tensor().copy().unwrap())
            .unwrap()
    }
}

impl Network for EmbeddingTagger {
    fn named_parameters(&self) -> Vec<(String, Var)> {
        self.varmap.named_parameters()
    }
}

impl TokenClassifier for EmbeddingTagger {
    fn n_tags(&self) -> usize {
        self.n_tags
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn forward(&self, batch: &Batch, dropout: Option<&mut Rand32>) -> Result<Tensor> {
        let hidden = self.embedding.forward(&batch.input_ids)?;
        let hidden = match dropout {
            Some(rng) => apply_dropout(&hidden, 0.1, rng)?,
            None => hidden,
        };
        Ok(self.head.forward(&hidden)?)
    }
}
