//! Training hyperparameters.

use std::path::{Path, PathBuf};

use nerda_core::{NerdaError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for a fine-tuning run.
///
/// Missing fields in a JSON config file fall back to [`Default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Name of the pretrained model directory under `models_dir`
    pub model_name: String,
    /// Directory holding pretrained models
    pub models_dir: PathBuf,
    /// Maximum sequence length in word pieces, special tokens included
    pub max_len: usize,
    pub train_batch_size: usize,
    pub validation_batch_size: usize,
    pub epochs: usize,
    /// Steps of linear learning-rate warmup
    pub warmup_steps: usize,
    /// Exempt bias and LayerNorm parameters from weight decay
    pub custom_weight_decay: bool,
    pub learning_rate: f64,
    /// Dropout before the classification head
    pub dropout: f32,
    /// Reshuffle the training set every epoch
    pub shuffle: bool,
    /// Seed for every random stream; `None` seeds from the clock
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            model_name: "bert-base-multilingual-uncased".to_string(),
            models_dir: PathBuf::from("models"),
            max_len: 128,
            train_batch_size: 16,
            validation_batch_size: 8,
            epochs: 5,
            warmup_steps: 0,
            custom_weight_decay: false,
            learning_rate: 5e-5,
            dropout: 0.1,
            shuffle: false,
            seed: Some(42),
        }
    }
}

impl TrainingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a JSON config file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.models_dir = dir.into();
        self
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn with_batch_sizes(mut self, train: usize, validation: usize) -> Self {
        self.train_batch_size = train;
        self.validation_batch_size = validation;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_warmup_steps(mut self, steps: usize) -> Self {
        self.warmup_steps = steps;
        self
    }

    pub fn with_custom_weight_decay(mut self, enabled: bool) -> Self {
        self.custom_weight_decay = enabled;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set the head dropout, clamped to `[0, 1)`.
    pub fn with_dropout(mut self, p: f32) -> Self {
        self.dropout = p.clamp(0.0, 0.99);
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Directory of the configured pretrained model.
    pub fn model_dir(&self) -> PathBuf {
        self.models_dir.join(&self.model_name)
    }

    /// Reject values the data loaders or schedule cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.train_batch_size == 0 || self.validation_batch_size == 0 {
            return Err(NerdaError::InvalidConfig(
                "batch sizes must be greater than zero".into(),
            ));
        }
        if self.max_len < 3 {
            return Err(NerdaError::InvalidConfig(format!(
                "max_len must leave room for [CLS], [SEP] and one token, got {}",
                self.max_len
            )));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(NerdaError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(NerdaError::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}
