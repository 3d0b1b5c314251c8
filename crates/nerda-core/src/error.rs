use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while preparing data for, running, or using a
/// fine-tuned NER model.
#[derive(Debug, Error)]
pub enum NerdaError {
    /// A sentence and its tag sequence have different lengths.
    #[error("example {index} has {tokens} tokens but {tags} tags")]
    MisalignedExample {
        /// Position of the offending example in its dataset.
        index: usize,
        /// Number of tokens in the sentence.
        tokens: usize,
        /// Number of tags attached to the sentence.
        tags: usize,
    },

    /// A sentence was encoded with a tag id list of a different length.
    #[error("sentence has {words} words but {tag_ids} tag ids")]
    TagCountMismatch {
        /// Number of words in the sentence.
        words: usize,
        /// Number of tag ids supplied for it.
        tag_ids: usize,
    },

    /// A dataset had no examples where at least one is required.
    #[error("dataset is empty: {0}")]
    EmptyDataset(String),

    /// A label was not seen when the tag encoder was fitted.
    #[error("unknown tag {0:?}")]
    UnknownTag(String),

    /// An id outside `[0, n_tags)` was passed to the tag encoder.
    #[error("tag id {id} is out of range for {n_tags} tags")]
    UnknownTagId {
        /// The offending id.
        id: u32,
        /// Number of tags known to the encoder.
        n_tags: usize,
    },

    /// A hyperparameter or path in the training configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Pretrained weights, config or tokenizer files could not be loaded.
    #[error("failed to load model from {path:?}: {reason}")]
    ModelLoad {
        /// File or directory that failed.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The tokenizer rejected its input or is missing special tokens.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// A parameter snapshot does not match the network it is restored into.
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// Candle tensor framework error.
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Filesystem or stream error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for NERDA operations.
pub type Result<T> = std::result::Result<T, NerdaError>;
