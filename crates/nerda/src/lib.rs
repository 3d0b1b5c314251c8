//! # NERDA
//!
//! Fine-tune pretrained transformer encoders for named-entity recognition.
//!
//! This crate re-exports the data types of [`nerda_core`] and the training
//! loop of [`nerda_trainer`].

pub use nerda_core::*;
pub use nerda_trainer::{
    Batch, DataLoader, DataReader, EpochSteps, GroupedAdamW, LinearWarmupSchedule,
    ModelAssets, NerNetwork, Network, ParamGroup, RngStream, Seeder, StateDict, Tagger,
    TokenClassificationSteps, TokenClassifier, TrainingConfig, TrainingRun, create_dataloader,
    load_tokenizer, parameter_groups, run_epochs, total_training_steps, train_model,
};

