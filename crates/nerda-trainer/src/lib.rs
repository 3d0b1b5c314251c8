//! # NERDA Trainer
//!
//! Fine-tuning of pretrained BERT encoders for named-entity recognition on
//! top of candle. A run is seeded from one number, builds word-piece data
//! loaders, an AdamW optimizer with optional selective weight decay and a
//! linear warmup schedule, then trains for a fixed number of epochs and
//! keeps the parameters with the lowest validation loss.
//!
//! ```no_run
//! use nerda_core::{Dataset, TagEncoder};
//! use nerda_trainer::{ModelAssets, NerNetwork, Seeder, TrainingConfig, load_tokenizer, train_model};
//!
//! # fn main() -> nerda_core::Result<()> {
//! let config = TrainingConfig::new().with_epochs(3);
//! let training = Dataset::load("data/train.jsonl")?;
//! let validation = Dataset::load("data/dev.jsonl")?;
//! let encoder = TagEncoder::fit_tags(training.tags());
//!
//! let assets = ModelAssets::resolve(&config.models_dir, &config.model_name)?;
//! let device = candle_core::Device::Cpu;
//! let network = NerNetwork::from_pretrained(
//!     &assets,
//!     encoder.n_tags(),
//!     config.dropout,
//!     &device,
//!     &Seeder::from_config(config.seed),
//! )?;
//!
//! let tokenizer = load_tokenizer(&assets.tokenizer)?;
//! let run = train_model(
//!     network,
//!     &encoder,
//!     &tokenizer,
//!     &training,
//!     &validation,
//!     &config,
//!     &mut std::io::stdout(),
//! )?;
//! println!("training losses: {:?}", run.losses);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod model;
pub mod optim;
pub mod predict;
pub mod schedule;
pub mod seed;
pub mod steps;
pub mod trainer;

#[cfg(test)]
mod testing;

pub use config::TrainingConfig;
pub use data::{Batch, DataLoader, DataReader, create_dataloader, load_tokenizer};
pub use model::{ModelAssets, NerNetwork, Network, StateDict, TokenClassifier};
pub use optim::{GroupedAdamW, ParamGroup, parameter_groups};
pub use predict::Tagger;
pub use schedule::{LinearWarmupSchedule, total_training_steps};
pub use seed::{RngStream, Seeder};
pub use steps::{EpochSteps, TokenClassificationSteps};
pub use trainer::{TrainingRun, run_epochs, train_model};
