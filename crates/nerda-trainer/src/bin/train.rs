//! NERDA command line: fine-tune a pretrained encoder and tag sentences.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use candle_core::Device;
use clap::{Parser, Subcommand};
use nerda_core::{Dataset, TagEncoder};
use nerda_trainer::{
    ModelAssets, NerNetwork, Seeder, Tagger, TrainingConfig, load_tokenizer, train_model,
};
use serde::Serialize;
use tracing::info;

const WEIGHTS_FILE: &str = "model.safetensors";
const ENCODER_FILE: &str = "tag_encoder.json";
const LOSSES_FILE: &str = "losses.json";
const CONFIG_FILE: &str = "training_config.json";

/// CLI arguments
#[derive(Parser)]
#[command(name = "nerda-train")]
#[command(about = "Fine-tune pretrained transformers for named-entity recognition")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fine-tune a pretrained model on a labeled dataset
    Train {
        /// Training data (.jsonl or tab-separated BIO)
        #[arg(long)]
        train: PathBuf,

        /// Validation data used to select the best epoch
        #[arg(long)]
        validation: PathBuf,

        /// JSON file with training hyperparameters
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory holding pretrained models
        #[arg(long, env = "NERDA_MODELS_DIR")]
        models_dir: Option<PathBuf>,

        /// Pretrained model name under the models directory
        #[arg(short, long)]
        model: Option<String>,

        #[arg(short, long)]
        epochs: Option<usize>,

        #[arg(short, long)]
        seed: Option<u64>,

        /// Where to write the trained model
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
    },
    /// Tag a sentence with a trained model
    Predict {
        /// Directory written by `train`
        #[arg(long)]
        model_dir: PathBuf,

        #[arg(long, env = "NERDA_MODELS_DIR")]
        models_dir: Option<PathBuf>,

        #[arg(short, long)]
        model: Option<String>,

        /// Words of the sentence
        #[arg(required = true)]
        words: Vec<String>,
    },
}

#[derive(Serialize)]
struct LossReport<'a> {
    losses: &'a [f32],
    validation_losses: &'a [f32],
    best_epoch: Option<usize>,
    best_validation_loss: f32,
}

fn load_config(path: Option<&Path>) -> Result<TrainingConfig> {
    match path {
        Some(path) => TrainingConfig::from_file(path)
            .with_context(|| format!("failed to read config {}", path.display())),
        None => Ok(TrainingConfig::default()),
    }
}

fn apply_overrides(
    mut config: TrainingConfig,
    models_dir: Option<PathBuf>,
    model: Option<String>,
) -> TrainingConfig {
    if let Some(dir) = models_dir {
        config = config.with_models_dir(dir);
    }
    if let Some(model) = model {
        config = config.with_model(model);
    }
    config
}

#[allow(clippy::too_many_arguments)]
fn train(
    train_path: &Path,
    validation_path: &Path,
    config_path: Option<&Path>,
    models_dir: Option<PathBuf>,
    model: Option<String>,
    epochs: Option<usize>,
    seed: Option<u64>,
    output: &Path,
) -> Result<()> {
    let mut config = apply_overrides(load_config(config_path)?, models_dir, model);
    if let Some(epochs) = epochs {
        config = config.with_epochs(epochs);
    }
    if seed.is_some() {
        config = config.with_seed(seed);
    }

    let training = Dataset::load(train_path)
        .with_context(|| format!("failed to load {}", train_path.display()))?;
    let validation = Dataset::load(validation_path)
        .with_context(|| format!("failed to load {}", validation_path.display()))?;
    let encoder = TagEncoder::fit_tags(training.tags());
    info!(
        training = training.len(),
        validation = validation.len(),
        tags = ?encoder.classes(),
        "loaded datasets"
    );

    let device = Device::cuda_if_available(0)?;
    let assets = ModelAssets::resolve(&config.models_dir, &config.model_name)
        .context("pretrained model not found")?;
    let network = NerNetwork::from_pretrained(
        &assets,
        encoder.n_tags(),
        config.dropout,
        &device,
        &Seeder::from_config(config.seed),
    )?;
    let tokenizer = load_tokenizer(&assets.tokenizer)?;

    let run = train_model(
        network,
        &encoder,
        &tokenizer,
        &training,
        &validation,
        &config,
        &mut std::io::stdout(),
    )?;

    std::fs::create_dir_all(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    run.network.save(output.join(WEIGHTS_FILE))?;
    encoder.save(output.join(ENCODER_FILE))?;
    std::fs::write(output.join(CONFIG_FILE), serde_json::to_string_pretty(&config)?)?;

    let report = LossReport {
        losses: &run.losses,
        validation_losses: &run.validation_losses,
        best_epoch: run.best_epoch,
        best_validation_loss: run.best_validation_loss,
    };
    std::fs::write(output.join(LOSSES_FILE), serde_json::to_string_pretty(&report)?)?;

    info!(output = %output.display(), "training complete");
    Ok(())
}

fn predict(
    model_dir: &Path,
    models_dir: Option<PathBuf>,
    model: Option<String>,
    words: &[String],
) -> Result<()> {
    let saved = model_dir.join(CONFIG_FILE);
    let config = if saved.exists() {
        load_config(Some(&saved))?
    } else {
        TrainingConfig::default()
    };
    let config = apply_overrides(config, models_dir, model);

    let encoder = TagEncoder::load(model_dir.join(ENCODER_FILE))
        .context("failed to load tag encoder")?;
    let assets = ModelAssets::resolve(&config.models_dir, &config.model_name)
        .context("pretrained model not found")?;
    let weights = model_dir.join(WEIGHTS_FILE);

    let device = Device::cuda_if_available(0)?;
    let network =
        NerNetwork::from_trained(assets.config.as_path(), weights.as_path(), encoder.n_tags(), &device)?;
    let tagger = Tagger::new(network, load_tokenizer(&assets.tokenizer)?, encoder, config.max_len)?;

    let tags = tagger.predict(words)?;
    for (word, tag) in words.iter().zip(&tags) {
        println!("{word}\t{tag}");
    }

    let entities = nerda_core::extract_entities(words, &tags);
    if !entities.is_empty() {
        println!();
        for entity in entities {
            println!(
                "{}\t{}\t[{}, {})",
                entity.entity_type, entity.text, entity.start_token, entity.end_token
            );
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Train {
            train: train_path,
            validation,
            config,
            models_dir,
            model,
            epochs,
            seed,
            output,
        } => train(
            &train_path,
            &validation,
            config.as_deref(),
            models_dir,
            model,
            epochs,
            seed,
            &output,
        ),
        Commands::Predict {
            model_dir,
            models_dir,
            model,
            words,
        } => predict(&model_dir, models_dir, model, &words),
    }
}
