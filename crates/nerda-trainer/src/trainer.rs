//! Training loop for fine-tuning a token classifier.
//!
//! [`train_model`] seeds the run, builds loaders, optimizer and schedule,
//! then hands over to [`run_epochs`], which alternates training and
//! validation passes and keeps a snapshot of the parameters with the lowest
//! validation loss. The network returned holds that snapshot.

use std::io::Write;

use nerda_core::{Dataset, NerdaError, Result, TagEncoder};
use tokenizers::Tokenizer;

use crate::config::TrainingConfig;
use crate::data::create_dataloader;
use crate::model::{Network, StateDict, TokenClassifier};
use crate::optim::{GroupedAdamW, parameter_groups};
use crate::schedule::{LinearWarmupSchedule, total_training_steps};
use crate::seed::{RngStream, Seeder};
use crate::steps::{EpochSteps, TokenClassificationSteps};

/// Outcome of a training run.
#[derive(Debug)]
pub struct TrainingRun<N> {
    /// The network, restored to its best epoch
    pub network: N,
    /// Mean training loss of every epoch, in order
    pub losses: Vec<f32>,
    /// Mean validation loss of every epoch, in order
    pub validation_losses: Vec<f32>,
    /// Zero-based epoch whose parameters were restored; `None` if no
    /// validation loss ever compared below infinity
    pub best_epoch: Option<usize>,
    /// Validation loss of `best_epoch`; stays `f32::INFINITY` when
    /// `best_epoch` is `None`
    pub best_validation_loss: f32,
}

impl<N> TrainingRun<N> {
    /// The trained network and its training-loss trace.
    pub fn into_parts(self) -> (N, Vec<f32>) {
        (self.network, self.losses)
    }
}

/// Run `epochs` training and validation passes and restore the parameters
/// of the epoch with the lowest validation loss.
///
/// Ties keep the earliest epoch. Errors from `steps` are returned as is.
pub fn run_epochs<N, S>(
    mut network: N,
    steps: &mut S,
    epochs: usize,
    progress: &mut dyn Write,
) -> Result<TrainingRun<N>>
where
    N: Network,
    S: EpochSteps<N>,
{
    let mut losses = Vec::with_capacity(epochs);
    let mut validation_losses = Vec::with_capacity(epochs);
    let mut best: Option<(usize, StateDict)> = None;
    let mut best_loss = f32::INFINITY;

    for epoch in 0..epochs {
        writeln!(progress, "\n Epoch {} / {}", epoch + 1, epochs)?;

        let train_loss = steps.train_epoch(&mut network)?;
        losses.push(train_loss);

        let valid_loss = steps.validate_epoch(&network)?;
        validation_losses.push(valid_loss);

        writeln!(
            progress,
            "Train Loss = {train_loss} Valid Loss = {valid_loss}"
        )?;
        tracing::info!(
            epoch = epoch + 1,
            epochs,
            train_loss,
            valid_loss,
            "finished epoch"
        );
        if !train_loss.is_finite() || !valid_loss.is_finite() {
            tracing::warn!(epoch = epoch + 1, train_loss, valid_loss, "non-finite loss");
        }

        if valid_loss < best_loss {
            best = Some((epoch, network.state_dict()?));
            best_loss = valid_loss;
            tracing::debug!(epoch = epoch + 1, valid_loss, "new best parameters");
        }
    }

    let best_epoch = match best {
        Some((epoch, state)) => {
            network.load_state_dict(&state)?;
            tracing::info!(
                best_epoch = epoch + 1,
                best_validation_loss = best_loss,
                "restored best parameters"
            );
            Some(epoch)
        }
        None => {
            if epochs > 0 {
                tracing::warn!("no epoch improved the validation loss, keeping final parameters");
            }
            None
        }
    };

    Ok(TrainingRun {
        network,
        losses,
        validation_losses,
        best_epoch,
        best_validation_loss: best_loss,
    })
}

/// Fine-tune `network` on `training`, selecting the parameters by loss on
/// `validation`.
///
/// `tag_encoder` must be the encoder the network's head was sized for.
pub fn train_model<N: TokenClassifier>(
    network: N,
    tag_encoder: &TagEncoder,
    tokenizer: &Tokenizer,
    training: &Dataset,
    validation: &Dataset,
    config: &TrainingConfig,
    progress: &mut dyn Write,
) -> Result<TrainingRun<N>> {
    config.validate()?;
    if network.n_tags() != tag_encoder.n_tags() {
        return Err(NerdaError::InvalidConfig(format!(
            "network predicts {} tags, encoder has {}",
            network.n_tags(),
            tag_encoder.n_tags()
        )));
    }

    let seeder = Seeder::from_config(config.seed);
    seeder.seed_device(network.device())?;
    tracing::info!(seed = seeder.seed(), "seeded training run");

    let device = network.device().clone();
    let (train_reader, mut train_loader) = create_dataloader(
        training.sentences(),
        training.tags(),
        tokenizer,
        config.max_len,
        config.train_batch_size,
        tag_encoder,
        &device,
    )?;
    if config.shuffle {
        train_loader = train_loader.with_shuffle(seeder.rand64(RngStream::Shuffle));
    }
    let (_, valid_loader) = create_dataloader(
        validation.sentences(),
        validation.tags(),
        tokenizer,
        config.max_len,
        config.validation_batch_size,
        tag_encoder,
        &device,
    )?;

    let groups = parameter_groups(network.named_parameters(), config.custom_weight_decay);
    let mut optimizer = GroupedAdamW::new(groups, config.learning_rate)?;
    let total_steps =
        total_training_steps(train_reader.len(), config.train_batch_size, config.epochs);
    let scheduler = LinearWarmupSchedule::new(&mut optimizer, config.warmup_steps, total_steps);

    tracing::info!(
        training = training.len(),
        validation = validation.len(),
        epochs = config.epochs,
        total_steps,
        warmup_steps = config.warmup_steps,
        learning_rate = config.learning_rate,
        "starting training"
    );

    let mut steps = TokenClassificationSteps::new(
        train_loader,
        valid_loader,
        optimizer,
        scheduler,
        seeder.rand32(RngStream::Dropout),
    );
    run_epochs(network, &mut steps, config.epochs, progress)
}
