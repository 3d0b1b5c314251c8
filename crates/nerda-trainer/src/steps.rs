//! One full training or validation pass over a data loader.

use candle_core::{D, Tensor};
use nerda_core::{NerdaError, Result};
use oorandom::Rand32;

use crate::data::{Batch, DataLoader};
use crate::model::TokenClassifier;
use crate::optim::GroupedAdamW;
use crate::schedule::LinearWarmupSchedule;

/// The per-epoch passes driven by the training loop.
pub trait EpochSteps<N> {
    /// Run one pass over the training data, updating `network`, and return
    /// the mean batch loss.
    fn train_epoch(&mut self, network: &mut N) -> Result<f32>;

    /// Run one pass over the validation data without updating `network`,
    /// and return the mean batch loss.
    fn validate_epoch(&mut self, network: &N) -> Result<f32>;
}

/// Cross-entropy over the positions with attention mask 1.
pub fn masked_cross_entropy(logits: &Tensor, batch: &Batch) -> Result<Tensor> {
    let n_tags = logits.dim(D::Minus1)?;
    let logits = logits
        .reshape(((), n_tags))?
        .index_select(&batch.active_positions, 0)?;
    let targets = batch
        .target_tags
        .flatten_all()?
        .index_select(&batch.active_positions, 0)?;
    Ok(candle_nn::loss::cross_entropy(&logits, &targets)?)
}

fn mean_loss(total: f32, batches: usize) -> Result<f32> {
    if batches == 0 {
        return Err(NerdaError::EmptyDataset(
            "data loader produced no batches".into(),
        ));
    }
    Ok(total / batches as f32)
}

/// Forward with dropout, backpropagate, and step optimizer and schedule
/// once per batch.
pub fn train_epoch<N: TokenClassifier>(
    network: &mut N,
    loader: &mut DataLoader,
    optimizer: &mut GroupedAdamW,
    scheduler: &mut LinearWarmupSchedule,
    dropout: &mut Rand32,
) -> Result<f32> {
    let mut total = 0.0f32;
    let mut batches = 0usize;

    for batch in loader.batches() {
        let batch = batch?;
        let logits = network.forward(&batch, Some(&mut *dropout))?;
        let loss = masked_cross_entropy(&logits, &batch)?;

        optimizer.backward_step(&loss)?;
        scheduler.step(optimizer);

        let value = loss.to_scalar::<f32>()?;
        tracing::trace!(
            batch = batches,
            loss = value,
            lr = optimizer.learning_rate(),
            "training batch"
        );
        total += value;
        batches += 1;
    }

    mean_loss(total, batches)
}

/// Forward without dropout and average the loss; parameters are untouched.
pub fn validate_epoch<N: TokenClassifier>(network: &N, loader: &mut DataLoader) -> Result<f32> {
    let mut total = 0.0f32;
    let mut batches = 0usize;

    for batch in loader.batches() {
        let batch = batch?;
        let logits = network.forward(&batch, None)?;
        total += masked_cross_entropy(&logits, &batch)?.to_scalar::<f32>()?;
        batches += 1;
    }

    mean_loss(total, batches)
}

/// Loaders, optimizer, schedule and dropout stream of one fine-tuning run.
pub struct TokenClassificationSteps {
    train_loader: DataLoader,
    valid_loader: DataLoader,
    optimizer: GroupedAdamW,
    scheduler: LinearWarmupSchedule,
    dropout: Rand32,
}

impl TokenClassificationSteps {
    pub fn new(
        train_loader: DataLoader,
        valid_loader: DataLoader,
        optimizer: GroupedAdamW,
        scheduler: LinearWarmupSchedule,
        dropout: Rand32,
    ) -> Self {
        Self {
            train_loader,
            valid_loader,
            optimizer,
            scheduler,
            dropout,
        }
    }

    pub fn optimizer(&self) -> &GroupedAdamW {
        &self.optimizer
    }

    pub fn scheduler(&self) -> &LinearWarmupSchedule {
        &self.scheduler
    }
}

impl<N: TokenClassifier> EpochSteps<N> for TokenClassificationSteps {
    fn train_epoch(&mut self, network: &mut N) -> Result<f32> {
        train_epoch(
            network,
            &mut self.train_loader,
            &mut self.optimizer,
            &mut self.scheduler,
            &mut self.dropout,
        )
    }

    fn validate_epoch(&mut self, network: &N) -> Result<f32> {
        validate_epoch(network, &mut self.valid_loader)
    }
}
