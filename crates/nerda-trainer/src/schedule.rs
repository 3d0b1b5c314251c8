//! Linear warmup then linear decay of the learning rate.

use crate::optim::GroupedAdamW;

/// Total optimizer steps of a run: whole training batches per epoch times
/// the epoch count. A trailing partial batch is not counted.
pub fn total_training_steps(num_examples: usize, batch_size: usize, epochs: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    (num_examples / batch_size) * epochs
}

/// Learning-rate schedule that rises linearly from 0 to the base rate over
/// `warmup_steps`, then falls linearly to 0 at `total_steps`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearWarmupSchedule {
    base_lr: f64,
    warmup_steps: usize,
    total_steps: usize,
    step: usize,
}

impl LinearWarmupSchedule {
    /// Create the schedule and set the optimizer to the step-0 rate.
    pub fn new(
        optimizer: &mut GroupedAdamW,
        warmup_steps: usize,
        total_steps: usize,
    ) -> Self {
        let schedule = Self {
            base_lr: optimizer.learning_rate(),
            warmup_steps,
            total_steps,
            step: 0,
        };
        optimizer.set_learning_rate(schedule.current_lr());
        schedule
    }

    /// Multiplier of the base rate at `step`.
    pub fn multiplier(&self, step: usize) -> f64 {
        if step < self.warmup_steps {
            return step as f64 / self.warmup_steps.max(1) as f64;
        }
        let remaining = self.total_steps.saturating_sub(step) as f64;
        let decay_span = self.total_steps.saturating_sub(self.warmup_steps).max(1) as f64;
        (remaining / decay_span).max(0.0)
    }

    pub fn current_step(&self) -> usize {
        self.step
    }

    pub fn current_lr(&self) -> f64 {
        self.base_lr * self.multiplier(self.step)
    }

    pub fn base_lr(&self) -> f64 {
        self.base_lr
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Advance one step and apply the new rate.
    pub fn step(&mut self, optimizer: &mut GroupedAdamW) {
        self.step += 1;
        optimizer.set_learning_rate(self.current_lr());
    }
}
