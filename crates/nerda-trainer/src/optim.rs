//! AdamW over parameter groups with their own weight decay.

use candle_core::backprop::GradStore;
use candle_core::{Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use nerda_core::Result;

/// Name fragments of parameters exempt from weight decay when selective
/// decay is enabled: biases and LayerNorm parameters.
pub const NO_DECAY: [&str; 3] = ["bias", "LayerNorm.bias", "LayerNorm.weight"];

/// Weight decay applied to all other parameters under selective decay.
pub const SELECTIVE_WEIGHT_DECAY: f64 = 0.001;

/// Parameters sharing one weight-decay setting.
#[derive(Debug, Clone)]
pub struct ParamGroup {
    pub names: Vec<String>,
    pub params: Vec<Var>,
    pub weight_decay: f64,
}

/// Check whether `name` matches the no-decay denylist.
pub fn is_no_decay(name: &str) -> bool {
    NO_DECAY.iter().any(|fragment| name.contains(fragment))
}

/// Split named parameters into weight-decay groups.
///
/// Without selective decay there is a single group using the optimizer's
/// default decay. With it, denylisted parameters get decay 0 and everything
/// else [`SELECTIVE_WEIGHT_DECAY`]; the decayed group comes first.
pub fn parameter_groups(named: Vec<(String, Var)>, selective_decay: bool) -> Vec<ParamGroup> {
    if !selective_decay {
        let (names, params) = named.into_iter().unzip();
        return vec![ParamGroup {
            names,
            params,
            weight_decay: ParamsAdamW::default().weight_decay,
        }];
    }

    let (no_decay, decay): (Vec<_>, Vec<_>) =
        named.into_iter().partition(|(name, _)| is_no_decay(name));

    [(decay, SELECTIVE_WEIGHT_DECAY), (no_decay, 0.0)]
        .into_iter()
        .map(|(members, weight_decay)| {
            let (names, params) = members.into_iter().unzip();
            ParamGroup {
                names,
                params,
                weight_decay,
            }
        })
        .collect()
}

/// One AdamW instance per parameter group, stepped together.
pub struct GroupedAdamW {
    groups: Vec<(ParamGroup, AdamW)>,
    learning_rate: f64,
}

impl GroupedAdamW {
    pub fn new(groups: Vec<ParamGroup>, learning_rate: f64) -> Result<Self> {
        let groups = groups
            .into_iter()
            .map(|group| {
                let params = ParamsAdamW {
                    lr: learning_rate,
                    weight_decay: group.weight_decay,
                    ..ParamsAdamW::default()
                };
                let optimizer = AdamW::new(group.params.clone(), params)?;
                Ok((group, optimizer))
            })
            .collect::<Result<Vec<_>>>()?;

        for (group, _) in &groups {
            tracing::debug!(
                parameters = group.names.len(),
                weight_decay = group.weight_decay,
                "optimizer parameter group"
            );
        }

        Ok(Self {
            groups,
            learning_rate,
        })
    }

    /// Backpropagate `loss` and update every group.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let grads = loss.backward()?;
        self.step(&grads)
    }

    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        for (_, optimizer) in &mut self.groups {
            optimizer.step(grads)?;
        }
        Ok(())
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
        for (_, optimizer) in &mut self.groups {
            optimizer.set_learning_rate(lr);
        }
    }

    pub fn groups(&self) -> impl Iterator<Item = &ParamGroup> {
        self.groups.iter().map(|(group, _)| group)
    }
}
