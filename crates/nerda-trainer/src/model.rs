//! Trainable networks for token classification.
//!
//! [`Network`] is what the training loop needs from a model: its named
//! parameters, a deep snapshot of their values, and restoration from such a
//! snapshot. [`TokenClassifier`] adds the forward pass used by the step
//! functions. [`NerNetwork`] is the BERT encoder + dropout + linear head.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{Linear, Module, VarBuilder, VarMap};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use nerda_core::{NerdaError, Result};
use oorandom::Rand32;
use serde::Deserialize;

use crate::data::Batch;
use crate::seed::{RngStream, Seeder};

/// Prefix of the classification head parameters.
pub const HEAD_PREFIX: &str = "classifier.";

/// Independent copies of every parameter of a network, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct StateDict {
    tensors: BTreeMap<String, Tensor>,
}

impl StateDict {
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }
}

/// A collection of trainable parameters.
pub trait Network {
    /// Parameters sorted by name.
    fn named_parameters(&self) -> Vec<(String, Var)>;

    /// Deep copy of every parameter. Later updates to the network do not
    /// reach the returned snapshot.
    fn state_dict(&self) -> Result<StateDict> {
        let mut tensors = BTreeMap::new();
        for (name, var) in self.named_parameters() {
            tensors.insert(name, var.as_tensor().copy()?);
        }
        Ok(StateDict { tensors })
    }

    /// Overwrite every parameter with the value stored in `state`.
    fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        let params = self.named_parameters();
        if params.len() != state.len() {
            return Err(NerdaError::Snapshot(format!(
                "snapshot holds {} parameters, network has {}",
                state.len(),
                params.len()
            )));
        }

        for (name, var) in &params {
            let tensor = state.get(name).ok_or_else(|| {
                NerdaError::Snapshot(format!("snapshot has no parameter {name}"))
            })?;
            var.set(tensor)?;
        }
        Ok(())
    }
}

impl Network for VarMap {
    fn named_parameters(&self) -> Vec<(String, Var)> {
        let data = match self.data().lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut params: Vec<(String, Var)> = data
            .iter()
            .map(|(name, var)| (name.clone(), var.clone()))
            .collect();
        params.sort_by(|a, b| a.0.cmp(&b.0));
        params
    }
}

/// A network that scores every position of a batch against every tag.
pub trait TokenClassifier: Network {
    fn n_tags(&self) -> usize;

    fn device(&self) -> &Device;

    /// Logits of shape `[batch, max_len, n_tags]`. Dropout is applied only
    /// when a generator is given, i.e. during training.
    fn forward(&self, batch: &Batch, dropout: Option<&mut Rand32>) -> Result<Tensor>;
}

/// Inverted dropout with an explicit generator.
pub fn apply_dropout(xs: &Tensor, p: f32, rng: &mut Rand32) -> Result<Tensor> {
    if p <= 0.0 {
        return Ok(xs.clone());
    }
    let scale = 1.0 / (1.0 - p);
    let mask: Vec<f32> = (0..xs.elem_count())
        .map(|_| if rng.rand_float() < p { 0.0 } else { scale })
        .collect();
    let mask = Tensor::from_vec(mask, xs.dims(), xs.device())?.to_dtype(xs.dtype())?;
    Ok(xs.mul(&mask)?)
}

/// Fill parameters with values drawn uniformly from `[-bound, bound)`.
pub fn init_uniform(params: &[(String, Var)], bound: f32, rng: &mut Rand32) -> Result<()> {
    for (_, var) in params {
        let tensor = var.as_tensor();
        let values: Vec<f32> = (0..tensor.elem_count())
            .map(|_| (rng.rand_float() * 2.0 - 1.0) * bound)
            .collect();
        let init = Tensor::from_vec(values, tensor.dims(), tensor.device())?.to_dtype(tensor.dtype())?;
        var.set(&init)?;
    }
    Ok(())
}

/// Files of a pretrained model directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAssets {
    pub dir: PathBuf,
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

impl ModelAssets {
    /// Locate `model_name` under `models_dir`.
    pub fn resolve<P: AsRef<Path>>(models_dir: P, model_name: &str) -> Result<Self> {
        Self::from_dir(models_dir.as_ref().join(model_name))
    }

    /// Expect `config.json`, `tokenizer.json` and `model.safetensors` in
    /// `dir`.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let assets = Self {
            config: dir.join("config.json"),
            tokenizer: dir.join("tokenizer.json"),
            weights: dir.join("model.safetensors"),
            dir,
        };

        for path in [&assets.config, &assets.tokenizer, &assets.weights] {
            if !path.exists() {
                return Err(NerdaError::ModelLoad {
                    path: path.clone(),
                    reason: "file not found".into(),
                });
            }
        }
        Ok(assets)
    }
}

/// The part of a BERT `config.json` needed to size the head.
#[derive(Deserialize)]
struct EncoderDims {
    hidden_size: usize,
}

/// Map a checkpoint key onto the parameter naming of [`NerNetwork`].
fn normalize_key(key: &str) -> String {
    let key = key.strip_prefix("bert.").unwrap_or(key);
    if let Some(stem) = key.strip_suffix(".gamma") {
        format!("{stem}.weight")
    } else if let Some(stem) = key.strip_suffix(".beta") {
        format!("{stem}.bias")
    } else {
        key.to_string()
    }
}

/// BERT encoder with dropout and a linear tag classifier on top.
pub struct NerNetwork {
    varmap: VarMap,
    encoder: BertModel,
    classifier: Linear,
    hidden_size: usize,
    dropout: f32,
    n_tags: usize,
    device: Device,
}

impl NerNetwork {
    /// Load pretrained encoder weights and initialize a fresh head from the
    /// seeder's init stream.
    pub fn from_pretrained(
        assets: &ModelAssets,
        n_tags: usize,
        dropout: f32,
        device: &Device,
        seeder: &Seeder,
    ) -> Result<Self> {
        let network = Self::from_config_file(&assets.config, n_tags, dropout, device)?;
        network.load_weights(&assets.weights, true)?;
        network.init_head(seeder)?;

        tracing::info!(
            model = %assets.dir.display(),
            n_tags,
            parameters = network.named_parameters().len(),
            "loaded pretrained encoder"
        );
        Ok(network)
    }

    /// Load a network previously written by [`NerNetwork::save`].
    pub fn from_trained<P: AsRef<Path>>(
        config_path: P,
        weights: P,
        n_tags: usize,
        device: &Device,
    ) -> Result<Self> {
        let network = Self::from_config_file(config_path, n_tags, 0.0, device)?;
        network.load_weights(weights.as_ref(), false)?;
        Ok(network)
    }

    fn from_config_file<P: AsRef<Path>>(
        config_path: P,
        n_tags: usize,
        dropout: f32,
        device: &Device,
    ) -> Result<Self> {
        let content = std::fs::read_to_string(config_path)?;
        let config: BertConfig = serde_json::from_str(&content)?;
        let dims: EncoderDims = serde_json::from_str(&content)?;
        Self::build(&config, dims.hidden_size, n_tags, dropout, device)
    }

    /// Create the network with untrained parameters.
    pub fn build(
        config: &BertConfig,
        hidden_size: usize,
        n_tags: usize,
        dropout: f32,
        device: &Device,
    ) -> Result<Self> {
        if n_tags == 0 {
            return Err(NerdaError::InvalidConfig("n_tags must be positive".into()));
        }

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let encoder = BertModel::load(vb.clone(), config)?;
        let classifier = candle_nn::linear(hidden_size, n_tags, vb.pp("classifier"))?;

        Ok(Self {
            varmap,
            encoder,
            classifier,
            hidden_size,
            dropout,
            n_tags,
            device: device.clone(),
        })
    }

    /// Copy checkpoint tensors into matching parameters.
    ///
    /// Every encoder parameter must be present. With `fresh_head` the
    /// classifier is allowed to be absent, as in a plain pretrained
    /// checkpoint.
    fn load_weights(&self, path: &Path, fresh_head: bool) -> Result<()> {
        let tensors: HashMap<String, Tensor> = candle_core::safetensors::load(path, &self.device)
            .map_err(|e| NerdaError::ModelLoad {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .into_iter()
            .map(|(key, tensor)| (normalize_key(&key), tensor))
            .collect();

        let mut missing = Vec::new();
        let mut loaded = 0usize;
        for (name, var) in self.named_parameters() {
            match tensors.get(&name) {
                Some(tensor) => {
                    var.set(&tensor.to_dtype(DType::F32)?)?;
                    loaded += 1;
                }
                None if fresh_head && name.starts_with(HEAD_PREFIX) => {}
                None => missing.push(name),
            }
        }

        if !missing.is_empty() {
            return Err(NerdaError::ModelLoad {
                path: path.to_path_buf(),
                reason: format!(
                    "{} parameters missing from checkpoint, first: {}",
                    missing.len(),
                    missing[0]
                ),
            });
        }

        tracing::debug!(path = %path.display(), loaded, "copied checkpoint tensors");
        Ok(())
    }

    fn init_head(&self, seeder: &Seeder) -> Result<()> {
        let head: Vec<(String, Var)> = self
            .named_parameters()
            .into_iter()
            .filter(|(name, _)| name.starts_with(HEAD_PREFIX))
            .collect();
        let bound = 1.0 / (self.hidden_size as f32).sqrt();
        init_uniform(&head, bound, &mut seeder.rand32(RngStream::Init))
    }

    /// Write all parameters as safetensors.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.varmap.save(path.as_ref())?;
        tracing::info!(path = %path.as_ref().display(), "saved network weights");
        Ok(())
    }
}

impl Network for NerNetwork {
    fn named_parameters(&self) -> Vec<(String, Var)> {
        self.varmap.named_parameters()
    }
}

impl TokenClassifier for NerNetwork {
    fn n_tags(&self) -> usize {
        self.n_tags
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn forward(&self, batch: &Batch, dropout: Option<&mut Rand32>) -> Result<Tensor> {
        let hidden = self.encoder.forward(
            &batch.input_ids,
            &batch.token_type_ids,
            Some(&batch.attention_mask),
        )?;
        let hidden = match dropout {
            Some(rng) => apply_dropout(&hidden, self.dropout, rng)?,
            None => hidden,
        };
        Ok(self.classifier.forward(&hidden)?)
    }
}
