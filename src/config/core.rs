use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::model::{DEFAULT_MAX_EPS, DEFAULT_MAX_LM_POS_WEIGHTS, ModelVariant};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ModelHyperparameters {
    pub char_len: usize,
    pub hidden_len: usize,
    #[serde(default = "default_layers")]
    pub layers: usize,
    #[serde(default = "default_max_eps")]
    pub max_eps: usize,
    #[serde(default = "default_max_lm_pos_weights")]
    pub max_lm_pos_weights: usize,
    /// Named variant (`separate`, `joint`, `lm_joint`, `lm_separate`,
    /// `attention`). Takes precedence over `variant`.
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub variant: ModelVariant,
}

impl ModelHyperparameters {
    pub fn resolve_variant(&self) -> Result<ModelVariant> {
        match &self.preset {
            Some(name) => ModelVariant::from_preset(name),
            None => Ok(self.variant),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TrainingHyperparameters {
    pub epochs: usize,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_log_frequency")]
    pub log_frequency: usize,
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct DecodeConfig {
    #[serde(default)]
    pub strategy: DecodeStrategyConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecodeStrategyConfig {
    #[default]
    Greedy,
    Beam {
        #[serde(default = "default_beam_width")]
        width: usize,
    },
}

fn default_layers() -> usize {
    1
}

fn default_max_eps() -> usize {
    DEFAULT_MAX_EPS
}

fn default_max_lm_pos_weights() -> usize {
    DEFAULT_MAX_LM_POS_WEIGHTS
}

fn default_log_frequency() -> usize {
    100
}

fn default_shuffle() -> bool {
    true
}

fn default_beam_width() -> usize {
    2
}
