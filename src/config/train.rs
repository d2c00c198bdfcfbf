use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use toml::{Table, Value};

use super::core::{DecodeConfig, ModelHyperparameters, TrainingHyperparameters};
use crate::lm::NgramConfig;
use crate::model::Seq2SeqConfig;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct OptimizerConfig {
    pub learning_rate: f64,
    #[serde(default)]
    pub weight_decay: f32,
    /// Gradient L2-norm clip applied per parameter before each update.
    #[serde(default)]
    pub grad_clip_norm: Option<f32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ExperimentConfig {
    pub model: ModelHyperparameters,
    pub training: TrainingHyperparameters,
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub decode: DecodeConfig,
    #[serde(default)]
    pub lm: NgramConfig,
}

/// Loads and deep-merges TOML files in order; keys in later files replace
/// keys in earlier ones, tables are merged recursively.
pub fn load_experiment_config(paths: &[PathBuf]) -> Result<ExperimentConfig> {
    if paths.is_empty() {
        bail!("at least one configuration file is required");
    }

    let mut merged = Table::new();
    for path in paths {
        let table = read_table(path)?;
        merge_tables(&mut merged, table);
    }

    Value::Table(merged)
        .try_into()
        .context("failed to deserialize merged configuration")
}

fn read_table(path: &Path) -> Result<Table> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    text.parse::<Table>()
        .with_context(|| format!("failed to parse config {}", path.display()))
}

fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match value {
            Value::Table(incoming) => {
                if let Some(Value::Table(existing)) = base.get_mut(&key) {
                    merge_tables(existing, incoming);
                } else {
                    base.insert(key, Value::Table(incoming));
                }
            }
            other => {
                base.insert(key, other);
            }
        }
    }
}

/// Model hyperparameters for a corpus with `vocab_len` characters and
/// `morph_len` morphology categories.
pub fn build_model_config(
    model: &ModelHyperparameters,
    vocab_len: usize,
    morph_len: usize,
) -> Result<Seq2SeqConfig> {
    let mut config = Seq2SeqConfig::new(
        model.char_len,
        model.hidden_len,
        vocab_len,
        model.layers,
        morph_len,
    )
    .with_variant(model.resolve_variant()?);
    config.max_eps = model.max_eps;
    config.max_lm_pos_weights = model.max_lm_pos_weights;
    config.validate()?;
    Ok(config)
}
