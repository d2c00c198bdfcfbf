use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use tracing::info;

use super::config::Seq2SeqConfig;
use super::params::Seq2SeqParams;
use super::seq2seq::MorphSeq2Seq;

pub const CONFIG_FILE: &str = "config.json";
/// Parameter record stem; the recorder appends its own extension.
pub const PARAMS_FILE: &str = "params";

impl<B: Backend> MorphSeq2Seq<B> {
    /// Writes the fixed hyperparameters and every parameter tensor to `dir`.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create model directory {}", dir.display()))?;

        let config_path = dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(self.config())
            .context("failed to serialize model config")?;
        fs::write(&config_path, json)
            .with_context(|| format!("failed to write {}", config_path.display()))?;

        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        self.params()
            .clone()
            .save_file(dir.join(PARAMS_FILE), &recorder)
            .map_err(|err| anyhow!("failed to write parameters to {}: {err:?}", dir.display()))?;

        info!("saved model to {}", dir.display());
        Ok(())
    }

    /// Rebuilds the parameter containers from the stored hyperparameters,
    /// then restores the tensor values into them.
    pub fn load(dir: impl AsRef<Path>, device: &B::Device) -> Result<Self> {
        let dir = dir.as_ref();
        let config = read_config(dir)?;
        config
            .validate()
            .with_context(|| format!("invalid model config in {}", dir.display()))?;

        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let params = Seq2SeqParams::<B>::init(&config, device)
            .load_file(dir.join(PARAMS_FILE), &recorder, device)
            .map_err(|err| anyhow!("failed to load parameters from {}: {err:?}", dir.display()))?;

        info!("loaded model from {}", dir.display());
        Ok(Self::from_parts(config, params, device))
    }

    /// Like [`MorphSeq2Seq::load`], but refuses a model whose hyperparameters
    /// differ from `expected`.
    pub fn load_expecting(
        dir: impl AsRef<Path>,
        expected: &Seq2SeqConfig,
        device: &B::Device,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        let stored = read_config(dir)?;
        if &stored != expected {
            bail!(
                "model in {} was saved with {stored:?}, expected {expected:?}",
                dir.display()
            );
        }
        Self::load(dir, device)
    }
}

pub fn read_config(dir: &Path) -> Result<Seq2SeqConfig> {
    let path = dir.join(CONFIG_FILE);
    let data = fs::read_to_string(&path)
        .with_context(|| format!("failed to read model config {}", path.display()))?;
    serde_json::from_str(&data)
        .with_context(|| format!("failed to parse model config {}", path.display()))
}
