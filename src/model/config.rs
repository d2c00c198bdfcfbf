use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_EPS: usize = 5;
pub const DEFAULT_MAX_LM_POS_WEIGHTS: usize = 20;

/// Selects which parameter groups are held once for all morphology
/// categories and which are allocated per category.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ModelVariant {
    /// Character embeddings, bidirectional encoder and output projection.
    #[serde(default)]
    pub shared_encoder: bool,
    /// Decoder LSTM, epsilon table and attention compression.
    #[serde(default)]
    pub shared_decoder: bool,
    /// Fuse decoder scores with an external character language model.
    #[serde(default)]
    pub lm_fused: bool,
    /// Attend over every encoder position at each decoder step.
    #[serde(default)]
    pub attention: bool,
}

impl ModelVariant {
    /// Every parameter group is allocated per morphology category.
    pub fn separate() -> Self {
        Self::default()
    }

    /// Everything except the encoding transform is shared.
    pub fn joint() -> Self {
        Self {
            shared_encoder: true,
            shared_decoder: true,
            ..Self::default()
        }
    }

    /// Shared encoder with per-category decoders, fused with a language model.
    pub fn lm_joint() -> Self {
        Self {
            shared_encoder: true,
            lm_fused: true,
            ..Self::default()
        }
    }

    pub fn lm_separate() -> Self {
        Self {
            lm_fused: true,
            ..Self::default()
        }
    }

    pub fn attention() -> Self {
        Self {
            attention: true,
            ..Self::default()
        }
    }

    pub fn from_preset(name: &str) -> Result<Self> {
        let variant = match name {
            "separate" => Self::separate(),
            "joint" => Self::joint(),
            "lm_joint" => Self::lm_joint(),
            "lm_separate" => Self::lm_separate(),
            "attention" => Self::attention(),
            other => bail!(
                "unknown model preset `{other}` (expected separate, joint, lm_joint, lm_separate or attention)"
            ),
        };
        Ok(variant)
    }
}

/// Fixed hyperparameters of a model. They are persisted next to the
/// parameter record and must match the containers the record is loaded into.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Seq2SeqConfig {
    pub char_len: usize,
    pub hidden_len: usize,
    pub vocab_len: usize,
    pub layers: usize,
    pub morph_len: usize,
    #[serde(default = "default_max_eps")]
    pub max_eps: usize,
    #[serde(default = "default_max_lm_pos_weights")]
    pub max_lm_pos_weights: usize,
    #[serde(default)]
    pub variant: ModelVariant,
}

impl Seq2SeqConfig {
    pub fn new(
        char_len: usize,
        hidden_len: usize,
        vocab_len: usize,
        layers: usize,
        morph_len: usize,
    ) -> Self {
        Self {
            char_len,
            hidden_len,
            vocab_len,
            layers,
            morph_len,
            max_eps: DEFAULT_MAX_EPS,
            max_lm_pos_weights: DEFAULT_MAX_LM_POS_WEIGHTS,
            variant: ModelVariant::default(),
        }
    }

    pub fn with_variant(mut self, variant: ModelVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("char_len", self.char_len),
            ("hidden_len", self.hidden_len),
            ("vocab_len", self.vocab_len),
            ("layers", self.layers),
            ("morph_len", self.morph_len),
            ("max_eps", self.max_eps),
            ("max_lm_pos_weights", self.max_lm_pos_weights),
        ];
        for (name, value) in dims {
            if value == 0 {
                bail!("model hyperparameter `{name}` must be positive");
            }
        }
        Ok(())
    }

    /// Width of the concatenated bidirectional encoding.
    pub fn encoding_len(&self) -> usize {
        2 * self.hidden_len
    }

    /// Width of one decoder input vector: conditioning, previous symbol and
    /// aligned input symbol.
    pub fn decoder_input_len(&self) -> usize {
        2 * self.char_len + self.hidden_len
    }

    /// Members of an ensemble only have to agree on symbol and category
    /// indexing; their widths may differ.
    pub fn ensure_same_indexing(&self, other: &Seq2SeqConfig) -> Result<()> {
        if self.vocab_len != other.vocab_len {
            bail!(
                "vocabulary size mismatch: {} vs {}",
                self.vocab_len,
                other.vocab_len
            );
        }
        if self.morph_len != other.morph_len {
            bail!(
                "morphology category count mismatch: {} vs {}",
                self.morph_len,
                other.morph_len
            );
        }
        Ok(())
    }
}

fn default_max_eps() -> usize {
    DEFAULT_MAX_EPS
}

fn default_max_lm_pos_weights() -> usize {
    DEFAULT_MAX_LM_POS_WEIGHTS
}
