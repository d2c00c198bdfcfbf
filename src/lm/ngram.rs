use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::CharLanguageModel;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct NgramConfig {
    #[serde(default = "default_order")]
    pub order: usize,
    #[serde(default = "default_add_k")]
    pub add_k: f32,
}

impl Default for NgramConfig {
    fn default() -> Self {
        Self {
            order: default_order(),
            add_k: default_add_k(),
        }
    }
}

/// Add-k smoothed character n-gram model. Histories shorter than
/// `order - 1` are padded with the start symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct CharNgramLm {
    config: NgramConfig,
    vocab_len: usize,
    bos: u32,
    counts: HashMap<Vec<u32>, ContextCounts>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ContextCounts {
    total: u32,
    next: HashMap<u32, u32>,
}

impl CharNgramLm {
    /// Counts n-grams over `sequences`. Each sequence may start with `<s>`;
    /// a leading start symbol is skipped so training matches scoring.
    pub fn fit<'a, I>(sequences: I, vocab_len: usize, bos: u32, config: NgramConfig) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [u32]>,
    {
        if config.order == 0 {
            bail!("n-gram order must be at least 1");
        }
        if config.add_k <= 0.0 {
            bail!("add-k smoothing constant must be positive");
        }

        let mut lm = Self {
            config,
            vocab_len,
            bos,
            counts: HashMap::new(),
        };
        let mut seen = 0usize;
        for sequence in sequences {
            let body = match sequence.first() {
                Some(&first) if first == bos => &sequence[1..],
                _ => sequence,
            };
            for (idx, &symbol) in body.iter().enumerate() {
                if symbol as usize >= vocab_len {
                    bail!("symbol {symbol} outside vocabulary of {vocab_len}");
                }
                let context = lm.context(&body[..idx]);
                let entry = lm.counts.entry(context).or_default();
                entry.total += 1;
                *entry.next.entry(symbol).or_default() += 1;
            }
            seen += 1;
        }

        info!(
            "fitted {}-gram language model on {seen} sequences ({} contexts)",
            config.order,
            lm.counts.len()
        );
        Ok(lm)
    }

    pub fn order(&self) -> usize {
        self.config.order
    }

    fn context(&self, history: &[u32]) -> Vec<u32> {
        let width = self.config.order - 1;
        let mut context = Vec::with_capacity(width);
        let available = history.len().min(width);
        context.extend(std::iter::repeat_n(self.bos, width - available));
        context.extend_from_slice(&history[history.len() - available..]);
        context
    }

    fn log_prob_next(&self, history: &[u32], symbol: u32) -> f32 {
        let k = self.config.add_k;
        let denom_k = k * self.vocab_len as f32;
        let (count, total) = match self.counts.get(&self.context(history)) {
            Some(entry) => (
                entry.next.get(&symbol).copied().unwrap_or(0) as f32,
                entry.total as f32,
            ),
            None => (0.0, 0.0),
        };
        ((count + k) / (total + denom_k)).ln()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.to_record())
            .context("failed to serialize language model")?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        info!("saved language model to {}", path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read language model {}", path.display()))?;
        let record: NgramRecord = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse language model {}", path.display()))?;
        let lm = Self::from_record(record);
        info!("loaded language model from {}", path.display());
        Ok(lm)
    }

    fn to_record(&self) -> NgramRecord {
        let mut contexts: Vec<ContextRecord> = self
            .counts
            .iter()
            .map(|(context, counts)| {
                let mut next: Vec<(u32, u32)> =
                    counts.next.iter().map(|(&sym, &count)| (sym, count)).collect();
                next.sort_unstable();
                ContextRecord {
                    context: context.clone(),
                    next,
                }
            })
            .collect();
        contexts.sort_by(|a, b| a.context.cmp(&b.context));
        NgramRecord {
            config: self.config,
            vocab_len: self.vocab_len,
            bos: self.bos,
            contexts,
        }
    }

    fn from_record(record: NgramRecord) -> Self {
        let counts = record
            .contexts
            .into_iter()
            .map(|entry| {
                let next: HashMap<u32, u32> = entry.next.into_iter().collect();
                let total = next.values().sum();
                (entry.context, ContextCounts { total, next })
            })
            .collect();
        Self {
            config: record.config,
            vocab_len: record.vocab_len,
            bos: record.bos,
            counts,
        }
    }
}

impl CharLanguageModel for CharNgramLm {
    fn vocab_len(&self) -> usize {
        self.vocab_len
    }

    fn log_prob_seq(&self, sequence: &[u32]) -> f32 {
        sequence
            .iter()
            .enumerate()
            .map(|(idx, &symbol)| self.log_prob_next(&sequence[..idx], symbol))
            .sum()
    }
}

#[derive(Serialize, Deserialize)]
struct NgramRecord {
    config: NgramConfig,
    vocab_len: usize,
    bos: u32,
    contexts: Vec<ContextRecord>,
}

#[derive(Serialize, Deserialize)]
struct ContextRecord {
    context: Vec<u32>,
    next: Vec<(u32, u32)>,
}

fn default_order() -> usize {
    3
}

fn default_add_k() -> f32 {
    0.1
}
