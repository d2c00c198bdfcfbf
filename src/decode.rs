use anyhow::{Result, anyhow, bail};
use burn::tensor::backend::Backend;
use tracing::debug;

use crate::config::DecodeStrategyConfig;
use crate::dataset::{EncodedExample, InflectionRecord};
use crate::lm::{CharLanguageModel, next_symbol_log_probs};
use crate::model::{DecoderSession, MorphSeq2Seq};
use crate::vocab::{BoundarySymbols, SymbolTable};

/// Hard cap on the length of a decoded sequence, `<s>` and `</s>` included.
pub const MAX_PRED_LEN: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DecodeStrategy {
    #[default]
    Greedy,
    Beam {
        width: usize,
    },
}

pub fn resolve_decode_strategy(config: &DecodeStrategyConfig) -> DecodeStrategy {
    match config {
        DecodeStrategyConfig::Greedy => DecodeStrategy::Greedy,
        DecodeStrategyConfig::Beam { width } => DecodeStrategy::Beam {
            width: (*width).max(1),
        },
    }
}

/// A finished or length-capped beam entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Hypothesis {
    pub symbols: Vec<u32>,
    pub score: f32,
}

fn check_members<B: Backend>(
    members: &[&MorphSeq2Seq<B>],
    morph_id: usize,
    lm: Option<&dyn CharLanguageModel>,
) -> Result<()> {
    let Some(first) = members.first() else {
        bail!("ensemble decoding needs at least one model");
    };
    for member in &members[1..] {
        first.config().ensure_same_indexing(member.config())?;
    }
    if morph_id >= first.config().morph_len {
        bail!(
            "morphology id {morph_id} out of range for {} categories",
            first.config().morph_len
        );
    }
    for member in members {
        member.check_lm(lm)?;
        if member.config().variant.lm_fused && lm.is_none() {
            bail!("ensemble contains a language-model fused member but no language model was given");
        }
    }
    Ok(())
}

/// Advances every member by one step on `prev` and returns the mean of
/// their next-symbol log-probabilities.
fn ensemble_step<B: Backend>(
    members: &[&MorphSeq2Seq<B>],
    sessions: &mut [DecoderSession<B>],
    prev: u32,
    lm_log_probs: Option<&[f32]>,
) -> Result<Vec<f32>> {
    let mut total: Vec<f32> = Vec::new();
    for (member, session) in members.iter().zip(sessions.iter_mut()) {
        let lm_values = lm_log_probs.filter(|_| member.config().variant.lm_fused);
        let log_probs = member
            .step(session, prev, lm_values)?
            .to_data()
            .convert::<f32>()
            .into_vec::<f32>()
            .map_err(|err| anyhow!("{err:?}"))?;
        if total.is_empty() {
            total = log_probs;
        } else {
            for (acc, value) in total.iter_mut().zip(log_probs) {
                *acc += value;
            }
        }
    }
    let count = members.len() as f32;
    for value in total.iter_mut() {
        *value /= count;
    }
    Ok(total)
}

/// Index of the largest value; the first one wins ties.
fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &value) in values.iter().enumerate() {
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Top `k` indices by value, ties broken by lower index.
fn top_k(values: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed.truncate(k);
    indexed
}

fn start_sessions<B: Backend>(
    members: &[&MorphSeq2Seq<B>],
    morph_id: usize,
    input: &[u32],
) -> Result<Vec<DecoderSession<B>>> {
    members
        .iter()
        .map(|member| member.start_decoding(morph_id, input))
        .collect()
}

/// Greedy decoding with the averaged log-probabilities of every member.
///
/// The output starts with `<s>` and ends at the first `</s>` or after
/// [`MAX_PRED_LEN`] symbols.
pub fn ensemble_greedy_decode<B: Backend>(
    members: &[&MorphSeq2Seq<B>],
    morph_id: usize,
    input: &[u32],
    symbols: BoundarySymbols,
    lm: Option<&dyn CharLanguageModel>,
) -> Result<Vec<u32>> {
    check_members(members, morph_id, lm)?;
    let mut sessions = start_sessions(members, morph_id, input)?;

    let mut output = vec![symbols.bos];
    let mut prev = symbols.bos;
    while prev != symbols.eos && output.len() < MAX_PRED_LEN {
        let lm_values = lm.map(|lm| next_symbol_log_probs(lm, &output));
        let averaged = ensemble_step(members, &mut sessions, prev, lm_values.as_deref())?;
        prev = argmax(&averaged).ok_or_else(|| anyhow!("empty output distribution"))? as u32;
        output.push(prev);
    }
    Ok(output)
}

struct BeamEntry<B: Backend> {
    symbols: Vec<u32>,
    score: f32,
    sessions: Vec<DecoderSession<B>>,
    finished: bool,
}

/// Beam search over the averaged ensemble distribution.
///
/// Every live hypothesis is expanded with its `width` best symbols; entries
/// ending in `</s>` or reaching [`MAX_PRED_LEN`] are frozen but keep
/// competing on cumulative log-probability. Returns the surviving
/// hypotheses, best first.
pub fn ensemble_beam_decode<B: Backend>(
    members: &[&MorphSeq2Seq<B>],
    morph_id: usize,
    input: &[u32],
    symbols: BoundarySymbols,
    lm: Option<&dyn CharLanguageModel>,
    width: usize,
) -> Result<Vec<Hypothesis>> {
    if width == 0 {
        bail!("beam width must be at least 1");
    }
    check_members(members, morph_id, lm)?;

    let mut beam = vec![BeamEntry {
        symbols: vec![symbols.bos],
        score: 0.0,
        sessions: start_sessions(members, morph_id, input)?,
        finished: symbols.bos == symbols.eos,
    }];

    while beam.iter().any(|entry| !entry.finished) {
        let mut candidates = Vec::with_capacity(beam.len() * width);
        for mut entry in beam {
            if entry.finished {
                candidates.push(entry);
                continue;
            }
            let prev = *entry.symbols.last().unwrap_or(&symbols.bos);
            let lm_values = lm.map(|lm| next_symbol_log_probs(lm, &entry.symbols));
            let averaged =
                ensemble_step(members, &mut entry.sessions, prev, lm_values.as_deref())?;

            for (symbol, log_prob) in top_k(&averaged, width) {
                let mut next_symbols = entry.symbols.clone();
                next_symbols.push(symbol as u32);
                let finished = symbol as u32 == symbols.eos || next_symbols.len() >= MAX_PRED_LEN;
                candidates.push(BeamEntry {
                    symbols: next_symbols,
                    score: entry.score + log_prob,
                    sessions: entry.sessions.clone(),
                    finished,
                });
            }
        }
        // Stable: among equal scores the earlier candidate survives.
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(width);
        beam = candidates;
    }

    debug!(
        "beam search kept {} hypotheses for input of length {}",
        beam.len(),
        input.len()
    );
    Ok(beam
        .into_iter()
        .map(|entry| Hypothesis {
            symbols: entry.symbols,
            score: entry.score,
        })
        .collect())
}

/// Decodes with the configured strategy and returns the best sequence.
pub fn decode_best<B: Backend>(
    members: &[&MorphSeq2Seq<B>],
    morph_id: usize,
    input: &[u32],
    symbols: BoundarySymbols,
    lm: Option<&dyn CharLanguageModel>,
    strategy: DecodeStrategy,
) -> Result<Vec<u32>> {
    match strategy {
        DecodeStrategy::Greedy => ensemble_greedy_decode(members, morph_id, input, symbols, lm),
        DecodeStrategy::Beam { width } => {
            let hypotheses = ensemble_beam_decode(members, morph_id, input, symbols, lm, width)?;
            hypotheses
                .into_iter()
                .next()
                .map(|best| best.symbols)
                .ok_or_else(|| anyhow!("beam search produced no hypotheses"))
        }
    }
}

/// Exact-match accuracy over encoded examples, plus every prediction in
/// corpus order.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    pub correct: usize,
    pub total: usize,
    pub predictions: Vec<Vec<u32>>,
}

impl Evaluation {
    pub fn accuracy(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f32 / self.total as f32
        }
    }

    /// `input|prediction|label` for every record the predictions came from.
    pub fn lines(&self, records: &[InflectionRecord], chars: &SymbolTable) -> Result<Vec<String>> {
        if records.len() != self.predictions.len() {
            bail!(
                "{} records for {} predictions",
                records.len(),
                self.predictions.len()
            );
        }
        records
            .iter()
            .zip(&self.predictions)
            .map(|(record, predicted)| {
                Ok(format!(
                    "{}|{}|{}",
                    record.input,
                    chars.decode(predicted)?,
                    record.label
                ))
            })
            .collect()
    }
}

pub fn evaluate<B: Backend>(
    members: &[&MorphSeq2Seq<B>],
    examples: &[EncodedExample],
    symbols: BoundarySymbols,
    lm: Option<&dyn CharLanguageModel>,
    strategy: DecodeStrategy,
) -> Result<Evaluation> {
    let mut correct = 0;
    let mut predictions = Vec::with_capacity(examples.len());
    for example in examples {
        let predicted = decode_best(
            members,
            example.morph_id,
            &example.input,
            symbols,
            lm,
            strategy,
        )?;
        if predicted == example.target {
            correct += 1;
        }
        predictions.push(predicted);
    }
    Ok(Evaluation {
        correct,
        total: examples.len(),
        predictions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_prefers_first_of_equal_maxima() {
        assert_eq!(argmax(&[0.1, 0.5, 0.5, -1.0]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn top_k_orders_by_value_then_index() {
        let picked = top_k(&[-1.0, -0.5, -0.5, -3.0], 3);
        let indices: Vec<usize> = picked.iter().map(|(idx, _)| *idx).collect();
        assert_eq!(indices, vec![1, 2, 0]);
    }

    #[test]
    fn beam_config_resolves_to_positive_width() {
        let strategy = resolve_decode_strategy(&DecodeStrategyConfig::Beam { width: 0 });
        assert_eq!(strategy, DecodeStrategy::Beam { width: 1 });
    }
}
