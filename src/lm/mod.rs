mod ngram;

pub use ngram::{CharNgramLm, NgramConfig};

/// External character language model over the same symbol IDs as the
/// translation model. Consumed read-only.
pub trait CharLanguageModel {
    /// Number of symbols the model can score.
    fn vocab_len(&self) -> usize;

    /// Natural-log probability of `sequence` (without the leading `<s>`).
    fn log_prob_seq(&self, sequence: &[u32]) -> f32;
}

/// Log-probability of every possible next symbol given `prefix`.
///
/// `prefix` starts with `<s>`; the language model scores the sequence with
/// that symbol removed, so each entry is `log P(prefix[1..] + [c])`.
pub fn next_symbol_log_probs(lm: &dyn CharLanguageModel, prefix: &[u32]) -> Vec<f32> {
    let history = prefix.get(1..).unwrap_or_default();
    let mut candidate = Vec::with_capacity(history.len() + 1);
    (0..lm.vocab_len())
        .map(|symbol| {
            candidate.clear();
            candidate.extend_from_slice(history);
            candidate.push(symbol as u32);
            lm.log_prob_seq(&candidate)
        })
        .collect()
}
