use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, activation};

/// `log(1 + exp(x))` without overflow for large `x`.
pub fn softplus(x: f32) -> f32 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

/// Tensor form of [`softplus`], written as `-log_sigmoid(-x)` so the
/// gradient is `sigmoid(x)` everywhere, including at zero.
pub fn softplus_tensor<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    activation::log_sigmoid(x.neg()).neg()
}

/// Epsilon slot used when the aligned input position is past the end of the
/// input. Returns `None` while the input still has a symbol at `position`.
pub fn epsilon_index(position: usize, input_len: usize, max_eps: usize) -> Option<usize> {
    if position < input_len {
        None
    } else {
        Some((position - input_len).min(max_eps.saturating_sub(1)))
    }
}

/// Row of the language-model gate table for decoder step `position`
/// (1-based, matching the aligned input position).
pub fn gate_index(position: usize, max_lm_pos_weights: usize) -> usize {
    position.min(max_lm_pos_weights.saturating_sub(1))
}

/// Negative log-probability of `target` under `log_probs` (`[1, vocab]`),
/// returned as a `[1]` tensor.
pub fn pick_neg_log_prob<B: Backend>(log_probs: Tensor<B, 2>, target: usize) -> Tensor<B, 1> {
    log_probs.slice_dim(1, target..target + 1).neg().reshape([1])
}

/// Combines translation-model and language-model scores with a learned,
/// non-negative gate and renormalises.
pub fn fuse_with_lm<B: Backend>(
    tm_log_probs: Tensor<B, 2>,
    lm_log_probs: Tensor<B, 2>,
    gate: Tensor<B, 2>,
) -> Tensor<B, 2> {
    let total = tm_log_probs + lm_log_probs * softplus_tensor(gate);
    activation::log_softmax(total, 1)
}
