use anyhow::{Result, bail};
use burn::module::Module;
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

use super::recurrent::StackedLstm;

/// Forward and backward LSTMs over the embedded input word.
#[derive(Module, Debug)]
pub struct BiEncoder<B: Backend> {
    forward: StackedLstm<B>,
    backward: StackedLstm<B>,
}

/// Output of the encoder for one word.
#[derive(Debug, Clone)]
pub struct Encoding<B: Backend> {
    /// Final forward and backward hidden states, `[1, 2 * hidden_len]`.
    pub summary: Tensor<B, 2>,
    /// `summary` mapped into decoder space, `[1, hidden_len]`.
    pub conditioning: Tensor<B, 2>,
    /// Compressed per-position encoder states, `[input_len, hidden_len]`.
    /// Only present for attention models.
    pub memory: Option<Tensor<B, 2>>,
}

pub(crate) struct RawEncoding<B: Backend> {
    pub summary: Tensor<B, 2>,
    pub positions: Vec<Tensor<B, 2>>,
}

impl<B: Backend> BiEncoder<B> {
    pub fn new(layers: usize, char_len: usize, hidden_len: usize, device: &B::Device) -> Self {
        Self {
            forward: StackedLstm::new(layers, char_len, hidden_len, device),
            backward: StackedLstm::new(layers, char_len, hidden_len, device),
        }
    }

    /// Runs both directions over `embedded` (each `[1, char_len]`, non-empty).
    /// Per-position states are collected only when `keep_positions` is set.
    pub(crate) fn encode(
        &self,
        embedded: &[Tensor<B, 2>],
        keep_positions: bool,
        device: &B::Device,
    ) -> Result<RawEncoding<B>> {
        if embedded.is_empty() {
            bail!("cannot encode an empty sequence");
        }

        let mut forward_state = self.forward.start_sequence(device);
        let mut forward_states = Vec::with_capacity(embedded.len());
        let mut forward_last = None;
        for vec in embedded {
            let hidden = self.forward.step(vec.clone(), &mut forward_state)?;
            if keep_positions {
                forward_states.push(hidden.clone());
            }
            forward_last = Some(hidden);
        }

        let mut backward_state = self.backward.start_sequence(device);
        let mut backward_states = vec![None; if keep_positions { embedded.len() } else { 0 }];
        let mut backward_last = None;
        for (idx, vec) in embedded.iter().enumerate().rev() {
            let hidden = self.backward.step(vec.clone(), &mut backward_state)?;
            if keep_positions {
                backward_states[idx] = Some(hidden.clone());
            }
            backward_last = Some(hidden);
        }

        let (Some(forward_last), Some(backward_last)) = (forward_last, backward_last) else {
            bail!("encoder produced no hidden states");
        };
        let summary = Tensor::cat(vec![forward_last, backward_last], 1);

        let positions = forward_states
            .into_iter()
            .zip(backward_states)
            .filter_map(|(fwd, bwd)| bwd.map(|bwd| Tensor::cat(vec![fwd, bwd], 1)))
            .collect();

        Ok(RawEncoding { summary, positions })
    }
}
