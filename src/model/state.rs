use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

use super::encoder::Encoding;

#[derive(Debug, Clone)]
pub struct CellState<B: Backend> {
    pub cell: Tensor<B, 2>,
    pub hidden: Tensor<B, 2>,
}

/// Per-sequence state of a stacked LSTM. A fresh value is created for every
/// encoder or decoder pass; it is never stored on the model.
#[derive(Debug, Clone)]
pub struct RecurrentState<B: Backend> {
    pub layers: Vec<CellState<B>>,
    pub steps: usize,
}

impl<B: Backend> RecurrentState<B> {
    pub fn zeros(num_layers: usize, hidden_len: usize, device: &B::Device) -> Self {
        Self {
            layers: (0..num_layers)
                .map(|_| CellState {
                    cell: Tensor::zeros([1, hidden_len], device),
                    hidden: Tensor::zeros([1, hidden_len], device),
                })
                .collect(),
            steps: 0,
        }
    }

    /// Hidden state of the top layer, `[1, hidden_len]`.
    pub fn top_hidden(&self) -> Option<Tensor<B, 2>> {
        self.layers.last().map(|layer| layer.hidden.clone())
    }

    pub fn len(&self) -> usize {
        self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps == 0
    }
}

/// Everything one model needs to decode one input word step by step.
#[derive(Debug, Clone)]
pub struct DecoderSession<B: Backend> {
    pub morph_id: usize,
    pub input: Vec<u32>,
    pub encoding: Encoding<B>,
    pub state: RecurrentState<B>,
    /// Input position aligned with the next decoder step. Starts at 1 since
    /// the first step consumes `<s>`.
    pub position: usize,
}

impl<B: Backend> DecoderSession<B> {
    pub fn steps_taken(&self) -> usize {
        self.position - 1
    }
}
