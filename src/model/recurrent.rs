use anyhow::{Result, bail};
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, activation};

use super::state::{CellState, RecurrentState};

/// One LSTM layer operating on a single `[1, d]` time step.
#[derive(Module, Debug)]
pub struct LstmCell<B: Backend> {
    gates: Linear<B>,
    hidden_len: usize,
}

impl<B: Backend> LstmCell<B> {
    pub fn new(input_len: usize, hidden_len: usize, device: &B::Device) -> Self {
        let gates = LinearConfig::new(input_len + hidden_len, 4 * hidden_len).init(device);
        Self { gates, hidden_len }
    }

    pub fn step(&self, input: Tensor<B, 2>, state: &CellState<B>) -> CellState<B> {
        let h = self.hidden_len;
        let gates = self
            .gates
            .forward(Tensor::cat(vec![input, state.hidden.clone()], 1));

        let input_gate = activation::sigmoid(gates.clone().slice_dim(1, 0..h));
        let forget_gate = activation::sigmoid(gates.clone().slice_dim(1, h..2 * h));
        let candidate = activation::tanh(gates.clone().slice_dim(1, 2 * h..3 * h));
        let output_gate = activation::sigmoid(gates.slice_dim(1, 3 * h..4 * h));

        let cell = forget_gate * state.cell.clone() + input_gate * candidate;
        let hidden = output_gate * activation::tanh(cell.clone());
        CellState { cell, hidden }
    }
}

/// Stack of LSTM layers; each layer feeds the next and the top layer's
/// hidden state is the output.
#[derive(Module, Debug)]
pub struct StackedLstm<B: Backend> {
    layers: Vec<LstmCell<B>>,
    hidden_len: usize,
}

impl<B: Backend> StackedLstm<B> {
    pub fn new(layers: usize, input_len: usize, hidden_len: usize, device: &B::Device) -> Self {
        let layers = (0..layers)
            .map(|idx| {
                let layer_input = if idx == 0 { input_len } else { hidden_len };
                LstmCell::new(layer_input, hidden_len, device)
            })
            .collect();
        Self { layers, hidden_len }
    }

    pub fn hidden_len(&self) -> usize {
        self.hidden_len
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Zero state for a new sequence.
    pub fn start_sequence(&self, device: &B::Device) -> RecurrentState<B> {
        RecurrentState::zeros(self.layers.len(), self.hidden_len, device)
    }

    /// Advances `state` by one input and returns the top-layer hidden state.
    pub fn step(&self, input: Tensor<B, 2>, state: &mut RecurrentState<B>) -> Result<Tensor<B, 2>> {
        if state.layers.len() != self.layers.len() {
            bail!(
                "recurrent state has {} layers, the stack has {}",
                state.layers.len(),
                self.layers.len()
            );
        }
        let mut current = input;
        for (layer, layer_state) in self.layers.iter().zip(state.layers.iter_mut()) {
            let next = layer.step(current, layer_state);
            current = next.hidden.clone();
            *layer_state = next;
        }
        state.steps += 1;
        Ok(current)
    }
}
