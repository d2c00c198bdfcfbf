use anyhow::{Result, anyhow, bail};
use burn::module::AutodiffModule;
use burn::nn::Embedding;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Tensor, TensorData, activation};

use crate::decode::ensemble_greedy_decode;
use crate::lm::{CharLanguageModel, next_symbol_log_probs};
use crate::vocab::BoundarySymbols;

use super::config::Seq2SeqConfig;
use super::encoder::Encoding;
use super::loss::{epsilon_index, fuse_with_lm, gate_index, pick_neg_log_prob, softplus_tensor};
use super::params::{MorphView, Seq2SeqParams};
use super::state::DecoderSession;

/// Encoder-decoder model over characters, conditioned on a morphology
/// category. Which parameter groups are shared across categories is decided
/// by `config.variant`.
#[derive(Debug, Clone)]
pub struct MorphSeq2Seq<B: Backend> {
    config: Seq2SeqConfig,
    pub(crate) params: Seq2SeqParams<B>,
    device: B::Device,
}

impl<B: Backend> MorphSeq2Seq<B> {
    pub fn new(config: Seq2SeqConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;
        let params = Seq2SeqParams::init(&config, device);
        Ok(Self {
            config,
            params,
            device: device.clone(),
        })
    }

    pub(crate) fn from_parts(
        config: Seq2SeqConfig,
        params: Seq2SeqParams<B>,
        device: &B::Device,
    ) -> Self {
        Self {
            config,
            params,
            device: device.clone(),
        }
    }

    pub fn config(&self) -> &Seq2SeqConfig {
        &self.config
    }

    pub fn params(&self) -> &Seq2SeqParams<B> {
        &self.params
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    fn check_symbols(&self, symbols: &[u32], what: &str) -> Result<()> {
        if let Some(&bad) = symbols
            .iter()
            .find(|&&id| id as usize >= self.config.vocab_len)
        {
            bail!(
                "{what} symbol {bad} outside vocabulary of {}",
                self.config.vocab_len
            );
        }
        Ok(())
    }

    pub(crate) fn check_lm(&self, lm: Option<&dyn CharLanguageModel>) -> Result<()> {
        if let Some(lm) = lm
            && lm.vocab_len() != self.config.vocab_len
        {
            bail!(
                "language model covers {} symbols but the model vocabulary has {}",
                lm.vocab_len(),
                self.config.vocab_len
            );
        }
        Ok(())
    }

    fn lookup(&self, table: &Embedding<B>, id: usize) -> Tensor<B, 2> {
        table.weight.val().slice_dim(0, id..id + 1)
    }

    /// Runs the bidirectional encoder and the category's encoding transform.
    pub fn encode(&self, morph_id: usize, input: &[u32]) -> Result<Encoding<B>> {
        let view = self.params.view(morph_id)?;
        self.encode_with(&view, input)
    }

    fn encode_with(&self, view: &MorphView<'_, B>, input: &[u32]) -> Result<Encoding<B>> {
        if input.is_empty() {
            bail!("cannot encode an empty input sequence");
        }
        self.check_symbols(input, "input")?;

        let embedded: Vec<Tensor<B, 2>> = input
            .iter()
            .map(|&id| self.lookup(view.char_vecs, id as usize))
            .collect();
        let keep_positions = view.compress_hidden.is_some();
        let raw = view.encoder.encode(&embedded, keep_positions, &self.device)?;

        let conditioning = view.transform_encoded.forward(raw.summary.clone());
        let memory = view.compress_hidden.map(|compress| {
            let positions = Tensor::cat(raw.positions, 0);
            compress.forward(positions)
        });

        Ok(Encoding {
            summary: raw.summary,
            conditioning,
            memory,
        })
    }

    /// Encodes `input` and returns a session positioned before the first
    /// decoder step.
    pub fn start_decoding(&self, morph_id: usize, input: &[u32]) -> Result<DecoderSession<B>> {
        let view = self.params.view(morph_id)?;
        let encoding = self.encode_with(&view, input)?;
        Ok(DecoderSession {
            morph_id,
            input: input.to_vec(),
            encoding,
            state: view.decoder.start_sequence(&self.device),
            position: 1,
        })
    }

    fn conditioning(&self, session: &DecoderSession<B>) -> Tensor<B, 2> {
        let base = session.encoding.conditioning.clone();
        let Some(memory) = session.encoding.memory.clone() else {
            return base;
        };
        let query = session
            .state
            .top_hidden()
            .unwrap_or_else(|| Tensor::zeros([1, self.config.hidden_len], &self.device));
        // [positions, 1]: one score per encoder position.
        let scores = memory.clone().matmul(query.transpose());
        let weights = activation::softmax(scores, 0);
        base + weights.transpose().matmul(memory)
    }

    /// Feeds `prev` into the decoder and returns the next-symbol
    /// log-probabilities `[1, vocab_len]`. When the model is LM-fused,
    /// `lm_log_probs` must hold the language model's next-symbol scores.
    pub fn step(
        &self,
        session: &mut DecoderSession<B>,
        prev: u32,
        lm_log_probs: Option<&[f32]>,
    ) -> Result<Tensor<B, 2>> {
        let view = self.params.view(session.morph_id)?;
        self.check_symbols(&[prev], "previous")?;

        let position = session.position;
        let aligned = match epsilon_index(position, session.input.len(), self.config.max_eps) {
            None => self.lookup(view.char_vecs, session.input[position] as usize),
            Some(slot) => self.lookup(view.eps_vecs, slot),
        };
        let decoder_input = Tensor::cat(
            vec![
                self.conditioning(session),
                self.lookup(view.char_vecs, prev as usize),
                aligned,
            ],
            1,
        );

        let hidden = view.decoder.step(decoder_input, &mut session.state)?;
        let tm_log_probs = activation::log_softmax(view.hidden_to_output.forward(hidden), 1);
        session.position += 1;

        let log_probs = match (view.lm_pos_weights, lm_log_probs) {
            (Some(gates), Some(lm_values)) => {
                if lm_values.len() != self.config.vocab_len {
                    bail!(
                        "language model distribution has {} entries, expected {}",
                        lm_values.len(),
                        self.config.vocab_len
                    );
                }
                let lm_tensor = Tensor::<B, 2>::from_data(
                    TensorData::new(lm_values.to_vec(), [1, lm_values.len()]),
                    &self.device,
                );
                let row = gate_index(position, self.config.max_lm_pos_weights);
                let gate = gates.val().slice_dim(0, row..row + 1);
                fuse_with_lm(tm_log_probs, lm_tensor, gate)
            }
            (Some(_), None) => bail!("language-model fused model requires a language model"),
            (None, _) => tm_log_probs,
        };
        Ok(log_probs)
    }

    /// Teacher-forced loss of `target` given `input`, summed over every
    /// predicted position. `target` starts with `<s>` and ends with `</s>`.
    pub fn loss(
        &self,
        morph_id: usize,
        input: &[u32],
        target: &[u32],
        lm: Option<&dyn CharLanguageModel>,
    ) -> Result<Tensor<B, 1>> {
        if target.len() < 2 {
            bail!(
                "target must hold at least the start and end symbols, got {} symbols",
                target.len()
            );
        }
        self.check_symbols(target, "target")?;
        self.check_lm(lm)?;
        if self.config.variant.lm_fused && lm.is_none() {
            bail!("language-model fused model requires a language model");
        }

        let mut session = self.start_decoding(morph_id, input)?;
        let mut losses = Vec::with_capacity(target.len() - 1);
        // The final symbol is only predicted, never fed.
        for idx in 0..target.len() - 1 {
            let lm_values = match lm {
                Some(lm) if self.config.variant.lm_fused => {
                    Some(next_symbol_log_probs(lm, &target[..=idx]))
                }
                _ => None,
            };
            let log_probs = self.step(&mut session, target[idx], lm_values.as_deref())?;
            losses.push(pick_neg_log_prob(log_probs, target[idx + 1] as usize));
        }

        Ok(Tensor::cat(losses, 0).sum())
    }

    /// Greedy decode with this model alone.
    pub fn decode(
        &self,
        morph_id: usize,
        input: &[u32],
        symbols: BoundarySymbols,
        lm: Option<&dyn CharLanguageModel>,
    ) -> Result<Vec<u32>> {
        ensemble_greedy_decode(&[self], morph_id, input, symbols, lm)
    }

    /// Softplus-transformed language-model gates for a category, if the
    /// model is LM-fused.
    pub fn lm_gate_weights(&self, morph_id: usize) -> Result<Option<Vec<f32>>> {
        let view = self.params.view(morph_id)?;
        let Some(gates) = view.lm_pos_weights else {
            return Ok(None);
        };
        let raw = softplus_tensor(gates.val())
            .to_data()
            .convert::<f32>()
            .into_vec::<f32>()
            .map_err(|err| anyhow!("{err:?}"))?;
        Ok(Some(raw))
    }
}

impl<B: AutodiffBackend> MorphSeq2Seq<B> {
    /// Copy of the model on the inner backend, without autodiff tracking.
    pub fn valid(&self) -> MorphSeq2Seq<B::InnerBackend> {
        MorphSeq2Seq {
            config: self.config.clone(),
            params: self.params.valid(),
            device: self.device.clone(),
        }
    }
}

/// Reads a one-element tensor back to the host.
pub fn scalar_value<B: Backend>(tensor: Tensor<B, 1>) -> Result<f32> {
    tensor
        .to_data()
        .convert::<f32>()
        .into_vec::<f32>()
        .map_err(|err| anyhow!("{err:?}"))?
        .first()
        .copied()
        .ok_or_else(|| anyhow!("expected a scalar tensor"))
}
