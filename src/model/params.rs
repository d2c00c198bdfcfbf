use anyhow::{Result, anyhow};
use burn::module::{Module, Param};
use burn::nn::{Embedding, EmbeddingConfig, Linear, LinearConfig};
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

use super::config::Seq2SeqConfig;
use super::encoder::BiEncoder;
use super::recurrent::StackedLstm;

/// One parameter subset. The shared set and every per-category set use the
/// same type; a component is `Some` exactly in the set that owns it.
#[derive(Module, Debug)]
pub struct ParamSet<B: Backend> {
    pub(crate) char_vecs: Option<Embedding<B>>,
    pub(crate) encoder: Option<BiEncoder<B>>,
    pub(crate) hidden_to_output: Option<Linear<B>>,
    pub(crate) decoder: Option<StackedLstm<B>>,
    pub(crate) eps_vecs: Option<Embedding<B>>,
    pub(crate) compress_hidden: Option<Linear<B>>,
    pub(crate) transform_encoded: Option<Linear<B>>,
    pub(crate) lm_pos_weights: Option<Param<Tensor<B, 2>>>,
}

#[derive(Module, Debug)]
pub struct Seq2SeqParams<B: Backend> {
    pub(crate) shared: ParamSet<B>,
    pub(crate) morphs: Vec<ParamSet<B>>,
}

/// Borrowed view of the components one morphology category computes with.
pub(crate) struct MorphView<'a, B: Backend> {
    pub char_vecs: &'a Embedding<B>,
    pub encoder: &'a BiEncoder<B>,
    pub hidden_to_output: &'a Linear<B>,
    pub decoder: &'a StackedLstm<B>,
    pub eps_vecs: &'a Embedding<B>,
    pub compress_hidden: Option<&'a Linear<B>>,
    pub transform_encoded: &'a Linear<B>,
    pub lm_pos_weights: Option<&'a Param<Tensor<B, 2>>>,
}

impl<B: Backend> ParamSet<B> {
    fn empty() -> Self {
        Self {
            char_vecs: None,
            encoder: None,
            hidden_to_output: None,
            decoder: None,
            eps_vecs: None,
            compress_hidden: None,
            transform_encoded: None,
            lm_pos_weights: None,
        }
    }

    fn init_encoder_side(&mut self, config: &Seq2SeqConfig, device: &B::Device) {
        self.char_vecs = Some(EmbeddingConfig::new(config.vocab_len, config.char_len).init(device));
        self.encoder = Some(BiEncoder::new(
            config.layers,
            config.char_len,
            config.hidden_len,
            device,
        ));
        self.hidden_to_output =
            Some(LinearConfig::new(config.hidden_len, config.vocab_len).init(device));
    }

    fn init_decoder_side(&mut self, config: &Seq2SeqConfig, device: &B::Device) {
        self.decoder = Some(StackedLstm::new(
            config.layers,
            config.decoder_input_len(),
            config.hidden_len,
            device,
        ));
        self.eps_vecs = Some(EmbeddingConfig::new(config.max_eps, config.char_len).init(device));
        if config.variant.attention {
            self.compress_hidden =
                Some(LinearConfig::new(config.encoding_len(), config.hidden_len).init(device));
        }
    }

    fn init_lm_gates(&mut self, config: &Seq2SeqConfig, device: &B::Device) {
        self.lm_pos_weights = Some(Param::from_tensor(Tensor::zeros(
            [config.max_lm_pos_weights, 1],
            device,
        )));
    }
}

impl<B: Backend> Seq2SeqParams<B> {
    /// Allocates every container the variant requires.
    pub fn init(config: &Seq2SeqConfig, device: &B::Device) -> Self {
        let variant = config.variant;
        let mut shared = ParamSet::empty();
        if variant.shared_encoder {
            shared.init_encoder_side(config, device);
        }
        if variant.shared_decoder {
            shared.init_decoder_side(config, device);
        }
        if variant.lm_fused && variant.shared_encoder {
            shared.init_lm_gates(config, device);
        }

        let morphs = (0..config.morph_len)
            .map(|_| {
                let mut set = ParamSet::empty();
                if !variant.shared_encoder {
                    set.init_encoder_side(config, device);
                }
                if !variant.shared_decoder {
                    set.init_decoder_side(config, device);
                }
                if variant.lm_fused && !variant.shared_encoder {
                    set.init_lm_gates(config, device);
                }
                set.transform_encoded =
                    Some(LinearConfig::new(config.encoding_len(), config.hidden_len).init(device));
                set
            })
            .collect();

        Self { shared, morphs }
    }

    pub fn morph_len(&self) -> usize {
        self.morphs.len()
    }

    pub(crate) fn view(&self, morph_id: usize) -> Result<MorphView<'_, B>> {
        let own = self.morphs.get(morph_id).ok_or_else(|| {
            anyhow!(
                "morphology id {morph_id} out of range for {} categories",
                self.morphs.len()
            )
        })?;
        let shared = &self.shared;

        fn pick<'a, T>(own: &'a Option<T>, shared: &'a Option<T>, name: &str) -> Result<&'a T> {
            own.as_ref()
                .or(shared.as_ref())
                .ok_or_else(|| anyhow!("parameter group `{name}` was never allocated"))
        }

        Ok(MorphView {
            char_vecs: pick(&own.char_vecs, &shared.char_vecs, "char_vecs")?,
            encoder: pick(&own.encoder, &shared.encoder, "encoder")?,
            hidden_to_output: pick(&own.hidden_to_output, &shared.hidden_to_output, "hidden_to_output")?,
            decoder: pick(&own.decoder, &shared.decoder, "decoder")?,
            eps_vecs: pick(&own.eps_vecs, &shared.eps_vecs, "eps_vecs")?,
            compress_hidden: own.compress_hidden.as_ref().or(shared.compress_hidden.as_ref()),
            transform_encoded: pick(
                &own.transform_encoded,
                &shared.transform_encoded,
                "transform_encoded",
            )?,
            lm_pos_weights: own.lm_pos_weights.as_ref().or(shared.lm_pos_weights.as_ref()),
        })
    }
}
