use burn::tensor::backend::Backend;
use burn_autodiff::Autodiff;
use burn_inflect::model::{epsilon_index, scalar_value};
use burn_inflect::{ModelVariant, MorphSeq2Seq, Seq2SeqConfig};
use burn_ndarray::NdArray;

type TrainBackend = Autodiff<NdArray<f32>>;
type InferBackend = NdArray<f32>;

const CHAR_LEN: usize = 6;
const HIDDEN_LEN: usize = 10;
const VOCAB_LEN: usize = 9;
const MORPH_LEN: usize = 3;

fn variants() -> [(&'static str, ModelVariant); 5] {
    [
        ("separate", ModelVariant::separate()),
        ("joint", ModelVariant::joint()),
        ("lm_joint", ModelVariant::lm_joint()),
        ("lm_separate", ModelVariant::lm_separate()),
        ("attention", ModelVariant::attention()),
    ]
}

fn build_config(variant: ModelVariant, layers: usize) -> Seq2SeqConfig {
    Seq2SeqConfig::new(CHAR_LEN, HIDDEN_LEN, VOCAB_LEN, layers, MORPH_LEN).with_variant(variant)
}

#[test]
fn encoding_width_is_twice_hidden_for_any_length() {
    let device = <InferBackend as Backend>::Device::default();
    for (name, variant) in variants() {
        for layers in [1, 2] {
            let model = MorphSeq2Seq::<InferBackend>::new(build_config(variant, layers), &device)
                .expect("model");
            for len in [1, 2, 5, 11] {
                let input: Vec<u32> = (0..len).map(|idx| (idx % VOCAB_LEN) as u32).collect();
                let encoding = model.encode(len % MORPH_LEN, &input).expect("encode");
                assert_eq!(encoding.summary.dims(), [1, 2 * HIDDEN_LEN], "{name}");
                assert_eq!(encoding.conditioning.dims(), [1, HIDDEN_LEN], "{name}");
                match &encoding.memory {
                    Some(memory) => {
                        assert!(variant.attention, "{name}");
                        assert_eq!(memory.dims(), [len, HIDDEN_LEN], "{name}");
                    }
                    None => assert!(!variant.attention, "{name}"),
                }
            }
        }
    }
}

#[test]
fn decoder_steps_produce_normalized_distributions() {
    let device = <InferBackend as Backend>::Device::default();
    let lm_values = vec![-(VOCAB_LEN as f32).ln(); VOCAB_LEN];

    for (name, variant) in variants() {
        let model =
            MorphSeq2Seq::<InferBackend>::new(build_config(variant, 2), &device).expect("model");
        let input = [0u32, 3, 4, 1];
        let mut session = model.start_decoding(2, &input).expect("start");
        assert_eq!(session.position, 1);

        // Run past the end of the input so the epsilon slots are used.
        for step in 0..8 {
            let lm = variant.lm_fused.then_some(lm_values.as_slice());
            let log_probs = model.step(&mut session, 2, lm).expect("step");
            assert_eq!(log_probs.dims(), [1, VOCAB_LEN], "{name}");
            let total: f32 = log_probs
                .exp()
                .sum()
                .into_scalar();
            assert!((total - 1.0).abs() < 1e-4, "{name} step {step}: {total}");
        }
        assert_eq!(session.steps_taken(), 8);
        assert_eq!(session.state.steps, 8);
    }
}

#[test]
fn fused_model_refuses_missing_language_model() {
    let device = <InferBackend as Backend>::Device::default();
    let model = MorphSeq2Seq::<InferBackend>::new(build_config(ModelVariant::lm_joint(), 1), &device)
        .expect("model");
    let mut session = model.start_decoding(0, &[0, 2, 1]).expect("start");
    assert!(model.step(&mut session, 0, None).is_err());
    assert!(model.loss(0, &[0, 2, 1], &[0, 2, 1], None).is_err());
}

#[test]
fn epsilon_slots_never_decrease() {
    for input_len in 1..6 {
        let mut last = None;
        for position in 1..30 {
            let slot = epsilon_index(position, input_len, 5);
            assert_eq!(slot.is_some(), position >= input_len);
            if let (Some(prev), Some(slot)) = (last, slot) {
                assert!(slot >= prev);
            }
            if let Some(slot) = slot {
                assert!(slot < 5);
                last = Some(slot);
            }
        }
    }
}

#[test]
fn loss_backpropagates_for_every_variant() {
    let device = <TrainBackend as Backend>::Device::default();
    let lm = UniformLm;

    for (name, variant) in variants() {
        let model =
            MorphSeq2Seq::<TrainBackend>::new(build_config(variant, 1), &device).expect("model");
        let lm_ref = variant
            .lm_fused
            .then_some(&lm as &dyn burn_inflect::CharLanguageModel);
        let loss = model
            .loss(1, &[0, 2, 3, 1], &[0, 2, 3, 4, 1], lm_ref)
            .expect("loss");
        let value = scalar_value(loss.clone()).expect("scalar");
        assert!(value.is_finite() && value > 0.0, "{name}: {value}");
        let _ = loss.backward();
    }
}

#[test]
fn malformed_sequences_are_rejected() {
    let device = <InferBackend as Backend>::Device::default();
    let model = MorphSeq2Seq::<InferBackend>::new(build_config(ModelVariant::joint(), 1), &device)
        .expect("model");

    assert!(model.encode(0, &[]).is_err());
    assert!(model.encode(0, &[0, VOCAB_LEN as u32]).is_err());
    assert!(model.encode(MORPH_LEN, &[0, 1]).is_err());
    assert!(model.loss(0, &[0, 1], &[0], None).is_err());
    assert!(model.loss(0, &[0, 1], &[0, 99, 1], None).is_err());
}

struct UniformLm;

impl burn_inflect::CharLanguageModel for UniformLm {
    fn vocab_len(&self) -> usize {
        VOCAB_LEN
    }

    fn log_prob_seq(&self, sequence: &[u32]) -> f32 {
        -(sequence.len() as f32) * (VOCAB_LEN as f32).ln()
    }
}
