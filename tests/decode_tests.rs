use std::cell::Cell;

use burn::tensor::backend::Backend;
use burn_inflect::{
    BoundarySymbols, CharLanguageModel, DecodeStrategy, MAX_PRED_LEN, ModelVariant, MorphSeq2Seq,
    Seq2SeqConfig, decode_best, ensemble_beam_decode, ensemble_greedy_decode,
};
use burn_ndarray::NdArray;

type InferBackend = NdArray<f32>;

const SYMBOLS: BoundarySymbols = BoundarySymbols { bos: 0, eos: 1 };
const VOCAB_LEN: usize = 8;

fn model(variant: ModelVariant, seed: u64) -> MorphSeq2Seq<InferBackend> {
    let device = <InferBackend as Backend>::Device::default();
    <InferBackend as Backend>::seed(&device, seed);
    let config = Seq2SeqConfig::new(6, 12, VOCAB_LEN, 1, 2).with_variant(variant);
    MorphSeq2Seq::new(config, &device).expect("model")
}

struct FlatLm;

impl CharLanguageModel for FlatLm {
    fn vocab_len(&self) -> usize {
        VOCAB_LEN
    }

    fn log_prob_seq(&self, sequence: &[u32]) -> f32 {
        sequence
            .iter()
            .map(|&symbol| if symbol == 1 { -0.5 } else { -3.0 })
            .sum()
    }
}

/// Greedy decoding driven directly through `start_decoding`/`step`.
fn stepwise_greedy(model: &MorphSeq2Seq<InferBackend>, morph_id: usize, input: &[u32]) -> Vec<u32> {
    let mut session = model.start_decoding(morph_id, input).expect("start");
    let mut output = vec![SYMBOLS.bos];
    while output.len() < MAX_PRED_LEN {
        let prev = *output.last().expect("non-empty");
        if prev == SYMBOLS.eos {
            break;
        }
        let log_probs = model
            .step(&mut session, prev, None)
            .expect("step")
            .to_data()
            .convert::<f32>()
            .into_vec::<f32>()
            .expect("to vec");
        let mut best = 0;
        for (idx, value) in log_probs.iter().enumerate() {
            if *value > log_probs[best] {
                best = idx;
            }
        }
        output.push(best as u32);
    }
    output
}

/// Never predicts `</s>` and counts how often it is queried.
struct CountingLm {
    queries: Cell<usize>,
}

impl CharLanguageModel for CountingLm {
    fn vocab_len(&self) -> usize {
        VOCAB_LEN
    }

    fn log_prob_seq(&self, sequence: &[u32]) -> f32 {
        self.queries.set(self.queries.get() + 1);
        if sequence.last() == Some(&SYMBOLS.eos) {
            -1000.0
        } else {
            -1.0
        }
    }
}

#[test]
fn greedy_output_is_bounded_and_terminated() {
    let lm = FlatLm;
    for (idx, variant) in [
        ModelVariant::separate(),
        ModelVariant::joint(),
        ModelVariant::lm_joint(),
        ModelVariant::attention(),
    ]
    .into_iter()
    .enumerate()
    {
        let model = model(variant, idx as u64);
        let lm_ref = variant.lm_fused.then_some(&lm as &dyn CharLanguageModel);
        for input in [&[0u32, 1][..], &[0, 2, 3, 4, 5, 1], &[6]] {
            let output = model.decode(1, input, SYMBOLS, lm_ref).expect("decode");
            assert!((2..=MAX_PRED_LEN).contains(&output.len()), "{output:?}");
            assert_eq!(output[0], SYMBOLS.bos);
            let eos_at = output.iter().position(|&symbol| symbol == SYMBOLS.eos);
            match eos_at {
                Some(pos) => assert_eq!(pos, output.len() - 1),
                None => assert_eq!(output.len(), MAX_PRED_LEN),
            }
            assert!(output.iter().all(|&symbol| (symbol as usize) < VOCAB_LEN));
        }
    }
}

#[test]
fn single_member_ensemble_matches_the_model() {
    let model = model(ModelVariant::joint(), 5);
    let input = [0, 3, 4, 1];
    let alone = stepwise_greedy(&model, 0, &input);
    assert_eq!(model.decode(0, &input, SYMBOLS, None).expect("decode"), alone);
    let single = ensemble_greedy_decode(&[&model], 0, &input, SYMBOLS, None).expect("ensemble");
    let doubled =
        ensemble_greedy_decode(&[&model, &model], 0, &input, SYMBOLS, None).expect("ensemble");
    assert_eq!(single, alone);
    assert_eq!(doubled, alone);
}

#[test]
fn ensemble_members_may_differ_in_width() {
    let device = <InferBackend as Backend>::Device::default();
    let narrow = model(ModelVariant::separate(), 1);
    let wide = MorphSeq2Seq::<InferBackend>::new(
        Seq2SeqConfig::new(10, 20, VOCAB_LEN, 2, 2).with_variant(ModelVariant::attention()),
        &device,
    )
    .expect("model");
    let output =
        ensemble_greedy_decode(&[&narrow, &wide], 1, &[0, 2, 1], SYMBOLS, None).expect("decode");
    assert_eq!(output[0], SYMBOLS.bos);
}

#[test]
fn ensemble_rejects_mismatched_indexing() {
    let device = <InferBackend as Backend>::Device::default();
    let a = model(ModelVariant::joint(), 2);
    let b = MorphSeq2Seq::<InferBackend>::new(Seq2SeqConfig::new(6, 12, VOCAB_LEN + 1, 1, 2), &device)
        .expect("model");
    assert!(ensemble_greedy_decode(&[&a, &b], 0, &[0, 1], SYMBOLS, None).is_err());
    assert!(ensemble_greedy_decode::<InferBackend>(&[], 0, &[0, 1], SYMBOLS, None).is_err());
}

#[test]
fn beam_of_width_one_matches_greedy() {
    let model = model(ModelVariant::separate(), 9);
    for input in [[0u32, 2, 5, 1], [0, 7, 7, 1]] {
        let greedy = model.decode(1, &input, SYMBOLS, None).expect("greedy");
        let beam = ensemble_beam_decode(&[&model], 1, &input, SYMBOLS, None, 1).expect("beam");
        assert_eq!(beam.len(), 1);
        assert_eq!(beam[0].symbols, greedy);
    }
}

#[test]
fn wider_beams_return_ranked_terminated_hypotheses() {
    let model = model(ModelVariant::joint(), 4);
    let hypotheses =
        ensemble_beam_decode(&[&model], 0, &[0, 3, 2, 1], SYMBOLS, None, 3).expect("beam");
    assert!(!hypotheses.is_empty() && hypotheses.len() <= 3);
    for pair in hypotheses.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    for hypothesis in &hypotheses {
        assert_eq!(hypothesis.symbols[0], SYMBOLS.bos);
        assert!(
            hypothesis.symbols.last() == Some(&SYMBOLS.eos)
                || hypothesis.symbols.len() == MAX_PRED_LEN
        );
        assert!(hypothesis.score.is_finite());
    }

    let best = decode_best(
        &[&model],
        0,
        &[0, 3, 2, 1],
        SYMBOLS,
        None,
        DecodeStrategy::Beam { width: 3 },
    )
    .expect("best");
    assert_eq!(best, hypotheses[0].symbols);
    assert!(ensemble_beam_decode(&[&model], 0, &[0, 1], SYMBOLS, None, 0).is_err());
}

#[test]
fn fused_decoding_requires_a_matching_language_model() {
    let model = model(ModelVariant::lm_separate(), 6);
    assert!(model.decode(0, &[0, 2, 1], SYMBOLS, None).is_err());

    struct SmallLm;
    impl CharLanguageModel for SmallLm {
        fn vocab_len(&self) -> usize {
            3
        }
        fn log_prob_seq(&self, _sequence: &[u32]) -> f32 {
            -1.0
        }
    }
    assert!(model.decode(0, &[0, 2, 1], SYMBOLS, Some(&SmallLm as &dyn CharLanguageModel)).is_err());
    assert!(model.decode(0, &[0, 2, 1], SYMBOLS, Some(&FlatLm as &dyn CharLanguageModel)).is_ok());
}

#[test]
fn greedy_stops_stepping_at_the_length_cap() {
    let model = model(ModelVariant::lm_joint(), 8);
    let lm = CountingLm {
        queries: Cell::new(0),
    };
    let output = ensemble_greedy_decode(
        &[&model],
        0,
        &[0, 2, 3, 1],
        SYMBOLS,
        Some(&lm as &dyn CharLanguageModel),
    )
    .expect("decode");

    assert_eq!(output.len(), MAX_PRED_LEN);
    assert!(!output.contains(&SYMBOLS.eos));
    assert_eq!(lm.queries.get(), (MAX_PRED_LEN - 1) * VOCAB_LEN);
}
