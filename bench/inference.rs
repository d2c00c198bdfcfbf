#![recursion_limit = "256"]

use std::hint::black_box;

use burn::tensor::backend::Backend as BackendTrait;
use burn_inflect::{
    BoundarySymbols, ModelVariant, MorphSeq2Seq, Seq2SeqConfig, ensemble_beam_decode,
    ensemble_greedy_decode,
};
use burn_ndarray::NdArray;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

type Backend = NdArray<f32>;

#[derive(Clone, Copy)]
struct InferenceConfig {
    name: &'static str,
    members: usize,
    beam: Option<usize>,
}

const INFERENCE_CONFIGS: &[InferenceConfig] = &[
    InferenceConfig {
        name: "greedy_x1",
        members: 1,
        beam: None,
    },
    InferenceConfig {
        name: "greedy_x3",
        members: 3,
        beam: None,
    },
    InferenceConfig {
        name: "beam4_x1",
        members: 1,
        beam: Some(4),
    },
];

const VOCAB: usize = 30;
const SYMBOLS: BoundarySymbols = BoundarySymbols { bos: 0, eos: 1 };

fn decode_bench(c: &mut Criterion) {
    let device = <Backend as BackendTrait>::Device::default();
    <Backend as BackendTrait>::seed(&device, 7);

    let config = Seq2SeqConfig::new(32, 64, VOCAB, 1, 2).with_variant(ModelVariant::joint());
    let models: Vec<MorphSeq2Seq<Backend>> = (0..3)
        .map(|_| MorphSeq2Seq::new(config.clone(), &device).expect("model"))
        .collect();
    let input: Vec<u32> = [0, 5, 9, 12, 7, 3, 1].to_vec();

    let mut group = c.benchmark_group("seq2seq_decode/ndarray");
    // Untrained models usually run to the length cap, so keep samples small.
    group.sample_size(10);

    for cfg in INFERENCE_CONFIGS {
        let members: Vec<&MorphSeq2Seq<Backend>> = models.iter().take(cfg.members).collect();
        group.bench_with_input(BenchmarkId::from_parameter(cfg.name), cfg, |b, cfg| {
            b.iter(|| match cfg.beam {
                None => black_box(
                    ensemble_greedy_decode(&members, 1, &input, SYMBOLS, None).expect("greedy"),
                ),
                Some(width) => black_box(
                    ensemble_beam_decode(&members, 1, &input, SYMBOLS, None, width)
                        .expect("beam")
                        .remove(0)
                        .symbols,
                ),
            });
        });
    }

    group.finish();
}

criterion_group!(benches, decode_bench);
criterion_main!(benches);
