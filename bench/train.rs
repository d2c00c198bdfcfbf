#![recursion_limit = "256"]

use std::time::{Duration, Instant};

use burn::tensor::backend::Backend as BackendTrait;
use burn_autodiff::Autodiff;
use burn_inflect::{ModelVariant, MorphSeq2Seq, OptimizerConfig, Seq2SeqConfig, Trainer};
use burn_ndarray::NdArray;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

type Backend = Autodiff<NdArray<f32>>;

#[derive(Clone, Copy)]
struct TrainConfig {
    name: &'static str,
    hidden: usize,
    word_len: usize,
    variant: fn() -> ModelVariant,
}

const TRAIN_CONFIGS: &[TrainConfig] = &[
    TrainConfig {
        name: "separate_h32_w6",
        hidden: 32,
        word_len: 6,
        variant: ModelVariant::separate,
    },
    TrainConfig {
        name: "joint_h64_w10",
        hidden: 64,
        word_len: 10,
        variant: ModelVariant::joint,
    },
    TrainConfig {
        name: "attention_h64_w10",
        hidden: 64,
        word_len: 10,
        variant: ModelVariant::attention,
    },
];

const VOCAB: usize = 30;

fn word(len: usize, offset: u32) -> Vec<u32> {
    let mut symbols = vec![0];
    symbols.extend((0..len as u32).map(|idx| 2 + (idx + offset) % (VOCAB as u32 - 2)));
    symbols.push(1);
    symbols
}

fn training_step_bench(c: &mut Criterion) {
    let device = <Backend as BackendTrait>::Device::default();
    <Backend as BackendTrait>::seed(&device, 24);
    let optimizer = OptimizerConfig {
        learning_rate: 1e-3,
        weight_decay: 0.0,
        grad_clip_norm: None,
    };

    let mut group = c.benchmark_group("seq2seq_single_train_step/ndarray");

    for cfg in TRAIN_CONFIGS {
        let config = Seq2SeqConfig::new(32, cfg.hidden, VOCAB, 1, 3).with_variant((cfg.variant)());
        let input = word(cfg.word_len, 0);
        let target = word(cfg.word_len + 2, 1);

        group.throughput(Throughput::Elements(target.len() as u64 - 1));
        group.bench_with_input(BenchmarkId::from_parameter(cfg.name), cfg, |b, _| {
            b.iter_custom(|iters| {
                let model =
                    MorphSeq2Seq::<Backend>::new(config.clone(), &device).expect("model");
                let mut trainer = Trainer::new(model, &optimizer).expect("trainer");
                // Warm-up step so optimizer state allocation is not timed.
                trainer
                    .train_example(0, &input, &target, None)
                    .expect("warm-up step");

                let mut total = Duration::ZERO;
                for _ in 0..iters {
                    let start = Instant::now();
                    trainer
                        .train_example(1, &input, &target, None)
                        .expect("train step");
                    total += start.elapsed();
                }
                total
            });
        });
    }

    group.finish();
}

criterion_group!(benches, training_step_bench);
criterion_main!(benches);
