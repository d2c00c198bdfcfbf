use std::fs;

use burn::tensor::backend::Backend;
use burn_autodiff::Autodiff;
use burn_inflect::model::{CONFIG_FILE, read_config, scalar_value};
use burn_inflect::{
    BoundarySymbols, CharLanguageModel, CharNgramLm, ModelVariant, MorphSeq2Seq, NgramConfig,
    OptimizerConfig, Seq2SeqConfig, Trainer, next_symbol_log_probs,
};
use burn_ndarray::NdArray;
use tempfile::tempdir;

type InferBackend = NdArray<f32>;
type TrainBackend = Autodiff<NdArray<f32>>;

const SYMBOLS: BoundarySymbols = BoundarySymbols { bos: 0, eos: 1 };

fn logits_row(model: &MorphSeq2Seq<InferBackend>, morph_id: usize, input: &[u32]) -> Vec<f32> {
    fused_logits_row(model, morph_id, input, None)
}

fn fused_logits_row(
    model: &MorphSeq2Seq<InferBackend>,
    morph_id: usize,
    input: &[u32],
    lm_log_probs: Option<&[f32]>,
) -> Vec<f32> {
    let mut session = model.start_decoding(morph_id, input).expect("start");
    model
        .step(&mut session, SYMBOLS.bos, lm_log_probs)
        .expect("step")
        .to_data()
        .convert::<f32>()
        .into_vec::<f32>()
        .expect("to vec")
}

#[test]
fn saved_models_reload_with_identical_outputs() {
    let device = <InferBackend as Backend>::Device::default();
    for variant in [
        ModelVariant::separate(),
        ModelVariant::joint(),
        ModelVariant::attention(),
    ] {
        let config = Seq2SeqConfig::new(5, 7, 9, 2, 3).with_variant(variant);
        let model = MorphSeq2Seq::<InferBackend>::new(config.clone(), &device).expect("model");

        let dir = tempdir().expect("tempdir");
        model.save(dir.path()).expect("save");
        assert_eq!(read_config(dir.path()).expect("config"), config);

        let restored = MorphSeq2Seq::<InferBackend>::load(dir.path(), &device).expect("load");
        assert_eq!(restored.config(), model.config());

        let input = [0, 4, 6, 1];
        for morph_id in 0..3 {
            assert_eq!(
                logits_row(&restored, morph_id, &input),
                logits_row(&model, morph_id, &input)
            );
            let target = [0, 5, 1];
            let before = scalar_value(model.loss(morph_id, &input, &target, None).expect("loss"))
                .expect("scalar");
            let after =
                scalar_value(restored.loss(morph_id, &input, &target, None).expect("loss"))
                    .expect("scalar");
            assert_eq!(before, after);
        }
        assert_eq!(
            restored.decode(2, &input, SYMBOLS, None).expect("decode"),
            model.decode(2, &input, SYMBOLS, None).expect("decode")
        );
    }
}

#[test]
fn trained_language_model_gates_survive_a_reload() {
    let device = <TrainBackend as Backend>::Device::default();
    <TrainBackend as Backend>::seed(&device, 21);
    let infer_device = <InferBackend as Backend>::Device::default();

    let vocab_len = 6;
    let corpus: Vec<Vec<u32>> = vec![vec![0, 2, 3, 1], vec![0, 4, 5, 3, 1]];
    let lm = CharNgramLm::fit(
        corpus.iter().map(Vec::as_slice),
        vocab_len,
        0,
        NgramConfig::default(),
    )
    .expect("lm");
    let lm_ref: &dyn CharLanguageModel = &lm;
    let optimizer = OptimizerConfig {
        learning_rate: 0.05,
        weight_decay: 0.0,
        grad_clip_norm: None,
    };

    for variant in [ModelVariant::lm_joint(), ModelVariant::lm_separate()] {
        let config = Seq2SeqConfig::new(5, 7, vocab_len, 1, 2).with_variant(variant);
        let model = MorphSeq2Seq::<TrainBackend>::new(config.clone(), &device).expect("model");
        let mut trainer = Trainer::new(model, &optimizer).expect("trainer");
        for _ in 0..10 {
            for (morph_id, target) in corpus.iter().enumerate() {
                trainer
                    .train_example(morph_id, &[0, 2, 1], target, Some(lm_ref))
                    .expect("train step");
            }
        }
        let trained = trainer.model().valid();

        let dir = tempdir().expect("tempdir");
        trained.save(dir.path()).expect("save");
        let restored =
            MorphSeq2Seq::<InferBackend>::load_expecting(dir.path(), &config, &infer_device)
                .expect("load");

        let lm_values = next_symbol_log_probs(lm_ref, &[SYMBOLS.bos]);
        for morph_id in 0..2 {
            let gates = trained
                .lm_gate_weights(morph_id)
                .expect("gates")
                .expect("fused model has gates");
            assert!(
                gates
                    .iter()
                    .any(|gate| (gate - std::f32::consts::LN_2).abs() > 1e-4),
                "gates were not trained: {gates:?}"
            );
            assert_eq!(
                restored.lm_gate_weights(morph_id).expect("gates"),
                Some(gates)
            );

            let input = [0, 2, 1];
            assert_eq!(
                fused_logits_row(&restored, morph_id, &input, Some(lm_values.as_slice())),
                fused_logits_row(&trained, morph_id, &input, Some(lm_values.as_slice()))
            );
            assert_eq!(
                restored
                    .decode(morph_id, &input, SYMBOLS, Some(lm_ref))
                    .expect("decode"),
                trained
                    .decode(morph_id, &input, SYMBOLS, Some(lm_ref))
                    .expect("decode")
            );
        }
    }
}

#[test]
fn loading_into_a_different_configuration_fails() {
    let device = <InferBackend as Backend>::Device::default();
    let config = Seq2SeqConfig::new(5, 7, 9, 1, 2);
    let model = MorphSeq2Seq::<InferBackend>::new(config.clone(), &device).expect("model");
    let dir = tempdir().expect("tempdir");
    model.save(dir.path()).expect("save");

    let wider = Seq2SeqConfig::new(5, 8, 9, 1, 2);
    assert!(MorphSeq2Seq::<InferBackend>::load_expecting(dir.path(), &wider, &device).is_err());

    let joint = config.clone().with_variant(ModelVariant::joint());
    assert!(MorphSeq2Seq::<InferBackend>::load_expecting(dir.path(), &joint, &device).is_err());

    assert!(MorphSeq2Seq::<InferBackend>::load_expecting(dir.path(), &config, &device).is_ok());
}

#[test]
fn corrupt_model_directories_are_errors() {
    let device = <InferBackend as Backend>::Device::default();
    let empty = tempdir().expect("tempdir");
    assert!(MorphSeq2Seq::<InferBackend>::load(empty.path(), &device).is_err());

    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join(CONFIG_FILE), "{ not json").expect("write");
    assert!(MorphSeq2Seq::<InferBackend>::load(dir.path(), &device).is_err());
}
