#![recursion_limit = "256"]

pub mod config;
pub mod dataset;
pub mod decode;
pub mod lm;
pub mod logging;
pub mod model;
pub mod train;
pub mod vocab;

pub use config::{
    DecodeConfig, DecodeStrategyConfig, ExperimentConfig, ModelHyperparameters, OptimizerConfig,
    TrainingHyperparameters, build_model_config, load_experiment_config,
};
pub use dataset::{EncodedExample, InflectionCorpus, InflectionRecord, epoch_order};
pub use decode::{
    DecodeStrategy, Evaluation, Hypothesis, MAX_PRED_LEN, decode_best, ensemble_beam_decode,
    ensemble_greedy_decode, evaluate, resolve_decode_strategy,
};
pub use lm::{CharLanguageModel, CharNgramLm, NgramConfig, next_symbol_log_probs};
pub use model::{
    DecoderSession, Encoding, ModelVariant, MorphSeq2Seq, RecurrentState, Seq2SeqConfig,
    Seq2SeqParams,
};
pub use train::{EpochReport, FitReport, Trainer, fit};
pub use vocab::{BOW, BoundarySymbols, EOW, SymbolTable};
