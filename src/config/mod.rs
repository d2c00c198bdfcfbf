pub mod core;
pub mod train;

pub use core::{DecodeConfig, DecodeStrategyConfig, ModelHyperparameters, TrainingHyperparameters};
pub use train::{ExperimentConfig, OptimizerConfig, build_model_config, load_experiment_config};
