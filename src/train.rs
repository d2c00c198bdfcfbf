use std::path::Path;

use anyhow::{Result, bail};
use burn::grad_clipping::GradientClippingConfig;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{AdamW, AdamWConfig, GradientsParams, LearningRate, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use tracing::{debug, info};

use crate::config::{OptimizerConfig, TrainingHyperparameters};
use crate::dataset::{EncodedExample, epoch_order};
use crate::decode::{DecodeStrategy, evaluate};
use crate::lm::CharLanguageModel;
use crate::model::{MorphSeq2Seq, ParamSet, scalar_value};
use crate::vocab::BoundarySymbols;

type SetOptimizer<B> = OptimizerAdaptor<AdamW, ParamSet<B>, B>;

/// Owns a model under training together with one optimizer for the shared
/// parameter set and one per morphology category. Only the category of the
/// current example and the shared set are updated by a step.
pub struct Trainer<B: AutodiffBackend> {
    model: MorphSeq2Seq<B>,
    shared_optimizer: SetOptimizer<B>,
    morph_optimizers: Vec<SetOptimizer<B>>,
    learning_rate: LearningRate,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(model: MorphSeq2Seq<B>, config: &OptimizerConfig) -> Result<Self> {
        if config.learning_rate.is_nan() || config.learning_rate <= 0.0 {
            bail!("learning rate must be positive, got {}", config.learning_rate);
        }
        let build = || {
            AdamWConfig::new()
                .with_weight_decay(config.weight_decay)
                .with_grad_clipping(config.grad_clip_norm.map(GradientClippingConfig::Norm))
                .init::<B, ParamSet<B>>()
        };
        let morph_optimizers = (0..model.config().morph_len).map(|_| build()).collect();
        Ok(Self {
            shared_optimizer: build(),
            morph_optimizers,
            learning_rate: config.learning_rate,
            model,
        })
    }

    pub fn model(&self) -> &MorphSeq2Seq<B> {
        &self.model
    }

    pub fn into_model(self) -> MorphSeq2Seq<B> {
        self.model
    }

    /// One gradient step on a single example; returns the loss before the
    /// update.
    pub fn train_example(
        &mut self,
        morph_id: usize,
        input: &[u32],
        target: &[u32],
        lm: Option<&dyn CharLanguageModel>,
    ) -> Result<f32> {
        let loss = self.model.loss(morph_id, input, target, lm)?;
        let value = scalar_value(loss.clone())?;

        let mut grads = loss.backward();
        let params = &mut self.model.params;
        let morph_grads = GradientsParams::from_module(&mut grads, &params.morphs[morph_id]);
        let shared_grads = GradientsParams::from_module(&mut grads, &params.shared);

        let morph = params.morphs[morph_id].clone();
        params.morphs[morph_id] =
            self.morph_optimizers[morph_id].step(self.learning_rate, morph, morph_grads);
        let shared = params.shared.clone();
        params.shared = self
            .shared_optimizer
            .step(self.learning_rate, shared, shared_grads);

        Ok(value)
    }
}

/// Mean training loss and dev accuracy of one epoch.
#[derive(Clone, Debug, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub mean_loss: f32,
    pub dev_accuracy: Option<f32>,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct FitReport {
    pub epochs: Vec<EpochReport>,
    pub best_dev_accuracy: Option<f32>,
}

/// Runs `hyper.epochs` passes over `train`. After each epoch the dev set is
/// decoded greedily; when its accuracy improves and `checkpoint` is set, the
/// model is written there.
pub fn fit<B: AutodiffBackend>(
    trainer: &mut Trainer<B>,
    train: &[EncodedExample],
    dev: &[EncodedExample],
    hyper: &TrainingHyperparameters,
    symbols: BoundarySymbols,
    lm: Option<&dyn CharLanguageModel>,
    checkpoint: Option<&Path>,
) -> Result<FitReport> {
    if train.is_empty() {
        bail!("training set is empty");
    }
    let log_frequency = hyper.log_frequency.max(1);
    let mut report = FitReport::default();

    info!(
        "training on {} examples for {} epochs (dev: {})",
        train.len(),
        hyper.epochs,
        dev.len()
    );

    for epoch in 0..hyper.epochs {
        let order = epoch_order(train.len(), hyper.seed.wrapping_add(epoch as u64), hyper.shuffle);
        let mut epoch_total = 0.0f32;
        let mut window_total = 0.0f32;

        for (step, &idx) in order.iter().enumerate() {
            let example = &train[idx];
            let loss =
                trainer.train_example(example.morph_id, &example.input, &example.target, lm)?;
            epoch_total += loss;
            window_total += loss;
            if (step + 1) % log_frequency == 0 {
                info!(
                    "epoch {} step {}: mean loss {:.4}",
                    epoch + 1,
                    step + 1,
                    window_total / log_frequency as f32
                );
                window_total = 0.0;
            }
        }
        let mean_loss = epoch_total / train.len() as f32;

        let dev_accuracy = if dev.is_empty() {
            None
        } else {
            let inference = trainer.model().valid();
            let evaluation = evaluate(&[&inference], dev, symbols, lm, DecodeStrategy::Greedy)?;
            Some(evaluation.accuracy())
        };

        match dev_accuracy {
            Some(accuracy) => info!(
                "epoch {} done: mean loss {mean_loss:.4}, dev accuracy {:.2}%",
                epoch + 1,
                accuracy * 100.0
            ),
            None => info!("epoch {} done: mean loss {mean_loss:.4}", epoch + 1),
        }

        if let Some(accuracy) = dev_accuracy {
            let improved = report.best_dev_accuracy.is_none_or(|best| accuracy > best);
            if improved {
                report.best_dev_accuracy = Some(accuracy);
                if let Some(dir) = checkpoint {
                    trainer.model().valid().save(dir)?;
                }
            } else {
                debug!("dev accuracy did not improve on epoch {}", epoch + 1);
            }
        }

        report.epochs.push(EpochReport {
            epoch: epoch + 1,
            mean_loss,
            dev_accuracy,
        });
    }

    if dev.is_empty()
        && let Some(dir) = checkpoint
    {
        trainer.model().valid().save(dir)?;
    }

    Ok(report)
}
