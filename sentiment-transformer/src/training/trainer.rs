use std::io::Read;
use std::path::Path;

use candle_core::{DType, Var};
use candle_nn::optim::{AdamW, Optimizer, ParamsAdamW};
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::models::sentiment::{
    read_json, read_json_file, ConfigError, SentimentTransformer, SentimentTransformerError,
};
use crate::training::{
    binary_cross_entropy_with_logits, EpochMetrics, Metrics, MetricsAccumulator, SentimentBatch,
};

/// Serializable training configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Learning rate of the optimizer.
    pub learning_rate: f64,

    /// Number of passes over the training data.
    pub n_epochs: usize,

    /// Decoupled weight decay. Zero gives plain Adam.
    pub weight_decay: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-4,
            n_epochs: 5,
            weight_decay: 0.0,
        }
    }
}

impl TrainingConfig {
    /// Read the configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        read_json_file(path.as_ref())
    }

    /// Read the configuration as JSON.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        read_json(reader)
    }

    /// Construct an Adam optimizer for the given variables.
    pub fn optimizer(&self, vars: Vec<Var>) -> Result<AdamW, TrainerError> {
        AdamW::new(
            vars,
            ParamsAdamW {
                lr: self.learning_rate,
                weight_decay: self.weight_decay,
                ..Default::default()
            },
        )
        .context(BuildOptimizerSnafu)
    }
}

/// Trainer errors.
#[derive(Debug, Snafu)]
pub enum TrainerError {
    #[snafu(display("Cannot construct optimizer"))]
    BuildOptimizer { source: candle_core::Error },

    #[snafu(display("Cannot apply model"))]
    Forward { source: SentimentTransformerError },

    #[snafu(display("Cannot compute loss"))]
    Loss { source: candle_core::Error },

    #[snafu(display("Cannot compute metrics"))]
    Metrics { source: candle_core::Error },

    #[snafu(display("Cannot update parameters"))]
    Optimizer { source: candle_core::Error },
}

/// All variables of a model that should be trained.
///
/// These are the variables in the `VarMap` that the model was built
/// with, plus the embedding table when it is not frozen.
pub fn trainable_vars(varmap: &VarMap, model: &SentimentTransformer) -> Vec<Var> {
    let mut vars = varmap.all_vars();
    vars.extend(model.trainable_vars());
    vars
}

/// Sentiment classifier trainer.
///
/// The optimizer must hold the model's trainable variables, see
/// [`trainable_vars`]. Since variables share their storage with the
/// model, optimizer steps update the model in place.
pub struct Trainer<'a, O> {
    model: &'a SentimentTransformer,
    n_epochs: usize,
    optimizer: O,
}

impl<'a> Trainer<'a, AdamW> {
    /// Create a trainer that uses Adam with the given configuration.
    ///
    /// * `model` - Model to train.
    /// * `varmap` - Variable map that the model was built with.
    /// * `config` - Training configuration.
    pub fn with_adamw(
        model: &'a SentimentTransformer,
        varmap: &VarMap,
        config: &TrainingConfig,
    ) -> Result<Self, TrainerError> {
        let optimizer = config.optimizer(trainable_vars(varmap, model))?;
        Ok(Self::new(model, optimizer).n_epochs(config.n_epochs))
    }
}

impl<'a, O> Trainer<'a, O>
where
    O: Optimizer,
{
    /// Create a trainer.
    pub fn new(model: &'a SentimentTransformer, optimizer: O) -> Self {
        Trainer {
            model,
            n_epochs: TrainingConfig::default().n_epochs,
            optimizer,
        }
    }

    /// Number of epochs that [`Trainer::fit`] trains for.
    ///
    /// Default: `5`
    pub fn n_epochs(mut self, n_epochs: usize) -> Self {
        self.n_epochs = n_epochs;
        self
    }

    /// The optimizer.
    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    /// Train the model for a single epoch.
    ///
    /// The parameters are updated after every batch. Predictions for the
    /// accuracy are made before each update.
    pub fn train_epoch(&mut self, batches: &[SentimentBatch]) -> Result<Metrics, TrainerError> {
        let mut accumulator = MetricsAccumulator::default();

        for (idx, batch) in batches.iter().enumerate() {
            let output = self
                .model
                .forward(batch.piece_ids(), true)
                .context(ForwardSnafu)?;
            let loss = binary_cross_entropy_with_logits(output.logits(), batch.labels())
                .context(LossSnafu)?;
            self.optimizer
                .backward_step(&loss)
                .context(OptimizerSnafu)?;

            let loss = loss
                .to_dtype(DType::F32)
                .and_then(|loss| loss.to_scalar::<f32>())
                .context(LossSnafu)?;
            tracing::debug!(batch = idx, loss, "Trained on batch");

            accumulator
                .add_batch(loss, output.logits(), batch.labels())
                .context(MetricsSnafu)?;
        }

        Ok(accumulator.metrics())
    }

    /// Evaluate the model without updating it.
    pub fn evaluate(&self, batches: &[SentimentBatch]) -> Result<Metrics, TrainerError> {
        let mut accumulator = MetricsAccumulator::default();

        for batch in batches {
            let output = self
                .model
                .forward(batch.piece_ids(), false)
                .context(ForwardSnafu)?;
            let loss = binary_cross_entropy_with_logits(output.logits(), batch.labels())
                .and_then(|loss| loss.to_dtype(DType::F32))
                .and_then(|loss| loss.to_scalar::<f32>())
                .context(LossSnafu)?;
            accumulator
                .add_batch(loss, output.logits(), batch.labels())
                .context(MetricsSnafu)?;
        }

        Ok(accumulator.metrics())
    }

    /// Train the model for the configured number of epochs.
    ///
    /// After every epoch, the model is evaluated on the validation data
    /// and, if given, on the test data.
    ///
    /// Returns the metrics of every epoch.
    pub fn fit(
        &mut self,
        train: &[SentimentBatch],
        validation: &[SentimentBatch],
        test: Option<&[SentimentBatch]>,
    ) -> Result<Vec<EpochMetrics>, TrainerError> {
        let mut history = Vec::with_capacity(self.n_epochs);

        for epoch in 0..self.n_epochs {
            let train_metrics = self.train_epoch(train)?;
            let validation_metrics = self.evaluate(validation)?;
            let test_metrics = test.map(|test| self.evaluate(test)).transpose()?;

            tracing::info!(
                epoch,
                train_loss = train_metrics.loss,
                train_acc = train_metrics.accuracy,
                val_loss = validation_metrics.loss,
                val_acc = validation_metrics.accuracy,
                test_acc = test_metrics.map(|metrics| metrics.accuracy),
                "Finished epoch"
            );

            history.push(EpochMetrics {
                epoch,
                train: train_metrics,
                validation: validation_metrics,
                test: test_metrics,
            });
        }

        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use candle_core::{Device, Tensor};
    use candle_nn::optim::{Optimizer, SGD};
    use snafu::{report, FromString, ResultExt, Whatever};

    use crate::architectures::BuildArchitecture;
    use crate::models::sentiment::{SentimentModelConfig, SentimentTransformer};
    use crate::training::{trainable_vars, Metrics, SentimentBatch, Trainer, TrainingConfig};
    use crate::util::tests::{fresh_var_builder, PseudoRandom};

    fn toy_model(
        device: &Device,
    ) -> Result<(candle_nn::VarMap, SentimentTransformer), Whatever> {
        let (varmap, vb) = fresh_var_builder(device);
        let table = Tensor::pseudo_random((4, 8), 23, device);
        let model = SentimentModelConfig {
            dropout_prob: 0.0,
            max_seq_len: 3,
            ..Default::default()
        }
        .transformer_config(table)
        .whatever_context("Cannot create model config")?
        .build(vb)
        .map_err(|e| Whatever::with_source(e, "Cannot build model".to_string()))?;
        Ok((varmap, model))
    }

    /// Sequences of pieces 0 and 1 are positive, sequences of pieces
    /// 2 and 3 negative.
    fn toy_batches(device: &Device) -> Result<Vec<SentimentBatch>, Whatever> {
        let batch = |ids: &[[u32; 3]; 4], labels: [f32; 4]| -> Result<SentimentBatch, Whatever> {
            SentimentBatch::new(
                Tensor::new(ids, device).whatever_context("Cannot create piece ids")?,
                Tensor::new(&labels, device).whatever_context("Cannot create labels")?,
            )
            .whatever_context("Cannot create batch")
        };
        Ok(vec![
            batch(&[[0, 1, 0], [2, 3, 2], [1, 1, 0], [3, 3, 2]], [1., 0., 1., 0.])?,
            batch(&[[3, 2, 3], [0, 0, 1], [2, 2, 3], [1, 0, 1]], [0., 1., 0., 1.])?,
        ])
    }

    #[test]
    #[report]
    fn training_lowers_the_loss() -> Result<(), Whatever> {
        let device = Device::Cpu;
        let (varmap, model) = toy_model(&device)?;
        let batches = toy_batches(&device)?;
        let config = TrainingConfig {
            learning_rate: 1e-2,
            n_epochs: 40,
            ..Default::default()
        };

        let mut trainer = Trainer::with_adamw(&model, &varmap, &config)
            .whatever_context("Cannot create trainer")?;
        let before = trainer
            .evaluate(&batches)
            .whatever_context("Cannot evaluate")?;
        let history = trainer
            .fit(&batches, &batches, Some(&batches))
            .whatever_context("Cannot train")?;
        let after = trainer
            .evaluate(&batches)
            .whatever_context("Cannot evaluate")?;

        assert_eq!(history.len(), 40);
        assert_eq!(history[39].epoch, 39);
        assert!(history.iter().all(|metrics| metrics.test.is_some()));
        assert!(after.loss < before.loss, "{after:?} >= {before:?}");
        assert!(history[39].train.loss < history[0].train.loss);

        Ok(())
    }

    #[test]
    #[report]
    fn evaluation_does_not_change_the_model() -> Result<(), Whatever> {
        let device = Device::Cpu;
        let (varmap, model) = toy_model(&device)?;
        let batches = toy_batches(&device)?;
        let trainer = Trainer::with_adamw(&model, &varmap, &TrainingConfig::default())
            .whatever_context("Cannot create trainer")?;

        let first = trainer
            .evaluate(&batches)
            .whatever_context("Cannot evaluate")?;
        let second = trainer
            .evaluate(&batches)
            .whatever_context("Cannot evaluate")?;
        assert_eq!(first, second);
        assert_eq!(
            trainer.evaluate(&[]).whatever_context("Cannot evaluate")?,
            Metrics::default()
        );

        Ok(())
    }

    #[test]
    #[report]
    fn trainer_accepts_other_optimizers() -> Result<(), Whatever> {
        let device = Device::Cpu;
        let (varmap, model) = toy_model(&device)?;
        let batches = toy_batches(&device)?;

        let optimizer = SGD::new(trainable_vars(&varmap, &model), 1e-2)
            .whatever_context("Cannot create optimizer")?;
        let mut trainer = Trainer::new(&model, optimizer).n_epochs(2);
        let history = trainer
            .fit(&batches, &batches[..1], None)
            .whatever_context("Cannot train")?;

        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|metrics| metrics.test.is_none()));
        assert_eq!(trainer.optimizer().learning_rate(), 1e-2);

        Ok(())
    }

    #[test]
    #[report]
    fn training_config_uses_defaults_for_missing_fields() -> Result<(), Whatever> {
        let config = TrainingConfig::from_reader(r#"{"n_epochs": 10}"#.as_bytes())
            .whatever_context("Cannot parse config")?;
        assert_eq!(
            config,
            TrainingConfig {
                learning_rate: 1e-4,
                n_epochs: 10,
                weight_decay: 0.0,
            }
        );

        Ok(())
    }
}
