use candle_core::{Module, Tensor, Var};
use candle_nn::{linear, Linear, VarBuilder};
use snafu::{ensure, OptionExt, ResultExt, Snafu};

use crate::architectures::{
    BuildArchitecture, Encoder, LayerOutputs, SequenceClassifier, SequenceClassifierOutput,
};
use crate::error::BoxedError;
use crate::models::transformer::{TransformerEncoder, TransformerEncoderConfig};

/// Sentiment transformer configuration.
#[derive(Debug)]
pub struct SentimentTransformerConfig {
    encoder: TransformerEncoderConfig,
    hidden_width: usize,
    max_seq_len: usize,
}

impl SentimentTransformerConfig {
    /// Create a classifier configuration.
    ///
    /// * `encoder` - Encoder configuration.
    /// * `hidden_width` - Width of the encoder outputs.
    pub fn new(encoder: TransformerEncoderConfig, hidden_width: usize) -> Self {
        Self {
            encoder,
            hidden_width,
            max_seq_len: 500,
        }
    }

    /// Encoder configuration.
    pub fn encoder(mut self, encoder: TransformerEncoderConfig) -> Self {
        self.encoder = encoder;
        self
    }

    /// Width of the encoder outputs. It must match the width of the
    /// embeddings.
    pub fn hidden_width(mut self, hidden_width: usize) -> Self {
        self.hidden_width = hidden_width;
        self
    }

    /// Length of the input sequences.
    ///
    /// Inputs must be padded or truncated to exactly this length. It must
    /// match the sequence length of the encoder's layer norms.
    ///
    /// Default: `500`
    pub fn max_seq_len(mut self, max_seq_len: usize) -> Self {
        self.max_seq_len = max_seq_len;
        self
    }
}

impl BuildArchitecture for SentimentTransformerConfig {
    type Architecture = SentimentTransformer;

    fn build(&self, vb: VarBuilder) -> Result<Self::Architecture, BoxedError> {
        let encoder = self.encoder.build(vb.clone())?;
        ensure!(
            encoder.hidden_width() == self.hidden_width,
            WidthMismatchSnafu {
                expected: encoder.hidden_width(),
                got: self.hidden_width
            }
        );

        let classifier = linear(self.hidden_width, 1, vb.push_prefix("classifier"))
            .context(ConstructionSnafu)?;

        tracing::debug!(
            n_blocks = encoder.n_layers(),
            hidden_width = self.hidden_width,
            max_seq_len = self.max_seq_len,
            "Built sentiment transformer"
        );

        Ok(SentimentTransformer {
            classifier,
            encoder,
            hidden_width: self.hidden_width,
            max_seq_len: self.max_seq_len,
        })
    }
}

/// Sentiment transformer errors.
#[derive(Debug, Snafu)]
pub enum SentimentTransformerError {
    #[snafu(display("Cannot apply classifier"))]
    Classifier { source: candle_core::Error },

    #[snafu(display("Cannot construct classifier"))]
    Construction { source: candle_core::Error },

    #[snafu(display("Cannot encode sequences"))]
    Encoder { source: BoxedError },

    #[snafu(display("Input must have shape (batch_size, seq_len)"))]
    InputShape { source: candle_core::Error },

    #[snafu(display("Encoder did not return any layer outputs"))]
    NoLayers,

    #[snafu(display("Expected sequences of length {expected}, got {got}"))]
    SeqLenMismatch { expected: usize, got: usize },

    #[snafu(display("Classifier width {got} does not match encoder width {expected}"))]
    WidthMismatch { expected: usize, got: usize },
}

/// Binary sentiment classifier.
///
/// The pieces are encoded with a transformer encoder, the last encoder
/// output is mean-pooled over the sequence and the pooled representation
/// is mapped to a single logit by a linear layer. The logit is returned
/// as-is, apply the logistic function to get the probability of the
/// positive class.
pub struct SentimentTransformer {
    classifier: Linear,
    encoder: TransformerEncoder,
    hidden_width: usize,
    max_seq_len: usize,
}

impl SentimentTransformer {
    /// Classify a batch of sequences.
    ///
    /// * `piece_ids` - Input sequences.
    ///   *Shape:* `(batch_size, max_seq_len)`
    /// * `train` - Whether to train the model. Dropout is only applied
    ///   when training.
    ///
    /// Returns the encoder output and the logits.
    /// *Logits shape:* `(batch_size, 1)`
    pub fn forward(
        &self,
        piece_ids: &Tensor,
        train: bool,
    ) -> Result<SequenceClassifierOutput, SentimentTransformerError> {
        let (_, seq_len) = piece_ids.dims2().context(InputShapeSnafu)?;
        ensure!(
            seq_len == self.max_seq_len,
            SeqLenMismatchSnafu {
                expected: self.max_seq_len,
                got: seq_len
            }
        );

        let encoder_output = self
            .encoder
            .forward_t(piece_ids, train)
            .context(EncoderSnafu)?;

        let logits = encoder_output
            .layer_outputs()
            .last()
            .context(NoLayersSnafu)?
            .mean(1)
            .and_then(|pooled| self.classifier.forward(&pooled))
            .context(ClassifierSnafu)?;

        Ok(SequenceClassifierOutput::new(encoder_output, logits))
    }

    /// The underlying encoder.
    pub fn encoder(&self) -> &TransformerEncoder {
        &self.encoder
    }

    /// Width of the hidden representations.
    pub fn hidden_width(&self) -> usize {
        self.hidden_width
    }

    /// Length of the input sequences.
    pub fn max_seq_len(&self) -> usize {
        self.max_seq_len
    }

    /// Variables that are not stored in the model's `VarBuilder`, but
    /// that should be trained.
    ///
    /// This is empty unless the embeddings are unfrozen.
    pub fn trainable_vars(&self) -> Vec<Var> {
        self.encoder.trainable_vars()
    }
}

impl SequenceClassifier for SentimentTransformer {
    fn forward_t(
        &self,
        piece_ids: &Tensor,
        train: bool,
    ) -> Result<SequenceClassifierOutput, BoxedError> {
        Ok(self.forward(piece_ids, train)?)
    }
}

#[cfg(test)]
mod tests {
    use candle_core::{DType, Device, Tensor};
    use snafu::{report, FromString, ResultExt, Whatever};

    use crate::architectures::{BuildArchitecture, LayerOutputs, SequenceClassifier};
    use crate::models::sentiment::{
        SentimentModelConfig, SentimentTransformer, SentimentTransformerError,
    };
    use crate::util::tests::{fresh_var_builder, test_devices, PseudoRandom};

    fn small_model(
        device: &Device,
        seq_len: usize,
        n_blocks: usize,
        freeze_embeddings: bool,
    ) -> Result<SentimentTransformer, Whatever> {
        let (_varmap, vb) = fresh_var_builder(device);
        let table = Tensor::pseudo_random((20, 6), 7, device);
        SentimentModelConfig {
            max_seq_len: seq_len,
            n_blocks,
            freeze_embeddings,
            ..Default::default()
        }
        .transformer_config(table)
        .whatever_context("Cannot create model config")?
        .build(vb)
        .map_err(|e| Whatever::with_source(e, "Cannot build model".to_string()))
    }

    fn piece_ids(device: &Device, batch_size: usize, seq_len: usize) -> Result<Tensor, Whatever> {
        let ids = (0..batch_size * seq_len)
            .map(|i| ((i * 7) % 20) as u32)
            .collect::<Vec<_>>();
        Tensor::from_vec(ids, (batch_size, seq_len), device)
            .whatever_context("Cannot create piece identifiers")
    }

    #[test]
    #[report]
    fn sentiment_transformer_returns_one_logit_per_example() -> Result<(), Whatever> {
        for device in test_devices() {
            for n_blocks in [0, 1, 3] {
                let model = small_model(&device, 5, n_blocks, true)?;
                let output = model
                    .forward(&piece_ids(&device, 4, 5)?, false)
                    .whatever_context("Cannot classify")?;
                assert_eq!(output.logits().dims(), &[4, 1]);
                assert_eq!(output.logits().dtype(), DType::F32);
                assert_eq!(output.layer_outputs().len(), n_blocks + 1);
            }
        }

        Ok(())
    }

    #[test]
    #[report]
    fn sentiment_transformer_is_deterministic_in_eval_mode() -> Result<(), Whatever> {
        let device = Device::Cpu;
        let model = small_model(&device, 8, 2, true)?;
        let input = piece_ids(&device, 3, 8)?;

        let first: Vec<f32> = model
            .forward_t(&input, false)
            .map_err(|e| Whatever::with_source(e, "Cannot classify".to_string()))?
            .logits()
            .flatten_all()
            .and_then(|logits| logits.to_vec1())
            .whatever_context("Cannot convert logits")?;
        let second: Vec<f32> = model
            .forward_t(&input, false)
            .map_err(|e| Whatever::with_source(e, "Cannot classify".to_string()))?
            .logits()
            .flatten_all()
            .and_then(|logits| logits.to_vec1())
            .whatever_context("Cannot convert logits")?;
        assert_eq!(first, second);

        Ok(())
    }

    fn classify<C>(config: &C, piece_ids: &Tensor, device: &Device) -> Result<Tensor, Whatever>
    where
        C: crate::architectures::BuildSequenceClassifier,
    {
        let (_varmap, vb) = fresh_var_builder(device);
        let classifier = crate::architectures::BuildSequenceClassifier::build(config, vb)
            .map_err(|e| Whatever::with_source(e, "Cannot build classifier".to_string()))?;
        let output = classifier
            .forward_t(piece_ids, false)
            .map_err(|e| Whatever::with_source(e, "Cannot classify".to_string()))?;
        Ok(output.logits().clone())
    }

    #[test]
    #[report]
    fn sentiment_transformer_builds_as_sequence_classifier() -> Result<(), Whatever> {
        let device = Device::Cpu;
        let config = SentimentModelConfig {
            max_seq_len: 4,
            n_blocks: 2,
            ..Default::default()
        }
        .transformer_config(Tensor::pseudo_random((20, 6), 7, &device))
        .whatever_context("Cannot create model config")?;

        let logits = classify(&config, &piece_ids(&device, 3, 4)?, &device)?;
        assert_eq!(logits.dims(), &[3, 1]);

        Ok(())
    }

    #[test]
    fn sentiment_transformer_rejects_wrong_sequence_length() {
        let device = Device::Cpu;
        let model = small_model(&device, 5, 1, true).unwrap();

        assert!(matches!(
            model.forward(&piece_ids(&device, 2, 4).unwrap(), false),
            Err(SentimentTransformerError::SeqLenMismatch {
                expected: 5,
                got: 4
            })
        ));

        let err = model
            .forward_t(&piece_ids(&device, 2, 6).unwrap(), false)
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<SentimentTransformerError>(),
            Some(SentimentTransformerError::SeqLenMismatch {
                expected: 5,
                got: 6
            })
        ));
    }

    #[test]
    fn sentiment_transformer_rejects_mismatching_classifier_width() {
        let device = Device::Cpu;
        let (_varmap, vb) = fresh_var_builder(&device);
        let config = SentimentModelConfig {
            max_seq_len: 5,
            ..Default::default()
        }
        .transformer_config(Tensor::pseudo_random((20, 6), 7, &device))
        .unwrap()
        .hidden_width(8);

        let err = config.build(vb).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<SentimentTransformerError>(),
            Some(SentimentTransformerError::WidthMismatch {
                expected: 6,
                got: 8
            })
        ));
    }

    #[test]
    fn sentiment_transformer_rejects_non_matrix_input() {
        let device = Device::Cpu;
        let model = small_model(&device, 5, 1, true).unwrap();
        let input = Tensor::zeros((2, 5, 1), DType::U32, &device).unwrap();

        assert!(matches!(
            model.forward(&input, false),
            Err(SentimentTransformerError::InputShape { .. })
        ));
    }

    #[test]
    #[report]
    fn frozen_embeddings_are_not_trainable() -> Result<(), Whatever> {
        let device = Device::Cpu;

        let frozen = small_model(&device, 5, 1, true)?;
        assert!(frozen.trainable_vars().is_empty());

        let unfrozen = small_model(&device, 5, 1, false)?;
        let vars = unfrozen.trainable_vars();
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].as_tensor().dims(), &[20, 6]);

        Ok(())
    }

    #[test]
    #[report]
    fn sentiment_transformer_stores_classifier_parameters() -> Result<(), Whatever> {
        let device = Device::Cpu;
        let (varmap, vb) = fresh_var_builder(&device);
        let table = Tensor::pseudo_random((20, 6), 7, &device);
        let model = SentimentModelConfig {
            max_seq_len: 5,
            ..Default::default()
        }
        .transformer_config(table)
        .whatever_context("Cannot create model config")?
        .build(vb)
        .map_err(|e| Whatever::with_source(e, "Cannot build model".to_string()))?;
        assert_eq!(model.hidden_width(), 6);
        assert_eq!(model.max_seq_len(), 5);

        // Five linear layers and two layer norms in the block, plus the
        // classifier. Each has a weight and a bias.
        assert_eq!(varmap.all_vars().len(), 2 * (5 + 2 + 1));

        Ok(())
    }
}
