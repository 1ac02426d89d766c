use std::fmt::Debug;

use candle_core::Tensor;
use candle_nn::VarBuilder;

use crate::architectures::{BuildArchitecture, EncoderOutput, LayerOutputs};
use crate::error::BoxedError;

/// Sequence classifier output.
pub struct SequenceClassifierOutput {
    encoder_output: EncoderOutput,
    logits: Tensor,
}

impl SequenceClassifierOutput {
    /// Create a sequence classifier output.
    pub fn new(encoder_output: EncoderOutput, logits: Tensor) -> Self {
        Self {
            encoder_output,
            logits,
        }
    }

    /// Get the output of the encoder used by the classifier.
    pub fn encoder_output(&self) -> &EncoderOutput {
        &self.encoder_output
    }

    /// Get the classification logits.
    ///
    /// The logits are unnormalized. For binary classification, applying
    /// the logistic function to a logit gives the probability of the
    /// positive class.
    ///
    /// *Shape:* `(batch_size, n_classes)`
    pub fn logits(&self) -> &Tensor {
        &self.logits
    }
}

impl LayerOutputs for SequenceClassifierOutput {
    fn layer_outputs(&self) -> &[Tensor] {
        self.encoder_output.layer_outputs()
    }

    fn embedding_layer_output(&self) -> Option<&Tensor> {
        self.encoder_output.embedding_layer_output()
    }
}

/// Trait for building sequence classifiers.
pub trait BuildSequenceClassifier: Debug {
    type SequenceClassifier: SequenceClassifier;

    /// Build a sequence classifier.
    fn build(&self, vb: VarBuilder) -> Result<Self::SequenceClassifier, BoxedError>;
}

impl<C> BuildSequenceClassifier for C
where
    C: BuildArchitecture + Debug,
    C::Architecture: SequenceClassifier,
{
    type SequenceClassifier = C::Architecture;

    fn build(&self, vb: VarBuilder) -> Result<Self::SequenceClassifier, BoxedError> {
        BuildArchitecture::build(self, vb)
    }
}

/// Trait for sequence classifiers.
pub trait SequenceClassifier {
    /// Classify a batch of sequences.
    ///
    /// Returns the encoder output and one row of logits per sequence.
    ///
    /// * `piece_ids` - Input sequences.
    ///   *Shape:* `(batch_size, seq_len)`
    /// * `train` - Whether to train the model.
    fn forward_t(
        &self,
        piece_ids: &Tensor,
        train: bool,
    ) -> Result<SequenceClassifierOutput, BoxedError>;
}
