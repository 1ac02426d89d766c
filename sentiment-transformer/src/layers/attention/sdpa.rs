use candle_core::{ModuleT, Tensor, D};
use candle_nn::ops::softmax;
use candle_nn::VarBuilder;
use snafu::{ResultExt, Snafu};

use crate::error::BoxedError;
use crate::layers::attention::{AttentionScorer, BuildAttentionScorer};
use crate::layers::build_module::BuildModule;
use crate::layers::identity::Identity;

/// Configuration for scaled dot-product attention.
#[derive(Debug)]
pub struct SDPAConfig {
    dropout: Box<dyn BuildModule>,
}

impl SDPAConfig {
    /// Dropout to apply after attention.
    ///
    /// Default: `Identity`.
    pub fn dropout(mut self, dropout: Box<dyn BuildModule>) -> Self {
        self.dropout = dropout;
        self
    }
}

impl Default for SDPAConfig {
    fn default() -> Self {
        Self {
            dropout: Box::new(Identity),
        }
    }
}

impl BuildAttentionScorer for SDPAConfig {
    fn build(&self, vb: VarBuilder) -> Result<Box<dyn AttentionScorer>, BoxedError> {
        Ok(Box::new(SDPA {
            dropout: self.dropout.build(vb).context(BuildDropoutSnafu)?,
        }))
    }
}

/// Errors for scaled dot-product attention.
#[derive(Debug, Snafu)]
pub enum SDPAError {
    #[snafu(display("Cannot calculate attention scores"))]
    AttentionScores { source: candle_core::Error },

    #[snafu(display("Cannot weigh representations using attention weights"))]
    AttentionWeight { source: candle_core::Error },

    #[snafu(display("Cannot build dropout module"))]
    BuildDropout { source: BoxedError },

    #[snafu(display("Cannot apply dropout"))]
    Dropout { source: candle_core::Error },

    #[snafu(display("Cannot apply softmax"))]
    Softmax { source: candle_core::Error },

    #[snafu(display("Cannot apply softmax temperature"))]
    Temperature { source: candle_core::Error },
}

/// Scaled dot-product attention.
///
/// See [Vaswani et al., 2017](https://arxiv.org/abs/1706.03762).
pub struct SDPA {
    dropout: Box<dyn ModuleT>,
}

impl SDPA {
    /// Attention weights, `softmax(QKᵀ / sqrt(width))`.
    fn weights(query: &Tensor, key: &Tensor) -> Result<Tensor, SDPAError> {
        let query = query.contiguous().context(AttentionScoresSnafu)?;
        let attn_scores = key
            .contiguous()
            .and_then(|key| key.t())
            .and_then(|key| query.broadcast_matmul(&key))
            .context(AttentionScoresSnafu)?;

        // Without the temperature, large dot products push the softmax into
        // regions with tiny gradients.
        let model_width = key.dim(D::Minus1).context(TemperatureSnafu)?;
        let temperature = (model_width as f64).sqrt();
        let attn_scores = (attn_scores / temperature).context(TemperatureSnafu)?;

        softmax(&attn_scores, D::Minus1).context(SoftmaxSnafu)
    }
}

impl AttentionScorer for SDPA {
    fn forward(
        &self,
        query: &Tensor,
        key: &Tensor,
        value: &Tensor,
        train: bool,
    ) -> Result<Tensor, BoxedError> {
        let attn_weights = Self::weights(query, key)?;
        let output = value
            .contiguous()
            .and_then(|value| attn_weights.broadcast_matmul(&value))
            .context(AttentionWeightSnafu)?;
        Ok(self
            .dropout
            .forward_t(&output, train)
            .context(DropoutSnafu)?)
    }

    fn attention_weights(&self, query: &Tensor, key: &Tensor) -> Result<Tensor, BoxedError> {
        Ok(Self::weights(query, key)?)
    }
}
