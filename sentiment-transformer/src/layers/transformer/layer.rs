use candle_core::{ModuleT, Tensor};
use candle_nn::VarBuilder;
use snafu::{ResultExt, Snafu};

use crate::architectures::{BuildEncoderLayer, EncoderLayer};
use crate::error::BoxedError;
use crate::layers::attention::{SelfAttention, SelfAttentionConfig, SelfAttentionError};
use crate::layers::build_module::BuildModule;
use crate::layers::dropout::DropoutConfig;
use crate::layers::feedforward::{
    PointwiseFeedForward, PointwiseFeedForwardConfig, PointwiseFeedForwardError,
};
use crate::layers::layer_norm::LayerNormConfig;

/// Transformer layer configuration.
#[derive(Debug)]
pub struct TransformerLayerConfig {
    attention: SelfAttentionConfig,
    attn_dropout: Box<dyn BuildModule>,
    attn_residual_layer_norm: Box<dyn BuildModule>,
    feedforward: PointwiseFeedForwardConfig,
    ffn_residual_layer_norm: Box<dyn BuildModule>,
}

impl TransformerLayerConfig {
    /// Attention layer configuration.
    ///
    /// Default: `SelfAttentionConfig::default()`
    pub fn attention(mut self, attention: SelfAttentionConfig) -> Self {
        self.attention = attention;
        self
    }

    /// Dropout applied to the attention output, before the residual
    /// connection.
    ///
    /// Default: `DropoutConfig::default().p(0.1)`
    pub fn attn_dropout(mut self, attn_dropout: Box<dyn BuildModule>) -> Self {
        self.attn_dropout = attn_dropout;
        self
    }

    /// Layer norm applied after the attention residual connection.
    ///
    /// Default: `LayerNormConfig::default()`
    pub fn attn_residual_layer_norm(
        mut self,
        attn_residual_layer_norm: Box<dyn BuildModule>,
    ) -> Self {
        self.attn_residual_layer_norm = attn_residual_layer_norm;
        self
    }

    /// Feed-forward layer configuration.
    ///
    /// Default: `PointwiseFeedForwardConfig::default()`
    pub fn feedforward(mut self, feedforward: PointwiseFeedForwardConfig) -> Self {
        self.feedforward = feedforward;
        self
    }

    /// Layer norm applied after the feed-forward residual connection.
    ///
    /// Default: `LayerNormConfig::default()`
    pub fn ffn_residual_layer_norm(mut self, ffn_residual_layer_norm: Box<dyn BuildModule>) -> Self {
        self.ffn_residual_layer_norm = ffn_residual_layer_norm;
        self
    }

    /// Build a transformer layer.
    pub fn build(&self, vb: VarBuilder) -> Result<TransformerLayer, TransformerLayerError> {
        Ok(TransformerLayer {
            attention: self
                .attention
                .build(vb.push_prefix("attention"))
                .context(BuildAttentionSnafu)?,
            attn_dropout: self
                .attn_dropout
                .build(vb.push_prefix("attn_dropout"))
                .context(BuildDropoutSnafu)?,
            attn_residual_layer_norm: self
                .attn_residual_layer_norm
                .build(vb.push_prefix("attn_residual_layer_norm"))
                .context(BuildLayerNormSnafu)?,
            ffn: self
                .feedforward
                .build(vb.push_prefix("ffn"))
                .context(BuildFeedForwardSnafu)?,
            ffn_residual_layer_norm: self
                .ffn_residual_layer_norm
                .build(vb.push_prefix("ffn_residual_layer_norm"))
                .context(BuildLayerNormSnafu)?,
        })
    }
}

impl Default for TransformerLayerConfig {
    fn default() -> Self {
        Self {
            attention: SelfAttentionConfig::default(),
            attn_dropout: Box::new(DropoutConfig::default().p(0.1)),
            attn_residual_layer_norm: Box::<LayerNormConfig>::default(),
            feedforward: PointwiseFeedForwardConfig::default(),
            ffn_residual_layer_norm: Box::<LayerNormConfig>::default(),
        }
    }
}

impl BuildEncoderLayer for TransformerLayerConfig {
    fn build_encoder_layer(&self, vb: VarBuilder) -> Result<Box<dyn EncoderLayer>, BoxedError> {
        Ok(Box::new(self.build(vb)?))
    }
}

/// Errors for transformer layers.
#[derive(Debug, Snafu)]
pub enum TransformerLayerError {
    #[snafu(display("Cannot build attention layer"))]
    BuildAttention { source: SelfAttentionError },

    #[snafu(display("Cannot build dropout"))]
    BuildDropout { source: BoxedError },

    #[snafu(display("Cannot build feed-forward layer"))]
    BuildFeedForward { source: PointwiseFeedForwardError },

    #[snafu(display("Cannot build layer norm"))]
    BuildLayerNorm { source: BoxedError },

    #[snafu(display("Cannot apply point-wise feed-forward layer"))]
    FeedForward { source: candle_core::Error },

    #[snafu(display("Cannot apply residual connection"))]
    Residual { source: candle_core::Error },

    #[snafu(display("Cannot apply self-attention"))]
    SelfAttention { source: SelfAttentionError },
}

/// Transformer encoder layer.
///
/// The layer uses post-norm residual connections:
///
/// * `h = norm_1(dropout(attention(x)) + x)`
/// * `y = norm_2(ffn(h) + h)`
///
/// See [Vaswani et al. (2017)](https://arxiv.org/abs/1706.03762).
pub struct TransformerLayer {
    attention: SelfAttention,
    attn_dropout: Box<dyn ModuleT>,
    attn_residual_layer_norm: Box<dyn ModuleT>,
    ffn: PointwiseFeedForward,
    ffn_residual_layer_norm: Box<dyn ModuleT>,
}

impl TransformerLayer {
    /// Apply the transformer layer to the given hidden representations.
    ///
    /// * `input` - Hidden representations to apply the layer to.
    ///   *Shape:* `(batch_size, seq_len, width)`
    /// * `train` - Whether to train the layer. Dropout is only applied
    ///   when training.
    ///
    /// Returns layer output.
    /// *Shape:* `(batch_size, seq_len, width)`
    pub fn forward(&self, input: &Tensor, train: bool) -> Result<Tensor, TransformerLayerError> {
        let attn_out = self
            .attention
            .forward(input, train)
            .context(SelfAttentionSnafu)?;

        let residual = self
            .attn_dropout
            .forward_t(&attn_out, train)
            .and_then(|xs| xs + input)
            .and_then(|xs| self.attn_residual_layer_norm.forward_t(&xs, train))
            .context(ResidualSnafu)?;

        let ffn_out = self
            .ffn
            .forward_t(&residual, train)
            .context(FeedForwardSnafu)?;

        (ffn_out + &residual)
            .and_then(|xs| self.ffn_residual_layer_norm.forward_t(&xs, train))
            .context(ResidualSnafu)
    }
}

impl EncoderLayer for TransformerLayer {
    fn forward_t(&self, input: &Tensor, train: bool) -> Result<Tensor, BoxedError> {
        Ok(self.forward(input, train)?)
    }
}
