use candle_core::{Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder};
use snafu::{ensure, ResultExt, Snafu};

use crate::error::BoxedError;
use crate::layers::attention::{AttentionScorer, BuildAttentionScorer, SDPAConfig};

/// Self-attention configuration.
#[derive(Debug)]
pub struct SelfAttentionConfig {
    attention_scorer: Box<dyn BuildAttentionScorer>,
    hidden_width: usize,
}

impl SelfAttentionConfig {
    /// Attention scorer.
    ///
    /// Default: `SDPAConfig::default()`
    pub fn attention_scorer(mut self, attention_scorer: Box<dyn BuildAttentionScorer>) -> Self {
        self.attention_scorer = attention_scorer;
        self
    }

    /// Hidden width of the transformer.
    ///
    /// Default: `300`
    pub fn hidden_width(mut self, hidden_width: usize) -> Self {
        self.hidden_width = hidden_width;
        self
    }

    /// Build a self-attention layer.
    ///
    /// * `vb` - Variable store for the query, key and value projections.
    pub fn build(&self, vb: VarBuilder) -> Result<SelfAttention, SelfAttentionError> {
        let projection = |name: &str| {
            linear(self.hidden_width, self.hidden_width, vb.push_prefix(name))
                .context(SelfAttentionConstructionSnafu)
        };

        Ok(SelfAttention {
            attention_scorer: self
                .attention_scorer
                .build(vb.clone())
                .context(BuildAttentionScorerSnafu)?,
            hidden_width: self.hidden_width,
            key: projection("key")?,
            query: projection("query")?,
            value: projection("value")?,
        })
    }
}

impl Default for SelfAttentionConfig {
    fn default() -> Self {
        Self {
            attention_scorer: Box::<SDPAConfig>::default(),
            hidden_width: 300,
        }
    }
}

/// Errors for self-attention.
#[derive(Debug, Snafu)]
pub enum SelfAttentionError {
    #[snafu(display("Cannot apply attention scorer"))]
    AttentionScorer { source: BoxedError },

    #[snafu(display("Cannot build attention scorer"))]
    BuildAttentionScorer { source: BoxedError },

    #[snafu(display("Self-attention input must have shape (batch_size, seq_len, width)"))]
    InputShape { source: candle_core::Error },

    #[snafu(display("Cannot calculate key, query, or value"))]
    Qkv { source: candle_core::Error },

    #[snafu(display("Cannot construct layer"))]
    SelfAttentionConstruction { source: candle_core::Error },

    #[snafu(display("Self-attention expects hidden width {expected}, got {got}"))]
    WidthMismatch { expected: usize, got: usize },
}

/// Single-head transformer self-attention layer.
///
/// The input is projected to queries, keys and values with separate
/// affine transformations of the same width. The attention output is
/// returned as-is, there is no output projection.
///
/// See [Vaswani et al., 2017](https://arxiv.org/abs/1706.03762).
pub struct SelfAttention {
    attention_scorer: Box<dyn AttentionScorer>,
    hidden_width: usize,
    key: Linear,
    query: Linear,
    value: Linear,
}

impl SelfAttention {
    /// Apply self-attention to the input.
    ///
    /// * `input` - Input tensor.
    ///   *Shape:* `(batch_size, seq_len, width)`
    /// * `train` - Whether the model is trained.
    ///
    /// Returns: Hidden representations after attention.
    /// *Shape:* `(batch_size, seq_len, width)`
    pub fn forward(&self, input: &Tensor, train: bool) -> Result<Tensor, SelfAttentionError> {
        let (query, key, value) = self.qkv(input)?;
        self.attention_scorer
            .forward(&query, &key, &value, train)
            .context(AttentionScorerSnafu)
    }

    /// Attention weights for the input.
    ///
    /// * `input` - Input tensor.
    ///   *Shape:* `(batch_size, seq_len, width)`
    ///
    /// Returns: Attention weights.
    /// *Shape:* `(batch_size, seq_len, seq_len)`
    pub fn attention_weights(&self, input: &Tensor) -> Result<Tensor, SelfAttentionError> {
        let (query, key, _) = self.qkv(input)?;
        self.attention_scorer
            .attention_weights(&query, &key)
            .context(AttentionScorerSnafu)
    }

    fn qkv(&self, input: &Tensor) -> Result<(Tensor, Tensor, Tensor), SelfAttentionError> {
        let (_, _, width) = input.dims3().context(InputShapeSnafu)?;
        ensure!(
            width == self.hidden_width,
            WidthMismatchSnafu {
                expected: self.hidden_width,
                got: width
            }
        );

        let query = self.query.forward(input).context(QkvSnafu)?;
        let key = self.key.forward(input).context(QkvSnafu)?;
        let value = self.value.forward(input).context(QkvSnafu)?;

        Ok((query, key, value))
    }
}
