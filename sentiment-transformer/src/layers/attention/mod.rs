use std::fmt::Debug;

use candle_core::Tensor;
use candle_nn::VarBuilder;

mod sdpa;
pub use sdpa::{SDPAConfig, SDPAError, SDPA};

mod self_attention;
pub use self_attention::{SelfAttention, SelfAttentionConfig, SelfAttentionError};

use crate::error::BoxedError;

/// Trait implemented by modules that perform attention scoring.
///
/// Attention is not masked: every sequence element attends to every
/// element of the same sequence, including itself.
pub trait AttentionScorer {
    /// Apply attention scores to the given key, query and value.
    ///
    /// * `query` - Query tensor.
    ///   *Shape:* `(batch_size, seq_len, width)`
    /// * `key` - Key tensor.
    ///   *Shape:* `(batch_size, seq_len, width)`
    /// * `value` - Value tensor.
    ///   *Shape:* `(batch_size, seq_len, width)`
    /// * `train` - Whether the model is trained.
    ///
    /// Returns: Attention values.
    /// *Shape:* `(batch_size, seq_len, width)`
    fn forward(
        &self,
        query: &Tensor,
        key: &Tensor,
        value: &Tensor,
        train: bool,
    ) -> Result<Tensor, BoxedError>;

    /// Compute the attention weights of queries over keys.
    ///
    /// * `query` - Query tensor.
    ///   *Shape:* `(batch_size, seq_len, width)`
    /// * `key` - Key tensor.
    ///   *Shape:* `(batch_size, seq_len, width)`
    ///
    /// Returns: Attention weights, a distribution over the keys for each
    /// query.
    /// *Shape:* `(batch_size, seq_len, seq_len)`
    fn attention_weights(&self, query: &Tensor, key: &Tensor) -> Result<Tensor, BoxedError>;
}

/// Build an attention scorer module.
pub trait BuildAttentionScorer: Debug {
    /// Build an attention scorer.
    ///
    /// * `vb` - Variable builder used for attention parameters.
    fn build(&self, vb: VarBuilder) -> Result<Box<dyn AttentionScorer>, BoxedError>;
}
