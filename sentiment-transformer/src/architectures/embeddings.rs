use std::fmt::Debug;

use candle_core::{Tensor, Var};
use candle_nn::VarBuilder;

use crate::error::BoxedError;

/// Trait for embedding layers.
pub trait Embeddings {
    /// Look up the embeddings for the given piece identifiers.
    ///
    /// * `piece_ids` - Piece identifiers.
    ///   *Shape:* `(batch_size, seq_len)`
    /// * `train` - Whether to train the layer.
    ///
    /// Returns the piece embeddings.
    /// *Shape:* `(batch_size, seq_len, width)`
    fn forward(&self, piece_ids: &Tensor, train: bool) -> Result<Tensor, BoxedError>;

    /// Width of the embeddings.
    fn width(&self) -> usize;

    /// Variables of the layer that are updated during training.
    ///
    /// Only needed for variables that are not stored in the `VarBuilder`
    /// the layer was built with.
    fn trainable_vars(&self) -> Vec<Var> {
        Vec::new()
    }
}

/// Trait for building embedding layers.
pub trait BuildEmbeddings: Debug {
    /// Build an embedding layer.
    fn build(&self, vb: VarBuilder) -> Result<Box<dyn Embeddings>, BoxedError>;
}
