use candle_core::{Module, Tensor, Var};
use candle_nn::{Embedding, VarBuilder};
use snafu::{ResultExt, Snafu};

use crate::architectures::{BuildEmbeddings, Embeddings};
use crate::error::BoxedError;

/// Pretrained piece embeddings configuration.
#[derive(Clone, Debug)]
pub struct PretrainedEmbeddingsConfig {
    embeddings: Tensor,
    freeze: bool,
    n_pieces: usize,
    width: usize,
}

impl PretrainedEmbeddingsConfig {
    /// Create an embeddings configuration from a pretrained table.
    ///
    /// * `embeddings` - Embedding table.
    ///   *Shape:* `(n_pieces, width)`
    pub fn new(embeddings: Tensor) -> Result<Self, PretrainedEmbeddingsError> {
        let (n_pieces, width) = embeddings.dims2().context(TableShapeSnafu)?;
        Ok(Self {
            embeddings,
            freeze: true,
            n_pieces,
            width,
        })
    }

    /// Keep the embedding table fixed during training.
    ///
    /// Default: `true`
    pub fn freeze(mut self, freeze: bool) -> Self {
        self.freeze = freeze;
        self
    }

    /// Number of pieces in the embedding table.
    pub fn n_pieces(&self) -> usize {
        self.n_pieces
    }

    /// Width of the embeddings.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Build pretrained embeddings.
    ///
    /// The table is copied to the device and data type of `vb`. It is not
    /// stored in `vb` itself, unfrozen tables are reported through
    /// [`Embeddings::trainable_vars`] instead.
    pub fn build(&self, vb: VarBuilder) -> Result<PretrainedEmbeddings, PretrainedEmbeddingsError> {
        let table = self
            .embeddings
            .to_device(vb.device())
            .and_then(|table| table.to_dtype(vb.dtype()))
            .context(ConstructionSnafu)?;

        // A frozen table is a plain tensor, so backprop never reaches it.
        let (table, var) = if self.freeze {
            (table, None)
        } else {
            let var = Var::from_tensor(&table).context(ConstructionSnafu)?;
            (var.as_tensor().clone(), Some(var))
        };

        Ok(PretrainedEmbeddings {
            piece_embeddings: Embedding::new(table, self.width),
            var,
            width: self.width,
        })
    }
}

impl BuildEmbeddings for PretrainedEmbeddingsConfig {
    fn build(&self, vb: VarBuilder) -> Result<Box<dyn Embeddings>, BoxedError> {
        Ok(Box::new(PretrainedEmbeddingsConfig::build(self, vb)?))
    }
}

/// Pretrained embeddings errors.
#[derive(Debug, Snafu)]
pub enum PretrainedEmbeddingsError {
    #[snafu(display("Cannot construct embeddings"))]
    Construction { source: candle_core::Error },

    #[snafu(display("Cannot look up piece embeddings"))]
    PieceEmbeddings { source: candle_core::Error },

    #[snafu(display("Embedding table must have shape (n_pieces, width)"))]
    TableShape { source: candle_core::Error },
}

/// Piece embeddings from a pretrained table.
///
/// There are no type or position embeddings, the representation of a piece
/// only depends on its identifier.
pub struct PretrainedEmbeddings {
    piece_embeddings: Embedding,
    var: Option<Var>,
    width: usize,
}

impl PretrainedEmbeddings {
    /// Look up the embeddings of the given pieces.
    ///
    /// * `piece_ids` - Piece identifiers.
    ///   *Shape:* `(batch_size, seq_len)`
    ///
    /// Returns the piece embeddings.
    /// *Shape:* `(batch_size, seq_len, width)`
    pub fn forward(&self, piece_ids: &Tensor) -> Result<Tensor, PretrainedEmbeddingsError> {
        self.piece_embeddings
            .forward(piece_ids)
            .context(PieceEmbeddingsSnafu)
    }

    /// Whether the embedding table is updated during training.
    pub fn is_frozen(&self) -> bool {
        self.var.is_none()
    }
}

impl Embeddings for PretrainedEmbeddings {
    fn forward(&self, piece_ids: &Tensor, _train: bool) -> Result<Tensor, BoxedError> {
        Ok(PretrainedEmbeddings::forward(self, piece_ids)?)
    }

    fn width(&self) -> usize {
        self.width
    }

    fn trainable_vars(&self) -> Vec<Var> {
        self.var.iter().cloned().collect()
    }
}
