use candle_core::{DType, Tensor};
use snafu::{ensure, ResultExt, Snafu};

/// Batch errors.
#[derive(Debug, Snafu)]
pub enum SentimentBatchError {
    #[snafu(display("Batch has {n_sequences} sequences, but {n_labels} labels"))]
    BatchSizeMismatch { n_sequences: usize, n_labels: usize },

    #[snafu(display("Cannot convert labels"))]
    LabelsDType { source: candle_core::Error },

    #[snafu(display("Labels must have shape (batch_size,)"))]
    LabelsShape { source: candle_core::Error },

    #[snafu(display("Piece identifiers must have shape (batch_size, seq_len)"))]
    PieceIdsShape { source: candle_core::Error },
}

/// A batch of labeled sequences.
///
/// Sequences must already be padded or truncated to the length that the
/// model expects.
#[derive(Clone, Debug)]
pub struct SentimentBatch {
    labels: Tensor,
    piece_ids: Tensor,
}

impl SentimentBatch {
    /// Create a batch.
    ///
    /// * `piece_ids` - Piece identifiers.
    ///   *Shape:* `(batch_size, seq_len)`
    /// * `labels` - Labels, `1` for positive and `0` for negative sentiment.
    ///   They are converted to `f32`.
    ///   *Shape:* `(batch_size,)`
    pub fn new(piece_ids: Tensor, labels: Tensor) -> Result<Self, SentimentBatchError> {
        let (n_sequences, _) = piece_ids.dims2().context(PieceIdsShapeSnafu)?;
        let n_labels = labels.dims1().context(LabelsShapeSnafu)?;
        ensure!(
            n_sequences == n_labels,
            BatchSizeMismatchSnafu {
                n_sequences,
                n_labels
            }
        );

        Ok(Self {
            labels: labels.to_dtype(DType::F32).context(LabelsDTypeSnafu)?,
            piece_ids,
        })
    }

    /// Number of sequences in the batch.
    pub fn batch_size(&self) -> usize {
        self.labels.dims()[0]
    }

    /// Labels.
    ///
    /// *Shape:* `(batch_size,)`
    pub fn labels(&self) -> &Tensor {
        &self.labels
    }

    /// Piece identifiers.
    ///
    /// *Shape:* `(batch_size, seq_len)`
    pub fn piece_ids(&self) -> &Tensor {
        &self.piece_ids
    }
}
