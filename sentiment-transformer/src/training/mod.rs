//! Training and evaluation of sentiment classifiers.
//!
//! Gradients are computed by candle's autodiff and parameters are updated
//! by a `candle_nn` optimizer, the trainer only sequences the forward pass,
//! the loss and the optimizer step for every batch.

mod batch;
pub use batch::{SentimentBatch, SentimentBatchError};

mod loss;
pub use loss::binary_cross_entropy_with_logits;

mod metrics;
pub use metrics::{count_correct, EpochMetrics, Metrics, MetricsAccumulator};

mod trainer;
pub use trainer::{trainable_vars, Trainer, TrainerError, TrainingConfig};
