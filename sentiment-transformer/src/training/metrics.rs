use candle_core::{DType, Tensor};
use serde::Serialize;

/// Loss and accuracy on a set of batches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Metrics {
    /// Fraction of correctly classified examples.
    pub accuracy: f32,

    /// Loss, averaged over batches.
    pub loss: f32,
}

/// Metrics after a training epoch.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train: Metrics,
    pub validation: Metrics,
    pub test: Option<Metrics>,
}

/// Accumulates batch losses and predictions.
#[derive(Debug, Default)]
pub struct MetricsAccumulator {
    loss_sum: f64,
    n_batches: usize,
    n_correct: usize,
    n_examples: usize,
}

impl MetricsAccumulator {
    /// Add the loss and predictions of a batch.
    ///
    /// * `loss` - Mean loss of the batch.
    /// * `logits` - Logits of the batch.
    ///   *Shape:* `(batch_size, 1)`
    /// * `labels` - Labels of the batch.
    ///   *Shape:* `(batch_size,)`
    pub fn add_batch(
        &mut self,
        loss: f32,
        logits: &Tensor,
        labels: &Tensor,
    ) -> candle_core::Result<()> {
        self.n_correct += count_correct(logits, labels)?;
        self.n_examples += labels.elem_count();
        self.loss_sum += loss as f64;
        self.n_batches += 1;
        Ok(())
    }

    /// Metrics of the batches added so far.
    ///
    /// Loss and accuracy are both zero when no batches were added.
    pub fn metrics(&self) -> Metrics {
        let loss = if self.n_batches == 0 {
            0.
        } else {
            (self.loss_sum / self.n_batches as f64) as f32
        };
        let accuracy = if self.n_examples == 0 {
            0.
        } else {
            self.n_correct as f32 / self.n_examples as f32
        };
        Metrics { accuracy, loss }
    }
}

/// Count the examples that are classified correctly.
///
/// An example is predicted to be positive when the logistic function of
/// its logit is at least `0.5`, which is the case iff the logit is
/// non-negative.
///
/// * `logits` - Logits.
///   *Shape:* `(batch_size, 1)` or `(batch_size,)`
/// * `labels` - Labels, `1` for positive and `0` for negative.
///   *Shape:* `(batch_size,)`
pub fn count_correct(logits: &Tensor, labels: &Tensor) -> candle_core::Result<usize> {
    let logits = logits.flatten_all()?;
    let predictions = logits.ge(&logits.zeros_like()?)?.to_dtype(DType::F32)?;
    let labels = labels.flatten_all()?.to_dtype(DType::F32)?;
    let n_correct = predictions
        .eq(&labels)?
        .to_dtype(DType::U32)?
        .sum_all()?
        .to_scalar::<u32>()?;
    Ok(n_correct as usize)
}
