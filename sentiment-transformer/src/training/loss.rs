use candle_core::Tensor;

/// Binary cross-entropy of logits, averaged over the batch.
///
/// The loss is computed as `max(x, 0) - x * y + log(1 + exp(-|x|))`,
/// which does not overflow for logits of large magnitude.
///
/// * `logits` - Raw logits.
///   *Shape:* `(batch_size, 1)` or `(batch_size,)`
/// * `labels` - Labels in `[0, 1]`.
///   *Shape:* `(batch_size,)`
///
/// Returns the mean loss as a scalar tensor.
pub fn binary_cross_entropy_with_logits(
    logits: &Tensor,
    labels: &Tensor,
) -> candle_core::Result<Tensor> {
    let logits = logits.flatten_all()?;
    let labels = labels.flatten_all()?.to_dtype(logits.dtype())?;

    let log_term = logits
        .abs()?
        .neg()?
        .exp()?
        .affine(1.0, 1.0)?
        .log()?;

    logits
        .relu()?
        .sub(&logits.mul(&labels)?)?
        .add(&log_term)?
        .mean_all()
}
