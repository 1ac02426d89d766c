use candle_core::{ModuleT, Tensor};
use candle_nn::VarBuilder;
use snafu::{ensure, ResultExt, Snafu};

use crate::error::BoxedError;
use crate::layers::build_module::BuildModule;

/// Per-example layer norm configuration.
#[derive(Clone, Debug)]
pub struct LayerNormConfig {
    pub eps: f64,
    pub seq_len: usize,
    pub width: usize,
}

impl LayerNormConfig {
    /// Epsilon value.
    ///
    /// Default: `1e-8`
    pub fn eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    /// Sequence length of the normalized representations.
    ///
    /// Default: `500`
    pub fn seq_len(mut self, seq_len: usize) -> Self {
        self.seq_len = seq_len;
        self
    }

    /// Hidden width of the normalized representations.
    ///
    /// Default: `300`
    pub fn width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }
}

impl Default for LayerNormConfig {
    fn default() -> Self {
        Self {
            eps: 1e-8,
            seq_len: 500,
            width: 300,
        }
    }
}

impl BuildModule for LayerNormConfig {
    fn build(&self, vb: VarBuilder) -> Result<Box<dyn ModuleT>, BoxedError> {
        Ok(Box::new(ExampleLayerNorm::new(
            vb,
            self.seq_len,
            self.width,
            self.eps,
        )?))
    }
}

/// Per-example layer norm errors.
#[derive(Debug, Snafu)]
pub enum LayerNormError {
    #[snafu(display("Cannot apply affine transformation"))]
    Affine { source: candle_core::Error },

    #[snafu(display("Cannot construct layer norm parameters"))]
    Construction { source: candle_core::Error },

    #[snafu(display("Layer norm input must have shape (batch_size, seq_len, width)"))]
    InputShape { source: candle_core::Error },

    #[snafu(display("Cannot normalize representations"))]
    Normalize { source: candle_core::Error },

    #[snafu(display(
        "Layer norm expects (seq_len, width) = {expected:?}, got {got:?}"
    ))]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },
}

/// Layer normalization over all the representations of an example.
///
/// Unlike the layer norm of _Ba et al., 2016_ as it is normally used in
/// transformers, the statistics are *not* computed per sequence element.
/// Instead the whole `(seq_len, width)` slice of an example is flattened and
/// normalized using its mean and population variance:
///
/// `(x - mean) / sqrt(var + eps)`
///
/// The normalized slice is then scaled and shifted elementwise by a weight
/// and bias that both have shape `(seq_len, width)`, so every position has
/// its own affine parameters. As a consequence, the layer can only be
/// applied to sequences of the length it was constructed for.
///
/// * _Ba et al., 2016_: https://arxiv.org/abs/1607.06450
#[derive(Debug)]
pub struct ExampleLayerNorm {
    bias: Tensor,
    eps: f64,
    weight: Tensor,
}

impl ExampleLayerNorm {
    /// Construct a per-example layer norm.
    ///
    /// The weight is initialized to ones and the bias to zeros.
    ///
    /// * `vb` - Variable store.
    /// * `seq_len` - Sequence length of the inputs.
    /// * `width` - Hidden width of the inputs.
    /// * `eps` - Epsilon to avoid division by zero.
    pub fn new(
        vb: VarBuilder,
        seq_len: usize,
        width: usize,
        eps: f64,
    ) -> Result<Self, LayerNormError> {
        let weight = vb
            .get_with_hints((seq_len, width), "weight", candle_nn::init::ONE)
            .context(ConstructionSnafu)?;
        let bias = vb
            .get_with_hints((seq_len, width), "bias", candle_nn::init::ZERO)
            .context(ConstructionSnafu)?;
        Ok(Self { bias, eps, weight })
    }

    /// Normalize the input without applying the affine transformation.
    ///
    /// * `xs` - Representations to normalize.
    ///   *Shape:* `(batch_size, seq_len, width)`
    ///
    /// Returns the normalized representations.
    /// *Shape:* `(batch_size, seq_len, width)`
    pub fn normalize(&self, xs: &Tensor) -> Result<Tensor, LayerNormError> {
        let (batch_size, seq_len, width) = xs.dims3().context(InputShapeSnafu)?;
        let expected = self.weight.dims2().context(InputShapeSnafu)?;
        ensure!(
            expected == (seq_len, width),
            ShapeMismatchSnafu {
                expected,
                got: (seq_len, width)
            }
        );

        let flat = xs.flatten_from(1).context(NormalizeSnafu)?;
        let mean = flat.mean_keepdim(1).context(NormalizeSnafu)?;
        let centered = flat.broadcast_sub(&mean).context(NormalizeSnafu)?;

        // Population variance, so we cannot use `var_keepdim`.
        centered
            .sqr()
            .and_then(|xs| xs.mean_keepdim(1))
            .and_then(|variance| variance.affine(1.0, self.eps))
            .and_then(|variance| variance.sqrt())
            .and_then(|std| centered.broadcast_div(&std))
            .and_then(|xs| xs.reshape((batch_size, seq_len, width)))
            .context(NormalizeSnafu)
    }

    /// Normalize the input and apply the affine transformation.
    ///
    /// * `xs` - Representations to normalize.
    ///   *Shape:* `(batch_size, seq_len, width)`
    ///
    /// Returns the normalized representations.
    /// *Shape:* `(batch_size, seq_len, width)`
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor, LayerNormError> {
        self.normalize(xs)?
            .broadcast_mul(&self.weight)
            .and_then(|xs| xs.broadcast_add(&self.bias))
            .context(AffineSnafu)
    }
}

impl ModuleT for ExampleLayerNorm {
    fn forward_t(&self, xs: &Tensor, _train: bool) -> candle_core::Result<Tensor> {
        self.forward(xs).map_err(candle_core::Error::wrap)
    }
}
