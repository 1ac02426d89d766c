use candle_core::ModuleT;
use candle_nn::{Dropout, VarBuilder};
use snafu::{ensure, Snafu};

use crate::error::BoxedError;
use crate::layers::build_module::BuildModule;

/// Dropout configuration.
///
/// Dropout is only applied when a module is called with `train == true`,
/// in evaluation mode it is the identity.
#[derive(Clone, Debug)]
pub struct DropoutConfig {
    p: f32,
}

impl DropoutConfig {
    /// Dropout probability.
    ///
    /// Default: `0.0`
    pub fn p(mut self, p: f32) -> Self {
        self.p = p;
        self
    }
}

impl Default for DropoutConfig {
    fn default() -> Self {
        Self { p: 0.0 }
    }
}

/// Dropout configuration errors.
#[derive(Debug, Snafu)]
pub enum DropoutConfigError {
    #[snafu(display("Dropout probability must be in [0, 1), was {p}"))]
    InvalidProbability { p: f32 },
}

impl BuildModule for DropoutConfig {
    fn build(&self, _vb: VarBuilder) -> Result<Box<dyn ModuleT>, BoxedError> {
        ensure!(
            (0.0..1.0).contains(&self.p),
            InvalidProbabilitySnafu { p: self.p }
        );
        Ok(Box::new(Dropout::new(self.p)))
    }
}
