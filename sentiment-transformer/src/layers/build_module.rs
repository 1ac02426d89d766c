use std::fmt::Debug;

use candle_core::ModuleT;
use candle_nn::VarBuilder;

use crate::error::BoxedError;

/// Trait for configurations that build a module.
///
/// Configurable sublayers (dropout, activation, normalization) are stored
/// as `Box<dyn BuildModule>` in layer configurations, so that a layer can
/// be assembled without knowing the concrete sublayer types.
pub trait BuildModule: Debug {
    /// Build the module, taking its parameters (if any) from `vb`.
    fn build(&self, vb: VarBuilder) -> Result<Box<dyn ModuleT>, BoxedError>;
}
