//! Transformer encoder for binary sentiment classification.
//!
//! The encoder looks up pretrained piece embeddings, applies a stack of
//! transformer layers and mean-pools the result into a single logit per
//! sequence. Gradients and parameter updates are delegated to candle.

pub mod architectures;
pub mod error;
pub mod layers;
pub mod models;
pub mod training;

#[cfg(test)]
pub(crate) mod util;
