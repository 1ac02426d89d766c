use std::error::Error;

/// Alias for boxed errors that can be sent across threads.
///
/// Used at trait-object seams (layers, encoders, classifiers), where the
/// concrete error type of the implementation is not known.
pub type BoxedError = Box<dyn Error + Send + Sync>;
