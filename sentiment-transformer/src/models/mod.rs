pub mod sentiment;
pub use sentiment::{SentimentModelConfig, SentimentTransformer, SentimentTransformerConfig};

pub mod transformer;
