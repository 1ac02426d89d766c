//! Transformer sentiment classifier.

mod classifier;
pub use classifier::{SentimentTransformer, SentimentTransformerConfig, SentimentTransformerError};

mod config;
pub use config::{ConfigError, SentimentModelConfig};
pub(crate) use config::{read_json, read_json_file};
