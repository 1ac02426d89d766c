mod embeddings;
pub use embeddings::{PretrainedEmbeddings, PretrainedEmbeddingsConfig, PretrainedEmbeddingsError};

mod layer;
pub use layer::{TransformerLayer, TransformerLayerConfig, TransformerLayerError};
