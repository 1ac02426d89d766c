use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use candle_core::Tensor;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::layers::activation::Activation;
use crate::layers::attention::SelfAttentionConfig;
use crate::layers::dropout::DropoutConfig;
use crate::layers::feedforward::PointwiseFeedForwardConfig;
use crate::layers::layer_norm::LayerNormConfig;
use crate::layers::transformer::{
    PretrainedEmbeddingsConfig, PretrainedEmbeddingsError, TransformerLayerConfig,
};
use crate::models::sentiment::SentimentTransformerConfig;
use crate::models::transformer::TransformerEncoderConfig;

/// Model configuration errors.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Cannot use embedding table"))]
    Embeddings { source: PretrainedEmbeddingsError },

    #[snafu(display("Cannot open configuration file: {}", path.to_string_lossy()))]
    OpenConfig {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("Cannot parse configuration"))]
    ParseConfig { source: serde_json::Error },
}

/// Read a JSON configuration file.
pub(crate) fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let reader = BufReader::new(File::open(path).context(OpenConfigSnafu { path })?);
    read_json(reader)
}

/// Read a JSON configuration.
pub(crate) fn read_json<T: DeserializeOwned, R: Read>(reader: R) -> Result<T, ConfigError> {
    serde_json::from_reader(reader).context(ParseConfigSnafu)
}

/// Serializable sentiment model configuration.
///
/// Missing fields take their default values. The hidden width is not
/// part of the configuration, it is always the width of the pretrained
/// embedding table.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct SentimentModelConfig {
    /// Probability of dropout on the attention output.
    pub dropout_prob: f32,

    /// Keep the pretrained embeddings fixed during training.
    pub freeze_embeddings: bool,

    /// Activation of the feed-forward layers.
    pub hidden_act: Activation,

    /// Epsilon of the layer norms.
    pub layer_norm_eps: f64,

    /// Length that all input sequences are padded or truncated to.
    pub max_seq_len: usize,

    /// Number of transformer blocks.
    pub n_blocks: usize,
}

impl Default for SentimentModelConfig {
    fn default() -> Self {
        Self {
            dropout_prob: 0.1,
            freeze_embeddings: true,
            hidden_act: Activation::Relu,
            layer_norm_eps: 1e-8,
            max_seq_len: 500,
            n_blocks: 1,
        }
    }
}

impl SentimentModelConfig {
    /// Read the configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        read_json_file(path.as_ref())
    }

    /// Read the configuration as JSON.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        read_json(reader)
    }

    /// Convert to a model configuration.
    ///
    /// * `embeddings` - Pretrained embedding table.
    ///   *Shape:* `(n_pieces, width)`
    pub fn transformer_config(
        &self,
        embeddings: Tensor,
    ) -> Result<SentimentTransformerConfig, ConfigError> {
        let embeddings = PretrainedEmbeddingsConfig::new(embeddings)
            .context(EmbeddingsSnafu)?
            .freeze(self.freeze_embeddings);
        let hidden_width = embeddings.width();

        let layer_norm = LayerNormConfig::default()
            .eps(self.layer_norm_eps)
            .seq_len(self.max_seq_len)
            .width(hidden_width);

        let layer = TransformerLayerConfig::default()
            .attention(SelfAttentionConfig::default().hidden_width(hidden_width))
            .attn_dropout(Box::new(DropoutConfig::default().p(self.dropout_prob)))
            .attn_residual_layer_norm(Box::new(layer_norm.clone()))
            .feedforward(
                PointwiseFeedForwardConfig::default()
                    .activation(Box::new(self.hidden_act))
                    .hidden_width(hidden_width)
                    .intermediate_width(hidden_width),
            )
            .ffn_residual_layer_norm(Box::new(layer_norm));

        let encoder = TransformerEncoderConfig::new(Box::new(embeddings))
            .layer(Box::new(layer))
            .n_hidden_layers(self.n_blocks);

        Ok(SentimentTransformerConfig::new(encoder, hidden_width).max_seq_len(self.max_seq_len))
    }
}
