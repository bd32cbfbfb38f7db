mod llama;
mod loader;
mod session;

pub use llama::{LlamaModel, QuantizedLlamaModel};
pub use loader::HubLoader;
pub use session::ModelSession;

use candle_core::{Device, Tensor};

use crate::config::{LoadOptions, Precision};
use crate::error::Result;
use crate::tokenizer::TokenizerWrapper;

/// Trait for language models that can generate next token logits
pub trait LanguageModel: Send + Sync {
    /// Forward pass to get logits for the next token
    fn forward(&mut self, input_ids: &Tensor, position: usize) -> Result<Tensor>;

    /// Reset the model's KV cache
    fn reset_cache(&mut self) -> Result<()>;

    /// End-of-sequence token ids declared by the model config
    fn eos_token_ids(&self) -> &[u32];
}

/// Builds a ready-to-use model session from load options.
pub trait ModelLoader: Send + Sync {
    fn load(&self, options: &LoadOptions) -> Result<LoadedModel>;
}

/// Weights, tokenizer and device of a loaded model.
pub struct LoadedModel {
    pub model: Box<dyn LanguageModel>,
    pub tokenizer: TokenizerWrapper,
    pub device: Device,
    pub model_id: String,
    /// Precision asked for; the session is keyed on it.
    pub requested_precision: Precision,
    /// Precision in effect after hardware fallback.
    pub precision: Precision,
}

impl LoadedModel {
    pub fn matches(&self, options: &LoadOptions) -> bool {
        self.model_id == options.model_id && self.requested_precision == options.precision
    }
}

/// Reads `eos_token_id` from a Hugging Face `config.json`, which may hold a single id or a list.
pub fn read_eos_token_ids(config: &serde_json::Value) -> Vec<u32> {
    match config.get("eos_token_id") {
        Some(serde_json::Value::Number(n)) => n.as_u64().map(|id| id as u32).into_iter().collect(),
        Some(serde_json::Value::Array(ids)) => ids
            .iter()
            .filter_map(|v| v.as_u64())
            .map(|id| id as u32)
            .collect(),
        _ => Vec::new(),
    }
}
