use std::fs::File;
use std::path::{Path, PathBuf};

use candle_core::quantized::gguf_file;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaConfig};
use candle_transformers::models::quantized_llama::ModelWeights;
use tracing::info;

use super::{read_eos_token_ids, LanguageModel};
use crate::error::{InferenceError, Result};

/// Parses a Llama `config.json` along with its end-of-sequence ids.
fn parse_model_config(config_str: &str) -> Result<(LlamaConfig, Vec<u32>)> {
    let config_json: serde_json::Value =
        serde_json::from_str(config_str).map_err(|e| InferenceError::Config(e.to_string()))?;
    let eos_token_ids = read_eos_token_ids(&config_json);
    let llama_config: LlamaConfig =
        serde_json::from_value(config_json).map_err(|e| InferenceError::Config(e.to_string()))?;
    Ok((llama_config, eos_token_ids))
}

/// Llama 3 loaded from safetensors at 16- or 32-bit precision.
pub struct LlamaModel {
    model: Llama,
    cache: Cache,
    config: Config,
    dtype: DType,
    device: Device,
    eos_token_ids: Vec<u32>,
}

impl LlamaModel {
    pub fn load(
        config_path: &Path,
        weight_paths: &[PathBuf],
        dtype: DType,
        device: &Device,
    ) -> Result<Self> {
        info!("Loading Llama model configuration...");
        let (llama_config, eos_token_ids) =
            parse_model_config(&std::fs::read_to_string(config_path)?)?;
        let config = llama_config.into_config(false);

        info!(
            "Model config: vocab_size={}, hidden_size={}, num_layers={}, num_heads={}",
            config.vocab_size,
            config.hidden_size,
            config.num_hidden_layers,
            config.num_attention_heads
        );

        info!("Loading model weights as {:?}...", dtype);
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(weight_paths, dtype, device)? };

        info!("Building model...");
        let model = Llama::load(vb, &config)?;
        let cache = Cache::new(true, dtype, &config, device)?;

        info!("Llama model loaded successfully");
        Ok(Self {
            model,
            cache,
            config,
            dtype,
            device: device.clone(),
            eos_token_ids,
        })
    }
}

impl LanguageModel for LlamaModel {
    fn forward(&mut self, input_ids: &Tensor, position: usize) -> Result<Tensor> {
        let logits = self.model.forward(input_ids, position, &mut self.cache)?;
        Ok(logits)
    }

    fn reset_cache(&mut self) -> Result<()> {
        self.cache = Cache::new(true, self.dtype, &self.config, &self.device)?;
        Ok(())
    }

    fn eos_token_ids(&self) -> &[u32] {
        &self.eos_token_ids
    }
}

/// Llama 3 loaded from a 4-bit GGUF file.
pub struct QuantizedLlamaModel {
    model: ModelWeights,
    eos_token_ids: Vec<u32>,
}

impl QuantizedLlamaModel {
    pub fn load(config_path: &Path, gguf_path: &Path, device: &Device) -> Result<Self> {
        let (_, eos_token_ids) = parse_model_config(&std::fs::read_to_string(config_path)?)?;

        info!("Reading quantized weights from {:?}", gguf_path);
        let mut file = File::open(gguf_path)?;
        let content = gguf_file::Content::read(&mut file)
            .map_err(|e| InferenceError::ModelLoad(format!("{:?}: {}", gguf_path, e)))?;

        info!(
            "GGUF file holds {} tensors, {} metadata entries",
            content.tensor_infos.len(),
            content.metadata.len()
        );

        let model = ModelWeights::from_gguf(content, &mut file, device)?;

        info!("Quantized Llama model loaded successfully");
        Ok(Self {
            model,
            eos_token_ids,
        })
    }
}

impl LanguageModel for QuantizedLlamaModel {
    fn forward(&mut self, input_ids: &Tensor, position: usize) -> Result<Tensor> {
        let logits = self.model.forward(input_ids, position)?;
        Ok(logits)
    }

    // The quantized layers discard their KV cache whenever a forward pass starts at position 0.
    fn reset_cache(&mut self) -> Result<()> {
        Ok(())
    }

    fn eos_token_ids(&self) -> &[u32] {
        &self.eos_token_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LLAMA3_8B_CONFIG: &str = r#"{
        "architectures": ["LlamaForCausalLM"],
        "bos_token_id": 128000,
        "eos_token_id": 128009,
        "hidden_size": 4096,
        "intermediate_size": 14336,
        "max_position_embeddings": 8192,
        "model_type": "llama",
        "num_attention_heads": 32,
        "num_hidden_layers": 32,
        "num_key_value_heads": 8,
        "rms_norm_eps": 1e-05,
        "rope_theta": 500000.0,
        "tie_word_embeddings": false,
        "vocab_size": 128256
    }"#;

    #[test]
    fn parses_llama3_config() {
        let (llama_config, eos) = parse_model_config(LLAMA3_8B_CONFIG).unwrap();
        assert_eq!(eos, vec![128009]);

        let config = llama_config.into_config(false);
        assert_eq!(config.vocab_size, 128256);
        assert_eq!(config.num_key_value_heads, 8);
    }

    #[test]
    fn malformed_config_is_a_config_error() {
        let err = parse_model_config("{\"hidden_size\": 4096,").unwrap_err();
        assert!(matches!(err, InferenceError::Config(_)));

        let err = parse_model_config(r#"{"eos_token_id": 2}"#).unwrap_err();
        assert!(matches!(err, InferenceError::Config(_)));
    }
}
