use std::collections::BTreeSet;
use std::path::PathBuf;

use hf_hub::{
    api::sync::{Api, ApiBuilder, ApiRepo},
    Repo, RepoType,
};
use tracing::{info, warn};

use super::{LanguageModel, LlamaModel, LoadedModel, ModelLoader, QuantizedLlamaModel};
use crate::config::{LoadOptions, Precision};
use crate::device::{device_label, select_device};
use crate::error::{InferenceError, Result};
use crate::tokenizer::TokenizerWrapper;

/// Loads models from the Hugging Face Hub (or its local cache).
#[derive(Debug, Default, Clone, Copy)]
pub struct HubLoader;

impl ModelLoader for HubLoader {
    fn load(&self, options: &LoadOptions) -> Result<LoadedModel> {
        info!(
            "Starting model loading: {} ({})",
            options.model_id, options.precision
        );
        if let Some(dir) = &options.cache_dir {
            info!("Cache directory: {:?}", dir);
        }

        let device = select_device(options.force_cpu)?;

        let precision = options.precision.resolve(&device);
        if precision != options.precision {
            warn!(
                "{} precision needs an accelerator, loading {} instead",
                options.precision, precision
            );
        }

        let api = hub_api(options)?;
        let repo = api.repo(Repo::with_revision(
            options.model_id.clone(),
            RepoType::Model,
            options.revision.clone(),
        ));

        info!("Downloading config.json...");
        let config = fetch(&repo, "config.json")?;

        info!("Downloading tokenizer...");
        let tokenizer = TokenizerWrapper::load(&fetch(&repo, "tokenizer.json")?)?;

        let model: Box<dyn LanguageModel> = match precision {
            Precision::FourBit => {
                info!(
                    "Downloading quantized weights {}/{}...",
                    options.quantized_repo, options.quantized_file
                );
                let gguf = fetch(&api.model(options.quantized_repo.clone()), &options.quantized_file)?;
                Box::new(QuantizedLlamaModel::load(&config, &gguf, &device)?)
            }
            Precision::SixteenBit | Precision::ThirtyTwoBit => {
                info!("Downloading model weights...");
                let weights = download_weights(&repo)?;
                Box::new(LlamaModel::load(&config, &weights, precision.dtype(), &device)?)
            }
        };

        info!(
            "Model '{}' ({}) loaded successfully on {}, vocabulary size {}",
            options.model_id,
            precision,
            device_label(&device),
            tokenizer.vocab_size()
        );

        Ok(LoadedModel {
            model,
            tokenizer,
            device,
            model_id: options.model_id.clone(),
            requested_precision: options.precision,
            precision,
        })
    }
}

fn hub_api(options: &LoadOptions) -> Result<Api> {
    let mut builder = ApiBuilder::new().with_token(options.hf_token.clone());
    if let Some(dir) = &options.cache_dir {
        builder = builder.with_cache_dir(dir.clone());
    }
    builder.build().map_err(|e| InferenceError::Hub(e.to_string()))
}

fn fetch(repo: &ApiRepo, filename: &str) -> Result<PathBuf> {
    repo.get(filename)
        .map_err(|e| InferenceError::Hub(format!("Failed to download {}: {}", filename, e)))
}

fn download_weights(repo: &ApiRepo) -> Result<Vec<PathBuf>> {
    if let Ok(path) = repo.get("model.safetensors") {
        return Ok(vec![path]);
    }

    // Sharded checkpoints list their shards in the index's weight_map.
    let index_path = fetch(repo, "model.safetensors.index.json").map_err(|_| {
        InferenceError::Hub(
            "Could not find model weights (tried model.safetensors and model.safetensors.index.json)"
                .to_string(),
        )
    })?;
    let index: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(index_path)?)?;

    shard_names(&index)?
        .iter()
        .map(|name| fetch(repo, name))
        .collect()
}

fn shard_names(index: &serde_json::Value) -> Result<BTreeSet<String>> {
    let weight_map = index
        .get("weight_map")
        .and_then(|v| v.as_object())
        .ok_or_else(|| InferenceError::ModelLoad("weight_map missing from safetensors index".to_string()))?;

    Ok(weight_map
        .values()
        .filter_map(|v| v.as_str())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn shard_names_are_deduplicated_and_ordered() {
        let index = json!({
            "metadata": {"total_size": 16060522496u64},
            "weight_map": {
                "lm_head.weight": "model-00004-of-00004.safetensors",
                "model.embed_tokens.weight": "model-00001-of-00004.safetensors",
                "model.layers.0.mlp.up_proj.weight": "model-00001-of-00004.safetensors",
                "model.layers.20.mlp.up_proj.weight": "model-00003-of-00004.safetensors",
                "model.layers.9.mlp.up_proj.weight": "model-00002-of-00004.safetensors"
            }
        });

        let names: Vec<String> = shard_names(&index).unwrap().into_iter().collect();
        assert_eq!(
            names,
            vec![
                "model-00001-of-00004.safetensors",
                "model-00002-of-00004.safetensors",
                "model-00003-of-00004.safetensors",
                "model-00004-of-00004.safetensors",
            ]
        );
    }

    #[test]
    fn index_without_weight_map_is_an_error() {
        assert!(shard_names(&json!({"metadata": {}})).is_err());
    }
}
