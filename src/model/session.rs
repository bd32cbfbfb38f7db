use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{LoadedModel, ModelLoader};
use crate::config::{GenerationConfig, LoadOptions};
use crate::error::{InferenceError, Result};
use crate::generation::{GenerationOutput, TextGenerator};

/// Process-wide model holder: unloaded until the first load, then loaded.
///
/// Loads and generations both go through the slot mutex, so requests are
/// served one at a time. The loaded model id is mirrored outside the mutex
/// so health checks never wait behind a generation.
pub struct ModelSession {
    loader: Arc<dyn ModelLoader>,
    slot: Arc<Mutex<Option<LoadedModel>>>,
    loaded_id: Arc<RwLock<Option<String>>>,
}

fn publish_id(loaded_id: &RwLock<Option<String>>, id: Option<String>) {
    *loaded_id
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner()) = id;
}

impl ModelSession {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            slot: Arc::new(Mutex::new(None)),
            loaded_id: Arc::new(RwLock::new(None)),
        }
    }

    pub fn loaded_model_id(&self) -> Option<String> {
        self.loaded_id
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Loads the model described by `options` unless it is already loaded.
    ///
    /// A different model or precision replaces the current one; the old
    /// session is dropped before the new load starts. On failure the
    /// session is left unloaded. The load owns the slot lock until it
    /// finishes, so a cancelled caller still leaves the model in place.
    pub async fn ensure_loaded(&self, options: &LoadOptions) -> Result<()> {
        let mut slot = Arc::clone(&self.slot).lock_owned().await;

        if let Some(loaded) = &*slot {
            if loaded.matches(options) {
                debug!("Model '{}' is already loaded", loaded.model_id);
                return Ok(());
            }
            warn!(
                "Clearing previous model: {} ({})",
                loaded.model_id, loaded.requested_precision
            );
        }
        *slot = None;
        publish_id(&self.loaded_id, None);

        let loader = Arc::clone(&self.loader);
        let loaded_id = Arc::clone(&self.loaded_id);
        let load_options = options.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let loaded = loader.load(&load_options)?;
            info!(
                "Model session ready: {} ({} requested, {} in use)",
                loaded.model_id, loaded.requested_precision, loaded.precision
            );
            publish_id(&loaded_id, Some(loaded.model_id.clone()));
            *slot = Some(loaded);
            Ok(())
        })
        .await
        .map_err(|e| InferenceError::ModelLoad(format!("load task failed: {}", e)))?
    }

    /// Runs one generation on the loaded model.
    pub async fn generate(
        &self,
        prompt: String,
        config: GenerationConfig,
    ) -> Result<GenerationOutput> {
        let mut slot = Arc::clone(&self.slot).lock_owned().await;

        tokio::task::spawn_blocking(move || {
            let loaded = (*slot)
                .as_mut()
                .ok_or_else(|| InferenceError::Inference("model is not loaded".to_string()))?;

            let mut generator = TextGenerator::new(
                loaded.model.as_mut(),
                &loaded.tokenizer,
                &loaded.device,
            );
            generator.generate(&prompt, &config)
        })
        .await
        .map_err(|e| InferenceError::Inference(format!("generation task failed: {}", e)))?
    }
}
