//! In-memory model, tokenizer and loader for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;

use candle_core::{Device, Tensor};

use crate::config::{LoadOptions, Precision, DEFAULT_MODEL_ID};
use crate::error::{InferenceError, Result};
use crate::model::{LanguageModel, LoadedModel, ModelLoader};
use crate::tokenizer::TokenizerWrapper;

pub const EOT: u32 = 2;
pub const HELLO: u32 = 5;
pub const WORLD: u32 = 6;
pub const CALL: u32 = 7;
pub const HELP: u32 = 8;
pub const NOW: u32 = 9;

const VOCAB_SIZE: usize = 11;

const TOKENIZER_JSON: &str = r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [
    {"id": 1, "content": "<|begin_of_text|>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
    {"id": 2, "content": "<|eot_id|>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
    {"id": 3, "content": "<|start_header_id|>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
    {"id": 4, "content": "<|end_header_id|>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
    {"id": 10, "content": "<|end_of_text|>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
  ],
  "normalizer": null,
  "pre_tokenizer": {"type": "Whitespace"},
  "post_processor": null,
  "decoder": null,
  "model": {
    "type": "WordLevel",
    "vocab": {
      "[UNK]": 0,
      "<|begin_of_text|>": 1,
      "<|eot_id|>": 2,
      "<|start_header_id|>": 3,
      "<|end_header_id|>": 4,
      "hello": 5,
      "world": 6,
      "call": 7,
      "help": 8,
      "now": 9,
      "<|end_of_text|>": 10
    },
    "unk_token": "[UNK]"
  }
}"#;

pub fn test_tokenizer() -> TokenizerWrapper {
    TokenizerWrapper::from_bytes(TOKENIZER_JSON.as_bytes()).unwrap()
}

#[derive(Debug, Clone)]
enum Behaviour {
    /// Emits the scripted tokens in order, then end of turn.
    Script(Vec<u32>),
    /// Picks a word from the last input id and the position.
    Hashed,
    /// Blocks the prefill on two rendezvous with the test (started, released), then says hello.
    Gated(Arc<Barrier>),
    Fail,
}

type PrefillLog = Arc<Mutex<Vec<Vec<u32>>>>;

pub struct ScriptedModel {
    behaviour: Behaviour,
    step: usize,
    calls: usize,
    prefills: PrefillLog,
    eos_token_ids: Vec<u32>,
}

impl ScriptedModel {
    fn with(behaviour: Behaviour, prefills: PrefillLog) -> Self {
        Self {
            behaviour,
            step: 0,
            calls: 0,
            prefills,
            eos_token_ids: vec![EOT],
        }
    }

    pub fn new(script: Vec<u32>) -> Self {
        Self::with(Behaviour::Script(script), PrefillLog::default())
    }

    pub fn hashed() -> Self {
        Self::with(Behaviour::Hashed, PrefillLog::default())
    }

    pub fn forward_calls(&self) -> usize {
        self.calls
    }

    pub fn prefill_lengths(&self) -> Vec<usize> {
        self.prefills.lock().unwrap().iter().map(Vec::len).collect()
    }
}

impl LanguageModel for ScriptedModel {
    fn forward(&mut self, input_ids: &Tensor, position: usize) -> Result<Tensor> {
        self.calls += 1;
        let ids: Vec<u32> = input_ids.flatten_all()?.to_vec1()?;
        if position == 0 {
            self.prefills.lock().unwrap().push(ids.clone());
        }

        let target = match &self.behaviour {
            Behaviour::Script(script) => script.get(self.step).copied().unwrap_or(EOT),
            Behaviour::Hashed => {
                let words = [HELLO, WORLD, CALL, HELP, NOW];
                let last = ids.last().copied().unwrap_or(0) as usize;
                words[(last * 31 + position) % words.len()]
            }
            Behaviour::Gated(gate) => {
                if self.step == 0 {
                    gate.wait();
                    gate.wait();
                    HELLO
                } else {
                    EOT
                }
            }
            Behaviour::Fail => {
                return Err(InferenceError::Inference("device lost".to_string()));
            }
        };
        self.step += 1;

        let mut logits = vec![0f32; VOCAB_SIZE];
        logits[target as usize] = 20.0;
        Ok(Tensor::from_vec(logits, (1, VOCAB_SIZE), &Device::Cpu)?)
    }

    fn reset_cache(&mut self) -> Result<()> {
        self.step = 0;
        Ok(())
    }

    fn eos_token_ids(&self) -> &[u32] {
        &self.eos_token_ids
    }
}

pub struct StubLoader {
    behaviour: Behaviour,
    fail_load: bool,
    delay: Option<Duration>,
    prefills: PrefillLog,
    pub loads: AtomicUsize,
}

impl StubLoader {
    fn with(behaviour: Behaviour, fail_load: bool) -> Self {
        Self {
            behaviour,
            fail_load,
            delay: None,
            prefills: PrefillLog::default(),
            loads: AtomicUsize::new(0),
        }
    }

    /// Sleeps on the loading thread before returning the model.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn scripted(script: Vec<u32>) -> Self {
        Self::with(Behaviour::Script(script), false)
    }

    pub fn hashed() -> Self {
        Self::with(Behaviour::Hashed, false)
    }

    pub fn gated(gate: Arc<Barrier>) -> Self {
        Self::with(Behaviour::Gated(gate), false)
    }

    /// Loads fine, then fails every forward pass.
    pub fn broken_model() -> Self {
        Self::with(Behaviour::Fail, false)
    }

    pub fn failing() -> Self {
        Self::with(Behaviour::Fail, true)
    }

    /// Prompt ids of every prefill run by models from this loader.
    pub fn prefill_ids(&self) -> Vec<Vec<u32>> {
        self.prefills.lock().unwrap().clone()
    }
}

impl ModelLoader for StubLoader {
    fn load(&self, options: &LoadOptions) -> Result<LoadedModel> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail_load {
            return Err(InferenceError::Hub("repository not reachable".to_string()));
        }

        let device = Device::Cpu;
        Ok(LoadedModel {
            model: Box::new(ScriptedModel::with(
                self.behaviour.clone(),
                Arc::clone(&self.prefills),
            )),
            tokenizer: test_tokenizer(),
            precision: options.precision.resolve(&device),
            device,
            model_id: options.model_id.clone(),
            requested_precision: options.precision,
        })
    }
}

pub fn load_options() -> LoadOptions {
    LoadOptions {
        model_id: DEFAULT_MODEL_ID.to_string(),
        revision: "main".to_string(),
        precision: Precision::SixteenBit,
        cache_dir: None,
        hf_token: None,
        quantized_repo: "unused".to_string(),
        quantized_file: "unused.gguf".to_string(),
        force_cpu: true,
    }
}
