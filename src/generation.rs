use std::collections::HashSet;
use std::time::Instant;

use candle_core::{Device, Tensor};
use tracing::{debug, info, warn};

use crate::config::GenerationConfig;
use crate::error::{InferenceError, Result};
use crate::model::LanguageModel;
use crate::sampling::{apply_repeat_penalty, last_position_logits, Sampler};
use crate::tokenizer::TokenizerWrapper;

pub struct GenerationOutput {
    pub text: String,
    pub tokens: Vec<u32>,
    pub prompt_tokens: usize,
    pub truncated: bool,
    pub tokens_per_second: f64,
    pub total_time_ms: u128,
}

pub struct TextGenerator<'a> {
    model: &'a mut dyn LanguageModel,
    tokenizer: &'a TokenizerWrapper,
    device: &'a Device,
}

impl<'a> TextGenerator<'a> {
    pub fn new(
        model: &'a mut dyn LanguageModel,
        tokenizer: &'a TokenizerWrapper,
        device: &'a Device,
    ) -> Self {
        Self {
            model,
            tokenizer,
            device,
        }
    }

    fn stop_tokens(&self) -> HashSet<u32> {
        self.model
            .eos_token_ids()
            .iter()
            .copied()
            .chain(self.tokenizer.stop_token_ids())
            .collect()
    }

    /// Generates a reply to an already templated prompt.
    ///
    /// Only the newly produced tokens are decoded, with special tokens
    /// skipped and surrounding whitespace trimmed.
    pub fn generate(
        &mut self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<GenerationOutput> {
        let start_time = Instant::now();

        self.model.reset_cache()?;

        let encoded = self
            .tokenizer
            .encode_truncated(prompt, config.max_input_tokens)?;
        if encoded.truncated() {
            warn!(
                "Prompt truncated from {} to {} tokens",
                encoded.original_len,
                encoded.ids.len()
            );
        }
        let prompt_tokens = encoded.ids;
        let prompt_len = prompt_tokens.len();

        if prompt_tokens.is_empty() {
            return Err(InferenceError::Inference("Empty prompt".to_string()));
        }

        let mut sampler = Sampler::new(config);
        let stop_tokens = self.stop_tokens();

        info!(
            "Generating response (prompt_tokens={}, max_new_tokens={}, do_sample={})",
            prompt_len,
            config.max_new_tokens,
            !sampler.is_greedy()
        );

        let mut all_tokens = prompt_tokens.clone();
        let mut generated_tokens: Vec<u32> = Vec::new();

        let generation_start = Instant::now();

        if config.max_new_tokens > 0 {
            // Prefill
            let input_tensor = Tensor::new(prompt_tokens.as_slice(), self.device)?
                .unsqueeze(0)?;
            let mut logits = self.model.forward(&input_tensor, 0)?;

            for i in 0..config.max_new_tokens {
                let mut scores = last_position_logits(&logits)?;
                apply_repeat_penalty(&mut scores, config.repeat_penalty, &all_tokens);

                let next_token = sampler.sample(&scores)?;

                if stop_tokens.contains(&next_token) {
                    debug!("Stop token {} generated at position {}", next_token, i);
                    break;
                }

                generated_tokens.push(next_token);
                all_tokens.push(next_token);

                if generated_tokens.len() == config.max_new_tokens {
                    break;
                }

                let input = Tensor::new(&[next_token], self.device)?.unsqueeze(0)?;
                logits = self.model.forward(&input, prompt_len + i)?;
            }
        }

        let generation_time = generation_start.elapsed();
        let total_time = start_time.elapsed();

        let tokens_per_second = if generation_time.as_secs_f64() > 0.0 {
            generated_tokens.len() as f64 / generation_time.as_secs_f64()
        } else {
            0.0
        };

        let output_text = self.tokenizer.decode(&generated_tokens)?.trim().to_string();

        info!(
            "Generated {} tokens in {:?} ({:.2} tokens/sec)",
            generated_tokens.len(),
            generation_time,
            tokens_per_second
        );

        Ok(GenerationOutput {
            text: output_text,
            tokens: generated_tokens,
            prompt_tokens: prompt_len,
            truncated: encoded.original_len > prompt_len,
            tokens_per_second,
            total_time_ms: total_time.as_millis(),
        })
    }
}
