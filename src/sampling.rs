use std::collections::HashSet;

use candle_core::{DType, Tensor};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::config::GenerationConfig;
use crate::error::{InferenceError, Result};

pub struct Sampler {
    do_sample: bool,
    temperature: f64,
    top_p: f64,
    top_k: usize,
    rng: StdRng,
}

impl Sampler {
    pub fn new(config: &GenerationConfig) -> Self {
        let rng = match config.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        Self {
            do_sample: config.do_sample(),
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            rng,
        }
    }

    pub fn is_greedy(&self) -> bool {
        !self.do_sample
    }

    pub fn sample(&mut self, logits: &[f32]) -> Result<u32> {
        // Temperatures that vanish in f32 collapse the distribution onto its mode.
        let temperature = self.temperature as f32;
        if !self.do_sample || temperature <= 0.0 {
            return argmax(logits);
        }

        let mut candidates: Vec<(u32, f32)> = logits
            .iter()
            .enumerate()
            .map(|(id, logit)| (id as u32, logit / temperature))
            .collect();
        if candidates.is_empty() {
            return Err(InferenceError::Inference("Empty logits".to_string()));
        }
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

        if self.top_k > 0 {
            candidates.truncate(self.top_k);
        }

        // Softmax over the survivors, highest first.
        let max_logit = candidates[0].1;
        if !max_logit.is_finite() {
            return argmax(logits);
        }
        let mut total = 0.0f32;
        for (_, weight) in candidates.iter_mut() {
            *weight = (*weight - max_logit).exp();
            total += *weight;
        }

        // Nucleus: keep the smallest prefix whose mass exceeds top_p.
        if self.top_p < 1.0 {
            let threshold = self.top_p as f32 * total;
            let mut mass = 0.0f32;
            let mut keep = candidates.len();
            for (idx, (_, weight)) in candidates.iter().enumerate() {
                mass += weight;
                if mass > threshold {
                    keep = idx + 1;
                    break;
                }
            }
            candidates.truncate(keep.max(1));
            total = candidates.iter().map(|(_, w)| w).sum();
        }

        let mut draw = self.rng.gen::<f32>() * total;
        for (id, weight) in &candidates {
            if draw < *weight {
                return Ok(*id);
            }
            draw -= weight;
        }
        Ok(candidates[candidates.len() - 1].0)
    }
}

fn argmax(logits: &[f32]) -> Result<u32> {
    logits
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(id, _)| id as u32)
        .ok_or_else(|| InferenceError::Inference("Empty logits".to_string()))
}

/// Logits of the last position, whatever batch/sequence dims the model kept.
pub fn last_position_logits(logits: &Tensor) -> Result<Vec<f32>> {
    let logits = logits.to_dtype(DType::F32)?;
    let last = match logits.rank() {
        1 => logits,
        2 => logits.get(logits.dim(0)? - 1)?,
        3 => logits.get(0)?.get(logits.dim(1)? - 1)?,
        rank => {
            return Err(InferenceError::Inference(format!(
                "Unexpected logits rank {}",
                rank
            )))
        }
    };
    Ok(last.to_vec1()?)
}

/// Divides positive and multiplies negative scores of every token already in `context`.
pub fn apply_repeat_penalty(logits: &mut [f32], repeat_penalty: f32, context: &[u32]) {
    if repeat_penalty == 1.0 {
        return;
    }

    let seen: HashSet<u32> = context.iter().copied().collect();
    for token_id in seen {
        if let Some(score) = logits.get_mut(token_id as usize) {
            *score = if *score > 0.0 {
                *score / repeat_penalty
            } else {
                *score * repeat_penalty
            };
        }
    }
}
