use std::fmt;
use std::path::PathBuf;

use candle_core::{DType, Device};
use clap::{Parser, ValueEnum};

use crate::device::is_accelerator;

pub const DEFAULT_MODEL_ID: &str = "ruslanmv/Medical-Llama3-v2";

/// Prompts longer than this many tokens are truncated before generation.
pub const MAX_INPUT_TOKENS: usize = 4096;

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Medical AI server: general medical chat and emergency first-aid assessment"
)]
pub struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, default_value_t = 8000)]
    pub port: u16,

    /// Weight precision. 4-bit needs an accelerator and falls back to 16-bit on CPU.
    #[arg(long, value_enum, default_value_t = Precision::FourBit)]
    pub precision: Precision,

    #[arg(long, env = "HF_HUB_CACHE")]
    pub cache_dir: Option<PathBuf>,

    /// Load the model at startup instead of on the first request
    #[arg(long)]
    pub preload: bool,

    /// The model session is process-local, so only a single worker is supported
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=1))]
    pub workers: u8,

    #[arg(short, long, default_value = DEFAULT_MODEL_ID)]
    pub model: String,

    #[arg(long, default_value = "main")]
    pub revision: String,

    /// Hub repository holding the GGUF rendition used for 4-bit precision
    #[arg(long, default_value = "mradermacher/Medical-Llama3-v2-GGUF")]
    pub quantized_repo: String,

    #[arg(long, default_value = "Medical-Llama3-v2.Q4_K_M.gguf")]
    pub quantized_file: String,

    #[arg(long, env)]
    pub hf_token: Option<String>,

    #[arg(long)]
    pub cpu: bool,

    #[arg(long, default_value_t = 50)]
    pub top_k: usize,

    #[arg(long, default_value_t = 1.0)]
    pub repeat_penalty: f32,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(
        long = "allowed-origin",
        default_values = ["http://localhost", "http://localhost:8080"]
    )]
    pub allowed_origins: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    #[value(name = "4-bit")]
    FourBit,
    #[value(name = "16-bit")]
    SixteenBit,
    #[value(name = "32-bit")]
    ThirtyTwoBit,
}

impl Precision {
    /// Precision actually used on `device`.
    pub fn resolve(self, device: &Device) -> Precision {
        match self {
            Precision::FourBit if !is_accelerator(device) => Precision::SixteenBit,
            other => other,
        }
    }

    /// Float type for safetensors weights. 4-bit weights come from GGUF and carry their own types.
    pub fn dtype(self) -> DType {
        match self {
            Precision::FourBit | Precision::SixteenBit => DType::F16,
            Precision::ThirtyTwoBit => DType::F32,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Precision::FourBit => "4-bit",
            Precision::SixteenBit => "16-bit",
            Precision::ThirtyTwoBit => "32-bit",
        };
        f.write_str(name)
    }
}

/// Everything the loader needs to bring up a model session.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub model_id: String,
    pub revision: String,
    pub precision: Precision,
    pub cache_dir: Option<PathBuf>,
    pub hf_token: Option<String>,
    pub quantized_repo: String,
    pub quantized_file: String,
    pub force_cpu: bool,
}

impl From<&Args> for LoadOptions {
    fn from(args: &Args) -> Self {
        Self {
            model_id: args.model.clone(),
            revision: args.revision.clone(),
            precision: args.precision,
            cache_dir: args.cache_dir.clone(),
            hf_token: args.hf_token.clone(),
            quantized_repo: args.quantized_repo.clone(),
            quantized_file: args.quantized_file.clone(),
            force_cpu: args.cpu,
        }
    }
}

/// Server-wide decoding knobs that requests cannot override.
#[derive(Debug, Clone, Copy)]
pub struct SamplingOptions {
    pub top_k: usize,
    pub repeat_penalty: f32,
    pub seed: Option<u64>,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            top_k: 50,
            repeat_penalty: 1.0,
            seed: None,
        }
    }
}

impl From<&Args> for SamplingOptions {
    fn from(args: &Args) -> Self {
        Self {
            top_k: args.top_k,
            repeat_penalty: args.repeat_penalty,
            seed: args.seed,
        }
    }
}

/// Per-request generation parameters after endpoint defaults are applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParameters {
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: usize,
    pub repeat_penalty: f32,
    pub seed: Option<u64>,
    pub max_input_tokens: usize,
}

impl GenerationConfig {
    pub fn new(params: GenerationParameters, sampling: &SamplingOptions) -> Self {
        Self {
            max_new_tokens: params.max_new_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: sampling.top_k,
            repeat_penalty: sampling.repeat_penalty,
            seed: sampling.seed,
            max_input_tokens: MAX_INPUT_TOKENS,
        }
    }

    /// Greedy decoding is used only when temperature is non-positive and top_p keeps the whole distribution.
    pub fn do_sample(&self) -> bool {
        !(self.temperature <= 0.0 && self.top_p >= 1.0)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::new(
            GenerationParameters {
                max_new_tokens: 512,
                temperature: 0.7,
                top_p: 0.9,
            },
            &SamplingOptions::default(),
        )
    }
}
