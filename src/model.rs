//! Checkpoint loading and device placement
//!
//! Takes local file paths already resolved by the hub module, picks a
//! device and dtype, memory-maps the safetensors weights and builds the
//! llama-family transformer graph alongside its tokenizer.

use std::path::PathBuf;
use std::str::FromStr;

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaConfig, LlamaEosToks};
use serde::Serialize;
use tokenizers::Tokenizer;
use tracing::info;

use crate::error::ChatError;

/// Where inference should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// CUDA when available, then Metal, else CPU.
    #[default]
    Auto,
    Cpu,
    Cuda(usize),
    Metal(usize),
}

impl FromStr for DevicePreference {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let (kind, ordinal) = match s.split_once(':') {
            Some((kind, ord)) => {
                let ordinal = ord.parse::<usize>().map_err(|_| {
                    ChatError::ConfigError(format!("invalid device ordinal in '{}'", s))
                })?;
                (kind.to_string(), ordinal)
            }
            None => (s.clone(), 0),
        };
        match kind.as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda(ordinal)),
            "metal" => Ok(Self::Metal(ordinal)),
            _ => Err(ChatError::ConfigError(format!(
                "unknown device '{}', expected auto, cpu, cuda[:n] or metal[:n]",
                s
            ))),
        }
    }
}

/// Resolve a device preference against what the build actually supports.
pub fn select_device(pref: DevicePreference) -> Result<Device, ChatError> {
    let device = match pref {
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda(ordinal) => Device::new_cuda(ordinal)
            .map_err(|e| ChatError::ModelLoadError(format!("cuda:{}: {}", ordinal, e)))?,
        DevicePreference::Metal(ordinal) => Device::new_metal(ordinal)
            .map_err(|e| ChatError::ModelLoadError(format!("metal:{}: {}", ordinal, e)))?,
        DevicePreference::Auto => {
            if candle_core::utils::cuda_is_available() {
                Device::new_cuda(0)
                    .map_err(|e| ChatError::ModelLoadError(format!("cuda:0: {}", e)))?
            } else if candle_core::utils::metal_is_available() {
                Device::new_metal(0)
                    .map_err(|e| ChatError::ModelLoadError(format!("metal:0: {}", e)))?
            } else {
                Device::Cpu
            }
        }
    };
    Ok(device)
}

/// Half precision on accelerators, full precision on CPU.
pub fn default_dtype(device: &Device) -> DType {
    if matches!(device, Device::Cpu) {
        DType::F32
    } else {
        DType::F16
    }
}

pub fn parse_dtype(s: &str) -> Result<DType, ChatError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "f16" | "float16" => Ok(DType::F16),
        "bf16" | "bfloat16" => Ok(DType::BF16),
        "f32" | "float32" => Ok(DType::F32),
        other => Err(ChatError::ConfigError(format!(
            "unsupported dtype '{}', expected f16, bf16 or f32",
            other
        ))),
    }
}

pub fn device_label(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}

pub fn dtype_label(dtype: DType) -> &'static str {
    match dtype {
        DType::F16 => "f16",
        DType::BF16 => "bf16",
        DType::F32 => "f32",
        _ => "other",
    }
}

/// Local files that make up one checkpoint.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: Vec<PathBuf>,
}

/// Metadata reported by banners and the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub model_id: String,
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub context_window: usize,
    pub device: String,
    pub dtype: String,
    pub weights_bytes: u64,
}

/// A checkpoint loaded onto a device, ready for generation.
pub struct LoadedModel {
    pub model: Llama,
    pub tokenizer: Tokenizer,
    pub config: Config,
    pub device: Device,
    pub dtype: DType,
    pub model_id: String,
    pub weights_bytes: u64,
    eos: Option<LlamaEosToks>,
}

impl LoadedModel {
    pub fn load(
        model_id: &str,
        files: &ModelFiles,
        device: Device,
        dtype: DType,
    ) -> Result<Self, ChatError> {
        let raw = std::fs::read(&files.config)?;
        let llama_config: LlamaConfig = serde_json::from_slice(&raw)
            .map_err(|e| ChatError::ModelLoadError(format!("bad config.json: {}", e)))?;
        let config = llama_config.into_config(false);

        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| ChatError::ModelLoadError(format!("tokenizer: {}", e)))?;

        let weights_bytes = total_file_size(&files.weights)?;
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&files.weights, dtype, &device)
                .map_err(|e| ChatError::ModelLoadError(e.to_string()))?
        };
        let model = Llama::load(vb, &config)
            .map_err(|e| ChatError::ModelLoadError(e.to_string()))?;

        let eos = resolve_eos(&config, &tokenizer);
        info!(
            model = %model_id,
            device = device_label(&device),
            dtype = dtype_label(dtype),
            layers = config.num_hidden_layers,
            "model loaded"
        );

        Ok(Self {
            model,
            tokenizer,
            config,
            device,
            dtype,
            model_id: model_id.to_string(),
            weights_bytes,
            eos,
        })
    }

    /// Fresh KV cache for one generation run.
    pub fn new_cache(&self) -> Result<Cache, ChatError> {
        Cache::new(true, self.dtype, &self.config, &self.device)
            .map_err(|e| ChatError::GenerationError(e.to_string()))
    }

    pub fn is_eos(&self, id: u32) -> bool {
        match &self.eos {
            Some(LlamaEosToks::Single(eos)) => id == *eos,
            Some(LlamaEosToks::Multiple(ids)) => ids.contains(&id),
            None => false,
        }
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            model_id: self.model_id.clone(),
            vocab_size: self.config.vocab_size,
            hidden_size: self.config.hidden_size,
            num_layers: self.config.num_hidden_layers,
            context_window: self.config.max_position_embeddings,
            device: device_label(&self.device).to_string(),
            dtype: dtype_label(self.dtype).to_string(),
            weights_bytes: self.weights_bytes,
        }
    }

    /// Rough KV cache footprint for a sequence of the given length.
    pub fn kv_cache_bytes(&self, seq_len: usize) -> u64 {
        let head_dim = self.config.hidden_size / self.config.num_attention_heads;
        let per_layer = 2 * seq_len * self.config.num_key_value_heads * head_dim;
        (per_layer * self.config.num_hidden_layers * self.dtype.size_in_bytes()) as u64
    }
}

/// EOS from the checkpoint config, else from well-known tokenizer
/// entries. Mirrors the usual pad-to-eos fallback for checkpoints that
/// leave the field unset.
fn resolve_eos(config: &Config, tokenizer: &Tokenizer) -> Option<LlamaEosToks> {
    if let Some(eos) = config.eos_token_id.clone() {
        return Some(eos);
    }
    for token in ["</s>", "<|end_of_text|>", "<|endoftext|>"] {
        if let Some(id) = tokenizer.token_to_id(token) {
            return Some(LlamaEosToks::Single(id));
        }
    }
    None
}

fn total_file_size(paths: &[PathBuf]) -> Result<u64, ChatError> {
    let mut total = 0u64;
    for path in paths {
        total += std::fs::metadata(path)?.len();
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_preference_parse() {
        assert_eq!("auto".parse::<DevicePreference>().unwrap(), DevicePreference::Auto);
        assert_eq!("cpu".parse::<DevicePreference>().unwrap(), DevicePreference::Cpu);
        assert_eq!("cuda".parse::<DevicePreference>().unwrap(), DevicePreference::Cuda(0));
        assert_eq!("cuda:1".parse::<DevicePreference>().unwrap(), DevicePreference::Cuda(1));
        assert_eq!("METAL:2".parse::<DevicePreference>().unwrap(), DevicePreference::Metal(2));
        assert!("tpu".parse::<DevicePreference>().is_err());
        assert!("cuda:x".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn test_parse_dtype() {
        assert_eq!(parse_dtype("f16").unwrap(), DType::F16);
        assert_eq!(parse_dtype("BF16").unwrap(), DType::BF16);
        assert_eq!(parse_dtype("float32").unwrap(), DType::F32);
        assert!(parse_dtype("int4").is_err());
    }

    #[test]
    fn test_dtype_labels() {
        assert_eq!(dtype_label(DType::F16), "f16");
        assert_eq!(dtype_label(DType::F32), "f32");
    }
}
