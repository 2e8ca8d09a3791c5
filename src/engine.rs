//! Async chat engine
//!
//! Wraps the blocking model in a cloneable handle usable from async
//! handlers. Inference runs on the blocking thread pool and is
//! serialized by an owned lock, so concurrent HTTP requests queue
//! rather than contending for the device.

use std::sync::{Arc, Mutex, MutexGuard};

use candle_core::DType;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task;
use tracing::warn;

use crate::error::ChatError;
use crate::generate::{generate_reply, generate_reply_with, Generated};
use crate::hub::{HubClient, HubOptions};
use crate::memory::MemoryReport;
use crate::model::{
    default_dtype, select_device, DevicePreference, LoadedModel, ModelFiles, ModelInfo,
};
use crate::sampling::SamplerOptions;

/// How to acquire and place the model.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub hub: HubOptions,
    pub device: DevicePreference,
    /// Overrides the device-derived dtype when set.
    pub dtype: Option<DType>,
}

/// Counters the health endpoint and the memory report read.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    pub requests: u64,
    pub failures: u64,
    pub tokens_generated: u64,
    pub total_generation_ms: u64,
    pub memory_clears: u64,
    /// Prompt plus completion length of the most recent run.
    pub last_sequence_tokens: usize,
}

struct EngineInner {
    model: Arc<LoadedModel>,
    gen_lock: Arc<tokio::sync::Mutex<()>>,
    stats: Mutex<EngineStats>,
}

/// Cloneable handle around one loaded model.
#[derive(Clone)]
pub struct ChatEngine {
    inner: Arc<EngineInner>,
}

impl ChatEngine {
    /// Fetch the checkpoint from the hub and load it off the async
    /// runtime.
    pub async fn boot(options: EngineOptions) -> Result<Self, ChatError> {
        let client = HubClient::new(&options.hub)?;
        let tokenizer = client.fetch_tokenizer().await?;
        let config = client.fetch_config().await?;
        let weights = client.fetch_weights().await?;
        let files = ModelFiles {
            config,
            tokenizer,
            weights,
        };

        let model_id = options.hub.model_id.clone();
        let device_pref = options.device;
        let dtype_override = options.dtype;
        let model = task::spawn_blocking(move || {
            let device = select_device(device_pref)?;
            let dtype = dtype_override.unwrap_or_else(|| default_dtype(&device));
            LoadedModel::load(&model_id, &files, device, dtype)
        })
        .await
        .map_err(|e| ChatError::ModelLoadError(format!("load task failed: {}", e)))??;

        Ok(Self::from_model(model))
    }

    /// Wrap an already loaded model.
    pub fn from_model(model: LoadedModel) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                model: Arc::new(model),
                gen_lock: Arc::new(tokio::sync::Mutex::new(())),
                stats: Mutex::new(EngineStats::default()),
            }),
        }
    }

    /// Generate a reply for one user message.
    pub async fn reply(
        &self,
        user_text: &str,
        options: &SamplerOptions,
    ) -> Result<Generated, ChatError> {
        let turn = self.inner.gen_lock.clone().lock_owned().await;
        let model = self.inner.model.clone();
        let text = user_text.to_string();
        let opts = options.clone();
        let result = task::spawn_blocking(move || {
            let _turn = turn;
            generate_reply(&model, &text, &opts)
        })
        .await
        .map_err(|e| ChatError::GenerationError(format!("generation task failed: {}", e)))?;
        self.record(&result);
        result
    }

    /// Generate while forwarding completed text chunks to a channel.
    ///
    /// Dropping the receiver stops the run at the next chunk boundary.
    pub async fn reply_streaming(
        &self,
        user_text: &str,
        options: &SamplerOptions,
        chunks: UnboundedSender<String>,
    ) -> Result<Generated, ChatError> {
        let turn = self.inner.gen_lock.clone().lock_owned().await;
        let model = self.inner.model.clone();
        let text = user_text.to_string();
        let opts = options.clone();
        let result = task::spawn_blocking(move || {
            let _turn = turn;
            generate_reply_with(&model, &text, &opts, |chunk| {
                chunks.send(chunk.to_string()).is_ok()
            })
        })
        .await
        .map_err(|e| ChatError::GenerationError(format!("generation task failed: {}", e)))?;
        self.record(&result);
        result
    }

    pub fn info(&self) -> ModelInfo {
        self.inner.model.info()
    }

    pub fn stats(&self) -> EngineStats {
        self.lock_stats().clone()
    }

    /// First memory diagnostic: a point-in-time usage report.
    pub fn memory_report(&self) -> MemoryReport {
        let stats = self.stats();
        MemoryReport::capture(&self.inner.model, &stats)
    }

    /// Second memory diagnostic: flush device work, reset the sequence
    /// counter and report what remains in use.
    pub fn clear_memory(&self) -> MemoryReport {
        if let Err(e) = self.inner.model.device.synchronize() {
            warn!("device synchronize failed during memory clear: {}", e);
        }
        {
            let mut stats = self.lock_stats();
            stats.memory_clears += 1;
            stats.last_sequence_tokens = 0;
        }
        self.memory_report()
    }

    fn record(&self, result: &Result<Generated, ChatError>) {
        let mut stats = self.lock_stats();
        stats.requests += 1;
        match result {
            Ok(generated) => {
                stats.tokens_generated += generated.completion_tokens as u64;
                stats.total_generation_ms += generated.elapsed_ms;
                stats.last_sequence_tokens =
                    generated.prompt_tokens + generated.completion_tokens;
            }
            Err(_) => stats.failures += 1,
        }
    }

    fn lock_stats(&self) -> MutexGuard<'_, EngineStats> {
        match self.inner.stats.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
