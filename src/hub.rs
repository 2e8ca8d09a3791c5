//! Checkpoint acquisition from the Hugging Face hub
//!
//! One-time download of the tokenizer, the model config and the
//! safetensors weights. Files land in the hub client's local cache, so
//! repeat runs resolve from disk without touching the network.
//!
//! Gated repositories authenticate through `HF_TOKEN` or
//! `HUGGING_FACE_HUB_TOKEN`; without either the client falls back to
//! the token file the hub CLI writes.

use std::fmt;
use std::path::PathBuf;

use hf_hub::api::tokio::{ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};

use crate::error::ChatError;

/// Checkpoint served when no model id is configured.
pub const DEFAULT_MODEL_ID: &str = "TinyLlama/TinyLlama-1.1B-Chat-v1.0";

pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const CONFIG_FILE: &str = "config.json";

const SINGLE_WEIGHTS_FILE: &str = "model.safetensors";
const WEIGHTS_INDEX_FILE: &str = "model.safetensors.index.json";
const CONSOLIDATED_WEIGHTS_FILE: &str = "consolidated.safetensors";

/// A `org/repo` model id with an optional `@revision` suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub model_id: String,
    pub revision: String,
}

impl ModelRef {
    /// Parse `org/repo` or `org/repo@revision`.
    pub fn parse(s: &str) -> Result<Self, ChatError> {
        let s = s.trim();
        let (id, revision) = match s.split_once('@') {
            Some((id, rev)) => (id, rev),
            None => (s, "main"),
        };
        if id.is_empty() || revision.is_empty() {
            return Err(ChatError::ConfigError(format!(
                "invalid model reference '{}', expected org/repo[@revision]",
                s
            )));
        }
        Ok(Self {
            model_id: id.to_string(),
            revision: revision.to_string(),
        })
    }
}

impl std::str::FromStr for ModelRef {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.revision == "main" {
            write!(f, "{}", self.model_id)
        } else {
            write!(f, "{}@{}", self.model_id, self.revision)
        }
    }
}

/// What to fetch and how.
#[derive(Debug, Clone)]
pub struct HubOptions {
    pub model_id: String,
    pub revision: String,
    /// Overrides the hub client's cache location when set.
    pub cache_dir: Option<PathBuf>,
    /// Show a progress bar while downloading.
    pub progress: bool,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            revision: "main".to_string(),
            cache_dir: None,
            progress: true,
        }
    }
}

impl HubOptions {
    pub fn for_model(model_ref: &ModelRef) -> Self {
        Self {
            model_id: model_ref.model_id.clone(),
            revision: model_ref.revision.clone(),
            ..Default::default()
        }
    }
}

/// Handle on one model repository.
pub struct HubClient {
    repo: ApiRepo,
    model_id: String,
}

impl HubClient {
    pub fn new(options: &HubOptions) -> Result<Self, ChatError> {
        let mut builder = ApiBuilder::new().with_progress(options.progress);
        if let Some(token) = hub_token() {
            builder = builder.with_token(Some(token));
        }
        if let Some(dir) = &options.cache_dir {
            builder = builder.with_cache_dir(dir.clone());
        }
        let api = builder
            .build()
            .map_err(|e| ChatError::HubError(e.to_string()))?;
        let repo = api.repo(Repo::with_revision(
            options.model_id.clone(),
            RepoType::Model,
            options.revision.clone(),
        ));
        Ok(Self {
            repo,
            model_id: options.model_id.clone(),
        })
    }

    pub async fn fetch_tokenizer(&self) -> Result<PathBuf, ChatError> {
        self.fetch(TOKENIZER_FILE).await
    }

    pub async fn fetch_config(&self) -> Result<PathBuf, ChatError> {
        self.fetch(CONFIG_FILE).await
    }

    /// Resolve the weight files for this checkpoint.
    ///
    /// Single-file `model.safetensors` repos are the common case; larger
    /// checkpoints ship an index listing their shards, and some older
    /// ones a single consolidated file.
    pub async fn fetch_weights(&self) -> Result<Vec<PathBuf>, ChatError> {
        if let Ok(single) = self.repo.get(SINGLE_WEIGHTS_FILE).await {
            return Ok(vec![single]);
        }
        if let Ok(index_path) = self.repo.get(WEIGHTS_INDEX_FILE).await {
            return self.fetch_sharded(index_path).await;
        }
        if let Ok(consolidated) = self.repo.get(CONSOLIDATED_WEIGHTS_FILE).await {
            return Ok(vec![consolidated]);
        }
        Err(ChatError::HubError(format!(
            "no safetensors weights found in {}",
            self.model_id
        )))
    }

    async fn fetch_sharded(&self, index_path: PathBuf) -> Result<Vec<PathBuf>, ChatError> {
        let raw = std::fs::read(&index_path)?;
        let index: serde_json::Value = serde_json::from_slice(&raw)
            .map_err(|e| ChatError::HubError(format!("bad weight index: {}", e)))?;
        let names = shard_names(&index);
        if names.is_empty() {
            return Err(ChatError::HubError(format!(
                "weight index for {} lists no shards",
                self.model_id
            )));
        }
        let mut paths = Vec::with_capacity(names.len());
        for name in &names {
            paths.push(self.fetch(name).await?);
        }
        Ok(paths)
    }

    async fn fetch(&self, file: &str) -> Result<PathBuf, ChatError> {
        self.repo
            .get(file)
            .await
            .map_err(|e| ChatError::HubError(format!("{}/{}: {}", self.model_id, file, e)))
    }
}

/// Shard file names referenced by a safetensors index, deduplicated and
/// in stable order.
fn shard_names(index: &serde_json::Value) -> Vec<String> {
    let mut names: Vec<String> = index
        .get("weight_map")
        .and_then(|m| m.as_object())
        .map(|m| {
            m.values()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names.dedup();
    names
}

/// Hub token from the environment, empty values ignored.
pub fn hub_token() -> Option<String> {
    for var in ["HF_TOKEN", "HUGGING_FACE_HUB_TOKEN"] {
        if let Ok(token) = std::env::var(var) {
            if !token.trim().is_empty() {
                return Some(token);
            }
        }
    }
    None
}
