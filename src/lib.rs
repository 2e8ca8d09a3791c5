//! # Stonechat
//!
//! A small chat service for instruction-tuned language models.
//!
//! ## Features
//!
//! - Pulls tokenizer and checkpoint files straight from the Hugging Face hub
//! - Runs generation on CPU, CUDA or Metal through candle
//! - Wraps user text in the chat prompt template and extracts the reply
//! - Serves a web chat page backed by a process-wide conversation log
//! - Sampling with temperature, nucleus (top-p) and top-k strategies
//! - Memory diagnostics for the loaded checkpoint and KV cache
//!
//! ## Example
//!
//! ```rust,no_run
//! use stonechat::{ChatEngine, EngineOptions, SamplerOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), stonechat::ChatError> {
//!     // Download the default checkpoint and load it
//!     let engine = ChatEngine::boot(EngineOptions::default()).await?;
//!
//!     // One chat turn
//!     let options = SamplerOptions::default();
//!     let generated = engine.reply("Explain entropy in one paragraph", &options).await?;
//!
//!     println!("{}", generated.reply);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod generate;
pub mod history;
pub mod hub;
pub mod memory;
pub mod model;
pub mod sampling;
pub mod server;
pub mod template;
pub mod token_stream;
pub mod web;

pub use config::AppConfig;
pub use engine::{ChatEngine, EngineOptions, EngineStats};
pub use error::ChatError;
pub use generate::{FinishReason, Generated};
pub use history::{ConversationLog, Exchange, Message, Role};
pub use hub::{HubClient, HubOptions, ModelRef, DEFAULT_MODEL_ID};
pub use memory::MemoryReport;
pub use model::{DevicePreference, LoadedModel, ModelInfo};
pub use sampling::SamplerOptions;
pub use server::{ChatServer, LaunchOptions};
pub use template::{extract_reply, format_turn};
pub use token_stream::TokenOutputStream;

/// The types most applications need.
pub mod prelude {
    pub use crate::{
        AppConfig, ChatEngine, ChatError, ChatServer, ConversationLog, EngineOptions,
        LaunchOptions, SamplerOptions,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampler_defaults() {
        let options = SamplerOptions::default();
        assert_eq!(options.max_new_tokens, 512);
        assert_eq!(options.temperature, 0.7);
        assert_eq!(options.top_p, 0.9);
    }

    #[test]
    fn test_template_round_trip() {
        let prompt = format_turn("Hello there");
        let decoded = format!("{}General Kenobi!", prompt);
        assert_eq!(extract_reply(&decoded, &prompt), "General Kenobi!");
    }

    #[test]
    fn test_conversation_log_pairing() {
        let mut log = ConversationLog::new();
        log.push_user("hi");
        log.push_assistant("hello");
        let exchanges = log.exchanges();
        assert_eq!(exchanges.len(), 1);
        assert_eq!(exchanges[0].user, "hi");
        assert_eq!(exchanges[0].assistant, "hello");
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_model_ref_parsing() {
        let reference: ModelRef = "org/model@step-1000".parse().unwrap();
        assert_eq!(reference.model_id, "org/model");
        assert_eq!(reference.revision, "step-1000");
    }
}
