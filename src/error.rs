use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Failed to load model: {0}")]
    ModelLoadError(String),

    #[error("Hub download failed: {0}")]
    HubError(String),

    #[error("Tokenization failed: {0}")]
    TokenizationError(String),

    #[error("Generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<candle_core::Error> for ChatError {
    fn from(e: candle_core::Error) -> Self {
        ChatError::GenerationError(e.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::ConfigError(e.to_string())
    }
}
