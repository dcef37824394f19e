pub mod config;
pub mod models;
pub mod response;
pub mod types;

use thiserror::Error;

pub use config::PalaverInferenceConfig;
pub use models::llama::LlamaGenerator;
pub use response::ResponseGenerator;
pub use types::GenerationParams;

/// A text-generation backend.
///
/// Implementations receive the full prompt and return the decoded model
/// output, prompt included. Calls are blocking and may be expensive, callers
/// on an async runtime should run them on the blocking thread pool.
pub trait TextGenerator: Send + Sync {
    /// Runs one generation pass for `prompt` using the given decoding parameters.
    ///
    /// # Errors
    ///
    /// Returns a `ModelError` if tokenization or the forward pass fails.
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, ModelError>;
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Candle error: `{0}`")]
    Candle(#[from] candle::Error),
    #[error("Tokenizer error: `{0}`")]
    Tokenizer(String),
    #[error("Failed to fetch model files from the hub: `{0}`")]
    HfHub(#[from] hf_hub::api::sync::ApiError),
    #[error("IO error: `{0}`")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse model configuration: `{0}`")]
    Json(#[from] serde_json::Error),
    #[error("Generation task failed: `{0}`")]
    TaskJoin(#[from] tokio::task::JoinError),
    #[error("{0}")]
    Msg(String),
}
