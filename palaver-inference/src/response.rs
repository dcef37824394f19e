use std::sync::Arc;

use tracing::instrument;

use crate::{types::GenerationParams, ModelError, TextGenerator};

/// Builds the prompt sent to the model for a user message.
///
/// When `history` is given it is prepended verbatim to the fixed template.
#[must_use]
pub fn build_prompt(content: &str, history: Option<&str>) -> String {
    let prompt = format!("User input: \"{content}\". IA response: ");
    match history {
        Some(history) => format!("{history}{prompt}"),
        None => prompt,
    }
}

/// Removes the echoed prompt from the model output.
///
/// The first `prompt.chars().count() + 1` characters are dropped. An output
/// shorter than that yields an empty response.
#[must_use]
pub fn strip_prompt(output: &str, prompt: &str) -> String {
    output.chars().skip(prompt.chars().count() + 1).collect()
}

/// Turns a user message into a model-generated reply.
#[derive(Clone)]
pub struct ResponseGenerator {
    model: Arc<dyn TextGenerator>,
}

impl ResponseGenerator {
    /// Constructor
    #[must_use]
    pub fn new(model: Arc<dyn TextGenerator>) -> Self {
        Self { model }
    }

    /// Generates a reply to `content`.
    ///
    /// The model runs once on the blocking thread pool. Its output has the
    /// prompt prefix stripped before being returned.
    ///
    /// # Arguments
    ///
    /// * `content` - The message posted by the user
    /// * `history` - Formatted prior exchanges to prepend to the prompt, if any
    /// * `params` - Decoding parameters, passed to the model unchanged
    ///
    /// # Errors
    ///
    /// Returns a `ModelError` if the model fails or the blocking task panics.
    #[instrument(level = "debug", skip_all, fields(max_length = params.max_length))]
    pub async fn generate_response(
        &self,
        content: &str,
        history: Option<&str>,
        params: GenerationParams,
    ) -> Result<String, ModelError> {
        let prompt = build_prompt(content, history);
        let model = Arc::clone(&self.model);
        let output = {
            let prompt = prompt.clone();
            tokio::task::spawn_blocking(move || model.generate(&prompt, &params)).await??
        };
        Ok(strip_prompt(&output, &prompt))
    }
}
