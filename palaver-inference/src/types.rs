use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_LENGTH: i64 = 50;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_P: f64 = 0.95;
pub const DEFAULT_TOP_K: i64 = 50;

/// Decoding parameters for a single generation pass.
///
/// Values are taken as given by the client. Out-of-range values are not
/// rejected, the backend decides how to interpret them.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Total token budget, prompt included
    pub max_length: i64,
    /// Sampling temperature
    pub temperature: f64,
    /// Nucleus sampling threshold
    pub top_p: f64,
    /// Number of highest-probability tokens kept before sampling
    pub top_k: i64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
        }
    }
}
