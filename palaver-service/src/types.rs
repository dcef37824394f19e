use palaver_inference::{
    types::{DEFAULT_MAX_LENGTH, DEFAULT_TEMPERATURE, DEFAULT_TOP_K, DEFAULT_TOP_P},
    GenerationParams,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Request body for registering a new user
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct CreateUserRequest {
    /// The username to register, must not be taken yet
    pub username: String,
}

/// Request body identifying a user by its token
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct TokenRequest {
    /// The token returned at registration
    pub token: String,
}

/// Request body for posting a message
///
/// The decoding parameters are optional and forwarded to the model as given.
#[derive(Clone, Debug, Deserialize, Serialize, ToSchema, Validate)]
pub struct CreateMessageRequest {
    /// The text of the message
    #[validate(length(min = 1, message = "message content must not be empty"))]
    pub content: String,
    /// Token of the posting user
    pub user_token: String,
    /// Total token budget of the generated output, prompt included
    #[serde(default = "default_response_length")]
    pub response_length: i64,
    /// Sampling temperature
    #[serde(default = "default_response_temperature")]
    pub response_temperature: f64,
    /// Nucleus sampling threshold
    #[serde(default = "default_response_top_p")]
    pub response_top_p: f64,
    /// Number of highest-probability tokens kept before sampling
    #[serde(default = "default_response_top_k")]
    pub response_top_k: i64,
}

const fn default_response_length() -> i64 {
    DEFAULT_MAX_LENGTH
}

const fn default_response_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

const fn default_response_top_p() -> f64 {
    DEFAULT_TOP_P
}

const fn default_response_top_k() -> i64 {
    DEFAULT_TOP_K
}

impl CreateMessageRequest {
    /// Decoding parameters requested by the client
    #[must_use]
    pub const fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            max_length: self.response_length,
            temperature: self.response_temperature,
            top_p: self.response_top_p,
            top_k: self.response_top_k,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_decoding_parameters_use_defaults() {
        let request: CreateMessageRequest =
            serde_json::from_str(r#"{"content": "hi", "user_token": "t"}"#).unwrap();
        assert_eq!(request.generation_params(), GenerationParams::default());
    }

    #[test]
    fn test_decoding_parameters_are_not_range_checked() {
        let request: CreateMessageRequest = serde_json::from_str(
            r#"{"content": "hi", "user_token": "t", "response_length": -1,
                "response_temperature": -2.5, "response_top_p": 3.0, "response_top_k": 0}"#,
        )
        .unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(
            request.generation_params(),
            GenerationParams {
                max_length: -1,
                temperature: -2.5,
                top_p: 3.0,
                top_k: 0,
            }
        );
    }

    #[test]
    fn test_empty_content_is_invalid() {
        let request: CreateMessageRequest =
            serde_json::from_str(r#"{"content": "", "user_token": "t"}"#).unwrap();
        assert!(request.validate().is_err());
    }
}
