use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use palaver_state::PalaverStateError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Response structure for API errors
///
/// Wraps [`ErrorDetails`] in an `error` field so every failure has the shape
/// `{"error": {...}}`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

/// Details of an API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetails {
    /// A machine-readable error code string (e.g., "INVALID_TOKEN")
    pub code: String,
    /// A human-readable error message describing what went wrong
    pub message: String,
}

/// Represents all possible errors that can occur within the Palaver service
#[derive(Debug, Error)]
pub enum PalaverServiceError {
    /// Error returned when registering a username that is already taken
    #[error("Username already registered: {username}")]
    UsernameAlreadyRegistered {
        /// The username that was requested
        username: String,
        /// The endpoint that the error occurred on
        endpoint: String,
    },

    /// Error returned when a token does not belong to any user
    #[error("Invalid token")]
    InvalidToken {
        /// The endpoint that the error occurred on
        endpoint: String,
    },

    /// Error returned when the user to delete does not exist
    #[error("User not found")]
    UserNotFound {
        /// The endpoint that the error occurred on
        endpoint: String,
    },

    /// Error returned when the request body fails validation
    #[error("Invalid request body: {message}")]
    InvalidBody {
        /// Description of why the request body is invalid
        message: String,
        /// The endpoint that the error occurred on
        endpoint: String,
    },

    /// Error returned when the text-generation model fails
    #[error("Model error: {model_error}")]
    ModelError {
        /// Description of the model error
        model_error: String,
        /// The endpoint that the error occurred on
        endpoint: String,
    },

    /// Error returned for unexpected internal server errors
    #[error("Internal server error: {message}")]
    InternalError {
        /// Description of the internal error
        message: String,
        /// The endpoint that the error occurred on
        endpoint: String,
    },
}

impl PalaverServiceError {
    /// Converts a persistence error raised while serving `endpoint`.
    ///
    /// Username conflicts keep their meaning, a message referencing a user that
    /// no longer exists is reported as an invalid token, and anything else is
    /// an internal error.
    pub fn from_state(error: PalaverStateError, endpoint: &str) -> Self {
        let endpoint = endpoint.to_string();
        match error {
            PalaverStateError::UsernameAlreadyRegistered(username) => {
                Self::UsernameAlreadyRegistered { username, endpoint }
            }
            PalaverStateError::UnknownUser(_) => Self::InvalidToken { endpoint },
            e => Self::InternalError {
                message: e.to_string(),
                endpoint,
            },
        }
    }

    /// Returns the machine-readable error code for this error type
    ///
    /// # Returns
    ///
    /// A static string representing the error code, such as:
    /// - `"USERNAME_ALREADY_REGISTERED"` for duplicate usernames
    /// - `"INVALID_TOKEN"` for tokens that match no user
    /// - `"USER_NOT_FOUND"` for deleting a user that does not exist
    /// - `"INVALID_BODY"` for request bodies failing validation
    /// - `"MODEL_ERROR"` for text-generation failures
    /// - `"INTERNAL_ERROR"` for unexpected server errors
    const fn error_code(&self) -> &'static str {
        match self {
            Self::UsernameAlreadyRegistered { .. } => "USERNAME_ALREADY_REGISTERED",
            Self::InvalidToken { .. } => "INVALID_TOKEN",
            Self::UserNotFound { .. } => "USER_NOT_FOUND",
            Self::InvalidBody { .. } => "INVALID_BODY",
            Self::ModelError { .. } => "MODEL_ERROR",
            Self::InternalError { .. } => "INTERNAL_ERROR",
        }
    }

    /// Returns a user-friendly error message for API responses
    ///
    /// Internal and model failures are reported generically, their details are
    /// only logged.
    fn client_message(&self) -> String {
        match self {
            Self::UsernameAlreadyRegistered { .. } => "Username already registered".to_string(),
            Self::InvalidToken { .. } => "Invalid token".to_string(),
            Self::UserNotFound { .. } => "User not found".to_string(),
            Self::InvalidBody { message, .. } => format!("Invalid request body: {message}"),
            Self::ModelError { .. } => "Failed to generate a response".to_string(),
            Self::InternalError { .. } => "Internal server error occurred".to_string(),
        }
    }

    /// Returns the HTTP status code associated with this error
    ///
    /// - `400 Bad Request` for client mistakes (duplicate username, unknown token, invalid body)
    /// - `500 Internal Server Error` for model and internal failures
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::UsernameAlreadyRegistered { .. }
            | Self::InvalidToken { .. }
            | Self::UserNotFound { .. }
            | Self::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            Self::ModelError { .. } | Self::InternalError { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the endpoint where the error occurred
    fn endpoint(&self) -> &str {
        match self {
            Self::UsernameAlreadyRegistered { endpoint, .. }
            | Self::InvalidToken { endpoint }
            | Self::UserNotFound { endpoint }
            | Self::InvalidBody { endpoint, .. }
            | Self::ModelError { endpoint, .. }
            | Self::InternalError { endpoint, .. } => endpoint,
        }
    }
}

impl IntoResponse for PalaverServiceError {
    fn into_response(self) -> Response {
        tracing::error!(
            target = "palaver-service",
            event = "error-occurred",
            endpoint = self.endpoint(),
            error = %self,
        );
        let error_response = ErrorResponse {
            error: ErrorDetails {
                code: self.error_code().to_string(),
                message: self.client_message(),
            },
        };
        (self.status_code(), Json(error_response)).into_response()
    }
}
