use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Represents a registered user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    /// Surrogate key of the user
    pub id: i64,
    /// Unique name chosen at registration
    pub username: String,
    /// Opaque token the user authenticates with
    pub token: String,
}

/// Represents a message posted by a user, together with the reply generated for it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Message {
    /// Surrogate key of the message, increasing in insertion order
    pub id: i64,
    /// Text posted by the user
    pub content: String,
    /// Reply produced by the text-generation model, if any
    pub generated_response: Option<String>,
    /// Identifier of the owning user
    pub user_id: i64,
}
