use axum::{extract::State, routing::post, Json, Router};
use palaver_state::{
    types::{Message, User},
    ChatSession, PalaverStateError,
};
use tracing::{info, instrument};
use utoipa::OpenApi;
use validator::Validate;

use crate::{
    error::{ErrorResponse, PalaverServiceError},
    handlers::Result,
    server::AppState,
    types::{CreateMessageRequest, TokenRequest},
};

pub const MESSAGES_PATH: &str = "/messages";

#[derive(OpenApi)]
#[openapi(
    paths(create_message, get_messages, delete_messages),
    components(schemas(CreateMessageRequest, TokenRequest, Message, ErrorResponse))
)]
pub(crate) struct MessagesOpenApi;

/// Router for posting messages and managing the chat history
pub fn messages_router() -> Router<AppState> {
    Router::new().route(
        MESSAGES_PATH,
        post(create_message)
            .get(get_messages)
            .delete(delete_messages),
    )
}

/// Renders a chat history as alternating `User:` and `Bot:` lines.
///
/// A message without a generated response renders an empty `Bot:` line.
#[must_use]
pub fn format_chat_history(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|message| {
            format!(
                "User: {}\nBot: {}\n",
                message.content,
                message.generated_response.as_deref().unwrap_or_default()
            )
        })
        .collect()
}

/// Deletes every message of `user_id`, one statement per message.
///
/// Nothing is committed, the caller owns the session.
pub(crate) async fn delete_chat_history(
    session: &mut ChatSession,
    user_id: i64,
) -> std::result::Result<usize, PalaverStateError> {
    let messages = session.get_messages_by_user_id(user_id).await?;
    for message in &messages {
        session.delete_message(message.id).await?;
    }
    Ok(messages.len())
}

async fn authenticate(session: &mut ChatSession, token: &str) -> Result<User> {
    session
        .get_user_by_token(token)
        .await
        .map_err(|e| PalaverServiceError::from_state(e, MESSAGES_PATH))?
        .ok_or_else(|| PalaverServiceError::InvalidToken {
            endpoint: MESSAGES_PATH.to_string(),
        })
}

/// Posts a message and stores it together with the model's reply.
///
/// The lookup session is released before the model runs, the message is then
/// written in a fresh write session.
#[utoipa::path(
    post,
    path = "/messages",
    tag = "Messages",
    request_body = CreateMessageRequest,
    responses(
        (status = OK, description = "Message created with its generated response", body = Message),
        (status = BAD_REQUEST, description = "Invalid token or message content", body = ErrorResponse),
        (status = INTERNAL_SERVER_ERROR, description = "Model or internal failure", body = ErrorResponse)
    )
)]
#[instrument(level = "info", skip_all, fields(endpoint = MESSAGES_PATH))]
pub async fn create_message(
    State(app_state): State<AppState>,
    Json(request): Json<CreateMessageRequest>,
) -> Result<Json<Message>> {
    let to_error = |e| PalaverServiceError::from_state(e, MESSAGES_PATH);
    request
        .validate()
        .map_err(|e| PalaverServiceError::InvalidBody {
            message: e.to_string(),
            endpoint: MESSAGES_PATH.to_string(),
        })?;

    let (user, history) = {
        let mut session = app_state.state.session().await.map_err(to_error)?;
        let user = authenticate(&mut session, &request.user_token).await?;
        let history = if app_state.use_chat_history {
            let messages = session
                .get_messages_by_user_id(user.id)
                .await
                .map_err(to_error)?;
            Some(format_chat_history(&messages))
        } else {
            None
        };
        (user, history)
    };

    info!(
        target = "palaver-service",
        event = "generate-response",
        user_id = user.id,
        "User found, generating response"
    );
    let generated_response = app_state
        .response_generator
        .generate_response(
            &request.content,
            history.as_deref(),
            request.generation_params(),
        )
        .await
        .map_err(|e| PalaverServiceError::ModelError {
            model_error: e.to_string(),
            endpoint: MESSAGES_PATH.to_string(),
        })?;

    let mut session = app_state.state.write_session().await.map_err(to_error)?;
    let message = session
        .insert_new_message(&request.content, Some(&generated_response), user.id)
        .await
        .map_err(to_error)?;
    session.commit().await.map_err(to_error)?;

    info!(
        target = "palaver-service",
        event = "message-created",
        user_id = user.id,
        message_id = message.id,
        "Message created"
    );
    Ok(Json(message))
}

/// Retrieves the whole chat history of the token's owner, oldest first.
#[utoipa::path(
    get,
    path = "/messages",
    tag = "Messages",
    request_body = TokenRequest,
    responses(
        (status = OK, description = "Chat history", body = Vec<Message>),
        (status = BAD_REQUEST, description = "Invalid token", body = ErrorResponse),
        (status = INTERNAL_SERVER_ERROR, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(level = "info", skip_all, fields(endpoint = MESSAGES_PATH))]
pub async fn get_messages(
    State(app_state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<Vec<Message>>> {
    let to_error = |e| PalaverServiceError::from_state(e, MESSAGES_PATH);

    let mut session = app_state.state.session().await.map_err(to_error)?;
    let user = authenticate(&mut session, &request.token).await?;
    let messages = session
        .get_messages_by_user_id(user.id)
        .await
        .map_err(to_error)?;

    info!(
        target = "palaver-service",
        event = "get-messages",
        user_id = user.id,
        count = messages.len(),
        "Retrieved chat history"
    );
    Ok(Json(messages))
}

/// Deletes the whole chat history of the token's owner. The user is kept.
#[utoipa::path(
    delete,
    path = "/messages",
    tag = "Messages",
    request_body = TokenRequest,
    responses(
        (status = OK, description = "Chat history deleted", body = String),
        (status = BAD_REQUEST, description = "Invalid token", body = ErrorResponse),
        (status = INTERNAL_SERVER_ERROR, description = "Internal server error", body = ErrorResponse)
    )
)]
#[instrument(level = "info", skip_all, fields(endpoint = MESSAGES_PATH))]
pub async fn delete_messages(
    State(app_state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<String>> {
    let to_error = |e| PalaverServiceError::from_state(e, MESSAGES_PATH);

    let mut session = app_state.state.write_session().await.map_err(to_error)?;
    let user = authenticate(&mut session, &request.token).await?;
    let deleted = delete_chat_history(&mut session, user.id)
        .await
        .map_err(to_error)?;
    session.commit().await.map_err(to_error)?;

    info!(
        target = "palaver-service",
        event = "chat-history-deleted",
        user_id = user.id,
        deleted,
        "Chat history deleted"
    );
    Ok(Json("Chat history deleted successfully".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: i64, content: &str, generated_response: Option<&str>) -> Message {
        Message {
            id,
            content: content.to_string(),
            generated_response: generated_response.map(ToString::to_string),
            user_id: 1,
        }
    }

    #[test]
    fn test_format_chat_history() {
        let messages = vec![
            message(1, "hi", Some("hello")),
            message(2, "how are you?", None),
        ];
        assert_eq!(
            format_chat_history(&messages),
            "User: hi\nBot: hello\nUser: how are you?\nBot: \n"
        );
    }

    #[test]
    fn test_format_empty_chat_history() {
        assert_eq!(format_chat_history(&[]), "");
    }
}
