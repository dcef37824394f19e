use axum::{extract::State, http::StatusCode, routing::get, Router};
use palaver_inference::ResponseGenerator;
use palaver_state::PalaverState;
use tokio::{net::TcpListener, sync::watch::Receiver};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa::OpenApi;

use crate::{
    components::openapi::openapi_routes,
    handlers::{messages::messages_router, users::users_router},
};

pub const HEALTH_PATH: &str = "/health";

#[derive(OpenApi)]
#[openapi(paths(health))]
pub(crate) struct HealthOpenApi;

/// Represents the shared state of the application.
///
/// This struct holds the components every request handler needs. It is
/// cloned into each handler, all its members are cheap handles.
///
/// # Fields
///
/// - `state`: Persistence of users and messages, each request opens its own
///   session from it.
/// - `response_generator`: Produces the model reply of a posted message.
/// - `use_chat_history`: Whether previous exchanges are prepended to the prompt.
#[derive(Clone)]
pub struct AppState {
    /// Persistence of users and messages.
    pub state: PalaverState,

    /// Produces the model reply of a posted message.
    pub response_generator: ResponseGenerator,

    /// Whether previous exchanges are prepended to the prompt.
    pub use_chat_history: bool,
}

/// Creates the router of the Palaver HTTP API.
///
/// # API Endpoints
///
/// * `POST /users` - Register a user and issue its token
/// * `DELETE /users` - Delete a user and its chat history
/// * `POST /messages` - Post a message and get the generated reply
/// * `GET /messages` - List the chat history of a user
/// * `DELETE /messages` - Clear the chat history of a user
/// * `GET /health` - Check database connectivity
/// * `GET /api-docs/openapi.json` - OpenAPI document in JSON format
pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .merge(users_router())
        .merge(messages_router())
        .route(HEALTH_PATH, get(health))
        .with_state(app_state)
        .merge(openapi_routes())
        .layer(TraceLayer::new_for_http())
}

/// Starts the HTTP server and serves until the shutdown signal fires.
///
/// # Arguments
///
/// * `app_state` - The shared state handed to every handler
/// * `tcp_listener` - A bound TCP listener the server accepts connections on
/// * `shutdown_receiver` - Receiver of the process-wide shutdown channel
///
/// # Errors
///
/// Returns an error if the server fails while serving connections.
pub async fn run_server(
    app_state: AppState,
    tcp_listener: TcpListener,
    mut shutdown_receiver: Receiver<bool>,
) -> anyhow::Result<()> {
    let router = create_router(app_state);
    let server = axum::serve(tcp_listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            if shutdown_receiver.changed().await.is_err() {
                warn!(
                    target = "palaver-service",
                    event = "shutdown-channel-closed",
                    "Shutdown channel closed, stopping the server"
                );
            }
            info!(
                target = "palaver-service",
                event = "service-shutdown",
                "Shutting down the Palaver service"
            );
        },
    );
    server.await?;
    Ok(())
}

/// Health check endpoint.
///
/// # Returns
/// * `StatusCode::OK` - A database connection could be acquired
/// * `StatusCode::SERVICE_UNAVAILABLE` - The database is unreachable
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = OK, description = "Service is healthy"),
        (status = SERVICE_UNAVAILABLE, description = "Database is unreachable")
    )
)]
pub async fn health(State(app_state): State<AppState>) -> StatusCode {
    if app_state.state.is_healthy().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
