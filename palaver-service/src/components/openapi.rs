use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

use crate::{
    handlers::{messages::MessagesOpenApi, users::UsersOpenApi},
    server::HealthOpenApi,
};

pub const OPENAPI_DOCS_PATH: &str = "/api-docs/openapi.json";

/// OpenAPI documentation for the Palaver API.
#[derive(OpenApi)]
#[openapi(
    tags(
        (name = "Users", description = "User registration and removal"),
        (name = "Messages", description = "Messages and chat history"),
        (name = "Health", description = "Service health")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    )
)]
pub(crate) struct ApiDoc;

/// Builds the merged OpenAPI document of every endpoint.
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
        .merge_from(UsersOpenApi::openapi())
        .merge_from(MessagesOpenApi::openapi())
        .merge_from(HealthOpenApi::openapi())
}

/// Serves the OpenAPI document as JSON.
pub fn openapi_routes() -> Router {
    let doc = openapi();
    Router::new().route(OPENAPI_DOCS_PATH, get(move || async move { Json(doc) }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::HEALTH_PATH;

    #[test]
    fn test_openapi_lists_every_endpoint() {
        let doc = openapi();
        assert!(doc.paths.paths.contains_key("/users"));
        assert!(doc.paths.paths.contains_key("/messages"));
        assert!(doc.paths.paths.contains_key(HEALTH_PATH));
    }
}
