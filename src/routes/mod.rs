pub mod api;
pub mod origin_policy;

use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::docs::ApiDoc;
use crate::websocket::websocket_handler;
use crate::AppState;

pub use api::create_api_routes;

/// Assemble the full HTTP surface: the WebSocket endpoint, the JSON API and
/// Swagger UI, wrapped in request tracing and the CORS policy.
pub fn create_app(state: AppState) -> Router {
    let cors = state.origins.cors_layer();

    Router::new()
        .route("/ws", get(websocket_handler))
        .nest("/api", create_api_routes())
        .with_state(state)
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}
