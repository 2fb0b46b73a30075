use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Hub is processing events", body = HealthResponse),
        (status = 503, description = "Hub is not running", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Hub and host diagnostics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Current hub counters", body = DiagnosticsResponse),
        (status = 503, description = "Hub is not running", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Collaboration socket. Frames are JSON `{"event", "data"}` envelopes:
/// `user:join`, `note:update`, `comment:add` and `comment:delete` inbound;
/// `users:update`, `note:update` and `comments:update` outbound.
#[utoipa::path(
    get,
    path = "/ws",
    responses(
        (status = 101, description = "Switched to the WebSocket protocol"),
        (status = 403, description = "Origin not allowed")
    )
)]
#[allow(dead_code)]
pub async fn websocket_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        diagnostics_doc,
        websocket_doc,
    ),
    components(
        schemas(
            HealthResponse,
            DiagnosticsResponse,
            ErrorResponse,
            JoinPayload,
            Participant,
            CursorPosition,
            CommentInput,
            Comment,
            CommentSelection,
        )
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
