//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; the WebSocket endpoint
//! lives at `/ws`.

pub mod dto;
pub mod handlers;

use std::time::Duration;

use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// Upper bound on a REST request. Not applied to `/ws`.
const REST_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenAPI document for the REST endpoints.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "form-relay", description = "Form submission relay admin API"),
    paths(
        handlers::system::health_handler,
        handlers::submissions::list_submissions,
        handlers::submissions::get_submission,
        handlers::submissions::decide_submission,
    ),
    tags(
        (name = "System", description = "Service health"),
        (name = "Submissions", description = "Submission review"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}

/// Builds the full application: REST routes, the `/ws` endpoint, and the
/// HTTP middleware stack.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(build_router().layer(TimeoutLayer::new(REST_TIMEOUT)))
        .route("/ws", get(ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
