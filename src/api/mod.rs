//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Queue endpoints are mounted under `/api/public`, `/api/staff` and
//! `/api/tv`; `/health` sits at the root.

pub mod dto;
pub mod handlers;
pub mod openapi;

use axum::Router;
use axum::routing::get;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

pub use openapi::ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = {
        use utoipa::OpenApi;
        router.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
    };

    router
}

/// Builds the full application: REST routes plus `/ws`, bound to `state`.
///
/// HTTP middleware (tracing, timeouts, CORS) is layered on by the binary.
pub fn build_app(state: AppState) -> Router {
    build_router()
        .route("/ws", get(ws_handler))
        .with_state(state)
}
