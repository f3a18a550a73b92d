//! Display-board endpoint.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::app_state::AppState;
use crate::domain::SiteStatus;
use crate::error::{ErrorResponse, QueueError};

/// `GET /api/tv/sites/{site}/status` — Status of every room of a site.
///
/// # Errors
///
/// Returns [`QueueError::SiteNotFound`] for an unknown slug.
#[utoipa::path(
    get,
    path = "/api/tv/sites/{site}/status",
    tag = "TV",
    summary = "Site status",
    description = "Room statuses of the site ordered by room slug, for display boards.",
    params(
        ("site" = String, Path, description = "Site slug"),
    ),
    responses(
        (status = 200, description = "Site status", body = SiteStatus),
        (status = 404, description = "Site not found", body = ErrorResponse),
    )
)]
pub async fn site_status(
    State(state): State<AppState>,
    Path(site): Path<String>,
) -> Result<impl IntoResponse, QueueError> {
    Ok(Json(state.queue_service.get_site_status(&site).await?))
}

/// TV routes mounted under `/api/tv`.
pub fn routes() -> Router<AppState> {
    Router::new().route("/sites/{site}/status", get(site_status))
}
