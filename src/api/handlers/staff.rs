//! Staff endpoints: waiting list and the call / complete / skip controls.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::WaitingListResponse;
use crate::app_state::AppState;
use crate::domain::RoomStatus;
use crate::error::{ErrorResponse, QueueError};

/// `GET /api/staff/sites/{site}/rooms/{room}/waiting` — Waiting tickets.
///
/// # Errors
///
/// Returns [`QueueError`] when the site or room does not exist.
#[utoipa::path(
    get,
    path = "/api/staff/sites/{site}/rooms/{room}/waiting",
    tag = "Staff",
    summary = "Waiting list",
    description = "Today's waiting tickets of the room in call order.",
    params(
        ("site" = String, Path, description = "Site slug"),
        ("room" = String, Path, description = "Room slug"),
    ),
    responses(
        (status = 200, description = "Waiting tickets", body = WaitingListResponse),
        (status = 404, description = "Site or room not found", body = ErrorResponse),
    )
)]
pub async fn waiting_list(
    State(state): State<AppState>,
    Path((site, room)): Path<(String, String)>,
) -> Result<impl IntoResponse, QueueError> {
    let waiting = state.queue_service.waiting_list(&site, &room).await?;
    Ok(Json(WaitingListResponse {
        site_slug: site,
        room_slug: room,
        waiting,
    }))
}

/// `POST /api/staff/sites/{site}/rooms/{room}/call-next` — Call the next
/// ticket.
///
/// # Errors
///
/// Returns [`QueueError`] when the site or room does not exist.
#[utoipa::path(
    post,
    path = "/api/staff/sites/{site}/rooms/{room}/call-next",
    tag = "Staff",
    summary = "Call next ticket",
    description = "Serves the lowest waiting ticket unless one is already being served.",
    params(
        ("site" = String, Path, description = "Site slug"),
        ("room" = String, Path, description = "Room slug"),
    ),
    responses(
        (status = 200, description = "Room status", body = RoomStatus),
        (status = 404, description = "Site or room not found", body = ErrorResponse),
    )
)]
pub async fn call_next(
    State(state): State<AppState>,
    Path((site, room)): Path<(String, String)>,
) -> Result<impl IntoResponse, QueueError> {
    let cancel = state.shutdown.child_token();
    let status = state.queue_service.call_next(&site, &room, &cancel).await?;
    Ok(Json(status))
}

/// `POST /api/staff/sites/{site}/rooms/{room}/complete-current` — Complete
/// the serving ticket and call the next one.
///
/// # Errors
///
/// Returns [`QueueError`] when the site or room does not exist.
#[utoipa::path(
    post,
    path = "/api/staff/sites/{site}/rooms/{room}/complete-current",
    tag = "Staff",
    summary = "Complete current ticket",
    description = "Completes the serving ticket, awards its customer a loyalty point, and calls the next ticket.",
    params(
        ("site" = String, Path, description = "Site slug"),
        ("room" = String, Path, description = "Room slug"),
    ),
    responses(
        (status = 200, description = "Room status", body = RoomStatus),
        (status = 404, description = "Site or room not found", body = ErrorResponse),
    )
)]
pub async fn complete_current(
    State(state): State<AppState>,
    Path((site, room)): Path<(String, String)>,
) -> Result<impl IntoResponse, QueueError> {
    let cancel = state.shutdown.child_token();
    let status = state
        .queue_service
        .complete_current(&site, &room, &cancel)
        .await?;
    Ok(Json(status))
}

/// `POST /api/staff/sites/{site}/rooms/{room}/skip-current` — Skip the
/// serving ticket and call the next one.
///
/// # Errors
///
/// Returns [`QueueError`] when the site or room does not exist.
#[utoipa::path(
    post,
    path = "/api/staff/sites/{site}/rooms/{room}/skip-current",
    tag = "Staff",
    summary = "Skip current ticket",
    description = "Marks the serving ticket as skipped and calls the next ticket.",
    params(
        ("site" = String, Path, description = "Site slug"),
        ("room" = String, Path, description = "Room slug"),
    ),
    responses(
        (status = 200, description = "Room status", body = RoomStatus),
        (status = 404, description = "Site or room not found", body = ErrorResponse),
    )
)]
pub async fn skip_current(
    State(state): State<AppState>,
    Path((site, room)): Path<(String, String)>,
) -> Result<impl IntoResponse, QueueError> {
    let cancel = state.shutdown.child_token();
    let status = state.queue_service.skip_current(&site, &room, &cancel).await?;
    Ok(Json(status))
}

/// Staff routes mounted under `/api/staff`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sites/{site}/rooms/{room}/waiting", get(waiting_list))
        .route("/sites/{site}/rooms/{room}/call-next", post(call_next))
        .route(
            "/sites/{site}/rooms/{room}/complete-current",
            post(complete_current),
        )
        .route("/sites/{site}/rooms/{room}/skip-current", post(skip_current))
}
