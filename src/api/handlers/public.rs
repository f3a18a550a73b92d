//! Customer-facing endpoints: catalog, login, room status, tickets and
//! feedback.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    CustomerLoginRequest, CustomerLoginResponse, FeedbackRequest, FeedbackResponse,
    RoomStatusQuery, RoomStatusResponse, SiteCatalogDto, TakeTicketRequest, TakeTicketResponse,
};
use crate::app_state::AppState;
use crate::domain::{RoomStatus, TicketId};
use crate::error::{ErrorResponse, QueueError};

/// `GET /api/public/sites` — List sites and their rooms.
///
/// # Errors
///
/// Returns [`QueueError`] on storage failure.
#[utoipa::path(
    get,
    path = "/api/public/sites",
    tag = "Public",
    summary = "List sites",
    description = "Returns every site ordered by slug, each with its rooms ordered by slug.",
    responses(
        (status = 200, description = "Site catalog", body = Vec<SiteCatalogDto>),
    )
)]
pub async fn list_sites(State(state): State<AppState>) -> Result<impl IntoResponse, QueueError> {
    let catalog = state.queue_service.catalog().await?;
    let body: Vec<SiteCatalogDto> = catalog.into_iter().map(SiteCatalogDto::from).collect();
    Ok(Json(body))
}

/// `POST /api/public/customers/login` — Find or register a customer.
///
/// # Errors
///
/// Returns [`QueueError::InvalidRequest`] for a blank phone number.
#[utoipa::path(
    post,
    path = "/api/public/customers/login",
    tag = "Public",
    summary = "Customer login",
    description = "Looks up the customer by phone and date of birth, creating one with zero points when absent.",
    request_body = CustomerLoginRequest,
    responses(
        (status = 200, description = "Customer profile", body = CustomerLoginResponse),
        (status = 400, description = "Phone missing", body = ErrorResponse),
    )
)]
pub async fn login_customer(
    State(state): State<AppState>,
    Json(req): Json<CustomerLoginRequest>,
) -> Result<impl IntoResponse, QueueError> {
    let customer = state
        .queue_service
        .login_customer(&req.phone, req.date_of_birth)
        .await?;
    Ok(Json(CustomerLoginResponse::from(customer)))
}

/// `GET /api/public/sites/{site}/rooms/{room}/status` — Room status.
///
/// # Errors
///
/// Returns [`QueueError`] when the site or room does not exist.
#[utoipa::path(
    get,
    path = "/api/public/sites/{site}/rooms/{room}/status",
    tag = "Public",
    summary = "Room status",
    description = "Current, next and next-to-take numbers with the waiting count. Pass `ticket_id` to also get the position and wait estimate of that ticket.",
    params(
        ("site" = String, Path, description = "Site slug"),
        ("room" = String, Path, description = "Room slug"),
        RoomStatusQuery,
    ),
    responses(
        (status = 200, description = "Room status", body = RoomStatusResponse),
        (status = 404, description = "Site or room not found", body = ErrorResponse),
    )
)]
pub async fn room_status(
    State(state): State<AppState>,
    Path((site, room)): Path<(String, String)>,
    Query(query): Query<RoomStatusQuery>,
) -> Result<impl IntoResponse, QueueError> {
    let report = state
        .queue_service
        .get_room_status(&site, &room, query.ticket_id)
        .await?;
    Ok(Json(RoomStatusResponse::from(report)))
}

/// `POST /api/public/sites/{site}/rooms/{room}/tickets` — Take a ticket.
///
/// # Errors
///
/// Returns [`QueueError`] when the room does not exist, the customer is
/// unknown, or allocation keeps conflicting.
#[utoipa::path(
    post,
    path = "/api/public/sites/{site}/rooms/{room}/tickets",
    tag = "Public",
    summary = "Take a ticket",
    description = "Allocates the next number of the room's current shift and returns the new ticket with the updated room status.",
    params(
        ("site" = String, Path, description = "Site slug"),
        ("room" = String, Path, description = "Room slug"),
    ),
    request_body = TakeTicketRequest,
    responses(
        (status = 201, description = "Ticket taken", body = TakeTicketResponse),
        (status = 400, description = "Unknown customer", body = ErrorResponse),
        (status = 404, description = "Site or room not found", body = ErrorResponse),
        (status = 503, description = "Allocation conflict, retry", body = ErrorResponse),
    )
)]
pub async fn take_ticket(
    State(state): State<AppState>,
    Path((site, room)): Path<(String, String)>,
    Json(req): Json<TakeTicketRequest>,
) -> Result<impl IntoResponse, QueueError> {
    let cancel = state.shutdown.child_token();
    let taken = state
        .queue_service
        .take_ticket(&site, &room, req.customer_id, &cancel)
        .await?;
    Ok((StatusCode::CREATED, Json(TakeTicketResponse::from(taken))))
}

/// `POST /api/public/tickets/{id}/complete` — Complete the serving ticket.
///
/// # Errors
///
/// Returns [`QueueError`] when the ticket is unknown, not for today, or not
/// being served.
#[utoipa::path(
    post,
    path = "/api/public/tickets/{id}/complete",
    tag = "Public",
    summary = "Complete a ticket",
    description = "Completes the ticket if it is today's serving ticket, then calls the next one in its room.",
    params(
        ("id" = uuid::Uuid, Path, description = "Ticket UUID"),
    ),
    responses(
        (status = 200, description = "Room status after completion", body = RoomStatus),
        (status = 404, description = "Ticket not found", body = ErrorResponse),
        (status = 409, description = "Ticket is not serving or not for today", body = ErrorResponse),
    )
)]
pub async fn complete_ticket(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, QueueError> {
    let cancel = state.shutdown.child_token();
    let status = state
        .queue_service
        .complete_by_ticket_id(TicketId::from_uuid(id), &cancel)
        .await?;
    Ok(Json(status))
}

/// `POST /api/public/tickets/{id}/feedback` — Rate a ticket.
///
/// # Errors
///
/// Returns [`QueueError`] for stars outside 1..=5 or an unknown ticket.
#[utoipa::path(
    post,
    path = "/api/public/tickets/{id}/feedback",
    tag = "Public",
    summary = "Submit feedback",
    description = "Stores a 1-5 star rating with an optional comment. Only the first submission per ticket is kept; retries return the same feedback id.",
    params(
        ("id" = uuid::Uuid, Path, description = "Ticket UUID"),
    ),
    request_body = FeedbackRequest,
    responses(
        (status = 200, description = "Feedback stored", body = FeedbackResponse),
        (status = 404, description = "Ticket not found", body = ErrorResponse),
        (status = 409, description = "Stars out of range", body = ErrorResponse),
    )
)]
pub async fn submit_feedback(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<FeedbackRequest>,
) -> Result<impl IntoResponse, QueueError> {
    let feedback = state
        .queue_service
        .submit_feedback(TicketId::from_uuid(id), req.stars, req.comment.as_deref())
        .await?;
    Ok(Json(FeedbackResponse::from(feedback)))
}

/// Public routes mounted under `/api/public`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sites", get(list_sites))
        .route("/customers/login", post(login_customer))
        .route("/sites/{site}/rooms/{room}/status", get(room_status))
        .route("/sites/{site}/rooms/{room}/tickets", post(take_ticket))
        .route("/tickets/{id}/complete", post(complete_ticket))
        .route("/tickets/{id}/feedback", post(submit_feedback))
}
