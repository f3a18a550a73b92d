//! Ticket and room status DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{
    CustomerId, MyTicketView, RoomStatus, TicketId, TicketNumber, TicketStatus,
};
use crate::service::{RoomStatusReport, TakenTicket};

/// Request body for `POST /api/public/sites/{site}/rooms/{room}/tickets`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TakeTicketRequest {
    /// Logged-in customer taking the ticket, if any.
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
}

/// Response body for a taken ticket (201 Created).
#[derive(Debug, Serialize, ToSchema)]
pub struct TakeTicketResponse {
    /// New ticket id.
    pub ticket_id: TicketId,
    /// Numeric ordinal within the shift.
    pub number: i32,
    /// Display form, e.g. `A-007`.
    pub display_number: String,
    /// Shift label.
    pub shift_prefix: String,
    /// Always `waiting`.
    pub status: TicketStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Room status after the take.
    pub room_status: RoomStatus,
    /// Personal view of the new ticket.
    pub my_ticket: Option<MyTicketView>,
}

impl From<TakenTicket> for TakeTicketResponse {
    fn from(taken: TakenTicket) -> Self {
        Self {
            ticket_id: taken.ticket.id,
            number: taken.ticket.number,
            display_number: taken.ticket.display_number(),
            status: taken.ticket.status,
            created_at: taken.ticket.created_at,
            shift_prefix: taken.ticket.shift_prefix,
            room_status: taken.status,
            my_ticket: taken.my_ticket,
        }
    }
}

/// Query string of the room status endpoint.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct RoomStatusQuery {
    /// Ticket to build a personal view for.
    pub ticket_id: Option<TicketId>,
}

/// Response body for `GET /api/public/sites/{site}/rooms/{room}/status`.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoomStatusResponse {
    /// Site slug.
    pub site_slug: String,
    /// Room slug.
    pub room_slug: String,
    /// Room status.
    pub status: RoomStatus,
    /// Personal view of the requested ticket, when it belongs to this room
    /// today.
    pub my_ticket: Option<MyTicketView>,
}

impl From<RoomStatusReport> for RoomStatusResponse {
    fn from(report: RoomStatusReport) -> Self {
        Self {
            site_slug: report.site_slug,
            room_slug: report.room_slug,
            status: report.status,
            my_ticket: report.my_ticket,
        }
    }
}

/// Response body for the staff waiting list.
#[derive(Debug, Serialize, ToSchema)]
pub struct WaitingListResponse {
    /// Site slug.
    pub site_slug: String,
    /// Room slug.
    pub room_slug: String,
    /// Waiting tickets, ascending.
    pub waiting: Vec<TicketNumber>,
}
