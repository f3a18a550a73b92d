//! Derived, non-persisted queue views.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;
use utoipa::ToSchema;

use super::ids::{RoomId, TicketId};
use super::model::{Ticket, TicketStatus};
use super::shift::format_ticket_number;

/// A ticket ordinal together with its display form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct TicketNumber {
    /// Numeric ordinal; the only value used for ordering.
    pub number: i32,
    /// Display form, e.g. `A-007`.
    pub display: String,
}

impl TicketNumber {
    /// Builds a ticket number under the given shift label.
    #[must_use]
    pub fn new(shift_prefix: &str, number: i32) -> Self {
        Self {
            number,
            display: format_ticket_number(shift_prefix, number),
        }
    }
}

impl From<&Ticket> for TicketNumber {
    fn from(ticket: &Ticket) -> Self {
        Self::new(&ticket.shift_prefix, ticket.number)
    }
}

/// Point-in-time queue state of one room for one service date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RoomStatus {
    /// Room identifier.
    pub room_id: RoomId,
    /// Room slug.
    pub room_slug: String,
    /// Room display name.
    pub room_name: String,
    /// Local service date.
    pub service_date: NaiveDate,
    /// Effective minutes of service per ticket.
    pub service_minutes: i32,
    /// Ticket being served, if any.
    pub current: Option<TicketNumber>,
    /// Lowest-numbered waiting ticket, if any.
    pub next: Option<TicketNumber>,
    /// Number a ticket taken right now would receive (advisory, not
    /// reserved).
    pub next_to_take: TicketNumber,
    /// Number of waiting tickets.
    pub waiting_count: i64,
    /// Local time the snapshot was computed.
    #[schema(value_type = String, format = DateTime)]
    pub now: DateTime<FixedOffset>,
}

/// A customer's personal view of their own ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct MyTicketView {
    /// Ticket identifier.
    pub ticket_id: TicketId,
    /// Numeric ordinal.
    pub number: i32,
    /// Display form.
    pub display_number: String,
    /// Lifecycle state.
    pub status: TicketStatus,
    /// Waiting or serving tickets with a lower number.
    pub ahead_count: i64,
    /// `ahead_count * service_minutes`.
    pub estimated_wait_minutes: i64,
    /// `now + estimated_wait_minutes`.
    #[schema(value_type = String, format = DateTime)]
    pub estimated_serve_time: DateTime<FixedOffset>,
}

impl MyTicketView {
    /// View of a completed or skipped ticket: nothing ahead, no wait.
    #[must_use]
    pub fn terminal(ticket: &Ticket, now: DateTime<FixedOffset>) -> Self {
        Self {
            ticket_id: ticket.id,
            number: ticket.number,
            display_number: ticket.display_number(),
            status: ticket.status,
            ahead_count: 0,
            estimated_wait_minutes: 0,
            estimated_serve_time: now,
        }
    }

    /// View of a live ticket with `ahead_count` tickets before it.
    #[must_use]
    pub fn pending(
        ticket: &Ticket,
        ahead_count: i64,
        service_minutes: i32,
        now: DateTime<FixedOffset>,
    ) -> Self {
        let per_ticket = i64::from(service_minutes.max(1));
        let estimated_wait_minutes = ahead_count.max(0).saturating_mul(per_ticket);
        Self {
            ticket_id: ticket.id,
            number: ticket.number,
            display_number: ticket.display_number(),
            status: ticket.status,
            ahead_count,
            estimated_wait_minutes,
            estimated_serve_time: now + chrono::Duration::minutes(estimated_wait_minutes),
        }
    }
}

/// Status of every room of a site, ordered by room slug.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SiteStatus {
    /// Site slug.
    pub site_slug: String,
    /// Local time the snapshot was computed.
    #[schema(value_type = String, format = DateTime)]
    pub now: DateTime<FixedOffset>,
    /// Per-room status.
    pub rooms: Vec<RoomStatus>,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::domain::ids::RoomId;
    use crate::domain::model::NewTicket;

    fn now() -> DateTime<FixedOffset> {
        let Some(offset) = FixedOffset::east_opt(7 * 3600) else {
            panic!("valid offset");
        };
        let Some(t) = offset.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single() else {
            panic!("valid time");
        };
        t
    }

    fn ticket(number: i32) -> Ticket {
        NewTicket {
            room_id: RoomId::new(),
            service_date: now().date_naive(),
            number,
            shift_prefix: "A".to_string(),
            customer_id: None,
            created_at: Utc::now(),
        }
        .into_ticket()
    }

    #[test]
    fn wait_estimate_scales_with_tickets_ahead() {
        let view = MyTicketView::pending(&ticket(4), 3, 10, now());
        assert_eq!(view.estimated_wait_minutes, 30);
        assert_eq!(view.estimated_serve_time, now() + chrono::Duration::minutes(30));
        assert_eq!(view.display_number, "A-004");
    }

    #[test]
    fn wait_estimate_uses_at_least_one_minute_per_ticket() {
        let view = MyTicketView::pending(&ticket(2), 2, 0, now());
        assert_eq!(view.estimated_wait_minutes, 2);
    }

    #[test]
    fn terminal_view_has_no_wait() {
        let mut done = ticket(1);
        done.status = TicketStatus::Completed;
        let view = MyTicketView::terminal(&done, now());
        assert_eq!(view.ahead_count, 0);
        assert_eq!(view.estimated_wait_minutes, 0);
        assert_eq!(view.estimated_serve_time, now());
    }
}
