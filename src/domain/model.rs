//! Persisted entities: sites, rooms, tickets, daily counters, customers and
//! feedback.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::{CustomerId, FeedbackId, RoomId, SiteId, TicketId};
use super::shift::{format_ticket_number, parse_shift_reset_times};

/// Service time per ticket used when a room is configured with a
/// non-positive value.
pub const DEFAULT_SERVICE_MINUTES: i32 = 10;

/// A physical location owning a set of rooms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    /// Site identifier.
    pub id: SiteId,
    /// Unique URL slug.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A room inside a site. All counters and tickets are scoped by room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    /// Room identifier.
    pub id: RoomId,
    /// Owning site.
    pub site_id: SiteId,
    /// Slug, unique within the site.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Configured minutes of service per ticket.
    pub service_minutes: i32,
    /// Comma-separated `HH:mm` shift reset times, if configured.
    pub shift_reset_times: Option<String>,
}

impl Room {
    /// Service minutes with non-positive values replaced by
    /// [`DEFAULT_SERVICE_MINUTES`].
    #[must_use]
    pub const fn effective_service_minutes(&self) -> i32 {
        if self.service_minutes <= 0 {
            DEFAULT_SERVICE_MINUTES
        } else {
            self.service_minutes
        }
    }

    /// Parsed, sorted shift schedule for this room.
    #[must_use]
    pub fn reset_times(&self) -> Vec<chrono::NaiveTime> {
        parse_shift_reset_times(self.shift_reset_times.as_deref())
    }
}

/// Lifecycle state of a ticket.
///
/// `Waiting -> Serving -> {Completed, Skipped}`. Nothing re-enters
/// `Waiting`; `Completed` and `Skipped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Queued, not yet called.
    Waiting,
    /// Currently being served.
    Serving,
    /// Service finished.
    Completed,
    /// Called but passed over.
    Skipped,
}

impl TicketStatus {
    /// Storage and wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Serving => "serving",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
        }
    }

    /// Whether a ticket in this state can move to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Waiting, Self::Serving)
                | (Self::Serving, Self::Completed)
                | (Self::Serving, Self::Skipped)
        )
    }

    /// `true` for `Completed` and `Skipped`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown ticket status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ticket status: {0}")]
pub struct UnknownTicketStatus(pub String);

impl FromStr for TicketStatus {
    type Err = UnknownTicketStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "serving" => Ok(Self::Serving),
            "completed" => Ok(Self::Completed),
            "skipped" => Ok(Self::Skipped),
            other => Err(UnknownTicketStatus(other.to_string())),
        }
    }
}

/// A numbered position in a room's queue for one service date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    /// Ticket identifier.
    pub id: TicketId,
    /// Owning room.
    pub room_id: RoomId,
    /// Local calendar date the ticket belongs to.
    pub service_date: NaiveDate,
    /// Ordinal within room + date + shift.
    pub number: i32,
    /// Shift label active when the ticket was taken.
    pub shift_prefix: String,
    /// Current lifecycle state.
    pub status: TicketStatus,
    /// Customer who took the ticket, if logged in.
    pub customer_id: Option<CustomerId>,
    /// When the ticket was taken.
    pub created_at: DateTime<Utc>,
    /// When the ticket entered `Serving`.
    pub called_at: Option<DateTime<Utc>>,
    /// When the ticket was completed.
    pub completed_at: Option<DateTime<Utc>>,
    /// When the ticket was skipped.
    pub skipped_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Display form of the ticket number, e.g. `A-007`.
    #[must_use]
    pub fn display_number(&self) -> String {
        format_ticket_number(&self.shift_prefix, self.number)
    }
}

/// Values for a ticket about to be inserted in `Waiting` state.
#[derive(Debug, Clone)]
pub struct NewTicket {
    /// Owning room.
    pub room_id: RoomId,
    /// Local service date.
    pub service_date: NaiveDate,
    /// Allocated number.
    pub number: i32,
    /// Shift label the number was allocated under.
    pub shift_prefix: String,
    /// Optional customer.
    pub customer_id: Option<CustomerId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl NewTicket {
    /// Materializes the ticket row with a fresh id.
    #[must_use]
    pub fn into_ticket(self) -> Ticket {
        Ticket {
            id: TicketId::new(),
            room_id: self.room_id,
            service_date: self.service_date,
            number: self.number,
            shift_prefix: self.shift_prefix,
            status: TicketStatus::Waiting,
            customer_id: self.customer_id,
            created_at: self.created_at,
            called_at: None,
            completed_at: None,
            skipped_at: None,
        }
    }
}

/// Last issued number for a room on a service date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyCounter {
    /// Room the sequence belongs to.
    pub room_id: RoomId,
    /// Local service date.
    pub service_date: NaiveDate,
    /// Shift label of the last allocation.
    pub current_shift: String,
    /// Last issued ordinal within `current_shift`.
    pub next_number: i32,
    /// Last allocation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl DailyCounter {
    /// Counter state after issuing one number under `shift`.
    ///
    /// A missing row or a changed shift restarts the sequence at 1;
    /// otherwise the last issued number is incremented.
    #[must_use]
    pub fn allocate_next(
        existing: Option<&Self>,
        room_id: RoomId,
        service_date: NaiveDate,
        shift: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let next_number = match existing {
            Some(counter) if counter.current_shift == shift => counter.next_number + 1,
            _ => 1,
        };
        Self {
            room_id,
            service_date,
            current_shift: shift.to_string(),
            next_number,
            updated_at: now,
        }
    }
}

/// Loyalty customer, identified by phone and date of birth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    /// Customer identifier.
    pub id: CustomerId,
    /// Trimmed phone number.
    pub phone: String,
    /// Date of birth.
    pub date_of_birth: NaiveDate,
    /// Accumulated loyalty points.
    pub points: i32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Star rating left for a ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    /// Feedback identifier.
    pub id: FeedbackId,
    /// Rated ticket (one feedback per ticket).
    pub ticket_id: TicketId,
    /// Rating in `1..=5`.
    pub stars: i32,
    /// Optional trimmed comment.
    pub comment: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn room(service_minutes: i32) -> Room {
        Room {
            id: RoomId::new(),
            site_id: SiteId::new(),
            slug: "room-1".to_string(),
            name: "Room 1".to_string(),
            service_minutes,
            shift_reset_times: None,
        }
    }

    #[test]
    fn non_positive_service_minutes_fall_back_to_default() {
        assert_eq!(room(0).effective_service_minutes(), DEFAULT_SERVICE_MINUTES);
        assert_eq!(room(-4).effective_service_minutes(), DEFAULT_SERVICE_MINUTES);
        assert_eq!(room(15).effective_service_minutes(), 15);
    }

    #[test]
    fn transitions_only_move_forward() {
        use TicketStatus::*;
        assert!(Waiting.can_transition_to(Serving));
        assert!(Serving.can_transition_to(Completed));
        assert!(Serving.can_transition_to(Skipped));
        assert!(!Waiting.can_transition_to(Completed));
        assert!(!Serving.can_transition_to(Waiting));
        assert!(!Completed.can_transition_to(Serving));
        assert!(!Skipped.can_transition_to(Waiting));
    }

    #[test]
    fn status_string_round_trip() {
        for status in [
            TicketStatus::Waiting,
            TicketStatus::Serving,
            TicketStatus::Completed,
            TicketStatus::Skipped,
        ] {
            assert_eq!(status.as_str().parse::<TicketStatus>(), Ok(status));
        }
        assert!("cancelled".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn counter_restarts_on_new_row_or_shift_change() {
        let room_id = RoomId::new();
        let date = NaiveDate::default();
        let now = Utc::now();

        let first = DailyCounter::allocate_next(None, room_id, date, "A", now);
        assert_eq!(first.next_number, 1);

        let second = DailyCounter::allocate_next(Some(&first), room_id, date, "A", now);
        assert_eq!(second.next_number, 2);
        assert_eq!(second.current_shift, "A");

        let afternoon = DailyCounter::allocate_next(Some(&second), room_id, date, "B", now);
        assert_eq!(afternoon.next_number, 1);
        assert_eq!(afternoon.current_shift, "B");
    }

    #[test]
    fn new_ticket_starts_waiting() {
        let ticket = NewTicket {
            room_id: RoomId::new(),
            service_date: NaiveDate::default(),
            number: 3,
            shift_prefix: "B".to_string(),
            customer_id: None,
            created_at: Utc::now(),
        }
        .into_ticket();
        assert_eq!(ticket.status, TicketStatus::Waiting);
        assert_eq!(ticket.display_number(), "B-003");
        assert!(ticket.called_at.is_none());
    }
}
