//! Persistence layer: transactional queue storage.
//!
//! [`QueueStore`] exposes point-in-time reads and catalog inserts;
//! [`QueueStore::begin`] opens a [`QueueTx`], a single transaction at
//! read-committed isolation or stronger through which every ticket and
//! counter mutation goes. Dropping a `QueueTx` without calling
//! [`QueueTx::commit`] rolls it back.
//!
//! Two implementations are provided:
//!
//! - [`PostgresStore`] (production): `sqlx::PgPool`, atomic counter upsert,
//!   advisory locks per room and service date.
//! - [`InMemoryStore`] (development and tests): one mutex-guarded state,
//!   transactions work on a private copy that replaces the shared state on
//!   commit.

pub mod memory;
pub mod postgres;
pub mod seed;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{
    Customer, CustomerId, DailyCounter, Feedback, NewTicket, Room, RoomId, Site, SiteId, Ticket,
    TicketId, TicketStatus,
};
use crate::error::QueueError;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

/// How the daily counter is advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CounterStrategy {
    /// One conditional insert-or-update statement returning the new value.
    #[default]
    AtomicUpsert,
    /// Plain read followed by a compare-and-set write. A lost race surfaces
    /// as [`QueueError::TransientStorageConflict`].
    ReadModifyWrite,
}

impl FromStr for CounterStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "atomic_upsert" | "upsert" => Ok(Self::AtomicUpsert),
            "read_modify_write" | "rmw" => Ok(Self::ReadModifyWrite),
            other => Err(format!("unknown counter strategy: {other}")),
        }
    }
}

/// A site with its rooms, ordered by room slug.
#[derive(Debug, Clone)]
pub struct SiteWithRooms {
    /// The site.
    pub site: Site,
    /// Its rooms ordered by slug.
    pub rooms: Vec<Room>,
}

/// Values for a feedback row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewFeedback {
    /// Rated ticket.
    pub ticket_id: TicketId,
    /// Stars in `1..=5`.
    pub stars: i32,
    /// Trimmed, non-blank comment.
    pub comment: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Durable storage for sites, rooms, tickets, counters, customers and
/// feedback.
///
/// Reads are independent point-in-time queries; callers accept momentary
/// skew between two reads under concurrent writes.
#[async_trait]
pub trait QueueStore: Send + Sync + fmt::Debug {
    /// Opens a transaction.
    async fn begin(&self) -> Result<Box<dyn QueueTx>, QueueError>;

    /// Looks up a site by slug.
    async fn site_by_slug(&self, slug: &str) -> Result<Option<Site>, QueueError>;

    /// Looks up a room by site slug and room slug.
    async fn room_by_slugs(
        &self,
        site_slug: &str,
        room_slug: &str,
    ) -> Result<Option<(Site, Room)>, QueueError>;

    /// Looks up a room and its site by room id.
    async fn room_by_id(&self, room_id: RoomId) -> Result<Option<(Site, Room)>, QueueError>;

    /// Rooms of a site ordered by slug.
    async fn rooms_of_site(&self, site_id: SiteId) -> Result<Vec<Room>, QueueError>;

    /// All sites ordered by slug, each with rooms ordered by slug.
    async fn catalog(&self) -> Result<Vec<SiteWithRooms>, QueueError>;

    /// Counter row for a room on a date.
    async fn counter(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
    ) -> Result<Option<DailyCounter>, QueueError>;

    /// Lowest-numbered ticket in `status` for a room on a date.
    async fn lowest_ticket_with_status(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
        status: TicketStatus,
    ) -> Result<Option<Ticket>, QueueError>;

    /// Number of tickets in `status` for a room on a date.
    async fn count_with_status(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
        status: TicketStatus,
    ) -> Result<i64, QueueError>;

    /// Tickets in `status` for a room on a date, ascending by number.
    async fn tickets_with_status(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
        status: TicketStatus,
    ) -> Result<Vec<Ticket>, QueueError>;

    /// Waiting or serving tickets with a number strictly below `number`.
    async fn count_ahead(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
        number: i32,
    ) -> Result<i64, QueueError>;

    /// Looks up a ticket by id.
    async fn ticket(&self, ticket_id: TicketId) -> Result<Option<Ticket>, QueueError>;

    /// Looks up a customer by id.
    async fn customer(&self, customer_id: CustomerId) -> Result<Option<Customer>, QueueError>;

    /// Returns the customer with this phone and birth date, creating one with
    /// zero points when absent.
    async fn find_or_create_customer(
        &self,
        phone: &str,
        date_of_birth: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Customer, QueueError>;

    /// Feedback left for a ticket.
    async fn feedback_for_ticket(&self, ticket_id: TicketId)
    -> Result<Option<Feedback>, QueueError>;

    /// Inserts feedback unless the ticket already has some; either way the
    /// stored feedback is returned (first write wins).
    async fn insert_feedback(&self, feedback: NewFeedback) -> Result<Feedback, QueueError>;

    /// Whether any site exists.
    async fn has_sites(&self) -> Result<bool, QueueError>;

    /// Inserts a site.
    async fn insert_site(&self, site: &Site) -> Result<(), QueueError>;

    /// Inserts a room.
    async fn insert_room(&self, room: &Room) -> Result<(), QueueError>;
}

/// One storage transaction.
///
/// All mutations of tickets, counters and customer points go through a
/// `QueueTx`, so a multi-row change is either fully committed or not at
/// all.
#[async_trait]
pub trait QueueTx: Send {
    /// Serializes state-machine transitions for a room and date until the
    /// transaction ends.
    async fn lock_room_day(
        &mut self,
        room_id: RoomId,
        service_date: NaiveDate,
    ) -> Result<(), QueueError>;

    /// Whether [`QueueTx::upsert_counter`] is available.
    fn supports_atomic_upsert(&self) -> bool;

    /// Atomically creates or advances the counter and returns the issued
    /// number: 1 for a new row or a changed shift, previous + 1 otherwise.
    async fn upsert_counter(
        &mut self,
        room_id: RoomId,
        service_date: NaiveDate,
        shift: &str,
        now: DateTime<Utc>,
    ) -> Result<i32, QueueError>;

    /// Reads the counter row.
    async fn read_counter(
        &mut self,
        room_id: RoomId,
        service_date: NaiveDate,
    ) -> Result<Option<DailyCounter>, QueueError>;

    /// Writes `next` only if the stored row still equals `expected`
    /// (`None` meaning "no row yet"). Returns whether the write applied.
    async fn compare_and_set_counter(
        &mut self,
        expected: Option<&DailyCounter>,
        next: &DailyCounter,
    ) -> Result<bool, QueueError>;

    /// Inserts a `Waiting` ticket.
    async fn insert_ticket(&mut self, ticket: NewTicket) -> Result<Ticket, QueueError>;

    /// Looks up a ticket by id.
    async fn ticket(&mut self, ticket_id: TicketId) -> Result<Option<Ticket>, QueueError>;

    /// Lowest-numbered ticket in `status` for a room on a date.
    async fn lowest_ticket_with_status(
        &mut self,
        room_id: RoomId,
        service_date: NaiveDate,
        status: TicketStatus,
    ) -> Result<Option<Ticket>, QueueError>;

    /// Moves a ticket from `from` to `to`, stamping the timestamp that
    /// belongs to `to`. Returns `None` when the ticket is no longer in
    /// `from`.
    async fn transition_ticket(
        &mut self,
        ticket_id: TicketId,
        from: TicketStatus,
        to: TicketStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Ticket>, QueueError>;

    /// Adds one loyalty point to a customer; a missing customer is ignored.
    async fn award_loyalty_point(&mut self, customer_id: CustomerId) -> Result<(), QueueError>;

    /// Commits the transaction.
    async fn commit(self: Box<Self>) -> Result<(), QueueError>;
}
