//! Store wrappers for exercising races deterministically in tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Notify;

use super::{CounterStrategy, InMemoryStore, NewFeedback, QueueStore, QueueTx, SiteWithRooms};
use crate::domain::{
    Customer, CustomerId, DailyCounter, Feedback, NewTicket, Room, RoomId, Site, SiteId, Ticket,
    TicketId, TicketStatus,
};
use crate::error::QueueError;

/// One-shot pause point inside a read.
#[derive(Debug, Default)]
pub struct ReadGate {
    armed: AtomicBool,
    reached: Notify,
    release: Notify,
}

impl ReadGate {
    /// Makes the next gated read stop after it has read.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Resolves once a gated read is parked.
    pub async fn wait_reached(&self) {
        self.reached.notified().await;
    }

    /// Lets the parked read return.
    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.reached.notify_one();
            self.release.notified().await;
        }
    }
}

/// Transaction whose counter reads come back empty while `stale_reads` is
/// positive, as if a concurrent writer created the row right after the
/// read.
pub struct StaleReadTx {
    inner: Box<dyn QueueTx>,
    stale_reads: Arc<AtomicU32>,
}

impl StaleReadTx {
    /// Wraps `inner`; each stale read consumes one from `stale_reads`.
    pub fn new(inner: Box<dyn QueueTx>, stale_reads: Arc<AtomicU32>) -> Self {
        Self { inner, stale_reads }
    }

    /// Wraps `inner` so every counter read is stale.
    pub fn always(inner: Box<dyn QueueTx>) -> Self {
        Self::new(inner, Arc::new(AtomicU32::new(u32::MAX)))
    }
}

#[async_trait]
impl QueueTx for StaleReadTx {
    async fn lock_room_day(
        &mut self,
        room_id: RoomId,
        service_date: NaiveDate,
    ) -> Result<(), QueueError> {
        self.inner.lock_room_day(room_id, service_date).await
    }

    fn supports_atomic_upsert(&self) -> bool {
        false
    }

    async fn upsert_counter(
        &mut self,
        room_id: RoomId,
        service_date: NaiveDate,
        shift: &str,
        now: DateTime<Utc>,
    ) -> Result<i32, QueueError> {
        self.inner
            .upsert_counter(room_id, service_date, shift, now)
            .await
    }

    async fn read_counter(
        &mut self,
        room_id: RoomId,
        service_date: NaiveDate,
    ) -> Result<Option<DailyCounter>, QueueError> {
        let stale = self
            .stale_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(None);
        }
        self.inner.read_counter(room_id, service_date).await
    }

    async fn compare_and_set_counter(
        &mut self,
        expected: Option<&DailyCounter>,
        next: &DailyCounter,
    ) -> Result<bool, QueueError> {
        self.inner.compare_and_set_counter(expected, next).await
    }

    async fn insert_ticket(&mut self, ticket: NewTicket) -> Result<Ticket, QueueError> {
        self.inner.insert_ticket(ticket).await
    }

    async fn ticket(&mut self, ticket_id: TicketId) -> Result<Option<Ticket>, QueueError> {
        self.inner.ticket(ticket_id).await
    }

    async fn lowest_ticket_with_status(
        &mut self,
        room_id: RoomId,
        service_date: NaiveDate,
        status: TicketStatus,
    ) -> Result<Option<Ticket>, QueueError> {
        self.inner
            .lowest_ticket_with_status(room_id, service_date, status)
            .await
    }

    async fn transition_ticket(
        &mut self,
        ticket_id: TicketId,
        from: TicketStatus,
        to: TicketStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Ticket>, QueueError> {
        self.inner.transition_ticket(ticket_id, from, to, at).await
    }

    async fn award_loyalty_point(&mut self, customer_id: CustomerId) -> Result<(), QueueError> {
        self.inner.award_loyalty_point(customer_id).await
    }

    async fn commit(self: Box<Self>) -> Result<(), QueueError> {
        self.inner.commit().await
    }
}

/// In-memory store with scripted interference: a [`ReadGate`] on the
/// waiting-count read and a budget of stale counter reads handed to its
/// transactions.
#[derive(Debug)]
pub struct ScriptedStore {
    inner: InMemoryStore,
    gate: ReadGate,
    stale_reads: Arc<AtomicU32>,
}

impl Default for ScriptedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedStore {
    /// Creates an empty store with read-modify-write counters.
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::with_strategy(CounterStrategy::ReadModifyWrite),
            gate: ReadGate::default(),
            stale_reads: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Gate on [`QueueStore::count_with_status`].
    pub fn gate(&self) -> &ReadGate {
        &self.gate
    }

    /// Makes the next `n` counter reads in any transaction stale.
    pub fn set_stale_reads(&self, n: u32) {
        self.stale_reads.store(n, Ordering::SeqCst);
    }

    /// Stale reads not yet consumed.
    pub fn stale_reads_left(&self) -> u32 {
        self.stale_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueStore for ScriptedStore {
    async fn begin(&self) -> Result<Box<dyn QueueTx>, QueueError> {
        let inner = self.inner.begin().await?;
        Ok(Box::new(StaleReadTx::new(inner, Arc::clone(&self.stale_reads))))
    }

    async fn site_by_slug(&self, slug: &str) -> Result<Option<Site>, QueueError> {
        self.inner.site_by_slug(slug).await
    }

    async fn room_by_slugs(
        &self,
        site_slug: &str,
        room_slug: &str,
    ) -> Result<Option<(Site, Room)>, QueueError> {
        self.inner.room_by_slugs(site_slug, room_slug).await
    }

    async fn room_by_id(&self, room_id: RoomId) -> Result<Option<(Site, Room)>, QueueError> {
        self.inner.room_by_id(room_id).await
    }

    async fn rooms_of_site(&self, site_id: SiteId) -> Result<Vec<Room>, QueueError> {
        self.inner.rooms_of_site(site_id).await
    }

    async fn catalog(&self) -> Result<Vec<SiteWithRooms>, QueueError> {
        self.inner.catalog().await
    }

    async fn counter(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
    ) -> Result<Option<DailyCounter>, QueueError> {
        self.inner.counter(room_id, service_date).await
    }

    async fn lowest_ticket_with_status(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
        status: TicketStatus,
    ) -> Result<Option<Ticket>, QueueError> {
        self.inner
            .lowest_ticket_with_status(room_id, service_date, status)
            .await
    }

    async fn count_with_status(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
        status: TicketStatus,
    ) -> Result<i64, QueueError> {
        let count = self
            .inner
            .count_with_status(room_id, service_date, status)
            .await;
        self.gate.pass().await;
        count
    }

    async fn tickets_with_status(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
        status: TicketStatus,
    ) -> Result<Vec<Ticket>, QueueError> {
        self.inner
            .tickets_with_status(room_id, service_date, status)
            .await
    }

    async fn count_ahead(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
        number: i32,
    ) -> Result<i64, QueueError> {
        self.inner.count_ahead(room_id, service_date, number).await
    }

    async fn ticket(&self, ticket_id: TicketId) -> Result<Option<Ticket>, QueueError> {
        self.inner.ticket(ticket_id).await
    }

    async fn customer(&self, customer_id: CustomerId) -> Result<Option<Customer>, QueueError> {
        self.inner.customer(customer_id).await
    }

    async fn find_or_create_customer(
        &self,
        phone: &str,
        date_of_birth: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Customer, QueueError> {
        self.inner
            .find_or_create_customer(phone, date_of_birth, now)
            .await
    }

    async fn feedback_for_ticket(
        &self,
        ticket_id: TicketId,
    ) -> Result<Option<Feedback>, QueueError> {
        self.inner.feedback_for_ticket(ticket_id).await
    }

    async fn insert_feedback(&self, feedback: NewFeedback) -> Result<Feedback, QueueError> {
        self.inner.insert_feedback(feedback).await
    }

    async fn has_sites(&self) -> Result<bool, QueueError> {
        self.inner.has_sites().await
    }

    async fn insert_site(&self, site: &Site) -> Result<(), QueueError> {
        self.inner.insert_site(site).await
    }

    async fn insert_room(&self, room: &Room) -> Result<(), QueueError> {
        self.inner.insert_room(room).await
    }
}
