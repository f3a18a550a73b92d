//! In-memory implementation of the persistence layer.
//!
//! All state lives behind one [`tokio::sync::Mutex`]. A transaction holds
//! the lock for its whole lifetime and works on a private copy of the
//! state, which replaces the shared state on commit. Transactions are
//! therefore serializable, and a dropped transaction leaves no trace.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{CounterStrategy, NewFeedback, QueueStore, QueueTx, SiteWithRooms};
use crate::domain::{
    Customer, CustomerId, DailyCounter, Feedback, FeedbackId, NewTicket, Room, RoomId, Site,
    SiteId, Ticket, TicketId, TicketStatus,
};
use crate::error::QueueError;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    sites: HashMap<SiteId, Site>,
    rooms: HashMap<RoomId, Room>,
    tickets: HashMap<TicketId, Ticket>,
    counters: HashMap<(RoomId, NaiveDate), DailyCounter>,
    customers: HashMap<CustomerId, Customer>,
    feedbacks: HashMap<TicketId, Feedback>,
}

impl MemoryState {
    fn tickets_in(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
    ) -> impl Iterator<Item = &Ticket> + '_ {
        self.tickets
            .values()
            .filter(move |t| t.room_id == room_id && t.service_date == service_date)
    }

    fn sorted_with_status(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
        status: TicketStatus,
    ) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = self
            .tickets_in(room_id, service_date)
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| (t.number, t.created_at));
        tickets
    }

    fn lowest_with_status(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
        status: TicketStatus,
    ) -> Option<Ticket> {
        self.tickets_in(room_id, service_date)
            .filter(|t| t.status == status)
            .min_by_key(|t| (t.number, t.created_at))
            .cloned()
    }

    fn site_and_room(&self, room: &Room) -> Option<(Site, Room)> {
        self.sites
            .get(&room.site_id)
            .map(|site| (site.clone(), room.clone()))
    }

    fn rooms_sorted(&self, site_id: SiteId) -> Vec<Room> {
        let mut rooms: Vec<Room> = self
            .rooms
            .values()
            .filter(|r| r.site_id == site_id)
            .cloned()
            .collect();
        rooms.sort_by(|a, b| a.slug.cmp(&b.slug));
        rooms
    }
}

/// Process-local queue store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    strategy: CounterStrategy,
}

impl InMemoryStore {
    /// Creates an empty store using the atomic counter upsert.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store advancing counters with `strategy`.
    #[must_use]
    pub fn with_strategy(strategy: CounterStrategy) -> Self {
        Self {
            state: Arc::default(),
            strategy,
        }
    }
}

#[async_trait]
impl QueueStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn QueueTx>, QueueError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTx {
            guard,
            working,
            strategy: self.strategy,
        }))
    }

    async fn site_by_slug(&self, slug: &str) -> Result<Option<Site>, QueueError> {
        let state = self.state.lock().await;
        Ok(state.sites.values().find(|s| s.slug == slug).cloned())
    }

    async fn room_by_slugs(
        &self,
        site_slug: &str,
        room_slug: &str,
    ) -> Result<Option<(Site, Room)>, QueueError> {
        let state = self.state.lock().await;
        let Some(site) = state.sites.values().find(|s| s.slug == site_slug) else {
            return Ok(None);
        };
        Ok(state
            .rooms
            .values()
            .find(|r| r.site_id == site.id && r.slug == room_slug)
            .map(|room| (site.clone(), room.clone())))
    }

    async fn room_by_id(&self, room_id: RoomId) -> Result<Option<(Site, Room)>, QueueError> {
        let state = self.state.lock().await;
        Ok(state
            .rooms
            .get(&room_id)
            .and_then(|room| state.site_and_room(room)))
    }

    async fn rooms_of_site(&self, site_id: SiteId) -> Result<Vec<Room>, QueueError> {
        Ok(self.state.lock().await.rooms_sorted(site_id))
    }

    async fn catalog(&self) -> Result<Vec<SiteWithRooms>, QueueError> {
        let state = self.state.lock().await;
        let mut sites: Vec<Site> = state.sites.values().cloned().collect();
        sites.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(sites
            .into_iter()
            .map(|site| SiteWithRooms {
                rooms: state.rooms_sorted(site.id),
                site,
            })
            .collect())
    }

    async fn counter(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
    ) -> Result<Option<DailyCounter>, QueueError> {
        let state = self.state.lock().await;
        Ok(state.counters.get(&(room_id, service_date)).cloned())
    }

    async fn lowest_ticket_with_status(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
        status: TicketStatus,
    ) -> Result<Option<Ticket>, QueueError> {
        let state = self.state.lock().await;
        Ok(state.lowest_with_status(room_id, service_date, status))
    }

    async fn count_with_status(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
        status: TicketStatus,
    ) -> Result<i64, QueueError> {
        let state = self.state.lock().await;
        let count = state
            .tickets_in(room_id, service_date)
            .filter(|t| t.status == status)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn tickets_with_status(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
        status: TicketStatus,
    ) -> Result<Vec<Ticket>, QueueError> {
        let state = self.state.lock().await;
        Ok(state.sorted_with_status(room_id, service_date, status))
    }

    async fn count_ahead(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
        number: i32,
    ) -> Result<i64, QueueError> {
        let state = self.state.lock().await;
        let count = state
            .tickets_in(room_id, service_date)
            .filter(|t| matches!(t.status, TicketStatus::Waiting | TicketStatus::Serving))
            .filter(|t| t.number < number)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn ticket(&self, ticket_id: TicketId) -> Result<Option<Ticket>, QueueError> {
        Ok(self.state.lock().await.tickets.get(&ticket_id).cloned())
    }

    async fn customer(&self, customer_id: CustomerId) -> Result<Option<Customer>, QueueError> {
        Ok(self.state.lock().await.customers.get(&customer_id).cloned())
    }

    async fn find_or_create_customer(
        &self,
        phone: &str,
        date_of_birth: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Customer, QueueError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .customers
            .values()
            .find(|c| c.phone == phone && c.date_of_birth == date_of_birth)
        {
            return Ok(existing.clone());
        }
        let customer = Customer {
            id: CustomerId::new(),
            phone: phone.to_string(),
            date_of_birth,
            points: 0,
            created_at: now,
        };
        state.customers.insert(customer.id, customer.clone());
        Ok(customer)
    }

    async fn feedback_for_ticket(
        &self,
        ticket_id: TicketId,
    ) -> Result<Option<Feedback>, QueueError> {
        Ok(self.state.lock().await.feedbacks.get(&ticket_id).cloned())
    }

    async fn insert_feedback(&self, feedback: NewFeedback) -> Result<Feedback, QueueError> {
        let mut state = self.state.lock().await;
        if !state.tickets.contains_key(&feedback.ticket_id) {
            return Err(QueueError::TicketNotFound(feedback.ticket_id));
        }
        let stored = state
            .feedbacks
            .entry(feedback.ticket_id)
            .or_insert_with(|| Feedback {
                id: FeedbackId::new(),
                ticket_id: feedback.ticket_id,
                stars: feedback.stars,
                comment: feedback.comment,
                created_at: feedback.created_at,
            });
        Ok(stored.clone())
    }

    async fn has_sites(&self) -> Result<bool, QueueError> {
        Ok(!self.state.lock().await.sites.is_empty())
    }

    async fn insert_site(&self, site: &Site) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if state.sites.values().any(|s| s.slug == site.slug) {
            return Err(QueueError::InvalidRequest(format!(
                "site slug already exists: {}",
                site.slug
            )));
        }
        state.sites.insert(site.id, site.clone());
        Ok(())
    }

    async fn insert_room(&self, room: &Room) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if !state.sites.contains_key(&room.site_id) {
            return Err(QueueError::InvalidRequest(format!(
                "room {} references unknown site {}",
                room.slug, room.site_id
            )));
        }
        if state
            .rooms
            .values()
            .any(|r| r.site_id == room.site_id && r.slug == room.slug)
        {
            return Err(QueueError::InvalidRequest(format!(
                "room slug already exists in site: {}",
                room.slug
            )));
        }
        state.rooms.insert(room.id, room.clone());
        Ok(())
    }
}

/// Transaction over a private copy of the state, holding the store lock.
struct InMemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    strategy: CounterStrategy,
}

#[async_trait]
impl QueueTx for InMemoryTx {
    async fn lock_room_day(
        &mut self,
        _room_id: RoomId,
        _service_date: NaiveDate,
    ) -> Result<(), QueueError> {
        // The store mutex is already held for the whole transaction.
        Ok(())
    }

    fn supports_atomic_upsert(&self) -> bool {
        self.strategy == CounterStrategy::AtomicUpsert
    }

    async fn upsert_counter(
        &mut self,
        room_id: RoomId,
        service_date: NaiveDate,
        shift: &str,
        now: DateTime<Utc>,
    ) -> Result<i32, QueueError> {
        let key = (room_id, service_date);
        let next =
            DailyCounter::allocate_next(self.working.counters.get(&key), room_id, service_date, shift, now);
        let number = next.next_number;
        self.working.counters.insert(key, next);
        Ok(number)
    }

    async fn read_counter(
        &mut self,
        room_id: RoomId,
        service_date: NaiveDate,
    ) -> Result<Option<DailyCounter>, QueueError> {
        Ok(self.working.counters.get(&(room_id, service_date)).cloned())
    }

    async fn compare_and_set_counter(
        &mut self,
        expected: Option<&DailyCounter>,
        next: &DailyCounter,
    ) -> Result<bool, QueueError> {
        let key = (next.room_id, next.service_date);
        if self.working.counters.get(&key) != expected {
            return Ok(false);
        }
        self.working.counters.insert(key, next.clone());
        Ok(true)
    }

    async fn insert_ticket(&mut self, ticket: NewTicket) -> Result<Ticket, QueueError> {
        let duplicate = self.working.tickets.values().any(|t| {
            t.room_id == ticket.room_id
                && t.service_date == ticket.service_date
                && t.shift_prefix == ticket.shift_prefix
                && t.number == ticket.number
        });
        if duplicate {
            return Err(QueueError::PersistenceError(format!(
                "duplicate ticket number {}-{} for room {}",
                ticket.shift_prefix, ticket.number, ticket.room_id
            )));
        }
        let ticket = ticket.into_ticket();
        self.working.tickets.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }

    async fn ticket(&mut self, ticket_id: TicketId) -> Result<Option<Ticket>, QueueError> {
        Ok(self.working.tickets.get(&ticket_id).cloned())
    }

    async fn lowest_ticket_with_status(
        &mut self,
        room_id: RoomId,
        service_date: NaiveDate,
        status: TicketStatus,
    ) -> Result<Option<Ticket>, QueueError> {
        Ok(self.working.lowest_with_status(room_id, service_date, status))
    }

    async fn transition_ticket(
        &mut self,
        ticket_id: TicketId,
        from: TicketStatus,
        to: TicketStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Ticket>, QueueError> {
        let Some(ticket) = self.working.tickets.get(&ticket_id) else {
            return Ok(None);
        };
        if ticket.status != from {
            return Ok(None);
        }
        if to == TicketStatus::Serving {
            let (room_id, service_date) = (ticket.room_id, ticket.service_date);
            let already_serving = self
                .working
                .tickets_in(room_id, service_date)
                .any(|t| t.status == TicketStatus::Serving);
            if already_serving {
                return Err(QueueError::PersistenceError(format!(
                    "room {room_id} already has a serving ticket on {service_date}"
                )));
            }
        }
        let Some(ticket) = self.working.tickets.get_mut(&ticket_id) else {
            return Ok(None);
        };
        ticket.status = to;
        match to {
            TicketStatus::Serving => ticket.called_at = Some(at),
            TicketStatus::Completed => ticket.completed_at = Some(at),
            TicketStatus::Skipped => ticket.skipped_at = Some(at),
            TicketStatus::Waiting => {}
        }
        Ok(Some(ticket.clone()))
    }

    async fn award_loyalty_point(&mut self, customer_id: CustomerId) -> Result<(), QueueError> {
        if let Some(customer) = self.working.customers.get_mut(&customer_id) {
            customer.points = customer.points.saturating_add(1);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), QueueError> {
        let Self {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}
