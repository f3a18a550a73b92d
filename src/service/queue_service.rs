//! Queue service: ticket allocation, the staff state machine and status
//! reads.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tokio_util::sync::CancellationToken;

use super::allocator::CounterAllocator;
use super::status_cache::StatusCache;
use super::status_computer::{build_my_ticket_view, build_room_status};
use crate::clock::Clock;
use crate::domain::shift::current_shift_prefix;
use crate::domain::{
    CustomerId, EventBus, MyTicketView, NewTicket, QueueEvent, Room, RoomId, RoomStatus, Site,
    SiteStatus, Ticket, TicketId, TicketNumber, TicketStatus,
};
use crate::error::QueueError;
use crate::persistence::{QueueStore, QueueTx, SiteWithRooms};

/// Outcome of taking a ticket.
#[derive(Debug, Clone)]
pub struct TakenTicket {
    /// The new `Waiting` ticket.
    pub ticket: Ticket,
    /// Room status recomputed after the take.
    pub status: RoomStatus,
    /// Personal view of the new ticket.
    pub my_ticket: Option<MyTicketView>,
}

/// Room status plus the caller's own ticket, if one was asked for.
#[derive(Debug, Clone)]
pub struct RoomStatusReport {
    /// Site slug.
    pub site_slug: String,
    /// Room slug.
    pub room_slug: String,
    /// Possibly cached room status.
    pub status: RoomStatus,
    /// Freshly computed personal view.
    pub my_ticket: Option<MyTicketView>,
}

/// Orchestration layer for all queue operations.
///
/// Every mutation follows the same pattern: resolve the room, run the
/// storage work in one transaction raced against the caller's
/// cancellation token, commit, evict the room's cached status, recompute
/// the status from storage, publish a [`QueueEvent`] and return.
#[derive(Debug, Clone)]
pub struct QueueService {
    pub(super) store: Arc<dyn QueueStore>,
    pub(super) clock: Arc<dyn Clock>,
    cache: Arc<StatusCache>,
    event_bus: EventBus,
    allocator: CounterAllocator,
}

impl QueueService {
    /// Creates a service with a default status cache and allocator.
    #[must_use]
    pub fn new(store: Arc<dyn QueueStore>, clock: Arc<dyn Clock>, event_bus: EventBus) -> Self {
        Self {
            store,
            clock,
            cache: Arc::new(StatusCache::default()),
            event_bus,
            allocator: CounterAllocator::default(),
        }
    }

    /// Replaces the status cache.
    #[must_use]
    pub fn with_cache(mut self, cache: StatusCache) -> Self {
        self.cache = Arc::new(cache);
        self
    }

    /// Replaces the counter allocator.
    #[must_use]
    pub fn with_allocator(mut self, allocator: CounterAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub const fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Returns a reference to the status cache.
    #[must_use]
    pub fn cache(&self) -> &StatusCache {
        &self.cache
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    /// Lists every site with its rooms.
    ///
    /// # Errors
    ///
    /// Returns the storage error.
    pub async fn catalog(&self) -> Result<Vec<SiteWithRooms>, QueueError> {
        self.store.catalog().await
    }

    /// Room status (possibly cached) and, when `ticket_id` is given, the
    /// caller's ticket view for today.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::SiteNotFound`] / [`QueueError::RoomNotFound`]
    /// for unknown slugs, or the storage error.
    pub async fn get_room_status(
        &self,
        site_slug: &str,
        room_slug: &str,
        ticket_id: Option<TicketId>,
    ) -> Result<RoomStatusReport, QueueError> {
        let (site, room) = self.resolve_room(site_slug, room_slug).await?;
        let now = self.clock.now_local();
        let service_date = now.date_naive();

        let status = self.cached_room_status(&room, service_date, now).await?;
        let my_ticket = match ticket_id {
            Some(ticket_id) => {
                build_my_ticket_view(self.store.as_ref(), &room, service_date, ticket_id, now)
                    .await?
            }
            None => None,
        };

        Ok(RoomStatusReport {
            site_slug: site.slug,
            room_slug: room.slug,
            status,
            my_ticket,
        })
    }

    /// Status of every room of a site, ordered by room slug.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::SiteNotFound`] for an unknown slug, or the
    /// storage error.
    pub async fn get_site_status(&self, site_slug: &str) -> Result<SiteStatus, QueueError> {
        let site = self
            .store
            .site_by_slug(site_slug)
            .await?
            .ok_or_else(|| QueueError::SiteNotFound(site_slug.to_string()))?;
        let now = self.clock.now_local();
        let service_date = now.date_naive();

        let rooms = self.store.rooms_of_site(site.id).await?;
        let mut statuses = Vec::with_capacity(rooms.len());
        for room in &rooms {
            statuses.push(self.cached_room_status(room, service_date, now).await?);
        }

        Ok(SiteStatus {
            site_slug: site.slug,
            now: now.fixed_offset(),
            rooms: statuses,
        })
    }

    /// Waiting tickets of a room for today, ascending by number.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::SiteNotFound`] / [`QueueError::RoomNotFound`]
    /// for unknown slugs, or the storage error.
    pub async fn waiting_list(
        &self,
        site_slug: &str,
        room_slug: &str,
    ) -> Result<Vec<TicketNumber>, QueueError> {
        let (_, room) = self.resolve_room(site_slug, room_slug).await?;
        let tickets = self
            .store
            .tickets_with_status(room.id, self.clock.today_local(), TicketStatus::Waiting)
            .await?;
        Ok(tickets.iter().map(TicketNumber::from).collect())
    }

    /// Takes a new ticket in the room's current shift.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::SiteNotFound`] / [`QueueError::RoomNotFound`]
    /// for unknown slugs, [`QueueError::InvalidRequest`] for an unknown
    /// customer, [`QueueError::TransientStorageConflict`] when every
    /// allocation attempt lost a race, [`QueueError::Cancelled`] if
    /// `cancel` fired before commit, or the storage error.
    pub async fn take_ticket(
        &self,
        site_slug: &str,
        room_slug: &str,
        customer_id: Option<CustomerId>,
        cancel: &CancellationToken,
    ) -> Result<TakenTicket, QueueError> {
        let (site, room) = self.resolve_room(site_slug, room_slug).await?;
        if let Some(customer_id) = customer_id
            && self.store.customer(customer_id).await?.is_none()
        {
            return Err(QueueError::InvalidRequest(format!(
                "unknown customer: {customer_id}"
            )));
        }

        let now_utc = self.clock.utc_now();
        let now = now_utc.with_timezone(&self.clock.time_zone());
        let service_date = now.date_naive();
        let shift = current_shift_prefix(now.time(), &room.reset_times());

        let mut attempt = 1;
        let ticket = loop {
            let allocator = self.allocator;
            let room_id = room.id;
            let shift = shift.clone();
            let result = self
                .transact(cancel, move |mut tx| async move {
                    let number = allocator
                        .allocate(tx.as_mut(), room_id, service_date, &shift, now_utc)
                        .await?;
                    let ticket = tx
                        .insert_ticket(NewTicket {
                            room_id,
                            service_date,
                            number,
                            shift_prefix: shift,
                            customer_id,
                            created_at: now_utc,
                        })
                        .await?;
                    Ok((tx, ticket))
                })
                .await;

            match result {
                Err(QueueError::TransientStorageConflict)
                    if attempt < self.allocator.max_attempts() =>
                {
                    tracing::warn!(
                        site = %site.slug,
                        room = %room.slug,
                        attempt,
                        "ticket allocation conflicted, retrying"
                    );
                    attempt += 1;
                }
                other => break other?,
            }
        };

        tracing::info!(
            site = %site.slug,
            room = %room.slug,
            ticket_id = %ticket.id,
            number = %ticket.display_number(),
            "ticket taken"
        );

        let status = self.after_mutation(&site, &room, service_date, now).await?;
        let my_ticket =
            build_my_ticket_view(self.store.as_ref(), &room, service_date, ticket.id, now).await?;

        Ok(TakenTicket {
            ticket,
            status,
            my_ticket,
        })
    }

    /// Moves the lowest waiting ticket to `Serving` unless a ticket is
    /// already being served. Calling it again with nothing in between
    /// changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::SiteNotFound`] / [`QueueError::RoomNotFound`]
    /// for unknown slugs, [`QueueError::Cancelled`] if `cancel` fired
    /// before commit, or the storage error.
    pub async fn call_next(
        &self,
        site_slug: &str,
        room_slug: &str,
        cancel: &CancellationToken,
    ) -> Result<RoomStatus, QueueError> {
        let (site, room) = self.resolve_room(site_slug, room_slug).await?;
        let now = self.clock.now_local();
        let service_date = now.date_naive();
        let room_id = room.id;
        let at = now.with_timezone(&Utc);

        let called = self
            .transact(cancel, move |mut tx| async move {
                let called = call_next_in(tx.as_mut(), room_id, service_date, at).await?;
                Ok((tx, called))
            })
            .await?;

        log_called(&site, &room, called.as_ref());
        self.after_mutation(&site, &room, service_date, now).await
    }

    /// Completes the serving ticket, if any, then calls the next one.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::SiteNotFound`] / [`QueueError::RoomNotFound`]
    /// for unknown slugs, [`QueueError::Cancelled`] if `cancel` fired
    /// before commit, or the storage error.
    pub async fn complete_current(
        &self,
        site_slug: &str,
        room_slug: &str,
        cancel: &CancellationToken,
    ) -> Result<RoomStatus, QueueError> {
        self.finish_current(site_slug, room_slug, TicketStatus::Completed, cancel)
            .await
    }

    /// Skips the serving ticket, if any, then calls the next one.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::SiteNotFound`] / [`QueueError::RoomNotFound`]
    /// for unknown slugs, [`QueueError::Cancelled`] if `cancel` fired
    /// before commit, or the storage error.
    pub async fn skip_current(
        &self,
        site_slug: &str,
        room_slug: &str,
        cancel: &CancellationToken,
    ) -> Result<RoomStatus, QueueError> {
        self.finish_current(site_slug, room_slug, TicketStatus::Skipped, cancel)
            .await
    }

    /// Completes a ticket by id; only today's serving ticket qualifies.
    /// Calls the next ticket of the same room afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::TicketNotFound`] for an unknown ticket,
    /// [`QueueError::TicketNotForToday`] for a ticket of another service
    /// date, [`QueueError::TicketNotServing`] when it is not `Serving`,
    /// [`QueueError::Cancelled`] if `cancel` fired before commit, or the
    /// storage error.
    pub async fn complete_by_ticket_id(
        &self,
        ticket_id: TicketId,
        cancel: &CancellationToken,
    ) -> Result<RoomStatus, QueueError> {
        let ticket = self
            .store
            .ticket(ticket_id)
            .await?
            .ok_or(QueueError::TicketNotFound(ticket_id))?;
        let now = self.clock.now_local();
        let service_date = now.date_naive();
        if ticket.service_date != service_date {
            return Err(QueueError::TicketNotForToday(ticket_id));
        }
        if ticket.status != TicketStatus::Serving {
            return Err(QueueError::TicketNotServing(ticket_id));
        }
        let (site, room) = self
            .store
            .room_by_id(ticket.room_id)
            .await?
            .ok_or(QueueError::TicketNotFound(ticket_id))?;

        let room_id = room.id;
        let at = now.with_timezone(&Utc);
        let (finished, called) = self
            .transact(cancel, move |mut tx| async move {
                tx.lock_room_day(room_id, service_date).await?;
                let finished = finish_ticket(
                    tx.as_mut(),
                    ticket_id,
                    TicketStatus::Completed,
                    at,
                )
                .await?
                .ok_or(QueueError::TicketNotServing(ticket_id))?;
                let called = call_next_in(tx.as_mut(), room_id, service_date, at).await?;
                Ok((tx, (finished, called)))
            })
            .await?;

        log_finished(&site, &room, &finished);
        log_called(&site, &room, called.as_ref());
        self.after_mutation(&site, &room, service_date, now).await
    }

    async fn finish_current(
        &self,
        site_slug: &str,
        room_slug: &str,
        outcome: TicketStatus,
        cancel: &CancellationToken,
    ) -> Result<RoomStatus, QueueError> {
        let (site, room) = self.resolve_room(site_slug, room_slug).await?;
        let now = self.clock.now_local();
        let service_date = now.date_naive();
        let room_id = room.id;
        let at = now.with_timezone(&Utc);

        let (finished, called) = self
            .transact(cancel, move |mut tx| async move {
                tx.lock_room_day(room_id, service_date).await?;
                let serving = tx
                    .lowest_ticket_with_status(room_id, service_date, TicketStatus::Serving)
                    .await?;
                let finished = match serving {
                    Some(ticket) => finish_ticket(tx.as_mut(), ticket.id, outcome, at).await?,
                    None => None,
                };
                let called = call_next_in(tx.as_mut(), room_id, service_date, at).await?;
                Ok((tx, (finished, called)))
            })
            .await?;

        if let Some(finished) = &finished {
            log_finished(&site, &room, finished);
        }
        log_called(&site, &room, called.as_ref());
        self.after_mutation(&site, &room, service_date, now).await
    }

    /// Runs `body` in a fresh transaction and commits it.
    ///
    /// The body is raced against `cancel`; if the token fires first the
    /// transaction is dropped, which rolls it back. The commit itself is
    /// not raced.
    async fn transact<T, F, Fut>(&self, cancel: &CancellationToken, body: F) -> Result<T, QueueError>
    where
        F: FnOnce(Box<dyn QueueTx>) -> Fut + Send,
        Fut: Future<Output = Result<(Box<dyn QueueTx>, T), QueueError>> + Send,
        T: Send,
    {
        let work = async {
            let tx = self.store.begin().await?;
            body(tx).await
        };

        let (tx, value) = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("queue operation cancelled before commit");
                return Err(QueueError::Cancelled);
            }
            result = work => result?,
        };

        tx.commit().await?;
        Ok(value)
    }

    /// Evicts the room's cached status, recomputes it and broadcasts.
    async fn after_mutation(
        &self,
        site: &Site,
        room: &Room,
        service_date: NaiveDate,
        now: DateTime<Tz>,
    ) -> Result<RoomStatus, QueueError> {
        self.cache.invalidate(room.id, service_date);
        let status = build_room_status(self.store.as_ref(), room, service_date, now).await?;
        let _ = self
            .event_bus
            .publish(QueueEvent::queue_updated(&site.slug, &room.slug));
        Ok(status)
    }

    async fn cached_room_status(
        &self,
        room: &Room,
        service_date: NaiveDate,
        now: DateTime<Tz>,
    ) -> Result<RoomStatus, QueueError> {
        if let Some(status) = self.cache.get(room.id, service_date) {
            return Ok(status);
        }
        let generation = self.cache.generation();
        let status = build_room_status(self.store.as_ref(), room, service_date, now).await?;
        self.cache
            .insert(room.id, service_date, generation, status.clone());
        Ok(status)
    }

    async fn resolve_room(
        &self,
        site_slug: &str,
        room_slug: &str,
    ) -> Result<(Site, Room), QueueError> {
        if let Some(found) = self.store.room_by_slugs(site_slug, room_slug).await? {
            return Ok(found);
        }
        if self.store.site_by_slug(site_slug).await?.is_none() {
            return Err(QueueError::SiteNotFound(site_slug.to_string()));
        }
        Err(QueueError::RoomNotFound {
            site_slug: site_slug.to_string(),
            room_slug: room_slug.to_string(),
        })
    }
}

/// Serves the lowest waiting ticket unless one is already serving.
async fn call_next_in(
    tx: &mut dyn QueueTx,
    room_id: RoomId,
    service_date: NaiveDate,
    at: DateTime<Utc>,
) -> Result<Option<Ticket>, QueueError> {
    tx.lock_room_day(room_id, service_date).await?;
    if tx
        .lowest_ticket_with_status(room_id, service_date, TicketStatus::Serving)
        .await?
        .is_some()
    {
        return Ok(None);
    }
    let Some(next) = tx
        .lowest_ticket_with_status(room_id, service_date, TicketStatus::Waiting)
        .await?
    else {
        return Ok(None);
    };
    tx.transition_ticket(next.id, TicketStatus::Waiting, TicketStatus::Serving, at)
        .await
}

/// Moves a serving ticket to `outcome`, awarding a loyalty point to its
/// customer on completion. `None` when the ticket was no longer serving.
async fn finish_ticket(
    tx: &mut dyn QueueTx,
    ticket_id: TicketId,
    outcome: TicketStatus,
    at: DateTime<Utc>,
) -> Result<Option<Ticket>, QueueError> {
    let finished = tx
        .transition_ticket(ticket_id, TicketStatus::Serving, outcome, at)
        .await?;
    if outcome == TicketStatus::Completed
        && let Some(customer_id) = finished.as_ref().and_then(|t| t.customer_id)
    {
        tx.award_loyalty_point(customer_id).await?;
    }
    Ok(finished)
}

fn log_called(site: &Site, room: &Room, called: Option<&Ticket>) {
    match called {
        Some(ticket) => tracing::info!(
            site = %site.slug,
            room = %room.slug,
            ticket_id = %ticket.id,
            number = %ticket.display_number(),
            "ticket called"
        ),
        None => tracing::debug!(site = %site.slug, room = %room.slug, "nothing to call"),
    }
}

fn log_finished(site: &Site, room: &Room, ticket: &Ticket) {
    tracing::info!(
        site = %site.slug,
        room = %room.slug,
        ticket_id = %ticket.id,
        number = %ticket.display_number(),
        status = %ticket.status,
        "ticket finished"
    );
}
