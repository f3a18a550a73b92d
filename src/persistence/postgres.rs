//! PostgreSQL implementation of the persistence layer.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{CounterStrategy, NewFeedback, QueueStore, QueueTx, SiteWithRooms};
use crate::domain::{
    Customer, CustomerId, DailyCounter, Feedback, FeedbackId, NewTicket, Room, RoomId, Site,
    SiteId, Ticket, TicketId, TicketStatus,
};
use crate::error::QueueError;

const TICKET_COLUMNS: &str = "id, room_id, service_date, number, shift_prefix, status, \
     customer_id, created_at, called_at, completed_at, skipped_at";

const ROOM_COLUMNS: &str = "id, site_id, slug, name, service_minutes, shift_reset_times";

/// Issues 1 for a new row or a changed shift, previous + 1 otherwise, in
/// one statement.
const UPSERT_COUNTER_SQL: &str = "\
    INSERT INTO daily_counters (room_id, service_date, current_shift, next_number, updated_at) \
    VALUES ($1, $2, $3, 1, $4) \
    ON CONFLICT (room_id, service_date) DO UPDATE SET \
        next_number = CASE \
            WHEN daily_counters.current_shift = EXCLUDED.current_shift \
                THEN daily_counters.next_number + 1 \
            ELSE 1 \
        END, \
        current_shift = EXCLUDED.current_shift, \
        updated_at = EXCLUDED.updated_at \
    RETURNING next_number";

type TicketRow = (
    Uuid,
    Uuid,
    NaiveDate,
    i32,
    String,
    String,
    Option<Uuid>,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
);

type RoomRow = (Uuid, Uuid, String, String, i32, Option<String>);
type SiteRow = (Uuid, String, String, DateTime<Utc>);
type CounterRow = (Uuid, NaiveDate, String, i32, DateTime<Utc>);
type CustomerRow = (Uuid, String, NaiveDate, i32, DateTime<Utc>);
type FeedbackRow = (Uuid, Uuid, i32, Option<String>, DateTime<Utc>);

fn ticket_from_row(row: TicketRow) -> Result<Ticket, QueueError> {
    let (
        id,
        room_id,
        service_date,
        number,
        shift_prefix,
        status,
        customer_id,
        created_at,
        called_at,
        completed_at,
        skipped_at,
    ) = row;
    let status = status
        .parse::<TicketStatus>()
        .map_err(|e| QueueError::PersistenceError(e.to_string()))?;
    Ok(Ticket {
        id: id.into(),
        room_id: room_id.into(),
        service_date,
        number,
        shift_prefix,
        status,
        customer_id: customer_id.map(CustomerId::from),
        created_at,
        called_at,
        completed_at,
        skipped_at,
    })
}

fn room_from_row((id, site_id, slug, name, service_minutes, shift_reset_times): RoomRow) -> Room {
    Room {
        id: id.into(),
        site_id: site_id.into(),
        slug,
        name,
        service_minutes,
        shift_reset_times,
    }
}

fn site_from_row((id, slug, name, created_at): SiteRow) -> Site {
    Site {
        id: id.into(),
        slug,
        name,
        created_at,
    }
}

fn counter_from_row(
    (room_id, service_date, current_shift, next_number, updated_at): CounterRow,
) -> DailyCounter {
    DailyCounter {
        room_id: room_id.into(),
        service_date,
        current_shift,
        next_number,
        updated_at,
    }
}

fn customer_from_row((id, phone, date_of_birth, points, created_at): CustomerRow) -> Customer {
    Customer {
        id: id.into(),
        phone,
        date_of_birth,
        points,
        created_at,
    }
}

fn feedback_from_row((id, ticket_id, stars, comment, created_at): FeedbackRow) -> Feedback {
    Feedback {
        id: id.into(),
        ticket_id: ticket_id.into(),
        stars,
        comment,
        created_at,
    }
}

/// PostgreSQL-backed queue store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    strategy: CounterStrategy,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool, strategy: CounterStrategy) -> Self {
        Self { pool, strategy }
    }

    /// Opens a connection pool.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError::PersistenceError`] if the database is
    /// unreachable.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        connect_timeout: Duration,
    ) -> Result<PgPool, QueueError> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await
            .map_err(|e| QueueError::PersistenceError(format!("failed to connect: {e}")))
    }

    /// Applies the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError::PersistenceError`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), QueueError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| QueueError::PersistenceError(format!("migration failed: {e}")))
    }

    async fn fetch_rooms(&self, site_id: Uuid) -> Result<Vec<Room>, QueueError> {
        let rows = sqlx::query_as::<_, RoomRow>(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms WHERE site_id = $1 ORDER BY slug"
        ))
        .bind(site_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(room_from_row).collect())
    }
}

#[async_trait]
impl QueueStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn QueueTx>, QueueError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTx {
            tx,
            strategy: self.strategy,
        }))
    }

    async fn site_by_slug(&self, slug: &str) -> Result<Option<Site>, QueueError> {
        let row = sqlx::query_as::<_, SiteRow>(
            "SELECT id, slug, name, created_at FROM sites WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(site_from_row))
    }

    async fn room_by_slugs(
        &self,
        site_slug: &str,
        room_slug: &str,
    ) -> Result<Option<(Site, Room)>, QueueError> {
        let Some(site) = self.site_by_slug(site_slug).await? else {
            return Ok(None);
        };
        let row = sqlx::query_as::<_, RoomRow>(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms WHERE site_id = $1 AND slug = $2"
        ))
        .bind(site.id.as_uuid())
        .bind(room_slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| (site, room_from_row(r))))
    }

    async fn room_by_id(&self, room_id: RoomId) -> Result<Option<(Site, Room)>, QueueError> {
        let row = sqlx::query_as::<_, RoomRow>(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms WHERE id = $1"
        ))
        .bind(room_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        let Some(room) = row.map(room_from_row) else {
            return Ok(None);
        };
        let site = sqlx::query_as::<_, SiteRow>(
            "SELECT id, slug, name, created_at FROM sites WHERE id = $1",
        )
        .bind(room.site_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(site.map(|s| (site_from_row(s), room)))
    }

    async fn rooms_of_site(&self, site_id: SiteId) -> Result<Vec<Room>, QueueError> {
        self.fetch_rooms(site_id.as_uuid()).await
    }

    async fn catalog(&self) -> Result<Vec<SiteWithRooms>, QueueError> {
        let sites = sqlx::query_as::<_, SiteRow>(
            "SELECT id, slug, name, created_at FROM sites ORDER BY slug",
        )
        .fetch_all(&self.pool)
        .await?;
        let rooms = sqlx::query_as::<_, RoomRow>(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms ORDER BY slug"
        ))
        .fetch_all(&self.pool)
        .await?;
        let rooms: Vec<Room> = rooms.into_iter().map(room_from_row).collect();

        Ok(sites
            .into_iter()
            .map(site_from_row)
            .map(|site| SiteWithRooms {
                rooms: rooms
                    .iter()
                    .filter(|r| r.site_id == site.id)
                    .cloned()
                    .collect(),
                site,
            })
            .collect())
    }

    async fn counter(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
    ) -> Result<Option<DailyCounter>, QueueError> {
        let row = sqlx::query_as::<_, CounterRow>(
            "SELECT room_id, service_date, current_shift, next_number, updated_at \
             FROM daily_counters WHERE room_id = $1 AND service_date = $2",
        )
        .bind(room_id.as_uuid())
        .bind(service_date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(counter_from_row))
    }

    async fn lowest_ticket_with_status(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
        status: TicketStatus,
    ) -> Result<Option<Ticket>, QueueError> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets \
             WHERE room_id = $1 AND service_date = $2 AND status = $3 \
             ORDER BY number, created_at LIMIT 1"
        ))
        .bind(room_id.as_uuid())
        .bind(service_date)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(ticket_from_row).transpose()
    }

    async fn count_with_status(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
        status: TicketStatus,
    ) -> Result<i64, QueueError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tickets \
             WHERE room_id = $1 AND service_date = $2 AND status = $3",
        )
        .bind(room_id.as_uuid())
        .bind(service_date)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn tickets_with_status(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
        status: TicketStatus,
    ) -> Result<Vec<Ticket>, QueueError> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets \
             WHERE room_id = $1 AND service_date = $2 AND status = $3 \
             ORDER BY number, created_at"
        ))
        .bind(room_id.as_uuid())
        .bind(service_date)
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ticket_from_row).collect()
    }

    async fn count_ahead(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
        number: i32,
    ) -> Result<i64, QueueError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tickets \
             WHERE room_id = $1 AND service_date = $2 AND number < $3 \
               AND status IN ('waiting', 'serving')",
        )
        .bind(room_id.as_uuid())
        .bind(service_date)
        .bind(number)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn ticket(&self, ticket_id: TicketId) -> Result<Option<Ticket>, QueueError> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"
        ))
        .bind(ticket_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(ticket_from_row).transpose()
    }

    async fn customer(&self, customer_id: CustomerId) -> Result<Option<Customer>, QueueError> {
        let row = sqlx::query_as::<_, CustomerRow>(
            "SELECT id, phone, date_of_birth, points, created_at FROM customers WHERE id = $1",
        )
        .bind(customer_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(customer_from_row))
    }

    async fn find_or_create_customer(
        &self,
        phone: &str,
        date_of_birth: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Customer, QueueError> {
        sqlx::query(
            "INSERT INTO customers (id, phone, date_of_birth, points, created_at) \
             VALUES ($1, $2, $3, 0, $4) \
             ON CONFLICT (phone, date_of_birth) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(phone)
        .bind(date_of_birth)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, CustomerRow>(
            "SELECT id, phone, date_of_birth, points, created_at FROM customers \
             WHERE phone = $1 AND date_of_birth = $2",
        )
        .bind(phone)
        .bind(date_of_birth)
        .fetch_one(&self.pool)
        .await?;
        Ok(customer_from_row(row))
    }

    async fn feedback_for_ticket(
        &self,
        ticket_id: TicketId,
    ) -> Result<Option<Feedback>, QueueError> {
        let row = sqlx::query_as::<_, FeedbackRow>(
            "SELECT id, ticket_id, stars, comment, created_at FROM feedbacks WHERE ticket_id = $1",
        )
        .bind(ticket_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(feedback_from_row))
    }

    async fn insert_feedback(&self, feedback: NewFeedback) -> Result<Feedback, QueueError> {
        if self.ticket(feedback.ticket_id).await?.is_none() {
            return Err(QueueError::TicketNotFound(feedback.ticket_id));
        }
        sqlx::query(
            "INSERT INTO feedbacks (id, ticket_id, stars, comment, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (ticket_id) DO NOTHING",
        )
        .bind(FeedbackId::new().as_uuid())
        .bind(feedback.ticket_id.as_uuid())
        .bind(feedback.stars)
        .bind(feedback.comment.as_deref())
        .bind(feedback.created_at)
        .execute(&self.pool)
        .await?;

        self.feedback_for_ticket(feedback.ticket_id)
            .await?
            .ok_or(QueueError::TicketNotFound(feedback.ticket_id))
    }

    async fn has_sites(&self) -> Result<bool, QueueError> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM sites)")
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn insert_site(&self, site: &Site) -> Result<(), QueueError> {
        sqlx::query("INSERT INTO sites (id, slug, name, created_at) VALUES ($1, $2, $3, $4)")
            .bind(site.id.as_uuid())
            .bind(&site.slug)
            .bind(&site.name)
            .bind(site.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_room(&self, room: &Room) -> Result<(), QueueError> {
        sqlx::query(
            "INSERT INTO rooms (id, site_id, slug, name, service_minutes, shift_reset_times) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(room.id.as_uuid())
        .bind(room.site_id.as_uuid())
        .bind(&room.slug)
        .bind(&room.name)
        .bind(room.service_minutes)
        .bind(room.shift_reset_times.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// One open database transaction. Dropping it rolls back.
struct PostgresTx {
    tx: Transaction<'static, Postgres>,
    strategy: CounterStrategy,
}

#[async_trait]
impl QueueTx for PostgresTx {
    async fn lock_room_day(
        &mut self,
        room_id: RoomId,
        service_date: NaiveDate,
    ) -> Result<(), QueueError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("queue:{room_id}:{service_date}"))
            .execute(&mut *self.tx)
            .await?;
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
        let number = sqlx::query_scalar::<_, i32>(UPSERT_COUNTER_SQL)
            .bind(room_id.as_uuid())
            .bind(service_date)
            .bind(shift)
            .bind(now)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(number)
    }

    async fn read_counter(
        &mut self,
        room_id: RoomId,
        service_date: NaiveDate,
    ) -> Result<Option<DailyCounter>, QueueError> {
        let row = sqlx::query_as::<_, CounterRow>(
            "SELECT room_id, service_date, current_shift, next_number, updated_at \
             FROM daily_counters WHERE room_id = $1 AND service_date = $2",
        )
        .bind(room_id.as_uuid())
        .bind(service_date)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(counter_from_row))
    }

    async fn compare_and_set_counter(
        &mut self,
        expected: Option<&DailyCounter>,
        next: &DailyCounter,
    ) -> Result<bool, QueueError> {
        let result = match expected {
            None => {
                sqlx::query(
                    "INSERT INTO daily_counters \
                     (room_id, service_date, current_shift, next_number, updated_at) \
                     VALUES ($1, $2, $3, $4, $5) \
                     ON CONFLICT (room_id, service_date) DO NOTHING",
                )
                .bind(next.room_id.as_uuid())
                .bind(next.service_date)
                .bind(&next.current_shift)
                .bind(next.next_number)
                .bind(next.updated_at)
                .execute(&mut *self.tx)
                .await?
            }
            Some(current) => {
                sqlx::query(
                    "UPDATE daily_counters \
                     SET current_shift = $3, next_number = $4, updated_at = $5 \
                     WHERE room_id = $1 AND service_date = $2 \
                       AND current_shift = $6 AND next_number = $7",
                )
                .bind(next.room_id.as_uuid())
                .bind(next.service_date)
                .bind(&next.current_shift)
                .bind(next.next_number)
                .bind(next.updated_at)
                .bind(&current.current_shift)
                .bind(current.next_number)
                .execute(&mut *self.tx)
                .await?
            }
        };
        Ok(result.rows_affected() == 1)
    }

    async fn insert_ticket(&mut self, ticket: NewTicket) -> Result<Ticket, QueueError> {
        let ticket = ticket.into_ticket();
        sqlx::query(
            "INSERT INTO tickets \
             (id, room_id, service_date, number, shift_prefix, status, customer_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(ticket.id.as_uuid())
        .bind(ticket.room_id.as_uuid())
        .bind(ticket.service_date)
        .bind(ticket.number)
        .bind(&ticket.shift_prefix)
        .bind(ticket.status.as_str())
        .bind(ticket.customer_id.map(CustomerId::as_uuid))
        .bind(ticket.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(ticket)
    }

    async fn ticket(&mut self, ticket_id: TicketId) -> Result<Option<Ticket>, QueueError> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"
        ))
        .bind(ticket_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(ticket_from_row).transpose()
    }

    async fn lowest_ticket_with_status(
        &mut self,
        room_id: RoomId,
        service_date: NaiveDate,
        status: TicketStatus,
    ) -> Result<Option<Ticket>, QueueError> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets \
             WHERE room_id = $1 AND service_date = $2 AND status = $3 \
             ORDER BY number, created_at LIMIT 1"
        ))
        .bind(room_id.as_uuid())
        .bind(service_date)
        .bind(status.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(ticket_from_row).transpose()
    }

    async fn transition_ticket(
        &mut self,
        ticket_id: TicketId,
        from: TicketStatus,
        to: TicketStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Ticket>, QueueError> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "UPDATE tickets SET \
                 status = $3, \
                 called_at = CASE WHEN $3 = 'serving' THEN $4 ELSE called_at END, \
                 completed_at = CASE WHEN $3 = 'completed' THEN $4 ELSE completed_at END, \
                 skipped_at = CASE WHEN $3 = 'skipped' THEN $4 ELSE skipped_at END \
             WHERE id = $1 AND status = $2 \
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(ticket_id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(ticket_from_row).transpose()
    }

    async fn award_loyalty_point(&mut self, customer_id: CustomerId) -> Result<(), QueueError> {
        sqlx::query("UPDATE customers SET points = points + 1 WHERE id = $1")
            .bind(customer_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), QueueError> {
        self.tx.commit().await?;
        Ok(())
    }
}
