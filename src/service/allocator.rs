//! Shift-scoped ticket number allocation.

use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{DailyCounter, RoomId};
use crate::error::QueueError;
use crate::persistence::QueueTx;

/// Default number of attempts a ticket take makes when the counter write
/// loses a race.
pub const DEFAULT_ALLOCATION_ATTEMPTS: u32 = 3;

/// Issues the next number of a room's per-day, per-shift sequence.
///
/// The allocator is the only writer of [`DailyCounter`] rows. With a store
/// that supports it, allocation is one atomic conditional upsert.
/// Otherwise it falls back to read-then-compare-and-set inside the caller's
/// transaction, which can lose a race and report
/// [`QueueError::TransientStorageConflict`]; callers retry the whole
/// transaction up to [`CounterAllocator::max_attempts`] times.
#[derive(Debug, Clone, Copy)]
pub struct CounterAllocator {
    max_attempts: u32,
}

impl Default for CounterAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOCATION_ATTEMPTS)
    }
}

impl CounterAllocator {
    /// Creates an allocator allowing `max_attempts` tries per take (at
    /// least one).
    #[must_use]
    pub const fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
        }
    }

    /// Number of attempts a take makes before giving up on conflicts.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Allocates the next number for `room_id` on `service_date` under
    /// `shift`: 1 when no counter exists or the shift changed, previous + 1
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::TransientStorageConflict`] when the
    /// read-modify-write fallback lost a race, or the storage error.
    pub async fn allocate(
        &self,
        tx: &mut dyn QueueTx,
        room_id: RoomId,
        service_date: NaiveDate,
        shift: &str,
        now: DateTime<Utc>,
    ) -> Result<i32, QueueError> {
        if tx.supports_atomic_upsert() {
            return tx.upsert_counter(room_id, service_date, shift, now).await;
        }

        let current = tx.read_counter(room_id, service_date).await?;
        let next = DailyCounter::allocate_next(current.as_ref(), room_id, service_date, shift, now);
        if tx.compare_and_set_counter(current.as_ref(), &next).await? {
            Ok(next.next_number)
        } else {
            tracing::debug!(%room_id, %service_date, shift, "counter changed between read and write");
            Err(QueueError::TransientStorageConflict)
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::persistence::testing::StaleReadTx;
    use crate::persistence::{CounterStrategy, InMemoryStore, QueueStore};

    async fn allocate_with(store: &InMemoryStore, room_id: RoomId, shift: &str) -> i32 {
        let allocator = CounterAllocator::default();
        let Ok(mut tx) = store.begin().await else {
            panic!("begin failed");
        };
        let Ok(number) = allocator
            .allocate(tx.as_mut(), room_id, NaiveDate::default(), shift, Utc::now())
            .await
        else {
            panic!("allocation failed");
        };
        assert!(tx.commit().await.is_ok());
        number
    }

    #[tokio::test]
    async fn atomic_path_counts_up_and_resets_on_shift_change() {
        let store = InMemoryStore::new();
        let room_id = RoomId::new();
        assert_eq!(allocate_with(&store, room_id, "A").await, 1);
        assert_eq!(allocate_with(&store, room_id, "A").await, 2);
        assert_eq!(allocate_with(&store, room_id, "A").await, 3);
        assert_eq!(allocate_with(&store, room_id, "B").await, 1);
        assert_eq!(allocate_with(&store, room_id, "B").await, 2);
    }

    #[tokio::test]
    async fn read_modify_write_path_follows_the_same_rule() {
        let store = InMemoryStore::with_strategy(CounterStrategy::ReadModifyWrite);
        let room_id = RoomId::new();
        assert_eq!(allocate_with(&store, room_id, "A").await, 1);
        assert_eq!(allocate_with(&store, room_id, "A").await, 2);
        assert_eq!(allocate_with(&store, room_id, "C").await, 1);
    }

    #[tokio::test]
    async fn lost_race_is_a_transient_conflict() {
        let store = InMemoryStore::with_strategy(CounterStrategy::ReadModifyWrite);
        let room_id = RoomId::new();
        assert_eq!(allocate_with(&store, room_id, "A").await, 1);

        let Ok(inner) = store.begin().await else {
            panic!("begin failed");
        };
        let mut tx = StaleReadTx::always(inner);
        let result = CounterAllocator::default()
            .allocate(&mut tx, room_id, NaiveDate::default(), "A", Utc::now())
            .await;
        assert!(matches!(result, Err(QueueError::TransientStorageConflict)));
    }

    #[test]
    fn at_least_one_attempt() {
        assert_eq!(CounterAllocator::new(0).max_attempts(), 1);
        assert_eq!(CounterAllocator::default().max_attempts(), 3);
    }
}
