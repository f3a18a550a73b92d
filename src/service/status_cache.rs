//! Short-lived, process-local cache of room status views.
//!
//! Entries are keyed by room and service date and expire after a fixed
//! TTL. Every mutation of a room evicts its entry for the current service
//! date before returning. Other processes keep their own caches, so across
//! instances a reader may see status up to one TTL old.
//!
//! A reader computes status outside any lock, so a mutation can commit and
//! evict while the read is in flight. Readers therefore take a
//! [`StatusCache::generation`] before reading storage and hand it back to
//! [`StatusCache::insert`], which refuses the value if the key was
//! invalidated since.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use dashmap::DashMap;

use crate::domain::{RoomId, RoomStatus};

/// Default time a cached room status stays valid.
pub const DEFAULT_STATUS_TTL: Duration = Duration::from_secs(3);

#[derive(Debug)]
struct CachedStatus {
    status: RoomStatus,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Slot {
    cached: Option<CachedStatus>,
    /// Generation of the latest invalidation of this key.
    invalidated_at: u64,
}

/// TTL cache of [`RoomStatus`] keyed by `(room, service date)`.
#[derive(Debug)]
pub struct StatusCache {
    entries: DashMap<(RoomId, NaiveDate), Slot>,
    generation: AtomicU64,
    ttl: Duration,
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new(DEFAULT_STATUS_TTL)
    }
}

impl StatusCache {
    /// Creates an empty cache. A zero `ttl` disables caching.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
            ttl,
        }
    }

    /// Configured time to live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current generation. Take it before reading storage and pass it to
    /// [`StatusCache::insert`].
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Returns the cached status if present and not expired.
    #[must_use]
    pub fn get(&self, room_id: RoomId, service_date: NaiveDate) -> Option<RoomStatus> {
        let key = (room_id, service_date);
        let now = Instant::now();
        if let Some(slot) = self.entries.get(&key)
            && let Some(cached) = &slot.cached
            && cached.expires_at > now
        {
            return Some(cached.status.clone());
        }
        if let Some(mut slot) = self.entries.get_mut(&key)
            && slot.cached.as_ref().is_some_and(|c| c.expires_at <= now)
        {
            slot.cached = None;
        }
        None
    }

    /// Stores a status computed from reads that started at `generation`.
    ///
    /// Returns `false` without storing when the key was invalidated after
    /// `generation` was taken, or when caching is disabled. Also drops
    /// expired entries and every key for a date before `service_date`.
    pub fn insert(
        &self,
        room_id: RoomId,
        service_date: NaiveDate,
        generation: u64,
        status: RoomStatus,
    ) -> bool {
        if self.ttl.is_zero() {
            return false;
        }
        let now = Instant::now();
        self.sweep(service_date, now);

        let mut slot = self.entries.entry((room_id, service_date)).or_default();
        if slot.invalidated_at > generation {
            tracing::trace!(%room_id, %service_date, "stale room status not cached");
            return false;
        }
        slot.cached = Some(CachedStatus {
            status,
            expires_at: now + self.ttl,
        });
        true
    }

    /// Evicts the entry of a room for a service date. Fills started before
    /// this call are refused by [`StatusCache::insert`].
    pub fn invalidate(&self, room_id: RoomId, service_date: NaiveDate) {
        let mut slot = self.entries.entry((room_id, service_date)).or_default();
        slot.invalidated_at = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if slot.cached.take().is_some() {
            tracing::trace!(%room_id, %service_date, "room status evicted");
        }
    }

    /// Number of cached statuses, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|slot| slot.cached.is_some()).count()
    }

    /// Whether no status is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of today stay so their invalidation generation survives; older
    /// dates are never read or mutated again.
    fn sweep(&self, today: NaiveDate, now: Instant) {
        self.entries.retain(|(_, date), slot| {
            if *date < today {
                return false;
            }
            if slot.cached.as_ref().is_some_and(|c| c.expires_at <= now) {
                slot.cached = None;
            }
            true
        });
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::TicketNumber;

    fn status(room_id: RoomId, waiting_count: i64) -> RoomStatus {
        RoomStatus {
            room_id,
            room_slug: "room-1".to_string(),
            room_name: "Room 1".to_string(),
            service_date: NaiveDate::default(),
            service_minutes: 10,
            current: None,
            next: None,
            next_to_take: TicketNumber::new("A", 1),
            waiting_count,
            now: Utc::now().fixed_offset(),
        }
    }

    #[test]
    fn hit_until_invalidated() {
        let cache = StatusCache::new(Duration::from_secs(60));
        let room_id = RoomId::new();
        let date = NaiveDate::default();
        assert!(cache.get(room_id, date).is_none());

        assert!(cache.insert(room_id, date, cache.generation(), status(room_id, 4)));
        let Some(hit) = cache.get(room_id, date) else {
            panic!("expected cache hit");
        };
        assert_eq!(hit.waiting_count, 4);

        cache.invalidate(room_id, date);
        assert!(cache.get(room_id, date).is_none());
    }

    #[test]
    fn keys_are_scoped_by_date() {
        let cache = StatusCache::new(Duration::from_secs(60));
        let room_id = RoomId::new();
        let date = NaiveDate::default();
        cache.insert(room_id, date, cache.generation(), status(room_id, 1));
        assert!(cache.get(room_id, date.succ_opt().unwrap_or(date)).is_none());
    }

    #[test]
    fn zero_ttl_never_stores() {
        let cache = StatusCache::new(Duration::ZERO);
        let room_id = RoomId::new();
        let stored = cache.insert(
            room_id,
            NaiveDate::default(),
            cache.generation(),
            status(room_id, 1),
        );
        assert!(!stored);
        assert!(cache.is_empty());
        assert!(cache.get(room_id, NaiveDate::default()).is_none());
    }

    #[test]
    fn expired_entries_are_dropped_on_read() {
        let cache = StatusCache::new(Duration::from_millis(1));
        let room_id = RoomId::new();
        cache.insert(
            room_id,
            NaiveDate::default(),
            cache.generation(),
            status(room_id, 1),
        );
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(room_id, NaiveDate::default()).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn fill_started_before_invalidation_is_refused() {
        let cache = StatusCache::new(Duration::from_secs(60));
        let room_id = RoomId::new();
        let date = NaiveDate::default();

        let generation = cache.generation();
        cache.invalidate(room_id, date);
        assert!(!cache.insert(room_id, date, generation, status(room_id, 0)));
        assert!(cache.get(room_id, date).is_none());

        assert!(cache.insert(room_id, date, cache.generation(), status(room_id, 1)));
        let Some(hit) = cache.get(room_id, date) else {
            panic!("expected cache hit");
        };
        assert_eq!(hit.waiting_count, 1);
    }

    #[test]
    fn invalidating_another_room_does_not_refuse_fill() {
        let cache = StatusCache::new(Duration::from_secs(60));
        let room_id = RoomId::new();
        let date = NaiveDate::default();

        let generation = cache.generation();
        cache.invalidate(RoomId::new(), date);
        assert!(cache.insert(room_id, date, generation, status(room_id, 2)));
    }

    #[test]
    fn insert_drops_earlier_dates_and_expired_entries() {
        let cache = StatusCache::new(Duration::from_millis(20));
        let room_id = RoomId::new();
        let (Some(yesterday), Some(today)) = (
            NaiveDate::from_ymd_opt(2026, 3, 1),
            NaiveDate::from_ymd_opt(2026, 3, 2),
        ) else {
            panic!("valid dates");
        };
        let other_room = RoomId::new();

        cache.insert(room_id, yesterday, cache.generation(), status(room_id, 3));
        cache.insert(other_room, today, cache.generation(), status(other_room, 1));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.len(), 2);

        cache.insert(room_id, today, cache.generation(), status(room_id, 0));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(room_id, today).is_some());
        assert!(cache.get(room_id, yesterday).is_none());
        assert!(cache.get(other_room, today).is_none());
    }
}
