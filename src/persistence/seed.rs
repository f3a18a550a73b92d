//! Demo catalog seeding.

use chrono::{DateTime, Utc};

use super::QueueStore;
use crate::domain::{DEFAULT_SERVICE_MINUTES, Room, RoomId, Site, SiteId};
use crate::error::QueueError;

/// Number of demo sites created on an empty store.
pub const DEMO_SITES: u32 = 4;

/// Number of rooms per demo site.
pub const DEMO_ROOMS_PER_SITE: u32 = 5;

/// Creates `site-1..4`, each with `room-1..5`, unless a site already
/// exists. Returns whether anything was inserted.
///
/// # Errors
///
/// Returns the storage error of the first failed insert.
pub async fn seed_demo_data(store: &dyn QueueStore, now: DateTime<Utc>) -> Result<bool, QueueError> {
    if store.has_sites().await? {
        tracing::debug!("catalog already present, skipping demo seed");
        return Ok(false);
    }

    for site_index in 1..=DEMO_SITES {
        let site = Site {
            id: SiteId::new(),
            slug: format!("site-{site_index}"),
            name: format!("Site {site_index}"),
            created_at: now,
        };
        store.insert_site(&site).await?;

        for room_index in 1..=DEMO_ROOMS_PER_SITE {
            let room = Room {
                id: RoomId::new(),
                site_id: site.id,
                slug: format!("room-{room_index}"),
                name: format!("Room {room_index}"),
                service_minutes: DEFAULT_SERVICE_MINUTES,
                shift_reset_times: None,
            };
            store.insert_room(&room).await?;
        }
    }

    tracing::info!(
        sites = DEMO_SITES,
        rooms_per_site = DEMO_ROOMS_PER_SITE,
        "seeded demo catalog"
    );
    Ok(true)
}
