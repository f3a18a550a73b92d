//! Site catalog DTOs.

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{Room, RoomId, SiteId};
use crate::persistence::SiteWithRooms;

/// One site with its rooms, for `GET /api/public/sites`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SiteCatalogDto {
    /// Site identifier.
    pub site_id: SiteId,
    /// Site slug.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Rooms ordered by slug.
    pub rooms: Vec<RoomCatalogDto>,
}

/// A room entry of the catalog.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoomCatalogDto {
    /// Room identifier.
    pub room_id: RoomId,
    /// Room slug.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Effective minutes of service per ticket.
    pub service_minutes: i32,
    /// Configured shift reset times, if any.
    pub shift_reset_times: Option<String>,
}

impl From<Room> for RoomCatalogDto {
    fn from(room: Room) -> Self {
        Self {
            room_id: room.id,
            service_minutes: room.effective_service_minutes(),
            slug: room.slug,
            name: room.name,
            shift_reset_times: room.shift_reset_times,
        }
    }
}

impl From<SiteWithRooms> for SiteCatalogDto {
    fn from(entry: SiteWithRooms) -> Self {
        Self {
            site_id: entry.site.id,
            slug: entry.site.slug,
            name: entry.site.name,
            rooms: entry.rooms.into_iter().map(RoomCatalogDto::from).collect(),
        }
    }
}
