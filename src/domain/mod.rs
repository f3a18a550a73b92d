//! Domain layer: entities, shift rules, derived views and the event system.
//!
//! This module holds the server-side model of a walk-in queue: typed
//! identifiers, the persisted entities with the ticket lifecycle, the shift
//! calculator, the status views served to clients, and the event bus that
//! tells subscribers when a room changed.

pub mod event_bus;
pub mod ids;
pub mod loyalty;
pub mod model;
pub mod queue_event;
pub mod shift;
pub mod status;

pub use event_bus::EventBus;
pub use ids::{CustomerId, FeedbackId, RoomId, SiteId, TicketId};
pub use loyalty::LoyaltyTier;
pub use model::{
    Customer, DEFAULT_SERVICE_MINUTES, DailyCounter, Feedback, NewTicket, Room, Site, Ticket,
    TicketStatus,
};
pub use queue_event::QueueEvent;
pub use status::{MyTicketView, RoomStatus, SiteStatus, TicketNumber};
