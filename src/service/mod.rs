//! Service layer: business logic orchestration.
//!
//! [`QueueService`] drives the ticket lifecycle against a
//! [`crate::persistence::QueueStore`], keeps the [`StatusCache`] coherent
//! with every mutation and emits events through the
//! [`crate::domain::EventBus`].

pub mod allocator;
mod customer;
pub mod queue_service;
pub mod status_cache;
pub mod status_computer;

pub use allocator::CounterAllocator;
pub use queue_service::{QueueService, RoomStatusReport, TakenTicket};
pub use status_cache::StatusCache;
