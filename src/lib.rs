//! # queue-gateway
//!
//! REST API and WebSocket gateway for walk-in service queues.
//!
//! Customers take shift-scoped tickets (`A-001`, `B-007`, ...) for a room,
//! staff call, complete and skip them, and display boards follow live
//! room and site status. Every mutation runs in one storage transaction
//! and is announced on the event bus so subscribers know to re-fetch.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── QueueService, CounterAllocator, StatusCache (service/)
//!     ├── EventBus, shift rules, status views (domain/)
//!     │
//!     └── QueueStore: PostgreSQL or in-memory (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
pub mod ws;
