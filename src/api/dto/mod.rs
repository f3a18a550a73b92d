//! Data Transfer Objects for REST request/response serialization.
//!
//! Field names are snake_case on the wire. Room and site status bodies
//! reuse the domain views directly.

pub mod catalog_dto;
pub mod customer_dto;
pub mod ticket_dto;

pub use catalog_dto::*;
pub use customer_dto::*;
pub use ticket_dto::*;
