//! REST endpoint handlers organized by audience.

pub mod public;
pub mod staff;
pub mod system;
pub mod tv;

use axum::Router;

use crate::app_state::AppState;

/// Composes the `/api` routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/public", public::routes())
        .nest("/staff", staff::routes())
        .nest("/tv", tv::routes())
}
