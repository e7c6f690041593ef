//! HTTP surface: JSON API over the current snapshot plus the static dashboard page.

pub mod api;
pub mod server;

pub use api::{AppState, SharedState};
pub use server::{ServerConfig, build_router, start_server};
