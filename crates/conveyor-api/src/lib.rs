//! API server for the Conveyor build service.
//!
//! Provides the worker-registration endpoint, health checks, and the
//! prometheus scrape surface.

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;
