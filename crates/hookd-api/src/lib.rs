//! Webhook ingestion server for the hookd build daemon.
//!
//! Decodes commit notifications posted by GitHub and hands them to the
//! dispatcher. Every notification gets a short acknowledgment; build results
//! are only ever visible in the logs.

pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;
