//! HTTP submission layer for the dumpvault job queue.

pub mod routes;
pub mod server;
pub mod telemetry;

pub use server::{ApiServer, AppState};
