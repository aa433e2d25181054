//! SQLite-backed contact store.

mod connection;
mod queries;

pub use connection::{Database, DEFAULT_BUSY_TIMEOUT_MS};
