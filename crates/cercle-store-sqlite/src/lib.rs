//! SQLite backend for the Cercle subject store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! pool without blocking the async runtime. Event application runs inside a
//! transaction with a compare-and-set on the subject's `last_event_id`.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
