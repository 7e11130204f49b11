//! `regulon-store` – external store contracts and reference implementations.
//!
//! The regulation core treats both of its stores as collaborators behind
//! traits:
//!
//! - [`config`] – [`ConfigStore`][config::ConfigStore]: per-controller
//!   settings, sensor records, and setpoint methods, with a transactional
//!   update of a method's start marker.
//!   [`SqliteConfigStore`][config::SqliteConfigStore] is the reference
//!   implementation over a local SQLite database.
//! - [`series`] – [`TimeSeriesStore`][series::TimeSeriesStore]: latest-value
//!   reads and fire-and-forget metric writes against a time-series backend.
//!   [`MemorySeriesStore`][series::MemorySeriesStore] is an in-memory
//!   implementation for tests and headless operation.

use regulon_types::RegulonError;
use thiserror::Error;

pub mod config;
pub mod series;

pub use config::{ConfigStore, SqliteConfigStore};
pub use series::{MemorySeriesStore, TimeSeriesStore};

/// Errors that can arise from store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("no {entity} row with id '{id}'")]
    MissingRow { entity: &'static str, id: String },

    #[error("malformed {entity} row '{id}': {details}")]
    Malformed {
        entity: &'static str,
        id: String,
        details: String,
    },

    #[error("time-series backend unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for RegulonError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MissingRow { .. } | StoreError::Malformed { .. } => {
                RegulonError::ConfigResolution(err.to_string())
            }
            other => RegulonError::Store(other.to_string()),
        }
    }
}
