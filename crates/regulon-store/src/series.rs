//! Time-series store contract.
//!
//! Controllers read the newest sensor sample through [`TimeSeriesStore`]
//! and publish their diagnostic metrics (`setpoint`, `pid_output`,
//! `duty_cycle`) through the same trait. Timestamps cross the boundary as
//! ISO-8601 UTC strings (`YYYY-MM-DDTHH:MM:SS.ffffff`), matching the wire
//! format of the external backend.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::StoreError;

/// Wire format for timestamps returned by [`TimeSeriesStore::read_last`].
pub const SERIES_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Latest-value reads and metric writes against a time-series backend.
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Return the newest `(iso_timestamp, value)` sample written by
    /// `unique_id` for `measurement` within the past `lookback_seconds`,
    /// or `None` when the window is empty.
    async fn read_last(
        &self,
        unique_id: &str,
        measurement: &str,
        lookback_seconds: u64,
    ) -> Result<Option<(String, f64)>, StoreError>;

    /// Write one sample tagged with `unique_id` under `field`, stamped now.
    async fn write(&self, unique_id: &str, field: &str, value: f64) -> Result<(), StoreError>;
}

type SeriesKey = (String, String);

/// In-memory [`TimeSeriesStore`] for tests and headless operation.
#[derive(Default)]
pub struct MemorySeriesStore {
    inner: Mutex<HashMap<SeriesKey, Vec<(DateTime<Utc>, f64)>>>,
}

impl MemorySeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a sample at an explicit timestamp. Lets tests and the demo
    /// sensor task plant readings at arbitrary ages.
    pub fn insert_at(&self, unique_id: &str, measurement: &str, at: DateTime<Utc>, value: f64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .entry((unique_id.to_string(), measurement.to_string()))
            .or_default()
            .push((at, value));
    }

    /// Snapshot of every sample stored under `(unique_id, field)`, in
    /// insertion order.
    pub fn samples(&self, unique_id: &str, field: &str) -> Vec<(DateTime<Utc>, f64)> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .get(&(unique_id.to_string(), field.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TimeSeriesStore for MemorySeriesStore {
    async fn read_last(
        &self,
        unique_id: &str,
        measurement: &str,
        lookback_seconds: u64,
    ) -> Result<Option<(String, f64)>, StoreError> {
        let cutoff = Utc::now() - Duration::seconds(lookback_seconds as i64);
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let newest = inner
            .get(&(unique_id.to_string(), measurement.to_string()))
            .and_then(|samples| {
                samples
                    .iter()
                    .filter(|(ts, _)| *ts >= cutoff)
                    .max_by_key(|(ts, _)| *ts)
            })
            .map(|(ts, value)| (ts.format(SERIES_TIMESTAMP_FORMAT).to_string(), *value));
        Ok(newest)
    }

    async fn write(&self, unique_id: &str, field: &str, value: f64) -> Result<(), StoreError> {
        self.insert_at(unique_id, field, Utc::now(), value);
        Ok(())
    }
}
