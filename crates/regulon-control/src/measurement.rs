//! Measurement source: latest-reading fetch with staleness handling.
//!
//! Each tick the controller asks for the newest sample the configured
//! sensor wrote into the time-series store, looking back
//! `max(60, ⌊1.5 · sensor_period⌋)` seconds. A reading older than the
//! controller's `max_measure_age` raises a diagnostic but is still used;
//! only a store failure, an empty window, or an unparseable timestamp
//! yields no reading (and the arbiter will command the actuators off).

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, error, warn};

use regulon_store::TimeSeriesStore;
use regulon_types::{RegulonError, SensorConfig};

/// One accepted sensor reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Fetches the most recent measurement for a controller.
pub struct MeasurementSource {
    series: Arc<dyn TimeSeriesStore>,
}

impl MeasurementSource {
    pub fn new(series: Arc<dyn TimeSeriesStore>) -> Self {
        Self { series }
    }

    /// Lookback window in seconds for a sensor with the given sampling
    /// period: one and a half periods, floored at a minute.
    pub fn lookback_seconds(sensor_period: f64) -> u64 {
        ((sensor_period * 1.5) as u64).max(60)
    }

    /// Fetch the newest reading of `measurement` from `sensor`.
    ///
    /// Returns `None` on store failure, an empty window, or a timestamp
    /// that does not parse; all three are logged. A stale reading is
    /// logged at error level but still returned.
    pub async fn latest(
        &self,
        sensor: &SensorConfig,
        measurement: &str,
        max_measure_age: f64,
    ) -> Option<Reading> {
        let lookback = Self::lookback_seconds(sensor.period);
        let sample = match self
            .series
            .read_last(&sensor.unique_id, measurement, lookback)
            .await
        {
            Ok(sample) => sample,
            Err(e) => {
                error!(
                    sensor = %sensor.unique_id,
                    measurement,
                    error = %e,
                    "failed to read measurement from the time-series store"
                );
                return None;
            }
        };

        let (raw_timestamp, value) = match sample {
            Some(sample) => sample,
            None => {
                warn!(
                    sensor = %sensor.unique_id,
                    measurement,
                    lookback_seconds = lookback,
                    "no data returned from the time-series store"
                );
                return None;
            }
        };

        let timestamp = match parse_series_timestamp(&raw_timestamp) {
            Ok(ts) => ts,
            Err(e) => {
                warn!(
                    sensor = %sensor.unique_id,
                    raw_timestamp,
                    error = %e,
                    "discarding measurement with unparseable timestamp"
                );
                return None;
            }
        };

        let age_seconds = (Utc::now() - timestamp).num_seconds();
        if age_seconds as f64 > max_measure_age {
            error!(
                sensor = %sensor.unique_id,
                measurement,
                age_seconds,
                max_measure_age,
                "last measurement exceeds the maximum measurement age"
            );
        }
        debug!(sensor = %sensor.unique_id, measurement, value, %timestamp, "latest measurement");

        Some(Reading { timestamp, value })
    }
}

/// Parse the store's ISO-8601 UTC timestamp, ignoring any fractional
/// seconds.
fn parse_series_timestamp(raw: &str) -> Result<DateTime<Utc>, RegulonError> {
    let whole = raw.split('.').next().unwrap_or(raw);
    NaiveDateTime::parse_from_str(whole, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| RegulonError::Parse(format!("timestamp '{raw}': {e}")))
}
