//! Metrics sink: fire-and-forget diagnostic writes.
//!
//! The control tick must stay latency-predictable, so metric samples are
//! pushed onto an unbounded channel and written to the time-series store by
//! a dedicated worker task. Write failures are logged and dropped; ordering
//! across samples is not guaranteed relative to subsequent ticks.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use regulon_store::TimeSeriesStore;

/// Field name for the resolved setpoint sample.
pub const FIELD_SETPOINT: &str = "setpoint";
/// Field name for the raw control variable (relay mode).
pub const FIELD_PID_OUTPUT: &str = "pid_output";
/// Field name for the signed duty cycle (PWM mode).
pub const FIELD_DUTY_CYCLE: &str = "duty_cycle";

struct Sample {
    unique_id: String,
    field: &'static str,
    value: f64,
}

/// Handle for publishing metric samples.
///
/// Cloneable; the worker task exits once every handle has been dropped and
/// the queue has drained.
#[derive(Clone)]
pub struct MetricsSink {
    tx: mpsc::UnboundedSender<Sample>,
}

impl MetricsSink {
    /// Spawn the drain worker against `series` and return the publishing
    /// handle. Must be called within a Tokio runtime.
    pub fn spawn(series: Arc<dyn TimeSeriesStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Sample>();
        tokio::spawn(async move {
            while let Some(sample) = rx.recv().await {
                if let Err(e) = series
                    .write(&sample.unique_id, sample.field, sample.value)
                    .await
                {
                    warn!(
                        unique_id = %sample.unique_id,
                        field = sample.field,
                        error = %e,
                        "metric write failed; sample dropped"
                    );
                }
            }
            debug!("metrics sink drained; worker exiting");
        });
        Self { tx }
    }

    /// Queue one sample. Never blocks; a sample published after the worker
    /// has gone is dropped with a warning.
    pub fn publish(&self, unique_id: &str, field: &'static str, value: f64) {
        let sample = Sample {
            unique_id: unique_id.to_string(),
            field,
            value,
        };
        if self.tx.send(sample).is_err() {
            warn!(field, "metrics sink worker gone; sample dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regulon_store::MemorySeriesStore;
    use std::time::Duration;

    #[tokio::test]
    async fn published_samples_reach_the_store() {
        let store = Arc::new(MemorySeriesStore::new());
        let sink = MetricsSink::spawn(store.clone());

        sink.publish("pid-1", FIELD_SETPOINT, 25.0);
        sink.publish("pid-1", FIELD_PID_OUTPUT, 17.5);

        // Writes are asynchronous; give the worker a moment to drain.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(store.samples("pid-1", FIELD_SETPOINT).len(), 1);
        assert_eq!(store.samples("pid-1", FIELD_PID_OUTPUT)[0].1, 17.5);
    }

    #[tokio::test]
    async fn clones_share_the_same_worker() {
        let store = Arc::new(MemorySeriesStore::new());
        let sink = MetricsSink::spawn(store.clone());
        let clone = sink.clone();

        sink.publish("pid-1", FIELD_DUTY_CYCLE, -40.0);
        clone.publish("pid-1", FIELD_DUTY_CYCLE, 60.0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.samples("pid-1", FIELD_DUTY_CYCLE).len(), 2);
    }
}
