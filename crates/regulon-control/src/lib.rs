//! `regulon-control` – the regulation core.
//!
//! One [`PidController`][controller::PidController] runs one supervised
//! control loop: sample the time-series store, resolve the scheduled
//! setpoint, advance the PID recurrence, arbitrate actuator commands, and
//! publish diagnostics.
//!
//! # Modules
//!
//! - [`controller`] – [`PidController`][controller::PidController]: the
//!   periodic loop task, lifecycle state machine
//!   (activated/held/paused/stopped), and supervisory operations.
//! - [`pid`] – [`PidEngine`][pid::PidEngine]: the discrete P+I+D recurrence
//!   with a bound-clamped integrator.
//! - [`schedule`] – [`evaluate`][schedule::evaluate]: pure setpoint
//!   resolution for Date/Daily/DailySine/DailyBezier/Duration methods.
//! - [`measurement`] – [`MeasurementSource`][measurement::MeasurementSource]:
//!   latest-reading fetch with staleness diagnostics.
//! - [`arbiter`] – [`OutputArbiter`][arbiter::OutputArbiter]: control
//!   variable to relay/PWM command mapping with clamping and the
//!   anti-parallel interlock.
//! - [`metrics`] – [`MetricsSink`][metrics::MetricsSink]: fire-and-forget
//!   diagnostic writes drained by a worker task.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: process-wide
//!   tracing subscriber with an optional OTLP span exporter.

pub mod arbiter;
pub mod controller;
pub mod measurement;
pub mod metrics;
pub mod pid;
pub mod schedule;
pub mod telemetry;

pub use arbiter::{OutputArbiter, OutputConfig, TickOutputs, control_var_to_duty};
pub use controller::PidController;
pub use measurement::{MeasurementSource, Reading};
pub use metrics::{FIELD_DUTY_CYCLE, FIELD_PID_OUTPUT, FIELD_SETPOINT, MetricsSink};
pub use pid::PidEngine;
pub use schedule::{Resolution, evaluate};
pub use telemetry::{TracerProviderGuard, init_tracing};
