//! `regulon-types` – shared data model for the Regulon regulation daemon.
//!
//! Everything that crosses a crate boundary lives here: the per-controller
//! [`PidSettings`] record, the [`Direction`] and [`OutputMode`] enums, the
//! sensor record, the time-varying setpoint [`method`] types, and the global
//! [`RegulonError`] type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod method;

pub use method::{
    BezierCurve, DailySpan, DateSpan, DurationStep, MethodConfig, MethodProgram, SineWave,
    StartMarker,
};

/// Which actuators a controller may drive.
///
/// `Raise` controllers only push the regulated quantity up (e.g. a heater),
/// `Lower` controllers only pull it down (e.g. a chiller), and `Both`
/// controllers own one actuator per direction with an anti-parallel
/// interlock enforced at arbitration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Raise,
    Lower,
    Both,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Raise => write!(f, "raise"),
            Direction::Lower => write!(f, "lower"),
            Direction::Both => write!(f, "both"),
        }
    }
}

/// How the control variable is translated into actuator commands.
///
/// `Relay` drives an on/off device for a number of seconds per tick;
/// `Pwm` drives a pulse-width-modulated device with a duty-cycle percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Relay,
    Pwm,
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputMode::Relay => write!(f, "relay"),
            OutputMode::Pwm => write!(f, "pwm"),
        }
    }
}

/// Full configuration record for one PID controller.
///
/// Loaded from the configuration store at activation and on reload. The
/// per-direction `min_duration`/`max_duration` fields are interpreted as
/// seconds in [`OutputMode::Relay`] and as duty-cycle percentages in
/// [`OutputMode::Pwm`]; `None` or a non-positive value means "unbounded".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidSettings {
    /// Primary key in the configuration store.
    pub id: String,
    /// Stable identifier used to tag metric writes for this controller.
    pub unique_id: String,
    pub activated: bool,
    pub held: bool,
    pub paused: bool,
    pub output_mode: OutputMode,
    /// Measurement kind regulated by this controller (e.g. `"temperature"`).
    pub measurement: String,
    /// Optional reference to a time-varying setpoint method.
    pub method_id: Option<String>,
    pub direction: Direction,
    pub raise_relay_id: Option<String>,
    pub raise_min_duration: Option<f64>,
    pub raise_max_duration: Option<f64>,
    pub raise_min_off_duration: Option<f64>,
    pub lower_relay_id: Option<String>,
    pub lower_min_duration: Option<f64>,
    pub lower_max_duration: Option<f64>,
    pub lower_min_off_duration: Option<f64>,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub integrator_min: f64,
    pub integrator_max: f64,
    /// Target loop period in seconds.
    pub period: f64,
    /// Maximum acceptable measurement age in seconds before a staleness
    /// diagnostic is raised.
    pub max_measure_age: f64,
    /// Default setpoint, used whenever no method overrides it.
    pub setpoint: f64,
    /// Reference to the sensor record providing measurements.
    pub sensor_id: String,
}

/// Sensor record as stored in the configuration store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub id: String,
    /// Identifier the sensor uses when writing into the time-series store.
    pub unique_id: String,
    /// Sampling period of the sensor in seconds; bounds the measurement
    /// lookback window.
    pub period: f64,
}

/// Global error type spanning hardware faults, store failures, and
/// configuration resolution problems.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum RegulonError {
    #[error("Hardware fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    ConfigResolution(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> PidSettings {
        PidSettings {
            id: "pid_1".to_string(),
            unique_id: "4f2c9a".to_string(),
            activated: true,
            held: false,
            paused: false,
            output_mode: OutputMode::Relay,
            measurement: "temperature".to_string(),
            method_id: None,
            direction: Direction::Both,
            raise_relay_id: Some("heater".to_string()),
            raise_min_duration: Some(1.0),
            raise_max_duration: Some(10.0),
            raise_min_off_duration: Some(2.0),
            lower_relay_id: Some("chiller".to_string()),
            lower_min_duration: None,
            lower_max_duration: None,
            lower_min_off_duration: None,
            kp: 2.0,
            ki: 0.5,
            kd: 1.0,
            integrator_min: -100.0,
            integrator_max: 100.0,
            period: 30.0,
            max_measure_age: 120.0,
            setpoint: 25.0,
            sensor_id: "sensor_1".to_string(),
        }
    }

    #[test]
    fn pid_settings_roundtrip() {
        let s = settings();
        let json = serde_json::to_string(&s).unwrap();
        let back: PidSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }

    #[test]
    fn direction_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Direction::Raise).unwrap(), "\"raise\"");
        assert_eq!(serde_json::to_string(&Direction::Both).unwrap(), "\"both\"");
        let back: Direction = serde_json::from_str("\"lower\"").unwrap();
        assert_eq!(back, Direction::Lower);
    }

    #[test]
    fn output_mode_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&OutputMode::Pwm).unwrap(), "\"pwm\"");
        let back: OutputMode = serde_json::from_str("\"relay\"").unwrap();
        assert_eq!(back, OutputMode::Relay);
    }

    #[test]
    fn display_matches_store_strings() {
        assert_eq!(Direction::Raise.to_string(), "raise");
        assert_eq!(Direction::Lower.to_string(), "lower");
        assert_eq!(Direction::Both.to_string(), "both");
        assert_eq!(OutputMode::Relay.to_string(), "relay");
        assert_eq!(OutputMode::Pwm.to_string(), "pwm");
    }

    #[test]
    fn error_display() {
        let err = RegulonError::HardwareFault {
            component: "heater".to_string(),
            details: "driver offline".to_string(),
        };
        assert!(err.to_string().contains("heater"));

        let err2 = RegulonError::ConfigResolution("sensor row missing".to_string());
        assert!(err2.to_string().contains("sensor row missing"));
    }
}
