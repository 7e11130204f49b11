//! Time-varying setpoint methods.
//!
//! A *method* overrides a controller's default setpoint with a schedule.
//! The five program kinds are modelled as a closed sum type so the scheduler
//! dispatches per arm instead of matching on strings:
//!
//! - [`MethodProgram::Date`] – absolute date/time spans.
//! - [`MethodProgram::Daily`] – time-of-day spans, repeating every day.
//! - [`MethodProgram::DailySine`] – a sinusoid over the seconds of the day.
//! - [`MethodProgram::DailyBezier`] – a cubic Bezier over the day angle.
//! - [`MethodProgram::Duration`] – relative spans starting when the method
//!   is first evaluated, pinned to wall-clock so a restart resumes from the
//!   original start time.

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::RegulonError;

/// Lifecycle marker of a method, persisted in the configuration store.
///
/// The string form is part of the datastore contract and must be preserved
/// bit-exact: the sentinels `"Ready"` and `"Ended"`, or a timestamp in
/// `%Y-%m-%d %H:%M:%S%.6f` form. Transitions only ever move forward:
/// `Ready` → `Started` on first evaluation, `Started` → `Ended` when the
/// schedule is exhausted or the controller is cleanly stopped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartMarker {
    /// Instructed to begin on the next evaluation.
    Ready,
    /// Running since the contained wall-clock time.
    Started(NaiveDateTime),
    /// Schedule exhausted; the method will not produce setpoints again
    /// until re-armed.
    Ended,
}

impl std::fmt::Display for StartMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartMarker::Ready => write!(f, "Ready"),
            StartMarker::Started(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.6f")),
            StartMarker::Ended => write!(f, "Ended"),
        }
    }
}

impl std::str::FromStr for StartMarker {
    type Err = RegulonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Ready" => Ok(StartMarker::Ready),
            "Ended" => Ok(StartMarker::Ended),
            other => NaiveDateTime::parse_from_str(other, "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(other, "%Y-%m-%d %H:%M:%S"))
                .map(StartMarker::Started)
                .map_err(|e| RegulonError::Parse(format!("start marker '{other}': {e}"))),
        }
    }
}

impl Serialize for StartMarker {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StartMarker {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One absolute span of a Date method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateSpan {
    pub time_start: NaiveDateTime,
    pub time_end: NaiveDateTime,
    pub setpoint_start: f64,
    /// Absent means the setpoint is held constant at `setpoint_start`.
    pub setpoint_end: Option<f64>,
}

/// One time-of-day span of a Daily method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySpan {
    pub time_start: NaiveTime,
    pub time_end: NaiveTime,
    pub setpoint_start: f64,
    pub setpoint_end: Option<f64>,
}

/// One relative step of a Duration method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationStep {
    pub duration_sec: f64,
    pub setpoint_start: f64,
    pub setpoint_end: Option<f64>,
}

/// Parameters of a DailySine method.
///
/// `shift_angle` is configured in degrees, like the day angle it offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SineWave {
    pub amplitude: f64,
    pub frequency: f64,
    pub shift_angle: f64,
    pub shift_y: f64,
}

/// Parameters of a DailyBezier method: a day-angle shift in degrees and
/// four control points spanning the x (day angle) / y (setpoint) plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BezierCurve {
    pub shift_angle: f64,
    pub points: [(f64, f64); 4],
}

/// The schedule itself, one variant per method kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum MethodProgram {
    Date(Vec<DateSpan>),
    Daily(Vec<DailySpan>),
    DailySine(SineWave),
    DailyBezier(BezierCurve),
    Duration(Vec<DurationStep>),
}

impl MethodProgram {
    /// Short name used in logs and in the configuration store's
    /// `method_type` column.
    pub fn kind(&self) -> &'static str {
        match self {
            MethodProgram::Date(_) => "Date",
            MethodProgram::Daily(_) => "Daily",
            MethodProgram::DailySine(_) => "DailySine",
            MethodProgram::DailyBezier(_) => "DailyBezier",
            MethodProgram::Duration(_) => "Duration",
        }
    }
}

/// A method record: identity, program, and lifecycle marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodConfig {
    pub id: String,
    pub program: MethodProgram,
    pub start: StartMarker,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn ready_and_ended_are_bit_exact() {
        assert_eq!(StartMarker::Ready.to_string(), "Ready");
        assert_eq!(StartMarker::Ended.to_string(), "Ended");
        assert_eq!("Ready".parse::<StartMarker>().unwrap(), StartMarker::Ready);
        assert_eq!("Ended".parse::<StartMarker>().unwrap(), StartMarker::Ended);
    }

    #[test]
    fn started_marker_roundtrips_with_microseconds() {
        let ts = NaiveDate::from_ymd_opt(2017, 3, 14)
            .unwrap()
            .and_hms_micro_opt(9, 26, 53, 589793)
            .unwrap();
        let marker = StartMarker::Started(ts);
        let s = marker.to_string();
        assert_eq!(s, "2017-03-14 09:26:53.589793");
        assert_eq!(s.parse::<StartMarker>().unwrap(), marker);
    }

    #[test]
    fn started_marker_parses_without_fraction() {
        let marker: StartMarker = "2017-03-14 09:26:53".parse().unwrap();
        let ts = NaiveDate::from_ymd_opt(2017, 3, 14)
            .unwrap()
            .and_hms_opt(9, 26, 53)
            .unwrap();
        assert_eq!(marker, StartMarker::Started(ts));
    }

    #[test]
    fn whole_second_marker_keeps_explicit_fraction() {
        // The datastore consumer parses with a mandatory fractional field,
        // so a whole-second start must still carry ".000000".
        let ts = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(
            StartMarker::Started(ts).to_string(),
            "2020-01-01 00:00:00.000000"
        );
    }

    #[test]
    fn garbage_marker_is_a_parse_error() {
        assert!("ready".parse::<StartMarker>().is_err());
        assert!("2020-13-01 00:00:00".parse::<StartMarker>().is_err());
    }

    #[test]
    fn marker_serde_uses_string_form() {
        let json = serde_json::to_string(&StartMarker::Ready).unwrap();
        assert_eq!(json, "\"Ready\"");
        let back: StartMarker = serde_json::from_str("\"Ended\"").unwrap();
        assert_eq!(back, StartMarker::Ended);
    }

    #[test]
    fn duration_program_roundtrip() {
        let program = MethodProgram::Duration(vec![
            DurationStep {
                duration_sec: 600.0,
                setpoint_start: 20.0,
                setpoint_end: Some(30.0),
            },
            DurationStep {
                duration_sec: 300.0,
                setpoint_start: 30.0,
                setpoint_end: None,
            },
        ]);
        let json = serde_json::to_string(&program).unwrap();
        let back: MethodProgram = serde_json::from_str(&json).unwrap();
        assert_eq!(program, back);
    }

    #[test]
    fn program_kind_names() {
        assert_eq!(MethodProgram::Date(vec![]).kind(), "Date");
        assert_eq!(
            MethodProgram::DailySine(SineWave {
                amplitude: 1.0,
                frequency: 1.0,
                shift_angle: 0.0,
                shift_y: 0.0,
            })
            .kind(),
            "DailySine"
        );
        assert_eq!(MethodProgram::Duration(vec![]).kind(), "Duration");
    }
}
