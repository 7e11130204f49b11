//! Setpoint scheduler: resolves the effective setpoint from a method.
//!
//! Evaluation is pure: [`evaluate`] maps `(program, start marker, now)` to a
//! [`Resolution`] and never touches a store. When a Duration method needs
//! its marker advanced (armed on first evaluation, or ended when the
//! schedule is exhausted) the new marker is returned in
//! [`Resolution::transition`] and the controller supervisor persists it.
//! This keeps marker transitions strictly forward: Ready → Started → Ended.

use chrono::{NaiveDateTime, Timelike};

use regulon_types::{BezierCurve, MethodProgram, SineWave, StartMarker};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Outcome of evaluating a method at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The scheduled setpoint, or `None` when no span matches and the
    /// controller should fall back to its default setpoint.
    pub setpoint: Option<f64>,
    /// A start-marker transition the supervisor must persist.
    pub transition: Option<StartMarker>,
}

impl Resolution {
    fn value(setpoint: f64) -> Self {
        Self {
            setpoint: Some(setpoint),
            transition: None,
        }
    }

    fn fallback() -> Self {
        Self {
            setpoint: None,
            transition: None,
        }
    }
}

/// Signed interpolation from `start` toward `end`; direction of travel
/// follows the operand order regardless of which endpoint is larger.
fn interpolate(start: f64, end: Option<f64>, fraction: f64) -> f64 {
    let end = end.unwrap_or(start);
    start + (end - start) * fraction
}

fn seconds_of_day(now: NaiveDateTime) -> f64 {
    f64::from(now.time().num_seconds_from_midnight())
}

/// Evaluate `program` at `now`, given the method's persisted start marker.
pub fn evaluate(program: &MethodProgram, start: StartMarker, now: NaiveDateTime) -> Resolution {
    match program {
        MethodProgram::Date(spans) => {
            for span in spans {
                if span.time_start <= now && now < span.time_end {
                    let total = (span.time_end - span.time_start).num_milliseconds() as f64;
                    let part = (now - span.time_start).num_milliseconds() as f64;
                    return Resolution::value(interpolate(
                        span.setpoint_start,
                        span.setpoint_end,
                        part / total,
                    ));
                }
            }
            Resolution::fallback()
        }

        MethodProgram::Daily(spans) => {
            let tod = now.time();
            for span in spans {
                if span.time_start <= tod && tod < span.time_end {
                    let total = (span.time_end - span.time_start).num_milliseconds() as f64;
                    let part = (tod - span.time_start).num_milliseconds() as f64;
                    return Resolution::value(interpolate(
                        span.setpoint_start,
                        span.setpoint_end,
                        part / total,
                    ));
                }
            }
            Resolution::fallback()
        }

        MethodProgram::DailySine(wave) => Resolution::value(sine_y(wave, seconds_of_day(now))),

        MethodProgram::DailyBezier(curve) => {
            Resolution::value(bezier_y(curve, seconds_of_day(now)))
        }

        MethodProgram::Duration(steps) => match start {
            StartMarker::Ended => Resolution::fallback(),
            StartMarker::Ready => {
                // First evaluation: arm the method now, then evaluate from
                // elapsed zero.
                match duration_walk(steps, now, now) {
                    Walk::Value(setpoint) => Resolution {
                        setpoint: Some(setpoint),
                        transition: Some(StartMarker::Started(now)),
                    },
                    // An empty (or zero-length) schedule is exhausted the
                    // moment it is armed.
                    Walk::Exhausted => Resolution {
                        setpoint: None,
                        transition: Some(StartMarker::Ended),
                    },
                    Walk::NotStarted => Resolution::fallback(),
                }
            }
            StartMarker::Started(started) => match duration_walk(steps, started, now) {
                Walk::Value(setpoint) => Resolution::value(setpoint),
                Walk::Exhausted => Resolution {
                    setpoint: None,
                    transition: Some(StartMarker::Ended),
                },
                Walk::NotStarted => Resolution::fallback(),
            },
        },
    }
}

enum Walk {
    Value(f64),
    Exhausted,
    NotStarted,
}

fn duration_walk(
    steps: &[regulon_types::DurationStep],
    started: NaiveDateTime,
    now: NaiveDateTime,
) -> Walk {
    let elapsed = (now - started).num_milliseconds() as f64 / 1000.0;
    if elapsed < 0.0 {
        // Persisted start lies in the future (clock adjustment); neither a
        // match nor grounds to end the method.
        return Walk::NotStarted;
    }
    let mut total = 0.0;
    for step in steps {
        let previous_total = total;
        total += step.duration_sec;
        if previous_total <= elapsed && elapsed < total {
            let fraction = (elapsed - previous_total) / step.duration_sec;
            return Walk::Value(interpolate(
                step.setpoint_start,
                step.setpoint_end,
                fraction,
            ));
        }
    }
    Walk::Exhausted
}

/// Sinusoid over the seconds of the day. `shift_angle` is in degrees, like
/// the 0–360 day angle the wave spans.
fn sine_y(wave: &SineWave, seconds: f64) -> f64 {
    let theta = seconds / SECONDS_PER_DAY * std::f64::consts::TAU;
    wave.amplitude * (wave.frequency * theta + wave.shift_angle.to_radians()).sin() + wave.shift_y
}

fn bezier_point(points: &[(f64, f64); 4], t: f64) -> (f64, f64) {
    let u = 1.0 - t;
    let b0 = u * u * u;
    let b1 = 3.0 * u * u * t;
    let b2 = 3.0 * u * t * t;
    let b3 = t * t * t;
    (
        points[0].0 * b0 + points[1].0 * b1 + points[2].0 * b2 + points[3].0 * b3,
        points[0].1 * b0 + points[1].1 * b1 + points[2].1 * b2 + points[3].1 * b3,
    )
}

/// Cubic Bezier y-at-x over the day angle.
///
/// The x axis is the 0–360 day angle offset by `shift_angle` and wrapped.
/// The x component must be monotone between the first and last control
/// points; the query angle is clamped into that domain and the matching
/// curve parameter found by bisection.
fn bezier_y(curve: &BezierCurve, seconds: f64) -> f64 {
    let angle = (seconds / SECONDS_PER_DAY * 360.0 + curve.shift_angle).rem_euclid(360.0);

    let points = &curve.points;
    let ascending = points[3].0 >= points[0].0;
    let (lo_x, hi_x) = if ascending {
        (points[0].0, points[3].0)
    } else {
        (points[3].0, points[0].0)
    };
    let x = angle.clamp(lo_x, hi_x);

    let (mut lo, mut hi) = (0.0f64, 1.0f64);
    for _ in 0..64 {
        let mid = 0.5 * (lo + hi);
        let (bx, _) = bezier_point(points, mid);
        let before_x = if ascending { bx < x } else { bx > x };
        if before_x {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    bezier_point(points, 0.5 * (lo + hi)).1
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use regulon_types::{DailySpan, DateSpan, DurationStep};

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn daily_span(program_start: (u32, u32), program_end: (u32, u32)) -> MethodProgram {
        MethodProgram::Daily(vec![DailySpan {
            time_start: NaiveTime::from_hms_opt(program_start.0, program_start.1, 0).unwrap(),
            time_end: NaiveTime::from_hms_opt(program_end.0, program_end.1, 0).unwrap(),
            setpoint_start: 20.0,
            setpoint_end: Some(30.0),
        }])
    }

    #[test]
    fn daily_interpolates_halfway() {
        // [09:00, 10:00] from 20 to 30: at 09:30 the setpoint is 25.
        let program = daily_span((9, 0), (10, 0));
        let res = evaluate(&program, StartMarker::Ready, at(9, 30, 0));
        assert!((res.setpoint.unwrap() - 25.0).abs() < 1e-9);
        assert!(res.transition.is_none());
    }

    #[test]
    fn daily_span_boundaries() {
        let program = daily_span((9, 0), (10, 0));
        // Inclusive start: exactly time_start yields setpoint_start.
        let res = evaluate(&program, StartMarker::Ready, at(9, 0, 0));
        assert!((res.setpoint.unwrap() - 20.0).abs() < 1e-9);
        // Exclusive end: exactly time_end falls outside the span.
        let res = evaluate(&program, StartMarker::Ready, at(10, 0, 0));
        assert_eq!(res.setpoint, None);
    }

    #[test]
    fn daily_outside_span_falls_back() {
        let program = daily_span((9, 0), (10, 0));
        assert_eq!(evaluate(&program, StartMarker::Ready, at(8, 0, 0)).setpoint, None);
    }

    #[test]
    fn daily_interpolation_is_monotone() {
        let program = daily_span((9, 0), (10, 0));
        let mut previous = f64::MIN;
        for minute in 0..60 {
            let value = evaluate(&program, StartMarker::Ready, at(9, minute, 0))
                .setpoint
                .unwrap();
            assert!(value > previous);
            previous = value;
        }
    }

    #[test]
    fn daily_descending_setpoints_interpolate_downward() {
        let program = MethodProgram::Daily(vec![DailySpan {
            time_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            time_end: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            setpoint_start: 30.0,
            setpoint_end: Some(20.0),
        }]);
        let res = evaluate(&program, StartMarker::Ready, at(9, 30, 0));
        assert!((res.setpoint.unwrap() - 25.0).abs() < 1e-9);
        let res = evaluate(&program, StartMarker::Ready, at(9, 45, 0));
        assert!((res.setpoint.unwrap() - 22.5).abs() < 1e-9);
    }

    #[test]
    fn date_span_matches_only_its_window() {
        let program = MethodProgram::Date(vec![DateSpan {
            time_start: at(12, 0, 0),
            time_end: at(14, 0, 0),
            setpoint_start: 10.0,
            setpoint_end: Some(20.0),
        }]);
        let res = evaluate(&program, StartMarker::Ready, at(13, 0, 0));
        assert!((res.setpoint.unwrap() - 15.0).abs() < 1e-9);

        // A different day misses the window entirely.
        let other_day = NaiveDate::from_ymd_opt(2024, 6, 2)
            .unwrap()
            .and_hms_opt(13, 0, 0)
            .unwrap();
        assert_eq!(evaluate(&program, StartMarker::Ready, other_day).setpoint, None);
    }

    #[test]
    fn date_span_without_end_setpoint_is_constant() {
        let program = MethodProgram::Date(vec![DateSpan {
            time_start: at(12, 0, 0),
            time_end: at(14, 0, 0),
            setpoint_start: 17.0,
            setpoint_end: None,
        }]);
        for h in [12, 13] {
            let value = evaluate(&program, StartMarker::Ready, at(h, 30, 0))
                .setpoint
                .unwrap();
            assert!((value - 17.0).abs() < 1e-9);
        }
    }

    #[test]
    fn sine_midnight_and_shift() {
        let wave = SineWave {
            amplitude: 5.0,
            frequency: 1.0,
            shift_angle: 0.0,
            shift_y: 25.0,
        };
        // theta = 0 at midnight: y = shift_y.
        let res = evaluate(&MethodProgram::DailySine(wave), StartMarker::Ready, at(0, 0, 0));
        assert!((res.setpoint.unwrap() - 25.0).abs() < 1e-9);

        // A 90 degree shift puts the crest at midnight.
        let shifted = SineWave {
            amplitude: 5.0,
            frequency: 1.0,
            shift_angle: 90.0,
            shift_y: 25.0,
        };
        let res = evaluate(&MethodProgram::DailySine(shifted), StartMarker::Ready, at(0, 0, 0));
        assert!((res.setpoint.unwrap() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn sine_peaks_at_quarter_day() {
        let wave = SineWave {
            amplitude: 3.0,
            frequency: 1.0,
            shift_angle: 0.0,
            shift_y: 20.0,
        };
        // 06:00 is a quarter of the day: sin(pi/2) = 1.
        let res = evaluate(&MethodProgram::DailySine(wave), StartMarker::Ready, at(6, 0, 0));
        assert!((res.setpoint.unwrap() - 23.0).abs() < 1e-9);
    }

    #[test]
    fn bezier_endpoints_match_control_points() {
        let curve = BezierCurve {
            shift_angle: 0.0,
            points: [(0.0, 20.0), (120.0, 26.0), (240.0, 14.0), (360.0, 20.0)],
        };
        let program = MethodProgram::DailyBezier(curve);
        // Midnight: day angle 0 -> first control point's y.
        let res = evaluate(&program, StartMarker::Ready, at(0, 0, 0));
        assert!((res.setpoint.unwrap() - 20.0).abs() < 1e-6);
    }

    #[test]
    fn bezier_is_continuous_across_the_day() {
        let curve = BezierCurve {
            shift_angle: 0.0,
            points: [(0.0, 18.0), (90.0, 28.0), (270.0, 28.0), (360.0, 18.0)],
        };
        let program = MethodProgram::DailyBezier(curve);
        let mut previous = evaluate(&program, StartMarker::Ready, at(0, 0, 0))
            .setpoint
            .unwrap();
        for hour in 1..24 {
            let value = evaluate(&program, StartMarker::Ready, at(hour, 0, 0))
                .setpoint
                .unwrap();
            // Adjacent hourly samples of a smooth curve stay close.
            assert!((value - previous).abs() < 3.0);
            previous = value;
        }
    }

    fn duration_steps() -> MethodProgram {
        MethodProgram::Duration(vec![
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
        ])
    }

    #[test]
    fn duration_ready_arms_and_starts_first_row() {
        let now = at(12, 0, 0);
        let res = evaluate(&duration_steps(), StartMarker::Ready, now);
        assert_eq!(res.transition, Some(StartMarker::Started(now)));
        assert!((res.setpoint.unwrap() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn duration_interpolates_within_rows() {
        let started = at(12, 0, 0);
        let program = duration_steps();

        // 300 s in: halfway through the first row.
        let res = evaluate(&program, StartMarker::Started(started), at(12, 5, 0));
        assert!((res.setpoint.unwrap() - 25.0).abs() < 1e-9);
        assert!(res.transition.is_none());

        // 700 s in: 100 s into the second, constant row.
        let res = evaluate(&program, StartMarker::Started(started), at(12, 11, 40));
        assert!((res.setpoint.unwrap() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn duration_ends_when_exhausted() {
        let started = at(12, 0, 0);
        // Total schedule is 900 s; 1000 s in it is exhausted.
        let res = evaluate(&duration_steps(), StartMarker::Started(started), at(12, 16, 40));
        assert_eq!(res.setpoint, None);
        assert_eq!(res.transition, Some(StartMarker::Ended));
    }

    #[test]
    fn duration_ended_marker_stays_ended() {
        let res = evaluate(&duration_steps(), StartMarker::Ended, at(12, 0, 0));
        assert_eq!(res.setpoint, None);
        assert_eq!(res.transition, None);
    }

    #[test]
    fn duration_future_start_is_not_ended() {
        // A persisted start in the future (clock adjustment) must not slam
        // the method to Ended.
        let res = evaluate(&duration_steps(), StartMarker::Started(at(13, 0, 0)), at(12, 0, 0));
        assert_eq!(res.setpoint, None);
        assert_eq!(res.transition, None);
    }

    #[test]
    fn empty_duration_schedule_ends_immediately() {
        let program = MethodProgram::Duration(vec![]);
        let res = evaluate(&program, StartMarker::Ready, at(12, 0, 0));
        assert_eq!(res.setpoint, None);
        assert_eq!(res.transition, Some(StartMarker::Ended));
    }
}
