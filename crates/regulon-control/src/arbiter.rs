//! Output arbiter: maps the control variable onto actuator commands.
//!
//! A positive control variable asks to raise the regulated quantity, a
//! negative one to lower it. Depending on the controller's direction and
//! output mode the arbiter issues timed relay activations or PWM duty
//! cycles, clamps them to per-direction bounds, and enforces the
//! anti-parallel interlock for `Direction::Both` controllers (the opposing
//! relay is commanded off before the active one is commanded on).
//!
//! Driver command failures are logged and never propagated; the next tick
//! simply issues fresh commands.

use std::sync::Arc;

use tracing::{debug, warn};

use regulon_hal::{RelayDriver, RelayOn};
use regulon_types::{Direction, OutputMode, PidSettings};

/// Convert a control variable into a duty-cycle percentage against the
/// loop period: saturates at 100 once the control variable exceeds one
/// full period.
pub fn control_var_to_duty(control_variable: f64, period: f64) -> f64 {
    if control_variable > period {
        100.0
    } else {
        (control_variable / period) * 100.0
    }
}

fn round_seconds(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round_duty(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Per-direction output channel limits.
///
/// `min_duration`/`max_duration` are seconds in relay mode and duty-cycle
/// percentages in PWM mode (the configuration schema shares the fields).
#[derive(Debug, Clone, PartialEq)]
pub struct OutputChannel {
    pub relay_id: String,
    pub min_duration: Option<f64>,
    pub max_duration: Option<f64>,
    pub min_off_duration: Option<f64>,
}

impl OutputChannel {
    /// A bound is only effective when present and positive; zero means
    /// "unset" in the configuration schema.
    fn bound(value: Option<f64>) -> Option<f64> {
        value.filter(|b| *b > 0.0)
    }
}

/// Snapshot of everything the arbiter needs for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub direction: Direction,
    pub mode: OutputMode,
    pub period: f64,
    pub raise: Option<OutputChannel>,
    pub lower: Option<OutputChannel>,
}

impl OutputConfig {
    pub fn from_settings(settings: &PidSettings) -> Self {
        let raise = settings.raise_relay_id.clone().map(|relay_id| OutputChannel {
            relay_id,
            min_duration: settings.raise_min_duration,
            max_duration: settings.raise_max_duration,
            min_off_duration: settings.raise_min_off_duration,
        });
        let lower = settings.lower_relay_id.clone().map(|relay_id| OutputChannel {
            relay_id,
            min_duration: settings.lower_min_duration,
            max_duration: settings.lower_max_duration,
            min_off_duration: settings.lower_min_off_duration,
        });
        Self {
            direction: settings.direction,
            mode: settings.output_mode,
            period: settings.period,
            raise,
            lower,
        }
    }

    fn drives_raise(&self) -> bool {
        matches!(self.direction, Direction::Raise | Direction::Both)
    }

    fn drives_lower(&self) -> bool {
        matches!(self.direction, Direction::Lower | Direction::Both)
    }
}

/// What the arbiter decided this tick, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutputs {
    pub raise_seconds_on: Option<f64>,
    pub lower_seconds_on: Option<f64>,
    pub raise_duty_cycle: Option<f64>,
    /// Carries the sign of the control variable; the driver always receives
    /// the magnitude.
    pub lower_duty_cycle: Option<f64>,
}

/// Issues actuator commands derived from the PID control variable.
pub struct OutputArbiter {
    driver: Arc<dyn RelayDriver>,
}

impl OutputArbiter {
    pub fn new(driver: Arc<dyn RelayDriver>) -> Self {
        Self { driver }
    }

    /// Translate `control_variable` into driver commands.
    ///
    /// Must only be called when a measurement attempt has been made this
    /// tick; with `measurement_ok == false` every configured relay is
    /// commanded off.
    pub fn dispatch(
        &self,
        cfg: &OutputConfig,
        control_variable: f64,
        setpoint: f64,
        measurement_ok: bool,
    ) -> TickOutputs {
        let mut outputs = TickOutputs::default();

        if !measurement_ok {
            if cfg.drives_raise() {
                if let Some(raise) = &cfg.raise {
                    self.off(&raise.relay_id, false);
                }
            }
            if cfg.drives_lower() {
                if let Some(lower) = &cfg.lower {
                    self.off(&lower.relay_id, false);
                }
            }
            return outputs;
        }

        // Positive control variable: raise the regulated quantity.
        if cfg.drives_raise() {
            if let Some(raise) = &cfg.raise {
                if control_variable > 0.0 {
                    if cfg.direction == Direction::Both {
                        if let Some(lower) = &cfg.lower {
                            self.interlock_off(&lower.relay_id);
                        }
                    }
                    match cfg.mode {
                        OutputMode::Relay => {
                            let seconds_on = match OutputChannel::bound(raise.max_duration) {
                                Some(max) if control_variable > max => max,
                                _ => round_seconds(control_variable),
                            };
                            outputs.raise_seconds_on = Some(seconds_on);
                            if seconds_on > raise.min_duration.unwrap_or(0.0) {
                                debug!(
                                    setpoint,
                                    control_variable,
                                    relay = %raise.relay_id,
                                    seconds_on,
                                    "raise relay on"
                                );
                                self.on(
                                    &raise.relay_id,
                                    RelayOn::timed(seconds_on, raise.min_off_duration),
                                );
                            }
                        }
                        OutputMode::Pwm => {
                            let mut duty =
                                round_duty(control_var_to_duty(control_variable, cfg.period));
                            if let Some(max) = OutputChannel::bound(raise.max_duration) {
                                if duty > max {
                                    duty = max;
                                }
                            }
                            if let Some(min) = OutputChannel::bound(raise.min_duration) {
                                if duty < min {
                                    duty = min;
                                }
                            }
                            outputs.raise_duty_cycle = Some(duty);
                            debug!(
                                setpoint,
                                control_variable,
                                relay = %raise.relay_id,
                                duty,
                                "raise pwm output"
                            );
                            self.on(&raise.relay_id, RelayOn::duty(duty));
                        }
                    }
                } else {
                    match cfg.mode {
                        OutputMode::Relay => self.off(&raise.relay_id, false),
                        OutputMode::Pwm => self.on(&raise.relay_id, RelayOn::duty(0.0)),
                    }
                }
            }
        }

        // Negative control variable: lower the regulated quantity. The
        // driver receives the magnitude; only logs and the reported duty
        // carry the sign.
        if cfg.drives_lower() {
            if let Some(lower) = &cfg.lower {
                if control_variable < 0.0 {
                    let magnitude = control_variable.abs();
                    if cfg.direction == Direction::Both {
                        if let Some(raise) = &cfg.raise {
                            self.interlock_off(&raise.relay_id);
                        }
                    }
                    match cfg.mode {
                        OutputMode::Relay => {
                            let seconds_on = match OutputChannel::bound(lower.max_duration) {
                                Some(max) if magnitude > max => max,
                                _ => round_seconds(magnitude),
                            };
                            outputs.lower_seconds_on = Some(seconds_on);
                            if seconds_on > lower.min_duration.unwrap_or(0.0) {
                                debug!(
                                    setpoint,
                                    control_variable,
                                    relay = %lower.relay_id,
                                    seconds_on,
                                    "lower relay on"
                                );
                                self.on(
                                    &lower.relay_id,
                                    RelayOn::timed(seconds_on, lower.min_off_duration),
                                );
                            }
                        }
                        OutputMode::Pwm => {
                            let mut duty = round_duty(control_var_to_duty(magnitude, cfg.period));
                            if let Some(max) = OutputChannel::bound(lower.max_duration) {
                                if duty > max {
                                    duty = max;
                                }
                            }
                            if let Some(min) = OutputChannel::bound(lower.min_duration) {
                                if duty < min {
                                    duty = min;
                                }
                            }
                            outputs.lower_duty_cycle = Some(-duty);
                            debug!(
                                setpoint,
                                control_variable,
                                relay = %lower.relay_id,
                                duty = -duty,
                                "lower pwm output"
                            );
                            self.on(&lower.relay_id, RelayOn::duty(duty));
                        }
                    }
                } else {
                    match cfg.mode {
                        OutputMode::Relay => self.off(&lower.relay_id, false),
                        OutputMode::Pwm => self.on(&lower.relay_id, RelayOn::duty(0.0)),
                    }
                }
            }
        }

        outputs
    }

    /// Turn every configured relay off, honoring conditional triggers.
    /// Used on controller shutdown.
    pub fn shutdown(&self, cfg: &OutputConfig) {
        if cfg.drives_raise() {
            if let Some(raise) = &cfg.raise {
                self.off(&raise.relay_id, true);
            }
        }
        if cfg.drives_lower() {
            if let Some(lower) = &cfg.lower {
                self.off(&lower.relay_id, true);
            }
        }
    }

    /// Command the opposing relay off, but only when it reports on.
    fn interlock_off(&self, relay_id: &str) {
        match self.driver.relay_state(relay_id) {
            Ok(state) if state.is_on() => self.off(relay_id, false),
            Ok(_) => {}
            Err(e) => warn!(relay_id, error = %e, "interlock state query failed"),
        }
    }

    fn on(&self, relay_id: &str, request: RelayOn) {
        if let Err(e) = self.driver.relay_on(relay_id, request) {
            warn!(relay_id, error = %e, "relay on command failed; retrying next tick");
        }
    }

    fn off(&self, relay_id: &str, trigger_conditionals: bool) {
        if let Err(e) = self.driver.relay_off(relay_id, trigger_conditionals) {
            warn!(relay_id, error = %e, "relay off command failed; retrying next tick");
        }
    }
}
