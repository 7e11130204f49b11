//! Discrete PID engine.
//!
//! The recurrence is deliberately unit-less: the error is accumulated once
//! per tick rather than scaled by elapsed time, so `Ki` is interpreted "per
//! tick" and retuning is coupled to the loop period. Anti-windup is a plain
//! clamp of the accumulator to `[integrator_min, integrator_max]`.
//!
//! # Example
//!
//! ```rust
//! use regulon_control::pid::PidEngine;
//!
//! let mut pid = PidEngine::new(2.0, 0.5, 1.0, -100.0, 100.0);
//! let output = pid.step(25.0, 20.0); // setpoint 25, measurement 20
//! assert!((output - 17.5).abs() < 1e-9);
//! ```

/// Discrete P+I+D recurrence with a bound-clamped integrator.
///
/// State is one accumulator and the previous error (the "derivator").
/// All tuning fields can be changed between steps; a manual setpoint change
/// is expected to call [`PidEngine::reset`] so the integral and derivative
/// history do not bleed into the new target.
#[derive(Debug, Clone)]
pub struct PidEngine {
    kp: f64,
    ki: f64,
    kd: f64,
    integrator_min: f64,
    integrator_max: f64,
    integrator: f64,
    derivator: f64,
    error: f64,
    p_value: f64,
    i_value: f64,
    d_value: f64,
}

impl PidEngine {
    /// Create an engine with the given gains and integrator bounds
    /// (`integrator_min` must not exceed `integrator_max`).
    pub fn new(kp: f64, ki: f64, kd: f64, integrator_min: f64, integrator_max: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            integrator_min,
            integrator_max,
            integrator: 0.0,
            derivator: 0.0,
            error: 0.0,
            p_value: 0.0,
            i_value: 0.0,
            d_value: 0.0,
        }
    }

    /// Advance the recurrence by one tick and return the control variable.
    pub fn step(&mut self, setpoint: f64, measurement: f64) -> f64 {
        self.error = setpoint - measurement;

        self.p_value = self.kp * self.error;

        // One error sample per tick, no dt scaling.
        self.integrator =
            (self.integrator + self.error).clamp(self.integrator_min, self.integrator_max);
        self.i_value = self.integrator * self.ki;

        self.d_value = self.kd * (self.error - self.derivator);
        self.derivator = self.error;

        self.p_value + self.i_value + self.d_value
    }

    /// Zero the accumulator and derivative history.
    pub fn reset(&mut self) {
        self.integrator = 0.0;
        self.derivator = 0.0;
    }

    /// Replace gains and integrator bounds, preserving accumulated state.
    pub fn configure(
        &mut self,
        kp: f64,
        ki: f64,
        kd: f64,
        integrator_min: f64,
        integrator_max: f64,
    ) {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
        self.integrator_min = integrator_min;
        self.integrator_max = integrator_max;
    }

    pub fn set_kp(&mut self, kp: f64) {
        self.kp = kp;
    }

    pub fn set_ki(&mut self, ki: f64) {
        self.ki = ki;
    }

    pub fn set_kd(&mut self, kd: f64) {
        self.kd = kd;
    }

    pub fn set_integrator(&mut self, integrator: f64) {
        self.integrator = integrator;
    }

    pub fn set_derivator(&mut self, derivator: f64) {
        self.derivator = derivator;
    }

    pub fn error(&self) -> f64 {
        self.error
    }

    pub fn integrator(&self) -> f64 {
        self.integrator
    }

    pub fn derivator(&self) -> f64 {
        self.derivator
    }

    pub fn p_value(&self) -> f64 {
        self.p_value
    }

    pub fn i_value(&self) -> f64 {
        self.i_value
    }

    pub fn d_value(&self) -> f64 {
        self.d_value
    }
}
