//! Shared `RelayDriver` trait for discrete and pulse-width-modulated
//! actuators (heaters, chillers, humidifiers, pumps, …).

use regulon_types::RegulonError;

/// Observable state of a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    On,
    Off,
}

impl RelayState {
    pub fn is_on(self) -> bool {
        self == RelayState::On
    }
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayState::On => write!(f, "on"),
            RelayState::Off => write!(f, "off"),
        }
    }
}

/// Payload of a [`RelayDriver::relay_on`] command.
///
/// `duration` and `min_off` apply to discrete relays (seconds on, then a
/// minimum off time before the next activation); `duty_cycle` applies to
/// PWM devices and is a percentage in `[0, 100]`. A driver receives either
/// the duration pair or a duty cycle, never both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelayOn {
    pub duration: Option<f64>,
    pub min_off: Option<f64>,
    pub duty_cycle: Option<f64>,
    /// Whether dependent conditional actions should fire on this command.
    pub trigger_conditionals: bool,
}

impl RelayOn {
    /// A timed activation: on for `duration` seconds, then at least
    /// `min_off` seconds off.
    pub fn timed(duration: f64, min_off: Option<f64>) -> Self {
        Self {
            duration: Some(duration),
            min_off,
            ..Self::default()
        }
    }

    /// A PWM activation at `duty_cycle` percent.
    pub fn duty(duty_cycle: f64) -> Self {
        Self {
            duty_cycle: Some(duty_cycle),
            ..Self::default()
        }
    }
}

/// A relay dispatch backend shared by every controller in the process.
///
/// Implementations are responsible for their own concurrency discipline;
/// callers hold the driver behind an `Arc` and may issue commands from many
/// controller tasks at once.
pub trait RelayDriver: Send + Sync {
    /// Energise `relay_id` according to `request`.
    ///
    /// # Errors
    ///
    /// Returns [`RegulonError::HardwareFault`] if the command cannot be
    /// applied (unknown relay, driver offline, …).
    fn relay_on(&self, relay_id: &str, request: RelayOn) -> Result<(), RegulonError>;

    /// De-energise `relay_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegulonError::HardwareFault`] if the command cannot be
    /// applied.
    fn relay_off(&self, relay_id: &str, trigger_conditionals: bool) -> Result<(), RegulonError>;

    /// Return the current state of `relay_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegulonError::HardwareFault`] for unknown relays.
    fn relay_state(&self, relay_id: &str) -> Result<RelayState, RegulonError>;
}
