//! In-process relay simulation for headless tests and CI.
//!
//! [`SimRelayBank`] implements [`RelayDriver`] over a map of registered
//! relays. Every command is appended to a log so tests can assert on exact
//! command sequences (e.g. that an interlock off is issued before the
//! opposing on). A PWM command with duty cycle 0 leaves the relay off,
//! matching how a real PWM output idles.

use std::collections::HashMap;
use std::sync::Mutex;

use regulon_types::RegulonError;
use tracing::debug;

use crate::driver::{RelayDriver, RelayOn, RelayState};

/// One recorded driver command.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayCommand {
    On { relay_id: String, request: RelayOn },
    Off { relay_id: String, trigger_conditionals: bool },
}

impl RelayCommand {
    /// The relay this command addressed.
    pub fn relay_id(&self) -> &str {
        match self {
            RelayCommand::On { relay_id, .. } => relay_id,
            RelayCommand::Off { relay_id, .. } => relay_id,
        }
    }
}

#[derive(Default)]
struct BankInner {
    states: HashMap<String, RelayState>,
    log: Vec<RelayCommand>,
}

/// A simulated relay bank that records commands and tracks states.
///
/// # Example
///
/// ```rust
/// use regulon_hal::{RelayDriver, RelayOn, RelayState, SimRelayBank};
///
/// let bank = SimRelayBank::new().with_relay("heater");
/// bank.relay_on("heater", RelayOn::timed(5.0, None)).unwrap();
/// assert_eq!(bank.relay_state("heater").unwrap(), RelayState::On);
/// ```
#[derive(Default)]
pub struct SimRelayBank {
    inner: Mutex<BankInner>,
}

impl SimRelayBank {
    /// Create an empty bank with no registered relays.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relay, initially off. Builder-style so test fixtures can
    /// chain registrations.
    pub fn with_relay(self, relay_id: impl Into<String>) -> Self {
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.states.insert(relay_id.into(), RelayState::Off);
        }
        self
    }

    /// Snapshot of every command issued so far, in order.
    pub fn commands(&self) -> Vec<RelayCommand> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .log
            .clone()
    }

    /// Drop the recorded command log (states are kept).
    pub fn clear_commands(&self) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .log
            .clear();
    }

    /// Force a relay state directly, bypassing the log. Lets tests start a
    /// scenario with an opposing relay already energised.
    pub fn force_state(&self, relay_id: &str, state: RelayState) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.states.insert(relay_id.to_string(), state);
    }

    fn unknown(relay_id: &str) -> RegulonError {
        RegulonError::HardwareFault {
            component: relay_id.to_string(),
            details: format!("relay '{relay_id}' is not registered"),
        }
    }
}

impl RelayDriver for SimRelayBank {
    fn relay_on(&self, relay_id: &str, request: RelayOn) -> Result<(), RegulonError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !inner.states.contains_key(relay_id) {
            return Err(Self::unknown(relay_id));
        }
        // Duty 0 idles a PWM output rather than energising it.
        let state = match request.duty_cycle {
            Some(duty) if duty <= 0.0 => RelayState::Off,
            _ => RelayState::On,
        };
        debug!(relay_id, ?request, %state, "sim relay_on");
        inner.states.insert(relay_id.to_string(), state);
        inner.log.push(RelayCommand::On {
            relay_id: relay_id.to_string(),
            request,
        });
        Ok(())
    }

    fn relay_off(&self, relay_id: &str, trigger_conditionals: bool) -> Result<(), RegulonError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !inner.states.contains_key(relay_id) {
            return Err(Self::unknown(relay_id));
        }
        debug!(relay_id, trigger_conditionals, "sim relay_off");
        inner.states.insert(relay_id.to_string(), RelayState::Off);
        inner.log.push(RelayCommand::Off {
            relay_id: relay_id.to_string(),
            trigger_conditionals,
        });
        Ok(())
    }

    fn relay_state(&self, relay_id: &str) -> Result<RelayState, RegulonError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .states
            .get(relay_id)
            .copied()
            .ok_or_else(|| Self::unknown(relay_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_relay_starts_off() {
        let bank = SimRelayBank::new().with_relay("heater");
        assert_eq!(bank.relay_state("heater").unwrap(), RelayState::Off);
    }

    #[test]
    fn on_then_off_updates_state_and_log() {
        let bank = SimRelayBank::new().with_relay("heater");
        bank.relay_on("heater", RelayOn::timed(5.0, Some(1.0))).unwrap();
        assert_eq!(bank.relay_state("heater").unwrap(), RelayState::On);

        bank.relay_off("heater", false).unwrap();
        assert_eq!(bank.relay_state("heater").unwrap(), RelayState::Off);

        let log = bank.commands();
        assert_eq!(log.len(), 2);
        assert!(matches!(log[0], RelayCommand::On { .. }));
        assert!(matches!(log[1], RelayCommand::Off { .. }));
    }

    #[test]
    fn zero_duty_cycle_leaves_relay_off() {
        let bank = SimRelayBank::new().with_relay("fan");
        bank.relay_on("fan", RelayOn::duty(0.0)).unwrap();
        assert_eq!(bank.relay_state("fan").unwrap(), RelayState::Off);

        bank.relay_on("fan", RelayOn::duty(55.0)).unwrap();
        assert_eq!(bank.relay_state("fan").unwrap(), RelayState::On);
    }

    #[test]
    fn unknown_relay_is_a_hardware_fault() {
        let bank = SimRelayBank::new();
        assert!(matches!(
            bank.relay_on("ghost", RelayOn::default()),
            Err(RegulonError::HardwareFault { .. })
        ));
        assert!(matches!(
            bank.relay_off("ghost", false),
            Err(RegulonError::HardwareFault { .. })
        ));
        assert!(matches!(
            bank.relay_state("ghost"),
            Err(RegulonError::HardwareFault { .. })
        ));
    }

    #[test]
    fn force_state_bypasses_log() {
        let bank = SimRelayBank::new().with_relay("chiller");
        bank.force_state("chiller", RelayState::On);
        assert_eq!(bank.relay_state("chiller").unwrap(), RelayState::On);
        assert!(bank.commands().is_empty());
    }

    #[test]
    fn clear_commands_keeps_states() {
        let bank = SimRelayBank::new().with_relay("heater");
        bank.relay_on("heater", RelayOn::default()).unwrap();
        bank.clear_commands();
        assert!(bank.commands().is_empty());
        assert_eq!(bank.relay_state("heater").unwrap(), RelayState::On);
    }
}
