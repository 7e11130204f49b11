//! [`PidController`] – the supervised control loop.
//!
//! One controller owns one periodic task. Each tick:
//!
//! 1. **Measure** – fetch the newest sensor reading through
//!    [`MeasurementSource`]; a failed fetch flags the tick invalid.
//! 2. **Schedule** – when a method is bound, resolve the effective setpoint
//!    through [`schedule::evaluate`] and persist any start-marker
//!    transition.
//! 3. **Regulate** – advance the [`PidEngine`] recurrence and publish the
//!    setpoint and output samples through the [`MetricsSink`].
//! 4. **Actuate** – hand the control variable to the [`OutputArbiter`].
//!
//! The loop targets a `period`-second cadence on a monotonic clock and
//! *skips* ticks missed during a stall rather than replaying them, which
//! bounds integrator growth at the cost of temporarily under-regulating.
//! Lifecycle flags (activated/held/paused) live in one lock-protected state
//! record; supervisory calls mutate it and the loop consumes the change at
//! the next tick boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant as StdInstant;

use chrono::Local;
use tokio::task::JoinHandle;
use tokio::time::{Duration as TokioDuration, Instant, sleep};
use tracing::{error, info, warn};

use regulon_hal::RelayDriver;
use regulon_store::{ConfigStore, TimeSeriesStore};
use regulon_types::{
    MethodConfig, MethodProgram, OutputMode, PidSettings, RegulonError, SensorConfig, StartMarker,
};

use crate::arbiter::{OutputArbiter, OutputConfig, control_var_to_duty};
use crate::measurement::{MeasurementSource, Reading};
use crate::metrics::{FIELD_DUTY_CYCLE, FIELD_PID_OUTPUT, FIELD_SETPOINT, MetricsSink};
use crate::pid::PidEngine;
use crate::schedule;

/// Sleep between loop wake-ups; bounds tick scheduling jitter.
const WAKE_INTERVAL: TokioDuration = TokioDuration::from_millis(100);

struct ControllerState {
    settings: PidSettings,
    sensor: Option<SensorConfig>,
    method: Option<MethodConfig>,
    engine: PidEngine,
    setpoint: f64,
    control_variable: f64,
    last_reading: Option<Reading>,
    measurement_ok: bool,
}

struct Shared {
    pid_id: String,
    stop: AtomicBool,
    running: AtomicBool,
    stop_requested_at: Mutex<Option<StdInstant>>,
    state: Mutex<ControllerState>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct LoopCtx {
    shared: Arc<Shared>,
    config: Arc<dyn ConfigStore>,
    source: MeasurementSource,
    metrics: MetricsSink,
    arbiter: OutputArbiter,
}

/// Handle to a running PID control loop.
///
/// Construct with [`PidController::spawn`]; supervisory operations may be
/// called from any task and take effect at the next tick boundary.
pub struct PidController {
    shared: Arc<Shared>,
    config: Arc<dyn ConfigStore>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl PidController {
    /// Load configuration for `pid_id` and start the control loop.
    ///
    /// Must be called within a Tokio runtime. A missing PID row fails the
    /// spawn; a missing sensor or method row is logged and the controller
    /// runs degraded (measurements fail transiently, or the default
    /// setpoint stays in effect).
    ///
    /// # Errors
    ///
    /// Returns [`RegulonError::ConfigResolution`] when the PID row itself
    /// cannot be loaded.
    pub fn spawn(
        pid_id: &str,
        config: Arc<dyn ConfigStore>,
        series: Arc<dyn TimeSeriesStore>,
        driver: Arc<dyn RelayDriver>,
    ) -> Result<Self, RegulonError> {
        let startup = StdInstant::now();

        let settings = config.pid_settings(pid_id).map_err(RegulonError::from)?;

        let sensor = match config.sensor(&settings.sensor_id) {
            Ok(sensor) => Some(sensor),
            Err(e) => {
                error!(
                    pid_id,
                    sensor_id = %settings.sensor_id,
                    error = %e,
                    "sensor could not be resolved; controller runs degraded"
                );
                None
            }
        };

        let mut method = match &settings.method_id {
            None => None,
            Some(method_id) => match config.method(method_id) {
                Ok(method) => Some(method),
                Err(e) => {
                    error!(
                        pid_id,
                        method_id,
                        error = %e,
                        "method could not be resolved; default setpoint stays in effect"
                    );
                    None
                }
            },
        };
        if let Some(method) = method.as_mut() {
            arm_duration_method(pid_id, method, config.as_ref());
        }

        let engine = PidEngine::new(
            settings.kp,
            settings.ki,
            settings.kd,
            settings.integrator_min,
            settings.integrator_max,
        );
        let (paused, held) = (settings.paused, settings.held);
        let setpoint = settings.setpoint;

        let shared = Arc::new(Shared {
            pid_id: pid_id.to_string(),
            stop: AtomicBool::new(false),
            running: AtomicBool::new(true),
            stop_requested_at: Mutex::new(None),
            state: Mutex::new(ControllerState {
                settings,
                sensor,
                method,
                engine,
                setpoint,
                control_variable: 0.0,
                last_reading: None,
                measurement_ok: false,
            }),
        });

        let ctx = LoopCtx {
            shared: shared.clone(),
            config: config.clone(),
            source: MeasurementSource::new(series.clone()),
            metrics: MetricsSink::spawn(series),
            arbiter: OutputArbiter::new(driver),
        };
        let join = tokio::spawn(run_loop(ctx));

        info!(
            pid_id,
            "Activated in {:.1} ms",
            startup.elapsed().as_secs_f64() * 1000.0
        );
        if paused {
            info!(pid_id, "Paused");
        } else if held {
            info!(pid_id, "Held");
        }

        Ok(Self {
            shared,
            config,
            join: Mutex::new(Some(join)),
        })
    }

    pub fn pid_id(&self) -> String {
        self.shared.pid_id.clone()
    }

    /// Whether the loop task is alive (true from spawn until the shutdown
    /// sequence finishes).
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Keep actuating with the last control variable while the engine is
    /// held. Takes effect together with [`pause`][Self::pause].
    pub fn hold(&self) {
        self.shared.state().settings.held = true;
        info!(pid_id = %self.shared.pid_id, "Hold");
    }

    /// Suspend regulation; no measurements, no engine steps.
    pub fn pause(&self) {
        self.shared.state().settings.paused = true;
        info!(pid_id = %self.shared.pid_id, "Pause");
    }

    /// Clear held and paused, set activated.
    pub fn resume(&self) {
        {
            let mut state = self.shared.state();
            state.settings.activated = true;
            state.settings.held = false;
            state.settings.paused = false;
        }
        info!(pid_id = %self.shared.pid_id, "Resume");
    }

    /// Request shutdown. The loop exits at the next wake-up, commands the
    /// configured relays off, and marks a bound method `Ended`.
    pub fn stop(&self) {
        let mut requested = self
            .shared
            .stop_requested_at
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        requested.get_or_insert_with(StdInstant::now);
        drop(requested);
        self.shared.stop.store(true, Ordering::SeqCst);
    }

    /// Wait for the loop task to finish. Call after [`stop`][Self::stop].
    pub async fn wait(&self) {
        let handle = {
            let mut join = self.join.lock().unwrap_or_else(|e| e.into_inner());
            join.take()
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Replace the setpoint manually; zeroes the integrator and derivator
    /// so the accumulated history does not bleed into the new target.
    pub fn set_setpoint(&self, setpoint: f64) {
        let mut state = self.shared.state();
        state.setpoint = setpoint;
        state.engine.reset();
    }

    pub fn set_integrator(&self, integrator: f64) {
        self.shared.state().engine.set_integrator(integrator);
    }

    pub fn set_derivator(&self, derivator: f64) {
        self.shared.state().engine.set_derivator(derivator);
    }

    pub fn set_kp(&self, kp: f64) {
        self.shared.state().engine.set_kp(kp);
    }

    pub fn set_ki(&self, ki: f64) {
        self.shared.state().engine.set_ki(ki);
    }

    pub fn set_kd(&self, kd: f64) {
        self.shared.state().engine.set_kd(kd);
    }

    pub fn setpoint(&self) -> f64 {
        self.shared.state().setpoint
    }

    pub fn error(&self) -> f64 {
        self.shared.state().engine.error()
    }

    pub fn integrator(&self) -> f64 {
        self.shared.state().engine.integrator()
    }

    pub fn derivator(&self) -> f64 {
        self.shared.state().engine.derivator()
    }

    pub fn control_variable(&self) -> f64 {
        self.shared.state().control_variable
    }

    pub fn last_reading(&self) -> Option<Reading> {
        self.shared.state().last_reading.clone()
    }

    /// Re-read settings, sensor, and method from the configuration store.
    /// Engine gains and bounds are replaced; the integrator and derivator
    /// are preserved.
    ///
    /// # Errors
    ///
    /// Returns [`RegulonError::ConfigResolution`] when the PID row cannot
    /// be loaded; sensor and method resolution failures degrade as at
    /// spawn.
    pub fn reload_config(&self) -> Result<(), RegulonError> {
        let pid_id = self.shared.pid_id.clone();
        let settings = self
            .config
            .pid_settings(&pid_id)
            .map_err(RegulonError::from)?;

        let sensor = match self.config.sensor(&settings.sensor_id) {
            Ok(sensor) => Some(sensor),
            Err(e) => {
                error!(pid_id, error = %e, "sensor could not be resolved on reload");
                None
            }
        };
        let method = match &settings.method_id {
            None => None,
            Some(method_id) => match self.config.method(method_id) {
                Ok(method) => Some(method),
                Err(e) => {
                    error!(pid_id, method_id, error = %e, "method could not be resolved on reload");
                    None
                }
            },
        };

        {
            let mut state = self.shared.state();
            state.engine.configure(
                settings.kp,
                settings.ki,
                settings.kd,
                settings.integrator_min,
                settings.integrator_max,
            );
            state.setpoint = settings.setpoint;
            state.settings = settings;
            state.sensor = sensor;
            state.method = method;
        }
        info!(pid_id, "configuration reloaded");
        Ok(())
    }
}

/// Arm a Duration method at controller start: `Ready` (or absent) markers
/// are pinned to the current wall-clock time and persisted; a persisted
/// start means a daemon restart, and the method resumes from the original
/// time.
fn arm_duration_method(pid_id: &str, method: &mut MethodConfig, config: &dyn ConfigStore) {
    if !matches!(method.program, MethodProgram::Duration(_)) {
        return;
    }
    match method.start {
        StartMarker::Ended => {
            info!(pid_id, method_id = %method.id, "method has ended and has not been re-armed");
        }
        StartMarker::Ready => {
            let marker = StartMarker::Started(Local::now().naive_local());
            if let Err(e) = config.set_method_start(&method.id, &marker) {
                warn!(pid_id, method_id = %method.id, error = %e, "failed to persist method start");
            }
            method.start = marker;
        }
        StartMarker::Started(started) => {
            warn!(
                pid_id,
                method_id = %method.id,
                start = %started,
                "resuming method from persisted start time"
            );
        }
    }
}

fn period_duration(shared: &Shared) -> TokioDuration {
    // A non-positive period would spin the catch-up loop; floor it at one
    // wake interval.
    let secs = shared.state().settings.period.max(0.1);
    TokioDuration::from_secs_f64(secs)
}

async fn run_loop(ctx: LoopCtx) {
    let mut deadline = Instant::now() + period_duration(&ctx.shared);

    while !ctx.shared.stop.load(Ordering::SeqCst) {
        if Instant::now() >= deadline {
            let period = period_duration(&ctx.shared);
            // Catch up past any ticks missed during a stall; only the
            // latest one runs.
            while Instant::now() >= deadline {
                deadline += period;
            }
            if let Err(e) = tick(&ctx).await {
                error!(
                    pid_id = %ctx.shared.pid_id,
                    error = %e,
                    "tick failed; controller continues"
                );
            }
        }
        sleep(WAKE_INTERVAL).await;
    }

    shutdown(&ctx);
}

async fn tick(ctx: &LoopCtx) -> Result<(), RegulonError> {
    let (settings, sensor, method) = {
        let state = ctx.shared.state();
        (
            state.settings.clone(),
            state.sensor.clone(),
            state.method.clone(),
        )
    };

    if settings.activated && !settings.paused {
        let reading = match &sensor {
            Some(sensor) => {
                ctx.source
                    .latest(sensor, &settings.measurement, settings.max_measure_age)
                    .await
            }
            None => {
                warn!(pid_id = %ctx.shared.pid_id, "no sensor resolved; skipping measurement");
                None
            }
        };
        let measurement_ok = reading.is_some();
        {
            let mut state = ctx.shared.state();
            state.last_reading = reading.clone();
            state.measurement_ok = measurement_ok;
        }

        if let Some(reading) = reading {
            if let Some(method) = method {
                resolve_method_setpoint(ctx, &settings, &method)?;
            }

            let setpoint = ctx.shared.state().setpoint;
            ctx.metrics
                .publish(&settings.unique_id, FIELD_SETPOINT, setpoint);

            let control_variable = {
                let mut state = ctx.shared.state();
                let u = state.engine.step(setpoint, reading.value);
                state.control_variable = u;
                u
            };

            match settings.output_mode {
                OutputMode::Relay => {
                    ctx.metrics
                        .publish(&settings.unique_id, FIELD_PID_OUTPUT, control_variable);
                }
                OutputMode::Pwm => {
                    let mut duty = control_var_to_duty(control_variable.abs(), settings.period);
                    if control_variable < 0.0 {
                        duty = -duty;
                    }
                    ctx.metrics
                        .publish(&settings.unique_id, FIELD_DUTY_CYCLE, duty);
                }
            }
        }
    }

    if settings.activated && (!settings.paused || settings.held) {
        let (control_variable, measurement_ok, setpoint) = {
            let state = ctx.shared.state();
            (state.control_variable, state.measurement_ok, state.setpoint)
        };
        let output_config = OutputConfig::from_settings(&settings);
        ctx.arbiter
            .dispatch(&output_config, control_variable, setpoint, measurement_ok);
    }

    Ok(())
}

/// Resolve the scheduled setpoint and persist any marker transition. A
/// failed persist aborts the tick so the transition is retried next time.
fn resolve_method_setpoint(
    ctx: &LoopCtx,
    settings: &PidSettings,
    method: &MethodConfig,
) -> Result<(), RegulonError> {
    let now = Local::now().naive_local();
    let resolution = schedule::evaluate(&method.program, method.start, now);

    if let Some(marker) = resolution.transition {
        ctx.config
            .set_method_start(&method.id, &marker)
            .map_err(RegulonError::from)?;
        let mut state = ctx.shared.state();
        if let Some(cached) = state.method.as_mut() {
            cached.start = marker;
        }
    }

    let setpoint = resolution.setpoint.unwrap_or(settings.setpoint);
    ctx.shared.state().setpoint = setpoint;
    Ok(())
}

fn shutdown(ctx: &LoopCtx) {
    let (settings, method) = {
        let state = ctx.shared.state();
        (state.settings.clone(), state.method.clone())
    };

    ctx.arbiter.shutdown(&OutputConfig::from_settings(&settings));

    if let Some(method) = method {
        if let Err(e) = ctx.config.set_method_start(&method.id, &StartMarker::Ended) {
            warn!(
                pid_id = %ctx.shared.pid_id,
                method_id = %method.id,
                error = %e,
                "failed to mark method ended"
            );
        }
    }

    ctx.shared.running.store(false, Ordering::SeqCst);
    let elapsed = ctx
        .shared
        .stop_requested_at
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take()
        .map(|t| t.elapsed())
        .unwrap_or_default();
    info!(
        pid_id = %ctx.shared.pid_id,
        "Deactivated in {:.1} ms",
        elapsed.as_secs_f64() * 1000.0
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use regulon_hal::{RelayCommand, SimRelayBank};
    use regulon_store::{MemorySeriesStore, SqliteConfigStore};
    use regulon_types::{Direction, DurationStep};

    fn base_settings() -> PidSettings {
        PidSettings {
            id: "pid_1".to_string(),
            unique_id: "pid-uid-1".to_string(),
            activated: true,
            held: false,
            paused: false,
            output_mode: OutputMode::Relay,
            measurement: "temperature".to_string(),
            method_id: None,
            direction: Direction::Both,
            raise_relay_id: Some("heater".to_string()),
            raise_min_duration: Some(1.0),
            raise_max_duration: Some(60.0),
            raise_min_off_duration: None,
            lower_relay_id: Some("chiller".to_string()),
            lower_min_duration: Some(1.0),
            lower_max_duration: Some(60.0),
            lower_min_off_duration: None,
            kp: 2.0,
            ki: 0.5,
            kd: 1.0,
            integrator_min: -100.0,
            integrator_max: 100.0,
            period: 0.3,
            max_measure_age: 120.0,
            setpoint: 25.0,
            sensor_id: "sensor_1".to_string(),
        }
    }

    fn fixture(settings: &PidSettings) -> (Arc<SqliteConfigStore>, Arc<MemorySeriesStore>, Arc<SimRelayBank>) {
        let config = Arc::new(SqliteConfigStore::open_in_memory().unwrap());
        config.insert_pid(settings).unwrap();
        config
            .insert_sensor(&SensorConfig {
                id: "sensor_1".to_string(),
                unique_id: "dht22-1".to_string(),
                period: 30.0,
            })
            .unwrap();
        let series = Arc::new(MemorySeriesStore::new());
        let bank = Arc::new(SimRelayBank::new().with_relay("heater").with_relay("chiller"));
        (config, series, bank)
    }

    #[tokio::test]
    async fn first_tick_publishes_setpoint_and_output() {
        let settings = base_settings();
        let (config, series, bank) = fixture(&settings);
        series.insert_at("dht22-1", "temperature", Utc::now(), 20.0);

        let controller =
            PidController::spawn("pid_1", config, series.clone(), bank.clone()).unwrap();
        assert!(controller.is_running());

        tokio::time::sleep(TokioDuration::from_millis(500)).await;
        controller.stop();
        controller.wait().await;
        tokio::time::sleep(TokioDuration::from_millis(50)).await;

        // error 5: P = 10, I = 0.5 * 5, D = 1 * 5 -> 17.5 on the first tick.
        let setpoints = series.samples("pid-uid-1", FIELD_SETPOINT);
        assert!(!setpoints.is_empty());
        assert_eq!(setpoints[0].1, 25.0);

        let outputs = series.samples("pid-uid-1", FIELD_PID_OUTPUT);
        assert!(!outputs.is_empty());
        assert!((outputs[0].1 - 17.5).abs() < 1e-9);

        // The positive control variable drove the heater.
        assert!(bank.commands().iter().any(
            |c| matches!(c, RelayCommand::On { relay_id, .. } if relay_id == "heater")
        ));
    }

    #[tokio::test]
    async fn stop_commands_configured_relays_off() {
        let settings = base_settings();
        let (config, series, bank) = fixture(&settings);

        let controller = PidController::spawn("pid_1", config, series, bank.clone()).unwrap();
        controller.stop();
        controller.wait().await;

        assert!(!controller.is_running());
        let offs: Vec<_> = bank
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                RelayCommand::Off {
                    relay_id,
                    trigger_conditionals,
                } => Some((relay_id, trigger_conditionals)),
                _ => None,
            })
            .collect();
        assert!(offs.contains(&("heater".to_string(), true)));
        assert!(offs.contains(&("chiller".to_string(), true)));
    }

    #[tokio::test]
    async fn set_setpoint_zeroes_integrator_and_derivator() {
        let mut settings = base_settings();
        settings.activated = false;
        let (config, series, bank) = fixture(&settings);

        let controller = PidController::spawn("pid_1", config, series, bank).unwrap();
        controller.set_integrator(5.0);
        controller.set_derivator(3.0);

        controller.set_setpoint(30.0);
        assert_eq!(controller.setpoint(), 30.0);
        assert_eq!(controller.integrator(), 0.0);
        assert_eq!(controller.derivator(), 0.0);

        controller.stop();
        controller.wait().await;
    }

    #[tokio::test]
    async fn paused_and_held_keeps_last_control_variable() {
        let mut settings = base_settings();
        settings.paused = true;
        settings.held = true;
        let (config, series, bank) = fixture(&settings);
        series.insert_at("dht22-1", "temperature", Utc::now(), 20.0);

        let controller = PidController::spawn("pid_1", config, series, bank.clone()).unwrap();
        tokio::time::sleep(TokioDuration::from_millis(500)).await;

        // The engine never stepped, so the control variable is still zero
        // and arbitration only ever commanded the relays off.
        assert_eq!(controller.control_variable(), 0.0);
        assert!(
            !bank
                .commands()
                .iter()
                .any(|c| matches!(c, RelayCommand::On { .. }))
        );

        controller.stop();
        controller.wait().await;
    }

    #[tokio::test]
    async fn duration_method_marker_moves_forward_only() {
        let mut settings = base_settings();
        settings.activated = false;
        settings.method_id = Some("method_1".to_string());
        let (config, series, bank) = fixture(&settings);
        config
            .insert_method(&MethodConfig {
                id: "method_1".to_string(),
                program: MethodProgram::Duration(vec![DurationStep {
                    duration_sec: 3600.0,
                    setpoint_start: 20.0,
                    setpoint_end: Some(30.0),
                }]),
                start: StartMarker::Ready,
            })
            .unwrap();

        let controller =
            PidController::spawn("pid_1", config.clone(), series, bank).unwrap();

        // Armed at spawn: Ready became a persisted wall-clock start.
        let armed = config.method("method_1").unwrap().start;
        assert!(matches!(armed, StartMarker::Started(_)));

        controller.stop();
        controller.wait().await;

        // A clean stop ends the method.
        assert_eq!(config.method("method_1").unwrap().start, StartMarker::Ended);
    }

    #[tokio::test]
    async fn missing_sensor_degrades_and_commands_off() {
        let mut settings = base_settings();
        settings.sensor_id = "ghost".to_string();
        let config = Arc::new(SqliteConfigStore::open_in_memory().unwrap());
        config.insert_pid(&settings).unwrap();
        let series = Arc::new(MemorySeriesStore::new());
        let bank = Arc::new(SimRelayBank::new().with_relay("heater").with_relay("chiller"));

        let controller =
            PidController::spawn("pid_1", config, series.clone(), bank.clone()).unwrap();
        assert!(controller.is_running());

        tokio::time::sleep(TokioDuration::from_millis(500)).await;

        // No measurement ever validates: no metrics, and arbitration keeps
        // the relays off.
        assert!(series.samples("pid-uid-1", FIELD_SETPOINT).is_empty());
        assert!(
            bank.commands()
                .iter()
                .all(|c| matches!(c, RelayCommand::Off { .. }))
        );
        assert!(!bank.commands().is_empty());

        controller.stop();
        controller.wait().await;
    }

    #[tokio::test]
    async fn missing_pid_row_fails_spawn() {
        let config = Arc::new(SqliteConfigStore::open_in_memory().unwrap());
        let series = Arc::new(MemorySeriesStore::new());
        let bank = Arc::new(SimRelayBank::new());

        let result = PidController::spawn("ghost", config, series, bank);
        assert!(matches!(result, Err(RegulonError::ConfigResolution(_))));
    }

    #[tokio::test]
    async fn reload_config_applies_new_gains_but_keeps_state() {
        let mut settings = base_settings();
        settings.activated = false;
        let (config, series, bank) = fixture(&settings);

        let controller =
            PidController::spawn("pid_1", config.clone(), series, bank).unwrap();
        controller.set_integrator(7.0);

        settings.kp = 9.0;
        settings.setpoint = 40.0;
        config.insert_pid(&settings).unwrap();
        controller.reload_config().unwrap();

        assert_eq!(controller.setpoint(), 40.0);
        assert_eq!(controller.integrator(), 7.0);

        controller.stop();
        controller.wait().await;
    }

    #[tokio::test]
    async fn resume_clears_held_and_paused() {
        let mut settings = base_settings();
        settings.activated = false;
        settings.paused = true;
        settings.held = true;
        let (config, series, bank) = fixture(&settings);

        let controller = PidController::spawn("pid_1", config, series, bank).unwrap();
        controller.resume();
        {
            let state = controller.shared.state();
            assert!(state.settings.activated);
            assert!(!state.settings.held);
            assert!(!state.settings.paused);
        }

        controller.stop();
        controller.wait().await;
    }
}
