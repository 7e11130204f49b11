//! `regulond` – the Regulon regulation daemon.
//!
//! Wires the stack together and supervises one control loop per configured
//! controller id:
//!
//! 1. Initialise tracing (console or JSON, optional OTLP export).
//! 2. Open the SQLite configuration store, seeding a demo temperature loop
//!    on first run when `seed_demo` is enabled.
//! 3. Build the in-process relay bank and time-series store, plus a
//!    simulated process per controller so the stack regulates something
//!    without any attached hardware.
//! 4. Spawn the controllers and block until **Ctrl-C**, then stop and join
//!    every loop.

mod config;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{error, info, warn};

use regulon_control::{PidController, telemetry};
use regulon_hal::{RelayDriver, RelayState, SimRelayBank};
use regulon_store::{ConfigStore, MemorySeriesStore, SqliteConfigStore, StoreError, TimeSeriesStore};
use regulon_types::{
    Direction, MethodConfig, MethodProgram, OutputMode, PidSettings, SensorConfig, SineWave,
    StartMarker,
};

fn main() {
    // Tracing first, runtime second: the simple OTLP exporter must be
    // built before any Tokio runtime exists.
    let _guard = telemetry::init_tracing("regulond");

    let config_path =
        std::env::var("REGULOND_CONFIG").unwrap_or_else(|_| "regulond.toml".to_string());
    let daemon_config = match config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(path = config_path, error = %e, "failed to load daemon configuration");
            return;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build the Tokio runtime");
            return;
        }
    };
    runtime.block_on(run(daemon_config));
}

async fn run(cfg: config::DaemonConfig) {
    let store = match SqliteConfigStore::open(&cfg.db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(db_path = cfg.db_path, error = %e, "failed to open the configuration store");
            return;
        }
    };
    if cfg.seed_demo {
        if let Err(e) = seed_demo(&store, &cfg.controllers) {
            warn!(error = %e, "demo seeding failed");
        }
    }

    let series = Arc::new(MemorySeriesStore::new());
    let bank = Arc::new(build_relay_bank(store.as_ref(), &cfg.controllers));

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        }) {
            warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    if cfg.simulation.enabled {
        spawn_simulations(&cfg, store.as_ref(), &series, &bank, &shutdown);
    }

    let mut controllers = Vec::new();
    for pid_id in &cfg.controllers {
        match PidController::spawn(pid_id, store.clone(), series.clone(), bank.clone()) {
            Ok(controller) => controllers.push(controller),
            Err(e) => error!(pid_id, error = %e, "controller failed to start"),
        }
    }
    if controllers.is_empty() {
        error!("no controllers running; exiting");
        return;
    }
    info!(count = controllers.len(), "regulond running; press Ctrl-C to stop");

    while !shutdown.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    info!("shutting down");
    for controller in &controllers {
        controller.stop();
    }
    for controller in &controllers {
        controller.wait().await;
    }
    info!("all controllers stopped");
}

/// Register every relay any configured controller references.
fn build_relay_bank(store: &SqliteConfigStore, controllers: &[String]) -> SimRelayBank {
    let mut bank = SimRelayBank::new();
    for pid_id in controllers {
        let Ok(settings) = store.pid_settings(pid_id) else {
            continue;
        };
        if let Some(relay_id) = settings.raise_relay_id {
            bank = bank.with_relay(relay_id);
        }
        if let Some(relay_id) = settings.lower_relay_id {
            bank = bank.with_relay(relay_id);
        }
    }
    bank
}

/// One simulated first-order process per controller: the value drifts
/// toward ambient and each energised relay pushes it in its direction.
fn spawn_simulations(
    cfg: &config::DaemonConfig,
    store: &SqliteConfigStore,
    series: &Arc<MemorySeriesStore>,
    bank: &Arc<SimRelayBank>,
    shutdown: &Arc<AtomicBool>,
) {
    for pid_id in &cfg.controllers {
        let Ok(settings) = store.pid_settings(pid_id) else {
            continue;
        };
        let Ok(sensor) = store.sensor(&settings.sensor_id) else {
            continue;
        };
        tokio::spawn(simulate_process(
            series.clone(),
            bank.clone(),
            sensor.unique_id,
            settings.measurement,
            settings.raise_relay_id,
            settings.lower_relay_id,
            cfg.simulation.clone(),
            shutdown.clone(),
        ));
    }
}

#[allow(clippy::too_many_arguments)]
async fn simulate_process(
    series: Arc<MemorySeriesStore>,
    bank: Arc<SimRelayBank>,
    sensor_unique_id: String,
    measurement: String,
    raise_relay: Option<String>,
    lower_relay: Option<String>,
    sim: config::SimulationConfig,
    shutdown: Arc<AtomicBool>,
) {
    let mut value = sim.ambient;
    while !shutdown.load(Ordering::SeqCst) {
        value += (sim.ambient - value) * 0.05;
        if let Some(relay_id) = &raise_relay {
            if matches!(bank.relay_state(relay_id), Ok(RelayState::On)) {
                value += sim.drive_rate;
            }
        }
        if let Some(relay_id) = &lower_relay {
            if matches!(bank.relay_state(relay_id), Ok(RelayState::On)) {
                value -= sim.drive_rate;
            }
        }
        if let Err(e) = series.write(&sensor_unique_id, &measurement, value).await {
            warn!(sensor = sensor_unique_id, error = %e, "simulated sample write failed");
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

/// Insert a demo temperature loop for every configured controller id that
/// has no settings row yet: a sinusoidal daily setpoint around 24 degrees
/// driving a heater/chiller pair.
fn seed_demo(store: &SqliteConfigStore, controllers: &[String]) -> Result<(), StoreError> {
    for pid_id in controllers {
        match store.pid_settings(pid_id) {
            Ok(_) => continue,
            Err(StoreError::MissingRow { .. }) => {}
            Err(e) => return Err(e),
        }

        let sensor_id = format!("{pid_id}_sensor");
        let method_id = format!("{pid_id}_method");
        store.insert_sensor(&SensorConfig {
            id: sensor_id.clone(),
            unique_id: uuid::Uuid::new_v4().to_string(),
            period: 1.0,
        })?;
        store.insert_method(&MethodConfig {
            id: method_id.clone(),
            program: MethodProgram::DailySine(SineWave {
                amplitude: 1.5,
                frequency: 1.0,
                shift_angle: 0.0,
                shift_y: 24.0,
            }),
            start: StartMarker::Ready,
        })?;
        store.insert_pid(&PidSettings {
            id: pid_id.clone(),
            unique_id: uuid::Uuid::new_v4().to_string(),
            activated: true,
            held: false,
            paused: false,
            output_mode: OutputMode::Relay,
            measurement: "temperature".to_string(),
            method_id: Some(method_id),
            direction: Direction::Both,
            raise_relay_id: Some(format!("{pid_id}_heater")),
            raise_min_duration: Some(0.5),
            raise_max_duration: Some(8.0),
            raise_min_off_duration: Some(1.0),
            lower_relay_id: Some(format!("{pid_id}_chiller")),
            lower_min_duration: Some(0.5),
            lower_max_duration: Some(8.0),
            lower_min_off_duration: Some(1.0),
            kp: 2.0,
            ki: 0.2,
            kd: 0.5,
            integrator_min: -20.0,
            integrator_max: 20.0,
            period: 10.0,
            max_measure_age: 30.0,
            setpoint: 24.0,
            sensor_id,
        })?;
        info!(pid_id, "seeded demo controller");
    }
    Ok(())
}
