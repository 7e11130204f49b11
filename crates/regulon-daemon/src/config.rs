//! Daemon configuration – reads `regulond.toml`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors from loading the daemon configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Path of the SQLite configuration database.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Seed missing controller/sensor/method rows with a demo temperature
    /// loop so a fresh install regulates something out of the box.
    #[serde(default = "default_true")]
    pub seed_demo: bool,

    /// Controller ids to spawn.
    #[serde(default = "default_controllers")]
    pub controllers: Vec<String>,

    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Parameters of the simulated process that feeds the sensor stream when
/// no hardware is attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Value the process drifts toward with every relay off.
    #[serde(default = "default_ambient")]
    pub ambient: f64,

    /// Per-second change contributed by an energised relay.
    #[serde(default = "default_drive_rate")]
    pub drive_rate: f64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            seed_demo: true,
            controllers: default_controllers(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ambient: default_ambient(),
            drive_rate: default_drive_rate(),
        }
    }
}

fn default_db_path() -> String {
    "regulon.db".to_string()
}

fn default_true() -> bool {
    true
}

fn default_controllers() -> Vec<String> {
    vec!["pid_1".to_string()]
}

fn default_ambient() -> f64 {
    18.0
}

fn default_drive_rate() -> f64 {
    0.2
}

/// Load the configuration from `path`; a missing file yields the defaults.
pub fn load(path: &str) -> Result<DaemonConfig, ConfigError> {
    if !Path::new(path).exists() {
        return Ok(DaemonConfig::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_string(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load("/nonexistent/regulond.toml").unwrap();
        assert_eq!(cfg.db_path, "regulon.db");
        assert!(cfg.seed_demo);
        assert_eq!(cfg.controllers, vec!["pid_1".to_string()]);
        assert!(cfg.simulation.enabled);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "controllers = [\"pid_a\", \"pid_b\"]").unwrap();
        writeln!(file, "[simulation]").unwrap();
        writeln!(file, "ambient = 21.5").unwrap();

        let cfg = load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.controllers.len(), 2);
        assert_eq!(cfg.simulation.ambient, 21.5);
        assert!(cfg.simulation.enabled);
        assert_eq!(cfg.db_path, "regulon.db");
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "controllers = not-a-list").unwrap();

        assert!(matches!(
            load(file.path().to_str().unwrap()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
