//! SQLite-backed configuration store.
//!
//! Holds the records a controller needs at activation time: its
//! [`PidSettings`], the [`SensorConfig`] it samples, and an optional
//! [`MethodConfig`] schedule. A method's `time_start` marker is updated
//! inside a transaction so concurrent controllers never observe a torn
//! transition.
//!
//! # Storage layout
//!
//! | table | contents |
//! |---|---|
//! | `pid` | one row per controller (`PidSettings` fields) |
//! | `sensor` | sensor identity and sampling period |
//! | `method` | method kind and `time_start` marker (`"Ready"` / timestamp / `"Ended"`) |
//! | `method_data` | ordered program rows, one schema shared by all kinds |

use std::sync::{Arc, Mutex};

use chrono::{NaiveDateTime, NaiveTime};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use regulon_types::{
    BezierCurve, DailySpan, DateSpan, Direction, DurationStep, MethodConfig, MethodProgram,
    OutputMode, PidSettings, SensorConfig, SineWave, StartMarker,
};

use crate::StoreError;

const DATE_ROW_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DAILY_ROW_FORMAT: &str = "%H:%M:%S";

/// Read/write access to controller configuration.
///
/// Implementations must be shareable across controller tasks; methods take
/// `&self` and are expected to hold any internal lock only for the duration
/// of one query.
pub trait ConfigStore: Send + Sync {
    /// Load the settings record for `pid_id`.
    fn pid_settings(&self, pid_id: &str) -> Result<PidSettings, StoreError>;

    /// Load the sensor record for `sensor_id`.
    fn sensor(&self, sensor_id: &str) -> Result<SensorConfig, StoreError>;

    /// Load the method record (program rows and start marker) for
    /// `method_id`.
    fn method(&self, method_id: &str) -> Result<MethodConfig, StoreError>;

    /// Transactionally replace the start marker of `method_id`.
    fn set_method_start(&self, method_id: &str, marker: &StartMarker) -> Result<(), StoreError>;
}

/// Reference [`ConfigStore`] over a local SQLite database.
#[derive(Clone)]
pub struct SqliteConfigStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteConfigStore {
    /// Open (or create) a persistent database at `path`.
    ///
    /// Enables WAL mode so readers are not blocked by an active writer.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        debug!(path, "opened configuration store");
        Ok(store)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS pid (
                id                      TEXT NOT NULL PRIMARY KEY,
                unique_id               TEXT NOT NULL,
                activated               INTEGER NOT NULL,
                held                    INTEGER NOT NULL,
                paused                  INTEGER NOT NULL,
                output_mode             TEXT NOT NULL,
                measurement             TEXT NOT NULL,
                method_id               TEXT,
                direction               TEXT NOT NULL,
                raise_relay_id          TEXT,
                raise_min_duration      REAL,
                raise_max_duration      REAL,
                raise_min_off_duration  REAL,
                lower_relay_id          TEXT,
                lower_min_duration      REAL,
                lower_max_duration      REAL,
                lower_min_off_duration  REAL,
                kp                      REAL NOT NULL,
                ki                      REAL NOT NULL,
                kd                      REAL NOT NULL,
                integrator_min          REAL NOT NULL,
                integrator_max          REAL NOT NULL,
                period                  REAL NOT NULL,
                max_measure_age         REAL NOT NULL,
                setpoint                REAL NOT NULL,
                sensor_id               TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS sensor (
                id        TEXT NOT NULL PRIMARY KEY,
                unique_id TEXT NOT NULL,
                period    REAL NOT NULL
            );
            CREATE TABLE IF NOT EXISTS method (
                id          TEXT NOT NULL PRIMARY KEY,
                method_type TEXT NOT NULL,
                time_start  TEXT
            );
            CREATE TABLE IF NOT EXISTS method_data (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                method_id      TEXT NOT NULL,
                time_start     TEXT,
                time_end       TEXT,
                duration_sec   REAL,
                setpoint_start REAL,
                setpoint_end   REAL,
                amplitude      REAL,
                frequency      REAL,
                shift_angle    REAL,
                shift_y        REAL,
                x0 REAL, y0 REAL,
                x1 REAL, y1 REAL,
                x2 REAL, y2 REAL,
                x3 REAL, y3 REAL
            );",
        )?;
        Ok(())
    }

    /// Insert (or replace) a controller settings record. Used by the daemon
    /// seed path and by tests.
    pub fn insert_pid(&self, s: &PidSettings) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT OR REPLACE INTO pid (
                id, unique_id, activated, held, paused, output_mode,
                measurement, method_id, direction,
                raise_relay_id, raise_min_duration, raise_max_duration, raise_min_off_duration,
                lower_relay_id, lower_min_duration, lower_max_duration, lower_min_off_duration,
                kp, ki, kd, integrator_min, integrator_max,
                period, max_measure_age, setpoint, sensor_id
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24,?25,?26)",
            params![
                s.id,
                s.unique_id,
                s.activated,
                s.held,
                s.paused,
                s.output_mode.to_string(),
                s.measurement,
                s.method_id,
                s.direction.to_string(),
                s.raise_relay_id,
                s.raise_min_duration,
                s.raise_max_duration,
                s.raise_min_off_duration,
                s.lower_relay_id,
                s.lower_min_duration,
                s.lower_max_duration,
                s.lower_min_off_duration,
                s.kp,
                s.ki,
                s.kd,
                s.integrator_min,
                s.integrator_max,
                s.period,
                s.max_measure_age,
                s.setpoint,
                s.sensor_id,
            ],
        )?;
        Ok(())
    }

    /// Insert (or replace) a sensor record.
    pub fn insert_sensor(&self, s: &SensorConfig) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT OR REPLACE INTO sensor (id, unique_id, period) VALUES (?1, ?2, ?3)",
            params![s.id, s.unique_id, s.period],
        )?;
        Ok(())
    }

    /// Insert a method record together with its program rows.
    pub fn insert_method(&self, m: &MethodConfig) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO method (id, method_type, time_start) VALUES (?1, ?2, ?3)",
            params![m.id, m.program.kind(), m.start.to_string()],
        )?;
        tx.execute(
            "DELETE FROM method_data WHERE method_id = ?1",
            params![m.id],
        )?;
        match &m.program {
            MethodProgram::Date(spans) => {
                for span in spans {
                    tx.execute(
                        "INSERT INTO method_data
                            (method_id, time_start, time_end, setpoint_start, setpoint_end)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            m.id,
                            span.time_start.format(DATE_ROW_FORMAT).to_string(),
                            span.time_end.format(DATE_ROW_FORMAT).to_string(),
                            span.setpoint_start,
                            span.setpoint_end,
                        ],
                    )?;
                }
            }
            MethodProgram::Daily(spans) => {
                for span in spans {
                    tx.execute(
                        "INSERT INTO method_data
                            (method_id, time_start, time_end, setpoint_start, setpoint_end)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            m.id,
                            span.time_start.format(DAILY_ROW_FORMAT).to_string(),
                            span.time_end.format(DAILY_ROW_FORMAT).to_string(),
                            span.setpoint_start,
                            span.setpoint_end,
                        ],
                    )?;
                }
            }
            MethodProgram::DailySine(wave) => {
                tx.execute(
                    "INSERT INTO method_data
                        (method_id, amplitude, frequency, shift_angle, shift_y)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![m.id, wave.amplitude, wave.frequency, wave.shift_angle, wave.shift_y],
                )?;
            }
            MethodProgram::DailyBezier(curve) => {
                let [p0, p1, p2, p3] = curve.points;
                tx.execute(
                    "INSERT INTO method_data
                        (method_id, shift_angle, x0, y0, x1, y1, x2, y2, x3, y3)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![m.id, curve.shift_angle, p0.0, p0.1, p1.0, p1.1, p2.0, p2.1, p3.0, p3.1],
                )?;
            }
            MethodProgram::Duration(steps) => {
                for step in steps {
                    tx.execute(
                        "INSERT INTO method_data
                            (method_id, duration_sec, setpoint_start, setpoint_end)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![m.id, step.duration_sec, step.setpoint_start, step.setpoint_end],
                    )?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn malformed(entity: &'static str, id: &str, details: impl std::fmt::Display) -> StoreError {
    StoreError::Malformed {
        entity,
        id: id.to_string(),
        details: details.to_string(),
    }
}

fn parse_direction(s: &str, pid_id: &str) -> Result<Direction, StoreError> {
    match s {
        "raise" => Ok(Direction::Raise),
        "lower" => Ok(Direction::Lower),
        "both" => Ok(Direction::Both),
        other => Err(malformed("pid", pid_id, format!("unknown direction '{other}'"))),
    }
}

fn parse_output_mode(s: &str, pid_id: &str) -> Result<OutputMode, StoreError> {
    match s {
        "relay" => Ok(OutputMode::Relay),
        "pwm" => Ok(OutputMode::Pwm),
        other => Err(malformed("pid", pid_id, format!("unknown output mode '{other}'"))),
    }
}

impl ConfigStore for SqliteConfigStore {
    fn pid_settings(&self, pid_id: &str) -> Result<PidSettings, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let row = conn
            .query_row(
                "SELECT id, unique_id, activated, held, paused, output_mode,
                        measurement, method_id, direction,
                        raise_relay_id, raise_min_duration, raise_max_duration, raise_min_off_duration,
                        lower_relay_id, lower_min_duration, lower_max_duration, lower_min_off_duration,
                        kp, ki, kd, integrator_min, integrator_max,
                        period, max_measure_age, setpoint, sensor_id
                 FROM pid WHERE id = ?1",
                params![pid_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, bool>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, String>(8)?,
                        row.get::<_, Option<String>>(9)?,
                        row.get::<_, Option<f64>>(10)?,
                        row.get::<_, Option<f64>>(11)?,
                        row.get::<_, Option<f64>>(12)?,
                        row.get::<_, Option<String>>(13)?,
                        row.get::<_, Option<f64>>(14)?,
                        row.get::<_, Option<f64>>(15)?,
                        row.get::<_, Option<f64>>(16)?,
                        row.get::<_, f64>(17)?,
                        row.get::<_, f64>(18)?,
                        row.get::<_, f64>(19)?,
                        row.get::<_, f64>(20)?,
                        row.get::<_, f64>(21)?,
                        row.get::<_, f64>(22)?,
                        row.get::<_, f64>(23)?,
                        row.get::<_, f64>(24)?,
                        row.get::<_, String>(25)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::MissingRow {
                entity: "pid",
                id: pid_id.to_string(),
            })?;

        Ok(PidSettings {
            id: row.0,
            unique_id: row.1,
            activated: row.2,
            held: row.3,
            paused: row.4,
            output_mode: parse_output_mode(&row.5, pid_id)?,
            measurement: row.6,
            method_id: row.7,
            direction: parse_direction(&row.8, pid_id)?,
            raise_relay_id: row.9,
            raise_min_duration: row.10,
            raise_max_duration: row.11,
            raise_min_off_duration: row.12,
            lower_relay_id: row.13,
            lower_min_duration: row.14,
            lower_max_duration: row.15,
            lower_min_off_duration: row.16,
            kp: row.17,
            ki: row.18,
            kd: row.19,
            integrator_min: row.20,
            integrator_max: row.21,
            period: row.22,
            max_measure_age: row.23,
            setpoint: row.24,
            sensor_id: row.25,
        })
    }

    fn sensor(&self, sensor_id: &str) -> Result<SensorConfig, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.query_row(
            "SELECT id, unique_id, period FROM sensor WHERE id = ?1",
            params![sensor_id],
            |row| {
                Ok(SensorConfig {
                    id: row.get(0)?,
                    unique_id: row.get(1)?,
                    period: row.get(2)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| StoreError::MissingRow {
            entity: "sensor",
            id: sensor_id.to_string(),
        })
    }

    fn method(&self, method_id: &str) -> Result<MethodConfig, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let (method_type, time_start): (String, Option<String>) = conn
            .query_row(
                "SELECT method_type, time_start FROM method WHERE id = ?1",
                params![method_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| StoreError::MissingRow {
                entity: "method",
                id: method_id.to_string(),
            })?;

        // An absent marker means the method was never armed; treat it the
        // same as the explicit "Ready" sentinel.
        let start = match time_start {
            None => StartMarker::Ready,
            Some(s) => s
                .parse::<StartMarker>()
                .map_err(|e| malformed("method", method_id, e))?,
        };

        let program = match method_type.as_str() {
            "Date" => {
                let mut stmt = conn.prepare(
                    "SELECT time_start, time_end, setpoint_start, setpoint_end
                     FROM method_data WHERE method_id = ?1 ORDER BY id",
                )?;
                let spans = stmt
                    .query_map(params![method_id], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, f64>(2)?,
                            row.get::<_, Option<f64>>(3)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?
                    .into_iter()
                    .map(|(start_s, end_s, sp_start, sp_end)| {
                        Ok(DateSpan {
                            time_start: NaiveDateTime::parse_from_str(&start_s, DATE_ROW_FORMAT)
                                .map_err(|e| malformed("method_data", method_id, e))?,
                            time_end: NaiveDateTime::parse_from_str(&end_s, DATE_ROW_FORMAT)
                                .map_err(|e| malformed("method_data", method_id, e))?,
                            setpoint_start: sp_start,
                            setpoint_end: sp_end,
                        })
                    })
                    .collect::<Result<Vec<_>, StoreError>>()?;
                MethodProgram::Date(spans)
            }
            "Daily" => {
                let mut stmt = conn.prepare(
                    "SELECT time_start, time_end, setpoint_start, setpoint_end
                     FROM method_data WHERE method_id = ?1 ORDER BY id",
                )?;
                let spans = stmt
                    .query_map(params![method_id], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, f64>(2)?,
                            row.get::<_, Option<f64>>(3)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?
                    .into_iter()
                    .map(|(start_s, end_s, sp_start, sp_end)| {
                        Ok(DailySpan {
                            time_start: NaiveTime::parse_from_str(&start_s, DAILY_ROW_FORMAT)
                                .map_err(|e| malformed("method_data", method_id, e))?,
                            time_end: NaiveTime::parse_from_str(&end_s, DAILY_ROW_FORMAT)
                                .map_err(|e| malformed("method_data", method_id, e))?,
                            setpoint_start: sp_start,
                            setpoint_end: sp_end,
                        })
                    })
                    .collect::<Result<Vec<_>, StoreError>>()?;
                MethodProgram::Daily(spans)
            }
            "DailySine" => {
                let wave = conn
                    .query_row(
                        "SELECT amplitude, frequency, shift_angle, shift_y
                         FROM method_data WHERE method_id = ?1 ORDER BY id LIMIT 1",
                        params![method_id],
                        |row| {
                            Ok(SineWave {
                                amplitude: row.get(0)?,
                                frequency: row.get(1)?,
                                shift_angle: row.get(2)?,
                                shift_y: row.get(3)?,
                            })
                        },
                    )
                    .optional()?
                    .ok_or_else(|| malformed("method", method_id, "DailySine has no data row"))?;
                MethodProgram::DailySine(wave)
            }
            "DailyBezier" => {
                let curve = conn
                    .query_row(
                        "SELECT shift_angle, x0, y0, x1, y1, x2, y2, x3, y3
                         FROM method_data WHERE method_id = ?1 ORDER BY id LIMIT 1",
                        params![method_id],
                        |row| {
                            Ok(BezierCurve {
                                shift_angle: row.get(0)?,
                                points: [
                                    (row.get(1)?, row.get(2)?),
                                    (row.get(3)?, row.get(4)?),
                                    (row.get(5)?, row.get(6)?),
                                    (row.get(7)?, row.get(8)?),
                                ],
                            })
                        },
                    )
                    .optional()?
                    .ok_or_else(|| malformed("method", method_id, "DailyBezier has no data row"))?;
                MethodProgram::DailyBezier(curve)
            }
            "Duration" => {
                let mut stmt = conn.prepare(
                    "SELECT duration_sec, setpoint_start, setpoint_end
                     FROM method_data WHERE method_id = ?1 ORDER BY id",
                )?;
                let steps = stmt
                    .query_map(params![method_id], |row| {
                        Ok(DurationStep {
                            duration_sec: row.get(0)?,
                            setpoint_start: row.get(1)?,
                            setpoint_end: row.get(2)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                MethodProgram::Duration(steps)
            }
            other => {
                return Err(malformed(
                    "method",
                    method_id,
                    format!("unknown method type '{other}'"),
                ));
            }
        };

        Ok(MethodConfig {
            id: method_id.to_string(),
            program,
            start,
        })
    }

    fn set_method_start(&self, method_id: &str, marker: &StartMarker) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE method SET time_start = ?1 WHERE id = ?2",
            params![marker.to_string(), method_id],
        )?;
        if updated == 0 {
            return Err(StoreError::MissingRow {
                entity: "method",
                id: method_id.to_string(),
            });
        }
        tx.commit()?;
        debug!(method_id, marker = %marker, "method start marker updated");
        Ok(())
    }
}
