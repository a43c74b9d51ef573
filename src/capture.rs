//! The capture loop. A [`CaptureSession`] holds everything collected during
//! one ranging run; [`CaptureSession::poll`] performs exactly one
//! range-and-classify cycle against a [`DeviceSession`].
//!
//! Measurement timestamps come from the device clock. The first successful
//! measurement of a session becomes the time origin, so the relative
//! timestamp of a measurement is its device timestamp minus that origin.
//! Error records are stamped with the wall clock, and their relative time is
//! measured from the moment the session started.

use crate::device_session::{DeviceSession, NetworkId, RangingProtocol};

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Prefix of the message recorded when the device reports why ranging failed
pub const LOCAL_ERROR_PREFIX: &str = "Ranging error (local): ";

/// Message recorded when not even the error code could be read back
pub const UNREADABLE_ERROR: &str = "Ranging error: could not retrieve local error";

/// Default directory for measurement files
pub const DEFAULT_DATA_DIR: &str = "pozyx_ranging_runs/";

/// Default directory for error files
pub const DEFAULT_ERROR_DIR: &str = "pozyx_error_runs/";

/// One successful ranging sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// Device clock in milliseconds
    pub timestamp_ms: u32,
    pub distance_mm: u32,
}

/// One failed ranging attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

/// What a single poll produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Measured(Measurement),
    Failed(ErrorRecord),
}

/// Where the files of one run live. File names embed the run start time and
/// the protocol, e.g. `data_2023-08-03_12-33-23_PRECISION.csv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub data_dir: PathBuf,
    pub error_dir: PathBuf,
    pub data_file: PathBuf,
    pub error_file: PathBuf,
}

impl RunPaths {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        error_dir: impl Into<PathBuf>,
        started_at: &DateTime<Local>,
        protocol: RangingProtocol,
    ) -> Self {
        let data_dir = data_dir.into();
        let error_dir = error_dir.into();
        let stamp = started_at.format("%Y-%m-%d_%H-%M-%S");
        let suffix = protocol.file_suffix();
        Self {
            data_file: data_dir.join(format!("data_{}{}.csv", stamp, suffix)),
            error_file: error_dir.join(format!("error_{}{}.csv", stamp, suffix)),
            data_dir,
            error_dir,
        }
    }
}

/// All state of one capture run. Owned and mutated by exactly one caller.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    target: NetworkId,
    relay: Option<NetworkId>,
    protocol: RangingProtocol,
    measurements: Vec<Measurement>,
    errors: Vec<ErrorRecord>,
    samples_ok: u64,
    samples_err: u64,
    total_polls: u64,
    started_at: DateTime<Local>,
    time_origin_ms: Option<u32>,
    paths: RunPaths,
}

impl CaptureSession {
    /// Start a session now, with its files in `data_dir` and `error_dir`.
    pub fn new(
        target: NetworkId,
        relay: Option<NetworkId>,
        protocol: RangingProtocol,
        data_dir: impl Into<PathBuf>,
        error_dir: impl Into<PathBuf>,
    ) -> Self {
        Self::started_at(target, relay, protocol, data_dir, error_dir, Local::now())
    }

    /// Like [`CaptureSession::new`], with an explicit start time.
    pub fn started_at(
        target: NetworkId,
        relay: Option<NetworkId>,
        protocol: RangingProtocol,
        data_dir: impl Into<PathBuf>,
        error_dir: impl Into<PathBuf>,
        started_at: DateTime<Local>,
    ) -> Self {
        Self {
            target,
            relay,
            protocol,
            measurements: Vec::new(),
            errors: Vec::new(),
            samples_ok: 0,
            samples_err: 0,
            total_polls: 0,
            paths: RunPaths::new(data_dir, error_dir, &started_at, protocol),
            started_at,
            time_origin_ms: None,
        }
    }

    /// Request one measurement and record the outcome. Device failures are
    /// recorded as [`ErrorRecord`]s, never returned.
    pub fn poll<D: DeviceSession + ?Sized>(&mut self, device: &mut D) -> PollOutcome {
        let outcome = match device.range_once(self.target, self.relay) {
            Ok(range) => {
                let measurement = Measurement {
                    timestamp_ms: range.timestamp_ms,
                    distance_mm: range.distance_mm,
                };
                self.time_origin_ms.get_or_insert(range.timestamp_ms);
                self.measurements.push(measurement);
                self.samples_ok += 1;
                info!(
                    "Timestamp (ms): {} \t Distance (mm): {}",
                    measurement.timestamp_ms, measurement.distance_mm
                );
                PollOutcome::Measured(measurement)
            }
            Err(e) => {
                debug!("Ranging to {} failed: {}", self.target, e);
                let message = match device.error_code(self.relay) {
                    Ok(code) => format!("{}{}", LOCAL_ERROR_PREFIX, device.error_message(code)),
                    Err(_) => UNREADABLE_ERROR.to_owned(),
                };
                let record = ErrorRecord {
                    timestamp: Local::now(),
                    message,
                };
                self.errors.push(record.clone());
                self.samples_err += 1;
                warn!("{}", record.message);
                PollOutcome::Failed(record)
            }
        };
        self.total_polls += 1;
        outcome
    }

    /// Milliseconds between the session's device time origin and this
    /// measurement. The device clock is a wrapping `u32`.
    pub fn relative_ms(&self, measurement: &Measurement) -> i64 {
        let origin = self.time_origin_ms.unwrap_or(measurement.timestamp_ms);
        measurement.timestamp_ms.wrapping_sub(origin) as i64
    }

    /// Wall-clock milliseconds between the session start and this error.
    pub fn error_elapsed_ms(&self, record: &ErrorRecord) -> i64 {
        (record.timestamp - self.started_at).num_milliseconds()
    }

    /// Relative timestamps and distances of all measurements, in poll order.
    pub fn measurement_columns(&self) -> (Vec<i64>, Vec<u32>) {
        self.measurements
            .iter()
            .map(|m| (self.relative_ms(m), m.distance_mm))
            .unzip()
    }

    /// Wall-clock timestamps and messages of all errors, in poll order.
    pub fn error_columns(&self) -> (Vec<String>, Vec<String>) {
        self.errors
            .iter()
            .map(|e| {
                (
                    e.timestamp.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
                    e.message.clone(),
                )
            })
            .unzip()
    }

    pub fn target(&self) -> NetworkId {
        self.target
    }

    pub fn relay(&self) -> Option<NetworkId> {
        self.relay
    }

    pub fn protocol(&self) -> RangingProtocol {
        self.protocol
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn samples_ok(&self) -> u64 {
        self.samples_ok
    }

    pub fn samples_err(&self) -> u64 {
        self.samples_err
    }

    pub fn total_polls(&self) -> u64 {
        self.total_polls
    }

    pub fn started(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn paths(&self) -> &RunPaths {
        &self.paths
    }

    pub fn data_file(&self) -> &Path {
        &self.paths.data_file
    }

    pub fn error_file(&self) -> &Path {
        &self.paths.error_file
    }
}
