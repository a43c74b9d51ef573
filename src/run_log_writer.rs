//! Append-only CSV logs written while a capture is still running.
//!
//! Every call is a complete open/append/close cycle, so a run that is
//! interrupted between polls keeps everything written so far. The header is
//! written by whichever call finds the file missing.

use crate::capture::{CaptureSession, ErrorRecord, Measurement};

use log::info;
use std::{
    error::Error,
    fmt::Display,
    fs::{self, OpenOptions},
    io,
    path::Path,
};

/// Header of the live measurement file
pub const DATA_HEADER: [&str; 2] = ["Timestep (ms)", "Distance (mm)"];

/// Header of the live error file
pub const ERROR_HEADER: [&str; 2] = ["Timestep (ms)", "Error Message"];

#[derive(Debug)]
pub enum RunLogError {
    Io(io::Error),
    Csv(csv::Error),
}

impl Display for RunLogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunLogError::Io(e) => write!(f, "could not write run log: {}", e),
            RunLogError::Csv(e) => write!(f, "could not write run log: {}", e),
        }
    }
}

impl Error for RunLogError {}

impl From<io::Error> for RunLogError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<csv::Error> for RunLogError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

/// Append `measurement` to the session's data file as
/// `relative timestamp, distance`.
pub fn write_measurement(
    session: &CaptureSession,
    measurement: &Measurement,
) -> Result<(), RunLogError> {
    let paths = session.paths();
    append_row(
        &paths.data_dir,
        &paths.data_file,
        &DATA_HEADER,
        &[
            session.relative_ms(measurement).to_string(),
            measurement.distance_mm.to_string(),
        ],
    )
}

/// Append `record` to the session's error file as
/// `milliseconds since session start, message`.
pub fn write_error(session: &CaptureSession, record: &ErrorRecord) -> Result<(), RunLogError> {
    let paths = session.paths();
    append_row(
        &paths.error_dir,
        &paths.error_file,
        &ERROR_HEADER,
        &[
            session.error_elapsed_ms(record).to_string(),
            record.message.clone(),
        ],
    )
}

fn append_row(
    dir: &Path,
    file: &Path,
    header: &[&str],
    row: &[String],
) -> Result<(), RunLogError> {
    if !dir.exists() {
        info!("Creating directory: '{}'", dir.display());
        fs::create_dir_all(dir)?;
    }

    // Must be checked on every call: an earlier call in this run may
    // already have created the file.
    let file_exists = file.exists();
    let handle = OpenOptions::new().create(true).append(true).open(file)?;
    let mut writer = csv::Writer::from_writer(handle);
    if !file_exists {
        info!("Creating file: '{}'", file.display());
        writer.write_record(header)?;
    }
    writer.write_record(row)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_session::{NetworkId, RangingProtocol};
    use chrono::Duration;
    use tempfile::tempdir;

    fn lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn first_write_creates_then_appends() {
        let dir = tempdir().unwrap();
        let session = CaptureSession::new(
            NetworkId(0x1123),
            None,
            RangingProtocol::Fast,
            dir.path().join("nested/data"),
            dir.path().join("nested/errors"),
        );

        let m = Measurement {
            timestamp_ms: 1000,
            distance_mm: 500,
        };
        write_measurement(&session, &m).unwrap();
        assert_eq!(
            lines(session.data_file()),
            vec!["Timestep (ms),Distance (mm)", "0,500"]
        );

        write_measurement(&session, &m).unwrap();
        assert_eq!(
            lines(session.data_file()),
            vec!["Timestep (ms),Distance (mm)", "0,500", "0,500"]
        );
    }

    #[test]
    fn measurements_are_relative_to_first_sample() {
        let dir = tempdir().unwrap();
        let mut session = CaptureSession::new(
            NetworkId(0x1123),
            None,
            RangingProtocol::Precision,
            dir.path(),
            dir.path(),
        );
        let mut dev = crate::dummy_device::ScriptedDevice::new([
            crate::dummy_device::Scripted::Range {
                timestamp_ms: 1000,
                distance_mm: 500,
            },
            crate::dummy_device::Scripted::Range {
                timestamp_ms: 1050,
                distance_mm: 510,
            },
        ]);
        for _ in 0..2 {
            session.poll(&mut dev);
        }
        for m in session.measurements() {
            write_measurement(&session, m).unwrap();
        }

        assert_eq!(
            lines(session.data_file()),
            vec!["Timestep (ms),Distance (mm)", "0,500", "50,510"]
        );
    }

    #[test]
    fn errors_go_to_their_own_file() {
        let dir = tempdir().unwrap();
        let session = CaptureSession::new(
            NetworkId(0x1123),
            None,
            RangingProtocol::Precision,
            dir.path().join("data"),
            dir.path().join("errors"),
        );
        let record = ErrorRecord {
            timestamp: session.started() + Duration::milliseconds(250),
            message: "Ranging error: could not retrieve local error".to_owned(),
        };

        write_error(&session, &record).unwrap();
        write_error(&session, &record).unwrap();

        assert_eq!(
            lines(session.error_file()),
            vec![
                "Timestep (ms),Error Message",
                "250,Ranging error: could not retrieve local error",
                "250,Ranging error: could not retrieve local error",
            ]
        );
        assert!(!session.data_file().exists());
    }

    #[test]
    fn unwritable_directory_is_reported() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"").unwrap();
        let session = CaptureSession::new(
            NetworkId(0x1123),
            None,
            RangingProtocol::Precision,
            blocker.join("data"),
            blocker.join("errors"),
        );
        let m = Measurement {
            timestamp_ms: 0,
            distance_mm: 1,
        };
        assert!(matches!(
            write_measurement(&session, &m),
            Err(RunLogError::Io(_))
        ));
    }
}
