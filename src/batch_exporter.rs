//! Writes the sequences accumulated in memory during a run to their final
//! CSV files. Unlike the live run log, an export always replaces whatever
//! was at the destination.

use std::{error::Error, fmt::Display, io, path::Path};

/// Header of an exported measurement file
pub const DATA_HEADER: [&str; 3] = [
    "Timestamp (ms)",
    "Distance (mm)",
    "Timestamp Difference (ms)",
];

/// Header of an exported error file
pub const ERROR_HEADER: [&str; 2] = ["Timestamp (ms)", "Error Message"];

#[derive(Debug)]
pub enum ExportError {
    /// The paired sequences should have been kept in lockstep
    LengthMismatch { timestamps: usize, values: usize },
    Io(io::Error),
    Csv(csv::Error),
}

impl Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::LengthMismatch { timestamps, values } => write!(
                f,
                "the timestamp and data lists must be the same length ({} timestamps, {} values)",
                timestamps, values
            ),
            ExportError::Io(e) => write!(f, "export failed: {}", e),
            ExportError::Csv(e) => write!(f, "export failed: {}", e),
        }
    }
}

impl Error for ExportError {}

impl From<io::Error> for ExportError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<csv::Error> for ExportError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

fn check_lengths(timestamps: usize, values: usize) -> Result<(), ExportError> {
    if timestamps != values {
        return Err(ExportError::LengthMismatch { timestamps, values });
    }
    Ok(())
}

/// Write `timestamp - first timestamp, distance, timestamp - previous
/// timestamp` for every sample. The difference column is zero for the first
/// row.
pub fn export_measurements(
    timestamps: &[i64],
    distances: &[u32],
    path: impl AsRef<Path>,
) -> Result<(), ExportError> {
    check_lengths(timestamps.len(), distances.len())?;

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(DATA_HEADER)?;

    if let Some(&first) = timestamps.first() {
        let mut prior = first;
        for (&timestamp, &distance) in timestamps.iter().zip(distances) {
            writer.write_record(&[
                (timestamp - first).to_string(),
                distance.to_string(),
                (timestamp - prior).to_string(),
            ])?;
            prior = timestamp;
        }
    }

    writer.flush()?;
    Ok(())
}

/// Write every error with its timestamp, verbatim.
pub fn export_errors<T: Display>(
    timestamps: &[T],
    messages: &[String],
    path: impl AsRef<Path>,
) -> Result<(), ExportError> {
    check_lengths(timestamps.len(), messages.len())?;

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(ERROR_HEADER)?;
    for (timestamp, message) in timestamps.iter().zip(messages) {
        writer.write_record(&[timestamp.to_string(), message.clone()])?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn relative_and_delta_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");

        export_measurements(&[1000, 1050, 1200], &[500, 510, 495], &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(
            reader.headers().unwrap(),
            vec![
                "Timestamp (ms)",
                "Distance (mm)",
                "Timestamp Difference (ms)"
            ]
        );
        let rows: Vec<(i64, u32, i64)> = reader
            .deserialize()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows, vec![(0, 500, 0), (50, 510, 50), (200, 495, 150)]);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");

        let res = export_measurements(&[1, 2, 3], &[1, 2], &path);
        assert!(matches!(
            res,
            Err(ExportError::LengthMismatch {
                timestamps: 3,
                values: 2
            })
        ));
        assert!(!path.exists());

        let res = export_errors(&["a"], &[], &path);
        assert!(matches!(res, Err(ExportError::LengthMismatch { .. })));
    }

    #[test]
    fn export_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");

        export_measurements(&[1000, 1050, 1200], &[500, 510, 495], &path).unwrap();
        let first = fs::read(&path).unwrap();
        export_measurements(&[1000, 1050, 1200], &[500, 510, 495], &path).unwrap();
        let second = fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn empty_export_has_only_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");

        export_measurements(&[], &[], &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text.lines().collect::<Vec<_>>(),
            vec!["Timestamp (ms),Distance (mm),Timestamp Difference (ms)"]
        );
    }

    #[test]
    fn errors_keep_timestamps_verbatim() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("errors.csv");

        export_errors(
            &["2023-08-03 12:33:23.000100", "2023-08-03 12:33:24.500000"],
            &[
                "Ranging error (local): CODE_7".to_owned(),
                "Ranging error: could not retrieve local error".to_owned(),
            ],
            &path,
        )
        .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text.lines().collect::<Vec<_>>(),
            vec![
                "Timestamp (ms),Error Message",
                "2023-08-03 12:33:23.000100,Ranging error (local): CODE_7",
                "2023-08-03 12:33:24.500000,Ranging error: could not retrieve local error",
            ]
        );
    }
}
