//! Reading logged traces back in for analysis and plotting.
//!
//! Every CSV file this crate writes starts with a header row, followed by a
//! time column in milliseconds and a distance column in millimeters. Any
//! further columns are ignored, so live logs, batch exports and synthetic
//! traces all load the same way.

use std::{
    borrow::Cow,
    fmt,
    fs::File,
    io::Read,
    path::Path,
};

/// Header written by [`Trace::to_path`].
pub const TRACE_HEADER: [&str; 2] = ["Timestep (ms)", "Distance (mm)"];

#[derive(Debug)]
pub enum TraceError {
    /// Returned when the file cannot be opened.
    IoError(std::io::Error),

    /// Returned when the CSV itself is malformed.
    CsvError(csv::Error),

    /// Returned when a row has fewer than two columns.
    MissingColumn { row: usize },

    /// Returned when a cell is not a number.
    NotANumber { row: usize, value: String },
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            TraceError::IoError(error) => Cow::from(format!("io error: {}", error)),
            TraceError::CsvError(error) => Cow::from(format!("csv error: {}", error)),
            TraceError::MissingColumn { row } => {
                Cow::from(format!("row {} needs a time and a distance column", row))
            }
            TraceError::NotANumber { row, value } => {
                Cow::from(format!("row {}: {:?} is not a number", row, value))
            }
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for TraceError {}

/// A distance trace over time.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    /// Usually the file name the trace came from
    pub name: String,
    pub timesteps_ms: Vec<f64>,
    pub distances_mm: Vec<f64>,
}

impl Trace {
    pub fn new(name: impl Into<String>, timesteps_ms: Vec<f64>, distances_mm: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            timesteps_ms,
            distances_mm,
        }
    }

    /// Load a trace from the CSV file at `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let file = File::open(path).map_err(TraceError::IoError)?;
        Self::from_reader(name, file)
    }

    /// Load a trace from any CSV source.
    pub fn from_reader(name: impl Into<String>, reader: impl Read) -> Result<Self, TraceError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut timesteps_ms = Vec::new();
        let mut distances_mm = Vec::new();
        for (idx, record) in csv_reader.records().enumerate() {
            let record = record.map_err(TraceError::CsvError)?;
            // Header is row 1
            let row = idx + 2;
            let cell = |column: usize| -> Result<f64, TraceError> {
                let value = record.get(column).ok_or(TraceError::MissingColumn { row })?;
                value.parse::<f64>().map_err(|_| TraceError::NotANumber {
                    row,
                    value: value.to_owned(),
                })
            };
            timesteps_ms.push(cell(0)?);
            distances_mm.push(cell(1)?);
        }

        Ok(Self::new(name, timesteps_ms, distances_mm))
    }

    pub fn len(&self) -> usize {
        self.timesteps_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timesteps_ms.is_empty()
    }

    /// Average time between samples, from the first to the last sample.
    pub fn mean_interval_ms(&self) -> Option<f64> {
        match (self.timesteps_ms.first(), self.timesteps_ms.last()) {
            (Some(first), Some(last)) if self.len() > 1 => {
                Some((last - first) / (self.len() - 1) as f64)
            }
            _ => None,
        }
    }

    pub fn sample_rate_hz(&self) -> Option<f64> {
        self.mean_interval_ms()
            .filter(|&dt| dt > 0.0)
            .map(|dt| 1000.0 / dt)
    }

    /// `(time, distance)` pairs, ready to plot.
    pub fn points(&self) -> Vec<(f64, f64)> {
        self.timesteps_ms
            .iter()
            .copied()
            .zip(self.distances_mm.iter().copied())
            .collect()
    }

    /// Write the trace as `Timestep (ms),Distance (mm)` rows, overwriting
    /// `path`.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), TraceError> {
        let mut writer = csv::Writer::from_path(path).map_err(TraceError::CsvError)?;
        writer
            .write_record(TRACE_HEADER)
            .map_err(TraceError::CsvError)?;
        for (t, d) in self.points() {
            writer
                .write_record(&[t.to_string(), d.to_string()])
                .map_err(TraceError::CsvError)?;
        }
        writer.flush().map_err(TraceError::IoError)
    }

    /// The same trace with its distances replaced.
    pub fn with_distances(&self, name: impl Into<String>, distances_mm: Vec<f64>) -> Self {
        Self::new(name, self.timesteps_ms.clone(), distances_mm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_live_log() {
        let text = "Timestep (ms),Distance (mm)\n0,500\n50,510\n200,495\n";
        let trace = Trace::from_reader("live", text.as_bytes()).unwrap();
        assert_eq!(trace.timesteps_ms, vec![0.0, 50.0, 200.0]);
        assert_eq!(trace.distances_mm, vec![500.0, 510.0, 495.0]);
        assert_eq!(trace.mean_interval_ms(), Some(100.0));
        assert_eq!(trace.sample_rate_hz(), Some(10.0));
    }

    #[test]
    fn load_batch_export_ignores_extra_columns() {
        let text = "Timestamp (ms),Distance (mm),Timestamp Difference (ms)\n\
                    0,500,0\n50,510,50\n";
        let trace = Trace::from_reader("batch", text.as_bytes()).unwrap();
        assert_eq!(trace.points(), vec![(0.0, 500.0), (50.0, 510.0)]);
    }

    #[test]
    fn fractional_timesteps() {
        let text = "Timesteps (ms),Distance (mm)\n0,1867\n16.129032258064516,1867\n";
        let trace = Trace::from_reader("static", text.as_bytes()).unwrap();
        assert!((trace.timesteps_ms[1] - 16.129).abs() < 0.001);
    }

    #[test]
    fn reject_bad_rows() {
        let text = "Timestep (ms),Distance (mm)\n0,500\n50\n";
        assert!(matches!(
            Trace::from_reader("short", text.as_bytes()),
            Err(TraceError::MissingColumn { row: 3 })
        ));

        let text = "Timestep (ms),Distance (mm)\n0,far\n";
        assert!(matches!(
            Trace::from_reader("nan", text.as_bytes()),
            Err(TraceError::NotANumber { row: 2, .. })
        ));
    }

    #[test]
    fn single_sample_has_no_rate() {
        let trace = Trace::new("one", vec![0.0], vec![1.0]);
        assert_eq!(trace.mean_interval_ms(), None);
        assert_eq!(trace.sample_rate_hz(), None);
    }

    #[test]
    fn write_and_reload() {
        let tempfile = tempfile::NamedTempFile::new().unwrap();
        let trace = Trace::new("t", vec![0.0, 16.5], vec![1867.0, 1866.25]);
        trace.to_path(tempfile.path()).unwrap();

        let text = std::fs::read_to_string(tempfile.path()).unwrap();
        assert_eq!(text, "Timestep (ms),Distance (mm)\n0,1867\n16.5,1866.25\n");
        let reloaded = Trace::from_path(tempfile.path()).unwrap();
        assert_eq!(reloaded.points(), trace.points());
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            Trace::from_path("/definitely/not/here.csv"),
            Err(TraceError::IoError(_))
        ));
    }
}
