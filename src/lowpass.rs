//! Butterworth low-pass filtering of distance traces.
//!
//! An order `N` filter is built as `N / 2` cascaded second order sections
//! sharing the cutoff frequency. Section `k` gets the quality factor of the
//! `k`-th conjugate pole pair of the analog prototype,
//! `Q_k = 1 / (2 sin((2k + 1)π / 2N))`. For `N = 2` this is the familiar
//! `1/√2`.

use crate::trace::{Trace, TraceError};

use biquad::{Biquad, Coefficients, DirectForm1, ToHertz};
use std::{borrow::Cow, f64::consts::PI, fmt, path::Path};

/// Header of a filtered trace file.
pub const FILTERED_HEADER: [&str; 3] = ["Timestep (ms)", "Distance (mm)", "Filtered Distance (mm)"];

#[derive(Debug)]
pub enum FilterError {
    /// Only even, non-zero orders can be built from second order sections.
    UnsupportedOrder(usize),

    /// The cutoff must lie strictly between 0 and half the sample rate.
    BadCutoff { cutoff_hz: f64, sample_rate_hz: f64 },

    /// Returned when the trace has no usable sample rate.
    UnknownSampleRate,
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            FilterError::UnsupportedOrder(order) => {
                Cow::from(format!("filter order must be even and non-zero, got {}", order))
            }
            FilterError::BadCutoff {
                cutoff_hz,
                sample_rate_hz,
            } => Cow::from(format!(
                "cutoff {} Hz must be between 0 and {} Hz",
                cutoff_hz,
                sample_rate_hz / 2.0
            )),
            FilterError::UnknownSampleRate => {
                Cow::from("trace needs at least two increasing timesteps to be filtered")
            }
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for FilterError {}

/// A causal Butterworth low-pass filter. Each call to [`apply`] starts from
/// a zero state.
///
/// [`apply`]: ButterworthLowpass::apply
#[derive(Debug, Clone)]
pub struct ButterworthLowpass {
    coefficients: Vec<Coefficients<f64>>,
    order: usize,
    cutoff_hz: f64,
}

impl ButterworthLowpass {
    pub fn new(order: usize, cutoff_hz: f64, sample_rate_hz: f64) -> Result<Self, FilterError> {
        if order == 0 || order % 2 != 0 {
            return Err(FilterError::UnsupportedOrder(order));
        }
        let bad_cutoff = FilterError::BadCutoff {
            cutoff_hz,
            sample_rate_hz,
        };
        if !(cutoff_hz > 0.0 && cutoff_hz < sample_rate_hz / 2.0) {
            return Err(bad_cutoff);
        }

        let coefficients = (0..order / 2)
            .map(|k| {
                let theta = (2 * k + 1) as f64 * PI / (2 * order) as f64;
                let q = 1.0 / (2.0 * theta.sin());
                Coefficients::<f64>::from_params(
                    biquad::Type::LowPass,
                    sample_rate_hz.hz(),
                    cutoff_hz.hz(),
                    q,
                )
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| bad_cutoff)?;

        Ok(Self {
            coefficients,
            order,
            cutoff_hz,
        })
    }

    /// A filter for `trace`, using its mean sample rate.
    pub fn for_trace(order: usize, cutoff_hz: f64, trace: &Trace) -> Result<Self, FilterError> {
        let rate = trace.sample_rate_hz().ok_or(FilterError::UnknownSampleRate)?;
        Self::new(order, cutoff_hz, rate)
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn cutoff_hz(&self) -> f64 {
        self.cutoff_hz
    }

    /// Filter `samples` in order.
    pub fn apply(&self, samples: &[f64]) -> Vec<f64> {
        let mut sections: Vec<DirectForm1<f64>> = self
            .coefficients
            .iter()
            .map(|&c| DirectForm1::<f64>::new(c))
            .collect();

        samples
            .iter()
            .map(|&x| sections.iter_mut().fold(x, |acc, s| s.run(acc)))
            .collect()
    }

    /// Filter the distances of `trace`, keeping its timesteps.
    pub fn apply_to(&self, trace: &Trace) -> Trace {
        trace.with_distances(
            format!("{} (low-pass {} Hz)", trace.name, self.cutoff_hz),
            self.apply(&trace.distances_mm),
        )
    }
}

/// Write `trace` next to its filtered distances, overwriting `path`. The
/// result still loads as a [`Trace`] of the unfiltered data.
pub fn write_filtered(
    trace: &Trace,
    filtered_mm: &[f64],
    path: impl AsRef<Path>,
) -> Result<(), TraceError> {
    let mut writer = csv::Writer::from_path(path).map_err(TraceError::CsvError)?;
    writer
        .write_record(FILTERED_HEADER)
        .map_err(TraceError::CsvError)?;
    for ((t, d), f) in trace.points().into_iter().zip(filtered_mm) {
        writer
            .write_record(&[t.to_string(), d.to_string(), f.to_string()])
            .map_err(TraceError::CsvError)?;
    }
    writer.flush().map_err(TraceError::IoError)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: f64 = 500.0;

    fn tone(frequency: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * frequency * i as f64 / RATE).sin())
            .collect()
    }

    fn rms(samples: &[f64]) -> f64 {
        (samples.iter().map(|s| s * s).sum::<f64>() / samples.len() as f64).sqrt()
    }

    #[test]
    fn passes_low_tones() {
        let filter = ButterworthLowpass::new(6, 10.0, RATE).unwrap();
        let input = tone(2.0, 2000);
        let output = filter.apply(&input);
        let ratio = rms(&output[1000..]) / rms(&input[1000..]);
        assert!(ratio > 0.95, "ratio {}", ratio);
    }

    #[test]
    fn attenuates_high_tones() {
        let filter = ButterworthLowpass::new(6, 10.0, RATE).unwrap();
        let output = filter.apply(&tone(120.0, 2000));
        assert!(rms(&output[1000..]) < 1e-3);
    }

    #[test]
    fn unity_gain_at_dc() {
        let filter = ButterworthLowpass::new(4, 5.0, RATE).unwrap();
        let output = filter.apply(&vec![1867.0; 3000]);
        assert!((output[2999] - 1867.0).abs() < 1e-3);
    }

    #[test]
    fn each_run_starts_fresh() {
        let filter = ButterworthLowpass::new(2, 20.0, RATE).unwrap();
        let input = tone(3.0, 100);
        assert_eq!(filter.apply(&input), filter.apply(&input));
    }

    #[test]
    fn reject_bad_parameters() {
        assert!(matches!(
            ButterworthLowpass::new(5, 10.0, RATE),
            Err(FilterError::UnsupportedOrder(5))
        ));
        assert!(matches!(
            ButterworthLowpass::new(0, 10.0, RATE),
            Err(FilterError::UnsupportedOrder(0))
        ));
        assert!(matches!(
            ButterworthLowpass::new(4, 300.0, RATE),
            Err(FilterError::BadCutoff { .. })
        ));
        assert!(matches!(
            ButterworthLowpass::new(4, 0.0, RATE),
            Err(FilterError::BadCutoff { .. })
        ));
    }

    #[test]
    fn filter_a_trace() {
        let trace = Trace::new("t", vec![0.0, 2.0, 4.0, 6.0], vec![1.0, 1.0, 1.0, 1.0]);
        let filter = ButterworthLowpass::for_trace(2, 50.0, &trace).unwrap();
        let filtered = filter.apply_to(&trace);
        assert_eq!(filtered.timesteps_ms, trace.timesteps_ms);
        assert_eq!(filtered.len(), 4);
        assert!(filtered.name.contains("low-pass"));

        let tempfile = tempfile::NamedTempFile::new().unwrap();
        write_filtered(&trace, &filtered.distances_mm, tempfile.path()).unwrap();
        let text = std::fs::read_to_string(tempfile.path()).unwrap();
        assert!(text.starts_with("Timestep (ms),Distance (mm),Filtered Distance (mm)\n0,1,"));
        assert_eq!(Trace::from_path(tempfile.path()).unwrap().points(), trace.points());

        let single = Trace::new("one", vec![0.0], vec![1.0]);
        assert!(matches!(
            ButterworthLowpass::for_trace(2, 50.0, &single),
            Err(FilterError::UnknownSampleRate)
        ));
    }
}
