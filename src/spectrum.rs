//! Frequency content of a distance trace, for spotting periodic noise in
//! ranging data.

use crate::trace::Trace;

use rustfft::{num_complex::Complex, FftPlanner};
use std::{borrow::Cow, fmt, path::Path};

/// Header of a spectrum CSV file.
pub const SPECTRUM_HEADER: [&str; 4] = ["Frequency (Hz)", "Magnitude", "Phase (rad)", "PSD"];

#[derive(Debug)]
pub enum SpectrumError {
    /// A spectrum needs at least two samples.
    TooFewSamples(usize),

    /// Timesteps must increase so a sample interval can be derived.
    BadSampleInterval(f64),

    /// Returned when writing the spectrum out fails.
    CsvError(csv::Error),
}

impl fmt::Display for SpectrumError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            SpectrumError::TooFewSamples(n) => {
                Cow::from(format!("need at least 2 samples for a spectrum, got {}", n))
            }
            SpectrumError::BadSampleInterval(dt) => {
                Cow::from(format!("sample interval must be positive, got {} s", dt))
            }
            SpectrumError::CsvError(error) => Cow::from(format!("csv error: {}", error)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for SpectrumError {}

/// Whether the mean of the trace is kept in the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcOffset {
    Keep,
    /// Subtract the mean first, so the 0 Hz bin does not dwarf everything else
    Remove,
}

/// The positive half of a discrete Fourier transform. All four vectors have
/// the same length, one entry per frequency bin starting at 0 Hz.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub frequencies_hz: Vec<f64>,
    /// `|X[k]| / N`
    pub magnitudes: Vec<f64>,
    /// Phase angle in radians
    pub phases: Vec<f64>,
    /// Power spectral density, the squared magnitude
    pub psd: Vec<f64>,
}

impl Spectrum {
    /// Transform the distances of `trace`. The sample interval is the mean
    /// spacing of its timesteps.
    pub fn compute(trace: &Trace, dc: DcOffset) -> Result<Self, SpectrumError> {
        if trace.len() < 2 {
            return Err(SpectrumError::TooFewSamples(trace.len()));
        }
        let interval_ms = trace.mean_interval_ms().unwrap_or(0.0);
        Self::from_samples(&trace.distances_mm, interval_ms / 1000.0, dc)
    }

    /// Transform evenly spaced `samples` taken every `sample_interval_s`
    /// seconds.
    pub fn from_samples(
        samples: &[f64],
        sample_interval_s: f64,
        dc: DcOffset,
    ) -> Result<Self, SpectrumError> {
        let n = samples.len();
        if n < 2 {
            return Err(SpectrumError::TooFewSamples(n));
        }
        if !sample_interval_s.is_finite() || sample_interval_s <= 0.0 {
            return Err(SpectrumError::BadSampleInterval(sample_interval_s));
        }

        let offset = match dc {
            DcOffset::Keep => 0.0,
            DcOffset::Remove => samples.iter().sum::<f64>() / n as f64,
        };
        let mut buffer: Vec<Complex<f64>> = samples
            .iter()
            .map(|&s| Complex::new(s - offset, 0.0))
            .collect();

        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(n);
        fft.process(&mut buffer);

        let half = n / 2;
        let resolution = 1.0 / (n as f64 * sample_interval_s);
        let frequencies_hz = (0..half).map(|k| k as f64 * resolution).collect();
        let magnitudes: Vec<f64> = buffer[..half].iter().map(|c| c.norm() / n as f64).collect();
        let phases = buffer[..half].iter().map(|c| c.arg()).collect();
        let psd = magnitudes.iter().map(|m| m * m).collect();

        Ok(Self {
            frequencies_hz,
            magnitudes,
            phases,
            psd,
        })
    }

    pub fn len(&self) -> usize {
        self.frequencies_hz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies_hz.is_empty()
    }

    /// The bin with the largest magnitude, as `(frequency, magnitude)`.
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.frequencies_hz
            .iter()
            .copied()
            .zip(self.magnitudes.iter().copied())
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// `(frequency, magnitude)` pairs.
    pub fn magnitude_points(&self) -> Vec<(f64, f64)> {
        self.frequencies_hz
            .iter()
            .copied()
            .zip(self.magnitudes.iter().copied())
            .collect()
    }

    /// `(frequency, phase)` pairs.
    pub fn phase_points(&self) -> Vec<(f64, f64)> {
        self.frequencies_hz
            .iter()
            .copied()
            .zip(self.phases.iter().copied())
            .collect()
    }

    /// `(frequency, psd)` pairs.
    pub fn psd_points(&self) -> Vec<(f64, f64)> {
        self.frequencies_hz
            .iter()
            .copied()
            .zip(self.psd.iter().copied())
            .collect()
    }

    /// Write one row per bin, overwriting `path`.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), SpectrumError> {
        let mut writer = csv::Writer::from_path(path).map_err(SpectrumError::CsvError)?;
        writer
            .write_record(SPECTRUM_HEADER)
            .map_err(SpectrumError::CsvError)?;
        for k in 0..self.len() {
            writer
                .write_record(&[
                    self.frequencies_hz[k].to_string(),
                    self.magnitudes[k].to_string(),
                    self.phases[k].to_string(),
                    self.psd[k].to_string(),
                ])
                .map_err(SpectrumError::CsvError)?;
        }
        writer
            .flush()
            .map_err(|e| SpectrumError::CsvError(e.into()))
    }
}

/// Remove weak frequency components from `samples`.
///
/// Every bin of the full transform whose power `|X[k]|² / N` is not above
/// `threshold` is zeroed before transforming back. Both halves of the
/// transform are treated alike, so the result stays real.
pub fn psd_denoise(samples: &[f64], threshold: f64) -> Result<Vec<f64>, SpectrumError> {
    let n = samples.len();
    if n < 2 {
        return Err(SpectrumError::TooFewSamples(n));
    }

    let mut buffer: Vec<Complex<f64>> = samples.iter().map(|&s| Complex::new(s, 0.0)).collect();
    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(n).process(&mut buffer);

    for c in buffer.iter_mut() {
        if c.norm_sqr() / n as f64 <= threshold {
            *c = Complex::new(0.0, 0.0);
        }
    }

    // rustfft does not normalize the inverse
    planner.plan_fft_inverse(n).process(&mut buffer);
    Ok(buffer.iter().map(|c| c.re / n as f64).collect())
}

/// [`psd_denoise`] applied to the distances of `trace`.
pub fn denoise_trace(trace: &Trace, threshold: f64) -> Result<Trace, SpectrumError> {
    Ok(trace.with_distances(
        format!("{} (PSD > {})", trace.name, threshold),
        psd_denoise(&trace.distances_mm, threshold)?,
    ))
}
