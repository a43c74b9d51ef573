//! Synthetic traces with known content, used to check the analysis tools
//! against something other than real ranging data.

use crate::trace::{Trace, TraceError};

use std::f64::consts::PI;

/// Sample rate of generated sine waves.
pub const SINE_SAMPLE_RATE_HZ: f64 = 1000.0;

/// A unit sine of `frequency_hz` sampled at [`SINE_SAMPLE_RATE_HZ`] for
/// `duration_s` seconds. Timesteps are in milliseconds like every other
/// trace.
pub fn sine_wave(frequency_hz: f64, duration_s: f64) -> Trace {
    let n = (SINE_SAMPLE_RATE_HZ * duration_s).round().max(0.0) as usize;
    let step_ms = 1000.0 / SINE_SAMPLE_RATE_HZ;

    let timesteps_ms: Vec<f64> = (0..n).map(|i| i as f64 * step_ms).collect();
    let values = timesteps_ms
        .iter()
        .map(|t| (2.0 * PI * frequency_hz * t / 1000.0).sin())
        .collect();
    Trace::new(sine_file_name(frequency_hz), timesteps_ms, values)
}

/// `sine_wave_440_Hz.csv`
pub fn sine_file_name(frequency_hz: f64) -> String {
    format!("sine_wave_{}_Hz.csv", frequency_hz)
}

/// A device sitting still at `distance_mm`, sampled at `rate_hz` for
/// `seconds`.
pub fn static_trace(rate_hz: f64, distance_mm: u32, seconds: f64) -> Trace {
    let n = (rate_hz * seconds).round().max(0.0) as usize;
    let step_ms = 1000.0 / rate_hz;

    let timesteps_ms = (0..n).map(|i| i as f64 * step_ms).collect();
    Trace::new(
        static_file_name(distance_mm),
        timesteps_ms,
        vec![distance_mm as f64; n],
    )
}

/// The distance in meters with a `p` for the decimal point, e.g.
/// `static_1p867m.csv`.
pub fn static_file_name(distance_mm: u32) -> String {
    format!(
        "static_{}p{:03}m.csv",
        distance_mm / 1000,
        distance_mm % 1000
    )
}

/// Write a generated trace, overwriting `path`.
pub fn write(trace: &Trace, path: impl AsRef<std::path::Path>) -> Result<(), TraceError> {
    log::info!(
        "writing {} samples to {}",
        trace.len(),
        path.as_ref().display()
    );
    trace.to_path(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::{DcOffset, Spectrum};

    #[test]
    fn sine_has_its_own_frequency() {
        let trace = sine_wave(440.0, 1.0);
        assert_eq!(trace.len(), 1000);
        assert_eq!(trace.sample_rate_hz(), Some(1000.0));
        assert_eq!(trace.name, "sine_wave_440_Hz.csv");

        let spectrum = Spectrum::compute(&trace, DcOffset::Keep).unwrap();
        let (freq, _) = spectrum.peak().unwrap();
        assert!((freq - 440.0).abs() < 1e-6);
    }

    #[test]
    fn static_trace_is_flat() {
        let trace = static_trace(62.0, 1867, 10.0);
        assert_eq!(trace.len(), 620);
        assert!(trace.distances_mm.iter().all(|&d| d == 1867.0));
        assert!((trace.timesteps_ms[1] - 1000.0 / 62.0).abs() < 1e-9);
    }

    #[test]
    fn file_names() {
        assert_eq!(static_file_name(1867), "static_1p867m.csv");
        assert_eq!(static_file_name(500), "static_0p500m.csv");
        assert_eq!(static_file_name(12050), "static_12p050m.csv");
        assert_eq!(sine_file_name(2.5), "sine_wave_2.5_Hz.csv");
    }

    #[test]
    fn written_trace_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(static_file_name(1867));
        write(&static_trace(62.0, 1867, 1.0), &path).unwrap();

        let loaded = Trace::from_path(&path).unwrap();
        assert_eq!(loaded.len(), 62);
        assert_eq!(loaded.name, "static_1p867m.csv");
    }
}
