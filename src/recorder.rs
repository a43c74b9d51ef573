//! Drives a [`CaptureSession`] against a device for a whole run: device
//! setup, repeated polling, live logging or the final batch export, and the
//! closing [`RunSummary`].

use crate::batch_exporter::{export_errors, export_measurements, ExportError};
use crate::capture::{CaptureSession, PollOutcome};
use crate::device_session::{DeviceError, DeviceSession, LedConfig, NetworkId};
use crate::run_log_writer::{write_error, write_measurement, RunLogError};

use chrono::Local;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{
    error::Error,
    fmt::Display,
    fs, io,
    path::PathBuf,
    time::{Duration, Instant},
};

/// When measurements reach the disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum LogMode {
    /// Append every poll to the run files as it happens
    Live,
    /// Keep everything in memory and export once the run is over
    #[default]
    Batch,
}

#[derive(Debug)]
pub enum RecorderError {
    /// The device could not be configured for the run
    Setup(DeviceError),
    RunLog(RunLogError),
    Export(ExportError),
    Io(io::Error),
}

impl Display for RecorderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecorderError::Setup(e) => write!(f, "device setup failed: {}", e),
            RecorderError::RunLog(e) => write!(f, "{}", e),
            RecorderError::Export(e) => write!(f, "{}", e),
            RecorderError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl Error for RecorderError {}

impl From<RunLogError> for RecorderError {
    fn from(value: RunLogError) -> Self {
        Self::RunLog(value)
    }
}

impl From<ExportError> for RecorderError {
    fn from(value: ExportError) -> Self {
        Self::Export(value)
    }
}

impl From<io::Error> for RecorderError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Lights up to four LEDs on each device the closer the target gets: LED 4
/// below one range step, LED 3 below two, and so on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistanceLeds {
    range_step_mm: u32,
    devices: Vec<Option<NetworkId>>,
}

impl DistanceLeds {
    pub fn new(range_step_mm: u32, devices: Vec<Option<NetworkId>>) -> Self {
        Self {
            range_step_mm,
            devices,
        }
    }

    /// LED states for `distance_mm`, LED 1 first.
    pub fn pattern(&self, distance_mm: u32) -> [bool; 4] {
        let step = self.range_step_mm as u64;
        let d = distance_mm as u64;
        [d < 4 * step, d < 3 * step, d < 2 * step, d < step]
    }

    /// Push the pattern for `distance_mm` to every device.
    pub fn show<D: DeviceSession + ?Sized>(
        &self,
        device: &mut D,
        distance_mm: u32,
    ) -> Result<(), DeviceError> {
        let pattern = self.pattern(distance_mm);
        for &id in &self.devices {
            for (led, &on) in (1..=4).zip(pattern.iter()) {
                device.set_led(led, on, id)?;
            }
        }
        Ok(())
    }
}

/// Totals and rates of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub duration: Duration,
    pub protocol: String,
    pub samples_ok: u64,
    pub samples_err: u64,
    pub total_polls: u64,
    pub data_file: PathBuf,
    pub error_file: PathBuf,
}

impl RunSummary {
    fn per_second(&self, n: u64) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            n as f64 / secs
        } else {
            0.0
        }
    }

    pub fn data_rate(&self) -> f64 {
        self.per_second(self.samples_ok)
    }

    pub fn error_rate(&self) -> f64 {
        self.per_second(self.samples_err)
    }

    pub fn poll_rate(&self) -> f64 {
        self.per_second(self.total_polls)
    }
}

fn seconds_per(rate: f64) -> String {
    if rate > 0.0 {
        format!("{:.4} seconds per sample", 1.0 / rate)
    } else {
        "no samples".to_owned()
    }
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Ran for {:.2} seconds using the {} protocol.",
            self.duration.as_secs_f64(),
            self.protocol
        )?;
        writeln!(f, "---> Run file: {}", self.data_file.display())?;
        writeln!(f, "---> Error file: {}", self.error_file.display())?;
        writeln!(
            f,
            "Data samples per second: {:.2} || {}",
            self.data_rate(),
            seconds_per(self.data_rate())
        )?;
        writeln!(
            f,
            "Error samples per second: {:.2} || {}",
            self.error_rate(),
            seconds_per(self.error_rate())
        )?;
        write!(
            f,
            "Total samples per second: {:.2} || {} ({} polls)",
            self.poll_rate(),
            seconds_per(self.poll_rate()),
            self.total_polls
        )
    }
}

/// Owns a device and the session being captured from it.
pub struct Recorder<D> {
    device: D,
    session: CaptureSession,
    mode: LogMode,
    range_step_mm: Option<u32>,
    leds: Option<DistanceLeds>,
    poll_interval: Option<Duration>,
}

impl<D: DeviceSession> Recorder<D> {
    pub fn new(device: D, session: CaptureSession, mode: LogMode) -> Self {
        Self {
            device,
            session,
            mode,
            range_step_mm: None,
            leds: None,
            poll_interval: None,
        }
    }

    /// Drive the LEDs as a distance bar with steps of `range_step_mm`.
    pub fn with_distance_leds(mut self, range_step_mm: u32) -> Self {
        self.range_step_mm = Some(range_step_mm);
        self
    }

    /// Wait at least this long between the start of consecutive polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Log device information, hand the LEDs to the host and select the
    /// ranging protocol. Only the protocol is required to succeed.
    pub fn setup(&mut self) -> Result<(), RecorderError> {
        let relay = self.session.relay();
        let target = Some(self.session.target());

        for id in [relay, target] {
            match self.device.device_info(id) {
                Ok(info) => info!("Found {}", info),
                Err(e) => warn!("Could not read device info of {:?}: {}", id, e),
            }
        }

        let mut led_devices = Vec::new();
        for id in [relay, target] {
            match self.device.configure_leds(LedConfig::HOST, id) {
                Ok(()) => led_devices.push(id),
                Err(e) => warn!("Could not take over the LEDs of {:?}: {}", id, e),
            }
        }
        if let Some(step) = self.range_step_mm {
            self.leds = Some(DistanceLeds::new(step, led_devices));
        }

        self.device
            .configure_protocol(self.session.protocol(), relay)
            .map_err(RecorderError::Setup)?;

        if self.mode == LogMode::Batch {
            let paths = self.session.paths();
            fs::create_dir_all(&paths.data_dir)?;
            fs::create_dir_all(&paths.error_dir)?;
        }

        info!(
            "-------------------- START DATA RUN AT {} --------------------",
            Local::now()
        );
        Ok(())
    }

    /// One poll, plus whatever the run does with its outcome.
    pub fn step(&mut self) -> Result<PollOutcome, RecorderError> {
        let started = Instant::now();
        let outcome = self.session.poll(&mut self.device);

        match (&outcome, self.mode) {
            (PollOutcome::Measured(m), LogMode::Live) => write_measurement(&self.session, m)?,
            (PollOutcome::Failed(e), LogMode::Live) => write_error(&self.session, e)?,
            (_, LogMode::Batch) => {}
        }

        if let (PollOutcome::Measured(m), Some(leds)) = (&outcome, &self.leds) {
            if let Err(e) = leds.show(&mut self.device, m.distance_mm) {
                warn!("ERROR: setting (remote) leds: {}", e);
            }
        }

        if let Some(interval) = self.poll_interval {
            if let Some(rest) = interval.checked_sub(started.elapsed()) {
                spin_sleep::sleep(rest);
            }
        }
        Ok(outcome)
    }

    /// Poll until `duration` has passed.
    pub fn run_for(&mut self, duration: Duration) -> Result<(), RecorderError> {
        let start = Instant::now();
        while start.elapsed() < duration {
            self.step()?;
        }
        Ok(())
    }

    /// Poll exactly `polls` times.
    pub fn run_polls(&mut self, polls: u64) -> Result<(), RecorderError> {
        for _ in 0..polls {
            self.step()?;
        }
        Ok(())
    }

    /// Poll until `stop` returns true. `stop` is checked before every poll.
    pub fn run_until<F>(&mut self, mut stop: F) -> Result<(), RecorderError>
    where
        F: FnMut(&CaptureSession) -> bool,
    {
        while !stop(&self.session) {
            self.step()?;
        }
        Ok(())
    }

    /// End the run: export in batch mode and summarize.
    pub fn finish(self) -> Result<RunSummary, RecorderError> {
        let session = self.session;

        if self.mode == LogMode::Batch {
            let (timestamps, distances) = session.measurement_columns();
            export_measurements(&timestamps, &distances, session.data_file())?;
            let (error_timestamps, messages) = session.error_columns();
            export_errors(&error_timestamps, &messages, session.error_file())?;
        }

        let duration = (Local::now() - session.started())
            .to_std()
            .unwrap_or_default();

        Ok(RunSummary {
            duration,
            protocol: session.protocol().file_suffix(),
            samples_ok: session.samples_ok(),
            samples_err: session.samples_err(),
            total_polls: session.total_polls(),
            data_file: session.data_file().to_path_buf(),
            error_file: session.error_file().to_path_buf(),
        })
    }
}
