//! Capture settings. A profile can be kept in a [ron] file so a bench setup
//! does not have to be retyped every run:
//!
//! ```text
//! (
//!     target: 0x1123,
//!     relay: Some(0x683A),
//!     protocol: Fast,
//!     duration_s: Some(10.0),
//!     mode: Batch,
//! )
//! ```
//!
//! Fields left out take their defaults, and options given on the command
//! line override the file.

use crate::args::CaptureCommand;
use crate::capture::{DEFAULT_DATA_DIR, DEFAULT_ERROR_DIR};
use crate::device_session::{NetworkId, RangingProtocol};
use crate::pozyx_serial::DEFAULT_INTERRUPT_TIMEOUT;
use crate::recorder::LogMode;

use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt, fs, path::Path, path::PathBuf, time::Duration};

#[derive(Debug)]
pub enum ConfigError {
    /// Returned when the profile cannot be read or written.
    IoError(std::io::Error),

    /// Returned when serialization of the profile fails.
    RonError(ron::Error),

    /// Returned when the profile is not valid RON.
    RonSpannedError(ron::de::SpannedError),

    /// Returned when a value is out of range.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            ConfigError::IoError(error) => Cow::from(format!("io error: {}", error)),
            ConfigError::RonError(error) => Cow::from(format!("ron error: {}", error)),
            ConfigError::RonSpannedError(error) => {
                Cow::from(format!("invalid capture profile: {}", error))
            }
            ConfigError::Invalid(msg) => Cow::from(msg.as_str()),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for ConfigError {}

/// Everything needed to set up a capture run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Device to range to
    pub target: NetworkId,
    /// Remote device to range from, `None` for the attached device
    pub relay: Option<NetworkId>,
    pub protocol: RangingProtocol,
    /// Serial port of the attached device
    pub port: Option<PathBuf>,
    /// Length of the run; `None` runs until stopped by the operator
    pub duration_s: Option<f64>,
    pub mode: LogMode,
    pub data_dir: PathBuf,
    pub error_dir: PathBuf,
    /// Distance per LED step of the distance bar; `None` leaves LEDs alone
    pub range_step_mm: Option<u32>,
    pub poll_interval_ms: Option<u64>,
    pub interrupt_timeout_ms: u64,
    pub simulate: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target: NetworkId(0x1123),
            relay: None,
            protocol: RangingProtocol::Precision,
            port: None,
            duration_s: Some(10.0),
            mode: LogMode::Batch,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            error_dir: PathBuf::from(DEFAULT_ERROR_DIR),
            range_step_mm: None,
            poll_interval_ms: None,
            interrupt_timeout_ms: DEFAULT_INTERRUPT_TIMEOUT.as_millis() as u64,
            simulate: false,
        }
    }
}

impl CaptureConfig {
    /// Read a profile from the path provided.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(ConfigError::IoError)?;
        Self::from_ron(&text)
    }

    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text).map_err(ConfigError::RonSpannedError)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the profile out to the path provided.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(ConfigError::RonError)?;
        fs::write(path, text).map_err(ConfigError::IoError)
    }

    /// Build the settings for a `capture` invocation: the profile named on
    /// the command line (or the defaults), overridden by explicit flags.
    pub fn resolve(cmd: &CaptureCommand) -> Result<Self, ConfigError> {
        let base = match &cmd.config {
            Some(path) => Self::from_path(path)?,
            None => Self::default(),
        };
        let merged = base.merge(cmd);
        merged.validate()?;
        Ok(merged)
    }

    /// Apply every option set on the command line.
    pub fn merge(mut self, cmd: &CaptureCommand) -> Self {
        if let Some(target) = cmd.target {
            self.target = target;
        }
        if cmd.relay.is_some() {
            self.relay = cmd.relay;
        }
        if let Some(protocol) = cmd.protocol {
            self.protocol = protocol;
        }
        if cmd.port.is_some() {
            self.port = cmd.port.clone();
        }
        if cmd.until_stopped {
            self.duration_s = None;
        } else if cmd.duration.is_some() {
            self.duration_s = cmd.duration;
        }
        if let Some(mode) = cmd.mode {
            self.mode = mode;
        }
        if let Some(dir) = &cmd.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(dir) = &cmd.error_dir {
            self.error_dir = dir.clone();
        }
        if cmd.range_step.is_some() {
            self.range_step_mm = cmd.range_step;
        }
        if cmd.interval_ms.is_some() {
            self.poll_interval_ms = cmd.interval_ms;
        }
        self.simulate |= cmd.simulate;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.duration()?;
        if self.range_step_mm == Some(0) {
            return Err(ConfigError::Invalid("range step must not be zero".to_owned()));
        }
        Ok(())
    }

    /// The run length, `None` for a run that goes until stopped.
    pub fn duration(&self) -> Result<Option<Duration>, ConfigError> {
        let Some(d) = self.duration_s else {
            return Ok(None);
        };
        match Duration::try_from_secs_f64(d) {
            Ok(duration) if d > 0.0 => Ok(Some(duration)),
            _ => Err(ConfigError::Invalid(format!(
                "duration must be a positive number of seconds, got {}",
                d
            ))),
        }
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }

    pub fn interrupt_timeout(&self) -> Duration {
        Duration::from_millis(self.interrupt_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_profile_uses_defaults() {
        let config = CaptureConfig::from_ron(
            "(target: 0x6E66, relay: Some(0x683A), protocol: Fast, mode: Live)",
        )
        .unwrap();
        assert_eq!(config.target, NetworkId(0x6E66));
        assert_eq!(config.relay, Some(NetworkId(0x683A)));
        assert_eq!(config.protocol, RangingProtocol::Fast);
        assert_eq!(config.mode, LogMode::Live);
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(config.duration().unwrap(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn write_and_read_profile() {
        let tempfile = tempfile::NamedTempFile::new().unwrap();
        let config = CaptureConfig {
            range_step_mm: Some(1000),
            duration_s: None,
            ..Default::default()
        };
        config.to_path(tempfile.path()).unwrap();
        assert_eq!(CaptureConfig::from_path(tempfile.path()).unwrap(), config);
    }

    #[test]
    fn flags_override_profile() {
        let base = CaptureConfig::from_ron("(protocol: Fast, duration_s: Some(3.0))").unwrap();
        let cmd = CaptureCommand {
            protocol: Some(RangingProtocol::Precision),
            until_stopped: true,
            range_step: Some(500),
            ..Default::default()
        };
        let merged = base.merge(&cmd);
        assert_eq!(merged.protocol, RangingProtocol::Precision);
        assert_eq!(merged.duration_s, None);
        assert_eq!(merged.range_step_mm, Some(500));
        assert_eq!(merged.target, NetworkId(0x1123));
    }

    #[test]
    fn reject_bad_values() {
        assert!(matches!(
            CaptureConfig::from_ron("(duration_s: Some(-1.0))"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            CaptureConfig::from_ron("(target: \"nope\")"),
            Err(ConfigError::RonSpannedError(_))
        ));
    }

    #[test]
    fn reject_durations_too_long_to_represent() {
        assert!(matches!(
            CaptureConfig::from_ron("(duration_s: Some(1e20))"),
            Err(ConfigError::Invalid(_))
        ));

        let cmd = CaptureCommand {
            duration: Some(1e20),
            ..Default::default()
        };
        let merged = CaptureConfig::default().merge(&cmd);
        assert!(matches!(merged.duration(), Err(ConfigError::Invalid(_))));

        let config = CaptureConfig {
            duration_s: Some(f64::NAN),
            ..Default::default()
        };
        assert!(config.duration().is_err());
    }
}
