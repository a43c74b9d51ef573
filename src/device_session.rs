//! The [`DeviceSession`] trait is the seam between the capture code and a
//! Pozyx device. The capture loop only ever talks to a `DeviceSession`, so it
//! can be driven by the serial adapter in [`crate::pozyx_serial`] or by one of
//! the fakes in [`crate::dummy_device`].

use std::{error::Error, fmt::Display, io, num::ParseIntError, str::FromStr};

use serde::{Deserialize, Serialize};

/// The 16 bit UWB network id of a Pozyx device, e.g. `0x1123`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(pub u16);

impl Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl FromStr for NetworkId {
    type Err = ParseIntError;

    /// Accepts either `0x`-prefixed hexadecimal or plain decimal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u16::from_str_radix(hex, 16).map(NetworkId),
            None => s.parse::<u16>().map(NetworkId),
        }
    }
}

/// The vendor ranging mode, trading accuracy for speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum RangingProtocol {
    /// Slower, more accurate two-way ranging
    #[default]
    Precision,
    /// Faster ranging with less averaging
    Fast,
}

impl RangingProtocol {
    /// The value written to the device's protocol register.
    pub fn register_value(self) -> u8 {
        match self {
            RangingProtocol::Precision => 0,
            RangingProtocol::Fast => 1,
        }
    }

    /// Upper case name used in file names and run summaries.
    pub fn name(self) -> &'static str {
        match self {
            RangingProtocol::Precision => "PRECISION",
            RangingProtocol::Fast => "FAST",
        }
    }

    /// The suffix appended to run file names, `_PRECISION` or `_FAST`.
    pub fn file_suffix(self) -> String {
        format!("_{}", self.name())
    }
}

/// One successful range reading as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRange {
    /// Device clock at the time of the measurement, in milliseconds
    pub timestamp_ms: u32,
    /// Measured distance in millimeters
    pub distance_mm: u32,
    /// Received signal strength in dBm
    pub rss_dbm: i16,
}

/// Value of the device's LED configuration register. `LedConfig::HOST`
/// hands all LEDs to the host so they can be driven with
/// [`DeviceSession::set_led`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedConfig(pub u8);

impl LedConfig {
    /// The device has no control over its LEDs
    pub const HOST: LedConfig = LedConfig(0x0);
}

/// Identification read back from a device at setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub who_am_i: u8,
    pub firmware: u8,
    pub hardware: u8,
    pub network_id: NetworkId,
}

impl Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "device {} (who am i 0x{:02X}, firmware {}.{}, hardware 0x{:02X})",
            self.network_id,
            self.who_am_i,
            self.firmware >> 4,
            self.firmware & 0x0F,
            self.hardware
        )
    }
}

/// A raw error code read from the device's error register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(pub u8);

impl ErrorCode {
    /// Human readable description of the firmware error code.
    pub fn describe(self) -> String {
        let text = match self.0 {
            0x00 => "no error",
            0x01 => "error writing to a register over the I2C bus",
            0x02 => "I2C command queue full",
            0x03 => "could not add anchor",
            0x04 => "communication queue full",
            0x05 => "error reading from a register over the I2C bus",
            0x06 => "UWB configuration error",
            0x07 => "operation queue full",
            0x08 => "TDMA scheduling error",
            0x09 => "bus fault on startup",
            0x0A => "flash memory invalid",
            0x0B => "not enough anchors",
            0x0C => "discovery failed",
            0x0D => "calibration failed",
            0x0E => "invalid function parameters",
            0x0F => "anchor not found",
            0x10 => "flash access error",
            0x11 => "out of memory",
            0x12 => "ranging failed",
            0x13 => "ranging timeout (first response)",
            0x14 => "ranging timeout (final response)",
            0x15 => "transmission started too late",
            0x16 => "UWB transceiver busy",
            0x17 => "positioning algorithm error",
            0x18 => "no acknowledgement received",
            0x19 => "sniffer buffer overflow",
            0x1A => "no PPS signal",
            0x1B => "new task interrupted the operation",
            0xFE => "unrecognized device",
            0xFF => "general error",
            other => return format!("unknown error 0x{:02X}", other),
        };
        format!("Error 0x{:02X}: {}", self.0, text)
    }
}

/// Everything that can go wrong while talking to a device.
#[derive(Debug)]
pub enum DeviceError {
    /// The transport failed
    Io(io::Error),
    /// The device did not raise the expected interrupt in time
    Timeout,
    /// The device answered with something we could not decode
    Protocol(String),
    /// A register function returned a non-success status
    FunctionFailed(u8),
    /// The device flagged an error during ranging
    RangingFailed,
    /// This adapter cannot issue commands through a relay device
    RelayUnsupported,
}

impl Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceError::Io(e) => write!(f, "device i/o error: {}", e),
            DeviceError::Timeout => write!(f, "timed out waiting for the device"),
            DeviceError::Protocol(s) => write!(f, "unexpected device response: {}", s),
            DeviceError::FunctionFailed(status) => {
                write!(f, "device function failed with status {}", status)
            }
            DeviceError::RangingFailed => write!(f, "ranging failed"),
            DeviceError::RelayUnsupported => {
                write!(f, "relayed commands are not supported by this device adapter")
            }
        }
    }
}

impl Error for DeviceError {}

impl From<io::Error> for DeviceError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// `DeviceSession`
///
/// A live connection to a Pozyx device. `relay` selects a remote device that
/// should execute the command on our behalf; `None` means the directly
/// attached device.
pub trait DeviceSession {
    /// Perform one range measurement from the local (or relay) device to
    /// `target`.
    fn range_once(
        &mut self,
        target: NetworkId,
        relay: Option<NetworkId>,
    ) -> Result<DeviceRange, DeviceError>;

    /// Read the last error code of the local (or relay) device.
    fn error_code(&mut self, relay: Option<NetworkId>) -> Result<ErrorCode, DeviceError>;

    /// Decode an error code into a message.
    fn error_message(&self, code: ErrorCode) -> String {
        code.describe()
    }

    /// Select the ranging protocol on the local (or relay) device.
    fn configure_protocol(
        &mut self,
        protocol: RangingProtocol,
        relay: Option<NetworkId>,
    ) -> Result<(), DeviceError>;

    /// Write the LED configuration register of `device`.
    fn configure_leds(
        &mut self,
        config: LedConfig,
        device: Option<NetworkId>,
    ) -> Result<(), DeviceError>;

    /// Switch one of the four user LEDs (1..=4) of `device`.
    fn set_led(&mut self, led: u8, on: bool, device: Option<NetworkId>)
        -> Result<(), DeviceError>;

    /// Read identification registers of `device`.
    fn device_info(&mut self, device: Option<NetworkId>) -> Result<DeviceInfo, DeviceError>;
}

impl<D: DeviceSession + ?Sized> DeviceSession for Box<D> {
    fn range_once(
        &mut self,
        target: NetworkId,
        relay: Option<NetworkId>,
    ) -> Result<DeviceRange, DeviceError> {
        (**self).range_once(target, relay)
    }

    fn error_code(&mut self, relay: Option<NetworkId>) -> Result<ErrorCode, DeviceError> {
        (**self).error_code(relay)
    }

    fn error_message(&self, code: ErrorCode) -> String {
        (**self).error_message(code)
    }

    fn configure_protocol(
        &mut self,
        protocol: RangingProtocol,
        relay: Option<NetworkId>,
    ) -> Result<(), DeviceError> {
        (**self).configure_protocol(protocol, relay)
    }

    fn configure_leds(
        &mut self,
        config: LedConfig,
        device: Option<NetworkId>,
    ) -> Result<(), DeviceError> {
        (**self).configure_leds(config, device)
    }

    fn set_led(
        &mut self,
        led: u8,
        on: bool,
        device: Option<NetworkId>,
    ) -> Result<(), DeviceError> {
        (**self).set_led(led, on, device)
    }

    fn device_info(&mut self, device: Option<NetworkId>) -> Result<DeviceInfo, DeviceError> {
        (**self).device_info(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_network_ids() {
        assert_eq!("0x1123".parse::<NetworkId>().unwrap(), NetworkId(0x1123));
        assert_eq!("0X683a".parse::<NetworkId>().unwrap(), NetworkId(0x683A));
        assert_eq!("4387".parse::<NetworkId>().unwrap(), NetworkId(4387));
        assert!("0xZZZZ".parse::<NetworkId>().is_err());
        assert!("70000".parse::<NetworkId>().is_err());
    }

    #[test]
    fn network_id_display_is_hex() {
        assert_eq!(NetworkId(0x1123).to_string(), "0x1123");
    }

    #[test]
    fn protocol_suffixes() {
        assert_eq!(RangingProtocol::Precision.file_suffix(), "_PRECISION");
        assert_eq!(RangingProtocol::Fast.file_suffix(), "_FAST");
        assert_eq!(RangingProtocol::Fast.register_value(), 1);
    }

    #[test]
    fn describe_error_codes() {
        assert_eq!(ErrorCode(0x12).describe(), "Error 0x12: ranging failed");
        assert_eq!(ErrorCode(0x42).describe(), "unknown error 0x42");
    }
}
