//! Devices that are not really there. [`SimulatedDevice`] stands in for a
//! pair of Pozyx devices on the bench, and [`ScriptedDevice`] replays a fixed
//! list of outcomes so the capture code can be tested deterministically.

use crate::device_session::*;
use rand::prelude::*;
use rand::rngs::StdRng;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// A simulated target sitting at a fixed distance, measured with uniform
/// noise. Some polls fail, and some of those failures leave the error
/// register unreadable, the same two failure modes real hardware shows.
pub struct SimulatedDevice {
    rng: StdRng,
    epoch: Instant,
    distance_mm: f64,
    noise_mm: f64,
    failure_rate: f64,
    unreadable_rate: f64,
    latency: Duration,
    last_error: Option<ErrorCode>,
    error_unreadable: bool,
    protocol: RangingProtocol,
    leds: HashMap<Option<NetworkId>, [bool; 4]>,
}

/// Builds a [`SimulatedDevice`].
pub struct SimulatedDeviceBuilder {
    seed: Option<u64>,
    distance_mm: f64,
    noise_mm: f64,
    failure_rate: f64,
    unreadable_rate: f64,
    latency: Duration,
}

impl Default for SimulatedDeviceBuilder {
    fn default() -> Self {
        Self {
            seed: None,
            distance_mm: 1867.0,
            noise_mm: 25.0,
            failure_rate: 0.05,
            unreadable_rate: 0.1,
            latency: Duration::ZERO,
        }
    }
}

impl SimulatedDeviceBuilder {
    /// Seed the noise generator, for repeatable runs
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    /// Mean distance to the target
    pub fn distance_mm(mut self, distance_mm: f64) -> Self {
        self.distance_mm = distance_mm;
        self
    }
    /// Half-width of the uniform measurement noise
    pub fn noise_mm(mut self, noise_mm: f64) -> Self {
        self.noise_mm = noise_mm.abs();
        self
    }
    /// Probability that a poll fails
    pub fn failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }
    /// Probability that a failed poll also fails to report its error code
    pub fn unreadable_rate(mut self, rate: f64) -> Self {
        self.unreadable_rate = rate.clamp(0.0, 1.0);
        self
    }
    /// Time a single ranging exchange takes
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn build(self) -> SimulatedDevice {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        SimulatedDevice {
            rng,
            epoch: Instant::now(),
            distance_mm: self.distance_mm,
            noise_mm: self.noise_mm,
            failure_rate: self.failure_rate,
            unreadable_rate: self.unreadable_rate,
            latency: self.latency,
            last_error: None,
            error_unreadable: false,
            protocol: RangingProtocol::default(),
            leds: HashMap::new(),
        }
    }
}

impl SimulatedDevice {
    pub fn builder() -> SimulatedDeviceBuilder {
        SimulatedDeviceBuilder::default()
    }

    /// The protocol most recently configured.
    pub fn protocol(&self) -> RangingProtocol {
        self.protocol
    }

    /// LED states of `device`, LED 1 first.
    pub fn leds(&self, device: Option<NetworkId>) -> [bool; 4] {
        self.leds.get(&device).copied().unwrap_or_default()
    }
}

impl DeviceSession for SimulatedDevice {
    fn range_once(
        &mut self,
        _target: NetworkId,
        _relay: Option<NetworkId>,
    ) -> Result<DeviceRange, DeviceError> {
        if !self.latency.is_zero() {
            spin_sleep::sleep(self.latency);
        }

        if self.rng.gen_bool(self.failure_rate) {
            self.error_unreadable = self.rng.gen_bool(self.unreadable_rate);
            self.last_error = Some(if self.rng.gen_bool(0.5) {
                ErrorCode(0x13)
            } else {
                ErrorCode(0x14)
            });
            return Err(DeviceError::RangingFailed);
        }

        let noise = if self.noise_mm > 0.0 {
            self.rng.gen_range(-self.noise_mm..self.noise_mm)
        } else {
            0.0
        };
        Ok(DeviceRange {
            timestamp_ms: self.epoch.elapsed().as_millis() as u32,
            distance_mm: (self.distance_mm + noise).max(0.0).round() as u32,
            rss_dbm: -80,
        })
    }

    fn error_code(&mut self, _relay: Option<NetworkId>) -> Result<ErrorCode, DeviceError> {
        if self.error_unreadable {
            return Err(DeviceError::Timeout);
        }
        Ok(self.last_error.unwrap_or(ErrorCode(0x00)))
    }

    fn configure_protocol(
        &mut self,
        protocol: RangingProtocol,
        _relay: Option<NetworkId>,
    ) -> Result<(), DeviceError> {
        self.protocol = protocol;
        Ok(())
    }

    fn configure_leds(
        &mut self,
        _config: LedConfig,
        device: Option<NetworkId>,
    ) -> Result<(), DeviceError> {
        self.leds.insert(device, [false; 4]);
        Ok(())
    }

    fn set_led(
        &mut self,
        led: u8,
        on: bool,
        device: Option<NetworkId>,
    ) -> Result<(), DeviceError> {
        let idx = (led as usize)
            .checked_sub(1)
            .filter(|&i| i < 4)
            .ok_or_else(|| DeviceError::Protocol(format!("no such LED: {}", led)))?;
        self.leds.entry(device).or_default()[idx] = on;
        Ok(())
    }

    fn device_info(&mut self, device: Option<NetworkId>) -> Result<DeviceInfo, DeviceError> {
        Ok(DeviceInfo {
            who_am_i: 0x43,
            firmware: 0x13,
            hardware: 0x23,
            network_id: device.unwrap_or(NetworkId(0x6000)),
        })
    }
}

/// What a [`ScriptedDevice`] should do on its next poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    /// Report a successful range
    Range { timestamp_ms: u32, distance_mm: u32 },
    /// Fail, and report `Some(code)` when asked for the error code, or fail
    /// to read it if `None`
    Fail(Option<ErrorCode>),
}

/// Replays a fixed sequence of poll outcomes. Once the script runs out every
/// poll fails with an unreadable error code.
#[derive(Debug, Default)]
pub struct ScriptedDevice {
    script: VecDeque<Scripted>,
    pending_error: Option<Option<ErrorCode>>,
    /// Every `(led, on, device)` the capture code asked for
    pub led_calls: Vec<(u8, bool, Option<NetworkId>)>,
    /// Every protocol the capture code configured
    pub protocols: Vec<(RangingProtocol, Option<NetworkId>)>,
}

impl ScriptedDevice {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Default::default()
        }
    }
}

impl DeviceSession for ScriptedDevice {
    fn range_once(
        &mut self,
        _target: NetworkId,
        _relay: Option<NetworkId>,
    ) -> Result<DeviceRange, DeviceError> {
        match self.script.pop_front() {
            Some(Scripted::Range {
                timestamp_ms,
                distance_mm,
            }) => Ok(DeviceRange {
                timestamp_ms,
                distance_mm,
                rss_dbm: -80,
            }),
            Some(Scripted::Fail(code)) => {
                self.pending_error = Some(code);
                Err(DeviceError::RangingFailed)
            }
            None => {
                self.pending_error = Some(None);
                Err(DeviceError::Timeout)
            }
        }
    }

    fn error_code(&mut self, _relay: Option<NetworkId>) -> Result<ErrorCode, DeviceError> {
        self.pending_error
            .take()
            .flatten()
            .ok_or(DeviceError::Timeout)
    }

    fn error_message(&self, code: ErrorCode) -> String {
        format!("CODE_{}", code.0)
    }

    fn configure_protocol(
        &mut self,
        protocol: RangingProtocol,
        relay: Option<NetworkId>,
    ) -> Result<(), DeviceError> {
        self.protocols.push((protocol, relay));
        Ok(())
    }

    fn configure_leds(
        &mut self,
        _config: LedConfig,
        _device: Option<NetworkId>,
    ) -> Result<(), DeviceError> {
        Ok(())
    }

    fn set_led(
        &mut self,
        led: u8,
        on: bool,
        device: Option<NetworkId>,
    ) -> Result<(), DeviceError> {
        self.led_calls.push((led, on, device));
        Ok(())
    }

    fn device_info(&mut self, device: Option<NetworkId>) -> Result<DeviceInfo, DeviceError> {
        Ok(DeviceInfo {
            who_am_i: 0x43,
            firmware: 0x10,
            hardware: 0x20,
            network_id: device.unwrap_or(NetworkId(0)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: NetworkId = NetworkId(0x1123);

    #[test]
    fn simulated_distances_stay_within_noise() {
        let mut dev = SimulatedDevice::builder()
            .seed(7)
            .distance_mm(1000.0)
            .noise_mm(10.0)
            .failure_rate(0.0)
            .build();

        for _ in 0..200 {
            let range = dev.range_once(TARGET, None).unwrap();
            assert!((990..=1010).contains(&range.distance_mm));
        }
    }

    #[test]
    fn simulated_failures_report_codes() {
        let mut dev = SimulatedDevice::builder()
            .seed(1)
            .failure_rate(1.0)
            .unreadable_rate(0.0)
            .build();

        assert!(dev.range_once(TARGET, None).is_err());
        let code = dev.error_code(None).unwrap();
        assert!(code == ErrorCode(0x13) || code == ErrorCode(0x14));
    }

    #[test]
    fn simulated_unreadable_errors() {
        let mut dev = SimulatedDevice::builder()
            .seed(1)
            .failure_rate(1.0)
            .unreadable_rate(1.0)
            .build();

        assert!(dev.range_once(TARGET, None).is_err());
        assert!(dev.error_code(None).is_err());
    }

    #[test]
    fn simulated_leds() {
        let mut dev = SimulatedDevice::builder().build();
        dev.configure_leds(LedConfig::HOST, Some(TARGET)).unwrap();
        dev.set_led(3, true, Some(TARGET)).unwrap();
        assert_eq!(dev.leds(Some(TARGET)), [false, false, true, false]);
        assert!(dev.set_led(5, true, None).is_err());
    }

    #[test]
    fn script_runs_out() {
        let mut dev = ScriptedDevice::new([Scripted::Range {
            timestamp_ms: 10,
            distance_mm: 20,
        }]);
        assert_eq!(dev.range_once(TARGET, None).unwrap().distance_mm, 20);
        assert!(dev.range_once(TARGET, None).is_err());
        assert!(dev.error_code(None).is_err());
    }
}
