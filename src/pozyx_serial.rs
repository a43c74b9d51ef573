//! A [`DeviceSession`] for a Pozyx device attached over USB serial.

use crate::device_session::{
    DeviceError, DeviceInfo, DeviceRange, DeviceSession, ErrorCode, LedConfig, NetworkId,
    RangingProtocol,
};
use crate::pozyx_message_decoder::{
    encode_function, encode_read, encode_write, PozyxResponse,
};

use log::{debug, trace, warn};
use serial2::SerialPort;
use std::{
    io::{self, Read, Write},
    path::Path,
    str::{self, FromStr},
    time::{Duration, Instant},
};

/// The Pozyx USB interface always runs at this rate
pub const BAUD_RATE: u32 = 115200;

/// How long a single command may take to be answered
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// How long to wait for a ranging function to raise its interrupt
pub const DEFAULT_INTERRUPT_TIMEOUT: Duration = Duration::from_millis(200);

const POZYX_SUCCESS: u8 = 1;

#[allow(missing_docs)]
mod registers {
    pub const WHO_AM_I: u8 = 0x00;
    pub const ERROR_CODE: u8 = 0x04;
    pub const INT_STATUS: u8 = 0x05;
    pub const CONFIG_LEDS: u8 = 0x15;
    pub const NETWORK_ID: u8 = 0x1A;
    pub const RANGE_PROTOCOL: u8 = 0x21;

    pub const LED_CTRL: u8 = 0xB1;
    pub const DO_RANGING: u8 = 0xB5;
    pub const GET_RANGE_INFO: u8 = 0xC7;

    pub const INT_STATUS_ERR: u8 = 0x01;
    pub const INT_STATUS_FUNC: u8 = 0x10;
}

/// A transport that can throw away input it has received but not yet handed
/// out.
pub trait DiscardInput {
    /// Drop everything waiting to be read.
    fn discard_input(&mut self) -> io::Result<()>;
}

impl DiscardInput for SerialPort {
    fn discard_input(&mut self) -> io::Result<()> {
        self.discard_input_buffer()
    }
}

/// Talks to a directly attached Pozyx device through its register interface.
///
/// Generic over the transport so it can run on anything that reads and
/// writes bytes; in practice this is a [`SerialPort`].
///
/// A failed exchange may leave its reply in flight. Input is discarded
/// before the next command, so one lost reply does not shift every reply
/// after it.
pub struct PozyxSerial<T> {
    port: T,
    read_buf: Vec<u8>,
    interrupt_timeout: Duration,
    out_of_sync: bool,
}

impl PozyxSerial<SerialPort> {
    /// Open the serial port at `path` and wrap it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let mut port = SerialPort::open(path.as_ref(), BAUD_RATE)?;
        port.set_read_timeout(READ_TIMEOUT)?;
        debug!("Opened {} at {} baud", path.as_ref().display(), BAUD_RATE);
        Ok(Self::new(port))
    }
}

impl<T: Read + Write + DiscardInput> PozyxSerial<T> {
    /// Wrap an already opened transport.
    pub fn new(port: T) -> Self {
        Self {
            port,
            read_buf: Vec::new(),
            interrupt_timeout: DEFAULT_INTERRUPT_TIMEOUT,
            out_of_sync: false,
        }
    }

    /// Change how long ranging waits for the device's interrupt flag.
    pub fn with_interrupt_timeout(mut self, timeout: Duration) -> Self {
        self.interrupt_timeout = timeout;
        self
    }

    /// Consume the adapter, giving back the transport.
    pub fn into_inner(self) -> T {
        self.port
    }

    fn read_line(&mut self) -> Result<String, DeviceError> {
        let mut buffer = [0; 256];
        loop {
            if let Some(end) = self.read_buf.iter().position(|&c| c == b'\n') {
                let line: Vec<u8> = self.read_buf.drain(..=end).collect();
                // Often happens at the beginning of transmission when
                // there is still garbage in the hardware buffer
                return str::from_utf8(&line)
                    .map(str::to_owned)
                    .map_err(|e| DeviceError::Protocol(format!("invalid utf-8: {}", e)));
            }

            let read_len = self.port.read(&mut buffer)?;
            if read_len == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            self.read_buf.extend_from_slice(&buffer[..read_len]);
        }
    }

    fn exchange(&mut self, command: &str) -> Result<Vec<u8>, DeviceError> {
        if self.out_of_sync {
            debug!("Discarding stale input before {:?}", command);
            self.read_buf.clear();
            self.port.discard_input()?;
            self.out_of_sync = false;
        }

        let res = self.send_and_receive(command);
        self.out_of_sync = res.is_err();
        res
    }

    fn send_and_receive(&mut self, command: &str) -> Result<Vec<u8>, DeviceError> {
        trace!("-> {:?}", command);
        self.port.write_all(command.as_bytes())?;
        self.port.flush()?;

        let line = self.read_line()?;
        trace!("<- {:?}", line);
        match PozyxResponse::from_str(&line) {
            Ok(PozyxResponse::Data(bytes)) => Ok(bytes),
            Ok(PozyxResponse::Error(msg)) => Err(DeviceError::Protocol(msg)),
            Err(e) => {
                warn!("Was unable to parse device response: {:?}", e);
                Err(DeviceError::Protocol(line.trim().to_owned()))
            }
        }
    }

    fn reg_read(&mut self, register: u8, length: usize) -> Result<Vec<u8>, DeviceError> {
        let bytes = self.exchange(&encode_read(register, length))?;
        if bytes.len() != length {
            return Err(DeviceError::Protocol(format!(
                "register 0x{:02X}: expected {} bytes, got {}",
                register,
                length,
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    fn reg_write(&mut self, register: u8, data: &[u8]) -> Result<(), DeviceError> {
        self.exchange(&encode_write(register, data)).map(|_| ())
    }

    /// Calls a register function and returns the payload after the status
    /// byte.
    fn reg_function(
        &mut self,
        register: u8,
        params: &[u8],
        response_len: usize,
    ) -> Result<Vec<u8>, DeviceError> {
        let mut bytes = self.exchange(&encode_function(register, params, response_len))?;
        match bytes.first().copied() {
            Some(POZYX_SUCCESS) if bytes.len() == response_len + 1 => Ok(bytes.split_off(1)),
            Some(POZYX_SUCCESS) => Err(DeviceError::Protocol(format!(
                "function 0x{:02X}: expected {} bytes, got {}",
                register,
                response_len,
                bytes.len() - 1
            ))),
            Some(status) => Err(DeviceError::FunctionFailed(status)),
            None => Err(DeviceError::Protocol(format!(
                "function 0x{:02X}: empty response",
                register
            ))),
        }
    }

    fn interrupt_status(&mut self) -> Result<u8, DeviceError> {
        Ok(self.reg_read(registers::INT_STATUS, 1)?[0])
    }

    /// Poll the interrupt status until `flag` is raised. Reading the status
    /// register clears it on the device.
    fn wait_for_flag(&mut self, flag: u8) -> Result<(), DeviceError> {
        let deadline = Instant::now() + self.interrupt_timeout;
        loop {
            let status = self.interrupt_status()?;
            if status & registers::INT_STATUS_ERR != 0 {
                return Err(DeviceError::RangingFailed);
            }
            if status & flag != 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DeviceError::Timeout);
            }
            spin_sleep::sleep(Duration::from_micros(500));
        }
    }
}

fn local_only(device: Option<NetworkId>) -> Result<(), DeviceError> {
    match device {
        None => Ok(()),
        Some(_) => Err(DeviceError::RelayUnsupported),
    }
}

impl<T: Read + Write + DiscardInput> DeviceSession for PozyxSerial<T> {
    fn range_once(
        &mut self,
        target: NetworkId,
        relay: Option<NetworkId>,
    ) -> Result<DeviceRange, DeviceError> {
        local_only(relay)?;
        let params = target.0.to_le_bytes();

        self.interrupt_status()?;
        self.reg_function(registers::DO_RANGING, &params, 0)?;
        self.wait_for_flag(registers::INT_STATUS_FUNC)?;

        let info = self.reg_function(registers::GET_RANGE_INFO, &params, 10)?;
        Ok(DeviceRange {
            timestamp_ms: u32::from_le_bytes([info[0], info[1], info[2], info[3]]),
            distance_mm: u32::from_le_bytes([info[4], info[5], info[6], info[7]]),
            rss_dbm: i16::from_le_bytes([info[8], info[9]]),
        })
    }

    fn error_code(&mut self, relay: Option<NetworkId>) -> Result<ErrorCode, DeviceError> {
        local_only(relay)?;
        Ok(ErrorCode(self.reg_read(registers::ERROR_CODE, 1)?[0]))
    }

    fn configure_protocol(
        &mut self,
        protocol: RangingProtocol,
        relay: Option<NetworkId>,
    ) -> Result<(), DeviceError> {
        local_only(relay)?;
        self.reg_write(registers::RANGE_PROTOCOL, &[protocol.register_value()])
    }

    fn configure_leds(
        &mut self,
        config: LedConfig,
        device: Option<NetworkId>,
    ) -> Result<(), DeviceError> {
        local_only(device)?;
        self.reg_write(registers::CONFIG_LEDS, &[config.0])
    }

    fn set_led(
        &mut self,
        led: u8,
        on: bool,
        device: Option<NetworkId>,
    ) -> Result<(), DeviceError> {
        local_only(device)?;
        if !(1..=4).contains(&led) {
            return Err(DeviceError::Protocol(format!("no such LED: {}", led)));
        }
        // High nibble selects the LED, low nibble carries its new state.
        let param = (1 << (led - 1 + 4)) | ((on as u8) << (led - 1));
        self.reg_function(registers::LED_CTRL, &[param], 0).map(|_| ())
    }

    fn device_info(&mut self, device: Option<NetworkId>) -> Result<DeviceInfo, DeviceError> {
        local_only(device)?;
        let ids = self.reg_read(registers::WHO_AM_I, 3)?;
        let network_id = self.reg_read(registers::NETWORK_ID, 2)?;
        Ok(DeviceInfo {
            who_am_i: ids[0],
            firmware: ids[1],
            hardware: ids[2],
            network_id: NetworkId(u16::from_le_bytes([network_id[0], network_id[1]])),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::VecDeque, io::Cursor};

    /// In-memory stand-in for a serial port: replies are read from a canned
    /// buffer and everything written is recorded.
    struct MockPort {
        replies: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl MockPort {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Cursor::new(replies.concat().into_bytes()),
                written: Vec::new(),
            }
        }

        fn commands(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.written)
                .split_terminator('\r')
                .map(str::to_owned)
                .collect()
        }
    }

    impl Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.replies.read(buf)
        }
    }

    impl Write for MockPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    // Replies only exist once they are asked for
    impl DiscardInput for MockPort {
        fn discard_input(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// A port whose replies arrive after a given number of commands, so a
    /// reply can show up late. `None` is a read that times out.
    struct LaggingPort {
        chunks: VecDeque<(usize, Option<&'static str>)>,
        commands: usize,
    }

    impl LaggingPort {
        fn new(chunks: &[(usize, Option<&'static str>)]) -> Self {
            Self {
                chunks: chunks.iter().copied().collect(),
                commands: 0,
            }
        }
    }

    impl Read for LaggingPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.front() {
                Some(&(after, _)) if after <= self.commands => {}
                _ => return Err(io::ErrorKind::TimedOut.into()),
            }
            match self.chunks.pop_front() {
                Some((_, Some(reply))) => {
                    buf[..reply.len()].copy_from_slice(reply.as_bytes());
                    Ok(reply.len())
                }
                _ => Err(io::ErrorKind::TimedOut.into()),
            }
        }
    }

    impl Write for LaggingPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.commands += buf.iter().filter(|&&b| b == b'\r').count();
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl DiscardInput for LaggingPort {
        fn discard_input(&mut self) -> io::Result<()> {
            let arrived = self.commands;
            self.chunks.retain(|&(after, _)| after > arrived);
            Ok(())
        }
    }

    #[test]
    fn successful_ranging() {
        let port = MockPort::new(&[
            "D,00\r\n",
            "D,01\r\n",
            "D,10\r\n",
            "D,01e8030000f4010000b0ff\r\n",
        ]);
        let mut pozyx = PozyxSerial::new(port);

        let range = pozyx.range_once(NetworkId(0x1123), None).unwrap();
        assert_eq!(
            range,
            DeviceRange {
                timestamp_ms: 1000,
                distance_mm: 500,
                rss_dbm: -80,
            }
        );

        let port = pozyx.into_inner();
        assert_eq!(
            port.commands(),
            vec!["R,05,1", "F,b5,2311,1", "R,05,1", "F,c7,2311,11"]
        );
    }

    #[test]
    fn ranging_error_flag() {
        let port = MockPort::new(&["D,00\r\n", "D,01\r\n", "D,01\r\n"]);
        let mut pozyx = PozyxSerial::new(port);

        let res = pozyx.range_once(NetworkId(0x1123), None);
        assert!(matches!(res, Err(DeviceError::RangingFailed)));
    }

    #[test]
    fn ranging_function_rejected() {
        let port = MockPort::new(&["D,00\r\n", "D,00\r\n"]);
        let mut pozyx = PozyxSerial::new(port);

        let res = pozyx.range_once(NetworkId(0x1123), None);
        assert!(matches!(res, Err(DeviceError::FunctionFailed(0))));
    }

    #[test]
    fn ranging_times_out() {
        let port = MockPort::new(&["D,00\r\n", "D,01\r\n", "D,00\r\n"]);
        let mut pozyx = PozyxSerial::new(port).with_interrupt_timeout(Duration::ZERO);

        let res = pozyx.range_once(NetworkId(0x1123), None);
        assert!(matches!(res, Err(DeviceError::Timeout)));
    }

    #[test]
    fn relay_is_rejected() {
        let mut pozyx = PozyxSerial::new(MockPort::new(&[]));
        let res = pozyx.range_once(NetworkId(0x1123), Some(NetworkId(0x683A)));
        assert!(matches!(res, Err(DeviceError::RelayUnsupported)));
        assert!(pozyx.into_inner().commands().is_empty());
    }

    #[test]
    fn read_error_code() {
        let mut pozyx = PozyxSerial::new(MockPort::new(&["D,12\r\n"]));
        assert_eq!(pozyx.error_code(None).unwrap(), ErrorCode(0x12));
    }

    #[test]
    fn late_reply_is_not_taken_for_the_next_one() {
        let port = LaggingPort::new(&[(1, None), (1, Some("D,12\r\n")), (2, Some("D,07\r\n"))]);
        let mut pozyx = PozyxSerial::new(port);

        assert!(matches!(pozyx.error_code(None), Err(DeviceError::Io(_))));
        assert_eq!(pozyx.error_code(None).unwrap(), ErrorCode(0x07));
    }

    #[test]
    fn half_read_line_is_dropped_after_a_failure() {
        let port = LaggingPort::new(&[(1, Some("D,1")), (1, None), (2, Some("D,05\r\n"))]);
        let mut pozyx = PozyxSerial::new(port);

        assert!(pozyx.error_code(None).is_err());
        assert_eq!(pozyx.error_code(None).unwrap(), ErrorCode(0x05));
    }

    #[test]
    fn device_closed_mid_exchange() {
        let mut pozyx = PozyxSerial::new(MockPort::new(&["D,1"]));
        assert!(matches!(pozyx.error_code(None), Err(DeviceError::Io(_))));
    }

    #[test]
    fn configure_and_leds() {
        let mut pozyx = PozyxSerial::new(MockPort::new(&["D,\r\n", "D,\r\n", "D,01\r\n"]));
        pozyx.configure_protocol(RangingProtocol::Fast, None).unwrap();
        pozyx.configure_leds(LedConfig::HOST, None).unwrap();
        pozyx.set_led(2, true, None).unwrap();

        assert_eq!(
            pozyx.into_inner().commands(),
            vec!["W,21,01", "W,15,00", "F,b1,22,1"]
        );
    }

    #[test]
    fn read_device_info() {
        let mut pozyx = PozyxSerial::new(MockPort::new(&["D,431322\r\n", "D,2311\r\n"]));
        let info = pozyx.device_info(None).unwrap();
        assert_eq!(info.who_am_i, 0x43);
        assert_eq!(info.firmware, 0x13);
        assert_eq!(info.network_id, NetworkId(0x1123));
    }
}
