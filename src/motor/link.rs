// Serial link to the motor controller
//
// Owns the connection and hides open/reconnect handling from the control
// loop. Delivery is at-most-once: a packet whose write fails is dropped and
// never replayed after the reconnect.

use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::thread::sleep;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::protocol::EncodedPacket;

/// Default serial configuration for the motor controller
pub const DEFAULT_BAUDRATE: u32 = 9600;
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// Error types for the motor serial link
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Device {port} unavailable after {attempts} attempts: {source}")]
    DeviceUnavailable {
        port: String,
        attempts: u32,
        #[source]
        source: Box<LinkError>,
    },

    #[error("Write to {port} failed, command dropped: {source}")]
    TransmissionFailure {
        port: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Link to {port} is disconnected")]
    Disconnected { port: String },
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// Connection state of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Connected,
    Disconnected,
}

/// Bounded retry used when opening or reopening the port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// A single attempt, no waiting
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(5))
    }
}

/// Byte-oriented duplex stream to the motor controller
pub trait SerialDevice {
    /// Write a full packet and flush it to the wire
    fn write_packet(&mut self, bytes: &[u8]) -> std::io::Result<()>;

    /// Number of received bytes waiting to be read
    fn bytes_available(&mut self) -> std::io::Result<u32>;

    /// Read whatever fits into `buf`
    fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

impl SerialDevice for Box<dyn SerialPort> {
    fn write_packet(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.write_all(bytes)?;
        self.flush()
    }

    fn bytes_available(&mut self) -> std::io::Result<u32> {
        self.bytes_to_read().map_err(std::io::Error::from)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.read(buf)
    }
}

impl SerialDevice for Box<dyn SerialDevice + Send> {
    fn write_packet(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        (**self).write_packet(bytes)
    }

    fn bytes_available(&mut self) -> std::io::Result<u32> {
        (**self).bytes_available()
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        (**self).read_bytes(buf)
    }
}

/// Opens serial devices; the link calls it again on every reconnect
pub trait Connector {
    type Device: SerialDevice;

    fn connect(&mut self, port: &str, baud_rate: u32) -> Result<Self::Device>;
}

/// Opens real serial ports through `serialport`
#[derive(Debug, Clone)]
pub struct SerialPortConnector {
    timeout: Duration,
}

impl SerialPortConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SerialPortConnector {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }
}

impl Connector for SerialPortConnector {
    type Device = Box<dyn SerialPort>;

    fn connect(&mut self, port: &str, baud_rate: u32) -> Result<Self::Device> {
        let device = serialport::new(port, baud_rate)
            .timeout(self.timeout)
            .open()?;
        Ok(device)
    }
}

/// Stand-in device that logs every packet instead of writing it
#[derive(Debug, Default)]
pub struct DryRunDevice {
    port: String,
    written: u64,
}

impl DryRunDevice {
    pub fn bytes_written(&self) -> u64 {
        self.written
    }
}

impl SerialDevice for DryRunDevice {
    fn write_packet(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.written += bytes.len() as u64;
        debug!("[dry-run {}] {:02X?}", self.port, bytes);
        Ok(())
    }

    fn bytes_available(&mut self) -> std::io::Result<u32> {
        Ok(0)
    }

    fn read_bytes(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DryRunConnector;

impl Connector for DryRunConnector {
    type Device = DryRunDevice;

    fn connect(&mut self, port: &str, baud_rate: u32) -> Result<Self::Device> {
        info!("Dry run: pretending to open {} at {} baud", port, baud_rate);
        Ok(DryRunDevice {
            port: port.to_string(),
            written: 0,
        })
    }
}

/// Either a real port or the dry-run stand-in, picked from configuration
#[derive(Debug, Clone)]
pub enum PortConnector {
    Hardware(SerialPortConnector),
    DryRun(DryRunConnector),
}

impl Connector for PortConnector {
    type Device = Box<dyn SerialDevice + Send>;

    fn connect(&mut self, port: &str, baud_rate: u32) -> Result<Self::Device> {
        match self {
            PortConnector::Hardware(c) => Ok(Box::new(c.connect(port, baud_rate)?)),
            PortConnector::DryRun(c) => Ok(Box::new(c.connect(port, baud_rate)?)),
        }
    }
}

/// Resilient serial link with bounded reconnect
pub struct SerialLink<C: Connector> {
    connector: C,
    port: String,
    baud_rate: u32,
    policy: RetryPolicy,
    device: Option<C::Device>,
    reconnects: u32,
    // Set by `close()`; a closed link never reopens on its own
    closed: bool,
}

impl<C: Connector> SerialLink<C> {
    /// Open the port, retrying per `policy` before giving up
    pub fn open(mut connector: C, port: &str, baud_rate: u32, policy: RetryPolicy) -> Result<Self> {
        info!("Opening motor link on {} at {} baud", port, baud_rate);
        let device = open_with_retry(&mut connector, port, baud_rate, policy)?;
        Ok(Self {
            connector,
            port: port.to_string(),
            baud_rate,
            policy,
            device: Some(device),
            reconnects: 0,
            closed: false,
        })
    }

    pub fn state(&self) -> LinkState {
        if self.device.is_some() {
            LinkState::Connected
        } else {
            LinkState::Disconnected
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// Number of reconnects performed after write failures
    pub fn reconnect_count(&self) -> u32 {
        self.reconnects
    }

    /// Write one packet.
    ///
    /// On failure the link drops the connection and reconnects before
    /// returning. The packet is not replayed: the caller gets
    /// `TransmissionFailure` once the link is back, or `DeviceUnavailable`
    /// when every reconnect attempt failed. After `close()` every write
    /// fails with `Disconnected`.
    pub fn write(&mut self, packet: &EncodedPacket) -> Result<()> {
        if self.closed {
            return Err(LinkError::Disconnected {
                port: self.port.clone(),
            });
        }
        if self.device.is_none() {
            // Retries were already exhausted; one more try before refusing
            let device = open_with_retry(
                &mut self.connector,
                &self.port,
                self.baud_rate,
                RetryPolicy::once(),
            )?;
            info!("Link to {} re-established", self.port);
            self.device = Some(device);
        }
        let Some(device) = self.device.as_mut() else {
            return Err(LinkError::Disconnected {
                port: self.port.clone(),
            });
        };

        match device.write_packet(packet.as_bytes()) {
            Ok(()) => Ok(()),
            Err(source) => {
                warn!("Write to {} failed: {}", self.port, source);
                self.device = None;
                self.reconnect()?;
                Err(LinkError::TransmissionFailure {
                    port: self.port.clone(),
                    source,
                })
            }
        }
    }

    /// Write packets in order, stopping at the first failure.
    ///
    /// Packets already written stay applied; a multi-frame command can be
    /// half delivered when a later frame fails.
    pub fn write_all(&mut self, packets: &[EncodedPacket]) -> Result<()> {
        for packet in packets {
            self.write(packet)?;
        }
        Ok(())
    }

    /// Drop the current connection and reopen it with the retry policy.
    /// Also reopens a closed link.
    pub fn reconnect(&mut self) -> Result<()> {
        self.device = None;
        self.closed = false;
        self.reconnects += 1;
        warn!(
            "Reconnecting to {} (reconnect #{})",
            self.port, self.reconnects
        );
        let device = open_with_retry(&mut self.connector, &self.port, self.baud_rate, self.policy)?;
        self.device = Some(device);
        info!("Link to {} re-established", self.port);
        Ok(())
    }

    pub fn bytes_available(&mut self) -> Result<u32> {
        match self.device.as_mut() {
            Some(device) => Ok(device.bytes_available()?),
            None => Err(LinkError::Disconnected {
                port: self.port.clone(),
            }),
        }
    }

    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.device.as_mut() {
            Some(device) => Ok(device.read_bytes(buf)?),
            None => Err(LinkError::Disconnected {
                port: self.port.clone(),
            }),
        }
    }

    /// Release the serial handle. Writes fail until `reconnect()`.
    pub fn close(&mut self) {
        self.closed = true;
        if self.device.take().is_some() {
            info!("Closed motor link on {}", self.port);
        }
    }
}

fn open_with_retry<C: Connector>(
    connector: &mut C,
    port: &str,
    baud_rate: u32,
    policy: RetryPolicy,
) -> Result<C::Device> {
    let mut attempt = 1;
    loop {
        match connector.connect(port, baud_rate) {
            Ok(device) => {
                debug!("Opened {} on attempt {}", port, attempt);
                return Ok(device);
            }
            Err(e) if attempt < policy.attempts => {
                warn!(
                    "Opening {} failed (attempt {}/{}): {}; retrying in {:?}",
                    port, attempt, policy.attempts, e, policy.delay
                );
                sleep(policy.delay);
                attempt += 1;
            }
            Err(e) => {
                error!("Giving up on {} after {} attempts: {}", port, attempt, e);
                return Err(LinkError::DeviceUnavailable {
                    port: port.to_string(),
                    attempts: attempt,
                    source: Box::new(e),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Shared script for the fake connector and its devices
    #[derive(Default)]
    struct Script {
        open_failures: u32,
        write_failures: u32,
        opens: u32,
        written: Vec<Vec<u8>>,
    }

    struct FakeDevice(Arc<Mutex<Script>>);

    impl SerialDevice for FakeDevice {
        fn write_packet(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            let mut script = self.0.lock().unwrap();
            if script.write_failures > 0 {
                script.write_failures -= 1;
                return Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "unplugged",
                ));
            }
            script.written.push(bytes.to_vec());
            Ok(())
        }

        fn bytes_available(&mut self) -> std::io::Result<u32> {
            Ok(0)
        }

        fn read_bytes(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(0)
        }
    }

    struct FakeConnector(Arc<Mutex<Script>>);

    impl Connector for FakeConnector {
        type Device = FakeDevice;

        fn connect(&mut self, _port: &str, _baud_rate: u32) -> Result<FakeDevice> {
            let mut script = self.0.lock().unwrap();
            script.opens += 1;
            if script.open_failures > 0 {
                script.open_failures -= 1;
                return Err(LinkError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no such device",
                )));
            }
            Ok(FakeDevice(self.0.clone()))
        }
    }

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::ZERO)
    }

    fn packet(byte: u8) -> EncodedPacket {
        EncodedPacket::from(vec![byte])
    }

    #[test]
    fn test_open_retries_then_succeeds() {
        let script = Arc::new(Mutex::new(Script {
            open_failures: 4,
            ..Default::default()
        }));
        let link = SerialLink::open(FakeConnector(script.clone()), "/dev/null", 9600, fast_policy(5));
        assert!(link.is_ok());
        assert_eq!(script.lock().unwrap().opens, 5);
        assert_eq!(link.unwrap().state(), LinkState::Connected);
    }

    #[test]
    fn test_open_gives_up_after_policy() {
        let script = Arc::new(Mutex::new(Script {
            open_failures: 10,
            ..Default::default()
        }));
        let result = SerialLink::open(FakeConnector(script.clone()), "/dev/ttyUSB0", 9600, fast_policy(5));
        match result {
            Err(LinkError::DeviceUnavailable { attempts, .. }) => assert_eq!(attempts, 5),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("open should fail"),
        }
        assert_eq!(script.lock().unwrap().opens, 5);
    }

    #[test]
    fn test_failed_write_is_dropped_not_replayed() {
        let script = Arc::new(Mutex::new(Script {
            write_failures: 1,
            ..Default::default()
        }));
        let mut link =
            SerialLink::open(FakeConnector(script.clone()), "/dev/ttyUSB0", 9600, fast_policy(5)).unwrap();

        let result = link.write(&packet(0x01));
        assert!(matches!(result, Err(LinkError::TransmissionFailure { .. })));
        assert_eq!(link.state(), LinkState::Connected);
        assert_eq!(link.reconnect_count(), 1);

        link.write(&packet(0x02)).unwrap();
        assert_eq!(script.lock().unwrap().written, vec![vec![0x02]]);
    }

    #[test]
    fn test_reconnect_exhaustion_is_fatal() {
        let script = Arc::new(Mutex::new(Script::default()));
        let mut link =
            SerialLink::open(FakeConnector(script.clone()), "/dev/ttyUSB0", 9600, fast_policy(3)).unwrap();
        {
            let mut s = script.lock().unwrap();
            s.write_failures = 1;
            s.open_failures = 3;
        }

        let result = link.write(&packet(0x01));
        assert!(matches!(result, Err(LinkError::DeviceUnavailable { .. })));
        assert_eq!(link.state(), LinkState::Disconnected);
    }

    #[test]
    fn test_write_all_stops_at_first_failure() {
        let script = Arc::new(Mutex::new(Script {
            write_failures: 1,
            ..Default::default()
        }));
        let mut link =
            SerialLink::open(FakeConnector(script.clone()), "/dev/ttyUSB0", 9600, fast_policy(2)).unwrap();

        let result = link.write_all(&[packet(0x01), packet(0x02)]);
        assert!(result.is_err());
        assert!(script.lock().unwrap().written.is_empty());
    }

    #[test]
    fn test_close_releases_device() {
        let script = Arc::new(Mutex::new(Script::default()));
        let mut link =
            SerialLink::open(FakeConnector(script), "/dev/ttyUSB0", 9600, fast_policy(1)).unwrap();
        link.close();
        assert_eq!(link.state(), LinkState::Disconnected);
        assert!(matches!(link.bytes_available(), Err(LinkError::Disconnected { .. })));
    }

    #[test]
    fn test_closed_link_does_not_reopen_on_write() {
        let script = Arc::new(Mutex::new(Script::default()));
        let mut link =
            SerialLink::open(FakeConnector(script.clone()), "/dev/ttyUSB0", 9600, fast_policy(3)).unwrap();
        link.close();

        let result = link.write(&packet(0x01));
        assert!(matches!(result, Err(LinkError::Disconnected { .. })));
        assert_eq!(link.state(), LinkState::Disconnected);
        let script = script.lock().unwrap();
        assert_eq!(script.opens, 1);
        assert!(script.written.is_empty());
    }

    #[test]
    fn test_exhausted_link_retries_once_on_next_write() {
        let script = Arc::new(Mutex::new(Script::default()));
        let mut link =
            SerialLink::open(FakeConnector(script.clone()), "/dev/ttyUSB0", 9600, fast_policy(2)).unwrap();
        {
            let mut s = script.lock().unwrap();
            s.write_failures = 1;
            s.open_failures = 2;
        }
        assert!(link.write(&packet(0x01)).is_err());
        assert_eq!(link.state(), LinkState::Disconnected);

        link.write(&packet(0x02)).unwrap();
        assert_eq!(link.state(), LinkState::Connected);
        assert_eq!(script.lock().unwrap().written, vec![vec![0x02]]);
    }
}
