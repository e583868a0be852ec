use super::Transport;
use crate::config::Config;
use crate::Result;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read};
use std::time::Duration;

/// Serial link to the sensor board (USB CDC or UART bridge).
///
/// The port is released when this value is dropped.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    path: String,
}

impl SerialTransport {
    /// Open `path` at 8N1 without flow control.
    ///
    /// On Unix the port is opened with `TIOCEXCL`, so a second opener
    /// fails instead of stealing half the bytes. `read_timeout` bounds
    /// every read so the caller can poll its stop flag.
    pub fn open(path: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(read_timeout)
            .open()?;

        log::info!("Opened serial port: {} at {} baud", path, baud_rate);

        Ok(SerialTransport {
            port,
            path: path.to_string(),
        })
    }

    /// Open the port named in `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::open(&config.port, config.baud_rate, config.read_timeout)
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &str {
        &self.path
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        log::debug!("Closing serial port {}", self.path);
    }
}
