//! Serial port transport for instrument links.
//!
//! [`SerialTransport`] implements [`Transport`] for RS-232 ports and USB
//! virtual COM ports. Typical speeds:
//! - GPS receivers and FLARM: 4800 to 38400 baud NMEA
//! - Vega varios: 38400 baud
//! - Volkslogger: 9600 baud for the handshake, up to 115200 for bulk reads
//!
//! Unlike most byte channels the speed can change while the port is open
//! ([`Transport::set_baud_rate`]); loggers switch to a faster rate for a
//! bulk transfer and back afterwards.

use async_trait::async_trait;
use glidelink_core::error::{Error, Result};
use glidelink_core::transport::Transport;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};

/// Serial port configuration. Defaults to 8N1 without flow control.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 4800,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Seven,
    Eight,
}

impl From<DataBits> for tokio_serial::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => tokio_serial::DataBits::Seven,
            DataBits::Eight => tokio_serial::DataBits::Eight,
        }
    }
}

/// Number of stop bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

impl From<FlowControl> for tokio_serial::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => tokio_serial::FlowControl::None,
            FlowControl::Software => tokio_serial::FlowControl::Software,
            FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
        }
    }
}

/// Serial port transport.
pub struct SerialTransport {
    /// `None` after `close()`.
    port: Option<SerialStream>,
    port_name: String,
    baud_rate: u32,
}

impl SerialTransport {
    /// Open `port` at `baud_rate`, 8N1, no flow control.
    ///
    /// `port` is a device path such as `/dev/ttyS0` or `COM1`; see
    /// [`PortConfig::serial_path`](glidelink_core::PortConfig::serial_path).
    pub async fn open(port: &str, baud_rate: u32) -> Result<Self> {
        let config = SerialConfig {
            baud_rate,
            ..Default::default()
        };
        Self::open_with_config(port, config).await
    }

    /// Open a serial port with full configuration control.
    pub async fn open_with_config(port: &str, config: SerialConfig) -> Result<Self> {
        tracing::debug!(
            port = %port,
            baud_rate = config.baud_rate,
            data_bits = ?config.data_bits,
            stop_bits = ?config.stop_bits,
            parity = ?config.parity,
            flow_control = ?config.flow_control,
            "opening serial port"
        );

        let mut serial_stream = tokio_serial::new(port, config.baud_rate)
            .data_bits(config.data_bits.into())
            .stop_bits(config.stop_bits.into())
            .parity(config.parity.into())
            .flow_control(config.flow_control.into())
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %port, error = %e, "failed to open serial port");
                Error::OpenFailed(format!("serial port {port}: {e}"))
            })?;

        // Some adapters power the instrument from DTR/RTS or wire them to a
        // reset line; keep both low.
        if let Err(e) = serial_stream.write_data_terminal_ready(false) {
            tracing::warn!(port = %port, error = %e, "failed to de-assert DTR");
        }
        if let Err(e) = serial_stream.write_request_to_send(false) {
            tracing::warn!(port = %port, error = %e, "failed to de-assert RTS");
        }

        tracing::info!(port = %port, baud_rate = config.baud_rate, "serial port opened");

        Ok(Self {
            port: Some(serial_stream),
            port_name: port.to_string(),
            baud_rate: config.baud_rate,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Current line speed.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::NotConnected => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(port = %self.port_name, bytes = data.len(), data = ?data, "sending");

        port.write_all(data).await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "failed to send data");
            map_io_error(e)
        })?;
        port.flush().await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "failed to flush serial port");
            Error::Io(e)
        })?;

        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, port.read(buf)).await {
            Ok(Ok(n)) => {
                tracing::trace!(port = %self.port_name, bytes = n, data = ?&buf[..n], "received");
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::error!(port = %self.port_name, error = %e, "failed to receive data");
                Err(map_io_error(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.flush().await {
                tracing::warn!(
                    port = %self.port_name,
                    error = %e,
                    "failed to flush before closing (continuing anyway)"
                );
            }
            tracing::info!(port = %self.port_name, "serial port closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    /// Discards the driver's input buffer instead of reading it out.
    async fn flush(&mut self) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        port.clear(ClearBuffer::Input)
            .map_err(|e| Error::Transport(format!("failed to clear {}: {e}", self.port_name)))
    }

    async fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        if baud_rate == self.baud_rate {
            return Ok(());
        }
        port.set_baud_rate(baud_rate).map_err(|e| {
            Error::Transport(format!(
                "failed to switch {} to {baud_rate} baud: {e}",
                self.port_name
            ))
        })?;
        tracing::debug!(
            port = %self.port_name,
            from = self.baud_rate,
            to = baud_rate,
            "baud rate changed"
        );
        self.baud_rate = baud_rate;
        Ok(())
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.port.is_some() {
            tracing::debug!(port = %self.port_name, "SerialTransport dropped, closing port");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_4800_8n1() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 4800);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.flow_control, FlowControl::None);
    }

    #[test]
    fn enum_conversions() {
        assert_eq!(
            tokio_serial::DataBits::from(DataBits::Seven),
            tokio_serial::DataBits::Seven
        );
        assert_eq!(
            tokio_serial::StopBits::from(StopBits::Two),
            tokio_serial::StopBits::Two
        );
        assert_eq!(
            tokio_serial::Parity::from(Parity::Even),
            tokio_serial::Parity::Even
        );
        assert_eq!(
            tokio_serial::FlowControl::from(FlowControl::Hardware),
            tokio_serial::FlowControl::Hardware
        );
    }

    #[tokio::test]
    async fn open_missing_port_is_open_failure() {
        let result = SerialTransport::open("/dev/glidelink-does-not-exist", 9600).await;
        assert!(matches!(result, Err(Error::OpenFailed(_))));
    }

    #[test]
    fn broken_pipe_maps_to_connection_lost() {
        let e = std::io::Error::from(std::io::ErrorKind::BrokenPipe);
        assert!(matches!(map_io_error(e), Error::ConnectionLost));
        let e = std::io::Error::from(std::io::ErrorKind::InvalidData);
        assert!(matches!(map_io_error(e), Error::Io(_)));
    }
}
