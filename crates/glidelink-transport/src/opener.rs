//! The [`PortOpener`] used outside of tests.

use async_trait::async_trait;
use glidelink_core::config::PortConfig;
use glidelink_core::error::{Error, Result};
use glidelink_core::transport::{PortOpener, Transport};

use crate::serial::SerialTransport;
use crate::tcp::TcpListenerTransport;

/// Opens serial ports and TCP listeners for the device registry.
///
/// Bluetooth, auto-detected and internal-sensor ports have no backend on
/// this platform and fail with [`Error::OpenFailed`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPortOpener;

impl SystemPortOpener {
    pub fn new() -> Self {
        SystemPortOpener
    }
}

#[async_trait]
impl PortOpener for SystemPortOpener {
    async fn open_port(&self, config: &PortConfig) -> Result<Box<dyn Transport>> {
        match config {
            PortConfig::Serial { index, baud_rate } => {
                let path = PortConfig::serial_path(*index);
                Ok(Box::new(SerialTransport::open(&path, *baud_rate).await?))
            }
            PortConfig::TcpListener { port } => {
                Ok(Box::new(TcpListenerTransport::bind(*port).await?))
            }
            PortConfig::Disabled => Err(Error::OpenFailed("port is disabled".into())),
            other => Err(Error::OpenFailed(format!(
                "{other} is not supported on this platform"
            ))),
        }
    }
}
