//! Transport implementations for glidelink.
//!
//! This crate provides concrete implementations of the
//! [`Transport`](glidelink_core::Transport) trait from `glidelink-core`:
//!
//! - [`SerialTransport`]: RS-232 and USB virtual COM ports
//! - [`TcpListenerTransport`]: a listening TCP port serving one client at a
//!   time (instrument bridges, simulators)
//!
//! [`SystemPortOpener`] maps a [`PortConfig`](glidelink_core::PortConfig)
//! onto them for the device registry.
//!
//! # Example
//!
//! ```no_run
//! use glidelink_transport::SerialTransport;
//! use glidelink_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> glidelink_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyS0", 4800).await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

pub mod opener;
pub mod serial;
pub mod tcp;

pub use opener::SystemPortOpener;
pub use serial::{DataBits, FlowControl, Parity, SerialConfig, SerialTransport, StopBits};
pub use tcp::TcpListenerTransport;
