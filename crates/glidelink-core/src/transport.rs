//! Transport trait for instrument communication.
//!
//! The [`Transport`] trait abstracts over the physical link to an
//! instrument. Implementations exist for serial ports, a TCP listener and
//! mock transports for testing.
//!
//! Protocol engines (the streaming line reader in `glidelink-line-io`, the
//! binary bulk-transfer protocol in `glidelink-volkslogger`) operate on a
//! `Transport` rather than directly on a serial port, enabling both real
//! hardware and deterministic unit testing with `MockTransport` from the
//! `glidelink-test-harness` crate.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::PortConfig;
use crate::error::{Error, Result};

/// Asynchronous byte-level transport to an instrument.
///
/// Implementations handle buffering and error recovery at the physical
/// layer. Line framing, checksums and bulk-transfer framing are handled by
/// the protocol engines that consume this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the instrument.
    ///
    /// Implementations should block until all bytes have been written to
    /// the underlying transport.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the instrument into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Will wait up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`] if no data is received
    /// within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`].
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;

    /// Discard any input that has been received but not yet read.
    async fn flush(&mut self) -> Result<()> {
        let mut scratch = [0u8; 256];
        loop {
            match self.receive(&mut scratch, Duration::ZERO).await {
                Ok(0) | Err(Error::Timeout) => return Ok(()),
                Ok(_) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Change the line speed of the transport.
    ///
    /// Only meaningful for serial links; the default reports
    /// [`Error::Unsupported`].
    async fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        Err(Error::Unsupported(format!(
            "baud rate change to {baud_rate} on this transport"
        )))
    }
}

/// Opens a [`Transport`] for a [`PortConfig`].
///
/// The device registry uses this seam so that tests can hand out mock
/// transports while applications use the system serial/TCP implementation.
#[async_trait]
pub trait PortOpener: Send + Sync {
    /// Open the port described by `config`.
    ///
    /// Returns [`Error::OpenFailed`] when the port cannot be claimed.
    async fn open_port(&self, config: &PortConfig) -> Result<Box<dyn Transport>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Chunks {
        chunks: VecDeque<Vec<u8>>,
    }

    #[async_trait]
    impl Transport for Chunks {
        async fn send(&mut self, _data: &[u8]) -> Result<()> {
            Ok(())
        }

        async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Err(Error::Timeout),
            }
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn default_flush_discards_pending_input() {
        let mut t = Chunks {
            chunks: VecDeque::from(vec![b"abc".to_vec(), b"def".to_vec()]),
        };
        t.flush().await.unwrap();
        assert!(t.chunks.is_empty());
    }

    #[tokio::test]
    async fn default_set_baud_rate_is_unsupported() {
        let mut t = Chunks {
            chunks: VecDeque::new(),
        };
        let result = t.set_baud_rate(38400).await;
        assert!(matches!(result, Err(Error::Unsupported(_))));
    }
}
