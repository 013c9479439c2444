//! Listening TCP transport.
//!
//! [`TcpListenerTransport`] binds a local port and serves one client at a
//! time. Instrument bridges and flight simulators connect to it and stream
//! NMEA; anything the link layer writes goes back to the current client.
//! While no client is connected, writes are dropped and reads time out.
//!
//! A client disconnect is reported once as [`Error::ConnectionLost`]; the
//! next read waits for a new client on the same port.

use async_trait::async_trait;
use glidelink_core::error::{Error, Result};
use glidelink_core::transport::Transport;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

#[derive(Debug)]
pub struct TcpListenerTransport {
    /// `None` after `close()`.
    listener: Option<TcpListener>,
    client: Option<(TcpStream, String)>,
    port: u16,
}

impl TcpListenerTransport {
    /// Listen on `port` on all interfaces. Port 0 picks a free port.
    pub async fn bind(port: u16) -> Result<Self> {
        Self::bind_addr(&format!("0.0.0.0:{port}")).await
    }

    /// Listen on an explicit `host:port`.
    pub async fn bind_addr(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(addr = %addr, error = %e, "failed to bind TCP listener");
            Error::OpenFailed(format!("tcp listener {addr}: {e}"))
        })?;
        let port = listener.local_addr().map(|a| a.port()).unwrap_or_default();
        tracing::info!(port, "TCP listener bound");

        Ok(Self {
            listener: Some(listener),
            client: None,
            port,
        })
    }

    /// The bound port.
    pub fn local_port(&self) -> u16 {
        self.port
    }

    /// Address of the connected client, if any.
    pub fn peer(&self) -> Option<&str> {
        self.client.as_ref().map(|(_, peer)| peer.as_str())
    }

    async fn accept_until(&mut self, deadline: Instant) -> Result<()> {
        let listener = self.listener.as_ref().ok_or(Error::NotConnected)?;
        let (stream, addr) = tokio::time::timeout_at(deadline, listener.accept())
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(Error::Io)?;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(port = self.port, error = %e, "failed to set TCP_NODELAY");
        }
        let peer = addr.to_string();
        tracing::info!(port = self.port, peer = %peer, "client connected");
        self.client = Some((stream, peer));
        Ok(())
    }

    fn drop_client(&mut self, reason: &str) {
        if let Some((_, peer)) = self.client.take() {
            tracing::info!(port = self.port, peer = %peer, reason, "client disconnected");
        }
    }
}

fn is_disconnect(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::ConnectionAborted
    )
}

#[async_trait]
impl Transport for TcpListenerTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.listener.is_none() {
            return Err(Error::NotConnected);
        }
        let Some((stream, _)) = self.client.as_mut() else {
            tracing::trace!(port = self.port, bytes = data.len(), "no client, write dropped");
            return Ok(());
        };

        match stream.write_all(data).await {
            Ok(()) => Ok(()),
            Err(e) if is_disconnect(&e) => {
                self.drop_client("write failed");
                Err(Error::ConnectionLost)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if self.listener.is_none() {
            return Err(Error::NotConnected);
        }
        let deadline = Instant::now() + timeout;
        if self.client.is_none() {
            self.accept_until(deadline).await?;
        }
        let Some((stream, _)) = self.client.as_mut() else {
            return Err(Error::Timeout);
        };

        match tokio::time::timeout_at(deadline, stream.read(buf)).await {
            Ok(Ok(0)) => {
                self.drop_client("closed by peer");
                Err(Error::ConnectionLost)
            }
            Ok(Ok(n)) => {
                tracing::trace!(port = self.port, bytes = n, data = ?&buf[..n], "received");
                Ok(n)
            }
            Ok(Err(e)) if is_disconnect(&e) => {
                self.drop_client("read failed");
                Err(Error::ConnectionLost)
            }
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some((mut stream, _)) = self.client.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::warn!(port = self.port, error = %e, "failed to shut down client stream");
            }
        }
        if self.listener.take().is_some() {
            tracing::info!(port = self.port, "TCP listener closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.listener.is_some()
    }
}
