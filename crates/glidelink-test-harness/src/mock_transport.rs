//! Mock transport for deterministic testing of protocol engines.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs plus a queue of unsolicited incoming data. The
//! state lives behind a shared [`MockHandle`], so a test can keep feeding
//! lines and inspecting writes after the transport itself has been moved
//! into a receive loop.
//!
//! # Example
//!
//! ```
//! use glidelink_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // When the engine sends this request, return this response.
//! mock.expect(&[0x05], &[0x06]);
//!
//! // Lines the instrument sends on its own.
//! let handle = mock.handle();
//! handle.push_incoming(b"$PGRMZ,1000,f,3*00\r\n");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use glidelink_core::error::{Error, Result};
use glidelink_core::transport::Transport;

/// A pre-loaded request/response pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be sent.
    request: Vec<u8>,
    /// The bytes to return when the matching request is received.
    response: Vec<u8>,
}

#[derive(Debug)]
struct MockState {
    /// Ordered queue of expected request/response pairs.
    expectations: VecDeque<Expectation>,
    /// The response data pending for the next `receive()` call.
    pending_response: Option<Vec<u8>>,
    /// Cursor into the pending response.
    response_cursor: usize,
    /// Unsolicited chunks, delivered one per `receive()` when no response
    /// is pending.
    incoming: VecDeque<Vec<u8>>,
    /// Whether unmatched sends are accepted instead of rejected.
    relaxed: bool,
    /// Whether the transport is "connected".
    connected: bool,
    /// Log of all bytes sent through this transport.
    sent_log: Vec<Vec<u8>>,
    /// Baud rates requested through `set_baud_rate()`.
    baud_log: Vec<u32>,
    flush_count: usize,
}

/// A mock [`Transport`] for testing protocol engines without hardware.
///
/// Expectations are consumed in order. When `send()` is called, the sent
/// data is recorded and matched against the next expectation; the
/// corresponding response is returned by the following `receive()` calls.
/// In strict mode (the default) a send that does not match, or a send with
/// no expectation left, fails with [`Error::Protocol`]. In relaxed mode
/// such sends are only recorded.
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

/// A clonable view of a [`MockTransport`]'s state.
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    /// Create a new strict mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            state: Arc::new(Mutex::new(MockState {
                expectations: VecDeque::new(),
                pending_response: None,
                response_cursor: 0,
                incoming: VecDeque::new(),
                relaxed: false,
                connected: true,
                sent_log: Vec::new(),
                baud_log: Vec::new(),
                flush_count: 0,
            })),
        }
    }

    /// Create a mock that accepts any write; for streaming tests.
    pub fn relaxed() -> Self {
        let mock = Self::new();
        lock(&mock.state).relaxed = true;
        mock
    }

    /// Add an expected request/response pair.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.handle().expect(request, response);
    }

    /// A handle that stays valid after the transport is moved.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Return all data that has been sent through this transport.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.handle().sent_data()
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.handle().remaining_expectations()
    }

    /// Set the connected state of the mock transport.
    pub fn set_connected(&mut self, connected: bool) {
        self.handle().set_connected(connected);
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHandle {
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        lock(&self.state).expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Queue bytes the "instrument" sends without being asked.
    pub fn push_incoming(&self, data: &[u8]) {
        lock(&self.state).incoming.push_back(data.to_vec());
    }

    /// Queue one line, terminated with CR LF.
    pub fn push_line(&self, line: &str) {
        self.push_incoming(format!("{line}\r\n").as_bytes());
    }

    /// Whether every queued incoming chunk has been read.
    pub fn incoming_drained(&self) -> bool {
        lock(&self.state).incoming.is_empty()
    }

    /// Each element is the byte slice from one `send()` call.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        lock(&self.state).sent_log.clone()
    }

    /// Everything sent, concatenated.
    pub fn sent_bytes(&self) -> Vec<u8> {
        lock(&self.state).sent_log.concat()
    }

    pub fn clear_sent(&self) {
        lock(&self.state).sent_log.clear();
    }

    pub fn remaining_expectations(&self) -> usize {
        lock(&self.state).expectations.len()
    }

    pub fn baud_rates(&self) -> Vec<u32> {
        lock(&self.state).baud_log.clone()
    }

    pub fn flush_count(&self) -> usize {
        lock(&self.state).flush_count
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    /// When set to `false`, subsequent `send()` and `receive()` calls
    /// return [`Error::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        lock(&self.state).connected = connected;
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(Error::NotConnected);
        }

        state.sent_log.push(data.to_vec());

        match state.expectations.front() {
            Some(expectation) if expectation.request == data => {
                let response = expectation.response.clone();
                state.expectations.pop_front();
                state.pending_response = Some(response);
                state.response_cursor = 0;
                Ok(())
            }
            _ if state.relaxed => Ok(()),
            Some(expectation) => Err(Error::Protocol(format!(
                "unexpected send data: expected {:02X?}, got {:02X?}",
                expectation.request, data
            ))),
            None => Err(Error::Protocol(
                "no more expectations in mock transport".into(),
            )),
        }
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(Error::NotConnected);
        }

        if let Some(response) = state.pending_response.take() {
            let cursor = state.response_cursor;
            let remaining = &response[cursor..];
            if !remaining.is_empty() {
                let n = remaining.len().min(buf.len());
                buf[..n].copy_from_slice(&remaining[..n]);
                if cursor + n < response.len() {
                    state.response_cursor = cursor + n;
                    state.pending_response = Some(response);
                } else {
                    state.response_cursor = 0;
                }
                return Ok(n);
            }
            state.response_cursor = 0;
        }

        match state.incoming.pop_front() {
            Some(mut chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    chunk.drain(..n);
                    state.incoming.push_front(chunk);
                }
                Ok(n)
            }
            None => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.connected = false;
        state.pending_response = None;
        state.response_cursor = 0;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    /// Counts the call; queued data is kept so tests stay deterministic.
    async fn flush(&mut self) -> Result<()> {
        lock(&self.state).flush_count += 1;
        Ok(())
    }

    async fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        lock(&self.state).baud_log.push(baud_rate);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_transport_basic_send_receive() {
        let mut mock = MockTransport::new();
        let request = &[0x05];
        let response = &[0x06, 0x4C];

        mock.expect(request, response);
        mock.send(request).await.unwrap();

        let mut buf = [0u8; 64];
        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();

        assert_eq!(n, response.len());
        assert_eq!(&buf[..n], response);
    }

    #[tokio::test]
    async fn mock_transport_tracks_sent_data() {
        let mut mock = MockTransport::new();
        mock.expect(&[0x01, 0x02], &[0xFF]);
        mock.expect(&[0x03, 0x04], &[0xFE]);

        mock.send(&[0x01, 0x02]).await.unwrap();
        mock.send(&[0x03, 0x04]).await.unwrap();

        let sent = mock.sent_data();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], [0x01, 0x02]);
        assert_eq!(sent[1], [0x03, 0x04]);
    }

    #[tokio::test]
    async fn mock_transport_wrong_data_errors() {
        let mut mock = MockTransport::new();
        mock.expect(&[0x01], &[0xFF]);

        let result = mock.send(&[0x99]).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn mock_transport_no_expectations_errors() {
        let mut mock = MockTransport::new();
        let result = mock.send(&[0x01]).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn relaxed_mock_accepts_any_write() {
        let mut mock = MockTransport::relaxed();
        mock.send(b"$PDVMC,1*00\r\n").await.unwrap();
        assert_eq!(mock.handle().sent_bytes(), b"$PDVMC,1*00\r\n");
    }

    #[tokio::test]
    async fn mock_transport_receive_without_data_times_out() {
        let mut mock = MockTransport::new();
        let mut buf = [0u8; 64];
        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn incoming_data_delivered_after_pending_response() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        handle.push_line("$PFLAU,0,0,0,1,0,,0,,*00");
        mock.expect(b"R", b"L");
        mock.send(b"R").await.unwrap();

        let mut buf = [0u8; 64];
        let n = mock.receive(&mut buf, Duration::ZERO).await.unwrap();
        assert_eq!(&buf[..n], b"L");
        let n = mock.receive(&mut buf, Duration::ZERO).await.unwrap();
        assert!(buf[..n].starts_with(b"$PFLAU"));
        assert!(handle.incoming_drained());
    }

    #[tokio::test]
    async fn mock_transport_partial_receive() {
        let mut mock = MockTransport::new();
        mock.expect(&[0x01], &[0xAA, 0xBB, 0xCC, 0xDD]);
        mock.send(&[0x01]).await.unwrap();

        let mut buf = [0u8; 2];
        let n = mock.receive(&mut buf, Duration::ZERO).await.unwrap();
        assert_eq!(&buf[..n], &[0xAA, 0xBB]);
        let n = mock.receive(&mut buf, Duration::ZERO).await.unwrap();
        assert_eq!(&buf[..n], &[0xCC, 0xDD]);
    }

    #[tokio::test]
    async fn mock_transport_disconnect() {
        let mut mock = MockTransport::new();
        assert!(mock.is_connected());
        mock.close().await.unwrap();
        assert!(!mock.is_connected());
        assert!(matches!(mock.send(&[0x01]).await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn handle_outlives_transport_move() {
        let mock = MockTransport::relaxed();
        let handle = mock.handle();
        let mut boxed: Box<dyn Transport> = Box::new(mock);
        boxed.send(b"abc").await.unwrap();
        boxed.set_baud_rate(38400).await.unwrap();
        boxed.flush().await.unwrap();
        assert_eq!(handle.sent_bytes(), b"abc");
        assert_eq!(handle.baud_rates(), vec![38400]);
        assert_eq!(handle.flush_count(), 1);
    }
}
