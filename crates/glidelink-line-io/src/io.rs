//! IO task types and implementation for line-oriented channels.
//!
//! One tokio task owns the transport exclusively. It delivers complete
//! lines to a [`LineHandler`] in arrival order, runs the handler's commands
//! (settings pushes, ticks) with exclusive transport access between lines,
//! and forwards raw writes queued through a [`LineWriter`] (pass-through
//! from other channels).
//!
//! Stopping the task is "cancel and await": [`LineIo::shutdown`] resolves
//! only after the loop has exited, and hands back both the transport and
//! the handler so a caller can run an exclusive exchange on the port and
//! then spawn a new task with the same state.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use glidelink_core::error::{Error, Result};
use glidelink_core::transport::Transport;

use crate::protocol::{self, DecodeResult};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Configuration for the line IO task.
#[derive(Debug, Clone)]
pub struct IoConfig {
    /// Whether received lines are delivered to the handler. When disabled,
    /// input is still read and discarded so the port never backs up.
    pub read_enabled: bool,
    /// How long one idle read waits before the loop re-checks its queues.
    pub poll_timeout: Duration,
    /// Depth of the command and write queues.
    pub queue_depth: usize,
}

impl Default for IoConfig {
    fn default() -> Self {
        IoConfig {
            read_enabled: true,
            poll_timeout: Duration::from_millis(100),
            queue_depth: 32,
        }
    }
}

/// Receives lines and executes commands inside the IO task.
///
/// `line_received` is never called concurrently with itself or with
/// `handle_command`; both run on the IO task.
#[async_trait]
pub trait LineHandler: Send + 'static {
    /// Requests the owner of the [`LineIo`] can send to the handler.
    type Command: Send + 'static;

    /// Called for every complete line, terminator removed.
    fn line_received(&mut self, line: &str);

    /// Execute one command with exclusive access to the transport.
    async fn handle_command(&mut self, command: Self::Command, transport: &mut dyn Transport);
}

struct WriteRequest {
    data: Vec<u8>,
    reply: Option<oneshot::Sender<Result<()>>>,
}

/// Queues raw writes to a channel's transport. Cheap to clone.
#[derive(Clone)]
pub struct LineWriter {
    tx: mpsc::Sender<WriteRequest>,
}

impl LineWriter {
    /// Queue `data` without waiting; `false` if the queue is full or the
    /// task has stopped.
    pub fn try_write(&self, data: Vec<u8>) -> bool {
        self.tx.try_send(WriteRequest { data, reply: None }).is_ok()
    }

    /// Write `data` and wait for the transport's result.
    pub async fn write(&self, data: Vec<u8>) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(WriteRequest {
                data,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| Error::NotConnected)?;
        reply_rx.await.map_err(|_| Error::NotConnected)?
    }

    /// Whether the task behind this writer has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Handle to a running line IO task.
pub struct LineIo<H: LineHandler> {
    cmd_tx: mpsc::Sender<H::Command>,
    writer: LineWriter,
    cancel: CancellationToken,
    task: JoinHandle<(Box<dyn Transport>, H)>,
}

impl<H: LineHandler> LineIo<H> {
    /// Send a command built around a reply channel and await the reply.
    pub async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> H::Command,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(make(reply_tx))
            .await
            .map_err(|_| Error::NotConnected)?;
        reply_rx.await.map_err(|_| Error::NotConnected)
    }

    /// Send a command without waiting for it to run.
    pub async fn send(&self, command: H::Command) -> Result<()> {
        self.cmd_tx
            .send(command)
            .await
            .map_err(|_| Error::NotConnected)
    }

    /// A writer for raw output on this channel.
    pub fn writer(&self) -> LineWriter {
        self.writer.clone()
    }

    /// Write raw bytes to the transport.
    pub async fn write(&self, data: Vec<u8>) -> Result<()> {
        self.writer.write(data).await
    }

    /// Stop the task and recover the transport and handler.
    ///
    /// Resolves once the loop has fully exited. Commands still queued are
    /// dropped; their callers see [`Error::NotConnected`].
    pub async fn shutdown(self) -> Result<(Box<dyn Transport>, H)> {
        self.cancel.cancel();
        self.task
            .await
            .map_err(|e| Error::Transport(format!("line IO task failed: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the IO task. Returns the handle for sending commands.
pub fn spawn_line_task<H: LineHandler>(
    transport: Box<dyn Transport>,
    config: IoConfig,
    handler: H,
) -> LineIo<H> {
    let (cmd_tx, cmd_rx) = mpsc::channel::<H::Command>(config.queue_depth);
    let (write_tx, write_rx) = mpsc::channel::<WriteRequest>(config.queue_depth);
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    let task = tokio::spawn(io_loop(
        transport,
        config,
        handler,
        cmd_rx,
        write_rx,
        cancel_clone,
    ));

    LineIo {
        cmd_tx,
        writer: LineWriter { tx: write_tx },
        cancel,
        task,
    }
}

// ---------------------------------------------------------------------------
// IO Loop
// ---------------------------------------------------------------------------

/// Maximum buffer size before reset to prevent unbounded growth.
/// NMEA sentences are at most 82 bytes; 8192 is generous headroom.
const MAX_BUF: usize = 8192;

/// The main IO loop. Runs as a spawned Tokio task.
///
/// Uses `tokio::select! { biased; }` to prioritize:
/// 1. Cancellation
/// 2. Handler commands
/// 3. Raw writes
/// 4. Idle line reading
async fn io_loop<H: LineHandler>(
    mut transport: Box<dyn Transport>,
    config: IoConfig,
    mut handler: H,
    mut cmd_rx: mpsc::Receiver<H::Command>,
    mut write_rx: mpsc::Receiver<WriteRequest>,
    cancel: CancellationToken,
) -> (Box<dyn Transport>, H) {
    let mut line_buf = Vec::new();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                if !line_buf.is_empty() {
                    debug!(pending = line_buf.len(), "discarding partial line");
                }
                debug!("line IO task cancelled");
                break;
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(cmd) => handler.handle_command(cmd, &mut *transport).await,
                    None => {
                        debug!("command channel closed, exiting line IO task");
                        break;
                    }
                }
            }

            Some(req) = write_rx.recv() => {
                let result = transport.send(&req.data).await;
                if let Err(ref e) = result {
                    debug!(error = %e, bytes = req.data.len(), "raw write failed");
                }
                if let Some(reply) = req.reply {
                    let _ = reply.send(result);
                }
            }

            // Idle: read whatever the instrument sends.
            _ = async {
                let mut buf = [0u8; 256];
                match transport.receive(&mut buf, config.poll_timeout).await {
                    Ok(n) if n > 0 => {
                        line_buf.extend_from_slice(&buf[..n]);
                        if line_buf.len() > MAX_BUF {
                            tracing::warn!(
                                len = line_buf.len(),
                                "line buffer overflow, resetting"
                            );
                            line_buf.clear();
                            return;
                        }
                        if config.read_enabled {
                            deliver_lines(&mut line_buf, &mut handler);
                        } else {
                            drain_lines(&mut line_buf);
                        }
                    }
                    _ => {
                        // Timeout or error: yield briefly so the loop
                        // can check for commands or cancellation.
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            } => {}
        }
    }

    (transport, handler)
}

// ---------------------------------------------------------------------------
// Line processing
// ---------------------------------------------------------------------------

/// Hand every complete line in `buf` to the handler.
///
/// Incomplete data is left in the buffer for the next read cycle.
fn deliver_lines<H: LineHandler>(buf: &mut Vec<u8>, handler: &mut H) {
    loop {
        match protocol::decode_line(buf) {
            DecodeResult::Line { text, consumed } => {
                buf.drain(..consumed);
                if !text.is_empty() {
                    handler.line_received(&text);
                }
            }
            DecodeResult::Invalid(consumed) => {
                buf.drain(..consumed);
                trace!("discarding line that is not valid UTF-8");
            }
            DecodeResult::Incomplete => break,
        }
    }
}

/// Drop complete lines without delivering them.
fn drain_lines(buf: &mut Vec<u8>) {
    loop {
        match protocol::decode_line(buf) {
            DecodeResult::Line { consumed, .. } | DecodeResult::Invalid(consumed) => {
                buf.drain(..consumed);
            }
            DecodeResult::Incomplete => break,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use glidelink_test_harness::MockTransport;

    /// Forwards lines to the test and answers `Echo` commands by writing
    /// the payload to the transport.
    struct Recorder {
        lines: mpsc::UnboundedSender<String>,
        count: usize,
    }

    enum TestCommand {
        Echo {
            payload: Vec<u8>,
            reply: oneshot::Sender<Result<()>>,
        },
        Count {
            reply: oneshot::Sender<usize>,
        },
    }

    #[async_trait]
    impl LineHandler for Recorder {
        type Command = TestCommand;

        fn line_received(&mut self, line: &str) {
            self.count += 1;
            let _ = self.lines.send(line.to_string());
        }

        async fn handle_command(&mut self, command: TestCommand, transport: &mut dyn Transport) {
            match command {
                TestCommand::Echo { payload, reply } => {
                    let _ = reply.send(transport.send(&payload).await);
                }
                TestCommand::Count { reply } => {
                    let _ = reply.send(self.count);
                }
            }
        }
    }

    fn recorder() -> (Recorder, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Recorder { lines: tx, count: 0 }, rx)
    }

    async fn next_line(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for line")
            .expect("line channel closed")
    }

    // =======================================================================
    // Line delivery
    // =======================================================================

    #[tokio::test]
    async fn delivers_lines_in_order() {
        let mock = MockTransport::relaxed();
        let handle = mock.handle();
        handle.push_incoming(b"$PGRMZ,1000,f,3*00\r\n$GPGSA,A,3");
        handle.push_incoming(b",04*00\r\n");

        let (recorder, mut rx) = recorder();
        let io = spawn_line_task(Box::new(mock), IoConfig::default(), recorder);

        assert_eq!(next_line(&mut rx).await, "$PGRMZ,1000,f,3*00");
        assert_eq!(next_line(&mut rx).await, "$GPGSA,A,3,04*00");

        let _ = io.shutdown().await;
    }

    #[tokio::test]
    async fn empty_lines_are_skipped() {
        let mock = MockTransport::relaxed();
        mock.handle().push_incoming(b"\r\n\r\nabc\r\n");

        let (recorder, mut rx) = recorder();
        let io = spawn_line_task(Box::new(mock), IoConfig::default(), recorder);
        assert_eq!(next_line(&mut rx).await, "abc");

        let count = io.request(|reply| TestCommand::Count { reply }).await.unwrap();
        assert_eq!(count, 1);
        let _ = io.shutdown().await;
    }

    #[tokio::test]
    async fn read_disabled_discards_input() {
        let mock = MockTransport::relaxed();
        let handle = mock.handle();
        handle.push_line("$GPGGA,1*00");

        let (recorder, _rx) = recorder();
        let config = IoConfig {
            read_enabled: false,
            ..IoConfig::default()
        };
        let io = spawn_line_task(Box::new(mock), config, recorder);

        while !handle.incoming_drained() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let count = io.request(|reply| TestCommand::Count { reply }).await.unwrap();
        assert_eq!(count, 0);
        let _ = io.shutdown().await;
    }

    #[tokio::test]
    async fn overflow_resets_buffer() {
        let mock = MockTransport::relaxed();
        let handle = mock.handle();
        for _ in 0..40 {
            handle.push_incoming(&[b'A'; 256]);
        }
        handle.push_incoming(b"\r\nafter\r\n");

        let (recorder, mut rx) = recorder();
        let io = spawn_line_task(Box::new(mock), IoConfig::default(), recorder);

        // The garbage overflowed and was dropped; the tail of it forms an
        // unterminated fragment that is completed by the first CR LF.
        let first = next_line(&mut rx).await;
        assert!(first.chars().all(|c| c == 'A'));
        assert!(first.len() < MAX_BUF);
        assert_eq!(next_line(&mut rx).await, "after");
        let _ = io.shutdown().await;
    }

    // =======================================================================
    // Commands and writes
    // =======================================================================

    #[tokio::test]
    async fn command_gets_transport_access() {
        let mock = MockTransport::relaxed();
        let handle = mock.handle();
        let (recorder, _rx) = recorder();
        let io = spawn_line_task(Box::new(mock), IoConfig::default(), recorder);

        let result = io
            .request(|reply| TestCommand::Echo {
                payload: b"$PDVMC,1*00\r\n".to_vec(),
                reply,
            })
            .await
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(handle.sent_bytes(), b"$PDVMC,1*00\r\n");
        let _ = io.shutdown().await;
    }

    #[tokio::test]
    async fn writer_forwards_raw_bytes() {
        let mock = MockTransport::relaxed();
        let handle = mock.handle();
        let (recorder, _rx) = recorder();
        let io = spawn_line_task(Box::new(mock), IoConfig::default(), recorder);

        let writer = io.writer();
        assert!(writer.try_write(b"one\r\n".to_vec()));
        writer.write(b"two\r\n".to_vec()).await.unwrap();
        assert_eq!(handle.sent_bytes(), b"one\r\ntwo\r\n");
        let _ = io.shutdown().await;
    }

    #[tokio::test]
    async fn write_error_is_reported() {
        let mock = MockTransport::new();
        let (recorder, _rx) = recorder();
        let io = spawn_line_task(Box::new(mock), IoConfig::default(), recorder);

        let result = io.write(b"unexpected".to_vec()).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
        let _ = io.shutdown().await;
    }

    // =======================================================================
    // Shutdown
    // =======================================================================

    #[tokio::test]
    async fn shutdown_recovers_transport_and_handler() {
        let mock = MockTransport::relaxed();
        mock.handle().push_line("abc");
        let (recorder, mut rx) = recorder();
        let io = spawn_line_task(Box::new(mock), IoConfig::default(), recorder);
        next_line(&mut rx).await;

        let (transport, handler) = io.shutdown().await.unwrap();
        assert!(transport.is_connected());
        assert_eq!(handler.count, 1);
    }

    #[tokio::test]
    async fn restart_starts_with_empty_line_buffer() {
        let mock = MockTransport::relaxed();
        let handle = mock.handle();
        handle.push_incoming(b"abc\r\n$GPGGA,12");
        let (recorder, mut rx) = recorder();
        let io = spawn_line_task(Box::new(mock), IoConfig::default(), recorder);
        assert_eq!(next_line(&mut rx).await, "abc");
        while !handle.incoming_drained() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let (transport, handler) = io.shutdown().await.unwrap();
        assert_eq!(handler.count, 1);

        // The unterminated fragment read before shutdown is gone.
        handle.push_incoming(b"34*00\r\nnext\r\n");
        let io = spawn_line_task(transport, IoConfig::default(), handler);
        assert_eq!(next_line(&mut rx).await, "34*00");
        assert_eq!(next_line(&mut rx).await, "next");
        let _ = io.shutdown().await;
    }

    #[tokio::test]
    async fn writer_closed_after_shutdown() {
        let mock = MockTransport::relaxed();
        let (recorder, _rx) = recorder();
        let io = spawn_line_task(Box::new(mock), IoConfig::default(), recorder);
        let writer = io.writer();

        let _ = io.shutdown().await.unwrap();
        assert!(writer.is_closed());
        assert!(!writer.try_write(b"late".to_vec()));
        assert!(matches!(
            writer.write(b"late".to_vec()).await,
            Err(Error::NotConnected)
        ));
    }
}
