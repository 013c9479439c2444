//! The Volkslogger binary bulk-transfer protocol.
//!
//! All exchanges run on a port whose line reader has been stopped.
//!
//! - **Connect**: a burst of `CAN` resets the logger's command interpreter,
//!   then `R` is sent until the logger answers `L`; four consecutive `L`s
//!   complete the handshake.
//! - **Command**: `ENQ`, then an 8-byte packet `[cmd, p1, p2, 0, 0, 0, 0, 0]`
//!   followed by its CRC. The logger confirms with a single `0x00`.
//! - **Bulk read**: the host pulls every byte with an `ACK`. The block is
//!   framed `DLE STX ... DLE ETX`, with `DLE` in the payload doubled, and
//!   ends with a big-endian CRC-16/CCITT over the payload.
//! - **Bulk write**: raw payload in 400-byte chunks (the logger's receive
//!   buffer overruns otherwise) plus the CRC, confirmed by `ACK`.
//!
//! Every step runs against its own deadline and fails with
//! [`Error::Timeout`] instead of blocking.

use std::time::Duration;

use glidelink_core::error::{Error, Result};
use glidelink_core::progress::ProgressSink;
use glidelink_core::transport::Transport;
use tokio::time::{Instant, sleep};

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
pub const ENQ: u8 = 0x05;
pub const ACK: u8 = 0x06;
pub const DLE: u8 = 0x10;
pub const CAN: u8 = 0x18;

/// Speed the logger talks at outside of bulk transfers.
pub const BASE_BAUD_RATE: u32 = 9600;

/// How long the logger may take to confirm a command.
const COMMAND_TIMEOUT: Duration = Duration::from_millis(4000);
/// Gap allowed between two bytes of a bulk block.
const BULK_CHAR_TIMEOUT: Duration = Duration::from_millis(2000);
/// How long the logger may take to acknowledge a written block.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(30);
/// Longest wait for one `L` before sending the next `R`.
const HANDSHAKE_POLL: Duration = Duration::from_millis(500);
const RESET_INTERVAL: Duration = Duration::from_millis(2);
const WRITE_CHUNK: usize = 400;
const WRITE_THROTTLE: Duration = Duration::from_millis(100);

/// Logger command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Serial number and firmware version.
    Info = 0x00,
    /// Flight directory.
    Directory = 0x01,
    /// Flight log with MD4 hash.
    FlightPlain = 0x02,
    /// Flight log with signature.
    FlightSecure = 0x03,
    /// Signature block of the last flight read.
    Signature = 0x04,
    Reset = 0x06,
    /// Write the database block.
    PutDatabase = 0x07,
    /// Read the database block.
    ReadDatabase = 0x08,
}

impl Command {
    pub fn from_code(code: u8) -> Option<Command> {
        Some(match code {
            0x00 => Command::Info,
            0x01 => Command::Directory,
            0x02 => Command::FlightPlain,
            0x03 => Command::FlightSecure,
            0x04 => Command::Signature,
            0x06 => Command::Reset,
            0x07 => Command::PutDatabase,
            0x08 => Command::ReadDatabase,
            _ => return None,
        })
    }
}

/// Code the logger expects in `p2` to switch to `baud_rate` for the bulk
/// phase of a command.
pub fn baud_rate_code(baud_rate: u32) -> Option<u8> {
    match baud_rate {
        9600 => Some(1),
        19200 => Some(2),
        38400 => Some(3),
        57600 => Some(4),
        115200 => Some(5),
        _ => None,
    }
}

/// CRC-16/CCITT (polynomial 0x1021, MSB first) continuing from `crc`.
///
/// Running the CRC over a block followed by its own big-endian CRC yields
/// zero.
pub fn crc16(data: &[u8], mut crc: u16) -> u16 {
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

// ---------------------------------------------------------------
// Byte-level helpers
// ---------------------------------------------------------------

fn remaining(deadline: Instant) -> Result<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        Err(Error::Timeout)
    } else {
        Ok(left)
    }
}

/// Read one byte, waiting at most `timeout`.
pub async fn read_byte(port: &mut dyn Transport, timeout: Duration) -> Result<u8> {
    let deadline = Instant::now() + timeout;
    let mut byte = [0u8; 1];
    loop {
        let left = remaining(deadline)?;
        if port.receive(&mut byte, left).await? == 1 {
            return Ok(byte[0]);
        }
    }
}

/// Skip input until `expected` arrives.
pub async fn wait_for_byte(port: &mut dyn Transport, expected: u8, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let left = remaining(deadline)?;
        if read_byte(port, left).await? == expected {
            return Ok(());
        }
    }
}

/// Discard input until the line has been quiet for `quiet`, or for at
/// most `limit`.
pub async fn drain_input(port: &mut dyn Transport, quiet: Duration, limit: Duration) -> Result<()> {
    let deadline = Instant::now() + limit;
    let mut buf = [0u8; 64];
    while let Ok(left) = remaining(deadline) {
        match port.receive(&mut buf, quiet.min(left)).await {
            Ok(_) => continue,
            Err(Error::Timeout) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------
// Connection
// ---------------------------------------------------------------

/// Abort whatever the logger is doing by sending `count` `CAN`s.
pub async fn reset(port: &mut dyn Transport, count: usize) -> Result<()> {
    for _ in 0..count {
        port.send(&[CAN]).await?;
        sleep(RESET_INTERVAL).await;
    }
    Ok(())
}

/// Send `R` until the logger answers with four consecutive `L`s.
pub async fn handshake(port: &mut dyn Transport, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;

    loop {
        port.send(b"R").await?;
        let left = remaining(deadline)?;
        match wait_for_byte(port, b'L', left.min(HANDSHAKE_POLL)).await {
            Ok(()) => break,
            Err(Error::Timeout) => continue,
            Err(e) => return Err(e),
        }
    }

    let mut count = 1;
    while count < 4 {
        let left = remaining(deadline)?;
        if read_byte(port, left).await? == b'L' {
            count += 1;
        } else {
            count = 0;
        }
    }
    Ok(())
}

/// Establish the connection within `timeout`.
pub async fn connect(port: &mut dyn Transport, timeout: Duration) -> Result<()> {
    port.flush().await?;
    reset(port, 10).await?;
    handshake(port, timeout).await?;
    drain_input(port, Duration::from_millis(50), Duration::from_millis(300)).await
}

// ---------------------------------------------------------------
// Commands
// ---------------------------------------------------------------

/// Send one command and wait for the logger to accept it.
pub async fn send_command(port: &mut dyn Transport, command: Command, p1: u8, p2: u8) -> Result<()> {
    drain_input(port, Duration::from_millis(20), Duration::from_millis(100)).await?;
    reset(port, 6).await?;

    port.send(&[ENQ]).await?;
    sleep(RESET_INTERVAL).await;

    let packet = [command as u8, p1, p2, 0, 0, 0, 0, 0];
    let crc = crc16(&packet, 0);
    let mut frame = packet.to_vec();
    frame.extend_from_slice(&crc.to_be_bytes());
    port.send(&frame).await?;

    match read_byte(port, COMMAND_TIMEOUT).await? {
        0 => Ok(()),
        other => Err(Error::Protocol(format!(
            "logger rejected command {command:?} with {other:#04x}"
        ))),
    }
}

/// Wait for the logger's `ACK` after a write.
pub async fn wait_for_ack(port: &mut dyn Transport, timeout: Duration) -> Result<()> {
    wait_for_byte(port, ACK, timeout).await
}

/// Pull one framed block of at most `max_length` payload bytes.
///
/// `first_char_timeout` covers the logger's preparation time before the
/// first byte; later bytes must follow within two seconds.
pub async fn read_bulk(
    port: &mut dyn Transport,
    max_length: usize,
    first_char_timeout: Duration,
) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut crc = 0u16;
    let mut escaped = false;
    let mut started = false;
    let mut timeout = first_char_timeout;

    loop {
        port.send(&[ACK]).await?;
        let ch = read_byte(port, timeout).await?;
        timeout = BULK_CHAR_TIMEOUT;

        if escaped {
            escaped = false;
            match ch {
                STX => {
                    started = true;
                    data.clear();
                    crc = 0;
                    continue;
                }
                ETX if started => break,
                ETX => continue,
                // DLE DLE is a literal DLE
                _ => {}
            }
        } else if ch == DLE {
            escaped = true;
            continue;
        }

        if started {
            if data.len() == max_length + 2 {
                return Err(Error::Protocol(format!(
                    "bulk block exceeds {max_length} bytes"
                )));
            }
            data.push(ch);
            crc = crc16(&[ch], crc);
        }
    }

    sleep(Duration::from_millis(100)).await;

    if crc != 0 {
        return Err(Error::Checksum("bulk block CRC mismatch".into()));
    }
    data.truncate(data.len().saturating_sub(2));
    Ok(data)
}

/// Push `data` followed by its CRC.
pub async fn write_bulk(
    port: &mut dyn Transport,
    data: &[u8],
    progress: &dyn ProgressSink,
) -> Result<()> {
    progress.set_range(data.len() as u32);
    let mut crc = 0u16;
    let mut written = 0;

    for chunk in data.chunks(WRITE_CHUNK) {
        port.send(chunk).await?;
        crc = crc16(chunk, crc);
        written += chunk.len();
        progress.set_position(written as u32);
        sleep(WRITE_THROTTLE).await;
    }

    port.send(&crc.to_be_bytes()).await
}

/// Send `command` and read the block it returns.
pub async fn send_command_read_bulk(
    port: &mut dyn Transport,
    command: Command,
    p1: u8,
    max_length: usize,
    first_char_timeout: Duration,
) -> Result<Vec<u8>> {
    send_command(port, command, p1, 0).await?;
    read_bulk(port, max_length, first_char_timeout).await
}

/// Like [`send_command_read_bulk`], with the bulk phase at `baud_rate`.
///
/// Ports that cannot change speed run the whole exchange at the base rate.
/// The port is switched back to the base rate afterwards.
pub async fn send_command_read_bulk_at(
    port: &mut dyn Transport,
    command: Command,
    p1: u8,
    baud_rate: u32,
    max_length: usize,
    first_char_timeout: Duration,
) -> Result<Vec<u8>> {
    let code = baud_rate_code(baud_rate)
        .ok_or_else(|| Error::InvalidParameter(format!("unsupported bulk baud rate {baud_rate}")))?;

    let switch = port.set_baud_rate(BASE_BAUD_RATE).await.is_ok();
    if !switch {
        return send_command_read_bulk(port, command, p1, max_length, first_char_timeout).await;
    }

    send_command(port, command, p1, code).await?;
    port.set_baud_rate(baud_rate).await?;
    // The logger needs a moment after switching.
    sleep(Duration::from_millis(300)).await;

    let result = read_bulk(port, max_length, first_char_timeout).await;
    let restored = port.set_baud_rate(BASE_BAUD_RATE).await;
    let data = result?;
    restored?;
    Ok(data)
}
