//! One connected conversation with a Volkslogger.
//!
//! A [`Session`] borrows the port for the duration of a bulk operation and
//! layers the logger's high-level requests (info, directory, flight log,
//! database) over the framing in [`protocol`](crate::protocol).

use std::time::Duration;

use glidelink_core::error::{Error, Result};
use glidelink_core::progress::ProgressSink;
use glidelink_core::transport::Transport;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::database::{DATABASE_SIZE, Database};
use crate::directory::{DirectoryEntry, parse_directory};
use crate::protocol::{self, ACK_TIMEOUT, BASE_BAUD_RATE, Command};

/// Size of the logger's flight memory.
pub const LOG_MEMORY_SIZE: usize = 81920;

const INFO_TIMEOUT: Duration = Duration::from_secs(2);
const DIRECTORY_TIMEOUT: Duration = Duration::from_secs(10);
const DATABASE_TIMEOUT: Duration = Duration::from_secs(10);
const FLIGHT_TIMEOUT: Duration = Duration::from_secs(60);
const SIGNATURE_TIMEOUT: Duration = Duration::from_secs(2);
/// Pause the logger needs between two bulk reads.
const BULK_SETTLE: Duration = Duration::from_millis(300);

/// Identification block returned by the info command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggerInfo {
    pub session_id: u16,
    pub serial: u16,
    pub firmware_major: u8,
    pub firmware_minor: u8,
    pub firmware_build: u8,
}

impl LoggerInfo {
    fn parse(block: &[u8]) -> Result<LoggerInfo> {
        if block.len() < 8 {
            return Err(Error::Protocol(format!(
                "info block has {} bytes, expected 8",
                block.len()
            )));
        }
        Ok(LoggerInfo {
            session_id: u16::from_be_bytes([block[0], block[1]]),
            serial: u16::from_be_bytes([block[2], block[3]]),
            firmware_major: block[4] / 16,
            firmware_minor: block[4] % 16,
            firmware_build: block[7],
        })
    }
}

pub struct Session<'a> {
    port: &'a mut dyn Transport,
    /// Line speed for the bulk phase of large reads.
    data_baud: u32,
    present: bool,
}

impl<'a> Session<'a> {
    pub fn new(port: &'a mut dyn Transport) -> Self {
        Session {
            port,
            data_baud: BASE_BAUD_RATE,
            present: false,
        }
    }

    pub fn with_data_baud(mut self, baud_rate: u32) -> Self {
        self.data_baud = baud_rate;
        self
    }

    /// Whether the last handshake succeeded and the session is not closed.
    pub fn is_present(&self) -> bool {
        self.present
    }

    pub async fn connect(&mut self, timeout: Duration) -> Result<()> {
        protocol::connect(self.port, timeout).await?;
        self.present = true;
        Ok(())
    }

    /// Connect, giving the pilot a second, longer chance to switch the
    /// logger on.
    pub async fn still_connect(&mut self) -> Result<()> {
        if let Err(e) = self.connect(Duration::from_secs(4)).await {
            debug!(error = %e, "volkslogger did not answer, retrying");
            self.connect(Duration::from_secs(10)).await?;
        }
        Ok(())
    }

    pub async fn read_info(&mut self) -> Result<LoggerInfo> {
        let block =
            protocol::send_command_read_bulk(self.port, Command::Info, 0, 64, INFO_TIMEOUT).await?;
        let info = LoggerInfo::parse(&block)?;
        info!(
            serial = info.serial,
            firmware = %format!("{}.{}", info.firmware_major, info.firmware_minor),
            build = info.firmware_build,
            "volkslogger identified"
        );
        Ok(info)
    }

    /// The flight directory, most recent flight first.
    pub async fn read_directory(&mut self) -> Result<Vec<DirectoryEntry>> {
        let block = protocol::send_command_read_bulk(
            self.port,
            Command::Directory,
            0,
            LOG_MEMORY_SIZE,
            DIRECTORY_TIMEOUT,
        )
        .await?;
        let entries = parse_directory(&block);
        debug!(flights = entries.len(), "volkslogger directory read");
        Ok(entries)
    }

    /// The binary log of flight `index` followed by its signature block.
    pub async fn read_flight(&mut self, index: usize, secure: bool) -> Result<Vec<u8>> {
        let p1 = u8::try_from(index)
            .map_err(|_| Error::InvalidParameter(format!("flight index {index}")))?;
        let command = if secure {
            Command::FlightSecure
        } else {
            Command::FlightPlain
        };

        let mut log = protocol::send_command_read_bulk_at(
            self.port,
            command,
            p1,
            self.data_baud,
            LOG_MEMORY_SIZE,
            FLIGHT_TIMEOUT,
        )
        .await?;
        if log.is_empty() {
            return Err(Error::Protocol(format!("flight {index} is empty")));
        }
        sleep(BULK_SETTLE).await;

        let signature = protocol::send_command_read_bulk_at(
            self.port,
            Command::Signature,
            0,
            self.data_baud,
            LOG_MEMORY_SIZE - log.len(),
            SIGNATURE_TIMEOUT,
        )
        .await?;
        if signature.is_empty() {
            return Err(Error::Protocol(format!("flight {index} has no signature")));
        }

        debug!(index, log = log.len(), signature = signature.len(), "flight read");
        log.extend_from_slice(&signature);
        Ok(log)
    }

    pub async fn read_database(&mut self) -> Result<Database> {
        let block = protocol::send_command_read_bulk_at(
            self.port,
            Command::ReadDatabase,
            0,
            self.data_baud,
            DATABASE_SIZE,
            DATABASE_TIMEOUT,
        )
        .await?;
        sleep(BULK_SETTLE).await;
        if block.is_empty() {
            return Err(Error::Protocol("database block is empty".into()));
        }
        Database::decode(&block)
    }

    pub async fn write_database(
        &mut self,
        database: &Database,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        let block = database.encode()?;

        protocol::send_command(self.port, Command::PutDatabase, 0, 0).await?;
        protocol::wait_for_ack(self.port, ACK_TIMEOUT).await?;
        sleep(Duration::from_millis(100)).await;

        protocol::write_bulk(self.port, &block, progress).await?;
        protocol::wait_for_ack(self.port, ACK_TIMEOUT).await?;
        debug!(bytes = block.len(), "volkslogger database written");
        Ok(())
    }

    /// End the session; with `reset` the logger leaves transfer mode.
    pub async fn close(&mut self, reset: bool) -> Result<()> {
        if !self.present {
            return Ok(());
        }
        self.present = false;
        if reset {
            protocol::reset(self.port, 6).await?;
        }
        Ok(())
    }
}
