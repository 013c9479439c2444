//! A scripted Volkslogger for tests.
//!
//! [`FakeLogger`] speaks the logger side of the bulk protocol: it answers
//! the `R`/`L` handshake, accepts CRC-checked command packets and serves
//! framed blocks one byte per `ACK`. Unlike `MockTransport` it reacts to
//! what the host sends, which the byte-pulled bulk reads need.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use glidelink_core::error::{Error, Result};
use glidelink_core::transport::Transport;
use tokio::time::Instant;

use crate::database::DATABASE_SIZE;
use crate::protocol::{ACK, CAN, Command, DLE, ENQ, ETX, STX, crc16};

/// Frame `payload` the way the logger sends it.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut block = payload.to_vec();
    block.extend_from_slice(&crc16(payload, 0).to_be_bytes());

    let mut out = vec![DLE, STX];
    for byte in block {
        if byte == DLE {
            out.push(DLE);
        }
        out.push(byte);
    }
    out.extend_from_slice(&[DLE, ETX]);
    out
}

#[derive(Debug)]
enum Receiving {
    Idle,
    Command(Vec<u8>),
    Database(Vec<u8>),
}

#[derive(Debug)]
struct State {
    responsive_at: Instant,
    receiving: Receiving,
    output: VecDeque<u8>,
    bulk: VecDeque<u8>,
    raw_response: Option<Vec<u8>>,

    info: Vec<u8>,
    directory: Vec<u8>,
    flights: Vec<Vec<u8>>,
    signature: Vec<u8>,
    database: Vec<u8>,

    sent: Vec<u8>,
    commands: Vec<(u8, u8, u8)>,
    baud_rates: Vec<u32>,
    resets: usize,
    connected: bool,
}

impl State {
    fn accept(&mut self, byte: u8) {
        match std::mem::replace(&mut self.receiving, Receiving::Idle) {
            Receiving::Database(mut data) => {
                data.push(byte);
                if data.len() < DATABASE_SIZE + 2 {
                    self.receiving = Receiving::Database(data);
                } else if crc16(&data, 0) == 0 {
                    data.truncate(DATABASE_SIZE);
                    self.database = data;
                    self.output.push_back(ACK);
                }
            }
            Receiving::Command(mut packet) => {
                packet.push(byte);
                if packet.len() < 10 {
                    self.receiving = Receiving::Command(packet);
                } else if crc16(&packet, 0) == 0 {
                    self.execute(packet[0], packet[1], packet[2]);
                }
            }
            Receiving::Idle => self.control(byte),
        }
    }

    fn control(&mut self, byte: u8) {
        let responsive = Instant::now() >= self.responsive_at;
        match byte {
            CAN => {
                self.resets += 1;
                self.bulk.clear();
            }
            b'R' if responsive => self.output.extend(b"LLLL"),
            ENQ if responsive => self.receiving = Receiving::Command(Vec::new()),
            ACK => {
                if let Some(next) = self.bulk.pop_front() {
                    self.output.push_back(next);
                }
            }
            _ => {}
        }
    }

    fn execute(&mut self, code: u8, p1: u8, p2: u8) {
        self.commands.push((code, p1, p2));
        self.output.push_back(0x00);

        let payload = match Command::from_code(code) {
            Some(Command::Info) => Some(self.info.clone()),
            Some(Command::Directory) => Some(self.directory.clone()),
            Some(Command::FlightPlain | Command::FlightSecure) => {
                Some(self.flights.get(usize::from(p1)).cloned().unwrap_or_default())
            }
            Some(Command::Signature) => Some(self.signature.clone()),
            Some(Command::ReadDatabase) => Some(self.database.clone()),
            Some(Command::PutDatabase) => {
                self.output.push_back(ACK);
                self.receiving = Receiving::Database(Vec::new());
                None
            }
            _ => None,
        };

        let block = match self.raw_response.take() {
            Some(raw) => Some(raw),
            None => payload.map(|p| frame(&p)),
        };
        if let Some(block) = block {
            self.bulk = block.into();
        }
    }
}

/// Logger side of a simulated serial link.
#[derive(Debug)]
pub struct FakeLogger {
    state: Arc<Mutex<State>>,
}

/// Inspects and scripts a [`FakeLogger`] after it has been handed out.
#[derive(Debug, Clone)]
pub struct FakeHandle {
    state: Arc<Mutex<State>>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap()
}

impl FakeLogger {
    /// A logger that answers immediately with an empty database.
    pub fn new() -> Self {
        let state = State {
            responsive_at: Instant::now(),
            receiving: Receiving::Idle,
            output: VecDeque::new(),
            bulk: VecDeque::new(),
            raw_response: None,
            info: vec![0x12, 0x34, 0x00, 0x2A, 0x35, 0, 0, 7],
            directory: vec![0xFF],
            flights: Vec::new(),
            signature: b"SIGNATURE".to_vec(),
            database: vec![0xFF; DATABASE_SIZE],
            sent: Vec::new(),
            commands: Vec::new(),
            baud_rates: Vec::new(),
            resets: 0,
            connected: true,
        };
        FakeLogger {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Ignore the handshake until `delay` has passed.
    pub fn responsive_after(self, delay: Duration) -> Self {
        lock(&self.state).responsive_at = Instant::now() + delay;
        self
    }

    pub fn handle(&self) -> FakeHandle {
        FakeHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl FakeHandle {
    pub fn set_info(&self, info: &[u8]) {
        lock(&self.state).info = info.to_vec();
    }

    pub fn set_directory(&self, directory: Vec<u8>) {
        lock(&self.state).directory = directory;
    }

    pub fn add_flight(&self, log: &[u8]) {
        lock(&self.state).flights.push(log.to_vec());
    }

    pub fn set_signature(&self, signature: &[u8]) {
        lock(&self.state).signature = signature.to_vec();
    }

    pub fn set_database(&self, database: Vec<u8>) {
        lock(&self.state).database = database;
    }

    /// Serve `raw` verbatim as the next bulk block.
    pub fn set_raw_response(&self, raw: Vec<u8>) {
        lock(&self.state).raw_response = Some(raw);
    }

    pub fn database(&self) -> Vec<u8> {
        lock(&self.state).database.clone()
    }

    pub fn raw_sent(&self) -> Vec<u8> {
        lock(&self.state).sent.clone()
    }

    pub fn commands(&self) -> Vec<(u8, u8, u8)> {
        lock(&self.state).commands.clone()
    }

    pub fn baud_rates(&self) -> Vec<u32> {
        lock(&self.state).baud_rates.clone()
    }

    pub fn resets(&self) -> usize {
        lock(&self.state).resets
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }
}

#[async_trait]
impl Transport for FakeLogger {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(Error::NotConnected);
        }
        state.sent.extend_from_slice(data);
        for &byte in data {
            state.accept(byte);
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        {
            let mut state = lock(&self.state);
            if !state.connected {
                return Err(Error::NotConnected);
            }
            if !state.output.is_empty() {
                let n = buf.len().min(state.output.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = state.output.pop_front().unwrap_or_default();
                }
                return Ok(n);
            }
        }
        tokio::time::sleep(timeout).await;
        Err(Error::Timeout)
    }

    async fn close(&mut self) -> Result<()> {
        lock(&self.state).connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    async fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        lock(&self.state).baud_rates.push(baud_rate);
        Ok(())
    }
}
