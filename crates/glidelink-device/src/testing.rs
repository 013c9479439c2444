//! A scripted driver shared by the slot and registry tests.
//!
//! `$PTST,MC,<v>` reports a MacCready setting; MacCready pushes are written
//! back as the same sentence. Bulk operations answer from fixed data.

use async_trait::async_trait;

use glidelink_core::config::DeviceConfig;
use glidelink_core::driver::{Driver, DriverDescriptor, DriverFlags};
use glidelink_core::error::{Error, Result};
use glidelink_core::progress::ProgressSink;
use glidelink_core::settings::Stamped;
use glidelink_core::transport::Transport;
use glidelink_core::types::{
    BrokenDate, BrokenTime, Declaration, DerivedInfo, NavInfo, RecordedFlight,
};
use glidelink_nmea::{InputLine, format_sentence};

pub struct TestDriver;

pub fn mac_cready_sentence(value: f64) -> String {
    format_sentence(&format!("PTST,MC,{value:.1}"))
}

pub fn flight(index: usize) -> RecordedFlight {
    RecordedFlight {
        index,
        date: BrokenDate::new(2024, 8, 1),
        start_time: BrokenTime::new(10, 0, 0),
        end_time: BrokenTime::new(12, 0, 0),
        pilot: "Jo".into(),
        competition_id: "T1".into(),
    }
}

#[async_trait]
impl Driver for TestDriver {
    fn parse_line(&mut self, line: &str, info: &mut NavInfo) -> bool {
        let mut input = InputLine::new(line);
        if input.read() != "$PTST" || input.read() != "MC" {
            return false;
        }
        if let Some(value) = input.read_f64() {
            info.settings.mac_cready = Some(Stamped::new(value, info.clock));
        }
        true
    }

    async fn put_mac_cready(&mut self, port: &mut dyn Transport, value: f64) -> Result<()> {
        port.send(mac_cready_sentence(value).as_bytes()).await
    }

    async fn on_tick(
        &mut self,
        port: &mut dyn Transport,
        _basic: &NavInfo,
        _derived: &DerivedInfo,
    ) -> Result<()> {
        port.send(b"TICK\r\n").await
    }

    async fn link_timeout(&mut self, port: &mut dyn Transport) -> Result<()> {
        port.send(b"WAKE\r\n").await
    }

    async fn declare(
        &mut self,
        port: &mut dyn Transport,
        declaration: &Declaration,
        _progress: &dyn ProgressSink,
    ) -> Result<()> {
        if declaration.turnpoints.is_empty() {
            return Err(Error::InvalidParameter("empty task".into()));
        }
        port.send(b"DECLARE\r\n").await
    }

    async fn read_flight_list(
        &mut self,
        _port: &mut dyn Transport,
        _progress: &dyn ProgressSink,
    ) -> Result<Vec<RecordedFlight>> {
        Ok(vec![flight(0), flight(1)])
    }

    async fn download_flight(
        &mut self,
        _port: &mut dyn Transport,
        flight: &RecordedFlight,
        _progress: &dyn ProgressSink,
    ) -> Result<Vec<u8>> {
        match flight.index {
            0 | 1 => Ok(format!("flight {}", flight.index).into_bytes()),
            _ => Err(Error::Timeout),
        }
    }
}

fn create(_config: &DeviceConfig) -> Box<dyn Driver> {
    Box::new(TestDriver)
}

pub static TEST: DriverDescriptor = DriverDescriptor {
    name: "Test",
    display_name: "Test Instrument",
    flags: DriverFlags::DECLARE.union(DriverFlags::LOGGER),
    factory: Some(create),
};
