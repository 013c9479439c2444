//! The [`Driver`] trait -- the per-instrument capability set.
//!
//! A driver translates between one instrument family's protocol and the
//! glidelink data model. The slot owning the driver hands it the transport
//! for every outbound operation, so a driver never holds a port of its own
//! and can be moved between the streaming receive loop and a bulk
//! operation without rebinding.
//!
//! Every method has a default: parsing recognizes nothing, settings pushes
//! succeed without writing, and bulk operations report
//! [`Error::Unsupported`]. Drivers override what their instrument can do.
//!
//! Drivers are registered through a static [`DriverDescriptor`]; the
//! registry looks descriptors up by name and calls the factory to build a
//! fresh instance for each slot.

use std::fmt;
use std::ops::BitOr;

use async_trait::async_trait;

use crate::config::DeviceConfig;
use crate::error::{Error, Result};
use crate::progress::ProgressSink;
use crate::transport::Transport;
use crate::types::{Declaration, DerivedInfo, NavInfo, RadioFrequency, RecordedFlight};

/// Instrument driver.
#[async_trait]
pub trait Driver: Send {
    /// Run the instrument's own open sequence on a freshly opened port.
    async fn open(&mut self, _port: &mut dyn Transport) -> Result<()> {
        Ok(())
    }

    /// Parse one line into `info`.
    ///
    /// Returns `true` if the sentence was recognized. A driver that returns
    /// `false` must leave `info` untouched.
    fn parse_line(&mut self, _line: &str, _info: &mut NavInfo) -> bool {
        false
    }

    /// Push a MacCready value (m/s).
    async fn put_mac_cready(&mut self, _port: &mut dyn Transport, _value: f64) -> Result<()> {
        Ok(())
    }

    /// Push a bug factor (1.0 = clean).
    async fn put_bugs(&mut self, _port: &mut dyn Transport, _value: f64) -> Result<()> {
        Ok(())
    }

    /// Push a ballast fraction (0.0..=1.0).
    async fn put_ballast(&mut self, _port: &mut dyn Transport, _fraction: f64) -> Result<()> {
        Ok(())
    }

    /// Push QNH (hPa). `derived` carries the values some instruments want
    /// in the same sentence.
    async fn put_qnh(
        &mut self,
        _port: &mut dyn Transport,
        _qnh: f64,
        _derived: &DerivedInfo,
    ) -> Result<()> {
        Ok(())
    }

    /// Push audio volume (percent).
    async fn put_volume(&mut self, _port: &mut dyn Transport, _volume: u8) -> Result<()> {
        Ok(())
    }

    async fn put_active_frequency(
        &mut self,
        _port: &mut dyn Transport,
        _frequency: RadioFrequency,
    ) -> Result<()> {
        Ok(())
    }

    async fn put_standby_frequency(
        &mut self,
        _port: &mut dyn Transport,
        _frequency: RadioFrequency,
    ) -> Result<()> {
        Ok(())
    }

    /// Send a voice prompt sentence.
    async fn put_voice(&mut self, _port: &mut dyn Transport, _sentence: &str) -> Result<()> {
        Ok(())
    }

    /// Periodic tick with the merged navigation state.
    async fn on_tick(
        &mut self,
        _port: &mut dyn Transport,
        _basic: &NavInfo,
        _derived: &DerivedInfo,
    ) -> Result<()> {
        Ok(())
    }

    /// No line has arrived within the watchdog deadline.
    async fn link_timeout(&mut self, _port: &mut dyn Transport) -> Result<()> {
        Ok(())
    }

    /// Upload a task declaration.
    async fn declare(
        &mut self,
        _port: &mut dyn Transport,
        _declaration: &Declaration,
        _progress: &dyn ProgressSink,
    ) -> Result<()> {
        Err(Error::Unsupported("task declaration".into()))
    }

    /// Read the directory of recorded flights.
    async fn read_flight_list(
        &mut self,
        _port: &mut dyn Transport,
        _progress: &dyn ProgressSink,
    ) -> Result<Vec<RecordedFlight>> {
        Err(Error::Unsupported("flight list".into()))
    }

    /// Download one recorded flight as raw bytes.
    async fn download_flight(
        &mut self,
        _port: &mut dyn Transport,
        _flight: &RecordedFlight,
        _progress: &dyn ProgressSink,
    ) -> Result<Vec<u8>> {
        Err(Error::Unsupported("flight download".into()))
    }
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Capability bitmask of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriverFlags(u8);

impl DriverFlags {
    pub const NONE: DriverFlags = DriverFlags(0);
    /// The driver implements [`Driver::declare`].
    pub const DECLARE: DriverFlags = DriverFlags(1);
    /// The slot forwards other slots' lines to its port.
    pub const NMEA_OUT: DriverFlags = DriverFlags(1 << 1);
    /// The driver implements flight list and download.
    pub const LOGGER: DriverFlags = DriverFlags(1 << 2);

    pub const fn contains(self, other: DriverFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: DriverFlags) -> DriverFlags {
        DriverFlags(self.0 | other.0)
    }
}

impl BitOr for DriverFlags {
    type Output = DriverFlags;

    fn bitor(self, rhs: DriverFlags) -> DriverFlags {
        self.union(rhs)
    }
}

/// Builds a driver instance for a slot.
pub type DriverFactory = fn(&DeviceConfig) -> Box<dyn Driver>;

/// Immutable catalog entry for a driver.
pub struct DriverDescriptor {
    /// Catalog name used in configuration, e.g. `"Vega"`.
    pub name: &'static str,
    /// Human-readable name for messages.
    pub display_name: &'static str,
    pub flags: DriverFlags,
    /// `None` for slots that only carry pass-through output.
    pub factory: Option<DriverFactory>,
}

impl DriverDescriptor {
    pub fn supports_declare(&self) -> bool {
        self.flags.contains(DriverFlags::DECLARE)
    }

    pub fn supports_nmea_out(&self) -> bool {
        self.flags.contains(DriverFlags::NMEA_OUT)
    }

    pub fn is_logger(&self) -> bool {
        self.flags.contains(DriverFlags::LOGGER)
    }

    /// Build a driver for `config`, if this descriptor has a factory.
    pub fn create(&self, config: &DeviceConfig) -> Option<Box<dyn Driver>> {
        self.factory.map(|factory| factory(config))
    }
}

impl fmt::Debug for DriverDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverDescriptor")
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .field("flags", &self.flags)
            .field("factory", &self.factory.is_some())
            .finish()
    }
}
