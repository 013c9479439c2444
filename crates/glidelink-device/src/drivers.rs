//! Descriptors that need no instrument-specific driver.

use glidelink_core::config::DeviceConfig;
use glidelink_core::driver::{Driver, DriverDescriptor, DriverFlags};

/// Recognizes nothing itself; every line goes to the generic parser.
#[derive(Debug, Default)]
pub struct GenericDriver;

impl Driver for GenericDriver {}

fn create_generic(_config: &DeviceConfig) -> Box<dyn Driver> {
    Box::new(GenericDriver)
}

/// Any instrument speaking standard NMEA.
pub static GENERIC: DriverDescriptor = DriverDescriptor {
    name: "Generic",
    display_name: "Generic",
    flags: DriverFlags::NONE,
    factory: Some(create_generic),
};

/// A port that only receives lines forwarded from the other slots.
pub static NMEA_OUT: DriverDescriptor = DriverDescriptor {
    name: "NmeaOut",
    display_name: "NMEA output",
    flags: DriverFlags::NMEA_OUT,
    factory: None,
};
