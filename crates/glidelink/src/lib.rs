//! # glidelink -- instrument links for glide computers
//!
//! `glidelink` connects a glide computer to the instruments around it:
//! GPS receivers, varios, FLARM units and flight recorders on serial ports,
//! Bluetooth links or TCP bridges. It reads their NMEA streams into a shared
//! navigation record, pushes pilot settings back without echo loops, and runs
//! bulk transfers (task declaration, flight download) on loggers.
//!
//! ## Quick Start
//!
//! ```no_run
//! use glidelink::{DeviceConfig, PortConfig};
//!
//! #[tokio::main]
//! async fn main() -> glidelink::Result<()> {
//!     let registry = glidelink::registry_builder().slots(2).build()?;
//!     let report = registry
//!         .startup(&[
//!             DeviceConfig::new(PortConfig::Serial { index: 0, baud_rate: 4800 }, "Generic"),
//!             DeviceConfig::new(PortConfig::Serial { index: 1, baud_rate: 19200 }, "Vega"),
//!         ])
//!         .await;
//!     println!("{} device(s) open", report.opened());
//!
//!     registry.put_all(&glidelink::Setting::MacCready(1.5), &Default::default()).await;
//!     println!("{:?}", registry.merged().pressure_altitude);
//!
//!     registry.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                   | Purpose                                              |
//! |-------------------------|------------------------------------------------------|
//! | `glidelink-core`        | Traits ([`Driver`], [`Transport`]), types, errors    |
//! | `glidelink-nmea`        | Checksums, field reader, generic sentence parser     |
//! | `glidelink-line-io`     | Per-port receive loop and command queue              |
//! | `glidelink-transport`   | Serial and TCP listener transports                   |
//! | `glidelink-device`      | Slots, dispatcher, blackboard, registry              |
//! | `glidelink-vega`        | Vega vario driver                                    |
//! | `glidelink-volkslogger` | Volkslogger driver and bulk-transfer protocol        |
//! | **`glidelink`**         | This facade crate -- re-exports everything           |
//!
//! ## Feature Flags
//!
//! | Feature       | Enables                             | Default |
//! |---------------|-------------------------------------|---------|
//! | `vega`        | [`vega`] module                     | yes     |
//! | `volkslogger` | [`volkslogger`] module              | yes     |
//! | `full`        | All instrument drivers              | no      |

pub use glidelink_core::*;
pub use glidelink_device::{
    BulkOperation, BulkOutcome, DeviceRegistry, DeviceSlot, RegistryBuilder, SlotOutcome,
    StartupReport,
};

/// NMEA sentence helpers and the generic parser.
pub mod nmea {
    pub use glidelink_nmea::*;
}

/// Port transports and the system port opener.
pub mod ports {
    pub use glidelink_transport::*;
}

/// Device slots, dispatcher and registry.
pub mod device {
    pub use glidelink_device::*;
}

/// Vega vario driver.
///
/// Parses the `$PD...` sentence family and sends `$PDVMC` telemetry back on
/// ticks and QNH changes.
#[cfg(feature = "vega")]
pub mod vega {
    pub use glidelink_vega::*;
}

/// Volkslogger flight recorder driver.
///
/// Declares tasks and downloads flights over the Volkslogger binary
/// protocol; it does not stream navigation data.
#[cfg(feature = "volkslogger")]
pub mod volkslogger {
    pub use glidelink_volkslogger::*;
}

/// Every driver compiled into this build, generic ones first.
///
/// This is the catalog for a driver picker: the names are what
/// [`DeviceConfig::driver`] refers to.
pub fn builtin_drivers() -> Vec<&'static DriverDescriptor> {
    let mut drivers: Vec<&'static DriverDescriptor> =
        vec![&glidelink_device::GENERIC, &glidelink_device::NMEA_OUT];

    #[cfg(feature = "vega")]
    drivers.push(&vega::VEGA);

    #[cfg(feature = "volkslogger")]
    drivers.push(&volkslogger::VOLKSLOGGER);

    drivers
}

/// A [`RegistryBuilder`] whose catalog holds [`builtin_drivers`].
pub fn registry_builder() -> RegistryBuilder {
    DeviceRegistry::builder().drivers(builtin_drivers())
}
