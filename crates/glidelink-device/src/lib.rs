//! glidelink-device: device slots and the registry that owns them.
//!
//! Each configured instrument occupies a [`DeviceSlot`]. An open slot owns a
//! receive loop (see `glidelink-line-io`) whose handler, [`SlotSession`],
//! routes every line through the [`LineDispatcher`] into the slot's record
//! on the shared [`Blackboard`], forwards it to a pass-through [`Outlet`],
//! and executes setting pushes and periodic calls against the driver.
//!
//! Bulk operations (declare, flight list, flight download) stop the receive
//! loop, run with exclusive use of the port, and restart it afterwards.
//!
//! ```no_run
//! use glidelink_core::{DeviceConfig, PortConfig};
//! use glidelink_device::DeviceRegistry;
//!
//! # async fn example() -> glidelink_core::Result<()> {
//! let registry = DeviceRegistry::builder().slots(2).build()?;
//! let report = registry
//!     .startup(&[DeviceConfig::new(
//!         PortConfig::Serial { index: 0, baud_rate: 4800 },
//!         "Generic",
//!     )])
//!     .await;
//! println!("{} device(s) open", report.opened());
//! # Ok(())
//! # }
//! ```

pub mod blackboard;
pub mod dispatcher;
pub mod drivers;
pub mod flarm;
pub mod outlet;
pub mod registry;
pub mod session;
pub mod slot;

#[cfg(test)]
mod testing;

pub use blackboard::Blackboard;
pub use dispatcher::{Dispatch, LineDispatcher};
pub use drivers::{GENERIC, GenericDriver, NMEA_OUT};
pub use outlet::Outlet;
pub use registry::{DEFAULT_SLOT_COUNT, DeviceRegistry, RegistryBuilder, SlotOutcome, StartupReport};
pub use session::{SlotCommand, SlotSession};
pub use slot::{BulkOperation, BulkOutcome, DeviceSlot};
