//! glidelink-core: Core traits, types, and error definitions for glidelink.
//!
//! This crate defines the instrument-agnostic abstractions shared by every
//! glidelink crate. Device drivers, the device registry and applications
//! depend on these types without pulling in any specific transport or
//! instrument family.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`PortOpener`] -- turns a [`PortConfig`] into a live [`Transport`]
//! - [`Driver`] / [`DriverDescriptor`] -- the per-instrument capability set
//! - [`ExternalSettings`] -- device-confirmed settings and the reconciler
//! - [`NavInfo`] / [`DerivedInfo`] -- navigation state produced and consumed
//! - [`Error`] / [`Result`] -- error handling

pub mod config;
pub mod driver;
pub mod error;
pub mod progress;
pub mod settings;
pub mod transport;
pub mod types;

pub use config::{DeviceConfig, PortConfig};
pub use driver::{Driver, DriverDescriptor, DriverFactory, DriverFlags};
pub use error::{Error, Result};
pub use progress::{NullProgress, ProgressSink};
pub use settings::{ExternalSettings, Setting, Stamped};
pub use transport::{PortOpener, Transport};
pub use types::*;
