//! Vega vario driver for glidelink.
//!
//! The Vega speaks NMEA with a family of proprietary `$PD...` sentences:
//!
//! - **Sentence parsers** ([`sentences`]) -- `$PDSWC` (MacCready, switches,
//!   battery), `$PDVDV` (vario, airspeeds, pressure altitude), `$PDVDS`
//!   (acceleration, stall ratio, netto), `$PDVVT` (temperature, humidity),
//!   `$PDVSC` (configuration values), `$PDAAV`, and the text messages
//!   `$PDTSM`/`$PDVSD`.
//! - **Driver** ([`driver`]) -- [`VegaDriver`], which also writes the
//!   `$PDVMC` telemetry sentence back to the vario on QNH changes and
//!   periodic ticks, and forwards voice sentences.
//!
//! # Example
//!
//! ```
//! use glidelink_core::{Driver, NavInfo};
//! use glidelink_vega::VegaDriver;
//!
//! let mut vega = VegaDriver::new();
//! let mut info = NavInfo::default();
//! assert!(vega.parse_line("$PDVDV,12,340,1100,523*00", &mut info));
//! assert_eq!(info.total_energy_vario, Some(1.2));
//! ```

pub mod driver;
pub mod sentences;

pub use driver::{VEGA, VegaDriver};
pub use sentences::{SwitchEdge, switch_edges};
