//! Volkslogger flight recorder driver for glidelink.
//!
//! The Volkslogger does not stream navigation data; it is reached through
//! bulk operations that run on a port the device slot has stopped reading:
//!
//! - **Protocol** ([`protocol`]) -- handshake, CRC-16 command packets and
//!   the `DLE`-framed, `ACK`-paced bulk blocks.
//! - **Database** ([`database`]) -- the 16 KiB block holding waypoints,
//!   pilots, routes and the flight declaration.
//! - **Directory** ([`directory`]) -- recorded flight entries.
//! - **Session** ([`session`]) -- a connected conversation built from the
//!   above.
//! - **Driver** ([`driver`]) -- [`VolksloggerDriver`]: declare, flight list
//!   and flight download.

pub mod database;
pub mod directory;
pub mod driver;
pub mod protocol;
pub mod session;

#[cfg(test)]
mod fake;

pub use database::Database;
pub use driver::{VOLKSLOGGER, VolksloggerDriver};
pub use session::{LoggerInfo, Session};
