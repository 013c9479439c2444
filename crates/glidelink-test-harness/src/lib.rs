//! glidelink-test-harness: Mock transports and port openers for glidelink.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing of
//! protocol engines and receive loops without real instruments, and
//! [`MockPortOpener`] for driving a device registry against scripted ports.

pub mod mock_opener;
pub mod mock_transport;

pub use mock_opener::MockPortOpener;
pub use mock_transport::{MockHandle, MockTransport};
