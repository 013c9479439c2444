//! Shared receive-loop task for line-oriented instrument channels.
//!
//! This crate provides the single-IO-task pattern for newline-terminated
//! text protocols. One tokio task owns the transport exclusively, splits
//! incoming bytes into lines for a [`LineHandler`], executes the handler's
//! commands with exclusive transport access, forwards pass-through writes,
//! and hands the transport and handler back on shutdown.
//!
//! # Architecture
//!
//! - [`protocol`] -- line framing over a byte buffer
//! - [`io`] -- IO task types, spawn, and the select loop

pub mod io;
pub mod protocol;

pub use io::{IoConfig, LineHandler, LineIo, LineWriter, spawn_line_task};
pub use protocol::{DecodeResult, decode_line};
