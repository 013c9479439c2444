//! NMEA 0183 support shared by every glidelink text-protocol driver.
//!
//! # Architecture
//!
//! - [`checksum`] -- XOR checksum, validation and outbound sentence framing
//! - [`input_line`] -- comma-separated field tokenizer ([`InputLine`])
//! - [`parser`] -- the generic multi-vendor fallback parser ([`NmeaParser`])

pub mod checksum;
pub mod input_line;
pub mod parser;

pub use checksum::{checksum, format_sentence, sentence_type, verify_checksum};
pub use input_line::InputLine;
pub use parser::NmeaParser;
