//! Line framing for text-protocol channels.
//!
//! Instruments terminate every sentence with `\n`, usually preceded by
//! `\r`. Anything that is not valid UTF-8 is dropped as a whole line.

/// The byte that terminates every line.
pub const TERMINATOR: u8 = b'\n';

/// Result of attempting to decode one line from a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// A complete line was decoded (terminator and trailing `\r` removed).
    Line {
        text: String,
        /// Number of bytes consumed from the input buffer.
        consumed: usize,
    },

    /// A complete line was found but could not be decoded; skip `consumed`
    /// bytes.
    Invalid(usize),

    /// The buffer does not yet contain a complete line.
    Incomplete,
}

/// Decode one line from the front of `buf`.
pub fn decode_line(buf: &[u8]) -> DecodeResult {
    let Some(term_pos) = buf.iter().position(|&b| b == TERMINATOR) else {
        return DecodeResult::Incomplete;
    };

    let consumed = term_pos + 1;
    let mut body = &buf[..term_pos];
    while let [rest @ .., b'\r'] = body {
        body = rest;
    }

    match std::str::from_utf8(body) {
        Ok(text) => DecodeResult::Line {
            text: text.to_string(),
            consumed,
        },
        Err(_) => DecodeResult::Invalid(consumed),
    }
}
