//! Field tokenizer for comma-separated sentences.
//!
//! [`InputLine`] walks the fields of one sentence left to right. The
//! checksum trailer (`*hh`) is cut off on construction, so drivers can hand
//! it the raw line they received.

/// A cursor over the comma-separated fields of one sentence.
#[derive(Debug, Clone)]
pub struct InputLine<'a> {
    rest: Option<&'a str>,
}

impl<'a> InputLine<'a> {
    pub fn new(line: &'a str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        let line = match line.rfind('*') {
            Some(star) => &line[..star],
            None => line,
        };
        InputLine { rest: Some(line) }
    }

    /// Next field; empty once the line is exhausted.
    pub fn read(&mut self) -> &'a str {
        let Some(rest) = self.rest else {
            return "";
        };
        match rest.split_once(',') {
            Some((field, tail)) => {
                self.rest = Some(tail);
                field
            }
            None => {
                self.rest = None;
                rest
            }
        }
    }

    pub fn skip(&mut self) {
        self.read();
    }

    pub fn skip_n(&mut self, n: usize) {
        for _ in 0..n {
            self.read();
        }
    }

    /// Next field as a number; `None` if empty or not a number.
    pub fn read_f64(&mut self) -> Option<f64> {
        self.read().trim().parse().ok()
    }

    /// Next field as a number, or `default`.
    pub fn read_f64_or(&mut self, default: f64) -> f64 {
        self.read_f64().unwrap_or(default)
    }

    pub fn read_i64(&mut self) -> Option<i64> {
        self.read().trim().parse().ok()
    }

    /// Next field as a hexadecimal number.
    pub fn read_hex(&mut self) -> Option<i64> {
        i64::from_str_radix(self.read().trim(), 16).ok()
    }

    /// First character of the next field.
    pub fn read_char(&mut self) -> Option<char> {
        self.read().chars().next()
    }

    /// Everything not yet read, commas included.
    pub fn rest(&self) -> &'a str {
        self.rest.unwrap_or("")
    }

    pub fn is_exhausted(&self) -> bool {
        self.rest.is_none()
    }
}
