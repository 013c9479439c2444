//! NMEA checksum helpers.
//!
//! A sentence looks like `$GPGGA,...*hh`: the checksum is the XOR of every
//! byte between the leading `$` (or `!`) and the `*`, written as two hex
//! digits.

/// XOR checksum over a sentence body (no `$`, no `*hh`).
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0, |acc, b| acc ^ b)
}

/// Whether `line` carries a `*hh` trailer matching its body.
///
/// Lines without a leading `$`/`!` or without a trailer fail.
pub fn verify_checksum(line: &str) -> bool {
    let line = line.trim_end();
    let Some(body) = line.strip_prefix('$').or_else(|| line.strip_prefix('!')) else {
        return false;
    };
    let Some((body, trailer)) = body.rsplit_once('*') else {
        return false;
    };
    if trailer.len() != 2 {
        return false;
    }
    match u8::from_str_radix(trailer, 16) {
        Ok(expected) => expected == checksum(body),
        Err(_) => false,
    }
}

/// Frame `body` as a complete outbound sentence: `$body*hh\r\n`.
pub fn format_sentence(body: &str) -> String {
    format!("${body}*{:02X}\r\n", checksum(body))
}

/// The sentence-type token: everything up to the first `,` or `*`.
///
/// `"$GPRMC,123519,A*6A"` yields `"$GPRMC"`.
pub fn sentence_type(line: &str) -> &str {
    let end = line.find([',', '*']).unwrap_or(line.len());
    line[..end].trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GGA: &str =
        "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";

    #[test]
    fn verifies_known_sentence() {
        assert!(verify_checksum(GGA));
        assert!(verify_checksum(&format!("{GGA}\r")));
    }

    #[test]
    fn rejects_corrupted_checksum() {
        let corrupted = GGA.replace("*47", "*48");
        assert!(!verify_checksum(&corrupted));
    }

    #[test]
    fn rejects_corrupted_body() {
        let corrupted = GGA.replace("545.4", "545.5");
        assert!(!verify_checksum(&corrupted));
    }

    #[test]
    fn rejects_missing_trailer() {
        assert!(!verify_checksum("$GPGGA,123519,4807.038,N"));
        assert!(!verify_checksum("$GPGGA,123519*4"));
        assert!(!verify_checksum("GPGGA,123519*47"));
    }

    #[test]
    fn format_round_trips_through_verify() {
        let sentence = format_sentence("PDVMC,15,300,0,450,10132");
        assert!(sentence.starts_with("$PDVMC,"));
        assert!(sentence.ends_with("\r\n"));
        assert!(verify_checksum(sentence.trim_end()));
    }

    #[test]
    fn sentence_type_token() {
        assert_eq!(sentence_type(GGA), "$GPGGA");
        assert_eq!(sentence_type("$PFLAU*12"), "$PFLAU");
        assert_eq!(sentence_type("$PXXX"), "$PXXX");
    }
}
