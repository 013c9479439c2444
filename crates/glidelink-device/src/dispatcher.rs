//! Line dispatch: checksum validation, then driver parser, then the generic
//! fallback parser.

use glidelink_core::driver::Driver;
use glidelink_core::types::NavInfo;
use glidelink_nmea::{NmeaParser, sentence_type, verify_checksum};
use tracing::{debug, trace};

/// What became of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Failed checksum validation; nothing was parsed.
    Rejected,
    /// The attached driver recognized it.
    Driver,
    /// The generic parser recognized it.
    Generic,
    /// Valid, but neither parser knows the sentence type.
    Unknown,
}

impl Dispatch {
    pub fn is_recognized(self) -> bool {
        matches!(self, Dispatch::Driver | Dispatch::Generic)
    }
}

/// Routes lines for one channel.
#[derive(Debug, Clone)]
pub struct LineDispatcher {
    validate_checksum: bool,
    parser: NmeaParser,
}

impl LineDispatcher {
    pub fn new(validate_checksum: bool) -> Self {
        LineDispatcher {
            validate_checksum,
            parser: NmeaParser::new(),
        }
    }

    /// Offer `line` to `driver`, then to the generic parser.
    ///
    /// A trailing `\r` is ignored. The driver always wins a sentence type
    /// both parsers know; the generic parser only sees lines the driver
    /// declined. With validation enabled, a line whose `*hh` trailer is
    /// missing or wrong reaches neither parser and `info` is untouched.
    pub fn dispatch(
        &mut self,
        line: &str,
        driver: Option<&mut Box<dyn Driver>>,
        info: &mut NavInfo,
    ) -> Dispatch {
        let line = line.trim_end_matches(['\r', '\n']);

        if self.validate_checksum && !verify_checksum(line) {
            debug!(line, "dropping sentence with bad checksum");
            return Dispatch::Rejected;
        }

        if let Some(driver) = driver {
            if driver.parse_line(line, info) {
                return Dispatch::Driver;
            }
        }

        if self.parser.parse(line, info) {
            return Dispatch::Generic;
        }

        trace!(kind = sentence_type(line), "unknown sentence");
        Dispatch::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glidelink_nmea::format_sentence;

    /// Claims `$PGRMZ` and `$PXYZ`, reporting a fixed altitude for both.
    struct Claiming;

    impl Driver for Claiming {
        fn parse_line(&mut self, line: &str, info: &mut NavInfo) -> bool {
            if line.starts_with("$PGRMZ") || line.starts_with("$PXYZ") {
                info.baro_altitude = Some(-1.0);
                true
            } else {
                false
            }
        }
    }

    fn line(body: &str) -> String {
        format_sentence(body).trim_end().to_string()
    }

    fn claiming() -> Box<dyn Driver> {
        Box::new(Claiming)
    }

    // ===============================================================
    // Checksum validation
    // ===============================================================

    #[test]
    fn corrupted_checksum_is_rejected_untouched() {
        let mut dispatcher = LineDispatcher::new(true);
        let mut driver = claiming();
        let mut info = NavInfo::default();

        let good = line("PGRMZ,1000,f,3");
        let (body, _) = good.rsplit_once('*').unwrap();
        let bad = format!("{body}*00");

        assert_eq!(
            dispatcher.dispatch(&bad, Some(&mut driver), &mut info),
            Dispatch::Rejected
        );
        assert_eq!(info, NavInfo::default());
    }

    #[test]
    fn missing_checksum_is_rejected_when_validating() {
        let mut dispatcher = LineDispatcher::new(true);
        let mut info = NavInfo::default();
        assert_eq!(
            dispatcher.dispatch("$PGRMZ,1000,f,3", None, &mut info),
            Dispatch::Rejected
        );

        let mut lenient = LineDispatcher::new(false);
        assert_eq!(
            lenient.dispatch("$PGRMZ,1000,f,3", None, &mut info),
            Dispatch::Generic
        );
    }

    #[test]
    fn carriage_return_is_ignored() {
        let mut dispatcher = LineDispatcher::new(true);
        let mut info = NavInfo::default();
        let with_cr = format!("{}\r", line("PGRMZ,1000,f,3"));
        assert_eq!(
            dispatcher.dispatch(&with_cr, None, &mut info),
            Dispatch::Generic
        );
    }

    // ===============================================================
    // Routing
    // ===============================================================

    #[test]
    fn driver_wins_shared_sentence_type() {
        let mut dispatcher = LineDispatcher::new(true);
        let mut driver = claiming();
        let mut info = NavInfo::default();

        let result = dispatcher.dispatch(&line("PGRMZ,1000,f,3"), Some(&mut driver), &mut info);
        assert_eq!(result, Dispatch::Driver);
        assert_eq!(info.baro_altitude, Some(-1.0));
        assert_eq!(info.pressure_altitude, None);
    }

    #[test]
    fn generic_parser_sees_declined_lines() {
        let mut dispatcher = LineDispatcher::new(true);
        let mut driver = claiming();
        let mut info = NavInfo::default();

        let result = dispatcher.dispatch(&line("PFLAU,3,1,2,1"), Some(&mut driver), &mut info);
        assert_eq!(result, Dispatch::Generic);
        assert!(info.flarm.available);
    }

    #[test]
    fn unknown_sentence_is_not_an_error() {
        let mut dispatcher = LineDispatcher::new(true);
        let mut info = NavInfo::default();
        let result = dispatcher.dispatch(&line("PQRST,1,2,3"), None, &mut info);
        assert_eq!(result, Dispatch::Unknown);
        assert!(!result.is_recognized());
        assert_eq!(info, NavInfo::default());
    }
}
