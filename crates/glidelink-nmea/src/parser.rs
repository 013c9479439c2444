//! Generic multi-vendor sentence parser.
//!
//! [`NmeaParser`] understands the standard subset every GPS and most
//! gliding instruments emit, plus the common proprietary sentences that
//! are not tied to one driver:
//!
//! | Sentence  | Provides                                          |
//! |-----------|---------------------------------------------------|
//! | `xxGGA`   | fix quality, satellites, position, GPS altitude    |
//! | `xxRMC`   | position, ground speed, track, date/time           |
//! | `xxGLL`   | position                                           |
//! | `xxGSA`   | satellites used                                    |
//! | `xxRMB`   | active navigation target                           |
//! | `xxMWV`   | external wind (true reference only)                |
//! | `PGRMZ`   | pressure altitude                                  |
//! | `PTAS1`   | Tasman vario, pressure altitude, true airspeed     |
//! | `PFLAU`   | FLARM status (marks the channel as FLARM)          |
//! | `PFLAA`   | FLARM traffic                                      |
//!
//! Standard sentences are matched talker-agnostically (`GP`, `GN`, `GL`...).
//! The parser does not verify checksums; the caller does.

use glidelink_core::types::{
    BrokenDate, BrokenTime, FlarmTraffic, GeoPoint, NavInfo, TargetInfo, Wind,
};
use tracing::trace;

use crate::checksum::sentence_type;
use crate::input_line::InputLine;

const KNOTS_TO_MS: f64 = 1852.0 / 3600.0;
const KMH_TO_MS: f64 = 1.0 / 3.6;
const FEET_TO_M: f64 = 0.3048;
const NAUTICAL_MILE: f64 = 1852.0;

/// Largest backwards step (seconds) treated as an out-of-order fix rather
/// than a midnight wrap.
const MAX_BACKWARD_STEP: f64 = 12.0 * 3600.0;

/// Stateful parser for one channel.
#[derive(Debug, Clone)]
pub struct NmeaParser {
    last_fix_time: Option<f64>,
}

impl Default for NmeaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl NmeaParser {
    pub fn new() -> Self {
        NmeaParser {
            last_fix_time: None,
        }
    }

    /// Parse `line` into `info`; `false` if the sentence type is unknown.
    pub fn parse(&mut self, line: &str, info: &mut NavInfo) -> bool {
        let kind = sentence_type(line);
        let mut input = InputLine::new(line);
        input.skip();

        let recognized = match kind {
            "$PGRMZ" => pgrmz(&mut input, info),
            "$PTAS1" => ptas1(&mut input, info),
            "$PFLAU" => pflau(&mut input, info),
            "$PFLAA" => pflaa(&mut input, info),
            _ if kind.len() == 6 && kind.starts_with('$') && !kind.starts_with("$P") => {
                match kind.get(3..).unwrap_or("") {
                    "GGA" => self.gga(&mut input, info),
                    "RMC" => self.rmc(&mut input, info),
                    "GLL" => self.gll(&mut input, info),
                    "GSA" => gsa(&mut input, info),
                    "RMB" => rmb(&mut input, info),
                    "MWV" => mwv(&mut input, info),
                    _ => false,
                }
            }
            _ => false,
        };

        if recognized {
            trace!(kind, "generic parser accepted sentence");
        }
        recognized
    }

    /// Whether a fix at `time` moves forward; rejects out-of-order fixes.
    fn time_advanced(&mut self, time: &BrokenTime) -> bool {
        let t = f64::from(time.seconds_of_day());
        match self.last_fix_time {
            Some(last) if t < last && last - t < MAX_BACKWARD_STEP => {
                self.last_fix_time = None;
                false
            }
            _ => {
                self.last_fix_time = Some(t);
                true
            }
        }
    }

    fn gga(&mut self, line: &mut InputLine<'_>, info: &mut NavInfo) -> bool {
        let time = read_time(line);
        let location = read_location(line);
        let quality = line.read_i64().and_then(|q| u8::try_from(q).ok());
        let satellites = line.read_i64().and_then(|n| u8::try_from(n).ok());
        line.skip(); // hdop
        let altitude = read_altitude(line);

        if let Some(time) = time {
            if !self.time_advanced(&time) {
                return true;
            }
            info.time = Some(time);
        }

        info.gps.real = true;
        info.gps.fix_quality = quality;
        if satellites.is_some() {
            info.gps.satellites_used = satellites;
        }
        if quality.unwrap_or(0) == 0 {
            return true;
        }
        if let Some(location) = location {
            info.location = Some(location);
        }
        if altitude.is_some() {
            info.gps_altitude = altitude;
        }
        true
    }

    fn rmc(&mut self, line: &mut InputLine<'_>, info: &mut NavInfo) -> bool {
        let time = read_time(line);
        let valid = line.read_char() == Some('A');
        let location = read_location(line);
        let speed = line.read_f64();
        let track = line.read_f64();
        let date = read_date(line);

        if let Some(date) = date {
            info.date = Some(date);
        }
        if let Some(time) = time {
            if !self.time_advanced(&time) {
                return true;
            }
            info.time = Some(time);
        }

        info.gps.real = true;
        if !valid {
            info.gps.fix_quality = Some(0);
            return true;
        }
        if let Some(location) = location {
            info.location = Some(location);
        }
        if let Some(speed) = speed {
            info.ground_speed = Some(speed * KNOTS_TO_MS);
        }
        if let Some(track) = track {
            info.track = Some(track);
        }
        true
    }

    fn gll(&mut self, line: &mut InputLine<'_>, info: &mut NavInfo) -> bool {
        let location = read_location(line);
        let time = read_time(line);
        let valid = line.read_char() == Some('A');

        if let Some(time) = time {
            if !self.time_advanced(&time) {
                return true;
            }
            info.time = Some(time);
        }
        if valid {
            if let Some(location) = location {
                info.location = Some(location);
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Stateless sentences
// ---------------------------------------------------------------------------

fn gsa(line: &mut InputLine<'_>, info: &mut NavInfo) -> bool {
    line.skip(); // selection mode
    let mode = line.read_i64().unwrap_or(0);
    let used = (0..12).filter(|_| !line.read().trim().is_empty()).count();
    if mode <= 1 {
        info.gps.fix_quality = Some(0);
    }
    info.gps.satellites_used = u8::try_from(used).ok();
    true
}

fn rmb(line: &mut InputLine<'_>, info: &mut NavInfo) -> bool {
    if line.read_char() != Some('A') {
        return true;
    }
    line.skip_n(3); // cross-track error, steer direction, origin id
    let name = line.read().trim().to_string();
    line.skip_n(4); // destination position
    let (Some(range), Some(bearing)) = (line.read_f64(), line.read_f64()) else {
        return true;
    };
    info.target = Some(TargetInfo {
        name,
        bearing,
        distance: range * NAUTICAL_MILE,
    });
    true
}

fn mwv(line: &mut InputLine<'_>, info: &mut NavInfo) -> bool {
    let angle = line.read_f64();
    let reference = line.read_char();
    let speed = line.read_f64();
    let unit = line.read_char();
    let valid = line.read_char() == Some('A');

    if !valid || reference != Some('T') {
        return true;
    }
    let (Some(bearing), Some(speed)) = (angle, speed) else {
        return true;
    };
    let speed = match unit {
        Some('K') => speed * KMH_TO_MS,
        Some('N') => speed * KNOTS_TO_MS,
        _ => speed,
    };
    info.external_wind = Some(Wind { speed, bearing });
    true
}

fn pgrmz(line: &mut InputLine<'_>, info: &mut NavInfo) -> bool {
    if let Some(altitude) = read_altitude(line) {
        info.pressure_altitude = Some(altitude);
    }
    true
}

fn ptas1(line: &mut InputLine<'_>, info: &mut NavInfo) -> bool {
    let vario = line.read_f64();
    line.skip(); // average vario
    let altitude = line.read_f64();
    let tas = line.read_f64();

    if let Some(vario) = vario {
        info.total_energy_vario = Some((vario - 200.0) / 10.0 * KNOTS_TO_MS);
    }
    if let Some(altitude) = altitude {
        info.pressure_altitude = Some(((altitude - 2000.0) * FEET_TO_M).max(0.0));
    }
    if let Some(tas) = tas {
        info.true_airspeed = Some(tas * KNOTS_TO_MS);
    }
    true
}

fn pflau(line: &mut InputLine<'_>, info: &mut NavInfo) -> bool {
    let flarm = &mut info.flarm;
    flarm.available = true;
    flarm.rx = line.read_i64().and_then(|n| u8::try_from(n).ok()).unwrap_or(0);
    flarm.tx = line.read_i64() == Some(1);
    flarm.gps_status = line.read_i64().and_then(|n| u8::try_from(n).ok()).unwrap_or(0);
    true
}

fn pflaa(line: &mut InputLine<'_>, info: &mut NavInfo) -> bool {
    let alarm_level = line.read_i64().and_then(|n| u8::try_from(n).ok()).unwrap_or(0);
    let (Some(north), Some(east)) = (line.read_f64(), line.read_f64()) else {
        return true;
    };
    let vertical = line.read_f64_or(0.0);
    line.skip(); // id type
    let id = line.read().trim().to_string();
    if id.is_empty() {
        return true;
    }
    info.flarm.available = true;
    info.flarm.upsert(FlarmTraffic {
        id,
        alarm_level,
        relative_north: north,
        relative_east: east,
        relative_altitude: vertical,
    });
    true
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// `hhmmss[.ss]`
fn read_time(line: &mut InputLine<'_>) -> Option<BrokenTime> {
    let field = line.read().trim();
    if field.len() < 6 {
        return None;
    }
    let hour = field.get(0..2)?.parse().ok()?;
    let minute = field.get(2..4)?.parse().ok()?;
    let second = field.get(4..6)?.parse().ok()?;
    let time = BrokenTime::new(hour, minute, second);
    time.is_plausible().then_some(time)
}

/// `ddmmyy`
fn read_date(line: &mut InputLine<'_>) -> Option<BrokenDate> {
    let field = line.read().trim();
    if field.len() != 6 {
        return None;
    }
    let day = field.get(0..2)?.parse().ok()?;
    let month = field.get(2..4)?.parse().ok()?;
    let year: u16 = field.get(4..6)?.parse().ok()?;
    let date = BrokenDate::new(2000 + year, month, day);
    date.is_plausible().then_some(date)
}

/// `dddmm.mmm,H` into signed degrees.
fn read_coordinate(line: &mut InputLine<'_>, negative: char) -> Option<f64> {
    let value = line.read_f64();
    let hemisphere = line.read_char();
    let value = value?;
    let degrees = (value / 100.0).trunc();
    let minutes = value - degrees * 100.0;
    let result = degrees + minutes / 60.0;
    Some(if hemisphere == Some(negative) {
        -result
    } else {
        result
    })
}

fn read_location(line: &mut InputLine<'_>) -> Option<GeoPoint> {
    let latitude = read_coordinate(line, 'S');
    let longitude = read_coordinate(line, 'W');
    let point = GeoPoint::new(latitude?, longitude?);
    point.is_valid().then_some(point)
}

/// Altitude followed by its unit (`M` or `F`).
fn read_altitude(line: &mut InputLine<'_>) -> Option<f64> {
    let value = line.read_f64();
    let unit = line.read_char();
    let value = value?;
    Some(match unit {
        Some('f') | Some('F') => value * FEET_TO_M,
        _ => value,
    })
}
