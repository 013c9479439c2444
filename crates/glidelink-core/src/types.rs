//! Core data types for navigation state, declarations and flight logs.

use std::fmt;

use crate::settings::ExternalSettings;

// ---------------------------------------------------------------------------
// Primitive value types
// ---------------------------------------------------------------------------

/// A WGS84 position in decimal degrees (north and east positive).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        GeoPoint {
            latitude,
            longitude,
        }
    }

    /// Whether both components lie in their valid ranges.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A calendar date (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrokenDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl BrokenDate {
    pub fn new(year: u16, month: u8, day: u8) -> Self {
        BrokenDate { year, month, day }
    }

    pub fn is_plausible(&self) -> bool {
        (1..=12).contains(&self.month) && (1..=31).contains(&self.day)
    }
}

impl fmt::Display for BrokenDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// A time of day (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrokenTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl BrokenTime {
    pub fn new(hour: u8, minute: u8, second: u8) -> Self {
        BrokenTime {
            hour,
            minute,
            second,
        }
    }

    pub fn is_plausible(&self) -> bool {
        self.hour < 24 && self.minute < 60 && self.second < 60
    }

    /// Seconds since midnight.
    pub fn seconds_of_day(&self) -> u32 {
        u32::from(self.hour) * 3600 + u32::from(self.minute) * 60 + u32::from(self.second)
    }
}

impl fmt::Display for BrokenTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

/// An airband radio frequency, stored in kHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RadioFrequency {
    khz: u32,
}

impl RadioFrequency {
    /// Lowest airband frequency (118.000 MHz).
    pub const MIN_KHZ: u32 = 118_000;
    /// Highest airband frequency (137.000 MHz).
    pub const MAX_KHZ: u32 = 137_000;

    /// Build from kHz; returns `None` outside the airband.
    pub fn from_khz(khz: u32) -> Option<Self> {
        (Self::MIN_KHZ..=Self::MAX_KHZ)
            .contains(&khz)
            .then_some(RadioFrequency { khz })
    }

    pub fn khz(&self) -> u32 {
        self.khz
    }
}

impl fmt::Display for RadioFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.khz / 1000, self.khz % 1000)
    }
}

/// Wind vector; `bearing` is where the wind comes from, degrees true.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Wind {
    /// Speed in m/s.
    pub speed: f64,
    pub bearing: f64,
}

/// Raw switch bitmasks reported by a vario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwitchState {
    pub inputs: u32,
    pub outputs: u32,
}

/// The active navigation target reported by an external navigator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TargetInfo {
    pub name: String,
    /// Bearing to the target, degrees true.
    pub bearing: f64,
    /// Distance in metres.
    pub distance: f64,
}

// ---------------------------------------------------------------------------
// GPS and FLARM state
// ---------------------------------------------------------------------------

/// GPS receiver status.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GpsState {
    /// NMEA fix quality (0 = no fix).
    pub fix_quality: Option<u8>,
    pub satellites_used: Option<u8>,
    /// Cleared when the data comes from a simulator.
    pub real: bool,
}

/// One FLARM traffic target, relative to own position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlarmTraffic {
    /// Hex FLARM id.
    pub id: String,
    pub alarm_level: u8,
    /// Metres north of own position.
    pub relative_north: f64,
    /// Metres east of own position.
    pub relative_east: f64,
    /// Metres above own position.
    pub relative_altitude: f64,
}

/// FLARM status for one channel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlarmState {
    /// Set once a FLARM status sentence has been seen on the channel.
    pub available: bool,
    pub rx: u8,
    pub tx: bool,
    pub gps_status: u8,
    pub traffic: Vec<FlarmTraffic>,
}

impl FlarmState {
    /// Most traffic targets kept per channel.
    pub const MAX_TRAFFIC: usize = 15;

    /// Insert or replace the target with the same id.
    pub fn upsert(&mut self, traffic: FlarmTraffic) {
        if let Some(existing) = self.traffic.iter_mut().find(|t| t.id == traffic.id) {
            *existing = traffic;
        } else if self.traffic.len() < Self::MAX_TRAFFIC {
            self.traffic.push(traffic);
        }
    }
}

// ---------------------------------------------------------------------------
// Navigation state
// ---------------------------------------------------------------------------

/// The navigation record owned by one slot (or merged across slots).
///
/// Every measured quantity is optional; `None` means the channel has not
/// delivered it. `clock` is the slot-local monotonic time in seconds that
/// the record was last touched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NavInfo {
    pub clock: f64,
    /// Time the last valid line arrived (liveness).
    pub alive: Option<f64>,
    /// Time the last recognized sentence arrived.
    pub connected: Option<f64>,

    pub gps: GpsState,
    pub time: Option<BrokenTime>,
    pub date: Option<BrokenDate>,
    pub location: Option<GeoPoint>,
    /// Metres above MSL, from the GPS.
    pub gps_altitude: Option<f64>,
    /// Metres above MSL, barometric (QNH-corrected by the instrument).
    pub baro_altitude: Option<f64>,
    /// Metres, standard-atmosphere pressure altitude.
    pub pressure_altitude: Option<f64>,
    /// m/s over ground.
    pub ground_speed: Option<f64>,
    /// Degrees true.
    pub track: Option<f64>,

    /// m/s.
    pub total_energy_vario: Option<f64>,
    /// m/s.
    pub netto_vario: Option<f64>,
    /// m/s.
    pub indicated_airspeed: Option<f64>,
    /// m/s.
    pub true_airspeed: Option<f64>,
    /// Degrees Celsius.
    pub temperature: Option<f64>,
    /// Relative humidity, percent.
    pub humidity: Option<f64>,
    /// Volts.
    pub battery_voltage: Option<f64>,
    /// Load factor in g.
    pub g_load: Option<f64>,
    /// Airspeed relative to stall speed.
    pub stall_ratio: Option<f64>,
    pub switches: Option<SwitchState>,
    pub external_wind: Option<Wind>,
    pub target: Option<TargetInfo>,
    pub flarm: FlarmState,

    /// Settings the instrument reported on this channel.
    pub settings: ExternalSettings,
}

macro_rules! complement_fields {
    ($dst:ident, $src:ident, $($field:ident),* $(,)?) => {
        $(
            if $dst.$field.is_none() {
                $dst.$field = $src.$field.clone();
            }
        )*
    };
}

impl NavInfo {
    /// Forget everything; used when a slot opens or closes.
    pub fn reset(&mut self) {
        *self = NavInfo::default();
    }

    /// Whether a valid line arrived within `timeout` seconds of `now`.
    pub fn is_alive(&self, now: f64, timeout: f64) -> bool {
        self.alive.is_some_and(|t| now - t <= timeout)
    }

    /// Fill every field that `self` lacks from `other`.
    pub fn complement(&mut self, other: &NavInfo) {
        self.clock = self.clock.max(other.clock);
        complement_fields!(
            self,
            other,
            alive,
            connected,
            time,
            date,
            location,
            gps_altitude,
            baro_altitude,
            pressure_altitude,
            ground_speed,
            track,
            total_energy_vario,
            netto_vario,
            indicated_airspeed,
            true_airspeed,
            temperature,
            humidity,
            battery_voltage,
            g_load,
            stall_ratio,
            switches,
            external_wind,
            target,
        );
        if self.gps.fix_quality.is_none() {
            self.gps = other.gps.clone();
        }
        if !self.flarm.available {
            self.flarm = other.flarm.clone();
        }
        self.settings.complement(&other.settings);
    }
}

/// Values computed outside the link layer and fed back to instruments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DerivedInfo {
    /// Current MacCready setting in m/s.
    pub mac_cready: f64,
    /// Speed-to-fly in m/s.
    pub speed_to_fly: f64,
    pub circling: bool,
    /// Terrain elevation below the aircraft, metres.
    pub terrain_altitude: Option<f64>,
}

// ---------------------------------------------------------------------------
// Declarations and flight logs
// ---------------------------------------------------------------------------

/// Observation zone of a declared turnpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObservationZone {
    /// Start/finish line of the given total length in metres.
    Line { length: f64 },
    /// Cylinder of the given radius in metres.
    Cylinder { radius: f64 },
    /// 90 degree FAI sector of the given radius in metres.
    Sector { radius: f64 },
}

impl Default for ObservationZone {
    fn default() -> Self {
        ObservationZone::Cylinder { radius: 500.0 }
    }
}

/// One point of a task declaration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeclarationPoint {
    pub name: String,
    pub location: GeoPoint,
    pub zone: ObservationZone,
}

/// A task declaration sent to loggers before flight.
///
/// `turnpoints` includes start and finish: the first entry is the start,
/// the last entry is the finish.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Declaration {
    pub pilot_name: String,
    pub glider_type: String,
    pub glider_id: String,
    pub competition_id: String,
    pub competition_class: String,
    pub turnpoints: Vec<DeclarationPoint>,
}

impl Declaration {
    /// Number of points excluding start and finish.
    pub fn intermediate_count(&self) -> usize {
        self.turnpoints.len().saturating_sub(2)
    }
}

/// One entry of a logger's flight directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordedFlight {
    /// Position in the logger's directory, 0 = most recent.
    pub index: usize,
    pub date: BrokenDate,
    pub start_time: BrokenTime,
    pub end_time: BrokenTime,
    pub pilot: String,
    pub competition_id: String,
}

impl fmt::Display for RecordedFlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {}-{}",
            self.index, self.date, self.start_time, self.end_time
        )
    }
}
