//! Instrument settings and the reconciler that keeps them in sync.
//!
//! Each slot keeps two [`ExternalSettings`] snapshots: what the application
//! last *sent* to the instrument and what the instrument last *reported*.
//! [`ExternalSettings::confirms`] lets a settings push skip the write when
//! the instrument already has the value; [`ExternalSettings::eliminate_redundant`]
//! hides a reported value that merely echoes a write of ours, so the rest
//! of the application does not mistake the echo for a change made in the
//! cockpit.

use crate::types::RadioFrequency;

/// A value with the slot clock time it was set at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stamped<T> {
    pub value: T,
    /// Slot clock, seconds.
    pub time: f64,
}

impl<T> Stamped<T> {
    pub fn new(value: T, time: f64) -> Self {
        Stamped { value, time }
    }
}

/// MacCready values closer than this (m/s) are the same setting.
pub const MAC_CREADY_TOLERANCE: f64 = 0.05;
/// Bug factors closer than this are the same setting.
pub const BUGS_TOLERANCE: f64 = 0.01;
/// Ballast fractions closer than this are the same setting.
pub const BALLAST_TOLERANCE: f64 = 0.01;
/// QNH values closer than this (hPa) are the same setting.
pub const QNH_TOLERANCE: f64 = 0.5;

/// One outbound setting, as pushed through a slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Setting {
    /// MacCready in m/s.
    MacCready(f64),
    /// Bug factor, 1.0 = clean wings.
    Bugs(f64),
    /// Ballast as a fraction of the maximum, 0.0..=1.0.
    BallastFraction(f64),
    /// QNH in hPa.
    Qnh(f64),
    /// Audio volume, percent.
    Volume(u8),
    ActiveFrequency(RadioFrequency),
    StandbyFrequency(RadioFrequency),
    /// A raw sentence for the instrument's voice module.
    Voice(String),
}

impl Setting {
    /// Short name used in log messages.
    pub fn name(&self) -> &'static str {
        match self {
            Setting::MacCready(_) => "mac_cready",
            Setting::Bugs(_) => "bugs",
            Setting::BallastFraction(_) => "ballast",
            Setting::Qnh(_) => "qnh",
            Setting::Volume(_) => "volume",
            Setting::ActiveFrequency(_) => "active_frequency",
            Setting::StandbyFrequency(_) => "standby_frequency",
            Setting::Voice(_) => "voice",
        }
    }
}

/// Settings exchanged with an instrument.
///
/// A field is available iff it is `Some`; the stamp records when it was set.
/// Equality between snapshots is decided per field on values only, within
/// the tolerances above.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExternalSettings {
    pub mac_cready: Option<Stamped<f64>>,
    pub bugs: Option<Stamped<f64>>,
    pub ballast_fraction: Option<Stamped<f64>>,
    pub qnh: Option<Stamped<f64>>,
    pub volume: Option<Stamped<u8>>,
    pub active_frequency: Option<Stamped<RadioFrequency>>,
    pub standby_frequency: Option<Stamped<RadioFrequency>>,
}

fn close_to(field: &Option<Stamped<f64>>, value: f64, tolerance: f64) -> bool {
    field.is_some_and(|s| (s.value - value).abs() <= tolerance)
}

fn same<T: PartialEq + Copy>(field: &Option<Stamped<T>>, value: T) -> bool {
    field.is_some_and(|s| s.value == value)
}

fn newer<T: Copy>(dst: &mut Option<Stamped<T>>, src: &Option<Stamped<T>>) {
    if let Some(s) = src {
        if dst.is_none_or(|d| s.time > d.time) {
            *dst = Some(*s);
        }
    }
}

impl ExternalSettings {
    pub fn compare_mac_cready(&self, value: f64) -> bool {
        close_to(&self.mac_cready, value, MAC_CREADY_TOLERANCE)
    }

    pub fn compare_bugs(&self, value: f64) -> bool {
        close_to(&self.bugs, value, BUGS_TOLERANCE)
    }

    pub fn compare_ballast_fraction(&self, value: f64) -> bool {
        close_to(&self.ballast_fraction, value, BALLAST_TOLERANCE)
    }

    pub fn compare_qnh(&self, value: f64) -> bool {
        close_to(&self.qnh, value, QNH_TOLERANCE)
    }

    pub fn compare_volume(&self, value: u8) -> bool {
        same(&self.volume, value)
    }

    pub fn compare_active_frequency(&self, value: RadioFrequency) -> bool {
        same(&self.active_frequency, value)
    }

    pub fn compare_standby_frequency(&self, value: RadioFrequency) -> bool {
        same(&self.standby_frequency, value)
    }

    /// Whether this snapshot already holds `setting`'s value.
    ///
    /// Voice prompts are never held, so they are never confirmed.
    pub fn confirms(&self, setting: &Setting) -> bool {
        match setting {
            Setting::MacCready(v) => self.compare_mac_cready(*v),
            Setting::Bugs(v) => self.compare_bugs(*v),
            Setting::BallastFraction(v) => self.compare_ballast_fraction(*v),
            Setting::Qnh(v) => self.compare_qnh(*v),
            Setting::Volume(v) => self.compare_volume(*v),
            Setting::ActiveFrequency(f) => self.compare_active_frequency(*f),
            Setting::StandbyFrequency(f) => self.compare_standby_frequency(*f),
            Setting::Voice(_) => false,
        }
    }

    /// Store `setting` with timestamp `time`.
    pub fn record(&mut self, setting: &Setting, time: f64) {
        match setting {
            Setting::MacCready(v) => self.mac_cready = Some(Stamped::new(*v, time)),
            Setting::Bugs(v) => self.bugs = Some(Stamped::new(*v, time)),
            Setting::BallastFraction(v) => self.ballast_fraction = Some(Stamped::new(*v, time)),
            Setting::Qnh(v) => self.qnh = Some(Stamped::new(*v, time)),
            Setting::Volume(v) => self.volume = Some(Stamped::new(*v, time)),
            Setting::ActiveFrequency(f) => self.active_frequency = Some(Stamped::new(*f, time)),
            Setting::StandbyFrequency(f) => self.standby_frequency = Some(Stamped::new(*f, time)),
            Setting::Voice(_) => {}
        }
    }

    /// Take every field from `other` that is missing here or newer there.
    pub fn complement(&mut self, other: &ExternalSettings) {
        newer(&mut self.mac_cready, &other.mac_cready);
        newer(&mut self.bugs, &other.bugs);
        newer(&mut self.ballast_fraction, &other.ballast_fraction);
        newer(&mut self.qnh, &other.qnh);
        newer(&mut self.volume, &other.volume);
        newer(&mut self.active_frequency, &other.active_frequency);
        newer(&mut self.standby_frequency, &other.standby_frequency);
    }

    /// The settings to surface after a parse produced `self`.
    ///
    /// A field is dropped when it equals the value in `sent` and differs from
    /// the value in `last_received`: the instrument has just switched to the
    /// value we wrote, so the change is ours. Every other field passes
    /// through. Only the immediately previous received snapshot is
    /// consulted.
    pub fn eliminate_redundant(
        &self,
        sent: &ExternalSettings,
        last_received: &ExternalSettings,
    ) -> ExternalSettings {
        let mut out = self.clone();

        if let Some(s) = self.mac_cready {
            if sent.compare_mac_cready(s.value) && !last_received.compare_mac_cready(s.value) {
                out.mac_cready = None;
            }
        }
        if let Some(s) = self.bugs {
            if sent.compare_bugs(s.value) && !last_received.compare_bugs(s.value) {
                out.bugs = None;
            }
        }
        if let Some(s) = self.ballast_fraction {
            if sent.compare_ballast_fraction(s.value)
                && !last_received.compare_ballast_fraction(s.value)
            {
                out.ballast_fraction = None;
            }
        }
        if let Some(s) = self.qnh {
            if sent.compare_qnh(s.value) && !last_received.compare_qnh(s.value) {
                out.qnh = None;
            }
        }
        if let Some(s) = self.volume {
            if sent.compare_volume(s.value) && !last_received.compare_volume(s.value) {
                out.volume = None;
            }
        }
        if let Some(s) = self.active_frequency {
            if sent.compare_active_frequency(s.value)
                && !last_received.compare_active_frequency(s.value)
            {
                out.active_frequency = None;
            }
        }
        if let Some(s) = self.standby_frequency {
            if sent.compare_standby_frequency(s.value)
                && !last_received.compare_standby_frequency(s.value)
            {
                out.standby_frequency = None;
            }
        }

        out
    }
}
