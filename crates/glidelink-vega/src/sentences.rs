//! Parsers for the Vega's proprietary `$PD...` sentences.
//!
//! Each parser receives the field cursor positioned after the sentence
//! type. Parsers are pure apart from the [`VegaState`] they update; the
//! driver decides what to log.

use std::collections::HashMap;

use glidelink_core::settings::Stamped;
use glidelink_core::types::{NavInfo, SwitchState};
use glidelink_nmea::InputLine;

// ---------------------------------------------------------------
// Driver-side state
// ---------------------------------------------------------------

/// State the Vega sentences carry between lines.
#[derive(Debug, Clone, Default)]
pub struct VegaState {
    /// Switch bitmasks of the previous `$PDSWC`.
    pub last_inputs: u32,
    pub last_outputs: u32,
    /// Configuration values reported through `$PDVSC`.
    pub config: HashMap<String, i64>,
}

// ---------------------------------------------------------------
// Switch edges
// ---------------------------------------------------------------

/// One switch changing state between two `$PDSWC` sentences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchEdge {
    /// Bit position, 0..32.
    pub bit: u8,
    /// Output bitmask rather than input bitmask.
    pub output: bool,
    /// Switched on (as opposed to off).
    pub on: bool,
}

impl SwitchEdge {
    /// Input event number: 0..32 inputs on, 32..64 outputs on, 64..96
    /// inputs off, 96..128 outputs off.
    pub fn event_code(&self) -> u32 {
        let mut code = u32::from(self.bit);
        if self.output {
            code += 32;
        }
        if !self.on {
            code += 64;
        }
        code
    }
}

/// Every bit that changed from `previous` to `current`.
///
/// Ordered by bit; for each bit the input edge comes before the output
/// edge, and "on" edges before "off" edges.
pub fn switch_edges(previous: SwitchState, current: SwitchState) -> Vec<SwitchEdge> {
    let inputs_on = current.inputs & !previous.inputs;
    let outputs_on = current.outputs & !previous.outputs;
    let inputs_off = !current.inputs & previous.inputs;
    let outputs_off = !current.outputs & previous.outputs;

    let mut edges = Vec::new();
    for bit in 0..32u8 {
        let mask = 1u32 << bit;
        for (set, output, on) in [
            (inputs_on, false, true),
            (outputs_on, true, true),
            (inputs_off, false, false),
            (outputs_off, true, false),
        ] {
            if set & mask != 0 {
                edges.push(SwitchEdge { bit, output, on });
            }
        }
    }
    edges
}

// ---------------------------------------------------------------
// Sentence parsers
// ---------------------------------------------------------------

/// `$PDSWC,mc,inputs,outputs,battery` -- MacCready in dm/s, hex switch
/// bitmasks, battery voltage in decivolts.
///
/// Returns the switch edges relative to the previous `$PDSWC`.
pub fn pdswc(line: &mut InputLine<'_>, info: &mut NavInfo, state: &mut VegaState) -> Vec<SwitchEdge> {
    if let Some(mc) = line.read_f64() {
        info.settings.mac_cready = Some(Stamped::new(mc / 10.0, info.clock));
    }

    let inputs = line.read_hex().unwrap_or(0) as u32;
    let outputs = line.read_hex().unwrap_or(0) as u32;

    if let Some(battery) = line.read_f64() {
        info.battery_voltage = Some(battery / 10.0);
    }

    let current = SwitchState { inputs, outputs };
    info.switches = Some(current);

    let previous = SwitchState {
        inputs: state.last_inputs,
        outputs: state.last_outputs,
    };
    state.last_inputs = inputs;
    state.last_outputs = outputs;
    switch_edges(previous, current)
}

/// `$PDAAV,beep_frequency,sound_frequency,sound_type` -- audio setup;
/// acknowledged without effect.
pub fn pdaav(line: &mut InputLine<'_>) {
    line.skip_n(3);
}

/// `$PDVSC,type,name,value` -- one configuration value.
///
/// `ERROR` responses are ignored. The low tone deadbands are reported
/// negative and stored as magnitudes. Returns the stored pair.
pub fn pdvsc(line: &mut InputLine<'_>, state: &mut VegaState) -> Option<(String, i64)> {
    line.skip();
    let name = line.read();
    if name == "ERROR" || name.is_empty() {
        return None;
    }

    let mut value = line.read_i64().unwrap_or(0);
    if name == "ToneDeadbandCruiseLow" || name == "ToneDeadbandCirclingLow" {
        value = value.abs();
    }

    state.config.insert(name.to_string(), value);
    Some((name.to_string(), value))
}

/// `$PDVDV,vario,ias,density_ratio,altitude` -- total-energy vario and
/// indicated airspeed in dm/s, density ratio scaled by 1024, pressure
/// altitude in metres.
pub fn pdvdv(line: &mut InputLine<'_>, info: &mut NavInfo) {
    if let Some(vario) = line.read_f64() {
        info.total_energy_vario = Some(vario / 10.0);
    }

    let ias = line.read_f64();
    let tas_ratio = line.read_f64_or(1024.0) / 1024.0;
    if let Some(ias) = ias {
        info.indicated_airspeed = Some(ias / 10.0);
        info.true_airspeed = Some(ias / 10.0 * tas_ratio);
    }

    if let Some(altitude) = line.read_f64() {
        info.pressure_altitude = Some(altitude);
    }
}

/// `$PDVDS,ax,az,flap,stall_ratio,netto` -- acceleration in centi-g, stall
/// ratio, netto vario in dm/s.
pub fn pdvds(line: &mut InputLine<'_>, info: &mut NavInfo) {
    let ax = line.read_f64_or(0.0);
    let az = line.read_f64_or(0.0);
    info.g_load = Some(ax.hypot(az).trunc() / 100.0);

    // flap
    line.skip();

    info.stall_ratio = Some(line.read_f64_or(0.0));

    if let Some(netto) = line.read_f64() {
        info.netto_vario = Some(netto / 10.0);
    }
}

/// `$PDVVT,temperature,humidity` -- temperature in deci-degrees Celsius,
/// relative humidity in percent.
pub fn pdvvt(line: &mut InputLine<'_>, info: &mut NavInfo) {
    info.temperature = line.read_f64().map(|t| t / 10.0);
    info.humidity = line.read_f64();
}

/// `$PDTSM,duration_ms,text` -- a message for the pilot.
pub fn pdtsm<'a>(line: &mut InputLine<'a>) -> &'a str {
    line.skip();
    line.rest()
}
