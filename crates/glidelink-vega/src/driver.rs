//! The Vega [`Driver`] implementation and its catalog entry.

use async_trait::async_trait;
use tracing::{debug, info};

use glidelink_core::config::DeviceConfig;
use glidelink_core::driver::{Driver, DriverDescriptor, DriverFlags};
use glidelink_core::error::Result;
use glidelink_core::transport::Transport;
use glidelink_core::types::{DerivedInfo, NavInfo};
use glidelink_nmea::{InputLine, format_sentence};

use crate::sentences::{self, VegaState};

/// QNH sent before the application has pushed one, hPa.
const STANDARD_QNH: f64 = 1013.25;

/// Driver for the Vega vario.
#[derive(Debug, Default)]
pub struct VegaDriver {
    state: VegaState,
    /// Most recent QNH from [`Driver::put_qnh`], echoed in every `$PDVMC`.
    qnh: Option<f64>,
}

impl VegaDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A configuration value the vario reported through `$PDVSC`.
    pub fn config_value(&self, name: &str) -> Option<i64> {
        self.state.config.get(name).copied()
    }

    /// The `$PDVMC` sentence: MacCready and speed-to-fly in dm/s, circling
    /// flag, terrain altitude in metres and QNH in tenths of hPa.
    fn pdvmc(&self, derived: &DerivedInfo) -> String {
        let body = format!(
            "PDVMC,{},{},{},{},{}",
            (derived.mac_cready * 10.0).round() as i32,
            (derived.speed_to_fly * 10.0).round() as i32,
            i32::from(derived.circling),
            derived.terrain_altitude.unwrap_or(0.0).round() as i32,
            (self.qnh.unwrap_or(STANDARD_QNH) * 10.0).round() as u32,
        );
        format_sentence(&body)
    }

    async fn write_settings(&self, port: &mut dyn Transport, derived: &DerivedInfo) -> Result<()> {
        port.send(self.pdvmc(derived).as_bytes()).await
    }
}

#[async_trait]
impl Driver for VegaDriver {
    fn parse_line(&mut self, line: &str, info: &mut NavInfo) -> bool {
        let mut line = InputLine::new(line);
        match line.read() {
            "$PDSWC" => {
                for edge in sentences::pdswc(&mut line, info, &mut self.state) {
                    debug!(
                        bit = edge.bit,
                        output = edge.output,
                        on = edge.on,
                        event = edge.event_code(),
                        "vega switch changed"
                    );
                }
                true
            }
            "$PDAAV" => {
                sentences::pdaav(&mut line);
                true
            }
            "$PDVSC" => {
                if let Some((name, value)) = sentences::pdvsc(&mut line, &mut self.state) {
                    debug!(name = %name, value, "vega configuration value");
                }
                true
            }
            "$PDVDV" => {
                sentences::pdvdv(&mut line, info);
                true
            }
            "$PDVDS" => {
                sentences::pdvds(&mut line, info);
                true
            }
            "$PDVVT" => {
                sentences::pdvvt(&mut line, info);
                true
            }
            "$PDVSD" => {
                info!(message = %line.rest(), "VEGA");
                true
            }
            "$PDTSM" => {
                info!(message = %sentences::pdtsm(&mut line), "VEGA");
                true
            }
            _ => false,
        }
    }

    async fn put_qnh(
        &mut self,
        port: &mut dyn Transport,
        qnh: f64,
        derived: &DerivedInfo,
    ) -> Result<()> {
        self.qnh = Some(qnh);
        self.write_settings(port, derived).await
    }

    async fn put_voice(&mut self, port: &mut dyn Transport, sentence: &str) -> Result<()> {
        let body = sentence.trim_start_matches('$');
        port.send(format_sentence(body).as_bytes()).await
    }

    async fn on_tick(
        &mut self,
        port: &mut dyn Transport,
        basic: &NavInfo,
        derived: &DerivedInfo,
    ) -> Result<()> {
        if basic.total_energy_vario.is_some() {
            self.write_settings(port, derived).await?;
        }
        Ok(())
    }
}

fn create(_config: &DeviceConfig) -> Box<dyn Driver> {
    Box::new(VegaDriver::new())
}

/// Catalog entry for the Vega.
pub static VEGA: DriverDescriptor = DriverDescriptor {
    name: "Vega",
    display_name: "Vega",
    flags: DriverFlags::NONE,
    factory: Some(create),
};

#[cfg(test)]
mod tests {
    use super::*;
    use glidelink_test_harness::MockTransport;

    fn derived() -> DerivedInfo {
        DerivedInfo {
            mac_cready: 1.5,
            speed_to_fly: 33.34,
            circling: true,
            terrain_altitude: Some(412.6),
        }
    }

    // ===============================================================
    // Parsing
    // ===============================================================

    #[test]
    fn recognizes_vega_sentences_only() {
        let mut vega = VegaDriver::new();
        let mut info = NavInfo::default();
        assert!(vega.parse_line("$PDVVT,215,40*00", &mut info));
        assert!(vega.parse_line("$PDAAV,1,2,3*00", &mut info));
        assert!(vega.parse_line("$PDVSD,hello*00", &mut info));

        let mut untouched = NavInfo::default();
        assert!(!vega.parse_line("$GPGGA,123519,4807.038,N*00", &mut untouched));
        assert!(!vega.parse_line("$PGRMZ,1000,f,3*00", &mut untouched));
        assert_eq!(untouched, NavInfo::default());
    }

    #[test]
    fn pdvsc_values_are_retained() {
        let mut vega = VegaDriver::new();
        let mut info = NavInfo::default();
        assert!(vega.parse_line("$PDVSC,V,ToneDeadbandCirclingLow,-2*00", &mut info));
        assert_eq!(vega.config_value("ToneDeadbandCirclingLow"), Some(2));
        assert_eq!(vega.config_value("Unknown"), None);
    }

    #[test]
    fn pdswc_reports_mac_cready_setting() {
        let mut vega = VegaDriver::new();
        let mut info = NavInfo {
            clock: 7.0,
            ..Default::default()
        };
        assert!(vega.parse_line("$PDSWC,20,0,1,118*00", &mut info));
        assert_eq!(info.settings.mac_cready.map(|s| s.value), Some(2.0));
    }

    // ===============================================================
    // Outbound
    // ===============================================================

    #[test]
    fn pdvmc_sentence_layout() {
        let mut vega = VegaDriver::new();
        assert_eq!(
            vega.pdvmc(&derived()),
            format_sentence("PDVMC,15,333,1,413,10133")
        );
        vega.qnh = Some(1020.0);
        assert!(vega.pdvmc(&derived()).starts_with("$PDVMC,15,333,1,413,10200*"));
    }

    #[tokio::test]
    async fn put_qnh_stores_value_and_writes_pdvmc() {
        let mut vega = VegaDriver::new();
        let mut port = MockTransport::relaxed();
        let handle = port.handle();

        vega.put_qnh(&mut port, 1005.0, &derived()).await.unwrap();
        assert_eq!(vega.qnh, Some(1005.0));
        let sent = String::from_utf8(handle.sent_bytes()).unwrap();
        assert!(sent.starts_with("$PDVMC,15,333,1,413,10050*"));
        assert!(sent.ends_with("\r\n"));
    }

    #[tokio::test]
    async fn tick_writes_only_with_vario_data() {
        let mut vega = VegaDriver::new();
        let mut port = MockTransport::relaxed();
        let handle = port.handle();

        vega.on_tick(&mut port, &NavInfo::default(), &derived())
            .await
            .unwrap();
        assert!(handle.sent_data().is_empty());

        let basic = NavInfo {
            total_energy_vario: Some(0.8),
            ..Default::default()
        };
        vega.on_tick(&mut port, &basic, &derived()).await.unwrap();
        assert_eq!(handle.sent_data().len(), 1);
    }

    #[tokio::test]
    async fn put_voice_frames_sentence() {
        let mut vega = VegaDriver::new();
        let mut port = MockTransport::relaxed();
        let handle = port.handle();

        vega.put_voice(&mut port, "$PDVSC,S,Voice,1").await.unwrap();
        assert_eq!(
            handle.sent_bytes(),
            format_sentence("PDVSC,S,Voice,1").into_bytes()
        );
    }

    #[test]
    fn descriptor() {
        assert_eq!(VEGA.name, "Vega");
        assert!(!VEGA.supports_declare());
        assert!(VEGA.create(&DeviceConfig::disabled()).is_some());
    }
}
