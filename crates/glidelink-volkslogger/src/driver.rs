//! The Volkslogger [`Driver`] implementation and its catalog entry.

use async_trait::async_trait;
use tracing::{info, warn};

use glidelink_core::config::{DeviceConfig, PortConfig};
use glidelink_core::driver::{Driver, DriverDescriptor, DriverFlags};
use glidelink_core::error::{Error, Result};
use glidelink_core::progress::ProgressSink;
use glidelink_core::transport::Transport;
use glidelink_core::types::{Declaration, DeclarationPoint, RecordedFlight};

use crate::database::{DeclarationWaypoint, MAX_TURNPOINTS, VlDeclaration, Waypoint, kind};
use crate::protocol::{BASE_BAUD_RATE, baud_rate_code};
use crate::session::Session;

/// Driver for the Volkslogger flight recorder.
///
/// The logger has no streaming output worth parsing; everything it does
/// goes through bulk operations on a port the slot has handed over.
#[derive(Debug, Clone)]
pub struct VolksloggerDriver {
    data_baud: u32,
}

impl Default for VolksloggerDriver {
    fn default() -> Self {
        VolksloggerDriver {
            data_baud: BASE_BAUD_RATE,
        }
    }
}

impl VolksloggerDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run large reads at `baud_rate` instead of the base rate.
    pub fn with_data_baud(baud_rate: u32) -> Self {
        VolksloggerDriver {
            data_baud: baud_rate,
        }
    }

    fn session<'a>(&self, port: &'a mut dyn Transport) -> Session<'a> {
        Session::new(port).with_data_baud(self.data_baud)
    }
}

fn to_waypoint(point: &DeclarationPoint) -> DeclarationWaypoint {
    DeclarationWaypoint {
        waypoint: Waypoint {
            name: point.name.clone(),
            kind: kind::CHECKPOINT,
            location: point.location,
        },
        zone: point.zone,
        direction: 0,
    }
}

/// Map a task onto the logger's declaration fields. The takeoff point is
/// the start.
pub fn convert_declaration(declaration: &Declaration) -> Result<VlDeclaration> {
    let points = &declaration.turnpoints;
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return Err(Error::InvalidParameter("declaration has no turnpoints".into()));
    };
    if points.len() < 2 {
        return Err(Error::InvalidParameter(
            "declaration needs a start and a finish".into(),
        ));
    }
    if declaration.intermediate_count() > MAX_TURNPOINTS {
        return Err(Error::InvalidParameter(format!(
            "{} turnpoints, the Volkslogger accepts at most {MAX_TURNPOINTS}",
            declaration.intermediate_count()
        )));
    }

    let start = to_waypoint(first);
    Ok(VlDeclaration {
        pilot: declaration.pilot_name.clone(),
        glider_type: declaration.glider_type.clone(),
        glider_id: declaration.glider_id.clone(),
        competition_class: declaration.competition_class.clone(),
        competition_id: declaration.competition_id.clone(),
        takeoff: start.clone(),
        start,
        finish: to_waypoint(last),
        turnpoints: points[1..points.len() - 1].iter().map(to_waypoint).collect(),
    })
}

/// Close `session`, keeping `result` as the outcome.
async fn finish<T>(session: &mut Session<'_>, result: Result<T>) -> Result<T> {
    let closed = session.close(true).await;
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), closed) => {
            if let Err(close_error) = closed {
                warn!(error = %close_error, "failed to reset volkslogger");
            }
            Err(e)
        }
    }
}

#[async_trait]
impl Driver for VolksloggerDriver {
    async fn declare(
        &mut self,
        port: &mut dyn Transport,
        declaration: &Declaration,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        let vl_declaration = convert_declaration(declaration)?;

        let mut session = self.session(port);
        let result = async {
            progress.set_text("Connecting");
            session.still_connect().await?;
            progress.set_text("Reading database");
            let mut database = session.read_database().await?;

            database.declaration = Some(vl_declaration);

            progress.set_text("Writing declaration");
            session.still_connect().await?;
            session.write_database(&database, progress).await
        }
        .await;
        finish(&mut session, result).await?;

        info!(
            turnpoints = declaration.turnpoints.len(),
            "task declared to volkslogger"
        );
        Ok(())
    }

    async fn read_flight_list(
        &mut self,
        port: &mut dyn Transport,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<RecordedFlight>> {
        let mut session = self.session(port);
        let result = async {
            progress.set_text("Connecting");
            session.still_connect().await?;
            progress.set_text("Reading flight list");
            session.read_directory().await
        }
        .await;
        let entries = finish(&mut session, result).await?;
        Ok(entries.iter().map(RecordedFlight::from).collect())
    }

    async fn download_flight(
        &mut self,
        port: &mut dyn Transport,
        flight: &RecordedFlight,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<u8>> {
        let mut session = self.session(port);
        let result = async {
            progress.set_text("Connecting");
            session.still_connect().await?;
            progress.set_text("Downloading flight");
            session.read_flight(flight.index, true).await
        }
        .await;
        finish(&mut session, result).await
    }
}

/// Bulk reads run at the configured port speed when the logger supports
/// it, otherwise at the base rate.
fn create(config: &DeviceConfig) -> Box<dyn Driver> {
    match config.port {
        PortConfig::Serial { baud_rate, .. } if baud_rate_code(baud_rate).is_some() => {
            Box::new(VolksloggerDriver::with_data_baud(baud_rate))
        }
        _ => Box::new(VolksloggerDriver::new()),
    }
}

/// Catalog entry for the Volkslogger.
pub static VOLKSLOGGER: DriverDescriptor = DriverDescriptor {
    name: "Volkslogger",
    display_name: "Volkslogger",
    flags: DriverFlags::DECLARE.union(DriverFlags::LOGGER),
    factory: Some(create),
};
