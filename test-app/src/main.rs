// glidelink monitor -- CLI tool for exercising instrument links against
// real hardware.
//
// Usage:
//   glidelink-monitor drivers
//   glidelink-monitor --device serial:0:4800=Generic --device tcp:4353=NmeaOut monitor
//   glidelink-monitor --device serial:1:38400=Volkslogger flights
//   glidelink-monitor --device serial:1:38400=Volkslogger download --index 0 --output flight.igc
//   glidelink-monitor --device serial:1:38400=Volkslogger declare \
//       --pilot "Jo Example" --point START:47.0:8.0 --point TP1:47.5:8.5 --point FINISH:47.0:8.0
//
// Logging is controlled with RUST_LOG (default: info).

mod device_arg;

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use glidelink::{
    Declaration, DeclarationPoint, DerivedInfo, DeviceConfig, DeviceRegistry, DeviceSlot,
    GeoPoint, NavInfo, ObservationZone, ProgressSink, Setting, SlotOutcome,
};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// glidelink monitor -- opens instrument links from the command line.
#[derive(Parser)]
#[command(name = "glidelink-monitor", version, about)]
struct Cli {
    /// Device in the form <port>=<driver>, one per slot, in slot order.
    /// Ports: serial:<index>[:<baud>], bt:<address>, tcp:<port>, internal.
    #[arg(long = "device", value_parser = device_arg::parse_device)]
    devices: Vec<DeviceConfig>,

    /// Accept lines without a valid checksum.
    #[arg(long)]
    no_checksum: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the available drivers and their capabilities.
    Drivers,

    /// Open the devices and print the merged navigation state.
    Monitor {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,

        /// Seconds of silence before a link-timeout notification.
        #[arg(long, default_value_t = 10)]
        link_timeout: u64,

        /// Push this MacCready value (m/s) to every device once at startup.
        #[arg(long)]
        mac_cready: Option<f64>,
    },

    /// List the flights stored on a logger.
    Flights {
        /// Slot index (default: first slot with a logger driver).
        #[arg(long)]
        slot: Option<usize>,
    },

    /// Download one flight from a logger.
    Download {
        #[arg(long)]
        slot: Option<usize>,

        /// Directory index, 0 = most recent.
        #[arg(long, default_value_t = 0)]
        index: usize,

        /// Output file path.
        #[arg(long, default_value = "flight.igc")]
        output: String,
    },

    /// Declare a task to a logger.
    Declare {
        #[arg(long)]
        slot: Option<usize>,

        #[arg(long, default_value = "")]
        pilot: String,

        #[arg(long, default_value = "")]
        glider_type: String,

        #[arg(long, default_value = "")]
        glider_id: String,

        #[arg(long, default_value = "")]
        competition_id: String,

        /// Turnpoint as NAME:LATITUDE:LONGITUDE in decimal degrees.
        /// Repeat for each point, start first.
        #[arg(long = "point", value_parser = parse_point, required = true)]
        points: Vec<DeclarationPoint>,
    },
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_point(s: &str) -> std::result::Result<DeclarationPoint, String> {
    let mut fields = s.rsplitn(3, ':');
    let (Some(lon), Some(lat), Some(name)) = (fields.next(), fields.next(), fields.next()) else {
        return Err(format!("{s:?}: expected NAME:LATITUDE:LONGITUDE"));
    };
    let latitude: f64 = lat.parse().map_err(|e| format!("latitude: {e}"))?;
    let longitude: f64 = lon.parse().map_err(|e| format!("longitude: {e}"))?;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(format!("{s:?}: coordinates out of range"));
    }
    Ok(DeclarationPoint {
        name: name.to_string(),
        location: GeoPoint::new(latitude, longitude),
        zone: ObservationZone::default(),
    })
}

/// Prints bulk-operation progress on one terminal line.
struct TerminalProgress;

impl ProgressSink for TerminalProgress {
    fn set_text(&self, text: &str) {
        eprintln!("{text}...");
    }

    fn set_range(&self, _range: u32) {}

    fn set_position(&self, position: u32) {
        eprint!("\r  step {position}");
    }
}

fn describe_outcome(index: usize, outcome: &SlotOutcome) {
    match outcome {
        SlotOutcome::Opened { driver } => println!("slot {index}: {driver}"),
        SlotOutcome::Disabled => {}
        SlotOutcome::Overlap { with } => println!("slot {index}: port already used by slot {with}"),
        SlotOutcome::UnknownDriver(name) => println!("slot {index}: unknown driver {name:?}"),
        SlotOutcome::OpenFailed(reason) => println!("slot {index}: {reason}"),
    }
}

fn format_opt(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{v:.1}{unit}"),
        None => "-".into(),
    }
}

fn print_nav(info: &NavInfo) {
    let location = info
        .location
        .map(|p| format!("{:.5},{:.5}", p.latitude, p.longitude))
        .unwrap_or_else(|| "-".into());
    println!(
        "pos {location}  alt {}  p-alt {}  vario {}  ias {}  mc {}  flarm {}",
        format_opt(info.gps_altitude, "m"),
        format_opt(info.pressure_altitude, "m"),
        format_opt(info.total_energy_vario, "m/s"),
        format_opt(info.indicated_airspeed, "m/s"),
        format_opt(info.settings.mac_cready.as_ref().map(|s| s.value), ""),
        if info.flarm.available { "yes" } else { "no" },
    );
}

async fn start(cli: &Cli) -> Result<DeviceRegistry> {
    if cli.devices.is_empty() {
        bail!("no devices given; use --device <port>=<driver>");
    }
    debug!(devices = ?cli.devices, "starting registry");
    let registry = glidelink::registry_builder()
        .slots(cli.devices.len())
        .validate_checksums(!cli.no_checksum)
        .build()?;
    let report = registry.startup(&cli.devices).await;
    for (index, outcome) in report.outcomes.iter().enumerate() {
        describe_outcome(index, outcome);
    }
    if report.opened() == 0 {
        bail!("no device could be opened");
    }
    Ok(registry)
}

fn logger_slot(registry: &DeviceRegistry, slot: Option<usize>) -> Result<&DeviceSlot> {
    let found = match slot {
        Some(index) => registry.slot(index).filter(|s| s.is_open()),
        None => registry.find_by_capability(DeviceSlot::is_logger),
    };
    found
        .map(|s| s.as_ref())
        .context("no open logger slot")
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_drivers() -> Result<()> {
    println!("{:<14} {:<20} capabilities", "name", "display name");
    for driver in glidelink::builtin_drivers() {
        let mut caps = Vec::new();
        if driver.supports_declare() {
            caps.push("declare");
        }
        if driver.is_logger() {
            caps.push("logger");
        }
        if driver.supports_nmea_out() {
            caps.push("nmea-out");
        }
        println!("{:<14} {:<20} {}", driver.name, driver.display_name, caps.join(", "));
    }
    Ok(())
}

async fn cmd_monitor(
    registry: &DeviceRegistry,
    duration_secs: u64,
    link_timeout: Duration,
    mac_cready: Option<f64>,
) -> Result<()> {
    let derived = DerivedInfo::default();
    if let Some(value) = mac_cready {
        registry.put_all(&Setting::MacCready(value), &derived).await;
    }

    println!("Monitoring (Ctrl-C to stop)...");
    let deadline = (duration_secs > 0)
        .then(|| tokio::time::Instant::now() + Duration::from_secs(duration_secs));
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                    println!("Monitor duration elapsed.");
                    break;
                }
                registry.tick_all(&derived).await;
                for index in registry.check_link_timeouts(link_timeout).await {
                    println!("[slot {index}] link timeout");
                }
                print_nav(&registry.merged());
            }
        }
    }
    Ok(())
}

async fn cmd_flights(slot: &DeviceSlot) -> Result<()> {
    let flights = slot.read_flight_list(&TerminalProgress).await?;
    eprintln!();
    if flights.is_empty() {
        println!("No flights stored.");
    }
    for flight in &flights {
        println!("{flight}");
    }
    Ok(())
}

async fn cmd_download(slot: &DeviceSlot, index: usize, output: &str) -> Result<()> {
    let flights = slot.read_flight_list(&TerminalProgress).await?;
    let flight = flights
        .iter()
        .find(|f| f.index == index)
        .with_context(|| format!("no flight with index {index} ({} stored)", flights.len()))?;
    let data = slot.download_flight(flight, &TerminalProgress).await?;
    eprintln!();
    tokio::fs::write(output, &data)
        .await
        .with_context(|| format!("writing {output}"))?;
    println!("Wrote {} bytes to {output}", data.len());
    Ok(())
}

async fn cmd_declare(slot: &DeviceSlot, declaration: &Declaration) -> Result<()> {
    slot.declare(declaration, &TerminalProgress).await?;
    eprintln!();
    println!("Task with {} points declared.", declaration.turnpoints.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // The `drivers` command does not open any port.
    if matches!(cli.command, Command::Drivers) {
        return cmd_drivers();
    }

    let registry = start(&cli).await?;

    let result = match &cli.command {
        Command::Drivers => unreachable!("drivers handled above"),
        Command::Monitor {
            duration,
            link_timeout,
            mac_cready,
        } => {
            cmd_monitor(
                &registry,
                *duration,
                Duration::from_secs(*link_timeout),
                *mac_cready,
            )
            .await
        }
        Command::Flights { slot } => match logger_slot(&registry, *slot) {
            Ok(slot) => cmd_flights(slot).await,
            Err(e) => Err(e),
        },
        Command::Download {
            slot,
            index,
            output,
        } => match logger_slot(&registry, *slot) {
            Ok(slot) => cmd_download(slot, *index, output).await,
            Err(e) => Err(e),
        },
        Command::Declare {
            slot,
            pilot,
            glider_type,
            glider_id,
            competition_id,
            points,
        } => {
            let declaration = Declaration {
                pilot_name: pilot.clone(),
                glider_type: glider_type.clone(),
                glider_id: glider_id.clone(),
                competition_id: competition_id.clone(),
                competition_class: String::new(),
                turnpoints: points.clone(),
            };
            match logger_slot(&registry, *slot) {
                Ok(slot) => cmd_declare(slot, &declaration).await,
                Err(e) => Err(e),
            }
        }
    };

    registry.shutdown().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_parsing() {
        let point = parse_point("LAKE: NORTH:47.25:-8.5").unwrap();
        assert_eq!(point.name, "LAKE: NORTH");
        assert_eq!(point.location, GeoPoint::new(47.25, -8.5));

        assert!(parse_point("A:91:0").is_err());
        assert!(parse_point("A:47").is_err());
        assert!(parse_point("A:x:8").is_err());
    }

    #[test]
    fn cli_parses_devices() {
        let cli = Cli::try_parse_from([
            "glidelink-monitor",
            "--device",
            "serial:0=Generic",
            "--device",
            "tcp:4353=NmeaOut",
            "monitor",
            "--duration",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.devices.len(), 2);
        assert_eq!(cli.devices[1].driver, "NmeaOut");
        assert!(matches!(cli.command, Command::Monitor { duration: 5, .. }));
    }
}
