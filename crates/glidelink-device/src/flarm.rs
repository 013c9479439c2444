//! Task declaration to a FLARM sharing the channel.
//!
//! Each setting is a `$PFLAC,S,<key>,<value>` sentence that FLARM echoes
//! back as `$PFLAC,A,<key>,...` once applied. Other sentences arriving in
//! between (FLARM keeps streaming) are skipped.

use std::time::Duration;

use glidelink_core::error::{Error, Result};
use glidelink_core::progress::ProgressSink;
use glidelink_core::transport::Transport;
use glidelink_core::types::{Declaration, GeoPoint};
use glidelink_line_io::{DecodeResult, decode_line};
use glidelink_nmea::format_sentence;
use tokio::time::Instant;
use tracing::{debug, info};

/// How long FLARM gets to acknowledge one setting.
const ACK_TIMEOUT: Duration = Duration::from_secs(2);
const ATTEMPTS: usize = 3;

/// FLARM rejects `,` and `*` inside values.
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == ',' || c == '*' { ' ' } else { c })
        .collect()
}

/// `DDMMmmmN,DDDMMmmmE`: degrees and thousandths of minutes.
fn format_location(location: &GeoPoint) -> String {
    fn split(value: f64) -> (u32, u32) {
        let thousandths = (value.abs() * 60_000.0).round() as u32;
        (thousandths / 60_000, thousandths % 60_000)
    }
    let (lat_deg, lat_min) = split(location.latitude);
    let (lon_deg, lon_min) = split(location.longitude);
    let ns = if location.latitude < 0.0 { 'S' } else { 'N' };
    let ew = if location.longitude < 0.0 { 'W' } else { 'E' };
    format!("{lat_deg:02}{lat_min:05}{ns},{lon_deg:03}{lon_min:05}{ew}")
}

/// Read lines until one starts with `prefix`, or until `deadline`.
async fn wait_for_line(
    port: &mut dyn Transport,
    prefix: &str,
    deadline: Instant,
) -> Result<String> {
    let mut pending = Vec::new();
    let mut buf = [0u8; 128];
    loop {
        loop {
            match decode_line(&pending) {
                DecodeResult::Line { text, consumed } => {
                    pending.drain(..consumed);
                    if text.starts_with(prefix) {
                        return Ok(text);
                    }
                }
                DecodeResult::Invalid(consumed) => {
                    pending.drain(..consumed);
                }
                DecodeResult::Incomplete => break,
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::Timeout);
        }
        let n = port.receive(&mut buf, remaining).await?;
        pending.extend_from_slice(&buf[..n]);
    }
}

/// Send one setting and wait for FLARM to acknowledge it.
async fn set(port: &mut dyn Transport, key: &str, value: &str) -> Result<()> {
    let sentence = format_sentence(&format!("PFLAC,S,{key},{value}"));
    let ack = format!("$PFLAC,A,{key}");

    for attempt in 1..=ATTEMPTS {
        port.send(sentence.as_bytes()).await?;
        let deadline = Instant::now() + ACK_TIMEOUT;
        match wait_for_line(port, "$PFLAC,A,", deadline).await {
            Ok(line) if line.starts_with(&ack) => return Ok(()),
            Ok(line) => {
                return Err(Error::Protocol(format!("FLARM refused {key}: {line}")));
            }
            Err(Error::Timeout) => debug!(key, attempt, "no FLARM acknowledgement"),
            Err(e) => return Err(e),
        }
    }
    Err(Error::Timeout)
}

/// Declare `declaration` to FLARM: pilot and glider data, then a new task
/// with the takeoff, every turnpoint and the landing.
pub async fn declare(
    port: &mut dyn Transport,
    declaration: &Declaration,
    progress: &dyn ProgressSink,
) -> Result<()> {
    if declaration.turnpoints.len() < 2 {
        return Err(Error::InvalidParameter(
            "declaration needs a start and a finish".into(),
        ));
    }

    progress.set_text("Declaring to FLARM");
    let total = declaration.turnpoints.len() + 7;
    progress.set_range(u32::try_from(total).unwrap_or(u32::MAX));
    let mut step = 0u32;
    let mut advance = || {
        step += 1;
        progress.set_position(step);
    };

    set(port, "PILOT", &sanitize(&declaration.pilot_name)).await?;
    advance();
    set(port, "GLIDERID", &sanitize(&declaration.glider_id)).await?;
    advance();
    set(port, "GLIDERTYPE", &sanitize(&declaration.glider_type)).await?;
    advance();
    set(port, "COMPID", &sanitize(&declaration.competition_id)).await?;
    advance();
    set(port, "COMPCLASS", &sanitize(&declaration.competition_class)).await?;
    advance();

    set(port, "NEWTASK", "Task").await?;
    advance();
    set(port, "ADDWP", "0000000N,00000000E,TAKEOFF").await?;
    for point in &declaration.turnpoints {
        let value = format!("{},{}", format_location(&point.location), sanitize(&point.name));
        set(port, "ADDWP", &value).await?;
        advance();
    }
    set(port, "ADDWP", "0000000N,00000000E,LANDING").await?;
    advance();

    info!(
        turnpoints = declaration.turnpoints.len(),
        "task declared to FLARM"
    );
    Ok(())
}
