//! The logger's 16 KiB database block.
//!
//! The block has two halves:
//!
//! - `0x0000..0x3000`: a directory of eight 6-byte region entries
//!   (`first: u16`, `last: u16`, `record_len: u8`, `key_len: u8`, all
//!   big-endian, `first == 0xFFFF` for an empty region) followed by the
//!   fixed-size records of each region.
//! - `0x3000..0x4000`: the flight declaration as a list of tagged fields
//!   `[len, id, payload...]` where `len` counts the two header bytes,
//!   terminated by `0xFF`.
//!
//! Unused bytes are `0xFF`. Coordinates are stored in 1/60000 degree.

use bytes::{Buf, BufMut, BytesMut};
use glidelink_core::error::{Error, Result};
use glidelink_core::types::{GeoPoint, ObservationZone};

/// Size of the database block.
pub const DATABASE_SIZE: usize = 0x4000;
/// Start of the declaration area.
const FDF_START: usize = 0x3000;
const DIRECTORY_ENTRIES: usize = 8;
const RECORDS_START: usize = DIRECTORY_ENTRIES * 6;

const REGION_WAYPOINTS: usize = 0;
const REGION_PILOTS: usize = 1;
const REGION_ROUTES: usize = 3;

const WAYPOINT_LEN: usize = 13;
const DECLARATION_WAYPOINT_LEN: usize = WAYPOINT_LEN + 3;
const PILOT_LEN: usize = 17;
const ROUTE_NAME_LEN: usize = 14;
const ROUTE_LEN: usize = ROUTE_NAME_LEN + MAX_ROUTE_WAYPOINTS * WAYPOINT_LEN;

/// Waypoints per stored route.
pub const MAX_ROUTE_WAYPOINTS: usize = 10;
/// Turnpoints per declaration, excluding start and finish.
pub const MAX_TURNPOINTS: usize = 12;

const COORDINATE_SCALE: f64 = 60000.0;

mod field {
    pub const PILOT1: u8 = 0x01;
    pub const GLIDER_TYPE: u8 = 0x05;
    pub const GLIDER_ID: u8 = 0x06;
    pub const COMPETITION_ID: u8 = 0x07;
    pub const COMPETITION_CLASS: u8 = 0x08;
    pub const TURNPOINT_COUNT: u8 = 0x10;
    pub const TAKEOFF: u8 = 0x20;
    pub const START: u8 = 0x21;
    pub const FINISH: u8 = 0x22;
    pub const TURNPOINT1: u8 = 0x31;
}

/// Waypoint attribute bits (low seven bits of the type byte).
pub mod kind {
    pub const LANDABLE: u8 = 0x01;
    pub const HARD_SURFACE: u8 = 0x02;
    pub const AIRFIELD: u8 = 0x04;
    pub const CHECKPOINT: u8 = 0x08;
}

// ---------------------------------------------------------------
// Records
// ---------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Waypoint {
    /// Up to six characters, stored upper case.
    pub name: String,
    /// [`kind`] bits.
    pub kind: u8,
    pub location: GeoPoint,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeclarationWaypoint {
    pub waypoint: Waypoint,
    pub zone: ObservationZone,
    /// Zone orientation in degrees; stored with two-degree resolution.
    pub direction: u16,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Route {
    pub name: String,
    pub waypoints: Vec<Waypoint>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pilot {
    pub name: String,
}

/// The declaration as the logger stores it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VlDeclaration {
    pub pilot: String,
    pub glider_type: String,
    pub glider_id: String,
    pub competition_class: String,
    pub competition_id: String,
    pub takeoff: DeclarationWaypoint,
    pub start: DeclarationWaypoint,
    pub finish: DeclarationWaypoint,
    pub turnpoints: Vec<DeclarationWaypoint>,
}

/// Decoded contents of the database block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Database {
    pub waypoints: Vec<Waypoint>,
    pub pilots: Vec<Pilot>,
    pub routes: Vec<Route>,
    pub declaration: Option<VlDeclaration>,
}

// ---------------------------------------------------------------
// Field codecs
// ---------------------------------------------------------------

fn sanitize(c: char) -> u8 {
    if c.is_ascii() && !c.is_ascii_control() {
        c as u8
    } else {
        b'?'
    }
}

/// Upper-case, space-padded name of exactly `len` bytes.
fn put_name(buf: &mut impl BufMut, name: &str, len: usize) {
    let mut bytes: Vec<u8> = name
        .chars()
        .map(|c| sanitize(c.to_ascii_uppercase()))
        .take(len)
        .collect();
    bytes.resize(len, b' ');
    buf.put_slice(&bytes);
}

fn get_name(buf: &mut impl Buf, len: usize) -> String {
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8_lossy(&bytes)
        .trim_end_matches([' ', '\0', '\u{FFFD}'])
        .to_string()
}

/// NUL-terminated string truncated to `max` characters.
fn cstr_bytes(s: &str, max: usize) -> Vec<u8> {
    let mut bytes: Vec<u8> = s.chars().map(sanitize).take(max).collect();
    bytes.push(0);
    bytes
}

fn parse_cstr(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn put_waypoint(buf: &mut impl BufMut, waypoint: &Waypoint) {
    put_name(buf, &waypoint.name, 6);

    let GeoPoint {
        latitude,
        longitude,
    } = waypoint.location;
    let lat = ((latitude.abs() * COORDINATE_SCALE).round() as u32).min(0x7F_FFFF);
    let lon = ((longitude.abs() * COORDINATE_SCALE).round() as u32).min(0xFF_FFFF);

    let mut kind = waypoint.kind & 0x7F;
    if longitude < 0.0 {
        kind |= 0x80;
    }
    buf.put_u8(kind);

    let mut lat_high = (lat >> 16) as u8;
    if latitude < 0.0 {
        lat_high |= 0x80;
    }
    buf.put_u8(lat_high);
    buf.put_u16(lat as u16);
    buf.put_u8((lon >> 16) as u8);
    buf.put_u16(lon as u16);
}

fn get_waypoint(buf: &mut impl Buf) -> Waypoint {
    let name = get_name(buf, 6);
    let kind = buf.get_u8();
    let lat_high = buf.get_u8();
    let lat = (u32::from(lat_high & 0x7F) << 16) | u32::from(buf.get_u16());
    let lon = (u32::from(buf.get_u8()) << 16) | u32::from(buf.get_u16());

    let mut latitude = f64::from(lat) / COORDINATE_SCALE;
    if lat_high & 0x80 != 0 {
        latitude = -latitude;
    }
    let mut longitude = f64::from(lon) / COORDINATE_SCALE;
    if kind & 0x80 != 0 {
        longitude = -longitude;
    }

    Waypoint {
        name,
        kind: kind & 0x7F,
        location: GeoPoint::new(latitude, longitude),
    }
}

/// Largest line width (in 100 m) that splits into two 4-bit factors.
fn line_factors(width: u32) -> (u8, u8) {
    for w in (1..=width.min(225)).rev() {
        if let Some(f) = (1..=15u32).find(|f| w % f == 0 && w / f <= 15) {
            return (f as u8, (w / f) as u8);
        }
    }
    (1, 1)
}

/// Encode a zone as `(shape, parameter)`.
fn encode_zone(zone: ObservationZone) -> (u8, u8) {
    match zone {
        ObservationZone::Line { length } => {
            let width = (length / 100.0).round().max(1.0) as u32;
            let (w1, w2) = line_factors(width);
            (1, (w1 << 4) | w2)
        }
        ObservationZone::Cylinder { radius } => {
            let rz = (radius / 100.0).round().clamp(0.0, 15.0) as u8;
            (0, rz)
        }
        ObservationZone::Sector { radius } => {
            let rs = (radius / 1000.0).round().clamp(1.0, 15.0) as u8;
            (0, rs << 4)
        }
    }
}

fn decode_zone(shape: u8, parameter: u8) -> ObservationZone {
    let high = f64::from(parameter >> 4);
    let low = f64::from(parameter & 0x0F);
    if shape == 1 {
        ObservationZone::Line {
            length: high * low * 100.0,
        }
    } else if high > 0.0 {
        ObservationZone::Sector {
            radius: high * 1000.0,
        }
    } else {
        ObservationZone::Cylinder {
            radius: low * 100.0,
        }
    }
}

fn put_declaration_waypoint(buf: &mut impl BufMut, point: &DeclarationWaypoint) {
    put_waypoint(buf, &point.waypoint);
    let (shape, parameter) = encode_zone(point.zone);
    buf.put_u8(shape);
    buf.put_u8(parameter);
    buf.put_u8(((point.direction % 360) / 2) as u8);
}

fn get_declaration_waypoint(mut buf: &[u8]) -> Result<DeclarationWaypoint> {
    if buf.len() < DECLARATION_WAYPOINT_LEN {
        return Err(Error::Protocol(format!(
            "declaration waypoint too short: {} bytes",
            buf.len()
        )));
    }
    let waypoint = get_waypoint(&mut buf);
    let shape = buf.get_u8();
    let parameter = buf.get_u8();
    let direction = u16::from(buf.get_u8()) * 2;
    Ok(DeclarationWaypoint {
        waypoint,
        zone: decode_zone(shape, parameter),
        direction,
    })
}

// ---------------------------------------------------------------
// Block codec
// ---------------------------------------------------------------

fn put_field(fdf: &mut BytesMut, id: u8, payload: &[u8]) {
    fdf.put_u8((payload.len() + 2) as u8);
    fdf.put_u8(id);
    fdf.put_slice(payload);
}

fn encode_declaration(declaration: &VlDeclaration) -> Result<BytesMut> {
    if declaration.turnpoints.len() > MAX_TURNPOINTS {
        return Err(Error::InvalidParameter(format!(
            "{} turnpoints, the logger stores at most {MAX_TURNPOINTS}",
            declaration.turnpoints.len()
        )));
    }

    let mut fdf = BytesMut::new();
    let pilot: Vec<char> = declaration.pilot.chars().collect();
    for (i, part) in pilot.chunks(16).chain(std::iter::repeat(&[][..])).take(4).enumerate() {
        let mut bytes = cstr_bytes(&part.iter().collect::<String>(), 16);
        bytes.resize(PILOT_LEN, 0);
        put_field(&mut fdf, field::PILOT1 + i as u8, &bytes);
    }

    put_field(&mut fdf, field::GLIDER_TYPE, &cstr_bytes(&declaration.glider_type, 12));
    put_field(&mut fdf, field::GLIDER_ID, &cstr_bytes(&declaration.glider_id, 7));
    put_field(
        &mut fdf,
        field::COMPETITION_CLASS,
        &cstr_bytes(&declaration.competition_class, 12),
    );
    put_field(&mut fdf, field::COMPETITION_ID, &cstr_bytes(&declaration.competition_id, 3));

    let waypoint_field = |fdf: &mut BytesMut, id: u8, point: &DeclarationWaypoint| {
        let mut bytes = BytesMut::with_capacity(DECLARATION_WAYPOINT_LEN);
        put_declaration_waypoint(&mut bytes, point);
        put_field(fdf, id, &bytes);
    };

    waypoint_field(&mut fdf, field::TAKEOFF, &declaration.takeoff);
    put_field(&mut fdf, field::TURNPOINT_COUNT, &[declaration.turnpoints.len() as u8]);
    waypoint_field(&mut fdf, field::START, &declaration.start);
    waypoint_field(&mut fdf, field::FINISH, &declaration.finish);
    for (i, point) in declaration.turnpoints.iter().enumerate() {
        waypoint_field(&mut fdf, field::TURNPOINT1 + i as u8, point);
    }

    Ok(fdf)
}

fn decode_declaration(area: &[u8]) -> Result<Option<VlDeclaration>> {
    let mut fields: Vec<(u8, &[u8])> = Vec::new();
    let mut pos = 0;
    while pos < area.len() {
        let len = usize::from(area[pos]);
        if len == 0xFF {
            break;
        }
        if len < 2 || pos + len > area.len() {
            return Err(Error::Protocol(format!(
                "corrupt declaration field at {:#06x}",
                FDF_START + pos
            )));
        }
        fields.push((area[pos + 1], &area[pos + 2..pos + len]));
        pos += len;
    }

    let find = |id: u8| fields.iter().find(|(fid, _)| *fid == id).map(|(_, p)| *p);
    let (Some(start), Some(finish)) = (find(field::START), find(field::FINISH)) else {
        return Ok(None);
    };

    let start = get_declaration_waypoint(start)?;
    let finish = get_declaration_waypoint(finish)?;
    let takeoff = match find(field::TAKEOFF) {
        Some(p) => get_declaration_waypoint(p)?,
        None => start.clone(),
    };

    let count = find(field::TURNPOINT_COUNT)
        .and_then(|p| p.first().copied())
        .map_or(0, usize::from)
        .min(MAX_TURNPOINTS);
    let mut turnpoints = Vec::with_capacity(count);
    for i in 0..count {
        if let Some(p) = find(field::TURNPOINT1 + i as u8) {
            turnpoints.push(get_declaration_waypoint(p)?);
        }
    }

    let pilot: String = (0..4)
        .filter_map(|i| find(field::PILOT1 + i))
        .map(parse_cstr)
        .collect();
    let text = |id| find(id).map(parse_cstr).unwrap_or_default();

    Ok(Some(VlDeclaration {
        pilot,
        glider_type: text(field::GLIDER_TYPE),
        glider_id: text(field::GLIDER_ID),
        competition_class: text(field::COMPETITION_CLASS),
        competition_id: text(field::COMPETITION_ID),
        takeoff,
        start,
        finish,
        turnpoints,
    }))
}

impl Database {
    /// Serialize to a full [`DATABASE_SIZE`] block.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut regions: [(BytesMut, usize, u8); DIRECTORY_ENTRIES] =
            std::array::from_fn(|_| (BytesMut::new(), 0, 0));

        let (records, len, key) = &mut regions[REGION_WAYPOINTS];
        for waypoint in &self.waypoints {
            put_waypoint(records, waypoint);
        }
        (*len, *key) = (WAYPOINT_LEN, 6);

        let (records, len, key) = &mut regions[REGION_PILOTS];
        for pilot in &self.pilots {
            let mut bytes = cstr_bytes(&pilot.name, PILOT_LEN - 1);
            bytes.resize(PILOT_LEN, 0);
            records.put_slice(&bytes);
        }
        (*len, *key) = (PILOT_LEN, 16);

        let (records, len, key) = &mut regions[REGION_ROUTES];
        for route in &self.routes {
            if route.waypoints.len() > MAX_ROUTE_WAYPOINTS {
                return Err(Error::InvalidParameter(format!(
                    "route {} has {} waypoints, at most {MAX_ROUTE_WAYPOINTS} fit",
                    route.name,
                    route.waypoints.len()
                )));
            }
            put_name(records, &route.name, ROUTE_NAME_LEN);
            for waypoint in &route.waypoints {
                put_waypoint(records, waypoint);
            }
            records.put_bytes(0xFF, (MAX_ROUTE_WAYPOINTS - route.waypoints.len()) * WAYPOINT_LEN);
        }
        (*len, *key) = (ROUTE_LEN, ROUTE_NAME_LEN as u8);

        let mut block = BytesMut::with_capacity(DATABASE_SIZE);
        let mut data = BytesMut::new();
        for (records, len, key) in &regions {
            if records.is_empty() {
                block.put_bytes(0xFF, 6);
                continue;
            }
            let first = RECORDS_START + data.len();
            let last = first + records.len() - len;
            block.put_u16(first as u16);
            block.put_u16(last as u16);
            block.put_u8(*len as u8);
            block.put_u8(*key);
            data.extend_from_slice(records);
        }

        if RECORDS_START + data.len() > FDF_START {
            return Err(Error::InvalidParameter(format!(
                "database records need {} bytes, {} available",
                data.len(),
                FDF_START - RECORDS_START
            )));
        }
        block.extend_from_slice(&data);
        block.resize(FDF_START, 0xFF);

        if let Some(declaration) = &self.declaration {
            let fdf = encode_declaration(declaration)?;
            if fdf.len() >= DATABASE_SIZE - FDF_START {
                return Err(Error::InvalidParameter("declaration does not fit".into()));
            }
            block.extend_from_slice(&fdf);
        }
        block.resize(DATABASE_SIZE, 0xFF);

        Ok(block.to_vec())
    }

    /// Parse a block read from the logger. Short blocks are padded with
    /// `0xFF`.
    pub fn decode(block: &[u8]) -> Result<Database> {
        let mut block = block.to_vec();
        block.resize(DATABASE_SIZE, 0xFF);

        let mut db = Database::default();
        let mut directory = &block[..RECORDS_START];
        for region in 0..DIRECTORY_ENTRIES {
            let first = usize::from(directory.get_u16());
            let last = usize::from(directory.get_u16());
            let len = usize::from(directory.get_u8());
            directory.advance(1);

            let expected = match region {
                REGION_WAYPOINTS => WAYPOINT_LEN,
                REGION_PILOTS => PILOT_LEN,
                REGION_ROUTES => ROUTE_LEN,
                _ => continue,
            };
            if first == 0xFFFF {
                continue;
            }
            if len != expected
                || first < RECORDS_START
                || last < first
                || last + len > FDF_START
                || (last - first) % len != 0
            {
                return Err(Error::Protocol(format!(
                    "corrupt database directory entry {region}"
                )));
            }

            for offset in (first..=last).step_by(len) {
                let mut record = &block[offset..offset + len];
                match region {
                    REGION_WAYPOINTS => db.waypoints.push(get_waypoint(&mut record)),
                    REGION_PILOTS => db.pilots.push(Pilot {
                        name: parse_cstr(record),
                    }),
                    _ => {
                        let name = get_name(&mut record, ROUTE_NAME_LEN);
                        let waypoints = record
                            .chunks(WAYPOINT_LEN)
                            .filter(|slot| slot.iter().any(|&b| b != 0xFF))
                            .map(|mut slot| get_waypoint(&mut slot))
                            .collect();
                        db.routes.push(Route { name, waypoints });
                    }
                }
            }
        }

        db.declaration = decode_declaration(&block[FDF_START..])?;
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waypoint(name: &str, latitude: f64, longitude: f64) -> Waypoint {
        Waypoint {
            name: name.into(),
            kind: kind::CHECKPOINT,
            location: GeoPoint::new(latitude, longitude),
        }
    }

    fn point(name: &str, zone: ObservationZone) -> DeclarationWaypoint {
        DeclarationWaypoint {
            waypoint: waypoint(name, 47.5, 8.25),
            zone,
            direction: 90,
        }
    }

    #[test]
    fn empty_block_decodes_to_empty_database() {
        let db = Database::decode(&[0xFF; DATABASE_SIZE]).unwrap();
        assert_eq!(db, Database::default());

        let encoded = Database::default().encode().unwrap();
        assert_eq!(encoded, vec![0xFF; DATABASE_SIZE]);
    }

    #[test]
    fn short_block_is_padded() {
        let db = Database::decode(&[0xFF; 10]).unwrap();
        assert!(db.waypoints.is_empty());
    }

    #[test]
    fn waypoint_layout_and_signs() {
        let mut buf = BytesMut::new();
        put_waypoint(&mut buf, &waypoint("zürich", -33.5, -70.25));
        assert_eq!(buf.len(), WAYPOINT_LEN);
        assert_eq!(&buf[..6], b"Z?RICH");
        // longitude sign in the type byte, latitude sign in its top byte
        assert_eq!(buf[6], kind::CHECKPOINT | 0x80);
        assert_eq!(buf[7] & 0x80, 0x80);

        let decoded = get_waypoint(&mut &buf[..]);
        assert_eq!(decoded.name, "Z?RICH");
        assert_eq!(decoded.kind, kind::CHECKPOINT);
        assert!((decoded.location.latitude + 33.5).abs() < 1e-4);
        assert!((decoded.location.longitude + 70.25).abs() < 1e-4);
    }

    #[test]
    fn zone_encoding() {
        assert_eq!(encode_zone(ObservationZone::Cylinder { radius: 500.0 }), (0, 5));
        assert_eq!(encode_zone(ObservationZone::Sector { radius: 3000.0 }), (0, 0x30));
        // 1000 m line = 10 = 1 x 10
        assert_eq!(encode_zone(ObservationZone::Line { length: 1000.0 }), (1, 0x1A));
        // 17 is prime and > 15, falls back to 16 = 2 x 8
        assert_eq!(encode_zone(ObservationZone::Line { length: 1700.0 }), (1, 0x28));

        assert_eq!(decode_zone(0, 5), ObservationZone::Cylinder { radius: 500.0 });
        assert_eq!(decode_zone(0, 0x30), ObservationZone::Sector { radius: 3000.0 });
        assert_eq!(decode_zone(1, 0x28), ObservationZone::Line { length: 1600.0 });
    }

    #[test]
    fn database_round_trip() {
        // upper-case names within field widths, coordinates on the
        // 1/60000 degree grid and even directions survive unchanged
        let db = Database {
            waypoints: vec![waypoint("START", 47.25, 8.5), waypoint("TP1", 46.75, 7.25)],
            pilots: vec![Pilot {
                name: "Jo Example".into(),
            }],
            routes: vec![Route {
                name: "TRIANGLE".into(),
                waypoints: vec![waypoint("A", 47.0, 8.0), waypoint("B", -46.5, -9.75)],
            }],
            declaration: Some(VlDeclaration {
                pilot: "A pilot with a rather long name".into(),
                glider_type: "LS8".into(),
                glider_id: "D-1234".into(),
                competition_class: "Standard".into(),
                competition_id: "XY".into(),
                takeoff: point("HOME", ObservationZone::Cylinder { radius: 500.0 }),
                start: point("START", ObservationZone::Line { length: 1000.0 }),
                finish: point("FINISH", ObservationZone::Cylinder { radius: 1000.0 }),
                turnpoints: vec![point("TP1", ObservationZone::Sector { radius: 3000.0 })],
            }),
        };

        let block = db.encode().unwrap();
        assert_eq!(block.len(), DATABASE_SIZE);
        // waypoint region directory entry
        assert_eq!(&block[..6], &[0x00, 0x30, 0x00, 0x3D, 13, 6]);

        let decoded = Database::decode(&block).unwrap();
        assert_eq!(decoded, db);
    }

    #[test]
    fn too_many_turnpoints_rejected() {
        let db = Database {
            declaration: Some(VlDeclaration {
                turnpoints: vec![DeclarationWaypoint::default(); MAX_TURNPOINTS + 1],
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(db.encode(), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn corrupt_directory_rejected() {
        let mut block = vec![0xFF; DATABASE_SIZE];
        block[..6].copy_from_slice(&[0x00, 0x30, 0x00, 0x31, 13, 6]);
        assert!(matches!(Database::decode(&block), Err(Error::Protocol(_))));
    }
}
