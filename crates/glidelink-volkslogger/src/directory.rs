//! The flight directory returned by the directory command.
//!
//! A list of 32-byte entries, most recent flight first, terminated by an
//! entry whose first byte is `0xFF`:
//!
//! | offset | size | field                          |
//! |--------|------|--------------------------------|
//! | 0      | 2    | logger serial number (BE)      |
//! | 2      | 1    | flight index                   |
//! | 3      | 3    | day, month, year - 2000        |
//! | 6      | 3    | takeoff hour, minute, second   |
//! | 9      | 3    | landing hour, minute, second   |
//! | 12     | 16   | pilot, NUL padded              |
//! | 28     | 3    | competition id, NUL padded     |
//! | 31     | 1    | flags                          |

use bytes::{Buf, BufMut, BytesMut};
use glidelink_core::types::{BrokenDate, BrokenTime, RecordedFlight};

pub const ENTRY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryEntry {
    pub serial: u16,
    pub flight: u8,
    pub date: BrokenDate,
    pub takeoff: BrokenTime,
    pub landing: BrokenTime,
    pub pilot: String,
    pub competition_id: String,
    pub flags: u8,
}

fn put_padded(buf: &mut BytesMut, text: &str, len: usize) {
    let mut bytes: Vec<u8> = text.bytes().filter(u8::is_ascii).take(len).collect();
    bytes.resize(len, 0);
    buf.put_slice(&bytes);
}

fn get_padded(buf: &mut &[u8], len: usize) -> String {
    let bytes = &buf[..len];
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(len);
    let text = String::from_utf8_lossy(&bytes[..end]).trim_end().to_string();
    buf.advance(len);
    text
}

fn get_time(buf: &mut &[u8]) -> BrokenTime {
    BrokenTime::new(buf.get_u8(), buf.get_u8(), buf.get_u8())
}

impl DirectoryEntry {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(ENTRY_LEN);
        buf.put_u16(self.serial);
        buf.put_u8(self.flight);
        buf.put_u8(self.date.day);
        buf.put_u8(self.date.month);
        buf.put_u8(self.date.year.saturating_sub(2000) as u8);
        for time in [self.takeoff, self.landing] {
            buf.put_u8(time.hour);
            buf.put_u8(time.minute);
            buf.put_u8(time.second);
        }
        put_padded(&mut buf, &self.pilot, 16);
        put_padded(&mut buf, &self.competition_id, 3);
        buf.put_u8(self.flags);
        buf.to_vec()
    }

    /// Parse one entry; `None` for the terminator or a short slice.
    pub fn from_bytes(bytes: &[u8]) -> Option<DirectoryEntry> {
        if bytes.len() < ENTRY_LEN || bytes[0] == 0xFF {
            return None;
        }
        let mut buf = &bytes[..ENTRY_LEN];
        let serial = buf.get_u16();
        let flight = buf.get_u8();
        let day = buf.get_u8();
        let month = buf.get_u8();
        let year = 2000 + u16::from(buf.get_u8());
        let takeoff = get_time(&mut buf);
        let landing = get_time(&mut buf);
        let pilot = get_padded(&mut buf, 16);
        let competition_id = get_padded(&mut buf, 3);
        let flags = buf.get_u8();

        Some(DirectoryEntry {
            serial,
            flight,
            date: BrokenDate::new(year, month, day),
            takeoff,
            landing,
            pilot,
            competition_id,
            flags,
        })
    }
}

/// Parse a directory block up to its terminator.
pub fn parse_directory(block: &[u8]) -> Vec<DirectoryEntry> {
    block
        .chunks(ENTRY_LEN)
        .map_while(DirectoryEntry::from_bytes)
        .collect()
}

impl From<&DirectoryEntry> for RecordedFlight {
    fn from(entry: &DirectoryEntry) -> Self {
        RecordedFlight {
            index: usize::from(entry.flight),
            date: entry.date,
            start_time: entry.takeoff,
            end_time: entry.landing,
            pilot: entry.pilot.clone(),
            competition_id: entry.competition_id.clone(),
        }
    }
}
