//! Store-only ZIP archives.
//!
//! Layout (all integers little-endian):
//! ```text
//! [local header 30 + name][payload] ... [central record 46 + name] ... [EOCD 22]
//! ```
//! Only method 0 (stored) is written or accepted. No zip64, no data
//! descriptors, no archive comment on write.

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Timelike};
use eclipse_core::{EclipseError, EclipseResult};
use tracing::debug;

use crate::crc32;

const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
const EOCD_SIG: u32 = 0x0605_4b50;

const LOCAL_HEADER_LEN: usize = 30;
const CENTRAL_HEADER_LEN: usize = 46;
const EOCD_LEN: usize = 22;
const MAX_COMMENT_LEN: usize = 0xFFFF;

const VERSION: u16 = 20;
const METHOD_STORED: u16 = 0;
/// General purpose flag bit 11: names are UTF-8.
const FLAG_UTF8: u16 = 0x0800;

/// One file inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEntry {
    pub name: String,
    pub content: String,
}

impl ContainerEntry {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Wrap one document, stamped with the current local time.
pub fn encode(file_name: &str, content: &str) -> EclipseResult<Vec<u8>> {
    encode_at(file_name, content, Local::now().naive_local())
}

pub fn encode_at(file_name: &str, content: &str, modified: NaiveDateTime) -> EclipseResult<Vec<u8>> {
    encode_entries_at(&[ContainerEntry::new(file_name, content)], modified)
}

pub fn encode_entries(entries: &[ContainerEntry]) -> EclipseResult<Vec<u8>> {
    encode_entries_at(entries, Local::now().naive_local())
}

pub fn encode_entries_at(entries: &[ContainerEntry], modified: NaiveDateTime) -> EclipseResult<Vec<u8>> {
    if entries.len() > u16::MAX as usize {
        return Err(EclipseError::InvalidContainer("too many entries".into()));
    }
    let (dos_time, dos_date) = dos_timestamp(modified);

    let mut out = Vec::new();
    let mut central = Vec::new();

    for entry in entries {
        let name = entry.name.as_bytes();
        let payload = entry.content.as_bytes();
        let name_len = u16::try_from(name.len())
            .map_err(|_| EclipseError::InvalidContainer(format!("entry name too long: {}", entry.name)))?;
        let size = u32::try_from(payload.len())
            .map_err(|_| EclipseError::InvalidContainer(format!("entry too large: {}", entry.name)))?;
        let offset = u32::try_from(out.len())
            .map_err(|_| EclipseError::InvalidContainer("archive exceeds 4 GiB".into()))?;
        let crc = crc32::checksum(payload);
        let flags = if entry.name.is_ascii() { 0 } else { FLAG_UTF8 };

        put_u32(&mut out, LOCAL_HEADER_SIG);
        put_u16(&mut out, VERSION);
        put_u16(&mut out, flags);
        put_u16(&mut out, METHOD_STORED);
        put_u16(&mut out, dos_time);
        put_u16(&mut out, dos_date);
        put_u32(&mut out, crc);
        put_u32(&mut out, size);
        put_u32(&mut out, size);
        put_u16(&mut out, name_len);
        put_u16(&mut out, 0);
        out.extend_from_slice(name);
        out.extend_from_slice(payload);

        put_u32(&mut central, CENTRAL_HEADER_SIG);
        put_u16(&mut central, VERSION);
        put_u16(&mut central, VERSION);
        put_u16(&mut central, flags);
        put_u16(&mut central, METHOD_STORED);
        put_u16(&mut central, dos_time);
        put_u16(&mut central, dos_date);
        put_u32(&mut central, crc);
        put_u32(&mut central, size);
        put_u32(&mut central, size);
        put_u16(&mut central, name_len);
        put_u16(&mut central, 0); // extra
        put_u16(&mut central, 0); // comment
        put_u16(&mut central, 0); // disk number start
        put_u16(&mut central, 0); // internal attributes
        put_u32(&mut central, 0); // external attributes
        put_u32(&mut central, offset);
        central.extend_from_slice(name);
    }

    let cd_offset = u32::try_from(out.len())
        .map_err(|_| EclipseError::InvalidContainer("archive exceeds 4 GiB".into()))?;
    let cd_size = central.len() as u32;
    out.extend_from_slice(&central);

    let count = entries.len() as u16;
    put_u32(&mut out, EOCD_SIG);
    put_u16(&mut out, 0);
    put_u16(&mut out, 0);
    put_u16(&mut out, count);
    put_u16(&mut out, count);
    put_u32(&mut out, cd_size);
    put_u32(&mut out, cd_offset);
    put_u16(&mut out, 0);

    debug!(entries = entries.len(), bytes = out.len(), "encoded container");
    Ok(out)
}

/// Unwrap the first document of a container.
pub fn decode(bytes: &[u8]) -> EclipseResult<ContainerEntry> {
    decode_entries(bytes)?
        .into_iter()
        .next()
        .ok_or_else(|| EclipseError::InvalidContainer("archive has no entries".into()))
}

pub fn decode_entries(bytes: &[u8]) -> EclipseResult<Vec<ContainerEntry>> {
    let eocd = find_eocd(bytes)?;
    let count = read_u16(bytes, eocd + 10)? as usize;
    let cd_offset = read_u32(bytes, eocd + 16)? as usize;

    let mut entries = Vec::with_capacity(count);
    let mut pos = cd_offset;
    for _ in 0..count {
        if read_u32(bytes, pos)? != CENTRAL_HEADER_SIG {
            return Err(invalid("bad central directory signature"));
        }
        let method = read_u16(bytes, pos + 10)?;
        if method != METHOD_STORED {
            return Err(EclipseError::UnsupportedCompression(method));
        }
        let crc = read_u32(bytes, pos + 16)?;
        let size = read_u32(bytes, pos + 20)? as usize;
        let name_len = read_u16(bytes, pos + 28)? as usize;
        let extra_len = read_u16(bytes, pos + 30)? as usize;
        let comment_len = read_u16(bytes, pos + 32)? as usize;
        let local_offset = read_u32(bytes, pos + 42)? as usize;

        let name_start = pos + CENTRAL_HEADER_LEN;
        let name = utf8(slice(bytes, name_start, name_len)?, "entry name")?;

        if read_u32(bytes, local_offset)? != LOCAL_HEADER_SIG {
            return Err(invalid("bad local header signature"));
        }
        let local_name_len = read_u16(bytes, local_offset + 26)? as usize;
        let local_extra_len = read_u16(bytes, local_offset + 28)? as usize;
        let data_start = local_offset + LOCAL_HEADER_LEN + local_name_len + local_extra_len;
        let payload = slice(bytes, data_start, size)?;

        let actual = crc32::checksum(payload);
        if actual != crc {
            return Err(invalid(&format!(
                "CRC mismatch for {name}: stored {crc:08x}, computed {actual:08x}"
            )));
        }

        let content = utf8(payload, "entry content")?;
        entries.push(ContainerEntry { name, content });
        pos = name_start + name_len + extra_len + comment_len;
    }

    debug!(entries = entries.len(), "decoded container");
    Ok(entries)
}

/// Scan backwards for the end-of-central-directory record.
fn find_eocd(bytes: &[u8]) -> EclipseResult<usize> {
    if bytes.len() < EOCD_LEN {
        return Err(invalid("buffer too short for end of central directory"));
    }
    let last = bytes.len() - EOCD_LEN;
    let first = last.saturating_sub(MAX_COMMENT_LEN);
    (first..=last)
        .rev()
        .find(|&pos| bytes[pos..pos + 4] == EOCD_SIG.to_le_bytes())
        .ok_or_else(|| invalid("end of central directory not found"))
}

/// DOS (time, date). Dates before 1980 clamp to 1980-01-01 00:00:00.
fn dos_timestamp(at: NaiveDateTime) -> (u16, u16) {
    let at = if at.year() < 1980 {
        NaiveDate::from_ymd_opt(1980, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or(at)
    } else {
        at
    };
    let time = ((at.hour() << 11) | (at.minute() << 5) | (at.second() / 2)) as u16;
    let year = (at.year() - 1980).min(127) as u32;
    let date = ((year << 9) | (at.month() << 5) | at.day()) as u16;
    (time, date)
}

fn invalid(msg: &str) -> EclipseError {
    EclipseError::InvalidContainer(msg.to_string())
}

fn slice(bytes: &[u8], start: usize, len: usize) -> EclipseResult<&[u8]> {
    start
        .checked_add(len)
        .and_then(|end| bytes.get(start..end))
        .ok_or_else(|| invalid("truncated archive"))
}

fn utf8(raw: &[u8], what: &str) -> EclipseResult<String> {
    String::from_utf8(raw.to_vec()).map_err(|_| invalid(&format!("{what} is not valid UTF-8")))
}

fn read_u16(bytes: &[u8], pos: usize) -> EclipseResult<u16> {
    let raw = slice(bytes, pos, 2)?;
    Ok(u16::from_le_bytes([raw[0], raw[1]]))
}

fn read_u32(bytes: &[u8], pos: usize) -> EclipseResult<u32> {
    let raw = slice(bytes, pos, 4)?;
    Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn layout_sizes() {
        let bytes = encode_at("backup.json", "{}", at(2026, 1, 1, 12, 0, 0)).unwrap();
        let name = "backup.json".len();
        assert_eq!(bytes.len(), LOCAL_HEADER_LEN + name + 2 + CENTRAL_HEADER_LEN + name + EOCD_LEN);
        assert_eq!(&bytes[..4], &[0x50, 0x4b, 0x03, 0x04]);
        assert_eq!(read_u16(&bytes, 8).unwrap(), METHOD_STORED);
        assert_eq!(read_u32(&bytes, 14).unwrap(), crc32::checksum(b"{}"));
    }

    #[test]
    fn dos_timestamp_packs_fields() {
        let (time, date) = dos_timestamp(at(2026, 1, 1, 12, 0, 0));
        assert_eq!(time, 12 << 11);
        assert_eq!(date, (46 << 9) | (1 << 5) | 1);
    }

    #[test]
    fn dos_timestamp_clamps_before_1980() {
        assert_eq!(dos_timestamp(at(1970, 6, 15, 8, 30, 10)), (0, (1 << 5) | 1));
    }

    #[test]
    fn entry_after_archive_comment_is_found() {
        let mut bytes = encode_at("a.json", "[]", at(2024, 5, 5, 5, 5, 5)).unwrap();
        let len = bytes.len();
        bytes[len - 2..].copy_from_slice(&5u16.to_le_bytes());
        bytes.extend_from_slice(b"hello");
        let entry = decode(&bytes).unwrap();
        assert_eq!(entry, ContainerEntry::new("a.json", "[]"));
    }

    #[test]
    fn corrupted_payload_fails_crc() {
        let mut bytes = encode_at("a.json", "{\"k\":1}", at(2024, 1, 1, 0, 0, 0)).unwrap();
        let payload_pos = LOCAL_HEADER_LEN + "a.json".len();
        bytes[payload_pos + 2] ^= 0x01;
        assert!(matches!(decode(&bytes), Err(EclipseError::InvalidContainer(_))));
    }

    #[test]
    fn deflate_method_rejected() {
        let mut bytes = encode_at("a.json", "{}", at(2024, 1, 1, 0, 0, 0)).unwrap();
        let cd = bytes.len() - EOCD_LEN - CENTRAL_HEADER_LEN - "a.json".len();
        bytes[cd + 10..cd + 12].copy_from_slice(&8u16.to_le_bytes());
        assert!(matches!(decode(&bytes), Err(EclipseError::UnsupportedCompression(8))));
    }

    #[test]
    fn truncated_archive_rejected() {
        let bytes = encode_at("a.json", "{}", at(2024, 1, 1, 0, 0, 0)).unwrap();
        assert!(matches!(decode(&bytes[10..]), Err(EclipseError::InvalidContainer(_))));
        assert!(matches!(decode(&[]), Err(EclipseError::InvalidContainer(_))));
    }
}
