use anyhow::Result;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use time::OffsetDateTime;

/// Create a file with given byte size
pub fn create_physical_file<P: AsRef<Path>>(path: P, size: u64) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true) // a stale image under the same name must not leak old bytes
        .write(true)
        .open(path)?;

    // Seek to size - 1, then write 1 byte.
    // This sizes the container without writing full content.
    if size > 0 {
        file.seek(SeekFrom::Start(size - 1))?;
        file.write_all(&[0])?;
    }

    Ok(())
}

/// Reads `end - start` bytes starting at `start` from an already open reader.
pub fn read_range<R: Read + Seek>(reader: &mut R, start: u64, end: u64) -> Result<Vec<u8>> {
    reader.seek(SeekFrom::Start(start))?;

    let length = end.saturating_sub(start);
    let mut buffer = vec![0u8; length as usize];
    reader.read_exact(&mut buffer)?;

    Ok(buffer)
}

/// Writes data to a specific range in a file, starting at `start`.
/// The `data` length determines how many bytes are written.
pub fn write_range(file: &mut File, start: u64, data: &[u8]) -> Result<()> {
    file.seek(SeekFrom::Start(start))?;
    file.write_all(data)?;
    Ok(())
}

/// ISO9660 "both-byte order" 32-bit field: little-endian copy then big-endian copy.
pub fn both_endian_u32(value: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&value.to_le_bytes());
    out[4..].copy_from_slice(&value.to_be_bytes());
    out
}

pub fn both_endian_u16(value: u16) -> [u8; 4] {
    let mut out = [0u8; 4];
    out[..2].copy_from_slice(&value.to_le_bytes());
    out[2..].copy_from_slice(&value.to_be_bytes());
    out
}

/// Reads the little-endian half of a both-endian 32-bit field.
pub fn read_both_u32(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

pub fn read_both_u16(data: &[u8]) -> u16 {
    u16::from_le_bytes([data[0], data[1]])
}

/// Space-pads (or truncates) `value` into a fixed-width identifier field.
pub fn padded<const N: usize>(value: &str) -> [u8; N] {
    let mut field = [b' '; N];
    for (slot, byte) in field.iter_mut().zip(value.bytes()) {
        *slot = byte;
    }
    field
}

/// Trims the space/NUL padding off an identifier field.
pub fn unpadded(field: &[u8]) -> String {
    String::from_utf8_lossy(field)
        .trim_end_matches([' ', '\0'])
        .to_string()
}

pub fn current_time() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// 17-byte volume descriptor timestamp (ECMA-119 8.4.26.1), always in UTC.
pub fn dec_datetime(time: OffsetDateTime) -> [u8; 17] {
    let digits = format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}{:02}",
        time.year().clamp(0, 9999),
        u8::from(time.month()),
        time.day(),
        time.hour(),
        time.minute(),
        time.second(),
        time.millisecond() / 10,
    );
    let mut out = [0u8; 17];
    out[..16].copy_from_slice(digits.as_bytes());
    out
}

/// Unset volume descriptor timestamp: sixteen ASCII zeros and a zero offset.
pub fn dec_datetime_unset() -> [u8; 17] {
    let mut out = [b'0'; 17];
    out[16] = 0;
    out
}

/// 7-byte directory record timestamp (ECMA-119 9.1.5), always in UTC.
pub fn record_datetime(time: OffsetDateTime) -> [u8; 7] {
    [
        (time.year() - 1900).clamp(0, 255) as u8,
        u8::from(time.month()),
        time.day(),
        time.hour(),
        time.minute(),
        time.second(),
        0,
    ]
}

/// Number of whole sectors needed for `bytes`.
pub fn sectors_for(bytes: u64, sector_size: u64) -> u64 {
    bytes.div_ceil(sector_size)
}
