//! TFRecord framing.
//!
//! Each record is `len: u64 LE | masked_crc(len): u32 LE | data | masked_crc(data): u32 LE`.

use std::io::{ErrorKind, Read, Write};

use crate::{Error, Result};

const CASTAGNOLI: u32 = 0x82F6_3B78;
const MASK_DELTA: u32 = 0xA282_EAD8;

/// Largest record accepted by [`read_record`].
pub const MAX_RECORD_LEN: u64 = 1 << 30;

const CRC_TABLE: [u32; 256] = crc_table();

const fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        #[allow(clippy::cast_possible_truncation)]
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 == 1 {
                (crc >> 1) ^ CASTAGNOLI
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC-32C (Castagnoli) of `data`.
#[must_use]
pub fn crc32c(data: &[u8]) -> u32 {
    !data.iter().fold(!0u32, |crc, &byte| {
        CRC_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
    })
}

/// TFRecord's masked CRC.
#[must_use]
pub fn masked_crc32c(data: &[u8]) -> u32 {
    crc32c(data).rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Frame and write one record.
///
/// # Errors
///
/// Returns `Io` if the writer fails.
pub fn write_record<W: Write>(writer: &mut W, data: &[u8]) -> Result<()> {
    let len = (data.len() as u64).to_le_bytes();
    writer.write_all(&len)?;
    writer.write_all(&masked_crc32c(&len).to_le_bytes())?;
    writer.write_all(data)?;
    writer.write_all(&masked_crc32c(data).to_le_bytes())?;
    Ok(())
}

/// Read one record; `None` at a clean end of stream.
///
/// # Errors
///
/// Returns `CorruptRecord` on a checksum mismatch, a truncated record
/// (including a partial length header) or a length above
/// [`MAX_RECORD_LEN`].
pub fn read_record<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len = [0u8; 8];
    if !read_header(reader, &mut len)? {
        return Ok(None);
    }
    if read_u32(reader)? != masked_crc32c(&len) {
        return Err(Error::CorruptRecord("length checksum mismatch".to_string()));
    }

    let len = u64::from_le_bytes(len);
    if len > MAX_RECORD_LEN {
        return Err(Error::CorruptRecord(format!(
            "record length {len} exceeds {MAX_RECORD_LEN} bytes"
        )));
    }
    // Allocation follows the bytes present, not the header.
    let mut data = Vec::new();
    reader.by_ref().take(len).read_to_end(&mut data)?;
    if data.len() as u64 != len {
        return Err(Error::CorruptRecord("truncated record".to_string()));
    }
    if read_u32(reader)? != masked_crc32c(&data) {
        return Err(Error::CorruptRecord("data checksum mismatch".to_string()));
    }
    Ok(Some(data))
}

/// Fill the length header. `false` if the stream ended before its first
/// byte; a stream ending inside it is truncation.
fn read_header<R: Read>(reader: &mut R, buf: &mut [u8; 8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(Error::CorruptRecord("truncated record".to_string())),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(truncated)?;
    Ok(u32::from_le_bytes(buf))
}

fn truncated(e: std::io::Error) -> Error {
    if e.kind() == ErrorKind::UnexpectedEof {
        Error::CorruptRecord("truncated record".to_string())
    } else {
        Error::Io(e)
    }
}
