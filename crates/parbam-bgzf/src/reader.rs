//! BGZF block layout and header validation.
//!
//! # BGZF Format
//!
//! BGZF stores data in independent gzip members, each holding at most 64KB of
//! uncompressed data:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Header (18 bytes)                                               │
//! │  - Magic: 0x1f 0x8b (gzip)                                      │
//! │  - Method: 0x08 (deflate)                                       │
//! │  - Flags: 0x04 (FEXTRA)                                         │
//! │  - MTIME, XFL, OS: 6 bytes                                      │
//! │  - XLEN: 2 bytes (= 6)                                          │
//! │  - Subfield: "BC" + len(2) + BSIZE(2)                           │
//! │    where BSIZE = total_block_size - 1                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Compressed payload (raw deflate)                                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Trailer (8 bytes)                                               │
//! │  - CRC32: 4 bytes                                               │
//! │  - ISIZE: 4 bytes (uncompressed size)                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A stream ends with [`BGZF_EOF`], an empty block whose ISIZE is zero.

use std::io;

/// Size of the BGZF block header.
pub const BGZF_HEADER_SIZE: usize = 18;

/// Size of the BGZF block trailer (CRC32 + ISIZE).
pub const BGZF_FOOTER_SIZE: usize = 8;

/// Maximum uncompressed size of a single block.
pub const MAX_BLOCK_SIZE: usize = 64 * 1024;

/// BGZF EOF marker block (empty block signaling end of file).
pub const BGZF_EOF: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02, 0x00,
    0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Read a little-endian `u32` starting at `offset`.
///
/// # Panics
///
/// Panics if `data` holds fewer than `offset + 4` bytes.
#[inline]
#[must_use]
pub fn read_le_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

/// Validate a BGZF header and return the size of the compressed payload.
///
/// The payload size excludes both the header and the 8-byte trailer, so a
/// caller holding the header must read `payload_size + BGZF_FOOTER_SIZE`
/// further bytes to complete the block.
///
/// # Errors
///
/// Returns an `InvalidData` error if the magic bytes, compression method,
/// FEXTRA flag or `BC` subfield are wrong, or if BSIZE is too small to hold
/// a header and trailer.
pub fn parse_header(header: &[u8; BGZF_HEADER_SIZE]) -> io::Result<usize> {
    if header[0] != 0x1f || header[1] != 0x8b {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Invalid BGZF magic: expected 0x1f 0x8b, got 0x{:02x} 0x{:02x}",
                header[0], header[1]
            ),
        ));
    }

    if header[2] != 0x08 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid compression method: expected 0x08, got 0x{:02x}", header[2]),
        ));
    }

    if header[3] & 0x04 == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "BGZF block missing FEXTRA flag"));
    }

    if header[12] != b'B' || header[13] != b'C' {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Invalid BGZF subfield ID: expected 'BC', got '{}{}'",
                header[12] as char, header[13] as char
            ),
        ));
    }

    // BSIZE = total_block_size - 1
    let block_size = u16::from_le_bytes([header[16], header[17]]) as usize + 1;
    if block_size < BGZF_HEADER_SIZE + BGZF_FOOTER_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("BGZF block too small: {block_size} bytes"),
        ));
    }

    Ok(block_size - BGZF_HEADER_SIZE - BGZF_FOOTER_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eof_block_header() {
        let header: [u8; BGZF_HEADER_SIZE] = BGZF_EOF[..BGZF_HEADER_SIZE].try_into().unwrap();
        // 28-byte block: 18 header + 2 payload + 8 trailer
        assert_eq!(parse_header(&header).unwrap(), 2);
        assert_eq!(read_le_u32(&BGZF_EOF, BGZF_EOF.len() - 4), 0);
    }

    #[test]
    fn test_invalid_magic() {
        let mut header = [0u8; BGZF_HEADER_SIZE];
        header.copy_from_slice(&BGZF_EOF[..BGZF_HEADER_SIZE]);
        header[1] = 0x00;
        let err = parse_header(&header).unwrap_err();
        assert!(err.to_string().contains("Invalid BGZF magic"));
    }

    #[test]
    fn test_missing_bc_subfield() {
        let mut header = [0u8; BGZF_HEADER_SIZE];
        header.copy_from_slice(&BGZF_EOF[..BGZF_HEADER_SIZE]);
        header[12] = b'X';
        let err = parse_header(&header).unwrap_err();
        assert!(err.to_string().contains("'BC'"));
    }

    #[test]
    fn test_block_size_too_small() {
        let mut header = [0u8; BGZF_HEADER_SIZE];
        header.copy_from_slice(&BGZF_EOF[..BGZF_HEADER_SIZE]);
        header[16] = 10;
        header[17] = 0;
        let err = parse_header(&header).unwrap_err();
        assert!(err.to_string().contains("too small"));
    }

    #[test]
    fn test_read_le_u32() {
        let data = [0xff, 0x78, 0x56, 0x34, 0x12];
        assert_eq!(read_le_u32(&data, 1), 0x1234_5678);
    }
}
