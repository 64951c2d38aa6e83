//! The on-disk binary layout shared by the location and ASN datasets.
//!
//! This module owns no flavor-specific knowledge: it only knows how bytes
//! are arranged. [`crate::builder`] writes this layout, [`crate::searcher`]
//! reads it back.
//!
//! ## Layout
//!
//! ```text
//! +0  u32  first_start_ip_offset   // start of the range index
//! +4  u32  reserved (zero)
//! +8  u32  prefix_start_offset     // == HEADER_LEN
//! +12 u32  prefix_end_offset       // last byte of the prefix table
//! +16 ..   prefix table            // 256 entries of PREFIX_ENTRY_LEN bytes
//! ..       range index             // N entries of RECORD_LEN bytes
//! ..       payload area            // concatenated attribute strings
//! ```
//!
//! This crate writes and reads only the 4-byte-offset, dense-256-entry
//! dialect: a 4-byte `local_offset` removes the 16 MiB payload-area limit
//! a 3-byte offset would impose, and a dense, always-256-entry prefix
//! table keeps every record's bucket lookup a fixed, branch-free array
//! index instead of a conditional sparse scan.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Write};

/// Size in bytes of the fixed file header.
pub const HEADER_LEN: u32 = 16;

/// Number of entries in the dense prefix table (one per possible high octet).
pub const PREFIX_COUNT: usize = 256;

/// Byte size of a single prefix-table entry: `u8 prefix, u32 start_index, u32 end_index`.
pub const PREFIX_ENTRY_LEN: u32 = 9;

/// Byte size of a single range record: `u32 start_ip, u32 end_ip, u32 local_offset, u8 local_length`.
pub const RECORD_LEN: u32 = 13;

/// Parsed file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub first_start_ip_offset: u32,
    pub prefix_start_offset: u32,
    pub prefix_end_offset: u32,
}

impl Header {
    /// Write the 16-byte header at the start of `out`. Bytes `[4..8]` are
    /// reserved and always written as zero.
    pub fn write(&self, out: &mut impl Write) -> io::Result<()> {
        out.write_u32::<LittleEndian>(self.first_start_ip_offset)?;
        out.write_u32::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(self.prefix_start_offset)?;
        out.write_u32::<LittleEndian>(self.prefix_end_offset)?;
        Ok(())
    }

    /// Parse and validate a header from the start of `data`.
    ///
    /// Returns `None` if `data` is too short or the header's internal
    /// invariants don't hold; callers treat that as a corrupt file.
    pub fn parse(data: &[u8]) -> Option<Header> {
        if data.len() < HEADER_LEN as usize {
            return None;
        }
        let mut cur = &data[0..16];
        let first_start_ip_offset = cur.read_u32::<LittleEndian>().ok()?;
        let _reserved = cur.read_u32::<LittleEndian>().ok()?;
        let prefix_start_offset = cur.read_u32::<LittleEndian>().ok()?;
        let prefix_end_offset = cur.read_u32::<LittleEndian>().ok()?;

        if prefix_end_offset < prefix_start_offset {
            return None;
        }
        let span = prefix_end_offset - prefix_start_offset + 1;
        if span % PREFIX_ENTRY_LEN != 0 {
            return None;
        }
        if first_start_ip_offset != prefix_end_offset + 1 {
            return None;
        }

        Some(Header {
            first_start_ip_offset,
            prefix_start_offset,
            prefix_end_offset,
        })
    }
}

/// A single dense prefix-table entry as read back from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixEntry {
    pub prefix: u8,
    pub start_index: u32,
    pub end_index: u32,
}

impl PrefixEntry {
    pub fn write(&self, out: &mut impl Write) -> io::Result<()> {
        out.write_u8(self.prefix)?;
        out.write_u32::<LittleEndian>(self.start_index)?;
        out.write_u32::<LittleEndian>(self.end_index)?;
        Ok(())
    }

    /// Read one entry out of `data` at `offset`. Returns `None` on truncation.
    pub fn read_at(data: &[u8], offset: usize) -> Option<PrefixEntry> {
        let entry = data.get(offset..offset + PREFIX_ENTRY_LEN as usize)?;
        let prefix = entry[0];
        let start_index = u32::from_le_bytes(entry[1..5].try_into().ok()?);
        let end_index = u32::from_le_bytes(entry[5..9].try_into().ok()?);
        Some(PrefixEntry {
            prefix,
            start_index,
            end_index,
        })
    }
}

/// A single range record as read back from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRecord {
    pub start_ip: u32,
    pub end_ip: u32,
    pub local_offset: u32,
    pub local_length: u8,
}

impl RangeRecord {
    pub fn write(&self, out: &mut impl Write) -> io::Result<()> {
        out.write_u32::<LittleEndian>(self.start_ip)?;
        out.write_u32::<LittleEndian>(self.end_ip)?;
        out.write_u32::<LittleEndian>(self.local_offset)?;
        out.write_u8(self.local_length)?;
        Ok(())
    }

    /// Read the record at logical index `index` within the range index
    /// that starts at `first_start_ip_offset`. Returns `None` on truncation.
    pub fn read_at(data: &[u8], first_start_ip_offset: u32, index: u32) -> Option<RangeRecord> {
        let offset = (first_start_ip_offset as u64 + index as u64 * RECORD_LEN as u64) as usize;
        let rec = data.get(offset..offset + RECORD_LEN as usize)?;
        let start_ip = u32::from_le_bytes(rec[0..4].try_into().ok()?);
        let end_ip = u32::from_le_bytes(rec[4..8].try_into().ok()?);
        let local_offset = u32::from_le_bytes(rec[8..12].try_into().ok()?);
        let local_length = rec[12];
        Some(RangeRecord {
            start_ip,
            end_ip,
            local_offset,
            local_length,
        })
    }

    /// Read just the `end_ip` field at `index`, the hot path for binary search.
    pub fn read_end_ip_at(data: &[u8], first_start_ip_offset: u32, index: u32) -> Option<u32> {
        let offset = (first_start_ip_offset as u64 + index as u64 * RECORD_LEN as u64 + 4) as usize;
        let bytes = data.get(offset..offset + 4)?;
        Some(u32::from_le_bytes(bytes.try_into().ok()?))
    }
}

/// Parse a dotted-quad IPv4 string into a host-order `u32` plus its first
/// octet (the bucketing prefix). Permissive: missing/unparseable quads
/// contribute 0.
pub fn dotted_quad_to_u32(s: &str) -> u32 {
    let mut result: u32 = 0;
    for (i, quad) in s.split('.').take(4).enumerate() {
        let n: u32 = quad.parse().unwrap_or(0);
        result |= n << (24 - 8 * i);
    }
    result
}

/// Split an IPv4 string into its `(int_ip, prefix)` pair for lookup.
///
/// Unlike [`dotted_quad_to_u32`] (used while parsing build input, which is
/// deliberately permissive), this is strict: it requires exactly four
/// dot-separated octets in `0..=255`. Anything else is a malformed address
/// and yields `None`, which callers turn into the empty-string miss.
pub fn parse_ip_for_lookup(ip: &str) -> Option<(u32, u8)> {
    let mut octets = [0u8; 4];
    let mut count = 0;
    for part in ip.split('.') {
        if count == 4 {
            return None;
        }
        octets[count] = part.parse::<u8>().ok()?;
        count += 1;
    }
    if count != 4 {
        return None;
    }
    let int_ip = u32::from_be_bytes(octets);
    Some((int_ip, octets[0]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_quad_round_trip() {
        assert_eq!(dotted_quad_to_u32("1.0.0.42"), 0x0100_002A);
        assert_eq!(dotted_quad_to_u32("0.0.0.0"), 0);
        assert_eq!(dotted_quad_to_u32("255.255.255.255"), u32::MAX);
    }

    #[test]
    fn dotted_quad_permissive_on_garbage() {
        // Missing/unparseable quads contribute 0.
        assert_eq!(dotted_quad_to_u32("1.0.0"), 0x0100_0000);
        assert_eq!(dotted_quad_to_u32("abc.0.0.1"), 0x0000_0001);
    }

    #[test]
    fn header_round_trip() {
        let h = Header {
            first_start_ip_offset: HEADER_LEN + PREFIX_COUNT as u32 * PREFIX_ENTRY_LEN,
            prefix_start_offset: HEADER_LEN,
            prefix_end_offset: HEADER_LEN + PREFIX_COUNT as u32 * PREFIX_ENTRY_LEN - 1,
        };
        let mut buf = Vec::new();
        h.write(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_LEN as usize);
        let parsed = Header::parse(&buf).unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn lookup_ip_parsing() {
        assert_eq!(parse_ip_for_lookup("1.0.0.42"), Some((0x0100_002A, 1)));
        assert_eq!(parse_ip_for_lookup("250.0.0.1"), Some((0xFA00_0001, 250)));
        assert_eq!(parse_ip_for_lookup("1.2.3"), None);
        assert_eq!(parse_ip_for_lookup("1.2.3.4.5"), None);
        assert_eq!(parse_ip_for_lookup("not.an.ip.addr"), None);
        assert_eq!(parse_ip_for_lookup("1.2.3.256"), None);
    }

    #[test]
    fn header_rejects_bad_span() {
        let mut buf = vec![0u8; 16];
        buf[0..4].copy_from_slice(&20u32.to_le_bytes());
        buf[8..12].copy_from_slice(&16u32.to_le_bytes());
        buf[12..16].copy_from_slice(&18u32.to_le_bytes()); // span = 3, not divisible by 9
        assert!(Header::parse(&buf).is_none());
    }
}
