//! Read-side counterpart to [`crate::builder`]: open a `.dat` file once,
//! then answer lookups against the mapped bytes with no further I/O.

use crate::error::CorruptFile;
use crate::format::{self, Header, PrefixEntry, RangeRecord, PREFIX_COUNT};
use anyhow::{Context, Result};
use hashbrown::HashMap;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::Path;

/// A `.dat` file mapped into memory, ready for repeated lookups.
///
/// `open` is the expensive part (mmap + header validation + building the
/// prefix map); `lookup` itself never touches the filesystem and never
/// panics, returning `""` on any miss or malformed input.
pub struct Searcher {
    mmap: Mmap,
    header: Header,
    prefixes: HashMap<u8, (u32, u32)>,
}

impl Searcher {
    /// Map `path` and validate its header. Fails if the file is too short
    /// or its header's internal invariants don't hold.
    pub fn open(path: &Path) -> Result<Searcher> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let mmap = unsafe { MmapOptions::new().map(&file) }
            .with_context(|| format!("mmap {}", path.display()))?;

        let header = Header::parse(&mmap).ok_or(CorruptFile {
            reason: "header too short or internally inconsistent",
        })?;

        let mut prefixes = HashMap::with_capacity(PREFIX_COUNT);
        for i in 0..PREFIX_COUNT {
            let offset = header.prefix_start_offset as usize + i * 9;
            let entry = PrefixEntry::read_at(&mmap, offset).ok_or(CorruptFile {
                reason: "prefix table truncated",
            })?;
            prefixes.insert(entry.prefix, (entry.start_index, entry.end_index));
        }

        Ok(Searcher {
            mmap,
            header,
            prefixes,
        })
    }

    /// Look up `ip` (dotted-quad string) and return its attribute string,
    /// or `""` if the address is malformed, outside every range, or the
    /// underlying file turns out to be truncated at read time.
    pub fn lookup(&self, ip: &str) -> String {
        let Some((target, prefix)) = format::parse_ip_for_lookup(ip) else {
            return String::new();
        };

        let Some(&(start_index, end_index)) = self.prefixes.get(&prefix) else {
            return String::new();
        };
        if start_index > end_index {
            return String::new();
        }

        let Some(index) = self.leftmost_covering(start_index, end_index, target) else {
            return String::new();
        };

        let Some(record) = RangeRecord::read_at(&self.mmap, self.header.first_start_ip_offset, index) else {
            return String::new();
        };
        if target < record.start_ip || target > record.end_ip {
            return String::new();
        }

        let start = record.local_offset as usize;
        let end = start + record.local_length as usize;
        match self.mmap.get(start..end) {
            Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            None => String::new(),
        }
    }

    /// Binary search the `[start_index, end_index]` span (all sharing
    /// `prefix`, sorted by `start_ip`) for the leftmost record whose
    /// `end_ip >= target`. That record is the only one that can cover
    /// `target`, since ranges are non-overlapping and sorted; if its
    /// `start_ip` is still greater than `target`, there is no match.
    fn leftmost_covering(&self, start_index: u32, end_index: u32, target: u32) -> Option<u32> {
        let mut lo = start_index;
        let mut hi = end_index;
        let mut result = None;

        loop {
            let mid = lo + (hi - lo) / 2;
            let end_ip = RangeRecord::read_end_ip_at(&self.mmap, self.header.first_start_ip_offset, mid)?;

            if end_ip >= target {
                result = Some(mid);
                if mid == 0 {
                    break;
                }
                hi = mid - 1;
            } else {
                lo = mid + 1;
            }

            if lo > hi {
                break;
            }
        }

        result
    }
}

/// Convenience one-shot lookup: open `path`, look up `ip`, drop the map.
/// Prefer [`Searcher::open`] directly for repeated queries against the
/// same file.
pub fn search(path: &Path, ip: &str) -> Result<String> {
    let searcher = Searcher::open(path)?;
    Ok(searcher.lookup(ip))
}
