//! Error and warning vocabulary.
//!
//! The library leans on `anyhow::{Result, bail, Context}` throughout. This
//! module adds the small bit of structure a build/lookup pipeline needs
//! beyond that: a distinct corrupt-file error so `Searcher::open` can fail
//! with a clear message, and a `BuildWarning` vocabulary so dropped rows
//! and overflowed lengths are reported to the caller instead of only
//! printed.

use std::fmt;

/// A single non-fatal issue noticed while building a `.dat` file.
///
/// Neither variant aborts a build; both are just recorded and handed back
/// in the `BuildReport`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildWarning {
    /// A line could not be parsed into a range record and was dropped.
    MalformedRow { line_no: usize, reason: String },
    /// A pool entry's attribute string exceeded 255 bytes; only the low
    /// byte of the length was written, so the stored length on disk does
    /// not match the text's true length.
    LengthOverflow { pool_index: usize, length: usize },
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildWarning::MalformedRow { line_no, reason } => {
                write!(f, "line {line_no}: {reason}, skipped")
            }
            BuildWarning::LengthOverflow { pool_index, length } => {
                write!(
                    f,
                    "pool entry {pool_index}: attribute length {length} exceeds 255, low byte written"
                )
            }
        }
    }
}

/// Thrown by [`crate::searcher::Searcher::open`] when the file header's
/// invariants don't hold. `lookup` itself never returns an error: an
/// out-of-bounds record or a miss both surface as `""`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptFile {
    pub reason: &'static str,
}

impl fmt::Display for CorruptFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "corrupt .dat file: {}", self.reason)
    }
}

impl std::error::Error for CorruptFile {}
