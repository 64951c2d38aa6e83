//! Build and query compact IPv4 range -> attribute lookup files.
//!
//! Two datasets share one on-disk format: location (country/region/city)
//! and ASN (network/autonomous-system). [`builder::build_location`] and
//! [`builder::build_asn`] turn a text table into a `.dat` file;
//! [`searcher::Searcher`] maps a `.dat` file and answers point lookups.

pub mod builder;
pub mod cli;
pub mod error;
pub mod format;
pub mod parse;
pub mod searcher;

pub use builder::{build_asn, build_location, BuildReport};
pub use error::{BuildWarning, CorruptFile};
pub use searcher::{search, Searcher};
