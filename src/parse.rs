//! Parser & Normalizer.
//!
//! Turns one trimmed input line into a `(start_ip, end_ip, attr)` tuple,
//! deduplicating attribute strings through a pool as it goes. Two dialects
//! share this module: pipe-delimited `TXT` (location only) and
//! comma-delimited `CSV` (both location and ASN, distinguished by field
//! count/meaning).

use crate::format::dotted_quad_to_u32;
use ahash::RandomState;
use hashbrown::HashMap;

/// Which textual dialect a line should be parsed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Pipe-delimited, dotted-quad IPs. Location dataset only.
    LocationTxt,
    /// Comma-delimited, dotted-quad IPs, optionally quoted fields. Location dataset.
    LocationCsv,
    /// Comma-delimited, decimal u32 IPs, optionally quoted fields. ASN dataset.
    AsnCsv,
}

impl Dialect {
    /// Pick TXT vs CSV for the location dataset by filename suffix
    /// (`.csv` -> CSV, else TXT). The ASN dataset always uses CSV
    /// regardless of suffix.
    pub fn for_location_path(path: &std::path::Path) -> Dialect {
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if is_csv {
            Dialect::LocationCsv
        } else {
            Dialect::LocationTxt
        }
    }
}

/// A single parsed range, before sorting/bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedRange {
    pub start_ip: u32,
    pub end_ip: u32,
    pub attr_idx: u32,
}

/// The deduplicated attribute pool built up during parsing.
///
/// `text -> index` lookups use `hashbrown`+`ahash`, a fast-hashmap pairing
/// well suited to a string-interning workload with millions of lookups.
#[derive(Debug, Default)]
pub struct AttributePool {
    texts: Vec<String>,
    index: HashMap<String, u32, RandomState>,
}

impl AttributePool {
    pub fn new() -> Self {
        Self {
            texts: Vec::new(),
            index: HashMap::with_hasher(RandomState::new()),
        }
    }

    /// Intern `text`, returning its stable pool index. First-seen index wins.
    pub fn intern(&mut self, text: &str) -> u32 {
        if let Some(&idx) = self.index.get(text) {
            return idx;
        }
        let idx = self.texts.len() as u32;
        self.texts.push(text.to_string());
        self.index.insert(text.to_string(), idx);
        idx
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

/// Parse one trimmed line into a range, interning its attribute string into
/// `pool`. Returns `Err` with a human-readable reason on malformed rows;
/// the caller records it as a `BuildWarning::MalformedRow` and drops the row.
pub fn parse_line(line: &str, dialect: Dialect, pool: &mut AttributePool) -> Result<ParsedRange, String> {
    match dialect {
        Dialect::LocationTxt => parse_location_txt(line, pool),
        Dialect::LocationCsv => parse_location_csv(line, pool),
        Dialect::AsnCsv => parse_asn_csv(line, pool),
    }
}

const LOCATION_FIELD_COUNT: usize = 15;
const LOCATION_ATTR_START: usize = 4;

fn pad_fields(mut fields: Vec<String>, target_len: usize) -> Vec<String> {
    while fields.len() < target_len {
        fields.push(String::new());
    }
    fields
}

fn parse_location_txt(line: &str, pool: &mut AttributePool) -> Result<ParsedRange, String> {
    let fields: Vec<String> = line.splitn(LOCATION_FIELD_COUNT, '|').map(str::to_string).collect();
    let fields = pad_fields(fields, LOCATION_FIELD_COUNT);

    let start_ip = dotted_quad_to_u32(&fields[0]);
    let end_ip = dotted_quad_to_u32(&fields[1]);
    let attr = fields[LOCATION_ATTR_START..LOCATION_FIELD_COUNT].join("|");
    let attr_idx = pool.intern(&attr);

    Ok(ParsedRange {
        start_ip,
        end_ip,
        attr_idx,
    })
}

fn strip_quotes(field: &str) -> &str {
    field.trim_matches('"')
}

fn split_csv_quoted(line: &str) -> Vec<String> {
    line.split(',').map(|f| strip_quotes(f).to_string()).collect()
}

fn parse_location_csv(line: &str, pool: &mut AttributePool) -> Result<ParsedRange, String> {
    let fields = pad_fields(split_csv_quoted(line), LOCATION_FIELD_COUNT);

    // Location CSV keeps dotted-quad IPs, same rule as TXT.
    let start_ip = dotted_quad_to_u32(&fields[0]);
    let end_ip = dotted_quad_to_u32(&fields[1]);
    let attr = fields[LOCATION_ATTR_START..LOCATION_FIELD_COUNT].join("|");
    let attr_idx = pool.intern(&attr);

    Ok(ParsedRange {
        start_ip,
        end_ip,
        attr_idx,
    })
}

const ASN_FIELD_COUNT: usize = 5;

fn parse_asn_csv(line: &str, pool: &mut AttributePool) -> Result<ParsedRange, String> {
    let raw: Vec<String> = split_csv_quoted(line);
    if raw.len() < ASN_FIELD_COUNT {
        return Err(format!(
            "CSV row has {} fields, need at least {ASN_FIELD_COUNT}",
            raw.len()
        ));
    }
    let fields = pad_fields(raw, ASN_FIELD_COUNT);

    let start_ip: u32 = fields[0]
        .parse()
        .map_err(|_| format!("invalid start IP {:?}", fields[0]))?;
    let end_ip: u32 = fields[1]
        .parse()
        .map_err(|_| format!("invalid end IP {:?}", fields[1]))?;
    let attr = fields[2..ASN_FIELD_COUNT].join("|");
    let attr_idx = pool.intern(&attr);

    Ok(ParsedRange {
        start_ip,
        end_ip,
        attr_idx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected_location_attr(tail: &[&str]) -> String {
        let mut fields: Vec<String> = tail.iter().map(|s| s.to_string()).collect();
        while fields.len() < LOCATION_FIELD_COUNT - LOCATION_ATTR_START {
            fields.push(String::new());
        }
        fields.join("|")
    }

    #[test]
    fn location_txt_basic() {
        let mut pool = AttributePool::new();
        let line = "1.0.0.0|1.0.0.255|01|CN|CN|Beijing|Beijing||||||||";
        let r = parse_line(line, Dialect::LocationTxt, &mut pool).unwrap();
        assert_eq!(r.start_ip, 0x0100_0000);
        assert_eq!(r.end_ip, 0x0100_00FF);
        assert_eq!(
            pool.texts()[r.attr_idx as usize],
            expected_location_attr(&["CN", "Beijing", "Beijing"])
        );
    }

    #[test]
    fn location_txt_pads_missing_fields() {
        let mut pool = AttributePool::new();
        let line = "1.0.0.0|1.0.0.255";
        let r = parse_line(line, Dialect::LocationTxt, &mut pool).unwrap();
        assert_eq!(pool.texts()[r.attr_idx as usize], expected_location_attr(&[]));
    }

    #[test]
    fn location_csv_strips_quotes() {
        let mut pool = AttributePool::new();
        let line = "\"1.0.0.0\",\"1.0.0.255\",\"01\",\"CN\",\"CN\",\"Beijing\"";
        let r = parse_line(line, Dialect::LocationCsv, &mut pool).unwrap();
        assert_eq!(r.start_ip, 0x0100_0000);
        assert_eq!(
            pool.texts()[r.attr_idx as usize],
            expected_location_attr(&["CN", "Beijing"])
        );
    }

    #[test]
    fn asn_csv_basic() {
        let mut pool = AttributePool::new();
        let line = "\"16777216\",\"16777471\",\"1.0.0.0/24\",\"13335\",\"CLOUDFLARENET\"";
        let r = parse_line(line, Dialect::AsnCsv, &mut pool).unwrap();
        assert_eq!(r.start_ip, 16_777_216);
        assert_eq!(r.end_ip, 16_777_471);
        assert_eq!(pool.texts()[r.attr_idx as usize], "1.0.0.0/24|13335|CLOUDFLARENET");
    }

    #[test]
    fn asn_csv_rejects_too_few_fields() {
        let mut pool = AttributePool::new();
        let err = parse_line("1,2,3", Dialect::AsnCsv, &mut pool).unwrap_err();
        assert!(err.contains("need at least"));
    }

    #[test]
    fn pool_dedups_identical_attributes() {
        let mut pool = AttributePool::new();
        let a = parse_line("1.0.0.0|1.0.0.255||||CN|Beijing", Dialect::LocationTxt, &mut pool).unwrap();
        let b = parse_line("1.0.1.0|1.0.1.255||||CN|Beijing", Dialect::LocationTxt, &mut pool).unwrap();
        assert_eq!(a.attr_idx, b.attr_idx);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn dialect_selected_by_extension() {
        assert_eq!(
            Dialect::for_location_path(std::path::Path::new("x.csv")),
            Dialect::LocationCsv
        );
        assert_eq!(
            Dialect::for_location_path(std::path::Path::new("x.CSV")),
            Dialect::LocationCsv
        );
        assert_eq!(
            Dialect::for_location_path(std::path::Path::new("x.txt")),
            Dialect::LocationTxt
        );
    }
}
