//! # subtype-qc - Quality control for tile-based genomic subtyping
//!
//! Judges whether a subtype call produced from k-mer tile matches can be trusted.
//! A fixed registry of threshold checks inspects the subtyping statistics and
//! the per-tile results table, and their verdicts are folded into one
//! PASS / WARNING / FAIL status with a pipe-delimited diagnostic message.

pub mod checks;
pub mod qc;
pub mod registry;
pub mod tsv;
pub mod utils;

use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// QC status of a subtyping result, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QcStatus {
    Pass,
    Warning,
    Fail,
}

impl QcStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QcStatus::Pass => "PASS",
            QcStatus::Warning => "WARNING",
            QcStatus::Fail => "FAIL",
        }
    }
}

impl fmt::Display for QcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected number of tiles matching for the called subtype.
///
/// Upstream packs this as a semicolon-delimited string where the first field
/// is the baseline for the call and any further fields are alternate counts.
/// It is parsed once when a record is read and never re-parsed by the checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExpectedTiles {
    pub primary: u64,
    pub alternates: Vec<u64>,
}

impl ExpectedTiles {
    pub fn new(primary: u64) -> Self {
        Self {
            primary,
            alternates: Vec::new(),
        }
    }
}

impl FromStr for ExpectedTiles {
    type Err = QcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split(';').map(str::trim);

        let primary = fields
            .next()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| QcError::InvalidExpectedTiles(s.to_string()))?
            .parse::<u64>()
            .map_err(|_| QcError::InvalidExpectedTiles(s.to_string()))?;

        let alternates = fields
            .filter(|f| !f.is_empty())
            .map(|f| {
                f.parse::<u64>()
                    .map_err(|_| QcError::InvalidExpectedTiles(s.to_string()))
            })
            .collect::<QcResult<Vec<u64>>>()?;

        Ok(Self {
            primary,
            alternates,
        })
    }
}

impl TryFrom<String> for ExpectedTiles {
    type Error = QcError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ExpectedTiles> for String {
    fn from(value: ExpectedTiles) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ExpectedTiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        for alt in &self.alternates {
            write!(f, ";{}", alt)?;
        }
        Ok(())
    }
}

/// Parse `true`/`false` in any letter case, as written by pandas (`True`/`False`)
fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn deserialize_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = String::deserialize(deserializer)?;
    parse_bool(&value)
        .ok_or_else(|| de::Error::custom(format!("invalid boolean: {:?}", value)))
}

fn deserialize_optional_bool<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<bool>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(value) => parse_bool(&value)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid boolean: {:?}", value))),
    }
}

/// Subtyping result for one sample, together with its QC annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtype {
    pub sample: String,
    #[serde(default)]
    pub subtype: Option<String>,
    pub n_tiles_matching_all: u64,
    pub n_tiles_matching_all_expected: ExpectedTiles,
    #[serde(default, deserialize_with = "deserialize_optional_bool")]
    pub are_subtypes_consistent: Option<bool>,
    #[serde(default)]
    pub inconsistent_subtypes: Option<u64>,
    #[serde(default)]
    pub qc_status: Option<QcStatus>,
    #[serde(default)]
    pub qc_message: String,
}

impl Subtype {
    pub fn new(
        sample: String,
        subtype: Option<String>,
        n_tiles_matching_all: u64,
        n_tiles_matching_all_expected: ExpectedTiles,
    ) -> Self {
        Self {
            sample,
            subtype,
            n_tiles_matching_all,
            n_tiles_matching_all_expected,
            are_subtypes_consistent: None,
            inconsistent_subtypes: None,
            qc_status: None,
            qc_message: String::new(),
        }
    }

    /// Called subtype, treating an empty identifier as no call
    pub fn called_subtype(&self) -> Option<&str> {
        self.subtype.as_deref().filter(|s| !s.is_empty())
    }
}

/// Evidence for one tile in a sample: which target site it interrogates,
/// the subtype it supports and how many k-mer matches were observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileHit {
    pub sample: String,
    pub tile_id: String,
    pub target_site: u64,
    pub subtype: String,
    #[serde(deserialize_with = "deserialize_bool")]
    pub is_pos_tile: bool,
    pub freq: u64,
}

impl TileHit {
    pub fn is_hit(&self, min_kmer_freq: u64) -> bool {
        self.freq >= min_kmer_freq
    }

    /// True when this tile belongs to a subtype nested under `subtype`
    pub fn is_downstream_of(&self, subtype: &str) -> bool {
        self.subtype.len() > subtype.len() + 1
            && self.subtype.starts_with(subtype)
            && self.subtype.as_bytes()[subtype.len()] == b'.'
    }
}

/// Per-sample table of tile hits and misses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultsTable {
    tiles: Vec<TileHit>,
}

impl ResultsTable {
    pub fn new(tiles: Vec<TileHit>) -> Self {
        Self { tiles }
    }

    pub fn push(&mut self, tile: TileHit) {
        self.tiles.push(tile);
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TileHit> {
        self.tiles.iter()
    }

    pub fn hits(&self, min_kmer_freq: u64) -> impl Iterator<Item = &TileHit> {
        self.tiles.iter().filter(move |t| t.is_hit(min_kmer_freq))
    }

    /// Tiles belonging to subtypes nested under `subtype`
    pub fn downstream_of<'a>(&'a self, subtype: &'a str) -> impl Iterator<Item = &'a TileHit> {
        self.tiles.iter().filter(move |t| t.is_downstream_of(subtype))
    }

    /// Mean k-mer frequency over tiles that count as hits
    pub fn mean_hit_coverage(&self, min_kmer_freq: u64) -> Option<f64> {
        let (sum, n) = self
            .hits(min_kmer_freq)
            .fold((0f64, 0usize), |(sum, n), t| (sum + t.freq as f64, n + 1));
        if n == 0 {
            None
        } else {
            Some(sum / n as f64)
        }
    }
}

/// Counts of distinct target sites and how many of them have no hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteCoverage {
    pub total: usize,
    pub missing: usize,
}

impl SiteCoverage {
    pub fn from_tiles<'a, I>(tiles: I, min_kmer_freq: u64) -> Self
    where
        I: IntoIterator<Item = &'a TileHit>,
    {
        let mut sites = BTreeSet::new();
        let mut found = BTreeSet::new();
        for tile in tiles {
            sites.insert(tile.target_site);
            if tile.is_hit(min_kmer_freq) {
                found.insert(tile.target_site);
            }
        }
        Self {
            total: sites.len(),
            missing: sites.len() - found.len(),
        }
    }

    pub fn missing_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.missing as f64 / self.total as f64
        }
    }
}

/// Thresholds used by the QC checks
#[derive(Debug, Clone, PartialEq)]
pub struct SubtypingParams {
    pub mixed_subtype_overage: f64,         // Fraction above expected tiles flagged as mixed
    pub min_tiles_shortfall: f64,           // Fraction below expected tiles flagged as insufficient
    pub min_kmer_freq: u64,                 // Minimum k-mer count for a tile to count as a hit
    pub max_perc_missing_target_sites: f64, // Fraction of target sites allowed without hits
    pub max_perc_missing_downstream: f64,   // Fraction of downstream target sites allowed without hits
    pub min_ambiguous_tiles: usize,         // Positive downstream hits suggesting an intermediate subtype
    pub low_coverage_depth_freq: f64,       // Mean hit coverage below which depth is considered low
}

impl Default for SubtypingParams {
    fn default() -> Self {
        Self {
            mixed_subtype_overage: 0.01,
            min_tiles_shortfall: 0.05,
            min_kmer_freq: 8,
            max_perc_missing_target_sites: 0.05,
            max_perc_missing_downstream: 0.05,
            min_ambiguous_tiles: 3,
            low_coverage_depth_freq: 20.0,
        }
    }
}

/// Error types for the subtype QC library
#[derive(Debug, thiserror::Error)]
pub enum QcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid expected tiles field: {0:?}")]
    InvalidExpectedTiles(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type QcResult<T> = Result<T, QcError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(site: u64, subtype: &str, is_pos_tile: bool, freq: u64) -> TileHit {
        TileHit {
            sample: "s1".to_string(),
            tile_id: format!("{}-{}", site, subtype),
            target_site: site,
            subtype: subtype.to_string(),
            is_pos_tile,
            freq,
        }
    }

    #[test]
    fn test_expected_tiles_parse() {
        let expected: ExpectedTiles = "100".parse().unwrap();
        assert_eq!(expected, ExpectedTiles::new(100));

        let expected: ExpectedTiles = "33;35;40".parse().unwrap();
        assert_eq!(expected.primary, 33);
        assert_eq!(expected.alternates, vec![35, 40]);
        assert_eq!(expected.to_string(), "33;35;40");
    }

    #[test]
    fn test_expected_tiles_invalid() {
        assert!("".parse::<ExpectedTiles>().is_err());
        assert!("abc;12".parse::<ExpectedTiles>().is_err());
        assert!("-5".parse::<ExpectedTiles>().is_err());
        assert!(";100".parse::<ExpectedTiles>().is_err());
        assert!("100;x".parse::<ExpectedTiles>().is_err());
    }

    #[test]
    fn test_qc_status_precedence() {
        assert!(QcStatus::Fail > QcStatus::Warning);
        assert!(QcStatus::Warning > QcStatus::Pass);
        assert_eq!(QcStatus::Pass.max(QcStatus::Fail), QcStatus::Fail);
        assert_eq!(QcStatus::Warning.to_string(), "WARNING");
    }

    #[test]
    fn test_called_subtype() {
        let mut st = Subtype::new("s1".to_string(), Some("2.1".to_string()), 10, ExpectedTiles::new(10));
        assert_eq!(st.called_subtype(), Some("2.1"));
        st.subtype = Some(String::new());
        assert_eq!(st.called_subtype(), None);
        st.subtype = None;
        assert_eq!(st.called_subtype(), None);
    }

    #[test]
    fn test_is_downstream_of() {
        assert!(tile(1, "2.1.1", true, 10).is_downstream_of("2.1"));
        assert!(tile(1, "2.1.1.3", true, 10).is_downstream_of("2.1"));
        assert!(!tile(1, "2.1", true, 10).is_downstream_of("2.1"));
        assert!(!tile(1, "2.10", true, 10).is_downstream_of("2.1"));
        assert!(!tile(1, "2.1.", true, 10).is_downstream_of("2.1"));
    }

    #[test]
    fn test_results_table_coverage() {
        let table = ResultsTable::new(vec![
            tile(100, "1", true, 30),
            tile(100, "1", false, 0),
            tile(200, "1.1", false, 10),
            tile(300, "1.1", true, 2),
        ]);

        assert_eq!(table.len(), 4);
        assert_eq!(table.hits(8).count(), 2);
        assert_eq!(table.mean_hit_coverage(8), Some(20.0));
        assert_eq!(table.mean_hit_coverage(100), None);

        let sites = SiteCoverage::from_tiles(table.iter(), 8);
        assert_eq!(sites, SiteCoverage { total: 3, missing: 1 });
        assert!((sites.missing_fraction() - 1.0 / 3.0).abs() < 1e-12);

        let downstream = SiteCoverage::from_tiles(table.downstream_of("1"), 8);
        assert_eq!(downstream, SiteCoverage { total: 2, missing: 1 });
    }

    #[test]
    fn test_mean_hit_coverage_large_counts() {
        let table = ResultsTable::new(vec![
            tile(100, "1", true, u64::MAX),
            tile(200, "1", true, u64::MAX),
        ]);
        assert_eq!(table.mean_hit_coverage(8), Some(u64::MAX as f64));
    }

    #[test]
    fn test_parse_bool_any_case() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("True"), Some(true));
        assert_eq!(parse_bool("FALSE"), Some(false));
        assert_eq!(parse_bool("yes"), None);
        assert_eq!(parse_bool(""), None);
    }
}
