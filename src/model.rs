//! Core data types for the benzene air-quality monitor.
//!
//! This module defines the shared domain model imported by all other modules.
//! It contains no logic beyond construction checks, and no I/O.

use chrono::NaiveDateTime;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Number of numbered monitoring stations reporting benzene on the page.
pub const STATION_COUNT: usize = 5;

/// Compound name (case-insensitive) that marks a benzene reading row.
pub const COMPOUND_BENZENE: &str = "benzene";

/// Prefix on the location label of a numbered monitoring station, e.g. "#3".
pub const STATION_MARKER: &str = "#";

/// Timestamp format used in the data log and on the console.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// One validated capture of the five station concentrations.
///
/// A `Sample` can only be built through [`Sample::new`], which refuses any
/// value list that is not exactly [`STATION_COUNT`] long.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    /// Capture time, local wall clock, second precision.
    pub timestamp: NaiveDateTime,
    stations: [f64; STATION_COUNT],
    /// The source's own "last updated" annotation (or a joined list on skew).
    pub last_update: String,
}

impl Sample {
    pub fn new(
        timestamp: NaiveDateTime,
        values: Vec<f64>,
        last_update: String,
    ) -> Result<Self, RejectionReason> {
        let found = values.len();
        let stations: [f64; STATION_COUNT] = values
            .try_into()
            .map_err(|_| RejectionReason::WrongCount(found))?;
        Ok(Self {
            timestamp,
            stations,
            last_update,
        })
    }

    /// Concentrations in station order (µg/m³).
    pub fn stations(&self) -> &[f64; STATION_COUNT] {
        &self.stations
    }
}

/// One `<tr>` of the readings table, as text. Lives only during extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub location: String,
    pub compound: String,
    pub raw_value: String,
    pub raw_last_update: String,
}

impl RawRow {
    /// Builds a row from its cell texts; rows with fewer than 4 cells yield `None`.
    pub fn from_cells(cells: &[String]) -> Option<Self> {
        match cells {
            [location, compound, value, last_update, ..] => Some(Self {
                location: location.trim().to_string(),
                compound: compound.trim().to_string(),
                raw_value: value.trim().to_string(),
                raw_last_update: last_update.trim().to_string(),
            }),
            _ => None,
        }
    }

    /// Benzene reading from a numbered station.
    pub fn is_qualifying(&self) -> bool {
        self.compound.eq_ignore_ascii_case(COMPOUND_BENZENE)
            && self.location.starts_with(STATION_MARKER)
    }
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

/// Why a rendered page did not yield a usable sample this cycle.
///
/// Returned, never raised: the cycle runner logs it and waits for the next
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    /// No table under the expected container.
    TableNotFound,
    /// The table exists but its body has no rows.
    NoRows,
    /// Qualifying rows parsed to something other than five values.
    WrongCount(usize),
    /// A qualifying row whose value cell held no number.
    RowParseError { row_index: usize, detail: String },
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::TableNotFound => write!(f, "Table not found in HTML"),
            RejectionReason::NoRows => write!(f, "No rows found in table body"),
            RejectionReason::WrongCount(found) => write!(
                f,
                "Did not find exactly {} benzene values (found {})",
                STATION_COUNT, found
            ),
            RejectionReason::RowParseError { row_index, detail } => {
                write!(f, "Error parsing row {}: {}", row_index, detail)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by a `PageFetcher`.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// The readings table never appeared within the allotted time.
    Timeout { secs: u64 },
    /// Non-2xx HTTP response.
    Http(u16),
    /// Transport-level failure (DNS, connect, TLS, read).
    Network(String),
    /// The fetch client itself is unusable and must be rebuilt.
    SessionLost(String),
    /// Shutdown was requested while the fetch was in progress.
    Interrupted,
}

impl FetchError {
    /// Only a dead client escapes the per-cycle failure boundary.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::SessionLost(_))
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Timeout { secs } => {
                write!(f, "timeout: readings table did not appear within {}s", secs)
            }
            FetchError::Http(code) => write!(f, "HTTP error: {}", code),
            FetchError::Network(msg) => write!(f, "Network error: {}", msg),
            FetchError::SessionLost(msg) => write!(f, "Fetch client unusable: {}", msg),
            FetchError::Interrupted => write!(f, "Fetch interrupted by shutdown"),
        }
    }
}

impl std::error::Error for FetchError {}

/// The data log could not be written.
#[derive(Debug)]
pub struct SinkError {
    pub path: String,
    pub source: std::io::Error,
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Cannot write data log {}: {}", self.path, self.source)
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Every way a single fetch -> extract -> record cycle can fall short.
#[derive(Debug)]
pub enum CycleError {
    FetchTimeout { secs: u64 },
    Fetch(FetchError),
    ExtractionRejected(RejectionReason),
    Sink(SinkError),
}

impl CycleError {
    /// Rejections mean "page not yet settled"; everything else is an
    /// infrastructure fault.
    pub fn is_expected(&self) -> bool {
        matches!(self, CycleError::ExtractionRejected(_))
    }
}

impl From<FetchError> for CycleError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Timeout { secs } => CycleError::FetchTimeout { secs },
            other => CycleError::Fetch(other),
        }
    }
}

impl From<RejectionReason> for CycleError {
    fn from(reason: RejectionReason) -> Self {
        CycleError::ExtractionRejected(reason)
    }
}

impl From<SinkError> for CycleError {
    fn from(err: SinkError) -> Self {
        CycleError::Sink(err)
    }
}

impl std::fmt::Display for CycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleError::FetchTimeout { secs } => {
                write!(f, "Fetch timed out after {}s", secs)
            }
            CycleError::Fetch(err) => write!(f, "Fetch failed: {}", err),
            CycleError::ExtractionRejected(reason) => write!(f, "Extraction rejected: {}", reason),
            CycleError::Sink(err) => write!(f, "Record failed: {}", err),
        }
    }
}

impl std::error::Error for CycleError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 2, 17)
            .unwrap()
    }

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sample_requires_exactly_five_values() {
        let ok = Sample::new(fixed_now(), vec![1.0, 2.0, 3.0, 4.0, 5.0], "x".into());
        assert_eq!(ok.unwrap().stations(), &[1.0, 2.0, 3.0, 4.0, 5.0]);

        let short = Sample::new(fixed_now(), vec![1.0, 2.0, 3.0, 4.0], "x".into());
        assert_eq!(short.unwrap_err(), RejectionReason::WrongCount(4));

        let long = Sample::new(fixed_now(), vec![0.0; 6], "x".into());
        assert_eq!(long.unwrap_err(), RejectionReason::WrongCount(6));
    }

    #[test]
    fn test_raw_row_needs_four_cells() {
        assert!(RawRow::from_cells(&cells(&["#1", "Benzene", "0.5"])).is_none());

        let row = RawRow::from_cells(&cells(&[" #1 ", "Benzene", "0.5 µg/m³", "10:00", "extra"]))
            .expect("four or more cells form a row");
        assert_eq!(row.location, "#1");
        assert_eq!(row.raw_value, "0.5 µg/m³");
        assert_eq!(row.raw_last_update, "10:00");
    }

    #[test]
    fn test_qualifying_row_matches_compound_case_insensitively() {
        let row = RawRow::from_cells(&cells(&["#2", "BENZENE", "1", "t"])).unwrap();
        assert!(row.is_qualifying());

        let fence = RawRow::from_cells(&cells(&["Fenceline", "Benzene", "1", "t"])).unwrap();
        assert!(!fence.is_qualifying(), "location without # is not a station");

        let toluene = RawRow::from_cells(&cells(&["#2", "Toluene", "1", "t"])).unwrap();
        assert!(!toluene.is_qualifying());
    }

    #[test]
    fn test_fetch_error_fatality() {
        assert!(FetchError::SessionLost("dead".into()).is_fatal());
        assert!(!FetchError::Timeout { secs: 15 }.is_fatal());
        assert!(!FetchError::Http(503).is_fatal());
        assert!(!FetchError::Network("reset".into()).is_fatal());
        assert!(!FetchError::Interrupted.is_fatal());
    }

    #[test]
    fn test_timeout_maps_to_distinct_cycle_error() {
        let err: CycleError = FetchError::Timeout { secs: 15 }.into();
        assert!(matches!(err, CycleError::FetchTimeout { secs: 15 }));

        let err: CycleError = RejectionReason::NoRows.into();
        assert!(err.is_expected());
    }
}
