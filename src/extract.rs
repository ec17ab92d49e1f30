//! Benzene reading extraction from the rendered emission data page.
//!
//! The page shows one table under `.c-table-container`, one row per
//! (location, compound) pair. Only benzene rows from numbered stations
//! ("#1" .. "#5") count; the strict count-of-five check is the sole gate
//! for accepting a sample.
//!
//! # Clock injection
//! `extract` takes `now` rather than reading the clock, so the same markup
//! always produces the same `Sample` in tests.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use unicode_normalization::UnicodeNormalization;

use crate::model::{RawRow, RejectionReason, Sample};

/// Container + table selector for the readings table.
pub const TABLE_SELECTOR: &str = ".c-table-container table";

/// Body rows of the readings table.
pub const ROW_SELECTOR: &str = "tbody tr";

/// Cell selector within a row.
pub const CELL_SELECTOR: &str = "td";

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+(?:\.[0-9]+)?").expect("static number pattern"));

// ---------------------------------------------------------------------------
// Document capability
// ---------------------------------------------------------------------------

/// Read access to the readings table of a rendered page.
pub trait DocumentQuery {
    /// Cell texts of every body row of the readings table, in document order.
    ///
    /// `None` when the table is absent.
    fn table_rows(&self) -> Option<Vec<Vec<String>>>;
}

impl DocumentQuery for Html {
    fn table_rows(&self) -> Option<Vec<Vec<String>>> {
        let table_sel = Selector::parse(TABLE_SELECTOR).ok()?;
        let row_sel = Selector::parse(ROW_SELECTOR).ok()?;
        let cell_sel = Selector::parse(CELL_SELECTOR).ok()?;

        let table = self.select(&table_sel).next()?;
        let rows = table
            .select(&row_sel)
            .map(|row| row.select(&cell_sel).map(cell_text).collect())
            .collect();
        Some(rows)
    }
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Returns `true` once the readings table is present in `markup`.
pub fn has_readings_table(markup: &str) -> bool {
    Html::parse_document(markup).table_rows().is_some()
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Outcome of one extraction, plus the qualifying rows that were skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub result: Result<Sample, RejectionReason>,
    /// `RowParseError`s for qualifying rows with no number in the value cell.
    pub skipped_rows: Vec<RejectionReason>,
}

/// Extracts the five station benzene values from a parsed page.
pub fn extract(doc: &impl DocumentQuery, now: NaiveDateTime) -> Result<Sample, RejectionReason> {
    extract_detailed(doc, now).result
}

/// Like [`extract`], but also reports rows that were skipped.
pub fn extract_detailed(doc: &impl DocumentQuery, now: NaiveDateTime) -> Extraction {
    let mut skipped_rows = Vec::new();
    let result = run_extraction(doc, now, &mut skipped_rows);
    Extraction {
        result,
        skipped_rows,
    }
}

fn run_extraction(
    doc: &impl DocumentQuery,
    now: NaiveDateTime,
    skipped: &mut Vec<RejectionReason>,
) -> Result<Sample, RejectionReason> {
    let rows = doc.table_rows().ok_or(RejectionReason::TableNotFound)?;
    if rows.is_empty() {
        return Err(RejectionReason::NoRows);
    }

    let mut values = Vec::new();
    let mut last_updates = BTreeSet::new();

    for (row_index, cells) in rows.iter().enumerate() {
        // Short rows (section headers, spacers) are not errors.
        let Some(row) = RawRow::from_cells(cells) else {
            continue;
        };
        if !row.is_qualifying() {
            continue;
        }
        match first_number(&row.raw_value) {
            Some(value) => {
                values.push(value);
                last_updates.insert(normalize_label(&row.raw_last_update));
            }
            None => skipped.push(RejectionReason::RowParseError {
                row_index,
                detail: format!("no numeric value in {:?} ({})", row.raw_value, row.location),
            }),
        }
    }

    Sample::new(now, values, join_last_updates(last_updates))
}

/// First `\d+(\.\d+)?` run in `text`, as a float.
pub fn first_number(text: &str) -> Option<f64> {
    NUMBER.find(text)?.as_str().parse().ok()
}

/// NFKC-normalizes a timestamp label and folds U+202F to a plain space, so
/// labels that differ only by encoding quirks compare equal.
pub fn normalize_label(text: &str) -> String {
    text.nfkc()
        .collect::<String>()
        .replace('\u{202F}', " ")
        .trim()
        .to_string()
}

/// One distinct label wins outright; several are joined sorted with "; " so
/// update skew between stations stays visible in the log.
pub fn join_last_updates(distinct: BTreeSet<String>) -> String {
    distinct.into_iter().collect::<Vec<_>>().join("; ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
