//! Append-only CSV data log.
//!
//! Each call opens the file, appends one row, flushes and closes it again, so
//! other tools can read the log between cycles and an abrupt exit never
//! leaves a buffered handle behind. The header (with a UTF-8 BOM) is written
//! only when the call creates the file.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::model::{Sample, SinkError, STATION_COUNT, TIMESTAMP_FORMAT};

/// UTF-8 byte-order mark, for spreadsheet compatibility.
const BOM: &str = "\u{FEFF}";

const SEP: char = ',';

/// Durable destination for validated samples.
pub trait RecordSink {
    fn record(&self, sample: &Sample) -> Result<(), SinkError>;
}

/// Column names of the data log, in order.
pub fn header_row() -> Vec<String> {
    let mut header = Vec::with_capacity(STATION_COUNT + 2);
    header.push("TimeStamp".to_string());
    header.extend((1..=STATION_COUNT).map(|i| format!("Station {} (µg/m³)", i)));
    header.push("Last Update".to_string());
    header
}

/// One data row for `sample`.
///
/// Values use the shortest representation that round-trips, so `1.0` stays
/// `1.0` and `0.25` stays `0.25`.
pub fn data_row(sample: &Sample) -> Vec<String> {
    let mut row = Vec::with_capacity(STATION_COUNT + 2);
    row.push(sample.timestamp.format(TIMESTAMP_FORMAT).to_string());
    row.extend(sample.stations().iter().map(|v| format!("{:?}", v)));
    row.push(sample.last_update.clone());
    row
}

#[derive(Debug, Clone)]
pub struct CsvRecorder {
    path: PathBuf,
}

impl CsvRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, sample: &Sample) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // create_new decides "first creation" atomically with the open.
        let (file, created) = match OpenOptions::new()
            .append(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => (file, true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                (OpenOptions::new().append(true).open(&self.path)?, false)
            }
            Err(e) => return Err(e),
        };

        let mut out = BufWriter::new(file);
        if created {
            out.write_all(BOM.as_bytes())?;
            write_row(&mut out, &header_row())?;
        }
        write_row(&mut out, &data_row(sample))?;
        out.flush()?;
        out.get_ref().sync_data()?;
        Ok(())
    }
}

impl RecordSink for CsvRecorder {
    fn record(&self, sample: &Sample) -> Result<(), SinkError> {
        self.append(sample).map_err(|source| SinkError {
            path: self.path.display().to_string(),
            source,
        })
    }
}

fn needs_quotes(field: &str) -> bool {
    field.contains(SEP) || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Writes one CSV row, quoting fields that need it, terminated by CRLF.
pub fn write_row<W: Write>(mut w: W, row: &[String]) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            write!(w, "{}", SEP)?;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{}", cell)?;
        }
    }
    write!(w, "\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample(values: [f64; 5], last_update: &str) -> Sample {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 5, 0)
            .unwrap();
        Sample::new(ts, values.to_vec(), last_update.to_string()).unwrap()
    }

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .split("\r\n")
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_header_has_seven_columns_with_units() {
        let header = header_row();
        assert_eq!(header.len(), 7);
        assert_eq!(header[0], "TimeStamp");
        assert_eq!(header[1], "Station 1 (µg/m³)");
        assert_eq!(header[5], "Station 5 (µg/m³)");
        assert_eq!(header[6], "Last Update");
    }

    #[test]
    fn test_data_row_keeps_source_precision() {
        let row = data_row(&sample([1.0, 0.25, 3.125, 40.0, 0.5], "10:00"));
        assert_eq!(row, vec!["2024-01-01 10:05:00", "1.0", "0.25", "3.125", "40.0", "0.5", "10:00"]);
    }

    #[test]
    fn test_fields_with_separator_are_quoted() {
        let mut buf = Vec::new();
        write_row(&mut buf, &["Jan 1, 2024".to_string(), "say \"hi\"".to_string()]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "\"Jan 1, 2024\",\"say \"\"hi\"\"\"\r\n");
    }

    #[test]
    fn test_header_written_once_across_appends() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = CsvRecorder::new(dir.path().join("log.csv"));

        recorder.record(&sample([1.0, 2.0, 3.0, 4.0, 5.0], "a")).unwrap();
        recorder.record(&sample([6.0, 7.0, 8.0, 9.0, 10.0], "b")).unwrap();

        let lines = read_lines(recorder.path());
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with('\u{FEFF}'), "BOM leads the file");
        assert!(lines[0].ends_with("Last Update"));
        assert!(lines[1].ends_with(",a"));
        assert!(lines[2].ends_with(",b"));
    }

    #[test]
    fn test_existing_log_never_gets_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        std::fs::write(&path, "old,row\r\n").unwrap();

        CsvRecorder::new(&path)
            .record(&sample([1.0, 2.0, 3.0, 4.0, 5.0], "x"))
            .unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines[0], "old,row");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = CsvRecorder::new(dir.path().join("nested/data/log.csv"));
        recorder.record(&sample([1.0; 5], "x")).unwrap();
        assert!(recorder.path().exists());
    }

    #[test]
    fn test_unwritable_path_is_sink_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be.
        let recorder = CsvRecorder::new(dir.path());
        let err = recorder.record(&sample([1.0; 5], "x")).unwrap_err();
        assert!(err.to_string().contains("Cannot write data log"));
    }
}
