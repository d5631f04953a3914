//! Local CSV adapter: one `<safe_symbol>.csv` per symbol in a directory.
//!
//! Also hosts the CSV → `RawFrame` reader shared with the ECB adapter and
//! the CLI's standalone `validate` command.

use chrono::NaiveDate;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::provider::{
    safe_symbol, FetchError, FetchOutcome, Interval, RawFrame, RawValue, SourceAdapter,
    SourceKind,
};
use super::normalize::parse_timestamp;

/// Read a headered CSV stream into a raw frame. Cells stay text.
pub fn frame_from_reader<R: Read>(reader: R) -> Result<RawFrame, FetchError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().map_err(csv_error)?.clone();
    let mut frame = RawFrame::new(headers.iter());

    for result in rdr.records() {
        let record = result.map_err(csv_error)?;
        frame.push_row(record.iter().map(RawValue::text).collect());
    }
    Ok(frame)
}

/// Read a CSV file from disk into a raw frame.
pub fn read_csv_frame(path: &Path) -> Result<RawFrame, FetchError> {
    let file = File::open(path)
        .map_err(|e| FetchError::Io(format!("{}: {e}", path.display())))?;
    frame_from_reader(file)
}

fn csv_error(e: csv::Error) -> FetchError {
    if e.is_io_error() {
        FetchError::Io(e.to_string())
    } else {
        FetchError::ResponseFormat(format!("malformed CSV: {e}"))
    }
}

/// Adapter over a directory of previously exported CSV files.
///
/// Rows outside the requested window are dropped here so the CSV source
/// behaves like the live ones. Rows whose timestamp cannot be parsed are
/// kept and left for the normalizer to reject.
pub struct CsvDirAdapter {
    dir: PathBuf,
    kind: SourceKind,
}

impl CsvDirAdapter {
    pub fn new(dir: impl Into<PathBuf>, kind: SourceKind) -> Self {
        Self {
            dir: dir.into(),
            kind,
        }
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", safe_symbol(symbol)))
    }
}

impl SourceAdapter for CsvDirAdapter {
    fn name(&self) -> &str {
        "csv_dir"
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        _interval: Interval,
    ) -> Result<FetchOutcome, FetchError> {
        let path = self.path_for(symbol);
        if !path.exists() {
            debug!(symbol, path = %path.display(), "no CSV file for symbol");
            return Ok(FetchOutcome::Empty);
        }

        let frame = read_csv_frame(&path)?;
        let Some(ts_idx) = frame.column_index(&["timestamp", "date", "datetime", "time_period"])
        else {
            // Let the normalizer report the missing column.
            return Ok(FetchOutcome::from_frame(frame));
        };

        let mut windowed = RawFrame::new(frame.columns().iter().cloned());
        for row in frame.rows() {
            let in_window = match parse_timestamp(&row[ts_idx]) {
                Some(ts) => {
                    let date = ts.date_naive();
                    date >= start && date <= end
                }
                None => true,
            };
            if in_window {
                windowed.push_row(row.clone());
            }
        }
        Ok(FetchOutcome::from_frame(windowed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CSV: &str = "\
Date,Open,High,Low,Close,Volume
2024-01-02,100,102,99,101,1000
2024-01-03,101,103,100,102,
2024-02-01,102,104,101,103,1200
";

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn reads_headers_and_empty_cells() {
        let frame = frame_from_reader(CSV.as_bytes()).unwrap();
        assert_eq!(frame.columns().len(), 6);
        assert_eq!(frame.len(), 3);
        assert!(frame.rows()[1][5].is_null());
        assert_eq!(frame.rows()[0][4], RawValue::Text("101".into()));
    }

    #[test]
    fn adapter_filters_window_and_uses_safe_symbol() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = File::create(dir.path().join("EURUSD.csv")).unwrap();
        f.write_all(CSV.as_bytes()).unwrap();

        let adapter = CsvDirAdapter::new(dir.path(), SourceKind::MarketPrice);
        let outcome = adapter
            .fetch("EURUSD=X", d(2024, 1, 1), d(2024, 1, 31), Interval::Daily)
            .unwrap();
        let FetchOutcome::Rows(frame) = outcome else {
            panic!("expected rows");
        };
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = CsvDirAdapter::new(dir.path(), SourceKind::Benchmark);
        let outcome = adapter
            .fetch("NOPE", d(2024, 1, 1), d(2024, 1, 31), Interval::Daily)
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Empty);
    }
}
