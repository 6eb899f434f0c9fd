//! Query work items and the CSV work source
//!
//! A [`Query`] is one row of the input: a hostname plus a time range. The
//! [`QuerySource`] trait is the pull-based iterator the orchestrator drains;
//! [`CsvQuerySource`] implements it over any reader producing
//! `hostname,start_time,end_time` CSV rows.
//!
//! Decode failures come in two flavors and callers must treat them
//! differently: a [`SourceError::InvalidRecord`] poisons only that row (the
//! stream continues and the row is reported as skipped), while a
//! [`SourceError::Stream`] ends the stream fatally.

use std::io;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timestamp format used by the input CSV and the rendered SQL
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const EXPECTED_HEADER: [&str; 3] = ["hostname", "start_time", "end_time"];

/// A single unit of work: one query against one hostname's time range
///
/// Immutable once constructed; produced by a [`QuerySource`] and consumed
/// exactly once by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Hostname whose series the query scans; also the affinity key
    pub hostname: String,

    /// Inclusive lower bound of the scanned range
    pub start_time: NaiveDateTime,

    /// Inclusive upper bound of the scanned range
    pub end_time: NaiveDateTime,
}

impl Query {
    /// Create a new query
    pub fn new(hostname: impl Into<String>, start_time: NaiveDateTime, end_time: NaiveDateTime) -> Self {
        Self {
            hostname: hostname.into(),
            start_time,
            end_time,
        }
    }

    /// Render the SQL text for this query
    ///
    /// A `Query` struct rather than raw CSV fields gives us room to add more
    /// fields and try different query patterns later.
    // TODO: bind parameters instead of interpolating once the query shape settles
    pub fn build(&self) -> String {
        format!(
            "SELECT * FROM cpu_usage WHERE hostname = '{}' AND ts BETWEEN '{}' AND '{}'",
            self.hostname,
            self.start_time.format(TIMESTAMP_FORMAT),
            self.end_time.format(TIMESTAMP_FORMAT),
        )
    }
}

/// Errors produced by a [`QuerySource`]
#[derive(Debug, Error)]
pub enum SourceError {
    /// One row could not be decoded; the stream itself is still usable
    #[error("invalid record on line {line}: {reason}")]
    InvalidRecord {
        /// 1-based line number of the offending row
        line: u64,
        /// Why the row failed to decode
        reason: String,
    },

    /// The input stream itself is broken; no further rows can be read
    #[error("malformed input stream: {0}")]
    Stream(String),
}

impl SourceError {
    /// Whether the caller may keep reading after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SourceError::InvalidRecord { .. })
    }
}

/// A pull-based producer of work items
///
/// `Ok(None)` signals clean end-of-stream. A recoverable error means "skip
/// this row and keep going"; any other error is fatal for the whole stream.
pub trait QuerySource {
    /// Read the next query from the source
    fn next_query(&mut self) -> Result<Option<Query>, SourceError>;
}

/// CSV-backed [`QuerySource`]
///
/// Validates the header row at construction and tracks line numbers so
/// decode errors point at the offending input line.
pub struct CsvQuerySource<R: io::Read> {
    reader: csv::Reader<R>,
    line: u64,
}

impl<R: io::Read> CsvQuerySource<R> {
    /// Create a new source, reading and validating the header row
    pub fn new(input: R) -> Result<Self, SourceError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(input);

        let mut header = csv::StringRecord::new();
        let has_header = reader
            .read_record(&mut header)
            .map_err(|error| SourceError::Stream(error.to_string()))?;
        if !has_header {
            return Err(SourceError::Stream("missing header row".into()));
        }
        if header.len() != EXPECTED_HEADER.len() {
            return Err(SourceError::Stream(format!(
                "expected {} header fields, got {}",
                EXPECTED_HEADER.len(),
                header.len()
            )));
        }
        if header.iter().ne(EXPECTED_HEADER) {
            return Err(SourceError::Stream(format!(
                "expected header {:?}, got {:?}",
                EXPECTED_HEADER.join(","),
                header.iter().collect::<Vec<_>>().join(","),
            )));
        }

        Ok(Self { reader, line: 2 })
    }
}

fn parse_timestamp(field: &str, name: &str, line: u64) -> Result<NaiveDateTime, SourceError> {
    NaiveDateTime::parse_from_str(field, TIMESTAMP_FORMAT).map_err(|error| {
        SourceError::InvalidRecord {
            line,
            reason: format!("invalid {name} {field:?}: {error}"),
        }
    })
}

impl<R: io::Read> QuerySource for CsvQuerySource<R> {
    fn next_query(&mut self) -> Result<Option<Query>, SourceError> {
        let line = self.line;
        self.line += 1;

        let mut record = csv::StringRecord::new();
        let has_record = self
            .reader
            .read_record(&mut record)
            .map_err(|error| SourceError::Stream(error.to_string()))?;
        if !has_record {
            return Ok(None);
        }

        if record.len() != EXPECTED_HEADER.len() {
            return Err(SourceError::InvalidRecord {
                line,
                reason: format!("expected {} fields, got {}", EXPECTED_HEADER.len(), record.len()),
            });
        }

        let start_time = parse_timestamp(&record[1], "start_time", line)?;
        let end_time = parse_timestamp(&record[2], "end_time", line)?;

        Ok(Some(Query::new(&record[0], start_time, end_time)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_from(content: &str) -> Result<CsvQuerySource<&[u8]>, SourceError> {
        CsvQuerySource::new(content.as_bytes())
    }

    #[test]
    fn test_build_sql() {
        let query = Query::new(
            "host1",
            NaiveDateTime::parse_from_str("2017-01-01 08:59:22", TIMESTAMP_FORMAT).unwrap(),
            NaiveDateTime::parse_from_str("2017-01-01 09:59:22", TIMESTAMP_FORMAT).unwrap(),
        );

        assert_eq!(
            query.build(),
            "SELECT * FROM cpu_usage WHERE hostname = 'host1' \
             AND ts BETWEEN '2017-01-01 08:59:22' AND '2017-01-01 09:59:22'"
        );
    }

    #[test]
    fn test_header_validated() {
        assert!(source_from("hostname,start_time,end_time\n").is_ok());
        assert!(source_from("").is_err());
        assert!(source_from("hostname,start_time\n").is_err());
        assert!(source_from("host,begin,end\n").is_err());
    }

    #[test]
    fn test_reads_valid_rows_then_end_of_stream() {
        let mut source = source_from(
            "hostname,start_time,end_time\n\
             host_000001,2017-01-01 08:59:22,2017-01-01 09:59:22\n\
             host_000002,2017-01-02 13:02:02,2017-01-02 14:02:02\n",
        )
        .unwrap();

        let first = source.next_query().unwrap().unwrap();
        assert_eq!(first.hostname, "host_000001");

        let second = source.next_query().unwrap().unwrap();
        assert_eq!(second.hostname, "host_000002");

        assert!(source.next_query().unwrap().is_none());
        // end-of-stream is stable
        assert!(source.next_query().unwrap().is_none());
    }

    #[test]
    fn test_invalid_row_is_recoverable_and_numbered() {
        let mut source = source_from(
            "hostname,start_time,end_time\n\
             host1,not-a-time,2017-01-01 09:59:22\n\
             host2,2017-01-02 13:02:02,2017-01-02 14:02:02\n",
        )
        .unwrap();

        let error = source.next_query().unwrap_err();
        assert!(error.is_recoverable());
        match error {
            SourceError::InvalidRecord { line, reason } => {
                assert_eq!(line, 2);
                assert!(reason.contains("start_time"));
            }
            other => panic!("expected InvalidRecord, got {other:?}"),
        }

        // the stream continues past the bad row
        let next = source.next_query().unwrap().unwrap();
        assert_eq!(next.hostname, "host2");
    }

    #[test]
    fn test_wrong_arity_row_is_recoverable() {
        let mut source = source_from(
            "hostname,start_time,end_time\n\
             host1,2017-01-01 08:59:22\n",
        )
        .unwrap();

        let error = source.next_query().unwrap_err();
        assert!(error.is_recoverable());
        assert!(error.to_string().contains("expected 3 fields"));
    }

    #[test]
    fn test_reads_from_a_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "hostname,start_time,end_time").unwrap();
        writeln!(file, "host_000042,2017-01-01 08:59:22,2017-01-01 09:59:22").unwrap();
        file.flush().unwrap();

        let input = std::fs::File::open(file.path()).unwrap();
        let mut source = CsvQuerySource::new(input).unwrap();

        let query = source.next_query().unwrap().unwrap();
        assert_eq!(query.hostname, "host_000042");
        assert!(source.next_query().unwrap().is_none());
    }

    #[test]
    fn test_invalid_end_time() {
        let mut source = source_from(
            "hostname,start_time,end_time\n\
             host1,2017-01-01 08:59:22,bogus\n",
        )
        .unwrap();

        let error = source.next_query().unwrap_err();
        assert!(error.is_recoverable());
        assert!(error.to_string().contains("end_time"));
    }
}
