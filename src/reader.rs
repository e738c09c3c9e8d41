//! Report reader
//!
//! Parses a published report (either framing) back into
//! [`ConnectionRecord`]s. Used by the `connstat` command and by anything else
//! that consumes the report from its file rather than from the registry.
//!
//! Parsing is strict: the header must match exactly, every row must have all
//! 19 columns, and every value must fit its column's type. A malformed report
//! means the producer and consumer disagree on the format, which is worth an
//! error rather than a guess.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;

use crate::codec::{TcpState, raw_from_ipv4};
use crate::error::ParseError;
use crate::record::{COLUMNS, ConnectionRecord, HEADER};

/// Parse a whole report
///
/// Blank lines are skipped; trailing spaces (padded framing) are ignored.
///
/// # Errors
///
/// See [`ParseError`]. The first bad line stops the parse.
pub fn parse_report<R: BufRead>(reader: R) -> Result<Vec<ConnectionRecord>, ParseError> {
    let mut records = Vec::new();
    let mut header_seen = false;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        if !header_seen {
            if line != HEADER {
                return Err(ParseError::BadHeader(line.to_string()));
            }
            header_seen = true;
            continue;
        }

        records.push(parse_row(line, idx + 1)?);
    }

    if !header_seen {
        return Err(ParseError::MissingHeader);
    }
    Ok(records)
}

/// Open `path` and parse it as a report
///
/// # Errors
///
/// `ParseError::Io` if the file cannot be opened, then as [`parse_report`].
pub fn read_report_file(path: impl AsRef<Path>) -> Result<Vec<ConnectionRecord>, ParseError> {
    let file = File::open(path)?;
    parse_report(BufReader::new(file))
}

/// Parse one data row (no line terminator); `line_no` is used in errors
///
/// # Errors
///
/// `ColumnCount`, `Field` or `UnknownState`.
pub fn parse_row(line: &str, line_no: usize) -> Result<ConnectionRecord, ParseError> {
    let fields: Vec<&str> = line.trim_end().split(',').collect();
    if fields.len() != COLUMNS.len() {
        return Err(ParseError::ColumnCount {
            line: line_no,
            expected: COLUMNS.len(),
            found: fields.len(),
        });
    }

    let state = TcpState::from_name(fields[4]).ok_or_else(|| ParseError::UnknownState {
        line: line_no,
        name: fields[4].to_string(),
    })?;

    let mut rec = ConnectionRecord::new(
        parse_addr(&fields, 0, line_no)?,
        parse_num(&fields, 1, line_no)?,
        parse_addr(&fields, 2, line_no)?,
        parse_num(&fields, 3, line_no)?,
        state,
    );

    rec.bytes_in = parse_num(&fields, 5, line_no)?;
    rec.segments_in = parse_num(&fields, 6, line_no)?;
    rec.bytes_out = parse_num(&fields, 7, line_no)?;
    rec.segments_out = parse_num(&fields, 8, line_no)?;
    rec.retransmit_segments = parse_num(&fields, 9, line_no)?;
    rec.unacked_bytes = parse_num(&fields, 10, line_no)?;
    rec.unsent_bytes = parse_num(&fields, 11, line_no)?;
    rec.send_window = parse_num(&fields, 12, line_no)?;
    rec.congestion_window = parse_num(&fields, 13, line_no)?;
    rec.receive_window = parse_num(&fields, 14, line_no)?;
    rec.mss = parse_num(&fields, 15, line_no)?;
    rec.rto = parse_num(&fields, 16, line_no)?;
    rec.rtt = parse_num(&fields, 17, line_no)?;
    rec.receive_queue_depth = parse_num(&fields, 18, line_no)?;

    Ok(rec)
}

#[inline]
fn field_error(fields: &[&str], column: usize, line_no: usize) -> ParseError {
    ParseError::Field {
        line: line_no,
        column: COLUMNS[column],
        value: fields[column].to_string(),
    }
}

#[inline]
fn parse_num<T: FromStr>(fields: &[&str], column: usize, line_no: usize) -> Result<T, ParseError> {
    let raw = fields[column];
    // from_str accepts a leading '+'; the report never writes one
    if raw.starts_with('+') {
        return Err(field_error(fields, column, line_no));
    }
    raw.parse()
        .map_err(|_| field_error(fields, column, line_no))
}

#[inline]
fn parse_addr(fields: &[&str], column: usize, line_no: usize) -> Result<u32, ParseError> {
    fields[column]
        .parse::<Ipv4Addr>()
        .map(raw_from_ipv4)
        .map_err(|_| field_error(fields, column, line_no))
}
