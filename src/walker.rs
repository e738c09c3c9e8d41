// ============================================================================
// TABLE WALKER AND ROW EMITTER
// ============================================================================
// One Walker per report read. It is fed a start sentinel followed by every
// connection handle the table yields, and writes one line per item:
//
//   SeqItem::Start      -> header line
//   SeqItem::Sock(sock) -> classify, extract, one data line
//
// === STATE MACHINE ===
//   Header --(start or first handle)--> Row --(handle)--> Row
//
// There is no terminal state. The walker is dropped when the read ends (or is
// abandoned part-way; nothing needs undoing) and the next read starts a new
// walker in Header.
//
// === HEADER ONCE ===
// A handle that arrives before the start sentinel gets the header written in
// front of it. A second start sentinel in the same read is ignored.

use std::fmt::Write;

use log::{debug, trace, warn};
use serde::Serialize;

use crate::config::ReportConfig;
use crate::error::ReportError;
use crate::extract::{Shape, extract};
use crate::record::{HEADER, ROW_CAPACITY};
use crate::sock::{ConnectionTable, Sock};

/// One step of a report read
#[derive(Debug, Clone, Copy)]
pub enum SeqItem<'a> {
    /// Emit the header instead of a row
    Start,
    Sock(&'a Sock),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Header,
    Row,
}

/// Counters for one report read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    /// Data rows written (header excluded)
    pub rows: usize,
    pub established: usize,
    pub half_open: usize,
    pub time_wait: usize,
}

impl WalkStats {
    fn count(&mut self, shape: Shape) {
        self.rows += 1;
        match shape {
            Shape::Established => self.established += 1,
            Shape::HalfOpen => self.half_open += 1,
            Shape::TimeWait => self.time_wait += 1,
        }
    }
}

/// Row emitter for a single report read
#[derive(Debug)]
pub struct Walker<'c> {
    config: &'c ReportConfig,
    phase: Phase,
    /// Reused line buffer (one line at a time)
    line: String,
    stats: WalkStats,
}

impl<'c> Walker<'c> {
    #[must_use]
    pub fn new(config: &'c ReportConfig) -> Self {
        Self {
            config,
            phase: Phase::Header,
            line: String::with_capacity(ROW_CAPACITY),
            stats: WalkStats::default(),
        }
    }

    /// Process one item, writing exactly one line for a handle and at most
    /// one header line per read
    ///
    /// # Errors
    ///
    /// Contract violations from the extractors and sink write failures. A
    /// failed item writes nothing.
    pub fn show<W: Write + ?Sized>(
        &mut self,
        out: &mut W,
        item: SeqItem<'_>,
    ) -> Result<(), ReportError> {
        match item {
            SeqItem::Start => {
                if self.phase == Phase::Row {
                    warn!("start sentinel repeated within one report read; header not re-emitted");
                    return Ok(());
                }
                self.emit_header(out)
            }
            SeqItem::Sock(sock) => {
                let (shape, record) = extract(sock, &self.config.clock).inspect_err(|e| {
                    warn!("aborting report read: {e}");
                })?;

                if self.phase == Phase::Header {
                    self.emit_header(out)?;
                }

                self.line.clear();
                record.write_row(&mut self.line)?;
                trace!("{shape} row: {}", self.line);
                self.config.framing.finish_line(&mut self.line, 0);
                out.write_str(&self.line)?;

                self.stats.count(shape);
                Ok(())
            }
        }
    }

    fn emit_header<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<(), ReportError> {
        self.line.clear();
        self.line.push_str(HEADER);
        self.config.framing.finish_line(&mut self.line, 0);
        out.write_str(&self.line)?;
        self.phase = Phase::Row;
        Ok(())
    }

    #[must_use]
    pub const fn stats(&self) -> WalkStats {
        self.stats
    }
}

/// Run one complete report read over `table`
///
/// Writes the header, then one row per handle in table order.
///
/// # Errors
///
/// The first [`ReportError`] hit; output written before it stays in `out`.
pub fn write_report<W: Write + ?Sized>(
    table: &dyn ConnectionTable,
    config: &ReportConfig,
    out: &mut W,
) -> Result<WalkStats, ReportError> {
    let mut walker = Walker::new(config);
    walker.show(out, SeqItem::Start)?;
    table.for_each_sock(&mut |sock| walker.show(&mut *out, SeqItem::Sock(sock)))?;

    let stats = walker.stats();
    debug!(
        "report read complete: {} rows ({} full, {} half-open, {} time-wait)",
        stats.rows, stats.established, stats.half_open, stats.time_wait
    );
    Ok(stats)
}

/// [`write_report`] into a fresh `String`
///
/// # Errors
///
/// Same as [`write_report`]; partial output is discarded.
pub fn render_report(
    table: &dyn ConnectionTable,
    config: &ReportConfig,
) -> Result<String, ReportError> {
    let mut out = String::new();
    write_report(table, config, &mut out)?;
    Ok(out)
}
