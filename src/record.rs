// ============================================================================
// CONNECTION RECORD AND ROW FORMAT
// ============================================================================
// One ConnectionRecord per observed connection. All three source shapes
// (full socket, half-open request, time-wait remnant) are normalized into this
// single type before anything is written, so the row emitter only ever deals
// with one layout.
//
// === LIFECYCLE ===
// Built fresh for each row, written, dropped. Never cached between rows and
// never mutated once built.
//
// === ZERO FILL ===
// ConnectionRecord::new() sets every counter/window/byte field to 0. Shapes
// that cannot supply a field simply never touch it, so every row has the same
// 19 columns with the same types regardless of where it came from.

use std::fmt::{self, Write};

use serde::{Deserialize, Serialize};

use crate::codec::{DottedQuad, TcpState, serialize_addr};

/// Column names, in row order
pub const COLUMNS: [&str; 19] = [
    "laddr",
    "lport",
    "raddr",
    "rport",
    "state",
    "inbytes",
    "insegs",
    "outbytes",
    "outsegs",
    "retranssegs",
    "suna",
    "unsent",
    "swnd",
    "cwnd",
    "rwnd",
    "mss",
    "rto",
    "rtt",
    "rxqueue",
];

/// The header row exactly as published (without line framing)
pub const HEADER: &str = "laddr,lport,raddr,rport,state,inbytes,insegs,outbytes,outsegs,\
                          retranssegs,suna,unsent,swnd,cwnd,rwnd,mss,rto,rtt,rxqueue";

/// Per-connection snapshot
///
/// Field units:
/// - windows, `mss`, `unacked_bytes`, `unsent_bytes`, `receive_queue_depth`: bytes
/// - `congestion_window`: bytes (segments already multiplied by the cached MSS)
/// - `rto`: user-visible clock ticks
/// - `rtt`: microseconds (smoothed)
/// - segment and byte counters: cumulative since connection start
///
/// Addresses are raw network-order values (see [`crate::codec`]); ports are
/// host order. Serialized to JSON with addresses and state as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionRecord {
    #[serde(serialize_with = "serialize_addr")]
    pub local_address: u32,
    pub local_port: u16,
    #[serde(serialize_with = "serialize_addr")]
    pub remote_address: u32,
    pub remote_port: u16,
    pub state: TcpState,

    pub bytes_in: u64,
    pub segments_in: u32,
    pub bytes_out: u64,
    pub segments_out: u32,
    pub retransmit_segments: u32,
    pub unacked_bytes: u32,
    pub unsent_bytes: u32,
    pub send_window: u32,
    pub congestion_window: u32,
    pub receive_window: u32,
    pub mss: u32,
    pub rto: u32,
    pub rtt: u32,
    pub receive_queue_depth: u32,
}

impl ConnectionRecord {
    /// Addressing and state only; every statistic is zero
    #[must_use]
    pub const fn new(
        local_address: u32,
        local_port: u16,
        remote_address: u32,
        remote_port: u16,
        state: TcpState,
    ) -> Self {
        Self {
            local_address,
            local_port,
            remote_address,
            remote_port,
            state,
            bytes_in: 0,
            segments_in: 0,
            bytes_out: 0,
            segments_out: 0,
            retransmit_segments: 0,
            unacked_bytes: 0,
            unsent_bytes: 0,
            send_window: 0,
            congestion_window: 0,
            receive_window: 0,
            mss: 0,
            rto: 0,
            rtt: 0,
            receive_queue_depth: 0,
        }
    }

    /// True when no transport statistic has been filled in
    #[must_use]
    pub const fn has_no_statistics(&self) -> bool {
        self.bytes_in == 0
            && self.segments_in == 0
            && self.bytes_out == 0
            && self.segments_out == 0
            && self.retransmit_segments == 0
            && self.unacked_bytes == 0
            && self.unsent_bytes == 0
            && self.send_window == 0
            && self.congestion_window == 0
            && self.receive_window == 0
            && self.mss == 0
            && self.rto == 0
            && self.rtt == 0
    }

    /// Write the 19 comma-separated columns, no line terminator
    ///
    /// # Errors
    ///
    /// Propagates the sink's `fmt::Error`.
    pub fn write_row<W: Write + ?Sized>(&self, out: &mut W) -> fmt::Result {
        write!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            DottedQuad(self.local_address),
            self.local_port,
            DottedQuad(self.remote_address),
            self.remote_port,
            self.state,
            self.bytes_in,
            self.segments_in,
            self.bytes_out,
            self.segments_out,
            self.retransmit_segments,
            self.unacked_bytes,
            self.unsent_bytes,
            self.send_window,
            self.congestion_window,
            self.receive_window,
            self.mss,
            self.rto,
            self.rtt,
            self.receive_queue_depth,
        )
    }

    /// Row text without framing (handy for logs and tests)
    #[must_use]
    pub fn to_row(&self) -> String {
        let mut row = String::with_capacity(ROW_CAPACITY);
        // Writing into a String cannot fail
        let _ = self.write_row(&mut row);
        row
    }
}

/// Enough for the widest possible row (two 15-byte addresses, two u64 and
/// fourteen u32/u16 values, 18 commas)
pub const ROW_CAPACITY: usize = 256;

// ============================================================================
// LINE FRAMING
// ============================================================================

/// Width the padded framing uses by default (a 150-byte line including '\n',
/// the same convention as /proc/net/tcp)
pub const DEFAULT_PADDED_WIDTH: usize = 149;

/// How each header/data line is terminated
///
/// Column data is identical under both conventions. `Padded` exists for
/// consumers that expect fixed-width records and seek by line size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "mode")]
pub enum RowFraming {
    /// `row\n`
    #[default]
    Plain,
    /// `row` + spaces up to `width` + `\n`; longer rows are never truncated
    Padded {
        #[serde(default = "default_padded_width")]
        width: usize,
    },
}

/// Default value for `RowFraming::Padded::width`
#[must_use]
pub const fn default_padded_width() -> usize {
    DEFAULT_PADDED_WIDTH
}

impl RowFraming {
    /// Terminate the line that occupies `line` from `start` onwards
    pub fn finish_line(&self, line: &mut String, start: usize) {
        if let RowFraming::Padded { width } = *self {
            let written = line.len() - start;
            if written < width {
                line.extend(std::iter::repeat_n(' ', width - written));
            }
        }
        line.push('\n');
    }
}
