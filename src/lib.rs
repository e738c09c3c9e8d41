// ============================================================================
// CONNSTAT LIBRARY
// ============================================================================
// Per-connection TCP (IPv4) statistics report.
//
// The network stack owns the connection table. This library walks it and
// turns every connection into one CSV row of point-in-time gauges:
// addresses, ports, state, windows, segment and byte counters,
// retransmissions, RTT/RTO and queue depths.
//
// === KEY PIECES ===
// 1. codec     - raw IPv4 address -> dotted quad, state code -> state name
// 2. record    - the one row layout every connection is normalized into
// 3. sock      - the three source shapes and the connection table trait
// 4. extract   - one extractor per shape, plus the tick clock
// 5. walker    - Header/Row state machine that writes the report
// 6. registry  - attach/detach of the report per network namespace
// 7. reader    - parse a published report back into records
// 8. filter    - select rows by address, port and state
//
// === OUTPUT ===
//   laddr,lport,raddr,rport,state,inbytes,insegs,outbytes,outsegs,retranssegs,
//   suna,unsent,swnd,cwnd,rwnd,mss,rto,rtt,rxqueue
// followed by one row per connection, in table order.
//
// === WHAT THIS IS NOT ===
// Not a packet sniffer and not a netstat. Values are read, unit-converted and
// subtracted, nothing more. No history is kept.

// === MODULE DECLARATIONS ===
pub mod codec;
pub mod config;
pub mod error;
pub mod extract;
pub mod filter;
pub mod reader;
pub mod record;
pub mod registry;
pub mod sock;
pub mod walker;

pub use codec::{TcpState, address_to_text, state_to_text};
pub use config::ReportConfig;
pub use error::{ConfigError, ParseError, RegistryError, ReportError};
pub use extract::{Shape, TickClock, classify, extract};
pub use filter::ConnectionFilter;
pub use reader::{parse_report, read_report_file};
pub use record::{COLUMNS, ConnectionRecord, HEADER, RowFraming};
pub use registry::{NamespaceId, ReportRegistry};
pub use sock::{ConnectionTable, RequestSock, Sock, SockTable, TcpSock, TimeWaitSock};
pub use walker::{SeqItem, WalkStats, Walker, render_report, write_report};

// ============================================================================
// REPORT RESOURCE
// ============================================================================

/// Name the report is published under in each namespace
pub const RESOURCE_NAME: &str = "stats_tcp";

/// Where the report is read from by default
pub const DEFAULT_STATS_PATH: &str = "/proc/net/stats_tcp";

/// Environment variable that overrides [`DEFAULT_STATS_PATH`]
pub const STATS_FILENAME_ENV: &str = "STATS_FILENAME";

// ============================================================================
// TCP STATE CONSTANTS
// ============================================================================
// Linux numbering. 0 is not a real state; it is kept so the state table can
// be indexed directly by code.
pub const TCP_NONE: u8 = 0x00;
pub const TCP_ESTABLISHED: u8 = 0x01; // Data flowing
pub const TCP_SYN_SENT: u8 = 0x02; // Active open, SYN sent
pub const TCP_SYN_RECV: u8 = 0x03; // SYN received, reported as SYN_RECEIVED
pub const TCP_FIN_WAIT1: u8 = 0x04;
pub const TCP_FIN_WAIT2: u8 = 0x05;
pub const TCP_TIME_WAIT: u8 = 0x06; // Closed, absorbing late segments
pub const TCP_CLOSE: u8 = 0x07; // Reported as CLOSED
pub const TCP_CLOSE_WAIT: u8 = 0x08; // Peer closed, waiting for local close
pub const TCP_LAST_ACK: u8 = 0x09;
pub const TCP_LISTEN: u8 = 0x0A;
pub const TCP_CLOSING: u8 = 0x0B; // Both sides closing simultaneously
pub const TCP_NEW_SYN_RECV: u8 = 0x0C; // Request socket awaiting accept

#[cfg(test)]
mod tests;
