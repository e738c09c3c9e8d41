//! Address and state codec
//!
//! Pure conversions used by the row emitter: a raw 32-bit IPv4 address to
//! dotted-decimal text, and a TCP state code to its canonical name.
//!
//! # Address representation
//!
//! Addresses are carried as the raw in-memory value of a network-order
//! address, exactly as a socket stores it. Octet 0 (the first octet on the
//! wire) is the least significant byte of the `u32`:
//!
//! ```text
//! 127.0.0.1  ->  0x0100_007F
//! ```
//!
//! This is the same layout `/proc/net/tcp` prints in hex, and it is what
//! [`address_to_text`] expects. Use [`raw_from_ipv4`] / [`ipv4_from_raw`] to
//! move between this form and [`Ipv4Addr`].
//!
//! # State names
//!
//! State codes follow the Linux numbering (1 = ESTABLISHED ... 12 =
//! NEW_SYN_RECV, with 0 unused and reported as NONE). The names are the
//! report's vocabulary and must stay byte-for-byte stable; consumers parse
//! them back with [`TcpState::from_name`].

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Serialize, Serializer};

use crate::error::ReportError;
use crate::{
    TCP_CLOSE, TCP_CLOSE_WAIT, TCP_CLOSING, TCP_ESTABLISHED, TCP_FIN_WAIT1, TCP_FIN_WAIT2,
    TCP_LAST_ACK, TCP_LISTEN, TCP_NEW_SYN_RECV, TCP_NONE, TCP_SYN_RECV, TCP_SYN_SENT,
    TCP_TIME_WAIT,
};

/// Longest dotted-quad text plus terminator ("255.255.255.255")
pub const INET_ADDRSTRLEN: usize = 16;

// ============================================================================
// ADDRESSES
// ============================================================================

/// Dotted-decimal rendering of a raw IPv4 address
///
/// Formats straight into the destination writer, least significant byte
/// first. No intermediate allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DottedQuad(pub u32);

impl fmt::Display for DottedQuad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addr = self.0;
        write!(
            f,
            "{}.{}.{}.{}",
            addr & 0xFF,
            (addr >> 8) & 0xFF,
            (addr >> 16) & 0xFF,
            addr >> 24
        )
    }
}

/// Render a raw address as dotted-decimal text, octet 0 first
///
/// ```
/// use connstat::codec::address_to_text;
/// assert_eq!(address_to_text(0x0100_007F).to_string(), "127.0.0.1");
/// ```
#[inline]
#[must_use]
pub const fn address_to_text(addr: u32) -> DottedQuad {
    DottedQuad(addr)
}

/// Raw address value for an [`Ipv4Addr`] (first octet in the low byte)
#[inline]
#[must_use]
pub const fn raw_from_ipv4(ip: Ipv4Addr) -> u32 {
    u32::from_le_bytes(ip.octets())
}

#[inline]
#[must_use]
pub const fn ipv4_from_raw(addr: u32) -> Ipv4Addr {
    let [a, b, c, d] = addr.to_le_bytes();
    Ipv4Addr::new(a, b, c, d)
}

/// Network-order port to host order
#[inline]
#[must_use]
pub const fn ntohs(port: u16) -> u16 {
    u16::from_be(port)
}

/// Host-order port to network order
#[inline]
#[must_use]
pub const fn htons(port: u16) -> u16 {
    port.to_be()
}

/// serde helper: serialize a raw address field as its dotted-quad text
pub fn serialize_addr<S: Serializer>(addr: &u32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&DottedQuad(*addr))
}

// ============================================================================
// TCP STATES
// ============================================================================

/// Connection state as reported in the `state` column
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TcpState {
    None = TCP_NONE,
    Established = TCP_ESTABLISHED,
    SynSent = TCP_SYN_SENT,
    SynReceived = TCP_SYN_RECV,
    FinWait1 = TCP_FIN_WAIT1,
    FinWait2 = TCP_FIN_WAIT2,
    TimeWait = TCP_TIME_WAIT,
    Closed = TCP_CLOSE,
    CloseWait = TCP_CLOSE_WAIT,
    LastAck = TCP_LAST_ACK,
    Listen = TCP_LISTEN,
    Closing = TCP_CLOSING,
    NewSynRecv = TCP_NEW_SYN_RECV,
}

/// Canonical names, indexed by state code
const TCP_STATE_NAMES: [&str; 13] = [
    "NONE",
    "ESTABLISHED",
    "SYN_SENT",
    "SYN_RECEIVED",
    "FIN_WAIT1",
    "FIN_WAIT2",
    "TIME_WAIT",
    "CLOSED",
    "CLOSE_WAIT",
    "LAST_ACK",
    "LISTEN",
    "CLOSING",
    "NEW_SYN_RECV",
];

impl TcpState {
    /// Every state, in code order
    pub const ALL: [TcpState; 13] = [
        TcpState::None,
        TcpState::Established,
        TcpState::SynSent,
        TcpState::SynReceived,
        TcpState::FinWait1,
        TcpState::FinWait2,
        TcpState::TimeWait,
        TcpState::Closed,
        TcpState::CloseWait,
        TcpState::LastAck,
        TcpState::Listen,
        TcpState::Closing,
        TcpState::NewSynRecv,
    ];

    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        TCP_STATE_NAMES[self as usize]
    }

    /// Decode a raw state code
    ///
    /// # Errors
    ///
    /// [`ReportError::UnknownState`] for any code past NEW_SYN_RECV.
    #[inline]
    pub fn from_code(code: u8) -> Result<Self, ReportError> {
        Self::ALL
            .get(usize::from(code))
            .copied()
            .ok_or(ReportError::UnknownState(code))
    }

    /// Reverse lookup used by the report reader
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        TCP_STATE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|idx| Self::ALL[idx])
    }
}

impl TryFrom<u8> for TcpState {
    type Error = ReportError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

impl fmt::Display for TcpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for TcpState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Name for a raw state code
///
/// # Errors
///
/// [`ReportError::UnknownState`] when the code is outside the enumeration.
/// Callers must surface this, not paper over it: it means the source network
/// stack grew a state this table does not know.
#[inline]
pub fn state_to_text(code: u8) -> Result<&'static str, ReportError> {
    TcpState::from_code(code).map(TcpState::name)
}
