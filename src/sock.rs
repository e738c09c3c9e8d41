//! Connection sources
//!
//! The connection table and the sockets in it belong to the network stack,
//! not to this crate. This module describes the shape of what the stack hands
//! us:
//!
//! - [`TcpSock`]: a full socket with live transport state (every state except
//!   TIME_WAIT and NEW_SYN_RECV)
//! - [`RequestSock`]: a half-open connection waiting to be accepted
//!   (NEW_SYN_RECV)
//! - [`TimeWaitSock`]: the remnant kept after close to absorb late segments
//!   (TIME_WAIT)
//!
//! wrapped in the [`Sock`] handle, plus the [`ConnectionTable`] trait the
//! walker iterates.
//!
//! # Best-effort snapshot contract
//!
//! Every field is an atomic because the owning stack keeps mutating it while
//! a report is being read. Readers take no lock:
//!
//! - the full-socket state goes through [`TcpSock::state_load`] (acquire),
//!   the one read that must be consistent on its own
//! - everything else is a relaxed load, so a multi-field quantity such as
//!   `rcv_nxt - copied_seq` can be torn; derived values are clamped by the
//!   extractor, never retried
//!
//! Addresses are stored raw (network order, see [`crate::codec`]); which
//! ports are network order depends on the shape and is noted per field.

use std::net::SocketAddrV4;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU16, AtomicU32, AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::codec::{TcpState, htons, raw_from_ipv4};
use crate::error::ReportError;

// ============================================================================
// FULL SOCKET
// ============================================================================

/// Full TCP socket
#[derive(Debug, Default)]
pub struct TcpSock {
    /// Current state code; use [`TcpSock::state_load`] to read it
    pub state: AtomicU8,

    /// Bound local address (raw)
    pub rcv_saddr: AtomicU32,
    /// Peer address (raw)
    pub daddr: AtomicU32,
    /// Local port, network order
    pub sport: AtomicU16,
    /// Peer port, network order
    pub dport: AtomicU16,

    /// Connections waiting in the accept queue (meaningful for LISTEN)
    pub ack_backlog: AtomicU32,

    /// Congestion window in segments
    pub snd_cwnd: AtomicU32,
    /// Current effective send MSS
    pub mss_cache: AtomicU32,
    pub rcv_wnd: AtomicU32,
    pub snd_wnd: AtomicU32,
    /// Advertised MSS
    pub advmss: AtomicU32,

    pub segs_in: AtomicU32,
    pub segs_out: AtomicU32,
    pub total_retrans: AtomicU32,

    /// Retransmission timeout in kernel ticks
    pub rto: AtomicU32,
    /// Smoothed RTT, microseconds
    pub srtt_us: AtomicU32,

    // Sequence space (wraps at 2^32)
    pub snd_una: AtomicU32,
    pub snd_nxt: AtomicU32,
    pub write_seq: AtomicU32,
    pub rcv_nxt: AtomicU32,
    pub copied_seq: AtomicU32,

    pub bytes_received: AtomicU64,
    pub bytes_acked: AtomicU64,
}

impl TcpSock {
    /// Socket with the given endpoints and state; every counter starts at 0
    #[must_use]
    pub fn new(local: SocketAddrV4, remote: SocketAddrV4, state: TcpState) -> Self {
        let sk = Self::default();
        sk.rcv_saddr.store(raw_from_ipv4(*local.ip()), Ordering::Relaxed);
        sk.daddr.store(raw_from_ipv4(*remote.ip()), Ordering::Relaxed);
        sk.sport.store(htons(local.port()), Ordering::Relaxed);
        sk.dport.store(htons(remote.port()), Ordering::Relaxed);
        sk.set_state(state.code());
        sk
    }

    /// Atomically consistent read of the current state
    ///
    /// Pairs with [`TcpSock::set_state`]; address fields are read without a
    /// lock, so the state has to come from a single acquire load to avoid
    /// racing a concurrent transition.
    #[inline]
    pub fn state_load(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_state(&self, state: u8) {
        self.state.store(state, Ordering::Release);
    }
}

// ============================================================================
// HALF-OPEN REQUEST
// ============================================================================

/// Half-open connection (SYN received, not yet promoted to a full socket)
///
/// Carries addressing only. No transport statistics exist at this stage.
#[derive(Debug)]
pub struct RequestSock {
    /// Always NEW_SYN_RECV for a well-behaved table
    pub state: AtomicU8,
    pub loc_addr: AtomicU32,
    pub rmt_addr: AtomicU32,
    /// Local port, host order
    pub num: AtomicU16,
    /// Peer port, network order
    pub rmt_port: AtomicU16,
}

impl RequestSock {
    #[must_use]
    pub fn new(local: SocketAddrV4, remote: SocketAddrV4) -> Self {
        Self {
            state: AtomicU8::new(TcpState::NewSynRecv.code()),
            loc_addr: AtomicU32::new(raw_from_ipv4(*local.ip())),
            rmt_addr: AtomicU32::new(raw_from_ipv4(*remote.ip())),
            num: AtomicU16::new(local.port()),
            rmt_port: AtomicU16::new(htons(remote.port())),
        }
    }
}

// ============================================================================
// TIME-WAIT REMNANT
// ============================================================================

/// Post-close remnant kept only to absorb delayed segments
#[derive(Debug)]
pub struct TimeWaitSock {
    /// Coarse state, TIME_WAIT for a well-behaved table
    pub state: AtomicU8,
    /// The state actually reported (TIME_WAIT or FIN_WAIT2)
    pub substate: AtomicU8,
    pub rcv_saddr: AtomicU32,
    pub daddr: AtomicU32,
    /// Local port, network order
    pub sport: AtomicU16,
    /// Peer port, network order
    pub dport: AtomicU16,
}

impl TimeWaitSock {
    #[must_use]
    pub fn new(local: SocketAddrV4, remote: SocketAddrV4, substate: TcpState) -> Self {
        Self {
            state: AtomicU8::new(TcpState::TimeWait.code()),
            substate: AtomicU8::new(substate.code()),
            rcv_saddr: AtomicU32::new(raw_from_ipv4(*local.ip())),
            daddr: AtomicU32::new(raw_from_ipv4(*remote.ip())),
            sport: AtomicU16::new(htons(local.port())),
            dport: AtomicU16::new(htons(remote.port())),
        }
    }
}

// ============================================================================
// HANDLE
// ============================================================================

/// One entry of the connection table
#[derive(Debug)]
pub enum Sock {
    Full(TcpSock),
    Request(RequestSock),
    TimeWait(TimeWaitSock),
}

impl Sock {
    /// Coarse top-level state used to pick an extractor
    ///
    /// Plain relaxed read of the common state field. Only the full-socket
    /// extractor re-reads the state through the acquire accessor.
    #[inline]
    pub fn sk_state(&self) -> u8 {
        match self {
            Sock::Full(sk) => sk.state.load(Ordering::Relaxed),
            Sock::Request(req) => req.state.load(Ordering::Relaxed),
            Sock::TimeWait(tw) => tw.state.load(Ordering::Relaxed),
        }
    }
}

impl From<TcpSock> for Sock {
    fn from(sk: TcpSock) -> Self {
        Sock::Full(sk)
    }
}

impl From<RequestSock> for Sock {
    fn from(req: RequestSock) -> Self {
        Sock::Request(req)
    }
}

impl From<TimeWaitSock> for Sock {
    fn from(tw: TimeWaitSock) -> Self {
        Sock::TimeWait(tw)
    }
}

// ============================================================================
// CONNECTION TABLE
// ============================================================================

/// Iterable source of connection handles for one address family
///
/// Implementors own ordering and locking: the walker assumes every handle
/// passed to `visit` stays valid for the duration of that call and that the
/// table has already dropped anything the report does not cover.
///
/// `visit` may return an error to abandon the walk; implementors must stop
/// and hand that error back unchanged.
pub trait ConnectionTable {
    /// Call `visit` once per handle, in table order
    ///
    /// # Errors
    ///
    /// Whatever `visit` returned first.
    fn for_each_sock(
        &self,
        visit: &mut dyn FnMut(&Sock) -> Result<(), ReportError>,
    ) -> Result<(), ReportError>;
}

impl ConnectionTable for [Sock] {
    fn for_each_sock(
        &self,
        visit: &mut dyn FnMut(&Sock) -> Result<(), ReportError>,
    ) -> Result<(), ReportError> {
        self.iter().try_for_each(visit)
    }
}

impl ConnectionTable for Vec<Sock> {
    fn for_each_sock(
        &self,
        visit: &mut dyn FnMut(&Sock) -> Result<(), ReportError>,
    ) -> Result<(), ReportError> {
        self.as_slice().for_each_sock(visit)
    }
}

/// In-memory connection table shared with a writer
///
/// Insertion order is table order. Iteration holds the read lock for the
/// whole walk, the same arbitration a stack's own table lock gives; socket
/// fields themselves stay lock-free and can change mid-walk.
#[derive(Debug, Default)]
pub struct SockTable {
    socks: RwLock<Vec<Arc<Sock>>>,
}

impl SockTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a socket; the returned handle lets the owner keep mutating it
    pub fn insert(&self, sock: impl Into<Sock>) -> Arc<Sock> {
        let sock = Arc::new(sock.into());
        self.socks.write().push(Arc::clone(&sock));
        sock
    }

    /// Remove a socket previously returned by [`SockTable::insert`]
    pub fn remove(&self, sock: &Arc<Sock>) -> bool {
        let mut socks = self.socks.write();
        let before = socks.len();
        socks.retain(|s| !Arc::ptr_eq(s, sock));
        socks.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.socks.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.socks.read().is_empty()
    }
}

impl ConnectionTable for SockTable {
    fn for_each_sock(
        &self,
        visit: &mut dyn FnMut(&Sock) -> Result<(), ReportError>,
    ) -> Result<(), ReportError> {
        let socks = self.socks.read();
        socks.iter().try_for_each(|sock| visit(Arc::as_ref(sock)))
    }
}
