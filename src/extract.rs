// ============================================================================
// SHAPE EXTRACTORS
// ============================================================================
// Turn one connection handle into one ConnectionRecord.
//
// === THREE SHAPES ===
// The coarse state picks the extractor, checked in this order:
//   1. TIME_WAIT     -> time-wait remnant  (addressing + substate only)
//   2. NEW_SYN_RECV  -> half-open request  (addressing, state forced to SYN_RECEIVED)
//   3. anything else -> full socket        (everything)
//
// Fields a shape cannot supply stay at the zero ConnectionRecord::new() gives.
//
// === NO LOCKING ===
// Every read here is a single atomic load of shared state that the network
// stack keeps changing underneath us. Pairs of fields can be observed from
// two different moments. The only place that matters for correctness of the
// output format is the receive queue, which is clamped at zero.

use std::fmt;
use std::sync::atomic::Ordering::Relaxed;

use serde::{Deserialize, Serialize};

use crate::codec::{TcpState, ntohs};
use crate::error::{ConfigError, ReportError};
use crate::record::ConnectionRecord;
use crate::sock::{RequestSock, Sock, TcpSock, TimeWaitSock};
use crate::{TCP_NEW_SYN_RECV, TCP_TIME_WAIT};

// ============================================================================
// TICK CLOCK
// ============================================================================

/// Kernel tick rate assumed when nothing else is configured
pub const DEFAULT_HZ: u32 = 250;

/// User-visible clock tick rate (`USER_HZ`) on every mainstream Linux target
pub const DEFAULT_USER_HZ: u32 = 100;

/// Converts the retransmission timer from kernel ticks to user clock ticks
///
/// `hz` is the rate the socket's `rto` field counts in; `user_hz` is the
/// rate the `rto` column is reported in. Equal rates make the conversion a
/// pass-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickClock {
    #[serde(default = "default_hz")]
    pub hz: u32,
    #[serde(default = "default_user_hz")]
    pub user_hz: u32,
}

#[must_use]
pub const fn default_hz() -> u32 {
    DEFAULT_HZ
}

#[must_use]
pub const fn default_user_hz() -> u32 {
    DEFAULT_USER_HZ
}

impl Default for TickClock {
    fn default() -> Self {
        Self {
            hz: DEFAULT_HZ,
            user_hz: DEFAULT_USER_HZ,
        }
    }
}

impl TickClock {
    /// # Errors
    ///
    /// `ConfigError::Invalid` when either rate is zero.
    pub fn new(hz: u32, user_hz: u32) -> Result<Self, ConfigError> {
        let clock = Self { hz, user_hz };
        clock.validate()?;
        Ok(clock)
    }

    /// Use the running system's `USER_HZ` (`sysconf(_SC_CLK_TCK)`)
    ///
    /// Falls back to [`DEFAULT_USER_HZ`] if the query fails. The kernel tick
    /// rate is not visible from user space and stays at `hz`.
    #[cfg(unix)]
    #[must_use]
    pub fn from_system(hz: u32) -> Self {
        // SAFETY: sysconf has no preconditions and only reads process state
        let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        let user_hz = u32::try_from(ticks)
            .ok()
            .filter(|t| *t > 0)
            .unwrap_or(DEFAULT_USER_HZ);
        Self { hz, user_hz }
    }

    /// # Errors
    ///
    /// `ConfigError::Invalid` when either rate is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hz == 0 || self.user_hz == 0 {
            return Err(ConfigError::Invalid(format!(
                "clock rates must be non-zero (hz={}, user_hz={})",
                self.hz, self.user_hz
            )));
        }
        Ok(())
    }

    /// Kernel ticks to user clock ticks
    ///
    /// Exact division when `hz` is a multiple of `user_hz`, otherwise a
    /// 64-bit scale truncated back to 32 bits.
    #[inline]
    #[must_use]
    pub fn jiffies_to_clock_t(&self, ticks: u32) -> u32 {
        if self.hz == self.user_hz || self.hz == 0 || self.user_hz == 0 {
            return ticks;
        }
        if self.hz % self.user_hz == 0 {
            ticks / (self.hz / self.user_hz)
        } else {
            (u64::from(ticks) * u64::from(self.user_hz) / u64::from(self.hz)) as u32
        }
    }
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Which extractor a handle goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// Full socket: established, listening, opening or closing
    Established,
    /// NEW_SYN_RECV request waiting for accept
    HalfOpen,
    /// TIME_WAIT remnant
    TimeWait,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Shape::Established => "full",
            Shape::HalfOpen => "half-open",
            Shape::TimeWait => "time-wait",
        })
    }
}

/// Pick the extractor for a coarse state code
#[inline]
#[must_use]
pub const fn classify(state: u8) -> Shape {
    match state {
        TCP_TIME_WAIT => Shape::TimeWait,
        TCP_NEW_SYN_RECV => Shape::HalfOpen,
        _ => Shape::Established,
    }
}

/// Classify `sock` and run the matching extractor
///
/// # Errors
///
/// - [`ReportError::ShapeMismatch`] if the coarse state selects a shape the
///   handle does not hold
/// - [`ReportError::UnknownState`] if a state code is outside the enumeration
pub fn extract(sock: &Sock, clock: &TickClock) -> Result<(Shape, ConnectionRecord), ReportError> {
    let state = sock.sk_state();
    let shape = classify(state);

    let record = match (shape, sock) {
        (Shape::TimeWait, Sock::TimeWait(tw)) => extract_time_wait(tw)?,
        (Shape::HalfOpen, Sock::Request(req)) => extract_request(req),
        (Shape::Established, Sock::Full(sk)) => extract_full(sk, clock)?,
        _ => return Err(ReportError::ShapeMismatch { state, shape }),
    };

    Ok((shape, record))
}

// ============================================================================
// EXTRACTORS
// ============================================================================

/// Full socket: every column
///
/// # Errors
///
/// [`ReportError::UnknownState`] if the state load yields an unknown code.
pub fn extract_full(sk: &TcpSock, clock: &TickClock) -> Result<ConnectionRecord, ReportError> {
    let state = TcpState::from_code(sk.state_load())?;

    let mut rec = ConnectionRecord::new(
        sk.rcv_saddr.load(Relaxed),
        ntohs(sk.sport.load(Relaxed)),
        sk.daddr.load(Relaxed),
        ntohs(sk.dport.load(Relaxed)),
        state,
    );

    // cwnd is kept in segments; report bytes
    rec.congestion_window = sk
        .snd_cwnd
        .load(Relaxed)
        .wrapping_mul(sk.mss_cache.load(Relaxed));
    rec.receive_window = sk.rcv_wnd.load(Relaxed);
    rec.send_window = sk.snd_wnd.load(Relaxed);
    rec.mss = sk.advmss.load(Relaxed);
    rec.segments_in = sk.segs_in.load(Relaxed);
    rec.segments_out = sk.segs_out.load(Relaxed);
    rec.retransmit_segments = sk.total_retrans.load(Relaxed);
    rec.rto = clock.jiffies_to_clock_t(sk.rto.load(Relaxed));
    rec.rtt = sk.srtt_us.load(Relaxed);

    // Sequence numbers wrap; differences are taken modulo 2^32
    let snd_nxt = sk.snd_nxt.load(Relaxed);
    rec.unacked_bytes = snd_nxt.wrapping_sub(sk.snd_una.load(Relaxed));
    rec.unsent_bytes = sk.write_seq.load(Relaxed).wrapping_sub(snd_nxt);

    rec.bytes_in = sk.bytes_received.load(Relaxed);
    rec.bytes_out = sk.bytes_acked.load(Relaxed);

    rec.receive_queue_depth = if state == TcpState::Listen {
        sk.ack_backlog.load(Relaxed)
    } else {
        receive_queue(sk.rcv_nxt.load(Relaxed), sk.copied_seq.load(Relaxed))
    };

    Ok(rec)
}

/// Unread bytes in the receive queue, clamped at zero
///
/// Without the socket lock `rcv_nxt` and `copied_seq` can come from
/// different instants and the signed difference can be negative.
#[inline]
#[must_use]
pub const fn receive_queue(rcv_nxt: u32, copied_seq: u32) -> u32 {
    let diff = rcv_nxt.wrapping_sub(copied_seq) as i32;
    if diff < 0 { 0 } else { diff as u32 }
}

/// Half-open request: addressing only, reported as SYN_RECEIVED
#[must_use]
pub fn extract_request(req: &RequestSock) -> ConnectionRecord {
    ConnectionRecord::new(
        req.loc_addr.load(Relaxed),
        req.num.load(Relaxed),
        req.rmt_addr.load(Relaxed),
        ntohs(req.rmt_port.load(Relaxed)),
        TcpState::SynReceived,
    )
}

/// Time-wait remnant: addressing plus its substate
///
/// # Errors
///
/// [`ReportError::UnknownState`] if the substate is not a known code.
pub fn extract_time_wait(tw: &TimeWaitSock) -> Result<ConnectionRecord, ReportError> {
    let substate = TcpState::from_code(tw.substate.load(Relaxed))?;
    Ok(ConnectionRecord::new(
        tw.rcv_saddr.load(Relaxed),
        ntohs(tw.sport.load(Relaxed)),
        tw.daddr.load(Relaxed),
        ntohs(tw.dport.load(Relaxed)),
        substate,
    ))
}
