// ============================================================================
// CONNECTION FILTER
// ============================================================================
// Narrow a report down to the connections a caller cares about.
//
// Every criterion is optional; an empty filter matches everything. Criteria
// combine with AND. Cheapest checks (state, ports) run before address
// comparisons.

use std::net::Ipv4Addr;

use crate::codec::{TcpState, raw_from_ipv4};
use crate::record::ConnectionRecord;

/// Selection criteria for report rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionFilter {
    pub local_ip: Option<Ipv4Addr>,
    pub local_port: Option<u16>,
    pub remote_ip: Option<Ipv4Addr>,
    pub remote_port: Option<u16>,
    /// Accept only these states (empty = any state)
    pub states: Vec<TcpState>,
    /// Stop after this many matches
    pub limit: Option<usize>,
}

impl ConnectionFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only ESTABLISHED connections
    #[must_use]
    pub fn established_only() -> Self {
        Self {
            states: vec![TcpState::Established],
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.local_ip.is_none()
            && self.local_port.is_none()
            && self.remote_ip.is_none()
            && self.remote_port.is_none()
            && self.states.is_empty()
            && self.limit.is_none()
    }

    #[must_use]
    pub fn matches(&self, rec: &ConnectionRecord) -> bool {
        if !self.states.is_empty() && !self.states.contains(&rec.state) {
            return false;
        }
        if self.local_port.is_some_and(|p| p != rec.local_port) {
            return false;
        }
        if self.remote_port.is_some_and(|p| p != rec.remote_port) {
            return false;
        }
        if self
            .local_ip
            .is_some_and(|ip| raw_from_ipv4(ip) != rec.local_address)
        {
            return false;
        }
        if self
            .remote_ip
            .is_some_and(|ip| raw_from_ipv4(ip) != rec.remote_address)
        {
            return false;
        }
        true
    }

    /// Matching records in input order, capped at `limit`
    #[must_use]
    pub fn apply(&self, records: &[ConnectionRecord]) -> Vec<ConnectionRecord> {
        records
            .iter()
            .filter(|rec| self.matches(rec))
            .take(self.limit.unwrap_or(usize::MAX))
            .copied()
            .collect()
    }
}
