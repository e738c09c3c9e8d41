// Unit tests for the connstat library
// Grouped per function, the way the report is built: codec -> extractors ->
// walker. Socket fixtures use realistic values taken from a loaded web host.

use crate::codec::{ipv4_from_raw, raw_from_ipv4};
use crate::extract::{extract_full, extract_request, extract_time_wait};
use crate::*;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::Ordering::Relaxed;

// ============================================================================
// Fixtures
// ============================================================================

fn endpoint(a: u8, b: u8, c: u8, d: u8, port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::new(a, b, c, d), port)
}

/// ESTABLISHED server-side socket: 192.168.21.201:22 <- 192.168.18.160:57616
fn ssh_session() -> TcpSock {
    let sk = TcpSock::new(
        endpoint(192, 168, 21, 201, 22),
        endpoint(192, 168, 18, 160, 57616),
        TcpState::Established,
    );
    sk.snd_cwnd.store(10, Relaxed);
    sk.mss_cache.store(1448, Relaxed);
    sk.rcv_wnd.store(64256, Relaxed);
    sk.snd_wnd.store(131_072, Relaxed);
    sk.advmss.store(1460, Relaxed);
    sk.segs_in.store(148, Relaxed);
    sk.segs_out.store(82, Relaxed);
    sk.total_retrans.store(3, Relaxed);
    sk.rto.store(51, Relaxed);
    sk.srtt_us.store(363_536, Relaxed);
    sk.snd_una.store(1_000_000, Relaxed);
    sk.snd_nxt.store(1_000_036, Relaxed);
    sk.write_seq.store(1_000_100, Relaxed);
    sk.rcv_nxt.store(5_000_512, Relaxed);
    sk.copied_seq.store(5_000_000, Relaxed);
    sk.bytes_received.store(4977, Relaxed);
    sk.bytes_acked.store(5737, Relaxed);
    sk
}

fn same_rate_clock() -> TickClock {
    TickClock { hz: 100, user_hz: 100 }
}

fn columns(row: &str) -> Vec<&str> {
    row.split(',').collect()
}

// ============================================================================
// Tests for address_to_text()
// ============================================================================
mod test_address_to_text {
    use super::*;

    #[test]
    fn test_real_ip_192_168_21_201() {
        // Same value /proc/net/tcp prints as C915A8C0
        assert_eq!(address_to_text(0xC915_A8C0).to_string(), "192.168.21.201");
    }

    #[test]
    fn test_localhost_127_0_0_1() {
        assert_eq!(address_to_text(0x0100_007F).to_string(), "127.0.0.1");
    }

    #[test]
    fn test_any_address() {
        assert_eq!(address_to_text(0).to_string(), "0.0.0.0");
    }

    #[test]
    fn test_broadcast() {
        assert_eq!(address_to_text(0xFFFF_FFFF).to_string(), "255.255.255.255");
    }

    #[test]
    fn test_every_octet_position() {
        for (shift, expected) in [
            (0, "7.0.0.0"),
            (8, "0.7.0.0"),
            (16, "0.0.7.0"),
            (24, "0.0.0.7"),
        ] {
            assert_eq!(address_to_text(7u32 << shift).to_string(), expected);
        }
    }

    #[test]
    fn test_agrees_with_std_ipv4_display() {
        for ip in [
            Ipv4Addr::new(8, 8, 4, 4),
            Ipv4Addr::new(172, 16, 254, 1),
            Ipv4Addr::new(1, 2, 3, 4),
        ] {
            let raw = raw_from_ipv4(ip);
            assert_eq!(address_to_text(raw).to_string(), ip.to_string());
            assert_eq!(ipv4_from_raw(raw), ip);
        }
    }
}

// ============================================================================
// Tests for state_to_text()
// ============================================================================
mod test_state_to_text {
    use super::*;

    #[test]
    fn test_every_defined_code() {
        let expected = [
            (TCP_NONE, "NONE"),
            (TCP_ESTABLISHED, "ESTABLISHED"),
            (TCP_SYN_SENT, "SYN_SENT"),
            (TCP_SYN_RECV, "SYN_RECEIVED"),
            (TCP_FIN_WAIT1, "FIN_WAIT1"),
            (TCP_FIN_WAIT2, "FIN_WAIT2"),
            (TCP_TIME_WAIT, "TIME_WAIT"),
            (TCP_CLOSE, "CLOSED"),
            (TCP_CLOSE_WAIT, "CLOSE_WAIT"),
            (TCP_LAST_ACK, "LAST_ACK"),
            (TCP_LISTEN, "LISTEN"),
            (TCP_CLOSING, "CLOSING"),
            (TCP_NEW_SYN_RECV, "NEW_SYN_RECV"),
        ];
        for (code, name) in expected {
            assert_eq!(state_to_text(code).unwrap(), name);
        }
    }

    #[test]
    fn test_unknown_code_reported_not_substituted() {
        for code in [13u8, 14, 0x7F, 0xFF] {
            assert!(matches!(
                state_to_text(code),
                Err(ReportError::UnknownState(c)) if c == code
            ));
        }
    }
}

// ============================================================================
// Tests for extract_full()
// ============================================================================
mod test_extract_full {
    use super::*;

    #[test]
    fn test_addressing_and_state() {
        let rec = extract_full(&ssh_session(), &same_rate_clock()).unwrap();
        assert_eq!(address_to_text(rec.local_address).to_string(), "192.168.21.201");
        assert_eq!(rec.local_port, 22);
        assert_eq!(address_to_text(rec.remote_address).to_string(), "192.168.18.160");
        assert_eq!(rec.remote_port, 57616);
        assert_eq!(rec.state, TcpState::Established);
    }

    #[test]
    fn test_windows_and_counters() {
        let rec = extract_full(&ssh_session(), &same_rate_clock()).unwrap();
        assert_eq!(rec.congestion_window, 10 * 1448);
        assert_eq!(rec.receive_window, 64256);
        assert_eq!(rec.send_window, 131_072);
        assert_eq!(rec.mss, 1460);
        assert_eq!(rec.segments_in, 148);
        assert_eq!(rec.segments_out, 82);
        assert_eq!(rec.retransmit_segments, 3);
        assert_eq!(rec.rtt, 363_536);
        assert_eq!(rec.bytes_in, 4977);
        assert_eq!(rec.bytes_out, 5737);
    }

    #[test]
    fn test_sequence_differences() {
        let rec = extract_full(&ssh_session(), &same_rate_clock()).unwrap();
        assert_eq!(rec.unacked_bytes, 36);
        assert_eq!(rec.unsent_bytes, 64);
        assert_eq!(rec.receive_queue_depth, 512);
    }

    #[test]
    fn test_sequence_differences_across_wrap() {
        let sk = ssh_session();
        sk.snd_una.store(u32::MAX - 99, Relaxed);
        sk.snd_nxt.store(100, Relaxed);
        sk.write_seq.store(300, Relaxed);
        let rec = extract_full(&sk, &same_rate_clock()).unwrap();
        assert_eq!(rec.unacked_bytes, 200);
        assert_eq!(rec.unsent_bytes, 200);
    }

    #[test]
    fn test_rto_converted_to_user_ticks() {
        let sk = ssh_session();
        sk.rto.store(1000, Relaxed);
        let clock = TickClock { hz: 1000, user_hz: 100 };
        assert_eq!(extract_full(&sk, &clock).unwrap().rto, 100);
        assert_eq!(extract_full(&sk, &same_rate_clock()).unwrap().rto, 1000);
    }

    #[test]
    fn test_negative_receive_queue_clamped() {
        // Torn read: copied_seq observed after the reader consumed past the
        // rcv_nxt value we saw
        let sk = ssh_session();
        sk.rcv_nxt.store(5_000_000, Relaxed);
        sk.copied_seq.store(5_000_512, Relaxed);
        let rec = extract_full(&sk, &same_rate_clock()).unwrap();
        assert_eq!(rec.receive_queue_depth, 0);
        assert!(rec.to_row().ends_with(",0"));
    }

    #[test]
    fn test_listen_reports_accept_backlog() {
        let sk = TcpSock::new(
            endpoint(0, 0, 0, 0, 8080),
            endpoint(0, 0, 0, 0, 0),
            TcpState::Listen,
        );
        sk.ack_backlog.store(5, Relaxed);
        // Deliberately inconsistent sequence values must not matter
        sk.rcv_nxt.store(10, Relaxed);
        sk.copied_seq.store(99_999, Relaxed);
        let rec = extract_full(&sk, &same_rate_clock()).unwrap();
        assert_eq!(rec.state, TcpState::Listen);
        assert_eq!(rec.receive_queue_depth, 5);

        sk.rcv_nxt.store(1_000_000, Relaxed);
        sk.copied_seq.store(0, Relaxed);
        assert_eq!(
            extract_full(&sk, &same_rate_clock()).unwrap().receive_queue_depth,
            5
        );
    }

    #[test]
    fn test_cwnd_multiplication_wraps() {
        let sk = ssh_session();
        sk.snd_cwnd.store(0x0001_0000, Relaxed);
        sk.mss_cache.store(0x0001_0001, Relaxed);
        let rec = extract_full(&sk, &same_rate_clock()).unwrap();
        assert_eq!(rec.congestion_window, 0x0001_0000u32.wrapping_mul(0x0001_0001));
    }

    #[test]
    fn test_unknown_state_reported() {
        let sk = ssh_session();
        sk.set_state(0x20);
        assert!(matches!(
            extract_full(&sk, &same_rate_clock()),
            Err(ReportError::UnknownState(0x20))
        ));
    }
}

// ============================================================================
// Tests for extract_request() and extract_time_wait()
// ============================================================================
mod test_extract_minimal_shapes {
    use super::*;

    #[test]
    fn test_request_forced_to_syn_received() {
        let req = RequestSock::new(
            endpoint(192, 168, 21, 201, 443),
            endpoint(192, 168, 18, 100, 50684),
        );
        let rec = extract_request(&req);
        assert_eq!(rec.state, TcpState::SynReceived);
        assert_eq!(rec.local_port, 443);
        assert_eq!(rec.remote_port, 50684);
        assert_eq!(address_to_text(rec.remote_address).to_string(), "192.168.18.100");
        assert!(rec.has_no_statistics());
        assert_eq!(rec.receive_queue_depth, 0);
    }

    #[test]
    fn test_time_wait_reports_substate() {
        let tw = TimeWaitSock::new(
            endpoint(10, 1, 1, 1, 5201),
            endpoint(10, 1, 1, 2, 40000),
            TcpState::FinWait2,
        );
        let rec = extract_time_wait(&tw).unwrap();
        assert_eq!(rec.state, TcpState::FinWait2);
        assert_ne!(rec.state.name(), "TIME_WAIT");
        assert_eq!(rec.local_port, 5201);
        assert_eq!(rec.remote_port, 40000);
        assert!(rec.has_no_statistics());
    }

    #[test]
    fn test_time_wait_bad_substate() {
        let tw = TimeWaitSock::new(
            endpoint(10, 1, 1, 1, 1),
            endpoint(10, 1, 1, 2, 2),
            TcpState::TimeWait,
        );
        tw.substate.store(77, Relaxed);
        assert!(matches!(
            extract_time_wait(&tw),
            Err(ReportError::UnknownState(77))
        ));
    }

    #[test]
    fn test_zero_columns_in_emitted_rows() {
        let req = Sock::from(RequestSock::new(
            endpoint(1, 1, 1, 1, 1),
            endpoint(2, 2, 2, 2, 2),
        ));
        let tw = Sock::from(TimeWaitSock::new(
            endpoint(1, 1, 1, 1, 1),
            endpoint(2, 2, 2, 2, 2),
            TcpState::TimeWait,
        ));
        for sock in [&req, &tw] {
            let (_, rec) = extract(sock, &TickClock::default()).unwrap();
            let row = rec.to_row();
            let cols = columns(&row);
            // inbytes .. rtt
            for (idx, value) in cols.iter().enumerate().take(18).skip(5) {
                assert_eq!(*value, "0", "column {} not zero in {row}", COLUMNS[idx]);
            }
        }
    }
}

// ============================================================================
// Tests for extract() dispatch
// ============================================================================
mod test_extract_dispatch {
    use super::*;

    #[test]
    fn test_dispatch_by_state() {
        let full = Sock::from(ssh_session());
        let req = Sock::from(RequestSock::new(
            endpoint(1, 1, 1, 1, 1),
            endpoint(2, 2, 2, 2, 2),
        ));
        let tw = Sock::from(TimeWaitSock::new(
            endpoint(1, 1, 1, 1, 1),
            endpoint(2, 2, 2, 2, 2),
            TcpState::TimeWait,
        ));
        let clock = TickClock::default();
        assert_eq!(extract(&full, &clock).unwrap().0, Shape::Established);
        assert_eq!(extract(&req, &clock).unwrap().0, Shape::HalfOpen);
        assert_eq!(extract(&tw, &clock).unwrap().0, Shape::TimeWait);
    }

    #[test]
    fn test_full_socket_claiming_time_wait_is_mismatch() {
        let sk = ssh_session();
        sk.set_state(TCP_TIME_WAIT);
        let sock = Sock::from(sk);
        assert!(matches!(
            extract(&sock, &TickClock::default()),
            Err(ReportError::ShapeMismatch {
                state: TCP_TIME_WAIT,
                shape: Shape::TimeWait
            })
        ));
    }

    #[test]
    fn test_request_with_wrong_state_is_mismatch() {
        let req = RequestSock::new(endpoint(1, 1, 1, 1, 1), endpoint(2, 2, 2, 2, 2));
        req.state.store(TCP_ESTABLISHED, Relaxed);
        let sock = Sock::from(req);
        assert!(matches!(
            extract(&sock, &TickClock::default()),
            Err(ReportError::ShapeMismatch {
                shape: Shape::Established,
                ..
            })
        ));
    }
}

// ============================================================================
// Tests for write_report()
// ============================================================================
mod test_write_report {
    use super::*;

    #[test]
    fn test_empty_table_is_header_only() {
        let table: Vec<Sock> = Vec::new();
        let report = render_report(&table, &ReportConfig::default()).unwrap();
        assert_eq!(report, format!("{HEADER}\n"));
    }

    #[test]
    fn test_header_once_and_first() {
        let table: Vec<Sock> = vec![
            ssh_session().into(),
            RequestSock::new(endpoint(1, 1, 1, 1, 1), endpoint(2, 2, 2, 2, 2)).into(),
        ];
        let report = render_report(&table, &ReportConfig::default()).unwrap();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines.iter().filter(|l| **l == HEADER).count(), 1);
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_stats_count_shapes() {
        let table: Vec<Sock> = vec![
            ssh_session().into(),
            ssh_session().into(),
            RequestSock::new(endpoint(1, 1, 1, 1, 1), endpoint(2, 2, 2, 2, 2)).into(),
            TimeWaitSock::new(
                endpoint(1, 1, 1, 1, 1),
                endpoint(2, 2, 2, 2, 2),
                TcpState::TimeWait,
            )
            .into(),
        ];
        let mut out = String::new();
        let stats = write_report(&table, &ReportConfig::default(), &mut out).unwrap();
        assert_eq!(
            stats,
            WalkStats {
                rows: 4,
                established: 2,
                half_open: 1,
                time_wait: 1
            }
        );
    }

    #[test]
    fn test_padded_framing_fixed_width_lines() {
        let config = ReportConfig {
            framing: RowFraming::Padded { width: 149 },
            ..ReportConfig::default()
        };
        let table: Vec<Sock> = vec![ssh_session().into()];
        let report = render_report(&table, &config).unwrap();
        for line in report.split_inclusive('\n') {
            assert_eq!(line.len(), 150);
            assert!(line.ends_with(" \n"));
        }
    }

    #[test]
    fn test_contract_violation_aborts_read() {
        let bad = ssh_session();
        bad.set_state(0x40);
        let table: Vec<Sock> = vec![ssh_session().into(), bad.into(), ssh_session().into()];
        let mut out = String::new();
        let result = write_report(&table, &ReportConfig::default(), &mut out);
        assert!(matches!(result, Err(ReportError::UnknownState(0x40))));
        // Header and the first row made it out before the bad handle
        assert_eq!(out.lines().count(), 2);
    }

    #[test]
    fn test_rows_parse_back_identically() {
        let table: Vec<Sock> = vec![
            ssh_session().into(),
            RequestSock::new(endpoint(9, 9, 9, 9, 9), endpoint(8, 8, 8, 8, 8)).into(),
        ];
        let config = ReportConfig::default();
        let report = render_report(&table, &config).unwrap();
        let parsed = parse_report(report.as_bytes()).unwrap();

        let mut expected = Vec::new();
        table
            .for_each_sock(&mut |sock| {
                expected.push(extract(sock, &config.clock)?.1);
                Ok(())
            })
            .unwrap();
        assert_eq!(parsed, expected);
    }
}

// ============================================================================
// Tests for TickClock
// ============================================================================
mod test_tick_clock {
    use super::*;

    #[test]
    fn test_divide_and_scale_paths() {
        let clock = TickClock::new(250, 100).unwrap();
        // 250 is not a multiple of 100: 64-bit scale
        assert_eq!(clock.jiffies_to_clock_t(250), 100);
        assert_eq!(clock.jiffies_to_clock_t(51), 20);

        let clock = TickClock::new(1000, 100).unwrap();
        assert_eq!(clock.jiffies_to_clock_t(51), 5);
    }

    #[test]
    fn test_large_values_do_not_overflow() {
        let clock = TickClock::new(300, 100).unwrap();
        assert_eq!(clock.jiffies_to_clock_t(u32::MAX), u32::MAX / 3);
        let clock = TickClock::new(250, 100).unwrap();
        assert_eq!(
            clock.jiffies_to_clock_t(u32::MAX),
            (u64::from(u32::MAX) * 100 / 250) as u32
        );
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(matches!(TickClock::new(0, 100), Err(ConfigError::Invalid(_))));
        assert!(matches!(TickClock::new(100, 0), Err(ConfigError::Invalid(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_from_system_keeps_kernel_rate() {
        let clock = TickClock::from_system(1000);
        assert_eq!(clock.hz, 1000);
        assert!(clock.user_hz > 0);
        assert!(clock.validate().is_ok());
    }
}
