//! Tests for fast retransmit, tail loss probes and the retransmission timeout.

use crate::{
    config::Config,
    core::{
        connection::{CaState, CloseReason, ConnectionState},
        test_utils::{
            ConnectionPair, Direction, acks, data_offsets, delivered, init_tracing, message,
        },
    },
    error::Error,
    timer::TimerKind,
};
use std::time::Duration;

fn config_with_window(packets: u32) -> Config {
    let mut config = Config::default();
    config.congestion_control.initial_cwnd_packets = packets;
    config
}

#[test]
fn test_fast_retransmit_after_loss_reports_pass_threshold() {
    init_tracing();
    let mut pair = ConnectionPair::established(config_with_window(8));
    for i in 1..=8 {
        pair.client.send(message(i), pair.now).unwrap();
    }
    let data = pair.drain(Direction::ClientToServer);
    assert_eq!(data_offsets(&data), (1..=8).collect::<Vec<_>>());

    let survivors = data.into_iter().filter(|p| p.header.offset != 3).collect();
    pair.now += pair.latency;
    pair.deliver(Direction::ClientToServer, survivors);

    let reports = pair.drain(Direction::ServerToClient);
    let highest: Vec<u32> = acks(&reports).iter().map(|a| a.highest_offset).collect();
    assert_eq!(highest, vec![2, 4, 5, 6, 7, 8]);
    assert!(acks(&reports)[1..].iter().all(|a| a.nacks == vec![3]));

    pair.now += pair.latency;
    pair.deliver(Direction::ServerToClient, reports);
    assert_eq!(pair.client.send_queue().len(), 1, "only the lost packet is left");
    // 1 + 2 + 3 + 4 + 5 from the five ACKs above offset 3.
    assert_eq!(pair.client.send_queue().get(3).unwrap().missing_reports, 15);
    assert_eq!(pair.client.ca_state(), CaState::Disorder);
    assert!(pair.client.timers().is_pending(TimerKind::HandshakeLoss));

    let cwnd_before = pair.client.congestion_window();
    pair.client.handle_timer(TimerKind::HandshakeLoss, pair.now);
    let resent = pair.drain(Direction::ClientToServer);
    assert_eq!(data_offsets(&resent), vec![3]);
    assert_eq!(pair.client.ca_state(), CaState::Recovery);
    assert_eq!(pair.client.stats().fast_retransmits, 1);
    assert_eq!(pair.client.stats().rto_expiries, 0);
    assert!(pair.client.congestion_window() < cwnd_before);
    assert_eq!(
        pair.client.congestion_window(),
        pair.client.slow_start_threshold()
    );
    assert_eq!(pair.client.send_queue().get(3).unwrap().missing_reports, 0);

    pair.now += pair.latency;
    pair.deliver(Direction::ClientToServer, resent);
    let expected: Vec<_> = (1..=8).map(message).collect();
    assert_eq!(delivered(&mut pair.server), expected);

    pair.pump();
    assert!(pair.client.is_drained());
    assert_eq!(pair.client.ca_state(), CaState::Open);
}

#[test]
fn test_loss_timer_below_threshold_resends_nothing() {
    let mut pair = ConnectionPair::established(config_with_window(8));
    for i in 1..=3 {
        pair.client.send(message(i), pair.now).unwrap();
    }
    let data = pair.drain(Direction::ClientToServer);
    let survivors = data.into_iter().filter(|p| p.header.offset != 1).collect();
    pair.deliver(Direction::ClientToServer, survivors);
    let reports = pair.drain(Direction::ServerToClient);
    pair.deliver(Direction::ServerToClient, reports);

    // Reports of 1 and 2 add up to exactly the threshold.
    assert_eq!(pair.client.send_queue().get(1).unwrap().missing_reports, 3);
    let cwnd = pair.client.congestion_window();

    pair.client.handle_timer(TimerKind::HandshakeLoss, pair.now);
    assert!(pair.drain(Direction::ClientToServer).is_empty());
    assert_eq!(pair.client.stats().retransmissions, 0);
    assert_eq!(pair.client.ca_state(), CaState::Disorder);
    assert_eq!(pair.client.congestion_window(), cwnd);
}

#[test]
fn test_early_retransmit_keeps_the_window() {
    let mut pair = ConnectionPair::established(Config::default());
    pair.client.send(message(1), pair.now).unwrap();
    pair.client.send(message(2), pair.now).unwrap();
    let data = pair.drain(Direction::ClientToServer);
    let survivors = data.into_iter().filter(|p| p.header.offset != 1).collect();
    pair.deliver(Direction::ClientToServer, survivors);
    let report = pair.drain(Direction::ServerToClient);
    pair.deliver(Direction::ServerToClient, report);

    let srtt = pair.client.rtt().srtt();
    assert_eq!(
        pair.client.timers().deadline(TimerKind::HandshakeLoss),
        Some(pair.now + srtt / 4)
    );
    let early = pair
        .client
        .timers()
        .deadline(TimerKind::EarlyRetransmit)
        .unwrap();
    assert_eq!(early, pair.now + srtt * 255 / 1000);

    let cwnd = pair.client.congestion_window();
    // Both timers are due; the loss timer finds nothing above the threshold.
    pair.advance_to(early);
    let resent = pair.drain(Direction::ClientToServer);
    assert_eq!(data_offsets(&resent), vec![1]);
    assert_eq!(pair.client.stats().fast_retransmits, 1);
    assert_eq!(pair.client.congestion_window(), cwnd);
    assert_eq!(pair.client.ca_state(), CaState::Disorder);
}

#[test]
fn test_tail_loss_probe_timeouts() {
    let mut pair = ConnectionPair::established(Config::default());
    let srtt = pair.client.rtt().srtt();
    assert_eq!(srtt, Duration::from_millis(20));

    pair.client.send(message(1), pair.now).unwrap();
    // One packet out: max(1.5 * srtt + delayed ACK, 2 * srtt).
    assert_eq!(
        pair.client.timers().deadline(TimerKind::RtoTlp),
        Some(pair.now + Duration::from_millis(70))
    );

    pair.client.send(message(2), pair.now).unwrap();
    // Several packets out: max(tlp minimum, 2 * srtt).
    assert_eq!(
        pair.client.timers().deadline(TimerKind::RtoTlp),
        Some(pair.now + Duration::from_millis(40))
    );
    pair.drain(Direction::ClientToServer);

    let start = pair.now;
    pair.advance(Duration::from_millis(40));
    let probe = pair.drain(Direction::ClientToServer);
    assert_eq!(data_offsets(&probe), vec![1], "a probe resends the head only");
    assert_eq!(pair.client.tlp_out(), 1);
    assert_eq!(pair.client.stats().tlp_probes, 1);
    assert_eq!(pair.client.ca_state(), CaState::Open);

    pair.advance(Duration::from_millis(40));
    let probe = pair.drain(Direction::ClientToServer);
    assert_eq!(data_offsets(&probe), vec![1]);
    assert_eq!(pair.client.tlp_out(), 2);
    let rto = pair.client.rtt().rto();
    assert_eq!(rto, Duration::from_millis(220));
    assert_eq!(
        pair.client.timers().deadline(TimerKind::RtoTlp),
        Some(start + Duration::from_millis(80) + rto),
        "both probes spent, the RTO is next"
    );

    let deadline = pair.client.next_timeout().unwrap();
    pair.advance_to(deadline);
    let resent = pair.drain(Direction::ClientToServer);
    assert_eq!(data_offsets(&resent), vec![1, 2], "an RTO resends two head packets");
    assert_eq!(pair.client.stats().rto_expiries, 1);
    assert_eq!(pair.client.stats().tlp_probes, 2);
    assert_eq!(pair.client.ca_state(), CaState::Loss);
}

#[test]
fn test_retransmission_timeout_backs_off_exponentially() {
    init_tracing();
    let mut pair = ConnectionPair::established(Config::default());
    let start = pair.now;
    pair.client.send(message(1), pair.now).unwrap();
    pair.drain(Direction::ClientToServer);

    let mut expiries = Vec::new();
    for _ in 0..5 {
        let deadline = pair.client.next_timeout().unwrap();
        expiries.push(deadline - start);
        pair.advance_to(deadline);
        // The link is down; every retransmission vanishes.
        let resent = pair.drain(Direction::ClientToServer);
        assert_eq!(data_offsets(&resent), vec![1]);
        assert!(pair.drain(Direction::ServerToClient).is_empty());
    }

    let ms = Duration::from_millis;
    // Two probes 70ms apart, then RTOs of 220, 440 and 880ms.
    assert_eq!(expiries, vec![ms(70), ms(140), ms(360), ms(800), ms(1680)]);
    assert_eq!(pair.client.stats().tlp_probes, 2);
    assert_eq!(pair.client.stats().rto_expiries, 3);
    assert_eq!(pair.client.rto_retransmits(), 3);
    assert_eq!(pair.client.congestion_window(), 1);
    assert_eq!(pair.client.slow_start_threshold(), 2);
    assert_eq!(
        pair.client.timers().deadline(TimerKind::RtoTlp),
        Some(start + ms(1680) + ms(1760))
    );
}

#[test]
fn test_connection_abandoned_after_max_rto_retransmits() {
    let mut config = Config::default();
    config.reliability.max_rto_retransmits = 2;
    let mut pair = ConnectionPair::established(config);
    pair.client.send(message(1), pair.now).unwrap();

    // Two probes, two RTOs, then the give-up.
    for _ in 0..5 {
        pair.drain(Direction::ClientToServer);
        let deadline = pair.client.next_timeout().unwrap();
        pair.advance_to(deadline);
    }

    assert_eq!(pair.client.state(), ConnectionState::Closed);
    assert_eq!(
        pair.client.close_reason(),
        Some(CloseReason::RetransmitTimeout)
    );
    assert_eq!(pair.client.stats().rto_expiries, 2);
    assert!(pair.client.next_timeout().is_none());
    assert!(pair.drain(Direction::ClientToServer).is_empty());
    assert!(matches!(
        pair.client.send(message(2), pair.now),
        Err(Error::ConnectionTimeout)
    ));
}

#[test]
fn test_spurious_rto_is_undone() {
    init_tracing();
    let mut pair = ConnectionPair::established(config_with_window(4));
    for i in 1..=4 {
        pair.client.send(message(i), pair.now).unwrap();
    }
    let data = pair.drain(Direction::ClientToServer);
    let survivors = data.into_iter().filter(|p| p.header.offset > 2).collect();
    pair.now += pair.latency;
    pair.deliver(Direction::ClientToServer, survivors);

    // The ACKs are delayed in the network past the RTO.
    let mut reports = pair.drain(Direction::ServerToClient);
    assert_eq!(acks(&reports).len(), 2);
    let held = reports.pop().unwrap();
    assert_eq!(acks(std::slice::from_ref(&held))[0].highest_offset, 4);

    for _ in 0..3 {
        let deadline = pair.client.next_timeout().unwrap();
        pair.advance_to(deadline);
        pair.drain(Direction::ClientToServer);
    }
    assert_eq!(pair.client.stats().rto_expiries, 1);
    assert_eq!(pair.client.congestion_window(), 1);

    pair.deliver(Direction::ServerToClient, vec![held]);
    assert_eq!(pair.client.stats().spurious_rto_undos, 1);
    assert_eq!(pair.client.congestion_window(), 4);
    assert_eq!(pair.client.send_queue().len(), 2, "offsets 1 and 2 still missing");
    assert_eq!(pair.client.tlp_out(), 0);
    assert_eq!(pair.client.rto_retransmits(), 0);
}

#[test]
fn test_server_tlp_skips_the_syn_reply() {
    let mut pair = ConnectionPair::new(Config::default());
    pair.client.connect(pair.now).unwrap();
    let syn = pair.drain(Direction::ClientToServer);
    pair.now += pair.latency;
    pair.deliver(Direction::ClientToServer, syn);

    pair.server.send(message(1), pair.now).unwrap();
    let lost = pair.drain(Direction::ServerToClient);
    let offsets: Vec<u32> = lost.iter().map(|p| p.header.offset).collect();
    assert_eq!(offsets, vec![0, 1]);

    // Nothing reaches the client; the server's TLP timer fires.
    let deadline = pair.server.timers().deadline(TimerKind::RtoTlp).unwrap();
    pair.now = deadline;
    pair.server.handle_timer(TimerKind::RtoTlp, pair.now);
    let resent = pair.drain(Direction::ServerToClient);
    let offsets: Vec<u32> = resent.iter().map(|p| p.header.offset).collect();
    assert_eq!(offsets, vec![1], "TLP resends data, not the SYN_REPLY");
    assert_eq!(pair.server.tlp_out(), 1);
    assert_eq!(pair.server.stats().tlp_probes, 1);

    let deadline = pair.server.timers().deadline(TimerKind::RtoTlp).unwrap();
    pair.now = deadline;
    pair.server.handle_timer(TimerKind::RtoTlp, pair.now);
    let resent = pair.drain(Direction::ServerToClient);
    assert_eq!(data_offsets(&resent), vec![1]);
    assert_eq!(resent.len(), 1);
    assert_eq!(pair.server.tlp_out(), 2);
}
