//! Tests for the SYN / SYN_REPLY handshake.

use crate::{
    config::Config,
    core::{
        connection::{CloseReason, ConnectionState},
        test_utils::{ConnectionPair, Direction, TEST_CID, acks, forged, init_tracing, message},
    },
    error::Error,
    packet::Body,
    timer::TimerKind,
};
use bytes::Bytes;
use std::time::Duration;

#[test]
fn test_handshake_establishes_both_ends() {
    init_tracing();
    let mut pair = ConnectionPair::new(Config::default());
    pair.client.connect(pair.now).unwrap();

    let syn = pair.drain(Direction::ClientToServer);
    assert_eq!(syn.len(), 1);
    assert_eq!(syn[0].body, Body::Syn);
    assert_eq!(syn[0].header.offset, 0);
    assert!(syn[0].header.has_connection_id());
    assert_eq!(pair.client.state(), ConnectionState::SynSent);
    assert_eq!(
        pair.client.timers().deadline(TimerKind::HandshakeLoss),
        Some(pair.now + Duration::from_millis(30)),
        "handshake timer is 1.5 x the initial srtt"
    );

    pair.now += pair.latency;
    pair.deliver(Direction::ClientToServer, syn);
    assert_eq!(pair.server.state(), ConnectionState::Established);
    assert!(!pair.server.timers().is_pending(TimerKind::HandshakeLoss));

    let reply = pair.drain(Direction::ServerToClient);
    assert_eq!(reply.len(), 1);
    let Body::SynReply(frame) = &reply[0].body else {
        panic!("expected SYN_REPLY, got {:?}", reply[0].body);
    };
    assert_eq!(frame.acked_offset, 0);
    assert_eq!(frame.cookie, pair.server.cookie());
    assert!(reply[0].header.has_connection_id());

    pair.now += pair.latency;
    pair.deliver(Direction::ServerToClient, reply);
    assert_eq!(pair.client.state(), ConnectionState::Established);
    assert!(!pair.client.timers().is_pending(TimerKind::HandshakeLoss));
    assert_eq!(pair.client.cookie(), pair.server.cookie());
    assert!(pair.client.send_queue().is_empty(), "SYN acknowledged by the reply");
    assert!(
        pair.drain(Direction::ClientToServer).is_empty(),
        "client replies nothing further"
    );

    // The SYN went out once, so its round trip is a valid sample.
    assert_eq!(pair.client.rtt().srtt(), Duration::from_millis(20));
}

#[test]
fn test_syn_retransmitted_on_handshake_timeout() {
    let mut pair = ConnectionPair::new(Config::default());
    pair.client.connect(pair.now).unwrap();
    let lost = pair.drain(Direction::ClientToServer);
    assert_eq!(lost.len(), 1);

    let deadline = pair.client.next_timeout().unwrap();
    pair.advance_to(deadline);

    let resent = pair.drain(Direction::ClientToServer);
    assert_eq!(resent.len(), 1);
    assert_eq!(resent[0].body, Body::Syn);
    assert_eq!(resent[0].header.offset, 0);
    assert!(resent[0].header.sequence > lost[0].header.sequence);
    assert_eq!(pair.client.handshake_retransmits(), 1);
    assert_eq!(
        pair.client.timers().deadline(TimerKind::HandshakeLoss),
        Some(pair.now + Duration::from_millis(60)),
        "backoff doubles the handshake timeout"
    );

    pair.deliver(Direction::ClientToServer, resent);
    pair.pump();
    assert!(pair.client.is_established());
    assert!(
        !pair.client.rtt().has_sample(),
        "a retransmitted SYN gives no RTT sample"
    );
}

#[test]
fn test_handshake_gives_up_after_max_retries() {
    let mut config = Config::default();
    config.reliability.handshake_max_retries = 2;
    let mut pair = ConnectionPair::new(config);
    pair.client.connect(pair.now).unwrap();

    let mut syns = 0;
    for _ in 0..10 {
        syns += pair.drain(Direction::ClientToServer).len();
        match pair.client.next_timeout() {
            Some(deadline) => pair.advance_to(deadline),
            None => break,
        }
    }

    assert_eq!(syns, 3, "one SYN plus two retransmissions");
    assert_eq!(pair.client.state(), ConnectionState::Closed);
    assert_eq!(pair.client.close_reason(), Some(CloseReason::HandshakeTimeout));
    assert!(matches!(
        pair.client.send(message(0), pair.now),
        Err(Error::ConnectionTimeout)
    ));
}

#[test]
fn test_duplicate_syn_resends_reply_until_client_data() {
    let mut pair = ConnectionPair::new(Config::default());
    pair.client.connect(pair.now).unwrap();
    let syn = pair.drain(Direction::ClientToServer);
    pair.deliver(Direction::ClientToServer, syn.clone());

    // The SYN_REPLY is lost.
    let first_reply = pair.drain(Direction::ServerToClient);
    assert_eq!(first_reply.len(), 1);

    pair.deliver(Direction::ClientToServer, syn.clone());
    let second_reply = pair.drain(Direction::ServerToClient);
    assert_eq!(second_reply.len(), 1);
    assert!(matches!(second_reply[0].body, Body::SynReply(_)));
    assert_eq!(second_reply[0].header.offset, 0);
    assert!(second_reply[0].header.sequence > first_reply[0].header.sequence);

    pair.deliver(Direction::ServerToClient, second_reply);
    assert!(pair.client.is_established());

    pair.client.send(message(1), pair.now).unwrap();
    pair.pump();
    assert!(
        pair.server.send_queue().is_empty(),
        "client data confirms the SYN_REPLY"
    );

    pair.deliver(Direction::ClientToServer, syn);
    assert!(
        pair.drain(Direction::ServerToClient).is_empty(),
        "late duplicate SYN is ignored"
    );
}

#[test]
fn test_duplicate_syn_reply_is_reacknowledged() {
    let mut pair = ConnectionPair::new(Config::default());
    pair.client.connect(pair.now).unwrap();
    let syn = pair.drain(Direction::ClientToServer);
    pair.deliver(Direction::ClientToServer, syn);
    let reply = pair.drain(Direction::ServerToClient);

    pair.deliver(Direction::ServerToClient, reply.clone());
    assert!(pair.drain(Direction::ClientToServer).is_empty());

    pair.deliver(Direction::ServerToClient, reply);
    let response = pair.drain(Direction::ClientToServer);
    let acks = acks(&response);
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].highest_offset, 0);
    assert!(acks[0].nacks.is_empty());

    // The ACK releases the server's SYN_REPLY.
    pair.deliver(Direction::ClientToServer, response);
    assert!(pair.server.send_queue().is_empty());
}

#[test]
fn test_mismatched_connection_id_or_version_is_dropped() {
    let mut pair = ConnectionPair::established(Config::default());
    let rcv_next = pair.server.rcv_next();
    let dropped = pair.server.stats().dropped;

    let stranger = forged(TEST_CID ^ 1, rcv_next, 50, Body::Data(Bytes::from_static(b"x")));
    pair.server.handle_packet(stranger, pair.now);

    let mut old_version = forged(TEST_CID, rcv_next, 51, Body::Data(Bytes::from_static(b"y")));
    old_version.header.version += 1;
    pair.server.handle_packet(old_version, pair.now);

    assert_eq!(pair.server.stats().dropped, dropped + 2);
    assert_eq!(pair.server.rcv_next(), rcv_next);
    assert!(pair.server.poll_delivered().is_none());
    assert!(pair.drain(Direction::ServerToClient).is_empty());
    assert!(pair.server.is_established(), "the connection is unaffected");
}

#[test]
fn test_server_ignores_non_syn_while_closed() {
    let mut pair = ConnectionPair::new(Config::default());
    let data = forged(TEST_CID, 1, 1, Body::Data(Bytes::from_static(b"early")));
    pair.server.handle_packet(data, pair.now);

    assert_eq!(pair.server.state(), ConnectionState::Closed);
    assert_eq!(pair.server.stats().dropped, 1);
    assert!(pair.drain(Direction::ServerToClient).is_empty());
}
