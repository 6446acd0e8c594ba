//! Randomised transfers over a lossy link.
//!
//! Both ends push messages at each other while a seeded RNG drops packets in
//! both directions. Every step checks the send queue invariants; at the end
//! every message must have arrived exactly once and in order.

use crate::{
    config::Config,
    core::{
        connection::Connection,
        test_utils::{ConnectionPair, Direction, delivered, init_tracing, message},
    },
    error::Error,
    packet::{Body, Packet},
};
use bytes::Bytes;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tokio::time::Instant;

const MESSAGES: usize = 100;
const LOSS: f64 = 0.1;

/// Queues as many of the remaining messages as the connection takes.
fn feed(conn: &mut Connection, next: &mut usize, now: Instant) {
    while *next < MESSAGES {
        match conn.send(message(*next), now) {
            Ok(_) => *next += 1,
            Err(Error::SendQueueFull) => break,
            Err(e) => panic!("send failed: {e}"),
        }
    }
}

fn run_lossy_transfer(seed: u64) {
    init_tracing();
    let mut pair = ConnectionPair::established(Config::default());
    let mut rng = StdRng::seed_from_u64(seed);
    let mut acks_seen: Vec<Packet> = Vec::new();

    let expected: Vec<Bytes> = (0..MESSAGES).map(message).collect();
    let (mut client_next, mut server_next) = (0, 0);
    let (mut at_server, mut at_client) = (Vec::new(), Vec::new());

    for step in 0..200_000 {
        feed(&mut pair.client, &mut client_next, pair.now);
        feed(&mut pair.server, &mut server_next, pair.now);

        pair.client.send_queue().assert_invariants();
        pair.server.send_queue().assert_invariants();
        assert!(pair.client.is_established(), "seed {seed}: client closed at step {step}");
        assert!(pair.server.is_established(), "seed {seed}: server closed at step {step}");

        at_server.extend(delivered(&mut pair.server));
        at_client.extend(delivered(&mut pair.client));
        assert!(expected.starts_with(&at_server), "seed {seed}: server delivered out of order");
        assert!(expected.starts_with(&at_client), "seed {seed}: client delivered out of order");

        if at_server.len() == MESSAGES
            && at_client.len() == MESSAGES
            && pair.client.is_drained()
            && pair.server.is_drained()
        {
            assert_replayed_acks_are_stale(&mut pair, acks_seen);
            return;
        }

        let moved = pair.exchange_with(&mut |direction, packet: &Packet| {
            let keep = !rng.random_bool(LOSS);
            if keep && direction == Direction::ServerToClient && matches!(packet.body, Body::Ack(_)) {
                acks_seen.push(packet.clone());
            }
            keep
        });
        if moved == 0 {
            match pair.next_timeout() {
                Some(at) => pair.advance_to(at),
                None => panic!("seed {seed}: transfer stalled at step {step}"),
            }
        } else {
            // Timers that fell due while packets were in flight.
            pair.advance_to(pair.now);
        }
    }
    panic!("seed {seed}: transfer did not finish");
}

/// Feeding old ACKs back to a drained sender must change nothing.
fn assert_replayed_acks_are_stale(pair: &mut ConnectionPair, acks: Vec<Packet>) {
    pair.drain(Direction::ClientToServer);
    let before = pair.client.stats();
    let cwnd = pair.client.congestion_window();
    let srtt = pair.client.rtt().srtt();
    let replayed = acks.len() as u64;

    for ack in acks {
        pair.client.handle_packet(ack, pair.now);
    }

    let after = pair.client.stats();
    assert_eq!(after.stale_acks - before.stale_acks, replayed);
    assert_eq!(after.dropped, before.dropped);
    assert_eq!(pair.client.congestion_window(), cwnd);
    assert_eq!(pair.client.rtt().srtt(), srtt);
    assert!(pair.client.poll_transmit().is_none());
    assert!(pair.client.is_drained());
}

#[test]
fn test_lossy_transfer_seed_1() {
    run_lossy_transfer(1);
}

#[test]
fn test_lossy_transfer_seed_7() {
    run_lossy_transfer(7);
}

#[test]
fn test_lossy_transfer_seed_42() {
    run_lossy_transfer(42);
}

#[test]
fn test_lossy_transfer_seed_2024() {
    run_lossy_transfer(2024);
}
