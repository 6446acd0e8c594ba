//! Common testing infrastructure for core connection tests.
//!
//! `ConnectionPair` wires a client and a server `Connection` back to back
//! through the real packet codec, under a manually driven clock.

use super::connection::{Connection, Role};
use crate::{
    config::Config,
    packet::{Body, Packet},
};
use bytes::Bytes;
use std::sync::Once;
use std::time::Duration;
use tokio::time::Instant;

static INIT: Once = Once::new();

/// Installs a tracing subscriber once per test binary. `RUST_LOG` controls
/// verbosity.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub const TEST_CID: u64 = 0x5eed_cafe_f00d_0001;

/// Direction of a packet between the two ends of a `ConnectionPair`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

/// A client and a server connection plus the shared virtual clock.
pub struct ConnectionPair {
    pub client: Connection,
    pub server: Connection,
    pub now: Instant,
    /// One-way delay applied by every `exchange_with` hop.
    pub latency: Duration,
}

impl ConnectionPair {
    pub fn new(config: Config) -> Self {
        let now = Instant::now();
        Self {
            client: Connection::new(Role::Client, TEST_CID, config.clone(), now)
                .with_ports(4000, 5000),
            server: Connection::new(Role::Server, TEST_CID, config, now).with_ports(5000, 4000),
            now,
            latency: Duration::from_millis(10),
        }
    }

    /// Runs the handshake to completion on a loss-free link.
    pub fn established(config: Config) -> Self {
        let mut pair = Self::new(config);
        pair.client.connect(pair.now).unwrap();
        pair.pump();
        assert!(pair.client.is_established());
        assert!(pair.server.is_established());
        pair
    }

    /// Takes every queued packet of one side, round-tripping each through
    /// the wire codec.
    pub fn drain(&mut self, direction: Direction) -> Vec<Packet> {
        let from = match direction {
            Direction::ClientToServer => &mut self.client,
            Direction::ServerToClient => &mut self.server,
        };
        std::iter::from_fn(|| from.poll_transmit())
            .map(|packet| Packet::decode(packet.encode().unwrap()).unwrap())
            .collect()
    }

    pub fn deliver(&mut self, direction: Direction, packets: Vec<Packet>) {
        let now = self.now;
        let to = match direction {
            Direction::ClientToServer => &mut self.server,
            Direction::ServerToClient => &mut self.client,
        };
        for packet in packets {
            to.handle_packet(packet, now);
        }
    }

    /// One hop in each direction. `keep` decides which packets survive.
    /// Returns how many packets were put on the wire.
    pub fn exchange_with(&mut self, keep: &mut impl FnMut(Direction, &Packet) -> bool) -> usize {
        let outbound = self.drain(Direction::ClientToServer);
        let inbound = self.drain(Direction::ServerToClient);
        let moved = outbound.len() + inbound.len();
        if moved == 0 {
            return 0;
        }

        self.now += self.latency;
        for (direction, packets) in [
            (Direction::ClientToServer, outbound),
            (Direction::ServerToClient, inbound),
        ] {
            let survivors = packets.into_iter().filter(|p| keep(direction, p)).collect();
            self.deliver(direction, survivors);
        }
        moved
    }

    /// Exchanges packets until both sides are quiet.
    pub fn pump_with(&mut self, mut keep: impl FnMut(Direction, &Packet) -> bool) {
        for _ in 0..10_000 {
            if self.exchange_with(&mut keep) == 0 {
                return;
            }
        }
        panic!("link did not go quiet");
    }

    pub fn pump(&mut self) {
        self.pump_with(|_, _| true);
    }

    /// Moves the clock to `at` and runs the expired timers of both sides.
    pub fn advance_to(&mut self, at: Instant) {
        if at > self.now {
            self.now = at;
        }
        self.client.handle_timeouts(self.now);
        self.server.handle_timeouts(self.now);
    }

    pub fn advance(&mut self, by: Duration) {
        self.advance_to(self.now + by);
    }

    pub fn next_timeout(&self) -> Option<Instant> {
        match (self.client.next_timeout(), self.server.next_timeout()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Collects everything a connection has delivered so far.
pub fn delivered(conn: &mut Connection) -> Vec<Bytes> {
    std::iter::from_fn(|| conn.poll_delivered()).collect()
}

/// Offsets of the DATA packets in `packets`.
pub fn data_offsets(packets: &[Packet]) -> Vec<u32> {
    packets
        .iter()
        .filter(|p| matches!(p.body, Body::Data(_)))
        .map(|p| p.header.offset)
        .collect()
}

pub fn acks(packets: &[Packet]) -> Vec<&crate::packet::AckFrames> {
    packets
        .iter()
        .filter_map(|p| match &p.body {
            Body::Ack(frames) => Some(frames),
            _ => None,
        })
        .collect()
}

pub fn message(i: usize) -> Bytes {
    Bytes::from(format!("message-{i:04}"))
}

/// Builds a packet by hand, e.g. to inject malformed or replayed input.
pub fn forged(conn_id: u64, offset: u32, sequence: u32, body: Body) -> Packet {
    let header = crate::packet::Header {
        source_port: 4000,
        dest_port: 5000,
        flags: 0,
        connection_id: conn_id,
        version: Config::default().protocol_version,
        offset,
        sequence,
        packet_type: body.packet_type(),
    };
    Packet::new(header, body)
}
