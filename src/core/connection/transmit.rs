//! Putting packets on the wire: header construction, window-gated sending
//! and retransmission of queue entries.
//!
//! 将包发送到线路上：包头构建、受窗口限制的发送以及队列条目的重传。

use super::{Connection, ConnectionState};
use crate::{
    packet::{Body, Header, Packet, header::flags},
    timer::TimerKind,
};
use tokio::time::Instant;
use tracing::{debug, trace};

impl Connection {
    fn header_for(&self, offset: u32, sequence: u32, body: &Body) -> Header {
        let packet_type = body.packet_type();
        Header {
            source_port: self.source_port,
            dest_port: self.dest_port,
            flags: if packet_type.is_handshake() {
                flags::CONNECTION_ID
            } else {
                0
            },
            connection_id: self.conn_id,
            version: self.config.protocol_version,
            offset,
            sequence,
            packet_type,
        }
    }

    pub(super) fn emit(&mut self, offset: u32, sequence: u32, body: Body) {
        let header = self.header_for(offset, sequence, &body);
        self.outbox.push_back(Packet::new(header, body));
        self.stats.packets_sent += 1;
    }

    /// (Re)transmits the queue entry at `offset`. Returns false when the entry
    /// is gone.
    ///
    /// （重新）发送 `offset` 处的队列条目。条目不存在时返回 false。
    pub(super) fn transmit_entry(&mut self, offset: u32, now: Instant) -> bool {
        let Some(transmission) = self.send_queue.transmit(offset, now) else {
            return false;
        };
        if transmission.first {
            trace!(
                cid = self.conn_id,
                offset,
                sequence = transmission.sequence,
                "packet sent"
            );
        } else {
            self.stats.retransmissions += 1;
            debug!(
                cid = self.conn_id,
                offset,
                sequence = transmission.sequence,
                "packet retransmitted"
            );
        }
        self.emit(transmission.offset, transmission.sequence, transmission.body);
        true
    }

    /// Sends untransmitted entries while the congestion window allows.
    ///
    /// 在拥塞窗口允许的情况下发送尚未发送的条目。
    pub(super) fn try_send(&mut self, now: Instant) {
        if self.sending || self.state != ConnectionState::Established {
            return;
        }
        self.sending = true;

        let mut sent = 0;
        while self.send_queue.packets_out() < self.congestion.congestion_window() {
            let Some(offset) = self.send_queue.next_untransmitted() else {
                break;
            };
            if !self.transmit_entry(offset, now) {
                break;
            }
            sent += 1;
        }

        if sent > 0 {
            trace!(
                cid = self.conn_id,
                sent,
                packets_out = self.send_queue.packets_out(),
                cwnd = self.congestion.congestion_window(),
                "window filled"
            );
            self.arm_probe_after_send(now);
        }
        self.sending = false;
    }

    /// New data went out: push the tail loss probe back, or make sure an RTO
    /// is pending once both probes are spent.
    fn arm_probe_after_send(&mut self, now: Instant) {
        if self.tlp_out < 2 {
            if let Some(timeout) = self.tlp_timeout() {
                self.timers.arm(TimerKind::RtoTlp, now + timeout);
            }
        } else if !self.timers.is_pending(TimerKind::RtoTlp) {
            self.timers.arm(TimerKind::RtoTlp, now + self.rto_timeout());
        }
    }
}
