//! The one round-trip handshake.
//! 一次往返的握手。
//!
//! The client queues a SYN at offset 0 and retransmits it from the
//! handshake timer. The server answers with a SYN_REPLY carrying a cookie and
//! an ACK of the SYN, and keeps it queued until the client's first DATA or ACK
//! shows it arrived.

use super::{Connection, ConnectionState, LastReceived};
use crate::{
    error::{Error, Result},
    packet::{Body, Header, SynReplyFrame},
    timer::TimerKind,
};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

impl Connection {
    /// Opens the connection actively: queues and sends the SYN and arms the
    /// handshake timer.
    ///
    /// 主动打开连接：排入并发送SYN，设置握手定时器。
    pub fn connect(&mut self, now: Instant) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        if self.state != ConnectionState::Closed {
            return Err(Error::ConnectionExists);
        }

        let offset = self.send_queue.enqueue(Body::Syn)?;
        self.state = ConnectionState::SynSent;
        self.transmit_entry(offset, now);
        let timeout = self.handshake_timeout();
        self.timers.arm(TimerKind::HandshakeLoss, now + timeout);
        info!(cid = self.conn_id, ?timeout, "SYN sent");
        Ok(())
    }

    pub(super) fn on_syn(&mut self, header: &Header, now: Instant) {
        let cookie = rand::random::<u32>();
        let reply = SynReplyFrame {
            cookie,
            acked_offset: header.offset,
        };
        let offset = match self.send_queue.enqueue(Body::SynReply(reply)) {
            Ok(offset) => offset,
            Err(e) => {
                warn!(cid = self.conn_id, error = %e, "cannot queue SYN_REPLY");
                self.stats.dropped += 1;
                return;
            }
        };

        self.cookie = cookie;
        self.recv_queue.set_rcv_next(header.offset.wrapping_add(1));
        self.note_arrival(header.offset, header.sequence, now);
        self.state = ConnectionState::Established;
        self.transmit_entry(offset, now);
        info!(cid = self.conn_id, cookie, "SYN received, connection established");
    }

    /// A SYN for an established server connection: the SYN_REPLY was lost
    /// unless the client already sent data.
    pub(super) fn on_duplicate_syn(&mut self, now: Instant) {
        if self.syn_acked {
            debug!(cid = self.conn_id, "duplicate SYN after handshake ignored");
            return;
        }
        let head = self
            .send_queue
            .iter()
            .next()
            .filter(|entry| entry.packet_type().is_handshake())
            .map(|entry| entry.offset);
        match head {
            Some(offset) => {
                debug!(cid = self.conn_id, "duplicate SYN, resending SYN_REPLY");
                self.transmit_entry(offset, now);
            }
            None => debug!(cid = self.conn_id, "duplicate SYN, SYN_REPLY already acknowledged"),
        }
    }

    pub(super) fn on_syn_reply(&mut self, header: &Header, reply: SynReplyFrame, now: Instant) {
        let Some(syn) = self.send_queue.get(reply.acked_offset) else {
            warn!(
                cid = self.conn_id,
                acked_offset = reply.acked_offset,
                "SYN_REPLY does not acknowledge our SYN"
            );
            self.stats.dropped += 1;
            return;
        };
        let syn_sequence = syn.sequence;
        let sample = self
            .send_queue
            .rtt_sample(reply.acked_offset, syn_sequence, Duration::ZERO, now)
            .filter(|sample| *sample < self.config.reliability.max_rtt_sample);

        self.timers.clear(TimerKind::HandshakeLoss);
        self.state = ConnectionState::Established;
        self.cookie = reply.cookie;
        self.handshake_retransmits = 0;

        self.send_queue.acknowledge_through(reply.acked_offset);
        self.received_first_ack = true;
        self.congestion
            .on_first_ack(self.send_queue.send_next(), now);
        if let Some(sample) = sample {
            self.rtt.update(
                sample,
                self.send_queue.first_unack(),
                self.send_queue.send_next(),
            );
        }
        self.send_queue.delete_acked(0);

        self.recv_queue.set_rcv_next(header.offset.wrapping_add(1));
        self.highest_rcv = Some(header.offset);
        self.last_rcv = Some(LastReceived {
            offset: header.offset,
            sequence: header.sequence,
            arrival: now,
        });

        info!(
            cid = self.conn_id,
            cookie = reply.cookie,
            srtt = ?self.rtt.srtt(),
            "SYN_REPLY received, connection established"
        );
        self.try_send(now);
    }
}
