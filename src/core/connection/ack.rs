//! The ACK/NACK protocol, both directions.
//! 双向的 ACK/NACK 协议。
//!
//! Receiving side: DATA goes through the receive queue and the insert
//! disposition picks between an immediate and a delayed ACK. Sending side:
//! an ACK is validated, applied to the send queue, fed to the RTT estimator
//! and the congestion controller, and only then may new data go out.

use super::{CaState, Connection, Role};
use crate::{
    congestion::AckEvent,
    core::reliability::{AckOutcome, Disposition},
    packet::{AckFrames, Body, Header},
    timer::TimerKind,
};
use bytes::Bytes;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

impl Connection {
    pub(super) fn on_data(&mut self, header: &Header, payload: Bytes, now: Instant) {
        let offset = header.offset;
        let rcv_next = self.recv_queue.rcv_next();
        if offset >= rcv_next && !self.recv_queue.in_window(offset) {
            debug!(cid = self.conn_id, offset, rcv_next, "DATA beyond the receive window dropped");
            self.stats.dropped += 1;
            return;
        }

        self.note_arrival(offset, header.sequence, now);

        if !self.syn_acked && self.role == Role::Server {
            self.syn_acked = true;
            if self.send_queue.remove_handshake() {
                debug!(cid = self.conn_id, "SYN_REPLY confirmed by client data");
            }
        }

        if offset < rcv_next {
            trace!(cid = self.conn_id, offset, "duplicate DATA below rcv_next");
            self.possibly_send_ack(true, now);
            return;
        }

        // Only a plain in-order arrival may wait for the delayed ACK.
        let gap_open = !self.recv_queue.is_empty() || offset != rcv_next;
        let disposition = self.recv_queue.insert(offset, payload);
        let immediate = match disposition {
            Disposition::Duplicate => false,
            // A head insert past rcv_next opens a gap, and one at rcv_next
            // with packets buffered above fills one. Either way the sender
            // needs the new NACK list now, not after the delayed-ACK timer.
            Disposition::InsertedHead => gap_open,
            _ => disposition.wants_immediate_ack(),
        };
        trace!(cid = self.conn_id, offset, ?disposition, immediate, "DATA buffered");
        self.delivered.extend(self.recv_queue.drain_in_order());
        self.possibly_send_ack(immediate, now);
    }

    /// Sends an ACK now, or defers it. A deferred ACK goes out when a second
    /// packet arrives or the delayed-ACK timer expires.
    ///
    /// 立即发送ACK或将其延迟。延迟的ACK在第二个包到达或延迟ACK定时器到期时发出。
    pub(super) fn possibly_send_ack(&mut self, immediate: bool, now: Instant) {
        if immediate || self.timers.is_pending(TimerKind::DelayedAck) {
            self.timers.clear(TimerKind::DelayedAck);
            self.send_ack(now);
        } else {
            self.timers.arm(
                TimerKind::DelayedAck,
                now + self.config.reliability.delayed_ack_timeout,
            );
        }
    }

    /// Builds an ACK for everything received so far. The header echoes the
    /// newest packet seen so the peer can take an RTT sample from it.
    ///
    /// 为目前收到的所有内容构建一个ACK。包头回显最新看到的包，以便对端据此获取RTT样本。
    pub(super) fn send_ack(&mut self, now: Instant) {
        let (Some(last), Some(highest)) = (self.last_rcv, self.highest_rcv) else {
            return;
        };

        let limit = self.config.connection.max_nacks_per_ack;
        let mut nacks = self.recv_queue.missing(highest, limit.saturating_add(1));
        let mut highest_offset = highest;
        if nacks.len() > limit {
            // Offsets past the last reportable gap must not look acknowledged.
            let cut = nacks[limit];
            nacks.truncate(limit);
            highest_offset = self
                .recv_queue
                .highest_below(cut)
                .unwrap_or(self.recv_queue.rcv_next().wrapping_sub(1));
            nacks.retain(|offset| *offset < highest_offset);
        }

        let delay_ms = now
            .saturating_duration_since(last.arrival)
            .as_millis()
            .min(u128::from(u32::MAX)) as u32;
        trace!(
            cid = self.conn_id,
            highest_offset,
            nacks = nacks.len(),
            delay_ms,
            "ACK sent"
        );
        let frames = AckFrames {
            highest_offset,
            delay_ms,
            nacks,
        };
        self.emit(last.offset, last.sequence, Body::Ack(frames));
    }

    fn ack_is_well_formed(&self, frames: &AckFrames) -> bool {
        let highest = frames.highest_offset;
        highest < self.send_queue.send_next()
            && frames.nacks.windows(2).all(|pair| pair[0] < pair[1])
            && frames.nacks.last().is_none_or(|last| *last < highest)
    }

    pub(super) fn on_ack(&mut self, header: &Header, frames: AckFrames, now: Instant) {
        if !self.ack_is_well_formed(&frames) {
            debug!(
                cid = self.conn_id,
                highest_offset = frames.highest_offset,
                send_next = self.send_queue.send_next(),
                "malformed ACK dropped"
            );
            self.stats.dropped += 1;
            return;
        }

        let highest_ack = frames.highest_offset;
        let nacked = match self
            .send_queue
            .apply_ack(highest_ack, header.sequence, &frames.nacks)
        {
            AckOutcome::Stale => {
                trace!(cid = self.conn_id, highest_ack, sequence = header.sequence, "stale ACK ignored");
                self.stats.stale_acks += 1;
                return;
            }
            AckOutcome::Applied { nacked } => nacked,
        };

        if !self.received_first_ack {
            self.received_first_ack = true;
            self.congestion
                .on_first_ack(self.send_queue.send_next(), now);
        }

        let delay = Duration::from_millis(u64::from(frames.delay_ms));
        let sample = self
            .send_queue
            .rtt_sample(header.offset, header.sequence, delay, now)
            .filter(|sample| *sample < self.config.reliability.max_rtt_sample);
        if let Some(sample) = sample {
            self.rtt.update(
                sample,
                self.send_queue.first_unack(),
                self.send_queue.send_next(),
            );
        }

        let lowest_nack = frames.nacks.first().copied();
        if let (Some(lowest), Some(previous)) = (lowest_nack, self.first_nack) {
            if lowest > previous {
                // A new loss episode.
                self.timers.clear(TimerKind::HandshakeLoss);
                if self.ca_state == CaState::Recovery {
                    self.ca_state = CaState::Disorder;
                }
            }
        }
        self.first_nack = lowest_nack;

        let acked = self.send_queue.count_acked();
        if nacked == 0 {
            if acked > 0 {
                self.ca_state = CaState::Open;
            }
            self.timers.clear(TimerKind::HandshakeLoss);
            self.timers.clear(TimerKind::EarlyRetransmit);
        } else if self.ca_state == CaState::Open {
            self.ca_state = CaState::Disorder;
        }

        let in_flight = self.send_queue.packets_out();
        self.congestion.on_ack(
            AckEvent {
                highest_ack,
                acked,
                in_flight,
                send_next: self.send_queue.send_next(),
            },
            now,
        );
        if acked > 0 {
            self.congestion
                .on_packets_acked(acked, sample, self.ca_state == CaState::Open, now);
        }

        let covers_last_sent = self.send_queue.last_sent() == Some(highest_ack);
        let outcome = self.send_queue.delete_acked(self.rto_resent);
        if outcome.timeout_resolved {
            self.rto_resent = 0;
            if outcome.spurious_timeout {
                self.congestion.undo();
                self.stats.spurious_rto_undos += 1;
                debug!(
                    cid = self.conn_id,
                    cwnd = self.congestion.congestion_window(),
                    "spurious retransmission timeout undone"
                );
            }
        }
        if outcome.deleted > 0 {
            self.tlp_out = 0;
            self.rto_retransmits = 0;
            self.rearm_rto_tlp(now);
        }
        if self.send_queue.packets_out() == 0 || self.send_queue.is_empty() {
            self.timers.clear(TimerKind::HandshakeLoss);
            self.timers.clear(TimerKind::RtoTlp);
        }

        if nacked > 0 {
            let srtt = self.rtt.srtt();
            if !self.timers.is_pending(TimerKind::HandshakeLoss) {
                self.timers.arm(TimerKind::HandshakeLoss, now + srtt / 4);
            }
            if covers_last_sent && !self.timers.is_pending(TimerKind::EarlyRetransmit)
            {
                self.timers
                    .arm(TimerKind::EarlyRetransmit, now + srtt * 255 / 1000);
            }
        }

        trace!(
            cid = self.conn_id,
            highest_ack,
            acked,
            nacked,
            deleted = outcome.deleted,
            packets_out = self.send_queue.packets_out(),
            cwnd = self.congestion.congestion_window(),
            ca_state = ?self.ca_state,
            "ACK processed"
        );
        self.try_send(now);
    }
}
