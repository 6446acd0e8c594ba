//! Timer expiry handlers and the timeout formulas behind them.
//! 定时器到期处理函数及其超时公式。
//!
//! All formulas are integer arithmetic on `Duration`, e.g. `1.5 * srtt` is
//! `srtt * 3 / 2`.

use super::{CaState, CloseReason, Connection};
use crate::{congestion::CongestionEvent, timer::TimerKind};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

impl Connection {
    /// Tail loss probe timeout for the current flight, `None` with nothing
    /// in flight.
    ///
    /// 当前在途数据的尾部丢失探测超时，没有在途数据时为 `None`。
    pub(super) fn tlp_timeout(&self) -> Option<Duration> {
        let srtt = self.rtt.srtt();
        match self.send_queue.packets_out() {
            0 => None,
            1 => Some((srtt * 3 / 2 + self.config.reliability.delayed_ack_timeout).max(srtt * 2)),
            _ => Some(self.config.reliability.tlp_min_timeout.max(srtt * 2)),
        }
    }

    pub(super) fn rto_timeout(&self) -> Duration {
        self.rtt.backed_off_rto(self.rto_retransmits)
    }

    /// `1.5 * srtt`, doubled per retry and capped at the maximum RTO.
    /// `1.5 * srtt`，每次重试翻倍，并以最大RTO为上限。
    pub(super) fn handshake_timeout(&self) -> Duration {
        let max = self.config.reliability.max_rto;
        let base = (self.rtt.srtt() * 3 / 2).max(Duration::from_millis(1));
        let mut timeout = base;
        for _ in 0..self.handshake_retransmits {
            timeout = timeout.saturating_mul(2);
            if timeout >= max {
                return max;
            }
        }
        timeout.min(max)
    }

    /// Re-arms or clears the RTO/TLP timer after acknowledged packets left
    /// the queue.
    ///
    /// 在已确认的包离开队列后重新设置或清除RTO/TLP定时器。
    pub(super) fn rearm_rto_tlp(&mut self, now: Instant) {
        match self.tlp_timeout() {
            Some(timeout) => self.timers.arm(TimerKind::RtoTlp, now + timeout),
            None => {
                self.timers.clear(TimerKind::RtoTlp);
            }
        }
    }

    pub(super) fn on_handshake_timeout(&mut self, now: Instant) {
        self.handshake_retransmits += 1;
        if self.handshake_retransmits > self.config.reliability.handshake_max_retries {
            warn!(
                cid = self.conn_id,
                retries = self.handshake_retransmits - 1,
                "handshake timed out"
            );
            self.close_with(CloseReason::HandshakeTimeout);
            return;
        }

        let Some(&syn) = self.send_queue.head_offsets(1).first() else {
            error!(cid = self.conn_id, "send queue empty on handshake timer expiry");
            return;
        };
        let timeout = self.handshake_timeout();
        self.timers.arm(TimerKind::HandshakeLoss, now + timeout);
        debug!(
            cid = self.conn_id,
            retries = self.handshake_retransmits,
            ?timeout,
            "handshake timer expired, resending SYN"
        );
        self.transmit_entry(syn, now);
    }

    /// NACK-driven fast retransmission.
    /// NACK驱动的快速重传。
    pub(super) fn on_loss_timeout(&mut self, now: Instant) {
        if self.send_queue.is_empty() {
            error!(cid = self.conn_id, "send queue empty on loss timer expiry");
            return;
        }

        let limit = self.congestion.congestion_window().max(1) as usize;
        let lost = self
            .send_queue
            .nacked_above(self.config.reliability.resend_threshold, limit);
        if lost.is_empty() {
            debug!(cid = self.conn_id, "loss timer expired below the resend threshold");
            return;
        }

        if self.ca_state != CaState::Recovery {
            self.congestion
                .on_congestion_event(CongestionEvent::FastRetransmit);
            self.ca_state = CaState::Recovery;
        }
        debug!(
            cid = self.conn_id,
            count = lost.len(),
            cwnd = self.congestion.congestion_window(),
            ssthresh = self.congestion.slow_start_threshold(),
            "loss timer expired, fast retransmitting"
        );
        for offset in lost {
            self.send_queue.reset_missing_reports(offset);
            if self.transmit_entry(offset, now) {
                self.stats.fast_retransmits += 1;
            }
        }
    }

    pub(super) fn on_early_retransmit_timeout(&mut self, now: Instant) {
        if self.send_queue.is_empty() {
            error!(cid = self.conn_id, "send queue empty on early retransmit expiry");
            return;
        }
        let lost = self.send_queue.nacked_above(0, self.send_queue.len());
        debug!(cid = self.conn_id, count = lost.len(), "early retransmit");
        for offset in lost {
            self.send_queue.reset_missing_reports(offset);
            if self.transmit_entry(offset, now) {
                self.stats.fast_retransmits += 1;
            }
        }
    }

    /// Two tail loss probes, then exponential RTO backoff.
    ///
    /// 先发送两次尾部丢失探测，然后进行指数RTO退避。
    pub(super) fn on_rto_tlp_timeout(&mut self, now: Instant) {
        let Some(&head) = self.send_queue.head_offsets(1).first() else {
            error!(cid = self.conn_id, "send queue empty on rto/tlp timer expiry");
            return;
        };

        if self.tlp_out < 2 {
            // A queued SYN_REPLY is only resent on a duplicate SYN. TLP resends
            // the first data entry behind it.
            let target = self
                .send_queue
                .iter()
                .find(|entry| !entry.packet_type().is_handshake())
                .map_or(head, |entry| entry.offset);
            self.transmit_entry(target, now);
            self.tlp_out += 1;
            self.stats.tlp_probes += 1;
            debug!(cid = self.conn_id, tlp_out = self.tlp_out, offset = target, "tail loss probe sent");

            if self.tlp_out >= 2 {
                self.timers.arm(TimerKind::RtoTlp, now + self.rto_timeout());
            } else if let Some(timeout) = self.tlp_timeout() {
                self.timers.arm(TimerKind::RtoTlp, now + timeout);
            }
            return;
        }

        self.rto_retransmits += 1;
        if self.rto_retransmits > self.config.reliability.max_rto_retransmits {
            warn!(
                cid = self.conn_id,
                retransmits = self.rto_retransmits - 1,
                "retransmission timeout, giving up"
            );
            self.close_with(CloseReason::RetransmitTimeout);
            return;
        }
        self.stats.rto_expiries += 1;

        let timeout = self.rto_timeout();
        self.timers.arm(TimerKind::RtoTlp, now + timeout);

        self.congestion
            .on_congestion_event(CongestionEvent::RetransmissionTimeout);
        self.ca_state = CaState::Loss;

        let heads = self.send_queue.head_offsets(2);
        self.rto_resent = 0;
        for offset in heads {
            self.send_queue.reset_missing_reports(offset);
            if self.transmit_entry(offset, now) {
                self.rto_resent += 1;
            }
        }
        warn!(
            cid = self.conn_id,
            retransmits = self.rto_retransmits,
            ?timeout,
            cwnd = self.congestion.congestion_window(),
            ssthresh = self.congestion.slow_start_threshold(),
            "retransmission timeout"
        );
    }
}
