//! The ordered queue of outstanding packets.
//!
//! 未完成包的有序队列。
//!
//! Entries are keyed by offset, so iteration is always in ascending offset
//! order. The `last_sent` cursor is an offset, not a reference: removing the
//! entry it names moves it back to the previous key.

use crate::{
    error::{Error, Result},
    packet::{Body, PacketType},
};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, trace};

/// A packet owned by the send queue until it is acknowledged.
///
/// 由发送队列持有直至被确认的包。
#[derive(Debug, Clone)]
pub struct SentPacket {
    pub offset: u32,
    pub body: Body,
    /// Sequence of the latest transmission.
    /// 最近一次传输的序列号。
    pub sequence: u32,
    pub transmissions: u32,
    /// FACK-style loss score, zero when never NACKed.
    /// FACK风格的丢失分数，从未被NACK时为零。
    pub missing_reports: u32,
    pub sent_at: Option<Instant>,
    /// Covered by an ACK and waiting for deletion.
    /// 已被ACK覆盖，等待删除。
    pub acked: bool,
}

impl SentPacket {
    pub fn is_transmitted(&self) -> bool {
        self.transmissions > 0
    }

    pub fn packet_type(&self) -> PacketType {
        self.body.packet_type()
    }
}

/// What a transmission handed back to the caller for putting on the wire.
/// 一次传输交还给调用方、用于发送到线上的信息。
#[derive(Debug, Clone)]
pub struct Transmission {
    pub offset: u32,
    pub sequence: u32,
    pub body: Body,
    /// False for retransmissions.
    /// 重传时为 false。
    pub first: bool,
}

/// Result of applying an ACK to the queue.
/// 将ACK应用到队列的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The ACK did not advance the watermark and changed nothing.
    /// ACK没有推进水位线，未做任何改变。
    Stale,
    /// The ACK was applied; `nacked` queue entries were reported missing.
    /// ACK已被应用；`nacked` 个队列条目被报告缺失。
    Applied { nacked: u32 },
}

/// Result of `delete_acked`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted: u32,
    /// The first deletion after a timeout happened; the timeout bookkeeping
    /// can be dropped.
    /// 超时后的第一次删除已发生，可以清除超时记录。
    pub timeout_resolved: bool,
    /// That first deletion was of a packet the timeout did not resend, so the
    /// timeout was spurious.
    /// 该次删除的包并非超时重发的包，因此超时是伪超时。
    pub spurious_timeout: bool,
}

/// Manages outgoing packets.
#[derive(Debug)]
pub struct SendQueue {
    entries: BTreeMap<u32, SentPacket>,
    last_sent: Option<u32>,
    packets_out: u32,
    send_next: u32,
    next_sequence: u32,
    first_unack: u32,
    /// `(highest_ack, highest_ack_sequence)`; `None` until the first ACK.
    watermark: Option<(u32, u32)>,
    capacity: usize,
}

impl SendQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            last_sent: None,
            packets_out: 0,
            send_next: 0,
            next_sequence: 0,
            first_unack: 0,
            watermark: None,
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn free_slots(&self) -> usize {
        self.capacity.saturating_sub(self.entries.len())
    }

    pub fn packets_out(&self) -> u32 {
        self.packets_out
    }

    pub fn send_next(&self) -> u32 {
        self.send_next
    }

    pub fn first_unack(&self) -> u32 {
        self.first_unack
    }

    pub fn highest_ack(&self) -> Option<u32> {
        self.watermark.map(|(offset, _)| offset)
    }

    pub fn highest_ack_sequence(&self) -> Option<u32> {
        self.watermark.map(|(_, sequence)| sequence)
    }

    pub fn last_sent(&self) -> Option<u32> {
        self.last_sent
    }

    pub fn get(&self, offset: u32) -> Option<&SentPacket> {
        self.entries.get(&offset)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SentPacket> {
        self.entries.values()
    }

    /// Offsets of the first `n` entries.
    /// 前 `n` 个条目的偏移量。
    pub fn head_offsets(&self, n: usize) -> Vec<u32> {
        self.entries.keys().take(n).copied().collect()
    }

    /// Appends a new packet with `offset = send_next++`. Does not transmit.
    ///
    /// 追加一个偏移量为 `send_next++` 的新包，不进行发送。
    pub fn enqueue(&mut self, body: Body) -> Result<u32> {
        if self.is_full() {
            return Err(Error::SendQueueFull);
        }
        let offset = self.send_next;
        self.send_next = self.send_next.wrapping_add(1);
        self.entries.insert(
            offset,
            SentPacket {
                offset,
                body,
                sequence: 0,
                transmissions: 0,
                missing_reports: 0,
                sent_at: None,
                acked: false,
            },
        );
        if self.entries.len() == 1 {
            self.first_unack = offset;
        }
        trace!(offset, "packet enqueued");
        Ok(offset)
    }

    /// The first packet after the `last_sent` cursor.
    /// `last_sent` 游标之后的第一个包。
    pub fn next_untransmitted(&self) -> Option<u32> {
        match self.last_sent {
            Some(last) => self
                .entries
                .range((Bound::Excluded(last), Bound::Unbounded))
                .next()
                .map(|(offset, _)| *offset),
            None => self.entries.keys().next().copied(),
        }
    }

    /// Stamps the entry at `offset` with a fresh sequence and returns what to
    /// put on the wire. A first transmission counts towards `packets_out`.
    ///
    /// 为 `offset` 处的条目分配新的序列号并返回要发送的内容。首次传输计入 `packets_out`。
    pub fn transmit(&mut self, offset: u32, now: Instant) -> Option<Transmission> {
        let sequence = self.next_sequence;
        let entry = self.entries.get_mut(&offset)?;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        let first = entry.transmissions == 0;
        entry.sequence = sequence;
        entry.transmissions += 1;
        entry.sent_at = Some(now);

        if first {
            self.packets_out += 1;
            if self.last_sent.is_none_or(|last| offset > last) {
                self.last_sent = Some(offset);
            }
        }

        Some(Transmission {
            offset,
            sequence,
            body: entry.body.clone(),
            first,
        })
    }

    /// Clears the loss score of an entry about to be retransmitted.
    /// 清除即将被重传条目的丢失分数。
    pub fn reset_missing_reports(&mut self, offset: u32) {
        if let Some(entry) = self.entries.get_mut(&offset) {
            entry.missing_reports = 0;
        }
    }

    /// Applies an ACK. `nacks` must be ascending and below `highest_offset`.
    ///
    /// Entries at or below `highest_offset` that are not NACKed become
    /// acked-pending-deletion; NACKed entries gain `highest_offset - offset`
    /// missing reports.
    ///
    /// 应用一个ACK。`nacks` 必须升序且小于 `highest_offset`。
    pub fn apply_ack(&mut self, highest_offset: u32, highest_sequence: u32, nacks: &[u32]) -> AckOutcome {
        if let Some(watermark) = self.watermark {
            if (highest_offset, highest_sequence) <= watermark {
                return AckOutcome::Stale;
            }
        }
        self.watermark = Some((highest_offset, highest_sequence));

        let mut nacked = 0;
        for (offset, entry) in self.entries.range_mut(..=highest_offset) {
            if !entry.is_transmitted() {
                continue;
            }
            if nacks.binary_search(offset).is_ok() {
                entry.missing_reports = entry
                    .missing_reports
                    .saturating_add(highest_offset - offset);
                entry.acked = false;
                nacked += 1;
            } else {
                entry.missing_reports = 0;
                entry.acked = true;
            }
        }
        AckOutcome::Applied { nacked }
    }

    /// Acknowledges everything up to `offset` with no NACKs, ignoring the
    /// watermark order. Used for the ACK embedded in a SYN_REPLY.
    ///
    /// 在不考虑水位线顺序的情况下确认直到 `offset` 的所有包，用于SYN_REPLY中内嵌的ACK。
    pub fn acknowledge_through(&mut self, offset: u32) {
        let sequence = self.entries.get(&offset).map_or(0, |entry| entry.sequence);
        let (previous_offset, previous_sequence) = self.watermark.unwrap_or((0, 0));
        self.watermark = Some((offset.max(previous_offset), sequence.max(previous_sequence)));
        for entry in self.entries.range_mut(..=offset).map(|(_, entry)| entry) {
            if entry.is_transmitted() {
                entry.missing_reports = 0;
                entry.acked = true;
            }
        }
    }

    /// An RTT sample from the entry named by an ACK header, if unambiguous:
    /// the entry must still be queued, sent exactly once, with a matching
    /// sequence. `delay` is the receiver's holding time.
    ///
    /// 从ACK头指明的条目中得到RTT样本（仅在无歧义时）。
    pub fn rtt_sample(&self, offset: u32, sequence: u32, delay: Duration, now: Instant) -> Option<Duration> {
        let entry = self.entries.get(&offset)?;
        if entry.sequence != sequence || entry.transmissions != 1 {
            return None;
        }
        now.checked_duration_since(entry.sent_at?)?.checked_sub(delay)
    }

    /// Number of entries the latest ACK released.
    /// 最近一个ACK释放的条目数量。
    pub fn count_acked(&self) -> u32 {
        let Some(highest_ack) = self.highest_ack() else {
            return 0;
        };
        self.entries
            .range(..=highest_ack)
            .filter(|(_, entry)| entry.acked && entry.missing_reports == 0)
            .count() as u32
    }

    /// Entries whose score exceeds `threshold`, scanning from the head and
    /// stopping at the first entry that is not NACKed. At most `limit`.
    ///
    /// 从队头扫描，返回分数超过 `threshold` 的条目，在第一个未被NACK的条目处停止，最多 `limit` 个。
    pub fn nacked_above(&self, threshold: u32, limit: usize) -> Vec<u32> {
        let mut selected = Vec::new();
        for entry in self.entries.values() {
            if selected.len() >= limit || entry.missing_reports == 0 {
                break;
            }
            if entry.missing_reports > threshold {
                selected.push(entry.offset);
            }
        }
        selected
    }

    /// Removes every entry at or below `highest_ack` with no missing reports.
    ///
    /// `timeout_resent` is how many head entries the last RTO resent; it
    /// decides whether the first deletion after that RTO proves it spurious.
    ///
    /// 删除所有不高于 `highest_ack` 且没有缺失报告的条目。
    pub fn delete_acked(&mut self, timeout_resent: u32) -> DeleteOutcome {
        let mut outcome = DeleteOutcome::default();
        let Some(highest_ack) = self.highest_ack() else {
            return outcome;
        };

        let doomed: Vec<(u32, u32)> = self
            .entries
            .range(..=highest_ack)
            .enumerate()
            .filter(|(_, (_, entry))| entry.acked && entry.missing_reports == 0)
            .map(|(index, (offset, _))| (index as u32 + 1, *offset))
            .collect();

        for (position, offset) in doomed {
            if self.remove(offset).is_none() {
                continue;
            }
            outcome.deleted += 1;
            if timeout_resent > 0 && !outcome.timeout_resolved {
                outcome.timeout_resolved = true;
                outcome.spurious_timeout = position > timeout_resent;
            }
        }

        self.first_unack = self.entries.keys().next().copied().unwrap_or(self.send_next);
        outcome
    }

    /// Drops the queued SYN_REPLY once the peer has shown it arrived.
    /// 在对端表明SYN_REPLY已到达后，丢弃队列中的SYN_REPLY。
    pub fn remove_handshake(&mut self) -> bool {
        let head = self
            .entries
            .iter()
            .next()
            .filter(|(_, entry)| entry.packet_type().is_handshake())
            .map(|(offset, _)| *offset);
        match head {
            Some(offset) => {
                self.remove(offset);
                self.first_unack = self.entries.keys().next().copied().unwrap_or(self.send_next);
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, offset: u32) -> Option<SentPacket> {
        let entry = self.entries.remove(&offset)?;
        if entry.is_transmitted() {
            if self.packets_out == 0 {
                error!(offset, "packets_out is already zero while removing a sent packet");
            }
            self.packets_out = self.packets_out.saturating_sub(1);
        }
        if self.last_sent == Some(offset) {
            self.last_sent = self.entries.range(..offset).next_back().map(|(key, _)| *key);
        }
        Some(entry)
    }

    /// Discards everything. Used on close.
    /// 丢弃所有内容，在关闭时使用。
    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_sent = None;
        self.packets_out = 0;
        self.first_unack = self.send_next;
    }

    /// Panics if a structural invariant is broken.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        let offsets: Vec<u32> = self.entries.keys().copied().collect();
        assert!(offsets.windows(2).all(|w| w[0] < w[1]), "offsets not increasing");

        let transmitted = self.entries.values().filter(|e| e.is_transmitted()).count() as u32;
        assert_eq!(self.packets_out, transmitted, "packets_out out of sync");

        for entry in self.entries.values() {
            match self.last_sent {
                Some(last) if entry.offset <= last => {
                    assert!(entry.is_transmitted(), "offset {} behind cursor is unsent", entry.offset)
                }
                _ => assert!(!entry.is_transmitted(), "offset {} past cursor was sent", entry.offset),
            }
        }
    }
}
