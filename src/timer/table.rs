//! 定时器截止时间表
//! Timer deadline table

use std::fmt;
use tokio::time::Instant;

/// The four timers of a connection.
///
/// 连接的四个定时器。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// SYN retransmission while the handshake runs, NACK-driven fast
    /// retransmit once established.
    /// 握手期间用于SYN重传，建立后用于NACK驱动的快速重传。
    HandshakeLoss,
    /// Tail loss probe, converted into the retransmission timeout after two
    /// unanswered probes.
    /// 尾部丢失探测，连续两次探测无应答后转换为重传超时。
    RtoTlp,
    DelayedAck,
    EarlyRetransmit,
}

impl TimerKind {
    pub const ALL: [TimerKind; 4] = [
        TimerKind::HandshakeLoss,
        TimerKind::RtoTlp,
        TimerKind::DelayedAck,
        TimerKind::EarlyRetransmit,
    ];

    fn index(self) -> usize {
        match self {
            TimerKind::HandshakeLoss => 0,
            TimerKind::RtoTlp => 1,
            TimerKind::DelayedAck => 2,
            TimerKind::EarlyRetransmit => 3,
        }
    }
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerKind::HandshakeLoss => "handshake/loss",
            TimerKind::RtoTlp => "rto/tlp",
            TimerKind::DelayedAck => "delayed-ack",
            TimerKind::EarlyRetransmit => "early-retransmit",
        };
        f.write_str(name)
    }
}

/// A timer expiry message. `generation` identifies the arming it belongs to;
/// a message whose generation is no longer current is stale and ignored.
///
/// 定时器到期消息。`generation` 标识其所属的那一次设置；代数已过期的消息将被忽略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    deadline: Option<Instant>,
    generation: u64,
}

/// Deadlines for the four timers of one connection.
///
/// 一个连接的四个定时器的截止时间。
#[derive(Debug, Clone, Default)]
pub struct TimerTable {
    slots: [Slot; 4],
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms (or re-arms) a timer. Every call starts a new generation.
    /// 设置（或重新设置）一个定时器。每次调用都会开始一个新的代数。
    pub fn arm(&mut self, kind: TimerKind, deadline: Instant) {
        let slot = &mut self.slots[kind.index()];
        slot.deadline = Some(deadline);
        slot.generation += 1;
    }

    /// Clears a timer. Returns whether it was pending.
    /// 清除一个定时器，返回它之前是否处于等待状态。
    pub fn clear(&mut self, kind: TimerKind) -> bool {
        let slot = &mut self.slots[kind.index()];
        let was_pending = slot.deadline.take().is_some();
        if was_pending {
            slot.generation += 1;
        }
        was_pending
    }

    pub fn clear_all(&mut self) {
        for kind in TimerKind::ALL {
            self.clear(kind);
        }
    }

    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.slots[kind.index()].deadline.is_some()
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        self.slots[kind.index()].deadline
    }

    pub fn generation(&self, kind: TimerKind) -> u64 {
        self.slots[kind.index()].generation
    }

    /// Whether `fired` belongs to the current arming of its timer.
    /// `fired` 是否属于其定时器当前的那一次设置。
    pub fn is_current(&self, fired: TimerFired) -> bool {
        let slot = &self.slots[fired.kind.index()];
        slot.deadline.is_some() && slot.generation == fired.generation
    }

    /// Disarms and returns every timer whose deadline has passed.
    ///
    /// 解除并返回所有截止时间已过的定时器。
    pub fn expire(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut expired = Vec::new();
        for kind in TimerKind::ALL {
            if self.deadline(kind).is_some_and(|deadline| deadline <= now) {
                self.clear(kind);
                expired.push(kind);
            }
        }
        expired
    }

    /// The earliest pending deadline.
    /// 最早的待定截止时间。
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.iter().filter_map(|slot| slot.deadline).min()
    }
}
