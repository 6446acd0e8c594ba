//! Buffers out-of-order arrivals and hands payloads to the application
//! strictly in offset order.
//!
//! 缓存乱序到达的包，并严格按偏移量顺序将载荷交给应用。

use bytes::Bytes;
use std::collections::{BTreeMap, btree_map::Entry};

/// Where an arriving packet landed in the receive queue, relative to the
/// packets already buffered there.
///
/// 到达的包在接收队列中的位置，相对于已缓存的包而言。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Duplicate,
    /// Below every buffered packet, or into an empty queue. In order only if
    /// it is also `rcv_next`.
    /// 低于所有已缓存的包，或进入空队列。只有同时等于 `rcv_next` 时才是有序的。
    InsertedHead,
    /// Beyond every buffered packet, so a gap sits below it.
    /// 高于所有已缓存的包，因此其下方存在空洞。
    InsertedOutOfOrder,
    /// Between two buffered packets.
    InsertedMiddle,
}

impl Disposition {
    /// Whether this arrival deserves an immediate ACK.
    /// 该到达是否需要立即发送ACK。
    pub fn wants_immediate_ack(&self) -> bool {
        matches!(self, Disposition::InsertedOutOfOrder | Disposition::InsertedMiddle)
    }
}

/// Manages incoming data.
#[derive(Debug)]
pub struct RecvQueue {
    /// The next offset to deliver.
    rcv_next: u32,
    received: BTreeMap<u32, Bytes>,
    capacity: usize,
}

impl RecvQueue {
    /// Creates a new `RecvQueue` that expects `rcv_next` first.
    pub fn new(rcv_next: u32, capacity: usize) -> Self {
        Self {
            rcv_next,
            received: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn rcv_next(&self) -> u32 {
        self.rcv_next
    }

    /// Moves the delivery point, e.g. after the handshake consumed offset 0.
    /// 移动交付点，例如在握手消耗了偏移量0之后。
    pub fn set_rcv_next(&mut self, rcv_next: u32) {
        self.rcv_next = rcv_next;
        self.received.retain(|offset, _| *offset >= rcv_next);
    }

    pub fn len(&self) -> usize {
        self.received.len()
    }

    pub fn is_empty(&self) -> bool {
        self.received.is_empty()
    }

    pub fn contains(&self, offset: u32) -> bool {
        self.received.contains_key(&offset)
    }

    /// Whether `offset` falls inside the window the queue can buffer.
    /// `offset` 是否落在队列可缓存的窗口之内。
    pub fn in_window(&self, offset: u32) -> bool {
        offset >= self.rcv_next && ((offset - self.rcv_next) as usize) < self.capacity
    }

    /// Buffers a packet. Offsets below `rcv_next` count as duplicates.
    ///
    /// 缓存一个包。低于 `rcv_next` 的偏移量视为重复。
    pub fn insert(&mut self, offset: u32, payload: Bytes) -> Disposition {
        if offset < self.rcv_next {
            return Disposition::Duplicate;
        }

        let first = self.received.keys().next().copied();
        let last = self.received.keys().next_back().copied();

        match self.received.entry(offset) {
            Entry::Occupied(_) => Disposition::Duplicate,
            Entry::Vacant(slot) => {
                slot.insert(payload);
                match (first, last) {
                    (None, _) => Disposition::InsertedHead,
                    (Some(first), _) if offset < first => Disposition::InsertedHead,
                    (_, Some(last)) if offset > last => Disposition::InsertedOutOfOrder,
                    _ => Disposition::InsertedMiddle,
                }
            }
        }
    }

    /// Pops the contiguous run starting at `rcv_next`, advancing it.
    ///
    /// 弹出从 `rcv_next` 开始的连续数据，并推进 `rcv_next`。
    pub fn drain_in_order(&mut self) -> Vec<Bytes> {
        let mut delivered = Vec::new();
        while let Some(payload) = self.received.remove(&self.rcv_next) {
            delivered.push(payload);
            self.rcv_next = self.rcv_next.wrapping_add(1);
        }
        delivered
    }

    /// Offsets in `[rcv_next, highest)` that have not arrived, at most `limit`.
    ///
    /// `[rcv_next, highest)` 中尚未到达的偏移量，最多 `limit` 个。
    pub fn missing(&self, highest: u32, limit: usize) -> Vec<u32> {
        (self.rcv_next..highest)
            .filter(|offset| !self.received.contains_key(offset))
            .take(limit)
            .collect()
    }

    /// The highest buffered offset below `limit`.
    /// 低于 `limit` 的最高已缓存偏移量。
    pub fn highest_below(&self, limit: u32) -> Option<u32> {
        self.received.range(..limit).next_back().map(|(offset, _)| *offset)
    }

    pub fn clear(&mut self) {
        self.received.clear();
    }
}
