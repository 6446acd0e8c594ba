//! Connection state enums and counters.
//! 连接状态枚举与计数器。

use std::fmt;

/// Which side opened the connection.
/// 连接由哪一方发起。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// The connection lifecycle: `Closed -> SynSent -> Established -> Closed`.
/// A server moves from `Closed` straight to `Established` on a SYN.
///
/// 连接生命周期：`Closed -> SynSent -> Established -> Closed`。
/// 服务端在收到SYN时从 `Closed` 直接进入 `Established`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    SynSent,
    Established,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Closed => "CLOSED",
            ConnectionState::SynSent => "SYN_SENT",
            ConnectionState::Established => "ESTABLISHED",
        };
        f.write_str(name)
    }
}

/// Loss recovery sub-state, orthogonal to `ConnectionState`.
///
/// 丢包恢复子状态，与 `ConnectionState` 正交。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaState {
    /// Nothing outstanding is suspected lost.
    /// 没有未确认的包被怀疑丢失。
    Open,
    /// NACKs seen, no retransmission yet.
    /// 收到NACK，尚未重传。
    Disorder,
    /// Fast retransmission in progress.
    /// 快速重传进行中。
    Recovery,
    /// The retransmission timer expired.
    /// 重传定时器已超时。
    Loss,
}

/// Why a connection reached `Closed`.
/// 连接进入 `Closed` 的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called.
    Local,
    /// The SYN was retransmitted too many times.
    HandshakeTimeout,
    /// Too many consecutive RTO expiries.
    RetransmitTimeout,
}

impl CloseReason {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            CloseReason::HandshakeTimeout | CloseReason::RetransmitTimeout
        )
    }
}

/// Per-connection counters.
///
/// 每个连接的计数器。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Every packet handed to the wire, ACKs included.
    /// 交给线路的所有包，包括ACK。
    pub packets_sent: u64,
    pub packets_received: u64,
    pub retransmissions: u64,
    pub fast_retransmits: u64,
    pub tlp_probes: u64,
    pub rto_expiries: u64,
    /// Packets discarded by the silent-drop policy.
    /// 按静默丢弃策略丢弃的包。
    pub dropped: u64,
    pub stale_acks: u64,
    pub spurious_rto_undos: u64,
}
