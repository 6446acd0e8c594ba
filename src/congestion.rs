//! Defines the pluggable congestion control interface.
//! 定义了可插拔的拥塞控制接口。
//!
//! Windows are counted in packets. The connection drives the controller with
//! cumulative ACK events and loss signals; the controller owns `cwnd` and
//! `ssthresh`.

use std::time::Duration;
use tokio::time::Instant;

pub mod cubic;
pub mod hystart;

pub use cubic::Cubic;

/// A cumulative acknowledgment as seen by the congestion controller.
///
/// 拥塞控制器视角下的一次累积确认。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckEvent {
    /// Highest offset acknowledged so far.
    /// 目前为止被确认的最高偏移量。
    pub highest_ack: u32,
    /// Packets newly acknowledged by this ACK.
    /// 本次ACK新确认的包数量。
    pub acked: u32,
    /// Packets in flight before the acknowledged ones are released.
    /// 释放被确认包之前的在途包数量。
    pub in_flight: u32,
    /// Next offset the sender will assign.
    /// 发送方将分配的下一个偏移量。
    pub send_next: u32,
}

/// The loss signals a controller reacts to.
/// 控制器响应的丢包信号。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionEvent {
    /// NACK scores crossed the resend threshold.
    /// NACK分数超过了重发阈值。
    FastRetransmit,
    /// The retransmission timer expired.
    /// 重传定时器超时。
    RetransmissionTimeout,
}

/// A trait for congestion control algorithms.
///
/// 拥塞控制算法的 trait。
pub trait CongestionControl: Send + Sync + std::fmt::Debug + 'static {
    /// Called once, when the first ACK of the connection arrives.
    ///
    /// 在连接的第一个ACK到达时调用一次。
    fn on_first_ack(&mut self, send_next: u32, now: Instant);

    /// Called for every accepted ACK, before acknowledged packets leave the
    /// send queue.
    ///
    /// 每个被接受的ACK都会调用，在被确认的包离开发送队列之前。
    fn on_ack(&mut self, event: AckEvent, now: Instant);

    /// Called when an ACK released packets, with the RTT sample it produced.
    ///
    /// 当ACK释放了包时调用，并附带其产生的RTT样本。
    fn on_packets_acked(&mut self, acked: u32, rtt: Option<Duration>, ca_open: bool, now: Instant);

    /// Called when a packet loss is detected.
    ///
    /// 当检测到丢包时调用。
    fn on_congestion_event(&mut self, event: CongestionEvent);

    /// Reverts the last reduction after a spurious timeout.
    ///
    /// 在伪超时之后撤销最近一次窗口缩减。
    fn undo(&mut self);

    /// Gets the current congestion window size in packets.
    ///
    /// 获取当前的拥塞窗口大小（以包为单位）。
    fn congestion_window(&self) -> u32;

    /// Gets the current slow start threshold in packets.
    ///
    /// 获取当前的慢启动阈值（以包为单位）。
    fn slow_start_threshold(&self) -> u32;
}
