//! 定义了连接和协议的可配置参数。
//! Defines configurable parameters for connections and the protocol.

use crate::congestion::hystart::{HYSTART_ACK_TRAIN, HYSTART_DELAY};
use std::time::Duration;

/// A structure containing all configurable parameters for a connection.
///
/// 包含所有连接可配置参数的结构体。
#[derive(Debug, Clone)]
pub struct Config {
    /// The protocol version carried in every header. Packets with another
    /// version are dropped.
    /// 每个包头中携带的协议版本号。版本不同的包将被丢弃。
    pub protocol_version: u32,

    /// Reliability-related parameters.
    /// 可靠性相关参数。
    pub reliability: ReliabilityConfig,

    /// Congestion control-related parameters.
    /// 拥塞控制相关参数。
    pub congestion_control: CongestionControlConfig,

    /// Connection and buffer-related parameters.
    /// 连接和缓冲区相关参数。
    pub connection: ConnectionConfig,
}

/// Reliability-related parameters.
///
/// 可靠性相关参数。
#[derive(Debug, Clone)]
pub struct ReliabilityConfig {
    /// The retransmission timeout used before any RTT sample exists.
    /// 在没有任何RTT样本之前使用的重传超时。
    pub initial_rto: Duration,
    /// Floor applied to the RTT variance term, and therefore to the RTO.
    /// RTT方差项的下限，也即RTO的下限。
    pub min_rto: Duration,
    /// Upper bound of the RTO, including exponential backoff.
    /// RTO的上限（包括指数退避）。
    pub max_rto: Duration,
    /// Smoothed RTT assumed before the first sample.
    /// 第一个样本之前假定的平滑RTT。
    pub initial_srtt: Duration,
    /// How long an ACK for a single in-order packet may be held back.
    /// 单个有序包的ACK可以被延迟的时长。
    pub delayed_ack_timeout: Duration,
    /// Lower bound of the tail loss probe timeout with several packets out.
    /// 多个包在途时尾部丢失探测超时的下限。
    pub tlp_min_timeout: Duration,
    /// A NACKed packet is fast-retransmitted once its `missing_reports`
    /// score exceeds this value.
    /// 当被NACK的包的 `missing_reports` 分数超过该值时进行快速重传。
    pub resend_threshold: u32,
    /// RTT samples at or above this value are discarded as bogus.
    /// 大于或等于该值的RTT样本将被视为无效而丢弃。
    pub max_rtt_sample: Duration,
    /// Number of SYN retransmissions before the handshake is abandoned.
    /// 放弃握手之前SYN的重传次数。
    pub handshake_max_retries: u32,
    /// Number of consecutive RTO expiries before the connection is abandoned.
    /// 放弃连接之前连续RTO超时的次数。
    pub max_rto_retransmits: u32,
}

/// Congestion control-related parameters (CUBIC with Hybrid Slow Start).
///
/// 拥塞控制相关参数（CUBIC 与混合慢启动）。
#[derive(Debug, Clone)]
pub struct CongestionControlConfig {
    /// The initial congestion window size in packets.
    /// 初始拥塞窗口大小（以包为单位）。
    pub initial_cwnd_packets: u32,
    /// The initial slow start threshold in packets. Only applied when
    /// Hybrid Slow Start is disabled.
    /// 初始慢启动阈值（以包为单位）。仅在禁用混合慢启动时生效。
    pub initial_ssthresh: u32,
    /// Multiplicative decrease factor, scaled by 1024.
    /// 乘性减因子，按1024缩放。
    pub beta: u32,
    /// Scales the cubic growth curve, `C = bic_scale / 1024` roughly.
    /// 缩放三次增长曲线。
    pub bic_scale: u32,
    /// Release bandwidth faster when the window keeps shrinking.
    /// 当窗口持续缩小时更快地释放带宽。
    pub fast_convergence: bool,
    /// Never grow slower than an equivalent Reno flow.
    /// 增长速度不慢于等效的Reno流。
    pub tcp_friendliness: bool,
    /// Enable Hybrid Slow Start.
    /// 启用混合慢启动。
    pub hystart: bool,
    /// Bitmask of Hybrid Slow Start detectors.
    /// 混合慢启动检测器的位掩码。
    pub hystart_detect: u8,
    /// Hybrid Slow Start only runs once cwnd reaches this many packets.
    /// 仅当cwnd达到该值后才运行混合慢启动。
    pub hystart_low_window: u32,
    /// Maximum spacing between ACKs that still counts as one train.
    /// 仍被视为同一ACK串的ACK最大间隔。
    pub hystart_ack_delta: Duration,
}

/// Connection and buffer-related parameters.
///
/// 连接和缓冲区相关参数。
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// The maximum payload carried by one DATA packet.
    /// 单个DATA包承载的最大载荷。
    pub max_payload_size: usize,
    /// Maximum number of packets held in the send queue.
    /// 发送队列中最多保存的包数量。
    pub send_queue_capacity: usize,
    /// Maximum number of out-of-order packets buffered by the receiver. This
    /// also bounds the receive window.
    /// 接收端最多缓存的乱序包数量，同时限定接收窗口。
    pub recv_queue_capacity: usize,
    /// Maximum number of NACK frames placed in one ACK.
    /// 单个ACK中最多携带的NACK帧数量。
    pub max_nacks_per_ack: usize,
    /// Capacity of the channels between a `Stream` and its endpoint task.
    /// `Stream` 与其端点任务之间通道的容量。
    pub stream_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            protocol_version: 1,
            reliability: ReliabilityConfig::default(),
            congestion_control: CongestionControlConfig::default(),
            connection: ConnectionConfig::default(),
        }
    }
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            initial_rto: Duration::from_secs(1),
            min_rto: Duration::from_millis(200),
            max_rto: Duration::from_secs(120),
            initial_srtt: Duration::from_millis(20),
            delayed_ack_timeout: Duration::from_millis(40),
            tlp_min_timeout: Duration::from_millis(10),
            resend_threshold: 3,
            max_rtt_sample: Duration::from_secs(1),
            handshake_max_retries: 8,
            max_rto_retransmits: 12,
        }
    }
}

impl Default for CongestionControlConfig {
    fn default() -> Self {
        Self {
            initial_cwnd_packets: 2,
            initial_ssthresh: u32::MAX,
            beta: 717,
            bic_scale: 41,
            fast_convergence: true,
            tcp_friendliness: true,
            hystart: true,
            hystart_detect: HYSTART_ACK_TRAIN | HYSTART_DELAY,
            hystart_low_window: 16,
            hystart_ack_delta: Duration::from_millis(2),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 1200,
            send_queue_capacity: 256,
            recv_queue_capacity: 256,
            max_nacks_per_ack: 128,
            stream_channel_capacity: 128,
        }
    }
}
