//! Hybrid Slow Start: leaves slow start before the first loss by watching
//! ACK trains and RTT growth.
//!
//! 混合慢启动：通过观察ACK串和RTT增长，在首次丢包之前退出慢启动。

/// Detector bit: the ACK train of one round grew longer than half the RTT.
/// 检测位：一轮的ACK串长度超过了RTT的一半。
pub const HYSTART_ACK_TRAIN: u8 = 0x1;
/// Detector bit: the round's minimum RTT rose noticeably above `delay_min`.
/// 检测位：本轮最小RTT明显高于 `delay_min`。
pub const HYSTART_DELAY: u8 = 0x2;

const MIN_SAMPLES: u32 = 8;
const DELAY_THRESH_MIN: u32 = 4 << 3;
const DELAY_THRESH_MAX: u32 = 16 << 3;

/// Per-round sampling state. Delays are milliseconds scaled by 8.
/// 每轮的采样状态。延迟以毫秒乘以8表示。
#[derive(Debug, Clone, Default)]
pub struct HybridSlowStart {
    pub(crate) detect: u8,
    pub(crate) ack_delta_ms: u32,
    pub(crate) round_start: u32,
    pub(crate) last_ack: u32,
    pub(crate) end_seq: u32,
    pub(crate) curr_rtt: u32,
    pub(crate) sample_cnt: u32,
    pub(crate) found: u8,
}

impl HybridSlowStart {
    pub fn new(detect: u8, ack_delta_ms: u32) -> Self {
        Self {
            detect,
            ack_delta_ms,
            ..Default::default()
        }
    }

    /// Starts a new round ending at `send_next`.
    /// 开始一个在 `send_next` 处结束的新轮次。
    pub fn reset(&mut self, now_ms: u32, send_next: u32) {
        self.round_start = now_ms;
        self.last_ack = now_ms;
        self.end_seq = send_next;
        self.curr_rtt = 0;
        self.sample_cnt = 0;
    }

    /// Forgets earlier detections.
    /// 清除之前的检测结果。
    pub fn clear_found(&mut self) {
        self.found = 0;
    }

    /// Whether an ACK for `highest_ack` closes the current round.
    pub fn round_ended(&self, highest_ack: u32) -> bool {
        highest_ack > self.end_seq
    }

    /// Whether an enabled detector has fired.
    /// 已启用的检测器是否已经触发。
    pub fn exited(&self) -> bool {
        self.found & self.detect != 0
    }

    pub fn found(&self) -> u8 {
        self.found
    }

    /// Feeds one delay sample. Returns true when slow start should end now.
    /// 输入一个延迟样本。当应立即结束慢启动时返回 true。
    pub fn update(&mut self, delay: u32, delay_min: u32, now_ms: u32) -> bool {
        if self.exited() {
            return false;
        }

        if now_ms.wrapping_sub(self.last_ack) as i32 <= self.ack_delta_ms as i32 {
            self.last_ack = now_ms;
            if now_ms.wrapping_sub(self.round_start) as i32 > (delay_min >> 4) as i32 {
                self.found |= HYSTART_ACK_TRAIN;
            }
        }

        if self.sample_cnt < MIN_SAMPLES {
            if self.curr_rtt == 0 || self.curr_rtt > delay {
                self.curr_rtt = delay;
            }
            self.sample_cnt += 1;
        } else {
            let threshold = (delay_min >> 4).clamp(DELAY_THRESH_MIN, DELAY_THRESH_MAX);
            if self.curr_rtt > delay_min + threshold {
                self.found |= HYSTART_DELAY;
            }
        }

        self.exited()
    }
}
