//! CUBIC window growth with Hybrid Slow Start, in integer arithmetic.
//!
//! CUBIC窗口增长与混合慢启动，全部使用整数运算。
//!
//! Time is kept in milliseconds since the controller was created. Delays are
//! milliseconds scaled by 8, and the cubic clock ticks in 1/1024 s.

use super::{
    AckEvent, CongestionControl, CongestionEvent,
    hystart::HybridSlowStart,
};
use crate::config::CongestionControlConfig;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

const HZ: u64 = 1000;
const BICTCP_HZ: u32 = 10;
const BETA_SCALE: u32 = 1024;
const ACK_RATIO_SHIFT: u32 = 4;
const ACK_RATIO_LIMIT: u32 = 32 << ACK_RATIO_SHIFT;
const INITIAL_ACK_RATIO: u32 = 2 << ACK_RATIO_SHIFT;

/// cbrt(x) MSB values for x MSB values in [0..63], `v = cbrt(x << 18) - 1`.
const CBRT_TABLE: [u8; 64] = [
    0, 54, 54, 54, 118, 118, 118, 118, 123, 129, 134, 138, 143, 147, 151, 156, 157, 161, 164, 168,
    170, 173, 176, 179, 181, 185, 187, 190, 192, 194, 197, 199, 200, 202, 204, 206, 209, 211, 213,
    215, 217, 219, 221, 222, 224, 225, 227, 229, 231, 232, 234, 236, 237, 239, 240, 242, 244, 245,
    246, 248, 250, 251, 252, 254,
];

/// Cube root by table lookup and one Newton-Raphson step (~0.2% error).
/// 通过查表和一次牛顿迭代计算立方根（误差约0.2%）。
pub fn cubic_root(a: u64) -> u32 {
    let bits = 64 - a.leading_zeros();
    if bits < 7 {
        return (u32::from(CBRT_TABLE[a as usize]) + 35) >> 6;
    }

    let b = ((bits * 84) >> 8) - 1;
    let shift = (a >> (b * 3)) as usize;
    let mut x = ((u32::from(CBRT_TABLE[shift.min(63)]) + 10) << b) >> 6;

    let x64 = u64::from(x.max(2));
    x = (2 * x64 + a / (x64 * (x64 - 1))) as u32;
    ((u64::from(x) * 341) >> 10) as u32
}

/// The CUBIC control block, reset at the start of every loss epoch.
/// CUBIC控制块，在每个丢包周期开始时重置。
#[derive(Debug, Clone, Default)]
pub(crate) struct CubicState {
    /// ACKs needed per one-packet increase.
    pub(crate) cnt: u32,
    pub(crate) last_max_cwnd: u32,
    pub(crate) loss_cwnd: u32,
    pub(crate) last_cwnd: u32,
    pub(crate) last_time: u32,
    pub(crate) bic_origin_point: u32,
    pub(crate) bic_k: u32,
    pub(crate) delay_min: u32,
    pub(crate) epoch_start: Option<u32>,
    pub(crate) ack_cnt: u32,
    pub(crate) tcp_cwnd: u32,
    pub(crate) delayed_ack: u32,
}

impl CubicState {
    fn reset(&mut self) {
        let loss_cwnd = self.loss_cwnd;
        *self = CubicState {
            loss_cwnd,
            delayed_ack: INITIAL_ACK_RATIO,
            ..Default::default()
        };
    }
}

/// CUBIC congestion controller.
///
/// CUBIC 拥塞控制器。
#[derive(Debug)]
pub struct Cubic {
    pub(crate) cwnd: u32,
    pub(crate) cwnd_cnt: u32,
    pub(crate) ssthresh: u32,
    pub(crate) ca: CubicState,
    pub(crate) hystart: HybridSlowStart,
    beta_scale: u32,
    cube_rtt_scale: u32,
    cube_factor: u64,
    config: CongestionControlConfig,
    origin: Instant,
}

impl Cubic {
    pub fn new(config: CongestionControlConfig, now: Instant) -> Self {
        let beta = config.beta.min(BETA_SCALE - 1);
        let bic_scale = config.bic_scale.max(1);
        let cube_rtt_scale = bic_scale * 10;
        let hystart = HybridSlowStart::new(
            config.hystart_detect,
            config.hystart_ack_delta.as_millis() as u32,
        );
        let mut ca = CubicState::default();
        ca.reset();

        Self {
            cwnd: config.initial_cwnd_packets.max(1),
            cwnd_cnt: 0,
            ssthresh: u32::MAX,
            ca,
            hystart,
            beta_scale: 8 * (BETA_SCALE + beta) / 3 / (BETA_SCALE - beta),
            cube_rtt_scale,
            cube_factor: (1u64 << (10 + 3 * BICTCP_HZ)) / u64::from(cube_rtt_scale),
            config,
            origin: now,
        }
    }

    fn clock(&self, now: Instant) -> u32 {
        now.saturating_duration_since(self.origin).as_millis() as u32
    }

    fn is_cwnd_limited(&self, in_flight: u32) -> bool {
        in_flight >= self.cwnd
    }

    fn slow_start(&mut self, acked: u32) {
        let grown = u64::from(self.cwnd) + u64::from(acked);
        self.cwnd = grown.min(u64::from(self.ssthresh)) as u32;
    }

    fn cong_avoid_ai(&mut self, w: u32) {
        if self.cwnd_cnt >= w {
            self.cwnd = self.cwnd.saturating_add(1);
            self.cwnd_cnt = 0;
        } else {
            self.cwnd_cnt += 1;
        }
    }

    /// Recomputes `ca.cnt` from the cubic function.
    /// 根据三次函数重新计算 `ca.cnt`。
    fn update(&mut self, now_ms: u32) {
        let cwnd = self.cwnd;
        let ca = &mut self.ca;
        ca.ack_cnt = ca.ack_cnt.saturating_add(1);

        if ca.last_cwnd == cwnd && now_ms.wrapping_sub(ca.last_time) as u64 <= HZ / 32 {
            return;
        }
        ca.last_cwnd = cwnd;
        ca.last_time = now_ms;

        let epoch_start = match ca.epoch_start {
            Some(start) => start,
            None => {
                ca.epoch_start = Some(now_ms);
                ca.ack_cnt = 1;
                ca.tcp_cwnd = cwnd;
                if ca.last_max_cwnd <= cwnd {
                    ca.bic_k = 0;
                    ca.bic_origin_point = cwnd;
                } else {
                    let gap = u64::from(ca.last_max_cwnd - cwnd);
                    ca.bic_k = cubic_root(self.cube_factor.saturating_mul(gap));
                    ca.bic_origin_point = ca.last_max_cwnd;
                }
                now_ms
            }
        };

        let mut t = u64::from(now_ms.wrapping_sub(epoch_start)) + u64::from(ca.delay_min >> 3);
        t = (t << BICTCP_HZ) / HZ;

        let k = u64::from(ca.bic_k);
        let offs = t.abs_diff(k) as u128;
        let delta = ((u128::from(self.cube_rtt_scale) * offs * offs * offs)
            >> (10 + 3 * BICTCP_HZ))
            .min(u128::from(u32::MAX)) as u32;

        let bic_target = if t < k {
            ca.bic_origin_point.saturating_sub(delta)
        } else {
            ca.bic_origin_point.saturating_add(delta)
        };

        ca.cnt = if bic_target > cwnd {
            cwnd / (bic_target - cwnd)
        } else {
            cwnd.saturating_mul(100)
        };

        // No bandwidth estimate yet: grow at least 5% per RTT.
        if ca.last_max_cwnd == 0 && ca.cnt > 20 {
            ca.cnt = 20;
        }

        if self.config.tcp_friendliness {
            let delta = ((cwnd as u64 * u64::from(self.beta_scale)) >> 3).max(1) as u32;
            while ca.ack_cnt > delta {
                ca.ack_cnt -= delta;
                ca.tcp_cwnd = ca.tcp_cwnd.saturating_add(1);
            }
            if ca.tcp_cwnd > cwnd {
                let max_cnt = cwnd / (ca.tcp_cwnd - cwnd);
                ca.cnt = ca.cnt.min(max_cnt);
            }
        }

        ca.cnt = ((u64::from(ca.cnt) << ACK_RATIO_SHIFT) / u64::from(ca.delayed_ack.max(1))) as u32;
        if ca.cnt == 0 {
            ca.cnt = 1;
        }
        trace!(cwnd, cnt = ca.cnt, bic_target, "cubic update");
    }

    /// Starts a loss epoch and returns the new slow start threshold.
    /// 开始一个丢包周期并返回新的慢启动阈值。
    fn recalc_ssthresh(&mut self) -> u32 {
        let beta = self.config.beta.min(BETA_SCALE - 1);
        let cwnd = self.cwnd;
        self.ca.epoch_start = None;

        self.ca.last_max_cwnd = if cwnd < self.ca.last_max_cwnd && self.config.fast_convergence {
            ((u64::from(cwnd) * u64::from(BETA_SCALE + beta)) / u64::from(2 * BETA_SCALE)) as u32
        } else {
            cwnd
        };
        self.ca.loss_cwnd = cwnd;

        (((u64::from(cwnd) * u64::from(beta)) / u64::from(BETA_SCALE)) as u32).max(2)
    }

    /// Time from epoch start to the plateau, in 1/1024 s.
    pub fn bic_k(&self) -> u32 {
        self.ca.bic_k
    }

    pub fn last_max_cwnd(&self) -> u32 {
        self.ca.last_max_cwnd
    }

    pub fn loss_cwnd(&self) -> u32 {
        self.ca.loss_cwnd
    }

    pub fn delayed_ack_ratio(&self) -> u32 {
        self.ca.delayed_ack
    }

    pub fn hystart(&self) -> &HybridSlowStart {
        &self.hystart
    }
}

impl CongestionControl for Cubic {
    fn on_first_ack(&mut self, send_next: u32, now: Instant) {
        self.ca.loss_cwnd = 0;
        self.ca.reset();
        self.hystart.clear_found();

        if self.config.hystart {
            self.hystart.reset(self.clock(now), send_next);
        } else if self.config.initial_ssthresh != 0 {
            self.ssthresh = self.config.initial_ssthresh;
        }
    }

    fn on_ack(&mut self, event: AckEvent, now: Instant) {
        if !self.is_cwnd_limited(event.in_flight) {
            trace!(
                in_flight = event.in_flight,
                cwnd = self.cwnd,
                "not limited by the congestion window"
            );
            return;
        }

        let now_ms = self.clock(now);
        if self.cwnd < self.ssthresh {
            if self.config.hystart && self.hystart.round_ended(event.highest_ack) {
                self.hystart.reset(now_ms, event.send_next);
            }
            self.slow_start(event.acked);
            trace!(cwnd = self.cwnd, ssthresh = self.ssthresh, "slow start");
        } else {
            self.update(now_ms);
            self.cong_avoid_ai(self.ca.cnt);
            trace!(cwnd = self.cwnd, cnt = self.ca.cnt, "congestion avoidance");
        }
    }

    fn on_packets_acked(&mut self, acked: u32, rtt: Option<Duration>, ca_open: bool, now: Instant) {
        if ca_open {
            let ratio = self.ca.delayed_ack - (self.ca.delayed_ack >> ACK_RATIO_SHIFT) + acked;
            self.ca.delayed_ack = ratio.clamp(1, ACK_RATIO_LIMIT);
        }

        let Some(rtt) = rtt else {
            return;
        };

        let now_ms = self.clock(now);
        // Discard delay samples right after a reduction.
        if let Some(start) = self.ca.epoch_start {
            if (now_ms.wrapping_sub(start) as u64) < HZ {
                return;
            }
        }

        let delay = ((rtt.as_millis().min(u128::from(u32::MAX >> 3)) as u32) << 3).max(1);
        if self.ca.delay_min == 0 || self.ca.delay_min > delay {
            self.ca.delay_min = delay;
        }

        if self.config.hystart
            && self.cwnd <= self.ssthresh
            && self.cwnd >= self.config.hystart_low_window
            && self.hystart.update(delay, self.ca.delay_min, now_ms)
        {
            debug!(
                cwnd = self.cwnd,
                found = self.hystart.found(),
                "hybrid slow start exit"
            );
            self.ssthresh = self.cwnd;
        }
    }

    fn on_congestion_event(&mut self, event: CongestionEvent) {
        let ssthresh = self.recalc_ssthresh();
        self.ssthresh = ssthresh;
        self.cwnd_cnt = 0;
        match event {
            CongestionEvent::FastRetransmit => self.cwnd = ssthresh,
            CongestionEvent::RetransmissionTimeout => self.cwnd = 1,
        }
        debug!(?event, cwnd = self.cwnd, ssthresh, "congestion window reduced");
    }

    fn undo(&mut self) {
        self.cwnd = self.cwnd.max(self.ca.loss_cwnd);
    }

    fn congestion_window(&self) -> u32 {
        self.cwnd
    }

    fn slow_start_threshold(&self) -> u32 {
        self.ssthresh
    }
}
