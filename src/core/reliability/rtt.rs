//! An estimator for the round-trip time (RTT).
//! RTT 估算器。
//!
//! Jacobson/Karels in integer milliseconds: `srtt` is kept scaled by 8 and the
//! deviation terms scaled by 4, so the RTO is `srtt/8 + rttvar`.

use crate::config::ReliabilityConfig;
use std::time::Duration;

/// An estimator for the round-trip time (RTT).
///
/// 一个RTT估算器。
#[derive(Debug, Clone)]
pub struct RttEstimator {
    /// Smoothed RTT in milliseconds, scaled by 8.
    /// 平滑RTT（毫秒），按8缩放。
    srtt: i64,
    /// Mean deviation, scaled by 4.
    /// 平均偏差，按4缩放。
    mdev: i64,
    /// Largest `mdev` seen during the current RTT.
    /// 当前RTT内见到的最大 `mdev`。
    mdev_max: i64,
    /// Smoothed deviation, decayed once per RTT.
    /// 平滑偏差，每个RTT衰减一次。
    rttvar: i64,
    /// Offset whose acknowledgment closes the current RTT.
    /// 其确认标志着当前RTT结束的偏移量。
    rtt_seq: u32,
    has_sample: bool,
    rto: u64,
    min_rto: i64,
    max_rto: u64,
}

impl RttEstimator {
    /// Creates a new RTT estimator from the reliability settings.
    ///
    /// 使用可靠性配置创建一个新的 RTT 估算器。
    pub fn new(config: &ReliabilityConfig) -> Self {
        let max_rto = config.max_rto.as_millis() as u64;
        Self {
            srtt: (config.initial_srtt.as_millis() as i64) << 3,
            mdev: 0,
            mdev_max: 0,
            rttvar: 0,
            rtt_seq: 0,
            has_sample: false,
            rto: (config.initial_rto.as_millis() as u64).min(max_rto),
            min_rto: config.min_rto.as_millis() as i64,
            max_rto,
        }
    }

    /// Returns the current RTO value.
    ///
    /// 返回当前的 RTO 值。
    pub fn rto(&self) -> Duration {
        Duration::from_millis(self.rto)
    }

    /// Returns the smoothed RTT.
    ///
    /// 返回平滑RTT。
    pub fn srtt(&self) -> Duration {
        Duration::from_millis((self.srtt >> 3).max(0) as u64)
    }

    pub fn rttvar(&self) -> Duration {
        Duration::from_millis(self.rttvar.max(0) as u64)
    }

    pub fn has_sample(&self) -> bool {
        self.has_sample
    }

    /// The RTO doubled `backoff` times, capped at the maximum.
    /// RTO 翻倍 `backoff` 次，并以最大值为上限。
    pub fn backed_off_rto(&self, backoff: u32) -> Duration {
        let mut rto = self.rto;
        for _ in 0..backoff {
            if rto > self.max_rto / 2 {
                rto = self.max_rto;
                break;
            }
            rto <<= 1;
        }
        Duration::from_millis(rto.min(self.max_rto))
    }

    /// Updates the estimator with a new sample.
    ///
    /// `first_unack` and `send_next` delimit the flight the sample belongs to;
    /// the variance decays once per flight.
    ///
    /// 使用一个新的样本更新估算器。
    pub fn update(&mut self, sample: Duration, first_unack: u32, send_next: u32) {
        let mut m = (sample.as_millis() as i64).max(1);

        if self.has_sample {
            m -= self.srtt >> 3;
            self.srtt += m;
            if m < 0 {
                m = -m;
                m -= self.mdev >> 2;
                if m > 0 {
                    m >>= 3;
                }
            } else {
                m -= self.mdev >> 2;
            }
            self.mdev += m;
            if self.mdev > self.mdev_max {
                self.mdev_max = self.mdev;
                if self.mdev_max > self.rttvar {
                    self.rttvar = self.mdev_max;
                }
            }
            if first_unack > self.rtt_seq {
                if self.mdev_max < self.rttvar {
                    self.rttvar -= (self.rttvar - self.mdev_max) >> 2;
                }
                self.rtt_seq = send_next;
                self.mdev_max = self.min_rto;
            }
        } else {
            self.srtt = m << 3;
            self.mdev = m << 1;
            self.mdev_max = self.mdev.max(self.min_rto);
            self.rttvar = self.mdev_max;
            self.rtt_seq = send_next;
            self.has_sample = true;
        }

        let rto = ((self.srtt >> 3) + self.rttvar).max(1) as u64;
        self.rto = rto.min(self.max_rto);
    }
}
