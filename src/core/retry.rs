//! 重传与生存期管理。
//! Retry and lifetime management.
//!
//! Decides, per frame, whether a failed transmission is retried or given up,
//! and applies the matching contention-window update to the owning category.
//!
//! 逐帧决定失败的发送是重传还是放弃，并对所属类别应用相应的竞争窗口更新。

use super::{contention::AccessCategory, queue::QueuedFrame};
use crate::config::RetryConfig;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Why a frame was abandoned.
/// 帧被放弃的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    RetryLimit,
    Lifetime,
}

/// Outcome of a failed transmission for one frame.
/// 单个帧发送失败的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryVerdict {
    /// The frame goes back to the head of its queue with its retry bit set.
    /// 帧回到队首并置位重传位。
    Retry,
    GiveUp(GiveUpReason),
}

/// Applies the short/long retry limits and the MSDU lifetime.
/// 应用短/长重传限制和MSDU生存期。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    rts_threshold: usize,
    short_limit: u32,
    long_limit: u32,
    lifetime: Duration,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            rts_threshold: config.rts_threshold,
            short_limit: config.short_retry_limit,
            long_limit: config.long_retry_limit,
            lifetime: config.max_msdu_lifetime,
        }
    }

    /// Transmission attempts allowed for a frame of this size.
    /// 该大小帧允许的发送尝试次数。
    pub fn limit_for(&self, byte_length: usize) -> u32 {
        if byte_length >= self.rts_threshold {
            self.long_limit
        } else {
            self.short_limit
        }
    }

    pub fn is_expired(&self, entry: &QueuedFrame, now: Instant) -> bool {
        now.saturating_duration_since(entry.enqueued_at) > self.lifetime
    }

    /// Judges a frame whose transmission just failed. On `Retry` the frame's
    /// retry state is advanced; on `GiveUp` it is left untouched.
    ///
    /// 判定刚刚发送失败的帧。`Retry` 时推进帧的重传状态；`GiveUp` 时保持不变。
    pub fn on_frame_failed(&self, entry: &mut QueuedFrame, now: Instant) -> RetryVerdict {
        if self.is_expired(entry, now) {
            debug!(
                seq = ?entry.frame.sequence,
                age = ?now.saturating_duration_since(entry.enqueued_at),
                "frame lifetime exceeded"
            );
            return RetryVerdict::GiveUp(GiveUpReason::Lifetime);
        }
        let limit = self.limit_for(entry.frame.byte_length());
        let attempts = entry.frame.retry_count + 1;
        if attempts >= limit {
            debug!(seq = ?entry.frame.sequence, attempts, limit, "retry limit reached");
            return RetryVerdict::GiveUp(GiveUpReason::RetryLimit);
        }
        entry.frame.retry_count += 1;
        entry.frame.retry = true;
        trace!(seq = ?entry.frame.sequence, retry_count = entry.frame.retry_count, "frame will be retried");
        RetryVerdict::Retry
    }

    /// Updates the category after a failed exchange in which at least one
    /// frame is retried: the window doubles and the retry counter advances.
    ///
    /// 在至少有一个帧重传的失败交换后更新类别：窗口加倍且重传计数器递增。
    pub fn on_exchange_retried(&self, category: &mut AccessCategory) {
        category.record_retry();
        let cw = category.grow_cw();
        debug!(category = category.index(), cw, retry = category.retry_counter(), "contention window grown");
    }

    /// After a give-up the window is left as is; only the retry counter restarts.
    /// 放弃后窗口保持不变；只有重传计数器重新开始。
    pub fn on_exchange_abandoned(&self, category: &mut AccessCategory) {
        category.reset_retry_counter();
    }

    /// A successful exchange resets both the window and the retry counter.
    /// 成功的交换会重置窗口和重传计数器。
    pub fn on_exchange_succeeded(&self, category: &mut AccessCategory) {
        category.reset_cw();
        category.reset_retry_counter();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccessCategoryConfig;
    use crate::packet::{DataFrame, FrameClass, MacAddress};
    use bytes::Bytes;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(&RetryConfig {
            rts_threshold: 500,
            short_retry_limit: 3,
            long_retry_limit: 2,
            max_msdu_lifetime: Duration::from_millis(10),
        })
    }

    fn entry(payload: usize, enqueued_at: Instant) -> QueuedFrame {
        let frame = DataFrame::new(
            MacAddress::from_station_id(2),
            MacAddress::from_station_id(1),
            Bytes::from(vec![0u8; payload]),
        );
        QueuedFrame::new(FrameClass::Data, frame, enqueued_at)
    }

    #[test]
    fn test_short_limit_counts_attempts() {
        let policy = policy();
        let now = Instant::now();
        let mut frame = entry(10, now);

        assert_eq!(policy.on_frame_failed(&mut frame, now), RetryVerdict::Retry);
        assert_eq!(policy.on_frame_failed(&mut frame, now), RetryVerdict::Retry);
        assert!(frame.frame.retry);
        assert_eq!(frame.frame.retry_count, 2);
        // third failed attempt exhausts a limit of 3
        assert_eq!(
            policy.on_frame_failed(&mut frame, now),
            RetryVerdict::GiveUp(GiveUpReason::RetryLimit)
        );
    }

    #[test]
    fn test_long_limit_for_large_frames() {
        let policy = policy();
        let now = Instant::now();
        let mut frame = entry(600, now);
        assert_eq!(policy.limit_for(frame.frame.byte_length()), 2);
        assert_eq!(policy.on_frame_failed(&mut frame, now), RetryVerdict::Retry);
        assert_eq!(
            policy.on_frame_failed(&mut frame, now),
            RetryVerdict::GiveUp(GiveUpReason::RetryLimit)
        );
    }

    #[test]
    fn test_lifetime_wins_over_remaining_retries() {
        let policy = policy();
        let enqueued = Instant::now();
        let mut frame = entry(10, enqueued);
        let later = enqueued + Duration::from_millis(11);
        assert_eq!(
            policy.on_frame_failed(&mut frame, later),
            RetryVerdict::GiveUp(GiveUpReason::Lifetime)
        );
        assert_eq!(frame.frame.retry_count, 0);
    }

    #[test]
    fn test_category_updates() {
        let policy = policy();
        let mut ac = AccessCategory::new(0, &AccessCategoryConfig::new(7, 63, 2), 15);
        for _ in 0..4 {
            policy.on_exchange_retried(&mut ac);
        }
        assert_eq!(ac.cw(), 63);
        assert_eq!(ac.retry_counter(), 4);

        policy.on_exchange_abandoned(&mut ac);
        assert_eq!(ac.cw(), 63);
        assert_eq!(ac.retry_counter(), 0);

        policy.on_exchange_succeeded(&mut ac);
        assert_eq!(ac.cw(), 7);
    }
}
