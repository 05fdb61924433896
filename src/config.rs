//! 定义了信道接入引擎的可配置参数。
//! Defines configurable parameters for the channel-access engine.
//!
//! The configuration is consumed at construction and not re-validated at runtime.
//!
//! 配置在构造时被消费，运行时不再重新验证。

use crate::error::{Error, Result};
use crate::packet::block_ack::BLOCK_ACK_WINDOW;
use std::time::Duration;

/// A structure containing all configurable parameters of a MAC instance.
///
/// 包含MAC实例所有可配置参数的结构体。
#[derive(Debug, Clone)]
pub struct Config {
    /// Slot time, SIFS and propagation margin.
    /// 时隙、SIFS和传播余量。
    pub timing: TimingConfig,

    /// Per-category contention parameters.
    /// 各接入类别的竞争参数。
    pub contention: ContentionConfig,

    /// Retry limits, RTS threshold and MSDU lifetime.
    /// 重传限制、RTS阈值和MSDU生存期。
    pub retry: RetryConfig,

    /// Aggregate bursts and Block-ACK.
    /// 聚合突发和块确认。
    pub aggregation: AggregationConfig,

    pub queue: QueueConfig,

    pub receive: ReceiveConfig,

    /// Seed for the backoff generator. `None` seeds from the OS.
    /// 退避随机数生成器的种子。`None` 表示从操作系统获取种子。
    pub rng_seed: Option<u64>,
}

/// PHY-dependent timing constants.
///
/// PHY相关的时序常量。
#[derive(Debug, Clone)]
pub struct TimingConfig {
    pub slot_time: Duration,
    pub sifs: Duration,
    /// Added twice (there and back) to every response timeout.
    /// 在每个响应超时中加两次（往返）。
    pub max_propagation_delay: Duration,
}

/// Contention parameters of one access category.
///
/// 单个接入类别的竞争参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessCategoryConfig {
    pub cw_min: u32,
    pub cw_max: u32,
    pub aifsn: u32,
    /// Zero disables TXOP bursting for the category.
    /// 为零时禁用该类别的TXOP突发。
    pub txop_limit: Duration,
}

/// The set of access categories, lowest priority first.
///
/// 接入类别集合，优先级从低到高排列。
#[derive(Debug, Clone)]
pub struct ContentionConfig {
    /// Index 0 is the lowest priority; the last entry is the highest.
    /// 索引0为最低优先级；最后一项为最高优先级。
    pub categories: Vec<AccessCategoryConfig>,
    /// Contention window used for group-addressed frames.
    /// 组播帧使用的竞争窗口。
    pub cw_min_multicast: u32,
}

/// Retry and lifetime limits.
///
/// 重传和生存期限制。
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Unicast frames at or above this byte length use RTS/CTS and the long retry limit.
    /// 字节长度达到或超过该值的单播帧使用RTS/CTS和长重传限制。
    pub rts_threshold: usize,
    /// Transmission attempts allowed for frames below the RTS threshold.
    /// 低于RTS阈值的帧允许的发送尝试次数。
    pub short_retry_limit: u32,
    /// Transmission attempts allowed for frames at or above the RTS threshold.
    /// 达到或超过RTS阈值的帧允许的发送尝试次数。
    pub long_retry_limit: u32,
    /// A frame older than this (measured from enqueue) is given up.
    /// 超过此时间（从入队开始计算）的帧将被放弃。
    pub max_msdu_lifetime: Duration,
}

/// When the Block-ACK request of a burst is sent.
///
/// 突发的块确认请求何时发送。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockAckPolicy {
    /// A SIFS after the last subframe.
    /// 在最后一个子帧之后的一个SIFS。
    Immediate,
    /// In a contention round of its own.
    /// 在单独的竞争轮次中。
    Delayed,
}

/// Aggregate (MPDU-A) burst parameters.
///
/// 聚合（MPDU-A）突发参数。
#[derive(Debug, Clone)]
pub struct AggregationConfig {
    pub enabled: bool,
    /// Upper bound on frames per burst, at most 64.
    /// 每个突发的帧数上限，最多64。
    pub max_aggregate_size: usize,
    /// A burst is only built when this many frames for the destination are queued.
    /// 仅当该目的地排队的帧达到此数量时才构建突发。
    pub min_aggregate_frames: usize,
    /// Bursts a category may send back to back before falling back to a single frame.
    /// 一个类别在退回单帧之前可连续发送的突发数。
    pub max_consecutive_aggregates: u32,
    pub block_ack_policy: BlockAckPolicy,
    pub use_rts_for_aggregate: bool,
    /// How long the receiver keeps trailing subframes after the last marker.
    /// 接收方在最后标记之后保留尾随子帧的时间。
    pub flush_timeout: Duration,
    /// Reassembly state idle for longer than this is purged.
    /// 空闲时间超过此值的重组状态将被清除。
    pub stale_threshold: Duration,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Total frames across all categories, including the ones in flight.
    /// 所有类别的帧总数，包括在途帧。
    pub capacity: usize,
}

/// Receive-path parameters.
///
/// 接收路径参数。
#[derive(Debug, Clone)]
pub struct ReceiveConfig {
    /// Deliver frames addressed to other stations.
    /// 投递发往其他站点的帧。
    pub promiscuous: bool,
    pub duplicate_detection: bool,
    /// Per-transmitter duplicate state expires after this long.
    /// 每个发送方的重复检测状态在此时间后过期。
    pub duplicate_timeout: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            slot_time: Duration::from_micros(9),
            sifs: Duration::from_micros(16),
            max_propagation_delay: Duration::from_micros(2),
        }
    }
}

impl AccessCategoryConfig {
    pub fn new(cw_min: u32, cw_max: u32, aifsn: u32) -> Self {
        Self {
            cw_min,
            cw_max,
            aifsn,
            txop_limit: Duration::ZERO,
        }
    }

    pub fn with_txop_limit(mut self, txop_limit: Duration) -> Self {
        self.txop_limit = txop_limit;
        self
    }
}

impl ContentionConfig {
    /// The four EDCA categories: background, best effort, video, voice.
    /// 四个EDCA类别：背景、尽力而为、视频、语音。
    pub fn edca() -> Self {
        Self {
            categories: vec![
                AccessCategoryConfig::new(15, 1023, 7),
                AccessCategoryConfig::new(15, 1023, 3),
                AccessCategoryConfig::new(7, 15, 2).with_txop_limit(Duration::from_micros(3008)),
                AccessCategoryConfig::new(3, 7, 2).with_txop_limit(Duration::from_micros(1504)),
            ],
            cw_min_multicast: 15,
        }
    }

    /// A single legacy DCF category.
    /// 单个传统DCF类别。
    pub fn dcf() -> Self {
        Self {
            categories: vec![AccessCategoryConfig::new(15, 1023, 2)],
            cw_min_multicast: 15,
        }
    }
}

impl Default for ContentionConfig {
    fn default() -> Self {
        Self::edca()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            rts_threshold: 2346,
            short_retry_limit: 7,
            long_retry_limit: 4,
            max_msdu_lifetime: Duration::from_millis(512),
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_aggregate_size: 64,
            min_aggregate_frames: 2,
            max_consecutive_aggregates: 4,
            block_ack_policy: BlockAckPolicy::Immediate,
            use_rts_for_aggregate: false,
            flush_timeout: Duration::from_millis(2),
            stale_threshold: Duration::from_secs(2),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            promiscuous: false,
            duplicate_detection: true,
            duplicate_timeout: Duration::from_secs(1),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            contention: ContentionConfig::default(),
            retry: RetryConfig::default(),
            aggregation: AggregationConfig::default(),
            queue: QueueConfig::default(),
            receive: ReceiveConfig::default(),
            rng_seed: None,
        }
    }
}

impl Config {
    /// A legacy single-category configuration without aggregation.
    /// 不带聚合的传统单类别配置。
    pub fn dcf() -> Self {
        Self {
            contention: ContentionConfig::dcf(),
            aggregation: AggregationConfig {
                enabled: false,
                ..AggregationConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn category_count(&self) -> usize {
        self.contention.categories.len()
    }

    /// Checks the cross-field constraints the engine relies on.
    /// 检查引擎所依赖的跨字段约束。
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));

        if self.contention.categories.is_empty() {
            return invalid("at least one access category is required".into());
        }
        for (index, ac) in self.contention.categories.iter().enumerate() {
            if ac.cw_min > ac.cw_max {
                return invalid(format!(
                    "category {index}: cw_min {} exceeds cw_max {}",
                    ac.cw_min, ac.cw_max
                ));
            }
            if ac.aifsn == 0 {
                return invalid(format!("category {index}: aifsn must be at least 1"));
            }
        }
        if self.timing.slot_time.is_zero() {
            return invalid("slot time must be positive".into());
        }
        if self.retry.short_retry_limit == 0 || self.retry.long_retry_limit == 0 {
            return invalid("retry limits must allow at least one attempt".into());
        }
        if self.queue.capacity == 0 {
            return invalid("queue capacity must be positive".into());
        }
        let agg = &self.aggregation;
        if agg.max_aggregate_size == 0 || agg.max_aggregate_size > BLOCK_ACK_WINDOW as usize {
            return invalid(format!(
                "max_aggregate_size must be within 1..={BLOCK_ACK_WINDOW}"
            ));
        }
        if agg.min_aggregate_frames == 0 || agg.min_aggregate_frames > agg.max_aggregate_size {
            return invalid("min_aggregate_frames must be within 1..=max_aggregate_size".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.category_count(), 4);
        assert!(Config::dcf().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_contention_window() {
        let mut config = Config::default();
        config.contention.categories[1].cw_min = 2048;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_oversized_aggregate() {
        let mut config = Config::default();
        config.aggregation.max_aggregate_size = 65;
        assert!(config.validate().is_err());
    }
}
