//! Transmit and receive counters.
//! 发送和接收计数器。

use std::time::Duration;

/// Queueing-plus-access delay of delivered frames.
/// 已交付帧的排队加接入时延。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelayStats {
    pub samples: u64,
    pub total: Duration,
    pub min: Option<Duration>,
    pub max: Option<Duration>,
}

impl DelayStats {
    pub fn record(&mut self, delay: Duration) {
        self.samples += 1;
        self.total += delay;
        self.min = Some(self.min.map_or(delay, |m| m.min(delay)));
        self.max = Some(self.max.map_or(delay, |m| m.max(delay)));
    }

    pub fn mean(&self) -> Option<Duration> {
        (self.samples > 0).then(|| {
            let nanos = self.total.as_nanos() / u128::from(self.samples);
            u64::try_from(nanos).map_or(Duration::MAX, Duration::from_nanos)
        })
    }

    /// Spread between the slowest and the fastest delivery.
    /// 最慢与最快交付之间的差值。
    pub fn jitter(&self) -> Duration {
        match (self.min, self.max) {
            (Some(min), Some(max)) => max - min,
            _ => Duration::ZERO,
        }
    }
}

/// Per access category.
/// 每个接入类别。
#[derive(Debug, Clone, Default)]
pub struct CategoryStats {
    /// Unicast frames acknowledged.
    pub sent: u64,
    pub sent_without_retry: u64,
    pub sent_multicast: u64,
    /// Failed exchanges that were retried.
    pub retries: u64,
    pub given_up_retry_limit: u64,
    pub given_up_lifetime: u64,
    /// Rejected because the queue was full.
    pub dropped: u64,
    pub evicted: u64,
    pub internal_collisions: u64,
    pub aggregates_sent: u64,
    pub delay: DelayStats,
}

impl CategoryStats {
    pub fn given_up(&self) -> u64 {
        self.given_up_retry_limit + self.given_up_lifetime
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReceiveStats {
    pub unicast: u64,
    pub multicast: u64,
    pub broadcast: u64,
    pub not_for_us: u64,
    pub erroneous: u64,
    pub duplicates: u64,
    pub aggregate_subframes: u64,
    /// Frames that arrived while this station was transmitting.
    /// 本站发送期间到达的帧。
    pub ignored_while_transmitting: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MacStats {
    pub categories: Vec<CategoryStats>,
    pub receive: ReceiveStats,
    pub acks_sent: u64,
    pub cts_sent: u64,
    pub block_acks_sent: u64,
}

impl MacStats {
    pub fn new(category_count: usize) -> Self {
        Self {
            categories: vec![CategoryStats::default(); category_count],
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_jitter() {
        let mut delay = DelayStats::default();
        assert_eq!(delay.jitter(), Duration::ZERO);
        assert_eq!(delay.mean(), None);
        for us in [300, 100, 200] {
            delay.record(Duration::from_micros(us));
        }
        assert_eq!(delay.jitter(), Duration::from_micros(200));
        assert_eq!(delay.mean(), Some(Duration::from_micros(200)));
    }

    #[test]
    fn test_mean_beyond_u32_samples() {
        let samples = (1u64 << 33) + 1;
        let delay = DelayStats {
            samples,
            total: Duration::from_nanos(3 * samples),
            min: Some(Duration::from_nanos(3)),
            max: Some(Duration::from_nanos(3)),
        };
        assert_eq!(delay.mean(), Some(Duration::from_nanos(3)));
    }
}
