//! 接入类别的竞争状态：竞争窗口、退避计数器和AIFS。
//! Contention state of an access category: contention window, backoff
//! counter and AIFS.

use crate::config::AccessCategoryConfig;
use rand::Rng;
use std::time::Duration;
use tracing::trace;

/// Live EDCA state of one access category.
///
/// Invariant: `cw_min <= cw <= cw_max`.
///
/// 单个接入类别的实时EDCA状态。不变式：`cw_min <= cw <= cw_max`。
#[derive(Debug, Clone)]
pub struct AccessCategory {
    index: usize,
    cw_min: u32,
    cw_max: u32,
    cw_min_multicast: u32,
    aifsn: u32,
    txop_limit: Duration,
    cw: u32,
    /// Remaining slots; `None` until a value is drawn.
    /// 剩余时隙数；在抽取之前为 `None`。
    backoff_slots: Option<u32>,
    backoff_pending: bool,
    retry_counter: u32,
    aifs_elapsed: bool,
}

impl AccessCategory {
    pub fn new(index: usize, config: &AccessCategoryConfig, cw_min_multicast: u32) -> Self {
        Self {
            index,
            cw_min: config.cw_min,
            cw_max: config.cw_max,
            cw_min_multicast,
            aifsn: config.aifsn,
            txop_limit: config.txop_limit,
            cw: config.cw_min,
            backoff_slots: None,
            backoff_pending: false,
            retry_counter: 0,
            aifs_elapsed: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn cw(&self) -> u32 {
        self.cw
    }

    pub fn cw_min(&self) -> u32 {
        self.cw_min
    }

    pub fn cw_max(&self) -> u32 {
        self.cw_max
    }

    pub fn aifsn(&self) -> u32 {
        self.aifsn
    }

    pub fn txop_limit(&self) -> Duration {
        self.txop_limit
    }

    pub fn backoff_slots(&self) -> Option<u32> {
        self.backoff_slots
    }

    pub fn backoff_pending(&self) -> bool {
        self.backoff_pending
    }

    pub fn retry_counter(&self) -> u32 {
        self.retry_counter
    }

    pub fn aifs_elapsed(&self) -> bool {
        self.aifs_elapsed
    }

    pub(crate) fn set_aifs_elapsed(&mut self, elapsed: bool) {
        self.aifs_elapsed = elapsed;
    }

    /// Doubles the window, `cw = min(2(cw + 1) - 1, cw_max)`.
    /// 窗口加倍，`cw = min(2(cw + 1) - 1, cw_max)`。
    pub fn grow_cw(&mut self) -> u32 {
        let grown = (2 * (u64::from(self.cw) + 1) - 1).min(u64::from(self.cw_max));
        self.cw = u32::try_from(grown).unwrap_or(self.cw_max);
        self.cw
    }

    pub fn reset_cw(&mut self) {
        self.cw = self.cw_min;
    }

    pub fn record_retry(&mut self) {
        self.retry_counter += 1;
    }

    pub fn reset_retry_counter(&mut self) {
        self.retry_counter = 0;
    }

    /// Draws a fresh backoff from `[0, cw]` and marks it pending.
    /// Group-addressed frames draw from the multicast window instead.
    ///
    /// 从 `[0, cw]` 中抽取新的退避值并标记为待处理。组播帧改用组播窗口。
    pub fn draw_backoff<R: Rng>(&mut self, rng: &mut R, multicast: bool) -> u32 {
        let window = if multicast { self.cw_min_multicast } else { self.cw };
        let slots = rng.random_range(0..=window);
        trace!(category = self.index, cw = window, slots, "drew backoff");
        self.backoff_slots = Some(slots);
        self.backoff_pending = true;
        slots
    }

    /// Marks the backoff pending; a value is drawn only if none is held.
    /// 将退避标记为待处理；仅在没有值时才抽取。
    pub fn ensure_backoff<R: Rng>(&mut self, rng: &mut R, multicast: bool) {
        if self.backoff_slots.is_none() {
            self.draw_backoff(rng, multicast);
        }
        self.backoff_pending = true;
    }

    /// Marks the backoff pending without drawing; the draw happens when
    /// contention resumes.
    ///
    /// 标记退避为待处理但不抽取；在竞争恢复时再抽取。
    pub fn mark_backoff_pending(&mut self) {
        self.backoff_pending = true;
    }

    /// The backoff has been consumed by a won contention or completed.
    /// 退避已被赢得的竞争消耗或已完成。
    pub fn clear_backoff(&mut self) {
        self.backoff_slots = None;
        self.backoff_pending = false;
    }

    /// Counts down one idle slot. Only categories whose AIFS has elapsed and
    /// whose backoff is pending count down.
    ///
    /// 倒数一个空闲时隙。只有AIFS已结束且退避待处理的类别才会倒数。
    pub fn tick(&mut self) {
        if !(self.aifs_elapsed && self.backoff_pending) {
            return;
        }
        if let Some(slots) = self.backoff_slots.as_mut() {
            *slots = slots.saturating_sub(1);
        }
    }

    #[cfg(test)]
    pub(crate) fn set_backoff_slots(&mut self, slots: u32) {
        self.backoff_slots = Some(slots);
    }

    /// The backoff has run out and the category may transmit.
    /// 退避已结束，类别可以发送。
    pub fn backoff_expired(&self) -> bool {
        self.aifs_elapsed && self.backoff_pending && self.backoff_slots == Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn category(cw_min: u32, cw_max: u32) -> AccessCategory {
        AccessCategory::new(0, &AccessCategoryConfig::new(cw_min, cw_max, 2), 15)
    }

    #[test]
    fn test_cw_doubles_up_to_max() {
        let mut ac = category(7, 63);
        let seen: Vec<u32> = (0..5).map(|_| ac.grow_cw()).collect();
        assert_eq!(seen, vec![15, 31, 63, 63, 63]);
        ac.reset_cw();
        assert_eq!(ac.cw(), 7);
    }

    #[test]
    fn test_cw_growth_near_u32_max() {
        let mut ac = category(1 << 31, u32::MAX);
        assert_eq!(ac.grow_cw(), u32::MAX);
        assert_eq!(ac.grow_cw(), u32::MAX);
    }

    #[test]
    fn test_draw_stays_within_window() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut ac = category(3, 7);
        for _ in 0..200 {
            let slots = ac.draw_backoff(&mut rng, false);
            assert!(slots <= 3);
        }
        ac.grow_cw();
        for _ in 0..200 {
            assert!(ac.draw_backoff(&mut rng, false) <= 7);
        }
        assert!(ac.backoff_pending());
    }

    #[test]
    fn test_tick_requires_aifs_and_pending() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut ac = category(1023, 1023);
        let drawn = loop {
            let slots = ac.draw_backoff(&mut rng, false);
            if slots > 2 {
                break slots;
            }
        };

        // AIFS 未结束时计数器冻结
        ac.tick();
        assert_eq!(ac.backoff_slots(), Some(drawn));

        ac.set_aifs_elapsed(true);
        ac.tick();
        assert_eq!(ac.backoff_slots(), Some(drawn - 1));
        assert!(!ac.backoff_expired());

        ac.clear_backoff();
        assert!(!ac.backoff_pending());
        assert_eq!(ac.backoff_slots(), None);
    }

    #[test]
    fn test_ensure_backoff_keeps_frozen_value() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut ac = category(15, 1023);
        let first = ac.draw_backoff(&mut rng, false);
        ac.ensure_backoff(&mut rng, false);
        assert_eq!(ac.backoff_slots(), Some(first));
    }
}
