//! 令牌式定时器队列
//! Token-based timer queue
//!
//! Every `schedule()` returns a [`TimerToken`]; the owner keeps the token and
//! cancels by it. Expiry order is deadline first, then scheduling order, which
//! keeps simulations deterministic.
//!
//! 每次 `schedule()` 都返回一个 [`TimerToken`]；所有者持有令牌并据此取消定时器。
//! 到期顺序先按截止时间，再按调度顺序，从而保证仿真的确定性。

use std::collections::{BTreeMap, HashMap};
use tokio::time::Instant;


/// 定时器令牌，用于唯一标识已调度的定时器
/// Timer token, uniquely identifying a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

/// A deadline-ordered set of pending events.
/// 按截止时间排序的待处理事件集合。
#[derive(Debug)]
pub struct TimerQueue<E> {
    entries: BTreeMap<(Instant, u64), E>,
    deadlines: HashMap<u64, Instant>,
    next_id: u64,
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> TimerQueue<E> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            deadlines: HashMap::new(),
            next_id: 0,
        }
    }

    /// 在 `at` 时刻调度事件
    /// Schedules `event` to fire at `at`.
    pub fn schedule(&mut self, at: Instant, event: E) -> TimerToken {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert((at, id), event);
        self.deadlines.insert(id, at);
        TimerToken(id)
    }

    /// 取消定时器，返回它是否仍处于待处理状态
    /// Cancels a timer. Returns `false` if it already fired or was cancelled.
    pub fn cancel(&mut self, token: TimerToken) -> bool {
        match self.deadlines.remove(&token.0) {
            Some(at) => self.entries.remove(&(at, token.0)).is_some(),
            None => false,
        }
    }

    pub fn is_scheduled(&self, token: TimerToken) -> bool {
        self.deadlines.contains_key(&token.0)
    }

    pub fn deadline(&self, token: TimerToken) -> Option<Instant> {
        self.deadlines.get(&token.0).copied()
    }

    /// 最早的截止时间
    /// The earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(at, _)| *at)
    }

    /// Removes and returns the earliest event whose deadline is `<= now`.
    /// 移除并返回截止时间 `<= now` 的最早事件。
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimerToken, Instant, E)> {
        let &(at, id) = self.entries.keys().next()?;
        if at > now {
            return None;
        }
        let event = self.entries.remove(&(at, id))?;
        self.deadlines.remove(&id);
        Some((TimerToken(id), at, event))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
