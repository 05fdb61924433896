//! 竞争：AIFS、时隙退避、内部碰撞和NAV。
//! Contention: AIFS, slotted backoff, internal collisions and the NAV.

use super::{Mac, MacTimer, Nav, invariant};
use crate::{
    core::state::{MacState, StateKind},
    phy::TxTime,
    timer::TimerToken,
};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

impl<P: TxTime> Mac<P> {
    /// Extra wait after a damaged reception: EIFS replaces DIFS.
    /// 接收损坏帧后的额外等待：以EIFS代替DIFS。
    fn eifs_extension(&self) -> Duration {
        if self.last_receive_failed {
            let air = self.exchange.air();
            air.eifs().saturating_sub(air.difs())
        } else {
            Duration::ZERO
        }
    }

    fn schedule_aifs(&mut self, category: usize, now: Instant) -> TimerToken {
        let aifs = self.exchange.air().aifs(self.categories[category].aifsn());
        let at = now + aifs + self.eifs_extension();
        trace!(category, ?aifs, "AIFS started");
        self.timers.schedule(at, MacTimer::Aifs(category))
    }

    /// Starts AIFS for every category with work, highest first so that equal
    /// deadlines resolve in priority order.
    ///
    /// 为每个有工作的类别启动AIFS，从最高优先级开始，使相同截止时间按优先级顺序处理。
    pub(super) fn enter_wait_aifs(&mut self, now: Instant) {
        for ac in self.categories.iter_mut() {
            ac.set_aifs_elapsed(false);
        }
        let mut aifs = Vec::new();
        for category in (0..self.categories.len()).rev() {
            if self.category_has_work(category) {
                let token = self.schedule_aifs(category, now);
                aifs.push((category, token));
            }
        }
        if aifs.is_empty() {
            self.transition(MacState::Idle);
        } else {
            self.transition(MacState::WaitAifs { aifs });
        }
    }

    /// New work arrived in `category` while contention is already running.
    /// 竞争已在运行时 `category` 中到达了新工作。
    pub(super) fn on_new_work(&mut self, category: usize, now: Instant) {
        let kind = self.state.kind();
        if !matches!(kind, StateKind::WaitAifs | StateKind::Backoff) {
            return;
        }
        if self.state.running_aifs().contains(&category) {
            return;
        }
        if !self.categories[category].aifs_elapsed() {
            let token = self.schedule_aifs(category, now);
            if let MacState::WaitAifs { aifs } | MacState::Backoff { aifs, .. } = &mut self.state {
                aifs.push((category, token));
            }
        } else if kind == StateKind::Backoff {
            let multicast = self.head_is_multicast(category);
            self.categories[category].ensure_backoff(&mut self.rng, multicast);
        }
    }

    pub(super) fn on_aifs_elapsed(&mut self, category: usize, token: TimerToken, now: Instant) {
        if let MacState::WaitAifs { aifs } | MacState::Backoff { aifs, .. } = &mut self.state {
            aifs.retain(|(_, t)| *t != token);
        }
        self.categories[category].set_aifs_elapsed(true);
        trace!(category, "AIFS elapsed");

        let has_work = self.category_has_work(category);
        match self.state.kind() {
            StateKind::WaitAifs => {
                let higher_waiting = (category + 1..self.categories.len()).any(|c| self.category_has_work(c));
                if has_work && !self.categories[category].backoff_pending() && !higher_waiting {
                    self.win_contention(category, now);
                    return;
                }
                if has_work {
                    self.ensure_backoff(category);
                }
                if !self.state.running_aifs().is_empty() && !has_work {
                    return;
                }
                let tick = self.timers.schedule(now + self.exchange.air().slot(), MacTimer::BackoffTick);
                let aifs = match &self.state {
                    MacState::WaitAifs { aifs } => aifs.clone(),
                    _ => Vec::new(),
                };
                self.transition(MacState::Backoff { tick, aifs });
                self.resolve_backoff(now);
            }
            StateKind::Backoff => {
                if has_work {
                    self.ensure_backoff(category);
                }
                self.resolve_backoff(now);
            }
            other => panic!("AIFS timer handled in state {other:?}"),
        }
    }

    fn ensure_backoff(&mut self, category: usize) {
        let multicast = self.head_is_multicast(category);
        self.categories[category].ensure_backoff(&mut self.rng, multicast);
    }

    pub(super) fn on_backoff_tick(&mut self, now: Instant) {
        for ac in self.categories.iter_mut() {
            ac.tick();
        }
        if self.resolve_backoff(now) {
            return;
        }
        if !self.has_work() {
            trace!("backoff ended without work");
            self.transition(MacState::Idle);
            return;
        }
        let tick = self.timers.schedule(now + self.exchange.air().slot(), MacTimer::BackoffTick);
        if let MacState::Backoff { tick: current, .. } = &mut self.state {
            *current = tick;
        }
    }

    /// Finds the categories whose counter reached zero. The highest one with
    /// work transmits; the others with work collide internally and redraw
    /// from a doubled window. Returns whether an exchange was started.
    ///
    /// 找出计数器归零的类别。有工作的最高类别发送；其他有工作的类别发生内部碰撞，
    /// 并从加倍的窗口重新抽取。返回是否启动了交换。
    pub(super) fn resolve_backoff(&mut self, now: Instant) -> bool {
        let mut winner = None;
        for category in (0..self.categories.len()).rev() {
            if !self.categories[category].backoff_expired() {
                continue;
            }
            if !self.category_has_work(category) {
                trace!(category, "post-backoff complete");
                self.categories[category].clear_backoff();
                continue;
            }
            if winner.is_none() {
                winner = Some(category);
                continue;
            }
            let multicast = self.head_is_multicast(category);
            let ac = &mut self.categories[category];
            let cw = ac.grow_cw();
            ac.draw_backoff(&mut self.rng, multicast);
            self.stats.categories[category].internal_collisions += 1;
            debug!(category, cw, "internal collision");
        }
        match winner {
            Some(category) => {
                self.win_contention(category, now);
                true
            }
            None => false,
        }
    }

    /// Categories still in AIFS keep a pending backoff when contention stops.
    /// 竞争停止时，仍处于AIFS中的类别保留待处理的退避。
    pub(super) fn freeze_contention(&mut self) {
        for category in self.state.running_aifs() {
            if self.category_has_work(category) {
                self.categories[category].mark_backoff_pending();
            }
        }
    }

    /// Physical or virtual carrier sense reports a busy medium.
    /// 物理或虚拟载波侦听报告介质忙。
    pub(super) fn on_medium_blocked(&mut self, _now: Instant) {
        if matches!(self.state.kind(), StateKind::WaitAifs | StateKind::Backoff) {
            self.freeze_contention();
            self.transition(MacState::Defer);
        }
    }

    /// Extends the NAV from the duration field of an overheard frame.
    /// 根据侦听到的帧的持续时间字段延长NAV。
    pub(super) fn update_nav(&mut self, duration: Duration, now: Instant) {
        if duration.is_zero() {
            return;
        }
        let until = now + duration;
        if self.nav.is_some_and(|nav| nav.until >= until) {
            return;
        }
        if let Some(old) = self.nav.take() {
            self.timers.cancel(old.token);
        }
        let token = self.timers.schedule(until, MacTimer::NavExpired);
        self.nav = Some(Nav { until, token });
        trace!(?duration, "NAV set");
        self.on_medium_blocked(now);
    }

    /// Contention won by `category`: its backoff is consumed and the exchange
    /// (or the delayed Block-ACK request) starts.
    ///
    /// `category` 赢得竞争：其退避被消耗，交换（或延迟的块确认请求）开始。
    pub(super) fn win_contention(&mut self, category: usize, now: Instant) {
        debug!(category, "contention won");
        self.freeze_contention();
        self.categories[category].clear_backoff();
        if self.exchange.bar_pending_category() == Some(category) {
            self.exchange.take_bar_pending();
            self.send_block_ack_request(now);
            return;
        }
        self.start_exchange(category, now);
    }

    /// Draws the post-backoff after an exchange, or clears it when nothing is
    /// left to send.
    ///
    /// 交换后抽取后退避，如果没有剩余要发送的内容则清除它。
    pub(super) fn post_backoff(&mut self, category: usize) {
        if invariant(self.queue.is_empty(category)) {
            self.categories[category].clear_backoff();
        } else {
            let multicast = self.head_is_multicast(category);
            self.categories[category].draw_backoff(&mut self.rng, multicast);
        }
    }
}
