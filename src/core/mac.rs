//! 信道接入状态机（EDCA/DCF）。
//! The channel-access state machine (EDCA/DCF).
//!
//! `Mac` is a single-threaded, event-driven core. It never reads a clock: every
//! input carries the current instant, and the owner drives timers through
//! [`Mac::next_deadline`] and [`Mac::advance`]. Frames to put on the air and
//! indications for the upper layer are collected as [`MacOutput`] values.
//!
//! `Mac` 是单线程、事件驱动的核心。它从不读取时钟：每个输入都携带当前时刻，
//! 所有者通过 [`Mac::next_deadline`] 和 [`Mac::advance`] 驱动定时器。
//! 要发送的帧和给上层的指示以 [`MacOutput`] 值的形式收集。

mod access;
mod receive;
mod transmit;

use super::{
    contention::AccessCategory,
    duplicate::DuplicateFilter,
    exchange::FrameExchangeController,
    queue::{QueuedFrame, TransmissionQueue},
    reassembly::AggregationReassembler,
    retry::{GiveUpReason, RetryPolicy},
    state::{MacState, StateKind, StateValidator},
    stats::MacStats,
};
use crate::{
    config::Config,
    error::{Error, Result},
    packet::{DataFrame, Frame, FrameClass, MacAddress, SequenceNumber},
    phy::{AirTime, MediumState, TransmissionState, TxTime},
    timer::{TimerQueue, TimerToken},
};
use rand::{SeedableRng, rngs::StdRng};
use std::collections::VecDeque;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Decides whether a submitted frame may enter the queue.
/// 决定提交的帧是否可以进入队列。
pub type AdmissionPolicy = Box<dyn Fn(&DataFrame) -> bool + Send>;

/// Everything the MAC asks of its surroundings.
/// MAC 对其外部环境提出的所有请求。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacOutput {
    /// Put a frame on the air.
    /// 将帧发送到空中。
    Transmit(Frame),
    /// A frame addressed to this station (or a group it listens to).
    /// 发往本站（或本站监听的组）的帧。
    Deliver(Frame),
    /// A frame for another station, overheard in promiscuous mode.
    /// 在混杂模式下侦听到的发往其他站点的帧。
    Promiscuous(Frame),
    /// A frame was abandoned after exhausting its retries or lifetime.
    /// 帧在耗尽重传次数或生存期后被放弃。
    LinkBreak {
        destination: MacAddress,
        frame: Frame,
        reason: GiveUpReason,
    },
    /// A unicast frame was acknowledged by its receiver.
    /// 单播帧已被接收方确认。
    TxAcknowledged {
        destination: MacAddress,
        sequence: SequenceNumber,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MacTimer {
    Aifs(usize),
    BackoffTick,
    ResponseTimeout,
    MulticastDwell,
    SubframeGuard,
    Sifs,
    NavExpired,
}

/// Virtual carrier sense.
#[derive(Debug, Clone, Copy)]
struct Nav {
    until: Instant,
    token: TimerToken,
}

#[derive(Debug, Clone, Copy)]
struct Txop {
    category: usize,
    deadline: Instant,
}

/// Queue and category indices are validated at the API boundary; an error
/// from inside the engine means its own bookkeeping is corrupt.
///
/// 队列和类别索引在API边界处验证；引擎内部的错误意味着其自身簿记已损坏。
fn invariant<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("channel-access bookkeeping corrupted: {e}"),
    }
}

/// One MAC instance: queue, contention, frame exchange and receive path.
///
/// 一个MAC实例：队列、竞争、帧交换和接收路径。
pub struct Mac<P: TxTime> {
    address: MacAddress,
    state: MacState,
    queue: TransmissionQueue,
    categories: Vec<AccessCategory>,
    rng: StdRng,
    retry: RetryPolicy,
    rts_threshold: usize,
    exchange: FrameExchangeController<P>,
    reassembler: AggregationReassembler,
    duplicates: Option<DuplicateFilter>,
    promiscuous: bool,
    timers: TimerQueue<MacTimer>,
    medium: MediumState,
    transmission: TransmissionState,
    nav: Option<Nav>,
    last_receive_failed: bool,
    txop: Option<Txop>,
    admission: Option<AdmissionPolicy>,
    outputs: VecDeque<MacOutput>,
    stats: MacStats,
}

impl<P: TxTime> Mac<P> {
    /// Creates a MAC in the `Idle` state with an empty queue.
    /// 创建一个处于 `Idle` 状态且队列为空的MAC。
    pub fn new(address: MacAddress, config: Config, phy: P) -> Result<Self> {
        config.validate()?;
        let categories = config
            .contention
            .categories
            .iter()
            .enumerate()
            .map(|(i, ac)| AccessCategory::new(i, ac, config.contention.cw_min_multicast))
            .collect::<Vec<_>>();
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let air = AirTime::new(phy, &config.timing);

        Ok(Self {
            address,
            state: MacState::Idle,
            queue: TransmissionQueue::new(categories.len(), config.queue.capacity),
            rng,
            retry: RetryPolicy::new(&config.retry),
            rts_threshold: config.retry.rts_threshold,
            exchange: FrameExchangeController::new(address, air, &config),
            reassembler: AggregationReassembler::new(
                config.aggregation.flush_timeout,
                config.aggregation.stale_threshold,
            ),
            duplicates: config
                .receive
                .duplicate_detection
                .then(|| DuplicateFilter::new(config.receive.duplicate_timeout)),
            promiscuous: config.receive.promiscuous,
            timers: TimerQueue::new(),
            medium: MediumState::Idle,
            transmission: TransmissionState::Idle,
            nav: None,
            last_receive_failed: false,
            txop: None,
            admission: None,
            outputs: VecDeque::new(),
            stats: MacStats::new(categories.len()),
            categories,
        })
    }

    pub fn set_admission_policy(&mut self, policy: AdmissionPolicy) {
        self.admission = Some(policy);
    }

    pub fn address(&self) -> MacAddress {
        self.address
    }

    pub fn state(&self) -> &MacState {
        &self.state
    }

    pub fn state_kind(&self) -> StateKind {
        self.state.kind()
    }

    pub fn queue(&self) -> &TransmissionQueue {
        &self.queue
    }

    pub fn stats(&self) -> &MacStats {
        &self.stats
    }

    pub fn access_category(&self, index: usize) -> Result<&AccessCategory> {
        let count = self.categories.len();
        self.categories
            .get(index)
            .ok_or(Error::InvalidCategory { index, count })
    }

    #[cfg(test)]
    pub(crate) fn access_category_mut(&mut self, index: usize) -> &mut AccessCategory {
        &mut self.categories[index]
    }

    /// Whether a frame exchange is in progress.
    /// 是否有帧交换正在进行。
    pub fn exchange_in_progress(&self) -> bool {
        self.exchange.is_active()
    }

    pub fn reassembler(&self) -> &AggregationReassembler {
        &self.reassembler
    }

    /// End of the current NAV reservation, if any.
    /// 当前NAV预留的结束时间（如有）。
    pub fn nav_until(&self) -> Option<Instant> {
        self.nav.map(|nav| nav.until)
    }

    /// The medium is free when physically idle and not reserved by a NAV.
    /// 当介质物理空闲且未被NAV预留时，介质为空闲。
    pub fn medium_free(&self, now: Instant) -> bool {
        self.medium == MediumState::Idle && self.nav.is_none_or(|nav| nav.until <= now)
    }

    /// Submits a data or management frame, mapping it to an access category
    /// by user priority (management frames use the highest category).
    ///
    /// 提交数据帧或管理帧，按用户优先级映射到接入类别（管理帧使用最高类别）。
    pub fn submit(&mut self, frame: Frame, now: Instant) -> Result<()> {
        let (class, body) = frame.into_queueable().ok_or(Error::NotQueueable)?;
        let category = match class {
            FrameClass::Management => self.categories.len() - 1,
            FrameClass::Data => self.category_for_priority(body.priority),
        };
        self.enqueue(category, class, body, now)
    }

    /// Submits a frame to an explicit access category.
    /// 将帧提交到指定的接入类别。
    pub fn submit_to(&mut self, frame: Frame, category: usize, now: Instant) -> Result<()> {
        let count = self.categories.len();
        if category >= count {
            return Err(Error::InvalidCategory {
                index: category,
                count,
            });
        }
        let (class, body) = frame.into_queueable().ok_or(Error::NotQueueable)?;
        self.enqueue(category, class, body, now)
    }

    /// 802.1D user priority to access category: BK for 1-2, BE for 0 and 3,
    /// VI for 4-5, VO for 6-7, clamped to the configured categories.
    ///
    /// 802.1D 用户优先级到接入类别的映射，并限制在已配置的类别范围内。
    pub fn category_for_priority(&self, priority: u8) -> usize {
        let category = match priority {
            1 | 2 => 0,
            0 | 3 => 1,
            4 | 5 => 2,
            _ => 3,
        };
        category.min(self.categories.len() - 1)
    }

    fn enqueue(&mut self, category: usize, class: FrameClass, mut body: DataFrame, now: Instant) -> Result<()> {
        self.fire_timers(now, false);

        if let Some(policy) = &self.admission {
            if !policy(&body) {
                debug!(category, destination = %body.receiver, "frame rejected by admission policy");
                return Err(Error::AdmissionRejected);
            }
        }

        body.transmitter = self.address;
        body.duration = std::time::Duration::ZERO;
        match self.queue.enqueue(category, QueuedFrame::new(class, body, now)) {
            Ok(Some(evicted)) => {
                self.stats.categories[evicted.category].evicted += 1;
            }
            Ok(None) => {}
            Err(Error::QueueFull) => {
                self.stats.categories[category].dropped += 1;
                return Err(Error::QueueFull);
            }
            Err(e) => return Err(e),
        }

        if !self.medium_free(now) {
            self.categories[category].mark_backoff_pending();
        }
        self.on_new_work(category, now);
        self.settle(now);
        Ok(())
    }

    /// Physical carrier-sense notification.
    /// 物理载波侦听通知。
    pub fn medium_state_changed(&mut self, medium: MediumState, now: Instant) {
        self.fire_timers(now, false);
        trace!(?medium, state = ?self.state.kind(), "medium state changed");
        self.medium = medium;
        if medium == MediumState::Busy {
            self.on_medium_blocked(now);
        }
        self.settle(now);
    }

    /// Transmitter notification; a finished subframe lets the burst continue.
    /// 发射机通知；一个子帧发送结束后突发继续。
    pub fn transmission_state_changed(&mut self, transmission: TransmissionState, now: Instant) {
        self.fire_timers(now, false);
        self.transmission = transmission;
        if transmission == TransmissionState::Idle {
            if let MacState::SendAggregate { next, .. } = self.state {
                self.continue_burst(next, now);
            }
        }
        self.settle(now);
    }

    /// A frame arrived from the channel, possibly damaged.
    /// 从信道到达一个帧，可能已损坏。
    pub fn frame_received(&mut self, frame: Frame, has_error: bool, now: Instant) {
        self.fire_timers(now, false);
        self.on_frame(frame, has_error, now);
        self.settle(now);
    }

    /// Fires every timer due at or before `now`, each at its own deadline.
    /// 触发在 `now` 或之前到期的所有定时器，每个都在其自身的截止时间处理。
    pub fn advance(&mut self, now: Instant) {
        self.fire_timers(now, true);
        self.settle(now);
    }

    /// The earliest instant at which [`Mac::advance`] has work to do.
    /// [`Mac::advance`] 有工作要做的最早时刻。
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.timers.next_deadline(), self.reassembler.next_flush_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Takes the outputs produced so far, oldest first.
    /// 取出迄今为止产生的输出，最早的在前。
    pub fn drain_outputs(&mut self) -> Vec<MacOutput> {
        self.outputs.drain(..).collect()
    }

    fn fire_timers(&mut self, now: Instant, inclusive: bool) {
        let due = |at: Instant| if inclusive { at <= now } else { at < now };
        loop {
            let state_next = self.timers.next_deadline();
            let flush_next = self.reassembler.next_flush_deadline();
            let flush_first = match (state_next, flush_next) {
                (Some(s), Some(f)) => f < s,
                (None, Some(_)) => true,
                _ => false,
            };

            if flush_first {
                let Some(at) = flush_next.filter(|at| due(*at)) else {
                    break;
                };
                for frame in self.reassembler.on_flush_timer(at).unwrap_or_default() {
                    self.deliver(Frame::Data(frame));
                }
                continue;
            }

            let Some(at) = state_next.filter(|at| due(*at)) else {
                break;
            };
            let Some((token, at, event)) = self.timers.pop_due(at) else {
                break;
            };
            self.on_timer(token, event, at);
            self.settle(at);
        }
    }

    fn on_timer(&mut self, token: TimerToken, event: MacTimer, now: Instant) {
        trace!(?event, state = ?self.state.kind(), "timer fired");
        if event == MacTimer::NavExpired {
            self.on_nav_expired(token, now);
            return;
        }
        assert!(
            self.state.owns(token),
            "timer {event:?} fired but state {:?} does not own it",
            self.state.kind()
        );
        match event {
            MacTimer::Aifs(category) => self.on_aifs_elapsed(category, token, now),
            MacTimer::BackoffTick => self.on_backoff_tick(now),
            MacTimer::ResponseTimeout => self.on_response_timeout(now),
            MacTimer::MulticastDwell => self.exchange_succeeded(now),
            MacTimer::SubframeGuard => self.on_subframe_overdue(now),
            MacTimer::Sifs => self.on_sifs(now),
            MacTimer::NavExpired => {}
        }
    }

    fn on_nav_expired(&mut self, token: TimerToken, now: Instant) {
        if self.nav.is_some_and(|nav| nav.token == token) {
            self.nav = None;
            trace!("NAV expired");
            self.settle(now);
        }
    }

    /// Replaces the current state, cancelling every timer the old state owned
    /// and the new one does not take over.
    ///
    /// 替换当前状态，取消旧状态拥有且新状态未接管的所有定时器。
    fn transition(&mut self, next: MacState) {
        let from = self.state.kind();
        let to = next.kind();
        assert!(
            StateValidator::is_valid_transition(from, to),
            "invalid channel-access transition {from:?} -> {to:?}"
        );
        let kept = next.tokens();
        let previous = std::mem::replace(&mut self.state, next);
        for token in previous.tokens() {
            if !kept.contains(&token) {
                self.timers.cancel(token);
            }
        }
        debug!(?from, ?to, "state transition");
    }

    /// Applies the transitions that need no event: Idle with work defers,
    /// Defer without work goes idle, Defer on a free medium starts AIFS.
    ///
    /// 应用无需事件的转换：有工作的Idle进入Defer，无工作的Defer进入Idle，介质空闲时Defer开始AIFS。
    fn settle(&mut self, now: Instant) {
        loop {
            match self.state.kind() {
                StateKind::Idle if self.has_work() => self.transition(MacState::Defer),
                StateKind::Defer if !self.has_work() => self.transition(MacState::Idle),
                StateKind::Defer if self.medium_free(now) => self.enter_wait_aifs(now),
                _ => break,
            }
        }
    }

    fn has_work(&self) -> bool {
        (0..self.categories.len()).any(|c| self.category_has_work(c))
    }

    /// While a burst waits for its delayed Block-ACK request, only its
    /// category may contend.
    ///
    /// 当突发等待其延迟的块确认请求时，只有其类别可以竞争。
    fn category_has_work(&self, category: usize) -> bool {
        match self.exchange.bar_pending_category() {
            Some(pending) => pending == category,
            None => !invariant(self.queue.is_empty(category)),
        }
    }

    fn head_is_multicast(&self, category: usize) -> bool {
        invariant(self.queue.peek_front(category)).is_some_and(|head| head.frame.is_multicast())
    }

    fn emit(&mut self, output: MacOutput) {
        self.outputs.push_back(output);
    }

    fn deliver(&mut self, frame: Frame) {
        trace!(kind = frame.kind(), transmitter = %frame.transmitter(), "frame delivered upward");
        self.emit(MacOutput::Deliver(frame));
    }
}
