//! 发送路径：交换启动、响应超时、结果处理与TXOP链接。
//! Transmit path: exchange start, response timeouts, outcomes and TXOP chaining.

use super::{Mac, MacOutput, MacTimer, Txop, invariant};
use crate::{
    config::BlockAckPolicy,
    core::{
        exchange::{Protocol, Reconciliation},
        queue::QueuedFrame,
        retry::{GiveUpReason, RetryVerdict},
        state::{MacState, SifsAction},
    },
    packet::{BlockAckInfo, Frame},
    phy::TxTime,
};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

impl<P: TxTime> Mac<P> {
    fn transmit(&mut self, frame: Frame) {
        debug!(
            kind = frame.kind(),
            receiver = %frame.receiver(),
            seq = ?frame.body().and_then(|b| b.sequence),
            "transmitting"
        );
        self.emit(MacOutput::Transmit(frame));
    }

    /// Leaves a finished turn: Defer if anything is left to send, Idle otherwise.
    /// 结束一个轮次：如果还有内容要发送则进入Defer，否则进入Idle。
    fn end_turn(&mut self, now: Instant) {
        if self.has_work() {
            self.transition(MacState::Defer);
        } else {
            self.transition(MacState::Idle);
        }
        self.settle(now);
    }

    /// Starts the exchange for the head of `category` after a won contention.
    /// Heads past their lifetime are given up first.
    ///
    /// 赢得竞争后为 `category` 的队首启动交换。超过生存期的队首帧先被放弃。
    pub(super) fn start_exchange(&mut self, category: usize, now: Instant) {
        while let Some(head) = invariant(self.queue.peek_front(category)) {
            if !self.retry.is_expired(head, now) {
                break;
            }
            if let Some(entry) = invariant(self.queue.checkout_front(category)) {
                self.queue.release(1);
                self.give_up(category, entry, GiveUpReason::Lifetime);
            }
        }

        let protocol = match invariant(self.queue.peek_front(category)) {
            Some(head) => invariant(self.exchange.select_protocol(&self.queue, category, head)),
            None => {
                trace!(category, "queue emptied before transmission");
                self.end_turn(now);
                return;
            }
        };
        if !invariant(self.exchange.start(&mut self.queue, category, protocol)) {
            self.end_turn(now);
            return;
        }

        let txop_limit = self.categories[category].txop_limit();
        self.txop = (protocol == Protocol::DataAck && !txop_limit.is_zero()).then(|| Txop {
            category,
            deadline: now + txop_limit,
        });

        let length = self.exchange.current().byte_length();
        match protocol {
            Protocol::Multicast => {
                let frame = self.exchange.current_data_frame();
                let dwell = self.exchange.air().data(length, true);
                self.transmit(frame);
                let dwell = self.timers.schedule(now + dwell, MacTimer::MulticastDwell);
                self.transition(MacState::WaitMulticast { dwell });
            }
            Protocol::DataAck => self.send_data(now),
            Protocol::RtsCts | Protocol::Aggregate { rts: true } => {
                let rts = self.exchange.rts_frame();
                self.transmit(rts);
                let timeout = self.exchange.air().cts_timeout();
                let timeout = self.timers.schedule(now + timeout, MacTimer::ResponseTimeout);
                self.transition(MacState::WaitCts { timeout });
            }
            Protocol::Aggregate { rts: false } => self.send_subframe(0, now),
        }
    }

    fn send_data(&mut self, now: Instant) {
        let frame = self.exchange.current_data_frame();
        let timeout = self.exchange.air().ack_timeout(frame.byte_length());
        self.transmit(frame);
        let timeout = self.timers.schedule(now + timeout, MacTimer::ResponseTimeout);
        self.transition(MacState::WaitAck {
            timeout,
            extended: false,
        });
    }

    fn send_subframe(&mut self, index: usize, now: Instant) {
        let (Some(frame), Some(airtime)) = (
            self.exchange.subframe(index),
            self.exchange.subframe_airtime(index),
        ) else {
            panic!("burst has no subframe {index}");
        };
        if index == 0 {
            let category = self.exchange.current().category;
            self.stats.categories[category].aggregates_sent += 1;
        }
        self.transmit(frame);
        let air = self.exchange.air();
        let guard = self
            .timers
            .schedule(now + airtime + air.sifs() + air.slot(), MacTimer::SubframeGuard);
        self.transition(MacState::SendAggregate {
            next: index + 1,
            guard,
        });
    }

    /// The transmitter never reported the end of a subframe; the burst is
    /// treated as lost.
    ///
    /// 发射机从未报告子帧结束；该突发视为丢失。
    pub(super) fn on_subframe_overdue(&mut self, now: Instant) {
        warn!(state = ?self.state.kind(), "subframe end not reported, burst failed");
        self.exchange_failed(now);
    }

    /// The transmitter finished a subframe: send the next one, or close the
    /// burst according to the Block-ACK policy.
    ///
    /// 发射机发送完一个子帧：发送下一个，或按照块确认策略结束突发。
    pub(super) fn continue_burst(&mut self, next: usize, now: Instant) {
        if next < self.exchange.current().frames.len() {
            self.send_subframe(next, now);
            return;
        }
        match self.exchange.block_ack_policy() {
            BlockAckPolicy::Immediate => {
                let timer = self.timers.schedule(now + self.exchange.air().sifs(), MacTimer::Sifs);
                self.transition(MacState::WaitSifs {
                    timer,
                    action: SifsAction::SendBlockAckRequest,
                });
            }
            BlockAckPolicy::Delayed => {
                debug!("burst sent, block-ack request deferred to a later contention");
                self.exchange.mark_bar_pending();
                let category = self.exchange.current().category;
                let multicast = self.head_is_multicast(category);
                self.categories[category].draw_backoff(&mut self.rng, multicast);
                self.end_turn(now);
            }
        }
    }

    pub(super) fn send_block_ack_request(&mut self, now: Instant) {
        let bar = self.exchange.block_ack_request();
        self.transmit(bar);
        let timeout = self.exchange.air().block_ack_timeout();
        let timeout = self.timers.schedule(now + timeout, MacTimer::ResponseTimeout);
        self.transition(MacState::WaitBlockAck {
            timeout,
            extended: false,
        });
    }

    pub(super) fn on_sifs(&mut self, now: Instant) {
        let action = match &self.state {
            MacState::WaitSifs { action, .. } => action.clone(),
            other => panic!("SIFS timer handled in state {:?}", other.kind()),
        };
        trace!(?action, "SIFS elapsed");
        match action {
            SifsAction::SendData => self.send_data(now),
            SifsAction::SendAggregate => self.send_subframe(0, now),
            SifsAction::SendBlockAckRequest => self.send_block_ack_request(now),
            SifsAction::ContinueTxop { category } => self.continue_txop(category, now),
            SifsAction::RespondAck { to } => {
                let ack = self.exchange.ack_for(to);
                self.transmit(ack);
                self.stats.acks_sent += 1;
                self.end_turn(now);
            }
            SifsAction::RespondCts { rts } => {
                let cts = self.exchange.cts_for(&rts);
                self.transmit(cts);
                self.stats.cts_sent += 1;
                self.end_turn(now);
            }
            SifsAction::RespondBlockAck { to, info } => {
                let block_ack = self.exchange.block_ack_for(to, info);
                self.transmit(block_ack);
                self.stats.block_acks_sent += 1;
                self.end_turn(now);
            }
        }
    }

    /// A response timer ran out. A busy medium grants one extension, since the
    /// response may be on the air already.
    ///
    /// 响应定时器超时。介质忙时允许延长一次，因为响应可能已在空中。
    pub(super) fn on_response_timeout(&mut self, now: Instant) {
        let busy = !self.medium_free(now);
        match self.state {
            MacState::WaitAck { extended: false, .. } if busy => {
                let at = now + self.exchange.air().ack();
                let timeout = self.timers.schedule(at, MacTimer::ResponseTimeout);
                debug!("medium busy at ACK timeout, extending");
                self.transition(MacState::WaitAck {
                    timeout,
                    extended: true,
                });
            }
            MacState::WaitBlockAck { extended: false, .. } if busy => {
                let at = now + self.exchange.air().block_ack();
                let timeout = self.timers.schedule(at, MacTimer::ResponseTimeout);
                debug!("medium busy at block-ack timeout, extending");
                self.transition(MacState::WaitBlockAck {
                    timeout,
                    extended: true,
                });
            }
            _ => {
                debug!(state = ?self.state.kind(), "response timeout");
                self.exchange_failed(now);
            }
        }
    }

    pub(super) fn cts_received(&mut self, now: Instant) {
        let action = if self.exchange.current().is_aggregate() {
            SifsAction::SendAggregate
        } else {
            SifsAction::SendData
        };
        let timer = self.timers.schedule(now + self.exchange.air().sifs(), MacTimer::Sifs);
        self.transition(MacState::WaitSifs { timer, action });
    }

    fn record_delivered(&mut self, category: usize, entry: QueuedFrame, now: Instant) {
        let stats = &mut self.stats.categories[category];
        stats.delay.record(now.saturating_duration_since(entry.enqueued_at));
        if entry.frame.is_multicast() {
            stats.sent_multicast += 1;
            return;
        }
        stats.sent += 1;
        if entry.frame.retry_count == 0 {
            stats.sent_without_retry += 1;
        }
        if let Some(sequence) = entry.frame.sequence {
            self.emit(MacOutput::TxAcknowledged {
                destination: entry.destination(),
                sequence,
            });
        }
    }

    fn give_up(&mut self, category: usize, entry: QueuedFrame, reason: GiveUpReason) {
        let stats = &mut self.stats.categories[category];
        match reason {
            GiveUpReason::RetryLimit => stats.given_up_retry_limit += 1,
            GiveUpReason::Lifetime => stats.given_up_lifetime += 1,
        }
        let destination = entry.destination();
        info!(
            category,
            %destination,
            seq = ?entry.frame.sequence,
            ?reason,
            "frame given up"
        );
        self.emit(MacOutput::LinkBreak {
            destination,
            frame: entry.into_frame(),
            reason,
        });
    }

    /// Runs every frame of a failed transmission through the retry policy.
    /// Returns the frames to send again; the rest have been given up.
    ///
    /// 将失败发送的每个帧交给重传策略处理。返回需要重新发送的帧；其余已被放弃。
    fn judge_failed(&mut self, category: usize, frames: Vec<QueuedFrame>, now: Instant) -> Vec<QueuedFrame> {
        let mut retried = Vec::new();
        for mut entry in frames {
            match self.retry.on_frame_failed(&mut entry, now) {
                RetryVerdict::Retry => retried.push(entry),
                RetryVerdict::GiveUp(reason) => {
                    self.queue.release(1);
                    self.give_up(category, entry, reason);
                }
            }
        }
        retried
    }

    /// The exchange completed: ACK received or multicast dwell over.
    /// 交换完成：收到ACK或组播驻留结束。
    pub(super) fn exchange_succeeded(&mut self, now: Instant) {
        let exchange = self.exchange.finish();
        let category = exchange.category;
        self.queue.release(exchange.frames.len());
        for entry in exchange.frames {
            self.record_delivered(category, entry, now);
        }
        self.retry.on_exchange_succeeded(&mut self.categories[category]);

        if self.try_chain_txop(category, now) {
            return;
        }
        self.txop = None;
        self.post_backoff(category);
        self.end_turn(now);
    }

    /// A Block-ACK answers the burst: acknowledged frames are done, the rest
    /// go back to the head of the queue or are given up.
    ///
    /// 块确认应答突发：已确认的帧完成，其余帧回到队首或被放弃。
    pub(super) fn block_ack_received(&mut self, info: BlockAckInfo, now: Instant) {
        let exchange = self.exchange.finish();
        let category = exchange.category;
        let Reconciliation { delivered, lost } = exchange.reconcile(&info);
        debug!(category, delivered = delivered.len(), lost = lost.len(), "block-ack reconciled");

        self.queue.release(delivered.len());
        for entry in delivered {
            self.record_delivered(category, entry, now);
        }
        self.retry.on_exchange_succeeded(&mut self.categories[category]);

        let retried = self.judge_failed(category, lost, now);
        if !retried.is_empty() {
            self.stats.categories[category].retries += 1;
            invariant(self.queue.requeue_front(category, retried));
        }
        self.txop = None;
        self.post_backoff(category);
        self.end_turn(now);
    }

    /// The exchange failed (timeout, damaged or unexpected frame). Retried
    /// frames return to the head of the queue and the window doubles; if every
    /// frame was given up the window is left alone.
    ///
    /// 交换失败（超时、损坏或意外的帧）。重传的帧回到队首且窗口加倍；如果所有帧都被放弃，则窗口保持不变。
    pub(super) fn exchange_failed(&mut self, now: Instant) {
        self.txop = None;
        let exchange = self.exchange.finish();
        let category = exchange.category;
        let retried = self.judge_failed(category, exchange.frames, now);

        if retried.is_empty() {
            self.retry.on_exchange_abandoned(&mut self.categories[category]);
        } else {
            self.stats.categories[category].retries += 1;
            self.retry.on_exchange_retried(&mut self.categories[category]);
            invariant(self.queue.requeue_front(category, retried));
        }
        self.post_backoff(category);
        self.end_turn(now);
    }

    /// Chains the next frame of `category` a SIFS after the ACK when it fits in
    /// the remaining TXOP.
    ///
    /// 当 `category` 的下一帧能放入剩余TXOP时，在ACK之后间隔SIFS链接发送。
    fn try_chain_txop(&mut self, category: usize, now: Instant) -> bool {
        if !self.next_fits_txop(category, now) {
            return false;
        }
        let timer = self.timers.schedule(now + self.exchange.air().sifs(), MacTimer::Sifs);
        trace!(category, "continuing TXOP");
        self.transition(MacState::WaitSifs {
            timer,
            action: SifsAction::ContinueTxop { category },
        });
        true
    }

    fn next_fits_txop(&self, category: usize, now: Instant) -> bool {
        let Some(txop) = self.txop.filter(|txop| txop.category == category) else {
            return false;
        };
        let Some(head) = invariant(self.queue.peek_front(category)) else {
            return false;
        };
        let length = head.frame.byte_length();
        !head.frame.is_multicast()
            && length < self.rts_threshold
            && !self.retry.is_expired(head, now)
            && now + self.exchange.air().chained_exchange(length) <= txop.deadline
    }

    fn continue_txop(&mut self, category: usize, now: Instant) {
        // 在SIFS期间可能有帧被逐出或过期
        // the head may have changed during SIFS
        if !self.next_fits_txop(category, now)
            || !invariant(self.exchange.start(&mut self.queue, category, Protocol::DataAck))
        {
            self.txop = None;
            self.post_backoff(category);
            self.end_turn(now);
            return;
        }
        self.send_data(now);
    }
}
