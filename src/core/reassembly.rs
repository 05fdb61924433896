//! 接收端聚合突发重组与块确认记分板。
//! Receiver-side reassembly of aggregate bursts and Block-ACK scoreboards.
//!
//! Per transmitter, subframes of the current burst are buffered in sequence
//! order until the last-in-aggregate marker arrives. The scoreboard remembers
//! which sequence numbers arrived intact so a Block-ACK request can be
//! answered even after the buffer itself is gone.
//!
//! 对于每个发送方，当前突发的子帧按序列号顺序缓存，直到收到聚合中最后一帧的标记。
//! 记分板记录哪些序列号完好到达，使得即使缓冲区已被销毁，也能应答块确认请求。

use crate::{
    packet::{BlockAckInfo, DataFrame, MacAddress, SequenceNumber},
    timer::{TimerQueue, TimerToken},
};
use std::collections::{BTreeMap, HashMap, HashSet, btree_map::Entry};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

#[derive(Debug)]
struct PendingFrame {
    frame: DataFrame,
    has_error: bool,
}

/// Buffered subframes of one in-flight burst.
/// 一个在途突发的缓存子帧。
#[derive(Debug)]
struct ReceiveAggregationState {
    burst_id: u32,
    base: SequenceNumber,
    pending: BTreeMap<i32, PendingFrame>,
    last_activity: Instant,
    flush: Option<TimerToken>,
}

impl ReceiveAggregationState {
    fn new(burst_id: u32, base: SequenceNumber, now: Instant) -> Self {
        Self {
            burst_id,
            base,
            pending: BTreeMap::new(),
            last_activity: now,
            flush: None,
        }
    }

    /// Pops buffered frames in order up to the first erroneous one.
    /// 按顺序弹出缓存的帧，直到第一个错误帧。
    fn deliver_leading(&mut self) -> Vec<DataFrame> {
        let mut delivered = Vec::new();
        while let Some(entry) = self.pending.first_entry() {
            if entry.get().has_error {
                break;
            }
            delivered.push(entry.remove().frame);
        }
        delivered
    }

    /// Pops every error-free frame and discards the erroneous ones.
    /// 弹出所有无错误的帧并丢弃错误帧。
    fn drain_error_free(&mut self) -> (Vec<DataFrame>, usize) {
        let mut discarded = 0;
        let delivered = std::mem::take(&mut self.pending)
            .into_values()
            .filter_map(|p| {
                if p.has_error {
                    discarded += 1;
                    None
                } else {
                    Some(p.frame)
                }
            })
            .collect();
        (delivered, discarded)
    }
}

/// Sequence numbers of the current burst that arrived intact.
/// 当前突发中完好到达的序列号。
#[derive(Debug)]
struct Scoreboard {
    burst_id: u32,
    received: HashSet<SequenceNumber>,
    last_activity: Instant,
}

/// Tracks in-flight aggregate bursts per transmitter.
/// 按发送方跟踪在途的聚合突发。
#[derive(Debug)]
pub struct AggregationReassembler {
    flush_timeout: Duration,
    stale_threshold: Duration,
    states: HashMap<MacAddress, ReceiveAggregationState>,
    scoreboards: HashMap<MacAddress, Scoreboard>,
    flush_timers: TimerQueue<MacAddress>,
}

impl AggregationReassembler {
    pub fn new(flush_timeout: Duration, stale_threshold: Duration) -> Self {
        Self {
            flush_timeout,
            stale_threshold,
            states: HashMap::new(),
            scoreboards: HashMap::new(),
            flush_timers: TimerQueue::new(),
        }
    }

    /// Accepts one received subframe and returns the frames that became
    /// deliverable, in sequence order.
    ///
    /// 接收一个子帧，并按序列号顺序返回变为可交付的帧。
    pub fn on_subframe(&mut self, frame: DataFrame, has_error: bool, now: Instant) -> Vec<DataFrame> {
        self.purge_stale(now);

        let (Some(tag), Some(seq)) = (frame.aggregate, frame.sequence) else {
            debug!(transmitter = %frame.transmitter, "subframe without aggregate tag or sequence dropped");
            return Vec::new();
        };
        let transmitter = frame.transmitter;
        let mut delivered = Vec::new();

        if self
            .states
            .get(&transmitter)
            .is_some_and(|state| state.burst_id != tag.burst_id)
        {
            delivered.extend(self.flush(transmitter));
        }

        let board = self
            .scoreboards
            .entry(transmitter)
            .or_insert_with(|| Scoreboard {
                burst_id: tag.burst_id,
                received: HashSet::new(),
                last_activity: now,
            });
        if board.burst_id != tag.burst_id {
            board.burst_id = tag.burst_id;
            board.received.clear();
        }
        board.last_activity = now;
        let already_intact = board.received.contains(&seq);
        if !has_error {
            board.received.insert(seq);
        }

        let state = self
            .states
            .entry(transmitter)
            .or_insert_with(|| ReceiveAggregationState::new(tag.burst_id, seq, now));
        state.last_activity = now;

        if already_intact {
            trace!(%transmitter, %seq, "subframe already received intact, dropped");
        } else {
            let key = seq.signed_offset_from(state.base);
            match state.pending.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(PendingFrame { frame, has_error });
                }
                Entry::Occupied(mut slot) => {
                    if slot.get().has_error && !has_error {
                        trace!(%transmitter, %seq, "erroneous subframe replaced by a correct copy");
                        slot.insert(PendingFrame { frame, has_error });
                    }
                }
            }
        }

        if tag.last {
            delivered.extend(self.close_burst(transmitter, now));
        }
        delivered
    }

    /// Answers a Block-ACK request. The request also closes the burst, in case
    /// its last subframe was lost.
    ///
    /// 应答块确认请求。该请求同时结束突发，以防其最后一个子帧丢失。
    pub fn on_block_ack_request(
        &mut self,
        transmitter: MacAddress,
        starting_sequence: SequenceNumber,
        now: Instant,
    ) -> (BlockAckInfo, Vec<DataFrame>) {
        self.purge_stale(now);
        let delivered = if self.states.contains_key(&transmitter) {
            self.close_burst(transmitter, now)
        } else {
            Vec::new()
        };
        let info = match self.scoreboards.get_mut(&transmitter) {
            Some(board) => {
                board.last_activity = now;
                BlockAckInfo::from_received(starting_sequence, board.received.iter().copied())
            }
            None => BlockAckInfo::new(starting_sequence),
        };
        debug!(%transmitter, start = %starting_sequence, bitmap = info.bitmap, "block-ack prepared");
        (info, delivered)
    }

    fn close_burst(&mut self, transmitter: MacAddress, now: Instant) -> Vec<DataFrame> {
        let Some(state) = self.states.get_mut(&transmitter) else {
            return Vec::new();
        };
        let delivered = state.deliver_leading();
        if state.pending.is_empty() {
            if let Some(state) = self.states.remove(&transmitter) {
                if let Some(token) = state.flush {
                    self.flush_timers.cancel(token);
                }
            }
            trace!(%transmitter, delivered = delivered.len(), "burst complete");
        } else if state.flush.is_none() {
            let at = now + self.flush_timeout;
            state.flush = Some(self.flush_timers.schedule(at, transmitter));
            trace!(%transmitter, waiting = state.pending.len(), "trailing subframes kept until flush");
        }
        delivered
    }

    /// Tears down the state of `transmitter`, returning its error-free frames.
    /// 拆除 `transmitter` 的状态，返回其无错误的帧。
    pub fn flush(&mut self, transmitter: MacAddress) -> Vec<DataFrame> {
        let Some(mut state) = self.states.remove(&transmitter) else {
            return Vec::new();
        };
        if let Some(token) = state.flush.take() {
            self.flush_timers.cancel(token);
        }
        let (delivered, discarded) = state.drain_error_free();
        debug!(%transmitter, delivered = delivered.len(), discarded, "reassembly state flushed");
        delivered
    }

    pub fn next_flush_deadline(&self) -> Option<Instant> {
        self.flush_timers.next_deadline()
    }

    /// Fires the earliest flush timer due at `now`, if any.
    /// 触发在 `now` 到期的最早刷新定时器（如果有）。
    pub fn on_flush_timer(&mut self, now: Instant) -> Option<Vec<DataFrame>> {
        let (token, _, transmitter) = self.flush_timers.pop_due(now)?;
        if let Some(state) = self.states.get_mut(&transmitter) {
            if state.flush == Some(token) {
                state.flush = None;
            }
        }
        Some(self.flush(transmitter))
    }

    /// Drops the state of transmitters idle for longer than the stale threshold.
    /// 丢弃空闲时间超过陈旧阈值的发送方状态。
    pub fn purge_stale(&mut self, now: Instant) {
        let threshold = self.stale_threshold;
        let is_stale = |last: Instant| now.saturating_duration_since(last) > threshold;

        let stale: Vec<MacAddress> = self
            .states
            .iter()
            .filter(|(_, s)| is_stale(s.last_activity))
            .map(|(addr, _)| *addr)
            .collect();
        for transmitter in stale {
            if let Some(state) = self.states.remove(&transmitter) {
                if let Some(token) = state.flush {
                    self.flush_timers.cancel(token);
                }
                debug!(%transmitter, dropped = state.pending.len(), "stale reassembly state purged");
            }
        }
        self.scoreboards.retain(|_, board| !is_stale(board.last_activity));
    }

    pub fn has_state(&self, transmitter: MacAddress) -> bool {
        self.states.contains_key(&transmitter)
    }

    pub fn pending_len(&self, transmitter: MacAddress) -> usize {
        self.states
            .get(&transmitter)
            .map_or(0, |state| state.pending.len())
    }
}
