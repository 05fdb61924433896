//! 按接入类别划分的发送队列。
//! The per-access-category transmission queue.
//!
//! FIFO within a category. The queue owns every waiting frame; a frame handed
//! to a frame exchange is checked out (moved to the exchange) but keeps counting
//! against the capacity until it is released or requeued.
//!
//! 类别内先进先出。队列拥有所有等待中的帧；交给帧交换的帧被签出（移动到交换中），
//! 但在释放或重新入队之前仍计入容量。

use crate::{
    error::{Error, Result},
    packet::{DataFrame, Frame, FrameClass, MacAddress},
};
use std::collections::{HashMap, VecDeque};
use tokio::time::Instant;
use tracing::{debug, trace};

/// A frame waiting in (or checked out of) the transmission queue.
/// 在发送队列中等待（或已签出）的帧。
#[derive(Debug, Clone)]
pub struct QueuedFrame {
    pub class: FrameClass,
    pub frame: DataFrame,
    /// Start of the frame's lifetime.
    /// 帧生存期的起点。
    pub enqueued_at: Instant,
    order: u64,
}

impl QueuedFrame {
    pub fn new(class: FrameClass, frame: DataFrame, enqueued_at: Instant) -> Self {
        Self {
            class,
            frame,
            enqueued_at,
            order: 0,
        }
    }

    pub fn destination(&self) -> MacAddress {
        self.frame.receiver
    }

    pub fn into_frame(self) -> Frame {
        self.class.wrap(self.frame)
    }
}

/// A frame removed to make room for a newer one.
/// 为给新帧腾出空间而被移除的帧。
#[derive(Debug)]
pub struct Evicted {
    pub category: usize,
    pub entry: QueuedFrame,
}

#[derive(Debug, Default)]
struct CategoryQueue {
    frames: VecDeque<QueuedFrame>,
    destinations: HashMap<MacAddress, usize>,
}

impl CategoryQueue {
    fn push_back(&mut self, entry: QueuedFrame) {
        *self.destinations.entry(entry.destination()).or_insert(0) += 1;
        self.frames.push_back(entry);
    }

    fn push_front(&mut self, entry: QueuedFrame) {
        *self.destinations.entry(entry.destination()).or_insert(0) += 1;
        self.frames.push_front(entry);
    }

    fn remove(&mut self, index: usize) -> Option<QueuedFrame> {
        let entry = self.frames.remove(index)?;
        let destination = entry.destination();
        match self.destinations.get_mut(&destination) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.destinations.remove(&destination);
            }
            None => panic!(
                "destination count for {destination} would become negative: frame was queued without being counted"
            ),
        }
        Some(entry)
    }
}

/// The per-category FIFO queues with a shared capacity.
/// 共享容量的各类别先进先出队列。
#[derive(Debug)]
pub struct TransmissionQueue {
    categories: Vec<CategoryQueue>,
    capacity: usize,
    in_flight: usize,
    next_order: u64,
}

impl TransmissionQueue {
    pub fn new(category_count: usize, capacity: usize) -> Self {
        Self {
            categories: (0..category_count).map(|_| CategoryQueue::default()).collect(),
            capacity,
            in_flight: 0,
            next_order: 0,
        }
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames currently checked out by a frame exchange.
    /// 当前被帧交换签出的帧数。
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Frames waiting across all categories.
    /// 所有类别中等待的帧数。
    pub fn total_queued(&self) -> usize {
        self.categories.iter().map(|c| c.frames.len()).sum()
    }

    fn category(&self, index: usize) -> Result<&CategoryQueue> {
        let count = self.categories.len();
        self.categories
            .get(index)
            .ok_or(Error::InvalidCategory { index, count })
    }

    fn category_mut(&mut self, index: usize) -> Result<&mut CategoryQueue> {
        let count = self.categories.len();
        self.categories
            .get_mut(index)
            .ok_or(Error::InvalidCategory { index, count })
    }

    /// Appends a frame to its category.
    ///
    /// When the queue is full the single oldest waiting frame across all
    /// categories is evicted first and returned. If every slot is taken by
    /// frames in flight, the new frame is dropped with [`Error::QueueFull`].
    ///
    /// 将帧追加到其类别。队列已满时，先驱逐所有类别中最老的一个等待帧并返回它。
    /// 如果所有位置都被在途帧占用，则新帧以 [`Error::QueueFull`] 丢弃。
    pub fn enqueue(&mut self, category: usize, mut entry: QueuedFrame) -> Result<Option<Evicted>> {
        self.category(category)?;

        let mut evicted = None;
        if self.total_queued() + self.in_flight >= self.capacity {
            evicted = self.evict_oldest();
            if evicted.is_none() {
                debug!(category, in_flight = self.in_flight, "queue full, dropping new frame");
                return Err(Error::QueueFull);
            }
        }

        entry.order = self.next_order;
        self.next_order += 1;
        trace!(category, destination = %entry.destination(), order = entry.order, "enqueued frame");
        self.category_mut(category)?.push_back(entry);
        Ok(evicted)
    }

    fn evict_oldest(&mut self) -> Option<Evicted> {
        let (category, index) = self
            .categories
            .iter()
            .enumerate()
            .flat_map(|(c, q)| q.frames.iter().enumerate().map(move |(i, e)| (c, i, e.order)))
            .min_by_key(|&(_, _, order)| order)
            .map(|(c, i, _)| (c, i))?;
        let entry = self.categories[category].remove(index)?;
        debug!(category, destination = %entry.destination(), "evicted oldest frame");
        Some(Evicted { category, entry })
    }

    /// Removes the head of a category.
    /// 移除类别的队首帧。
    pub fn dequeue_front(&mut self, category: usize) -> Result<Option<QueuedFrame>> {
        Ok(self.category_mut(category)?.remove(0))
    }

    pub fn peek_front(&self, category: usize) -> Result<Option<&QueuedFrame>> {
        Ok(self.category(category)?.frames.front())
    }

    pub fn size(&self, category: usize) -> Result<usize> {
        Ok(self.category(category)?.frames.len())
    }

    pub fn is_empty(&self, category: usize) -> Result<bool> {
        Ok(self.category(category)?.frames.is_empty())
    }

    /// Waiting frames for `destination` in a category.
    /// 类别中发往 `destination` 的等待帧数。
    pub fn destination_count(&self, category: usize, destination: MacAddress) -> Result<usize> {
        Ok(self
            .category(category)?
            .destinations
            .get(&destination)
            .copied()
            .unwrap_or(0))
    }

    /// Sum of all per-destination counters of a category.
    /// 类别中所有目的地计数之和。
    pub fn counted_frames(&self, category: usize) -> Result<usize> {
        Ok(self.category(category)?.destinations.values().sum())
    }

    /// The highest-priority category that has a frame waiting.
    /// 有帧等待的最高优先级类别。
    pub fn highest_ready(&self) -> Option<usize> {
        self.categories.iter().rposition(|q| !q.frames.is_empty())
    }

    /// Moves the head of a category to the caller, keeping it counted as in flight.
    /// 将类别的队首帧移交给调用者，并将其计为在途。
    pub fn checkout_front(&mut self, category: usize) -> Result<Option<QueuedFrame>> {
        let entry = self.dequeue_front(category)?;
        if entry.is_some() {
            self.in_flight += 1;
        }
        Ok(entry)
    }

    /// Checks out up to `max` frames of a category, in FIFO order, for which
    /// `accept` returns true. Frames that are skipped stay where they are.
    ///
    /// 按先进先出顺序签出类别中最多 `max` 个 `accept` 返回真的帧，跳过的帧保持原位。
    pub fn checkout_matching<F>(&mut self, category: usize, max: usize, mut accept: F) -> Result<Vec<QueuedFrame>>
    where
        F: FnMut(&QueuedFrame) -> bool,
    {
        let queue = self.category_mut(category)?;
        let mut taken = Vec::new();
        let mut index = 0;
        while index < queue.frames.len() && taken.len() < max {
            if accept(&queue.frames[index]) {
                if let Some(entry) = queue.remove(index) {
                    taken.push(entry);
                }
            } else {
                index += 1;
            }
        }
        self.in_flight += taken.len();
        Ok(taken)
    }

    /// Puts checked-out frames back at the head of their category, preserving
    /// their relative order.
    ///
    /// 将已签出的帧放回类别队首，保持它们的相对顺序。
    pub fn requeue_front(&mut self, category: usize, frames: Vec<QueuedFrame>) -> Result<()> {
        let n = frames.len();
        self.release(n);
        let queue = self.category_mut(category)?;
        for entry in frames.into_iter().rev() {
            queue.push_front(entry);
        }
        Ok(())
    }

    /// Forgets `n` checked-out frames that were delivered or given up.
    /// 遗忘 `n` 个已交付或已放弃的签出帧。
    pub fn release(&mut self, n: usize) {
        assert!(
            n <= self.in_flight,
            "releasing {n} frames but only {} are in flight",
            self.in_flight
        );
        self.in_flight -= n;
    }
}
