//! 接收端重复帧检测。
//! Receive-side duplicate detection.

use crate::packet::{DataFrame, MacAddress, SequenceNumber};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct LastSeen {
    sequence: SequenceNumber,
    at: Instant,
}

/// Remembers the last sequence number seen from each transmitter.
///
/// A frame is a duplicate when its retry bit is set and it repeats the last
/// sequence number of its transmitter.
///
/// 记住每个发送方最后看到的序列号。当帧的重传位被置位且重复了其发送方的最后序列号时，该帧为重复帧。
#[derive(Debug)]
pub struct DuplicateFilter {
    timeout: Duration,
    last_seen: HashMap<MacAddress, LastSeen>,
}

impl DuplicateFilter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_seen: HashMap::new(),
        }
    }

    /// Records `frame` and reports whether it was already seen.
    /// 记录 `frame` 并报告它是否已经见过。
    pub fn is_duplicate(&mut self, frame: &DataFrame, now: Instant) -> bool {
        let timeout = self.timeout;
        self.last_seen
            .retain(|_, seen| now.saturating_duration_since(seen.at) <= timeout);

        // group-addressed frames are never retried and must not displace the
        // unicast entry of their transmitter
        if frame.receiver.is_multicast() {
            return false;
        }

        let Some(sequence) = frame.sequence else {
            return false;
        };
        let duplicate = frame.retry
            && self
                .last_seen
                .get(&frame.transmitter)
                .is_some_and(|seen| seen.sequence == sequence);
        self.last_seen
            .insert(frame.transmitter, LastSeen { sequence, at: now });
        duplicate
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}
