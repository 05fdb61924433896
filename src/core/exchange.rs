//! 帧交换控制器：选择子协议、构建帧并核对块确认。
//! Frame exchange controller: picks the sub-protocol, builds the frames and
//! reconciles Block-ACKs.
//!
//! At most one exchange is active per MAC instance. The active exchange owns
//! the frames it is sending; they go back to the queue only through retry
//! handling.
//!
//! 每个MAC实例最多有一个活动交换。活动交换拥有正在发送的帧；这些帧只能通过重传处理回到队列。

use super::queue::{QueuedFrame, TransmissionQueue};
use crate::{
    config::{AggregationConfig, BlockAckPolicy, Config},
    error::Result,
    packet::{
        AggregateTag, BlockAckInfo, BlockAckRequestFrame, ControlFrame, Frame, FrameClass,
        MacAddress, MpduDelimiter, SequenceNumber, block_ack::BLOCK_ACK_WINDOW,
    },
    phy::{AirTime, TxTime},
};
use std::time::Duration;
use tracing::{debug, trace};

/// The sub-protocol run for one transmission opportunity.
/// 单个发送机会所运行的子协议。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// DATA, then ACK.
    DataAck,
    /// RTS, CTS, DATA, ACK.
    RtsCts,
    /// Group-addressed DATA without acknowledgement.
    /// 无确认的组播数据。
    Multicast,
    /// An MPDU-A burst closed by a Block-ACK, optionally protected by RTS/CTS.
    /// 以块确认结束的MPDU-A突发，可选地由RTS/CTS保护。
    Aggregate { rts: bool },
}

/// The frame exchange currently in progress.
/// 当前正在进行的帧交换。
#[derive(Debug)]
pub struct ActiveExchange {
    pub category: usize,
    pub protocol: Protocol,
    /// One frame, or the subframes of a burst in transmission order.
    /// 一个帧，或按发送顺序排列的突发子帧。
    pub frames: Vec<QueuedFrame>,
    pub burst_id: Option<u32>,
    /// The burst was sent and its Block-ACK request waits for a contention round.
    /// 突发已发送，其块确认请求等待一个竞争轮次。
    pub bar_pending: bool,
}

impl ActiveExchange {
    fn head(&self) -> &QueuedFrame {
        match self.frames.first() {
            Some(head) => head,
            None => panic!("frame exchange in category {} holds no frames", self.category),
        }
    }

    pub fn destination(&self) -> MacAddress {
        self.head().destination()
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.protocol, Protocol::Aggregate { .. })
    }

    /// Sequence number of the first subframe; the Block-ACK window starts here.
    /// 第一个子帧的序列号；块确认窗口从这里开始。
    pub fn starting_sequence(&self) -> SequenceNumber {
        self.head().frame.sequence.unwrap_or_default()
    }

    pub fn byte_length(&self) -> usize {
        self.head().frame.byte_length()
    }

    /// Splits the frames of a burst into delivered and lost according to a
    /// Block-ACK: exactly the frames whose bit is set are delivered.
    ///
    /// 根据块确认将突发的帧拆分为已交付和已丢失：恰好是位被置位的帧被视为已交付。
    pub fn reconcile(self, info: &BlockAckInfo) -> Reconciliation {
        let (delivered, lost) = self.frames.into_iter().partition(|entry| {
            entry
                .frame
                .sequence
                .is_some_and(|seq| info.acknowledges(seq))
        });
        Reconciliation { delivered, lost }
    }
}

/// Result of matching a Block-ACK against the outstanding burst.
/// 将块确认与未完成突发匹配的结果。
#[derive(Debug)]
pub struct Reconciliation {
    pub delivered: Vec<QueuedFrame>,
    pub lost: Vec<QueuedFrame>,
}

/// Selects and sequences frame exchanges.
/// 选择并排序帧交换。
#[derive(Debug)]
pub struct FrameExchangeController<P> {
    address: MacAddress,
    air: AirTime<P>,
    rts_threshold: usize,
    aggregation: AggregationConfig,
    active: Option<ActiveExchange>,
    next_sequence: SequenceNumber,
    next_burst_id: u32,
    consecutive_aggregates: Vec<u32>,
}

impl<P: TxTime> FrameExchangeController<P> {
    pub fn new(address: MacAddress, air: AirTime<P>, config: &Config) -> Self {
        Self {
            address,
            air,
            rts_threshold: config.retry.rts_threshold,
            aggregation: config.aggregation.clone(),
            active: None,
            next_sequence: SequenceNumber::new(0),
            next_burst_id: 0,
            consecutive_aggregates: vec![0; config.category_count()],
        }
    }

    pub fn air(&self) -> &AirTime<P> {
        &self.air
    }

    pub fn block_ack_policy(&self) -> BlockAckPolicy {
        self.aggregation.block_ack_policy
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&ActiveExchange> {
        self.active.as_ref()
    }

    /// The active exchange. Calling this without one is an internal-consistency
    /// violation.
    ///
    /// 活动交换。在没有活动交换时调用属于内部一致性违规。
    pub fn current(&self) -> &ActiveExchange {
        match &self.active {
            Some(exchange) => exchange,
            None => panic!("no frame exchange in progress"),
        }
    }

    /// Ends the active exchange and hands its frames back to the caller.
    /// 结束活动交换并将其帧交还给调用者。
    pub fn finish(&mut self) -> ActiveExchange {
        match self.active.take() {
            Some(exchange) => exchange,
            None => panic!("finishing a frame exchange while none is in progress"),
        }
    }

    /// Category whose burst waits for a delayed Block-ACK request round.
    /// 其突发正在等待延迟块确认请求轮次的类别。
    pub fn bar_pending_category(&self) -> Option<usize> {
        self.active
            .as_ref()
            .filter(|exchange| exchange.bar_pending)
            .map(|exchange| exchange.category)
    }

    pub fn mark_bar_pending(&mut self) {
        match self.active.as_mut() {
            Some(exchange) => exchange.bar_pending = true,
            None => panic!("no burst to acknowledge"),
        }
    }

    pub fn take_bar_pending(&mut self) {
        if let Some(exchange) = self.active.as_mut() {
            exchange.bar_pending = false;
        }
    }

    /// Picks the sub-protocol for the head frame of `category`.
    /// 为 `category` 的队首帧选择子协议。
    pub fn select_protocol(
        &self,
        queue: &TransmissionQueue,
        category: usize,
        head: &QueuedFrame,
    ) -> Result<Protocol> {
        if head.frame.is_multicast() {
            return Ok(Protocol::Multicast);
        }
        let consecutive = self.consecutive_aggregates.get(category).copied().unwrap_or(0);
        if self.aggregation.enabled
            && head.class == FrameClass::Data
            && consecutive < self.aggregation.max_consecutive_aggregates
            && queue.destination_count(category, head.destination())?
                >= self.aggregation.min_aggregate_frames
        {
            return Ok(Protocol::Aggregate {
                rts: self.aggregation.use_rts_for_aggregate,
            });
        }
        if head.frame.byte_length() >= self.rts_threshold {
            Ok(Protocol::RtsCts)
        } else {
            Ok(Protocol::DataAck)
        }
    }

    /// Checks the frames for `protocol` out of the queue and makes them the
    /// active exchange.
    ///
    /// Starting an exchange while another is active violates the
    /// single-exchange invariant and aborts.
    ///
    /// 从队列中签出 `protocol` 所需的帧并使其成为活动交换。
    /// 在另一个交换活动时启动交换违反单交换不变式并中止。
    pub fn start(
        &mut self,
        queue: &mut TransmissionQueue,
        category: usize,
        protocol: Protocol,
    ) -> Result<bool> {
        assert!(
            self.active.is_none(),
            "starting a frame exchange in category {category} while {:?} is still active",
            self.active.as_ref().map(|a| (a.category, a.protocol))
        );

        let mut frames = match protocol {
            Protocol::Aggregate { .. } => self.checkout_burst(queue, category)?,
            _ => queue.checkout_front(category)?.into_iter().collect(),
        };
        if frames.is_empty() {
            return Ok(false);
        }

        for entry in frames.iter_mut() {
            if entry.frame.sequence.is_none() {
                entry.frame.sequence = Some(self.next_sequence);
                self.next_sequence = self.next_sequence.next();
            }
            entry.frame.transmitter = self.address;
        }

        let burst_id = if let Protocol::Aggregate { .. } = protocol {
            let id = frames
                .iter()
                .find_map(|e| e.frame.aggregate.map(|tag| tag.burst_id))
                .unwrap_or_else(|| {
                    let id = self.next_burst_id;
                    self.next_burst_id = self.next_burst_id.wrapping_add(1);
                    id
                });
            let last = frames.len() - 1;
            for (i, entry) in frames.iter_mut().enumerate() {
                entry.frame.aggregate = Some(AggregateTag {
                    burst_id: id,
                    last: i == last,
                });
            }
            self.consecutive_aggregates[category] += 1;
            Some(id)
        } else {
            for entry in frames.iter_mut() {
                entry.frame.aggregate = None;
            }
            self.consecutive_aggregates[category] = 0;
            None
        };

        debug!(
            category,
            ?protocol,
            frames = frames.len(),
            destination = %frames[0].destination(),
            seq = ?frames[0].frame.sequence,
            ?burst_id,
            "frame exchange started"
        );
        self.active = Some(ActiveExchange {
            category,
            protocol,
            frames,
            burst_id,
            bar_pending: false,
        });
        Ok(true)
    }

    fn checkout_burst(&mut self, queue: &mut TransmissionQueue, category: usize) -> Result<Vec<QueuedFrame>> {
        let Some(head) = queue.peek_front(category)? else {
            return Ok(Vec::new());
        };
        let destination = head.destination();
        let mut prospective = self.next_sequence;
        let mut window_start: Option<SequenceNumber> = None;

        queue.checkout_matching(category, self.aggregation.max_aggregate_size, |entry| {
            if entry.destination() != destination
                || entry.class != FrameClass::Data
                || entry.frame.is_multicast()
            {
                return false;
            }
            let seq = entry.frame.sequence.unwrap_or(prospective);
            let start = *window_start.get_or_insert(seq);
            if seq.offset_from(start) >= BLOCK_ACK_WINDOW {
                trace!(%seq, %start, "frame outside block-ack window, left for a later burst");
                return false;
            }
            if entry.frame.sequence.is_none() {
                prospective = prospective.next();
            }
            true
        })
    }

    /// A copy of a queued frame for the air, with its NAV reservation filled in.
    /// 队列帧的空中副本，并填入其NAV预留。
    pub fn data_frame(&self, entry: &QueuedFrame) -> Frame {
        let mut body = entry.frame.clone();
        body.duration = if body.is_multicast() {
            Duration::ZERO
        } else {
            self.air.data_duration()
        };
        entry.class.wrap(body)
    }

    /// The head data frame of the active exchange.
    /// 活动交换的队首数据帧。
    pub fn current_data_frame(&self) -> Frame {
        self.data_frame(self.current().head())
    }

    /// Subframe `index` of the active burst behind its MPDU delimiter.
    /// 活动突发中位于MPDU分隔符之后的第 `index` 个子帧。
    pub fn subframe(&self, index: usize) -> Option<Frame> {
        let exchange = self.current();
        let entry = exchange.frames.get(index)?;
        let remaining: Duration = exchange.frames[index + 1..]
            .iter()
            .map(|e| self.air.data(MpduDelimiter::new(e.frame.clone()).padded_length, false))
            .sum();
        let mut body = entry.frame.clone();
        body.duration = remaining + self.trailing_block_ack_time();
        Some(Frame::MpduDelimiter(MpduDelimiter::new(body)))
    }

    fn trailing_block_ack_time(&self) -> Duration {
        match self.aggregation.block_ack_policy {
            BlockAckPolicy::Immediate => {
                self.air.sifs() + self.air.block_ack_request() + self.air.sifs() + self.air.block_ack()
            }
            BlockAckPolicy::Delayed => Duration::ZERO,
        }
    }

    /// Airtime the active exchange still needs after its RTS.
    /// 活动交换在RTS之后仍需要的空口时间。
    fn protected_airtime(&self) -> Duration {
        let exchange = self.current();
        if exchange.is_aggregate() {
            let burst: Duration = exchange
                .frames
                .iter()
                .map(|e| self.air.data(MpduDelimiter::new(e.frame.clone()).padded_length, false))
                .sum();
            self.air.sifs() * 2 + self.air.cts() + burst + self.trailing_block_ack_time()
        } else {
            self.air.rts_duration(exchange.byte_length())
        }
    }

    pub fn rts_frame(&self) -> Frame {
        let exchange = self.current();
        Frame::new_rts(exchange.destination(), self.address, self.protected_airtime())
    }

    pub fn block_ack_request(&self) -> Frame {
        let exchange = self.current();
        Frame::BlockAckRequest(BlockAckRequestFrame {
            receiver: exchange.destination(),
            transmitter: self.address,
            starting_sequence: exchange.starting_sequence(),
            burst_id: exchange.burst_id.unwrap_or_default(),
            duration: self.air.block_ack_request_duration(),
        })
    }

    pub fn ack_for(&self, receiver: MacAddress) -> Frame {
        Frame::new_ack(receiver, self.address)
    }

    pub fn cts_for(&self, rts: &ControlFrame) -> Frame {
        Frame::new_cts(rts.transmitter, self.address, self.air.cts_duration(rts.duration))
    }

    pub fn block_ack_for(&self, receiver: MacAddress, info: BlockAckInfo) -> Frame {
        Frame::new_block_ack(receiver, self.address, info)
    }

    /// Airtime of the subframe at `index` of the active burst.
    /// 活动突发中第 `index` 个子帧的空口时间。
    pub fn subframe_airtime(&self, index: usize) -> Option<Duration> {
        let entry = self.current().frames.get(index)?;
        Some(self.air.data(MpduDelimiter::new(entry.frame.clone()).padded_length, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::DataFrame;
    use bytes::Bytes;
    use tokio::time::Instant;

    fn queued(dest: u32, seq: Option<u16>, now: Instant) -> QueuedFrame {
        let mut frame = DataFrame::new(
            MacAddress::from_station_id(dest),
            MacAddress::from_station_id(1),
            Bytes::from_static(b"0123456789"),
        );
        frame.sequence = seq.map(SequenceNumber::new);
        QueuedFrame::new(FrameClass::Data, frame, now)
    }

    fn burst(seqs: &[u16]) -> ActiveExchange {
        let now = Instant::now();
        ActiveExchange {
            category: 0,
            protocol: Protocol::Aggregate { rts: false },
            frames: seqs.iter().map(|&s| queued(2, Some(s), now)).collect(),
            burst_id: Some(1),
            bar_pending: false,
        }
    }

    #[test]
    fn test_reconcile_marks_exactly_the_acknowledged_frames() {
        let exchange = burst(&[10, 11, 12, 13, 14]);
        // bits 0, 1 and 3: frames 1, 2 and 4 of the burst
        let info = BlockAckInfo {
            starting_sequence: SequenceNumber::new(10),
            bitmap: 0b1011,
        };
        let result = exchange.reconcile(&info);
        let seqs = |v: &Vec<QueuedFrame>| -> Vec<u16> {
            v.iter().map(|e| e.frame.sequence.unwrap().value()).collect()
        };
        assert_eq!(seqs(&result.delivered), vec![10, 11, 13]);
        assert_eq!(seqs(&result.lost), vec![12, 14]);
    }

    #[test]
    fn test_reconcile_with_later_starting_sequence() {
        let exchange = burst(&[4094, 4095, 0, 1]);
        // 从4095开始的窗口：第4094帧不在窗口内
        let info = BlockAckInfo::from_received(
            SequenceNumber::new(4095),
            [4095, 0, 1].into_iter().map(SequenceNumber::new),
        );
        let result = exchange.reconcile(&info);
        assert_eq!(result.delivered.len(), 3);
        assert_eq!(result.lost.len(), 1);
        assert_eq!(result.lost[0].frame.sequence, Some(SequenceNumber::new(4094)));
    }

    #[test]
    fn test_burst_respects_block_ack_window() {
        let config = Config::default();
        let now = Instant::now();
        let mut queue = TransmissionQueue::new(config.category_count(), 100);
        let mut controller = FrameExchangeController::new(
            MacAddress::from_station_id(1),
            AirTime::new(crate::phy::FixedRatePhy::default(), &config.timing),
            &config,
        );
        controller.next_sequence = SequenceNumber::new(200);

        // A retried frame far behind the sequence counter opens the window.
        queue.enqueue(1, queued(2, Some(100), now)).unwrap();
        for _ in 0..3 {
            queue.enqueue(1, queued(2, None, now)).unwrap();
        }
        queue.enqueue(1, queued(3, None, now)).unwrap();

        let started = controller
            .start(&mut queue, 1, Protocol::Aggregate { rts: false })
            .unwrap();
        assert!(started);
        let exchange = controller.current();
        assert_eq!(exchange.frames.len(), 1);
        assert!(exchange.frames[0].frame.is_last_in_aggregate());
        assert_eq!(queue.size(1).unwrap(), 4);
    }

    #[test]
    fn test_burst_assigns_sequences_and_tags() {
        let config = Config::default();
        let now = Instant::now();
        let mut queue = TransmissionQueue::new(config.category_count(), 100);
        let mut controller = FrameExchangeController::new(
            MacAddress::from_station_id(1),
            AirTime::new(crate::phy::FixedRatePhy::default(), &config.timing),
            &config,
        );
        for dest in [2, 3, 2, 2] {
            queue.enqueue(1, queued(dest, None, now)).unwrap();
        }
        let head = queue.peek_front(1).unwrap().unwrap().clone();
        let protocol = controller.select_protocol(&queue, 1, &head).unwrap();
        assert_eq!(protocol, Protocol::Aggregate { rts: false });

        controller.start(&mut queue, 1, protocol).unwrap();
        let exchange = controller.current();
        let seqs: Vec<u16> = exchange
            .frames
            .iter()
            .map(|e| e.frame.sequence.unwrap().value())
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        let lasts: Vec<bool> = exchange
            .frames
            .iter()
            .map(|e| e.frame.is_last_in_aggregate())
            .collect();
        assert_eq!(lasts, vec![false, false, true]);
        assert_eq!(queue.in_flight(), 3);
    }

    #[test]
    #[should_panic(expected = "still active")]
    fn test_second_exchange_is_fatal() {
        let config = Config::dcf();
        let now = Instant::now();
        let mut queue = TransmissionQueue::new(1, 10);
        let mut controller = FrameExchangeController::new(
            MacAddress::from_station_id(1),
            AirTime::new(crate::phy::FixedRatePhy::default(), &config.timing),
            &config,
        );
        queue.enqueue(0, queued(2, None, now)).unwrap();
        queue.enqueue(0, queued(2, None, now)).unwrap();
        controller.start(&mut queue, 0, Protocol::DataAck).unwrap();
        let _ = controller.start(&mut queue, 0, Protocol::DataAck);
    }
}
