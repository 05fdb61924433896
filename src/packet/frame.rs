//! 定义了信道接入引擎处理的所有MAC帧类型。
//! Defines every MAC frame kind handled by the channel-access engine.
//!
//! Frames are a closed sum type so each handler matches exhaustively.
//!
//! 帧是一个封闭的和类型，因此每个处理程序都进行穷尽匹配。

use super::{address::MacAddress, block_ack::BlockAckInfo, sequence::SequenceNumber};
use bytes::Bytes;
use std::time::Duration;

/// MAC header plus FCS of a data or management frame.
/// 数据帧或管理帧的MAC头加FCS。
pub const DATA_HEADER_LEN: usize = 28;
pub const RTS_LEN: usize = 20;
pub const CTS_LEN: usize = 14;
pub const ACK_LEN: usize = 14;
pub const BLOCK_ACK_REQUEST_LEN: usize = 24;
pub const BLOCK_ACK_LEN: usize = 32;
/// An MPDU delimiter in front of every subframe of an aggregate.
/// 聚合中每个子帧前的MPDU分隔符。
pub const DELIMITER_LEN: usize = 4;

/// Marks a data frame as part of an aggregate burst.
/// 标记数据帧属于某个聚合突发。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateTag {
    /// Identifies the burst; kept unchanged when frames of the burst are retried.
    /// 标识突发；突发中的帧重传时保持不变。
    pub burst_id: u32,
    /// Set on the last frame of the burst.
    /// 在突发的最后一帧上置位。
    pub last: bool,
}

/// Whether a queued MPDU is a data or a management frame.
/// 排队的MPDU是数据帧还是管理帧。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    Data,
    Management,
}

impl FrameClass {
    /// Wraps a body into the frame variant of this class.
    /// 将帧体包装为该类别对应的帧变体。
    pub fn wrap(self, body: DataFrame) -> Frame {
        match self {
            FrameClass::Data => Frame::Data(body),
            FrameClass::Management => Frame::Management(body),
        }
    }
}

/// Body shared by data and management frames.
/// 数据帧和管理帧共享的帧体。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub receiver: MacAddress,
    pub transmitter: MacAddress,
    /// Assigned when the frame first enters a frame exchange.
    /// 在帧首次进入帧交换时分配。
    pub sequence: Option<SequenceNumber>,
    /// The retry bit of the frame-control field.
    /// 帧控制字段中的重传位。
    pub retry: bool,
    /// How many times this frame has been retransmitted.
    /// 该帧已被重传的次数。
    pub retry_count: u32,
    /// 802.1D user priority (0-7) used to pick the access category.
    /// 用于选择接入类别的802.1D用户优先级（0-7）。
    pub priority: u8,
    /// NAV reservation carried in the duration field.
    /// 持续时间字段中携带的NAV预留。
    pub duration: Duration,
    pub aggregate: Option<AggregateTag>,
    pub payload: Bytes,
}

impl DataFrame {
    pub fn new(receiver: MacAddress, transmitter: MacAddress, payload: Bytes) -> Self {
        Self {
            receiver,
            transmitter,
            sequence: None,
            retry: false,
            retry_count: 0,
            priority: 0,
            duration: Duration::ZERO,
            aggregate: None,
            payload,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn byte_length(&self) -> usize {
        DATA_HEADER_LEN + self.payload.len()
    }

    pub fn is_multicast(&self) -> bool {
        self.receiver.is_multicast()
    }

    pub fn is_last_in_aggregate(&self) -> bool {
        self.aggregate.is_some_and(|tag| tag.last)
    }
}

/// RTS, CTS and ACK share this layout.
/// RTS、CTS和ACK共享此布局。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFrame {
    pub receiver: MacAddress,
    pub transmitter: MacAddress,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockAckRequestFrame {
    pub receiver: MacAddress,
    pub transmitter: MacAddress,
    pub starting_sequence: SequenceNumber,
    pub burst_id: u32,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockAckFrame {
    pub receiver: MacAddress,
    pub transmitter: MacAddress,
    pub info: BlockAckInfo,
}

/// One subframe of an aggregate burst, carried behind its delimiter.
/// 聚合突发的一个子帧，位于其分隔符之后。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpduDelimiter {
    pub frame: DataFrame,
    /// Delimiter plus subframe, padded to a 4-byte boundary.
    /// 分隔符加子帧，填充到4字节边界。
    pub padded_length: usize,
}

impl MpduDelimiter {
    pub fn new(frame: DataFrame) -> Self {
        let padded_length = DELIMITER_LEN + frame.byte_length().next_multiple_of(4);
        Self {
            frame,
            padded_length,
        }
    }
}

/// A MAC frame as exchanged with the channel.
///
/// 与信道交换的MAC帧。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(DataFrame),
    Management(DataFrame),
    Rts(ControlFrame),
    Cts(ControlFrame),
    Ack(ControlFrame),
    BlockAckRequest(BlockAckRequestFrame),
    BlockAck(BlockAckFrame),
    MpduDelimiter(MpduDelimiter),
}

impl Frame {
    /// Creates a new ACK frame.
    /// 创建一个新的ACK帧。
    pub fn new_ack(receiver: MacAddress, transmitter: MacAddress) -> Self {
        Frame::Ack(ControlFrame {
            receiver,
            transmitter,
            duration: Duration::ZERO,
        })
    }

    /// Creates a new CTS frame.
    /// 创建一个新的CTS帧。
    pub fn new_cts(receiver: MacAddress, transmitter: MacAddress, duration: Duration) -> Self {
        Frame::Cts(ControlFrame {
            receiver,
            transmitter,
            duration,
        })
    }

    /// Creates a new RTS frame.
    /// 创建一个新的RTS帧。
    pub fn new_rts(receiver: MacAddress, transmitter: MacAddress, duration: Duration) -> Self {
        Frame::Rts(ControlFrame {
            receiver,
            transmitter,
            duration,
        })
    }

    pub fn new_block_ack(receiver: MacAddress, transmitter: MacAddress, info: BlockAckInfo) -> Self {
        Frame::BlockAck(BlockAckFrame {
            receiver,
            transmitter,
            info,
        })
    }

    pub fn receiver(&self) -> MacAddress {
        match self {
            Frame::Data(f) | Frame::Management(f) => f.receiver,
            Frame::Rts(c) | Frame::Cts(c) | Frame::Ack(c) => c.receiver,
            Frame::BlockAckRequest(r) => r.receiver,
            Frame::BlockAck(b) => b.receiver,
            Frame::MpduDelimiter(d) => d.frame.receiver,
        }
    }

    pub fn transmitter(&self) -> MacAddress {
        match self {
            Frame::Data(f) | Frame::Management(f) => f.transmitter,
            Frame::Rts(c) | Frame::Cts(c) | Frame::Ack(c) => c.transmitter,
            Frame::BlockAckRequest(r) => r.transmitter,
            Frame::BlockAck(b) => b.transmitter,
            Frame::MpduDelimiter(d) => d.frame.transmitter,
        }
    }

    /// The NAV reservation this frame announces.
    /// 该帧宣告的NAV预留。
    pub fn duration(&self) -> Duration {
        match self {
            Frame::Data(f) | Frame::Management(f) => f.duration,
            Frame::Rts(c) | Frame::Cts(c) | Frame::Ack(c) => c.duration,
            Frame::BlockAckRequest(r) => r.duration,
            Frame::BlockAck(_) => Duration::ZERO,
            Frame::MpduDelimiter(d) => d.frame.duration,
        }
    }

    pub fn byte_length(&self) -> usize {
        match self {
            Frame::Data(f) | Frame::Management(f) => f.byte_length(),
            Frame::Rts(_) => RTS_LEN,
            Frame::Cts(_) => CTS_LEN,
            Frame::Ack(_) => ACK_LEN,
            Frame::BlockAckRequest(_) => BLOCK_ACK_REQUEST_LEN,
            Frame::BlockAck(_) => BLOCK_ACK_LEN,
            Frame::MpduDelimiter(d) => d.padded_length,
        }
    }

    /// Short name used in log lines.
    /// 用于日志行的简称。
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Data(_) => "DATA",
            Frame::Management(_) => "MGMT",
            Frame::Rts(_) => "RTS",
            Frame::Cts(_) => "CTS",
            Frame::Ack(_) => "ACK",
            Frame::BlockAckRequest(_) => "BAR",
            Frame::BlockAck(_) => "BA",
            Frame::MpduDelimiter(_) => "AMPDU",
        }
    }

    /// The data/management body, if this frame carries one.
    /// 如果该帧携带数据/管理帧体，则返回它。
    pub fn body(&self) -> Option<&DataFrame> {
        match self {
            Frame::Data(f) | Frame::Management(f) => Some(f),
            Frame::MpduDelimiter(d) => Some(&d.frame),
            _ => None,
        }
    }

    /// Splits a data or management frame into its class and body.
    /// 将数据帧或管理帧拆分为类别和帧体。
    pub fn into_queueable(self) -> Option<(FrameClass, DataFrame)> {
        match self {
            Frame::Data(f) => Some((FrameClass::Data, f)),
            Frame::Management(f) => Some((FrameClass::Management, f)),
            _ => None,
        }
    }
}
