//! 定义了块确认（Block-ACK）的起始序列号和位图。
//! Defines the Block-ACK starting sequence and bitmap.

use super::sequence::SequenceNumber;
use bytes::{Buf, BufMut};

/// Number of sequence numbers a single Block-ACK bitmap can cover.
/// 单个块确认位图可覆盖的序列号数量。
pub const BLOCK_ACK_WINDOW: u16 = 64;

/// The size of the starting-sequence-control field plus the bitmap on the wire.
/// 起始序列控制字段加位图在线路上的大小。
pub const BLOCK_ACK_INFO_SIZE: usize = 10; // u16 + u64

/// Acknowledgement state for a window of up to 64 sequence numbers.
///
/// Bit `k` of `bitmap` acknowledges sequence number `starting_sequence + k`.
///
/// 最多64个序列号窗口的确认状态。位图的第 `k` 位确认序列号 `starting_sequence + k`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockAckInfo {
    pub starting_sequence: SequenceNumber,
    pub bitmap: u64,
}

impl BlockAckInfo {
    /// An empty acknowledgement window starting at `starting_sequence`.
    /// 一个从 `starting_sequence` 开始的空确认窗口。
    pub fn new(starting_sequence: SequenceNumber) -> Self {
        Self {
            starting_sequence,
            bitmap: 0,
        }
    }

    /// Builds a window from the sequence numbers received correctly.
    /// Numbers outside the 64-entry window are ignored.
    ///
    /// 根据正确接收的序列号构建窗口，窗口外的序列号被忽略。
    pub fn from_received<I>(starting_sequence: SequenceNumber, received: I) -> Self
    where
        I: IntoIterator<Item = SequenceNumber>,
    {
        let mut info = Self::new(starting_sequence);
        for seq in received {
            info.mark(seq);
        }
        info
    }

    /// Marks `seq` as received. Returns `false` when it falls outside the window.
    /// 将 `seq` 标记为已接收。如果超出窗口则返回 `false`。
    pub fn mark(&mut self, seq: SequenceNumber) -> bool {
        let offset = seq.offset_from(self.starting_sequence);
        if offset >= BLOCK_ACK_WINDOW {
            return false;
        }
        self.bitmap |= 1u64 << offset;
        true
    }

    pub fn acknowledges(&self, seq: SequenceNumber) -> bool {
        let offset = seq.offset_from(self.starting_sequence);
        offset < BLOCK_ACK_WINDOW && self.bitmap & (1u64 << offset) != 0
    }

    pub fn acknowledged_count(&self) -> u32 {
        self.bitmap.count_ones()
    }

    /// Encodes the starting sequence control (sequence in the upper 12 bits,
    /// fragment number zero) followed by the bitmap, little-endian.
    ///
    /// 编码起始序列控制字段（高12位为序列号，分片号为零）和位图，小端序。
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16_le(self.starting_sequence.value() << 4);
        buf.put_u64_le(self.bitmap);
    }

    /// Decodes a Block-ACK information field. Returns `None` if the buffer is too short.
    /// 解码块确认信息字段。如果缓冲区太短则返回 `None`。
    pub fn decode<B: Buf>(buf: &mut B) -> Option<Self> {
        if buf.remaining() < BLOCK_ACK_INFO_SIZE {
            return None;
        }
        let control = buf.get_u16_le();
        let bitmap = buf.get_u64_le();
        Some(Self {
            starting_sequence: SequenceNumber::new(control >> 4),
            bitmap,
        })
    }
}
