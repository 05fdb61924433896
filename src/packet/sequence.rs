//! 12-bit MAC sequence numbers.
//! 12位MAC序列号。

use std::fmt;

/// Sequence numbers wrap modulo 4096.
/// 序列号按4096取模回绕。
pub const SEQUENCE_MODULUS: u16 = 4096;

const HALF_SPACE: i32 = (SEQUENCE_MODULUS / 2) as i32;

/// A sequence number carried in the sequence-control field of data frames.
/// 数据帧序列控制字段中携带的序列号。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SequenceNumber(u16);

impl SequenceNumber {
    pub const fn new(value: u16) -> Self {
        Self(value % SEQUENCE_MODULUS)
    }

    pub const fn value(self) -> u16 {
        self.0
    }

    pub const fn next(self) -> Self {
        self.add(1)
    }

    pub const fn add(self, n: u16) -> Self {
        Self(((self.0 as u32 + n as u32) % SEQUENCE_MODULUS as u32) as u16)
    }

    /// Forward distance from `start` to `self`, in `0..4096`.
    /// 从 `start` 到 `self` 的前向距离，范围 `0..4096`。
    pub const fn offset_from(self, start: SequenceNumber) -> u16 {
        (self.0 + SEQUENCE_MODULUS - start.0) % SEQUENCE_MODULUS
    }

    /// Signed distance from `base` to `self` in `-2048..2048`, so that numbers
    /// slightly "behind" the base sort before it.
    ///
    /// 从 `base` 到 `self` 的有符号距离，范围 `-2048..2048`。
    pub const fn signed_offset_from(self, base: SequenceNumber) -> i32 {
        let forward = self.offset_from(base) as i32;
        if forward >= HALF_SPACE {
            forward - SEQUENCE_MODULUS as i32
        } else {
            forward
        }
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
