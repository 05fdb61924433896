//! 48-bit IEEE MAC addresses.
//! 48位 IEEE MAC 地址。

use std::fmt;

/// A 48-bit link-layer address.
/// 48位链路层地址。
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// The all-ones broadcast address.
    /// 全1广播地址。
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Builds a locally administered unicast address from a small station id.
    /// Handy for simulations and tests.
    ///
    /// 从一个小的站点ID构建本地管理的单播地址，便于仿真和测试。
    pub const fn from_station_id(id: u32) -> Self {
        let b = id.to_be_bytes();
        Self([0x02, 0x00, b[0], b[1], b[2], b[3]])
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Group addresses have the I/G bit (LSB of the first octet) set.
    /// 组地址的 I/G 位（第一个字节的最低位）被置位。
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 == 0x01
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
