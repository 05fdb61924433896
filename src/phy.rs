//! The boundary towards the physical layer: airtime calculation and the
//! medium/transmitter state notifications the MAC consumes.
//!
//! 面向物理层的边界：空口时间计算以及MAC消费的介质/发射机状态通知。

use crate::{
    config::TimingConfig,
    packet::frame::{ACK_LEN, BLOCK_ACK_LEN, BLOCK_ACK_REQUEST_LEN, CTS_LEN, RTS_LEN},
};
use std::time::Duration;

/// The rate class a frame is sent with.
/// 帧发送所使用的速率类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Unicast data at the data rate.
    /// 以数据速率发送的单播数据。
    Data,
    /// Control responses (ACK, CTS, Block-ACK) and RTS.
    /// 控制响应（ACK、CTS、块确认）和RTS。
    Control,
    /// Group-addressed frames at the basic rate.
    /// 以基本速率发送的组播帧。
    Basic,
}

/// Computes how long a frame occupies the medium.
///
/// This is the only PHY knowledge the MAC needs; every timeout is derived from it.
///
/// 计算帧占用介质的时间。这是MAC唯一需要的物理层知识；所有超时都由它推导。
pub trait TxTime {
    fn tx_time(&self, byte_length: usize, mode: TxMode) -> Duration;
}

impl<T: TxTime + ?Sized> TxTime for Box<T> {
    fn tx_time(&self, byte_length: usize, mode: TxMode) -> Duration {
        (**self).tx_time(byte_length, mode)
    }
}

impl<T: TxTime + ?Sized> TxTime for std::sync::Arc<T> {
    fn tx_time(&self, byte_length: usize, mode: TxMode) -> Duration {
        (**self).tx_time(byte_length, mode)
    }
}

/// A PHY with one bitrate per mode and a constant preamble.
/// 每种模式一个比特率并带有固定前导码的物理层。
#[derive(Debug, Clone)]
pub struct FixedRatePhy {
    pub data_bitrate: u64,
    pub control_bitrate: u64,
    pub basic_bitrate: u64,
    pub preamble: Duration,
}

impl Default for FixedRatePhy {
    fn default() -> Self {
        Self {
            data_bitrate: 54_000_000,
            control_bitrate: 6_000_000,
            basic_bitrate: 6_000_000,
            preamble: Duration::from_micros(20),
        }
    }
}

impl TxTime for FixedRatePhy {
    fn tx_time(&self, byte_length: usize, mode: TxMode) -> Duration {
        let bitrate = match mode {
            TxMode::Data => self.data_bitrate,
            TxMode::Control => self.control_bitrate,
            TxMode::Basic => self.basic_bitrate,
        }
        .max(1);
        let bits = byte_length as u64 * 8;
        let nanos = (bits * 1_000_000_000).div_ceil(bitrate);
        self.preamble + Duration::from_nanos(nanos)
    }
}

/// Physical carrier sense as reported by the radio.
/// 无线电报告的物理载波侦听状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediumState {
    Idle,
    Busy,
}

/// Whether the local transmitter is currently on the air.
/// 本地发射机当前是否正在发送。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionState {
    Idle,
    Transmitting,
}

/// Inter-frame spaces and response timeouts derived from the timing
/// configuration and a [`TxTime`] model.
///
/// 由时序配置和 [`TxTime`] 模型推导出的帧间间隔和响应超时。
#[derive(Debug, Clone)]
pub struct AirTime<P> {
    phy: P,
    slot: Duration,
    sifs: Duration,
    max_propagation_delay: Duration,
}

impl<P: TxTime> AirTime<P> {
    pub fn new(phy: P, timing: &TimingConfig) -> Self {
        Self {
            phy,
            slot: timing.slot_time,
            sifs: timing.sifs,
            max_propagation_delay: timing.max_propagation_delay,
        }
    }

    pub fn phy(&self) -> &P {
        &self.phy
    }

    pub fn slot(&self) -> Duration {
        self.slot
    }

    pub fn sifs(&self) -> Duration {
        self.sifs
    }

    /// `SIFS + aifsn × slot`
    pub fn aifs(&self, aifsn: u32) -> Duration {
        self.sifs + self.slot * aifsn
    }

    pub fn difs(&self) -> Duration {
        self.aifs(2)
    }

    /// `SIFS + DIFS + ACK`: the deferral after a reception error.
    /// 接收错误后的延迟：`SIFS + DIFS + ACK`。
    pub fn eifs(&self) -> Duration {
        self.sifs + self.difs() + self.ack()
    }

    pub fn data(&self, byte_length: usize, multicast: bool) -> Duration {
        let mode = if multicast { TxMode::Basic } else { TxMode::Data };
        self.phy.tx_time(byte_length, mode)
    }

    pub fn ack(&self) -> Duration {
        self.phy.tx_time(ACK_LEN, TxMode::Control)
    }

    pub fn cts(&self) -> Duration {
        self.phy.tx_time(CTS_LEN, TxMode::Control)
    }

    pub fn rts(&self) -> Duration {
        self.phy.tx_time(RTS_LEN, TxMode::Control)
    }

    pub fn block_ack_request(&self) -> Duration {
        self.phy.tx_time(BLOCK_ACK_REQUEST_LEN, TxMode::Control)
    }

    pub fn block_ack(&self) -> Duration {
        self.phy.tx_time(BLOCK_ACK_LEN, TxMode::Control)
    }

    fn round_trip_margin(&self) -> Duration {
        self.max_propagation_delay * 2
    }

    /// How long to wait for an ACK after starting to send a data frame.
    /// 开始发送数据帧后等待ACK的时间。
    pub fn ack_timeout(&self, byte_length: usize) -> Duration {
        self.data(byte_length, false) + self.sifs + self.slot + self.ack() + self.round_trip_margin()
    }

    pub fn cts_timeout(&self) -> Duration {
        self.rts() + self.sifs + self.cts() + self.round_trip_margin()
    }

    pub fn block_ack_timeout(&self) -> Duration {
        self.block_ack_request() + self.sifs + self.slot + self.block_ack() + self.round_trip_margin()
    }

    /// NAV carried by an RTS: the rest of the RTS/CTS/DATA/ACK exchange.
    /// RTS携带的NAV：RTS/CTS/DATA/ACK交换的剩余部分。
    pub fn rts_duration(&self, byte_length: usize) -> Duration {
        self.sifs * 3 + self.cts() + self.data(byte_length, false) + self.ack()
    }

    pub fn cts_duration(&self, rts_duration: Duration) -> Duration {
        rts_duration.saturating_sub(self.sifs + self.cts())
    }

    pub fn data_duration(&self) -> Duration {
        self.sifs + self.ack()
    }

    pub fn block_ack_request_duration(&self) -> Duration {
        self.sifs + self.block_ack()
    }

    /// Airtime of one more Data+ACK exchange chained after SIFS.
    /// 在SIFS之后链接的又一次 Data+ACK 交换的空口时间。
    pub fn chained_exchange(&self, byte_length: usize) -> Duration {
        self.sifs + self.data(byte_length, false) + self.sifs + self.ack()
    }
}
