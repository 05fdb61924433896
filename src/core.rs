//! The channel-access core: queueing, contention, frame exchanges and the
//! receive path, driven by explicit time.
//! 信道接入核心：排队、竞争、帧交换和接收路径，由显式时间驱动。

pub mod contention;
pub mod duplicate;
pub mod exchange;
pub mod mac;
pub mod queue;
pub mod reassembly;
pub mod retry;
pub mod state;
pub mod stats;

pub use mac::{AdmissionPolicy, Mac, MacOutput};

#[cfg(test)]
pub mod test_utils;
