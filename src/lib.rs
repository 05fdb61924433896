#![deny(clippy::expect_used, clippy::unwrap_used)]

//! An 802.11 EDCA/DCF channel-access engine.
//!
//! [`core::Mac`] is a synchronous state machine: it is fed medium, transmitter
//! and reception events together with the current time, and it answers with
//! [`core::MacOutput`]s. [`driver::MacHandle`] runs one inside a tokio task and
//! connects it to a [`driver::Radio`].
//!
//! 802.11 EDCA/DCF 信道接入引擎。
//! [`core::Mac`] 是一个同步状态机：输入介质、发射机和接收事件以及当前时间，
//! 输出 [`core::MacOutput`]。[`driver::MacHandle`] 在 tokio 任务中运行它，
//! 并将其连接到 [`driver::Radio`]。

pub mod config;
pub mod core;
pub mod driver;
pub mod error;
pub mod packet;
pub mod phy;
pub mod timer;
