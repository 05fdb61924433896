//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use thiserror::Error;

/// The primary error type for the channel-access library.
/// 信道接入库的主要错误类型。
#[derive(Debug, Error)]
pub enum Error {
    /// An access-category index outside the configured range was used.
    /// 使用了超出配置范围的接入类别索引。
    #[error("access category {index} out of range (configured: {count})")]
    InvalidCategory { index: usize, count: usize },

    /// The transmission queue is full and no queued frame could be evicted.
    /// 发送队列已满，且没有可以驱逐的排队帧。
    #[error("transmission queue is full")]
    QueueFull,

    /// Only data and management frames may be submitted for transmission.
    /// 只有数据帧和管理帧可以提交发送。
    #[error("frame kind cannot be queued for transmission")]
    NotQueueable,

    /// The admission policy refused the frame.
    /// 准入策略拒绝了该帧。
    #[error("frame rejected by admission policy")]
    AdmissionRejected,

    /// The configuration is inconsistent.
    /// 配置不一致。
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An internal channel for communication between tasks was closed unexpectedly.
    /// 用于任务间通信的内部通道意外关闭。
    #[error("Internal channel is broken")]
    ChannelClosed,

    /// The radio collaborator failed to accept a frame.
    /// 无线电协作者未能接受帧。
    #[error("radio error: {0}")]
    Radio(String),
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;
        match err {
            Error::InvalidCategory { .. } => std::io::Error::new(ErrorKind::InvalidInput, err),
            Error::QueueFull => std::io::Error::new(ErrorKind::WouldBlock, err),
            Error::NotQueueable => ErrorKind::InvalidInput.into(),
            Error::AdmissionRejected => ErrorKind::PermissionDenied.into(),
            Error::InvalidConfig(msg) => std::io::Error::new(ErrorKind::InvalidInput, msg),
            Error::ChannelClosed => ErrorKind::BrokenPipe.into(),
            Error::Radio(msg) => std::io::Error::other(msg),
        }
    }
}
