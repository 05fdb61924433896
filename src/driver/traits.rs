//! Traits for abstracting over the radio below the MAC.
use crate::{error::Result, packet::Frame};
use async_trait::async_trait;
use std::sync::Arc;

/// The transmit side of a radio.
///
/// The driver hands every frame the MAC puts on the air to this trait. Medium
/// and transmitter state, as well as received frames, flow back through
/// [`MacHandle`](super::MacHandle).
///
/// 无线电的发送端。
///
/// 驱动将MAC发送到空中的每个帧交给此 trait。介质和发射机状态以及接收到的帧通过
/// [`MacHandle`](super::MacHandle) 流回。
#[async_trait]
pub trait Radio: Send + Sync + 'static {
    /// Puts a frame on the air.
    async fn transmit(&self, frame: Frame) -> Result<()>;
}

#[async_trait]
impl<R: Radio + ?Sized> Radio for Arc<R> {
    async fn transmit(&self, frame: Frame) -> Result<()> {
        (**self).transmit(frame).await
    }
}
