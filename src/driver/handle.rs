//! The user-facing handle of a running MAC driver.
//!
//! 运行中MAC驱动的用户侧句柄。

use super::{
    actor::MacActor,
    command::{DriverCommand, MacIndication},
    traits::Radio,
};
use crate::{
    core::{Mac, stats::MacStats},
    error::{Error, Result},
    packet::Frame,
    phy::{MediumState, TransmissionState, TxTime},
};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

const COMMAND_CHANNEL_CAPACITY: usize = 1024;
const INDICATION_CHANNEL_CAPACITY: usize = 1024;

/// A cloneable handle to a MAC running in its own task.
///
/// 指向在其自身任务中运行的MAC的可克隆句柄。
#[derive(Debug, Clone)]
pub struct MacHandle {
    command_tx: mpsc::Sender<DriverCommand>,
}

impl MacHandle {
    /// Moves `mac` into a new task that transmits through `radio`.
    ///
    /// Returns the handle, the stream of indications for the upper layer and
    /// the task's join handle. The task ends on [`MacHandle::shutdown`], when
    /// every handle is dropped, or when the indication receiver is dropped.
    ///
    /// 将 `mac` 移入一个通过 `radio` 发送的新任务。
    /// 返回句柄、给上层的指示流以及任务的 join 句柄。
    pub fn spawn<P, R>(mac: Mac<P>, radio: Arc<R>) -> (Self, mpsc::Receiver<MacIndication>, JoinHandle<()>)
    where
        P: TxTime + Send + 'static,
        R: Radio,
    {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (indication_tx, indication_rx) = mpsc::channel(INDICATION_CHANNEL_CAPACITY);
        let actor = MacActor {
            mac,
            radio,
            command_rx,
            indication_tx,
        };
        let task = tokio::spawn(actor.run());
        (Self { command_tx }, indication_rx, task)
    }

    async fn send(&self, command: DriverCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    /// Queues a frame, choosing the access category from its user priority.
    /// 将帧排队，按其用户优先级选择接入类别。
    pub async fn submit(&self, frame: Frame) -> Result<()> {
        self.submit_inner(frame, None).await
    }

    pub async fn submit_to(&self, frame: Frame, category: usize) -> Result<()> {
        self.submit_inner(frame, Some(category)).await
    }

    async fn submit_inner(&self, frame: Frame, category: Option<usize>) -> Result<()> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(DriverCommand::Submit {
            frame,
            category,
            response_tx,
        })
        .await?;
        response_rx.await.map_err(|_| Error::ChannelClosed)?
    }

    pub async fn medium_state_changed(&self, state: MediumState) -> Result<()> {
        self.send(DriverCommand::MediumState(state)).await
    }

    pub async fn transmission_state_changed(&self, state: TransmissionState) -> Result<()> {
        self.send(DriverCommand::TransmissionState(state)).await
    }

    pub async fn frame_received(&self, frame: Frame, has_error: bool) -> Result<()> {
        self.send(DriverCommand::FrameReceived { frame, has_error }).await
    }

    pub async fn stats(&self) -> Result<MacStats> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send(DriverCommand::Stats { response_tx }).await?;
        response_rx.await.map_err(|_| Error::ChannelClosed)
    }

    /// Stops the driver task.
    /// 停止驱动任务。
    pub async fn shutdown(&self) -> Result<()> {
        self.send(DriverCommand::Shutdown).await
    }
}
