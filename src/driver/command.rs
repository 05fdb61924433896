//! Commands accepted by the driver actor and indications it produces.

use crate::{
    core::{MacOutput, retry::GiveUpReason, stats::MacStats},
    error::Result,
    packet::{Frame, MacAddress, SequenceNumber},
    phy::{MediumState, TransmissionState},
};
use tokio::sync::oneshot;

/// Commands sent to the `MacActor`.
///
/// 发送到 `MacActor` 的命令。
#[derive(Debug)]
pub enum DriverCommand {
    /// Queue a frame, by user priority or into an explicit category.
    /// 按用户优先级或指定类别将帧排队。
    Submit {
        frame: Frame,
        category: Option<usize>,
        response_tx: oneshot::Sender<Result<()>>,
    },
    /// Physical carrier sense changed.
    /// 物理载波侦听状态改变。
    MediumState(MediumState),
    /// The transmitter started or finished sending.
    /// 发射机开始或结束发送。
    TransmissionState(TransmissionState),
    /// A frame arrived from the radio.
    /// 从无线电到达一个帧。
    FrameReceived { frame: Frame, has_error: bool },
    /// Snapshot of the counters.
    /// 计数器快照。
    Stats {
        response_tx: oneshot::Sender<MacStats>,
    },
    Shutdown,
}

/// What the MAC reports to the layer above.
///
/// MAC向上层报告的内容。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacIndication {
    Delivered(Frame),
    Promiscuous(Frame),
    LinkBreak {
        destination: MacAddress,
        frame: Frame,
        reason: GiveUpReason,
    },
    Acknowledged {
        destination: MacAddress,
        sequence: SequenceNumber,
    },
}

impl MacIndication {
    /// Everything except frames for the radio.
    /// 除发往无线电的帧之外的所有输出。
    pub fn from_output(output: MacOutput) -> Option<Self> {
        match output {
            MacOutput::Transmit(_) => None,
            MacOutput::Deliver(frame) => Some(Self::Delivered(frame)),
            MacOutput::Promiscuous(frame) => Some(Self::Promiscuous(frame)),
            MacOutput::LinkBreak {
                destination,
                frame,
                reason,
            } => Some(Self::LinkBreak {
                destination,
                frame,
                reason,
            }),
            MacOutput::TxAcknowledged {
                destination,
                sequence,
            } => Some(Self::Acknowledged {
                destination,
                sequence,
            }),
        }
    }
}
