//! The actor that owns a `Mac` and drives it from commands and its own timers.
//!
//! 拥有 `Mac` 并根据命令和自身定时器驱动它的 actor。

use super::{
    command::{DriverCommand, MacIndication},
    traits::Radio,
};
use crate::{
    core::{Mac, MacOutput},
    error::{Error, Result},
    phy::TxTime,
};
use std::sync::Arc;
use tokio::{
    sync::mpsc,
    time::{Instant, sleep_until},
};
use tracing::{debug, warn};

pub(crate) struct MacActor<P: TxTime, R: Radio> {
    pub(crate) mac: Mac<P>,
    pub(crate) radio: Arc<R>,
    pub(crate) command_rx: mpsc::Receiver<DriverCommand>,
    pub(crate) indication_tx: mpsc::Sender<MacIndication>,
}

/// Sleeps until `deadline`, or forever when there is none.
/// 睡眠到 `deadline`，如果没有截止时间则永远等待。
async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl<P: TxTime, R: Radio> MacActor<P, R> {
    /// Runs the actor's main event loop.
    ///
    /// 运行 actor 的主事件循环。
    pub(crate) async fn run(mut self) {
        loop {
            let deadline = self.mac.next_deadline();

            tokio::select! {
                // 1. Commands from the handle.
                // 1. 来自句柄的命令。
                command = self.command_rx.recv() => {
                    match command {
                        Some(DriverCommand::Shutdown) | None => break,
                        Some(command) => self.handle_command(command),
                    }
                }
                // 2. The earliest MAC timer.
                // 2. 最早的MAC定时器。
                _ = wait_for(deadline) => {
                    self.mac.advance(Instant::now());
                }
            }

            if let Err(e) = self.dispatch_outputs().await {
                warn!(error = %e, "indication receiver gone, stopping MAC driver");
                break;
            }
        }
        debug!(address = %self.mac.address(), "MAC driver stopped");
    }

    fn handle_command(&mut self, command: DriverCommand) {
        let now = Instant::now();
        match command {
            DriverCommand::Submit {
                frame,
                category,
                response_tx,
            } => {
                let result = match category {
                    Some(category) => self.mac.submit_to(frame, category, now),
                    None => self.mac.submit(frame, now),
                };
                let _ = response_tx.send(result);
            }
            DriverCommand::MediumState(state) => self.mac.medium_state_changed(state, now),
            DriverCommand::TransmissionState(state) => {
                self.mac.transmission_state_changed(state, now)
            }
            DriverCommand::FrameReceived { frame, has_error } => {
                self.mac.frame_received(frame, has_error, now)
            }
            DriverCommand::Stats { response_tx } => {
                let _ = response_tx.send(self.mac.stats().clone());
            }
            DriverCommand::Shutdown => {}
        }
    }

    async fn dispatch_outputs(&mut self) -> Result<()> {
        for output in self.mac.drain_outputs() {
            match output {
                MacOutput::Transmit(frame) => {
                    // A lost frame looks like a collision to the MAC; its timers recover.
                    if let Err(e) = self.radio.transmit(frame).await {
                        warn!(error = %e, "radio failed to transmit frame");
                    }
                }
                other => {
                    if let Some(indication) = MacIndication::from_output(other) {
                        self.indication_tx
                            .send(indication)
                            .await
                            .map_err(|_| Error::ChannelClosed)?;
                    }
                }
            }
        }
        Ok(())
    }
}
