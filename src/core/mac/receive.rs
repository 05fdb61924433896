//! 接收路径：帧分类、重复检测、NAV与SIFS响应。
//! Receive path: frame classification, duplicate detection, NAV and SIFS
//! responses.

use super::{Mac, MacOutput, MacTimer};
use crate::{
    core::state::{MacState, SifsAction, StateKind},
    packet::{DataFrame, Frame, FrameClass},
    phy::TxTime,
};
use tokio::time::Instant;
use tracing::{debug, trace};

impl<P: TxTime> Mac<P> {
    pub(super) fn on_frame(&mut self, frame: Frame, has_error: bool, now: Instant) {
        trace!(
            kind = frame.kind(),
            transmitter = %frame.transmitter(),
            receiver = %frame.receiver(),
            has_error,
            state = ?self.state.kind(),
            "frame received"
        );

        // half duplex: nothing is heard while our own frames are on the air
        if matches!(self.state.kind(), StateKind::SendAggregate | StateKind::WaitMulticast) {
            self.stats.receive.ignored_while_transmitting += 1;
            return;
        }

        if matches!(
            self.state.kind(),
            StateKind::WaitCts | StateKind::WaitAck | StateKind::WaitBlockAck
        ) {
            if !has_error && self.is_expected_response(&frame) {
                self.on_expected_response(frame, now);
                return;
            }
            debug!(kind = frame.kind(), has_error, "unexpected frame while awaiting response");
            // the retry's AIFS is scheduled inside exchange_failed
            self.last_receive_failed = has_error;
            self.exchange_failed(now);
        }

        self.classify(frame, has_error, now);
    }

    fn is_expected_response(&self, frame: &Frame) -> bool {
        match (&self.state, frame) {
            (MacState::WaitCts { .. }, Frame::Cts(cts)) => cts.receiver == self.address,
            (MacState::WaitAck { .. }, Frame::Ack(ack)) => ack.receiver == self.address,
            (MacState::WaitBlockAck { .. }, Frame::BlockAck(block_ack)) => {
                block_ack.receiver == self.address
                    && block_ack.transmitter == self.exchange.current().destination()
            }
            _ => false,
        }
    }

    fn on_expected_response(&mut self, frame: Frame, now: Instant) {
        self.last_receive_failed = false;
        match frame {
            Frame::Cts(_) => self.cts_received(now),
            Frame::Ack(_) => self.exchange_succeeded(now),
            Frame::BlockAck(block_ack) => self.block_ack_received(block_ack.info, now),
            other => panic!("{} accepted as a response", other.kind()),
        }
    }

    /// Classifies a frame heard outside our own exchange.
    /// 对在本站交换之外听到的帧进行分类。
    fn classify(&mut self, frame: Frame, has_error: bool, now: Instant) {
        // 发往本站的聚合子帧即使损坏也交给重组器
        // subframes for us reach the reassembler even when damaged
        let frame = match frame {
            Frame::MpduDelimiter(delimiter) if delimiter.frame.receiver == self.address => {
                self.receive_subframe(delimiter.frame, has_error, now);
                return;
            }
            other => other,
        };

        if has_error {
            self.stats.receive.erroneous += 1;
            self.last_receive_failed = true;
            trace!("damaged frame, EIFS applies");
            return;
        }
        self.last_receive_failed = false;

        if frame.transmitter() == self.address {
            trace!("own frame ignored");
            return;
        }
        let for_us = frame.receiver() == self.address;
        if !for_us {
            self.update_nav(frame.duration(), now);
        }

        let response = match frame {
            Frame::Data(body) => self.receive_data(FrameClass::Data, body, now),
            Frame::Management(body) => self.receive_data(FrameClass::Management, body, now),
            Frame::MpduDelimiter(delimiter) => self.receive_data(FrameClass::Data, delimiter.frame, now),
            Frame::Rts(rts) if rts.receiver == self.address => {
                if self.nav.is_none_or(|nav| nav.until <= now) {
                    Some(SifsAction::RespondCts { rts })
                } else {
                    debug!(transmitter = %rts.transmitter, "RTS ignored, NAV set");
                    None
                }
            }
            Frame::BlockAckRequest(bar) if bar.receiver == self.address => {
                let (info, delivered) =
                    self.reassembler
                        .on_block_ack_request(bar.transmitter, bar.starting_sequence, now);
                for body in delivered {
                    self.deliver(Frame::Data(body));
                }
                Some(SifsAction::RespondBlockAck {
                    to: bar.transmitter,
                    info,
                })
            }
            Frame::Cts(_) | Frame::Ack(_) | Frame::BlockAck(_) if for_us => {
                trace!("unsolicited response ignored");
                None
            }
            _ => {
                self.stats.receive.not_for_us += 1;
                None
            }
        };

        if let Some(action) = response {
            self.schedule_response(action, now);
        }
    }

    fn receive_data(&mut self, class: FrameClass, body: DataFrame, now: Instant) -> Option<SifsAction> {
        if body.receiver.is_multicast() {
            if body.receiver.is_broadcast() {
                self.stats.receive.broadcast += 1;
            } else {
                self.stats.receive.multicast += 1;
            }
            if !self.is_duplicate(&body, now) {
                self.deliver(class.wrap(body));
            }
            return None;
        }

        if body.receiver != self.address {
            if self.promiscuous {
                self.emit(MacOutput::Promiscuous(class.wrap(body)));
            } else {
                self.stats.receive.not_for_us += 1;
            }
            return None;
        }

        self.stats.receive.unicast += 1;
        let to = body.transmitter;
        // duplicates are acknowledged again, the first ACK was evidently lost
        if !self.is_duplicate(&body, now) {
            self.deliver(class.wrap(body));
        }
        Some(SifsAction::RespondAck { to })
    }

    fn receive_subframe(&mut self, body: DataFrame, has_error: bool, now: Instant) {
        self.stats.receive.aggregate_subframes += 1;
        if has_error {
            self.stats.receive.erroneous += 1;
        }
        self.last_receive_failed = has_error;
        for frame in self.reassembler.on_subframe(body, has_error, now) {
            self.deliver(Frame::Data(frame));
        }
    }

    fn is_duplicate(&mut self, body: &DataFrame, now: Instant) -> bool {
        let duplicate = self
            .duplicates
            .as_mut()
            .is_some_and(|filter| filter.is_duplicate(body, now));
        if duplicate {
            self.stats.receive.duplicates += 1;
            trace!(transmitter = %body.transmitter, seq = ?body.sequence, "duplicate dropped");
        }
        duplicate
    }

    /// Turns around to answer after SIFS. Only possible while this station has
    /// no exchange of its own on the air.
    ///
    /// 在SIFS之后转换以进行应答。仅当本站没有自己的交换在空中时才可能。
    fn schedule_response(&mut self, action: SifsAction, now: Instant) {
        match self.state.kind() {
            StateKind::Idle | StateKind::Defer | StateKind::WaitAifs | StateKind::Backoff => {
                self.freeze_contention();
                let timer = self.timers.schedule(now + self.exchange.air().sifs(), MacTimer::Sifs);
                self.transition(MacState::WaitSifs { timer, action });
            }
            other => debug!(?action, state = ?other, "response dropped, busy"),
        }
    }
}
