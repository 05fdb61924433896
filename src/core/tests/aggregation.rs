//! Tests for MPDU-A bursts and Block-ACK handling on both ends.

use crate::{
    config::{BlockAckPolicy, Config},
    core::{
        state::StateKind,
        test_utils::{Station, addr, air, seeded},
    },
    packet::{BlockAckInfo, DataFrame, Frame, SequenceNumber},
};
use std::time::Duration;

fn subframe_body(frame: &Frame) -> &DataFrame {
    match frame {
        Frame::MpduDelimiter(delimiter) => &delimiter.frame,
        other => panic!("expected an aggregate subframe, got {}", other.kind()),
    }
}

/// Sends a whole burst of `count` subframes, returning them in order.
fn send_burst(sta: &mut Station, count: usize) -> Vec<Frame> {
    let mut subframes = vec![sta.run_until_transmit()];
    while subframes.len() < count {
        assert_eq!(sta.mac.state_kind(), StateKind::SendAggregate);
        sta.now += Duration::from_micros(40);
        sta.transmission_done();
        subframes.push(sta.transmitted.pop_front().unwrap());
    }
    sta.now += Duration::from_micros(40);
    sta.transmission_done();
    subframes
}

fn answer_bar(sta: &mut Station, info: BlockAckInfo) {
    sta.now += air().block_ack_request() + air().sifs() + air().block_ack();
    sta.receive(Frame::new_block_ack(addr(1), addr(2), info), false);
}

/// Scenario: five subframes, Block-ACK bits 0, 1 and 3 set.
#[test]
fn test_block_ack_requeues_missing_subframes() {
    let mut sta = Station::new(1, seeded(Config::default()));
    sta.submit(addr(2), 120, 0, 5);

    let burst = send_burst(&mut sta, 5);
    let seqs: Vec<SequenceNumber> = burst
        .iter()
        .map(|f| subframe_body(f).sequence.unwrap())
        .collect();
    let lasts: Vec<bool> = burst.iter().map(|f| subframe_body(f).is_last_in_aggregate()).collect();
    assert_eq!(lasts, vec![false, false, false, false, true]);
    let burst_id = subframe_body(&burst[0]).aggregate.unwrap().burst_id;

    let bar = sta.run_until_transmit();
    let Frame::BlockAckRequest(request) = &bar else {
        panic!("expected a block-ack request, got {}", bar.kind());
    };
    assert_eq!(request.starting_sequence, seqs[0]);
    assert_eq!(sta.mac.state_kind(), StateKind::WaitBlockAck);

    answer_bar(
        &mut sta,
        BlockAckInfo::from_received(seqs[0], [seqs[0], seqs[1], seqs[3]]),
    );

    assert_eq!(sta.acknowledged(), 3);
    assert_eq!(sta.mac.queue().size(1).unwrap(), 2);
    assert_eq!(sta.mac.stats().categories[1].retries, 1);
    // a Block-ACK counts as a successful exchange
    assert_eq!(sta.mac.access_category(1).unwrap().cw(), 15);

    // The two missing frames go out again as a burst of their own.
    let retry = send_burst(&mut sta, 2);
    let retried: Vec<SequenceNumber> = retry
        .iter()
        .map(|f| subframe_body(f).sequence.unwrap())
        .collect();
    assert_eq!(retried, vec![seqs[2], seqs[4]]);
    assert!(retry.iter().all(|f| subframe_body(f).retry));
    assert_eq!(subframe_body(&retry[0]).aggregate.unwrap().burst_id, burst_id);
    assert_eq!(sta.mac.stats().categories[1].aggregates_sent, 2);
}

#[test]
fn test_single_frame_is_not_aggregated() {
    let mut sta = Station::new(1, seeded(Config::default()));
    sta.submit(addr(2), 120, 0, 1);
    assert!(matches!(sta.run_until_transmit(), Frame::Data(_)));
}

#[test]
fn test_consecutive_aggregate_limit() {
    let mut config = seeded(Config::default());
    config.aggregation.max_aggregate_size = 2;
    config.aggregation.max_consecutive_aggregates = 1;
    let mut sta = Station::new(1, config);
    sta.submit(addr(2), 120, 0, 4);

    let burst = send_burst(&mut sta, 2);
    let start = subframe_body(&burst[0]).sequence.unwrap();
    sta.run_until_transmit();
    answer_bar(&mut sta, BlockAckInfo::from_received(start, [start, start.next()]));
    assert_eq!(sta.acknowledged(), 2);

    // the next exchange to the same destination falls back to a plain frame
    assert!(matches!(sta.run_until_transmit(), Frame::Data(_)));
}

#[test]
fn test_delayed_block_ack_request_contends() {
    let mut config = seeded(Config::default());
    config.aggregation.block_ack_policy = BlockAckPolicy::Delayed;
    let mut sta = Station::new(1, config);
    sta.submit(addr(2), 120, 0, 2);

    let burst = send_burst(&mut sta, 2);
    assert_eq!(sta.mac.state_kind(), StateKind::WaitAifs);
    assert!(sta.mac.exchange_in_progress());

    let bar = sta.run_until_transmit();
    assert!(matches!(bar, Frame::BlockAckRequest(_)));
    let start = subframe_body(&burst[0]).sequence.unwrap();
    answer_bar(&mut sta, BlockAckInfo::from_received(start, [start, start.next()]));
    assert_eq!(sta.acknowledged(), 2);
    assert_eq!(sta.mac.state_kind(), StateKind::Idle);
}

#[test]
fn test_missing_block_ack_retries_whole_burst() {
    let mut sta = Station::new(1, seeded(Config::default()));
    sta.submit(addr(2), 120, 0, 3);

    send_burst(&mut sta, 3);
    assert!(matches!(sta.run_until_transmit(), Frame::BlockAckRequest(_)));
    sta.let_timeout_expire();

    assert_eq!(sta.mac.queue().size(1).unwrap(), 3);
    assert_eq!(sta.mac.access_category(1).unwrap().cw(), 31);
}

#[test]
fn test_unreported_subframe_end_fails_burst() {
    let mut sta = Station::new(1, seeded(Config::default()));
    sta.submit(addr(2), 120, 0, 2);

    let first = sta.run_until_transmit();
    assert!(!subframe_body(&first).retry);
    assert_eq!(sta.mac.state_kind(), StateKind::SendAggregate);

    // the radio never reports that the subframe left the air
    assert!(sta.step());
    assert_ne!(sta.mac.state_kind(), StateKind::SendAggregate);
    assert!(!sta.mac.exchange_in_progress());
    assert_eq!(sta.mac.stats().categories[1].retries, 1);
    assert_eq!(sta.mac.queue().size(1).unwrap(), 2);

    let retry = sta.run_until_transmit();
    assert!(subframe_body(&retry).retry);
    assert_eq!(
        subframe_body(&retry).sequence,
        subframe_body(&first).sequence
    );
}

#[test]
fn test_receiver_scores_and_reassembles_burst() {
    let mut tx = Station::new(1, seeded(Config::default()));
    tx.submit(addr(2), 120, 0, 3);
    let burst = send_burst(&mut tx, 3);
    let bar = tx.run_until_transmit();
    let seqs: Vec<SequenceNumber> = burst
        .iter()
        .map(|f| subframe_body(f).sequence.unwrap())
        .collect();

    let mut rx = Station::new(2, seeded(Config::default()));
    rx.receive(burst[0].clone(), false);
    rx.receive(burst[1].clone(), true);
    rx.receive(burst[2].clone(), false);
    // only the frames ahead of the damaged one are released
    assert_eq!(rx.delivered().len(), 1);
    assert_eq!(rx.mac.stats().receive.aggregate_subframes, 3);

    rx.receive(bar, false);
    assert_eq!(rx.mac.state_kind(), StateKind::WaitSifs);
    let block_ack = rx.run_until_transmit();
    let Frame::BlockAck(block_ack) = block_ack else {
        panic!("expected a block-ack, got {}", block_ack.kind());
    };
    assert_eq!(block_ack.receiver, addr(1));
    assert!(block_ack.info.acknowledges(seqs[0]));
    assert!(!block_ack.info.acknowledges(seqs[1]));
    assert!(block_ack.info.acknowledges(seqs[2]));
    assert_eq!(rx.mac.stats().block_acks_sent, 1);

    // the intact frame behind the gap is released by the flush timer
    rx.run_until_quiet();
    assert_eq!(rx.delivered().len(), 2);
}

#[test]
fn test_retransmitted_subframe_fills_the_gap() {
    let mut tx = Station::new(1, seeded(Config::default()));
    tx.submit(addr(2), 120, 0, 3);
    let burst = send_burst(&mut tx, 3);

    let mut rx = Station::new(2, seeded(Config::default()));
    rx.receive(burst[0].clone(), false);
    rx.receive(burst[1].clone(), true);
    rx.receive(burst[2].clone(), false);
    assert_eq!(rx.delivered().len(), 1);

    // a correct copy replaces the damaged subframe before the flush
    let mut repaired = burst[1].clone();
    if let Frame::MpduDelimiter(delimiter) = &mut repaired {
        delimiter.frame.retry = true;
        delimiter.frame.aggregate = Some(crate::packet::AggregateTag {
            last: true,
            ..delimiter.frame.aggregate.unwrap()
        });
    }
    rx.receive(repaired, false);
    let delivered: Vec<_> = rx
        .delivered()
        .iter()
        .map(|f| f.body().unwrap().sequence.unwrap())
        .collect();
    assert_eq!(delivered.len(), 3);
    assert_eq!(delivered[1], subframe_body(&burst[1]).sequence.unwrap());
}
