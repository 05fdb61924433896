//! Tests for AIFS, slotted backoff and internal collisions.

use crate::{
    config::{AccessCategoryConfig, Config},
    core::{
        state::StateKind,
        test_utils::{Station, addr, air, seeded, single_category},
    },
    packet::Frame,
    phy::MediumState,
};
use std::time::Duration;

#[test]
fn test_idle_medium_transmits_after_aifs() {
    let mut sta = Station::new(1, seeded(Config::dcf()));
    let start = sta.now;
    sta.submit(addr(2), 100, 0, 1);

    assert_eq!(sta.mac.state_kind(), StateKind::WaitAifs);
    assert_eq!(sta.mac.next_deadline(), Some(start + air().difs()));

    let frame = sta.run_until_transmit();
    // No backoff was pending, so the frame goes out right at the end of AIFS.
    assert_eq!(sta.now, start + air().difs());
    assert!(matches!(frame, Frame::Data(_)));
    assert_eq!(sta.mac.state_kind(), StateKind::WaitAck);
}

#[test]
fn test_busy_medium_forces_backoff() {
    let mut sta = Station::new(1, seeded(Config::dcf()));
    sta.set_medium(MediumState::Busy);
    sta.submit(addr(2), 100, 0, 1);

    assert_eq!(sta.mac.state_kind(), StateKind::Defer);
    assert!(sta.mac.access_category(0).unwrap().backoff_pending());

    sta.elapse(Duration::from_micros(100));
    sta.set_medium(MediumState::Idle);
    let idle_at = sta.now;
    assert_eq!(sta.mac.state_kind(), StateKind::WaitAifs);

    sta.run_until_transmit();
    let waited = sta.now - idle_at;
    assert!(waited >= air().difs());
    assert!(waited <= air().difs() + air().slot() * 15);
}

#[test]
fn test_busy_medium_freezes_backoff_counter() {
    let mut sta = Station::new(1, seeded(Config::dcf()));
    sta.set_medium(MediumState::Busy);
    sta.submit(addr(2), 100, 0, 1);
    sta.set_medium(MediumState::Idle);
    sta.mac.access_category_mut(0).set_backoff_slots(5);

    // AIFS, then two idle slots.
    assert!(sta.step());
    assert_eq!(sta.mac.state_kind(), StateKind::Backoff);
    assert!(sta.step());
    assert!(sta.step());
    assert_eq!(sta.mac.access_category(0).unwrap().backoff_slots(), Some(3));

    sta.set_medium(MediumState::Busy);
    assert_eq!(sta.mac.state_kind(), StateKind::Defer);
    sta.elapse(Duration::from_millis(1));
    assert_eq!(sta.mac.access_category(0).unwrap().backoff_slots(), Some(3));

    sta.set_medium(MediumState::Idle);
    let idle_at = sta.now;
    sta.run_until_transmit();
    assert_eq!(sta.now, idle_at + air().difs() + air().slot() * 3);
}

#[test]
fn test_busy_medium_during_aifs_marks_backoff_pending() {
    let mut sta = Station::new(1, seeded(Config::dcf()));
    sta.submit(addr(2), 100, 0, 1);
    assert_eq!(sta.mac.state_kind(), StateKind::WaitAifs);
    assert!(!sta.mac.access_category(0).unwrap().backoff_pending());

    sta.elapse(Duration::from_micros(10));
    sta.set_medium(MediumState::Busy);

    assert_eq!(sta.mac.state_kind(), StateKind::Defer);
    assert!(sta.mac.access_category(0).unwrap().backoff_pending());
    assert_eq!(sta.mac.next_deadline(), None);
}

/// Scenario: cw_min 7, cw_max 63, four failed exchanges in a row.
#[test]
fn test_contention_window_doubles_up_to_max() {
    let mut config = single_category(7, 63);
    config.retry.short_retry_limit = 10;
    let mut sta = Station::new(1, config);
    sta.submit(addr(2), 100, 0, 1);

    let mut windows = Vec::new();
    for attempt in 0..4 {
        let frame = sta.run_until_transmit();
        let Frame::Data(body) = &frame else {
            panic!("expected a data frame, got {}", frame.kind());
        };
        assert_eq!(body.retry, attempt > 0);
        sta.let_timeout_expire();
        windows.push(sta.mac.access_category(0).unwrap().cw());
    }

    assert_eq!(windows, vec![15, 31, 63, 63]);
    assert_eq!(sta.mac.stats().categories[0].retries, 4);
    assert_eq!(sta.mac.access_category(0).unwrap().retry_counter(), 4);
}

#[test]
fn test_higher_category_wins_equal_start() {
    let mut config = seeded(Config::default());
    config.aggregation.enabled = false;
    let mut sta = Station::new(1, config);
    // BE (AIFSN 3) first, then VO (AIFSN 2) at the same instant.
    sta.submit(addr(2), 100, 0, 1);
    sta.submit(addr(3), 100, 6, 1);
    assert!(sta.mac.state().running_aifs().contains(&3));

    let frame = sta.run_until_transmit();
    assert_eq!(frame.receiver(), addr(3));
    // BE was still in AIFS and now has to back off.
    assert!(sta.mac.access_category(1).unwrap().backoff_pending());
}

#[test]
fn test_internal_collision_grows_losing_window() {
    let mut config = seeded(Config::default());
    config.contention.categories = vec![
        AccessCategoryConfig::new(15, 1023, 2),
        AccessCategoryConfig::new(15, 1023, 2),
    ];
    config.aggregation.enabled = false;
    let mut sta = Station::new(1, config);

    sta.set_medium(MediumState::Busy);
    sta.submit(addr(2), 100, 1, 1); // background, category 0
    sta.submit(addr(3), 100, 0, 1); // best effort, category 1
    sta.set_medium(MediumState::Idle);
    for category in 0..2 {
        sta.mac.access_category_mut(category).set_backoff_slots(1);
    }

    let frame = sta.run_until_transmit();
    assert_eq!(frame.receiver(), addr(3));

    let loser = sta.mac.access_category(0).unwrap();
    assert_eq!(loser.cw(), 31);
    assert!(loser.backoff_pending());
    assert_eq!(sta.mac.stats().categories[0].internal_collisions, 1);
    assert_eq!(sta.mac.stats().categories[1].internal_collisions, 0);
}

#[test]
fn test_post_backoff_drawn_while_frames_remain() {
    let mut config = seeded(Config::dcf());
    config.aggregation.enabled = false;
    let mut sta = Station::new(1, config);
    sta.submit(addr(2), 100, 0, 2);

    let first = sta.run_until_transmit();
    sta.acknowledge(&first);
    let ac = sta.mac.access_category(0).unwrap();
    assert!(ac.backoff_pending());
    assert!(ac.backoff_slots().is_some());

    let second = sta.run_until_transmit();
    sta.acknowledge(&second);
    let ac = sta.mac.access_category(0).unwrap();
    assert!(!ac.backoff_pending());
    assert_eq!(ac.backoff_slots(), None);
    assert_eq!(sta.mac.state_kind(), StateKind::Idle);
    assert_eq!(sta.mac.next_deadline(), None);
}
