//! Common testing infrastructure for channel-access tests.

use super::{Mac, MacOutput};
use crate::{
    config::{AccessCategoryConfig, Config},
    packet::{DataFrame, Frame, MacAddress},
    phy::{AirTime, FixedRatePhy, MediumState, TransmissionState},
};
use bytes::Bytes;
use std::{collections::VecDeque, sync::Once, time::Duration};
use tokio::time::Instant;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "wlan_edca=debug".to_string());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

pub fn addr(id: u32) -> MacAddress {
    MacAddress::from_station_id(id)
}

/// A config with a fixed seed so backoff draws repeat between runs.
pub fn seeded(mut config: Config) -> Config {
    config.rng_seed = Some(7);
    config
}

/// DCF with a single category of the given window.
pub fn single_category(cw_min: u32, cw_max: u32) -> Config {
    let mut config = seeded(Config::dcf());
    config.contention.categories = vec![AccessCategoryConfig::new(cw_min, cw_max, 2)];
    config
}

pub fn air() -> AirTime<FixedRatePhy> {
    AirTime::new(FixedRatePhy::default(), &Config::default().timing)
}

/// A data frame whose total length is `byte_length` (header included).
pub fn data_frame(from: u32, to: MacAddress, byte_length: usize) -> DataFrame {
    let payload = byte_length.saturating_sub(crate::packet::frame::DATA_HEADER_LEN);
    DataFrame::new(to, addr(from), Bytes::from(vec![0xA5; payload]))
}

/// One MAC under test together with a manual clock and the outputs it produced.
pub struct Station {
    pub mac: Mac<FixedRatePhy>,
    pub now: Instant,
    pub transmitted: VecDeque<Frame>,
    pub events: Vec<MacOutput>,
}

impl Station {
    pub fn new(id: u32, config: Config) -> Self {
        init_tracing();
        let mac = Mac::new(addr(id), config, FixedRatePhy::default()).unwrap();
        Self {
            mac,
            now: Instant::now(),
            transmitted: VecDeque::new(),
            events: Vec::new(),
        }
    }

    pub fn address(&self) -> MacAddress {
        self.mac.address()
    }

    fn collect(&mut self) {
        for output in self.mac.drain_outputs() {
            match output {
                MacOutput::Transmit(frame) => self.transmitted.push_back(frame),
                other => self.events.push(other),
            }
        }
    }

    /// Submits `count` frames of `byte_length` bytes to `to` with user priority `priority`.
    pub fn submit(&mut self, to: MacAddress, byte_length: usize, priority: u8, count: usize) {
        for _ in 0..count {
            let frame = data_frame(self.address_id(), to, byte_length).with_priority(priority);
            self.mac.submit(Frame::Data(frame), self.now).unwrap();
        }
        self.collect();
    }

    fn address_id(&self) -> u32 {
        let o = self.address().octets();
        u32::from_be_bytes([o[2], o[3], o[4], o[5]])
    }

    pub fn set_medium(&mut self, state: MediumState) {
        self.mac.medium_state_changed(state, self.now);
        self.collect();
    }

    /// Receives `frame` at the current instant.
    pub fn receive(&mut self, frame: Frame, has_error: bool) {
        self.mac.frame_received(frame, has_error, self.now);
        self.collect();
    }

    /// The transmitter finished the frame currently on the air.
    pub fn transmission_done(&mut self) {
        self.mac.transmission_state_changed(TransmissionState::Idle, self.now);
        self.collect();
    }

    /// Moves the clock forward and fires what became due.
    pub fn elapse(&mut self, by: Duration) {
        self.now += by;
        self.mac.advance(self.now);
        self.collect();
    }

    /// Fires the next pending deadline. Returns false if nothing is scheduled.
    pub fn step(&mut self) -> bool {
        match self.mac.next_deadline() {
            Some(deadline) => {
                self.now = self.now.max(deadline);
                self.mac.advance(self.now);
                self.collect();
                true
            }
            None => false,
        }
    }

    /// Runs timers until the MAC puts a frame on the air.
    pub fn run_until_transmit(&mut self) -> Frame {
        for _ in 0..100_000 {
            if let Some(frame) = self.transmitted.pop_front() {
                return frame;
            }
            assert!(
                self.step(),
                "no deadline left while waiting for a transmission in {:?}",
                self.mac.state_kind()
            );
        }
        panic!("no transmission after many timer steps");
    }

    /// Runs timers until nothing is scheduled any more.
    pub fn run_until_quiet(&mut self) {
        let mut steps = 0;
        while self.step() {
            steps += 1;
            assert!(steps < 100_000, "timers never settle");
        }
    }

    /// The ACK a peer would send for the data frame that went out at the
    /// current instant, delivered when its reception completes.
    pub fn acknowledge(&mut self, data: &Frame) {
        let air = air();
        self.now += air.data(data.byte_length(), false) + air.sifs() + air.ack();
        self.receive(Frame::new_ack(data.transmitter(), data.receiver()), false);
    }

    /// Lets the response timeout of the current exchange expire.
    pub fn let_timeout_expire(&mut self) {
        assert!(self.step(), "no response timeout scheduled");
    }

    pub fn link_breaks(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, MacOutput::LinkBreak { .. }))
            .count()
    }

    pub fn acknowledged(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, MacOutput::TxAcknowledged { .. }))
            .count()
    }

    pub fn delivered(&self) -> Vec<&Frame> {
        self.events
            .iter()
            .filter_map(|e| match e {
                MacOutput::Deliver(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }
}
