//! tests/common/harness.rs
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Arc, Once};
use tokio::{sync::mpsc, task::JoinHandle};
use wlan_edca::{
    config::Config,
    core::Mac,
    driver::{MacHandle, MacIndication, Radio},
    error::{Error, Result},
    packet::{DataFrame, Frame, MacAddress},
    phy::FixedRatePhy,
};

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

/// A radio that hands every transmitted frame to the test.
pub struct ChannelRadio {
    tx: mpsc::UnboundedSender<Frame>,
}

#[async_trait]
impl Radio for ChannelRadio {
    async fn transmit(&self, frame: Frame) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| Error::Radio("air closed".to_string()))
    }
}

pub fn addr(id: u32) -> MacAddress {
    MacAddress::from_station_id(id)
}

pub fn data_frame(from: u32, to: u32, payload_len: usize) -> Frame {
    Frame::Data(DataFrame::new(
        addr(to),
        addr(from),
        Bytes::from(vec![0x5A; payload_len]),
    ))
}

/// A spawned station: its handle, the upper-layer indications and what it put on the air.
pub struct TestStation {
    pub handle: MacHandle,
    pub indications: mpsc::Receiver<MacIndication>,
    pub air: mpsc::UnboundedReceiver<Frame>,
    pub task: JoinHandle<()>,
}

pub fn station(id: u32) -> TestStation {
    init_tracing();
    let mut config = Config::dcf();
    config.rng_seed = Some(u64::from(id));
    let mac = Mac::new(addr(id), config, FixedRatePhy::default()).unwrap();
    let (tx, air) = mpsc::unbounded_channel();
    let (handle, indications, task) = MacHandle::spawn(mac, Arc::new(ChannelRadio { tx }));
    TestStation {
        handle,
        indications,
        air,
        task,
    }
}
