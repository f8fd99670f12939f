//! Hardware and service abstraction traits
//!
//! The main loop only talks to these. The board implements them in
//! `hardware`, `wifi` and `net`; tests implement them with fakes.
#![allow(async_fn_in_trait)]

use crate::clock::TimeStruct;
use crate::error::Error;
use crate::scene::Scene;
use heapless::String;

/// Raw feed payload as delivered by the service
pub type Payload = String<64>;

/// Opaque feed handle resolved once at startup
pub type FeedHandle = String<64>;

/// Monotonic millisecond counter plus a way to wait
pub trait TimeBase {
    fn now_ms(&self) -> u64;

    async fn sleep_ms(&mut self, ms: u64);
}

/// Wireless link to the access point
pub trait Radio {
    /// Associate and obtain an address
    async fn join(&mut self) -> Result<(), Error>;

    /// Drop the association and power-cycle the radio
    async fn reset(&mut self);

    fn is_connected(&mut self) -> bool;
}

/// Connectivity phases shown on the indicator light
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightPhase {
    Connecting,
    Fault,
    Off,
}

/// Indicator light
pub trait StatusLight {
    fn show(&mut self, phase: LightPhase);
}

/// Display surface the scene is painted on
pub trait Screen {
    /// Paint whatever changed in the scene
    fn refresh(&mut self, scene: &mut Scene) -> Result<(), Error>;
}

/// Authoritative wall-clock time
pub trait TimeSource {
    async fn receive_time(&mut self) -> Result<TimeStruct, Error>;
}

/// Pull-style access to feed values
pub trait FeedReader {
    /// Resolve a feed key into the handle used for polling
    async fn resolve_feed(&mut self, key: &str) -> Result<FeedHandle, Error>;

    /// Latest value of a feed
    async fn receive_data(&mut self, feed: &FeedHandle) -> Result<Payload, Error>;
}

/// Receiver of pushed feed messages
pub trait MessageHandler {
    /// A feed published a new value
    fn on_message(&mut self, feed: &str, payload: &str) -> Result<(), Error>;

    fn on_connect(&mut self) {
        log::info!("Connected to Adafruit IO!");
    }

    fn on_disconnect(&mut self) {
        log::info!("Disconnected from Adafruit IO!");
    }

    fn on_subscribe(&mut self, topic: &str, granted_qos: u8) {
        log::info!("Subscribed to {} with QOS level {}", topic, granted_qos);
    }
}

/// Push-style message session
pub trait MessageSource {
    /// Subscribe to a feed and ask for its current value
    async fn follow(&mut self, feed: &str, now_ms: u64) -> Result<(), Error>;

    /// Process whatever arrived, calling the handler for each message
    async fn pump<H: MessageHandler>(&mut self, handler: &mut H, now_ms: u64) -> Result<(), Error>;
}

/// Byte stream to a remote host
pub trait Link {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error>;

    /// Read some bytes. `Ok(0)` means the peer closed the stream.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error>;

    /// Read some bytes, giving up after `timeout_ms`. `Ok(None)` on timeout.
    async fn read_timeout(&mut self, buf: &mut [u8], timeout_ms: u64)
    -> Result<Option<usize>, Error>;

    async fn close(&mut self);
}

/// Opens links, one at a time
pub trait Connector {
    type Link<'a>: Link
    where
        Self: 'a;

    async fn open<'a>(&'a mut self, host: &str, port: u16) -> Result<Self::Link<'a>, Error>;
}
