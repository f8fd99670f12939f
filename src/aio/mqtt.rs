//! Adafruit IO MQTT session over any `Link`

use core::fmt::Write;

use heapless::{String, Vec};

use crate::aio::packet::{self, Packet};
use crate::error::Error;
use crate::traits::{Link, MessageHandler, MessageSource};

const RX_CAPACITY: usize = 1024;
const TX_CAPACITY: usize = 256;
const MAX_PENDING_SUBSCRIPTIONS: usize = 4;

pub type Topic = String<96>;

/// Connection parameters for one session.
#[derive(Debug, Clone, Copy)]
pub struct MqttOptions<'c> {
    pub client_id: &'c str,
    pub username: &'c str,
    pub key: &'c str,
    pub keep_alive_secs: u16,
    pub connect_timeout_ms: u64,
    pub pump_wait_ms: u64,
}

/// `{username}/feeds/{feed}`
pub fn feed_topic(username: &str, feed: &str) -> Result<Topic, Error> {
    let mut topic = String::new();
    write!(topic, "{}/feeds/{}", username, feed).map_err(|_| Error::Value("topic too long"))?;
    Ok(topic)
}

/// Feed key of a feed topic owned by `username`.
pub fn feed_of<'t>(username: &str, topic: &'t str) -> Option<&'t str> {
    topic
        .strip_prefix(username)?
        .strip_prefix("/feeds/")
        .or_else(|| topic.strip_prefix(username)?.strip_prefix("/f/"))
}

pub struct MqttClient<'c, L: Link> {
    link: L,
    options: MqttOptions<'c>,
    rx: Vec<u8, RX_CAPACITY>,
    next_packet_id: u16,
    pending: Vec<(u16, Topic), MAX_PENDING_SUBSCRIPTIONS>,
    last_sent_ms: u64,
    connected: bool,
}

impl<'c, L: Link> MqttClient<'c, L> {
    pub fn new(link: L, options: MqttOptions<'c>) -> Self {
        Self {
            link,
            options,
            rx: Vec::new(),
            next_packet_id: 1,
            pending: Vec::new(),
            last_sent_ms: 0,
            connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    async fn send(&mut self, bytes: &[u8], now_ms: u64) -> Result<(), Error> {
        self.link.write_all(bytes).await?;
        self.last_sent_ms = now_ms;
        Ok(())
    }

    /// Open the session and wait for the broker to accept it.
    pub async fn connect<H: MessageHandler>(
        &mut self,
        handler: &mut H,
        now_ms: u64,
    ) -> Result<(), Error> {
        let mut buf: Vec<u8, TX_CAPACITY> = Vec::new();
        packet::encode_connect(
            &mut buf,
            self.options.client_id,
            self.options.username,
            self.options.key,
            self.options.keep_alive_secs,
        )?;
        self.send(&buf, now_ms).await?;

        let mut chunk = [0u8; 64];
        loop {
            if let Some((frame, used)) = packet::decode(&self.rx)? {
                let accepted = match frame {
                    Packet::ConnAck { return_code, .. } => Some(return_code),
                    _ => None,
                };
                self.consume(used);
                match accepted {
                    Some(0) => {
                        self.connected = true;
                        handler.on_connect();
                        return Ok(());
                    }
                    // 4: bad username or password, 5: not authorized
                    Some(code @ (4 | 5)) => return Err(Error::Rejected(code as u16)),
                    Some(_) => return Err(Error::Connection("broker refused the session")),
                    None => continue,
                }
            }
            match self
                .link
                .read_timeout(&mut chunk, self.options.connect_timeout_ms)
                .await?
            {
                None => return Err(Error::Connection("no CONNACK from broker")),
                Some(0) => return Err(Error::Connection("broker closed the connection")),
                Some(n) => self.buffer(&chunk[..n])?,
            }
        }
    }

    /// Subscribe to a feed with QoS 0.
    pub async fn subscribe(&mut self, feed: &str, now_ms: u64) -> Result<(), Error> {
        let topic = feed_topic(self.options.username, feed)?;
        let packet_id = self.take_packet_id();
        let mut buf: Vec<u8, TX_CAPACITY> = Vec::new();
        packet::encode_subscribe(&mut buf, packet_id, &topic, 0)?;
        self.send(&buf, now_ms).await?;
        if self.pending.is_full() {
            self.pending.remove(0);
        }
        let _ = self.pending.push((packet_id, topic));
        Ok(())
    }

    /// Ask the broker to republish the feed's last value.
    pub async fn get(&mut self, feed: &str, now_ms: u64) -> Result<(), Error> {
        let mut topic = feed_topic(self.options.username, feed)?;
        topic.push_str("/get").map_err(|_| Error::Value("topic too long"))?;
        let mut buf: Vec<u8, TX_CAPACITY> = Vec::new();
        packet::encode_publish(&mut buf, &topic, b"\0")?;
        self.send(&buf, now_ms).await
    }

    pub async fn disconnect<H: MessageHandler>(&mut self, handler: &mut H) {
        let mut buf: Vec<u8, 2> = Vec::new();
        if packet::encode_disconnect(&mut buf).is_ok() {
            let _ = self.link.write_all(&buf).await;
        }
        self.link.close().await;
        if self.connected {
            self.connected = false;
            handler.on_disconnect();
        }
    }

    /// Keep the session alive, then read and dispatch whatever arrives
    /// within the pump wait.
    pub async fn poll<H: MessageHandler>(
        &mut self,
        handler: &mut H,
        now_ms: u64,
    ) -> Result<(), Error> {
        if !self.connected {
            return Err(Error::Connection("MQTT session is not open"));
        }
        let keep_alive_ms = self.options.keep_alive_secs as u64 * 1000;
        if keep_alive_ms > 0 && now_ms.saturating_sub(self.last_sent_ms) >= keep_alive_ms / 2 {
            let mut buf: Vec<u8, 2> = Vec::new();
            packet::encode_pingreq(&mut buf)?;
            self.send(&buf, now_ms).await?;
        }

        let mut chunk = [0u8; 256];
        match self
            .link
            .read_timeout(&mut chunk, self.options.pump_wait_ms)
            .await?
        {
            None => {}
            Some(0) => {
                self.connected = false;
                handler.on_disconnect();
                return Err(Error::Connection("broker closed the connection"));
            }
            Some(n) => self.buffer(&chunk[..n])?,
        }

        self.dispatch(handler, now_ms).await
    }

    async fn dispatch<H: MessageHandler>(
        &mut self,
        handler: &mut H,
        now_ms: u64,
    ) -> Result<(), Error> {
        while let Some((frame, used)) = packet::decode(&self.rx)? {
            let mut ack = None;
            let mut result = Ok(());
            match frame {
                Packet::Publish {
                    topic,
                    payload,
                    packet_id,
                } => {
                    ack = packet_id;
                    let payload = core::str::from_utf8(payload)
                        .map_err(|_| Error::Value("feed payload is not UTF-8"));
                    log::debug!("MQTT message on {}", topic);
                    result = match (feed_of(self.options.username, topic), payload) {
                        (Some(feed), Ok(payload)) => handler.on_message(feed, payload),
                        (None, Ok(_)) => Ok(()),
                        (_, Err(e)) => Err(e),
                    };
                }
                Packet::SubAck {
                    packet_id,
                    granted_qos,
                } => {
                    if let Some(index) = self.pending.iter().position(|(id, _)| *id == packet_id) {
                        let (_, topic) = self.pending.remove(index);
                        handler.on_subscribe(&topic, granted_qos);
                    }
                    if granted_qos == 0x80 {
                        result = Err(Error::Runtime("broker refused the subscription"));
                    }
                }
                Packet::ConnAck { .. } | Packet::UnsubAck { .. } | Packet::PingResp => {}
                Packet::Other(kind) => log::warn!("Ignoring MQTT packet type 0x{:02X}", kind),
            }
            self.consume(used);
            if let Some(id) = ack {
                let mut buf: Vec<u8, 4> = Vec::new();
                packet::encode_puback(&mut buf, id)?;
                self.send(&buf, now_ms).await?;
            }
            result?;
        }
        Ok(())
    }

    fn take_packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        id
    }

    fn buffer(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.rx
            .extend_from_slice(bytes)
            .map_err(|_| Error::Io("MQTT receive buffer overflow"))
    }

    fn consume(&mut self, used: usize) {
        let len = self.rx.len();
        self.rx.copy_within(used..len, 0);
        self.rx.truncate(len - used);
    }
}

impl<L: Link> MessageSource for MqttClient<'_, L> {
    async fn follow(&mut self, feed: &str, now_ms: u64) -> Result<(), Error> {
        self.subscribe(feed, now_ms).await?;
        self.get(feed, now_ms).await
    }

    async fn pump<H: MessageHandler>(&mut self, handler: &mut H, now_ms: u64) -> Result<(), Error> {
        self.poll(handler, now_ms).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use embassy_futures::block_on;
    use std::collections::VecDeque;
    use std::string::{String as StdString, ToString};
    use std::vec::Vec as StdVec;

    /// Scripted link: each read returns the next queued chunk, `None` is a timeout.
    #[derive(Default)]
    pub(crate) struct ScriptedLink {
        pub incoming: VecDeque<Option<StdVec<u8>>>,
        pub written: StdVec<u8>,
        pub closed: bool,
    }

    impl ScriptedLink {
        pub(crate) fn with(chunks: &[&[u8]]) -> Self {
            Self {
                incoming: chunks.iter().map(|c| Some(c.to_vec())).collect(),
                ..Self::default()
            }
        }
    }

    impl Link for ScriptedLink {
        async fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
            if self.closed {
                return Err(Error::Io("write on closed link"));
            }
            self.written.extend_from_slice(bytes);
            Ok(())
        }

        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
            Ok(self.read_timeout(buf, 0).await?.unwrap_or(0))
        }

        async fn read_timeout(
            &mut self,
            buf: &mut [u8],
            _timeout_ms: u64,
        ) -> Result<Option<usize>, Error> {
            match self.incoming.pop_front() {
                None | Some(None) => Ok(None),
                Some(Some(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.incoming.push_front(Some(chunk[n..].to_vec()));
                    }
                    Ok(Some(n))
                }
            }
        }

        async fn close(&mut self) {
            self.closed = true;
        }
    }

    #[derive(Default)]
    struct Recorder {
        messages: StdVec<(StdString, StdString)>,
        subscribed: StdVec<(StdString, u8)>,
        connects: usize,
        disconnects: usize,
        fail_on: Option<&'static str>,
    }

    impl MessageHandler for Recorder {
        fn on_message(&mut self, feed: &str, payload: &str) -> Result<(), Error> {
            if self.fail_on == Some(feed) {
                return Err(Error::Value("bad payload"));
            }
            self.messages.push((feed.to_string(), payload.to_string()));
            Ok(())
        }

        fn on_connect(&mut self) {
            self.connects += 1;
        }

        fn on_disconnect(&mut self) {
            self.disconnects += 1;
        }

        fn on_subscribe(&mut self, topic: &str, granted_qos: u8) {
            self.subscribed.push((topic.to_string(), granted_qos));
        }
    }

    fn options() -> MqttOptions<'static> {
        MqttOptions {
            client_id: "plantview",
            username: "gardener",
            key: "aio_key",
            keep_alive_secs: 60,
            connect_timeout_ms: 1_000,
            pump_wait_ms: 10,
        }
    }

    fn publish(topic: &str, payload: &str) -> StdVec<u8> {
        let mut buf: Vec<u8, 256> = Vec::new();
        packet::encode_publish(&mut buf, topic, payload.as_bytes()).unwrap();
        buf.to_vec()
    }

    fn connected_client(mut link: ScriptedLink) -> (MqttClient<'static, ScriptedLink>, Recorder) {
        link.incoming.push_front(Some(StdVec::from([0x20, 2, 0, 0])));
        let mut client = MqttClient::new(link, options());
        let mut recorder = Recorder::default();
        block_on(client.connect(&mut recorder, 0)).unwrap();
        (client, recorder)
    }

    #[test]
    fn topics_for_feeds() {
        assert_eq!(
            feed_topic("gardener", "plant-co2").unwrap().as_str(),
            "gardener/feeds/plant-co2"
        );
        assert_eq!(feed_of("gardener", "gardener/feeds/plant-co2"), Some("plant-co2"));
        assert_eq!(feed_of("gardener", "gardener/f/plant-co2"), Some("plant-co2"));
        assert_eq!(feed_of("gardener", "someone/feeds/plant-co2"), None);
    }

    #[test]
    fn connect_sends_credentials_and_accepts_connack() {
        let (client, recorder) = connected_client(ScriptedLink::default());
        assert!(client.is_connected());
        assert_eq!(recorder.connects, 1);
        let written = &client.link.written;
        assert_eq!(written[0], 0x10);
        assert!(written.windows(8).any(|w| w == b"gardener"));
        assert!(written.windows(7).any(|w| w == b"aio_key"));
    }

    #[test]
    fn bad_credentials_are_rejected() {
        let link = ScriptedLink::with(&[&[0x20, 2, 0, 4]]);
        let mut client = MqttClient::new(link, options());
        let result = block_on(client.connect(&mut Recorder::default(), 0));
        assert_eq!(result, Err(Error::Rejected(4)));
    }

    #[test]
    fn missing_connack_is_a_connection_error() {
        let mut link = ScriptedLink::default();
        link.incoming.push_back(None);
        let mut client = MqttClient::new(link, options());
        let result = block_on(client.connect(&mut Recorder::default(), 0));
        assert!(matches!(result, Err(Error::Connection(_))));
    }

    #[test]
    fn follow_subscribes_then_requests_current_value() {
        let (mut client, _) = connected_client(ScriptedLink::default());
        client.link.written.clear();
        block_on(client.follow("plant-humidity", 5)).unwrap();
        let written = &client.link.written;
        assert_eq!(written[0], 0x82);
        let get = b"gardener/feeds/plant-humidity/get";
        assert!(written.windows(get.len()).any(|w| w == get));
        assert_eq!(*written.last().unwrap(), 0);
    }

    #[test]
    fn pump_dispatches_messages_split_across_reads() {
        let message = publish("gardener/feeds/plant-temperature", "21.4");
        let (head, tail) = message.split_at(5);
        let link = ScriptedLink::with(&[head]);
        let (mut client, mut recorder) = connected_client(link);
        client.link.incoming.push_back(Some(tail.to_vec()));

        block_on(client.pump(&mut recorder, 100)).unwrap();
        assert!(recorder.messages.is_empty());
        block_on(client.pump(&mut recorder, 200)).unwrap();
        assert_eq!(
            recorder.messages,
            [("plant-temperature".to_string(), "21.4".to_string())]
        );
    }

    #[test]
    fn suback_reports_subscription() {
        let (mut client, mut recorder) = connected_client(ScriptedLink::default());
        block_on(client.subscribe("plant-co2", 0)).unwrap();
        client.link.incoming.push_back(Some(StdVec::from([0x90, 3, 0, 1, 0])));
        block_on(client.pump(&mut recorder, 10)).unwrap();
        assert_eq!(recorder.subscribed, [("gardener/feeds/plant-co2".to_string(), 0)]);
    }

    #[test]
    fn handler_errors_propagate_after_consuming_the_packet() {
        let mut stream = publish("gardener/feeds/plant-humidity", "oops");
        stream.extend(publish("gardener/feeds/plant-co2", "410"));
        let (mut client, mut recorder) = connected_client(ScriptedLink::with(&[&stream]));
        recorder.fail_on = Some("plant-humidity");

        let result = block_on(client.pump(&mut recorder, 10));
        assert_eq!(result, Err(Error::Value("bad payload")));
        block_on(client.pump(&mut recorder, 20)).unwrap();
        assert_eq!(recorder.messages, [("plant-co2".to_string(), "410".to_string())]);
    }

    #[test]
    fn idle_session_sends_keep_alive_ping() {
        let (mut client, mut recorder) = connected_client(ScriptedLink::default());
        client.link.written.clear();
        block_on(client.pump(&mut recorder, 10_000)).unwrap();
        assert!(client.link.written.is_empty());
        block_on(client.pump(&mut recorder, 30_000)).unwrap();
        assert_eq!(client.link.written, [0xC0, 0]);
    }

    #[test]
    fn broker_hangup_marks_session_closed() {
        let (mut client, mut recorder) = connected_client(ScriptedLink::default());
        client.link.incoming.push_back(Some(StdVec::new()));
        let result = block_on(client.pump(&mut recorder, 10));
        assert!(matches!(result, Err(Error::Connection(_))));
        assert!(!client.is_connected());
        assert_eq!(recorder.disconnects, 1);
        let result = block_on(client.pump(&mut recorder, 20));
        assert!(matches!(result, Err(Error::Connection(_))));
    }

    #[test]
    fn disconnect_closes_the_link() {
        let (mut client, mut recorder) = connected_client(ScriptedLink::default());
        block_on(client.disconnect(&mut recorder));
        assert!(client.link.closed);
        assert_eq!(recorder.disconnects, 1);
    }
}
