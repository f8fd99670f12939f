//! TLS links over embassy-net TCP sockets

use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::{Runner, Stack};
use embassy_time::{Duration, with_timeout};
use embedded_tls::{
    Aes128GcmSha256, TlsConfig, TlsConnection, TlsContext, TlsError, UnsecureProvider,
};
use esp_hal::rng::Rng;
use esp_radio::wifi::WifiDevice;
use rand_core::{CryptoRng, RngCore};

use crate::error::Error;
use crate::traits::{Connector, Link};

const SOCKET_TIMEOUT_SECS: u64 = 20;

type Session<'a> = TlsConnection<'a, TcpSocket<'a>, Aes128GcmSha256>;

#[embassy_executor::task]
pub async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

/// Hardware RNG. Seeded by radio noise once Wi-Fi is running.
pub struct RadioRng(Rng);

impl RadioRng {
    pub fn new() -> Self {
        Self(Rng::new())
    }
}

impl Default for RadioRng {
    fn default() -> Self {
        Self::new()
    }
}

impl RngCore for RadioRng {
    fn next_u32(&mut self) -> u32 {
        self.0.random()
    }

    fn next_u64(&mut self) -> u64 {
        (self.0.random() as u64) << 32 | self.0.random() as u64
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let word = self.0.random().to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl CryptoRng for RadioRng {}

/// Socket and TLS record buffers backing one connection.
pub struct LinkBuffers<'a> {
    pub rx: &'a mut [u8],
    pub tx: &'a mut [u8],
    pub record_rx: &'a mut [u8],
    pub record_tx: &'a mut [u8],
}

/// Opens one TLS connection at a time into a set of buffers.
pub struct TlsConnector<'a> {
    stack: Stack<'a>,
    buffers: LinkBuffers<'a>,
    rng: RadioRng,
}

impl<'a> TlsConnector<'a> {
    pub fn new(stack: Stack<'a>, buffers: LinkBuffers<'a>) -> Self {
        Self {
            stack,
            buffers,
            rng: RadioRng::new(),
        }
    }
}

impl<'s> Connector for TlsConnector<'s> {
    type Link<'a>
        = TlsLink<'a>
    where
        Self: 'a;

    async fn open<'a>(&'a mut self, host: &str, port: u16) -> Result<Self::Link<'a>, Error> {
        let addresses = self
            .stack
            .dns_query(host, DnsQueryType::A)
            .await
            .map_err(|e| {
                log::warn!("DNS lookup for {} failed: {:?}", host, e);
                Error::Connection("DNS lookup failed")
            })?;
        let address = *addresses.first().ok_or(Error::Connection("No DNS results"))?;

        let buffers = &mut self.buffers;
        let mut socket = TcpSocket::new(self.stack, &mut *buffers.rx, &mut *buffers.tx);
        socket.set_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)));
        log::debug!("Connecting to {}:{} ({})", host, port, address);
        socket.connect((address, port)).await.map_err(|e| {
            log::warn!("TCP connect to {}:{} failed: {:?}", host, port, e);
            Error::Connection("TCP connect failed")
        })?;

        let mut session =
            TlsConnection::new(socket, &mut *buffers.record_rx, &mut *buffers.record_tx);
        let config = TlsConfig::new().with_server_name(host);
        // No CA store on the device: the channel is encrypted, the peer is not verified.
        let provider = UnsecureProvider::new::<Aes128GcmSha256>(&mut self.rng);
        session
            .open(TlsContext::new(&config, provider))
            .await
            .map_err(|e| {
                log::warn!("TLS handshake with {} failed: {:?}", host, e);
                Error::Connection("TLS handshake failed")
            })?;
        Ok(TlsLink {
            session: Some(session),
        })
    }
}

pub struct TlsLink<'a> {
    session: Option<Session<'a>>,
}

impl<'a> TlsLink<'a> {
    fn session(&mut self) -> Result<&mut Session<'a>, Error> {
        self.session.as_mut().ok_or(Error::Io("TLS session closed"))
    }
}

fn read_result(result: Result<usize, TlsError>) -> Result<usize, Error> {
    match result {
        Ok(read) => Ok(read),
        Err(TlsError::ConnectionClosed) => Ok(0),
        Err(e) => {
            log::debug!("TLS read failed: {:?}", e);
            Err(Error::Io("socket read failed"))
        }
    }
}

impl Link for TlsLink<'_> {
    async fn write_all(&mut self, mut bytes: &[u8]) -> Result<(), Error> {
        let session = self.session()?;
        while !bytes.is_empty() {
            let written = session
                .write(bytes)
                .await
                .map_err(|_| Error::Io("socket write failed"))?;
            if written == 0 {
                return Err(Error::Io("socket closed while writing"));
            }
            bytes = &bytes[written..];
        }
        session
            .flush()
            .await
            .map_err(|_| Error::Io("socket flush failed"))
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let session = self.session()?;
        read_result(session.read(buf).await)
    }

    async fn read_timeout(
        &mut self,
        buf: &mut [u8],
        timeout_ms: u64,
    ) -> Result<Option<usize>, Error> {
        let session = self.session()?;
        match with_timeout(Duration::from_millis(timeout_ms), session.read(buf)).await {
            Ok(read) => read_result(read).map(Some),
            Err(_) => Ok(None),
        }
    }

    async fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let mut socket = match session.close().await {
            Ok(socket) => socket,
            Err((socket, _)) => socket,
        };
        socket.close();
        let _ = socket.flush().await;
    }
}
