//! Transport seam of the push connection.
//!
//! The connection manager speaks Engine.IO text frames through a `Transport`
//! obtained from a `Connector`. `WebSocketConnector` is the production
//! implementation; tests script their own.
use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, info};
use tick_common::{Result, SyncError};
use tungstenite::client::IntoClientRequest;
use tungstenite::handshake::HandshakeError;
use tungstenite::{Message, WebSocket};

/// What a single read from the transport produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A text frame.
    Text(String),
    /// Nothing arrived within the poll interval (or only control frames did).
    Idle,
    /// The peer closed the transport, with its reason when one was given.
    Closed(Option<String>),
}

/// An open, bidirectional text-frame transport.
pub trait Transport: Send {
    /// Wait up to the poll interval for the next frame.
    fn recv(&mut self) -> Result<Incoming>;

    /// Send one text frame.
    fn send(&mut self, frame: &str) -> Result<()>;

    /// Close the transport. Calling it again is a no-op.
    fn close(&mut self);
}

/// Opens transports to the push endpoint.
pub trait Connector: Send + Sync {
    /// Establish a new transport.
    fn connect(&self) -> Result<Box<dyn Transport>>;
}

/// Connects to a Socket.IO server over a plain WebSocket.
///
/// Both the TCP connect and the HTTP upgrade are bounded by `handshake_timeout`, so
/// a server that accepts the socket and then stays silent fails the attempt instead
/// of stalling it.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    poll_interval: Duration,
    handshake_timeout: Duration,
}

impl WebSocketConnector {
    /// Connector for `url` whose reads return `Incoming::Idle` after `poll_interval`.
    pub fn new(url: impl Into<String>, poll_interval: Duration, handshake_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            poll_interval,
            handshake_timeout,
        }
    }

    fn open_tcp(&self, host: &str, port: u16) -> Result<TcpStream> {
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| SyncError::Connection(format!("resolve {}: {}", host, e)))?;
        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.handshake_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(format!("connect to {} failed: {}", addr, e)),
            }
        }
        Err(SyncError::Connection(
            last_error.unwrap_or_else(|| format!("{} resolved to no address", host)),
        ))
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self) -> Result<Box<dyn Transport>> {
        debug!("Opening WebSocket to {}", self.url);
        let request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| SyncError::Connection(format!("bad push URL {}: {}", self.url, e)))?;
        let uri = request.uri();
        if uri.scheme_str() != Some("ws") {
            return Err(SyncError::Connection(format!(
                "unsupported push URL {}: only ws:// is available",
                self.url
            )));
        }
        let host = uri
            .host()
            .ok_or_else(|| SyncError::Connection(format!("push URL {} has no host", self.url)))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = uri.port_u16().unwrap_or(80);

        let stream = self.open_tcp(&host, port)?;
        stream
            .set_read_timeout(Some(self.handshake_timeout))
            .and_then(|_| stream.set_write_timeout(Some(self.handshake_timeout)))
            .and_then(|_| stream.set_nodelay(true))
            .map_err(|e| SyncError::Connection(format!("configure socket: {}", e)))?;

        let (socket, response) = match tungstenite::client(request, stream) {
            Ok(upgraded) => upgraded,
            Err(HandshakeError::Interrupted(_)) => {
                return Err(SyncError::Connection(format!(
                    "upgrade to {} timed out after {:?}",
                    self.url, self.handshake_timeout
                )));
            }
            Err(HandshakeError::Failure(e)) => {
                return Err(SyncError::Connection(format!("upgrade to {} failed: {}", self.url, e)));
            }
        };
        socket
            .get_ref()
            .set_read_timeout(Some(self.poll_interval))
            .map_err(|e| SyncError::Connection(format!("set read timeout: {}", e)))?;
        info!("WebSocket open to {} (HTTP {})", self.url, response.status());
        Ok(Box::new(WebSocketTransport {
            socket,
            closed: false,
        }))
    }
}

struct WebSocketTransport {
    socket: WebSocket<TcpStream>,
    closed: bool,
}

impl Transport for WebSocketTransport {
    fn recv(&mut self) -> Result<Incoming> {
        if self.closed {
            return Ok(Incoming::Closed(None));
        }
        match self.socket.read() {
            Ok(Message::Text(text)) => Ok(Incoming::Text(text.to_string())),
            Ok(Message::Close(frame)) => Ok(Incoming::Closed(
                frame.map(|f| format!("{} {}", u16::from(f.code), f.reason)),
            )),
            Ok(_) => Ok(Incoming::Idle),
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                Ok(Incoming::Idle)
            }
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(Incoming::Closed(None))
            }
            Err(e) => Err(SyncError::Connection(format!("read failed: {}", e))),
        }
    }

    fn send(&mut self, frame: &str) -> Result<()> {
        self.socket
            .send(Message::Text(frame.to_string().into()))
            .map_err(|e| SyncError::Connection(format!("send failed: {}", e)))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.socket.close(None).and_then(|_| self.socket.flush()) {
            debug!("WebSocket close: {}", e);
        }
    }
}
