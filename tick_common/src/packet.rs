//! Push-connection wire codec.
//!
//! The tick feed is served over Socket.IO, i.e. Engine.IO v4 text frames carried by
//! a WebSocket. Every frame starts with a one-digit Engine.IO packet type; message
//! frames (`4`) wrap a Socket.IO packet whose first digit is its own type, optionally
//! followed by a `/namespace,` prefix, a numeric ack id and a JSON body.
//!
//! Only the subset a read-mostly client needs is modelled: the open handshake,
//! heartbeat ping/pong, namespace connect/disconnect, events and connect errors.
//! Binary attachments are rejected.

use serde::Deserialize;
use serde_json::Value;

use crate::error::SyncError;
use crate::result::Result;

/// Engine.IO handshake sent by the server as the first frame of a session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Session id.
    pub sid: String,
    /// Transports the session may upgrade to.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Interval between server pings, in milliseconds.
    pub ping_interval: u64,
    /// Grace period after a missed ping, in milliseconds.
    pub ping_timeout: u64,
    /// Largest payload the server accepts, in bytes.
    #[serde(default)]
    pub max_payload: Option<u64>,
}

/// Socket.IO packet carried inside an Engine.IO message frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    /// Namespace connection accepted (payload usually carries the socket id).
    Connect(Option<Value>),
    /// Namespace disconnected by the server.
    Disconnect,
    /// Named event with its first argument (or `Null` when sent without one).
    Event {
        /// Event name.
        name: String,
        /// First event argument.
        payload: Value,
    },
    /// Acknowledgement of an emitted event; unused by this client.
    Ack,
    /// Namespace connection refused.
    ConnectError(Value),
}

/// Engine.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Session handshake.
    Open(Handshake),
    /// Server is closing the session.
    Close,
    /// Heartbeat ping from the server; must be answered with `Pong`.
    Ping,
    /// Heartbeat answer.
    Pong,
    /// Socket.IO payload.
    Message(SocketPacket),
    /// Transport upgrade/noop frames; carry nothing for this client.
    Noop,
}

/// Decode one text frame.
pub fn decode(frame: &str) -> Result<Packet> {
    let mut chars = frame.chars();
    let kind = chars
        .next()
        .ok_or_else(|| SyncError::Protocol("empty frame".to_string()))?;
    let body = chars.as_str();

    match kind {
        '0' => serde_json::from_str::<Handshake>(body)
            .map(Packet::Open)
            .map_err(|e| SyncError::Protocol(format!("bad open handshake: {}", e))),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_socket(body).map(Packet::Message),
        '5' | '6' => Ok(Packet::Noop),
        other => Err(SyncError::Protocol(format!(
            "unknown engine packet type {:?}",
            other
        ))),
    }
}

/// Encode a client-originated packet into a text frame.
pub fn encode(packet: &Packet) -> Result<String> {
    match packet {
        Packet::Ping => Ok("2".to_string()),
        Packet::Pong => Ok("3".to_string()),
        Packet::Close => Ok("1".to_string()),
        Packet::Message(SocketPacket::Connect(None)) => Ok("40".to_string()),
        Packet::Message(SocketPacket::Connect(Some(auth))) => Ok(format!("40{}", auth)),
        Packet::Message(SocketPacket::Disconnect) => Ok("41".to_string()),
        Packet::Message(SocketPacket::Event { name, payload }) => {
            Ok(format!("42{}", Value::Array(vec![Value::String(name.clone()), payload.clone()])))
        }
        other => Err(SyncError::Format(format!(
            "packet {:?} is never sent by a client",
            other
        ))),
    }
}

fn decode_socket(body: &str) -> Result<SocketPacket> {
    let mut chars = body.chars();
    let kind = chars
        .next()
        .ok_or_else(|| SyncError::Protocol("empty socket packet".to_string()))?;
    let rest = skip_ack_id(skip_namespace(chars.as_str()));

    match kind {
        '0' => Ok(SocketPacket::Connect(parse_optional_json(rest)?)),
        '1' => Ok(SocketPacket::Disconnect),
        '2' => decode_event(rest),
        '3' => Ok(SocketPacket::Ack),
        '4' => Ok(SocketPacket::ConnectError(
            parse_optional_json(rest)?.unwrap_or(Value::Null),
        )),
        '5' | '6' => Err(SyncError::Protocol(
            "binary socket packets are not supported".to_string(),
        )),
        other => Err(SyncError::Protocol(format!(
            "unknown socket packet type {:?}",
            other
        ))),
    }
}

fn decode_event(body: &str) -> Result<SocketPacket> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| SyncError::Protocol(format!("event body is not JSON: {}", e)))?;
    let Value::Array(mut args) = value else {
        return Err(SyncError::Protocol("event body is not an array".to_string()));
    };
    if args.is_empty() {
        return Err(SyncError::Protocol("event without a name".to_string()));
    }
    let name = match args.remove(0) {
        Value::String(name) => name,
        other => {
            return Err(SyncError::Protocol(format!(
                "event name is not a string: {}",
                other
            )));
        }
    };
    let payload = if args.is_empty() {
        Value::Null
    } else {
        args.swap_remove(0)
    };
    Ok(SocketPacket::Event { name, payload })
}

/// Strip a leading `/namespace,` prefix.
fn skip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        match body.find(',') {
            Some(idx) => &body[idx + 1..],
            None => "",
        }
    } else {
        body
    }
}

/// Strip a leading numeric ack id.
fn skip_ack_id(body: &str) -> &str {
    body.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn parse_optional_json(body: &str) -> Result<Option<Value>> {
    if body.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(body)
        .map(Some)
        .map_err(|e| SyncError::Protocol(format!("packet body is not JSON: {}", e)))
}
