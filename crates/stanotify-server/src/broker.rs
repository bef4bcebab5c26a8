//! Delivery of serialized notifications to subscribed clients.

use bytes::Bytes;
use nng::{Message, Protocol, Socket};

use crate::error::Error;

/// Delivery guarantee requested for a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = Error;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(Error::Config(format!("invalid QoS level {}", other))),
        }
    }
}

/// Transport that fans a published payload out to a topic's subscribers.
pub trait Broker: Send + Sync {
    /// Publish `payload` once on `topic`.
    fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<(), Error>;
}

/// Separator between topic and payload in published messages.
pub const TOPIC_SEPARATOR: u8 = 0;

/// Encode a published message: topic bytes, a NUL separator, then the payload.
///
/// NNG subscribers filter on message prefixes, so subscribing to
/// `"<topic>\0"` receives exactly that topic.
pub fn encode_publish(topic: &str, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(topic.len() + 1 + payload.len());
    buf.extend_from_slice(topic.as_bytes());
    buf.push(TOPIC_SEPARATOR);
    buf.extend_from_slice(payload);
    buf
}

/// Split a published message into topic and payload.
pub fn decode_publish(message: &[u8]) -> Option<(&str, &[u8])> {
    let split = message.iter().position(|&b| b == TOPIC_SEPARATOR)?;
    let topic = std::str::from_utf8(&message[..split]).ok()?;
    Some((topic, &message[split + 1..]))
}

/// Broker publishing over an NNG PUB socket.
///
/// NNG delivers at most once; the requested QoS is only recorded in logs.
pub struct NngBroker {
    socket: Socket,
}

impl NngBroker {
    /// Create a PUB socket listening on `address`.
    pub fn listen(address: &str) -> Result<Self, Error> {
        let socket = Socket::new(Protocol::Pub0)
            .map_err(|e| Error::Transport(format!("failed to create socket: {}", e)))?;
        socket
            .listen(address)
            .map_err(|e| Error::Transport(format!("failed to listen on {}: {}", address, e)))?;

        tracing::info!(address, "publishing notifications");
        Ok(Self { socket })
    }
}

impl Broker for NngBroker {
    fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<(), Error> {
        let message = Message::from(encode_publish(topic, &payload).as_slice());
        self.socket
            .send(message)
            .map_err(|(_, e)| Error::Transport(format!("publish to {} failed: {}", topic, e)))?;

        tracing::trace!(topic, bytes = payload.len(), qos = ?qos, "notification published");
        Ok(())
    }
}
