//! Duplex, ordered, message-typed channels.
//!
//! A [`Link`] is one endpoint of a channel between exactly two parties. The
//! node runtime and the manager only ever see [`Connection`], a cloneable
//! handle over any link implementation, so neither cares whether the peer is
//! a thread behind a crossbeam channel or a socket.
//!
//! Messages sent on a link arrive in send order, or the link reports closed.

pub mod local;
pub mod tcp;
pub mod wire;

use crate::error::ValidationError;
use crate::protocol::Message;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Granularity of blocking receives; bounds how long a closed link can go
/// unnoticed by a blocked receiver.
const RECEIVE_SLICE: Duration = Duration::from_millis(50);

/// Errors reported by a link.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Peer unreachable or link closed by either side
    #[error("link closed")]
    Closed,

    #[error("link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Message cannot be carried by this transport
    #[error("message rejected by link: {0}")]
    Invalid(ValidationError),

    #[error("failed to encode message: {0}")]
    Encode(String),

    #[error("failed to decode frame: {0}")]
    Decode(String),
}

/// Identity of a link endpoint. Clones of one handle share an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    /// One side of an in-process pair.
    Local { pair: u64, side: u8 },
    /// A node host listening on a socket.
    Tcp(SocketAddr),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Local { pair, side } => write!(f, "local:{pair}/{side}"),
            Endpoint::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}

/// Capability set every transport provides.
pub trait Link: Send + Sync {
    /// Send a message. Fails with [`LinkError::Closed`] if the peer is unreachable.
    fn send(&self, msg: Message) -> Result<(), LinkError>;

    /// Wait up to `timeout` for the next message. `Ok(None)` on timeout.
    fn receive_timeout(&self, timeout: Duration) -> Result<Option<Message>, LinkError>;

    /// Close the link. Idempotent.
    fn close(&self);

    /// Non-blocking liveness check: `false` once either side closed.
    fn poll(&self) -> bool;

    fn endpoint(&self) -> Endpoint;
}

/// Transport-agnostic, cloneable handle to a link.
#[derive(Clone)]
pub struct Connection {
    link: Arc<dyn Link>,
}

impl Connection {
    pub fn new(link: impl Link + 'static) -> Self {
        Self {
            link: Arc::new(link),
        }
    }

    pub fn send(&self, msg: Message) -> Result<(), LinkError> {
        self.link.send(msg)
    }

    /// Block until a message arrives or the link closes.
    pub fn receive(&self) -> Result<Message, LinkError> {
        loop {
            if let Some(msg) = self.link.receive_timeout(RECEIVE_SLICE)? {
                return Ok(msg);
            }
        }
    }

    pub fn receive_timeout(&self, timeout: Duration) -> Result<Option<Message>, LinkError> {
        self.link.receive_timeout(timeout)
    }

    /// Non-blocking receive.
    pub fn try_receive(&self) -> Result<Option<Message>, LinkError> {
        self.link.receive_timeout(Duration::ZERO)
    }

    pub fn close(&self) {
        self.link.close()
    }

    pub fn poll(&self) -> bool {
        self.link.poll()
    }

    pub fn endpoint(&self) -> Endpoint {
        self.link.endpoint()
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.endpoint() == other.endpoint()
    }
}

impl Eq for Connection {}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint())
            .field("open", &self.poll())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_endpoint() {
        let (a, b) = local::pair();
        let a2 = a.clone();
        assert_eq!(a, a2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_blocking_receive_returns_on_close() {
        let (a, b) = local::pair();
        let handle = std::thread::spawn(move || b.receive());
        std::thread::sleep(Duration::from_millis(20));
        a.close();
        let result = handle.join().unwrap();
        assert!(matches!(result, Err(LinkError::Closed)));
    }

    #[test]
    fn test_endpoint_display() {
        let e = Endpoint::Tcp("127.0.0.1:9000".parse().unwrap());
        assert_eq!(e.to_string(), "tcp:127.0.0.1:9000");
    }
}
