//! In-process link backed by a pair of crossbeam channels.
//!
//! Queues are unbounded: a send never blocks, so two nodes feeding each
//! other cannot deadlock. Closing either end closes the pair.

use crate::link::{Connection, Endpoint, Link, LinkError};
use crate::protocol::Message;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

static NEXT_PAIR_ID: AtomicU64 = AtomicU64::new(0);

/// One end of an in-process link.
pub struct LocalLink {
    tx: Sender<Message>,
    rx: Receiver<Message>,
    closed: Arc<AtomicBool>,
    endpoint: Endpoint,
}

/// Create two connected ends.
pub fn pair() -> (Connection, Connection) {
    let (a, b) = raw_pair();
    (Connection::new(a), Connection::new(b))
}

fn raw_pair() -> (LocalLink, LocalLink) {
    let id = NEXT_PAIR_ID.fetch_add(1, Ordering::Relaxed);
    let (a_tx, b_rx) = unbounded();
    let (b_tx, a_rx) = unbounded();
    let closed = Arc::new(AtomicBool::new(false));
    let a = LocalLink {
        tx: a_tx,
        rx: a_rx,
        closed: closed.clone(),
        endpoint: Endpoint::Local { pair: id, side: 0 },
    };
    let b = LocalLink {
        tx: b_tx,
        rx: b_rx,
        closed,
        endpoint: Endpoint::Local { pair: id, side: 1 },
    };
    (a, b)
}

impl LocalLink {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Link for LocalLink {
    fn send(&self, msg: Message) -> Result<(), LinkError> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }
        self.tx.send(msg).map_err(|_| LinkError::Closed)
    }

    fn receive_timeout(&self, timeout: Duration) -> Result<Option<Message>, LinkError> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }
        if timeout.is_zero() {
            return match self.rx.try_recv() {
                Ok(msg) => Ok(Some(msg)),
                Err(TryRecvError::Empty) => Ok(None),
                Err(TryRecvError::Disconnected) => Err(LinkError::Closed),
            };
        }
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) if self.is_closed() => Err(LinkError::Closed),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::Closed),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn poll(&self) -> bool {
        !self.is_closed()
    }

    fn endpoint(&self) -> Endpoint {
        self.endpoint
    }
}
