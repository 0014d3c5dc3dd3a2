//! Stream-socket link.
//!
//! A node listens through a [`TcpHost`]. Every stream the host accepts feeds
//! one shared inbox; replies go to the first stream accepted, which is the
//! controller (the manager). Peers that deliver DATA open additional streams
//! with [`TcpLink::dial`]. When the controller stream ends the host closes.

use crate::link::{wire, Endpoint, Link, LinkError};
use crate::protocol::Message;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

const ACCEPT_POLL: Duration = Duration::from_millis(10);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Read newline-delimited frames from `stream` into `inbox` until EOF.
/// `on_eof` is raised when the stream ends.
fn spawn_reader(
    stream: TcpStream,
    inbox: Sender<Message>,
    on_eof: Option<Arc<AtomicBool>>,
) -> io::Result<()> {
    let peer = stream.peer_addr().ok();
    thread::Builder::new()
        .name("pipegraph-tcp-reader".into())
        .spawn(move || {
            for line in BufReader::new(stream).lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        debug!("Read from {:?} ended: {}", peer, e);
                        break;
                    }
                };
                if line.is_empty() {
                    continue;
                }
                match wire::decode(&line) {
                    Ok(msg) => {
                        if inbox.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Dropping undecodable frame from {:?}: {}", peer, e),
                }
            }
            if let Some(flag) = on_eof {
                flag.store(true, Ordering::Release);
            }
        })?;
    Ok(())
}

fn receive_from(
    inbox: &Receiver<Message>,
    closed: &AtomicBool,
    timeout: Duration,
) -> Result<Option<Message>, LinkError> {
    if let Ok(msg) = inbox.try_recv() {
        return Ok(Some(msg));
    }
    if closed.load(Ordering::Acquire) {
        return Err(LinkError::Closed);
    }
    if timeout.is_zero() {
        return Ok(None);
    }
    match inbox.recv_timeout(timeout) {
        Ok(msg) => Ok(Some(msg)),
        Err(RecvTimeoutError::Timeout) if closed.load(Ordering::Acquire) => Err(LinkError::Closed),
        Err(RecvTimeoutError::Timeout) => Ok(None),
        Err(RecvTimeoutError::Disconnected) => Err(LinkError::Closed),
    }
}

fn write_frame(stream: &mut TcpStream, msg: &Message) -> Result<(), LinkError> {
    let line = wire::encode(msg)?;
    stream.write_all(line.as_bytes()).map_err(|e| {
        debug!("Write failed: {}", e);
        LinkError::Closed
    })
}

/// Client side of a socket link: the manager's control link to a node, or a
/// node's pipe to a downstream node.
pub struct TcpLink {
    addr: SocketAddr,
    stream: Mutex<Option<TcpStream>>,
    inbox_tx: Sender<Message>,
    inbox: Receiver<Message>,
    closed: Arc<AtomicBool>,
}

impl TcpLink {
    /// Connect now. Fails if nothing listens at `addr`.
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, LinkError> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "no socket address"))?;
        let link = Self::dial(addr);
        link.ensure_connected()?;
        Ok(link)
    }

    /// Create a link that connects on first use.
    pub fn dial(addr: SocketAddr) -> Self {
        let (inbox_tx, inbox) = unbounded();
        Self {
            addr,
            stream: Mutex::new(None),
            inbox_tx,
            inbox,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    fn ensure_connected(&self) -> Result<(), LinkError> {
        let mut guard = lock(&self.stream);
        if guard.is_some() {
            return Ok(());
        }
        let stream = TcpStream::connect(self.addr).map_err(|e| {
            debug!("Connect to {} failed: {}", self.addr, e);
            self.closed.store(true, Ordering::Release);
            LinkError::Closed
        })?;
        stream.set_nodelay(true)?;
        spawn_reader(
            stream.try_clone()?,
            self.inbox_tx.clone(),
            Some(self.closed.clone()),
        )?;
        *guard = Some(stream);
        Ok(())
    }
}

impl Link for TcpLink {
    fn send(&self, msg: Message) -> Result<(), LinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LinkError::Closed);
        }
        self.ensure_connected()?;
        let mut guard = lock(&self.stream);
        let stream = guard.as_mut().ok_or(LinkError::Closed)?;
        write_frame(stream, &msg).inspect_err(|e| {
            if matches!(e, LinkError::Closed) {
                self.closed.store(true, Ordering::Release);
            }
        })
    }

    fn receive_timeout(&self, timeout: Duration) -> Result<Option<Message>, LinkError> {
        receive_from(&self.inbox, &self.closed, timeout)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(stream) = lock(&self.stream).as_ref() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn poll(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::Tcp(self.addr)
    }
}

impl Drop for TcpLink {
    fn drop(&mut self) {
        if let Some(stream) = lock(&self.stream).take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// Listening side of a node's socket links.
pub struct TcpHost {
    addr: SocketAddr,
    inbox: Receiver<Message>,
    controller: Arc<Mutex<Option<TcpStream>>>,
    streams: Arc<Mutex<Vec<TcpStream>>>,
    closed: Arc<AtomicBool>,
}

impl TcpHost {
    /// Bind and start accepting. Use port 0 for an ephemeral port.
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self, LinkError> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let (inbox_tx, inbox) = unbounded();
        let controller = Arc::new(Mutex::new(None));
        let streams = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let accept = Acceptor {
            listener,
            inbox_tx,
            controller: controller.clone(),
            streams: streams.clone(),
            closed: closed.clone(),
        };
        thread::Builder::new()
            .name("pipegraph-tcp-accept".into())
            .spawn(move || accept.run())?;

        debug!("Node host listening on {}", addr);
        Ok(Self {
            addr,
            inbox,
            controller,
            streams,
            closed,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Link for TcpHost {
    fn send(&self, msg: Message) -> Result<(), LinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LinkError::Closed);
        }
        let mut guard = lock(&self.controller);
        let stream = guard.as_mut().ok_or(LinkError::Closed)?;
        write_frame(stream, &msg)
    }

    fn receive_timeout(&self, timeout: Duration) -> Result<Option<Message>, LinkError> {
        receive_from(&self.inbox, &self.closed, timeout)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for stream in lock(&self.streams).drain(..) {
            let _ = stream.shutdown(Shutdown::Both);
        }
        lock(&self.controller).take();
    }

    fn poll(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::Tcp(self.addr)
    }
}

impl Drop for TcpHost {
    fn drop(&mut self) {
        self.close();
    }
}

struct Acceptor {
    listener: TcpListener,
    inbox_tx: Sender<Message>,
    controller: Arc<Mutex<Option<TcpStream>>>,
    streams: Arc<Mutex<Vec<TcpStream>>>,
    closed: Arc<AtomicBool>,
}

impl Acceptor {
    fn run(self) {
        while !self.closed.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = self.register(stream) {
                        warn!("Failed to register stream from {}: {}", peer, e);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }
    }

    fn register(&self, stream: TcpStream) -> io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        lock(&self.streams).push(stream.try_clone()?);

        let mut controller = lock(&self.controller);
        let on_eof = if controller.is_none() {
            *controller = Some(stream.try_clone()?);
            Some(self.closed.clone())
        } else {
            None
        };
        drop(controller);
        spawn_reader(stream, self.inbox_tx.clone(), on_eof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::Connection;
    use crate::protocol::{Data, MessageType};
    use std::time::Instant;

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_controller_round_trip() {
        let host = TcpHost::bind("127.0.0.1:0").unwrap();
        let link = TcpLink::connect(host.local_addr()).unwrap();

        link.send(Message::Ping).unwrap();
        let got = host.receive_timeout(Duration::from_secs(2)).unwrap().unwrap();
        assert_eq!(got.kind(), MessageType::Ping);

        host.send(Message::Pong).unwrap();
        let got = link.receive_timeout(Duration::from_secs(2)).unwrap().unwrap();
        assert_eq!(got.kind(), MessageType::Pong);
    }

    #[test]
    fn test_dialled_peer_feeds_the_same_inbox() {
        let host = TcpHost::bind("127.0.0.1:0").unwrap();
        let _controller = TcpLink::connect(host.local_addr()).unwrap();
        let peer = Connection::new(TcpLink::dial(host.local_addr()));
        assert!(peer.poll());

        peer.send(Message::data("in", Data::array(vec![4.0]))).unwrap();
        match host.receive_timeout(Duration::from_secs(2)).unwrap() {
            Some(Message::Data { slot_name, data }) => {
                assert_eq!(slot_name, "in");
                assert_eq!(data.as_array().unwrap().values(), &[4.0]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_non_finite_samples_are_delivered() {
        let host = TcpHost::bind("127.0.0.1:0").unwrap();
        let link = TcpLink::connect(host.local_addr()).unwrap();

        let samples = vec![f64::NAN, f64::INFINITY, -2.5];
        link.send(Message::data("in", Data::array(samples))).unwrap();
        match host.receive_timeout(Duration::from_secs(2)).unwrap() {
            Some(Message::Data { data, .. }) => {
                let values = data.as_array().unwrap().values();
                assert!(values[0].is_nan());
                assert_eq!(values[1], f64::INFINITY);
                assert_eq!(values[2], -2.5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_closing_controller_closes_host() {
        let host = TcpHost::bind("127.0.0.1:0").unwrap();
        let link = TcpLink::connect(host.local_addr()).unwrap();
        link.send(Message::Terminate).unwrap();
        link.close();
        assert!(wait_for(|| !host.poll()));
        // Queued frames are still delivered before the host reports closed.
        let first = host.receive_timeout(Duration::ZERO);
        assert!(matches!(first, Ok(Some(Message::Terminate))));
        assert!(matches!(host.receive_timeout(Duration::ZERO), Err(LinkError::Closed)));
    }

    #[test]
    fn test_unreachable_peer_reports_closed() {
        let addr = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap()
        };
        let link = TcpLink::dial(addr);
        assert!(matches!(link.send(Message::Ping), Err(LinkError::Closed)));
        assert!(!link.poll());
    }

    #[test]
    fn test_host_close_is_seen_by_client() {
        let host = TcpHost::bind("127.0.0.1:0").unwrap();
        let link = TcpLink::connect(host.local_addr()).unwrap();
        // Make sure the host accepted the stream before closing it.
        link.send(Message::Ping).unwrap();
        host.receive_timeout(Duration::from_secs(2)).unwrap().unwrap();
        host.close();
        assert!(wait_for(|| !link.poll()));
    }
}
