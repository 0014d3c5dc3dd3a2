//! Manager-side handle to a running node.

use crate::error::{EngineError, Result};
use crate::link::{Connection, LinkError};
use crate::node::{ParamTree, SlotDescriptor};
use crate::protocol::Message;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const JOIN_POLL: Duration = Duration::from_millis(5);

/// Control connection to a node plus what the manager knows about it.
///
/// Dropping a `NodeRef` terminates the node.
pub struct NodeRef {
    type_name: String,
    connection: Connection,
    inputs: Vec<SlotDescriptor>,
    outputs: Vec<SlotDescriptor>,
    params: ParamTree,
    ping_gate: Arc<Mutex<()>>,
    thread: Option<JoinHandle<()>>,
    grace: Duration,
    terminated: bool,
}

impl NodeRef {
    pub fn new(
        type_name: impl Into<String>,
        connection: Connection,
        inputs: &[SlotDescriptor],
        outputs: &[SlotDescriptor],
        params: ParamTree,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            connection,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
            params,
            ping_gate: Arc::new(Mutex::new(())),
            thread: None,
            grace: Duration::from_secs(1),
            terminated: false,
        }
    }

    /// Attach the thread running the node; `terminate` waits up to `grace` for it.
    pub fn with_thread(mut self, thread: JoinHandle<()>, grace: Duration) -> Self {
        self.thread = Some(thread);
        self.grace = grace;
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn input_slots(&self) -> &[SlotDescriptor] {
        &self.inputs
    }

    pub fn output_slots(&self) -> &[SlotDescriptor] {
        &self.outputs
    }

    pub fn input_slot(&self, name: &str) -> Option<&SlotDescriptor> {
        SlotDescriptor::find(&self.inputs, name)
    }

    pub fn output_slot(&self, name: &str) -> Option<&SlotDescriptor> {
        SlotDescriptor::find(&self.outputs, name)
    }

    /// Manager-side mirror of the node's parameters.
    pub fn params(&self) -> &ParamTree {
        &self.params
    }

    pub(crate) fn params_mut(&mut self) -> &mut ParamTree {
        &mut self.params
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Whether the link is open and the node thread (if any) still runs.
    pub fn is_alive(&self) -> bool {
        !self.terminated
            && self.connection.poll()
            && self.thread.as_ref().map_or(true, |t| !t.is_finished())
    }

    pub fn send(&self, msg: Message) -> Result<()> {
        if self.terminated {
            return Err(EngineError::IllegalState("node already terminated".into()));
        }
        self.connection.send(msg).map_err(EngineError::from)
    }

    /// Send PING and wait up to `timeout` for PONG. `Ok(false)` on timeout.
    pub fn ping(&self, timeout: Duration) -> Result<bool> {
        self.pinger()?.ping(timeout)
    }

    /// Detached handle for pinging without borrowing the reference.
    pub(crate) fn pinger(&self) -> Result<Pinger> {
        if self.terminated {
            return Err(EngineError::IllegalState("node already terminated".into()));
        }
        Ok(Pinger {
            connection: self.connection.clone(),
            gate: Arc::clone(&self.ping_gate),
        })
    }

    /// Send TERMINATE and close the link. Safe on an already-closed link.
    pub(crate) fn signal_terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        match self.connection.send(Message::Terminate) {
            Ok(()) | Err(LinkError::Closed) => {}
            Err(e) => warn!("Could not deliver TERMINATE: {}", e),
        }
        self.connection.close();
    }

    /// Wait up to the grace period for the node thread; detach it otherwise.
    pub(crate) fn join(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };
        let deadline = Instant::now() + self.grace;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(JOIN_POLL);
        }
        if handle.is_finished() {
            if handle.join().is_err() {
                warn!("Node thread panicked during shutdown");
            }
        } else {
            warn!(
                "Node did not stop within {:?}; detaching its thread",
                self.grace
            );
        }
    }

    /// Terminate the node. Idempotent.
    pub fn terminate(&mut self) {
        self.signal_terminate();
        self.join();
    }
}

/// Control connection of one node plus the gate that keeps its pings from
/// taking each other's PONG.
pub(crate) struct Pinger {
    connection: Connection,
    gate: Arc<Mutex<()>>,
}

impl Pinger {
    /// Messages already queued on the link are discarded first, so a PONG
    /// that answered an earlier, timed-out ping is not mistaken for this one.
    pub(crate) fn ping(&self, timeout: Duration) -> Result<bool> {
        let _gate = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        while let Some(stale) = self.connection.try_receive()? {
            debug!("Discarding stale {} before PING", stale.kind());
        }
        self.connection.send(Message::Ping)?;
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            match self.connection.receive_timeout(remaining)? {
                Some(Message::Pong) => return Ok(true),
                Some(other) => debug!("Ignoring {} while waiting for PONG", other.kind()),
                None => return Ok(false),
            }
        }
    }
}

impl Drop for NodeRef {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("type_name", &self.type_name)
            .field("connection", &self.connection)
            .field("terminated", &self.terminated)
            .finish()
    }
}
