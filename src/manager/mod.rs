//! The manager: creates and destroys nodes and wires their slots together.
//!
//! All structural state (lifecycle, node container, installed links) lives
//! behind a single mutex, so concurrent callers are serialized. Waits on a
//! node (PONG, thread exit) happen after the mutex is released. The manager
//! never touches data payloads; it only sends control messages.
//!
//! ```ignore
//! let manager = Manager::from_config(&EngineConfig::default());
//! let src = manager.add_node("sine")?;
//! let dst = manager.add_node("scale")?;
//! manager.add_link(&src, &dst, "out", "data")?;
//! manager.run_for(Duration::from_secs(5));
//! ```

pub mod container;
pub mod node_ref;
pub mod observer;

pub use container::NodeContainer;
pub use node_ref::NodeRef;
pub use observer::{ChannelObserver, GraphEvent, GraphObserver};

use crate::config::{EngineConfig, Transport};
use crate::error::{EngineError, Result, ResultExt, ValidationError};
use crate::link::tcp::{TcpHost, TcpLink};
use crate::link::{local, Connection};
use crate::node::{Node, NodeRegistry, NodeRuntime, RuntimeOptions};
use crate::protocol::{Message, ParamValue};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle of a manager. `Terminated` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Running,
    Terminated,
}

/// A pipe from `node_out.slot_out` to `node_in.slot_in`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkSpec {
    pub node_out: String,
    pub node_in: String,
    pub slot_out: String,
    pub slot_in: String,
}

impl LinkSpec {
    pub fn new(
        node_out: impl Into<String>,
        node_in: impl Into<String>,
        slot_out: impl Into<String>,
        slot_in: impl Into<String>,
    ) -> Self {
        Self {
            node_out: node_out.into(),
            node_in: node_in.into(),
            slot_out: slot_out.into(),
            slot_in: slot_in.into(),
        }
    }

    /// Whether either end of the link is `node`.
    pub fn touches(&self, node: &str) -> bool {
        self.node_out == node || self.node_in == node
    }
}

impl fmt::Display for LinkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.node_out, self.slot_out, self.node_in, self.slot_in
        )
    }
}

/// Manager settings, usually derived from [`EngineConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManagerOptions {
    pub transport: Transport,
    pub ping_timeout: Duration,
    pub shutdown_grace: Duration,
    pub runtime: RuntimeOptions,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ManagerOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            transport: config.manager.transport,
            ping_timeout: config.ping_timeout(),
            shutdown_grace: config.shutdown_grace(),
            runtime: config.runtime_options(),
        }
    }
}

struct Inner {
    state: ManagerState,
    nodes: NodeContainer,
    links: Vec<LinkSpec>,
}

/// Orchestrates a live node graph.
pub struct Manager {
    registry: NodeRegistry,
    options: ManagerOptions,
    observer: Option<Arc<dyn GraphObserver>>,
    inner: Mutex<Inner>,
    terminated: Condvar,
}

impl Manager {
    pub fn new(registry: NodeRegistry, options: ManagerOptions) -> Self {
        info!("Manager started ({} transport)", options.transport);
        Self {
            registry,
            options,
            observer: None,
            inner: Mutex::new(Inner {
                state: ManagerState::Running,
                nodes: NodeContainer::new(),
                links: Vec::new(),
            }),
            terminated: Condvar::new(),
        }
    }

    /// Manager with the bundled node types.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(NodeRegistry::builtin(), ManagerOptions::from(config))
    }

    pub fn with_observer(mut self, observer: Arc<dyn GraphObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn running(&self, op: &str) -> Result<MutexGuard<'_, Inner>> {
        let inner = self.lock();
        if inner.state == ManagerState::Terminated {
            return Err(EngineError::IllegalState(format!(
                "cannot {op}: manager is terminated"
            )));
        }
        Ok(inner)
    }

    fn notify(&self, event: GraphEvent) {
        if let Some(observer) = &self.observer {
            event.dispatch(observer.as_ref());
        }
    }

    /// Spawn a runtime for `node`; returns the manager side of its control link.
    fn spawn_runtime(
        &self,
        name: &str,
        node: Box<dyn Node>,
    ) -> Result<(Connection, JoinHandle<()>)> {
        match self.options.transport {
            Transport::Local => {
                let (manager_side, node_side) = local::pair();
                let handle = NodeRuntime::new(name, node, node_side, self.options.runtime).spawn()?;
                Ok((manager_side, handle))
            }
            Transport::Tcp => {
                let host = TcpHost::bind(("127.0.0.1", 0))?;
                let link = TcpLink::connect(host.local_addr())?;
                let node_side = Connection::new(host);
                let handle = NodeRuntime::new(name, node, node_side, self.options.runtime).spawn()?;
                Ok((Connection::new(link), handle))
            }
        }
    }

    /// Create a node of type `type_name` and return its assigned name.
    pub fn add_node(&self, type_name: &str) -> Result<String> {
        let mut inner = self.running("add node")?;

        let node = self.registry.create(type_name)?;
        let base = NodeRegistry::canonical(type_name);
        let inputs = node.input_slots().to_vec();
        let outputs = node.output_slots().to_vec();
        let params = node
            .params()
            .with_common(self.options.runtime.default_max_frequency);

        let name = inner.nodes.next_name(&base);
        let (connection, thread) = self
            .spawn_runtime(&name, node)
            .with_context(|| format!("spawning `{name}`"))?;
        let node_ref = NodeRef::new(base.as_str(), connection, &inputs, &outputs, params)
            .with_thread(thread, self.options.shutdown_grace);
        let assigned = inner.nodes.add(&base, node_ref);
        debug_assert_eq!(assigned, name);
        drop(inner);

        info!("Added node {}", assigned);
        self.notify(GraphEvent::NodeAdded {
            name: assigned.clone(),
            type_name: base,
        });
        Ok(assigned)
    }

    /// Terminate and remove a node. Links held by other nodes towards it are
    /// not retracted; the manager only forgets its own records of them.
    pub fn remove_node(&self, name: &str) -> Result<()> {
        let mut inner = self.running("remove node")?;
        let mut node = inner.nodes.detach(name)?;
        let before = inner.links.len();
        inner.links.retain(|l| !l.touches(name));
        let forgotten = before - inner.links.len();
        drop(inner);
        node.join();

        if forgotten > 0 {
            debug!("Forgot {} link record(s) of {}", forgotten, name);
        }
        info!("Removed node {}", name);
        self.notify(GraphEvent::NodeRemoved {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Subscribe `node_in.slot_in` to `node_out.slot_out`.
    pub fn add_link(
        &self,
        node_out: &str,
        node_in: &str,
        slot_out: &str,
        slot_in: &str,
    ) -> Result<()> {
        let spec = LinkSpec::new(node_out, node_in, slot_out, slot_in);
        let mut inner = self.running("add link")?;

        let out_ref = inner.nodes.get(node_out)?;
        let in_ref = inner.nodes.get(node_in)?;
        let out_slot = out_ref.output_slot(slot_out).ok_or_else(|| {
            EngineError::NotFound(format!("output slot `{slot_out}` on `{node_out}`"))
        })?;
        let in_slot = in_ref.input_slot(slot_in).ok_or_else(|| {
            EngineError::NotFound(format!("input slot `{slot_in}` on `{node_in}`"))
        })?;
        if out_slot.dtype != in_slot.dtype {
            return Err(ValidationError::SlotType {
                slot: format!("{node_in}.{slot_in}"),
                expected: in_slot.dtype,
                found: out_slot.dtype,
            }
            .into());
        }
        if inner.links.contains(&spec) {
            debug!("Link {} already installed", spec);
            return Ok(());
        }

        let target = in_ref.connection().clone();
        out_ref
            .send(Message::add_output_pipe(slot_out, slot_in, target))
            .with_context(|| format!("adding link {spec}"))?;
        inner.links.push(spec.clone());
        drop(inner);

        info!("Added link {}", spec);
        self.notify(GraphEvent::LinkAdded(spec));
        Ok(())
    }

    /// Undo [`add_link`](Self::add_link).
    pub fn remove_link(
        &self,
        node_out: &str,
        node_in: &str,
        slot_out: &str,
        slot_in: &str,
    ) -> Result<()> {
        let spec = LinkSpec::new(node_out, node_in, slot_out, slot_in);
        let mut inner = self.running("remove link")?;

        let out_ref = inner.nodes.get(node_out)?;
        let in_ref = inner.nodes.get(node_in)?;
        let index = inner
            .links
            .iter()
            .position(|l| *l == spec)
            .ok_or_else(|| EngineError::NotFound(format!("link {spec}")))?;

        let target = in_ref.connection().clone();
        out_ref
            .send(Message::remove_output_pipe(slot_out, slot_in, target))
            .with_context(|| format!("removing link {spec}"))?;
        inner.links.remove(index);
        drop(inner);

        info!("Removed link {}", spec);
        self.notify(GraphEvent::LinkRemoved(spec));
        Ok(())
    }

    /// Change a parameter. The value is checked against the node's declared
    /// parameter before it is sent.
    pub fn set_param(
        &self,
        node: &str,
        group: &str,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<()> {
        let value = value.into();
        let mut inner = self.running("set parameter")?;
        let node_ref = inner.nodes.get_mut(node)?;

        let mut mirror = node_ref.params().clone();
        mirror.update(group, name, value.clone())?;
        node_ref
            .send(Message::parameter_update(group, name, value))
            .with_context(|| format!("updating {node}.{group}.{name}"))?;
        *node_ref.params_mut() = mirror;
        // Triggers fire once on the node; the mirror stays at rest.
        node_ref.params_mut().take_trigger(group, name);
        Ok(())
    }

    /// Reset an input slot of `node` to empty.
    pub fn clear_data(&self, node: &str, slot: &str) -> Result<()> {
        let inner = self.running("clear data")?;
        let node_ref = inner.nodes.get(node)?;
        if node_ref.input_slot(slot).is_none() {
            return Err(EngineError::NotFound(format!(
                "input slot `{slot}` on `{node}`"
            )));
        }
        node_ref
            .send(Message::clear_data(slot))
            .with_context(|| format!("clearing {node}.{slot}"))
    }

    /// Health-check a node. `Ok(false)` when it did not answer in time.
    pub fn ping(&self, node: &str) -> Result<bool> {
        let pinger = self.running("ping")?.nodes.get(node)?.pinger()?;
        pinger.ping(self.options.ping_timeout)
    }

    /// Node names in creation order.
    pub fn node_names(&self) -> Vec<String> {
        self.lock().nodes.names().map(str::to_string).collect()
    }

    /// Type name of a node.
    pub fn node_type(&self, node: &str) -> Result<String> {
        Ok(self.lock().nodes.get(node)?.type_name().to_string())
    }

    /// Links installed through this manager.
    pub fn links(&self) -> Vec<LinkSpec> {
        self.lock().links.clone()
    }

    pub fn state(&self) -> ManagerState {
        self.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == ManagerState::Running
    }

    /// Block until `terminate` has been called.
    pub fn wait_until_terminated(&self) {
        let mut inner = self.lock();
        while inner.state == ManagerState::Running {
            inner = self
                .terminated
                .wait(inner)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Keep the graph running for `duration` (or until terminated
    /// elsewhere), then terminate.
    pub fn run_for(&self, duration: Duration) {
        let inner = self.lock();
        let (inner, _) = self
            .terminated
            .wait_timeout_while(inner, duration, |i| i.state == ManagerState::Running)
            .unwrap_or_else(|e| e.into_inner());
        drop(inner);
        self.terminate();
    }

    /// Terminate every node and enter the terminal state. Idempotent;
    /// individual node failures are logged, never propagated.
    pub fn terminate(&self) {
        let mut inner = self.lock();
        if inner.state == ManagerState::Terminated {
            debug!("Manager already terminated");
            return;
        }
        inner.state = ManagerState::Terminated;
        let stopping = inner.nodes.detach_all();
        inner.links.clear();
        drop(inner);
        self.terminated.notify_all();

        let count = stopping.len();
        for mut node in stopping {
            node.join();
        }

        info!("Manager terminated ({} node(s) stopped)", count);
        self.notify(GraphEvent::Terminated);
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("Manager dropped while running; terminating");
            self.terminate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeContext, NodeError, Outputs, Param, ParamTree};
    use std::thread;
    use std::time::Instant;
    use std::result::Result;

    fn manager() -> Manager {
        Manager::new(NodeRegistry::builtin(), ManagerOptions::default())
    }

    /// Blocks its thread for a while whenever `stall.go` is triggered.
    struct Staller;

    impl Node for Staller {
        fn params(&self) -> ParamTree {
            ParamTree::new().group("stall", [("go", Param::trigger())])
        }

        fn process(&mut self, _ctx: &mut NodeContext) -> Result<Option<Outputs>, NodeError> {
            thread::sleep(Duration::from_millis(600));
            Ok(None)
        }
    }

    fn stalling_manager() -> Arc<Manager> {
        let mut registry = NodeRegistry::builtin();
        registry.register("staller", || Ok(Box::new(Staller) as Box<dyn Node>));
        let options = ManagerOptions {
            ping_timeout: Duration::from_millis(400),
            shutdown_grace: Duration::from_millis(400),
            ..ManagerOptions::default()
        };
        Arc::new(Manager::new(registry, options))
    }

    #[test]
    fn test_slow_ping_does_not_block_other_calls() {
        let m = stalling_manager();
        let staller = m.add_node("staller").unwrap();
        m.set_param(&staller, "stall", "go", true).unwrap();
        thread::sleep(Duration::from_millis(50));

        let pinging = {
            let m = Arc::clone(&m);
            thread::spawn(move || m.ping(&staller).unwrap())
        };
        thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        m.add_node("scale").unwrap();
        assert!(started.elapsed() < Duration::from_millis(250));

        assert!(!pinging.join().unwrap());
        m.terminate();
    }

    #[test]
    fn test_slow_removal_does_not_block_other_calls() {
        let m = stalling_manager();
        let staller = m.add_node("staller").unwrap();
        m.set_param(&staller, "stall", "go", true).unwrap();
        thread::sleep(Duration::from_millis(50));

        let removing = {
            let m = Arc::clone(&m);
            let name = staller.clone();
            thread::spawn(move || m.remove_node(&name).unwrap())
        };
        thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        assert!(!m.node_names().contains(&staller));
        m.add_node("scale").unwrap();
        assert!(started.elapsed() < Duration::from_millis(250));

        removing.join().unwrap();
        m.terminate();
    }

    #[test]
    fn test_add_node_names_by_type() {
        let m = manager();
        assert_eq!(m.add_node("Sine").unwrap(), "sine0");
        assert_eq!(m.add_node("sine").unwrap(), "sine1");
        assert_eq!(m.node_type("sine1").unwrap(), "sine");
        m.terminate();
    }

    #[test]
    fn test_unknown_type_registers_nothing() {
        let m = manager();
        assert!(m.add_node("nope").unwrap_err().is_not_found());
        assert!(m.node_names().is_empty());
        m.terminate();
    }

    #[test]
    fn test_add_link_checks_slots() {
        let m = manager();
        let src = m.add_node("sine").unwrap();
        let dst = m.add_node("scale").unwrap();
        let table = m.add_node("tableselectstring").unwrap();

        assert!(m.add_link(&src, &dst, "nope", "data").unwrap_err().is_not_found());
        assert!(m.add_link(&src, &dst, "out", "nope").unwrap_err().is_not_found());
        assert!(m.add_link(&src, "ghost0", "out", "data").unwrap_err().is_not_found());
        assert!(m
            .add_link(&src, &table, "out", "input_table")
            .unwrap_err()
            .is_validation());
        assert!(m.links().is_empty());

        m.add_link(&src, &dst, "out", "data").unwrap();
        m.add_link(&src, &dst, "out", "data").unwrap();
        assert_eq!(m.links(), vec![LinkSpec::new(&src, &dst, "out", "data")]);
        m.terminate();
    }

    #[test]
    fn test_remove_unknown_link_is_not_found() {
        let m = manager();
        let src = m.add_node("sine").unwrap();
        let dst = m.add_node("scale").unwrap();
        assert!(m
            .remove_link(&src, &dst, "out", "data")
            .unwrap_err()
            .is_not_found());
        m.terminate();
    }

    #[test]
    fn test_remove_node_forgets_its_links() {
        let m = manager();
        let src = m.add_node("sine").unwrap();
        let dst = m.add_node("scale").unwrap();
        m.add_link(&src, &dst, "out", "data").unwrap();
        m.remove_node(&dst).unwrap();
        assert!(m.links().is_empty());
        assert_eq!(m.node_names(), vec![src]);
        m.terminate();
    }

    #[test]
    fn test_set_param_validates_synchronously() {
        let m = manager();
        let src = m.add_node("sine").unwrap();
        assert!(m.set_param(&src, "sine", "frequency", 9000.0).unwrap_err().is_validation());
        assert!(m.set_param(&src, "sine", "nope", 1.0).unwrap_err().is_validation());
        m.set_param(&src, "sine", "frequency", 5.0).unwrap();
        assert!(m.set_param("ghost0", "sine", "frequency", 5.0).unwrap_err().is_not_found());
        m.terminate();
    }

    #[test]
    fn test_operations_after_terminate_are_illegal() {
        let m = manager();
        let src = m.add_node("sine").unwrap();
        m.terminate();
        m.terminate();
        assert!(!m.is_running());
        assert!(m.add_node("sine").unwrap_err().is_illegal_state());
        assert!(m.remove_node(&src).unwrap_err().is_illegal_state());
        assert!(m.add_link(&src, &src, "out", "in").unwrap_err().is_illegal_state());
        assert!(m.remove_link(&src, &src, "out", "in").unwrap_err().is_illegal_state());
        assert!(m.node_names().is_empty());
    }

    #[test]
    fn test_ping_live_node() {
        let m = manager();
        let src = m.add_node("scale").unwrap();
        assert!(m.ping(&src).unwrap());
        m.terminate();
    }

    #[test]
    fn test_run_for_terminates() {
        let m = manager();
        m.add_node("sine").unwrap();
        m.run_for(Duration::from_millis(50));
        assert_eq!(m.state(), ManagerState::Terminated);
        m.wait_until_terminated();
    }
}
