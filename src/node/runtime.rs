//! Per-node execution loop.
//!
//! The runtime waits on its control link, drains every pending message, and
//! then decides whether to run a processing step:
//!
//! - a trigger parameter fired,
//! - an input slot received fresh data (reactive), or
//! - `common.autotrigger` is set and one period (`1 / max_frequency`) has
//!   elapsed since the last step.
//!
//! TERMINATE stops the loop as soon as it is read, so no processing step runs
//! after it. Panics in `setup`/`process` are caught here and never unwind
//! into the loop.

use crate::link::{Connection, LinkError};
use crate::node::params::ParamTree;
use crate::node::slots::{InputSlots, OutputSlots};
use crate::node::{Node, NodeContext, NodeError, Outputs};
use crate::protocol::Message;
use std::any::Any;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Knobs shared by every runtime a manager spawns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeOptions {
    /// Longest a runtime blocks waiting for a message.
    pub idle_wait: Duration,
    /// `common.max_frequency` for nodes that do not declare their own.
    pub default_max_frequency: f64,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            idle_wait: Duration::from_millis(100),
            default_max_frequency: 30.0,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Owns one node body and its slot/parameter state.
pub struct NodeRuntime {
    name: String,
    node: Box<dyn Node>,
    control: Connection,
    inputs: InputSlots,
    outputs: OutputSlots,
    params: ParamTree,
    options: RuntimeOptions,
    available: bool,
    pending_trigger: bool,
    tick: u64,
    started: Instant,
    last_process: Option<Instant>,
}

impl NodeRuntime {
    pub fn new(
        name: impl Into<String>,
        node: Box<dyn Node>,
        control: Connection,
        options: RuntimeOptions,
    ) -> Self {
        let inputs = InputSlots::new(node.input_slots());
        let outputs = OutputSlots::new(node.output_slots());
        let params = node.params().with_common(options.default_max_frequency);
        Self {
            name: name.into(),
            node,
            control,
            inputs,
            outputs,
            params,
            options,
            available: true,
            pending_trigger: false,
            tick: 0,
            started: Instant::now(),
            last_process: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run on a dedicated, named thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("node-{}", self.name))
            .spawn(move || self.run())
    }

    /// Run the loop on the current thread until TERMINATE or the control
    /// link closes.
    pub fn run(mut self) {
        let span = tracing::info_span!("node", name = %self.name);
        let _enter = span.enter();
        info!("Node runtime started");

        self.run_setup();

        'run: loop {
            match self.control.receive_timeout(self.next_wait()) {
                Ok(Some(msg)) => {
                    if self.handle(msg).is_break() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(LinkError::Closed) => {
                    debug!("Control link closed");
                    break;
                }
                Err(e) => {
                    warn!("Control link failed: {}", e);
                    break;
                }
            }

            loop {
                match self.control.try_receive() {
                    Ok(Some(msg)) => {
                        if self.handle(msg).is_break() {
                            break 'run;
                        }
                    }
                    Ok(None) => break,
                    Err(_) => break 'run,
                }
            }

            if self.due() {
                if self.available {
                    self.process_step();
                } else {
                    self.inputs.mark_consumed();
                    self.pending_trigger = false;
                    let dropped = self.params.reset_triggers();
                    if dropped > 0 {
                        debug!("Node unavailable, discarded {} trigger(s)", dropped);
                    }
                }
            }
        }

        self.shutdown();
    }

    fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.params.max_frequency())
    }

    fn next_wait(&self) -> Duration {
        if self.pending_trigger || self.inputs.any_fresh() {
            return Duration::ZERO;
        }
        if self.available && self.params.autotrigger() {
            let period = self.period();
            let since = self.last_process.map_or(period, |t| t.elapsed());
            return period.saturating_sub(since).min(self.options.idle_wait);
        }
        self.options.idle_wait
    }

    fn due(&self) -> bool {
        if self.pending_trigger || self.inputs.any_fresh() {
            return true;
        }
        self.params.autotrigger()
            && self
                .last_process
                .map_or(true, |t| t.elapsed() >= self.period())
    }

    fn handle(&mut self, msg: Message) -> ControlFlow<()> {
        debug!("Received {}", msg.kind());
        match msg {
            Message::AddOutputPipe {
                slot_name_out,
                slot_name_in,
                node_connection,
            } => {
                let peer = node_connection.endpoint();
                match self
                    .outputs
                    .subscribe(&slot_name_out, node_connection, &slot_name_in)
                {
                    Ok(()) => info!("Pipe {} -> {}:{} added", slot_name_out, peer, slot_name_in),
                    Err(e) => warn!("Rejected output pipe: {}", e),
                }
            }
            Message::RemoveOutputPipe {
                slot_name_out,
                slot_name_in,
                node_connection,
            } => {
                let peer = node_connection.endpoint();
                if self
                    .outputs
                    .unsubscribe(&slot_name_out, peer, &slot_name_in)
                {
                    info!("Pipe {} -> {}:{} removed", slot_name_out, peer, slot_name_in);
                } else {
                    debug!(
                        "No pipe {} -> {}:{} to remove",
                        slot_name_out, peer, slot_name_in
                    );
                }
            }
            Message::Data { slot_name, data } => {
                if let Err(e) = self.inputs.set(&slot_name, data) {
                    warn!("Dropping data: {}", e);
                }
            }
            Message::ClearData { slot_name } => {
                if let Err(e) = self.inputs.clear(&slot_name) {
                    warn!("Cannot clear: {}", e);
                }
            }
            Message::ParameterUpdate {
                group,
                param_name,
                param_value,
            } => match self.params.update(&group, &param_name, param_value) {
                Ok(change) => {
                    debug!("Parameter {}.{} updated", group, param_name);
                    if change.requires_setup {
                        self.run_setup();
                    }
                    if change.triggered {
                        self.pending_trigger = true;
                    }
                }
                Err(e) => warn!("Rejected parameter update: {}", e),
            },
            Message::Ping => {
                if let Err(e) = self.control.send(Message::Pong) {
                    debug!("Could not answer ping: {}", e);
                }
            }
            Message::Pong => {}
            Message::Terminate => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn run_setup(&mut self) {
        let node = &mut self.node;
        let params = &self.params;
        let result = panic::catch_unwind(AssertUnwindSafe(|| node.setup(params)))
            .unwrap_or_else(|p| Err(NodeError::Panicked(panic_message(p.as_ref()))));

        match result {
            Ok(()) => {
                if !self.available {
                    info!("Setup succeeded, node available again");
                }
                self.available = true;
            }
            Err(e) => {
                if self.available {
                    error!("Node unavailable: {}", e);
                } else {
                    debug!("Setup still failing: {}", e);
                }
                self.available = false;
            }
        }
    }

    fn process_step(&mut self) {
        self.tick += 1;
        self.pending_trigger = false;

        let mut ctx = NodeContext {
            inputs: &self.inputs,
            params: &mut self.params,
            timestamp: self.started.elapsed(),
            tick: self.tick,
        };
        let node = &mut self.node;
        let result = panic::catch_unwind(AssertUnwindSafe(|| node.process(&mut ctx)))
            .unwrap_or_else(|p| Err(NodeError::Panicked(panic_message(p.as_ref()))));

        self.last_process = Some(Instant::now());
        self.inputs.mark_consumed();
        // Triggers the node did not read still count as fired.
        self.params.reset_triggers();

        match result {
            Ok(Some(outputs)) => self.publish(outputs),
            Ok(None) => {}
            Err(e) => error!("Processing step {} failed: {}", self.tick, e),
        }
    }

    fn publish(&mut self, outputs: Outputs) {
        for (slot, data) in outputs {
            match self.outputs.dtype(&slot) {
                None => warn!("Dropping output for undeclared slot {}", slot),
                Some(dtype) if dtype != data.dtype() => warn!(
                    "Dropping output {}: expected {}, got {}",
                    slot,
                    dtype,
                    data.dtype()
                ),
                Some(_) => {
                    self.outputs.publish(&slot, &data);
                }
            }
        }
    }

    fn shutdown(&mut self) {
        self.control.close();
        // Peer links belong to other nodes' control pairs; drop, never close.
        self.outputs.clear();
        info!("Node runtime stopped after {} steps", self.tick);
    }
}
