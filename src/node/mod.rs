//! The node contract and the runtime that executes it.
//!
//! A node body implements [`Node`]: it declares slots and parameters, gets a
//! `setup` hook and a `process` step. The [`runtime::NodeRuntime`] owns the
//! body on a dedicated thread, applies incoming messages to slot and
//! parameter state, and forwards produced outputs to subscribers.

pub mod params;
pub mod registry;
pub mod runtime;
pub mod slots;

pub use params::{Param, ParamChange, ParamKind, ParamTree};
pub use registry::{NodeFactory, NodeRegistry};
pub use runtime::{NodeRuntime, RuntimeOptions};
pub use slots::{InputSlots, OutputSlots, SlotDescriptor, Subscriber};

use crate::protocol::Data;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a node body.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("processing failed: {0}")]
    Processing(String),

    #[error("setup failed: {0}")]
    Setup(String),

    #[error("input `{0}` is empty")]
    MissingInput(String),

    #[error("invalid input `{slot}`: {reason}")]
    InvalidInput { slot: String, reason: String },

    /// The body panicked; the runtime caught it.
    #[error("node panicked: {0}")]
    Panicked(String),
}

impl NodeError {
    pub fn processing(msg: impl Into<String>) -> Self {
        NodeError::Processing(msg.into())
    }

    pub fn setup(msg: impl Into<String>) -> Self {
        NodeError::Setup(msg.into())
    }

    pub fn invalid_input(slot: impl Into<String>, reason: impl Into<String>) -> Self {
        NodeError::InvalidInput {
            slot: slot.into(),
            reason: reason.into(),
        }
    }
}

/// Output of one processing step: output slot name → value.
pub type Outputs = BTreeMap<String, Data>;

/// Context passed to [`Node::process`] on each step.
pub struct NodeContext<'a> {
    /// Current input slot contents.
    pub inputs: &'a InputSlots,
    /// The node's parameters. Triggers are read with `take_trigger`.
    pub params: &'a mut ParamTree,
    /// Time since the runtime started.
    pub timestamp: Duration,
    /// Monotonic step counter, starting at 1.
    pub tick: u64,
}

impl NodeContext<'_> {
    /// Value of an input slot, or `MissingInput` when empty.
    pub fn input(&self, slot: &str) -> Result<&Data, NodeError> {
        self.inputs
            .get(slot)
            .ok_or_else(|| NodeError::MissingInput(slot.to_string()))
    }
}

/// Contract every node body implements.
pub trait Node: Send {
    fn input_slots(&self) -> &[SlotDescriptor] {
        &[]
    }

    fn output_slots(&self) -> &[SlotDescriptor] {
        &[]
    }

    /// Parameter tree with defaults. The `common` group is added by the runtime.
    fn params(&self) -> ParamTree {
        ParamTree::new()
    }

    /// (Re)initialize resources. Called when the runtime starts and after a
    /// change to any parameter marked `requires_setup`.
    fn setup(&mut self, _params: &ParamTree) -> Result<(), NodeError> {
        Ok(())
    }

    /// One processing step. `Ok(None)` suppresses output for this step.
    fn process(&mut self, ctx: &mut NodeContext) -> Result<Option<Outputs>, NodeError>;
}
