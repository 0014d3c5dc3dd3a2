//! # pipegraph: live-reconfigurable dataflow runtime
//!
//! A graph of processing nodes exchanging typed data (arrays, strings,
//! tables) through named input and output slots. A [`Manager`] creates and
//! destroys nodes and wires their slots together while the graph is running.
//!
//! ## Architecture
//!
//! - **Protocol**: [`Message`]s and the [`Data`] payloads they carry
//! - **Links**: bidirectional message channels, either in-process pairs or
//!   loopback TCP
//! - **Node runtime**: one thread per node, isolating panics and processing
//!   failures from the rest of the graph
//! - **Manager**: naming, lifecycle and link bookkeeping, plus an optional
//!   [`GraphObserver`] mirror
//!
//! ## Example
//!
//! ```no_run
//! use pipegraph::{EngineConfig, Manager};
//! use std::time::Duration;
//!
//! let manager = Manager::from_config(&EngineConfig::default());
//! let sine = manager.add_node("sine")?;
//! let psd = manager.add_node("psd")?;
//! manager.add_link(&sine, &psd, "out", "data")?;
//! manager.set_param(&psd, "psd", "f_max", 40.0)?;
//! manager.run_for(Duration::from_secs(5));
//! # Ok::<(), pipegraph::EngineError>(())
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod link;
pub mod logging;
pub mod manager;
pub mod node;
pub mod nodes;
pub mod protocol;

// Re-export commonly used types
pub use config::{EngineConfig, Transport};
pub use error::{EngineError, Result, ResultExt, ValidationError};
pub use link::{Connection, Link, LinkError};
pub use manager::{GraphEvent, GraphObserver, LinkSpec, Manager, ManagerOptions, ManagerState};
pub use node::{Node, NodeContext, NodeError, NodeRegistry, Outputs, ParamTree, SlotDescriptor};
pub use protocol::{Array, Data, DataType, Message, MessageType, ParamValue};
