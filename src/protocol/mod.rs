//! Message protocol: the wire contract between the manager and nodes.
//!
//! - [`Message`]: closed set of control/data envelopes, validated at construction.
//! - [`Data`]: payload plus metadata side channel, produced by output slots.
//! - [`ParamValue`]: scalar carried by parameter updates.

pub mod data;
pub mod message;
pub mod value;

pub use data::{Array, Data, DataType, Metadata, Payload};
pub use message::{Content, Field, FieldKind, Message, MessageType};
pub use value::ParamValue;
