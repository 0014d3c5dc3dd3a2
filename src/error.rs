//! Error handling for pipegraph
//!
//! Structural operations (adding/removing nodes and links) surface a typed
//! [`EngineError`] to the caller immediately. Data-path failures never reach
//! this type: node runtimes log them and carry on.

use crate::link::LinkError;
use crate::node::NodeError;
use crate::protocol::{FieldKind, MessageType};
use crate::protocol::DataType;
use thiserror::Error;

/// A malformed message, parameter or slot assignment.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A field required by the message type is absent
    #[error("{kind} message is missing required field `{field}`")]
    MissingField { kind: MessageType, field: String },

    /// A field is present but carries the wrong kind of value
    #[error("{kind} message field `{field}` must be {expected}, got {found}")]
    WrongFieldType {
        kind: MessageType,
        field: String,
        expected: FieldKind,
        found: FieldKind,
    },

    /// A field the message type does not define
    #[error("{kind} message does not accept field `{field}`")]
    UnexpectedField { kind: MessageType, field: String },

    /// Array shape and value count disagree
    #[error("invalid array: {0}")]
    Array(String),

    /// Parameter update rejected by the parameter tree
    #[error("parameter {group}.{name}: {reason}")]
    Param {
        group: String,
        name: String,
        reason: String,
    },

    /// Slot name not declared by the node
    #[error("unknown slot `{0}`")]
    UnknownSlot(String),

    /// Data type does not match the slot declaration
    #[error("slot `{slot}` expects {expected}, got {found}")]
    SlotType {
        slot: String,
        expected: DataType,
        found: DataType,
    },

    /// Endpoint cannot be carried over the link it was sent on
    #[error("endpoint {0} cannot be sent over a network link")]
    Endpoint(String),
}

/// Main error type for pipegraph operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed message or content
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Unknown node, node type, slot or link
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation on a terminated manager
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Peer unreachable
    #[error("Link closed: {0}")]
    LinkClosed(String),

    /// Failure inside a node's construction, `setup` or `process`
    #[error("Node processing error: {0}")]
    NodeProcessing(#[from] NodeError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        EngineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Strip any context wrappers and return the underlying error.
    pub fn root(&self) -> &EngineError {
        match self {
            EngineError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), EngineError::NotFound(_))
    }

    pub fn is_illegal_state(&self) -> bool {
        matches!(self.root(), EngineError::IllegalState(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.root(), EngineError::Validation(_))
    }
}

impl From<LinkError> for EngineError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::Closed => EngineError::LinkClosed("peer unreachable".to_string()),
            LinkError::Io(e) => EngineError::Io(e),
            LinkError::Invalid(e) => EngineError::Validation(e),
            LinkError::Encode(msg) | LinkError::Decode(msg) => EngineError::Serialization(msg),
        }
    }
}

/// Result type alias for pipegraph operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<EngineError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}
