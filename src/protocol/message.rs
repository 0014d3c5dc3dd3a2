//! Control and data messages exchanged over links.
//!
//! The set of message types is closed. Each type has a fixed table of
//! required fields; [`Message::new`] checks a content mapping against that
//! table and never produces a partially valid message.
//!
//! | Type                 | Required fields                                         |
//! |----------------------|---------------------------------------------------------|
//! | `ADD_OUTPUT_PIPE`    | `slot_name_out`: string, `slot_name_in`: string, `node_connection`: link |
//! | `REMOVE_OUTPUT_PIPE` | `slot_name_out`: string, `slot_name_in`: string, `node_connection`: link |
//! | `DATA`               | `slot_name`: string, `data`: data                       |
//! | `CLEAR_DATA`         | `slot_name`: string                                     |
//! | `PARAMETER_UPDATE`   | `group`: string, `param_name`: string, `param_value`: value |
//! | `PING`/`PONG`/`TERMINATE` | none                                               |

use crate::error::ValidationError;
use crate::link::Connection;
use crate::protocol::data::Data;
use crate::protocol::value::ParamValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The type of a message; determines which fields its content carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    AddOutputPipe,
    RemoveOutputPipe,
    Data,
    ClearData,
    ParameterUpdate,
    Ping,
    Pong,
    Terminate,
}

const PIPE_FIELDS: &[(&str, FieldKind)] = &[
    ("slot_name_out", FieldKind::String),
    ("slot_name_in", FieldKind::String),
    ("node_connection", FieldKind::Link),
];

impl MessageType {
    pub fn all() -> &'static [MessageType] {
        &[
            MessageType::AddOutputPipe,
            MessageType::RemoveOutputPipe,
            MessageType::Data,
            MessageType::ClearData,
            MessageType::ParameterUpdate,
            MessageType::Ping,
            MessageType::Pong,
            MessageType::Terminate,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::AddOutputPipe => "ADD_OUTPUT_PIPE",
            MessageType::RemoveOutputPipe => "REMOVE_OUTPUT_PIPE",
            MessageType::Data => "DATA",
            MessageType::ClearData => "CLEAR_DATA",
            MessageType::ParameterUpdate => "PARAMETER_UPDATE",
            MessageType::Ping => "PING",
            MessageType::Pong => "PONG",
            MessageType::Terminate => "TERMINATE",
        }
    }

    /// Fields a content mapping must carry for this type, and nothing else.
    pub fn required_fields(&self) -> &'static [(&'static str, FieldKind)] {
        match self {
            MessageType::AddOutputPipe | MessageType::RemoveOutputPipe => PIPE_FIELDS,
            MessageType::Data => &[("slot_name", FieldKind::String), ("data", FieldKind::Data)],
            MessageType::ClearData => &[("slot_name", FieldKind::String)],
            MessageType::ParameterUpdate => &[
                ("group", FieldKind::String),
                ("param_name", FieldKind::String),
                ("param_value", FieldKind::Value),
            ],
            MessageType::Ping | MessageType::Pong | MessageType::Terminate => &[],
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic type of a content field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Link,
    Data,
    Value,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldKind::String => "string",
            FieldKind::Link => "link",
            FieldKind::Data => "data",
            FieldKind::Value => "value",
        };
        f.write_str(s)
    }
}

/// One entry of a message content mapping.
#[derive(Debug, Clone)]
pub enum Field {
    String(String),
    Link(Connection),
    Data(Data),
    Value(ParamValue),
}

impl Field {
    pub fn kind(&self) -> FieldKind {
        match self {
            Field::String(_) => FieldKind::String,
            Field::Link(_) => FieldKind::Link,
            Field::Data(_) => FieldKind::Data,
            Field::Value(_) => FieldKind::Value,
        }
    }
}

impl From<&str> for Field {
    fn from(v: &str) -> Self {
        Field::String(v.to_string())
    }
}

impl From<String> for Field {
    fn from(v: String) -> Self {
        Field::String(v)
    }
}

impl From<Connection> for Field {
    fn from(v: Connection) -> Self {
        Field::Link(v)
    }
}

impl From<Data> for Field {
    fn from(v: Data) -> Self {
        Field::Data(v)
    }
}

impl From<ParamValue> for Field {
    fn from(v: ParamValue) -> Self {
        Field::Value(v)
    }
}

/// Untyped message content, keyed by field name.
pub type Content = BTreeMap<String, Field>;

/// A validated message. Immutable once constructed.
#[derive(Debug, Clone)]
pub enum Message {
    /// Manager → node: start forwarding `slot_name_out` to `slot_name_in` on
    /// the node behind `node_connection`.
    AddOutputPipe {
        slot_name_out: String,
        slot_name_in: String,
        node_connection: Connection,
    },
    /// Manager → node: stop forwarding the matching pipe.
    RemoveOutputPipe {
        slot_name_out: String,
        slot_name_in: String,
        node_connection: Connection,
    },
    /// Node → node: new value for an input slot.
    Data { slot_name: String, data: Data },
    /// Reset an input slot to empty.
    ClearData { slot_name: String },
    /// Change one parameter of the node's parameter tree.
    ParameterUpdate {
        group: String,
        param_name: String,
        param_value: ParamValue,
    },
    Ping,
    Pong,
    Terminate,
}

impl Message {
    /// Build a message from an untyped content mapping.
    ///
    /// Fails if a required field is missing, has the wrong kind, or if the
    /// mapping carries a field the type does not define.
    pub fn new(kind: MessageType, content: Content) -> Result<Self, ValidationError> {
        let mut fields = FieldReader { kind, content };
        let msg = match kind {
            MessageType::AddOutputPipe => Message::AddOutputPipe {
                slot_name_out: fields.string("slot_name_out")?,
                slot_name_in: fields.string("slot_name_in")?,
                node_connection: fields.link("node_connection")?,
            },
            MessageType::RemoveOutputPipe => Message::RemoveOutputPipe {
                slot_name_out: fields.string("slot_name_out")?,
                slot_name_in: fields.string("slot_name_in")?,
                node_connection: fields.link("node_connection")?,
            },
            MessageType::Data => Message::Data {
                slot_name: fields.string("slot_name")?,
                data: fields.data("data")?,
            },
            MessageType::ClearData => Message::ClearData {
                slot_name: fields.string("slot_name")?,
            },
            MessageType::ParameterUpdate => Message::ParameterUpdate {
                group: fields.string("group")?,
                param_name: fields.string("param_name")?,
                param_value: fields.value("param_value")?,
            },
            MessageType::Ping => Message::Ping,
            MessageType::Pong => Message::Pong,
            MessageType::Terminate => Message::Terminate,
        };
        fields.finish()?;
        Ok(msg)
    }

    pub fn data(slot_name: impl Into<String>, data: Data) -> Self {
        Message::Data {
            slot_name: slot_name.into(),
            data,
        }
    }

    pub fn clear_data(slot_name: impl Into<String>) -> Self {
        Message::ClearData {
            slot_name: slot_name.into(),
        }
    }

    pub fn add_output_pipe(
        slot_name_out: impl Into<String>,
        slot_name_in: impl Into<String>,
        node_connection: Connection,
    ) -> Self {
        Message::AddOutputPipe {
            slot_name_out: slot_name_out.into(),
            slot_name_in: slot_name_in.into(),
            node_connection,
        }
    }

    pub fn remove_output_pipe(
        slot_name_out: impl Into<String>,
        slot_name_in: impl Into<String>,
        node_connection: Connection,
    ) -> Self {
        Message::RemoveOutputPipe {
            slot_name_out: slot_name_out.into(),
            slot_name_in: slot_name_in.into(),
            node_connection,
        }
    }

    pub fn parameter_update(
        group: impl Into<String>,
        param_name: impl Into<String>,
        param_value: impl Into<ParamValue>,
    ) -> Self {
        Message::ParameterUpdate {
            group: group.into(),
            param_name: param_name.into(),
            param_value: param_value.into(),
        }
    }

    pub fn kind(&self) -> MessageType {
        match self {
            Message::AddOutputPipe { .. } => MessageType::AddOutputPipe,
            Message::RemoveOutputPipe { .. } => MessageType::RemoveOutputPipe,
            Message::Data { .. } => MessageType::Data,
            Message::ClearData { .. } => MessageType::ClearData,
            Message::ParameterUpdate { .. } => MessageType::ParameterUpdate,
            Message::Ping => MessageType::Ping,
            Message::Pong => MessageType::Pong,
            Message::Terminate => MessageType::Terminate,
        }
    }

    /// The message's content as an untyped mapping.
    pub fn content(&self) -> Content {
        let mut c = Content::new();
        match self {
            Message::AddOutputPipe {
                slot_name_out,
                slot_name_in,
                node_connection,
            }
            | Message::RemoveOutputPipe {
                slot_name_out,
                slot_name_in,
                node_connection,
            } => {
                c.insert("slot_name_out".into(), slot_name_out.as_str().into());
                c.insert("slot_name_in".into(), slot_name_in.as_str().into());
                c.insert("node_connection".into(), node_connection.clone().into());
            }
            Message::Data { slot_name, data } => {
                c.insert("slot_name".into(), slot_name.as_str().into());
                c.insert("data".into(), data.clone().into());
            }
            Message::ClearData { slot_name } => {
                c.insert("slot_name".into(), slot_name.as_str().into());
            }
            Message::ParameterUpdate {
                group,
                param_name,
                param_value,
            } => {
                c.insert("group".into(), group.as_str().into());
                c.insert("param_name".into(), param_name.as_str().into());
                c.insert("param_value".into(), param_value.clone().into());
            }
            Message::Ping | Message::Pong | Message::Terminate => {}
        }
        c
    }
}

/// Pulls typed fields out of a content mapping, tracking what is left over.
struct FieldReader {
    kind: MessageType,
    content: Content,
}

impl FieldReader {
    fn take(&mut self, name: &str, expected: FieldKind) -> Result<Field, ValidationError> {
        let field = self
            .content
            .remove(name)
            .ok_or_else(|| ValidationError::MissingField {
                kind: self.kind,
                field: name.to_string(),
            })?;
        if field.kind() != expected {
            return Err(ValidationError::WrongFieldType {
                kind: self.kind,
                field: name.to_string(),
                expected,
                found: field.kind(),
            });
        }
        Ok(field)
    }

    fn string(&mut self, name: &str) -> Result<String, ValidationError> {
        match self.take(name, FieldKind::String)? {
            Field::String(s) => Ok(s),
            other => Err(self.mismatch(name, FieldKind::String, &other)),
        }
    }

    fn link(&mut self, name: &str) -> Result<Connection, ValidationError> {
        match self.take(name, FieldKind::Link)? {
            Field::Link(c) => Ok(c),
            other => Err(self.mismatch(name, FieldKind::Link, &other)),
        }
    }

    fn data(&mut self, name: &str) -> Result<Data, ValidationError> {
        match self.take(name, FieldKind::Data)? {
            Field::Data(d) => Ok(d),
            other => Err(self.mismatch(name, FieldKind::Data, &other)),
        }
    }

    fn value(&mut self, name: &str) -> Result<ParamValue, ValidationError> {
        match self.take(name, FieldKind::Value)? {
            Field::Value(v) => Ok(v),
            other => Err(self.mismatch(name, FieldKind::Value, &other)),
        }
    }

    fn mismatch(&self, name: &str, expected: FieldKind, found: &Field) -> ValidationError {
        ValidationError::WrongFieldType {
            kind: self.kind,
            field: name.to_string(),
            expected,
            found: found.kind(),
        }
    }

    fn finish(self) -> Result<(), ValidationError> {
        match self.content.into_keys().next() {
            Some(field) => Err(ValidationError::UnexpectedField {
                kind: self.kind,
                field,
            }),
            None => Ok(()),
        }
    }
}
