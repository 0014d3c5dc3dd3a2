//! Line-delimited JSON framing for network links.
//!
//! Each message is one JSON document followed by `\n`. Links embedded in
//! pipe messages travel as the socket address of the node host they point
//! at; the receiver re-opens them with a lazily-dialled [`TcpLink`].

use crate::error::ValidationError;
use crate::link::tcp::TcpLink;
use crate::link::{Connection, Endpoint, LinkError};
use crate::protocol::{Data, Message, ParamValue};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum Frame {
    AddOutputPipe {
        slot_name_out: String,
        slot_name_in: String,
        node_connection: SocketAddr,
    },
    RemoveOutputPipe {
        slot_name_out: String,
        slot_name_in: String,
        node_connection: SocketAddr,
    },
    Data {
        slot_name: String,
        data: Data,
    },
    ClearData {
        slot_name: String,
    },
    ParameterUpdate {
        group: String,
        param_name: String,
        param_value: ParamValue,
    },
    Ping,
    Pong,
    Terminate,
}

fn socket_of(conn: &Connection) -> Result<SocketAddr, LinkError> {
    match conn.endpoint() {
        Endpoint::Tcp(addr) => Ok(addr),
        other => Err(LinkError::Invalid(ValidationError::Endpoint(other.to_string()))),
    }
}

/// Encode a message as a single line (including the trailing newline).
pub fn encode(msg: &Message) -> Result<String, LinkError> {
    let frame = match msg {
        Message::AddOutputPipe {
            slot_name_out,
            slot_name_in,
            node_connection,
        } => Frame::AddOutputPipe {
            slot_name_out: slot_name_out.clone(),
            slot_name_in: slot_name_in.clone(),
            node_connection: socket_of(node_connection)?,
        },
        Message::RemoveOutputPipe {
            slot_name_out,
            slot_name_in,
            node_connection,
        } => Frame::RemoveOutputPipe {
            slot_name_out: slot_name_out.clone(),
            slot_name_in: slot_name_in.clone(),
            node_connection: socket_of(node_connection)?,
        },
        Message::Data { slot_name, data } => Frame::Data {
            slot_name: slot_name.clone(),
            data: data.clone(),
        },
        Message::ClearData { slot_name } => Frame::ClearData {
            slot_name: slot_name.clone(),
        },
        Message::ParameterUpdate {
            group,
            param_name,
            param_value,
        } => Frame::ParameterUpdate {
            group: group.clone(),
            param_name: param_name.clone(),
            param_value: param_value.clone(),
        },
        Message::Ping => Frame::Ping,
        Message::Pong => Frame::Pong,
        Message::Terminate => Frame::Terminate,
    };
    let mut line = serde_json::to_string(&frame).map_err(|e| LinkError::Encode(e.to_string()))?;
    line.push('\n');
    Ok(line)
}

/// Decode one line back into a message.
pub fn decode(line: &str) -> Result<Message, LinkError> {
    let frame: Frame =
        serde_json::from_str(line.trim_end()).map_err(|e| LinkError::Decode(e.to_string()))?;
    let msg = match frame {
        Frame::AddOutputPipe {
            slot_name_out,
            slot_name_in,
            node_connection,
        } => Message::add_output_pipe(
            slot_name_out,
            slot_name_in,
            Connection::new(TcpLink::dial(node_connection)),
        ),
        Frame::RemoveOutputPipe {
            slot_name_out,
            slot_name_in,
            node_connection,
        } => Message::remove_output_pipe(
            slot_name_out,
            slot_name_in,
            Connection::new(TcpLink::dial(node_connection)),
        ),
        Frame::Data { slot_name, data } => Message::data(slot_name, data),
        Frame::ClearData { slot_name } => Message::clear_data(slot_name),
        Frame::ParameterUpdate {
            group,
            param_name,
            param_value,
        } => Message::parameter_update(group, param_name, param_value),
        Frame::Ping => Message::Ping,
        Frame::Pong => Message::Pong,
        Frame::Terminate => Message::Terminate,
    };
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::local;
    use crate::protocol::MessageType;

    #[test]
    fn test_data_frame_shape() {
        let msg = Message::data("in", Data::array(vec![1.0, 2.0, 3.0]).with_meta("sfreq", 100));
        let line = encode(&msg).unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.starts_with(r#"{"type":"DATA""#));

        match decode(&line).unwrap() {
            Message::Data { slot_name, data } => {
                assert_eq!(slot_name, "in");
                assert_eq!(data.as_array().unwrap().values(), &[1.0, 2.0, 3.0]);
                assert_eq!(data.sfreq(), Some(100.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_non_finite_samples_cross_the_wire() {
        let msg = Message::data("in", Data::array(vec![1.0, f64::NAN, f64::NEG_INFINITY]));
        let line = encode(&msg).unwrap();

        match decode(&line).unwrap() {
            Message::Data { data, .. } => {
                let values = data.as_array().unwrap().values();
                assert_eq!(values[0], 1.0);
                assert!(values[1].is_nan());
                assert_eq!(values[2], f64::NEG_INFINITY);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_control_frames() {
        for msg in [Message::Ping, Message::Pong, Message::Terminate] {
            let kind = msg.kind();
            assert_eq!(decode(&encode(&msg).unwrap()).unwrap().kind(), kind);
        }
    }

    #[test]
    fn test_pipe_frame_carries_socket_address() {
        let addr: SocketAddr = "127.0.0.1:45000".parse().unwrap();
        let target = Connection::new(TcpLink::dial(addr));
        let line = encode(&Message::add_output_pipe("out", "in", target)).unwrap();
        assert!(line.contains("127.0.0.1:45000"));

        let decoded = decode(&line).unwrap();
        assert_eq!(decoded.kind(), MessageType::AddOutputPipe);
        if let Message::AddOutputPipe {
            node_connection, ..
        } = decoded
        {
            assert_eq!(node_connection.endpoint(), Endpoint::Tcp(addr));
        }
    }

    #[test]
    fn test_local_endpoint_cannot_cross_the_wire() {
        let (a, _b) = local::pair();
        let err = encode(&Message::remove_output_pipe("out", "in", a)).unwrap_err();
        assert!(matches!(err, LinkError::Invalid(ValidationError::Endpoint(_))));
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        assert!(matches!(decode("not json"), Err(LinkError::Decode(_))));
    }
}
