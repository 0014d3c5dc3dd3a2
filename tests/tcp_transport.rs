//! The same graphs over loopback TCP links

mod common;

use common::builders::ManagerBuilder;
use common::{assert_silent, recv};
use pipegraph::Transport;
use serial_test::serial;
use std::time::Duration;

fn tcp() -> ManagerBuilder {
    ManagerBuilder::new().transport(Transport::Tcp)
}

#[test]
#[serial]
fn test_tcp_nodes_answer_ping() {
    let (manager, _rx) = tcp().build();
    let emitter = manager.add_node("emitter").unwrap();
    assert!(manager.ping(&emitter).unwrap());
    manager.terminate();
}

#[test]
#[serial]
fn test_tcp_dataflow_end_to_end() {
    let (manager, rx) = tcp().build();
    let emitter = manager.add_node("emitter").unwrap();
    let scale = manager.add_node("scale").unwrap();
    let recorder = manager.add_node("recorder").unwrap();
    manager.add_link(&emitter, &scale, "out", "data").unwrap();
    manager.add_link(&scale, &recorder, "out", "data").unwrap();
    manager.set_param(&scale, "scale", "factor", 0.5).unwrap();

    manager.set_param(&emitter, "emit", "go", true).unwrap();

    let data = recv(&rx).unwrap();
    assert_eq!(data.as_array().unwrap().values(), &[0.5, 1.0, 1.5]);
    assert_eq!(data.sfreq(), Some(100.0));
    manager.terminate();
}

#[test]
#[serial]
fn test_tcp_remove_link() {
    let (manager, rx) = tcp().build();
    let emitter = manager.add_node("emitter").unwrap();
    let recorder = manager.add_node("recorder").unwrap();
    manager.add_link(&emitter, &recorder, "out", "data").unwrap();
    manager.set_param(&emitter, "emit", "go", true).unwrap();
    recv(&rx).unwrap();

    manager.remove_link(&emitter, &recorder, "out", "data").unwrap();
    manager.set_param(&emitter, "emit", "go", true).unwrap();
    assert_silent(&rx, Duration::from_millis(200));
    manager.terminate();
}

#[test]
#[serial]
fn test_tcp_clear_data() {
    let (manager, rx) = tcp().build();
    let emitter = manager.add_node("emitter").unwrap();
    let recorder = manager.add_node("recorder").unwrap();
    manager.add_link(&emitter, &recorder, "out", "data").unwrap();
    manager.set_param(&emitter, "emit", "go", true).unwrap();
    assert!(recv(&rx).is_some());

    manager.clear_data(&recorder, "data").unwrap();
    manager.set_param(&recorder, "record", "snap", true).unwrap();
    assert!(recv(&rx).is_none());
    manager.terminate();
}

#[test]
#[serial]
fn test_tcp_remove_node_keeps_upstream_alive() {
    let (manager, rx) = tcp().build();
    let emitter = manager.add_node("emitter").unwrap();
    let recorder = manager.add_node("recorder").unwrap();
    manager.add_link(&emitter, &recorder, "out", "data").unwrap();
    manager.remove_node(&recorder).unwrap();

    manager.set_param(&emitter, "emit", "go", true).unwrap();
    assert_silent(&rx, Duration::from_millis(100));
    assert!(manager.ping(&emitter).unwrap());
    manager.terminate();
}
