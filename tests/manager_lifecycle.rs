//! Manager naming, error kinds, termination and observer events

mod common;

use common::builders::{test_registry, ManagerBuilder};
use pipegraph::manager::{ChannelObserver, GraphEvent};
use pipegraph::{LinkSpec, Manager, ManagerState};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_names_follow_type_and_creation_order() {
    let (manager, _rx) = ManagerBuilder::new().build();
    assert_eq!(manager.add_node("Emitter").unwrap(), "emitter0");
    assert_eq!(manager.add_node("recorder").unwrap(), "recorder0");
    assert_eq!(manager.add_node("emitter").unwrap(), "emitter1");

    manager.remove_node("emitter0").unwrap();
    assert_eq!(manager.add_node("emitter").unwrap(), "emitter0");
    assert_eq!(
        manager.node_names(),
        vec!["recorder0", "emitter1", "emitter0"]
    );
    manager.terminate();
}

#[test]
fn test_unknown_names_are_not_found() {
    let (manager, _rx) = ManagerBuilder::new().build();
    let emitter = manager.add_node("emitter").unwrap();

    assert!(manager.add_node("warp-drive").unwrap_err().is_not_found());
    assert!(manager.remove_node("emitter9").unwrap_err().is_not_found());
    assert!(manager.ping("emitter9").unwrap_err().is_not_found());
    assert!(manager
        .clear_data(&emitter, "data")
        .unwrap_err()
        .is_not_found());
    assert_eq!(manager.node_names(), vec![emitter]);
    manager.terminate();
}

#[test]
fn test_terminate_is_final_and_idempotent() {
    let (manager, _rx) = ManagerBuilder::new().build();
    let emitter = manager.add_node("emitter").unwrap();
    let recorder = manager.add_node("recorder").unwrap();
    manager.add_link(&emitter, &recorder, "out", "data").unwrap();

    manager.terminate();
    manager.terminate();

    assert_eq!(manager.state(), ManagerState::Terminated);
    assert!(manager.node_names().is_empty());
    assert!(manager.links().is_empty());
    assert!(manager.add_node("emitter").unwrap_err().is_illegal_state());
    assert!(manager
        .set_param(&emitter, "emit", "go", true)
        .unwrap_err()
        .is_illegal_state());
    assert!(manager.ping(&recorder).unwrap_err().is_illegal_state());
}

#[test]
fn test_terminate_wakes_waiters() {
    let (manager, _rx) = ManagerBuilder::new().build();
    let manager = Arc::new(manager);
    manager.add_node("emitter").unwrap();

    let waiter = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || manager.wait_until_terminated())
    };
    thread::sleep(Duration::from_millis(30));
    manager.terminate();
    waiter.join().unwrap();
}

#[test]
fn test_run_for_returns_early_when_terminated_elsewhere() {
    let (manager, _rx) = ManagerBuilder::new().build();
    let manager = Arc::new(manager);

    let stopper = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            manager.terminate();
        })
    };
    let started = Instant::now();
    manager.run_for(Duration::from_secs(30));
    assert!(started.elapsed() < Duration::from_secs(10));
    stopper.join().unwrap();
}

#[test]
fn test_concurrent_adds_get_unique_names() {
    let (registry, _rx) = test_registry();
    let manager = Arc::new(Manager::new(registry, ManagerBuilder::new().options()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || manager.add_node("emitter").unwrap())
        })
        .collect();
    let names: BTreeSet<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let expected: BTreeSet<String> = (0..8).map(|i| format!("emitter{i}")).collect();
    assert_eq!(names, expected);
    manager.terminate();
}

#[test]
fn test_observer_sees_every_mutation() {
    let (observer, events) = ChannelObserver::new(16);
    let (registry, _rx) = test_registry();
    let manager =
        Manager::new(registry, ManagerBuilder::new().options()).with_observer(Arc::new(observer));

    let emitter = manager.add_node("emitter").unwrap();
    let recorder = manager.add_node("recorder").unwrap();
    manager.add_link(&emitter, &recorder, "out", "data").unwrap();
    manager.remove_link(&emitter, &recorder, "out", "data").unwrap();
    manager.remove_node(&recorder).unwrap();
    assert!(manager.add_node("nope").is_err());
    manager.terminate();
    manager.terminate();

    let link = LinkSpec::new("emitter0", "recorder0", "out", "data");
    let seen: Vec<GraphEvent> = events.try_iter().collect();
    assert_eq!(
        seen,
        vec![
            GraphEvent::NodeAdded {
                name: "emitter0".into(),
                type_name: "emitter".into()
            },
            GraphEvent::NodeAdded {
                name: "recorder0".into(),
                type_name: "recorder".into()
            },
            GraphEvent::LinkAdded(link.clone()),
            GraphEvent::LinkRemoved(link),
            GraphEvent::NodeRemoved {
                name: "recorder0".into()
            },
            GraphEvent::Terminated,
        ]
    );
}

#[test]
fn test_drop_terminates_nodes() {
    let (manager, _rx) = ManagerBuilder::new().build();
    manager.add_node("emitter").unwrap();
    manager.add_node("recorder").unwrap();
    let started = Instant::now();
    drop(manager);
    assert!(started.elapsed() < Duration::from_secs(2));
}
