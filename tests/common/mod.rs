//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use crossbeam_channel::Receiver;
use std::time::{Duration, Instant};

/// Generous upper bound for anything crossing a node thread
pub fn test_timeout() -> Duration {
    Duration::from_secs(3)
}

/// Receive one value or panic after `test_timeout()`
pub fn recv<T>(rx: &Receiver<T>) -> T {
    rx.recv_timeout(test_timeout())
        .unwrap_or_else(|_| panic!("nothing received within {:?}", test_timeout()))
}

/// Assert that nothing arrives for `window`
pub fn assert_silent<T: std::fmt::Debug>(rx: &Receiver<T>, window: Duration) {
    if let Ok(v) = rx.recv_timeout(window) {
        panic!("expected silence, received {:?}", v);
    }
}

/// Poll `cond` every few milliseconds until it holds or `test_timeout()` passes
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + test_timeout();
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}
