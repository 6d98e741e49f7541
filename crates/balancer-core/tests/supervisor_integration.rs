//! Exercises `ProcessSupervisor::spawn` against a real child process (the
//! `fake_child` fixture in `src/bin/`) instead of mocking the pipe reads,
//! the way `crates/midi-protocol/tests/integration.rs` exercises its crate's
//! public API end to end rather than unit-testing internals in isolation.

use std::time::Duration;

use balancer_core::supervisor::{self, SupervisorConfig, SupervisorError};

fn fake_child_config(start_timeout: Duration, heartbeat_timeout: Duration) -> SupervisorConfig {
    SupervisorConfig {
        binary_path: env!("CARGO_BIN_EXE_fake_child").to_string(),
        node_address: "127.0.0.1:0".to_string(),
        allowed_origin: None,
        start_timeout,
        heartbeat_timeout,
    }
}

#[tokio::test]
async fn spawn_completes_handshake_and_reports_alive() {
    let cfg = fake_child_config(Duration::from_secs(2), Duration::from_secs(2));
    let mut child = supervisor::spawn(0, 30001, &cfg).await.expect("handshake should succeed");

    assert_eq!(child.port, 30001);
    assert!(child.pid().is_some());

    let got = tokio::time::timeout(Duration::from_secs(1), child.alive_rx.recv()).await;
    assert!(got.is_ok(), "expected a heartbeat before the timeout");
    assert!(got.unwrap().is_some());

    child.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(2), child.exit_rx.changed()).await;
}

#[tokio::test]
async fn spawn_fails_fast_against_a_binary_that_never_handshakes() {
    let cfg = SupervisorConfig {
        binary_path: env!("CARGO_BIN_EXE_silent_child").to_string(),
        ..fake_child_config(Duration::from_millis(200), Duration::from_secs(2))
    };
    let result = supervisor::spawn(0, 30002, &cfg).await;
    assert!(matches!(result, Err(SupervisorError::HandshakeTimeout { index: 0 })));
}
