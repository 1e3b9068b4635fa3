//! Supervisor lifecycle: start/send/stop/restart against a `cat` worker.
//!
//! `cat` echoes every stdin line back on stdout, so a sent
//! `{"type":"message","content":…}` command comes back as a structured
//! envelope with the declared kind `message`.

use std::sync::Arc;

use agent_conduit::hub::Hub;
use agent_conduit::protocol::EnvelopeKind;
use agent_conduit::supervisor::{StopOutcome, Supervisor, SupervisorState};
use agent_conduit::AppError;
use serial_test::serial;

use super::test_helpers::{next_envelope, wait_for, worker_config};

fn cat_supervisor() -> (Supervisor, Hub) {
    let hub = Hub::new();
    let supervisor = Supervisor::new(worker_config("cat", &[]), hub.clone());
    (supervisor, hub)
}

#[tokio::test]
#[serial]
async fn start_send_stop_round_trip() {
    let (supervisor, hub) = cat_supervisor();
    let mut subscription = hub.subscribe();
    let greeting = next_envelope(&mut subscription).await;
    assert_eq!(greeting.kind(), &EnvelopeKind::ConnectionEstablished);

    let pid = supervisor.start().await.expect("start");
    assert!(pid > 0);
    assert_eq!(supervisor.state().await, SupervisorState::Running);

    supervisor.send("ping").await.expect("send");

    // cat echoes the encoded command; the reader forwards it with its
    // declared kind.
    let echoed = wait_for(&mut subscription, |e| {
        e.kind() == &EnvelopeKind::Other("message".into())
    })
    .await;
    assert_eq!(echoed.content(), Some("ping"));

    assert_eq!(supervisor.stop().await.expect("stop"), StopOutcome::Stopped);
    assert_eq!(supervisor.state().await, SupervisorState::Stopped);

    wait_for(&mut subscription, |e| {
        e.kind() == &EnvelopeKind::AgentStopped
    })
    .await;
}

#[tokio::test]
async fn stop_when_already_stopped_is_not_running() {
    let (supervisor, _hub) = cat_supervisor();
    assert_eq!(
        supervisor.stop().await.expect("stop"),
        StopOutcome::NotRunning
    );
    assert_eq!(supervisor.state().await, SupervisorState::Stopped);
}

#[tokio::test]
async fn send_without_worker_is_not_running() {
    let (supervisor, _hub) = cat_supervisor();
    let err = supervisor.send("ping").await.expect_err("must fail");
    assert!(matches!(err, AppError::NotRunning));
}

#[tokio::test]
#[serial]
async fn second_start_is_already_running() {
    let (supervisor, _hub) = cat_supervisor();
    supervisor.start().await.expect("start");

    let err = supervisor.start().await.expect_err("must fail");
    assert!(matches!(err, AppError::AlreadyRunning));

    supervisor.stop().await.expect("stop");
}

#[tokio::test]
#[serial]
async fn concurrent_starts_admit_exactly_one() {
    let (supervisor, _hub) = cat_supervisor();
    let supervisor = Arc::new(supervisor);

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let supervisor = Arc::clone(&supervisor);
            tokio::spawn(async move { supervisor.start().await })
        })
        .collect();

    let mut started = 0;
    let mut rejected = 0;
    for task in tasks {
        match task.await.expect("join") {
            Ok(_pid) => started += 1,
            Err(AppError::AlreadyRunning) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(started, 1);
    assert_eq!(rejected, 3);

    supervisor.stop().await.expect("stop");
}

#[tokio::test]
#[serial]
async fn spawn_failure_leaves_state_stopped() {
    let hub = Hub::new();
    let supervisor = Supervisor::new(
        worker_config("/definitely/not/an/executable", &[]),
        hub.clone(),
    );

    let err = supervisor.start().await.expect_err("must fail");
    assert!(matches!(err, AppError::Spawn(_)));
    assert_eq!(supervisor.state().await, SupervisorState::Stopped);

    // The failed start left nothing behind; a stop is a clean no-op.
    assert_eq!(
        supervisor.stop().await.expect("stop"),
        StopOutcome::NotRunning
    );
}

#[tokio::test]
#[serial]
async fn restart_yields_a_fresh_process() {
    let (supervisor, _hub) = cat_supervisor();
    let first_pid = supervisor.start().await.expect("start");

    let second_pid = supervisor.restart().await.expect("restart");
    assert_ne!(first_pid, second_pid);
    assert_eq!(supervisor.state().await, SupervisorState::Running);

    supervisor.stop().await.expect("stop");
}

#[tokio::test]
#[serial]
async fn restart_is_atomic_against_concurrent_starts() {
    let (supervisor, _hub) = cat_supervisor();
    let supervisor = Arc::new(supervisor);
    supervisor.start().await.expect("start");

    let restarting = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move { supervisor.restart().await })
    };

    // Hammer start() across the restart's settle window. The restarting
    // caller holds the operation slot for the whole stop+settle+start
    // composition, so no start can steal it and fail the restart.
    for _ in 0..20 {
        match supervisor.start().await {
            Ok(_) | Err(AppError::AlreadyRunning) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let restarted = restarting.await.expect("join");
    assert!(restarted.is_ok(), "restart lost its slot: {restarted:?}");
    assert_eq!(supervisor.state().await, SupervisorState::Running);

    supervisor.stop().await.expect("stop");
}

#[tokio::test]
#[serial]
async fn status_reports_state_pid_and_subscribers() {
    let (supervisor, hub) = cat_supervisor();
    let _subscription = hub.subscribe();

    let idle = supervisor.status().await;
    assert_eq!(idle.state, SupervisorState::Stopped);
    assert_eq!(idle.pid, None);
    assert_eq!(idle.connected_subscribers, 1);

    let pid = supervisor.start().await.expect("start");
    let running = supervisor.status().await;
    assert_eq!(running.state, SupervisorState::Running);
    assert_eq!(running.pid, Some(pid));

    supervisor.stop().await.expect("stop");
}
