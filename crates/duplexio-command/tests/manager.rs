use std::sync::Arc;
use std::time::{Duration, Instant};

use duplexio_command::{
    CommandError, CommandFailure, CommandManager, ManagerState, NamedCommand, QueueConfig,
    ShutdownConfig,
};
use duplexio_engine::{DirectEngine, IoEngine};
use duplexio_transport::{memory_pair, MemoryDevice};

fn fast_config() -> QueueConfig {
    QueueConfig {
        poll_interval: Duration::from_millis(10),
        shutdown: ShutdownConfig {
            budget: Duration::from_millis(300),
            increment: Duration::from_millis(50),
        },
        ..QueueConfig::default()
    }
}

fn echo_manager(config: QueueConfig) -> (CommandManager, MemoryDevice) {
    let (provider, device) = memory_pair();
    device.set_responder(|request| request.to_vec());
    let engine = DirectEngine::new(provider);
    engine.connect().unwrap();
    (CommandManager::with_config(Arc::new(engine), config), device)
}

fn wait_for(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn commands_run_in_insertion_order() {
    let (manager, _device) = echo_manager(fast_config());
    manager.start().unwrap();

    let (tx, rx) = flume::unbounded::<Vec<u8>>();
    for i in 0u8..5 {
        let tx = tx.clone();
        let accepted = manager
            .enqueue(move |engine: &dyn IoEngine| -> Result<(), CommandFailure> {
                let mut out = [0u8; 1];
                engine.write_and_read_exact(&[i], &mut out, Duration::from_secs(1), None)?;
                tx.send(out.to_vec())?;
                Ok(())
            })
            .unwrap();
        assert!(accepted);
    }

    let received: Vec<Vec<u8>> = (0..5)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    assert_eq!(received, (0u8..5).map(|i| vec![i]).collect::<Vec<_>>());
    assert!(manager.stop());
}

#[test]
fn full_queue_rejects_without_blocking() {
    let (manager, _device) = echo_manager(fast_config());
    manager.start().unwrap();
    assert_eq!(manager.capacity(), 10);

    // Park the worker on a gate so the queue fills up behind it.
    let (gate_tx, gate_rx) = flume::bounded::<()>(0);
    let (started_tx, started_rx) = flume::bounded::<()>(1);
    manager
        .enqueue(NamedCommand::new("gate", move |_: &dyn IoEngine| {
            started_tx.send(())?;
            gate_rx.recv()?;
            Ok(())
        }))
        .unwrap();
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    for _ in 0..10 {
        let accepted = manager
            .enqueue(|_: &dyn IoEngine| -> Result<(), CommandFailure> { Ok(()) })
            .unwrap();
        assert!(accepted);
    }
    assert_eq!(manager.pending(), 10);

    let started = Instant::now();
    let accepted = manager
        .enqueue(|_: &dyn IoEngine| -> Result<(), CommandFailure> { Ok(()) })
        .unwrap();
    assert!(!accepted, "11th command must be rejected");
    assert!(started.elapsed() < Duration::from_millis(100));

    gate_tx.send(()).unwrap();
    wait_for(|| manager.pending() == 0);
    assert!(manager.stop());
}

#[test]
fn failing_and_panicking_commands_do_not_stop_the_worker() {
    let (manager, _device) = echo_manager(fast_config());
    manager.start().unwrap();

    let (tx, rx) = flume::unbounded::<&'static str>();

    manager
        .enqueue(NamedCommand::new("fails", |_: &dyn IoEngine| {
            Err("device rejected request".into())
        }))
        .unwrap();
    manager
        .enqueue(NamedCommand::new("panics", |_: &dyn IoEngine| {
            panic!("command bug");
        }))
        .unwrap();
    manager
        .enqueue(NamedCommand::new("survivor", move |_: &dyn IoEngine| {
            tx.send("ran")?;
            Ok(())
        }))
        .unwrap();

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "ran");
    assert_eq!(manager.state(), ManagerState::Running);
    assert!(manager.stop());
}

#[test]
fn stop_discards_pending_commands() {
    let (manager, device) = echo_manager(fast_config());
    manager.start().unwrap();

    let (gate_tx, gate_rx) = flume::bounded::<()>(0);
    let (started_tx, started_rx) = flume::bounded::<()>(1);
    manager
        .enqueue(NamedCommand::new("gate", move |_: &dyn IoEngine| {
            started_tx.send(())?;
            // Returns once the gate sender is dropped.
            let _ = gate_rx.recv();
            Ok(())
        }))
        .unwrap();
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    for _ in 0..3 {
        manager
            .enqueue(|engine: &dyn IoEngine| -> Result<(), CommandFailure> {
                engine.write(b"never", None)?;
                Ok(())
            })
            .unwrap();
    }

    // Release the gate only after stop() has drained the queue.
    let releaser = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        drop(gate_tx);
    });
    assert!(manager.stop());
    releaser.join().unwrap();
    assert_eq!(manager.state(), ManagerState::Stopped);
    assert_eq!(manager.pending(), 0);
    assert!(device.written().is_empty());

    let err = manager
        .enqueue(|_: &dyn IoEngine| -> Result<(), CommandFailure> { Ok(()) })
        .unwrap_err();
    assert!(matches!(err, CommandError::NotRunning));
}

#[test]
fn stop_abandons_command_that_never_returns() {
    let (manager, _device) = echo_manager(fast_config());
    manager.start().unwrap();

    let (release_tx, release_rx) = flume::bounded::<()>(1);
    let (started_tx, started_rx) = flume::bounded::<()>(1);
    manager
        .enqueue(NamedCommand::new("stuck", move |_: &dyn IoEngine| {
            started_tx.send(())?;
            release_rx.recv()?;
            Ok(())
        }))
        .unwrap();
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let started = Instant::now();
    assert!(!manager.stop());
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(350));
    assert!(elapsed < Duration::from_millis(350) + Duration::from_millis(300));
    assert_eq!(manager.state(), ManagerState::Stopped);

    release_tx.send(()).unwrap();
}

#[test]
fn manager_can_restart_after_stop() {
    let (manager, device) = echo_manager(fast_config());

    for round in 0u8..2 {
        manager.start().unwrap();
        let (tx, rx) = flume::bounded::<()>(1);
        manager
            .enqueue(move |engine: &dyn IoEngine| -> Result<(), CommandFailure> {
                engine.write(&[round], None)?;
                tx.send(())?;
                Ok(())
            })
            .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(manager.stop());
    }

    assert_eq!(device.written().as_ref(), &[0, 1]);
}

#[test]
fn dropping_a_running_manager_stops_the_worker() {
    let (manager, _device) = echo_manager(fast_config());
    manager.start().unwrap();
    let started = Instant::now();
    drop(manager);
    assert!(started.elapsed() < Duration::from_secs(1));
}
