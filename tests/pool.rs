use anyhow::Result;
use serde_json::json;
use shardpipe::executor::ExecutorSpec;
use shardpipe::pool::WorkerPool;
use std::collections::HashSet;
use std::time::{Duration, Instant};

fn exec_spec(transform: &str) -> ExecutorSpec {
    ExecutorSpec::new(
        env!("CARGO_BIN_EXE_shardpipe"),
        vec![
            "exec-worker".to_string(),
            "--transform".to_string(),
            transform.to_string(),
        ],
    )
}

#[test]
fn every_submitted_task_yields_one_result() -> Result<()> {
    let pool = WorkerPool::start(exec_spec("identity"), 2, 16)?;
    let mut submitted = HashSet::new();
    for i in 0..10 {
        let id = pool.submit(json!({"id": i}))?;
        assert!(submitted.insert(id), "task ids must be unique");
    }

    let mut seen = HashSet::new();
    for _ in 0..10 {
        let (id, out) = pool
            .results()
            .recv_timeout(Duration::from_secs(30))
            .expect("result within deadline");
        assert!(out.is_some());
        seen.insert(id);
    }
    assert_eq!(seen, submitted);
    pool.shutdown()?;
    Ok(())
}

#[test]
fn task_ids_are_monotonic() -> Result<()> {
    let pool = WorkerPool::start(exec_spec("identity"), 1, 16)?;
    let a = pool.submit(json!({}))?;
    let b = pool.submit(json!({}))?;
    let c = pool.submit(json!({}))?;
    assert!(a < b && b < c);
    for _ in 0..3 {
        pool.results().recv_timeout(Duration::from_secs(30)).ok();
    }
    pool.shutdown()?;
    Ok(())
}

#[test]
fn in_flight_tasks_are_observable_while_running() -> Result<()> {
    let pool = WorkerPool::start(exec_spec("stall"), 1, 4)?;
    // Sleeps one second, then completes on its own: long enough to observe,
    // short enough to shut down cleanly.
    let id = pool.submit(json!({"stall": 1.0}))?;

    // Give the worker a moment to pick the task up, then watch it age.
    std::thread::sleep(Duration::from_millis(300));
    let running = pool.running_tasks();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].0, id);
    assert!(running[0].1 >= Duration::from_millis(100));

    let (done, out) = pool.results().recv_timeout(Duration::from_secs(30))?;
    assert_eq!(done, id);
    assert!(out.unwrap()["pid"].is_u64());

    // The registry entry disappears once the task completes.
    let gone = Instant::now();
    loop {
        if pool.running_tasks().is_empty() {
            break;
        }
        assert!(gone.elapsed() < Duration::from_secs(5), "entry never removed");
        std::thread::sleep(Duration::from_millis(10));
    }
    pool.shutdown()?;
    Ok(())
}

#[test]
fn shutdown_joins_all_workers() -> Result<()> {
    let pool = WorkerPool::start(exec_spec("identity"), 3, 8)?;
    for i in 0..6 {
        pool.submit(json!({"id": i}))?;
    }
    for _ in 0..6 {
        pool.results().recv_timeout(Duration::from_secs(30))?;
    }
    pool.shutdown()?;
    Ok(())
}
