//! A reusable process pool: N executor children sharing one task queue
//! and one result queue.
//!
//! Unlike the shard supervisor, this form applies no deadline and takes no
//! automatic action on slow tasks; it only makes them observable. Worker
//! pump threads report task starts and finishes over a dedicated
//! monitoring channel; a monitor thread folds those events into the local
//! in-flight view that [`WorkerPool::running_tasks`] reports. An entry
//! leaves the view the moment its task completes, so the view approximates
//! "currently running" at any instant.

use crate::executor::{ExecutorHandle, ExecutorSpec};
use crate::wire::ResultMsg;
use anyhow::{Context, Result, anyhow, bail};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Submission blocks once this many tasks are queued and unclaimed.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Identifies one submitted task. Generated from a process-wide monotonic
/// counter, so ids are unique no matter how fast producers submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

enum PoolTask {
    Work { id: TaskId, record: Value },
    Stop,
}

enum MonitorEvent {
    Started { id: TaskId, at: Instant },
    Finished { id: TaskId },
}

/// N long-lived executor processes fed from one bounded queue.
pub struct WorkerPool {
    tasks: Sender<PoolTask>,
    results: Receiver<(TaskId, Option<Value>)>,
    in_flight: Arc<Mutex<HashMap<TaskId, Instant>>>,
    pumps: Vec<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
    workers: usize,
    next_id: AtomicU64,
}

impl WorkerPool {
    /// A sensible worker count for CPU-bound transforms.
    pub fn default_workers() -> usize {
        num_cpus::get().max(2)
    }

    /// Spawn `workers` executor children and their pump threads.
    pub fn start(spec: ExecutorSpec, workers: usize, queue_capacity: usize) -> Result<Self> {
        if workers == 0 {
            bail!("worker pool needs at least one worker");
        }
        let (task_tx, task_rx) = bounded(queue_capacity.max(1));
        let (result_tx, result_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();

        // Spawn all children first so a failure aborts before any pump
        // starts consuming tasks.
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let handle = ExecutorHandle::spawn(&spec)
                .with_context(|| format!("spawn pool worker {worker}"))?;
            handles.push(handle);
        }

        let mut pumps = Vec::with_capacity(workers);
        for (worker, exec) in handles.into_iter().enumerate() {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let event_tx = event_tx.clone();
            pumps.push(std::thread::spawn(move || {
                worker_pump(worker, exec, task_rx, result_tx, event_tx);
            }));
        }
        drop(event_tx);

        let in_flight = Arc::new(Mutex::new(HashMap::new()));
        let view = Arc::clone(&in_flight);
        let monitor = std::thread::spawn(move || {
            for event in event_rx {
                let mut map = view.lock().unwrap();
                match event {
                    MonitorEvent::Started { id, at } => {
                        map.insert(id, at);
                    }
                    MonitorEvent::Finished { id } => {
                        map.remove(&id);
                    }
                }
            }
        });

        Ok(Self {
            tasks: task_tx,
            results: result_rx,
            in_flight,
            pumps,
            monitor: Some(monitor),
            workers,
            next_id: AtomicU64::new(0),
        })
    }

    /// Queue one record and return its id immediately. Blocks only while
    /// the bounded task queue is full.
    pub fn submit(&self, record: Value) -> Result<TaskId> {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.tasks
            .send(PoolTask::Work { id, record })
            .map_err(|_| anyhow!("worker pool is shut down"))?;
        Ok(id)
    }

    /// The shared result queue, in completion order across workers.
    pub fn results(&self) -> &Receiver<(TaskId, Option<Value>)> {
        &self.results
    }

    /// Elapsed age of every currently in-flight task, oldest first.
    pub fn running_tasks(&self) -> Vec<(TaskId, Duration)> {
        let now = Instant::now();
        let mut ages: Vec<(TaskId, Duration)> = self
            .in_flight
            .lock()
            .unwrap()
            .iter()
            .map(|(id, started)| (*id, now.duration_since(*started)))
            .collect();
        ages.sort_by(|a, b| b.1.cmp(&a.1));
        ages
    }

    /// Stop every worker (one stop message each), join the pumps, and
    /// wait for the children to exit.
    pub fn shutdown(self) -> Result<()> {
        for _ in 0..self.workers {
            self.tasks.send(PoolTask::Stop).ok();
        }
        drop(self.tasks);
        for pump in self.pumps {
            pump.join().map_err(|_| anyhow!("worker pump panicked"))?;
        }
        if let Some(monitor) = self.monitor {
            monitor.join().ok();
        }
        Ok(())
    }
}

fn worker_pump(
    worker: usize,
    mut exec: ExecutorHandle,
    tasks: Receiver<PoolTask>,
    results: Sender<(TaskId, Option<Value>)>,
    events: Sender<MonitorEvent>,
) {
    loop {
        match tasks.recv() {
            Err(_) | Ok(PoolTask::Stop) => {
                debug!(worker, "stopping pool worker");
                match exec.stop() {
                    Ok(status) if !status.success() => {
                        warn!(worker, %status, "pool executor exited abnormally")
                    }
                    Err(err) => warn!(worker, "pool executor shutdown failed: {err:#}"),
                    _ => {}
                }
                break;
            }
            Ok(PoolTask::Work { id, record }) => {
                events
                    .send(MonitorEvent::Started {
                        id,
                        at: Instant::now(),
                    })
                    .ok();
                let outcome = exec.dispatch(id.0, &record).and_then(|()| exec.recv());
                events.send(MonitorEvent::Finished { id }).ok();
                match outcome {
                    Ok(ResultMsg::Done { out, .. }) => {
                        results.send((id, out)).ok();
                    }
                    Err(err) => {
                        // No recovery in this form; the task is lost and
                        // the worker retires.
                        error!(worker, %id, "pool executor failed: {err:#}");
                        exec.kill();
                        break;
                    }
                }
            }
        }
    }
}
