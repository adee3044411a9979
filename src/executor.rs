//! The executor process: the isolated unit that actually runs the
//! transform.
//!
//! [`serve`] is the child side: a long-lived loop over the task channel,
//! entered by the hidden `exec-worker` subcommand. [`ExecutorSpec`] and
//! [`ExecutorHandle`] are the parent side: how supervisors and pools spawn
//! an executor child, feed it tasks, and wait on (or discard) it. The
//! executor is the unit of cancellation: a stuck one is killed outright
//! and a fresh one spawned, because the transform may sit inside native or
//! blocking calls that nothing short of process death can interrupt.

use crate::transform::{TransformConfig, convert, resolve_transform};
use crate::wire::{ResultMsg, TaskMsg, read_msg, write_msg};
use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error};

/// Child-side main loop.
///
/// Builds the named transform once (the expensive initialization is paid
/// per process lifetime, not per task), then serves tasks until a `stop`
/// message or the parent closes the channel. Transform failures never
/// cross this boundary; they arrive already encoded as error values.
pub fn serve<R: BufRead, W: Write>(
    transform_name: &str,
    cfg: &TransformConfig,
    mut input: R,
    mut output: W,
) -> Result<()> {
    let mut transform = resolve_transform(transform_name, cfg)?;
    debug!(transform = transform_name, "executor ready");
    loop {
        match read_msg::<TaskMsg, _>(&mut input)? {
            None => {
                // Parent went away; nothing left to serve.
                debug!("task channel closed");
                break;
            }
            Some(TaskMsg::Stop) => break,
            Some(TaskMsg::Work { seq, record }) => {
                let envelope = convert(record, transform.as_mut());
                write_msg(
                    &mut output,
                    &ResultMsg::Done {
                        seq,
                        out: envelope.output,
                    },
                )?;
            }
        }
    }
    Ok(())
}

/// How to launch an executor child process.
#[derive(Debug, Clone)]
pub struct ExecutorSpec {
    program: PathBuf,
    args: Vec<String>,
}

impl ExecutorSpec {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Spec that re-invokes the current executable's hidden `exec-worker`
    /// subcommand with the given transform.
    pub fn for_transform(transform: &str, cfg: &TransformConfig) -> Result<Self> {
        let program = std::env::current_exe().context("locate current executable")?;
        let mut args = vec!["exec-worker".to_string(), "--transform".to_string(), transform.to_string()];
        if cfg.liftover {
            args.push("--liftover".to_string());
        }
        Ok(Self { program, args })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        cmd
    }
}

/// Parent-side handle to one live executor child.
///
/// A pump thread turns the child's stdout into a channel of [`ResultMsg`],
/// so callers get bounded waits via `recv_timeout` and a disconnect the
/// moment the child dies.
pub struct ExecutorHandle {
    child: Child,
    stdin: ChildStdin,
    results: Receiver<ResultMsg>,
    pump: Option<JoinHandle<()>>,
}

impl ExecutorHandle {
    pub fn spawn(spec: &ExecutorSpec) -> Result<Self> {
        let mut child = spec
            .command()
            .spawn()
            .with_context(|| format!("spawn executor {}", spec.program.display()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("executor stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("executor stdout not captured"))?;
        let pid = child.id();

        let (tx, rx) = unbounded();
        let pump = std::thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            loop {
                match read_msg::<ResultMsg, _>(&mut reader) {
                    Ok(Some(msg)) => {
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        error!(pid, "bad result from executor: {err:#}");
                        break;
                    }
                }
            }
            // Dropping tx disconnects the receiver, which is how the
            // parent observes executor death.
        });

        debug!(pid, "executor started");
        Ok(Self {
            child,
            stdin,
            results: rx,
            pump: Some(pump),
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Push one task to the child. A write failure means the child is
    /// already gone; callers observe that through the result channel.
    pub fn dispatch(&mut self, seq: u64, record: &Value) -> Result<()> {
        write_msg(
            &mut self.stdin,
            &TaskMsg::Work {
                seq,
                record: record.clone(),
            },
        )
    }

    /// The one bounded wait in the system.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<ResultMsg, RecvTimeoutError> {
        self.results.recv_timeout(timeout)
    }

    /// Block until the child produces a result or dies.
    pub fn recv(&self) -> Result<ResultMsg> {
        self.results
            .recv()
            .map_err(|_| anyhow!("executor exited before returning a result"))
    }

    /// Forcefully terminate and reap the child. Used when it is presumed
    /// non-responsive; there is no cooperative path here.
    pub fn kill(&mut self) {
        self.child.kill().ok();
        self.child.wait().ok();
        if let Some(pump) = self.pump.take() {
            pump.join().ok();
        }
    }

    /// Ask the child to exit cleanly and wait for it, unbounded.
    pub fn stop(mut self) -> Result<ExitStatus> {
        // The child may already be gone; closing stdin below still lets
        // wait() complete either way.
        write_msg(&mut self.stdin, &TaskMsg::Stop).ok();
        drop(self.stdin);
        let status = self.child.wait().context("wait for executor exit")?;
        if let Some(pump) = self.pump.take() {
            pump.join().ok();
        }
        Ok(status)
    }
}
