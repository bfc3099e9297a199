//! CLI process supervision.
//!
//! A spawned process is exposed as a single ordered stream of
//! [`ProcessEvent`]s: stdout and stderr lines as they arrive (ordered per
//! stream, unordered across streams) followed by exactly one
//! [`ProcessEvent::Exited`].

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::command::Invocation;

/// Exit code reported when the process could not be started or was
/// terminated by a signal.
pub const SPAWN_FAILED_EXIT_CODE: i32 = -1;

/// Something observed on a supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Stdout(String),
    Stderr(String),
    /// Terminal event; nothing follows it.
    Exited { code: i32 },
}

/// Exclusive handle to a supervised process.
///
/// Dropping the handle kills the process unless it was produced by
/// [`ProcessHandle::from_channel`].
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    events: mpsc::UnboundedReceiver<ProcessEvent>,
    kill_tx: Option<oneshot::Sender<()>>,
    exited: bool,
}

impl ProcessHandle {
    /// Wrap an already-populated event stream with no process behind it.
    pub fn from_channel(events: mpsc::UnboundedReceiver<ProcessEvent>) -> Self {
        Self {
            pid: None,
            events,
            kill_tx: None,
            exited: false,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the terminal event has been delivered.
    pub fn has_exited(&self) -> bool {
        self.exited
    }

    /// Next event, or `None` once the stream is exhausted.
    pub async fn next_event(&mut self) -> Option<ProcessEvent> {
        if self.exited {
            return None;
        }
        let event = self.events.recv().await;
        if matches!(event, Some(ProcessEvent::Exited { .. }) | None) {
            self.exited = true;
        }
        event
    }

    /// Kill the process. The `Exited` event still follows.
    pub fn terminate(&mut self) {
        if let Some(kill) = self.kill_tx.take() {
            tracing::debug!(pid = ?self.pid, "terminating CLI process");
            let _ = kill.send(());
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.exited {
            self.terminate();
        }
    }
}

/// Starts CLI processes. Abstracted so launches can run against scripted
/// output.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(
        &self,
        invocation: &Invocation,
        working_dir: &Path,
        env: &HashMap<String, String>,
    ) -> ProcessHandle;
}

/// Spawns real OS processes with tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSpawner;

impl ProcessSpawner for SystemSpawner {
    fn spawn(
        &self,
        invocation: &Invocation,
        working_dir: &Path,
        env: &HashMap<String, String>,
    ) -> ProcessHandle {
        spawn(invocation, working_dir, env)
    }
}

/// Spawn `invocation` in `working_dir` with `env` added to the inherited
/// environment.
///
/// Never fails: if the executable cannot be started the handle yields a
/// single `Exited { code: SPAWN_FAILED_EXIT_CODE }`.
pub fn spawn(
    invocation: &Invocation,
    working_dir: &Path,
    env: &HashMap<String, String>,
) -> ProcessHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let (kill_tx, kill_rx) = oneshot::channel();

    tracing::info!(cwd = %working_dir.display(), "spawning `{}`", invocation);

    let child = Command::new(invocation.program())
        .args(invocation.args())
        .current_dir(working_dir)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let mut child = match child {
        Ok(child) => child,
        Err(e) => {
            tracing::error!("failed to start `{}`: {}", invocation, e);
            let _ = tx.send(ProcessEvent::Exited {
                code: SPAWN_FAILED_EXIT_CODE,
            });
            return ProcessHandle::from_channel(rx);
        }
    };

    let pid = child.id();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(forward_lines(
            stdout,
            tx.clone(),
            ProcessEvent::Stdout,
        )));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(forward_lines(
            stderr,
            tx.clone(),
            ProcessEvent::Stderr,
        )));
    }

    tokio::spawn(supervise(child, readers, kill_rx, tx));

    ProcessHandle {
        pid,
        events: rx,
        kill_tx: Some(kill_tx),
        exited: false,
    }
}

async fn forward_lines<R>(
    reader: R,
    tx: mpsc::UnboundedSender<ProcessEvent>,
    wrap: fn(String) -> ProcessEvent,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']).to_string();
                // A closed receiver means nobody owns the process anymore.
                if tx.send(wrap(line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("error reading CLI output: {}", e);
                break;
            }
        }
    }
}

async fn supervise(
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    kill_rx: oneshot::Receiver<()>,
    tx: mpsc::UnboundedSender<ProcessEvent>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        Ok(()) = kill_rx => {
            if let Err(e) = child.start_kill() {
                tracing::warn!("failed to kill CLI process: {}", e);
            }
            child.wait().await
        }
    };

    for reader in readers {
        let _ = reader.await;
    }

    let code = match status {
        Ok(status) => status.code().unwrap_or(SPAWN_FAILED_EXIT_CODE),
        Err(e) => {
            tracing::warn!("failed to reap CLI process: {}", e);
            SPAWN_FAILED_EXIT_CODE
        }
    };
    tracing::info!(code, "CLI process exited");
    let _ = tx.send(ProcessEvent::Exited { code });
}
