//! Worker supervisor - owns the worker subprocess and its captured output.
//!
//! Flow:
//! 1. Resolve the worker artifact (fail fast if it is missing)
//! 2. Spawn it with `PORT=<port>` in its environment
//! 3. Pump stdout + stderr into the LogBuffer (and our stderr when mirroring)
//! 4. Watch task owns the Child: an exit nobody asked for is a crash, which
//!    dumps the captured logs and moves the state to Crashed
//! 5. stop() asks the watch task to kill the child and waits for the result;
//!    a failed kill leaves the worker owned and Running

use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::health::WorkerState;
use crate::log_buffer::{DEFAULT_LOG_CAPACITY, LogBuffer};

/// Port the worker listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 3092;

/// Script name looked up next to the running executable.
pub const BUNDLED_SCRIPT: &str = "bundled_server.js";

/// Any non-empty value mirrors worker output to our stderr.
pub const DEBUG_ENV: &str = "LIT_DEBUG_JS_SDK_SERVER";

/// Overrides the location of the bundled worker script.
pub const SCRIPT_ENV: &str = "LITBRIDGE_WORKER_SCRIPT";

/// How long a crash dump waits for the pumps to flush the worker's last words.
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

const PUMP_CHUNK: usize = 8 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("worker not found at {}: this is likely an installation issue", path.display())]
    MissingWorkerArtifact { path: PathBuf },
    #[error("failed to spawn worker: {0}")]
    SpawnFailure(#[source] io::Error),
    #[error("worker {0} not captured")]
    OutputNotCaptured(&'static str),
    #[error("failed to kill worker process: {0}")]
    Kill(#[source] io::Error),
}

/// What to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerArtifact {
    /// `bundled_server.js` next to the running executable, launched with `node`.
    /// `LITBRIDGE_WORKER_SCRIPT` overrides the script path.
    Bundled,
    /// A script launched through an interpreter.
    Script { interpreter: OsString, path: PathBuf },
    /// A self-contained executable.
    Executable(PathBuf),
}

impl WorkerArtifact {
    pub fn script(interpreter: impl Into<OsString>, path: impl Into<PathBuf>) -> Self {
        Self::Script {
            interpreter: interpreter.into(),
            path: path.into(),
        }
    }

    pub fn executable(path: impl Into<PathBuf>) -> Self {
        Self::Executable(path.into())
    }

    /// Build the command, with the working directory set to the artifact's directory.
    fn resolve(&self) -> Result<(Command, PathBuf), SupervisorError> {
        let (program, path) = match self {
            Self::Bundled => (Some(OsString::from("node")), bundled_script_path()?),
            Self::Script { interpreter, path } => (Some(interpreter.clone()), path.clone()),
            Self::Executable(path) => (None, path.clone()),
        };

        if !path.is_file() {
            return Err(SupervisorError::MissingWorkerArtifact { path });
        }
        // Absolute, since the child runs from the artifact's directory.
        let path = path
            .canonicalize()
            .map_err(|_| SupervisorError::MissingWorkerArtifact { path: path.clone() })?;

        let mut command = match program {
            Some(interpreter) => {
                let mut command = Command::new(interpreter);
                command.arg(&path);
                command
            }
            None => Command::new(&path),
        };
        if let Some(dir) = path.parent() {
            command.current_dir(dir);
        }

        Ok((command, path))
    }
}

fn bundled_script_path() -> Result<PathBuf, SupervisorError> {
    if let Some(path) = std::env::var_os(SCRIPT_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    let exe = std::env::current_exe().map_err(|e| {
        tracing::warn!(error = %e, "Cannot determine install directory");
        SupervisorError::MissingWorkerArtifact {
            path: PathBuf::from(BUNDLED_SCRIPT),
        }
    })?;

    let dir = exe.parent().map(PathBuf::from).unwrap_or_default();
    Ok(dir.join(BUNDLED_SCRIPT))
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub port: u16,
    pub artifact: WorkerArtifact,
    pub mirror_output: bool,
    pub log_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            artifact: WorkerArtifact::Bundled,
            mirror_output: std::env::var_os(DEBUG_ENV).is_some_and(|v| !v.is_empty()),
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl SupervisorConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_artifact(mut self, artifact: WorkerArtifact) -> Self {
        self.artifact = artifact;
        self
    }

    pub fn with_mirror_output(mut self, mirror: bool) -> Self {
        self.mirror_output = mirror;
        self
    }

    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }
}

type KillReply = oneshot::Sender<io::Result<()>>;

struct OwnedWorker {
    pid: Option<u32>,
    kill_tx: mpsc::Sender<KillReply>,
    watcher: JoinHandle<()>,
}

/// What the watch task needs from a running worker.
trait WorkerProcess: Send + 'static {
    fn wait(&mut self) -> impl Future<Output = io::Result<ExitStatus>> + Send;
    fn kill(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

impl WorkerProcess for Child {
    fn wait(&mut self) -> impl Future<Output = io::Result<ExitStatus>> + Send {
        Child::wait(self)
    }

    fn kill(&mut self) -> impl Future<Output = io::Result<()>> + Send {
        Child::kill(self)
    }
}

/// Owns at most one worker process.
///
/// `start`/`stop` take `&mut self`; share the supervisor behind a lock if
/// several tasks need to drive it. Dropping the supervisor kills its worker.
pub struct WorkerSupervisor {
    config: SupervisorConfig,
    logs: Arc<LogBuffer>,
    state: Arc<watch::Sender<WorkerState>>,
    worker: Option<OwnedWorker>,
}

impl WorkerSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let (state, _) = watch::channel(WorkerState::NotStarted);
        Self {
            logs: Arc::new(LogBuffer::new(config.log_capacity)),
            config,
            state: Arc::new(state),
            worker: None,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition, including crashes.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some() && self.state().is_running()
    }

    /// OS pid of the owned worker, if any.
    pub fn pid(&self) -> Option<u32> {
        self.worker.as_ref().and_then(|w| w.pid)
    }

    /// Captured worker output, oldest byte first.
    pub fn logs(&self) -> Vec<u8> {
        self.logs.snapshot()
    }

    pub fn log_buffer(&self) -> &Arc<LogBuffer> {
        &self.logs
    }

    /// Spawn the worker. No-op if the one we own is still running.
    pub async fn start(&mut self) -> Result<(), SupervisorError> {
        let port = self.config.port;

        if self.is_running() {
            tracing::debug!(port, pid = ?self.pid(), "Worker already running");
            return Ok(());
        }

        let previous = self.state();
        debug_assert!(previous.can_start(), "start() from {previous}");

        // A crashed worker's watcher has already finished.
        self.worker = None;

        let (mut command, path) = self.config.artifact.resolve()?;
        command
            .env("PORT", port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        self.state.send_replace(WorkerState::Starting);
        tracing::info!(port, artifact = %path.display(), "Spawning worker");

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.state.send_replace(previous);
                return Err(SupervisorError::SpawnFailure(e));
            }
        };

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            self.state.send_replace(previous);
            return Err(SupervisorError::OutputNotCaptured("stdout/stderr"));
        };

        let mirror = self.config.mirror_output;
        let pumps = vec![
            spawn_pump(stdout, Arc::clone(&self.logs), mirror),
            spawn_pump(stderr, Arc::clone(&self.logs), mirror),
        ];

        let pid = child.id();
        self.adopt(pid, child, pumps);
        tracing::debug!(port, ?pid, "Worker spawned");

        Ok(())
    }

    /// Take ownership of a spawned worker and start watching it.
    fn adopt<P: WorkerProcess>(&mut self, pid: Option<u32>, process: P, pumps: Vec<JoinHandle<()>>) {
        self.state.send_replace(WorkerState::Running);

        let (kill_tx, kill_rx) = mpsc::channel(1);
        let watcher = tokio::spawn(watch_worker(
            process,
            pid,
            kill_rx,
            pumps,
            Arc::clone(&self.state),
            Arc::clone(&self.logs),
        ));

        self.worker = Some(OwnedWorker {
            pid,
            kill_tx,
            watcher,
        });
    }

    /// Forcefully terminate the worker. Idempotent; no-op if nothing is owned.
    pub async fn stop(&mut self) -> Result<(), SupervisorError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        // Flip to Stopped before killing so the watcher does not report a crash.
        let was_running = self.state.send_if_modified(|state| {
            if state.is_running() {
                *state = WorkerState::Stopped;
                true
            } else {
                false
            }
        });
        if !was_running {
            tracing::debug!(pid = ?worker.pid, state = %self.state(), "Worker already exited");
            return Ok(());
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        if worker.kill_tx.send(reply_tx).await.is_err() {
            // Watcher finished between the state check and now: the child is gone.
            return Ok(());
        }

        match reply_rx.await {
            // The watcher has already put the state back to Running.
            Ok(Err(e)) => {
                tracing::warn!(pid = ?worker.pid, error = %e, "Failed to kill worker");
                self.worker = Some(worker);
                Err(SupervisorError::Kill(e))
            }
            Ok(Ok(())) | Err(_) => {
                let _ = worker.watcher.await;
                tracing::info!(pid = ?worker.pid, "Worker stopped");
                Ok(())
            }
        }
    }
}

fn spawn_pump<R>(mut reader: R, logs: Arc<LogBuffer>, mirror: bool) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; PUMP_CHUNK];
        let mut console = mirror.then(tokio::io::stderr);

        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    logs.append(&buf[..n]);
                    if let Some(console) = console.as_mut() {
                        let _ = console.write_all(&buf[..n]).await;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Worker output pipe read failed");
                    break;
                }
            }
        }
    })
}

async fn watch_worker<P: WorkerProcess>(
    mut process: P,
    pid: Option<u32>,
    mut kill_rx: mpsc::Receiver<KillReply>,
    pumps: Vec<JoinHandle<()>>,
    state: Arc<watch::Sender<WorkerState>>,
    logs: Arc<LogBuffer>,
) {
    loop {
        tokio::select! {
            status = process.wait() => {
                let crashed = state.send_if_modified(|state| {
                    if state.is_running() {
                        *state = WorkerState::Crashed;
                        true
                    } else {
                        false
                    }
                });
                if !crashed {
                    return;
                }

                let exit = match status {
                    Ok(status) => status.to_string(),
                    Err(e) => format!("wait failed: {}", e),
                };

                let _ = tokio::time::timeout(PUMP_DRAIN_TIMEOUT, async {
                    for pump in pumps {
                        let _ = pump.await;
                    }
                })
                .await;

                tracing::error!(
                    ?pid,
                    %exit,
                    "Worker crashed\n=== Worker logs ===\n{}\n=== End worker logs ===",
                    logs.snapshot_lossy().trim_end()
                );
                return;
            }
            request = kill_rx.recv() => {
                let result = process.kill().await;
                let Some(reply) = request else {
                    // Supervisor dropped without stop(): the worker goes with it.
                    match result {
                        Ok(()) => tracing::debug!(?pid, "Supervisor dropped, worker killed"),
                        Err(e) => tracing::warn!(?pid, error = %e, "Failed to kill orphaned worker"),
                    }
                    return;
                };

                let killed = result.is_ok();
                if !killed {
                    // Still alive: undo stop()'s Stopped before replying so an
                    // exit from here on is reported as a crash.
                    state.send_if_modified(|state| {
                        if *state == WorkerState::Stopped {
                            *state = WorkerState::Running;
                            true
                        } else {
                            false
                        }
                    });
                }
                let _ = reply.send(result);
                if killed {
                    return;
                }
            }
        }
    }
}
