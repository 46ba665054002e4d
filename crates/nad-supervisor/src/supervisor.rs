use crate::process::{forward_lines, kill_tree, CommandSpec, StreamKind};
use nad_core::AgentMode;
use std::io;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Idle,
    Launching,
    Running,
    Exited,
    Killed,
    LaunchFailed,
}

impl WorkerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerPhase::Idle => "idle",
            WorkerPhase::Launching => "launching",
            WorkerPhase::Running => "running",
            WorkerPhase::Exited => "exited",
            WorkerPhase::Killed => "killed",
            WorkerPhase::LaunchFailed => "launch_failed",
        }
    }
}

/// What a run is doing, kept for the exit cleanup path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMeta {
    pub thread_id: String,
    pub mode: AgentMode,
    /// The worker runs inside the background provider's environment.
    pub virtualized: bool,
}

#[derive(Debug)]
pub struct ActiveWorker {
    pub run_id: u64,
    pub pid: Option<u32>,
    pub meta: RunMeta,
    kill_tx: Option<oneshot::Sender<()>>,
    /// Fires once the process has been reaped.
    done_rx: Option<oneshot::Receiver<()>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    pub killed: bool,
}

impl WorkerExit {
    fn from_status(status: io::Result<ExitStatus>, killed: bool) -> Self {
        match status {
            Ok(status) => Self {
                code: status.code(),
                signal: exit_signal(&status),
                killed,
            },
            Err(err) => {
                warn!(event = "worker_wait_failed", error = %err);
                Self {
                    code: None,
                    signal: None,
                    killed,
                }
            }
        }
    }

    /// Non-zero exit or death by signal.
    pub fn is_abnormal(&self) -> bool {
        self.signal.is_some() || self.code != Some(0)
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerNotice {
    Exited { run_id: u64, exit: WorkerExit },
}

/// A run that left the supervisor. `exit` is `None` when it was stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedRun {
    pub run_id: u64,
    pub pid: Option<u32>,
    pub meta: RunMeta,
    pub exit: Option<WorkerExit>,
}

impl FinishedRun {
    pub fn is_abnormal(&self) -> bool {
        self.exit.map(|exit| exit.is_abnormal()).unwrap_or(false)
    }
}

#[derive(Debug)]
pub struct LaunchOutcome {
    pub run_id: u64,
    pub pid: Option<u32>,
    /// The run that had to be terminated to make room for this one.
    pub replaced: Option<FinishedRun>,
}

/// Upper bound on waiting for a killed run to be reaped.
const STOP_WAIT: Duration = Duration::from_secs(5);

/// Owns the single long-lived worker process.
///
/// Exit is observed by a background task that reports through `notices`;
/// the owner feeds those back into [`WorkerSupervisor::on_notice`]. Notices
/// from runs that are no longer current are ignored, so stop and natural
/// exit can race without running cleanup twice.
pub struct WorkerSupervisor {
    phase: WorkerPhase,
    active: Option<ActiveWorker>,
    next_run_id: u64,
    notices: mpsc::UnboundedSender<WorkerNotice>,
}

impl WorkerSupervisor {
    pub fn new(notices: mpsc::UnboundedSender<WorkerNotice>) -> Self {
        Self {
            phase: WorkerPhase::Idle,
            active: None,
            next_run_id: 0,
            notices,
        }
    }

    pub fn phase(&self) -> WorkerPhase {
        self.phase
    }

    pub fn active(&self) -> Option<&ActiveWorker> {
        self.active.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Spawns the worker. Any run still active is stopped, and reaped, first.
    pub async fn launch(
        &mut self,
        spec: &CommandSpec,
        meta: RunMeta,
    ) -> Result<LaunchOutcome, SupervisorError> {
        let replaced = self.stop().await;
        if let Some(old) = &replaced {
            warn!(event = "worker_replaced", run_id = old.run_id, thread_id = %old.meta.thread_id);
        }

        self.next_run_id += 1;
        let run_id = self.next_run_id;
        self.phase = WorkerPhase::Launching;

        let mut command = spec.to_command(true);
        command.kill_on_drop(true);
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.phase = WorkerPhase::LaunchFailed;
                error!(
                    event = "worker_spawn_failed",
                    run_id,
                    program = %spec.display_program(),
                    error = %source
                );
                return Err(SupervisorError::Spawn {
                    program: spec.display_program(),
                    source,
                });
            }
        };

        let pid = child.id();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, "agent-stdout", StreamKind::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, "agent-stderr", StreamKind::Stderr));
        }

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let notices = self.notices.clone();
        tokio::spawn(async move {
            let exit = tokio::select! {
                status = child.wait() => WorkerExit::from_status(status, false),
                _ = kill_rx => {
                    if let Some(pid) = pid {
                        kill_tree(pid).await;
                    }
                    let _ = child.start_kill();
                    WorkerExit::from_status(child.wait().await, true)
                }
            };
            info!(
                event = "worker_exited",
                run_id,
                code = ?exit.code,
                signal = ?exit.signal,
                killed = exit.killed
            );
            let _ = notices.send(WorkerNotice::Exited { run_id, exit });
            let _ = done_tx.send(());
        });

        info!(
            event = "worker_started",
            run_id,
            pid = ?pid,
            mode = %meta.mode,
            thread_id = %meta.thread_id
        );
        self.active = Some(ActiveWorker {
            run_id,
            pid,
            meta,
            kill_tx: Some(kill_tx),
            done_rx: Some(done_rx),
        });
        self.phase = WorkerPhase::Running;
        Ok(LaunchOutcome {
            run_id,
            pid,
            replaced,
        })
    }

    /// Force-terminates the active run and its descendants and waits until
    /// the process is reaped. `None` when idle.
    pub async fn stop(&mut self) -> Option<FinishedRun> {
        let mut active = self.active.take()?;
        self.phase = WorkerPhase::Killed;
        info!(event = "worker_stop", run_id = active.run_id, pid = ?active.pid);
        if let Some(kill_tx) = active.kill_tx.take() {
            let _ = kill_tx.send(());
        }
        if let Some(done_rx) = active.done_rx.take() {
            if tokio::time::timeout(STOP_WAIT, done_rx).await.is_err() {
                warn!(event = "worker_stop_timeout", run_id = active.run_id, pid = ?active.pid);
            }
        }
        Some(FinishedRun {
            run_id: active.run_id,
            pid: active.pid,
            meta: active.meta,
            exit: None,
        })
    }

    /// Applies an exit notice. Returns the finished run only when it was the
    /// current one.
    pub fn on_notice(&mut self, notice: WorkerNotice) -> Option<FinishedRun> {
        let WorkerNotice::Exited { run_id, exit } = notice;
        let current = self.active.as_ref().map(|active| active.run_id);
        if current != Some(run_id) {
            return None;
        }
        let active = self.active.take()?;
        self.phase = WorkerPhase::Exited;
        Some(FinishedRun {
            run_id: active.run_id,
            pid: active.pid,
            meta: active.meta,
            exit: Some(exit),
        })
    }

    /// Marks the terminal state as cleaned up.
    pub fn settle(&mut self) {
        if self.active.is_none() {
            self.phase = WorkerPhase::Idle;
        }
    }
}
